//! Administrative facade composing the stores, validator, engine, and
//! history recorder.
//!
//! Evaluation reads a frozen snapshot and shares no mutable state, so it runs
//! freely in parallel. Administrative writes are serialized behind a single
//! write gate: per-rule serialization is the minimum requirement, and import
//! must exclude every other mutation anyway because it replaces the whole set.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::domain::{
    Actor, CalculationResult, FieldChange, HistoryAction, HistoryEntry, InputContext, Rule,
    RuleBackup, RuleDraft, RuleId, RuleSetDocument, RuleUpdate, EXPORT_FORMAT_VERSION,
};
use super::engine::PricingEngine;
use super::harness::{self, RuleTestResult};
use super::store::{BackupStore, HistoryStore, RuleStore, StoreError, HISTORY_DEFAULT_LIMIT};
use super::validator::{self, ConflictError, ValidationError};

/// Error raised by the pricing service.
#[derive(Debug, thiserror::Error)]
pub enum PricingServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error("rule '{0}' not found")]
    NotFound(RuleId),
    #[error("imported rule '{id}' rejected: {source}")]
    ImportRejected {
        id: RuleId,
        #[source]
        source: ValidationError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a bulk import replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub backup_id: String,
    pub imported: usize,
    pub deactivated: usize,
}

/// Service composing rule persistence, history recording, and the engine.
pub struct PricingService<R, H, B> {
    rules: Arc<R>,
    history: Arc<H>,
    backups: Arc<B>,
    write_gate: Mutex<()>,
}

impl<R, H, B> PricingService<R, H, B>
where
    R: RuleStore + 'static,
    H: HistoryStore + 'static,
    B: BackupStore + 'static,
{
    pub fn new(rules: Arc<R>, history: Arc<H>, backups: Arc<B>) -> Self {
        Self {
            rules,
            history,
            backups,
            write_gate: Mutex::new(()),
        }
    }

    /// Compute a price estimate from a frozen snapshot of the applicable
    /// active rules.
    pub fn estimate(&self, context: &InputContext) -> Result<CalculationResult, PricingServiceError> {
        let snapshot = self
            .rules
            .find_active_by_service_and_window(context.service_type, context.move_date)?;
        let result = PricingEngine::evaluate(&snapshot, context);
        debug!(
            rules = snapshot.len(),
            applied = result.applied_rules.len(),
            hash = %result.metadata.verification_hash,
            "estimate computed"
        );
        Ok(result)
    }

    /// Validate and persist a new rule at version 1.0.0.
    pub fn create_rule(
        &self,
        draft: RuleDraft,
        actor: &Actor,
    ) -> Result<Rule, PricingServiceError> {
        let rule = draft.into_rule(actor, Utc::now());
        validator::validate(&rule)?;

        let _gate = self.write_gate.lock().expect("write gate poisoned");

        if self.rules.find_by_id(&rule.id)?.is_some() {
            return Err(ConflictError::DuplicateId(rule.id).into());
        }
        if rule.is_active {
            if let Some(occupant) =
                self.rules
                    .find_by_category_and_priority(rule.category, rule.priority, None)?
            {
                return Err(ConflictError::DuplicatePriority {
                    existing: occupant.id,
                    category: rule.category,
                    priority: rule.priority,
                }
                .into());
            }
        }

        let stored = self.rules.insert(rule)?;
        self.record(&stored.id, HistoryAction::Created, BTreeMap::new(), actor, None)?;
        info!(rule = %stored.id, version = %stored.version, "pricing rule created");
        Ok(stored)
    }

    /// Merge a partial update, re-validate, bump the patch version, and record
    /// the field-level diff.
    pub fn update_rule(
        &self,
        id: &RuleId,
        patch: RuleUpdate,
        actor: &Actor,
    ) -> Result<Rule, PricingServiceError> {
        let _gate = self.write_gate.lock().expect("write gate poisoned");

        let existing = self.load_live(id)?;
        let merged = merge_rule(&existing, patch, actor, Utc::now());
        validator::validate(&merged)?;

        if merged.is_active {
            if let Some(occupant) = self.rules.find_by_category_and_priority(
                merged.category,
                merged.priority,
                Some(id),
            )? {
                return Err(ConflictError::DuplicatePriority {
                    existing: occupant.id,
                    category: merged.category,
                    priority: merged.priority,
                }
                .into());
            }
        }

        let changes = rule_changes(&existing, &merged);
        self.rules.update(merged.clone())?;
        self.record(id, HistoryAction::Updated, changes, actor, None)?;
        info!(rule = %id, version = %merged.version, "pricing rule updated");
        Ok(merged)
    }

    /// Soft delete: the rule stays queryable and its history outlives it, but
    /// it is permanently excluded from evaluation.
    pub fn delete_rule(
        &self,
        id: &RuleId,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<(), PricingServiceError> {
        let _gate = self.write_gate.lock().expect("write gate poisoned");

        self.load_live(id)?;
        self.rules.soft_delete(id, Utc::now())?;
        self.record(id, HistoryAction::Deleted, BTreeMap::new(), actor, reason)?;
        info!(rule = %id, "pricing rule soft-deleted");
        Ok(())
    }

    /// Flip activation state. Activating re-checks priority uniqueness since
    /// the rule re-enters the active set.
    pub fn set_rule_active(
        &self,
        id: &RuleId,
        active: bool,
        actor: &Actor,
    ) -> Result<Rule, PricingServiceError> {
        let _gate = self.write_gate.lock().expect("write gate poisoned");

        let existing = self.load_live(id)?;
        if existing.is_active == active {
            return Ok(existing);
        }

        let mut updated = existing.clone();
        updated.is_active = active;
        updated.version = existing.version.bump_patch();
        updated.updated_by = actor.user_id.clone();
        updated.updated_at = Utc::now();

        if active {
            if let Some(occupant) = self.rules.find_by_category_and_priority(
                updated.category,
                updated.priority,
                Some(id),
            )? {
                return Err(ConflictError::DuplicatePriority {
                    existing: occupant.id,
                    category: updated.category,
                    priority: updated.priority,
                }
                .into());
            }
        }

        self.rules.update(updated.clone())?;
        let action = if active {
            HistoryAction::Activated
        } else {
            HistoryAction::Deactivated
        };
        self.record(id, action, rule_changes(&existing, &updated), actor, None)?;
        Ok(updated)
    }

    pub fn get_rule(&self, id: &RuleId) -> Result<Rule, PricingServiceError> {
        self.rules
            .find_by_id(id)?
            .ok_or_else(|| PricingServiceError::NotFound(id.clone()))
    }

    pub fn list_active_rules(&self) -> Result<Vec<Rule>, PricingServiceError> {
        Ok(self.rules.list_active()?)
    }

    /// Lifecycle entries for one rule, newest-first. Soft-deleted rules remain
    /// queryable here.
    pub fn rule_history(
        &self,
        id: &RuleId,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryEntry>, PricingServiceError> {
        if self.rules.find_by_id(id)?.is_none() {
            return Err(PricingServiceError::NotFound(id.clone()));
        }
        Ok(self
            .history
            .query_by_rule_id(id, limit.unwrap_or(HISTORY_DEFAULT_LIMIT))?)
    }

    /// Serialize the active rule set into a portable document.
    pub fn export_rules(&self, actor: &Actor) -> Result<RuleSetDocument, PricingServiceError> {
        let rules = self.rules.list_active()?;
        for rule in &rules {
            self.record(&rule.id, HistoryAction::Exported, BTreeMap::new(), actor, None)?;
        }
        Ok(RuleSetDocument {
            version: EXPORT_FORMAT_VERSION.to_string(),
            export_date: Utc::now(),
            rules_count: rules.len(),
            rules,
        })
    }

    /// Bulk replace: validate everything up front, snapshot the active set,
    /// soft-deactivate it, then persist each incoming rule freshly at 1.0.0.
    /// Any validation failure aborts before the first mutation.
    pub fn import_rules(
        &self,
        document: RuleSetDocument,
        actor: &Actor,
    ) -> Result<ImportSummary, PricingServiceError> {
        if document.rules.is_empty() {
            return Err(ValidationError::EmptyImport.into());
        }

        let _gate = self.write_gate.lock().expect("write gate poisoned");
        let now = Utc::now();

        let mut accepted: Vec<Rule> = Vec::with_capacity(document.rules.len());
        for incoming in document.rules {
            let staged = rebase_imported(incoming, actor, now);
            if let Err(source) = validator::validate(&staged) {
                return Err(PricingServiceError::ImportRejected {
                    id: staged.id,
                    source,
                });
            }
            if accepted.iter().any(|rule| rule.id == staged.id) {
                return Err(ConflictError::DuplicateId(staged.id).into());
            }
            validator::ensure_priority_available(&staged, &accepted)?;
            accepted.push(staged);
        }

        let previous = self.rules.list_active()?;
        let backup = RuleBackup {
            id: format!("backup-{}", now.format("%Y%m%d%H%M%S")),
            name: "pre-import snapshot".to_string(),
            created_at: now,
            rule_count: previous.len(),
            rules: previous,
        };
        let backup_id = backup.id.clone();
        self.backups.save(backup)?;

        let deactivated = self.rules.deactivate_all(now)?;

        let imported = accepted.len();
        for rule in accepted {
            let id = rule.id.clone();
            let mut changes = BTreeMap::new();
            // A soft-deactivated predecessor may still hold this id; the
            // incoming rule replaces it, the backup preserves the old state
            // and the history entry records which version was displaced.
            match self.rules.find_by_id(&id)? {
                Some(previous) => {
                    changes.insert(
                        "version".to_string(),
                        FieldChange {
                            old: Value::String(previous.version.to_string()),
                            new: Value::String(rule.version.to_string()),
                        },
                    );
                    self.rules.update(rule)?;
                }
                None => {
                    self.rules.insert(rule)?;
                }
            }
            self.record(&id, HistoryAction::Imported, changes, actor, None)?;
        }

        info!(imported, deactivated, backup = %backup_id, "rule set imported");
        Ok(ImportSummary {
            backup_id,
            imported,
            deactivated,
        })
    }

    /// Dry-run a candidate rule without touching any store.
    pub fn test_rule(&self, rule: &Rule, context: Option<InputContext>) -> RuleTestResult {
        harness::test_rule(rule, context)
    }

    /// A rule that was soft-deleted no longer accepts lifecycle operations.
    fn load_live(&self, id: &RuleId) -> Result<Rule, PricingServiceError> {
        match self.rules.find_by_id(id)? {
            Some(rule) if rule.deleted_at.is_none() => Ok(rule),
            _ => Err(PricingServiceError::NotFound(id.clone())),
        }
    }

    fn record(
        &self,
        rule_id: &RuleId,
        action: HistoryAction,
        changes: BTreeMap<String, FieldChange>,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<(), StoreError> {
        self.history.append(HistoryEntry {
            rule_id: rule_id.clone(),
            action,
            changes,
            user_id: actor.user_id.clone(),
            user_name: actor.user_name.clone(),
            timestamp: Utc::now(),
            reason,
        })
    }
}

fn merge_rule(existing: &Rule, patch: RuleUpdate, actor: &Actor, now: DateTime<Utc>) -> Rule {
    let mut merged = existing.clone();
    if let Some(name) = patch.name {
        merged.name = name;
    }
    if let Some(description) = patch.description {
        merged.description = description;
    }
    if let Some(notes) = patch.notes {
        merged.notes = notes;
    }
    if let Some(category) = patch.category {
        merged.category = category;
    }
    if let Some(priority) = patch.priority {
        merged.priority = priority;
    }
    if let Some(conditions) = patch.conditions {
        merged.conditions = conditions;
    }
    if let Some(actions) = patch.actions {
        merged.actions = actions;
    }
    if let Some(services) = patch.applicable_services {
        merged.applicable_services = services;
    }
    // Double-wrapped dates: the outer layer is "was the field sent at all",
    // the inner layer is the new value, where None clears the window edge.
    if let Some(effective_date) = patch.effective_date {
        merged.effective_date = effective_date;
    }
    if let Some(expiry_date) = patch.expiry_date {
        merged.expiry_date = expiry_date;
    }
    // The next version always derives from the persisted prior version, never
    // from an in-process counter.
    merged.version = existing.version.bump_patch();
    merged.updated_by = actor.user_id.clone();
    merged.updated_at = now;
    merged
}

/// Imported rules land as newly created: fresh version, fresh audit fields,
/// no deletion marker.
fn rebase_imported(incoming: Rule, actor: &Actor, now: DateTime<Utc>) -> Rule {
    let draft = RuleDraft {
        id: incoming.id,
        name: incoming.name,
        description: incoming.description,
        notes: incoming.notes,
        category: incoming.category,
        priority: incoming.priority,
        conditions: incoming.conditions,
        actions: incoming.actions,
        is_active: incoming.is_active,
        applicable_services: incoming.applicable_services,
        effective_date: incoming.effective_date,
        expiry_date: incoming.expiry_date,
    };
    draft.into_rule(actor, now)
}

/// Field-level diff over the serialized representations; unchanged fields are
/// omitted. Audit stamps are excluded since they change on every write.
fn rule_changes(old: &Rule, new: &Rule) -> BTreeMap<String, FieldChange> {
    let old_map = as_object(old);
    let new_map = as_object(new);

    let keys: BTreeSet<&String> = old_map.keys().chain(new_map.keys()).collect();
    let mut changes = BTreeMap::new();
    for key in keys {
        if matches!(key.as_str(), "updatedAt" | "updatedBy") {
            continue;
        }
        let old_value = old_map.get(key).cloned().unwrap_or(Value::Null);
        let new_value = new_map.get(key).cloned().unwrap_or(Value::Null);
        if old_value != new_value {
            changes.insert(
                key.clone(),
                FieldChange {
                    old: old_value,
                    new: new_value,
                },
            );
        }
    }
    changes
}

fn as_object(rule: &Rule) -> serde_json::Map<String, Value> {
    match serde_json::to_value(rule) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}
