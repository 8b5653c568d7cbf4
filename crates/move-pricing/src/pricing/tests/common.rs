use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;

use crate::pricing::domain::{
    Action, ActionType, Actor, Condition, ConditionOperator, ConditionValue, HistoryEntry,
    InputContext, Rule, RuleBackup, RuleCategory, RuleDraft, RuleId, ServiceType,
};
use crate::pricing::store::{
    BackupStore, HistoryStore, RuleStore, StoreError, HISTORY_RETENTION_DAYS,
};
use crate::pricing::{pricing_router, PricingService};

pub(super) fn admin() -> Actor {
    Actor {
        user_id: "ops-17".to_string(),
        user_name: "Dispatch Ops".to_string(),
    }
}

pub(super) fn july_weekday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 7, 8).expect("valid date")
}

pub(super) fn local_context() -> InputContext {
    InputContext {
        service_type: ServiceType::LocalMove,
        move_date: july_weekday(),
        base_price: 1000.0,
        base_labor_cost: 400.0,
        total_weight_kg: 1200.0,
        total_volume_m3: 15.0,
        distance_km: 25.0,
        crew_size: 3,
        ..InputContext::default()
    }
}

pub(super) fn draft(
    id: &str,
    category: RuleCategory,
    priority: u16,
    conditions: Vec<Condition>,
    actions: Vec<Action>,
) -> RuleDraft {
    RuleDraft {
        id: RuleId(id.to_string()),
        name: format!("rule {id}"),
        description: String::new(),
        notes: String::new(),
        category,
        priority,
        conditions,
        actions,
        is_active: true,
        applicable_services: BTreeSet::from([ServiceType::LocalMove]),
        effective_date: None,
        expiry_date: None,
    }
}

pub(super) fn rule(
    id: &str,
    category: RuleCategory,
    priority: u16,
    conditions: Vec<Condition>,
    actions: Vec<Action>,
) -> Rule {
    draft(id, category, priority, conditions, actions).into_rule(&admin(), Utc::now())
}

pub(super) fn eq_condition(field: &str, value: ConditionValue) -> Condition {
    Condition {
        field: field.to_string(),
        operator: ConditionOperator::Eq,
        value: Some(value),
        values: None,
    }
}

pub(super) fn gte_condition(field: &str, value: ConditionValue) -> Condition {
    Condition {
        field: field.to_string(),
        operator: ConditionOperator::Gte,
        value: Some(value),
        values: None,
    }
}

pub(super) fn action(kind: ActionType, amount: f64, target_field: &str) -> Action {
    Action {
        kind,
        amount,
        target_field: target_field.to_string(),
        description: String::new(),
        condition: None,
    }
}

pub(super) fn weekend_rule() -> Rule {
    rule(
        "weekend-surcharge",
        RuleCategory::Timing,
        100,
        vec![eq_condition("isWeekend", ConditionValue::Flag(true))],
        vec![action(ActionType::AddPercentage, 15.0, "totalPrice")],
    )
}

pub(super) fn build_service() -> (
    Arc<PricingService<MemoryRuleStore, MemoryHistoryStore, MemoryBackupStore>>,
    Arc<MemoryRuleStore>,
    Arc<MemoryHistoryStore>,
    Arc<MemoryBackupStore>,
) {
    let rules = Arc::new(MemoryRuleStore::default());
    let history = Arc::new(MemoryHistoryStore::default());
    let backups = Arc::new(MemoryBackupStore::default());
    let service = Arc::new(PricingService::new(
        rules.clone(),
        history.clone(),
        backups.clone(),
    ));
    (service, rules, history, backups)
}

pub(super) fn pricing_router_with_service(
    service: Arc<PricingService<MemoryRuleStore, MemoryHistoryStore, MemoryBackupStore>>,
) -> axum::Router {
    pricing_router(service)
}

/// Insertion-ordered in-memory rule store; the order doubles as the
/// deterministic tie-break for equal priorities.
#[derive(Default, Clone)]
pub(super) struct MemoryRuleStore {
    rules: Arc<Mutex<Vec<Rule>>>,
}

impl MemoryRuleStore {
    pub(super) fn all(&self) -> Vec<Rule> {
        self.rules.lock().expect("rule mutex poisoned").clone()
    }
}

impl RuleStore for MemoryRuleStore {
    fn find_active_by_service_and_window(
        &self,
        service: ServiceType,
        as_of: NaiveDate,
    ) -> Result<Vec<Rule>, StoreError> {
        let guard = self.rules.lock().expect("rule mutex poisoned");
        Ok(guard
            .iter()
            .filter(|rule| rule.applies_to(service, as_of))
            .cloned()
            .collect())
    }

    fn find_by_id(&self, id: &RuleId) -> Result<Option<Rule>, StoreError> {
        let guard = self.rules.lock().expect("rule mutex poisoned");
        Ok(guard.iter().find(|rule| &rule.id == id).cloned())
    }

    fn find_by_category_and_priority(
        &self,
        category: RuleCategory,
        priority: u16,
        exclude: Option<&RuleId>,
    ) -> Result<Option<Rule>, StoreError> {
        let guard = self.rules.lock().expect("rule mutex poisoned");
        Ok(guard
            .iter()
            .find(|rule| {
                Some(&rule.id) != exclude
                    && rule.is_active
                    && rule.deleted_at.is_none()
                    && rule.category == category
                    && rule.priority == priority
            })
            .cloned())
    }

    fn insert(&self, rule: Rule) -> Result<Rule, StoreError> {
        let mut guard = self.rules.lock().expect("rule mutex poisoned");
        if guard.iter().any(|existing| existing.id == rule.id) {
            return Err(StoreError::Conflict);
        }
        guard.push(rule.clone());
        Ok(rule)
    }

    fn update(&self, rule: Rule) -> Result<(), StoreError> {
        let mut guard = self.rules.lock().expect("rule mutex poisoned");
        match guard.iter_mut().find(|existing| existing.id == rule.id) {
            Some(existing) => {
                *existing = rule;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    fn soft_delete(&self, id: &RuleId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut guard = self.rules.lock().expect("rule mutex poisoned");
        match guard.iter_mut().find(|existing| &existing.id == id) {
            Some(existing) => {
                existing.is_active = false;
                existing.deleted_at = Some(at);
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    fn deactivate_all(&self, at: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut guard = self.rules.lock().expect("rule mutex poisoned");
        let mut count = 0;
        for rule in guard.iter_mut() {
            if rule.is_active && rule.deleted_at.is_none() {
                rule.is_active = false;
                rule.deleted_at = Some(at);
                count += 1;
            }
        }
        Ok(count)
    }

    fn list_active(&self) -> Result<Vec<Rule>, StoreError> {
        let guard = self.rules.lock().expect("rule mutex poisoned");
        Ok(guard
            .iter()
            .filter(|rule| rule.is_active && rule.deleted_at.is_none())
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryHistoryStore {
    entries: Arc<Mutex<Vec<HistoryEntry>>>,
}

impl MemoryHistoryStore {
    pub(super) fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().expect("history mutex poisoned").clone()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append(&self, entry: HistoryEntry) -> Result<(), StoreError> {
        let mut guard = self.entries.lock().expect("history mutex poisoned");
        let horizon = entry.timestamp - Duration::days(HISTORY_RETENTION_DAYS);
        guard.retain(|existing| existing.timestamp >= horizon);
        guard.push(entry);
        Ok(())
    }

    fn query_by_rule_id(&self, id: &RuleId, limit: usize) -> Result<Vec<HistoryEntry>, StoreError> {
        let guard = self.entries.lock().expect("history mutex poisoned");
        Ok(guard
            .iter()
            .rev()
            .filter(|entry| &entry.rule_id == id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryBackupStore {
    backups: Arc<Mutex<Vec<RuleBackup>>>,
}

impl BackupStore for MemoryBackupStore {
    fn save(&self, backup: RuleBackup) -> Result<(), StoreError> {
        self.backups
            .lock()
            .expect("backup mutex poisoned")
            .push(backup);
        Ok(())
    }

    fn list(&self) -> Result<Vec<RuleBackup>, StoreError> {
        Ok(self.backups.lock().expect("backup mutex poisoned").clone())
    }
}

pub(super) struct UnavailableRuleStore;

impl RuleStore for UnavailableRuleStore {
    fn find_active_by_service_and_window(
        &self,
        _service: ServiceType,
        _as_of: NaiveDate,
    ) -> Result<Vec<Rule>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn find_by_id(&self, _id: &RuleId) -> Result<Option<Rule>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn find_by_category_and_priority(
        &self,
        _category: RuleCategory,
        _priority: u16,
        _exclude: Option<&RuleId>,
    ) -> Result<Option<Rule>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn insert(&self, _rule: Rule) -> Result<Rule, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _rule: Rule) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn soft_delete(&self, _id: &RuleId, _at: DateTime<Utc>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn deactivate_all(&self, _at: DateTime<Utc>) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn list_active(&self) -> Result<Vec<Rule>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
