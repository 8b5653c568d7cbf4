use chrono::{DateTime, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use move_pricing::pricing::domain::{
    Action, ActionType, Actor, Condition, ConditionOperator, ConditionValue, HistoryEntry, Rule,
    RuleBackup, RuleCategory, RuleDraft, RuleId, SeasonalPeriod, ServiceType,
};
use move_pricing::pricing::store::{
    BackupStore, HistoryStore, RuleStore, StoreError, HISTORY_RETENTION_DAYS,
};
use move_pricing::pricing::{PricingService, PricingServiceError};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Insertion-ordered rule storage. Snapshot order is the deterministic
/// tie-break for rules sharing a priority, so a Vec beats a map here.
#[derive(Default, Clone)]
pub(crate) struct InMemoryRuleStore {
    rules: Arc<Mutex<Vec<Rule>>>,
}

impl RuleStore for InMemoryRuleStore {
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
pub(crate) struct InMemoryHistoryStore {
    entries: Arc<Mutex<Vec<HistoryEntry>>>,
}

impl HistoryStore for InMemoryHistoryStore {
    fn append(&self, entry: HistoryEntry) -> Result<(), StoreError> {
        let mut guard = self.entries.lock().expect("history mutex poisoned");
        let horizon = entry.timestamp - chrono::Duration::days(HISTORY_RETENTION_DAYS);
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
pub(crate) struct InMemoryBackupStore {
    backups: Arc<Mutex<Vec<RuleBackup>>>,
}

impl BackupStore for InMemoryBackupStore {
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

pub(crate) type InMemoryPricingService =
    PricingService<InMemoryRuleStore, InMemoryHistoryStore, InMemoryBackupStore>;

pub(crate) fn build_pricing_service() -> Arc<InMemoryPricingService> {
    Arc::new(PricingService::new(
        Arc::new(InMemoryRuleStore::default()),
        Arc::new(InMemoryHistoryStore::default()),
        Arc::new(InMemoryBackupStore::default()),
    ))
}

/// Starter rule set covering the common moving surcharges, loaded on boot so a
/// fresh instance prices something sensible.
pub(crate) fn seed_rule_set(
    service: &InMemoryPricingService,
) -> Result<usize, PricingServiceError> {
    let actor = Actor::system();
    let seeds = seed_drafts();
    let count = seeds.len();
    for draft in seeds {
        service.create_rule(draft, &actor)?;
    }
    Ok(count)
}

fn seed_drafts() -> Vec<RuleDraft> {
    let all_services = BTreeSet::from([
        ServiceType::LocalMove,
        ServiceType::LongDistanceMove,
        ServiceType::OfficeMove,
        ServiceType::PackingOnly,
        ServiceType::StorageMove,
    ]);
    let transport_services = BTreeSet::from([
        ServiceType::LocalMove,
        ServiceType::LongDistanceMove,
        ServiceType::OfficeMove,
    ]);

    vec![
        RuleDraft {
            id: RuleId("weekend-surcharge".to_string()),
            name: "Weekend surcharge".to_string(),
            description: "Saturday and Sunday crews bill at a premium".to_string(),
            notes: String::new(),
            category: RuleCategory::Timing,
            priority: 100,
            conditions: vec![condition(
                "isWeekend",
                ConditionOperator::Eq,
                ConditionValue::Flag(true),
            )],
            actions: vec![percentage_action(15.0, "weekend premium")],
            is_active: true,
            applicable_services: all_services.clone(),
            effective_date: None,
            expiry_date: None,
        },
        RuleDraft {
            id: RuleId("peak-season-surcharge".to_string()),
            name: "Peak season surcharge".to_string(),
            description: "Summer demand pricing".to_string(),
            notes: String::new(),
            category: RuleCategory::Timing,
            priority: 110,
            conditions: vec![condition(
                "season",
                ConditionOperator::Eq,
                ConditionValue::Text(SeasonalPeriod::Peak.label().to_string()),
            )],
            actions: vec![percentage_action(10.0, "peak season premium")],
            is_active: true,
            applicable_services: all_services.clone(),
            effective_date: None,
            expiry_date: None,
        },
        RuleDraft {
            id: RuleId("long-haul-fee".to_string()),
            name: "Long haul fee".to_string(),
            description: "Flat fee once the route passes 50 km".to_string(),
            notes: String::new(),
            category: RuleCategory::Distance,
            priority: 200,
            conditions: vec![condition(
                "distanceKm",
                ConditionOperator::Gte,
                ConditionValue::Number(50.0),
            )],
            actions: vec![fixed_action(120.0, "long haul fee")],
            is_active: true,
            applicable_services: transport_services.clone(),
            effective_date: None,
            expiry_date: None,
        },
        RuleDraft {
            id: RuleId("heavy-load-surcharge".to_string()),
            name: "Heavy load surcharge".to_string(),
            description: String::new(),
            notes: String::new(),
            category: RuleCategory::WeightVolume,
            priority: 300,
            conditions: vec![condition(
                "totalWeightKg",
                ConditionOperator::Gte,
                ConditionValue::Number(2500.0),
            )],
            actions: vec![
                percentage_action(8.0, "heavy load premium"),
                Action {
                    kind: ActionType::AddPercentage,
                    amount: 12.0,
                    target_field: "laborCost".to_string(),
                    description: "extra crew time".to_string(),
                    condition: None,
                },
            ],
            is_active: true,
            applicable_services: transport_services.clone(),
            effective_date: None,
            expiry_date: None,
        },
        RuleDraft {
            id: RuleId("piano-handling".to_string()),
            name: "Piano handling".to_string(),
            description: "Specialist crew and rigging for pianos".to_string(),
            notes: String::new(),
            category: RuleCategory::SpecialItems,
            priority: 400,
            conditions: vec![condition(
                "specialItems.piano",
                ConditionOperator::Gte,
                ConditionValue::Number(1.0),
            )],
            actions: vec![Action {
                kind: ActionType::AddFixed,
                amount: 250.0,
                target_field: "totalPrice".to_string(),
                description: "piano rigging".to_string(),
                // Walk-ups without an elevator double the rigging crew.
                condition: Some("pickupAccess.hasElevator == false".to_string()),
            }],
            is_active: true,
            applicable_services: transport_services.clone(),
            effective_date: None,
            expiry_date: None,
        },
        RuleDraft {
            id: RuleId("stair-carry-fee".to_string()),
            name: "Stair carry fee".to_string(),
            description: "Per-move fee for pickup addresses above the second floor".to_string(),
            notes: String::new(),
            category: RuleCategory::LocationHandicaps,
            priority: 500,
            conditions: vec![
                condition(
                    "pickupAccess.floorLevel",
                    ConditionOperator::Gte,
                    ConditionValue::Number(3.0),
                ),
                condition(
                    "pickupAccess.hasElevator",
                    ConditionOperator::Eq,
                    ConditionValue::Flag(false),
                ),
            ],
            actions: vec![fixed_action(90.0, "stair carry")],
            is_active: true,
            applicable_services: transport_services,
            effective_date: None,
            expiry_date: None,
        },
    ]
}

fn condition(field: &str, operator: ConditionOperator, value: ConditionValue) -> Condition {
    Condition {
        field: field.to_string(),
        operator,
        value: Some(value),
        values: None,
    }
}

fn fixed_action(amount: f64, description: &str) -> Action {
    Action {
        kind: ActionType::AddFixed,
        amount,
        target_field: "totalPrice".to_string(),
        description: description.to_string(),
        condition: None,
    }
}

fn percentage_action(amount: f64, description: &str) -> Action {
    Action {
        kind: ActionType::AddPercentage,
        amount,
        target_field: "totalPrice".to_string(),
        description: description.to_string(),
        condition: None,
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_service(raw: &str) -> Result<ServiceType, String> {
    match raw.trim() {
        "local_move" => Ok(ServiceType::LocalMove),
        "long_distance_move" => Ok(ServiceType::LongDistanceMove),
        "office_move" => Ok(ServiceType::OfficeMove),
        "packing_only" => Ok(ServiceType::PackingOnly),
        "storage_move" => Ok(ServiceType::StorageMove),
        other => Err(format!(
            "unknown service type '{other}' (expected local_move, long_distance_move, office_move, packing_only, or storage_move)"
        )),
    }
}

pub(crate) fn parse_season(raw: &str) -> Result<SeasonalPeriod, String> {
    match raw.trim() {
        "low" => Ok(SeasonalPeriod::Low),
        "standard" => Ok(SeasonalPeriod::Standard),
        "peak" => Ok(SeasonalPeriod::Peak),
        other => Err(format!(
            "unknown season '{other}' (expected low, standard, or peak)"
        )),
    }
}
