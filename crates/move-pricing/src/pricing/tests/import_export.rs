use super::common::*;
use crate::pricing::domain::{
    ActionType, ConditionValue, HistoryAction, RuleCategory, RuleId, EXPORT_FORMAT_VERSION,
};
use crate::pricing::store::BackupStore;
use crate::pricing::validator::{ConflictError, ValidationError};
use crate::pricing::{PricingServiceError, RuleUpdate};

fn seeded_service() -> (
    std::sync::Arc<
        crate::pricing::PricingService<MemoryRuleStore, MemoryHistoryStore, MemoryBackupStore>,
    >,
    std::sync::Arc<MemoryRuleStore>,
    std::sync::Arc<MemoryHistoryStore>,
    std::sync::Arc<MemoryBackupStore>,
) {
    let (service, rules, history, backups) = build_service();
    service
        .create_rule(
            draft(
                "weekend-surcharge",
                RuleCategory::Timing,
                100,
                vec![eq_condition("isWeekend", ConditionValue::Flag(true))],
                vec![action(ActionType::AddPercentage, 15.0, "totalPrice")],
            ),
            &admin(),
        )
        .expect("seed create succeeds");
    (service, rules, history, backups)
}

#[test]
fn export_wraps_the_active_set_and_records_history() {
    let (service, _, history, _) = seeded_service();
    service
        .set_rule_active(&RuleId("weekend-surcharge".to_string()), false, &admin())
        .expect("deactivate succeeds");
    service
        .create_rule(
            draft(
                "fuel-fee",
                RuleCategory::Distance,
                50,
                vec![gte_condition("distanceKm", ConditionValue::Number(20.0))],
                vec![action(ActionType::AddFixed, 40.0, "totalPrice")],
            ),
            &admin(),
        )
        .expect("create succeeds");

    let document = service.export_rules(&admin()).expect("export succeeds");
    assert_eq!(document.version, EXPORT_FORMAT_VERSION);
    assert_eq!(document.rules_count, 1);
    assert_eq!(document.rules[0].id.0, "fuel-fee");

    assert!(history
        .entries()
        .iter()
        .any(|entry| entry.action == HistoryAction::Exported
            && entry.rule_id.0 == "fuel-fee"));
}

#[test]
fn exported_rules_import_into_a_fresh_service_identically() {
    let (source, _, _, _) = seeded_service();
    let mut context = local_context();
    context.is_weekend = true;
    let before = source.estimate(&context).expect("estimate");

    let document = source.export_rules(&admin()).expect("export succeeds");

    let (target, _, _, _) = build_service();
    let summary = target
        .import_rules(document, &admin())
        .expect("import succeeds");
    assert_eq!(summary.imported, 1);
    assert_eq!(summary.deactivated, 0);

    let after = target.estimate(&context).expect("estimate");
    assert_eq!(before.totals, after.totals);
    assert_eq!(
        before.metadata.verification_hash,
        after.metadata.verification_hash
    );

    // Import is a fresh creation: version restarts at 1.0.0.
    let imported = target
        .get_rule(&RuleId("weekend-surcharge".to_string()))
        .expect("imported rule readable");
    assert_eq!(imported.version.to_string(), "1.0.0");
    let entries = target
        .rule_history(&imported.id, None)
        .expect("history readable");
    assert_eq!(entries[0].action, HistoryAction::Imported);
}

#[test]
fn import_replaces_the_active_set_behind_a_backup() {
    let (service, _, _, backups) = seeded_service();

    let mut replacement = service.export_rules(&admin()).expect("export succeeds");
    replacement.rules[0].id = RuleId("seasonal-surcharge".to_string());
    replacement.rules[0].conditions =
        vec![eq_condition("season", ConditionValue::Text("peak".to_string()))];

    let summary = service
        .import_rules(replacement, &admin())
        .expect("import succeeds");
    assert_eq!(summary.imported, 1);
    assert_eq!(summary.deactivated, 1);
    assert!(summary.backup_id.starts_with("backup-"));

    let saved = backups.list().expect("backups readable");
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].rule_count, 1);
    assert_eq!(saved[0].rules[0].id.0, "weekend-surcharge");

    // The old rule no longer prices anything.
    let mut context = local_context();
    context.is_weekend = true;
    let result = service.estimate(&context).expect("estimate");
    assert!(result.applied_rules.is_empty());

    let active = service.list_active_rules().expect("list readable");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id.0, "seasonal-surcharge");
}

#[test]
fn same_id_reimport_records_the_displaced_version() {
    let (service, _, history, backups) = seeded_service();
    let id = RuleId("weekend-surcharge".to_string());
    for amount in [16.0, 17.0] {
        service
            .update_rule(
                &id,
                RuleUpdate {
                    actions: Some(vec![action(
                        ActionType::AddPercentage,
                        amount,
                        "totalPrice",
                    )]),
                    ..RuleUpdate::default()
                },
                &admin(),
            )
            .expect("update succeeds");
    }

    let document = service.export_rules(&admin()).expect("export succeeds");
    service
        .import_rules(document, &admin())
        .expect("import succeeds");

    // The store keeps one record per id; the displaced 1.0.2 survives in the
    // backup and is named in the import's audit trail.
    let reimported = service.get_rule(&id).expect("rule readable");
    assert_eq!(reimported.version.to_string(), "1.0.0");
    let saved = backups.list().expect("backups readable");
    assert_eq!(saved[0].rules[0].version.to_string(), "1.0.2");

    let entry = history
        .entries()
        .iter()
        .find(|entry| entry.action == HistoryAction::Imported)
        .cloned()
        .expect("import entry recorded");
    let change = entry.changes.get("version").expect("version change recorded");
    assert_eq!(change.old, serde_json::Value::String("1.0.2".to_string()));
    assert_eq!(change.new, serde_json::Value::String("1.0.0".to_string()));
}

#[test]
fn invalid_document_aborts_before_any_mutation() {
    let (service, rules, _, backups) = seeded_service();

    let mut document = service.export_rules(&admin()).expect("export succeeds");
    let mut broken = document.rules[0].clone();
    broken.id = RuleId("broken".to_string());
    broken.priority = 200;
    broken.actions.clear();
    document.rules.push(broken);

    match service.import_rules(document, &admin()) {
        Err(PricingServiceError::ImportRejected { id, .. }) => assert_eq!(id.0, "broken"),
        other => panic!("expected import rejection, got {other:?}"),
    }

    // Nothing was touched: no backup, the existing rule is still active.
    assert!(backups.list().expect("backups readable").is_empty());
    let stored = rules.all();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].is_active);
}

#[test]
fn import_rejects_intra_document_conflicts() {
    let (service, _, _, backups) = seeded_service();
    let document = service.export_rules(&admin()).expect("export succeeds");

    let mut duplicate_ids = document.clone();
    duplicate_ids.rules.push(document.rules[0].clone());
    match service.import_rules(duplicate_ids, &admin()) {
        Err(PricingServiceError::Conflict(ConflictError::DuplicateId(id))) => {
            assert_eq!(id.0, "weekend-surcharge");
        }
        other => panic!("expected duplicate id, got {other:?}"),
    }

    let mut duplicate_slots = document.clone();
    let mut sibling = document.rules[0].clone();
    sibling.id = RuleId("weekend-sibling".to_string());
    duplicate_slots.rules.push(sibling);
    match service.import_rules(duplicate_slots, &admin()) {
        Err(PricingServiceError::Conflict(ConflictError::DuplicatePriority { .. })) => {}
        other => panic!("expected duplicate priority, got {other:?}"),
    }

    assert!(backups.list().expect("backups readable").is_empty());
}

#[test]
fn empty_import_documents_are_rejected() {
    let (service, _, _, _) = seeded_service();
    let mut document = service.export_rules(&admin()).expect("export succeeds");
    document.rules.clear();

    match service.import_rules(document, &admin()) {
        Err(PricingServiceError::Validation(ValidationError::EmptyImport)) => {}
        other => panic!("expected empty import rejection, got {other:?}"),
    }
}
