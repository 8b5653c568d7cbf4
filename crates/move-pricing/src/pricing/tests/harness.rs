use super::common::*;
use crate::pricing::domain::{ActionType, Condition, ConditionOperator, ConditionValue, RuleCategory};
use crate::pricing::harness::{self, sample_context};

#[test]
fn dry_run_traces_conditions_and_reports_the_impact() {
    let rule = rule(
        "long-haul-fee",
        RuleCategory::Distance,
        50,
        vec![gte_condition("distanceKm", ConditionValue::Number(20.0))],
        vec![action(ActionType::AddFixed, 40.0, "totalPrice")],
    );

    // The built-in sample context drives a 25 km local move.
    let result = harness::test_rule(&rule, None);
    assert!(result.matched);
    assert_eq!(result.conditions_evaluated.len(), 1);
    assert!(result.conditions_evaluated[0].result);
    assert_eq!(
        result.conditions_evaluated[0].actual_value,
        Some(ConditionValue::Number(25.0))
    );
    assert_eq!(result.price_impact, Some(40.0));
    assert_eq!(
        result.actions_applied.as_ref().map(Vec::len),
        Some(1)
    );
    assert!(result.errors.is_empty());
}

#[test]
fn non_matching_rules_skip_action_application() {
    let rule = rule(
        "interstate-fee",
        RuleCategory::Distance,
        50,
        vec![gte_condition("distanceKm", ConditionValue::Number(500.0))],
        vec![action(ActionType::AddFixed, 900.0, "totalPrice")],
    );

    let result = harness::test_rule(&rule, Some(local_context()));
    assert!(!result.matched);
    assert!(!result.conditions_evaluated[0].result);
    assert!(result.actions_applied.is_none());
    assert!(result.price_impact.is_none());
}

#[test]
fn every_condition_is_traced_even_after_a_miss() {
    let rule = rule(
        "impossible-combo",
        RuleCategory::Timing,
        50,
        vec![
            eq_condition("isWeekend", ConditionValue::Flag(true)),
            gte_condition("crewSize", ConditionValue::Number(1.0)),
        ],
        vec![action(ActionType::AddFixed, 10.0, "totalPrice")],
    );

    let result = harness::test_rule(&rule, Some(local_context()));
    assert!(!result.matched);
    assert_eq!(result.conditions_evaluated.len(), 2);
    assert!(!result.conditions_evaluated[0].result);
    assert!(result.conditions_evaluated[1].result, "trace does not short-circuit");
}

#[test]
fn structural_errors_surface_without_failing_the_run() {
    let rule = rule(
        "broken-set-op",
        RuleCategory::Timing,
        50,
        vec![Condition {
            field: "season".to_string(),
            operator: ConditionOperator::In,
            value: None,
            values: None,
        }],
        vec![action(ActionType::AddFixed, 10.0, "totalPrice")],
    );

    // Both the up-front validation and the per-condition trace report the
    // missing values list.
    let result = harness::test_rule(&rule, None);
    assert!(!result.matched);
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors.iter().any(|error| error.contains("season")));
    assert!(result.actions_applied.is_none());
}

#[test]
fn invalid_rules_report_errors_instead_of_matching() {
    let no_conditions = rule(
        "half-built",
        RuleCategory::Timing,
        50,
        vec![],
        vec![action(ActionType::AddFixed, -10.0, "totalPrice")],
    );

    // A rule with nothing to evaluate must not dry-run as a clean success.
    let result = harness::test_rule(&no_conditions, None);
    assert!(!result.matched);
    assert!(!result.errors.is_empty());
    assert!(result.errors[0].contains("condition"));
    assert!(result.actions_applied.is_none());
    assert!(result.price_impact.is_none());

    let negative_amount = rule(
        "bad-discount",
        RuleCategory::Timing,
        50,
        vec![gte_condition("distanceKm", ConditionValue::Number(1.0))],
        vec![action(ActionType::SubtractFixed, -25.0, "totalPrice")],
    );

    let result = harness::test_rule(&negative_amount, None);
    assert!(!result.matched);
    assert!(result.errors.iter().any(|error| error.contains("amount")));
    assert!(result.actions_applied.is_none());
    // The condition itself still traces so the author sees what would match.
    assert_eq!(result.conditions_evaluated.len(), 1);
    assert!(result.conditions_evaluated[0].result);
}

#[test]
fn sample_context_is_a_plausible_local_move() {
    let context = sample_context();
    assert_eq!(context.base_price, 1000.0);
    assert_eq!(context.crew_size, 3);
    assert_eq!(
        context.resolve("serviceType"),
        Some(ConditionValue::Text("local_move".to_string()))
    );
}
