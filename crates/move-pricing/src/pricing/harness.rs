//! Dry-run harness for trying a rule against a context without persisting
//! anything or touching the live rule set.

use serde::{Deserialize, Serialize};

use super::actions::{self, CalculationState};
use super::domain::{AppliedAction, Condition, InputContext, Rule, SeasonalPeriod, ServiceType};
use super::evaluator;
use super::validator;

/// Per-condition trace: the condition as written, whether it matched, and the
/// operand the context actually resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionTrace {
    pub condition: Condition,
    pub result: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_value: Option<super::domain::ConditionValue>,
}

/// Full outcome of one dry run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTestResult {
    pub rule_id: super::domain::RuleId,
    pub rule_name: String,
    pub matched: bool,
    pub conditions_evaluated: Vec<ConditionTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions_applied: Option<Vec<AppliedAction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_impact: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Validate the candidate (capturing, not raising, any rejection), evaluate
/// every condition (no short-circuit, so the trace is complete), then apply
/// the actions against a throwaway state when everything matched. Structural
/// and validation errors land in `errors` and force `matched = false`.
pub fn test_rule(rule: &Rule, context: Option<InputContext>) -> RuleTestResult {
    let context = context.unwrap_or_else(sample_context);

    let mut traces = Vec::with_capacity(rule.conditions.len());
    let mut errors = Vec::new();
    let mut all_matched = true;

    if let Err(rejection) = validator::validate(rule) {
        errors.push(rejection.to_string());
    }

    for condition in &rule.conditions {
        match evaluator::evaluate(condition, &context) {
            Ok(outcome) => {
                all_matched &= outcome.matched;
                traces.push(ConditionTrace {
                    condition: condition.clone(),
                    result: outcome.matched,
                    actual_value: outcome.actual_value,
                });
            }
            Err(err) => {
                all_matched = false;
                errors.push(err.to_string());
                traces.push(ConditionTrace {
                    condition: condition.clone(),
                    result: false,
                    actual_value: None,
                });
            }
        }
    }

    let matched = all_matched && errors.is_empty();
    let (actions_applied, price_impact) = if matched {
        let mut state = CalculationState::seeded_from(&context);
        let (applied, warnings) = actions::apply(&rule.actions, &mut state, &context);
        errors.extend(warnings);
        let impact = applied.iter().map(|action| action.delta).sum();
        (Some(applied), Some(impact))
    } else {
        (None, None)
    };

    RuleTestResult {
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        matched,
        conditions_evaluated: traces,
        actions_applied,
        price_impact,
        errors,
    }
}

/// Representative mid-size local move used when the caller supplies no test
/// data of their own.
pub fn sample_context() -> InputContext {
    InputContext {
        service_type: ServiceType::LocalMove,
        move_date: chrono::NaiveDate::from_ymd_opt(2026, 6, 15).unwrap_or_default(),
        base_price: 1000.0,
        base_labor_cost: 400.0,
        total_weight_kg: 1200.0,
        total_volume_m3: 15.0,
        distance_km: 25.0,
        crew_size: 3,
        is_weekend: false,
        is_holiday: false,
        season: SeasonalPeriod::Standard,
        ..InputContext::default()
    }
}
