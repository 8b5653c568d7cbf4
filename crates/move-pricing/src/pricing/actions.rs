//! Applies a matched rule's actions, in list order, to the running
//! calculation state.

use std::collections::BTreeMap;

use super::domain::{
    Action, ActionType, AppliedAction, Condition, ConditionOperator, ConditionValue, InputContext,
};
use super::evaluator;

/// Mutable accumulator map keyed by target field. The seed values are kept
/// separately because `set_percentage` is defined against the pre-engine seed,
/// not the running value.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationState {
    totals: BTreeMap<String, f64>,
    seeds: BTreeMap<String, f64>,
}

/// Accumulator fed by the context's base price.
pub const TOTAL_PRICE: &str = "totalPrice";
/// Accumulator fed by the context's base labor cost.
pub const LABOR_COST: &str = "laborCost";

impl CalculationState {
    pub fn seeded_from(context: &InputContext) -> Self {
        let mut seeds = BTreeMap::new();
        seeds.insert(TOTAL_PRICE.to_string(), context.base_price);
        seeds.insert(LABOR_COST.to_string(), context.base_labor_cost);
        Self {
            totals: seeds.clone(),
            seeds,
        }
    }

    pub fn value(&self, field: &str) -> f64 {
        self.totals.get(field).copied().unwrap_or(0.0)
    }

    fn seed(&self, field: &str) -> f64 {
        self.seeds.get(field).copied().unwrap_or(0.0)
    }

    fn set(&mut self, field: &str, value: f64) {
        self.totals.insert(field.to_string(), value);
    }

    pub fn into_totals(self) -> BTreeMap<String, f64> {
        self.totals
    }
}

/// Apply `actions` in list order. Each applied action is recorded with its
/// resulting delta; guard failures are reported as warnings and skipped.
pub fn apply(
    actions: &[Action],
    state: &mut CalculationState,
    context: &InputContext,
) -> (Vec<AppliedAction>, Vec<String>) {
    let mut applied = Vec::with_capacity(actions.len());
    let mut warnings = Vec::new();

    for action in actions {
        if let Some(guard) = action.condition.as_deref() {
            match guard_matches(guard, context) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    warnings.push(format!(
                        "action on '{}' skipped: {err}",
                        action.target_field
                    ));
                    continue;
                }
            }
        }

        let current = state.value(&action.target_field);
        let delta = match action.kind {
            ActionType::AddFixed => action.amount,
            ActionType::SubtractFixed => -action.amount,
            ActionType::AddPercentage => current * action.amount / 100.0,
            ActionType::SubtractPercentage => -(current * action.amount / 100.0),
            ActionType::Multiply => current * action.amount - current,
            ActionType::SetFixed => action.amount - current,
            ActionType::SetPercentage => {
                state.seed(&action.target_field) * action.amount / 100.0 - current
            }
        };

        state.set(&action.target_field, current + delta);
        applied.push(AppliedAction {
            target_field: action.target_field.clone(),
            description: action.description.clone(),
            delta,
        });
    }

    (applied, warnings)
}

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("guard '{0}' must have the shape '<field> <op> <literal>'")]
    Malformed(String),
    #[error("guard '{guard}' uses unknown operator '{operator}'")]
    UnknownOperator { guard: String, operator: String },
    #[error(transparent)]
    Evaluation(#[from] evaluator::EvaluationError),
}

/// Evaluate an intra-rule guard string (e.g. `"crewSize >= 4"`) against the
/// same context the rule's conditions saw.
fn guard_matches(guard: &str, context: &InputContext) -> Result<bool, GuardError> {
    let condition = parse_guard(guard)?;
    let outcome = evaluator::evaluate(&condition, context)?;
    Ok(outcome.matched)
}

fn parse_guard(guard: &str) -> Result<Condition, GuardError> {
    let mut tokens = guard.split_whitespace();
    let field = tokens
        .next()
        .ok_or_else(|| GuardError::Malformed(guard.to_string()))?;
    let operator = tokens
        .next()
        .ok_or_else(|| GuardError::Malformed(guard.to_string()))?;
    let literal = tokens.collect::<Vec<_>>().join(" ");
    if literal.is_empty() {
        return Err(GuardError::Malformed(guard.to_string()));
    }

    let operator = match operator {
        "==" | "=" => ConditionOperator::Eq,
        "!=" => ConditionOperator::Neq,
        ">" => ConditionOperator::Gt,
        ">=" => ConditionOperator::Gte,
        "<" => ConditionOperator::Lt,
        "<=" => ConditionOperator::Lte,
        other => {
            return Err(GuardError::UnknownOperator {
                guard: guard.to_string(),
                operator: other.to_string(),
            })
        }
    };

    Ok(Condition {
        field: field.to_string(),
        operator,
        value: Some(parse_literal(&literal)),
        values: None,
    })
}

fn parse_literal(raw: &str) -> ConditionValue {
    match raw {
        "true" => return ConditionValue::Flag(true),
        "false" => return ConditionValue::Flag(false),
        _ => {}
    }
    if let Ok(number) = raw.parse::<f64>() {
        return ConditionValue::Number(number);
    }
    if let Ok(date) = raw.parse::<chrono::NaiveDate>() {
        return ConditionValue::Date(date);
    }
    ConditionValue::Text(raw.trim_matches('\'').trim_matches('"').to_string())
}
