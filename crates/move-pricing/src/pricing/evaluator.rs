//! Evaluates a single condition against an input context.
//!
//! Comparisons fail closed: a non-comparable operand pair yields
//! `matched = false` rather than an error, so one odd rule cannot take the
//! whole calculation down. Only structurally malformed conditions (a set
//! operator without values, a scalar operator without a value) surface as
//! [`EvaluationError`], which the engine downgrades to a warning.

use std::cmp::Ordering;

use super::domain::{Condition, ConditionOperator, ConditionValue, InputContext};

/// Outcome of evaluating one condition, including the resolved operand so
/// traces and the test harness can show what was actually compared.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionOutcome {
    pub matched: bool,
    pub actual_value: Option<ConditionValue>,
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("condition on '{field}' uses operator {operator:?} without a values set")]
    MissingValues {
        field: String,
        operator: ConditionOperator,
    },
    #[error("condition on '{field}' uses operator {operator:?} without a comparison value")]
    MissingValue {
        field: String,
        operator: ConditionOperator,
    },
}

pub fn evaluate(
    condition: &Condition,
    context: &InputContext,
) -> Result<ConditionOutcome, EvaluationError> {
    let actual = context.resolve(&condition.field);

    if condition.operator.requires_values() {
        let values = condition
            .values
            .as_deref()
            .filter(|values| !values.is_empty())
            .ok_or_else(|| EvaluationError::MissingValues {
                field: condition.field.clone(),
                operator: condition.operator,
            })?;

        let member = actual
            .as_ref()
            .map(|actual| values.contains(actual))
            .unwrap_or(false);
        let matched = match condition.operator {
            ConditionOperator::In => member,
            ConditionOperator::NotIn => !member,
            _ => unreachable!("requires_values covers exactly the set operators"),
        };
        return Ok(ConditionOutcome {
            matched,
            actual_value: actual,
        });
    }

    let expected = condition
        .value
        .as_ref()
        .ok_or_else(|| EvaluationError::MissingValue {
            field: condition.field.clone(),
            operator: condition.operator,
        })?;

    let matched = match condition.operator {
        ConditionOperator::Eq => actual.as_ref() == Some(expected),
        // An undefined field is a legitimate operand: neq against any present
        // value succeeds.
        ConditionOperator::Neq => actual.as_ref() != Some(expected),
        ConditionOperator::Gt => ordering_matches(actual.as_ref(), expected, Ordering::is_gt),
        ConditionOperator::Gte => ordering_matches(actual.as_ref(), expected, Ordering::is_ge),
        ConditionOperator::Lt => ordering_matches(actual.as_ref(), expected, Ordering::is_lt),
        ConditionOperator::Lte => ordering_matches(actual.as_ref(), expected, Ordering::is_le),
        ConditionOperator::Contains => contains(actual.as_ref(), expected),
        ConditionOperator::StartsWith => text_pair(actual.as_ref(), expected)
            .map(|(actual, expected)| actual.starts_with(expected))
            .unwrap_or(false),
        ConditionOperator::EndsWith => text_pair(actual.as_ref(), expected)
            .map(|(actual, expected)| actual.ends_with(expected))
            .unwrap_or(false),
        ConditionOperator::In | ConditionOperator::NotIn => {
            unreachable!("set operators handled above")
        }
    };

    Ok(ConditionOutcome {
        matched,
        actual_value: actual,
    })
}

/// Numeric/ordinal comparison across matching kinds; anything else fails closed.
fn compare(actual: &ConditionValue, expected: &ConditionValue) -> Option<Ordering> {
    match (actual, expected) {
        (ConditionValue::Number(actual), ConditionValue::Number(expected)) => {
            actual.partial_cmp(expected)
        }
        (ConditionValue::Date(actual), ConditionValue::Date(expected)) => {
            Some(actual.cmp(expected))
        }
        (ConditionValue::Text(actual), ConditionValue::Text(expected)) => {
            Some(actual.cmp(expected))
        }
        _ => None,
    }
}

fn ordering_matches(
    actual: Option<&ConditionValue>,
    expected: &ConditionValue,
    accepts: fn(Ordering) -> bool,
) -> bool {
    actual
        .and_then(|actual| compare(actual, expected))
        .map(accepts)
        .unwrap_or(false)
}

/// Substring test for text, membership test for lists.
fn contains(actual: Option<&ConditionValue>, expected: &ConditionValue) -> bool {
    match (actual, expected) {
        (Some(ConditionValue::Text(actual)), ConditionValue::Text(expected)) => {
            actual.contains(expected.as_str())
        }
        (Some(ConditionValue::List(items)), expected) => items.contains(expected),
        _ => false,
    }
}

fn text_pair<'a>(
    actual: Option<&'a ConditionValue>,
    expected: &'a ConditionValue,
) -> Option<(&'a str, &'a str)> {
    match (actual, expected) {
        (Some(ConditionValue::Text(actual)), ConditionValue::Text(expected)) => {
            Some((actual.as_str(), expected.as_str()))
        }
        _ => None,
    }
}
