//! Structural validation gating every create/update, plus the active
//! (category, priority) uniqueness check.

use super::domain::{ConditionValue, Rule, RuleCategory, RuleId};

pub const PRIORITY_MIN: u16 = 1;
pub const PRIORITY_MAX: u16 = 1000;

/// Rejection of a structurally incomplete or inconsistent rule. Raised before
/// any persistence; a failing rule is never partially stored.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("rule id must be provided")]
    MissingId,
    #[error("rule name must be provided")]
    MissingName,
    #[error("rule must declare at least one condition")]
    EmptyConditions,
    #[error("rule must declare at least one action")]
    EmptyActions,
    #[error("rule must apply to at least one service type")]
    EmptyServices,
    #[error("priority {0} is outside {PRIORITY_MIN}..={PRIORITY_MAX}")]
    PriorityOutOfRange(u16),
    #[error("condition #{index}: field must be provided")]
    ConditionMissingField { index: usize },
    #[error("condition #{index}: set operator requires a non-empty values list")]
    ConditionMissingValues { index: usize },
    #[error("condition #{index}: operator requires a comparison value")]
    ConditionMissingValue { index: usize },
    #[error("condition #{index}: operator cannot apply to a {found} operand")]
    OperandMismatch { index: usize, found: &'static str },
    #[error("action #{index}: amount must be >= 0, found {amount}")]
    NegativeAmount { index: usize, amount: f64 },
    #[error("action #{index}: targetField must be provided")]
    MissingTargetField { index: usize },
    #[error("import document must contain a non-empty rules array")]
    EmptyImport,
}

/// Duplicate identity or duplicate active slot; rejected before persistence.
#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    #[error("rule '{0}' already exists")]
    DuplicateId(RuleId),
    #[error(
        "active rule '{existing}' already occupies priority {priority} in category {category:?}"
    )]
    DuplicatePriority {
        existing: RuleId,
        category: RuleCategory,
        priority: u16,
    },
}

/// Structural completeness checks, in the documented order: identity, then
/// conditions, then actions.
pub fn validate(rule: &Rule) -> Result<(), ValidationError> {
    if rule.id.0.trim().is_empty() {
        return Err(ValidationError::MissingId);
    }
    if rule.name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }
    if rule.conditions.is_empty() {
        return Err(ValidationError::EmptyConditions);
    }
    if rule.actions.is_empty() {
        return Err(ValidationError::EmptyActions);
    }
    if rule.applicable_services.is_empty() {
        return Err(ValidationError::EmptyServices);
    }
    if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&rule.priority) {
        return Err(ValidationError::PriorityOutOfRange(rule.priority));
    }

    for (index, condition) in rule.conditions.iter().enumerate() {
        if condition.field.trim().is_empty() {
            return Err(ValidationError::ConditionMissingField { index });
        }

        if condition.operator.requires_values() {
            let has_values = condition
                .values
                .as_ref()
                .map(|values| !values.is_empty())
                .unwrap_or(false);
            if !has_values {
                return Err(ValidationError::ConditionMissingValues { index });
            }
            continue;
        }

        let value = condition
            .value
            .as_ref()
            .ok_or(ValidationError::ConditionMissingValue { index })?;

        // Closed operand kinds let impossible pairings die here instead of
        // resurfacing as runtime surprises.
        if condition.operator.is_textual() {
            let acceptable = match condition.operator {
                super::domain::ConditionOperator::Contains => !matches!(
                    value,
                    ConditionValue::List(_) | ConditionValue::Flag(_)
                ),
                _ => matches!(value, ConditionValue::Text(_)),
            };
            if !acceptable {
                return Err(ValidationError::OperandMismatch {
                    index,
                    found: value.kind(),
                });
            }
        }
        if condition.operator.is_ordering()
            && matches!(value, ConditionValue::Flag(_) | ConditionValue::List(_))
        {
            return Err(ValidationError::OperandMismatch {
                index,
                found: value.kind(),
            });
        }
    }

    for (index, action) in rule.actions.iter().enumerate() {
        if !(action.amount >= 0.0) {
            return Err(ValidationError::NegativeAmount {
                index,
                amount: action.amount,
            });
        }
        if action.target_field.trim().is_empty() {
            return Err(ValidationError::MissingTargetField { index });
        }
    }

    Ok(())
}

/// No other active rule may share the candidate's (category, priority). The
/// candidate's own id is excluded so updates do not collide with themselves;
/// inactive and soft-deleted rules never participate.
pub fn ensure_priority_available(candidate: &Rule, existing: &[Rule]) -> Result<(), ConflictError> {
    if !candidate.is_active {
        return Ok(());
    }

    let occupant = existing.iter().find(|rule| {
        rule.id != candidate.id
            && rule.is_active
            && rule.deleted_at.is_none()
            && rule.category == candidate.category
            && rule.priority == candidate.priority
    });

    match occupant {
        Some(rule) => Err(ConflictError::DuplicatePriority {
            existing: rule.id.clone(),
            category: candidate.category,
            priority: candidate.priority,
        }),
        None => Ok(()),
    }
}
