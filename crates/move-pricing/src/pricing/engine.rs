//! Priority-ordered rule evaluation over a frozen rule-set snapshot.
//!
//! Evaluation is a pure function of the snapshot and the input context: no
//! I/O, no clock reads that feed the outcome, private state per invocation.
//! Re-running with the same snapshot and context yields bit-identical totals
//! and an identical verification hash.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use super::actions::{self, CalculationState};
use super::domain::{
    AppliedRule, CalculationMetadata, CalculationResult, InputContext, Rule, RuleId, RuleVersion,
};
use super::evaluator;

pub struct PricingEngine;

impl PricingEngine {
    /// Run the full Seeded → Screening → Applying → Finalized pass.
    ///
    /// A malformed rule never aborts the calculation: it is skipped and the
    /// reason is recorded as a warning in the result metadata, because a price
    /// must always be producible even if one rule is misconfigured.
    pub fn evaluate(rules: &[Rule], context: &InputContext) -> CalculationResult {
        let mut warnings = Vec::new();

        // Screening: service type, activation, and validity window first,
        // then every condition must match.
        let mut matched: Vec<&Rule> = Vec::new();
        for rule in rules {
            if !rule.applies_to(context.service_type, context.move_date) {
                continue;
            }

            let mut all_matched = true;
            for condition in &rule.conditions {
                match evaluator::evaluate(condition, context) {
                    Ok(outcome) if outcome.matched => {}
                    Ok(_) => {
                        all_matched = false;
                        break;
                    }
                    Err(err) => {
                        warn!(rule = %rule.id, %err, "skipping malformed rule");
                        warnings.push(format!("rule '{}' skipped: {err}", rule.id));
                        all_matched = false;
                        break;
                    }
                }
            }
            if all_matched {
                matched.push(rule);
            }
        }

        // Applying: ascending priority; the stable sort preserves snapshot
        // order within equal priorities so ties stay deterministic.
        matched.sort_by_key(|rule| rule.priority);

        let mut state = CalculationState::seeded_from(context);
        let mut applied_rules = Vec::with_capacity(matched.len());
        for rule in &matched {
            let (applied, action_warnings) = actions::apply(&rule.actions, &mut state, context);
            warnings.extend(
                action_warnings
                    .into_iter()
                    .map(|warning| format!("rule '{}': {warning}", rule.id)),
            );
            let price_impact = applied.iter().map(|action| action.delta).sum();
            applied_rules.push(AppliedRule {
                rule_id: rule.id.clone(),
                price_impact,
            });
        }

        let totals = state.into_totals();
        let verification_hash = match verification_hash(&matched, context, &totals) {
            Ok(hash) => hash,
            Err(err) => {
                warnings.push(format!("verification hash unavailable: {err}"));
                String::new()
            }
        };

        CalculationResult {
            applied_rules,
            totals,
            metadata: CalculationMetadata {
                calculated_at: Utc::now(),
                deterministic: true,
                verification_hash,
                warnings,
            },
        }
    }
}

#[derive(Serialize)]
struct HashedRule<'a> {
    id: &'a RuleId,
    version: RuleVersion,
}

#[derive(Serialize)]
struct HashPreimage<'a> {
    applied: Vec<HashedRule<'a>>,
    context: &'a InputContext,
    totals: &'a BTreeMap<String, f64>,
}

/// Stable SHA-256 digest over the applied rule ids with their versions at
/// evaluation time, the full input context, and the final totals. The digest,
/// not the totals alone, proves the calculation is reproducible against a
/// specific rule-set version.
fn verification_hash(
    applied: &[&Rule],
    context: &InputContext,
    totals: &BTreeMap<String, f64>,
) -> Result<String, serde_json::Error> {
    let mut hashed: Vec<HashedRule<'_>> = applied
        .iter()
        .map(|rule| HashedRule {
            id: &rule.id,
            version: rule.version,
        })
        .collect();
    hashed.sort_by_key(|rule| rule.id.clone());

    let preimage = HashPreimage {
        applied: hashed,
        context,
        totals,
    };

    let bytes = serde_json::to_vec(&preimage)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{digest:x}"))
}
