//! Deterministic pricing rule engine for moving-service estimates.
//!
//! A rule pairs conditions over the request context with priority-ordered
//! price actions. The engine evaluates a frozen snapshot of the active rule
//! set, so the same context and rules always reproduce the same totals and
//! verification hash. Administration (versioned updates, soft deletes,
//! activation, history, import/export with pre-import backups) lives in the
//! service layer behind storage traits.

pub(crate) mod actions;
pub mod domain;
pub(crate) mod evaluator;
pub mod engine;
pub mod harness;
pub mod router;
pub mod service;
pub mod store;
pub mod validator;

#[cfg(test)]
mod tests;

pub use domain::{
    AccessDifficulty, AccessProfile, Action, ActionType, Actor, AppliedAction, AppliedRule,
    CalculationMetadata, CalculationResult, Condition, ConditionOperator, ConditionValue,
    FieldChange, HistoryAction, HistoryEntry, InputContext, Rule, RuleBackup, RuleCategory,
    RuleDraft, RuleId, RuleSetDocument, RuleUpdate, RuleVersion, SeasonalPeriod, ServiceType,
    EXPORT_FORMAT_VERSION,
};
pub use engine::PricingEngine;
pub use harness::{ConditionTrace, RuleTestResult};
pub use router::pricing_router;
pub use service::{ImportSummary, PricingService, PricingServiceError};
pub use store::{
    BackupStore, HistoryStore, RuleStore, StoreError, HISTORY_DEFAULT_LIMIT,
    HISTORY_RETENTION_DAYS,
};
pub use validator::{ConflictError, ValidationError, PRIORITY_MAX, PRIORITY_MIN};
