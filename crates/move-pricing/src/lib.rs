//! Deterministic pricing rule engine for moving-service estimates.
//!
//! The `pricing` module holds the rule data model, evaluation engine, and the
//! administrative lifecycle (validation, versioning, history, import/export).
//! Persistence stays behind the store traits in [`pricing::store`] so the
//! engine itself remains a pure function of a rule-set snapshot and an input
//! context.

pub mod config;
pub mod error;
pub mod pricing;
pub mod telemetry;
