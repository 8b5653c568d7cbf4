//! Persistence collaborators. The engine and service only see these traits so
//! the crate stays storage-agnostic; the API binary and the tests provide
//! in-memory implementations.

use chrono::{DateTime, NaiveDate, Utc};

use super::domain::{HistoryEntry, Rule, RuleBackup, RuleCategory, RuleId, ServiceType};

/// History entries older than this horizon may be pruned by the store.
pub const HISTORY_RETENTION_DAYS: i64 = 730;

/// Default page size for per-rule history queries.
pub const HISTORY_DEFAULT_LIMIT: usize = 50;

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Rule persistence abstraction.
pub trait RuleStore: Send + Sync {
    /// Active, non-deleted rules applicable to `service` whose validity window
    /// covers `as_of`, in insertion order (the order is the deterministic
    /// tie-break for equal priorities).
    fn find_active_by_service_and_window(
        &self,
        service: ServiceType,
        as_of: NaiveDate,
    ) -> Result<Vec<Rule>, StoreError>;

    fn find_by_id(&self, id: &RuleId) -> Result<Option<Rule>, StoreError>;

    /// The active, non-deleted occupant of (category, priority), if any,
    /// excluding `exclude` so updates do not collide with themselves.
    fn find_by_category_and_priority(
        &self,
        category: RuleCategory,
        priority: u16,
        exclude: Option<&RuleId>,
    ) -> Result<Option<Rule>, StoreError>;

    fn insert(&self, rule: Rule) -> Result<Rule, StoreError>;

    /// Replace the stored rule carrying the same id.
    fn update(&self, rule: Rule) -> Result<(), StoreError>;

    /// Mark inactive and deletion-timestamped without removing the record.
    fn soft_delete(&self, id: &RuleId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Soft-delete every currently active rule, returning how many were hit.
    fn deactivate_all(&self, at: DateTime<Utc>) -> Result<usize, StoreError>;

    fn list_active(&self) -> Result<Vec<Rule>, StoreError>;
}

/// Append-only audit trail abstraction.
pub trait HistoryStore: Send + Sync {
    fn append(&self, entry: HistoryEntry) -> Result<(), StoreError>;

    /// Newest-first entries for one rule, bounded to `limit`.
    fn query_by_rule_id(&self, id: &RuleId, limit: usize) -> Result<Vec<HistoryEntry>, StoreError>;
}

/// Snapshot storage for pre-import backups.
pub trait BackupStore: Send + Sync {
    fn save(&self, backup: RuleBackup) -> Result<(), StoreError>;

    fn list(&self) -> Result<Vec<RuleBackup>, StoreError>;
}
