//! Storage collaborator contract for the alert-management core.
//!
//! The lifecycle handler and suppression engine run every multi-step
//! operation inside a single [`Txn`], committed only if every step succeeds.
//! Persistence itself lives behind the [`Dbase`] trait; [`mem::MemDb`] is the
//! in-memory reference implementation with snapshot-transaction semantics,
//! used by the test suites and for embedding.

pub mod error;
pub mod mem;


pub use error::{Result, StorageError};

use alertmgr_common::types::{Alert, SuppressionRule};

/// Named alert queries. The lifecycle handler never writes SQL; it selects
/// rows through these storage-defined predicates.
#[derive(Debug, Clone)]
pub enum AlertQuery {
    /// The single alert with this name, if any. Used for observation dedup.
    ByName(String),
    /// The alert with this storage identity.
    ById(i64),
    /// Alerts still `active` or `suppressed` whose last activity is older
    /// than the given age.
    Expired { older_than_secs: u64 },
    /// `active` alerts with no assigned owner, candidates for escalation.
    Unowned,
}

/// Named suppression-rule queries.
#[derive(Debug, Clone)]
pub enum RuleQuery {
    /// Non-expired rules, most recent first, bounded by `limit`.
    Active { limit: usize },
}

/// Handle to the persistence backend. Implementations must be safe to share
/// across tasks because the observation path and the sweep loops open
/// transactions concurrently.
pub trait Dbase: Send + Sync {
    fn new_tx(&self) -> Box<dyn Txn>;
}

/// A single logical database transaction. Writes are invisible to other
/// transactions until [`Txn::commit`]; dropping a transaction without
/// committing discards them.
pub trait Txn: Send {
    /// Inserts a new alert row and returns the assigned identity.
    fn insert_alert(&mut self, alert: &Alert) -> Result<i64>;

    /// Updates the row matching `alert.id`.
    fn update_alert(&mut self, alert: &Alert) -> Result<()>;

    /// Returns the first alert matching the query, or `None`.
    fn get_alert(&mut self, query: &AlertQuery) -> Result<Option<Alert>>;

    /// Returns every alert matching the query.
    fn select_alerts(&mut self, query: &AlertQuery) -> Result<Vec<Alert>>;

    /// Returns suppression rules matching the query.
    fn select_rules(&mut self, query: &RuleQuery) -> Result<Vec<SuppressionRule>>;

    /// Inserts a new suppression rule and returns the assigned identity.
    fn insert_rule(&mut self, rule: &SuppressionRule) -> Result<i64>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}

/// Runs `f` inside a fresh transaction: commit on `Ok`, roll back on `Err`.
///
/// The error type only has to be convertible from [`StorageError`] so callers
/// can run domain logic (with their own error enums) inside the unit of work.
pub fn with_tx<T, E, F>(db: &dyn Dbase, f: F) -> std::result::Result<T, E>
where
    E: From<StorageError>,
    F: FnOnce(&mut dyn Txn) -> std::result::Result<T, E>,
{
    let mut tx = db.new_tx();
    match f(tx.as_mut()) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rb) = tx.rollback() {
                tracing::warn!(error = %rb, "transaction rollback failed");
            }
            Err(err)
        }
    }
}
