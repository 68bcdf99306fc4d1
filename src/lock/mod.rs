//! Cluster-wide lease lock.
//!
//! Instances share nothing but the catalog database, so mutual exclusion for the
//! sync job is a row in that database with an expiry. A crashed holder simply
//! stops renewing and the row becomes acquirable once `expires_at` passes.

mod sqlite_lock;

pub use sqlite_lock::SqliteLockProvider;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub name: String,
    pub holder: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAcquisition {
    Granted(LockRecord),
    AlreadyHeld,
}

impl LockAcquisition {
    pub fn is_granted(&self) -> bool {
        matches!(self, LockAcquisition::Granted(_))
    }
}

pub trait LockProvider: Send + Sync {
    /// Take the lock if nobody holds an unexpired lease on `name`.
    ///
    /// Must be a single conditional write so two instances can never both
    /// observe a free lock and both proceed.
    fn try_acquire(&self, name: &str, holder: &str, lease: Duration) -> Result<LockAcquisition>;

    /// Give the lock back. Returns `false`, without error, when `holder` no
    /// longer owns it (for example after the lease expired and someone else
    /// took over).
    fn release(&self, name: &str, holder: &str) -> Result<bool>;

    /// The unexpired lease on `name`, if any.
    fn current_holder(&self, name: &str) -> Result<Option<LockRecord>>;
}
