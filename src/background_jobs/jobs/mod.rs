//! Specific background job implementations.

pub mod car_name_sync;

pub use car_name_sync::{
    CarNameSyncJob, SyncError, SyncOutcome, SyncReport, SyncSettings, SYNC_LOCK_NAME,
};
