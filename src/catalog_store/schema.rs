//! SQLite schema for the shared catalog database.
//!
//! The same file holds the car name catalog and the lease table used to
//! coordinate the sync job across instances.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

// =============================================================================
// Version 1 - Car names and sync lock
// =============================================================================

/// Car names table. `manufacturer_key` / `model_key` hold the case-folded
/// names and carry the uniqueness constraint.
pub const CAR_NAME_TABLE_V1: Table = Table {
    name: "car_name",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            auto_increment = true
        ),
        sqlite_column!("manufacturer", &SqlType::Text, non_null = true),
        sqlite_column!("model", &SqlType::Text, non_null = true),
        sqlite_column!("manufacturer_key", &SqlType::Text, non_null = true),
        sqlite_column!("model_key", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[&["manufacturer_key", "model_key"]],
};

/// Lease records, one row per lock name. Timestamps are unix milliseconds.
pub const SYNC_LOCK_TABLE_V1: Table = Table {
    name: "sync_lock",
    columns: &[
        sqlite_column!("name", &SqlType::Text, is_primary_key = true),
        sqlite_column!("holder", &SqlType::Text, non_null = true),
        sqlite_column!("locked_at", &SqlType::Integer, non_null = true),
        sqlite_column!("expires_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub static CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[CAR_NAME_TABLE_V1, SYNC_LOCK_TABLE_V1],
    migration: None,
}];
