mod transaction;
mod versioned_schema;

pub use transaction::with_immediate_transaction;
pub use versioned_schema::{
    open_versioned_db, Column, SqlType, Table, VersionedSchema, BASE_DB_VERSION, BUSY_TIMEOUT,
    DEFAULT_TIMESTAMP,
};
