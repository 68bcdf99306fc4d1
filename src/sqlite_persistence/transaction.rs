use anyhow::Result;
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Runs `f` inside a `BEGIN IMMEDIATE` transaction.
///
/// Taking the write lock up front means a second process waits on the busy
/// timeout instead of failing with `SQLITE_BUSY` when both try to upgrade a
/// read lock at the same time.
pub fn with_immediate_transaction<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Transaction) -> Result<T>,
) -> Result<T> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let result = f(&tx)?;
    tx.commit()?;
    Ok(result)
}
