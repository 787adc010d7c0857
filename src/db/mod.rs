mod records;
mod schema;
mod sqlite;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::Result;

pub use records::{
    resolve, FailureEntry, ImageRecord, NewRecord, RecordStatus, Resolution, StatusCounts,
};
pub use schema::SCHEMA;

/// The record store: durable per-image metadata, the single source of truth.
///
/// One SQLite connection behind a mutex. Every public operation takes the lock
/// once, and operations touching more than one row or column run inside a
/// transaction, so concurrent callers never see a half-applied write.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// A private in-memory store, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
