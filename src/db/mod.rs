pub mod migrations;
pub mod query;
pub mod schema;

pub use query::{IntervalFilter, IntervalPages};

use crate::error::{AppError, Result};
use log::warn;
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable store for intervals, settings and focus sessions.
///
/// All writes go through one connection behind a mutex and run inside an
/// `IMMEDIATE` transaction, so writers are serialized here and across processes
/// (SQLite's write lock). Readers use their own connections via [`Store::reader`]
/// and see committed snapshots only (WAL mode).
pub struct Store {
    path: PathBuf,
    writer: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_busy_timeout(path, BUSY_TIMEOUT)
    }

    /// Open with a custom wait for SQLite's write lock. Past it, writes fail with
    /// [`AppError::StoreUnavailable`].
    pub fn open_with_busy_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        migrations::run(&conn)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_writer(&self) -> MutexGuard<'_, Connection> {
        match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Store: writer mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Run `f` inside a single write transaction. Nothing is committed unless `f`
    /// returns `Ok`.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.lock_writer();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Open an independent read-only connection.
    pub fn reader(&self) -> Result<StoreReader> {
        StoreReader::open(&self.path)
    }

    /// Fold the WAL back into the main database file.
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.lock_writer();
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }
}

/// Read-only view of the store. Each reader owns its connection, so readers never
/// wait on the writer mutex.
pub struct StoreReader {
    conn: Connection,
}

impl StoreReader {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AppError::NotFound { entity: "Database" });
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        configure(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run several reads against one consistent snapshot.
    pub fn snapshot<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(&tx)?;
        tx.finish()?;
        Ok(value)
    }

    /// Lazily page through closed intervals matching `filter`, ordered by start.
    pub fn intervals(&self, filter: IntervalFilter) -> IntervalPages<'_> {
        IntervalPages::new(&self.conn, filter)
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}
