use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use rusqlite::{Connection, Transaction};

use crate::schema;
use crate::{Error, Result};

// NOTE: Concurrency contract
//
// One connection behind a mutex is the single writer lane; every
// mutation goes through write_tx and is therefore serialized and
// transactional. A small pool of extra connections serves reads, which
// WAL mode lets proceed while a write is in flight. Readers fall back
// to the writer connection when the pool is exhausted, so an in-memory
// store (private to one connection) simply runs with an empty pool.

const READER_POOL_SIZE: usize = 3;

pub struct Store {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    cursor: AtomicUsize,
    path: Option<PathBuf>,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let writer = Connection::open(db_path)?;
        configure(&writer)?;
        schema::init_schema(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open(db_path)?;
            configure(&conn)?;
            readers.push(Mutex::new(conn));
        }

        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            cursor: AtomicUsize::new(0),
            path: Some(db_path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let writer = Connection::open_in_memory()?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        schema::init_schema(&writer)?;

        Ok(Self {
            writer: Mutex::new(writer),
            readers: Vec::new(),
            cursor: AtomicUsize::new(0),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a read-only operation on a pooled connection. Reads do not
    /// contend with each other; a saturated pool falls back to the
    /// writer connection.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        for offset in 0..self.readers.len() {
            let slot = (start + offset) % self.readers.len();
            if let Ok(conn) = self.readers[slot].try_lock() {
                return f(&conn);
            }
        }
        let conn = self.writer.lock().map_err(poisoned)?;
        f(&conn)
    }

    /// Run a mutation inside one transaction on the single writer lane.
    /// The transaction commits when `f` returns Ok and rolls back on
    /// drop otherwise, so a failed multi-row operation never partially
    /// applies.
    pub fn write_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.writer.lock().map_err(poisoned)?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Trivial query proving the database answers.
    pub fn health_check(&self) -> Result<()> {
        self.read(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
    }

    pub fn db_size_bytes(&self) -> Result<u64> {
        self.read(|conn| {
            let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
            let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
            Ok(page_count as u64 * page_size as u64)
        })
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> Error {
    Error::Query("store lock poisoned".to_string())
}
