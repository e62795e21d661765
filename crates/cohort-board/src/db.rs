//! SQLite database setup for the shared board file.
//!
//! The [`Database`] struct wraps a `rusqlite::Connection` behind an
//! `Arc<Mutex<>>` and exposes async methods that use
//! `tokio::task::spawn_blocking` to avoid blocking the async runtime.
//!
//! WAL mode plus a busy timeout let several board handles — including ones
//! in other processes — share the same file: readers never block the
//! writer, and a second writer waits instead of failing.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{BoardError, BoardResult};

/// Thread-safe handle to a SQLite database.
///
/// All read/write operations go through [`Database::execute`] /
/// [`Database::execute_mut`], which dispatch onto the blocking thread pool.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database at `path` and apply pragmas.
    ///
    /// This call blocks briefly (file I/O); call it during startup or wrap
    /// it in `spawn_blocking` yourself.
    pub fn open(path: impl AsRef<Path>) -> BoardResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening board database");

        let conn = Connection::open(path)?;
        Self::apply_pragmas(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database — useful for tests.
    pub fn open_in_memory() -> BoardResult<Self> {
        debug!("opening in-memory board database");

        let conn = Connection::open_in_memory()?;
        Self::apply_pragmas(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Execute a closure against the connection on the blocking pool.
    ///
    /// This is the primary way to interact with the database from async
    /// code. The closure receives a `&Connection` and must return a
    /// `BoardResult<T>`.
    pub async fn execute<F, T>(&self, f: F) -> BoardResult<T>
    where
        F: FnOnce(&Connection) -> BoardResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| BoardError::TaskJoin(format!("mutex poisoned: {e}")))?;
            f(&conn)
        })
        .await?
    }

    /// Execute a mutable closure (for transactions) on the blocking pool.
    pub async fn execute_mut<F, T>(&self, f: F) -> BoardResult<T>
    where
        F: FnOnce(&mut Connection) -> BoardResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| BoardError::TaskJoin(format!("mutex poisoned: {e}")))?;
            f(&mut conn)
        })
        .await?
    }

    // ── pragmas ──────────────────────────────────────────────────────

    fn apply_pragmas(conn: &Connection) -> BoardResult<()> {
        // WAL mode: concurrent readers, non-blocking writes. In-memory
        // databases report "memory" here; the pragma call still succeeds.
        conn.pragma_update(None, "journal_mode", "WAL")?;

        // NORMAL sync is safe with WAL — a power failure loses at most the
        // last transaction, never the file.
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        // Concurrent writers wait instead of failing immediately.
        conn.pragma_update(None, "busy_timeout", 5_000_i32)?;

        debug!("board database pragmas applied (WAL, busy_timeout 5s)");
        Ok(())
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_works() {
        let db = Database::open_in_memory().unwrap();
        let version: String = db
            .execute(|conn| {
                let v: String = conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))?;
                Ok(v)
            })
            .await
            .unwrap();
        assert!(!version.is_empty());
    }

    #[tokio::test]
    async fn two_handles_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");

        let a = Database::open(&path).unwrap();
        a.execute(|conn| {
            conn.execute("CREATE TABLE t (v TEXT)", [])?;
            conn.execute("INSERT INTO t (v) VALUES ('x')", [])?;
            Ok(())
        })
        .await
        .unwrap();

        let b = Database::open(&path).unwrap();
        let count: i64 = b
            .execute(|conn| {
                let c: i64 = conn.query_row("SELECT count(*) FROM t", [], |row| row.get(0))?;
                Ok(c)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
