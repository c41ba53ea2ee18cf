use crate::error::{Result, ScholaragError};
use rusqlite::Connection;
use std::path::Path;
use tokio::task;

pub mod migrate;

/// Handle to the embedded graph+vector store.
///
/// Constructed once in `main` and dependency-injected into the request
/// handling context; there is no process-wide singleton. Each call opens a
/// short-lived connection on a blocking task, so concurrent sessions never
/// contend on a shared connection (WAL mode allows parallel readers).
pub struct Db {
    path: std::path::PathBuf,
}

impl Db {
    /// Create a new store handle for the given database path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    fn open(path: &Path) -> Result<Connection> {
        let conn = Connection::open(path)
            .map_err(|e| ScholaragError::StoreUnavailable(format!("{}: {}", path.display(), e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; \
             PRAGMA foreign_keys = ON; \
             PRAGMA temp_store = MEMORY;",
        )?;

        Ok(conn)
    }

    /// Open a connection with the standard pragmas applied
    pub fn open_connection(&self) -> Result<Connection> {
        Self::open(&self.path)
    }

    /// Execute a closure with a store connection on a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut conn = Self::open(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| ScholaragError::StoreUnavailable(format!("store task failed: {}", e)))?
    }

    /// Probe store connectivity; used by the readiness endpoint.
    pub async fn health_check(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
        .map(|_| ())
    }
}
