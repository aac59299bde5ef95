//! A small blocking-`Connection` pool over `rusqlite`, tuned for concurrent
//! access (WAL journal, NORMAL sync, large cache/mmap).

use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, OpenFlags};
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tracing::info;

use super::StoreError;

pub struct ConnectionPool {
    connections: Mutex<Vec<Arc<Mutex<Connection>>>>,
    semaphore: Semaphore,
    database_path: std::path::PathBuf,
    max_connections: usize,
}

impl ConnectionPool {
    pub fn open(database_path: &Path, max_connections: usize) -> Result<Self, StoreError> {
        let pool = Self {
            connections: Mutex::new(Vec::new()),
            semaphore: Semaphore::new(max_connections),
            database_path: database_path.to_path_buf(),
            max_connections,
        };
        pool.prime()?;
        Ok(pool)
    }

    fn prime(&self) -> Result<(), StoreError> {
        let mut connections = self.connections.blocking_lock();
        for _ in 0..std::cmp::min(2, self.max_connections) {
            connections.push(Arc::new(Mutex::new(self.create_connection()?)));
        }
        info!(count = connections.len(), "primed sqlite connection pool");
        Ok(())
    }

    fn create_connection(&self) -> Result<Connection, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&self.database_path, flags)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "cache_size", -64000)?;
        conn.pragma_update(None, "temp_store", "memory")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    pub async fn get(&self) -> Result<PooledConnection<'_>, StoreError> {
        let permit = self.semaphore.acquire().await.expect("semaphore never closed");

        let conn = loop {
            let existing = {
                let mut connections = self.connections.lock().await;
                connections.pop()
            };
            if let Some(conn) = existing {
                break conn;
            }

            let current_count = self.connections.lock().await.len();
            if current_count < self.max_connections {
                break Arc::new(Mutex::new(self.create_connection()?));
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        };

        Ok(PooledConnection {
            connection: Some(conn),
            pool: &self.connections,
            _permit: permit,
        })
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }
}

pub struct PooledConnection<'a> {
    connection: Option<Arc<Mutex<Connection>>>,
    pool: &'a Mutex<Vec<Arc<Mutex<Connection>>>>,
    _permit: SemaphorePermit<'a>,
}

impl<'a> PooledConnection<'a> {
    pub async fn with<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError>,
    {
        let conn = self.connection.as_ref().expect("connection present until drop");
        let guard = conn.lock().await;
        f(&guard)
    }

    pub async fn with_tx<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<R, StoreError>,
    {
        let conn = self.connection.as_ref().expect("connection present until drop");
        let mut guard = conn.lock().await;
        let tx = guard.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

impl<'a> Drop for PooledConnection<'a> {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            if let Ok(mut pool) = self.pool.try_lock() {
                pool.push(conn);
            }
        }
    }
}
