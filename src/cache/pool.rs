//! Bounded connection pool for cache reads. Pool size is `min(3, worker_threads)`;
//! one connection is reserved by the writer (see `writer.rs`), the rest serve reads.

use std::path::Path;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, bounded};
use rusqlite::Connection;

use super::schema::{SCHEMA, WAL_PRAGMAS};
use crate::config::CACHE_POOL_SIZE_CAP;

pub(crate) fn pool_size(worker_threads: usize) -> usize {
    CACHE_POOL_SIZE_CAP.min(worker_threads.max(1))
}

pub(crate) fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("open cache database at {}", path.display()))?;
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        .context("enable WAL on cache database")?;
    conn.execute_batch(WAL_PRAGMAS)
        .context("set cache WAL pragmas")?;
    conn.execute_batch(SCHEMA).context("create cache schema")?;
    Ok(conn)
}

pub struct ConnectionPool {
    tx: Sender<Connection>,
    rx: Receiver<Connection>,
}

impl ConnectionPool {
    pub fn new(path: &Path, size: usize) -> Result<Self> {
        let (tx, rx) = bounded(size.max(1));
        for _ in 0..size.max(1) {
            tx.send(open_connection(path)?)
                .expect("freshly created bounded channel has capacity");
        }
        Ok(Self { tx, rx })
    }

    /// Borrow a connection, blocking until one is returned if the pool is exhausted.
    pub fn get(&self) -> PooledConnection<'_> {
        let conn = self
            .rx
            .recv()
            .expect("pool sender is held by this struct for its entire lifetime");
        PooledConnection {
            conn: Some(conn),
            tx: &self.tx,
        }
    }
}

pub struct PooledConnection<'a> {
    conn: Option<Connection>,
    tx: &'a Sender<Connection>,
}

impl std::ops::Deref for PooledConnection<'_> {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        self.conn.as_ref().unwrap()
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = self.tx.send(conn);
        }
    }
}
