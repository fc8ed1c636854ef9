//! Progressive Store: a temp-file-backed keyed map of path -> processed entry,
//! used by the Chunk Pipeline to accumulate a chunk's worth of entries before
//! assembling them (in path order) into a `Payload::Entries` batch.
//!
//! The backing file is created when the store is opened and removed when it
//! is dropped, even if the run fails partway through.

use anyhow::{Context, Result};
use rusqlite::Connection;
use tempfile::NamedTempFile;

use crate::types::FileEntry;

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS entries (
    path TEXT PRIMARY KEY,
    value TEXT NOT NULL
);";

/// Field order matters: `conn` must drop (closing the file) before `_temp`
/// removes it from disk.
pub struct ProgressiveStore {
    conn: Connection,
    _temp: NamedTempFile,
}

impl ProgressiveStore {
    pub fn open() -> Result<Self> {
        let temp = NamedTempFile::new().context("create progressive store temp file")?;
        let conn = Connection::open(temp.path())
            .with_context(|| format!("open progressive store at {}", temp.path().display()))?;
        conn.execute_batch(SCHEMA).context("create progressive store schema")?;
        Ok(Self { conn, _temp: temp })
    }

    /// Insert or replace a batch of entries in a single transaction.
    pub fn insert_batch(&mut self, entries: &[FileEntry]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT OR REPLACE INTO entries (path, value) VALUES (?1, ?2)")?;
            for entry in entries {
                let key = entry_key(entry);
                let value = serde_json::to_string(entry).context("serialize file entry")?;
                stmt.execute(rusqlite::params![key, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove every stored entry and return them ordered by path ascending.
    pub fn drain_sorted(&mut self) -> Result<Vec<FileEntry>> {
        self.drain_up_to(usize::MAX)
    }

    /// Remove up to `limit` entries (fewer if the store holds less) and return
    /// them ordered by path ascending, leaving any remainder in place.
    pub fn drain_up_to(&mut self, limit: usize) -> Result<Vec<FileEntry>> {
        let rows: Vec<(String, String)> = {
            let mut stmt = self
                .conn
                .prepare("SELECT path, value FROM entries ORDER BY path ASC LIMIT ?1")?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let mapped = stmt.query_map([limit], |row| Ok((row.get(0)?, row.get(1)?)))?;
            mapped.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM entries WHERE path = ?1")?;
            for (path, _) in &rows {
                stmt.execute([path])?;
            }
        }
        tx.commit()?;

        rows.into_iter()
            .map(|(_, value)| serde_json::from_str(&value).context("deserialize file entry"))
            .collect()
    }

    /// Number of entries currently buffered.
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0))?;
        Ok(count.max(0) as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn entry_key(entry: &FileEntry) -> String {
    entry.parent.join(&entry.filename).to_string_lossy().into_owned()
}
