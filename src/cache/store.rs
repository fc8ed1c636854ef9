//! Cache Store: ties the connection pool, background writer, integrity check and
//! size-bounded eviction together behind a single handle.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rusqlite::Connection;

use super::pool::{ConnectionPool, open_connection, pool_size};
use super::schema::SELECT_SQL;
use super::writer::CacheWriter;
use crate::config::CACHE_EVICTION_TARGET_FRACTION;
use crate::types::CacheRecord;

pub struct CacheStore {
    pool: ConnectionPool,
    writer: CacheWriter,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl CacheStore {
    /// Open (or create) the cache database at `db_path`. Runs an integrity check
    /// first; a corrupt database is quarantined (renamed `.corrupt_<timestamp>`)
    /// and a fresh one is created in its place. Runs size-bounded eviction if the
    /// existing database already exceeds `size_limit_mb`.
    pub fn open(db_path: PathBuf, worker_threads: usize, size_limit_mb: u64) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create cache directory {}", parent.display()))?;
        }

        verify_integrity_or_quarantine(&db_path)?;
        evict_if_oversized(&db_path, size_limit_mb)?;

        let pool = ConnectionPool::new(&db_path, pool_size(worker_threads))?;
        let writer = CacheWriter::spawn(db_path.clone())?;

        Ok(Self {
            pool,
            writer,
            db_path,
        })
    }

    /// Look up a path's cached record. Returns `None` when the cache is disabled,
    /// the path has never been cached, or the row is malformed.
    pub fn get(&self, path: &Path) -> Option<CacheRecord> {
        if super::state::CacheStateBus::is_disabled() {
            return None;
        }
        let conn = self.pool.get();
        conn.query_row(SELECT_SQL, [path.to_string_lossy().as_ref()], |row| {
            let file_path: String = row.get(0)?;
            let file_hash: String = row.get(1)?;
            let hash_algorithm: String = row.get(2)?;
            let file_info_json: String = row.get(3)?;
            let size: i64 = row.get(4)?;
            let mtime: f64 = row.get(5)?;
            Ok((file_path, file_hash, hash_algorithm, file_info_json, size, mtime))
        })
        .ok()
        .and_then(|(file_path, file_hash, hash_algorithm, file_info_json, size, mtime)| {
            let file_info = serde_json::from_str(&file_info_json).ok()?;
            Some(CacheRecord {
                file_path: PathBuf::from(file_path),
                file_hash,
                hash_algorithm,
                file_info,
                size: size.max(0) as u64,
                mtime,
            })
        })
    }

    /// Queue a record for the background writer. Does nothing if the cache is disabled.
    pub fn put(&self, record: CacheRecord) {
        self.writer.queue_write(record);
    }

    /// Block until every queued write has been applied, or `timeout` elapses.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.writer.flush(timeout)
    }
}

fn verify_integrity_or_quarantine(db_path: &Path) -> Result<()> {
    if !db_path.exists() {
        return Ok(());
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("open cache database at {}", db_path.display()))?;
    let status: String = conn
        .query_row("PRAGMA integrity_check", [], |row| row.get(0))
        .unwrap_or_else(|_| "error".to_string());
    drop(conn);

    if status.eq_ignore_ascii_case("ok") {
        return Ok(());
    }

    log::warn!("cache database at {} failed integrity check: {status}", db_path.display());
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let quarantined = db_path.with_file_name(format!(
        "{}.corrupt_{timestamp}",
        db_path.file_name().unwrap_or_default().to_string_lossy()
    ));
    if let Err(e) = std::fs::rename(db_path, &quarantined) {
        log::error!("failed to quarantine corrupt cache database: {e}");
        let _ = std::fs::remove_file(db_path);
    } else {
        log::warn!("moved corrupt cache database to {}", quarantined.display());
    }
    Ok(())
}

/// Delete oldest-by-mtime rows until the database is back under
/// `size_limit_mb * CACHE_EVICTION_TARGET_FRACTION`, then compact and reopen.
fn evict_if_oversized(db_path: &Path, size_limit_mb: u64) -> Result<()> {
    if !db_path.exists() {
        return Ok(());
    }
    let size_mb = on_disk_size_mb(db_path);
    if size_mb <= size_limit_mb as f64 {
        return Ok(());
    }

    log::info!("cache database size ({size_mb:.2} MB) exceeds limit ({size_limit_mb} MB); evicting");
    let conn = open_connection(db_path)?;
    conn.execute_batch("PRAGMA journal_mode = DELETE;")?;

    let total: i64 = conn.query_row("SELECT COUNT(*) FROM cache", [], |r| r.get(0))?;
    let target_fraction = (size_limit_mb as f64 * CACHE_EVICTION_TARGET_FRACTION) / size_mb;
    let target_entries = ((total as f64) * target_fraction).floor().max(0.0) as i64;
    let to_delete = (total - target_entries).max(0);

    if to_delete > 0 {
        conn.execute(
            "DELETE FROM cache WHERE file_path IN \
             (SELECT file_path FROM cache ORDER BY mtime ASC LIMIT ?1)",
            [to_delete],
        )?;
    }
    conn.execute_batch("VACUUM;")?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;

    log::info!(
        "cache eviction removed {to_delete} of {total} entries; new size {:.2} MB",
        on_disk_size_mb(db_path)
    );
    Ok(())
}

fn on_disk_size_mb(db_path: &Path) -> f64 {
    let mut bytes = std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);
    for suffix in ["-wal", "-shm"] {
        let sidecar = db_path.with_file_name(format!(
            "{}{suffix}",
            db_path.file_name().unwrap_or_default().to_string_lossy()
        ));
        if let Ok(meta) = std::fs::metadata(&sidecar) {
            bytes += meta.len();
        }
    }
    bytes as f64 / (1024.0 * 1024.0)
}
