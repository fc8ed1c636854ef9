//! Cache Store schema and WAL tuning. One file: `<root>/.repo_structure_cache.db`.

/// `cache` table plus the hash-algorithm index named by the spec's external interface.
pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache (
    file_path TEXT PRIMARY KEY,
    file_hash TEXT,
    hash_algorithm TEXT,
    file_info TEXT NOT NULL,
    size INTEGER NOT NULL,
    mtime REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_hash_algorithm ON cache(hash_algorithm);
"#;

/// Busy timeout of >=20s, applied after `PRAGMA journal_mode = WAL`.
pub(crate) const WAL_PRAGMAS: &str = r#"
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 20000;
PRAGMA wal_autocheckpoint = 1000;
"#;

pub(crate) const UPSERT_SQL: &str = "INSERT OR REPLACE INTO cache \
    (file_path, file_hash, hash_algorithm, file_info, size, mtime) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

pub(crate) const SELECT_SQL: &str =
    "SELECT file_path, file_hash, hash_algorithm, file_info, size, mtime FROM cache WHERE file_path = ?1";
