//! Public data model: file entries, cache records, run options, and the payloads
//! a run streams out.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancellation::CancellationToken;

/// One file's metadata, attached to `Text`/`Binary`/`Image`/`Error` [`FileInfo`] variants.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    pub size: u64,
    /// Creation time, ISO 8601, when the platform exposes it (not all filesystems do).
    pub created: Option<String>,
    /// Last-modified time, ISO 8601.
    pub modified: String,
    /// Unix permission bits as an octal string, e.g. `"644"`.
    pub permissions: String,
    /// IANA timezone name used to render `created`/`modified`.
    pub timezone: String,
}

/// The classified content (or failure) of one file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum FileInfo {
    Text {
        encoding: String,
        content: String,
        metadata: Metadata,
    },
    Binary {
        content_base64: String,
        metadata: Metadata,
    },
    Image {
        content_base64: String,
        metadata: Metadata,
    },
    Excluded {
        reason: String,
        size: Option<u64>,
    },
    Error {
        message: String,
        exception_kind: String,
    },
}

/// One processed path: its location relative to the scanned root and its content/outcome.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FileEntry {
    /// Directory containing this file, relative to the scanned root (`""` for root-level files).
    pub parent: PathBuf,
    pub filename: String,
    pub info: FileInfo,
}

/// Row persisted in the Cache Store, keyed by the file's absolute resolved path.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CacheRecord {
    pub file_path: PathBuf,
    /// 64-bit content hash rendered as lowercase hex, matching the cross-implementation
    /// on-disk format (`file_hash TEXT`).
    pub file_hash: String,
    pub hash_algorithm: String,
    pub file_info: FileInfo,
    pub size: u64,
    /// Modification time in seconds since the Unix epoch (`mtime REAL`).
    pub mtime: f64,
}

/// Running tally maintained by the Traversal Walker.
#[derive(Clone, Debug, Default)]
pub struct TraversalCounters {
    pub included: u64,
    pub excluded: u64,
}

/// One path that failed to process, recorded in [`Summary::failed_files`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FailedFile {
    pub file: PathBuf,
    pub error: String,
}

/// Final payload of a run: totals and the list of failures.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Summary {
    pub total_files: u64,
    pub included_files: u64,
    pub excluded_files: u64,
    pub excluded_percentage: f64,
    pub processed_files: u64,
    pub failed_files: Vec<FailedFile>,
    pub stopped_early: bool,
    pub hash_algorithm: Option<String>,
}

/// One item in the sequence [`crate::run`] produces.
#[derive(Clone, Debug)]
pub enum Payload {
    Entries(Vec<FileEntry>),
    Summary(Summary),
}

/// Caller-supplied knobs for a run. Unset numeric fields are derived (thread count
/// from drive-type detection, pending-task bound from thread count and chunk size).
#[derive(Clone)]
pub struct RunOptions {
    pub root: PathBuf,
    /// Glob (or `regex:`-prefixed) exclude patterns, checked against both directory and file names.
    pub exclude: Vec<String>,
    /// Directory names excluded outright (pruned; contents never visited).
    pub excluded_folders: HashSet<String>,
    /// File names excluded outright.
    pub excluded_files: HashSet<String>,
    pub follow_links: bool,
    /// Files larger than this size (bytes) are excluded instead of read. `None` disables the limit.
    pub max_file_size: Option<u64>,
    /// Carry binary/image content instead of excluding it with `reason:"binary_or_image"`.
    pub include_binary: bool,
    /// Lowercase, dot-prefixed extensions (e.g. `".png"`) classified as images.
    pub image_extensions: HashSet<String>,
    /// Compute and cache content hashes for this run. `false` disables both hashing and the cache.
    pub hash_enabled: bool,
    /// Override worker thread count; `None` derives it from drive-type detection.
    pub threads: Option<usize>,
    /// Entries per emitted chunk.
    pub chunk_size: usize,
    /// Bound on in-flight scheduled-but-unharvested tasks; `None` derives from threads/chunk_size.
    pub max_pending_tasks: Option<usize>,
    /// Disable the Cache Store entirely for this run.
    pub cache_disabled: bool,
    /// Override the cache database path; defaults to `<root>/.repo_structure_cache.db`.
    pub cache_db_path: Option<PathBuf>,
    /// Cache size limit in megabytes before size-bounded eviction runs.
    pub cache_size_limit_mb: u64,
    /// IANA timezone used to render metadata timestamps; `None` uses the system timezone.
    pub timezone: Option<String>,
    pub cancellation: CancellationToken,
    /// Invoked with the number of files processed so far, from pipeline worker threads.
    pub progress: Option<std::sync::Arc<dyn Fn(u64) + Send + Sync>>,
}

impl RunOptions {
    pub fn new(root: impl AsRef<Path>, cancellation: CancellationToken) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            exclude: Vec::new(),
            excluded_folders: HashSet::new(),
            excluded_files: HashSet::new(),
            follow_links: false,
            max_file_size: None,
            include_binary: true,
            image_extensions: crate::classify::default_image_extensions(),
            hash_enabled: true,
            threads: None,
            chunk_size: crate::config::DEFAULT_CHUNK_SIZE,
            max_pending_tasks: None,
            cache_disabled: false,
            cache_db_path: None,
            cache_size_limit_mb: crate::config::CACHE_DEFAULT_SIZE_LIMIT_MB,
            timezone: None,
            cancellation,
            progress: None,
        }
    }

    pub fn effective_max_pending_tasks(&self, threads: usize) -> usize {
        self.max_pending_tasks.unwrap_or_else(|| {
            (threads * crate::config::PENDING_TASKS_PER_THREAD).max(self.chunk_size)
        })
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.cache_db_path
            .clone()
            .unwrap_or_else(|| self.root.join(crate::config::CACHE_DB_FILENAME))
    }
}

/// Cooperative wait helper shared by the Chunk Pipeline and the Streaming Bridge:
/// observe cancellation at most `poll` apart while blocking on `f`.
pub(crate) const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);
