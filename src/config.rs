//! Application configuration constants.
//! Tuning and thresholds in one place.

/// Name of the single cache database file created under the scanned root.
pub const CACHE_DB_FILENAME: &str = ".repo_structure_cache.db";

// ---- Worker threads ----

/// Thread limits for drive-type-based tuning.
/// Use [`WorkerThreadLimits::current()`] to fill `all_threads` from rayon; the rest are const.
#[derive(Clone, Copy, Debug)]
pub struct WorkerThreadLimits {
    /// Available threads (from rayon); set by [`WorkerThreadLimits::current()`].
    pub all_threads: usize,
    /// Max threads for HDD (spinning disk).
    pub hdd_max: usize,
    /// Floor / minimum for network or unknown (conservative).
    pub floor: usize,
    /// Max threads when drive type is unknown.
    pub unknown_max: usize,
    /// Max threads when drive type is network.
    pub network_max: usize,
}

impl Default for WorkerThreadLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            hdd_max: Self::HDD_THREADS,
            floor: Self::FLOOR_THREADS,
            unknown_max: Self::UNKNOWN_MAX_THREADS,
            network_max: Self::NETWORK_MAX_THREADS,
        }
    }
}

impl WorkerThreadLimits {
    pub const HDD_THREADS: usize = 4;
    pub const FLOOR_THREADS: usize = 2;
    pub const UNKNOWN_MAX_THREADS: usize = 8;
    pub const NETWORK_MAX_THREADS: usize = 12;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }
}

// ---- Hashing ----

/// Hashing I/O thresholds and buffer sizes.
pub struct HashingConsts;

impl HashingConsts {
    /// File size above which hashing uses memory-mapped I/O (bytes). 100 MB.
    pub const HASH_MMAP_THRESHOLD: u64 = 100 * 1024 * 1024;
    /// Logical chunk size for hashing (bytes). 64 KiB, matching the original hash service.
    pub const HASH_CHUNK_SIZE: usize = 64 * 1024;
}

/// Name persisted as `hash_algorithm` in the cache and in [`crate::types::Summary`],
/// matching the external interface's `hash_algorithm` value. The implementation is
/// `xxhash-rust`'s XXH3-64.
pub const HASH_ALGORITHM_NAME: &str = "xxhash";

// ---- Pattern service ----

/// Minimum size of the compiled-regex LRU in the Pattern/Exclusion Service.
pub const PATTERN_CACHE_MIN_CAPACITY: usize = 256;

// ---- Cache store ----

/// Cache write-batch tuning, taken from the original connection pool's write worker.
pub struct CacheWriterConsts;

impl CacheWriterConsts {
    /// Flush a batch once it reaches this many pending writes...
    pub const WRITE_BATCH_SIZE: usize = 100;
    /// ...or once this much time has elapsed since the first item in the batch, whichever first.
    pub const WRITE_BATCH_TIMEOUT_MS: u64 = 1000;
}

/// Connection pool sizing: `min(POOL_SIZE_CAP, worker_threads)`, one connection reserved as writer.
pub const CACHE_POOL_SIZE_CAP: usize = 3;

/// Size-bounded eviction target, as a fraction of the configured limit.
pub const CACHE_EVICTION_TARGET_FRACTION: f64 = 0.75;

/// Default cache size limit in megabytes when the caller does not override it.
pub const CACHE_DEFAULT_SIZE_LIMIT_MB: u64 = 1000;

// ---- Chunk pipeline ----

/// Default number of entries per emitted chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Default bound on in-flight (scheduled but not yet harvested) file-processing tasks,
/// expressed as a multiplier on thread count; floored by `chunk_size`.
pub const PENDING_TASKS_PER_THREAD: usize = 4;

// ---- Streaming bridge ----

/// Environment variable overriding the streaming bridge's bounded queue capacity.
pub const STREAM_CHUNK_ENV_VAR: &str = "SAMURAIZER_ASYNC_STREAM_CHUNK";

/// Default bounded queue capacity (in chunks) for the streaming bridge.
pub const DEFAULT_STREAM_CHUNK_CAP: usize = 256;

/// Read [`STREAM_CHUNK_ENV_VAR`] and fall back to [`DEFAULT_STREAM_CHUNK_CAP`] on absence or parse failure.
pub fn stream_chunk_capacity() -> usize {
    std::env::var(STREAM_CHUNK_ENV_VAR)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_STREAM_CHUNK_CAP)
}
