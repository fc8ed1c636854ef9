//! File Processor: stat, cache lookup, hash, classify, read, metadata, cache write.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::cache::CacheStore;
use crate::classify::{self, ContentKind};
use crate::hashing::{self, HASH_ALGORITHM_NAME};
use crate::types::{CacheRecord, FileEntry, FileInfo, Metadata, RunOptions};

const CLASSIFY_SAMPLE_SIZE: usize = 8192;

/// Process one absolute file path into a [`FileEntry`]. Never panics and never
/// returns `Err`; failures are carried as `FileInfo::Error`.
pub fn process_file(path: &Path, root: &Path, options: &RunOptions, cache: Option<&CacheStore>) -> FileEntry {
    let (parent, filename) = split_relative(path, root);

    let stat = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            return FileEntry {
                parent,
                filename,
                info: io_error_info(&e),
            };
        }
    };

    let size = stat.len();
    if let Some(limit) = options.max_file_size
        && size > limit
    {
        return FileEntry {
            parent,
            filename,
            info: FileInfo::Excluded {
                reason: "file_size".to_string(),
                size: Some(size),
            },
        };
    }

    let mtime_secs = mtime_seconds(&stat);
    let cache = cache.filter(|_| options.hash_enabled);

    if let Some(cache) = cache
        && let Some(record) = cache.get(path)
        && record.size == size
        && record.mtime == mtime_secs
        && record.hash_algorithm == HASH_ALGORITHM_NAME
    {
        return FileEntry {
            parent,
            filename,
            info: record.file_info,
        };
    }

    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            return FileEntry {
                parent,
                filename,
                info: io_error_info(&e),
            };
        }
    };

    let sample_len = bytes.len().min(CLASSIFY_SAMPLE_SIZE);
    let kind = classify::classify(path, &bytes[..sample_len], &options.image_extensions);

    if !options.include_binary && matches!(kind, ContentKind::Binary | ContentKind::Image) {
        return FileEntry {
            parent,
            filename,
            info: FileInfo::Excluded {
                reason: "binary_or_image".to_string(),
                size: Some(size),
            },
        };
    }

    let metadata = build_metadata(path, &stat, options.timezone.as_deref());

    let info = match kind {
        ContentKind::Text => {
            let (encoding, content) = classify::decode_text(&bytes);
            FileInfo::Text {
                encoding,
                content,
                metadata,
            }
        }
        ContentKind::Binary => FileInfo::Binary {
            content_base64: classify::encode_base64(&bytes),
            metadata,
        },
        ContentKind::Image => FileInfo::Image {
            content_base64: classify::encode_base64(&bytes),
            metadata,
        },
    };

    if let Some(cache) = cache {
        let file_hash = format!("{:016x}", hashing::hash_bytes(&bytes));
        cache.put(CacheRecord {
            file_path: path.to_path_buf(),
            file_hash,
            hash_algorithm: HASH_ALGORITHM_NAME.to_string(),
            file_info: info.clone(),
            size,
            mtime: mtime_secs,
        });
    }

    FileEntry {
        parent,
        filename,
        info,
    }
}

fn split_relative(path: &Path, root: &Path) -> (PathBuf, String) {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parent = rel.parent().unwrap_or(Path::new("")).to_path_buf();
    let filename = rel
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (parent, filename)
}

fn mtime_seconds(stat: &fs::Metadata) -> f64 {
    stat.modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn io_error_info(e: &std::io::Error) -> FileInfo {
    let kind = match e.kind() {
        std::io::ErrorKind::PermissionDenied => "permission_denied",
        std::io::ErrorKind::NotFound => "not_found",
        _ => "io_error",
    };
    FileInfo::Error {
        message: e.to_string(),
        exception_kind: kind.to_string(),
    }
}

fn build_metadata(path: &Path, stat: &fs::Metadata, timezone_override: Option<&str>) -> Metadata {
    let timezone = timezone_override
        .map(str::to_string)
        .or_else(|| iana_time_zone::get_timezone().ok())
        .unwrap_or_else(|| "UTC".to_string());

    let modified = stat
        .modified()
        .ok()
        .map(system_time_to_iso8601)
        .unwrap_or_default();
    let created = stat.created().ok().map(system_time_to_iso8601);

    let permissions = file_permissions_octal(path, stat);

    Metadata {
        size: stat.len(),
        created,
        modified,
        permissions,
        timezone,
    }
}

fn system_time_to_iso8601(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339()
}

#[cfg(unix)]
fn file_permissions_octal(_path: &Path, stat: &fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("{:o}", stat.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_permissions_octal(_path: &Path, stat: &fs::Metadata) -> String {
    if stat.permissions().readonly() {
        "444".to_string()
    } else {
        "644".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationTokenSource;
    use tempfile::tempdir;

    fn options(root: &Path) -> RunOptions {
        RunOptions::new(root, CancellationTokenSource::new().token())
    }

    #[test]
    fn processes_small_text_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("hello.txt");
        fs::write(&file, "hello world").unwrap();

        let entry = process_file(&file, dir.path(), &options(dir.path()), None);
        assert_eq!(entry.filename, "hello.txt");
        match entry.info {
            FileInfo::Text { content, .. } => assert_eq!(content, "hello world"),
            other => panic!("expected Text, got {other:?}"),
        }
    }

    #[test]
    fn excludes_oversized_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("big.bin");
        fs::write(&file, vec![0u8; 100]).unwrap();

        let mut opts = options(dir.path());
        opts.max_file_size = Some(10);
        let entry = process_file(&file, dir.path(), &opts, None);
        match entry.info {
            FileInfo::Excluded { reason, size } => {
                assert_eq!(reason, "file_size");
                assert_eq!(size, Some(100));
            }
            other => panic!("expected Excluded, got {other:?}"),
        }
    }

    #[test]
    fn file_exactly_at_the_limit_is_not_excluded() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("exact.bin");
        fs::write(&file, vec![0u8; 10]).unwrap();

        let mut opts = options(dir.path());
        opts.max_file_size = Some(10);
        let entry = process_file(&file, dir.path(), &opts, None);
        assert!(!matches!(entry.info, FileInfo::Excluded { .. }));
    }

    #[test]
    fn excludes_binary_content_when_include_binary_is_false() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("data.bin");
        fs::write(&file, [0u8, 1, 2, 3, 0, 5]).unwrap();

        let mut opts = options(dir.path());
        opts.include_binary = false;
        let entry = process_file(&file, dir.path(), &opts, None);
        match entry.info {
            FileInfo::Excluded { reason, .. } => assert_eq!(reason, "binary_or_image"),
            other => panic!("expected Excluded, got {other:?}"),
        }
    }

    #[test]
    fn hash_disabled_skips_cache_lookup_and_write() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("cached.txt");
        fs::write(&file, "cached content").unwrap();

        let cache = CacheStore::open(dir.path().join(".cache.db"), 1, 1000).unwrap();
        let mut opts = options(dir.path());
        opts.hash_enabled = false;

        let entry = process_file(&file, dir.path(), &opts, Some(&cache));
        assert!(cache.flush(std::time::Duration::from_secs(2)));
        assert!(cache.get(&file).is_none());
        match entry.info {
            FileInfo::Text { content, .. } => assert_eq!(content, "cached content"),
            other => panic!("expected Text, got {other:?}"),
        }
    }

    #[test]
    fn classifies_binary_content() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("data.bin");
        fs::write(&file, [0u8, 1, 2, 3, 0, 5]).unwrap();

        let entry = process_file(&file, dir.path(), &options(dir.path()), None);
        assert!(matches!(entry.info, FileInfo::Binary { .. }));
    }

    #[test]
    fn reports_missing_file_as_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("missing.txt");

        let entry = process_file(&file, dir.path(), &options(dir.path()), None);
        assert!(matches!(entry.info, FileInfo::Error { .. }));
    }

    #[test]
    fn cache_hit_reuses_stored_info_without_reread() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("cached.txt");
        fs::write(&file, "cached content").unwrap();

        let cache = CacheStore::open(dir.path().join(".cache.db"), 1, 1000).unwrap();
        let opts = options(dir.path());

        let first = process_file(&file, dir.path(), &opts, Some(&cache));
        assert!(cache.flush(std::time::Duration::from_secs(2)));

        // Remove read permission conceptually by truncating to a sentinel and restoring mtime
        // is unreliable across filesystems in a unit test; instead, verify the cache round
        // trip returns identical content for an unmodified file.
        let second = process_file(&file, dir.path(), &opts, Some(&cache));
        assert_eq!(first.info, second.info);
    }
}
