//! End-to-end scenarios run through the public `reposcan::run` entry point.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use reposcan::cache::CacheStore;
use reposcan::types::CacheRecord;
use reposcan::{CancellationTokenSource, FileInfo, Payload, RunOptions};

fn collect(options: RunOptions) -> (Vec<reposcan::FileEntry>, reposcan::Summary) {
    let mut entries = Vec::new();
    let mut summary = None;
    for payload in reposcan::run(options).unwrap() {
        match payload {
            Payload::Entries(e) => entries.extend(e),
            Payload::Summary(s) => summary = Some(s),
        }
    }
    (entries, summary.expect("exactly one summary payload"))
}

// S1 — tiny text file.
#[test]
fn tiny_text_file_round_trips_through_one_chunk_and_a_summary() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "hello").unwrap();

    let mut options = RunOptions::new(dir.path(), CancellationTokenSource::new().token());
    options.max_file_size = Some(1024);
    options.include_binary = false;
    options.image_extensions = HashSet::from([".png".to_string()]);
    options.threads = Some(2);
    options.chunk_size = 8;
    options.cache_disabled = true;

    let (entries, summary) = collect(options);
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.parent, PathBuf::from(""));
    assert_eq!(entry.filename, "a.txt");
    match &entry.info {
        FileInfo::Text { encoding, content, .. } => {
            assert_eq!(encoding, "utf-8");
            assert_eq!(content, "hello");
        }
        other => panic!("expected Text, got {other:?}"),
    }

    assert_eq!(summary.total_files, 1);
    assert_eq!(summary.included_files, 1);
    assert_eq!(summary.excluded_files, 0);
    assert_eq!(summary.processed_files, 1);
    assert!(summary.failed_files.is_empty());
    assert!(!summary.stopped_early);
    assert_eq!(summary.hash_algorithm.as_deref(), Some("xxhash"));
}

// S2 — binary excluded by policy; walker counts it included, processor excludes it downstream.
#[test]
fn binary_file_excluded_by_include_binary_policy() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.bin"), [0x00u8, 0x01, 0x02]).unwrap();

    let mut options = RunOptions::new(dir.path(), CancellationTokenSource::new().token());
    options.max_file_size = Some(1024);
    options.include_binary = false;
    options.cache_disabled = true;

    let (entries, summary) = collect(options);
    assert_eq!(entries.len(), 1);
    match &entries[0].info {
        FileInfo::Excluded { reason, .. } => assert_eq!(reason, "binary_or_image"),
        other => panic!("expected Excluded, got {other:?}"),
    }
    assert_eq!(summary.included_files, 1);
    assert_eq!(summary.excluded_files, 0);
}

// S3 — excluded folder is pruned; its contents are never counted.
#[test]
fn excluded_folder_is_pruned_and_its_contents_uncounted() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("node_modules")).unwrap();
    fs::write(dir.path().join("node_modules/x.txt"), "x").unwrap();
    fs::write(dir.path().join("a.txt"), "a").unwrap();

    let mut options = RunOptions::new(dir.path(), CancellationTokenSource::new().token());
    options.excluded_folders = HashSet::from(["node_modules".to_string()]);
    options.cache_disabled = true;

    let (entries, summary) = collect(options);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].filename, "a.txt");
    assert_eq!(summary.total_files, 1);
    assert_eq!(summary.included_files, 1);
    assert_eq!(summary.excluded_files, 0);
}

// S4 — over-size text file.
#[test]
fn oversize_text_file_is_excluded_with_file_size_reason() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("big.txt"), vec![b'x'; 10]).unwrap();

    let mut options = RunOptions::new(dir.path(), CancellationTokenSource::new().token());
    options.max_file_size = Some(5);
    options.cache_disabled = true;

    let (entries, _summary) = collect(options);
    assert_eq!(entries.len(), 1);
    match &entries[0].info {
        FileInfo::Excluded { reason, size } => {
            assert_eq!(reason, "file_size");
            assert_eq!(*size, Some(10));
        }
        other => panic!("expected Excluded, got {other:?}"),
    }
}

// S5 — cache hit: a pre-populated record with a matching (size, mtime, hash_algorithm)
// is returned verbatim without the run re-deriving it from the real file content. The
// cached info deliberately disagrees with the file's actual content so a fall-through
// re-read/re-classify would be visible as a different result.
#[test]
fn cache_hit_returns_stored_info_without_rereading_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.txt");
    fs::write(&file, "hello").unwrap();
    let stat = fs::metadata(&file).unwrap();
    let size = stat.len();
    let mtime_secs = stat
        .modified()
        .unwrap()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs_f64();

    let cache_db = dir.path().join(".repo_structure_cache.db");
    let cache = CacheStore::open(cache_db.clone(), 1, 1000).unwrap();
    let stale_info = FileInfo::Text {
        encoding: "utf-8".to_string(),
        content: "STALE CACHED VALUE, NOT THE REAL FILE CONTENT".to_string(),
        metadata: reposcan::Metadata {
            size,
            created: None,
            modified: "2020-01-01T00:00:00Z".to_string(),
            permissions: "644".to_string(),
            timezone: "UTC".to_string(),
        },
    };
    cache.put(CacheRecord {
        file_path: file.clone(),
        file_hash: "0000000000000000".to_string(),
        hash_algorithm: "xxhash".to_string(),
        file_info: stale_info.clone(),
        size,
        mtime: mtime_secs,
    });
    assert!(cache.flush(Duration::from_secs(2)));
    drop(cache);

    let mut options = RunOptions::new(dir.path(), CancellationTokenSource::new().token());
    options.cache_db_path = Some(cache_db);

    let (entries, _summary) = collect(options);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].info, stale_info);
}

// S6 — cancellation mid-run bounds how many of many files get processed.
#[test]
fn cancellation_mid_run_bounds_processed_files() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..1000 {
        fs::write(dir.path().join(format!("file{i}.txt")), "hello").unwrap();
    }

    let cancel_source = CancellationTokenSource::new();
    let mut options = RunOptions::new(dir.path(), cancel_source.token());
    options.threads = Some(1);
    options.cache_disabled = true;

    let cancel_source_for_progress = cancel_source.clone();
    options.progress = Some(std::sync::Arc::new(move |count| {
        if count >= 10 {
            cancel_source_for_progress.cancel();
        }
    }));

    let iter = reposcan::run(options).unwrap();
    let mut summary = None;
    for payload in iter {
        if let Payload::Summary(s) = payload {
            summary = Some(s);
        }
    }

    let summary = summary.expect("run must still emit a summary when cancelled");
    assert!(summary.stopped_early);
    assert!(summary.processed_files >= 10);
    assert!(summary.processed_files < 1000);
}
