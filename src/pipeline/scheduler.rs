//! Scheduler: spawns the walk thread, a worker pool, and an assembler thread
//! that turns processed entries into `{entries}`/`{summary}` payloads.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::cache::CacheStore;
use crate::config::{HASH_ALGORITHM_NAME, WorkerThreadLimits};
use crate::disk_detect::determine_threads_for_drive;
use crate::pattern::PatternService;
use crate::processor::process_file;
use crate::progressive_store::ProgressiveStore;
use crate::types::{FailedFile, FileEntry, FileInfo, Payload, RunOptions, Summary, TraversalCounters};
use crate::walk::{NameExclusions, spawn_walk_thread};

const PAYLOAD_CHANNEL_CAP: usize = 4;

/// Handles for a running pipeline. Drain `payload_rx` to completion, then call
/// [`PipelineHandles::join`] to wait for every worker thread to exit.
pub struct PipelineHandles {
    pub payload_rx: Receiver<Payload>,
    walk_handle: JoinHandle<()>,
    worker_handles: Vec<JoinHandle<()>>,
    assembler_handle: JoinHandle<()>,
}

impl PipelineHandles {
    pub fn join(self) {
        let _ = self.walk_handle.join();
        for h in self.worker_handles {
            let _ = h.join();
        }
        let _ = self.assembler_handle.join();
    }

    /// Hand off just the payload channel, detaching the pipeline's threads
    /// (they keep running and exit on their own once the run finishes or is
    /// cancelled; nothing blocks on them here).
    pub fn into_payload_receiver(self) -> Receiver<Payload> {
        self.payload_rx
    }
}

pub fn spawn_pipeline(
    options: RunOptions,
    patterns: Arc<PatternService>,
    cache: Option<Arc<CacheStore>>,
) -> PipelineHandles {
    let root = options.root.clone();
    let threads = options.threads.unwrap_or_else(|| {
        determine_threads_for_drive(&root, WorkerThreadLimits::current().all_threads).0
    });
    let pending_bound = options.effective_max_pending_tasks(threads.max(1));

    let (path_tx, path_rx) = bounded::<PathBuf>(pending_bound);
    let (entry_tx, entry_rx) = bounded::<FileEntry>(pending_bound);
    let (payload_tx, payload_rx) = bounded::<Payload>(PAYLOAD_CHANNEL_CAP);

    let counters = Arc::new(Mutex::new(TraversalCounters::default()));
    let cache_db_path = options.cache_db_path();
    let exclude_paths = vec![
        cache_db_path.clone(),
        sidecar_path(&cache_db_path, "-wal"),
        sidecar_path(&cache_db_path, "-shm"),
    ];

    let names = NameExclusions {
        folders: options.excluded_folders.clone(),
        files: options.excluded_files.clone(),
    };
    let walk_handle = spawn_walk_thread(
        root.clone(),
        Arc::clone(&patterns),
        names,
        options.follow_links,
        exclude_paths,
        path_tx,
        Arc::clone(&counters),
        options.cancellation.clone(),
    );

    let processed = Arc::new(AtomicU64::new(0));
    let worker_handles: Vec<JoinHandle<()>> = (0..threads.max(1))
        .map(|_| {
            let path_rx = path_rx.clone();
            let entry_tx = entry_tx.clone();
            let root = root.clone();
            let options = options.clone();
            let cache = cache.clone();
            let processed = Arc::clone(&processed);
            thread::spawn(move || {
                worker_loop(&path_rx, &entry_tx, &root, &options, cache.as_deref(), &processed);
            })
        })
        .collect();
    drop(entry_tx);
    drop(path_rx);

    let assembler_options = options.clone();
    let assembler_counters = Arc::clone(&counters);
    let assembler_handle = thread::spawn(move || {
        run_assembler(entry_rx, payload_tx, &assembler_options, &assembler_counters);
    });

    PipelineHandles {
        payload_rx,
        walk_handle,
        worker_handles,
        assembler_handle,
    }
}

fn sidecar_path(db_path: &Path, suffix: &str) -> PathBuf {
    db_path.with_file_name(format!(
        "{}{suffix}",
        db_path.file_name().unwrap_or_default().to_string_lossy()
    ))
}

/// Pull paths and process them until the channel closes or cancellation is
/// observed. A path already pulled off the channel always finishes processing;
/// only the *next* pull is skipped once cancellation is requested, bounding the
/// overshoot to at most one in-flight file per worker.
fn worker_loop(
    path_rx: &Receiver<PathBuf>,
    entry_tx: &Sender<FileEntry>,
    root: &Path,
    options: &RunOptions,
    cache: Option<&CacheStore>,
    processed: &AtomicU64,
) {
    loop {
        if options.cancellation.is_cancellation_requested() {
            break;
        }
        let path = match path_rx.recv() {
            Ok(p) => p,
            Err(_) => break,
        };
        let entry = process_file(&path, root, options, cache);
        let count = processed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(cb) = &options.progress {
            cb(count);
        }
        if entry_tx.send(entry).is_err() {
            break;
        }
    }
}

fn run_assembler(
    entry_rx: Receiver<FileEntry>,
    payload_tx: Sender<Payload>,
    options: &RunOptions,
    counters: &Arc<Mutex<TraversalCounters>>,
) {
    let mut store = match ProgressiveStore::open() {
        Ok(s) => s,
        Err(e) => {
            log::error!("failed to open progressive store: {e}");
            return;
        }
    };

    let mut processed_files = 0u64;
    let mut failed_files = Vec::new();

    while let Ok(entry) = entry_rx.recv() {
        processed_files += 1;
        if let FileInfo::Error { message, .. } = &entry.info {
            failed_files.push(FailedFile {
                file: entry.parent.join(&entry.filename),
                error: message.clone(),
            });
        }

        if let Err(e) = store.insert_batch(std::slice::from_ref(&entry)) {
            log::error!("failed to buffer entry in progressive store: {e}");
            continue;
        }

        match store.len() {
            Ok(n) if n >= options.chunk_size => emit_chunk(&mut store, options.chunk_size, &payload_tx),
            Ok(_) => {}
            Err(e) => log::error!("failed to read progressive store length: {e}"),
        }
    }

    match store.drain_sorted() {
        Ok(rest) if !rest.is_empty() => {
            let _ = payload_tx.send(Payload::Entries(rest));
        }
        Ok(_) => {}
        Err(e) => log::error!("failed to drain final chunk: {e}"),
    }

    let counters = counters.lock().unwrap().clone();
    let total_files = counters.included + counters.excluded;
    let excluded_percentage = if total_files > 0 {
        (counters.excluded as f64 / total_files as f64) * 100.0
    } else {
        0.0
    };

    let summary = Summary {
        total_files,
        included_files: counters.included,
        excluded_files: counters.excluded,
        excluded_percentage,
        processed_files,
        failed_files,
        stopped_early: options.cancellation.is_cancellation_requested(),
        hash_algorithm: options.hash_enabled.then(|| HASH_ALGORITHM_NAME.to_string()),
    };
    let _ = payload_tx.send(Payload::Summary(summary));
}

fn emit_chunk(store: &mut ProgressiveStore, chunk_size: usize, payload_tx: &Sender<Payload>) {
    match store.drain_up_to(chunk_size) {
        Ok(chunk) if !chunk.is_empty() => {
            let _ = payload_tx.send(Payload::Entries(chunk));
        }
        Ok(_) => {}
        Err(e) => log::error!("failed to drain chunk from progressive store: {e}"),
    }
}
