//! reposcan: concurrent repository analysis engine.
//!
//! [`run`] walks a directory tree, classifies and reads each file, and streams
//! the results back as a sequence of [`types::Payload`] values: zero or more
//! `Entries` chunks followed by exactly one `Summary`. [`run_stream`] adapts
//! the same pipeline for async consumers via the Streaming Bridge.

pub mod bridge;
pub mod cache;
pub mod cancellation;
pub mod classify;
pub mod config;
pub mod disk_detect;
pub mod hashing;
pub mod logging;
pub mod pattern;
pub mod pipeline;
pub mod processor;
pub mod progressive_store;
pub mod types;
mod walk;

pub use cancellation::{CancellationToken, CancellationTokenSource, Cancelled};
pub use types::{FailedFile, FileEntry, FileInfo, Metadata, Payload, RunOptions, Summary};

use std::sync::Arc;

use anyhow::{Context, Result};

use cache::CacheStore;
use pattern::PatternService;
use pipeline::{PipelineHandles, spawn_pipeline};

/// Run the pipeline and return a blocking iterator over its payloads.
///
/// Opens the Cache Store (unless `options.cache_disabled`), spawns the
/// Traversal Walker, File Processor worker pool, and assembler thread, and
/// returns immediately; payloads are produced as the pipeline runs and
/// consumed by iterating [`PayloadIter`]. Dropping the iterator before it is
/// exhausted requests cancellation so background threads wind down.
pub fn run(options: RunOptions) -> Result<PayloadIter> {
    let patterns = Arc::new(PatternService::new(options.exclude.clone()));
    let cache = open_cache(&options)?;
    let handles = spawn_pipeline(options, patterns, cache);
    Ok(PayloadIter {
        handles: Some(handles),
    })
}

/// Run the pipeline and return an async receiver of payloads, bridging the
/// pipeline's blocking threads to a `tokio` consumer (see [`bridge`]).
pub fn run_stream(options: RunOptions) -> Result<tokio::sync::mpsc::Receiver<Payload>> {
    let cancel = options.cancellation.clone();
    let iter = run(options)?;
    let payload_rx = iter.into_raw_receiver();
    Ok(bridge::spawn_bridge(payload_rx, cancel))
}

fn open_cache(options: &RunOptions) -> Result<Option<Arc<CacheStore>>> {
    if options.cache_disabled || !options.hash_enabled {
        return Ok(None);
    }
    let threads = options.threads.unwrap_or_else(|| {
        disk_detect::determine_threads_for_drive(
            &options.root,
            config::WorkerThreadLimits::current().all_threads,
        )
        .0
    });
    let store = CacheStore::open(options.cache_db_path(), threads, options.cache_size_limit_mb)
        .context("open cache store")?;
    Ok(Some(Arc::new(store)))
}

/// Blocking iterator over a run's payloads. Joins the pipeline's threads once
/// the underlying channel is drained (or the iterator itself is dropped).
pub struct PayloadIter {
    handles: Option<PipelineHandles>,
}

impl PayloadIter {
    fn into_raw_receiver(mut self) -> crossbeam_channel::Receiver<Payload> {
        self.handles
            .take()
            .expect("handles present for a live PayloadIter")
            .into_payload_receiver()
    }
}

impl Iterator for PayloadIter {
    type Item = Payload;

    fn next(&mut self) -> Option<Payload> {
        let handles = self.handles.as_ref()?;
        match handles.payload_rx.recv() {
            Ok(payload) => Some(payload),
            Err(_) => {
                if let Some(handles) = self.handles.take() {
                    handles.join();
                }
                None
            }
        }
    }
}

impl Drop for PayloadIter {
    fn drop(&mut self) {
        if let Some(handles) = self.handles.take() {
            handles.join();
        }
    }
}
