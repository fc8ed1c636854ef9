//! Background writer: batches queued cache upserts and applies them as single
//! transactions, either once the batch fills or once the batch timeout elapses.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use rusqlite::Connection;

use super::pool::open_connection;
use super::schema::UPSERT_SQL;
use super::state::CacheStateBus;
use crate::config::CacheWriterConsts;
use crate::types::CacheRecord;

struct PendingGate {
    count: AtomicUsize,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl PendingGate {
    fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            lock: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn mark_done(&self, n: usize) {
        let prev = self.count.fetch_sub(n, Ordering::SeqCst);
        if prev == n {
            let _guard = self.lock.lock().unwrap();
            self.condvar.notify_all();
        }
    }

    fn wait_until_zero(&self, timeout: Duration) -> bool {
        if self.count.load(Ordering::SeqCst) == 0 {
            return true;
        }
        let guard = self.lock.lock().unwrap();
        let (_guard, result) = self
            .condvar
            .wait_timeout_while(guard, timeout, |_| self.count.load(Ordering::SeqCst) != 0)
            .unwrap();
        !result.timed_out()
    }
}

pub struct CacheWriter {
    tx: Sender<CacheRecord>,
    pending: Arc<PendingGate>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CacheWriter {
    pub fn spawn(db_path: PathBuf) -> anyhow::Result<Self> {
        let (tx, rx) = unbounded::<CacheRecord>();
        let pending = Arc::new(PendingGate::new());
        let stop = Arc::new(AtomicBool::new(false));

        let worker_pending = Arc::clone(&pending);
        let worker_stop = Arc::clone(&stop);
        let mut conn = open_connection(&db_path)?;
        let handle = thread::spawn(move || {
            run_writer_loop(&mut conn, rx, &worker_pending, &worker_stop);
        });

        Ok(Self {
            tx,
            pending,
            stop,
            handle: Some(handle),
        })
    }

    /// Enqueue a write. No-op (and not counted as pending) while the cache is disabled.
    pub fn queue_write(&self, record: CacheRecord) {
        if CacheStateBus::is_disabled() {
            return;
        }
        self.pending.increment();
        let _ = self.tx.send(record);
    }

    /// Block until every queued write has been applied (or dropped because the cache
    /// became disabled), or until `timeout` elapses. Returns whether it drained in time.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.pending.wait_until_zero(timeout)
    }
}

impl Drop for CacheWriter {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn apply_batch(conn: &mut Connection, batch: &[CacheRecord]) -> anyhow::Result<()> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(UPSERT_SQL)?;
        for record in batch {
            let file_info_json = serde_json::to_string(&record.file_info)?;
            stmt.execute(rusqlite::params![
                record.file_path.to_string_lossy(),
                record.file_hash,
                record.hash_algorithm,
                file_info_json,
                record.size as i64,
                record.mtime,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn run_writer_loop(
    conn: &mut Connection,
    rx: Receiver<CacheRecord>,
    pending: &Arc<PendingGate>,
    stop: &Arc<AtomicBool>,
) {
    let batch_timeout = Duration::from_millis(CacheWriterConsts::WRITE_BATCH_TIMEOUT_MS);

    loop {
        let first = match rx.recv_timeout(batch_timeout) {
            Ok(record) => record,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if stop.load(Ordering::SeqCst) {
                    return;
                }
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
        };

        let mut batch = vec![first];
        let batch_start = Instant::now();
        while batch.len() < CacheWriterConsts::WRITE_BATCH_SIZE
            && batch_start.elapsed() < batch_timeout
        {
            match rx.try_recv() {
                Ok(record) => batch.push(record),
                Err(_) => break,
            }
        }

        let n = batch.len();
        if CacheStateBus::is_disabled() {
            log::debug!("dropping cache write batch of {n} because caching is disabled");
        } else if let Err(e) = apply_batch(conn, &batch) {
            log::error!("error processing cache write batch: {e}");
        } else {
            log::debug!("flushed {n} cache writes");
        }
        pending.mark_done(n);

        if stop.load(Ordering::SeqCst) && rx.is_empty() {
            return;
        }
    }
}
