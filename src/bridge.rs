//! Streaming Bridge: adapts the Chunk Pipeline's blocking payload channel to an
//! async consumer via a bounded `tokio` channel. A dedicated forwarding thread
//! drains the blocking side and sends the payload across; when no payload
//! turns up within the cancellation poll interval, the thread rechecks
//! cancellation rather than blocking indefinitely, so a cancelled run is
//! observable on the async side within roughly that interval.

use std::thread;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tokio::sync::mpsc;

use crate::cancellation::CancellationToken;
use crate::config::stream_chunk_capacity;
use crate::types::{CANCEL_POLL_INTERVAL, Payload};

/// Spawn the forwarding thread and return the async receiving end. The channel
/// closes (yielding `None` from `recv().await`) once the pipeline side is
/// exhausted or disconnects; there is no separate sentinel value.
pub fn spawn_bridge(payload_rx: Receiver<Payload>, cancel: CancellationToken) -> mpsc::Receiver<Payload> {
    let (tx, rx) = mpsc::channel(stream_chunk_capacity());
    thread::spawn(move || forward_loop(payload_rx, tx, cancel));
    rx
}

fn forward_loop(payload_rx: Receiver<Payload>, tx: mpsc::Sender<Payload>, cancel: CancellationToken) {
    loop {
        match payload_rx.recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok(payload) => {
                if tx.blocking_send(payload).is_err() {
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if cancel.is_cancellation_requested() {
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
