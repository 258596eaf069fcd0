//! Spectator queue (C3): ordered observers for a match, promotion source
//! for a vacated slot.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::frame::FrameType;
use crate::net::Transport;

/// Ordered queue of passive observers. The head is the next promotion
/// candidate.
///
/// Spectators hold no reference into match internals beyond this queue's
/// broadcast sink, avoiding a match/queue/session reference cycle.
#[derive(Default)]
pub struct SpectatorQueue {
    spectators: tokio::sync::Mutex<Vec<Arc<Transport>>>,
}

impl SpectatorQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a newly-joined spectator to the tail.
    pub async fn add(&self, transport: Arc<Transport>) {
        self.spectators.lock().await.push(transport);
    }

    /// Send `value` as a `GAME` or `CHAT` frame to every current
    /// spectator. A send failure silently evicts that spectator rather
    /// than aborting the broadcast (the "Per-session concurrency").
    pub async fn broadcast<T: Serialize>(&self, frame_type: FrameType, value: &T) {
        let mut spectators = self.spectators.lock().await;
        let mut survivors = Vec::with_capacity(spectators.len());
        for spectator in spectators.drain(..) {
            if spectator.send_json(frame_type, value).await.is_ok() {
                survivors.push(spectator);
            } else {
                debug!(peer = %spectator.peer_addr(), "evicting spectator after failed send");
            }
        }
        *spectators = survivors;
    }

    /// Remove and return the head spectator, if any, so the caller can
    /// transfer it into a vacated slot (the `promote`).
    ///
    /// Unlike the other operations, invoking `match.restart_from_snapshot`
    /// for the promoted slot is the caller's responsibility, since this
    /// queue has no reference to the match it serves.
    pub async fn promote(&self) -> Option<Arc<Transport>> {
        let mut spectators = self.spectators.lock().await;
        if spectators.is_empty() {
            None
        } else {
            Some(spectators.remove(0))
        }
    }

    /// Number of spectators currently queued.
    pub async fn len(&self) -> usize {
        self.spectators.lock().await.len()
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.spectators.lock().await.is_empty()
    }
}
