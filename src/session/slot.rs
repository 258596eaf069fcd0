//! A match slot: the transport, token, and board bound to one side of a
//! match (the "Slot").

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use crate::core::traits::Board;
use crate::net::Transport;

/// `SLOT_A` or `SLOT_B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotId {
    /// First-popped waiting player.
    A,
    /// Second-popped waiting player.
    B,
}

impl SlotId {
    /// The other slot.
    pub fn other(self) -> SlotId {
        match self {
            SlotId::A => SlotId::B,
            SlotId::B => SlotId::A,
        }
    }
}

/// One side of a match: a replaceable transport, a durable token, the
/// rules-engine board, and a liveness flag.
///
/// The transport is replaceable because reconnect (C2) swaps in a new
/// one without recreating the slot; the board outlives any number of
/// reconnects.
pub struct Slot {
    /// Durable client identity (the "Token").
    pub token: String,
    transport: Mutex<Arc<Transport>>,
    pub board: Mutex<Box<dyn Board>>,
    alive: AtomicBool,
}

impl Slot {
    /// Build a slot from its initial transport, token, and board.
    pub fn new(token: String, transport: Arc<Transport>, board: Box<dyn Board>) -> Self {
        Self {
            token,
            transport: Mutex::new(transport),
            board: Mutex::new(board),
            alive: AtomicBool::new(true),
        }
    }

    /// The slot's current transport.
    pub async fn transport(&self) -> Arc<Transport> {
        self.transport.lock().await.clone()
    }

    /// Bind a freshly reattached transport and mark the slot live again.
    pub async fn replace_transport(&self, new_transport: Arc<Transport>) {
        *self.transport.lock().await = new_transport;
        self.alive.store(true, Ordering::SeqCst);
    }

    /// Mark this slot's transport dead (EOF, CRC quota, or turn timeout).
    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Whether the slot currently holds a live transport.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}
