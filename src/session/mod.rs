//! Match session (C4): the per-match state machine.

pub mod command;
pub mod match_session;
pub mod slot;
pub mod state;

pub use match_session::{MatchReport, MatchSession, MatchTimeouts, SlotReport};
pub use slot::{Slot, SlotId};
pub use state::{MatchState, Outcome, SuspendCause};
