//! Match state machine states and terminal outcomes.

use crate::session::slot::SlotId;

/// One of the six match states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    /// Collecting `SLOT_A`'s fleet placement.
    PlacingA,
    /// Collecting `SLOT_B`'s fleet placement.
    PlacingB,
    /// Waiting for the active slot's one command.
    AwaitTurn,
    /// Resolving a `FIRE` against the rules engine.
    ExecuteShot,
    /// Waiting out a disconnect (reconnect or spectator promotion).
    Suspended,
    /// Match has a terminal outcome; no further events are emitted.
    Terminal,
}

/// Why a match entered `SUSPENDED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendCause {
    /// The active slot's turn timer expired.
    TurnTimeout,
    /// A transport reported EOF.
    TransportEof,
    /// A transport exceeded its consecutive CRC-error quota.
    CrcQuota,
    /// A placement-phase timeout or transport death.
    PlacementDrop,
}

/// The match's terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// One slot won; `cause` is `None` for a normal sink-the-fleet win.
    Win {
        /// The winning slot.
        winner: SlotId,
        /// `Some("timeout")`, `Some("concession")`, or `None`.
        cause: Option<&'static str>,
    },
    /// Both slots dropped within the same suspension; nobody is awaited.
    Abandoned,
}

impl Outcome {
    /// The wire `outcome` string for an `end` message.
    pub fn wire_outcome(&self) -> &'static str {
        match self {
            Outcome::Win { winner: SlotId::A, .. } => "A_win",
            Outcome::Win { winner: SlotId::B, .. } => "B_win",
            Outcome::Abandoned => "abandoned",
        }
    }

    /// The wire `cause`, if any.
    pub fn wire_cause(&self) -> Option<&'static str> {
        match self {
            Outcome::Win { cause, .. } => *cause,
            Outcome::Abandoned => None,
        }
    }
}
