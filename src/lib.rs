//! BEER: a networked turn-based Battleship match-session engine and
//! connection arbiter.
//!
//! The crate is organized by component boundary: a framing layer
//! (C1, [`frame`]) carries integrity-checked,
//! optionally-encrypted, sequenced messages over a raw socket
//! ([`net`]); a reconnect registry (C2, [`reconnect`]) lets a dropped
//! player's slot wait for a matching token to reattach; a spectator
//! queue (C3, [`spectator`]) holds passive observers and is the source
//! of promotion when a slot is vacated for good; a match session (C4,
//! [`session`]) drives one game end to end against a [`core::traits::Board`]
//! collaborator; and a lobby (C5, [`lobby`]) owns the listening socket,
//! classifies arrivals, and pairs and requeues players across matches.

pub mod board;
pub mod config;
pub mod core;
pub mod frame;
pub mod lobby;
pub mod net;
pub mod protocol;
pub mod reconnect;
pub mod session;
pub mod spectator;

pub use config::{Args, Config, Verbosity};
pub use core::error::{BeerError, FrameCodecError};
pub use lobby::Lobby;
