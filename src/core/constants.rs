//! Protocol and timing constants fixed by the BEER wire format.
//!
//! Values here MUST NOT change without a wire-format version bump.

use std::time::Duration;

// =============================================================================
// FRAME HEADER
// =============================================================================

/// Fixed frame magic, identifies a BEER frame at the start of a stream.
pub const FRAME_MAGIC: u16 = 0xBEEF;

/// Current wire protocol version.
pub const FRAME_VERSION: u8 = 1;

/// Header size in bytes: magic(2) + version(1) + type(1) + seq(4) + length(4) + crc(4).
pub const HEADER_SIZE: usize = 16;

/// Refuse to even attempt allocating a payload larger than this; guards
/// against a corrupted or adversarial length field.
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// RELIABILITY
// =============================================================================

/// Number of sent frames kept per direction for retransmit on NAK.
pub const RETRANSMIT_WINDOW: usize = 32;

/// Reorder tolerance / replay window size: a seq this far behind the
/// highest accepted seq is rejected as a replay.
pub const REPLAY_WINDOW: u32 = 32;

/// Consecutive receive-side errors on one stream before the connection
/// is declared dead.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 3;

// =============================================================================
// CRYPTO
// =============================================================================

/// AES-CTR nonce size (64-bit big-endian seq followed by zero padding).
pub const NONCE_SIZE: usize = 16;

// =============================================================================
// GAMEPLAY DEFAULTS
// =============================================================================

/// Default handshake timeout.
pub const DEFAULT_T_HANDSHAKE: Duration = Duration::from_secs(10);

/// Default per-ship placement timeout.
pub const DEFAULT_T_PLACE: Duration = Duration::from_secs(60);

/// Default per-turn timeout.
pub const DEFAULT_T_TURN: Duration = Duration::from_secs(60);

/// Default reconnect window.
pub const DEFAULT_T_RECONNECT: Duration = Duration::from_secs(60);

/// Default board size (N x N grid).
pub const DEFAULT_BOARD_SIZE: usize = 10;

/// Snapshot cadence for spectators: every this many completed half-turns
/// (one full round == 2 half-turns).
pub const SPECTATOR_SNAPSHOT_HALF_TURNS: u32 = 2;
