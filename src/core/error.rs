//! Error taxonomy for the BEER match-session engine.

use thiserror::Error;

/// Errors raised while packing or unpacking a single frame (C1).
///
/// These are the errors a reader loop counts towards the
/// three-consecutive-failures threshold (the "Propagation").
#[derive(Debug, Error)]
pub enum FrameCodecError {
    /// Magic, version, or declared length failed sanity checks.
    #[error("frame error: {0}")]
    Frame(String),

    /// CRC-32 recomputed over the received bytes did not match. Carries the
    /// header's (unverified) `seq` field so the caller can still `NAK(seq)`.
    #[error("crc mismatch on seq {seq}")]
    Crc {
        /// Sequence number read from the (unverified) header.
        seq: u32,
    },

    /// AES-CTR decryption failed (only possible when keys are mismatched,
    /// since CTR mode has no built-in integrity check of its own; the CRC
    /// above is what actually detects tampering).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// `seq` fell at or behind the replay window.
    #[error("replay error: seq {seq} is at or behind window floor {floor}")]
    Replay {
        /// Offending sequence number.
        seq: u32,
        /// Lowest sequence number still accepted.
        floor: u32,
    },

    /// Payload bytes did not parse as JSON (or as the expected shape).
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The stream's I/O failed outright (EOF, reset, etc).
    #[error("transport eof")]
    TransportEof,
}

impl FrameCodecError {
    /// The sequence number a `NAK` reply should reference, if this error
    /// carries one (only a CRC mismatch does; a frame-sanity failure can't
    /// trust the header enough to quote a seq).
    pub fn nak_seq(&self) -> Option<u32> {
        match self {
            FrameCodecError::Crc { seq } => Some(*seq),
            _ => None,
        }
    }
}

/// Top-level error type for the match-session engine.
#[derive(Debug, Error)]
pub enum BeerError {
    /// A frame failed to pack/unpack; see [`FrameCodecError`].
    #[error(transparent)]
    Codec(#[from] FrameCodecError),

    /// An inbound command didn't parse or was out of turn.
    #[error("bad command: {0}")]
    Command(String),

    /// `register` was called for a token already pending reattach.
    #[error("token already in use: {0}")]
    TokenInUse(String),

    /// `attach` was called for a token with no pending registration.
    #[error("unknown token: {0}")]
    UnknownToken(String),

    /// The peer's transport is gone.
    #[error("transport eof")]
    TransportEof,

    /// The active player's turn timer expired.
    #[error("turn timed out")]
    TimeoutTurn,

    /// A ship placement timed out.
    #[error("placement timed out")]
    TimeoutPlace,

    /// The reconnect window expired with no reattach.
    #[error("reconnect timed out")]
    TimeoutReconnect,

    /// The post-accept handshake line never arrived in time.
    #[error("handshake timed out")]
    TimeoutHandshake,

    /// Configuration was invalid (bad `--secure` key length, etc).
    #[error("configuration error: {0}")]
    Config(String),

    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
