//! Frame format: pack/unpack, CRC, optional AES-CTR confidentiality,
//! retransmit buffering, and replay protection.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               Match session (C4)              │
//! ├──────────────────────────────────────────────┤
//! │            PacketStream (this module)          │  reliability, replay
//! ├──────────────────────────────────────────────┤
//! │                   TCP socket                    │
//! └──────────────────────────────────────────────┘
//! ```

pub mod crypto;
pub mod replay;
pub mod retransmit;
mod stream;

pub use crypto::CryptoKey;
pub use stream::PacketStream;

use byteorder_shim::{ReadBe, WriteBe};

use crate::core::constants::{FRAME_MAGIC, FRAME_VERSION, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::core::error::FrameCodecError;

/// Frame type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Application game state / commands, JSON payload.
    Game,
    /// Chat message, JSON payload.
    Chat,
    /// Positive acknowledgment of a received `seq`. Empty payload.
    Ack,
    /// Negative acknowledgment (integrity failure). Empty payload.
    Nak,
}

impl FrameType {
    fn as_byte(self) -> u8 {
        match self {
            FrameType::Game => 0,
            FrameType::Chat => 1,
            FrameType::Ack => 2,
            FrameType::Nak => 3,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, FrameCodecError> {
        match byte {
            0 => Ok(FrameType::Game),
            1 => Ok(FrameType::Chat),
            2 => Ok(FrameType::Ack),
            3 => Ok(FrameType::Nak),
            other => Err(FrameCodecError::Frame(format!("unknown frame type {other}"))),
        }
    }
}

/// A decoded frame: its type, sequence number, and plaintext payload bytes
/// (already decrypted, if encryption was in effect).
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame type.
    pub frame_type: FrameType,
    /// Sender-assigned monotonic sequence number.
    pub seq: u32,
    /// Plaintext payload bytes (UTF-8 JSON, or empty for control frames).
    pub payload: Vec<u8>,
}

/// Serialize `(frame_type, seq, payload)` into wire bytes, optionally
/// encrypting the payload first. The returned bytes are also what should
/// be stored in the retransmit buffer under `seq`.
pub fn pack(
    frame_type: FrameType,
    seq: u32,
    payload: &[u8],
    key: Option<&CryptoKey>,
) -> Result<Vec<u8>, FrameCodecError> {
    let mut payload = payload.to_vec();
    if let Some(key) = key {
        crypto::apply_ctr(key, seq, &mut payload)?;
    }

    let mut header_no_crc = Vec::with_capacity(HEADER_SIZE - 4);
    header_no_crc.write_u16_be(FRAME_MAGIC);
    header_no_crc.push(FRAME_VERSION);
    header_no_crc.push(frame_type.as_byte());
    header_no_crc.write_u32_be(seq);
    header_no_crc.write_u32_be(payload.len() as u32);

    let mut crc_input = header_no_crc.clone();
    crc_input.extend_from_slice(&payload);
    let crc = crc32fast::hash(&crc_input);

    let mut out = header_no_crc;
    out.write_u32_be(crc);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Parse one frame out of `buf`, which must contain exactly one frame's
/// worth of bytes (header + payload). Returns the decoded frame with its
/// payload decrypted, if `key` is provided.
///
/// This function does not consult a replay window; callers that need
/// replay protection should route through [`PacketStream`].
pub fn unpack(buf: &[u8], key: Option<&CryptoKey>) -> Result<Frame, FrameCodecError> {
    if buf.len() < HEADER_SIZE {
        return Err(FrameCodecError::Frame("buffer shorter than header".into()));
    }

    let mut cursor = buf;
    let magic = cursor.read_u16_be();
    if magic != FRAME_MAGIC {
        return Err(FrameCodecError::Frame(format!("bad magic {magic:#06x}")));
    }
    let version = cursor[0];
    cursor = &cursor[1..];
    if version != FRAME_VERSION {
        return Err(FrameCodecError::Frame(format!(
            "unsupported version {version}"
        )));
    }
    let frame_type = FrameType::from_byte(cursor[0])?;
    cursor = &cursor[1..];
    let seq = cursor.read_u32_be();
    let length = cursor.read_u32_be();
    if length > MAX_PAYLOAD_SIZE {
        return Err(FrameCodecError::Frame(format!(
            "implausible payload length {length}"
        )));
    }
    let crc_expected = cursor.read_u32_be();

    if cursor.len() != length as usize {
        return Err(FrameCodecError::Frame(format!(
            "declared length {length} does not match remaining {}",
            cursor.len()
        )));
    }

    let header_len = HEADER_SIZE - 4;
    let mut crc_input = Vec::with_capacity(header_len + cursor.len());
    crc_input.extend_from_slice(&buf[..header_len]);
    crc_input.extend_from_slice(cursor);
    let crc_actual = crc32fast::hash(&crc_input);
    if crc_actual != crc_expected {
        return Err(FrameCodecError::Crc { seq });
    }

    let mut payload = cursor.to_vec();
    if let Some(key) = key {
        crypto::apply_ctr(key, seq, &mut payload)?;
    }

    Ok(Frame {
        frame_type,
        seq,
        payload,
    })
}

/// Read just the 16-byte header to learn the declared payload length,
/// without validating CRC (used by the transport layer to know how many
/// more bytes to read off the socket before calling [`unpack`]).
pub fn peek_payload_len(header: &[u8; HEADER_SIZE]) -> Result<u32, FrameCodecError> {
    let mut cursor: &[u8] = header;
    let magic = cursor.read_u16_be();
    if magic != FRAME_MAGIC {
        return Err(FrameCodecError::Frame(format!("bad magic {magic:#06x}")));
    }
    let version = cursor[0];
    if version != FRAME_VERSION {
        return Err(FrameCodecError::Frame(format!(
            "unsupported version {version}"
        )));
    }
    cursor = &cursor[2..]; // skip version + type
    let length = cursor.read_u32_be();
    if length > MAX_PAYLOAD_SIZE {
        return Err(FrameCodecError::Frame(format!(
            "implausible payload length {length}"
        )));
    }
    Ok(length)
}

/// Minimal big-endian integer read/write helpers over byte slices/vecs,
/// kept local so the wire codec has no dependency beyond what it needs.
mod byteorder_shim {
    pub trait WriteBe {
        fn write_u16_be(&mut self, v: u16);
        fn write_u32_be(&mut self, v: u32);
    }

    impl WriteBe for Vec<u8> {
        fn write_u16_be(&mut self, v: u16) {
            self.extend_from_slice(&v.to_be_bytes());
        }
        fn write_u32_be(&mut self, v: u32) {
            self.extend_from_slice(&v.to_be_bytes());
        }
    }

    pub trait ReadBe {
        fn read_u16_be(&mut self) -> u16;
        fn read_u32_be(&mut self) -> u32;
    }

    impl ReadBe for &[u8] {
        fn read_u16_be(&mut self) -> u16 {
            let v = u16::from_be_bytes([self[0], self[1]]);
            *self = &self[2..];
            v
        }
        fn read_u32_be(&mut self) -> u32 {
            let v = u32::from_be_bytes([self[0], self[1], self[2], self[3]]);
            *self = &self[4..];
            v
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trip() {
        let payload = br#"{"type":"info","text":"hi"}"#;
        let bytes = pack(FrameType::Game, 42, payload, None).unwrap();
        let frame = unpack(&bytes, None).unwrap();
        assert_eq!(frame.frame_type, FrameType::Game);
        assert_eq!(frame.seq, 42);
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn pack_unpack_round_trip_encrypted() {
        let key = CryptoKey::new(vec![0x11; 16]).unwrap();
        let payload = br#"{"type":"chat","name":"a","msg":"hey"}"#;
        let bytes = pack(FrameType::Chat, 7, payload, Some(&key)).unwrap();
        let frame = unpack(&bytes, Some(&key)).unwrap();
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn control_frames_have_empty_payload() {
        let bytes = pack(FrameType::Ack, 3, b"", None).unwrap();
        let frame = unpack(&bytes, None).unwrap();
        assert_eq!(frame.frame_type, FrameType::Ack);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn bit_flip_in_payload_yields_crc_error() {
        let payload = br#"{"type":"info","text":"hi"}"#;
        let mut bytes = pack(FrameType::Game, 1, payload, None).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let err = unpack(&bytes, None).unwrap_err();
        assert!(matches!(err, FrameCodecError::Crc { seq: 1 }));
    }

    #[test]
    fn bad_magic_yields_frame_error() {
        let payload = b"{}";
        let mut bytes = pack(FrameType::Game, 1, payload, None).unwrap();
        bytes[0] ^= 0xFF;
        let err = unpack(&bytes, None).unwrap_err();
        assert!(matches!(err, FrameCodecError::Frame(_)));
    }

    #[test]
    fn implausible_length_is_rejected() {
        let mut header = [0u8; HEADER_SIZE];
        header[0..2].copy_from_slice(&FRAME_MAGIC.to_be_bytes());
        header[2] = FRAME_VERSION;
        header[3] = FrameType::Game.as_byte();
        header[8..12].copy_from_slice(&(MAX_PAYLOAD_SIZE + 1).to_be_bytes());
        let err = peek_payload_len(&header).unwrap_err();
        assert!(matches!(err, FrameCodecError::Frame(_)));
    }
}
