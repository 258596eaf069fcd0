//! Ties together sequencing, the retransmit buffer, and the replay window
//! for one direction pair of one connection.
//!
//! `PacketStream` holds no socket; it is pure bookkeeping, which keeps it
//! trivially testable and keeps the I/O (in [`crate::net::transport`])
//! free of protocol-state concerns beyond "read bytes, write bytes".

use crate::core::constants::MAX_CONSECUTIVE_ERRORS;
use crate::core::error::FrameCodecError;
use crate::frame::{pack, replay::ReplayWindow, retransmit::RetransmitBuffer, CryptoKey, Frame, FrameType};

/// Per-connection framing state: one send-side sequence counter plus
/// retransmit buffer, and one receive-side replay window plus error
/// counter. Two peers of a connection each own one of these.
pub struct PacketStream {
    key: Option<CryptoKey>,
    next_seq: u32,
    retransmit: RetransmitBuffer,
    replay: ReplayWindow,
    consecutive_errors: u32,
}

impl PacketStream {
    /// A fresh stream, optionally encrypting outbound/inbound payloads.
    pub fn new(key: Option<CryptoKey>) -> Self {
        Self {
            key,
            next_seq: 0,
            retransmit: RetransmitBuffer::new(),
            replay: ReplayWindow::new(),
            consecutive_errors: 0,
        }
    }

    /// Pack `payload` under the next sequence number, buffering the wire
    /// bytes for possible retransmit, and return the bytes to write.
    pub fn send(&mut self, frame_type: FrameType, payload: &[u8]) -> Result<Vec<u8>, FrameCodecError> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        let bytes = pack(frame_type, seq, payload, self.key.as_ref())?;
        self.retransmit.insert(seq, bytes.clone());
        Ok(bytes)
    }

    /// Unpack one frame's raw bytes and check it against the replay
    /// window. On success the frame is returned and the error counter is
    /// reset. On failure the error counter is incremented and the
    /// original error is returned unchanged, so callers needing to reply
    /// with a `NAK` still see the real `seq`; use
    /// [`PacketStream::should_escalate`] to learn whether this failure is
    /// the one that should be surfaced to the session as
    /// [`FrameCodecError::TransportEof`].
    pub fn receive(&mut self, buf: &[u8]) -> Result<Frame, FrameCodecError> {
        let result = crate::frame::unpack(buf, self.key.as_ref()).and_then(|frame| {
            if matches!(frame.frame_type, FrameType::Ack | FrameType::Nak) {
                return Ok(frame);
            }
            let seq = frame.seq;
            self.replay
                .check_and_update(seq)
                .map(|_| frame)
                .map_err(|floor| FrameCodecError::Replay { seq, floor })
        });

        match result {
            Ok(frame) => {
                self.consecutive_errors = 0;
                Ok(frame)
            }
            Err(err) => {
                self.consecutive_errors += 1;
                Err(err)
            }
        }
    }

    /// Whether the last [`PacketStream::receive`] failure was the
    /// [`MAX_CONSECUTIVE_ERRORS`]th in a row, and should be escalated to
    /// [`FrameCodecError::TransportEof`] by the caller.
    pub fn should_escalate(&self) -> bool {
        self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS
    }

    /// Drop the buffered frame for `seq` after an `ACK(seq)` arrives.
    pub fn on_ack(&mut self, seq: u32) {
        self.retransmit.ack(seq);
    }

    /// Look up the buffered wire bytes to resend after a `NAK(seq)`
    /// arrives; `None` means the frame was already evicted or acked and
    /// the sender does not retransmit.
    pub fn on_nak(&self, seq: u32) -> Option<Vec<u8>> {
        self.retransmit.get(seq).map(|b| b.to_vec())
    }

    /// Number of consecutive receive-side failures observed so far.
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn third_consecutive_crc_error_sets_should_escalate() {
        let mut stream = PacketStream::new(None);
        let mut bad = pack(FrameType::Game, 1, b"{}", None).unwrap();
        let last = bad.len() - 1;
        bad[last] ^= 1;

        // Every failure still reports its real error, seq and all, so a
        // caller can NAK it; only the third sets the escalation flag.
        assert!(matches!(stream.receive(&bad).unwrap_err(), FrameCodecError::Crc { seq } if seq == 1));
        assert!(!stream.should_escalate());

        assert!(matches!(stream.receive(&bad).unwrap_err(), FrameCodecError::Crc { seq } if seq == 1));
        assert!(!stream.should_escalate());

        assert!(matches!(stream.receive(&bad).unwrap_err(), FrameCodecError::Crc { seq } if seq == 1));
        assert!(stream.should_escalate());
    }

    #[test]
    fn successful_frame_resets_error_counter() {
        let mut stream = PacketStream::new(None);
        let mut bad = pack(FrameType::Game, 1, b"{}", None).unwrap();
        let last = bad.len() - 1;
        bad[last] ^= 1;
        let _ = stream.receive(&bad);
        let _ = stream.receive(&bad);

        let good = pack(FrameType::Game, 2, b"{}", None).unwrap();
        assert!(stream.receive(&good).is_ok());
        assert_eq!(stream.consecutive_errors(), 0);
    }

    #[test]
    fn send_then_ack_empties_retransmit_buffer() {
        let mut stream = PacketStream::new(None);
        stream.send(FrameType::Game, b"{}").unwrap();
        stream.on_ack(0);
        assert!(stream.on_nak(0).is_none());
    }

    #[test]
    fn send_then_nak_returns_same_bytes() {
        let mut stream = PacketStream::new(None);
        let sent = stream.send(FrameType::Game, b"{}").unwrap();
        let resend = stream.on_nak(0).unwrap();
        assert_eq!(sent, resend);
    }
}
