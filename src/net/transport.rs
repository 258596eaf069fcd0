//! A framed TCP connection: handshake line, then a stream of [`Frame`]s
//! with per-direction sequencing, retransmit, and replay protection.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use crate::core::constants::HEADER_SIZE;
use crate::core::error::{BeerError, FrameCodecError};
use crate::frame::{self, CryptoKey, Frame, FrameType, PacketStream};

/// One TCP connection, framed per the wire protocol.
///
/// Reading and sending each take their own lock: two producers can't
/// interleave the bytes of a single frame, but a read in progress never
/// blocks a concurrent send.
pub struct Transport {
    peer_addr: SocketAddr,
    read_half: Mutex<BufReader<OwnedReadHalf>>,
    write_half: Mutex<OwnedWriteHalf>,
    stream: Mutex<PacketStream>,
    key: Option<CryptoKey>,
}

impl Transport {
    /// Wrap a freshly-accepted socket.
    pub fn new(socket: TcpStream, key: Option<CryptoKey>) -> Result<Self, BeerError> {
        let peer_addr = socket.peer_addr()?;
        socket.set_nodelay(true).ok();
        let (read_half, write_half) = socket.into_split();
        Ok(Self {
            peer_addr,
            read_half: Mutex::new(BufReader::new(read_half)),
            write_half: Mutex::new(write_half),
            stream: Mutex::new(PacketStream::new(key.clone())),
            key,
        })
    }

    /// The peer's socket address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Read the unframed handshake line `TOKEN <id>\n`,
    /// failing with [`BeerError::TimeoutHandshake`] if nothing arrives
    /// within `timeout`.
    pub async fn read_handshake_line(&self, timeout: Duration) -> Result<String, BeerError> {
        let mut guard = self.read_half.lock().await;
        let mut line = String::new();
        let read = tokio::time::timeout(timeout, guard.read_line(&mut line))
            .await
            .map_err(|_| BeerError::TimeoutHandshake)?;
        let n = read?;
        if n == 0 {
            return Err(BeerError::TransportEof);
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Serialize `value` as JSON and send it as one `GAME` or `CHAT`
    /// frame under the next sequence number.
    pub async fn send_json<T: Serialize>(
        &self,
        frame_type: FrameType,
        value: &T,
    ) -> Result<(), BeerError> {
        let payload = serde_json::to_vec(value).map_err(FrameCodecError::Parse)?;
        let bytes = {
            let mut stream = self.stream.lock().await;
            stream.send(frame_type, &payload)?
        };
        self.write_raw(&bytes).await
    }

    /// Send a bare control frame (`ACK`/`NAK`) referencing `seq`. Control
    /// frames are never buffered for retransmit.
    pub async fn send_control(&self, frame_type: FrameType, seq: u32) -> Result<(), BeerError> {
        let bytes = frame::pack(frame_type, seq, &[], self.key.as_ref())?;
        self.write_raw(&bytes).await
    }

    /// Resend the exact wire bytes previously buffered for `seq`, if still
    /// present (called after receiving a `NAK(seq)`).
    pub async fn resend(&self, seq: u32) -> Result<bool, BeerError> {
        let bytes = {
            let stream = self.stream.lock().await;
            stream.on_nak(seq)
        };
        match bytes {
            Some(bytes) => {
                self.write_raw(&bytes).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Forget the buffered frame for `seq` (called after receiving an
    /// `ACK(seq)`).
    pub async fn on_ack(&self, seq: u32) {
        self.stream.lock().await.on_ack(seq);
    }

    async fn write_raw(&self, bytes: &[u8]) -> Result<(), BeerError> {
        let mut guard = self.write_half.lock().await;
        guard.write_all(bytes).await?;
        guard.flush().await?;
        Ok(())
    }

    /// Read exactly one frame off the wire, checking it against the
    /// replay window and error-counting as it goes.
    ///
    /// On a valid `GAME`/`CHAT` frame, replies `ACK(seq)`; on an integrity
    /// failure, replies `NAK(seq)` using the real error (even the third
    /// one in a row, which is also escalated to [`BeerError::TransportEof`]
    /// for the caller) before surfacing the outcome. Both replies are
    /// best-effort: a failure to send one doesn't mask the read outcome,
    /// since the caller already has (or lacks) the frame it needs.
    pub async fn recv_frame(&self) -> Result<Frame, BeerError> {
        let mut header = [0u8; HEADER_SIZE];
        {
            let mut guard = self.read_half.lock().await;
            guard.read_exact(&mut header).await?;
        }
        let length = frame::peek_payload_len(&header)?;
        let mut payload = vec![0u8; length as usize];
        {
            let mut guard = self.read_half.lock().await;
            guard.read_exact(&mut payload).await?;
        }
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&payload);

        let (result, escalate) = {
            let mut stream = self.stream.lock().await;
            let result = stream.receive(&buf);
            (result, stream.should_escalate())
        };
        match result {
            Ok(frame) => {
                if matches!(frame.frame_type, FrameType::Game | FrameType::Chat) {
                    let _ = self.send_control(FrameType::Ack, frame.seq).await;
                }
                Ok(frame)
            }
            Err(err) => {
                if let Some(seq) = err.nak_seq() {
                    let _ = self.send_control(FrameType::Nak, seq).await;
                }
                if escalate {
                    Err(FrameCodecError::TransportEof.into())
                } else {
                    Err(err.into())
                }
            }
        }
    }

    /// Read frames until an application-level (`GAME`/`CHAT`) frame
    /// arrives, transparently consuming `ACK`/`NAK` control frames
    /// against this transport's own send-side state along the way.
    pub async fn recv_application_frame(&self) -> Result<Frame, BeerError> {
        loop {
            let frame = self.recv_frame().await?;
            match frame.frame_type {
                FrameType::Ack => self.on_ack(frame.seq).await,
                FrameType::Nak => {
                    self.resend(frame.seq).await?;
                }
                FrameType::Game | FrameType::Chat => return Ok(frame),
            }
        }
    }

    /// Parse the JSON payload of a `Frame` previously returned by
    /// [`Transport::recv_frame`].
    pub fn parse_payload<T: DeserializeOwned>(frame: &Frame) -> Result<T, BeerError> {
        Ok(serde_json::from_slice(&frame.payload).map_err(FrameCodecError::Parse)?)
    }
}
