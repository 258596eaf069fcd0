//! Optional AES-CTR confidentiality for frame payloads.
//!
//! The CRC in the frame header always covers the ciphertext, so integrity
//! is checked before a decryption attempt is ever made.

use aes::cipher::{KeyIvInit, StreamCipher};

use crate::core::error::FrameCodecError;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes192Ctr = ctr::Ctr128BE<aes::Aes192>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// A symmetric key for frame encryption. Accepts the three AES key sizes.
#[derive(Clone)]
pub struct CryptoKey(Vec<u8>);

impl CryptoKey {
    /// Wrap raw key bytes; must be 16, 24, or 32 bytes.
    pub fn new(bytes: Vec<u8>) -> Result<Self, FrameCodecError> {
        match bytes.len() {
            16 | 24 | 32 => Ok(Self(bytes)),
            n => Err(FrameCodecError::Crypto(format!(
                "key must be 16, 24, or 32 bytes, got {n}"
            ))),
        }
    }

    /// Decode a hex-encoded key, as accepted by `--secure=<hex>` and `KEY`.
    pub fn from_hex(hex: &str) -> Result<Self, FrameCodecError> {
        let bytes = decode_hex(hex)
            .map_err(|e| FrameCodecError::Crypto(format!("invalid hex key: {e}")))?;
        Self::new(bytes)
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, String> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return Err("odd-length hex string".into());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}

/// Build the 16-byte nonce for a given sequence number: the 8-byte
/// big-endian `seq` followed by 8 zero bytes.
fn nonce_for_seq(seq: u32) -> [u8; 16] {
    let mut nonce = [0u8; 16];
    nonce[..8].copy_from_slice(&(seq as u64).to_be_bytes());
    nonce
}

/// Encrypt (or decrypt; CTR is symmetric) `data` in place for sequence `seq`.
pub fn apply_ctr(key: &CryptoKey, seq: u32, data: &mut [u8]) -> Result<(), FrameCodecError> {
    let nonce = nonce_for_seq(seq);
    match key.0.len() {
        16 => {
            let mut cipher = Aes128Ctr::new(key.0.as_slice().into(), &nonce.into());
            cipher.apply_keystream(data);
        }
        24 => {
            let mut cipher = Aes192Ctr::new(key.0.as_slice().into(), &nonce.into());
            cipher.apply_keystream(data);
        }
        32 => {
            let mut cipher = Aes256Ctr::new(key.0.as_slice().into(), &nonce.into());
            cipher.apply_keystream(data);
        }
        n => return Err(FrameCodecError::Crypto(format!("invalid key length {n}"))),
    }
    Ok(())
}
