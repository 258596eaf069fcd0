//! TCP transport: handshake line plus the framed byte stream (C1 applied
//! to a live socket).

pub mod transport;

pub use transport::Transport;
