//! Server configuration: CLI flags layered over environment variables,
//! resolved into a validated runtime `Config`.

use std::net::IpAddr;
use std::time::Duration;

use clap::Parser;

use crate::core::constants::{
    DEFAULT_BOARD_SIZE, DEFAULT_T_HANDSHAKE, DEFAULT_T_PLACE, DEFAULT_T_RECONNECT,
    DEFAULT_T_TURN,
};
use crate::core::error::BeerError;
use crate::frame::CryptoKey;

/// Command-line / environment configuration for `beer-server`.
#[derive(Debug, Parser)]
#[command(name = "beer-server", about = "Networked turn-based Battleship server")]
pub struct Args {
    /// Address to bind the listening socket to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to bind the listening socket to.
    #[arg(long, env = "PORT", default_value_t = 4000)]
    pub port: u16,

    /// Overrides `--port` when set (used by integration tests to avoid
    /// port collisions).
    #[arg(long, env = "TEST_PORT")]
    pub test_port: Option<u16>,

    /// Enable AES-CTR confidentiality. An inline hex key may follow
    /// (`--secure=<hex>`); otherwise the `KEY` environment variable is
    /// consulted.
    #[arg(long, value_name = "HEX_KEY", num_args = 0..=1, default_missing_value = "")]
    pub secure: Option<String>,

    /// Hex-encoded symmetric key, consulted when `--secure` carries no
    /// inline value.
    #[arg(long, env = "KEY", hide = true, default_value = "")]
    pub key_env: String,

    /// Play the single-ship variant instead of the standard fleet.
    #[arg(long)]
    pub one_ship: bool,

    /// Per-turn timeout, in seconds.
    #[arg(long, env = "TURN_TIMEOUT", default_value_t = DEFAULT_T_TURN.as_secs())]
    pub turn_timeout: u64,

    /// Board edge length.
    #[arg(long, env = "BOARD_SIZE", default_value_t = DEFAULT_BOARD_SIZE)]
    pub board_size: usize,

    /// Verbose (debug-level) logging.
    #[arg(long, env = "DEBUG")]
    pub debug: bool,

    /// Suppress all but warnings and errors.
    #[arg(short = 'q', long = "silent")]
    pub silent: bool,
}

/// Resolved, validated server configuration.
pub struct Config {
    /// Bind address.
    pub host: IpAddr,
    /// Bind port (after `TEST_PORT` override).
    pub port: u16,
    /// Symmetric key for AES-CTR, if encryption is enabled.
    pub key: Option<CryptoKey>,
    /// Single-ship variant.
    pub one_ship: bool,
    /// Board edge length.
    pub board_size: usize,
    /// Per-turn timeout.
    pub turn_timeout: Duration,
    /// Per-ship placement timeout (not independently
    /// configurable on the wire interface).
    pub place_timeout: Duration,
    /// Reconnect window.
    pub reconnect_timeout: Duration,
    /// Handshake timeout.
    pub handshake_timeout: Duration,
    /// Verbosity level for the tracing subscriber.
    pub verbosity: Verbosity,
}

/// Logging verbosity, derived from `--debug`/`-q`/`DEBUG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// `-q`/`--silent`: warnings and errors only.
    Quiet,
    /// Default: informational logging.
    Normal,
    /// `--debug`/`DEBUG=1`: per-connection/per-match debug logging.
    Debug,
}

impl Config {
    /// Parse `std::env::args()` plus the environment into a validated
    /// [`Config`].
    pub fn load() -> Result<Self, BeerError> {
        Self::from_args(Args::parse())
    }

    fn from_args(args: Args) -> Result<Self, BeerError> {
        let port = args.test_port.unwrap_or(args.port);

        let key = match args.secure {
            None => None,
            Some(inline) if !inline.is_empty() => Some(CryptoKey::from_hex(&inline)?),
            Some(_) if !args.key_env.is_empty() => Some(CryptoKey::from_hex(&args.key_env)?),
            Some(_) => {
                return Err(BeerError::Config(
                    "--secure given with no inline key and KEY is unset".to_string(),
                ));
            }
        };

        let verbosity = if args.debug {
            Verbosity::Debug
        } else if args.silent {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        };

        if args.board_size == 0 || args.board_size > 26 {
            return Err(BeerError::Config(format!(
                "board size {} out of range 1..=26",
                args.board_size
            )));
        }

        Ok(Config {
            host: args.host,
            port,
            key,
            one_ship: args.one_ship,
            board_size: args.board_size,
            turn_timeout: Duration::from_secs(args.turn_timeout),
            place_timeout: DEFAULT_T_PLACE,
            reconnect_timeout: DEFAULT_T_RECONNECT,
            handshake_timeout: DEFAULT_T_HANDSHAKE,
            verbosity,
        })
    }
}
