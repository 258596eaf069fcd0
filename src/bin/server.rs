//! `beer-server` entry point: parse configuration, bind the listening
//! socket, run the lobby accept loop, and shut down cleanly on signal.

use std::process::ExitCode;

use beer_server::core::error::BeerError;
use beer_server::lobby::Lobby;
use beer_server::{Config, Verbosity};
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbosity: Verbosity) {
    let default_directive = match verbosity {
        Verbosity::Debug => "beer_server=debug,info",
        Verbosity::Normal => "beer_server=info,warn",
        Verbosity::Quiet => "warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("beer-server: configuration error: {err}");
            return ExitCode::from(1);
        }
    };

    init_tracing(config.verbosity);

    match run(config).await {
        Ok(RunOutcome::Sigint) => ExitCode::from(130),
        Ok(RunOutcome::Clean) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "fatal error");
            ExitCode::from(1)
        }
    }
}

enum RunOutcome {
    /// Stopped because of `SIGINT` (exit code 130).
    Sigint,
    /// Stopped because of `SIGTERM` or a clean internal shutdown.
    Clean,
}

async fn run(config: Config) -> Result<RunOutcome, BeerError> {
    let addr = std::net::SocketAddr::new(config.host, config.port);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    let timeouts = beer_server::session::MatchTimeouts {
        place: config.place_timeout,
        turn: config.turn_timeout,
        reconnect: config.reconnect_timeout,
    };

    let lobby = Lobby::new(
        std::sync::Arc::new(beer_server::reconnect::ReconnectRegistry::new()),
        config.board_size,
        config.one_ship,
        timeouts,
        config.handshake_timeout,
        config.key,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let lobby_handle = tokio::spawn(lobby.run(listener, shutdown_rx));

    let mut sigterm = signal(SignalKind::terminate())?;
    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT");
            RunOutcome::Sigint
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM");
            RunOutcome::Clean
        }
    };

    let _ = shutdown_tx.send(true);
    let _ = lobby_handle.await;

    Ok(outcome)
}
