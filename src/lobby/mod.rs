//! Lobby / dispatcher (C5): owns the listening socket, classifies
//! arrivals into reconnects, spectators, or waiting players, pairs
//! waiting players into matches, and applies the post-match requeue
//! policy.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::board::SimpleBoard;
use crate::core::traits::Board;
use crate::frame::{CryptoKey, FrameType};
use crate::net::Transport;
use crate::protocol::GameMessage;
use crate::reconnect::ReconnectRegistry;
use crate::session::{MatchReport, MatchSession, MatchTimeouts, Outcome, Slot, SlotId};
use crate::spectator::SpectatorQueue;

/// A transport waiting to be paired, alongside the token it handshook
/// with.
type WaitingEntry = (String, Arc<Transport>);

/// The slots and spectator sink of the currently-running match, kept
/// here (not inside the session) purely so a late-joining spectator can
/// be handed an immediate snapshot. `Slot` has no reference back to its
/// session, so this does not create a reference cycle between the match,
/// the queue, and the session.
struct RunningMatch {
    spectators: Arc<SpectatorQueue>,
    slot_a: Arc<Slot>,
    slot_b: Arc<Slot>,
}

struct LobbyState {
    waiting: VecDeque<WaitingEntry>,
    running: Option<RunningMatch>,
}

/// The server's single accept-loop-and-dispatch component.
///
/// Runs in single-match-at-a-time mode: only one [`MatchSession`] is
/// ever in flight, matching the one `RunningMatch`/one `SpectatorQueue`
/// shape held by [`LobbyState`].
pub struct Lobby {
    reconnect: Arc<ReconnectRegistry>,
    board_size: usize,
    one_ship: bool,
    timeouts: MatchTimeouts,
    handshake_timeout: Duration,
    key: Option<CryptoKey>,
    state: Mutex<LobbyState>,
}

impl Lobby {
    /// Build a lobby sharing `reconnect` with every match it starts.
    pub fn new(
        reconnect: Arc<ReconnectRegistry>,
        board_size: usize,
        one_ship: bool,
        timeouts: MatchTimeouts,
        handshake_timeout: Duration,
        key: Option<CryptoKey>,
    ) -> Arc<Self> {
        Arc::new(Self {
            reconnect,
            board_size,
            one_ship,
            timeouts,
            handshake_timeout,
            key,
            state: Mutex::new(LobbyState {
                waiting: VecDeque::new(),
                running: None,
            }),
        })
    }

    fn make_board(&self) -> Box<dyn Board> {
        if self.one_ship {
            Box::new(SimpleBoard::new_one_ship(self.board_size))
        } else {
            Box::new(SimpleBoard::new(self.board_size))
        }
    }

    /// Accept connections from `listener` until `shutdown` is signalled.
    pub async fn run(self: Arc<Self>, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((socket, peer)) => {
                            let lobby = self.clone();
                            tokio::spawn(async move {
                                lobby.handle_connection(socket).await;
                            }.instrument(info_span!("connection", %peer)));
                        }
                        Err(err) => warn!(?err, "accept failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("lobby shutting down; no longer accepting connections");
                        self.drain_waiting().await;
                        break;
                    }
                }
            }
        }
    }

    /// Close out every still-waiting (unpaired) transport. Matches
    /// already in flight are left to run to their own natural
    /// conclusion, bounded as always by `T_turn`/`T_reconnect`.
    async fn drain_waiting(&self) {
        let mut state = self.state.lock().await;
        let dropped = state.waiting.len();
        state.waiting.clear();
        if dropped > 0 {
            debug!(dropped, "closed unpaired waiting connections on shutdown");
        }
    }

    async fn handle_connection(self: Arc<Self>, socket: TcpStream) {
        let transport = match Transport::new(socket, self.key.clone()) {
            Ok(transport) => Arc::new(transport),
            Err(err) => {
                warn!(?err, "failed to wrap accepted socket");
                return;
            }
        };

        let line = match transport.read_handshake_line(self.handshake_timeout).await {
            Ok(line) => line,
            Err(err) => {
                debug!(?err, peer = %transport.peer_addr(), "handshake failed");
                return;
            }
        };

        let Some(token) = parse_handshake(&line) else {
            debug!(%line, "malformed handshake line");
            return;
        };

        self.admit(token, transport).await;
    }

    /// Classify a handshook transport: reattach to a pending reconnect,
    /// join the running match as a spectator, or enqueue as a waiting
    /// player (the "Accept loop").
    async fn admit(self: Arc<Self>, token: String, transport: Arc<Transport>) {
        if self.reconnect.contains(&token).await {
            match self.reconnect.attach(&token, transport.clone()).await {
                Ok(()) => {
                    info!(%token, "reattached");
                    return;
                }
                Err(_) => {
                    // Lost the race to another concurrent attacher (the
                    // "Collision rule" / testable property "Token collision").
                    warn!(%token, "duplicate token during reconnect window");
                    let _ = transport
                        .send_json(
                            FrameType::Game,
                            &GameMessage::err("duplicate_token", "token already bound"),
                        )
                        .await;
                    return;
                }
            }
        }

        let spectate_into = {
            let mut state = self.state.lock().await;
            match &state.running {
                Some(running) => Some((running.spectators.clone(), running.slot_a.clone(), running.slot_b.clone())),
                None => {
                    state.waiting.push_back((token, transport.clone()));
                    None
                }
            }
        };

        match spectate_into {
            Some((spectators, slot_a, slot_b)) => {
                spectators.add(transport.clone()).await;
                self.send_spectator_snapshot(&transport, &slot_a, &slot_b).await;
            }
            None => self.try_start_match().await,
        }
    }

    async fn send_spectator_snapshot(&self, transport: &Transport, slot_a: &Slot, slot_b: &Slot) {
        let a = slot_a.board.lock().await.render_self();
        let b = slot_b.board.lock().await.render_self();
        let _ = transport.send_json(FrameType::Game, &GameMessage::Grid { rows: a }).await;
        let _ = transport.send_json(FrameType::Game, &GameMessage::Grid { rows: b }).await;
    }

    /// Pair the first two waiting entries into a new match, if no match
    /// is running and at least two are waiting (the "Pairing").
    async fn try_start_match(self: Arc<Self>) {
        let session = {
            let mut state = self.state.lock().await;
            if state.running.is_some() || state.waiting.len() < 2 {
                return;
            }
            let (token_a, transport_a) = state.waiting.pop_front().expect("len checked above");
            let (token_b, transport_b) = state.waiting.pop_front().expect("len checked above");

            let slot_a = Arc::new(Slot::new(token_a, transport_a, self.make_board()));
            let slot_b = Arc::new(Slot::new(token_b, transport_b, self.make_board()));
            let spectators = Arc::new(SpectatorQueue::new());

            state.running = Some(RunningMatch {
                spectators: spectators.clone(),
                slot_a: slot_a.clone(),
                slot_b: slot_b.clone(),
            });

            info!(a = %slot_a.token, b = %slot_b.token, "starting match");
            MatchSession::new(
                slot_a,
                slot_b,
                spectators,
                self.reconnect.clone(),
                self.board_size,
                self.timeouts,
            )
        };

        let lobby = self.clone();
        tokio::spawn(async move {
            let report = session.run().await;
            lobby.on_match_finished(report).await;
        });
    }

    /// Apply the post-match requeue policy and look for a new pairing.
    async fn on_match_finished(self: Arc<Self>, report: MatchReport) {
        let MatchReport { outcome, slot_a, slot_b } = report;

        let requeue = match outcome {
            Outcome::Win { winner, cause } => {
                let (winner_report, loser_report) = match winner {
                    SlotId::A => (slot_a, slot_b),
                    SlotId::B => (slot_b, slot_a),
                };
                let mut requeue = Vec::new();
                if let Some(transport) = winner_report.transport {
                    requeue.push((true, winner_report.token, transport));
                } else {
                    debug!(token = %winner_report.token, "winner's transport already dead; not requeued");
                }
                if cause.is_none() {
                    if let Some(transport) = loser_report.transport {
                        requeue.push((false, loser_report.token, transport));
                    }
                }
                requeue
            }
            Outcome::Abandoned => Vec::new(),
        };

        {
            let mut state = self.state.lock().await;
            state.running = None;
            for (is_winner, token, transport) in requeue {
                if is_winner {
                    state.waiting.push_front((token, transport));
                } else {
                    state.waiting.push_back((token, transport));
                }
            }
        }

        self.try_start_match().await;
    }
}

/// Parse the unframed handshake line `TOKEN <id>`.
fn parse_handshake(line: &str) -> Option<String> {
    let id = line.strip_prefix("TOKEN ")?.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}
