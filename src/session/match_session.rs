//! The match session coordinator (C4): placement, turn cycle, suspension,
//! and termination.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::core::traits::Coord;
use crate::frame::FrameType;
use crate::net::Transport;
use crate::protocol::{ChatMessage, GameMessage};
use crate::reconnect::{ReconnectRegistry, WaitOutcome};
use crate::session::command::Command;
use crate::session::slot::{Slot, SlotId};
use crate::session::state::{MatchState, Outcome, SuspendCause};
use crate::spectator::SpectatorQueue;

/// Tunables a session needs from configuration (the "Cancellation &
/// timeouts").
#[derive(Debug, Clone, Copy)]
pub struct MatchTimeouts {
    /// Per-ship placement timeout.
    pub place: Duration,
    /// Per-turn timeout for the active slot.
    pub turn: Duration,
    /// Bound on `C2.wait` during a suspension.
    pub reconnect: Duration,
}

/// What the lobby should do with each side once the match ends.
pub struct SlotReport {
    /// The slot's durable token.
    pub token: String,
    /// Still-live transport, if the slot wasn't terminally dropped.
    pub transport: Option<Arc<Transport>>,
    /// Whether this slot was the match's winner.
    pub is_winner: bool,
}

/// Final report handed back to the lobby after [`MatchSession::run`].
pub struct MatchReport {
    /// The terminal outcome.
    pub outcome: Outcome,
    /// `SLOT_A`'s report.
    pub slot_a: SlotReport,
    /// `SLOT_B`'s report.
    pub slot_b: SlotReport,
}

enum TurnOutcome {
    Continue,
    Terminal(Outcome),
}

enum SuspendResolution {
    Resumed,
    Terminal(Outcome),
}

/// Drives one match end to end.
pub struct MatchSession {
    slot_a: Arc<Slot>,
    slot_b: Arc<Slot>,
    spectators: Arc<SpectatorQueue>,
    reconnect: Arc<ReconnectRegistry>,
    board_size: usize,
    timeouts: MatchTimeouts,
    active: SlotId,
    state: MatchState,
    half_turns: u32,
    pending_command: Option<Command>,
}

impl MatchSession {
    /// Build a session for two freshly-paired slots.
    pub fn new(
        slot_a: Arc<Slot>,
        slot_b: Arc<Slot>,
        spectators: Arc<SpectatorQueue>,
        reconnect: Arc<ReconnectRegistry>,
        board_size: usize,
        timeouts: MatchTimeouts,
    ) -> Self {
        Self {
            slot_a,
            slot_b,
            spectators,
            reconnect,
            board_size,
            timeouts,
            active: SlotId::A,
            state: MatchState::PlacingA,
            half_turns: 0,
            pending_command: None,
        }
    }

    fn slot(&self, id: SlotId) -> &Arc<Slot> {
        match id {
            SlotId::A => &self.slot_a,
            SlotId::B => &self.slot_b,
        }
    }

    /// Run the match to completion.
    pub async fn run(mut self) -> MatchReport {
        let span = info_span!("match", a = %self.slot_a.token, b = %self.slot_b.token);
        async {
            let outcome = self.run_inner().await;
            self.finish(outcome).await
        }
        .instrument(span)
        .await
    }

    async fn run_inner(&mut self) -> Outcome {
        self.state = MatchState::PlacingA;
        if let Some(outcome) = self.run_placement(SlotId::A).await {
            return outcome;
        }
        self.state = MatchState::PlacingB;
        if let Some(outcome) = self.run_placement(SlotId::B).await {
            return outcome;
        }

        self.active = SlotId::A;
        loop {
            self.state = MatchState::AwaitTurn;
            match self.turn_cycle().await {
                TurnOutcome::Continue => continue,
                TurnOutcome::Terminal(outcome) => return outcome,
            }
        }
    }

    /// Placement entry (the "Entry: `PLACING_A` → `PLACING_B`").
    ///
    /// The interactive placement collaborator requires a human-rendering
    /// client (out of scope); this session always drives
    /// placement automatically, wrapped in `T_place` to bound a
    /// misbehaving `Board` implementation.
    async fn run_placement(&mut self, id: SlotId) -> Option<Outcome> {
        let slot = self.slot(id).clone();
        let placed = tokio::time::timeout(self.timeouts.place, async {
            slot.board.lock().await.place_ships_randomly();
        })
        .await;

        if placed.is_err() {
            warn!(slot = ?id, "placement timed out");
            return match self.suspend(id, SuspendCause::PlacementDrop).await {
                SuspendResolution::Resumed => None,
                SuspendResolution::Terminal(outcome) => Some(outcome),
            };
        }
        None
    }

    /// One `AWAIT_TURN` → (`EXECUTE_SHOT` | `SUSPENDED`) cycle.
    async fn turn_cycle(&mut self) -> TurnOutcome {
        let active = self.active;
        let passive = active.other();

        self.broadcast_turn_views(active, passive).await;
        if let Err(err) = self
            .slot(active)
            .transport()
            .await
            .send_json(FrameType::Game, &GameMessage::Prompt)
            .await
        {
            debug!(?err, "failed to prompt active slot");
        }

        let command = match self.pending_command.take() {
            Some(command) => command,
            None => match self.collect_active_command(active, passive).await {
                Ok(command) => command,
                Err(outcome) => return TurnOutcome::Terminal(outcome),
            },
        };

        match command {
            Command::Quit => TurnOutcome::Terminal(Outcome::Win {
                winner: passive,
                cause: Some("concession"),
            }),
            Command::Fire(coord) => {
                self.state = MatchState::ExecuteShot;
                self.execute_shot(active, passive, coord).await
            }
            Command::Chat(_) => unreachable!("chat is consumed inside collect_active_command"),
        }
    }

    /// Wait for the active slot's one actionable command, meanwhile
    /// watching the passive slot for `CHAT`/disconnection. Returns
    /// `Err(outcome)` only when the wait ends in a terminal match state.
    async fn collect_active_command(
        &mut self,
        active: SlotId,
        passive: SlotId,
    ) -> Result<Command, Outcome> {
        // One fixed deadline for the whole wait: a CHAT or a malformed
        // command from either slot must not push T_turn back, or a chatty
        // client can stall the active slot's clock indefinitely. Only a
        // suspend-and-resume (the active slot actually went away and came
        // back) earns a fresh deadline.
        let mut deadline = tokio::time::Instant::now() + self.timeouts.turn;
        loop {
            let active_transport = self.slot(active).transport().await;
            let passive_transport = self.slot(passive).transport().await;

            tokio::select! {
                result = tokio::time::timeout_at(deadline, active_transport.recv_application_frame()) => {
                    match result {
                        Err(_elapsed) => {
                            match self.suspend(active, SuspendCause::TurnTimeout).await {
                                SuspendResolution::Resumed => {
                                    if let Some(command) = self.pending_command.take() {
                                        return Ok(command);
                                    }
                                    deadline = tokio::time::Instant::now() + self.timeouts.turn;
                                    continue;
                                }
                                SuspendResolution::Terminal(outcome) => return Err(outcome),
                            }
                        }
                        Ok(Err(_eof)) => {
                            match self.suspend(active, SuspendCause::TransportEof).await {
                                SuspendResolution::Resumed => {
                                    if let Some(command) = self.pending_command.take() {
                                        return Ok(command);
                                    }
                                    deadline = tokio::time::Instant::now() + self.timeouts.turn;
                                    continue;
                                }
                                SuspendResolution::Terminal(outcome) => return Err(outcome),
                            }
                        }
                        Ok(Ok(frame)) => match Command::parse(&frame, self.board_size) {
                            Ok(Command::Chat(chat)) => {
                                self.broadcast_chat(active, &chat).await;
                            }
                            Ok(command) => return Ok(command),
                            Err(_) => {
                                let _ = active_transport
                                    .send_json(FrameType::Game, &GameMessage::err("bad_command", "malformed command"))
                                    .await;
                            }
                        },
                    }
                }
                result = passive_transport.recv_application_frame() => {
                    match result {
                        Err(_eof) => {
                            match self.suspend(passive, SuspendCause::TransportEof).await {
                                SuspendResolution::Resumed => {}
                                SuspendResolution::Terminal(outcome) => return Err(outcome),
                            }
                        }
                        Ok(frame) => match Command::parse(&frame, self.board_size) {
                            Ok(Command::Chat(chat)) => {
                                self.broadcast_chat(passive, &chat).await;
                            }
                            _ => {
                                let _ = passive_transport
                                    .send_json(FrameType::Game, &GameMessage::err("bad_command", "not your turn"))
                                    .await;
                            }
                        },
                    }
                }
            }
        }
    }

    async fn execute_shot(&mut self, active: SlotId, passive: SlotId, coord: Coord) -> TurnOutcome {
        let (result, sunk_name) = {
            let mut board = self.slot(passive).board.lock().await;
            board.fire_at(coord)
        };

        let msg = GameMessage::Shot {
            coord: coord.to_wire(),
            result: result.as_wire_str().to_string(),
            sunk: sunk_name.clone(),
        };
        self.send_to(active, &msg).await;
        self.send_to(passive, &msg).await;
        self.spectators.broadcast(FrameType::Game, &msg).await;

        self.half_turns += 1;
        if self.half_turns % 2 == 0 {
            self.send_spectator_cadence_snapshot().await;
        }

        let all_sunk = self.slot(passive).board.lock().await.all_ships_sunk();
        if all_sunk {
            TurnOutcome::Terminal(Outcome::Win {
                winner: active,
                cause: None,
            })
        } else {
            self.active = passive;
            TurnOutcome::Continue
        }
    }

    /// Handle a slot dying, by turn timeout, EOF, or CRC-quota escalation
    /// (the `SUSPENDED`).
    async fn suspend(&mut self, dropped: SlotId, cause: SuspendCause) -> SuspendResolution {
        info!(slot = ?dropped, ?cause, "suspending");
        self.state = MatchState::Suspended;
        self.slot(dropped).mark_dead();

        if !self.slot(dropped.other()).is_alive() {
            info!("both slots dead in the same window; abandoning match");
            return SuspendResolution::Terminal(Outcome::Abandoned);
        }

        self.suspend_via_reconnect(dropped).await
    }

    async fn suspend_via_reconnect(&mut self, dropped: SlotId) -> SuspendResolution {
        let slot = self.slot(dropped).clone();
        let token = slot.token.clone();

        if self.reconnect.register(&token).await.is_ok() {
            let outcome = self.reconnect.wait(&token, self.timeouts.reconnect).await;
            if outcome == WaitOutcome::Attached {
                if let Some(new_transport) = self.reconnect.take_attached(&token).await {
                    slot.replace_transport(new_transport).await;
                    info!(slot = ?dropped, "reattached");
                    self.send_resume_snapshot(dropped).await;
                    return SuspendResolution::Resumed;
                }
            }
        }

        self.suspend_via_promotion(dropped).await
    }

    async fn suspend_via_promotion(&mut self, dropped: SlotId) -> SuspendResolution {
        loop {
            let Some(new_transport) = self.spectators.promote().await else {
                info!(slot = ?dropped, "spectator queue empty; opponent wins on timeout");
                return SuspendResolution::Terminal(Outcome::Win {
                    winner: dropped.other(),
                    cause: Some("timeout"),
                });
            };

            let slot = self.slot(dropped).clone();
            slot.replace_transport(new_transport).await;
            info!(slot = ?dropped, "promoted spectator");
            self.send_resume_snapshot(dropped).await;

            if dropped != self.active {
                return SuspendResolution::Resumed;
            }

            // The promoted occupant must itself take a turn to "survive";
            // otherwise re-promote (the cascading promotion).
            let transport = slot.transport().await;
            if transport
                .send_json(FrameType::Game, &GameMessage::Prompt)
                .await
                .is_err()
            {
                slot.mark_dead();
                continue;
            }

            match self.await_one_command(&slot, dropped).await {
                Some(command) => {
                    self.pending_command = Some(command);
                    return SuspendResolution::Resumed;
                }
                None => {
                    slot.mark_dead();
                    continue;
                }
            }
        }
    }

    /// Wait (bounded by `T_turn`) for one `FIRE`/`QUIT` from `slot`,
    /// forwarding any `CHAT` encountered along the way. The deadline is
    /// fixed once, so a CHAT can't extend the bound.
    async fn await_one_command(&self, slot: &Arc<Slot>, id: SlotId) -> Option<Command> {
        let deadline = tokio::time::Instant::now() + self.timeouts.turn;
        loop {
            let transport = slot.transport().await;
            let result = tokio::time::timeout_at(deadline, transport.recv_application_frame()).await;
            match result {
                Err(_) | Ok(Err(_)) => return None,
                Ok(Ok(frame)) => match Command::parse(&frame, self.board_size) {
                    Ok(Command::Chat(chat)) => self.broadcast_chat(id, &chat).await,
                    Ok(command) => return Some(command),
                    Err(_) => {
                        let _ = transport
                            .send_json(FrameType::Game, &GameMessage::err("bad_command", "malformed command"))
                            .await;
                    }
                },
            }
        }
    }

    async fn send_resume_snapshot(&self, id: SlotId) {
        let own = self.slot(id).board.lock().await.render_self();
        let opp = self.slot(id.other()).board.lock().await.render_opponent_view();
        self.send_to(id, &GameMessage::Grid { rows: own }).await;
        self.send_to(id, &GameMessage::Oppgrid { rows: opp }).await;
    }

    async fn broadcast_turn_views(&self, active: SlotId, passive: SlotId) {
        let active_view = self.slot(active.other()).board.lock().await.render_opponent_view();
        self.send_to(
            active,
            &GameMessage::Oppgrid {
                rows: active_view,
            },
        )
        .await;
        let passive_view = self.slot(passive).board.lock().await.render_self();
        self.send_to(passive, &GameMessage::Grid { rows: passive_view }).await;
    }

    async fn send_spectator_cadence_snapshot(&self) {
        let a = self.slot_a.board.lock().await.render_self();
        let b = self.slot_b.board.lock().await.render_self();
        self.spectators
            .broadcast(FrameType::Game, &GameMessage::Grid { rows: a })
            .await;
        self.spectators
            .broadcast(FrameType::Game, &GameMessage::Grid { rows: b })
            .await;
    }

    async fn broadcast_chat(&self, from: SlotId, chat: &ChatMessage) {
        self.send_frame_to(from.other(), FrameType::Chat, chat).await;
        self.spectators.broadcast(FrameType::Chat, chat).await;
    }

    async fn send_to<T: serde::Serialize>(&self, id: SlotId, value: &T) {
        self.send_frame_to(id, FrameType::Game, value).await;
    }

    async fn send_frame_to<T: serde::Serialize>(&self, id: SlotId, frame_type: FrameType, value: &T) {
        let transport = self.slot(id).transport().await;
        if let Err(err) = transport.send_json(frame_type, value).await {
            debug!(slot = ?id, ?err, "send failed");
        }
    }

    async fn finish(mut self, outcome: Outcome) -> MatchReport {
        self.state = MatchState::Terminal;
        let end = GameMessage::End {
            outcome: outcome.wire_outcome().to_string(),
            cause: outcome.wire_cause().map(str::to_string),
        };

        for id in [SlotId::A, SlotId::B] {
            if self.slot(id).is_alive() {
                self.send_to(id, &end).await;
            }
        }
        self.spectators.broadcast(FrameType::Game, &end).await;

        self.reconnect.cancel(&self.slot_a.token).await;
        self.reconnect.cancel(&self.slot_b.token).await;

        let winner = match &outcome {
            Outcome::Win { winner, .. } => Some(*winner),
            Outcome::Abandoned => None,
        };

        let slot_a_transport = self.slot_a.is_alive().then(|| self.slot_a.transport());
        let slot_b_transport = self.slot_b.is_alive().then(|| self.slot_b.transport());
        let slot_a_transport = match slot_a_transport {
            Some(fut) => Some(fut.await),
            None => None,
        };
        let slot_b_transport = match slot_b_transport {
            Some(fut) => Some(fut.await),
            None => None,
        };

        MatchReport {
            slot_a: SlotReport {
                token: self.slot_a.token.clone(),
                transport: slot_a_transport,
                is_winner: winner == Some(SlotId::A),
            },
            slot_b: SlotReport {
                token: self.slot_b.token.clone(),
                transport: slot_b_transport,
                is_winner: winner == Some(SlotId::B),
            },
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::SimpleBoard;
    use serde_json::json;
    use tokio::net::{TcpListener, TcpStream};

    async fn connected_transport_pair() -> (Arc<Transport>, Arc<Transport>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accept, connect) = tokio::join!(listener.accept(), TcpStream::connect(addr));
        let (server_sock, _) = accept.unwrap();
        let client_sock = connect.unwrap();
        (
            Arc::new(Transport::new(server_sock, None).unwrap()),
            Arc::new(Transport::new(client_sock, None).unwrap()),
        )
    }

    fn default_timeouts() -> MatchTimeouts {
        MatchTimeouts {
            place: Duration::from_secs(2),
            turn: Duration::from_secs(5),
            reconnect: Duration::from_secs(5),
        }
    }

    async fn recv_game(transport: &Transport) -> GameMessage {
        let frame = transport.recv_application_frame().await.unwrap();
        Transport::parse_payload(&frame).unwrap()
    }

    /// A 1x1 one-ship board makes placement deterministic (the only legal
    /// position is `A1`) and a single hit both sinks the ship and ends
    /// the match, keeping this end-to-end test short.
    #[tokio::test]
    async fn single_shot_sinks_and_ends_the_match() {
        let (server_a, client_a) = connected_transport_pair().await;
        let (server_b, client_b) = connected_transport_pair().await;

        let slot_a = Arc::new(Slot::new(
            "PID1".into(),
            server_a,
            Box::new(SimpleBoard::new_one_ship(1)),
        ));
        let slot_b = Arc::new(Slot::new(
            "PID2".into(),
            server_b,
            Box::new(SimpleBoard::new_one_ship(1)),
        ));

        let session = MatchSession::new(
            slot_a,
            slot_b,
            Arc::new(SpectatorQueue::new()),
            Arc::new(ReconnectRegistry::new()),
            1,
            default_timeouts(),
        );
        let handle = tokio::spawn(session.run());

        assert!(matches!(recv_game(&client_a).await, GameMessage::Oppgrid { .. }));
        assert!(matches!(recv_game(&client_a).await, GameMessage::Prompt));
        assert!(matches!(recv_game(&client_b).await, GameMessage::Grid { .. }));

        client_a
            .send_json(FrameType::Game, &json!({"type": "fire", "coord": "A1"}))
            .await
            .unwrap();

        match recv_game(&client_a).await {
            GameMessage::Shot { result, .. } => assert_eq!(result, "SUNK"),
            other => panic!("expected shot, got {other:?}"),
        }
        match recv_game(&client_b).await {
            GameMessage::Shot { result, .. } => assert_eq!(result, "SUNK"),
            other => panic!("expected shot, got {other:?}"),
        }

        match recv_game(&client_a).await {
            GameMessage::End { outcome, .. } => assert_eq!(outcome, "A_win"),
            other => panic!("expected end, got {other:?}"),
        }
        match recv_game(&client_b).await {
            GameMessage::End { outcome, .. } => assert_eq!(outcome, "A_win"),
            other => panic!("expected end, got {other:?}"),
        }

        let report = handle.await.unwrap();
        assert!(matches!(report.outcome, Outcome::Win { winner: SlotId::A, cause: None }));
        assert!(report.slot_a.is_winner);
        assert!(!report.slot_b.is_winner);
    }

    #[tokio::test]
    async fn quit_ends_match_as_opponent_concession_win() {
        let (server_a, client_a) = connected_transport_pair().await;
        let (server_b, client_b) = connected_transport_pair().await;

        let slot_a = Arc::new(Slot::new(
            "PID1".into(),
            server_a,
            Box::new(SimpleBoard::new_one_ship(1)),
        ));
        let slot_b = Arc::new(Slot::new(
            "PID2".into(),
            server_b,
            Box::new(SimpleBoard::new_one_ship(1)),
        ));

        let session = MatchSession::new(
            slot_a,
            slot_b,
            Arc::new(SpectatorQueue::new()),
            Arc::new(ReconnectRegistry::new()),
            1,
            default_timeouts(),
        );
        let handle = tokio::spawn(session.run());

        let _ = recv_game(&client_a).await; // oppgrid
        let _ = recv_game(&client_a).await; // prompt
        let _ = recv_game(&client_b).await; // grid

        client_a
            .send_json(FrameType::Game, &json!({"type": "quit"}))
            .await
            .unwrap();

        match recv_game(&client_b).await {
            GameMessage::End { outcome, cause } => {
                assert_eq!(outcome, "B_win");
                assert_eq!(cause.as_deref(), Some("concession"));
            }
            other => panic!("expected end, got {other:?}"),
        }

        let report = handle.await.unwrap();
        assert!(report.slot_b.is_winner);
    }
}
