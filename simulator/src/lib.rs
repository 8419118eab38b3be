//! In-memory match server for local development and tests.
//!
//! Matches live in one mutex-guarded table and clients talk to them over
//! the WebSocket handlers in [`api`]. Moves are validated with the same
//! rules crate the client gates on, so a well-behaved client only ever
//! receives confirmations here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use parlor_games::{evaluate_terminal, is_legal_move, Board};
use parlor_types::{
    ClientMessage, GameKind, GameStateData, GridMove, Mark, MoveResult, Outcome, ServerMessage,
    SessionStatus,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub mod api;
mod metrics;

pub use api::Api;
pub use metrics::MetricsSnapshot;

use metrics::Metrics;

const SEATS_PER_MATCH: usize = 2;

/// Outbound frames buffered per connection ahead of the socket writer.
pub(crate) const OUTBOUND_CAPACITY: usize = 256;

/// One item for a connection's writer task.
#[derive(Debug)]
pub(crate) enum OutboundFrame {
    Message(ServerMessage),
    Pong(Vec<u8>),
    /// Makes the writer close the socket; lets tests exercise client
    /// reconnects.
    Close,
}

pub(crate) type OutboundSender = mpsc::Sender<OutboundFrame>;

struct Seat {
    player_id: String,
    mark: Mark,
    /// Connection id and writer queue, absent while the player is offline.
    connection: Option<(u64, OutboundSender)>,
}

struct MatchState {
    kind: GameKind,
    board: Board,
    status: SessionStatus,
    current_turn: Mark,
    outcome: Option<Outcome>,
    /// Join order: the first seat plays X.
    seats: Vec<Seat>,
}

impl MatchState {
    fn new(kind: GameKind) -> Self {
        Self {
            kind,
            board: Board::for_kind(kind),
            status: SessionStatus::Waiting,
            current_turn: Mark::X,
            outcome: None,
            seats: Vec::new(),
        }
    }

    fn game_state(&self) -> ServerMessage {
        ServerMessage::GameState(GameStateData {
            board: self.board.rows(),
            current_player: self.current_turn,
            game_over: self.status == SessionStatus::Finished,
            winner: self.outcome,
        })
    }
}

/// Match registry plus per-connection bookkeeping.
pub struct Simulator {
    matches: Mutex<HashMap<String, MatchState>>,
    next_connection_id: AtomicU64,
    metrics: Metrics,
}

impl Simulator {
    pub fn new() -> Self {
        Self {
            matches: Mutex::new(HashMap::new()),
            next_connection_id: AtomicU64::new(0),
            metrics: Metrics::default(),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Closes every live socket server side. Lets tests exercise client
    /// reconnects without restarting the server.
    pub fn disconnect_all(&self) {
        let matches = self.matches.lock().unwrap();
        for state in matches.values() {
            for seat in &state.seats {
                if let Some((_, outbound)) = &seat.connection {
                    let _ = outbound.try_send(OutboundFrame::Close);
                }
            }
        }
    }

    pub(crate) fn connection_opened(&self) -> u64 {
        self.metrics.inc_connections_opened();
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Vacates any seat the connection held. The seat itself stays, so the
    /// same player id can reclaim it later.
    pub(crate) fn connection_closed(&self, connection_id: u64) {
        self.metrics.inc_connections_closed();
        let mut matches = self.matches.lock().unwrap();
        for state in matches.values_mut() {
            for seat in &mut state.seats {
                if seat
                    .connection
                    .as_ref()
                    .is_some_and(|(id, _)| *id == connection_id)
                {
                    seat.connection = None;
                    debug!(player = %seat.player_id, "seat connection vacated");
                }
            }
        }
    }

    pub(crate) fn handle_message(
        &self,
        connection_id: u64,
        outbound: &OutboundSender,
        message: ClientMessage,
    ) {
        self.metrics.inc_messages_received();
        match message {
            ClientMessage::JoinGame {
                match_id,
                game_type,
                player_id,
            } => self.join_game(connection_id, outbound, match_id, game_type, player_id),
            ClientMessage::MakeMove {
                match_id,
                game_type: _,
                position,
                player_id,
            } => self.make_move(outbound, &match_id, position, &player_id),
            ClientMessage::RestartGame {
                match_id,
                game_type: _,
            } => self.restart_game(outbound, &match_id),
        }
    }

    fn join_game(
        &self,
        connection_id: u64,
        outbound: &OutboundSender,
        match_id: String,
        game_type: GameKind,
        player_id: String,
    ) {
        let mut matches = self.matches.lock().unwrap();
        let state = matches.entry(match_id.clone()).or_insert_with(|| {
            self.metrics.inc_matches_created();
            info!(match_id = %match_id, kind = %game_type, "match created");
            MatchState::new(game_type)
        });
        if state.kind != game_type {
            self.send_error(
                outbound,
                format!("match {match_id} is {}, not {game_type}", state.kind),
            );
            return;
        }

        // Same player id means a reconnect, not a new challenger.
        if let Some(seat) = state
            .seats
            .iter_mut()
            .find(|seat| seat.player_id == player_id)
        {
            seat.connection = Some((connection_id, outbound.clone()));
            info!(match_id = %match_id, player = %player_id, mark = %seat.mark, "player reclaimed seat");
            let players_count = state.seats.len() as u8;
            self.broadcast(state, &ServerMessage::PlayerJoined { players_count });
            if state.status != SessionStatus::Waiting {
                let sync = state.game_state();
                self.send(outbound, &sync);
            }
            return;
        }

        if state.seats.len() >= SEATS_PER_MATCH {
            self.send_error(outbound, format!("match {match_id} is full"));
            return;
        }

        let mark = if state.seats.is_empty() {
            Mark::X
        } else {
            Mark::O
        };
        state.seats.push(Seat {
            player_id: player_id.clone(),
            mark,
            connection: Some((connection_id, outbound.clone())),
        });
        info!(match_id = %match_id, player = %player_id, mark = %mark, "player seated");
        let players_count = state.seats.len() as u8;
        self.broadcast(state, &ServerMessage::PlayerJoined { players_count });

        if state.seats.len() == SEATS_PER_MATCH && state.status == SessionStatus::Waiting {
            state.status = SessionStatus::Playing;
            info!(match_id = %match_id, "match started");
            let sync = state.game_state();
            self.broadcast(state, &sync);
        }
    }

    fn make_move(
        &self,
        outbound: &OutboundSender,
        match_id: &str,
        position: GridMove,
        player_id: &str,
    ) {
        let mut matches = self.matches.lock().unwrap();
        let Some(state) = matches.get_mut(match_id) else {
            self.send_error(outbound, format!("unknown match {match_id}"));
            return;
        };
        let Some(mark) = state
            .seats
            .iter()
            .find(|seat| seat.player_id == player_id)
            .map(|seat| seat.mark)
        else {
            self.send_error(outbound, format!("{player_id} is not seated at {match_id}"));
            return;
        };

        let playable = state.status == SessionStatus::Playing
            && mark == state.current_turn
            && is_legal_move(&state.board, position);
        if !playable || state.board.place(position, mark).is_err() {
            debug!(
                match_id,
                player = player_id,
                status = %state.status,
                row = position.row,
                column = position.column,
                "rejecting move"
            );
            // Only the offender hears about a rejected move.
            self.send(
                outbound,
                &ServerMessage::MoveMade {
                    position,
                    player_symbol: mark,
                    result: MoveResult { valid: false },
                },
            );
            return;
        }

        state.current_turn = mark.opponent();
        self.broadcast(
            state,
            &ServerMessage::MoveMade {
                position,
                player_symbol: mark,
                result: MoveResult { valid: true },
            },
        );

        let terminal = evaluate_terminal(&state.board);
        if terminal.is_over() {
            state.status = SessionStatus::Finished;
            state.outcome = terminal.outcome();
            self.metrics.inc_matches_completed();
            info!(match_id, winner = ?state.outcome, "match finished");
            self.broadcast(
                state,
                &ServerMessage::GameFinishedAutomatically {
                    winner: state.outcome,
                },
            );
        }
    }

    fn restart_game(&self, outbound: &OutboundSender, match_id: &str) {
        let mut matches = self.matches.lock().unwrap();
        let Some(state) = matches.get_mut(match_id) else {
            self.send_error(outbound, format!("unknown match {match_id}"));
            return;
        };
        if state.seats.len() < SEATS_PER_MATCH {
            self.send_error(outbound, format!("match {match_id} has no opponent yet"));
            return;
        }

        state.board.clear();
        state.status = SessionStatus::Playing;
        state.current_turn = Mark::X;
        state.outcome = None;
        info!(match_id, "match restarted");
        self.broadcast(state, &ServerMessage::GameRestarted {});
        let sync = state.game_state();
        self.broadcast(state, &sync);
    }

    fn broadcast(&self, state: &MatchState, message: &ServerMessage) {
        for seat in &state.seats {
            if let Some((_, outbound)) = &seat.connection {
                self.send(outbound, message);
            }
        }
    }

    fn send(&self, outbound: &OutboundSender, message: &ServerMessage) {
        match outbound.try_send(OutboundFrame::Message(message.clone())) {
            Ok(()) => self.metrics.inc_messages_sent(),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("dropping frame: outbound queue full");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    pub(crate) fn send_error(&self, outbound: &OutboundSender, message: String) {
        warn!(reason = %message, "rejecting client request");
        self.send(outbound, &ServerMessage::Error { message });
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (OutboundSender, mpsc::Receiver<OutboundFrame>) {
        mpsc::channel(OUTBOUND_CAPACITY)
    }

    fn recv_message(rx: &mut mpsc::Receiver<OutboundFrame>) -> ServerMessage {
        match rx.try_recv().expect("expected a frame") {
            OutboundFrame::Message(message) => message,
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<OutboundFrame>) {
        while rx.try_recv().is_ok() {}
    }

    fn join(sim: &Simulator, connection_id: u64, tx: &OutboundSender, player: &str) {
        sim.handle_message(
            connection_id,
            tx,
            ClientMessage::JoinGame {
                match_id: "m".to_string(),
                game_type: GameKind::TicTacToe,
                player_id: player.to_string(),
            },
        );
    }

    fn make_move(sim: &Simulator, tx: &OutboundSender, player: &str, row: u8, column: u8) {
        sim.handle_message(
            0,
            tx,
            ClientMessage::MakeMove {
                match_id: "m".to_string(),
                game_type: GameKind::TicTacToe,
                position: GridMove::new(row, column),
                player_id: player.to_string(),
            },
        );
    }

    #[test]
    fn second_join_starts_the_game() {
        let sim = Simulator::new();
        let (tx_a, mut rx_a) = connection();
        let (tx_b, mut rx_b) = connection();

        join(&sim, 1, &tx_a, "alice");
        assert!(matches!(
            recv_message(&mut rx_a),
            ServerMessage::PlayerJoined { players_count: 1 }
        ));

        join(&sim, 2, &tx_b, "bob");
        // Roster update, then a full sync, to both seats.
        assert!(matches!(
            recv_message(&mut rx_a),
            ServerMessage::PlayerJoined { players_count: 2 }
        ));
        let ServerMessage::GameState(sync) = recv_message(&mut rx_a) else {
            panic!("expected a sync");
        };
        assert!(!sync.game_over);
        assert_eq!(sync.current_player, Mark::X);
        assert!(matches!(
            recv_message(&mut rx_b),
            ServerMessage::PlayerJoined { players_count: 2 }
        ));
        assert!(matches!(
            recv_message(&mut rx_b),
            ServerMessage::GameState(_)
        ));

        let metrics = sim.metrics();
        assert_eq!(metrics.matches_created, 1);
        assert_eq!(metrics.messages_received, 2);
    }

    #[test]
    fn third_player_is_rejected() {
        let sim = Simulator::new();
        let (tx_a, mut rx_a) = connection();
        let (tx_b, _rx_b) = connection();
        let (tx_c, mut rx_c) = connection();

        join(&sim, 1, &tx_a, "alice");
        join(&sim, 2, &tx_b, "bob");
        drain(&mut rx_a);

        join(&sim, 3, &tx_c, "carol");
        assert!(matches!(
            recv_message(&mut rx_c),
            ServerMessage::Error { .. }
        ));
        assert!(rx_c.try_recv().is_err());
        // The seated players hear nothing about it.
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn moves_are_validated_and_broadcast() {
        let sim = Simulator::new();
        let (tx_a, mut rx_a) = connection();
        let (tx_b, mut rx_b) = connection();
        join(&sim, 1, &tx_a, "alice");
        join(&sim, 2, &tx_b, "bob");
        drain(&mut rx_a);
        drain(&mut rx_b);

        make_move(&sim, &tx_a, "alice", 0, 0);
        for rx in [&mut rx_a, &mut rx_b] {
            let ServerMessage::MoveMade {
                player_symbol,
                result,
                ..
            } = recv_message(rx)
            else {
                panic!("expected a confirmation");
            };
            assert_eq!(player_symbol, Mark::X);
            assert!(result.valid);
        }

        // Out of turn: only the offender hears about it.
        make_move(&sim, &tx_a, "alice", 1, 1);
        let ServerMessage::MoveMade { result, .. } = recv_message(&mut rx_a) else {
            panic!("expected a rejection");
        };
        assert!(!result.valid);
        assert!(rx_b.try_recv().is_err());

        // Occupied cell.
        make_move(&sim, &tx_b, "bob", 0, 0);
        let ServerMessage::MoveMade { result, .. } = recv_message(&mut rx_b) else {
            panic!("expected a rejection");
        };
        assert!(!result.valid);

        make_move(&sim, &tx_b, "bob", 1, 1);
        let ServerMessage::MoveMade { result, .. } = recv_message(&mut rx_b) else {
            panic!("expected a confirmation");
        };
        assert!(result.valid);
    }

    #[test]
    fn finishing_move_announces_the_result() {
        let sim = Simulator::new();
        let (tx_a, mut rx_a) = connection();
        let (tx_b, mut rx_b) = connection();
        join(&sim, 1, &tx_a, "alice");
        join(&sim, 2, &tx_b, "bob");

        for (player, tx, row, column) in [
            ("alice", &tx_a, 0, 0),
            ("bob", &tx_b, 1, 0),
            ("alice", &tx_a, 0, 1),
            ("bob", &tx_b, 1, 1),
            ("alice", &tx_a, 0, 2),
        ] {
            make_move(&sim, tx, player, row, column);
        }

        drain(&mut rx_a);
        // Bob's last two frames: the winning move, then the result.
        let mut frames = Vec::new();
        while let Ok(OutboundFrame::Message(message)) = rx_b.try_recv() {
            frames.push(message);
        }
        let last = frames.pop().expect("expected frames");
        assert!(matches!(
            last,
            ServerMessage::GameFinishedAutomatically {
                winner: Some(Outcome::Win(Mark::X)),
            }
        ));
        assert!(matches!(
            frames.pop().expect("expected the winning move"),
            ServerMessage::MoveMade {
                result: MoveResult { valid: true },
                ..
            }
        ));
        assert_eq!(sim.metrics().matches_completed, 1);

        // The finished board accepts no more moves.
        make_move(&sim, &tx_b, "bob", 2, 2);
        let ServerMessage::MoveMade { result, .. } = recv_message(&mut rx_b) else {
            panic!("expected a rejection");
        };
        assert!(!result.valid);
    }

    #[test]
    fn restart_resets_the_board() {
        let sim = Simulator::new();
        let (tx_a, mut rx_a) = connection();
        let (tx_b, mut rx_b) = connection();
        join(&sim, 1, &tx_a, "alice");
        join(&sim, 2, &tx_b, "bob");
        for (player, tx, row, column) in [
            ("alice", &tx_a, 0, 0),
            ("bob", &tx_b, 1, 0),
            ("alice", &tx_a, 0, 1),
            ("bob", &tx_b, 1, 1),
            ("alice", &tx_a, 0, 2),
        ] {
            make_move(&sim, tx, player, row, column);
        }
        drain(&mut rx_a);
        drain(&mut rx_b);

        sim.handle_message(
            2,
            &tx_b,
            ClientMessage::RestartGame {
                match_id: "m".to_string(),
                game_type: GameKind::TicTacToe,
            },
        );
        assert!(matches!(
            recv_message(&mut rx_a),
            ServerMessage::GameRestarted {}
        ));
        let ServerMessage::GameState(sync) = recv_message(&mut rx_a) else {
            panic!("expected a sync");
        };
        assert!(!sync.game_over);
        assert_eq!(sync.current_player, Mark::X);
        assert!(sync.winner.is_none());
        assert!(sync
            .board
            .iter()
            .all(|row| row.iter().all(|cell| cell.is_none())));
        // The restart pair reaches the other seat too.
        assert!(matches!(
            recv_message(&mut rx_b),
            ServerMessage::GameRestarted {}
        ));
        assert!(matches!(
            recv_message(&mut rx_b),
            ServerMessage::GameState(_)
        ));

        // X opens the rematch.
        make_move(&sim, &tx_a, "alice", 2, 2);
        let ServerMessage::MoveMade { result, .. } = recv_message(&mut rx_b) else {
            panic!("expected a confirmation");
        };
        assert!(result.valid);
    }

    #[test]
    fn reclaiming_a_seat_gets_a_fresh_sync() {
        let sim = Simulator::new();
        let (tx_a, mut rx_a) = connection();
        let (tx_b, _rx_b) = connection();
        join(&sim, 1, &tx_a, "alice");
        join(&sim, 2, &tx_b, "bob");
        make_move(&sim, &tx_a, "alice", 1, 1);
        drain(&mut rx_a);

        sim.connection_closed(1);
        let (tx_a2, mut rx_a2) = connection();
        join(&sim, 3, &tx_a2, "alice");

        assert!(matches!(
            recv_message(&mut rx_a2),
            ServerMessage::PlayerJoined { players_count: 2 }
        ));
        let ServerMessage::GameState(sync) = recv_message(&mut rx_a2) else {
            panic!("expected a sync");
        };
        assert_eq!(sync.board[1][1], Some(Mark::X));
        assert_eq!(sync.current_player, Mark::O);
        // The old channel saw nothing after the close.
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn unknown_match_and_unseated_player_get_errors() {
        let sim = Simulator::new();
        let (tx, mut rx) = connection();

        make_move(&sim, &tx, "alice", 0, 0);
        assert!(matches!(recv_message(&mut rx), ServerMessage::Error { .. }));

        join(&sim, 1, &tx, "alice");
        drain(&mut rx);
        sim.handle_message(
            1,
            &tx,
            ClientMessage::MakeMove {
                match_id: "m".to_string(),
                game_type: GameKind::TicTacToe,
                position: GridMove::new(0, 0),
                player_id: "mallory".to_string(),
            },
        );
        assert!(matches!(recv_message(&mut rx), ServerMessage::Error { .. }));
    }

    #[test]
    fn mismatched_game_type_is_rejected() {
        let sim = Simulator::new();
        let (tx_a, mut rx_a) = connection();
        let (tx_b, mut rx_b) = connection();
        join(&sim, 1, &tx_a, "alice");
        drain(&mut rx_a);

        sim.handle_message(
            2,
            &tx_b,
            ClientMessage::JoinGame {
                match_id: "m".to_string(),
                game_type: GameKind::Gomoku,
                player_id: "bob".to_string(),
            },
        );
        assert!(matches!(
            recv_message(&mut rx_b),
            ServerMessage::Error { .. }
        ));
        // Alice keeps her solo match.
        assert!(rx_a.try_recv().is_err());
    }
}
