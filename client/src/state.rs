//! Session state: an authoritative follower with an optimistic echo.
//!
//! The machine applies server messages strictly in arrival order and never
//! performs I/O. Local moves are speculative until the server confirms them:
//! they ride as an overlay on the authoritative board and vanish, with no
//! rollback bookkeeping, whenever the server replaces or rejects them.
//! Anything inconsistent with the current state is discarded with a reason
//! for the log line, never applied partially.

use std::sync::Arc;
use std::time::Instant;

use parlor_games::{evaluate_terminal, is_legal_move, Board};
use parlor_types::{
    GameKind, GridMove, Mark, Outcome, ServerMessage, SessionStatus,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Whether moves resolve against the server or locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayMode {
    Online,
    /// Both seats are played at this keyboard. Entered when the network is
    /// given up on (or by choice); never left.
    Hotseat,
}

/// Connection health, orthogonal to game status. `Offline` is terminal for
/// the session instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionHealth {
    Online,
    Reconnecting,
    Offline,
}

/// Synchronous rejection of local input. The session is left untouched.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum IllegalMove {
    #[error("no seat assigned yet")]
    NotSeated,
    #[error("game has not started")]
    NotPlaying,
    #[error("game is over")]
    GameOver,
    #[error("not your turn")]
    NotYourTurn,
    #[error("position is off the board")]
    OutOfBounds,
    #[error("cell is already taken")]
    CellTaken,
    #[error("a move is already awaiting confirmation")]
    MovePending,
}

/// A locally issued move the server has not confirmed yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingMove {
    pub position: GridMove,
    pub mark: Mark,
    pub issued_at: Instant,
    /// Always true while the move is held here; confirmation removes the
    /// move instead of flipping the flag.
    pub speculative: bool,
}

/// Immutable view of a session, replaced wholesale on every transition.
/// `board` already includes the speculative overlay; it is what a UI should
/// render.
#[derive(Clone, Debug)]
pub struct SessionState {
    pub session_id: String,
    pub kind: GameKind,
    pub status: SessionStatus,
    pub players_count: u8,
    /// The seat this process plays, once the server has assigned it. Stays
    /// `None` in hot-seat mode where both seats are local.
    pub local_mark: Option<Mark>,
    pub current_turn: Mark,
    pub board: Board,
    pub outcome: Option<Outcome>,
    pub health: ConnectionHealth,
    pub mode: PlayMode,
}

impl SessionState {
    /// True when it is this client's turn to act.
    pub fn our_turn(&self) -> bool {
        match self.mode {
            PlayMode::Online => {
                self.status == SessionStatus::Playing
                    && self.local_mark == Some(self.current_turn)
            }
            PlayMode::Hotseat => self.status == SessionStatus::Playing,
        }
    }
}

/// What became of an inbound server message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub enum Verdict {
    Applied,
    /// Ignored without any state change; the reason feeds the log line.
    Discarded(&'static str),
}

/// Reducer over [`SessionState`] snapshots.
pub struct SessionStateMachine {
    authoritative: Board,
    pending: Option<PendingMove>,
    state: Arc<SessionState>,
}

impl SessionStateMachine {
    /// A fresh online session, waiting for the server to seat us.
    pub fn new(session_id: String, kind: GameKind) -> Self {
        let board = Board::for_kind(kind);
        let state = Arc::new(SessionState {
            session_id,
            kind,
            status: SessionStatus::Waiting,
            players_count: 0,
            local_mark: None,
            current_turn: Mark::X,
            board: board.clone(),
            outcome: None,
            health: ConnectionHealth::Online,
            mode: PlayMode::Online,
        });
        Self {
            authoritative: board,
            pending: None,
            state,
        }
    }

    /// A hot-seat session that never touches the network.
    pub fn new_hotseat(session_id: String, kind: GameKind) -> Self {
        let board = Board::for_kind(kind);
        let state = Arc::new(SessionState {
            session_id,
            kind,
            status: SessionStatus::Playing,
            players_count: 2,
            local_mark: None,
            current_turn: Mark::X,
            board: board.clone(),
            outcome: None,
            health: ConnectionHealth::Offline,
            mode: PlayMode::Hotseat,
        });
        Self {
            authoritative: board,
            pending: None,
            state,
        }
    }

    pub fn snapshot(&self) -> Arc<SessionState> {
        self.state.clone()
    }

    pub fn mode(&self) -> PlayMode {
        self.state.mode
    }

    pub fn pending(&self) -> Option<&PendingMove> {
        self.pending.as_ref()
    }

    /// Applies one server message. The server always wins: full syncs
    /// replace local state outright, and the speculative overlay never
    /// survives a message that contradicts it.
    pub fn apply_server(&mut self, message: &ServerMessage) -> Verdict {
        match message {
            ServerMessage::GameState(data) => {
                let board = match Board::from_rows(&data.board, self.state.kind.win_length()) {
                    Ok(board) => board,
                    Err(err) => {
                        debug!(error = %err, "bad board in sync");
                        return Verdict::Discarded("game_state board is malformed");
                    }
                };
                if board.size() != self.state.kind.board_size() {
                    return Verdict::Discarded("game_state board has wrong dimensions");
                }
                // Wholesale replacement: any speculative move is gone, not
                // merged.
                self.authoritative = board;
                self.pending = None;
                let status = if data.game_over {
                    SessionStatus::Finished
                } else {
                    SessionStatus::Playing
                };
                self.replace(|state| {
                    state.status = status;
                    state.current_turn = data.current_player;
                    state.outcome = data.winner;
                    state.players_count = state.players_count.max(2);
                });
                Verdict::Applied
            }
            ServerMessage::PlayerJoined { players_count } => {
                let count = *players_count;
                if count == 0 || count > 2 {
                    return Verdict::Discarded("players_count out of range");
                }
                // The first roster update after our join tells us which seat
                // we got: opening seat when we are alone, second seat
                // otherwise.
                let assigned = match self.state.local_mark {
                    Some(mark) => Some(mark),
                    None if count == 1 => Some(Mark::X),
                    None => Some(Mark::O),
                };
                let starts = count == 2 && self.state.status == SessionStatus::Waiting;
                self.replace(|state| {
                    state.players_count = count;
                    state.local_mark = assigned;
                    if starts {
                        state.status = SessionStatus::Playing;
                    }
                });
                if starts {
                    debug!(session = %self.state.session_id, "opponent seated; game on");
                }
                Verdict::Applied
            }
            ServerMessage::MoveMade {
                position,
                player_symbol,
                result,
            } => {
                if !result.valid {
                    // Our rejected move rolls back by dropping the overlay;
                    // an opponent's rejected move never touched us.
                    if Some(*player_symbol) == self.state.local_mark {
                        self.pending = None;
                        self.replace(|_| {});
                    }
                    return Verdict::Applied;
                }
                if self.state.status != SessionStatus::Playing {
                    return Verdict::Discarded("move_made outside play");
                }
                if *player_symbol != self.state.current_turn {
                    return Verdict::Discarded("move_made out of turn order");
                }
                if self
                    .authoritative
                    .place(*position, *player_symbol)
                    .is_err()
                {
                    return Verdict::Discarded("move_made targets an unplayable cell");
                }
                if Some(*player_symbol) == self.state.local_mark {
                    self.pending = None;
                }
                let next = player_symbol.opponent();
                self.replace(|state| {
                    state.current_turn = next;
                });
                Verdict::Applied
            }
            ServerMessage::GameOver { winner }
            | ServerMessage::GameFinishedAutomatically { winner } => {
                self.pending = None;
                let winner = *winner;
                self.replace(|state| {
                    state.status = SessionStatus::Finished;
                    state.outcome = winner;
                });
                Verdict::Applied
            }
            ServerMessage::GameRestarted {} | ServerMessage::GameReset {} => {
                self.authoritative.clear();
                self.pending = None;
                self.replace(|state| {
                    state.status = SessionStatus::Playing;
                    state.outcome = None;
                    state.current_turn = Mark::X;
                });
                Verdict::Applied
            }
            ServerMessage::Error { message } => {
                warn!(session = %self.state.session_id, message, "server reported an error");
                Verdict::Applied
            }
        }
    }

    /// The turn-ownership gate for online play. On success the move is held
    /// as speculative, the overlay board shows it, and the caller sends it
    /// upstream.
    pub fn propose_move(&mut self, position: GridMove) -> Result<PendingMove, IllegalMove> {
        match self.state.status {
            SessionStatus::Playing => {}
            SessionStatus::Waiting => return Err(IllegalMove::NotPlaying),
            SessionStatus::Finished => return Err(IllegalMove::GameOver),
        }
        let Some(local) = self.state.local_mark else {
            return Err(IllegalMove::NotSeated);
        };
        if self.pending.is_some() {
            return Err(IllegalMove::MovePending);
        }
        if self.state.current_turn != local {
            return Err(IllegalMove::NotYourTurn);
        }
        if !self.authoritative.contains(position) {
            return Err(IllegalMove::OutOfBounds);
        }
        if !is_legal_move(&self.authoritative, position) {
            return Err(IllegalMove::CellTaken);
        }

        let pending = PendingMove {
            position,
            mark: local,
            issued_at: Instant::now(),
            speculative: true,
        };
        self.pending = Some(pending);
        self.replace(|_| {});
        Ok(pending)
    }

    /// Hot-seat move application: validate, place for whoever's turn it is,
    /// evaluate the end locally, alternate.
    pub fn apply_local_move(&mut self, position: GridMove) -> Result<(), IllegalMove> {
        match self.state.status {
            SessionStatus::Playing => {}
            SessionStatus::Waiting => return Err(IllegalMove::NotPlaying),
            SessionStatus::Finished => return Err(IllegalMove::GameOver),
        }
        if !self.authoritative.contains(position) {
            return Err(IllegalMove::OutOfBounds);
        }
        if !is_legal_move(&self.authoritative, position) {
            return Err(IllegalMove::CellTaken);
        }

        let mover = self.state.current_turn;
        if self.authoritative.place(position, mover).is_err() {
            return Err(IllegalMove::CellTaken);
        }
        let terminal = evaluate_terminal(&self.authoritative);
        self.replace(|state| {
            if terminal.is_over() {
                state.status = SessionStatus::Finished;
                state.outcome = terminal.outcome();
            } else {
                state.current_turn = mover.opponent();
            }
        });
        Ok(())
    }

    /// Local restart for hot-seat play; online restarts come back as
    /// `game_restarted` from the server.
    pub fn apply_restart(&mut self) {
        self.authoritative.clear();
        self.pending = None;
        self.replace(|state| {
            state.status = SessionStatus::Playing;
            state.outcome = None;
            state.current_turn = Mark::X;
        });
    }

    /// Reconnect flag handling. Once `Offline`, health never changes again.
    pub fn set_health(&mut self, health: ConnectionHealth) {
        if self.state.health == ConnectionHealth::Offline || self.state.health == health {
            return;
        }
        self.replace(|state| {
            state.health = health;
        });
    }

    /// Switches the session to local hot-seat play. A waiting session
    /// starts immediately; a mid-game session keeps its board. There is no
    /// way back for this instance.
    pub fn engage_hotseat(&mut self) {
        if self.state.mode == PlayMode::Hotseat {
            return;
        }
        self.pending = None;
        self.replace(|state| {
            state.mode = PlayMode::Hotseat;
            state.health = ConnectionHealth::Offline;
            if state.status == SessionStatus::Waiting {
                state.status = SessionStatus::Playing;
            }
            state.players_count = 2;
        });
    }

    /// Rebuilds the published snapshot from the authoritative board, the
    /// overlay, and `mutate`.
    fn replace<F: FnOnce(&mut SessionState)>(&mut self, mutate: F) {
        let mut next = (*self.state).clone();
        let mut board = self.authoritative.clone();
        if let Some(pending) = &self.pending {
            // Overlay failure means the server moved first; drop the echo.
            if board.place(pending.position, pending.mark).is_err() {
                self.pending = None;
            }
        }
        mutate(&mut next);
        next.board = board;
        self.state = Arc::new(next);
    }
}
