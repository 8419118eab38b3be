//! Wire protocol for game-session traffic.
//!
//! Every frame is a JSON text message shaped as `{"type": <string>, "data":
//! <object>}`. [`ServerMessage`] covers traffic from the match server to
//! clients, [`ClientMessage`] the reverse direction. Frames that do not
//! decode into these enums are not trusted: receivers log and discard them.

use serde::{Deserialize, Serialize};

use crate::{GameKind, Mark, Outcome};

/// A grid coordinate as it travels on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridMove {
    pub row: u8,
    pub column: u8,
}

impl GridMove {
    pub fn new(row: u8, column: u8) -> Self {
        Self { row, column }
    }
}

/// Server verdict attached to a broadcast move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveResult {
    pub valid: bool,
}

/// Full authoritative snapshot of a match. Sent after joins, restarts, and
/// whenever the server wants clients to resynchronize; receivers replace
/// their local state with it wholesale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameStateData {
    /// Row-major board cells; `None` is an empty cell.
    pub board: Vec<Vec<Option<Mark>>>,
    pub current_player: Mark,
    pub game_over: bool,
    pub winner: Option<Outcome>,
}

/// Traffic from the match server to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "game_state")]
    GameState(GameStateData),
    #[serde(rename = "player_joined")]
    PlayerJoined { players_count: u8 },
    #[serde(rename = "move_made")]
    MoveMade {
        #[serde(rename = "move")]
        position: GridMove,
        player_symbol: Mark,
        result: MoveResult,
    },
    #[serde(rename = "game_over")]
    GameOver { winner: Option<Outcome> },
    /// Same meaning as `game_over`; emitted when the server itself detects
    /// the terminal position rather than relaying a client claim.
    #[serde(rename = "game_finished_automatically")]
    GameFinishedAutomatically { winner: Option<Outcome> },
    #[serde(rename = "game_restarted")]
    GameRestarted {},
    /// Alias some backends emit instead of `game_restarted`.
    #[serde(rename = "game_reset")]
    GameReset {},
    #[serde(rename = "error")]
    Error { message: String },
}

/// Traffic from clients to the match server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "join_game")]
    JoinGame {
        match_id: String,
        game_type: GameKind,
        player_id: String,
    },
    #[serde(rename = "make_move")]
    MakeMove {
        match_id: String,
        game_type: GameKind,
        #[serde(rename = "move")]
        position: GridMove,
        player_id: String,
    },
    #[serde(rename = "restart_game")]
    RestartGame {
        match_id: String,
        game_type: GameKind,
    },
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn game_state_wire_shape() {
        let msg = ServerMessage::GameState(GameStateData {
            board: vec![
                vec![None, Some(Mark::X), None],
                vec![None, Some(Mark::O), None],
                vec![None, None, None],
            ],
            current_player: Mark::X,
            game_over: false,
            winner: None,
        });
        let encoded: Value = serde_json::to_value(&msg).unwrap();
        let expected = json!({
            "type": "game_state",
            "data": {
                "board": [
                    [null, "X", null],
                    [null, "O", null],
                    [null, null, null],
                ],
                "current_player": "X",
                "game_over": false,
                "winner": null,
            },
        });
        assert_eq!(encoded, expected);

        let decoded: ServerMessage = serde_json::from_value(expected).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn winner_tokens_decode() {
        let raw = json!({
            "type": "game_over",
            "data": { "winner": "draw" },
        });
        let decoded: ServerMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(
            decoded,
            ServerMessage::GameOver {
                winner: Some(Outcome::Draw)
            }
        );

        let raw = json!({
            "type": "game_finished_automatically",
            "data": { "winner": "O" },
        });
        let decoded: ServerMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(
            decoded,
            ServerMessage::GameFinishedAutomatically {
                winner: Some(Outcome::Win(Mark::O))
            }
        );
    }

    #[test]
    fn move_made_uses_move_key() {
        let raw = r#"{"type":"move_made","data":{"move":{"row":1,"column":2},"player_symbol":"O","result":{"valid":true}}}"#;
        let decoded: ServerMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(
            decoded,
            ServerMessage::MoveMade {
                position: GridMove::new(1, 2),
                player_symbol: Mark::O,
                result: MoveResult { valid: true },
            }
        );
    }

    #[test]
    fn restart_frames_carry_empty_data() {
        let encoded = serde_json::to_value(ServerMessage::GameRestarted {}).unwrap();
        assert_eq!(encoded, json!({ "type": "game_restarted", "data": {} }));
        let decoded: ServerMessage =
            serde_json::from_value(json!({ "type": "game_reset", "data": {} })).unwrap();
        assert_eq!(decoded, ServerMessage::GameReset {});
    }

    #[test]
    fn join_and_move_requests_encode() {
        let join = ClientMessage::JoinGame {
            match_id: "m-7".to_string(),
            game_type: GameKind::TicTacToe,
            player_id: "p-1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&join).unwrap(),
            json!({
                "type": "join_game",
                "data": { "match_id": "m-7", "game_type": "tictactoe", "player_id": "p-1" },
            })
        );

        let mv = ClientMessage::MakeMove {
            match_id: "m-7".to_string(),
            game_type: GameKind::Gomoku,
            position: GridMove::new(7, 7),
            player_id: "p-1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&mv).unwrap(),
            json!({
                "type": "make_move",
                "data": {
                    "match_id": "m-7",
                    "game_type": "gomoku",
                    "move": { "row": 7, "column": 7 },
                    "player_id": "p-1",
                },
            })
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        let raw = json!({ "type": "shuffle_deck", "data": {} });
        assert!(serde_json::from_value::<ServerMessage>(raw).is_err());
        let raw = json!({ "type": "game_state", "data": { "board": "not-a-board" } });
        assert!(serde_json::from_value::<ServerMessage>(raw).is_err());
    }
}
