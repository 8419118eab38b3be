//! Session vocabulary shared by the client, the simulator, and the wire
//! protocol: player marks, lifecycle status, game kinds, and terminal
//! outcomes.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failed to interpret a wire token.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("unknown mark: {0}")]
    UnknownMark(String),
    #[error("unknown game kind: {0}")]
    UnknownGameKind(String),
    #[error("unknown outcome: {0}")]
    UnknownOutcome(String),
}

/// Player mark on the grid. Serializes to the wire tokens `"X"` and `"O"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    /// The mark that moves second when this one opens.
    pub fn opponent(&self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            Mark::X => "X",
            Mark::O => "O",
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Mark {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "X" => Ok(Mark::X),
            "O" => Ok(Mark::O),
            other => Err(TokenError::UnknownMark(other.to_string())),
        }
    }
}

/// Which game a session is playing. Determines board dimensions and the
/// run length required to win.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    TicTacToe,
    Gomoku,
}

impl GameKind {
    /// Side length of the square board.
    pub fn board_size(&self) -> u8 {
        match self {
            GameKind::TicTacToe => 3,
            GameKind::Gomoku => 15,
        }
    }

    /// Consecutive marks required to win.
    pub fn win_length(&self) -> u8 {
        match self {
            GameKind::TicTacToe => 3,
            GameKind::Gomoku => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::TicTacToe => "tictactoe",
            GameKind::Gomoku => "gomoku",
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameKind {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tictactoe" => Ok(GameKind::TicTacToe),
            "gomoku" => Ok(GameKind::Gomoku),
            other => Err(TokenError::UnknownGameKind(other.to_string())),
        }
    }
}

/// Session lifecycle. `Waiting` until a second participant is seated,
/// `Playing` until a terminal outcome, `Finished` afterwards. A restart
/// returns a finished session to `Playing`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Playing,
    Finished,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::Playing => "playing",
            SessionStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a game. On the wire this is the winning mark's
/// token, the literal `"draw"`, or null when the game is still live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Win(Mark),
    Draw,
}

impl Outcome {
    pub fn token(&self) -> &'static str {
        match self {
            Outcome::Win(mark) => mark.token(),
            Outcome::Draw => "draw",
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.token())
    }
}

impl<'de> Deserialize<'de> for Outcome {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        match token.as_str() {
            "X" => Ok(Outcome::Win(Mark::X)),
            "O" => Ok(Outcome::Win(Mark::O)),
            "draw" => Ok(Outcome::Draw),
            other => Err(de::Error::unknown_variant(other, &["X", "O", "draw"])),
        }
    }
}
