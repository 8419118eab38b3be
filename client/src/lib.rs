mod backoff;
pub mod client;
pub mod connection;
pub mod offline;
pub mod session;
pub mod state;

pub use client::{Client, ClientConfig};
pub use connection::{ConnectionConfig, ConnectionManager, LinkState};
pub use offline::{FallbackDecision, FallbackPolicy};
pub use session::Session;
pub use state::{
    ConnectionHealth, IllegalMove, PendingMove, PlayMode, SessionState, SessionStateMachine,
};
use thiserror::Error;

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid URL scheme: {0} (expected ws or wss)")]
    InvalidScheme(String),
    #[error("dial timeout")]
    DialTimeout,
    #[error("dial failed: {0}")]
    Dial(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("connect cancelled")]
    Cancelled,
    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("illegal move: {0}")]
    IllegalMove(#[from] state::IllegalMove),
    #[error("session closed")]
    SessionClosed,
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
