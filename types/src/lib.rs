pub mod protocol;
pub mod session;

pub use protocol::{ClientMessage, GameStateData, GridMove, MoveResult, ServerMessage};
pub use session::{GameKind, Mark, Outcome, SessionStatus, TokenError};
