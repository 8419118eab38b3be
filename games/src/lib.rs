//! Deterministic board logic for parlor grid games.
//!
//! Everything in this crate is pure: no clocks, no randomness, no I/O.
//! The same routines gate move input in the client, stand in for the
//! authority during offline hot-seat play, and validate moves server-side
//! in the simulator, so they must agree everywhere.

pub mod board;
pub mod rules;

pub use board::{Board, BoardError, MAX_BOARD_SIZE};
pub use rules::{evaluate_terminal, is_legal_move, Terminal};
