//! Random Bot Example
//!
//! Joins a tic-tac-toe match on a local simulator and plays random legal
//! moves until the game ends. Run it in two terminals with the same match
//! id to watch a full game, or once to see the hotseat fallback take the
//! session offline when no server is reachable.
//!
//! To run:
//! `cargo run -p parlor-simulator` (in another terminal)
//! `cargo run --example random_bot -- my-match`

use parlor_client::Client;
use parlor_types::{GameKind, GridMove, Mark, SessionStatus};
use rand::seq::SliceRandom;

const SERVER_URL: &str = "ws://127.0.0.1:4000/ws";

fn render(board: &parlor_games::Board) {
    for row in board.rows() {
        let line: String = row
            .iter()
            .map(|cell| match cell {
                Some(Mark::X) => 'X',
                Some(Mark::O) => 'O',
                None => '.',
            })
            .collect();
        println!("  {line}");
    }
}

fn pick_empty_cell(board: &parlor_games::Board) -> Option<GridMove> {
    let mut open = Vec::new();
    for (row, cells) in board.rows().iter().enumerate() {
        for (column, cell) in cells.iter().enumerate() {
            if cell.is_none() {
                open.push(GridMove::new(row as u8, column as u8));
            }
        }
    }
    open.choose(&mut rand::thread_rng()).copied()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let match_id = std::env::args().nth(1).unwrap_or_else(|| "demo".to_string());

    // 1. Connect and take a seat. Falls back to a local hotseat match if
    //    the simulator is unreachable.
    let client = Client::new(SERVER_URL)?;
    let session = client
        .join(&match_id, GameKind::TicTacToe, None, None)
        .await?;
    println!(
        "Joined {} as {} ({:?})",
        session.session_id(),
        session.player_id(),
        session.state().mode,
    );

    // 2. Play whenever it is our turn.
    let mut updates = session.watch();
    loop {
        let state = updates.borrow_and_update().clone();
        if state.status == SessionStatus::Finished {
            render(&state.board);
            match state.outcome {
                Some(outcome) => println!("Game over: {outcome:?}"),
                None => println!("Game over"),
            }
            break;
        }
        if state.our_turn() {
            if let Some(position) = pick_empty_cell(&state.board) {
                println!("Playing ({}, {})", position.row, position.column);
                // A confirmation may still be in flight; just wait for the
                // next update and try again.
                let _ = session.make_move(position);
            }
        }
        if updates.changed().await.is_err() {
            break;
        }
    }

    session.leave();
    Ok(())
}
