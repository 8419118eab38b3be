//! Move legality and terminal evaluation.
//!
//! Both functions are deterministic over their inputs alone. They never
//! consult turn order; whose move it is belongs to the session layer.

use parlor_types::{GridMove, Mark, Outcome};

use crate::board::Board;

/// Scan directions: right, down, down-right, down-left. Left/up runs are
/// found from their other end.
const DIRECTIONS: [(i16, i16); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// Result of scanning a board for a finished game.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Terminal {
    pub winner: Option<Mark>,
    pub is_draw: bool,
}

impl Terminal {
    pub fn live() -> Self {
        Self {
            winner: None,
            is_draw: false,
        }
    }

    pub fn is_over(&self) -> bool {
        self.winner.is_some() || self.is_draw
    }

    /// The wire outcome, `None` while the game is live.
    pub fn outcome(&self) -> Option<Outcome> {
        match (self.winner, self.is_draw) {
            (Some(mark), _) => Some(Outcome::Win(mark)),
            (None, true) => Some(Outcome::Draw),
            (None, false) => None,
        }
    }
}

/// True iff `position` is on the board and the cell is empty.
pub fn is_legal_move(board: &Board, position: GridMove) -> bool {
    board.contains(position) && board.cell(position).is_none()
}

/// Scans for a run of the board's win length. A full board without one is a
/// draw; a winner takes precedence even on a full board.
pub fn evaluate_terminal(board: &Board) -> Terminal {
    if let Some(winner) = find_run(board) {
        return Terminal {
            winner: Some(winner),
            is_draw: false,
        };
    }
    Terminal {
        winner: None,
        is_draw: board.is_full(),
    }
}

fn find_run(board: &Board) -> Option<Mark> {
    let size = board.size() as i16;
    let need = board.win_length();
    for row in 0..size {
        for col in 0..size {
            let origin = GridMove::new(row as u8, col as u8);
            let Some(mark) = board.cell(origin) else {
                continue;
            };
            for (dr, dc) in DIRECTIONS {
                let mut run = 1;
                let mut r = row + dr;
                let mut c = col + dc;
                while run < need
                    && (0..size).contains(&r)
                    && (0..size).contains(&c)
                    && board.cell(GridMove::new(r as u8, c as u8)) == Some(mark)
                {
                    run += 1;
                    r += dr;
                    c += dc;
                }
                if run >= need {
                    return Some(mark);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use parlor_types::GameKind;

    use super::*;

    /// Builds a board from row strings, `X`/`O` marks and `.` for empty.
    fn board(win_length: u8, rows: &[&str]) -> Board {
        let mut board = Board::new(rows.len() as u8, win_length).unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, ch) in row.chars().enumerate() {
                let mark = match ch {
                    'X' => Mark::X,
                    'O' => Mark::O,
                    '.' => continue,
                    other => panic!("bad cell char {other}"),
                };
                board.place(GridMove::new(r as u8, c as u8), mark).unwrap();
            }
        }
        board
    }

    #[test]
    fn legal_iff_in_bounds_and_empty() {
        let board = board(3, &["X..", ".O.", "..."]);
        assert!(is_legal_move(&board, GridMove::new(0, 1)));
        assert!(is_legal_move(&board, GridMove::new(2, 2)));
        // Taken cells, regardless of whose mark sits there.
        assert!(!is_legal_move(&board, GridMove::new(0, 0)));
        assert!(!is_legal_move(&board, GridMove::new(1, 1)));
        // Off the board.
        assert!(!is_legal_move(&board, GridMove::new(3, 0)));
        assert!(!is_legal_move(&board, GridMove::new(0, 3)));
    }

    #[test]
    fn top_row_wins() {
        let board = board(3, &["XXX", "OO.", "..."]);
        let terminal = evaluate_terminal(&board);
        assert_eq!(terminal.winner, Some(Mark::X));
        assert!(!terminal.is_draw);
        assert_eq!(terminal.outcome(), Some(Outcome::Win(Mark::X)));
    }

    #[test]
    fn column_and_diagonal_wins() {
        let column = board(3, &["OX.", "OX.", "O.X"]);
        assert_eq!(evaluate_terminal(&column).winner, Some(Mark::O));

        let diagonal = board(3, &["X.O", ".XO", "..X"]);
        assert_eq!(evaluate_terminal(&diagonal).winner, Some(Mark::X));

        let anti = board(3, &["O.X", ".XO", "X.O"]);
        assert_eq!(evaluate_terminal(&anti).winner, Some(Mark::X));
    }

    #[test]
    fn full_board_without_run_is_draw() {
        let board = board(3, &["XOX", "XOO", "OXX"]);
        let terminal = evaluate_terminal(&board);
        assert_eq!(terminal.winner, None);
        assert!(terminal.is_draw);
        assert_eq!(terminal.outcome(), Some(Outcome::Draw));
    }

    #[test]
    fn live_board_is_neither() {
        let board = board(3, &["XO.", ".X.", "..O"]);
        let terminal = evaluate_terminal(&board);
        assert_eq!(terminal, Terminal::live());
        assert_eq!(terminal.outcome(), None);
        assert!(!terminal.is_over());
    }

    #[test]
    fn winner_takes_precedence_on_full_board() {
        let board = board(3, &["XXX", "OOX", "OXO"]);
        let terminal = evaluate_terminal(&board);
        assert_eq!(terminal.winner, Some(Mark::X));
        assert!(!terminal.is_draw);
    }

    #[test]
    fn win_length_shorter_than_board() {
        // 4 in a row on a 5x5 board.
        let four_run = board(
            4,
            &["XXXX.", "OOO..", ".....", ".....", "....."],
        );
        assert_eq!(evaluate_terminal(&four_run).winner, Some(Mark::X));

        // 3 in a row is not enough there.
        let short = evaluate_terminal(&board(
            4,
            &["XXX..", "OOO..", ".....", ".....", "....."],
        ));
        assert_eq!(short.winner, None);
        assert!(!short.is_draw);
    }

    #[test]
    fn gomoku_dimensions_score_five() {
        let mut board = Board::for_kind(GameKind::Gomoku);
        for col in 3..8 {
            board.place(GridMove::new(7, col), Mark::O).unwrap();
        }
        assert_eq!(evaluate_terminal(&board).winner, Some(Mark::O));

        let mut four = Board::for_kind(GameKind::Gomoku);
        for col in 3..7 {
            four.place(GridMove::new(7, col), Mark::O).unwrap();
        }
        assert_eq!(evaluate_terminal(&four), Terminal::live());
    }

    #[test]
    fn down_left_diagonal_wins() {
        let board = board(
            4,
            &["...X.", "..X..", ".X...", "X....", "....."],
        );
        assert_eq!(evaluate_terminal(&board).winner, Some(Mark::X));
    }
}
