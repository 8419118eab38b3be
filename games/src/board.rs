//! Square game boards.
//!
//! Cells are stored row-major as `Option<Mark>`, `None` being empty. A board
//! carries its own win length so rules code never needs a side channel to
//! know what game it is scoring.

use parlor_types::{GameKind, GridMove, Mark};
use thiserror::Error;

/// Largest supported board side. Bounds wire payloads and line scans.
pub const MAX_BOARD_SIZE: u8 = 19;

/// Smallest board that can host a win.
pub const MIN_BOARD_SIZE: u8 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoardError {
    #[error("board size {0} out of range")]
    SizeOutOfRange(u8),
    #[error("win length {win_length} does not fit board size {size}")]
    WinLengthOutOfRange { size: u8, win_length: u8 },
    #[error("position ({}, {}) is off the board", .0.row, .0.column)]
    OutOfBounds(GridMove),
    #[error("cell ({}, {}) is already taken", .0.row, .0.column)]
    Occupied(GridMove),
    #[error("board rows are not square")]
    MalformedRows,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    size: u8,
    win_length: u8,
    cells: Vec<Option<Mark>>,
}

impl Board {
    /// An empty `size` x `size` board scoring runs of `win_length`.
    pub fn new(size: u8, win_length: u8) -> Result<Self, BoardError> {
        if !(MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&size) {
            return Err(BoardError::SizeOutOfRange(size));
        }
        if win_length < 2 || win_length > size {
            return Err(BoardError::WinLengthOutOfRange { size, win_length });
        }
        Ok(Self {
            size,
            win_length,
            cells: vec![None; size as usize * size as usize],
        })
    }

    /// An empty board with the dimensions the kind prescribes.
    pub fn for_kind(kind: GameKind) -> Self {
        let size = kind.board_size();
        Self {
            size,
            win_length: kind.win_length(),
            cells: vec![None; size as usize * size as usize],
        }
    }

    /// Rebuilds a board from wire rows. Every row must be `rows.len()` cells
    /// wide and the dimensions must fit `win_length`.
    pub fn from_rows(rows: &[Vec<Option<Mark>>], win_length: u8) -> Result<Self, BoardError> {
        if rows.len() > MAX_BOARD_SIZE as usize {
            return Err(BoardError::MalformedRows);
        }
        let size = rows.len() as u8;
        if rows.iter().any(|row| row.len() != rows.len()) {
            return Err(BoardError::MalformedRows);
        }
        let mut board = Self::new(size, win_length)?;
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                board.cells[r * size as usize + c] = *cell;
            }
        }
        Ok(board)
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    pub fn win_length(&self) -> u8 {
        self.win_length
    }

    pub fn contains(&self, position: GridMove) -> bool {
        position.row < self.size && position.column < self.size
    }

    /// The mark at `position`, `None` when empty or off the board.
    pub fn cell(&self, position: GridMove) -> Option<Mark> {
        let idx = self.index(position)?;
        self.cells[idx]
    }

    /// Places `mark`, rejecting off-board and occupied positions.
    pub fn place(&mut self, position: GridMove, mark: Mark) -> Result<(), BoardError> {
        let idx = self
            .index(position)
            .ok_or(BoardError::OutOfBounds(position))?;
        if self.cells[idx].is_some() {
            return Err(BoardError::Occupied(position));
        }
        self.cells[idx] = Some(mark);
        Ok(())
    }

    /// Empties every cell, keeping the dimensions.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            *cell = None;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|cell| cell.is_none())
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|cell| cell.is_some())
    }

    /// Row-major rows for the wire.
    pub fn rows(&self) -> Vec<Vec<Option<Mark>>> {
        self.cells
            .chunks(self.size as usize)
            .map(|row| row.to_vec())
            .collect()
    }

    fn index(&self, position: GridMove) -> Option<usize> {
        if !self.contains(position) {
            return None;
        }
        Some(position.row as usize * self.size as usize + position.column as usize)
    }
}
