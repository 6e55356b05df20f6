use serde::Serialize;

use crate::types::{Color, Move};

/// A position reached from a root FEN by a sequence of moves.
///
/// Positions are produced by a [`RulesEngine`](crate::rules::RulesEngine) and
/// never mutated afterwards; playing a move derives a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    root_fen: String,
    fen: String,
    moves: Vec<Move>,
    turn: Color,
}

impl Position {
    pub fn new(root_fen: String, fen: String, moves: Vec<Move>, turn: Color) -> Self {
        Self {
            root_fen,
            fen,
            moves,
            turn,
        }
    }

    /// FEN of the position the move sequence starts from.
    pub fn root_fen(&self) -> &str {
        &self.root_fen
    }

    /// FEN of this position.
    pub fn fen(&self) -> &str {
        &self.fen
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn turn(&self) -> Color {
        self.turn
    }
}
