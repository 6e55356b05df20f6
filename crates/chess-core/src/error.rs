//! Game and rules error types

use thiserror::Error;

use crate::game::GameResult;
use crate::types::Move;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid UCI move: {0:?}")]
pub struct ParseMoveError(pub String);

/// Rejections reported by a [`RulesEngine`](crate::rules::RulesEngine).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("Invalid FEN {fen:?}: {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("Illegal move {mv}: {reason}")]
    IllegalMove { mv: Move, reason: String },
}

/// Why `GameState::push` refused a move. State is left unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidMoveError {
    #[error(transparent)]
    Illegal(#[from] RulesError),

    #[error("Cannot play while viewing history; return to the live position first")]
    HistoryView,

    #[error("Game is over: {0}")]
    GameOver(GameResult),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Game is already over: {0}")]
    AlreadyOver(GameResult),

    #[error("History index {index} out of range (history has {len} moves)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Not allowed while a game is in progress")]
    GameInProgress,

    #[error(transparent)]
    Rules(#[from] RulesError),
}
