//! Authoritative game state: move history, turn, result and the history view
//! cursor.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{GameError, InvalidMoveError};
use crate::position::Position;
use crate::rules::{DrawReason, RulesEngine, Status, STANDARD_START_FEN};
use crate::types::{Color, Move};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameResult {
    InProgress,
    Checkmate { winner: Color },
    Stalemate,
    Draw { reason: DrawReason },
    TimeLoss { loser: Color },
    Resignation { loser: Color },
}

impl GameResult {
    pub fn is_over(&self) -> bool {
        *self != GameResult::InProgress
    }

    pub fn winner(&self) -> Option<Color> {
        match *self {
            GameResult::Checkmate { winner } => Some(winner),
            GameResult::TimeLoss { loser } | GameResult::Resignation { loser } => {
                Some(loser.other())
            }
            _ => None,
        }
    }

    /// PGN result token.
    pub fn score(&self) -> &'static str {
        match (self, self.winner()) {
            (GameResult::InProgress, _) => "*",
            (_, Some(Color::White)) => "1-0",
            (_, Some(Color::Black)) => "0-1",
            (_, None) => "1/2-1/2",
        }
    }
}

impl From<Status> for GameResult {
    fn from(status: Status) -> Self {
        match status {
            Status::Ongoing => GameResult::InProgress,
            Status::Checkmate { winner } => GameResult::Checkmate { winner },
            Status::Stalemate => GameResult::Stalemate,
            Status::Draw(reason) => GameResult::Draw { reason },
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameResult::InProgress => write!(f, "Game in progress"),
            GameResult::Checkmate { winner } => write!(f, "{winner} wins by checkmate"),
            GameResult::Stalemate => write!(f, "Draw by stalemate"),
            GameResult::Draw { reason } => match reason {
                DrawReason::Repetition => write!(f, "Draw by threefold repetition"),
                DrawReason::FiftyMoves => write!(f, "Draw by the fifty-move rule"),
                DrawReason::InsufficientMaterial => write!(f, "Draw by insufficient material"),
            },
            GameResult::TimeLoss { loser } => {
                write!(f, "{} wins on time", loser.other())
            }
            GameResult::Resignation { loser } => {
                write!(f, "{loser} resigned, {} wins", loser.other())
            }
        }
    }
}

/// One played move and the position it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    #[serde(rename = "move")]
    pub mv: Move,
    pub position: Position,
}

pub struct GameState {
    rules: Arc<dyn RulesEngine>,
    root: Position,
    /// Result of the root position itself, before any move
    root_result: GameResult,
    history: Vec<HistoryEntry>,
    /// View cursor; `None` is the root position.
    cursor: Option<usize>,
    result: GameResult,
    engine_color: Color,
}

impl GameState {
    /// Start a game from the standard position.
    pub fn new(rules: Arc<dyn RulesEngine>, engine_color: Color) -> Result<Self, GameError> {
        let root = rules.root(STANDARD_START_FEN)?;
        let root_result = root.status.into();
        Ok(Self {
            rules,
            root: root.position,
            root_result,
            history: Vec::new(),
            cursor: None,
            result: root_result,
            engine_color,
        })
    }

    /// Validate `mv` against the tail position and append it.
    pub fn push(&mut self, mv: Move) -> Result<&HistoryEntry, InvalidMoveError> {
        if self.result.is_over() {
            return Err(InvalidMoveError::GameOver(self.result));
        }
        if self.is_history() {
            return Err(InvalidMoveError::HistoryView);
        }

        let transition = self.rules.play(self.tail(), &mv)?;
        self.result = transition.status.into();
        self.history.push(HistoryEntry {
            mv,
            position: transition.position,
        });
        self.cursor = Some(self.history.len() - 1);

        Ok(&self.history[self.history.len() - 1])
    }

    pub fn declare_time_loss(&mut self, loser: Color) -> Result<(), GameError> {
        self.finish(GameResult::TimeLoss { loser })
    }

    pub fn resign(&mut self, loser: Color) -> Result<(), GameError> {
        self.finish(GameResult::Resignation { loser })
    }

    fn finish(&mut self, result: GameResult) -> Result<(), GameError> {
        if self.result.is_over() {
            return Err(GameError::AlreadyOver(self.result));
        }
        self.result = result;
        Ok(())
    }

    /// Point the view cursor at history entry `index`.
    pub fn update_state(&mut self, index: usize) -> Result<(), GameError> {
        if index >= self.history.len() {
            return Err(GameError::IndexOutOfRange {
                index,
                len: self.history.len(),
            });
        }
        self.cursor = Some(index);
        Ok(())
    }

    /// Point the view cursor at the root position.
    pub fn set_root_position(&mut self) {
        self.cursor = None;
    }

    pub fn return_to_live(&mut self) {
        self.cursor = self.history.len().checked_sub(1);
    }

    pub fn prepare_new_game(&mut self) {
        self.history.clear();
        self.cursor = None;
        self.result = self.root_result;
    }

    /// Start over from an arbitrary position. On error the current game is
    /// kept as it was. A position with no legal continuation starts (and
    /// stays) finished.
    pub fn prepare_from_fen(&mut self, fen: &str) -> Result<(), GameError> {
        let root = self.rules.root(fen)?;
        self.root = root.position;
        self.root_result = root.status.into();
        self.prepare_new_game();
        Ok(())
    }

    pub fn set_engine_color(&mut self, color: Color) -> Result<(), GameError> {
        if color != self.engine_color && self.is_in_progress() {
            return Err(GameError::GameInProgress);
        }
        self.engine_color = color;
        Ok(())
    }

    pub fn is_over(&self) -> bool {
        self.result.is_over()
    }

    /// At least one move has been played and the game has not ended.
    pub fn is_in_progress(&self) -> bool {
        !self.history.is_empty() && !self.is_over()
    }

    pub fn is_white_on_turn(&self) -> bool {
        self.turn().is_white()
    }

    pub fn is_engine_on_turn(&self) -> bool {
        self.turn() == self.engine_color
    }

    /// The view cursor is not at the tail.
    pub fn is_history(&self) -> bool {
        self.cursor != self.history.len().checked_sub(1)
    }

    pub fn turn(&self) -> Color {
        self.tail().turn()
    }

    pub fn engine_color(&self) -> Color {
        self.engine_color
    }

    pub fn human_color(&self) -> Color {
        self.engine_color.other()
    }

    pub fn result(&self) -> GameResult {
        self.result
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn history_index(&self) -> Option<usize> {
        self.cursor
    }

    pub fn root(&self) -> &Position {
        &self.root
    }

    /// The authoritative current position.
    pub fn tail(&self) -> &Position {
        self.history
            .last()
            .map(|entry| &entry.position)
            .unwrap_or(&self.root)
    }

    /// FEN of the tail position.
    pub fn fen(&self) -> &str {
        self.tail().fen()
    }

    /// The position under the view cursor.
    pub fn viewed_position(&self) -> &Position {
        match self.cursor {
            Some(index) => &self.history[index].position,
            None => &self.root,
        }
    }
}
