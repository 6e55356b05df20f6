//! The rules-engine seam: legality, successor positions and terminal-state
//! classification. Game state never decides any of these on its own.

use serde::Serialize;
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position as _};

use crate::error::RulesError;
use crate::position::Position;
use crate::types::{Color, Move};

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Halfmove clock value at which the fifty-move rule ends the game.
const FIFTY_MOVE_HALFMOVES: u32 = 100;

/// Occurrences of the same position that end the game as a draw.
const REPETITION_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawReason {
    Repetition,
    FiftyMoves,
    InsufficientMaterial,
}

/// Terminal-state classification of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ongoing,
    Checkmate { winner: Color },
    Stalemate,
    Draw(DrawReason),
}

/// A position together with its terminal-state classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub position: Position,
    pub status: Status,
}

pub trait RulesEngine: Send + Sync {
    /// Validate `fen` and produce a root position with no moves played. The
    /// root may already be finished (checkmate, stalemate).
    fn root(&self, fen: &str) -> Result<Transition, RulesError>;

    /// Play `mv` on `position`, or reject it as illegal.
    fn play(&self, position: &Position, mv: &Move) -> Result<Transition, RulesError>;
}

/// [`RulesEngine`] backed by `shakmaty`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShakmatyRules;

impl ShakmatyRules {
    fn parse(fen: &str) -> Result<Chess, RulesError> {
        let invalid = |reason: String| RulesError::InvalidFen {
            fen: fen.to_string(),
            reason,
        };
        let parsed: Fen = fen.trim().parse().map_err(|e| invalid(format!("{e}")))?;
        parsed
            .into_position::<Chess>(CastlingMode::Standard)
            .map_err(|e| invalid(format!("{e}")))
    }

    fn fen_of(pos: &Chess) -> String {
        Fen::from_position(pos, EnPassantMode::Legal).to_string()
    }

    /// Board, side to move, castling rights and en passant square; the
    /// fields that decide whether two positions repeat.
    fn repetition_key(pos: &Chess) -> String {
        Self::fen_of(pos)
            .split_whitespace()
            .take(4)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn legal(pos: &Chess, mv: &Move) -> Result<shakmaty::Move, RulesError> {
        mv.to_uci()
            .to_move(pos)
            .map_err(|e| RulesError::IllegalMove {
                mv: *mv,
                reason: format!("{e}"),
            })
    }

    fn classify(pos: &Chess, repetitions: usize) -> Status {
        if pos.is_checkmate() {
            Status::Checkmate {
                winner: Color::from(pos.turn()).other(),
            }
        } else if pos.is_stalemate() {
            Status::Stalemate
        } else if repetitions >= REPETITION_LIMIT {
            Status::Draw(DrawReason::Repetition)
        } else if pos.halfmoves() >= FIFTY_MOVE_HALFMOVES {
            Status::Draw(DrawReason::FiftyMoves)
        } else if pos.is_insufficient_material() {
            Status::Draw(DrawReason::InsufficientMaterial)
        } else {
            Status::Ongoing
        }
    }
}

impl RulesEngine for ShakmatyRules {
    fn root(&self, fen: &str) -> Result<Transition, RulesError> {
        let pos = Self::parse(fen)?;
        let normalized = Self::fen_of(&pos);
        Ok(Transition {
            status: Self::classify(&pos, 1),
            position: Position::new(
                normalized.clone(),
                normalized,
                Vec::new(),
                pos.turn().into(),
            ),
        })
    }

    fn play(&self, position: &Position, mv: &Move) -> Result<Transition, RulesError> {
        // Replay from the root so repetitions across the whole game are seen.
        let mut pos = Self::parse(position.root_fen())?;
        let mut seen = vec![Self::repetition_key(&pos)];
        for played in position.moves() {
            let legal = Self::legal(&pos, played)?;
            pos.play_unchecked(legal);
            seen.push(Self::repetition_key(&pos));
        }

        let legal = Self::legal(&pos, mv)?;
        pos.play_unchecked(legal);

        let key = Self::repetition_key(&pos);
        let repetitions = 1 + seen.iter().filter(|k| **k == key).count();

        let mut moves = position.moves().to_vec();
        moves.push(*mv);

        Ok(Transition {
            status: Self::classify(&pos, repetitions),
            position: Position::new(
                position.root_fen().to_string(),
                Self::fen_of(&pos),
                moves,
                pos.turn().into(),
            ),
        })
    }
}
