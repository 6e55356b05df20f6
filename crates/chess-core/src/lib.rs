//! Game state, clocks and the rules-engine seam for a human-versus-engine
//! chess game. Everything here is synchronous and owned by a single consumer
//! context; engine I/O lives in the `engine-worker` crate.

pub mod clock;
pub mod error;
pub mod game;
pub mod position;
pub mod rules;
pub mod types;

pub use clock::{format_clock, ClockPair, TimeControl, DEFAULT_TICK_INTERVAL};
pub use error::{GameError, InvalidMoveError, ParseMoveError, RulesError};
pub use game::{GameResult, GameState, HistoryEntry};
pub use position::Position;
pub use rules::{DrawReason, RulesEngine, ShakmatyRules, Status, Transition, STANDARD_START_FEN};
pub use types::{Color, Move};

pub use shakmaty;
