//! Event bus shared by engine workers, the clock tick and the session.
//!
//! Workers only post; the session is the single consumer and drains events
//! in arrival order.

use std::fmt;

use chess_core::{Color, GameResult, Move};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::protocol::AnalysisResult;
use crate::worker::EngineHandle;

/// Identifies one launched engine for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EngineId(pub u64);

/// Identifies one search request on a given engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SearchId(pub u64);

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

impl fmt::Display for SearchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "search#{}", self.0)
    }
}

/// Notifications posted by an engine worker.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    Loaded(EngineHandle),
    LoadFailed {
        reason: String,
    },
    Info {
        search: SearchId,
        #[serde(flatten)]
        result: AnalysisResult,
    },
    BestMove {
        search: SearchId,
        best: Move,
        ponder: Option<Move>,
    },
    /// The engine answered a play search with `bestmove (none)`. The engine
    /// stays usable.
    NoMove {
        search: SearchId,
    },
    /// Final notification of an analysis search.
    AnalysisStopped {
        search: SearchId,
    },
    /// The engine process is gone or unresponsive. `search` is the search
    /// that was running, if any.
    Failure {
        search: Option<SearchId>,
        reason: String,
    },
    /// The worker was already searching and refused the request.
    Rejected {
        search: SearchId,
    },
}

impl EngineEvent {
    /// The search this notification belongs to.
    pub fn search(&self) -> Option<SearchId> {
        match self {
            EngineEvent::Info { search, .. }
            | EngineEvent::BestMove { search, .. }
            | EngineEvent::NoMove { search }
            | EngineEvent::AnalysisStopped { search }
            | EngineEvent::Rejected { search } => Some(*search),
            EngineEvent::Failure { search, .. } => *search,
            EngineEvent::Loaded(_) | EngineEvent::LoadFailed { .. } => None,
        }
    }

    /// No further notification for the search follows this one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineEvent::BestMove { .. }
                | EngineEvent::NoMove { .. }
                | EngineEvent::AnalysisStopped { .. }
                | EngineEvent::Failure { .. }
                | EngineEvent::Rejected { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Engine {
        engine: EngineId,
        event: EngineEvent,
    },
    TimeExpired {
        color: Color,
    },
    MovePlayed {
        #[serde(rename = "move")]
        mv: Move,
        color: Color,
        fen: String,
    },
    GameOver {
        result: GameResult,
        score: &'static str,
    },
}

impl Event {
    pub fn engine(engine: EngineId, event: EngineEvent) -> Self {
        Event::Engine { engine, event }
    }

    pub fn game_over(result: GameResult) -> Self {
        Event::GameOver {
            result,
            score: result.score(),
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
