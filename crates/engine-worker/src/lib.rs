//! UCI engine plumbing and the single-consumer game session.
//!
//! Each engine runs behind its own worker task; a [`SearchCoordinator`]
//! keeps at most one search in flight per engine, and the [`Session`] is the
//! only owner of game and clock state.

pub use chess_core;

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod process;
pub mod protocol;
pub mod resources;
pub mod session;
pub mod worker;

pub use config::{Config, EngineSpec, EngineTimeouts};
pub use coordinator::SearchCoordinator;
pub use error::{ConfigError, EngineError, EngineLoadError, SearchError, SessionError};
pub use events::{EngineEvent, EngineId, Event, SearchId};
pub use protocol::{AnalysisResult, GoMode, Score};
pub use resources::EngineOptions;
pub use session::{Session, SessionStatus};
pub use worker::{EngineHandle, SearchKind};
