//! Engine and session error types

use std::time::Duration;

use chess_core::{GameError, InvalidMoveError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Invalid(&'static str),
}

/// Starting or configuring an engine failed. A previously loaded engine is
/// unaffected.
#[derive(Error, Debug)]
pub enum EngineLoadError {
    #[error("Failed to spawn engine {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine did not answer `{expected}` within {timeout:?}")]
    Timeout {
        expected: &'static str,
        timeout: Duration,
    },

    #[error("Engine exited during startup")]
    Exited,

    #[error("Engine I/O error during startup: {0}")]
    Io(#[from] std::io::Error),
}

/// Talking to a running engine failed.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine did not answer `{expected}` within {timeout:?}")]
    Timeout {
        expected: &'static str,
        timeout: Duration,
    },

    #[error("Engine process exited")]
    Exited,
}

impl From<EngineError> for EngineLoadError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Io(e) => EngineLoadError::Io(e),
            EngineError::Timeout { expected, timeout } => {
                EngineLoadError::Timeout { expected, timeout }
            }
            EngineError::Exited => EngineLoadError::Exited,
        }
    }
}

/// Synchronous rejections from the search coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("A search is already in flight")]
    Busy,

    #[error("Engine is still loading")]
    NotReady,

    #[error("Engine is not available")]
    Unavailable,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    InvalidMove(#[from] InvalidMoveError),

    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("Engine is thinking about its move")]
    EngineThinking,

    #[error("No engine loaded")]
    NoEngine,

    #[error("Game is over")]
    GameOver,
}
