//! Configuration from environment variables

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chess_core::{Color, TimeControl, DEFAULT_TICK_INTERVAL};
use tracing::info;

use crate::error::ConfigError;

/// Executable plus arguments used to launch an engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSpec {
    pub path: PathBuf,
    pub args: Vec<String>,
}

impl EngineSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Bounds on every wait for an engine reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineTimeouts {
    /// `uci` → `uciok`
    pub handshake: Duration,
    /// `isready` → `readyok`
    pub ready: Duration,
    /// `stop` → final `bestmove`
    pub stop: Duration,
    /// `quit` → process exit
    pub quit: Duration,
}

impl Default for EngineTimeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(10),
            ready: Duration::from_secs(10),
            stop: Duration::from_secs(3),
            quit: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Engine launched at startup
    pub engine: EngineSpec,

    /// Side the engine plays
    pub engine_color: Color,

    /// Base time and increment for both clocks
    pub time_control: TimeControl,

    /// Clock tick period; also the expiry threshold
    pub tick_interval: Duration,

    pub timeouts: EngineTimeouts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineSpec::new("stockfish"),
            engine_color: Color::Black,
            time_control: TimeControl::new(Duration::from_secs(300), Duration::ZERO),
            tick_interval: DEFAULT_TICK_INTERVAL,
            timeouts: EngineTimeouts::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let engine_path = env::var("ENGINE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.engine.path);

        let engine_args: Vec<String> = env::var("ENGINE_ARGS")
            .map(|v| v.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        let engine_color = match env::var("ENGINE_COLOR") {
            Ok(v) => Color::from_str(&v)
                .map_err(|_| ConfigError::Invalid("ENGINE_COLOR must be white or black"))?,
            Err(_) => defaults.engine_color,
        };

        let time = parse_var("CLOCK_TIME_SECS", "CLOCK_TIME_SECS must be a number")?
            .map(Duration::from_secs_f64)
            .unwrap_or(defaults.time_control.time);

        let increment = parse_var("CLOCK_INCREMENT_SECS", "CLOCK_INCREMENT_SECS must be a number")?
            .map(Duration::from_secs_f64)
            .unwrap_or(defaults.time_control.increment);

        let tick_interval = parse_millis("CLOCK_TICK_MS")?.unwrap_or(defaults.tick_interval);
        if tick_interval.is_zero() {
            return Err(ConfigError::Invalid("CLOCK_TICK_MS must be positive"));
        }

        let timeouts = EngineTimeouts {
            handshake: parse_millis("HANDSHAKE_TIMEOUT_MS")?
                .unwrap_or(defaults.timeouts.handshake),
            ready: parse_millis("READY_TIMEOUT_MS")?.unwrap_or(defaults.timeouts.ready),
            stop: parse_millis("STOP_TIMEOUT_MS")?.unwrap_or(defaults.timeouts.stop),
            quit: parse_millis("QUIT_TIMEOUT_MS")?.unwrap_or(defaults.timeouts.quit),
        };

        info!(
            engine = %engine_path.display(),
            engine_color = %engine_color,
            time_secs = time.as_secs_f64(),
            increment_secs = increment.as_secs_f64(),
            "Config loaded"
        );

        Ok(Self {
            engine: EngineSpec {
                path: engine_path,
                args: engine_args,
            },
            engine_color,
            time_control: TimeControl::new(time, increment),
            tick_interval,
            timeouts,
        })
    }
}

fn parse_var(key: &str, message: &'static str) -> Result<Option<f64>, ConfigError> {
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(Some)
            .ok_or(ConfigError::Invalid(message)),
        Err(_) => Ok(None),
    }
}

fn parse_millis(key: &'static str) -> Result<Option<Duration>, ConfigError> {
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| ConfigError::Invalid("timeout and tick values must be whole milliseconds")),
        Err(_) => Ok(None),
    }
}
