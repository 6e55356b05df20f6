//! Two countdown clocks, at most one running, driven by an external periodic
//! tick. All timing is measured with the monotonic clock; callers pass the
//! current `Instant` so time can be driven deterministically in tests.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::GameError;
use crate::game::GameState;
use crate::types::Color;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeControl {
    pub time: Duration,
    pub increment: Duration,
}

impl TimeControl {
    pub fn new(time: Duration, increment: Duration) -> Self {
        Self { time, increment }
    }
}

#[derive(Debug, Clone)]
struct ClockState {
    remaining: Duration,
    increment: Duration,
    /// Instant of the last start or tick while running.
    running_since: Option<Instant>,
}

impl ClockState {
    fn new(control: TimeControl) -> Self {
        Self {
            remaining: control.time,
            increment: control.increment,
            running_since: None,
        }
    }

    fn charge(&mut self, now: Instant) {
        if let Some(last) = self.running_since {
            let elapsed = now.saturating_duration_since(last);
            self.remaining = self.remaining.saturating_sub(elapsed);
            self.running_since = Some(now);
        }
    }
}

pub struct ClockPair {
    white: ClockState,
    black: ClockState,
    control: TimeControl,
    tick_interval: Duration,
}

impl ClockPair {
    pub fn new(control: TimeControl, tick_interval: Duration) -> Self {
        Self {
            white: ClockState::new(control),
            black: ClockState::new(control),
            control,
            tick_interval,
        }
    }

    fn clock(&self, color: Color) -> &ClockState {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    fn clock_mut(&mut self, color: Color) -> &mut ClockState {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    /// Start `color`'s countdown, stopping the opponent's. Returns the
    /// opponent if stopping it ran its time out.
    pub fn start(&mut self, color: Color, now: Instant) -> Option<Color> {
        let expired = self.stop(color.other(), now);
        let clock = self.clock_mut(color);
        if clock.running_since.is_none() {
            clock.running_since = Some(now);
        }
        expired
    }

    /// Freeze `color`'s remaining time. Returns `color` if the time charged
    /// up to `now` ran it out; a stopped clock is never reported again.
    pub fn stop(&mut self, color: Color, now: Instant) -> Option<Color> {
        if !self.is_running(color) {
            return None;
        }
        let expired = self.charge(color, now);
        self.clock_mut(color).running_since = None;
        expired
    }

    /// Stop both clocks, returning whichever ran out while being stopped.
    pub fn stop_all(&mut self, now: Instant) -> Option<Color> {
        let white = self.stop(Color::White, now);
        let black = self.stop(Color::Black, now);
        white.or(black)
    }

    /// Charge elapsed time to the running clock. Returns the color whose time
    /// just ran out; the expired clock is stopped, so it reports at most once
    /// until started again.
    pub fn tick(&mut self, now: Instant) -> Option<Color> {
        let color = self.running()?;
        self.charge(color, now)
    }

    fn charge(&mut self, color: Color, now: Instant) -> Option<Color> {
        let threshold = self.tick_interval;
        let clock = self.clock_mut(color);
        clock.charge(now);

        // Less than one tick left cannot be observed before it is gone.
        if clock.remaining < threshold {
            clock.remaining = Duration::ZERO;
            clock.running_since = None;
            return Some(color);
        }
        None
    }

    pub fn add_increment(&mut self, color: Color) {
        let clock = self.clock_mut(color);
        clock.remaining += clock.increment;
    }

    /// Restore both clocks to `control`. Refused while `game` is in progress.
    pub fn reset(&mut self, control: TimeControl, game: &GameState) -> Result<(), GameError> {
        if game.is_in_progress() {
            return Err(GameError::GameInProgress);
        }
        self.control = control;
        self.white = ClockState::new(control);
        self.black = ClockState::new(control);
        Ok(())
    }

    pub fn running(&self) -> Option<Color> {
        if self.white.running_since.is_some() {
            Some(Color::White)
        } else if self.black.running_since.is_some() {
            Some(Color::Black)
        } else {
            None
        }
    }

    pub fn is_running(&self, color: Color) -> bool {
        self.clock(color).running_since.is_some()
    }

    /// Remaining time as of the last start, stop or tick.
    pub fn remaining(&self, color: Color) -> Duration {
        self.clock(color).remaining
    }

    pub fn increment(&self, color: Color) -> Duration {
        self.clock(color).increment
    }

    pub fn time_control(&self) -> TimeControl {
        self.control
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn display(&self, color: Color) -> String {
        format_clock(self.remaining(color))
    }
}

/// `hh:mm:ss` when an hour or more remains, `mm:ss` otherwise.
pub fn format_clock(remaining: Duration) -> String {
    let total = remaining.as_secs_f64().round() as u64;
    let (hours, rest) = (total / 3600, total % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}
