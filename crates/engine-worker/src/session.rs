//! The consumer context: owns the game, the clocks and the engines, and is
//! the only place any of them is mutated.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chess_core::{ClockPair, Color, GameResult, GameState, Move, ShakmatyRules, TimeControl};
use serde::Serialize;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{Config, EngineSpec};
use crate::coordinator::SearchCoordinator;
use crate::error::{SearchError, SessionError};
use crate::events::{self, EngineEvent, EngineId, Event, EventReceiver, EventSender, SearchId};
use crate::protocol::{GoMode, Score};
use crate::resources::EngineOptions;

/// Snapshot for the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub fen: String,
    pub viewed_fen: String,
    pub turn: Color,
    pub engine_color: Color,
    pub result: GameResult,
    pub score: &'static str,
    pub moves: Vec<Move>,
    pub history_index: Option<usize>,
    /// Latest engine evaluation, from White's point of view
    pub evaluation: Option<Score>,
    pub white_clock: String,
    pub black_clock: String,
    pub engine: Option<String>,
    pub thinking: bool,
    pub analysing: bool,
}

pub struct Session {
    config: Config,
    game: GameState,
    clocks: ClockPair,
    /// Applied to the clocks at the next reset
    time_control: TimeControl,
    engine: Option<SearchCoordinator>,
    /// Engine being loaded to replace `engine`
    pending: Option<SearchCoordinator>,
    events_tx: EventSender,
    events_rx: EventReceiver,
    ticker: Interval,
    /// Play search whose best move will be pushed
    awaited: Option<SearchId>,
    analysis: Option<SearchId>,
    /// Play a move as soon as the running analysis has stopped
    move_now: bool,
    /// `ucinewgame` owed to the engine once its current search ends
    new_game_pending: bool,
    /// Side to move in the position being searched
    search_turn: Color,
    evaluation: Option<Score>,
    next_engine: u64,
}

impl Session {
    /// Create a session with a fresh game. No engine is loaded; call
    /// [`load_engine`](Self::load_engine). Must be called inside a tokio
    /// runtime.
    pub fn new(config: Config) -> Result<Self, SessionError> {
        let game = GameState::new(Arc::new(ShakmatyRules), config.engine_color)?;
        let clocks = ClockPair::new(config.time_control, config.tick_interval);
        let (events_tx, events_rx) = events::channel();

        let mut ticker = interval(config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut session = Self {
            time_control: config.time_control,
            config,
            game,
            clocks,
            engine: None,
            pending: None,
            events_tx,
            events_rx,
            ticker,
            awaited: None,
            analysis: None,
            move_now: false,
            new_game_pending: false,
            search_turn: Color::White,
            evaluation: None,
            next_engine: 1,
        };
        session.sync_clocks(Instant::now());
        Ok(session)
    }

    /// Start loading an engine. It replaces the current one once it reports
    /// `Loaded`; if loading fails the current engine stays.
    pub fn load_engine(&mut self, spec: EngineSpec) -> EngineId {
        if let Some(previous) = self.pending.take() {
            debug!(engine = %previous.id(), "Abandoning pending engine");
            tokio::spawn(previous.shutdown());
        }

        let id = EngineId(self.next_engine);
        self.next_engine += 1;
        let coordinator = SearchCoordinator::launch(
            id,
            spec,
            self.config.timeouts,
            EngineOptions::from_host(),
            self.events_tx.clone(),
        );
        self.pending = Some(coordinator);
        id
    }

    /// Wait for the next event worth presenting. Clock ticks and stale engine
    /// notifications are handled internally.
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    if let Some(event) = self.react(event?) {
                        return Some(event);
                    }
                }
                _ = self.ticker.tick() => {
                    if let Some(color) = self.clocks.tick(Instant::now()) {
                        if self.on_time_expired(color) {
                            self.post(Event::game_over(self.game.result()));
                            return Some(Event::TimeExpired { color });
                        }
                    }
                }
            }
        }
    }

    fn react(&mut self, event: Event) -> Option<Event> {
        match &event {
            Event::Engine { engine, event: inner } => {
                if !self.on_engine_event(*engine, inner) {
                    debug!(%engine, ?inner, "Dropping stale engine event");
                    return None;
                }
            }
            // Posted only after the loss has been recorded
            Event::TimeExpired { .. } | Event::MovePlayed { .. } | Event::GameOver { .. } => {}
        }
        Some(event)
    }

    fn on_engine_event(&mut self, engine: EngineId, event: &EngineEvent) -> bool {
        if self.pending.as_ref().map(|p| p.id()) == Some(engine) {
            return self.on_pending_event(event);
        }

        let Some(current) = self.engine.as_mut().filter(|c| c.id() == engine) else {
            return false;
        };
        if !current.observe(event) {
            return false;
        }

        let fresh = match event {
            EngineEvent::BestMove { search, best, .. } => {
                if self.awaited == Some(*search) {
                    self.awaited = None;
                    if let Err(e) = self.apply_engine_move(*best) {
                        warn!(%engine, mv = %best, error = %e, "Engine move rejected");
                    }
                    true
                } else {
                    false
                }
            }
            EngineEvent::Info { search, result } => {
                let fresh = Some(*search) == self.awaited || Some(*search) == self.analysis;
                if let Some(score) = result.score.filter(|_| fresh) {
                    self.evaluation = Some(score.white_pov(self.search_turn));
                }
                fresh
            }
            EngineEvent::NoMove { search } => {
                if self.awaited == Some(*search) {
                    self.awaited = None;
                    warn!(%engine, fen = self.game.fen(), "Engine found no move");
                }
                true
            }
            EngineEvent::AnalysisStopped { search } | EngineEvent::Rejected { search } => {
                if self.analysis == Some(*search) {
                    self.analysis = None;
                    self.sync_clocks(Instant::now());
                }
                if self.awaited == Some(*search) {
                    self.awaited = None;
                }
                true
            }
            EngineEvent::Failure { .. } => {
                self.awaited = None;
                self.analysis = None;
                self.move_now = false;
                self.sync_clocks(Instant::now());
                true
            }
            EngineEvent::Loaded(_) | EngineEvent::LoadFailed { .. } => true,
        };

        if event.is_terminal() {
            self.resume();
        }
        fresh
    }

    fn on_pending_event(&mut self, event: &EngineEvent) -> bool {
        let Some(mut pending) = self.pending.take() else {
            return false;
        };
        let fresh = pending.observe(event);

        match event {
            EngineEvent::Loaded(handle) => {
                info!(engine = %pending.id(), name = %handle.name, "Engine ready");
                if let Some(old) = self.engine.replace(pending) {
                    tokio::spawn(old.shutdown());
                }
                self.awaited = None;
                self.analysis = None;
                self.move_now = false;
                self.new_game_pending = false;
                self.sync_clocks(Instant::now());
                self.maybe_invoke_engine();
            }
            EngineEvent::LoadFailed { reason } => {
                warn!(engine = %pending.id(), reason = %reason, "Keeping current engine");
            }
            _ => self.pending = Some(pending),
        }
        fresh
    }

    /// Record a fallen flag. Returns false when the game had already ended.
    fn on_time_expired(&mut self, color: Color) -> bool {
        if self.game.is_over() {
            return false;
        }
        self.clocks.stop_all(Instant::now());
        if let Err(e) = self.game.declare_time_loss(color) {
            warn!(error = %e, "Time loss not recorded");
            return false;
        }
        info!(loser = %color, "Flag fell");
        self.cancel_searches();
        true
    }

    /// Record a flag that fell outside the tick and queue its events.
    fn announce_time_loss(&mut self, color: Color) {
        if self.on_time_expired(color) {
            self.post(Event::TimeExpired { color });
            self.post(Event::game_over(self.game.result()));
        }
    }

    /// Charge the running clock up to `now`. Returns true if its flag fell.
    fn check_flag(&mut self, now: Instant) -> bool {
        match self.clocks.tick(now) {
            Some(color) => {
                self.announce_time_loss(color);
                true
            }
            None => false,
        }
    }

    /// Start any engine work that was waiting for the engine to go idle.
    fn resume(&mut self) {
        if self.new_game_pending {
            self.send_new_game();
        }
        if self.move_now && self.analysis.is_none() {
            self.move_now = false;
            if let Err(e) = self.request_move() {
                debug!(error = %e, "Deferred move not started");
            }
            return;
        }
        self.maybe_invoke_engine();
    }

    /// Human move.
    pub fn submit_move(&mut self, mv: Move) -> Result<(), SessionError> {
        if self.awaited.is_some() {
            return Err(SessionError::EngineThinking);
        }
        if self.analysis.is_some() {
            self.halt_analysis();
        }
        self.apply_move(mv)
    }

    fn apply_engine_move(&mut self, mv: Move) -> Result<(), SessionError> {
        if self.game.is_history() {
            self.game.return_to_live();
        }
        self.apply_move(mv)
    }

    /// Push, then stop the mover's clock, add its increment and start the
    /// opponent's. A move made after the mover's flag fell is refused.
    fn apply_move(&mut self, mv: Move) -> Result<(), SessionError> {
        let now = Instant::now();
        if self.check_flag(now) {
            return Err(SessionError::GameOver);
        }
        let mover = self.game.turn();
        self.game.push(mv)?;

        // Already charged up to `now` by the flag check
        self.clocks.stop(mover, now);
        self.clocks.add_increment(mover);
        self.post(Event::MovePlayed {
            mv,
            color: mover,
            fen: self.game.fen().to_string(),
        });

        if self.game.is_over() {
            self.clocks.stop_all(now);
            info!(result = %self.game.result(), "Game over");
            self.post(Event::game_over(self.game.result()));
        } else {
            self.sync_clocks(now);
            self.maybe_invoke_engine();
        }
        Ok(())
    }

    fn maybe_invoke_engine(&mut self) {
        if self.game.is_over() || !self.game.is_engine_on_turn() {
            return;
        }
        if let Err(e) = self.request_move() {
            debug!(error = %e, "Engine not invoked");
        }
    }

    /// Ask the engine to play the side to move.
    fn request_move(&mut self) -> Result<(), SessionError> {
        if self.game.is_over() {
            return Err(SessionError::GameOver);
        }
        if self.awaited.is_some() || self.analysis.is_some() {
            return Err(SearchError::Busy.into());
        }
        let go = GoMode::Timed {
            wtime: millis(self.clocks.remaining(Color::White)),
            btime: millis(self.clocks.remaining(Color::Black)),
            winc: millis(self.clocks.increment(Color::White)),
            binc: millis(self.clocks.increment(Color::Black)),
        };
        let engine = self.engine.as_mut().ok_or(SessionError::NoEngine)?;
        let search = engine.play_move(self.game.tail(), go)?;
        self.awaited = Some(search);
        self.search_turn = self.game.turn();
        Ok(())
    }

    /// Make the engine move now: cut a running play search short, or start
    /// one for the side to move.
    pub fn play_move_now(&mut self) -> Result<(), SessionError> {
        if self.game.is_over() {
            return Err(SessionError::GameOver);
        }
        if self.awaited.is_some() {
            if let Some(engine) = self.engine.as_mut() {
                engine.stop();
            }
            return Ok(());
        }
        if self.engine.is_none() {
            return Err(SessionError::NoEngine);
        }
        if self.analysis.is_some() {
            self.halt_analysis();
            self.move_now = true;
            return Ok(());
        }
        if self.game.is_history() {
            self.game.return_to_live();
            self.sync_clocks(Instant::now());
        }
        match self.request_move() {
            // Analysis still winding down; play once it has stopped.
            Err(SessionError::Search(SearchError::Busy)) => {
                self.move_now = true;
                Ok(())
            }
            other => other,
        }
    }

    /// Analyze the viewed position. Clocks are paused meanwhile.
    pub fn start_analysis(&mut self) -> Result<SearchId, SessionError> {
        if self.awaited.is_some() {
            return Err(SessionError::EngineThinking);
        }
        if self.analysis.is_some() {
            return Err(SearchError::Busy.into());
        }
        let now = Instant::now();
        self.check_flag(now);
        let engine = self.engine.as_mut().ok_or(SessionError::NoEngine)?;
        let search = engine.start_analysis(self.game.viewed_position())?;
        self.analysis = Some(search);
        self.search_turn = self.game.viewed_position().turn();
        self.sync_clocks(now);
        Ok(search)
    }

    /// Stop a running analysis and resume the clocks.
    pub fn stop_analysis(&mut self) {
        if self.analysis.is_some() {
            self.halt_analysis();
        }
    }

    fn halt_analysis(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.stop_analysis();
        }
        self.analysis = None;
        self.sync_clocks(Instant::now());
    }

    pub fn view(&mut self, index: usize) -> Result<(), SessionError> {
        self.game.update_state(index)?;
        self.sync_clocks(Instant::now());
        Ok(())
    }

    pub fn view_root(&mut self) {
        self.game.set_root_position();
        self.sync_clocks(Instant::now());
    }

    pub fn return_to_live(&mut self) {
        self.game.return_to_live();
        self.sync_clocks(Instant::now());
    }

    pub fn new_game(&mut self) -> Result<(), SessionError> {
        self.cancel_searches();
        self.game.prepare_new_game();
        self.restart()
    }

    /// New game from `fen`. An invalid FEN leaves the current game untouched.
    pub fn new_game_from_fen(&mut self, fen: &str) -> Result<(), SessionError> {
        self.game.prepare_from_fen(fen)?;
        self.cancel_searches();
        self.restart()
    }

    fn restart(&mut self) -> Result<(), SessionError> {
        let now = Instant::now();
        self.clocks.stop_all(now);
        self.clocks.reset(self.time_control, &self.game)?;
        self.evaluation = None;
        self.send_new_game();
        info!(fen = self.game.fen(), "New game");
        if self.game.is_over() {
            info!(result = %self.game.result(), "Starting position is already decided");
            self.post(Event::game_over(self.game.result()));
        }
        self.sync_clocks(now);
        self.maybe_invoke_engine();
        Ok(())
    }

    /// `ucinewgame`, deferred while a search is still winding down.
    fn send_new_game(&mut self) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        if engine.is_busy() {
            self.new_game_pending = true;
        } else {
            engine.new_game();
            self.new_game_pending = false;
        }
    }

    /// The human resigns.
    pub fn resign(&mut self) -> Result<(), SessionError> {
        if self.check_flag(Instant::now()) {
            return Err(SessionError::GameOver);
        }
        self.game.resign(self.game.human_color())?;
        self.clocks.stop_all(Instant::now());
        self.cancel_searches();
        self.post(Event::game_over(self.game.result()));
        Ok(())
    }

    /// Change time control and engine side. The engine side cannot change
    /// mid-game; a new time control waits for the next game if one is in
    /// progress.
    pub fn apply_settings(
        &mut self,
        time_control: TimeControl,
        engine_color: Color,
    ) -> Result<(), SessionError> {
        self.game.set_engine_color(engine_color)?;
        self.time_control = time_control;
        if !self.game.is_in_progress() {
            let now = Instant::now();
            self.clocks.stop_all(now);
            self.clocks.reset(time_control, &self.game)?;
            self.sync_clocks(now);
        }
        self.maybe_invoke_engine();
        Ok(())
    }

    fn cancel_searches(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.stop();
        }
        self.awaited = None;
        self.analysis = None;
        self.move_now = false;
    }

    /// Run the side to move's clock only while the game is live, on the
    /// tail position, and not being analysed.
    fn sync_clocks(&mut self, now: Instant) {
        let expired = if self.game.is_over() || self.game.is_history() || self.analysis.is_some() {
            self.clocks.stop_all(now)
        } else {
            self.clocks.start(self.game.turn(), now)
        };
        if let Some(color) = expired {
            self.announce_time_loss(color);
        }
    }

    fn post(&self, event: Event) {
        // The session holds the receiver, so this cannot fail while it lives.
        let _ = self.events_tx.send(event);
    }

    pub fn status(&self) -> SessionStatus {
        let result = self.game.result();
        SessionStatus {
            fen: self.game.fen().to_string(),
            viewed_fen: self.game.viewed_position().fen().to_string(),
            turn: self.game.turn(),
            engine_color: self.game.engine_color(),
            result,
            score: result.score(),
            moves: self.game.history().iter().map(|entry| entry.mv).collect(),
            history_index: self.game.history_index(),
            evaluation: self.evaluation,
            white_clock: self.clocks.display(Color::White),
            black_clock: self.clocks.display(Color::Black),
            engine: self
                .engine
                .as_ref()
                .and_then(|e| e.handle())
                .map(|h| h.name.clone()),
            thinking: self.awaited.is_some(),
            analysing: self.analysis.is_some(),
        }
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn clocks(&self) -> &ClockPair {
        &self.clocks
    }

    pub fn engine(&self) -> Option<&SearchCoordinator> {
        self.engine.as_ref()
    }

    pub fn is_loading_engine(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_thinking(&self) -> bool {
        self.awaited.is_some()
    }

    pub fn is_analysing(&self) -> bool {
        self.analysis.is_some()
    }

    pub fn evaluation(&self) -> Option<Score> {
        self.evaluation
    }

    /// A new game started while the engine was searching and it has not been
    /// told yet.
    pub fn is_new_game_pending(&self) -> bool {
        self.new_game_pending
    }

    /// Quit every engine and wait for their workers.
    pub async fn shutdown(mut self) {
        self.cancel_searches();
        self.clocks.stop_all(Instant::now());
        if let Some(pending) = self.pending.take() {
            pending.shutdown().await;
        }
        if let Some(engine) = self.engine.take() {
            engine.shutdown().await;
        }
        info!("Session closed");
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
