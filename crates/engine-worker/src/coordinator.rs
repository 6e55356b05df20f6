//! Single-flight front end for one engine worker.
//!
//! The coordinator lives on the consumer side. It hands requests to its
//! worker over a bounded channel, refuses overlapping searches, and is told
//! about every notification the consumer drains so it can track load state
//! and spot stale results.

use chess_core::Position;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{EngineSpec, EngineTimeouts};
use crate::error::SearchError;
use crate::events::{EngineEvent, EngineId, EventSender, SearchId};
use crate::protocol::GoMode;
use crate::resources::EngineOptions;
use crate::worker::{self, EngineHandle, Request, SearchKind};

const REQUEST_QUEUE: usize = 8;

#[derive(Debug)]
enum EngineState {
    Loading,
    Ready(EngineHandle),
    Failed,
}

pub struct SearchCoordinator {
    engine: EngineId,
    requests: mpsc::Sender<Request>,
    worker: Option<JoinHandle<()>>,
    state: EngineState,
    in_flight: Option<(SearchId, SearchKind)>,
    next_search: u64,
    quit_sent: bool,
}

impl SearchCoordinator {
    /// Spawn a worker that starts and configures the engine at `spec`. The
    /// outcome arrives on `events` as `Loaded` or `LoadFailed`.
    pub fn launch(
        engine: EngineId,
        spec: EngineSpec,
        timeouts: EngineTimeouts,
        options: EngineOptions,
        events: EventSender,
    ) -> Self {
        info!(%engine, path = %spec.path.display(), "Launching engine");
        let (requests, rx) = mpsc::channel(REQUEST_QUEUE);
        let worker = tokio::spawn(
            worker::run(engine, spec, timeouts, options, rx, events)
                .instrument(info_span!("engine", id = engine.0)),
        );

        Self {
            engine,
            requests,
            worker: Some(worker),
            state: EngineState::Loading,
            in_flight: None,
            next_search: 1,
            quit_sent: false,
        }
    }

    /// Ask for a move in `position` under the given clock state.
    pub fn play_move(&mut self, position: &Position, go: GoMode) -> Result<SearchId, SearchError> {
        self.begin(SearchKind::Play, |search| Request::Play {
            search,
            position: position.clone(),
            go,
        })
    }

    /// Analyze `position` until [`stop_analysis`](Self::stop_analysis).
    pub fn start_analysis(&mut self, position: &Position) -> Result<SearchId, SearchError> {
        self.begin(SearchKind::Analysis, |search| Request::Analyze {
            search,
            position: position.clone(),
        })
    }

    fn begin(
        &mut self,
        kind: SearchKind,
        request: impl FnOnce(SearchId) -> Request,
    ) -> Result<SearchId, SearchError> {
        self.check_ready()?;
        if self.in_flight.is_some() {
            return Err(SearchError::Busy);
        }

        let search = SearchId(self.next_search);
        match self.requests.try_send(request(search)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(SearchError::Busy),
            Err(TrySendError::Closed(_)) => {
                self.state = EngineState::Failed;
                return Err(SearchError::Unavailable);
            }
        }

        self.next_search += 1;
        self.in_flight = Some((search, kind));
        debug!(engine = %self.engine, %search, ?kind, "Search requested");
        Ok(search)
    }

    fn check_ready(&self) -> Result<(), SearchError> {
        match &self.state {
            EngineState::Loading => Err(SearchError::NotReady),
            EngineState::Failed => Err(SearchError::Unavailable),
            EngineState::Ready(handle) if !handle.is_alive() || self.quit_sent => {
                Err(SearchError::Unavailable)
            }
            EngineState::Ready(_) => Ok(()),
        }
    }

    /// Stop a running analysis. No-op when idle or when a play search is in
    /// flight.
    pub fn stop_analysis(&mut self) {
        if let Some((_, SearchKind::Analysis)) = self.in_flight {
            self.send(Request::Stop);
        }
    }

    /// Stop whatever search is in flight; a play search answers with its
    /// best move so far.
    pub fn stop(&mut self) {
        if self.in_flight.is_some() {
            self.send(Request::Stop);
        }
    }

    /// Forward `ucinewgame` when idle.
    pub fn new_game(&mut self) {
        if self.in_flight.is_none() && self.check_ready().is_ok() {
            self.send(Request::NewGame);
        }
    }

    pub fn quit(&mut self) {
        if self.quit_sent {
            return;
        }
        self.quit_sent = true;
        self.send(Request::Quit);
    }

    /// Quit and wait for the worker to finish.
    pub async fn shutdown(mut self) {
        self.quit();
        let Some(worker) = self.worker.take() else {
            return;
        };
        drop(self.requests);
        if let Err(e) = worker.await {
            warn!(engine = %self.engine, error = %e, "Engine worker panicked");
        }
    }

    fn send(&self, request: Request) {
        if let Err(e) = self.requests.try_send(request) {
            debug!(engine = %self.engine, error = %e, "Request not delivered");
        }
    }

    /// Record a notification from this coordinator's worker. Returns false
    /// for stale notifications that belong to no search in flight.
    pub fn observe(&mut self, event: &EngineEvent) -> bool {
        match event {
            EngineEvent::Loaded(handle) => {
                self.state = EngineState::Ready(handle.clone());
                true
            }
            EngineEvent::LoadFailed { .. } => {
                self.state = EngineState::Failed;
                true
            }
            EngineEvent::Failure { .. } => {
                self.state = EngineState::Failed;
                self.in_flight = None;
                true
            }
            _ => {
                let Some((search, _)) = self.in_flight else {
                    return false;
                };
                if event.search() != Some(search) {
                    return false;
                }
                if event.is_terminal() {
                    self.in_flight = None;
                }
                true
            }
        }
    }

    pub fn id(&self) -> EngineId {
        self.engine
    }

    pub fn handle(&self) -> Option<&EngineHandle> {
        match &self.state {
            EngineState::Ready(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, EngineState::Loading)
    }

    pub fn is_ready(&self) -> bool {
        self.check_ready().is_ok()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<(SearchId, SearchKind)> {
        self.in_flight
    }
}
