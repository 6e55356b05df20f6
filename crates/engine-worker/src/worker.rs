//! One background task per engine process. It owns the pipes, runs searches
//! one at a time and posts everything it learns to the event bus.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chess_core::Position;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::client::UciClient;
use crate::config::{EngineSpec, EngineTimeouts};
use crate::error::{EngineError, EngineLoadError};
use crate::events::{EngineEvent, EngineId, Event, EventSender, SearchId};
use crate::protocol::{EngineMessage, GoMode};
use crate::resources::EngineOptions;

/// A loaded, configured engine as seen by the rest of the program.
#[derive(Debug, Clone, Serialize)]
pub struct EngineHandle {
    pub path: PathBuf,
    pub name: String,
    /// Options the engine declared during the handshake
    pub options: Vec<String>,
    /// Hash/Threads derived from host resources
    pub configured: EngineOptions,
    #[serde(skip)]
    alive: Arc<AtomicBool>,
}

impl EngineHandle {
    /// False once the engine process has crashed, exited or been killed.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    Play,
    Analysis,
}

#[derive(Debug)]
pub(crate) enum Request {
    Play {
        search: SearchId,
        position: Position,
        go: GoMode,
    },
    Analyze {
        search: SearchId,
        position: Position,
    },
    Stop,
    NewGame,
    Quit,
}

#[derive(Debug, Clone, Copy)]
struct ActiveSearch {
    id: SearchId,
    kind: SearchKind,
}

pub(crate) struct EngineWorker {
    engine: EngineId,
    client: UciClient,
    events: EventSender,
    alive: Arc<AtomicBool>,
    active: Option<ActiveSearch>,
    /// Set once `stop` has been sent for the active search.
    stop_deadline: Option<Instant>,
}

/// Worker task body: load the engine, then serve requests until told to quit
/// or the request channel closes.
pub(crate) async fn run(
    engine: EngineId,
    spec: EngineSpec,
    timeouts: EngineTimeouts,
    options: EngineOptions,
    requests: mpsc::Receiver<Request>,
    events: EventSender,
) {
    let (client, handle) = match load(&spec, timeouts, options).await {
        Ok(loaded) => loaded,
        Err(e) => {
            warn!(%engine, path = %spec.path.display(), error = %e, "Engine failed to load");
            let _ = events.send(Event::engine(
                engine,
                EngineEvent::LoadFailed {
                    reason: e.to_string(),
                },
            ));
            return;
        }
    };

    info!(%engine, name = %handle.name, pid = client.pid(), "Engine loaded");
    let alive = handle.alive.clone();
    let _ = events.send(Event::engine(engine, EngineEvent::Loaded(handle)));

    let worker = EngineWorker {
        engine,
        client,
        events,
        alive,
        active: None,
        stop_deadline: None,
    };
    worker.serve(requests).await;
}

async fn load(
    spec: &EngineSpec,
    timeouts: EngineTimeouts,
    options: EngineOptions,
) -> Result<(UciClient, EngineHandle), EngineLoadError> {
    let mut client = UciClient::start(spec, timeouts).await?;
    if let Err(e) = client.configure(&options).await {
        client.kill().await;
        return Err(e.into());
    }

    let handle = EngineHandle {
        path: spec.path.clone(),
        name: client.name().to_string(),
        options: client.declared_options().to_vec(),
        configured: options,
        alive: Arc::new(AtomicBool::new(true)),
    };
    Ok((client, handle))
}

impl EngineWorker {
    async fn serve(mut self, mut requests: mpsc::Receiver<Request>) {
        loop {
            let stop_deadline = self.stop_deadline;
            let stop_timer = async move {
                match stop_deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                request = requests.recv() => {
                    let Some(request) = request else {
                        debug!(engine = %self.engine, "Request channel closed");
                        break;
                    };
                    if let Request::Quit = request {
                        break;
                    }
                    if let Err(e) = self.handle(request).await {
                        self.fail(e.to_string()).await;
                        return;
                    }
                }
                message = self.client.next_message() => match message {
                    Ok(message) => self.on_message(message),
                    Err(e) => {
                        self.fail(e.to_string()).await;
                        return;
                    }
                },
                _ = stop_timer => {
                    let timeout = self.client.timeouts().stop;
                    self.fail(format!("engine did not answer `stop` within {timeout:?}")).await;
                    return;
                }
            }
        }

        info!(engine = %self.engine, "Engine shutting down");
        self.client.quit().await;
        self.alive.store(false, Ordering::Release);
    }

    async fn handle(&mut self, request: Request) -> Result<(), EngineError> {
        match request {
            Request::Play {
                search,
                position,
                go,
            } => self.begin(search, SearchKind::Play, &position, go).await,
            Request::Analyze { search, position } => {
                self.begin(search, SearchKind::Analysis, &position, GoMode::Infinite)
                    .await
            }
            Request::Stop => {
                if self.active.is_some() && self.stop_deadline.is_none() {
                    self.client.stop().await?;
                    self.stop_deadline = Some(Instant::now() + self.client.timeouts().stop);
                }
                Ok(())
            }
            Request::NewGame => {
                if self.active.is_some() {
                    debug!(engine = %self.engine, "Ignoring ucinewgame while searching");
                    return Ok(());
                }
                self.client.new_game().await
            }
            Request::Quit => Ok(()),
        }
    }

    async fn begin(
        &mut self,
        search: SearchId,
        kind: SearchKind,
        position: &Position,
        go: GoMode,
    ) -> Result<(), EngineError> {
        if let Some(active) = self.active {
            warn!(engine = %self.engine, %search, active = %active.id, "Search rejected, engine busy");
            self.post(EngineEvent::Rejected { search });
            return Ok(());
        }
        debug!(engine = %self.engine, %search, ?kind, fen = position.fen(), "Search started");
        self.client.go(position, go).await?;
        self.active = Some(ActiveSearch { id: search, kind });
        Ok(())
    }

    fn on_message(&mut self, message: EngineMessage) {
        match message {
            EngineMessage::Info(result) => {
                if let Some(active) = self.active {
                    self.post(EngineEvent::Info {
                        search: active.id,
                        result,
                    });
                }
            }
            EngineMessage::BestMove { best, ponder } => {
                let Some(active) = self.active.take() else {
                    debug!(engine = %self.engine, "Dropping bestmove with no search running");
                    return;
                };
                self.stop_deadline = None;

                let event = match (active.kind, best) {
                    (SearchKind::Analysis, _) => EngineEvent::AnalysisStopped { search: active.id },
                    (SearchKind::Play, Some(best)) => EngineEvent::BestMove {
                        search: active.id,
                        best,
                        ponder,
                    },
                    (SearchKind::Play, None) => {
                        warn!(engine = %self.engine, search = %active.id, "Engine returned no move");
                        EngineEvent::NoMove { search: active.id }
                    }
                };
                self.post(event);
            }
            _ => {}
        }
    }

    /// Kill the process and report the failure. The worker exits afterwards.
    async fn fail(&mut self, reason: String) {
        warn!(engine = %self.engine, reason = %reason, "Engine failure");
        self.client.kill().await;
        self.alive.store(false, Ordering::Release);
        let search = self.active.take().map(|active| active.id);
        self.post(EngineEvent::Failure { search, reason });
    }

    fn post(&self, event: EngineEvent) {
        if self.events.send(Event::engine(self.engine, event)).is_err() {
            debug!(engine = %self.engine, "Event bus closed");
        }
    }
}
