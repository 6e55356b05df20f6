//! Shared helpers for engine-worker integration tests

#![allow(dead_code)]

use std::time::Duration;

use chess_core::{Color, Position, RulesEngine, ShakmatyRules, TimeControl, STANDARD_START_FEN};
use engine_worker::events::{self, EventReceiver};
use engine_worker::{
    Config, EngineEvent, EngineHandle, EngineId, EngineOptions, EngineSpec, EngineTimeouts, Event,
    SearchCoordinator, Session,
};
use tokio::time::timeout;

/// Upper bound on waiting for any single event
pub const T_EVENT: Duration = Duration::from_secs(5);

/// Scripted engine in the given mode (`normal`, `stubborn`, `mute`, `crash`)
pub fn fake_engine(mode: &str) -> EngineSpec {
    EngineSpec::new(env!("CARGO_BIN_EXE_fake-uci")).with_args(["--mode", mode])
}

/// Normal scripted engine that takes `millis` to answer a timed search
/// unless stopped first
pub fn thinking_engine(millis: u64) -> EngineSpec {
    EngineSpec::new(env!("CARGO_BIN_EXE_fake-uci")).with_args([
        "--mode".to_string(),
        "normal".to_string(),
        "--think".to_string(),
        millis.to_string(),
    ])
}

pub fn fast_timeouts() -> EngineTimeouts {
    EngineTimeouts {
        handshake: Duration::from_secs(2),
        ready: Duration::from_secs(2),
        stop: Duration::from_millis(300),
        quit: Duration::from_millis(500),
    }
}

pub fn small_options() -> EngineOptions {
    EngineOptions::derive(64, 1)
}

pub fn start_position() -> Position {
    ShakmatyRules
        .root(STANDARD_START_FEN)
        .expect("start position")
        .position
}

pub fn config(engine_color: Color, time_control: TimeControl) -> Config {
    Config {
        engine: fake_engine("normal"),
        engine_color,
        time_control,
        tick_interval: Duration::from_millis(30),
        timeouts: fast_timeouts(),
    }
}

/// Next engine notification from the bus.
pub async fn next_engine_event(rx: &mut EventReceiver) -> (EngineId, EngineEvent) {
    let event = timeout(T_EVENT, rx.recv())
        .await
        .expect("timed out waiting for engine event")
        .expect("event bus closed");
    match event {
        Event::Engine { engine, event } => (engine, event),
        other => panic!("unexpected event {other:?}"),
    }
}

/// Drain engine notifications, feeding each to `coordinator`, until one
/// matches `pred`.
pub async fn wait_for(
    coordinator: &mut SearchCoordinator,
    rx: &mut EventReceiver,
    pred: impl Fn(&EngineEvent) -> bool,
) -> EngineEvent {
    loop {
        let (_, event) = next_engine_event(rx).await;
        coordinator.observe(&event);
        if pred(&event) {
            return event;
        }
    }
}

/// Launch an engine and wait until it has loaded.
pub async fn launch(spec: EngineSpec) -> (SearchCoordinator, EventReceiver, EngineHandle) {
    let (tx, mut rx) = events::channel();
    let mut coordinator =
        SearchCoordinator::launch(EngineId(1), spec, fast_timeouts(), small_options(), tx);
    let event = wait_for(&mut coordinator, &mut rx, |e| {
        matches!(e, EngineEvent::Loaded(_) | EngineEvent::LoadFailed { .. })
    })
    .await;
    let EngineEvent::Loaded(handle) = event else {
        panic!("engine failed to load: {event:?}");
    };
    (coordinator, rx, handle)
}

/// Next event the session presents.
pub async fn next_session_event(session: &mut Session) -> Event {
    timeout(T_EVENT, session.next_event())
        .await
        .expect("timed out waiting for session event")
        .expect("event bus closed")
}

/// Pull session events until one matches `pred`.
pub async fn session_wait_for(session: &mut Session, pred: impl Fn(&Event) -> bool) -> Event {
    loop {
        let event = next_session_event(session).await;
        if pred(&event) {
            return event;
        }
    }
}
