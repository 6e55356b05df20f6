//! Human-versus-engine chess on the command line.
//!
//! Reads one command per line from stdin and writes every event as a JSON
//! line to stdout. Logs go to stderr.

use std::str::FromStr;
use std::time::Duration;

use chess_core::{Color, Move, TimeControl};
use engine_worker::{Config, EngineSpec, Session, SessionError, SessionStatus};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
enum CliCommand {
    Move(Move),
    PlayNow,
    Analyze,
    Stop,
    View(usize),
    Root,
    Live,
    New,
    Fen(String),
    Load(EngineSpec),
    Settings(TimeControl, Color),
    Resign,
    Status,
    Quit,
}

impl FromStr for CliCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_whitespace();
        let command = tokens.next().ok_or("empty command")?;
        let rest: Vec<&str> = tokens.collect();

        let parsed = match command {
            "move" => {
                let mv = rest.first().ok_or("usage: move <uci>")?;
                CliCommand::Move(mv.parse().map_err(|e| format!("{e}"))?)
            }
            "go" => CliCommand::PlayNow,
            "analyze" => CliCommand::Analyze,
            "stop" => CliCommand::Stop,
            "view" => {
                let index = rest
                    .first()
                    .and_then(|n| n.parse().ok())
                    .ok_or("usage: view <index>")?;
                CliCommand::View(index)
            }
            "root" => CliCommand::Root,
            "live" => CliCommand::Live,
            "new" => CliCommand::New,
            "fen" if !rest.is_empty() => CliCommand::Fen(rest.join(" ")),
            "fen" => return Err("usage: fen <FEN>".into()),
            "load" => {
                let (path, args) = rest.split_first().ok_or("usage: load <path> [args...]")?;
                CliCommand::Load(EngineSpec::new(*path).with_args(args.iter().copied()))
            }
            "settings" => parse_settings(&rest)?,
            "resign" => CliCommand::Resign,
            "status" => CliCommand::Status,
            "quit" | "exit" => CliCommand::Quit,
            other => match other.parse::<Move>() {
                Ok(mv) if rest.is_empty() => CliCommand::Move(mv),
                _ => return Err(format!("unknown command: {other}")),
            },
        };
        Ok(parsed)
    }
}

/// `settings <minutes> <increment secs> <engine color>`
fn parse_settings(args: &[&str]) -> Result<CliCommand, String> {
    const USAGE: &str = "usage: settings <minutes> <increment secs> <white|black>";
    let [minutes, increment, color] = args else {
        return Err(USAGE.into());
    };
    let minutes: f64 = minutes.parse().map_err(|_| USAGE)?;
    let increment: f64 = increment.parse().map_err(|_| USAGE)?;
    if !(minutes.is_finite() && increment.is_finite() && minutes > 0.0 && increment >= 0.0) {
        return Err(USAGE.into());
    }
    let color = Color::from_str(color).map_err(|_| USAGE)?;
    Ok(CliCommand::Settings(
        TimeControl::new(
            Duration::from_secs_f64(minutes * 60.0),
            Duration::from_secs_f64(increment),
        ),
        color,
    ))
}

/// Non-event output.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Reply {
    Status(SessionStatus),
    Error { message: String },
}

fn emit<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => error!(error = %e, "Failed to serialize output"),
    }
}

fn report(result: Result<(), SessionError>) {
    if let Err(e) = result {
        emit(&Reply::Error {
            message: e.to_string(),
        });
    }
}

/// Returns false when the session should end.
fn dispatch(session: &mut Session, command: CliCommand) -> bool {
    match command {
        CliCommand::Move(mv) => report(session.submit_move(mv)),
        CliCommand::PlayNow => report(session.play_move_now()),
        CliCommand::Analyze => report(session.start_analysis().map(|_| ())),
        CliCommand::Stop => session.stop_analysis(),
        CliCommand::View(index) => report(session.view(index)),
        CliCommand::Root => session.view_root(),
        CliCommand::Live => session.return_to_live(),
        CliCommand::New => report(session.new_game()),
        CliCommand::Fen(fen) => report(session.new_game_from_fen(&fen)),
        CliCommand::Load(spec) => {
            let id = session.load_engine(spec);
            info!(engine = %id, "Loading engine");
        }
        CliCommand::Settings(time_control, color) => {
            report(session.apply_settings(time_control, color))
        }
        CliCommand::Resign => report(session.resign()),
        CliCommand::Status => emit(&Reply::Status(session.status())),
        CliCommand::Quit => return false,
    }
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs on stderr; stdout carries only JSON lines
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    let engine = config.engine.clone();
    let mut session = Session::new(config)?;
    session.load_engine(engine);

    let (tx, mut commands) = mpsc::channel::<String>(32);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });

    info!("Ready for commands");

    loop {
        tokio::select! {
            line = commands.recv() => {
                let Some(line) = line else {
                    info!("Input closed");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match line.parse::<CliCommand>() {
                    Ok(command) => {
                        if !dispatch(&mut session, command) {
                            break;
                        }
                    }
                    Err(message) => emit(&Reply::Error { message }),
                }
            }
            event = session.next_event() => match event {
                Some(event) => emit(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
