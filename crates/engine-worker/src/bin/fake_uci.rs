//! Scripted UCI engine for tests.
//!
//! Plays the first legal move it finds. `--mode` selects misbehavior:
//! `normal`, `stubborn` (ignores `stop`), `mute` (never sends `uciok`),
//! `crash` (exits on `go`), `binary` (prints non-UTF-8 bytes). `--think <ms>`
//! delays the answer to a timed search until the time passes or `stop`
//! arrives.

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Position};

const INFO_INTERVAL: Duration = Duration::from_millis(20);
const MAX_DEPTH: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Stubborn,
    Mute,
    Crash,
    Binary,
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_mode(args: &[String]) -> Mode {
    match arg_value(args, "--mode").as_deref() {
        Some("stubborn") => Mode::Stubborn,
        Some("mute") => Mode::Mute,
        Some("crash") => Mode::Crash,
        Some("binary") => Mode::Binary,
        _ => Mode::Normal,
    }
}

struct Engine {
    mode: Mode,
    think: Duration,
    position: Chess,
    /// Depth reached by the running infinite search
    analysing: Option<u32>,
    /// When the running timed search answers
    answer_at: Option<Instant>,
}

impl Engine {
    fn best_move(&self) -> Option<String> {
        self.position
            .legal_moves()
            .first()
            .map(|m| m.to_uci(CastlingMode::Standard).to_string())
    }

    fn info(&self, depth: u32) {
        match self.best_move() {
            Some(best) => println!(
                "info depth {depth} seldepth {depth} score cp {} nodes {} pv {best}",
                10 + depth,
                depth * 1000
            ),
            None => println!("info depth 0 score mate 0"),
        }
    }

    fn garbage(&self) {
        if self.mode == Mode::Binary {
            let mut out = io::stdout().lock();
            let _ = out.write_all(b"info string \xff\xfe not utf-8\n");
            let _ = out.flush();
        }
    }

    fn bestmove(&self) {
        match self.best_move() {
            Some(best) => println!("bestmove {best}"),
            None => println!("bestmove (none)"),
        }
    }

    fn set_position(&mut self, args: &[&str]) {
        let (fen, moves) = match args.iter().position(|t| *t == "moves") {
            Some(i) => (&args[..i], &args[i + 1..]),
            None => (args, &[][..]),
        };
        let fen = match fen.first() {
            Some(&"startpos") => None,
            Some(&"fen") => Some(fen[1..].join(" ")),
            _ => return,
        };

        let mut position = match fen {
            None => Chess::default(),
            Some(fen) => match fen
                .parse::<Fen>()
                .ok()
                .and_then(|f| f.into_position::<Chess>(CastlingMode::Standard).ok())
            {
                Some(position) => position,
                None => {
                    println!("info string bad fen {fen}");
                    return;
                }
            },
        };
        for token in moves {
            let Some(legal) = token
                .parse::<UciMove>()
                .ok()
                .and_then(|m| m.to_move(&position).ok())
            else {
                println!("info string illegal move {token}");
                return;
            };
            position.play_unchecked(legal);
        }
        self.position = position;
    }

    /// Returns false on `quit`.
    fn handle(&mut self, line: &str) -> bool {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((command, args)) = tokens.split_first() else {
            return true;
        };
        match *command {
            "uci" => {
                println!("id name FakeUci 1.0");
                println!("id author test");
                if self.mode == Mode::Mute {
                    return true;
                }
                println!("option name Hash type spin default 16 min 1 max 33554432");
                println!("option name Threads type spin default 1 min 1 max 1024");
                println!("option name Clear Hash type button");
                println!("this line is not uci");
                self.garbage();
                println!("uciok");
            }
            "isready" => println!("readyok"),
            "ucinewgame" => self.position = Chess::default(),
            "position" => self.set_position(args),
            "go" => {
                if self.mode == Mode::Crash {
                    std::process::exit(3);
                }
                self.garbage();
                if args.first() == Some(&"infinite") {
                    self.analysing = Some(1);
                    self.info(1);
                } else if self.think.is_zero() {
                    self.info(1);
                    self.bestmove();
                } else {
                    self.info(1);
                    self.answer_at = Some(Instant::now() + self.think);
                }
            }
            "stop" => {
                if self.mode == Mode::Stubborn {
                    return true;
                }
                if self.analysing.take().is_some() || self.answer_at.take().is_some() {
                    self.bestmove();
                }
            }
            "quit" => return false,
            _ => {}
        }
        true
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let think = arg_value(&args, "--think")
        .and_then(|ms| ms.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::ZERO);
    let mut engine = Engine {
        mode: parse_mode(&args),
        think,
        position: Chess::default(),
        analysing: None,
        answer_at: None,
    };

    let (tx, rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        let line = match (engine.analysing, engine.answer_at) {
            (Some(depth), _) => match rx.recv_timeout(INFO_INTERVAL) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => {
                    let depth = (depth + 1).min(MAX_DEPTH);
                    engine.analysing = Some(depth);
                    engine.info(depth);
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            },
            (None, Some(at)) => {
                match rx.recv_timeout(at.saturating_duration_since(Instant::now())) {
                    Ok(line) => line,
                    Err(RecvTimeoutError::Timeout) => {
                        engine.answer_at = None;
                        engine.bestmove();
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            (None, None) => match rx.recv() {
                Ok(line) => line,
                Err(_) => break,
            },
        };
        if !engine.handle(&line) {
            break;
        }
    }
}
