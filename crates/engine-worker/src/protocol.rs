//! UCI line framing: commands we send and the engine messages we understand.
//! Anything else the engine prints is ignored.

use std::fmt;

use chess_core::{Color, Move, Position};
use serde::Serialize;

/// Evaluation from the side to move's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Score {
    Cp(i32),
    /// Mate in N moves (negative = side to move gets mated)
    Mate(i32),
}

impl Score {
    /// Re-express a side-to-move score from White's point of view.
    pub fn white_pov(self, side_to_move: Color) -> Self {
        if side_to_move.is_white() {
            return self;
        }
        match self {
            Score::Cp(cp) => Score::Cp(-cp),
            Score::Mate(n) => Score::Mate(-n),
        }
    }
}

/// One parsed `info` line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub depth: Option<u32>,
    pub score: Option<Score>,
    /// Principal variation
    pub pv: Vec<Move>,
    pub best_move: Option<Move>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMessage {
    Id { name: String },
    Option { name: String },
    UciOk,
    ReadyOk,
    Info(AnalysisResult),
    /// `best` is `None` for `bestmove (none)`
    BestMove { best: Option<Move>, ponder: Option<Move> },
}

/// Parse one line of engine output. Unknown or malformed lines yield `None`.
pub fn parse_line(line: &str) -> Option<EngineMessage> {
    let mut tokens = line.split_whitespace();
    match tokens.next()? {
        "uciok" => Some(EngineMessage::UciOk),
        "readyok" => Some(EngineMessage::ReadyOk),
        "id" => match tokens.next()? {
            "name" => Some(EngineMessage::Id {
                name: tokens.collect::<Vec<_>>().join(" "),
            }),
            _ => None,
        },
        "option" => parse_option(tokens),
        "info" => parse_info(tokens).map(EngineMessage::Info),
        "bestmove" => {
            let best = tokens.next()?.parse().ok();
            let ponder = match tokens.next() {
                Some("ponder") => tokens.next().and_then(|m| m.parse().ok()),
                _ => None,
            };
            Some(EngineMessage::BestMove { best, ponder })
        }
        _ => None,
    }
}

/// `option name <Name with spaces> type ...`
fn parse_option<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Option<EngineMessage> {
    if tokens.next()? != "name" {
        return None;
    }
    let name = tokens
        .take_while(|t| *t != "type")
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() {
        return None;
    }
    Some(EngineMessage::Option { name })
}

/// Lines without a score or a PV (currmove, string, hashfull...) are dropped.
fn parse_info<'a>(tokens: impl Iterator<Item = &'a str>) -> Option<AnalysisResult> {
    let mut result = AnalysisResult::default();
    let mut tokens = tokens.peekable();

    while let Some(token) = tokens.next() {
        match token {
            "depth" => result.depth = tokens.next().and_then(|d| d.parse().ok()),
            "score" => {
                let kind = tokens.next();
                let value = tokens.next().and_then(|v| v.parse().ok());
                result.score = match (kind, value) {
                    (Some("cp"), Some(cp)) => Some(Score::Cp(cp)),
                    (Some("mate"), Some(n)) => Some(Score::Mate(n)),
                    _ => result.score,
                };
            }
            "pv" => {
                // PV runs until the first token that is not a move
                while let Some(mv) = tokens.peek().and_then(|t| t.parse::<Move>().ok()) {
                    result.pv.push(mv);
                    tokens.next();
                }
            }
            "string" => break,
            _ => {}
        }
    }

    if result.score.is_none() && result.pv.is_empty() {
        return None;
    }
    result.best_move = result.pv.first().copied();
    Some(result)
}

/// Search limits for `go`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoMode {
    /// Clock-driven search; all values in milliseconds.
    Timed {
        wtime: u64,
        btime: u64,
        winc: u64,
        binc: u64,
    },
    Infinite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Uci,
    IsReady,
    UciNewGame,
    SetOption { name: String, value: String },
    Position { fen: String, moves: Vec<Move> },
    Go(GoMode),
    Stop,
    Quit,
}

impl Command {
    pub fn position(position: &Position) -> Self {
        Command::Position {
            fen: position.root_fen().to_string(),
            moves: position.moves().to_vec(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Uci => f.write_str("uci"),
            Command::IsReady => f.write_str("isready"),
            Command::UciNewGame => f.write_str("ucinewgame"),
            Command::SetOption { name, value } => {
                write!(f, "setoption name {name} value {value}")
            }
            Command::Position { fen, moves } => {
                write!(f, "position fen {fen}")?;
                if !moves.is_empty() {
                    f.write_str(" moves")?;
                    for mv in moves {
                        write!(f, " {mv}")?;
                    }
                }
                Ok(())
            }
            Command::Go(GoMode::Timed {
                wtime,
                btime,
                winc,
                binc,
            }) => write!(f, "go wtime {wtime} btime {btime} winc {winc} binc {binc}"),
            Command::Go(GoMode::Infinite) => f.write_str("go infinite"),
            Command::Stop => f.write_str("stop"),
            Command::Quit => f.write_str("quit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mv(s: &str) -> Move {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_cp() {
        let line = "info depth 20 seldepth 25 multipv 1 score cp 35 nodes 100000 pv e2e4";
        let Some(EngineMessage::Info(info)) = parse_line(line) else {
            panic!("expected info");
        };
        assert_eq!(info.depth, Some(20));
        assert_eq!(info.score, Some(Score::Cp(35)));
        assert_eq!(info.best_move, Some(mv("e2e4")));
    }

    #[test]
    fn test_parse_mate() {
        let line = "info depth 20 score mate -3 nodes 100000 pv e2e4";
        let Some(EngineMessage::Info(info)) = parse_line(line) else {
            panic!("expected info");
        };
        assert_eq!(info.score, Some(Score::Mate(-3)));
    }

    #[test]
    fn test_parse_pv() {
        let line = "info depth 20 score cp 35 lowerbound pv e2e4 e7e5 g1f3";
        let Some(EngineMessage::Info(info)) = parse_line(line) else {
            panic!("expected info");
        };
        assert_eq!(info.pv, vec![mv("e2e4"), mv("e7e5"), mv("g1f3")]);
    }

    #[test]
    fn test_pv_stops_at_next_keyword() {
        let line = "info score cp 10 pv d2d4 d7d5 bmc 0.5";
        let Some(EngineMessage::Info(info)) = parse_line(line) else {
            panic!("expected info");
        };
        assert_eq!(info.pv.len(), 2);
    }

    #[test]
    fn test_info_without_score_or_pv_is_ignored() {
        assert_eq!(parse_line("info depth 5 currmove e2e4 currmovenumber 1"), None);
        assert_eq!(parse_line("info string NNUE evaluation enabled"), None);
    }

    #[test]
    fn test_parse_bestmove() {
        assert_eq!(
            parse_line("bestmove e2e4 ponder e7e5"),
            Some(EngineMessage::BestMove {
                best: Some(mv("e2e4")),
                ponder: Some(mv("e7e5")),
            })
        );
        assert_eq!(
            parse_line("bestmove (none)"),
            Some(EngineMessage::BestMove {
                best: None,
                ponder: None
            })
        );
        assert_eq!(parse_line("bestmove"), None);
    }

    #[test]
    fn test_parse_handshake_lines() {
        assert_eq!(
            parse_line("id name Stockfish 17.1"),
            Some(EngineMessage::Id {
                name: "Stockfish 17.1".into()
            })
        );
        assert_eq!(parse_line("id author the authors"), None);
        assert_eq!(
            parse_line("option name Clear Hash type button"),
            Some(EngineMessage::Option {
                name: "Clear Hash".into()
            })
        );
        assert_eq!(parse_line("uciok"), Some(EngineMessage::UciOk));
        assert_eq!(parse_line("  readyok  "), Some(EngineMessage::ReadyOk));
    }

    #[test]
    fn test_garbage_is_ignored() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("copyprotection ok"), None);
        assert_eq!(parse_line("info score cp notanumber"), None);
    }

    #[test]
    fn test_format_commands() {
        assert_eq!(
            Command::SetOption {
                name: "Hash".into(),
                value: "5734".into()
            }
            .to_string(),
            "setoption name Hash value 5734"
        );
        assert_eq!(
            Command::Go(GoMode::Timed {
                wtime: 60_000,
                btime: 59_500,
                winc: 1_000,
                binc: 1_000
            })
            .to_string(),
            "go wtime 60000 btime 59500 winc 1000 binc 1000"
        );
        assert_eq!(Command::Go(GoMode::Infinite).to_string(), "go infinite");
    }

    #[test]
    fn test_format_position() {
        let fen = chess_core::STANDARD_START_FEN.to_string();
        let start = Command::Position {
            fen: fen.clone(),
            moves: vec![],
        };
        assert_eq!(start.to_string(), format!("position fen {fen}"));

        let played = Command::Position {
            fen: fen.clone(),
            moves: vec![mv("e2e4"), mv("e7e5")],
        };
        assert_eq!(played.to_string(), format!("position fen {fen} moves e2e4 e7e5"));
    }

    #[test]
    fn test_white_pov() {
        assert_eq!(Score::Cp(30).white_pov(Color::Black), Score::Cp(-30));
        assert_eq!(Score::Mate(2).white_pov(Color::White), Score::Mate(2));
    }
}
