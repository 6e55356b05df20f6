//! Session end to end: game, clocks and engine together

mod common;

use std::time::Duration;

use chess_core::{Color, GameError, GameResult, InvalidMoveError, Move, TimeControl};
use engine_worker::{EngineEvent, EngineSpec, Event, Score, Session, SessionError};
use tokio::time::{sleep, timeout, Instant};

use common::{config, fake_engine, next_session_event, session_wait_for, thinking_engine, T_EVENT};

fn mv(s: &str) -> Move {
    s.parse().unwrap()
}

fn minutes(n: u64) -> TimeControl {
    TimeControl::new(Duration::from_secs(n * 60), Duration::ZERO)
}

async fn wait_loaded(session: &mut Session) {
    session_wait_for(session, |e| {
        matches!(
            e,
            Event::Engine {
                event: EngineEvent::Loaded(_),
                ..
            }
        )
    })
    .await;
}

#[tokio::test]
async fn test_engine_move_stops_its_clock_and_adds_increment() {
    let tc = TimeControl::new(Duration::from_secs(60), Duration::from_secs(2));
    let mut session = Session::new(config(Color::White, tc)).unwrap();
    assert_eq!(session.clocks().running(), Some(Color::White));

    session.load_engine(fake_engine("normal"));
    let event = session_wait_for(&mut session, |e| matches!(e, Event::MovePlayed { .. })).await;

    let Event::MovePlayed { color, .. } = event else {
        unreachable!()
    };
    assert_eq!(color, Color::White);
    assert_eq!(session.game().history().len(), 1);
    assert_eq!(session.game().turn(), Color::Black);
    assert!(session.clocks().remaining(Color::White) > Duration::from_secs(60));
    assert!(!session.clocks().is_running(Color::White));
    assert_eq!(session.clocks().running(), Some(Color::Black));
    assert!(!session.is_thinking());

    session.shutdown().await;
}

#[tokio::test]
async fn test_engine_replies_to_human_move() {
    let mut session = Session::new(config(Color::Black, minutes(5))).unwrap();
    session.load_engine(fake_engine("normal"));
    wait_loaded(&mut session).await;

    session.submit_move(mv("e2e4")).unwrap();
    assert!(session.is_thinking());
    assert!(matches!(
        session.submit_move(mv("d2d4")),
        Err(SessionError::EngineThinking)
    ));

    session_wait_for(&mut session, |e| {
        matches!(
            e,
            Event::MovePlayed {
                color: Color::Black,
                ..
            }
        )
    })
    .await;

    assert_eq!(session.game().history().len(), 2);
    assert_eq!(session.clocks().running(), Some(Color::White));
    assert_eq!(session.status().engine.as_deref(), Some("FakeUci 1.0"));
    session.shutdown().await;
}

#[tokio::test]
async fn test_flag_fall_ends_game() {
    let tc = TimeControl::new(Duration::from_millis(200), Duration::ZERO);
    let mut session = Session::new(config(Color::Black, tc)).unwrap();

    let expired = session_wait_for(&mut session, |e| matches!(e, Event::TimeExpired { .. })).await;
    assert!(matches!(
        expired,
        Event::TimeExpired {
            color: Color::White
        }
    ));

    let over = session_wait_for(&mut session, |e| matches!(e, Event::GameOver { .. })).await;
    let Event::GameOver { result, score } = over else {
        unreachable!()
    };
    assert_eq!(
        result,
        GameResult::TimeLoss {
            loser: Color::White
        }
    );
    assert_eq!(score, "0-1");
    assert_eq!(session.clocks().remaining(Color::White), Duration::ZERO);
    assert_eq!(session.clocks().running(), None);

    assert!(matches!(
        session.submit_move(mv("e2e4")),
        Err(SessionError::InvalidMove(InvalidMoveError::GameOver(_)))
    ));
    assert!(session.game().history().is_empty());
}

#[tokio::test]
async fn test_failed_load_keeps_current_engine() {
    let mut session = Session::new(config(Color::Black, minutes(5))).unwrap();
    session.load_engine(fake_engine("normal"));
    wait_loaded(&mut session).await;
    let loaded = session.engine().map(|e| e.id());

    session.load_engine(EngineSpec::new("/nonexistent/engine"));
    assert!(session.is_loading_engine());
    session_wait_for(&mut session, |e| {
        matches!(
            e,
            Event::Engine {
                event: EngineEvent::LoadFailed { .. },
                ..
            }
        )
    })
    .await;

    assert!(!session.is_loading_engine());
    assert_eq!(session.engine().map(|e| e.id()), loaded);
    assert!(session.engine().is_some_and(|e| e.is_ready()));
    session.shutdown().await;
}

#[tokio::test]
async fn test_analysis_pauses_clocks() {
    let mut session = Session::new(config(Color::Black, minutes(5))).unwrap();
    session.load_engine(fake_engine("normal"));
    wait_loaded(&mut session).await;

    session.start_analysis().unwrap();
    assert!(session.is_analysing());
    assert_eq!(session.clocks().running(), None);

    session_wait_for(&mut session, |e| {
        matches!(
            e,
            Event::Engine {
                event: EngineEvent::Info { .. },
                ..
            }
        )
    })
    .await;

    assert!(matches!(session.evaluation(), Some(Score::Cp(cp)) if cp > 0));
    assert_eq!(session.status().evaluation, session.evaluation());

    session.stop_analysis();
    assert!(!session.is_analysing());
    assert_eq!(session.clocks().running(), Some(Color::White));
    session.shutdown().await;
}

#[tokio::test]
async fn test_browsing_history_pauses_clock_and_blocks_moves() {
    let mut session = Session::new(config(Color::Black, minutes(5))).unwrap();
    session.submit_move(mv("e2e4")).unwrap();
    session.submit_move(mv("e7e5")).unwrap();
    assert_eq!(session.clocks().running(), Some(Color::White));

    session.view(0).unwrap();
    assert!(session.game().is_history());
    assert_eq!(session.clocks().running(), None);
    assert!(matches!(
        session.submit_move(mv("g1f3")),
        Err(SessionError::InvalidMove(InvalidMoveError::HistoryView))
    ));
    assert!(matches!(
        session.view(5),
        Err(SessionError::Game(GameError::IndexOutOfRange { .. }))
    ));

    session.view_root();
    assert_eq!(session.game().history_index(), None);

    session.return_to_live();
    assert_eq!(session.game().history().len(), 2);
    assert_eq!(session.clocks().running(), Some(Color::White));
    session.submit_move(mv("g1f3")).unwrap();
}

#[tokio::test]
async fn test_settings_wait_for_game_end() {
    let mut session = Session::new(config(Color::Black, minutes(5))).unwrap();
    session.submit_move(mv("e2e4")).unwrap();

    assert!(matches!(
        session.apply_settings(minutes(3), Color::White),
        Err(SessionError::Game(GameError::GameInProgress))
    ));

    session.resign().unwrap();
    assert_eq!(
        session.game().result(),
        GameResult::Resignation {
            loser: Color::White
        }
    );

    session.apply_settings(minutes(3), Color::Black).unwrap();
    assert_eq!(session.clocks().remaining(Color::White), Duration::from_secs(180));

    session.new_game().unwrap();
    assert!(session.game().history().is_empty());
    assert_eq!(session.clocks().running(), Some(Color::White));
}

#[tokio::test]
async fn test_new_game_from_fen() {
    let mut session = Session::new(config(Color::White, minutes(5))).unwrap();
    assert!(session.new_game_from_fen("not a fen").is_err());

    session
        .new_game_from_fen("4k3/8/8/8/8/8/4P3/4K3 b - - 0 1")
        .unwrap();
    assert_eq!(session.game().turn(), Color::Black);
    assert_eq!(session.clocks().running(), Some(Color::Black));
}

fn is_engine_move(event: &Event, color: Color) -> bool {
    matches!(event, Event::MovePlayed { color: c, .. } if *c == color)
}

#[tokio::test]
async fn test_move_after_flag_fell_is_refused() {
    let tc = TimeControl::new(Duration::from_millis(100), Duration::from_secs(2));
    let mut session = Session::new(config(Color::Black, tc)).unwrap();

    // No tick is processed while the flag falls
    sleep(Duration::from_millis(150)).await;
    assert!(matches!(
        session.submit_move(mv("e2e4")),
        Err(SessionError::GameOver)
    ));
    assert!(session.game().history().is_empty());
    assert_eq!(
        session.game().result(),
        GameResult::TimeLoss {
            loser: Color::White
        }
    );
    assert_eq!(session.clocks().remaining(Color::White), Duration::ZERO);

    assert!(matches!(
        next_session_event(&mut session).await,
        Event::TimeExpired {
            color: Color::White
        }
    ));
    assert!(matches!(
        next_session_event(&mut session).await,
        Event::GameOver { .. }
    ));
}

#[tokio::test]
async fn test_flag_fall_during_engine_search_drops_its_move() {
    let tc = TimeControl::new(Duration::from_millis(300), Duration::ZERO);
    let mut session = Session::new(config(Color::White, tc)).unwrap();
    session.load_engine(thinking_engine(5_000));

    let expired = session_wait_for(&mut session, |e| matches!(e, Event::TimeExpired { .. })).await;
    assert!(matches!(
        expired,
        Event::TimeExpired {
            color: Color::White
        }
    ));
    let over = session_wait_for(&mut session, |e| matches!(e, Event::GameOver { .. })).await;
    assert!(matches!(
        over,
        Event::GameOver {
            result: GameResult::TimeLoss {
                loser: Color::White
            },
            ..
        }
    ));

    // The stopped search answers, but its move is never played
    let late = timeout(
        Duration::from_millis(500),
        session_wait_for(&mut session, |e| is_engine_move(e, Color::White)),
    )
    .await;
    assert!(late.is_err(), "move played after the flag fell: {late:?}");
    assert!(session.game().history().is_empty());
    assert!(!session.is_thinking());
    session.shutdown().await;
}

#[tokio::test]
async fn test_time_expired_reported_once_after_resign_attempt() {
    let tc = TimeControl::new(Duration::from_millis(100), Duration::ZERO);
    let mut session = Session::new(config(Color::Black, tc)).unwrap();
    sleep(Duration::from_millis(150)).await;

    assert!(matches!(session.resign(), Err(SessionError::GameOver)));
    assert_eq!(
        session.game().result(),
        GameResult::TimeLoss {
            loser: Color::White
        }
    );

    let mut expired = 0;
    while let Ok(Some(event)) = timeout(Duration::from_millis(300), session.next_event()).await {
        if matches!(event, Event::TimeExpired { .. }) {
            expired += 1;
        }
    }
    assert_eq!(expired, 1);
}

#[tokio::test]
async fn test_finished_fen_does_not_invoke_engine() {
    let mut session = Session::new(config(Color::Black, minutes(5))).unwrap();
    session.load_engine(fake_engine("normal"));
    wait_loaded(&mut session).await;

    session
        .new_game_from_fen("k7/8/1Q6/8/8/8/8/4K3 b - - 0 1")
        .unwrap();
    assert_eq!(session.game().result(), GameResult::Stalemate);
    assert!(!session.is_thinking());
    assert_eq!(session.clocks().running(), None);
    assert!(matches!(
        next_session_event(&mut session).await,
        Event::GameOver {
            result: GameResult::Stalemate,
            score: "1/2-1/2"
        }
    ));
    assert!(session.engine().is_some_and(|e| e.is_ready()));

    session
        .new_game_from_fen(chess_core::STANDARD_START_FEN)
        .unwrap();
    session.submit_move(mv("e2e4")).unwrap();
    session_wait_for(&mut session, |e| is_engine_move(e, Color::Black)).await;
    assert_eq!(session.game().history().len(), 2);
    session.shutdown().await;
}

#[tokio::test]
async fn test_move_now_cuts_engine_search_short() {
    let mut session = Session::new(config(Color::Black, minutes(5))).unwrap();
    session.load_engine(thinking_engine(10_000));
    wait_loaded(&mut session).await;

    session.submit_move(mv("e2e4")).unwrap();
    assert!(session.is_thinking());
    session.play_move_now().unwrap();

    timeout(
        Duration::from_secs(2),
        session_wait_for(&mut session, |e| is_engine_move(e, Color::Black)),
    )
    .await
    .expect("engine did not move when told to");
    assert!(!session.is_thinking());
    assert_eq!(session.game().history().len(), 2);
    session.shutdown().await;
}

#[tokio::test]
async fn test_move_now_while_analysing_waits_for_stop() {
    let mut session = Session::new(config(Color::Black, minutes(5))).unwrap();
    session.load_engine(fake_engine("normal"));
    wait_loaded(&mut session).await;

    session.start_analysis().unwrap();
    session_wait_for(&mut session, |e| {
        matches!(
            e,
            Event::Engine {
                event: EngineEvent::Info { .. },
                ..
            }
        )
    })
    .await;

    session.play_move_now().unwrap();
    assert!(!session.is_analysing());
    assert!(!session.is_thinking());

    let mut stopped = false;
    let mut white_moves = 0;
    loop {
        let event = next_session_event(&mut session).await;
        match event {
            Event::Engine {
                event: EngineEvent::AnalysisStopped { .. },
                ..
            } => stopped = true,
            Event::MovePlayed {
                color: Color::White,
                ..
            } => {
                assert!(stopped, "move played before the analysis stopped");
                white_moves += 1;
            }
            Event::MovePlayed {
                color: Color::Black,
                ..
            } => break,
            _ => {}
        }
    }
    assert_eq!(white_moves, 1);
    assert_eq!(session.game().history().len(), 2);
    session.shutdown().await;
}

#[tokio::test]
async fn test_move_now_from_history_returns_to_live() {
    let mut session = Session::new(config(Color::Black, minutes(5))).unwrap();
    session.load_engine(fake_engine("normal"));
    wait_loaded(&mut session).await;

    session.submit_move(mv("e2e4")).unwrap();
    session_wait_for(&mut session, |e| is_engine_move(e, Color::Black)).await;

    session.view(0).unwrap();
    assert!(session.game().is_history());
    session.play_move_now().unwrap();
    assert!(!session.game().is_history());
    assert_eq!(session.game().history_index(), Some(1));
    assert!(session.is_thinking());
    assert_eq!(session.clocks().running(), Some(Color::White));

    session_wait_for(&mut session, |e| is_engine_move(e, Color::White)).await;
    assert_eq!(session.game().history().len(), 3);
    session.shutdown().await;
}

#[tokio::test]
async fn test_new_game_during_search_tells_engine_later() {
    let mut session = Session::new(config(Color::Black, minutes(5))).unwrap();
    session.load_engine(thinking_engine(10_000));
    wait_loaded(&mut session).await;

    session.submit_move(mv("e2e4")).unwrap();
    assert!(session.is_thinking());
    session.new_game().unwrap();
    assert!(!session.is_thinking());
    assert!(session.is_new_game_pending());

    // The cancelled search's stale answer frees the engine
    let deadline = Instant::now() + T_EVENT;
    while session.is_new_game_pending() {
        assert!(Instant::now() < deadline, "ucinewgame never sent");
        let _ = timeout(Duration::from_millis(50), session.next_event()).await;
    }
    assert!(session.engine().is_some_and(|e| e.is_ready() && !e.is_busy()));
    assert!(session.game().history().is_empty());
    session.shutdown().await;
}
