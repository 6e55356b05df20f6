#![allow(dead_code)]

use std::sync::Arc;

use chess_core::{Color, GameState, Move, ShakmatyRules};

/// Fresh game from the standard position.
pub fn new_game(engine_color: Color) -> GameState {
    GameState::new(Arc::new(ShakmatyRules), engine_color).unwrap()
}

pub fn mv(s: &str) -> Move {
    s.parse().unwrap()
}

/// Push every move in a space-separated UCI list.
pub fn play(game: &mut GameState, moves: &str) {
    for m in moves.split_whitespace() {
        game.push(mv(m)).unwrap();
    }
}
