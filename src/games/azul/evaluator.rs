//! Heuristic evaluation for Azul positions.
//! Returns a value in [0, 1] representing how good the position is for the player.

use super::scoring::{end_game_bonus, floor_penalty, score_cell};
use super::types::{wall_column, GameState, PlayerBoard, NUM_PLAYERS, WALL_SIZE};

/// Tunable parameters for the Azul heuristic evaluator.
pub struct EvalWeights {
    pub score_weight: f64,
    /// Weight on points a full staircase row would bank at the next wall tiling.
    pub pending_weight: f64,
    /// Weight on partial rows, scaled by how full they are.
    pub progress_weight: f64,
    pub floor_weight: f64,
    pub bonus_weight: f64,
    pub scale: f64,
}

impl Default for EvalWeights {
    fn default() -> Self {
        Self {
            score_weight: 1.0,
            pending_weight: 0.9,
            progress_weight: 0.4,
            floor_weight: 1.0,
            bonus_weight: 0.5,
            scale: 15.0,
        }
    }
}

pub static CAUTIOUS_WEIGHTS: EvalWeights = EvalWeights {
    score_weight: 1.0,
    pending_weight: 0.8,
    progress_weight: 0.3,
    floor_weight: 1.6,
    bonus_weight: 0.3,
    scale: 15.0,
};

/// Create an evaluation function parameterised by `weights`.
pub fn make_azul_eval(
    weights: &'static EvalWeights,
) -> Box<dyn Fn(&GameState, usize) -> f64 + Send + Sync> {
    Box::new(move |state, player| evaluate(state, player, weights))
}

/// Evaluate a position using default weights.
pub fn azul_eval(state: &GameState, player: usize) -> f64 {
    evaluate(state, player, &EvalWeights::default())
}

fn evaluate(state: &GameState, player: usize, w: &EvalWeights) -> f64 {
    if player >= NUM_PLAYERS {
        return 0.5;
    }
    let mine = board_value(&state.players[player], w);
    let theirs = state
        .players
        .iter()
        .enumerate()
        .filter(|&(p, _)| p != player)
        .map(|(_, b)| board_value(b, w))
        .fold(f64::MIN, f64::max);
    let diff = mine - theirs;
    1.0 / (1.0 + (-diff / w.scale).exp())
}

fn board_value(board: &PlayerBoard, w: &EvalWeights) -> f64 {
    let mut wall = board.wall;
    let mut pending = 0.0;
    let mut progress = 0.0;
    for row in 0..WALL_SIZE {
        let Some(color) = board.staircase_row_color(row) else {
            continue;
        };
        let col = wall_column(row, color);
        if board.staircase_row_full(row) {
            // Banked in row order, the same way wall tiling scores them.
            wall[row][col] = board.staircase[row].iter().flatten().next().copied();
            pending += score_cell(&wall, row, col) as f64;
        } else {
            let filled = board.staircase[row].iter().flatten().count() as f64;
            progress += filled / (row + 1) as f64;
        }
    }

    board.score as f64 * w.score_weight
        + pending * w.pending_weight
        + progress * w.progress_weight
        + floor_penalty(&board.floor) as f64 * w.floor_weight
        + end_game_bonus(&wall) as f64 * w.bonus_weight
}
