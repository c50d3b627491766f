//! Wall placement scoring, floor penalties and end-of-game bonuses.

use super::types::{Floor, TileType, Wall, ALL_TILE_TYPES, FLOOR_PENALTIES, WALL_SIZE};

fn occupied(wall: &Wall, row: isize, col: isize) -> bool {
    row >= 0
        && col >= 0
        && (row as usize) < WALL_SIZE
        && (col as usize) < WALL_SIZE
        && wall[row as usize][col as usize].is_some()
}

/// Length of the contiguous run through (row, col) along (dr, dc), counting the cell itself.
fn run_length(wall: &Wall, row: usize, col: usize, dr: isize, dc: isize) -> u32 {
    let mut len = 1;
    for sign in [-1isize, 1] {
        let (mut r, mut c) = (row as isize + sign * dr, col as isize + sign * dc);
        while occupied(wall, r, c) {
            len += 1;
            r += sign * dr;
            c += sign * dc;
        }
    }
    len
}

/// Points for the tile just placed at (row, col).
///
/// An isolated tile scores 1. Otherwise each axis with a neighbor scores its full
/// run length; with neighbors on both axes the placed tile counts in both runs.
pub fn score_cell(wall: &Wall, row: usize, col: usize) -> u32 {
    let horizontal = run_length(wall, row, col, 0, 1);
    let vertical = run_length(wall, row, col, 1, 0);
    match (horizontal > 1, vertical > 1) {
        (false, false) => 1,
        (true, false) => horizontal,
        (false, true) => vertical,
        (true, true) => horizontal + vertical,
    }
}

/// Sum of the penalty weights of occupied floor slots (zero or negative).
pub fn floor_penalty(floor: &Floor) -> i32 {
    floor
        .iter()
        .zip(FLOOR_PENALTIES)
        .filter(|(slot, _)| slot.is_some())
        .map(|(_, penalty)| penalty)
        .sum()
}

/// Apply a penalty to a score, clamping at zero.
pub fn apply_penalty(score: u32, penalty: i32) -> u32 {
    (score as i64 + penalty as i64).max(0) as u32
}

/// End-of-game bonus: +2 per complete row, +7 per complete column,
/// +10 per color with all five tiles on the wall.
pub fn end_game_bonus(wall: &Wall) -> u32 {
    let rows = (0..WALL_SIZE)
        .filter(|&r| wall[r].iter().all(Option::is_some))
        .count() as u32;
    let cols = (0..WALL_SIZE)
        .filter(|&c| (0..WALL_SIZE).all(|r| wall[r][c].is_some()))
        .count() as u32;
    let colors = ALL_TILE_TYPES
        .iter()
        .filter(|&&color| color_count(wall, color) == WALL_SIZE)
        .count() as u32;
    rows * 2 + cols * 7 + colors * 10
}

fn color_count(wall: &Wall, color: TileType) -> usize {
    wall.iter()
        .flatten()
        .flatten()
        .filter(|t| t.tile_type == color)
        .count()
}
