//! Turn engine: drafting, placing, undo, end of turn and the round cycle.
//!
//! Every operation takes the current state by reference and returns a new state,
//! or the precondition that failed. The input is never modified, so a rejected
//! action is a no-op for the caller.

use std::fmt;

use rand::Rng;

use super::scoring::{apply_penalty, end_game_bonus, floor_penalty, score_cell};
use super::supply::{fill_factories, new_bag, recycle_if_empty};
use super::types::*;

/// Why an action was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IllegalAction {
    InvalidPlayer,
    WrongPhase,
    NotYourTurn,
    SourceAlreadyChosen,
    InvalidSource,
    EmptySource,
    NoSourceChosen,
    NoSuchTile,
    ColorLocked,
    NothingSelected,
    InvalidRow,
    RowFull,
    ColorOnWall,
    RowColorMismatch,
    FloorFull,
    TilesRemaining,
    NothingToUndo,
}

impl fmt::Display for IllegalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            IllegalAction::InvalidPlayer => "no such player",
            IllegalAction::WrongPhase => "action not allowed in this phase",
            IllegalAction::NotYourTurn => "not this player's turn",
            IllegalAction::SourceAlreadyChosen => "tiles already drawn this turn",
            IllegalAction::InvalidSource => "no such factory",
            IllegalAction::EmptySource => "source is empty",
            IllegalAction::NoSourceChosen => "no tiles drawn this turn",
            IllegalAction::NoSuchTile => "no tile in that holding slot",
            IllegalAction::ColorLocked => "another color is locked for this turn",
            IllegalAction::NothingSelected => "no color selected",
            IllegalAction::InvalidRow => "no such staircase row",
            IllegalAction::RowFull => "staircase row is full",
            IllegalAction::ColorOnWall => "color already on this wall row",
            IllegalAction::RowColorMismatch => "staircase row holds another color",
            IllegalAction::FloorFull => "floor is full",
            IllegalAction::TilesRemaining => "tiles of the chosen color remain",
            IllegalAction::NothingToUndo => "nothing placed this turn",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for IllegalAction {}

pub type TurnResult = Result<GameState, IllegalAction>;

fn ensure_seated(player: usize) -> Result<(), IllegalAction> {
    if player < NUM_PLAYERS {
        Ok(())
    } else {
        Err(IllegalAction::InvalidPlayer)
    }
}

fn ensure_turn(state: &GameState, player: usize) -> Result<(), IllegalAction> {
    ensure_seated(player)?;
    if state.phase != GamePhase::Playing {
        return Err(IllegalAction::WrongPhase);
    }
    if player != state.current_player {
        return Err(IllegalAction::NotYourTurn);
    }
    Ok(())
}

/// Deal a new match: fresh shuffled bag, factories filled, player 0 to start.
pub fn new_game<R: Rng + ?Sized>(rng: &mut R) -> GameState {
    let mut state = GameState::empty();
    state.tile_bag = new_bag(rng);
    fill_factories(&mut state, rng);
    state
}

/// Take the whole content of a factory or the pot into the holding area.
pub fn draw(state: &GameState, player: usize, source: TileSource) -> TurnResult {
    ensure_turn(state, player)?;
    if state.current_tile_source.is_some() {
        return Err(IllegalAction::SourceAlreadyChosen);
    }
    let pool_is_empty = match source {
        TileSource::Factory(i) => state
            .factories
            .get(i)
            .ok_or(IllegalAction::InvalidSource)?
            .is_empty(),
        TileSource::Pot => state.pot.is_empty(),
    };
    if pool_is_empty {
        return Err(IllegalAction::EmptySource);
    }

    let mut next = state.clone();
    let tiles = match source {
        TileSource::Factory(i) => std::mem::take(&mut next.factories[i]),
        TileSource::Pot => std::mem::take(&mut next.pot),
    };
    next.players[player].holding_area.push_all(tiles);

    if source == TileSource::Pot && !next.has_first_player_been_moved {
        next.marker_before_draw = Some(next.first_player_marker_index);
        next.first_player_marker_index = player;
        next.has_first_player_been_moved = true;
    }
    next.current_tile_source = Some(source);
    next.selected_color = None;
    next.has_placed_tile = false;
    Ok(next)
}

/// Select the color of the tile in holding slot `slot`.
pub fn select_color(state: &GameState, player: usize, slot: usize) -> TurnResult {
    ensure_turn(state, player)?;
    if state.current_tile_source.is_none() {
        return Err(IllegalAction::NoSourceChosen);
    }
    if state.has_placed_tile {
        return Err(IllegalAction::ColorLocked);
    }
    let holding = &state.players[player].holding_area;
    let tile = holding
        .slots
        .get(slot)
        .copied()
        .flatten()
        .ok_or(IllegalAction::NoSuchTile)?;
    if holding.locked_color.is_some_and(|c| c != tile.tile_type) {
        return Err(IllegalAction::ColorLocked);
    }

    let mut next = state.clone();
    next.selected_color = Some(tile.tile_type);
    Ok(next)
}

/// Place one tile of the selected color on a staircase row or the floor.
pub fn place(state: &GameState, player: usize, destination: PlacementDestination) -> TurnResult {
    ensure_turn(state, player)?;
    let color = state.selected_color.ok_or(IllegalAction::NothingSelected)?;
    let board = &state.players[player];
    let holding_slot = board
        .holding_area
        .first_slot_of(color)
        .ok_or(IllegalAction::NoSuchTile)?;

    let slot = match destination {
        PlacementDestination::Staircase(row) => {
            if row >= WALL_SIZE {
                return Err(IllegalAction::InvalidRow);
            }
            if board.wall_row_has(row, color) {
                return Err(IllegalAction::ColorOnWall);
            }
            if board.staircase_row_color(row).is_some_and(|c| c != color) {
                return Err(IllegalAction::RowColorMismatch);
            }
            board
                .rightmost_empty_staircase_slot(row)
                .ok_or(IllegalAction::RowFull)?
        }
        PlacementDestination::Floor => board
            .first_empty_floor_slot()
            .ok_or(IllegalAction::FloorFull)?,
    };

    let mut next = state.clone();
    let board = &mut next.players[player];
    let tile = board
        .holding_area
        .take(holding_slot)
        .ok_or(IllegalAction::NoSuchTile)?;
    match destination {
        PlacementDestination::Staircase(row) => board.staircase[row][slot] = Some(tile),
        PlacementDestination::Floor => board.floor[slot] = Some(tile),
    }
    board.holding_area.locked_color = Some(color);
    let remaining = board.holding_area.count_of(color);

    next.placed_tiles_this_turn.push(PlacedTile {
        tile_type: color,
        destination,
        slot,
        holding_slot,
    });
    if remaining == 0 {
        next.has_placed_tile = true;
        next.selected_color = None;
    }
    Ok(next)
}

/// Take back every placement of this turn. The drawn tiles stay in the holding area.
pub fn undo_placement(state: &GameState, player: usize) -> TurnResult {
    ensure_turn(state, player)?;
    let first = state
        .placed_tiles_this_turn
        .first()
        .copied()
        .ok_or(IllegalAction::NothingToUndo)?;

    let mut next = state.clone();
    let placed = std::mem::take(&mut next.placed_tiles_this_turn);
    let board = &mut next.players[player];
    for p in placed.iter().rev() {
        let cell = match p.destination {
            PlacementDestination::Staircase(row) => &mut board.staircase[row][p.slot],
            PlacementDestination::Floor => &mut board.floor[p.slot],
        };
        if let Some(tile) = cell.take() {
            board.holding_area.restore(p.holding_slot, tile);
        }
    }
    board.holding_area.locked_color = None;
    next.has_placed_tile = false;
    next.selected_color = Some(first.tile_type);
    Ok(next)
}

/// Take back the whole turn: placements first, then the draw itself.
pub fn undo_turn(state: &GameState, player: usize) -> TurnResult {
    ensure_turn(state, player)?;
    let source = state
        .current_tile_source
        .ok_or(IllegalAction::NoSourceChosen)?;

    let mut next = if state.placed_tiles_this_turn.is_empty() {
        state.clone()
    } else {
        undo_placement(state, player)?
    };
    let tiles = next.players[player].holding_area.drain();
    match source {
        TileSource::Factory(i) => next.factories[i].extend(tiles),
        TileSource::Pot => next.pot.extend(tiles),
    }
    if let Some(previous) = next.marker_before_draw.take() {
        next.first_player_marker_index = previous;
        next.has_first_player_been_moved = false;
    }
    next.current_tile_source = None;
    next.selected_color = None;
    next.has_placed_tile = false;
    Ok(next)
}

/// Colors in the holding area that still owe a placement this turn.
fn owed_colors(state: &GameState, player: usize) -> Vec<TileType> {
    let holding = &state.players[player].holding_area;
    match holding.locked_color {
        Some(color) if holding.count_of(color) > 0 => vec![color],
        Some(_) => Vec::new(),
        None => holding.colors(),
    }
}

/// Whether `end_turn` would currently succeed for `player`.
pub fn can_end_turn(state: &GameState, player: usize) -> bool {
    end_turn_disposition(state, player).is_ok()
}

/// Ok(colors to discard) when the turn may end.
fn end_turn_disposition(state: &GameState, player: usize) -> Result<Vec<TileType>, IllegalAction> {
    ensure_turn(state, player)?;
    if state.current_tile_source.is_none() {
        return Err(IllegalAction::NoSourceChosen);
    }
    if state.has_placed_tile {
        return Ok(Vec::new());
    }
    let owed = owed_colors(state, player);
    let board = &state.players[player];
    if owed.iter().any(|&c| board.can_place(c)) {
        return Err(IllegalAction::TilesRemaining);
    }
    // Nothing owed can go anywhere: those tiles are lost to the discard pile.
    Ok(owed)
}

/// Finish the turn: leftovers go to the pot, then play passes or the round ends.
pub fn end_turn(state: &GameState, player: usize) -> TurnResult {
    let discarded = end_turn_disposition(state, player)?;

    let mut next = state.clone();
    for tile in next.players[player].holding_area.drain() {
        if discarded.contains(&tile.tile_type) {
            next.discard_pile.push(tile);
        } else {
            next.pot.push(tile);
        }
    }
    next.selected_color = None;
    next.has_placed_tile = false;
    next.current_tile_source = None;
    next.placed_tiles_this_turn.clear();
    next.marker_before_draw = None;

    if next.all_sources_empty() {
        next.phase = GamePhase::ReadyToWallTile;
    } else {
        next.current_player = (next.current_player + 1) % NUM_PLAYERS;
    }
    Ok(next)
}

/// Move every full staircase row onto the wall, score it, then charge floor penalties.
///
/// Ends the game when any wall row is complete, adding end-of-game bonuses.
pub fn wall_tiling(state: &GameState, player: usize) -> TurnResult {
    ensure_seated(player)?;
    if state.phase != GamePhase::ReadyToWallTile {
        return Err(IllegalAction::WrongPhase);
    }

    let mut next = state.clone();
    let GameState {
        players,
        discard_pile,
        ..
    } = &mut next;

    for board in players.iter_mut() {
        for row in 0..WALL_SIZE {
            if !board.staircase_row_full(row) {
                continue;
            }
            let mut tiles: Vec<Tile> = board.staircase[row].iter_mut().filter_map(Option::take).collect();
            let Some(tile) = tiles.pop() else { continue };
            let col = wall_column(row, tile.tile_type);
            if board.wall[row][col].is_none() {
                board.wall[row][col] = Some(tile);
                board.score += score_cell(&board.wall, row, col);
            } else {
                discard_pile.push(tile);
            }
            discard_pile.extend(tiles);
        }

        let penalty = floor_penalty(&board.floor);
        board.score = apply_penalty(board.score, penalty);
        discard_pile.extend(board.floor.iter_mut().filter_map(Option::take));
    }

    if next.players.iter().any(PlayerBoard::has_complete_wall_row) {
        for board in next.players.iter_mut() {
            board.score += end_game_bonus(&board.wall);
        }
        next.phase = GamePhase::GameOver;
    } else {
        next.phase = GamePhase::DoneWallTiling;
    }
    Ok(next)
}

/// Refill the factories and hand the first move to the marker holder.
pub fn start_next_round<R: Rng + ?Sized>(state: &GameState, player: usize, rng: &mut R) -> TurnResult {
    ensure_seated(player)?;
    if state.phase != GamePhase::DoneWallTiling {
        return Err(IllegalAction::WrongPhase);
    }

    let mut next = state.clone();
    recycle_if_empty(&mut next, rng);
    fill_factories(&mut next, rng);
    next.phase = GamePhase::Playing;
    next.has_first_player_been_moved = false;
    next.current_player = next.first_player_marker_index;
    next.round += 1;
    Ok(next)
}
