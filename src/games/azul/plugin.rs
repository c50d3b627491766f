//! AzulPlugin: exposes the turn engine through the GamePlugin trait.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::engine::models::GameResult;
use crate::engine::plugin::GamePlugin;
use super::turn::{self, IllegalAction};
use super::types::*;

/// Every mutation a player can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum AzulAction {
    Draw { source: TileSource },
    SelectColor { slot: usize },
    Place { destination: PlacementDestination },
    UndoPlacement,
    UndoTurn,
    EndTurn,
    WallTiling,
    StartNextRound,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AzulPlugin;

impl GamePlugin for AzulPlugin {
    type State = GameState;
    type Action = AzulAction;
    type Rejection = IllegalAction;

    fn game_id(&self) -> &str {
        "azul"
    }

    fn display_name(&self) -> &str {
        "Azul"
    }

    fn num_players(&self) -> usize {
        NUM_PLAYERS
    }

    fn create_initial_state(&self, rng: &mut dyn RngCore) -> GameState {
        turn::new_game(rng)
    }

    fn apply_action(
        &self,
        state: &GameState,
        player: usize,
        action: &AzulAction,
        rng: &mut dyn RngCore,
    ) -> Result<GameState, IllegalAction> {
        match *action {
            AzulAction::Draw { source } => turn::draw(state, player, source),
            AzulAction::SelectColor { slot } => turn::select_color(state, player, slot),
            AzulAction::Place { destination } => turn::place(state, player, destination),
            AzulAction::UndoPlacement => turn::undo_placement(state, player),
            AzulAction::UndoTurn => turn::undo_turn(state, player),
            AzulAction::EndTurn => turn::end_turn(state, player),
            AzulAction::WallTiling => turn::wall_tiling(state, player),
            AzulAction::StartNextRound => turn::start_next_round(state, player, rng),
        }
    }

    fn valid_actions(&self, state: &GameState, player: usize) -> Vec<AzulAction> {
        if player >= NUM_PLAYERS {
            return Vec::new();
        }
        match state.phase {
            GamePhase::GameOver => Vec::new(),
            GamePhase::ReadyToWallTile => vec![AzulAction::WallTiling],
            GamePhase::DoneWallTiling => vec![AzulAction::StartNextRound],
            GamePhase::Playing if player != state.current_player => Vec::new(),
            GamePhase::Playing => playing_actions(state, player),
        }
    }

    fn acting_player(&self, state: &GameState) -> Option<usize> {
        match state.phase {
            GamePhase::GameOver => None,
            _ => Some(state.current_player),
        }
    }

    fn is_priority(&self, action: &AzulAction) -> bool {
        matches!(
            action,
            AzulAction::EndTurn | AzulAction::WallTiling | AzulAction::StartNextRound
        )
    }

    fn is_undo(&self, action: &AzulAction) -> bool {
        matches!(action, AzulAction::UndoPlacement | AzulAction::UndoTurn)
    }

    fn important_view(&self, state: &GameState) -> serde_json::Value {
        let players: Vec<serde_json::Value> = state
            .players
            .iter()
            .map(|p| {
                serde_json::json!({
                    "wall": p.wall,
                    "staircase": p.staircase,
                    "floor": p.floor,
                    "score": p.score,
                    "holding_area": p.holding_area.slots,
                })
            })
            .collect();
        serde_json::json!({
            "current_player": state.current_player,
            "phase": state.phase,
            "factories": state.factories,
            "pot": state.pot,
            "players": players,
        })
    }

    fn scores(&self, state: &GameState) -> Vec<f64> {
        state.players.iter().map(|p| p.score as f64).collect()
    }

    fn game_result(&self, state: &GameState) -> Option<GameResult> {
        if state.phase != GamePhase::GameOver {
            return None;
        }
        let final_scores = self.scores(state);
        let best = final_scores.iter().cloned().fold(f64::MIN, f64::max);
        let winners = final_scores
            .iter()
            .enumerate()
            .filter(|&(_, &s)| s == best)
            .map(|(i, _)| i)
            .collect();
        Some(GameResult {
            winners,
            final_scores,
            reason: "wall_row_completed".into(),
        })
    }
}

fn playing_actions(state: &GameState, player: usize) -> Vec<AzulAction> {
    let mut actions = Vec::new();
    let board = &state.players[player];

    if state.current_tile_source.is_none() {
        for (i, factory) in state.factories.iter().enumerate() {
            if !factory.is_empty() {
                actions.push(AzulAction::Draw {
                    source: TileSource::Factory(i),
                });
            }
        }
        if !state.pot.is_empty() {
            actions.push(AzulAction::Draw {
                source: TileSource::Pot,
            });
        }
        return actions;
    }

    if !state.has_placed_tile {
        let holding = &board.holding_area;
        for color in holding.colors() {
            let selectable = holding.locked_color.map_or(true, |c| c == color);
            if selectable && state.selected_color != Some(color) {
                if let Some(slot) = holding.first_slot_of(color) {
                    actions.push(AzulAction::SelectColor { slot });
                }
            }
        }
    }

    if let Some(color) = state.selected_color {
        for row in 0..WALL_SIZE {
            if board.row_accepts(row, color) {
                actions.push(AzulAction::Place {
                    destination: PlacementDestination::Staircase(row),
                });
            }
        }
        if board.first_empty_floor_slot().is_some() {
            actions.push(AzulAction::Place {
                destination: PlacementDestination::Floor,
            });
        }
    }

    if turn::can_end_turn(state, player) {
        actions.push(AzulAction::EndTurn);
    }
    if !state.placed_tiles_this_turn.is_empty() {
        actions.push(AzulAction::UndoPlacement);
    }
    actions.push(AzulAction::UndoTurn);
    actions
}
