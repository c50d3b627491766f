//! GamePlugin trait: the interface a replicated game implements.

use std::fmt;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::engine::models::GameResult;

/// Trait every replicated game implements.
///
/// State is plain data updated immutably: `apply_action` never touches its input
/// and hands back a fresh state, so replicas can compare, store and resend snapshots
/// freely.
pub trait GamePlugin: Send + Sync {
    type State: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync;
    type Action: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync;
    type Rejection: fmt::Display;

    fn game_id(&self) -> &str;
    fn display_name(&self) -> &str;
    fn num_players(&self) -> usize;

    /// Create the initial state, including any randomized deal.
    fn create_initial_state(&self, rng: &mut dyn RngCore) -> Self::State;

    /// Apply an action for `player`. Rejections leave `state` untouched.
    fn apply_action(
        &self,
        state: &Self::State,
        player: usize,
        action: &Self::Action,
        rng: &mut dyn RngCore,
    ) -> Result<Self::State, Self::Rejection>;

    /// Check an action without keeping the result. Randomized transitions are
    /// exercised with a throwaway generator.
    fn validate_action(
        &self,
        state: &Self::State,
        player: usize,
        action: &Self::Action,
    ) -> Result<(), Self::Rejection> {
        let mut rng = StdRng::seed_from_u64(0);
        self.apply_action(state, player, action, &mut rng).map(|_| ())
    }

    /// Every action `player` may legally take right now.
    fn valid_actions(&self, state: &Self::State, player: usize) -> Vec<Self::Action>;

    /// Seat expected to act next, or `None` once the game is over.
    fn acting_player(&self, state: &Self::State) -> Option<usize>;

    /// Priority actions end a turn or a round; their envelopes bypass peer filters.
    fn is_priority(&self, action: &Self::Action) -> bool;

    /// Actions that retract earlier moves of the same turn.
    fn is_undo(&self, _action: &Self::Action) -> bool {
        false
    }

    /// The subset of state that matters for display. Replicas skip incoming snapshots
    /// whose important view equals their own.
    fn important_view(&self, state: &Self::State) -> serde_json::Value;

    fn scores(&self, state: &Self::State) -> Vec<f64>;

    fn game_result(&self, state: &Self::State) -> Option<GameResult>;

    /// Apply an action, turning a rejection into a no-op.
    fn try_apply(
        &self,
        state: &Self::State,
        player: usize,
        action: &Self::Action,
        rng: &mut dyn RngCore,
    ) -> Option<Self::State> {
        match self.apply_action(state, player, action, rng) {
            Ok(next) => Some(next),
            Err(reason) => {
                tracing::debug!(
                    game = self.game_id(),
                    player,
                    ?action,
                    %reason,
                    "rejected illegal action"
                );
                None
            }
        }
    }
}
