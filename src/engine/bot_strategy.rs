//! Bot strategy trait and implementations.

use rand::seq::SliceRandom;
use rand::RngCore;

use crate::engine::evaluator::EvalFn;
use crate::engine::plugin::GamePlugin;

/// A bot strategy picks the next action for `player`, or `None` when it has no move.
pub trait BotStrategy<P: GamePlugin>: Send + Sync {
    fn choose_action(
        &self,
        plugin: &P,
        state: &P::State,
        player: usize,
        rng: &mut dyn RngCore,
    ) -> Option<P::Action>;
}

/// Valid actions minus undo moves.
fn forward_actions<P: GamePlugin>(plugin: &P, state: &P::State, player: usize) -> Vec<P::Action> {
    plugin
        .valid_actions(state, player)
        .into_iter()
        .filter(|a| !plugin.is_undo(a))
        .collect()
}

/// Picks a uniformly random valid action.
pub struct RandomStrategy;

impl<P: GamePlugin> BotStrategy<P> for RandomStrategy {
    fn choose_action(
        &self,
        plugin: &P,
        state: &P::State,
        player: usize,
        rng: &mut dyn RngCore,
    ) -> Option<P::Action> {
        forward_actions(plugin, state, player).choose(rng).cloned()
    }
}

/// One-ply lookahead: applies every action and keeps the best-evaluated result.
/// Ties are broken at random.
///
/// Actions that leave the important view untouched, such as re-selecting a
/// color, are taken only when nothing else is legal.
pub struct GreedyStrategy<P: GamePlugin> {
    pub eval_fn: EvalFn<P::State>,
}

impl<P: GamePlugin> GreedyStrategy<P> {
    pub fn new(eval_fn: EvalFn<P::State>) -> Self {
        Self { eval_fn }
    }
}

impl<P: GamePlugin> BotStrategy<P> for GreedyStrategy<P> {
    fn choose_action(
        &self,
        plugin: &P,
        state: &P::State,
        player: usize,
        rng: &mut dyn RngCore,
    ) -> Option<P::Action> {
        let current_view = plugin.important_view(state);
        let mut idle: Vec<P::Action> = Vec::new();
        let mut best: Vec<P::Action> = Vec::new();
        let mut best_value = f64::NEG_INFINITY;
        for action in forward_actions(plugin, state, player) {
            let Ok(next) = plugin.apply_action(state, player, &action, &mut *rng) else {
                continue;
            };
            if plugin.important_view(&next) == current_view {
                idle.push(action);
                continue;
            }
            let value = (self.eval_fn)(&next, player);
            if value > best_value + 1e-12 {
                best_value = value;
                best.clear();
                best.push(action);
            } else if (value - best_value).abs() <= 1e-12 {
                best.push(action);
            }
        }
        if best.is_empty() {
            return idle.choose(rng).cloned();
        }
        best.choose(rng).cloned()
    }
}
