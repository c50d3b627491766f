//! Generic evaluation function type for bot leaf evaluation.

use crate::engine::plugin::GamePlugin;

/// Evaluation function type: (state, player) -> f64 in [0, 1]
pub type EvalFn<S> = Box<dyn Fn(&S, usize) -> f64 + Send + Sync>;

/// Default evaluation: sigmoid of the score differential against the best opponent.
pub fn default_eval_fn<P: GamePlugin>(plugin: &P, state: &P::State, player: usize) -> f64 {
    let scores = plugin.scores(state);
    let Some(&my_score) = scores.get(player) else {
        return 0.5;
    };

    let mut max_opp = 0.0f64;
    let mut has_opp = false;
    for (p, &s) in scores.iter().enumerate() {
        if p != player && (!has_opp || s > max_opp) {
            max_opp = s;
            has_opp = true;
        }
    }

    if !has_opp {
        return 0.5;
    }

    let diff = my_score - max_opp;
    1.0 / (1.0 + (-diff / 20.0_f64).exp())
}
