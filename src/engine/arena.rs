//! Bot-vs-bot arena runner.
//!
//! Every match is played the way two networked clients would play it: each seat
//! is a `ReplicaClient`, every move is relayed through a `RoomRegistry`, and the
//! replicas only learn about each other's moves from relayed snapshots. A match
//! whose replicas disagree after a delivery is counted as diverged.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::engine::bot_strategy::BotStrategy;
use crate::engine::clock::{Clock, ManualClock};
use crate::engine::models::{GameConfig, GameResult, StateEnvelope};
use crate::engine::plugin::GamePlugin;
use crate::engine::replica::{ReplicaClient, ReplicaSettings};
use crate::relay::config::RelayConfig;
use crate::relay::registry::{Delivery, RelayEvent, RoomRegistry};

/// Simulated time between two moves. Longer than any settle window.
const STEP_MS: u64 = 250;
const MAX_STEPS: usize = 20_000;

/// Aggregated results from an arena run.
pub struct ArenaResult {
    pub num_games: usize,
    pub wins: HashMap<String, usize>,
    pub draws: usize,
    /// Matches that ended with no legal move or hit the step cap.
    pub stalled: usize,
    pub diverged: usize,
    pub total_scores: HashMap<String, Vec<f64>>,
    pub game_durations_ms: Vec<f64>,
}

impl ArenaResult {
    pub fn win_rate(&self, name: &str) -> f64 {
        *self.wins.get(name).unwrap_or(&0) as f64 / self.num_games.max(1) as f64
    }

    pub fn avg_score(&self, name: &str) -> f64 {
        let scores = self.total_scores.get(name);
        match scores {
            Some(s) if !s.is_empty() => s.iter().sum::<f64>() / s.len() as f64,
            _ => 0.0,
        }
    }

    pub fn score_stddev(&self, name: &str) -> f64 {
        let scores = match self.total_scores.get(name) {
            Some(s) if s.len() >= 2 => s,
            _ => return 0.0,
        };
        let avg = self.avg_score(name);
        let variance = scores.iter().map(|s| (s - avg).powi(2)).sum::<f64>() / (scores.len() - 1) as f64;
        variance.sqrt()
    }

    pub fn confidence_interval_95(&self, name: &str) -> (f64, f64) {
        let n = self.num_games;
        if n == 0 {
            return (0.0, 0.0);
        }
        let p = self.win_rate(name);
        let z = 1.96_f64;
        let denom = 1.0 + z * z / n as f64;
        let center = (p + z * z / (2.0 * n as f64)) / denom;
        let margin = z * ((p * (1.0 - p) + z * z / (4.0 * n as f64)) / n as f64).sqrt() / denom;
        ((center - margin).max(0.0), (center + margin).min(1.0))
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!("Arena Results ({} games)", self.num_games)];
        lines.push("=".repeat(60));
        let mut names: Vec<&String> = self.wins.keys().collect();
        names.sort();
        for name in names {
            let wr = self.win_rate(name);
            let (ci_lo, ci_hi) = self.confidence_interval_95(name);
            let avg = self.avg_score(name);
            let std = self.score_stddev(name);
            lines.push(format!(
                "  {:>12}: {:3} wins ({:5.1}%)  [95% CI: {:.1}%-{:.1}%]  avg={:5.1} +/- {:4.1}",
                name,
                self.wins[name],
                wr * 100.0,
                ci_lo * 100.0,
                ci_hi * 100.0,
                avg,
                std,
            ));
        }
        lines.push(format!("  {:>12}: {}", "Draws", self.draws));
        if self.stalled > 0 || self.diverged > 0 {
            lines.push(format!(
                "  {:>12}: {}  |  Diverged: {}",
                "Stalled", self.stalled, self.diverged
            ));
        }
        if !self.game_durations_ms.is_empty() {
            let avg_ms = self.game_durations_ms.iter().sum::<f64>() / self.game_durations_ms.len() as f64;
            let total_s = self.game_durations_ms.iter().sum::<f64>() / 1000.0;
            lines.push(format!("  Avg game: {:.0}ms  |  Total: {:.1}s", avg_ms, total_s));
        }
        lines.join("\n")
    }
}

/// How one relayed match ended.
#[derive(Debug)]
pub enum MatchOutcome {
    Finished(GameResult),
    Stalled,
    Diverged,
}

struct MatchReport {
    seats: Vec<String>,
    outcome: MatchOutcome,
    elapsed_ms: f64,
}

/// Run `num_games` between the given strategies and return aggregated stats.
///
/// Matches run in parallel; game `i` uses seed `base_seed + i`, so results do not
/// depend on scheduling.
pub fn run_arena<P>(
    plugin: &P,
    strategies: &HashMap<String, Box<dyn BotStrategy<P>>>,
    num_games: usize,
    base_seed: u64,
    alternate_seats: bool,
    progress_callback: Option<&(dyn Fn(usize, usize) + Sync)>,
) -> ArenaResult
where
    P: GamePlugin + Clone,
{
    let num_players = plugin.num_players();
    let mut strategy_names: Vec<String> = strategies.keys().cloned().collect();
    strategy_names.sort();
    assert_eq!(strategy_names.len(), num_players);

    let done = std::sync::atomic::AtomicUsize::new(0);
    let reports: Vec<MatchReport> = (0..num_games)
        .into_par_iter()
        .map(|game_idx| {
            let seed = base_seed + game_idx as u64;
            let seats: Vec<String> = if alternate_seats {
                (0..num_players)
                    .map(|i| strategy_names[(i + game_idx) % num_players].clone())
                    .collect()
            } else {
                strategy_names.clone()
            };
            let seat_strategies: Vec<&dyn BotStrategy<P>> =
                seats.iter().map(|name| strategies[name].as_ref()).collect();

            let t0 = Instant::now();
            let outcome = play_relayed_match(plugin, &seat_strategies, seed);
            let elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0;

            let finished = done.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
            if let Some(cb) = progress_callback {
                cb(finished, num_games);
            }
            MatchReport {
                seats,
                outcome,
                elapsed_ms,
            }
        })
        .collect();

    let mut result = ArenaResult {
        num_games,
        wins: strategy_names.iter().map(|n| (n.clone(), 0)).collect(),
        draws: 0,
        stalled: 0,
        diverged: 0,
        total_scores: strategy_names.iter().map(|n| (n.clone(), Vec::new())).collect(),
        game_durations_ms: Vec::with_capacity(num_games),
    };

    for report in reports {
        result.game_durations_ms.push(report.elapsed_ms);
        match report.outcome {
            MatchOutcome::Stalled => {
                result.stalled += 1;
                result.draws += 1;
            }
            MatchOutcome::Diverged => {
                result.diverged += 1;
                result.draws += 1;
            }
            MatchOutcome::Finished(gr) => {
                for (seat, score) in gr.final_scores.iter().enumerate() {
                    if let Some(scores) = report.seats.get(seat).and_then(|n| result.total_scores.get_mut(n)) {
                        scores.push(*score);
                    }
                }
                match gr.winners.as_slice() {
                    [winner] => {
                        if let Some(count) = report.seats.get(*winner).and_then(|n| result.wins.get_mut(n)) {
                            *count += 1;
                        }
                    }
                    _ => result.draws += 1,
                }
            }
        }
    }

    result
}

fn connection(seat: usize) -> String {
    format!("conn-{seat}")
}

/// Simulated pacing of a relayed match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayTiming {
    /// Clock advance between two scheduler steps.
    pub step_ms: u64,
    /// One-way delay from the relay to each client.
    pub latency_ms: u64,
}

impl Default for RelayTiming {
    fn default() -> Self {
        Self {
            step_ms: STEP_MS,
            latency_ms: 0,
        }
    }
}

/// Relay output waiting to reach its connection, in send order.
struct Wire {
    latency_ms: u64,
    in_flight: VecDeque<(u64, Delivery)>,
}

impl Wire {
    fn new(latency_ms: u64) -> Self {
        Self {
            latency_ms,
            in_flight: VecDeque::new(),
        }
    }

    fn send(&mut self, now: u64, deliveries: Vec<Delivery>) {
        let due = now + self.latency_ms;
        self.in_flight.extend(deliveries.into_iter().map(|d| (due, d)));
    }

    fn pop_due(&mut self, now: u64) -> Option<Delivery> {
        match self.in_flight.front() {
            Some((due, _)) if *due <= now => self.in_flight.pop_front().map(|(_, d)| d),
            _ => None,
        }
    }

    fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}

/// Play one match with every move relayed between two replicas and delivered
/// instantly, one move per [`STEP_MS`].
pub fn play_relayed_match<P>(
    plugin: &P,
    strategies: &[&dyn BotStrategy<P>],
    seed: u64,
) -> MatchOutcome
where
    P: GamePlugin + Clone,
{
    play_relayed_match_with_timing(plugin, strategies, seed, RelayTiming::default())
}

/// Play one match under the given pacing.
///
/// A seat moves when its own replica says it is that seat's turn, so with
/// latency the players act on whatever they have received so far. Snapshots
/// dropped by the settle windows are only guaranteed to be reconciled by the
/// next priority envelope, so with latency the replicas are compared once the
/// wire drains after a priority emission, and at the end of the match.
pub fn play_relayed_match_with_timing<P>(
    plugin: &P,
    strategies: &[&dyn BotStrategy<P>],
    seed: u64,
    timing: RelayTiming,
) -> MatchOutcome
where
    P: GamePlugin + Clone,
{
    let clock = Arc::new(ManualClock::new(0));
    let shared: Arc<dyn Clock> = clock.clone();
    let mut registry = RoomRegistry::new(RelayConfig::default(), shared.clone());
    let room_id = format!("arena-{seed}");

    let mut rng = GameConfig {
        random_seed: Some(seed),
    }
    .rng();
    let initial = plugin.create_initial_state(&mut rng);
    let mut replicas: Vec<ReplicaClient<P>> = (0..strategies.len())
        .map(|seat| {
            ReplicaClient::new(
                plugin.clone(),
                format!("c{seat}"),
                initial.clone(),
                shared.clone(),
                ReplicaSettings::default(),
                seed.wrapping_add(seat as u64 + 1),
            )
        })
        .collect();

    let mut wire = Wire::new(timing.latency_ms);
    for seat in 0..replicas.len() {
        wire.send(clock.now_ms(), registry.join(&connection(seat), &room_id));
    }
    pump(&mut registry, &mut replicas, &room_id, &mut wire, clock.now_ms());

    let mut check_when_drained = false;
    for _ in 0..MAX_STEPS {
        clock.advance(timing.step_ms);
        let now = clock.now_ms();
        pump(&mut registry, &mut replicas, &room_id, &mut wire, now);

        if check_when_drained && wire.is_empty() {
            check_when_drained = false;
            if diverged(plugin, &replicas) {
                tracing::warn!(seed, "replicas diverged after a priority update");
                return MatchOutcome::Diverged;
            }
        }

        let Some(seat) = replicas.iter().position(|r| {
            r.player_index().is_some() && plugin.acting_player(r.state()) == r.player_index()
        }) else {
            if !wire.is_empty() {
                continue;
            }
            if diverged(plugin, &replicas) {
                tracing::warn!(seed, "replicas diverged at the end of the match");
                return MatchOutcome::Diverged;
            }
            return match plugin.game_result(replicas[0].state()) {
                Some(result) => MatchOutcome::Finished(result),
                None => MatchOutcome::Stalled,
            };
        };

        let replica = &mut replicas[seat];
        let Some(acting) = replica.player_index() else {
            return MatchOutcome::Stalled;
        };
        let Some(action) = strategies[seat].choose_action(plugin, replica.state(), acting, &mut rng) else {
            tracing::debug!(seed, seat, "no move available");
            return MatchOutcome::Stalled;
        };
        let Some(envelope) = replica.perform_local(&action) else {
            return MatchOutcome::Stalled;
        };
        check_when_drained = envelope.is_priority_update;
        let Ok(erased) = envelope.to_json() else {
            return MatchOutcome::Stalled;
        };

        wire.send(now, registry.update_game_state(&connection(seat), &room_id, erased));
        pump(&mut registry, &mut replicas, &room_id, &mut wire, now);

        if timing.latency_ms == 0 && diverged(plugin, &replicas) {
            tracing::warn!(seed, "replicas diverged");
            return MatchOutcome::Diverged;
        }
    }
    MatchOutcome::Stalled
}

fn diverged<P: GamePlugin>(plugin: &P, replicas: &[ReplicaClient<P>]) -> bool {
    let views: Vec<serde_json::Value> =
        replicas.iter().map(|r| plugin.important_view(r.state())).collect();
    views.windows(2).any(|w| w[0] != w[1])
}

/// Hand every due delivery to its replica. Replies produced on the way go back
/// on the wire.
fn pump<P: GamePlugin>(
    registry: &mut RoomRegistry,
    replicas: &mut [ReplicaClient<P>],
    room_id: &str,
    wire: &mut Wire,
    now: u64,
) {
    while let Some(Delivery { to, event }) = wire.pop_due(now) {
        let Some(seat) = (0..replicas.len()).find(|&s| connection(s) == to) else {
            continue;
        };
        let replica = &mut replicas[seat];
        match event {
            RelayEvent::RoomJoined { player_index, .. } => {
                replica.set_player_index(Some(player_index));
            }
            RelayEvent::SyncGameState(envelope) => {
                if let Ok(typed) = envelope.decode::<P::State>() {
                    replica.receive(typed);
                }
            }
            RelayEvent::ProvidedGameState(envelope) => {
                if let Ok(typed) = envelope.decode::<P::State>() {
                    replica.receive_provided(typed);
                }
            }
            RelayEvent::GameStateRequested { requester, .. } => {
                let provided: StateEnvelope<P::State> = replica.provide_state();
                if let Ok(erased) = provided.to_json() {
                    wire.send(now, registry.provide_game_state(&to, room_id, erased, &requester));
                }
            }
            RelayEvent::RoomFull { .. }
            | RelayEvent::GameStart { .. }
            | RelayEvent::PlayerDisconnected { .. }
            | RelayEvent::Error { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::bot_strategy::{GreedyStrategy, RandomStrategy};
    use crate::games::azul::evaluator::azul_eval;
    use crate::games::azul::plugin::AzulPlugin;

    #[test]
    fn test_relayed_match_finishes_without_divergence() {
        let plugin = AzulPlugin;
        let strategies: [&dyn BotStrategy<AzulPlugin>; 2] = [&RandomStrategy, &RandomStrategy];
        match play_relayed_match(&plugin, &strategies, 17) {
            MatchOutcome::Finished(result) => {
                assert!(!result.winners.is_empty());
                assert_eq!(result.final_scores.len(), 2);
            }
            other => panic!("match did not finish cleanly: {other:?}"),
        }
    }

    #[test]
    fn test_delayed_relay_match_converges() {
        let plugin = AzulPlugin;
        let greedy = GreedyStrategy::<AzulPlugin>::new(Box::new(azul_eval));
        let strategies: [&dyn BotStrategy<AzulPlugin>; 2] = [&greedy, &greedy];
        let timing = RelayTiming {
            step_ms: 20,
            latency_ms: 150,
        };
        let outcome = play_relayed_match_with_timing(&plugin, &strategies, 31, timing);
        assert!(!matches!(outcome, MatchOutcome::Diverged), "{outcome:?}");
    }

    #[test]
    fn test_wire_delivers_in_order_once_due() {
        let mut wire = Wire::new(100);
        let event = |n: usize| RelayEvent::PlayerDisconnected { player_index: n };
        wire.send(0, vec![Delivery { to: connection(0), event: event(0) }]);
        wire.send(10, vec![Delivery { to: connection(1), event: event(1) }]);

        assert!(wire.pop_due(99).is_none());
        assert_eq!(wire.pop_due(100).map(|d| d.event), Some(event(0)));
        assert!(wire.pop_due(100).is_none());
        assert_eq!(wire.pop_due(500).map(|d| d.to), Some(connection(1)));
        assert!(wire.is_empty());
    }

    #[test]
    fn test_arena_random_vs_greedy() {
        let plugin = AzulPlugin;
        let mut strategies: HashMap<String, Box<dyn BotStrategy<AzulPlugin>>> = HashMap::new();
        strategies.insert("random".into(), Box::new(RandomStrategy));
        strategies.insert("greedy".into(), Box::new(GreedyStrategy::new(Box::new(azul_eval))));

        let result = run_arena(&plugin, &strategies, 4, 42, true, None);

        assert_eq!(result.num_games, 4);
        assert_eq!(result.diverged, 0);
        let total_outcomes = result.wins.values().sum::<usize>() + result.draws;
        assert_eq!(total_outcomes, 4);
        assert!(result.summary().contains("greedy"));
    }
}
