//! Client-side replication: one full copy of the game plus the filters that
//! decide whether a snapshot arriving from the relay overwrites it.
//!
//! The sync phase is the protocol's state machine. A local edit holds
//! `LocalChange` from the moment the engine is invoked until a short settle
//! window after the envelope is emitted; an applied remote snapshot holds
//! `ApplyingRemote` for its own settle window. Snapshots arriving inside either
//! window are dropped unless they carry the priority flag.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::engine::clock::Clock;
use crate::engine::models::{ActionIdGen, StateEnvelope};
use crate::engine::plugin::GamePlugin;
use crate::relay::processed::ProcessedActions;

#[derive(Debug, Clone)]
pub struct ReplicaSettings {
    /// Trailing delay after a local emission before remote snapshots are accepted again.
    pub local_settle_ms: u64,
    /// Delay after applying a remote snapshot before the next one is accepted.
    pub remote_settle_ms: u64,
    pub processed_cap: usize,
    pub processed_keep: usize,
}

impl Default for ReplicaSettings {
    fn default() -> Self {
        Self {
            local_settle_ms: 100,
            remote_settle_ms: 50,
            processed_cap: 100,
            processed_keep: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    ApplyingRemote { until: u64 },
    /// `until` is unset while the engine call is still running.
    LocalChange { until: Option<u64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    ApplyingRemote,
    AlreadyProcessed,
    OwnEcho,
    LocalChange,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    Applied,
    Ignored(IgnoreReason),
}

pub struct ReplicaClient<P: GamePlugin> {
    plugin: P,
    clock: Arc<dyn Clock>,
    settings: ReplicaSettings,
    state: P::State,
    player_index: Option<usize>,
    phase: SyncPhase,
    processed: ProcessedActions,
    /// Ids this replica emitted. Their relay echoes are commit acknowledgments.
    emitted: ProcessedActions,
    ids: ActionIdGen,
    rng: StdRng,
}

impl<P: GamePlugin> ReplicaClient<P> {
    pub fn new(
        plugin: P,
        client_id: impl Into<String>,
        initial: P::State,
        clock: Arc<dyn Clock>,
        settings: ReplicaSettings,
        seed: u64,
    ) -> Self {
        let processed = ProcessedActions::new(settings.processed_cap, settings.processed_keep);
        let emitted = ProcessedActions::new(settings.processed_cap, settings.processed_keep);
        Self {
            plugin,
            clock,
            settings,
            state: initial,
            player_index: None,
            phase: SyncPhase::Idle,
            processed,
            emitted,
            ids: ActionIdGen::new(client_id),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn plugin(&self) -> &P {
        &self.plugin
    }

    pub fn state(&self) -> &P::State {
        &self.state
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn client_id(&self) -> &str {
        self.ids.client_id()
    }

    pub fn player_index(&self) -> Option<usize> {
        self.player_index
    }

    /// Seat assigned by the relay's `RoomJoined`.
    pub fn set_player_index(&mut self, index: Option<usize>) {
        self.player_index = index;
    }

    /// Whether `action_id` was emitted by this replica and is still remembered.
    pub fn is_own(&self, action_id: &str) -> bool {
        self.emitted.contains(action_id)
    }

    /// Expire a finished settle window.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();
        let expired = match self.phase {
            SyncPhase::Idle => false,
            SyncPhase::ApplyingRemote { until } => now >= until,
            SyncPhase::LocalChange { until } => until.is_some_and(|u| now >= u),
        };
        if expired {
            self.phase = SyncPhase::Idle;
        }
    }

    /// Run a local action through the engine under the local-change guard.
    ///
    /// Returns the envelope to send to the relay, or `None` when the engine
    /// rejected the action (the state is left as it was).
    pub fn perform_local(&mut self, action: &P::Action) -> Option<StateEnvelope<P::State>> {
        self.tick();
        let player = self.player_index?;
        let previous = self.phase;
        self.phase = SyncPhase::LocalChange { until: None };

        let Some(next) = self
            .plugin
            .try_apply(&self.state, player, action, &mut self.rng)
        else {
            self.phase = previous;
            return None;
        };

        let action_id = self.ids.next_id();
        let now = self.clock.now_ms();
        self.state = next;
        self.emitted.insert(&action_id);
        let envelope = StateEnvelope {
            state: self.state.clone(),
            timestamp: now,
            action_id: Some(action_id),
            is_priority_update: self.plugin.is_priority(action),
        };
        self.phase = SyncPhase::LocalChange {
            until: Some(now + self.settings.local_settle_ms),
        };
        Some(envelope)
    }

    fn filter(&self, action_id: Option<&str>) -> Option<IgnoreReason> {
        if matches!(self.phase, SyncPhase::ApplyingRemote { .. }) {
            return Some(IgnoreReason::ApplyingRemote);
        }
        if let Some(id) = action_id {
            if self.processed.contains(id) {
                return Some(IgnoreReason::AlreadyProcessed);
            }
        }
        if matches!(self.phase, SyncPhase::LocalChange { .. }) {
            return Some(IgnoreReason::LocalChange);
        }
        None
    }

    /// Decide whether a relayed snapshot replaces local state.
    pub fn receive(&mut self, envelope: StateEnvelope<P::State>) -> Acceptance {
        self.tick();
        let action_id = envelope.action_id.as_deref();

        // An echo of our own emission never replaces local state, even a
        // priority one: local state already includes it and possibly later moves.
        if action_id.is_some_and(|id| self.emitted.contains(id)) {
            tracing::trace!(client = self.client_id(), action_id, "own echo");
            return Acceptance::Ignored(IgnoreReason::OwnEcho);
        }

        if !envelope.is_priority_update {
            if let Some(reason) = self.filter(action_id) {
                tracing::trace!(client = self.client_id(), action_id, ?reason, "ignored snapshot");
                return Acceptance::Ignored(reason);
            }
        }

        if let Some(id) = action_id {
            self.processed.insert(id);
        }

        if !envelope.is_priority_update
            && self.plugin.important_view(&envelope.state) == self.plugin.important_view(&self.state)
        {
            return Acceptance::Ignored(IgnoreReason::Unchanged);
        }

        tracing::debug!(
            client = self.client_id(),
            action_id,
            priority = envelope.is_priority_update,
            "applied remote snapshot"
        );
        self.apply_remote(envelope.state);
        Acceptance::Applied
    }

    /// Snapshot handed over directly by a peer during resync. Skips every filter.
    pub fn receive_provided(&mut self, envelope: StateEnvelope<P::State>) -> Acceptance {
        tracing::debug!(client = self.client_id(), "applied provided snapshot");
        if let Some(id) = envelope.action_id.as_deref() {
            self.processed.insert(id);
        }
        self.apply_remote(envelope.state);
        Acceptance::Applied
    }

    fn apply_remote(&mut self, state: P::State) {
        self.state = state;
        self.phase = SyncPhase::ApplyingRemote {
            until: self.clock.now_ms() + self.settings.remote_settle_ms,
        };
    }

    /// Answer a peer's `GameStateRequested` with the current local state.
    pub fn provide_state(&self) -> StateEnvelope<P::State> {
        StateEnvelope {
            state: self.state.clone(),
            timestamp: self.clock.now_ms(),
            action_id: None,
            is_priority_update: false,
        }
    }

    /// Prepare for a reconnect: drop any settle window so the next provided or
    /// synced snapshot is taken as is.
    pub fn resync_request(&mut self) {
        self.phase = SyncPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::clock::ManualClock;
    use crate::games::azul::plugin::{AzulAction, AzulPlugin};
    use crate::games::azul::types::{GameState, PlacementDestination, TileSource};

    fn pair() -> (ReplicaClient<AzulPlugin>, ReplicaClient<AzulPlugin>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(10_000));
        let mut rng = StdRng::seed_from_u64(5);
        let initial = AzulPlugin.create_initial_state(&mut rng);
        let mut a = ReplicaClient::new(
            AzulPlugin,
            "c0",
            initial.clone(),
            clock.clone(),
            ReplicaSettings::default(),
            1,
        );
        let mut b = ReplicaClient::new(
            AzulPlugin,
            "c1",
            initial,
            clock.clone(),
            ReplicaSettings::default(),
            2,
        );
        a.set_player_index(Some(0));
        b.set_player_index(Some(1));
        (a, b, clock)
    }

    fn draw_first() -> AzulAction {
        AzulAction::Draw {
            source: TileSource::Factory(0),
        }
    }

    fn snapshot(state: GameState, id: &str, priority: bool) -> StateEnvelope<GameState> {
        StateEnvelope {
            state,
            timestamp: 0,
            action_id: Some(id.into()),
            is_priority_update: priority,
        }
    }

    #[test]
    fn test_local_action_emits_envelope() {
        let (mut a, _, clock) = pair();
        let env = a.perform_local(&draw_first()).unwrap();
        assert_eq!(env.action_id.as_deref(), Some("c0-1"));
        assert!(!env.is_priority_update);
        assert_eq!(env.timestamp, 10_000);
        assert_eq!(&env.state, a.state());
        assert_eq!(a.phase(), SyncPhase::LocalChange { until: Some(10_100) });

        clock.advance(100);
        a.tick();
        assert_eq!(a.phase(), SyncPhase::Idle);
    }

    #[test]
    fn test_rejected_local_action_is_noop() {
        let (mut a, mut b, _) = pair();
        let before = b.state().clone();
        assert!(b.perform_local(&draw_first()).is_none());
        assert_eq!(b.state(), &before);
        assert_eq!(b.phase(), SyncPhase::Idle);

        a.set_player_index(None);
        assert!(a.perform_local(&draw_first()).is_none());
    }

    #[test]
    fn test_peer_applies_then_ignores_duplicate() {
        let (mut a, mut b, clock) = pair();
        let env = a.perform_local(&draw_first()).unwrap();

        assert_eq!(b.receive(env.clone()), Acceptance::Applied);
        assert_eq!(b.state(), a.state());

        clock.advance(1_000);
        assert_eq!(
            b.receive(env),
            Acceptance::Ignored(IgnoreReason::AlreadyProcessed)
        );
    }

    #[test]
    fn test_own_echo_ignored() {
        let (mut a, _, clock) = pair();
        let env = a.perform_local(&draw_first()).unwrap();
        clock.advance(1_000);
        assert_eq!(a.receive(env), Acceptance::Ignored(IgnoreReason::OwnEcho));
    }

    #[test]
    fn test_late_echoes_never_roll_back_local_moves() {
        let (mut a, _, clock) = pair();
        let first = a.perform_local(&draw_first()).unwrap();
        a.perform_local(&AzulAction::SelectColor { slot: 0 }).unwrap();
        let last = a
            .perform_local(&AzulAction::Place {
                destination: PlacementDestination::Floor,
            })
            .unwrap();
        let local = a.state().clone();

        // Both echoes land after the local settle window has expired.
        clock.advance(160);
        assert_eq!(a.receive(first), Acceptance::Ignored(IgnoreReason::OwnEcho));
        assert_eq!(a.receive(last), Acceptance::Ignored(IgnoreReason::OwnEcho));
        assert_eq!(a.state(), &local);
        assert_eq!(a.phase(), SyncPhase::Idle);
        assert!(a.is_own("c0-1") && a.is_own("c0-3"));
    }

    #[test]
    fn test_own_priority_echo_is_not_reapplied() {
        let (mut a, _, clock) = pair();
        let env = a.perform_local(&draw_first()).unwrap();
        let local = a.state().clone();
        let mut stale = env.state.clone();
        stale.players[0].score = 40;

        clock.advance(1_000);
        assert_eq!(
            a.receive(snapshot(stale, "c0-1", true)),
            Acceptance::Ignored(IgnoreReason::OwnEcho)
        );
        assert_eq!(a.state(), &local);
    }

    #[test]
    fn test_snapshot_during_local_change_ignored() {
        let (mut a, _, clock) = pair();
        a.perform_local(&draw_first()).unwrap();
        let mut other = a.state().clone();
        other.players[1].score = 9;

        clock.advance(50);
        assert_eq!(
            a.receive(snapshot(other.clone(), "c1-1", false)),
            Acceptance::Ignored(IgnoreReason::LocalChange)
        );
        // Priority wins regardless.
        assert_eq!(a.receive(snapshot(other, "c1-2", true)), Acceptance::Applied);
        assert_eq!(a.state().players[1].score, 9);
    }

    #[test]
    fn test_back_to_back_remote_snapshots() {
        let (_, mut b, clock) = pair();
        let mut first = b.state().clone();
        first.players[0].score = 1;
        let mut second = first.clone();
        second.players[0].score = 2;

        assert_eq!(b.receive(snapshot(first, "c0-1", false)), Acceptance::Applied);
        assert_eq!(
            b.receive(snapshot(second.clone(), "c0-2", false)),
            Acceptance::Ignored(IgnoreReason::ApplyingRemote)
        );
        clock.advance(50);
        assert_eq!(b.receive(snapshot(second, "c0-3", false)), Acceptance::Applied);
    }

    #[test]
    fn test_unimportant_difference_skipped() {
        let (_, mut b, _) = pair();
        let mut cosmetic = b.state().clone();
        cosmetic.tile_bag.reverse();
        assert_eq!(
            b.receive(snapshot(cosmetic, "c0-1", false)),
            Acceptance::Ignored(IgnoreReason::Unchanged)
        );
        assert_eq!(b.phase(), SyncPhase::Idle);
    }

    #[test]
    fn test_provided_snapshot_skips_filters() {
        let (mut a, mut b, _) = pair();
        let env = a.perform_local(&draw_first()).unwrap();
        assert_eq!(b.receive(env), Acceptance::Applied);
        assert!(matches!(b.phase(), SyncPhase::ApplyingRemote { .. }));

        let mut provided = a.provide_state();
        assert_eq!(provided.action_id, None);
        provided.state.players[0].score = 3;
        b.resync_request();
        assert_eq!(b.receive_provided(provided), Acceptance::Applied);
        assert_eq!(b.state().players[0].score, 3);
    }
}
