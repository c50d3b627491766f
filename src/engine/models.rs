//! Core replication data types shared by the relay and the replica clients.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Identifier of one relay connection (one client stream).
pub type ConnectionId = String;

/// A replicated state update: a full snapshot tagged for deduplication.
///
/// On the JSON wire the state's own fields sit next to the envelope metadata,
/// so a snapshot of `S` reads as `{...state, timestamp, action_id, is_priority_update}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEnvelope<S = serde_json::Value> {
    #[serde(flatten)]
    pub state: S,
    /// Milliseconds since epoch at emission. Informational only.
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default)]
    pub is_priority_update: bool,
}

impl<S: Serialize> StateEnvelope<S> {
    /// Erase the state type for transport through the relay.
    pub fn to_json(&self) -> Result<StateEnvelope, serde_json::Error> {
        Ok(StateEnvelope {
            state: serde_json::to_value(&self.state)?,
            timestamp: self.timestamp,
            action_id: self.action_id.clone(),
            is_priority_update: self.is_priority_update,
        })
    }
}

impl StateEnvelope {
    /// Recover a typed envelope from one that came off the relay.
    pub fn decode<S: DeserializeOwned>(self) -> Result<StateEnvelope<S>, serde_json::Error> {
        Ok(StateEnvelope {
            state: serde_json::from_value(self.state)?,
            timestamp: self.timestamp,
            action_id: self.action_id,
            is_priority_update: self.is_priority_update,
        })
    }
}

/// Per-sender action id generator. Ids look like `"{client}-{seq}"` and never repeat
/// for a given client id.
#[derive(Debug, Clone)]
pub struct ActionIdGen {
    client_id: String,
    next_seq: u64,
}

impl ActionIdGen {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            next_seq: 1,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("{}-{}", self.client_id, self.next_seq);
        self.next_seq += 1;
        id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameConfig {
    pub random_seed: Option<u64>,
}

impl GameConfig {
    /// Seeded generator when a seed is set, otherwise one drawn from OS entropy.
    pub fn rng(&self) -> StdRng {
        match self.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameResult {
    /// Seat indices of the winners; more than one on a tie.
    pub winners: Vec<usize>,
    pub final_scores: Vec<f64>,
    #[serde(default = "default_reason")]
    pub reason: String,
}

fn default_reason() -> String {
    "normal".to_string()
}
