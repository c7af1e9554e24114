//! The agent capability set the rollout drivers rely on.
//!
//! The drivers only ever see this trait, which keeps them decoupled from any
//! concrete policy and makes it easy to supply scripted agents in tests. An
//! agent must be safe to call concurrently with independently derived state
//! values: the drivers hand every branch its own state snapshot and never
//! share one across tasks.

use anyhow::Result;
use async_trait::async_trait;

use crate::env::{Message, Tool};

/// A decision-making policy mapping an observation and internal state to an
/// action.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Opaque per-trajectory state the agent threads through its own steps.
    /// The drivers clone it when branching; implementations must not hide
    /// shared mutable state inside it.
    type State: Clone + Send + Sync + 'static;

    /// The action type the agent emits, matching the environment it is run
    /// against.
    type Action: Clone + Send + Sync + 'static;

    /// Build a fresh state for a new episode, given the tools the environment
    /// exposes.
    async fn init_state(&self, tools: &[Tool]) -> Result<Self::State>;

    /// Select an action.
    ///
    /// Returns the chosen action, the successor state, and the agent's own
    /// value estimate for the current state (surfaced to callbacks; the
    /// engine does not act on it).
    async fn get_asv(
        &self,
        state: &Self::State,
        observation: &[Message],
    ) -> Result<(Self::Action, Self::State, f64)>;
}
