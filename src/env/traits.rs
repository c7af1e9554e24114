//! Core environment trait and the value types observations are made of.
//!
//! Every task environment implements the [`Environment`] trait so that the
//! rollout drivers can interact with it uniformly. Environments used under
//! tree or beam search must additionally be cloneable through an injected
//! clone function (see the driver constructors) -- the engine never assumes a
//! universal deep copy exists.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Messages and tools
// ---------------------------------------------------------------------------

/// A single message in an observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message author: `"system"`, `"user"`, or `"assistant"`.
    pub role: String,
    /// The textual content of the message.
    pub content: String,
}

impl Message {
    /// Convenience constructor for a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Convenience constructor for a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Convenience constructor for an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A capability descriptor handed to the agent at the start of an episode.
///
/// The environment decides which tools exist; the agent receives them in
/// [`crate::agent::Agent::init_state`] and may use them however its policy
/// sees fit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    /// Short identifier, e.g. `"advance"`.
    pub name: String,
    /// Human-readable description of what invoking the tool does.
    pub description: String,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Step outcome
// ---------------------------------------------------------------------------

/// The result of applying one action to an environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvStep {
    /// The messages the agent sees after the action.
    pub observation: Vec<Message>,
    /// The scalar reward for the transition that produced this observation.
    pub reward: f64,
    /// Whether the episode reached a terminal state.
    pub done: bool,
    /// Whether the episode was cut off by the environment (e.g. a step cap).
    pub truncated: bool,
}

// ---------------------------------------------------------------------------
// Environment trait
// ---------------------------------------------------------------------------

/// The core environment trait.
///
/// All task environments implement this trait so that the rollout drivers can
/// drive episodes in a uniform fashion.
#[async_trait]
pub trait Environment: Send {
    /// The action type this environment accepts. Ties the environment to an
    /// agent producing the same type.
    type Action: Clone + Send + Sync + 'static;

    /// Reset the environment to the start of a fresh episode.
    ///
    /// Returns the initial observation and the tools available this episode.
    async fn reset(&mut self) -> Result<(Vec<Message>, Vec<Tool>)>;

    /// Apply an action and return the resulting observation, reward, and
    /// termination flags.
    async fn step(&mut self, action: &Self::Action) -> Result<EnvStep>;
}
