//! Agent interface and the built-in scripted agent.
//!
//! The [`Agent`] trait is the only view the rollout drivers have of a policy;
//! [`ScriptedAgent`] is a deterministic implementation used by the demo CLI
//! and the test suite.

pub mod scripted;
pub mod traits;

// Re-export the primary types for convenient access.
pub use scripted::{CounterState, ScriptedAgent};
pub use traits::Agent;
