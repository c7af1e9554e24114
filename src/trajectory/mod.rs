//! Trajectory data structures: transitions, linear trajectories, and the
//! branching transition tree.
//!
//! This module provides:
//! - [`types::Transition`], [`types::Trajectory`] -- the immutable records of
//!   what happened during sampling, plus JSONL boundary io and discounted
//!   return helpers.
//! - [`tree::TransitionTree`] -- the branching structure built by tree
//!   search, addressed by colon-separated path ids, with Monte-Carlo value
//!   backup.

pub mod tree;
pub mod types;

// Re-export the most commonly used items at the module level.
pub use tree::TransitionTree;
pub use types::{Trajectory, Transition, discounted_returns};
