//! Canopy: concurrent rollout and tree-search sampling for agent-environment
//! interaction.
//!
//! The engine records multi-step interactions between a decision-making agent
//! and a stateful environment as structured trajectories, and can explore
//! many continuations of one interaction as a tree rather than a single
//! linear path. Three drivers share one step primitive:
//!
//! - [`rollout::RolloutManager`] -- independent linear trajectories, one per
//!   environment, all progressing concurrently.
//! - [`rollout::TreeSearchRollout`] -- branching exploration under a global
//!   concurrency cap, with early stop on a reward target and Monte-Carlo
//!   value backup over the resulting [`trajectory::TransitionTree`].
//! - [`rollout::BeamSearchRollout`] -- width-bounded, score-guided
//!   exploration with injected environment/agent-state clone functions.
//!
//! Agents and environments are external collaborators seen only through the
//! [`agent::Agent`] and [`env::Environment`] traits; observers subscribe
//! through [`rollout::Callback`].

pub mod agent;
pub mod config;
pub mod env;
pub mod error;
pub mod rollout;
pub mod trajectory;
