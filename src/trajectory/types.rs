//! Core trajectory data types used throughout the sampling engine.
//!
//! A [`Transition`] records one agent-environment interaction step; a
//! [`Trajectory`] is an ordered chain of transitions sharing one path through
//! an episode. Both are generic over the agent's opaque state type `S` and
//! action type `A`, so the engine never inspects either.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::env::Message;

// ---------------------------------------------------------------------------
// Single transition
// ---------------------------------------------------------------------------

/// One recorded step of agent-environment interaction.
///
/// Immutable once constructed, with a single exception: `value` is written
/// exactly once by [`crate::trajectory::TransitionTree::assign_mc_value_estimates`].
/// Each transition owns its own state snapshots, so concurrent branches never
/// alias agent state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition<S, A> {
    /// Zero-based position of this step within its trajectory.
    pub timestep: usize,
    /// Agent state before the step.
    pub agent_state: S,
    /// Agent state after the step. Consumed as `agent_state` by the successor
    /// step on the same path.
    pub next_agent_state: S,
    /// Messages seen before acting; `None` means no observation was recorded.
    pub observation: Option<Vec<Message>>,
    /// Messages seen after acting.
    pub next_observation: Option<Vec<Message>>,
    /// The action the agent chose, opaque to the engine.
    pub action: Option<A>,
    /// Scalar reward for this step.
    pub reward: f64,
    /// Whether the environment reached a terminal state.
    pub done: bool,
    /// Whether the environment cut the episode off.
    pub truncated: bool,
    /// Monte-Carlo value estimate. `None` until the tree's one-time
    /// value-assignment pass.
    pub value: Option<f64>,
}

// ---------------------------------------------------------------------------
// Trajectory
// ---------------------------------------------------------------------------

/// An ordered sequence of transitions recording one linear rollout.
///
/// Append-only while a driver is sampling; treated as immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory<S, A> {
    /// Identifier: a fresh UUID for linear rollouts, the leaf path id for
    /// trajectories extracted from a transition tree.
    pub traj_id: String,
    /// The recorded steps, in timestep order.
    pub steps: Vec<Transition<S, A>>,
}

impl<S, A> Trajectory<S, A> {
    /// Create an empty trajectory with the given id.
    pub fn new(traj_id: impl Into<String>) -> Self {
        Self {
            traj_id: traj_id.into(),
            steps: Vec::new(),
        }
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether any steps have been recorded.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether the final step ended the episode (terminal or truncated).
    pub fn is_done(&self) -> bool {
        self.steps
            .last()
            .map(|step| step.done || step.truncated)
            .unwrap_or(false)
    }

    /// Total accumulated reward over the trajectory.
    pub fn total_reward(&self) -> f64 {
        self.steps.iter().map(|step| step.reward).sum()
    }

    /// Discounted return at every step of this trajectory.
    pub fn discounted_returns(&self, discount: f64) -> Vec<f64> {
        let rewards: Vec<f64> = self.steps.iter().map(|step| step.reward).collect();
        let dones: Vec<bool> = self.steps.iter().map(|step| step.done).collect();
        discounted_returns(&rewards, &dones, discount)
    }
}

impl<S, A> Trajectory<S, A>
where
    S: Serialize + DeserializeOwned,
    A: Serialize + DeserializeOwned,
{
    /// Persist this trajectory as JSONL: a header line carrying the id,
    /// followed by one line per step.
    ///
    /// The on-disk format is a boundary helper only; downstream consumers own
    /// their own schemas.
    pub fn to_jsonl(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut lines = Vec::with_capacity(self.steps.len() + 1);
        lines.push(serde_json::to_string(
            &serde_json::json!({ "traj_id": &self.traj_id }),
        )?);
        for step in &self.steps {
            lines.push(serde_json::to_string(step)?);
        }

        let path = path.as_ref();
        std::fs::write(path, lines.join("\n") + "\n")
            .with_context(|| format!("failed to write trajectory to {}", path.display()))
    }

    /// Rehydrate a trajectory previously written by [`Self::to_jsonl`].
    pub fn from_jsonl(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read trajectory from {}", path.display()))?;

        let mut lines = text.lines().filter(|line| !line.trim().is_empty());
        let header: serde_json::Value = serde_json::from_str(
            lines.next().context("trajectory file is empty")?,
        )?;
        let traj_id = header
            .get("traj_id")
            .and_then(|v| v.as_str())
            .context("trajectory header is missing `traj_id`")?
            .to_string();

        let steps = lines
            .map(serde_json::from_str)
            .collect::<Result<Vec<_>, _>>()
            .context("failed to parse trajectory step")?;

        Ok(Self { traj_id, steps })
    }
}

// ---------------------------------------------------------------------------
// Discounted returns
// ---------------------------------------------------------------------------

/// Compute the discounted return at every step of a reward sequence.
///
/// A terminal step contributes only its own reward; the return accumulated
/// after it does not leak backwards across the episode boundary.
pub fn discounted_returns(rewards: &[f64], dones: &[bool], discount: f64) -> Vec<f64> {
    let mut returns = vec![0.0; rewards.len()];
    let mut running = 0.0;
    for i in (0..rewards.len()).rev() {
        if dones.get(i).copied().unwrap_or(false) {
            running = 0.0;
        }
        running = rewards[i] + discount * running;
        returns[i] = running;
    }
    returns
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::CounterState;

    fn step(timestep: usize, reward: f64, done: bool) -> Transition<CounterState, String> {
        Transition {
            timestep,
            agent_state: CounterState {
                count: timestep as f64,
            },
            next_agent_state: CounterState {
                count: timestep as f64 + 1.0,
            },
            observation: Some(vec![Message::user(format!("{timestep}"))]),
            next_observation: Some(vec![Message::user(format!("{}", timestep + 1))]),
            action: Some("advance".to_string()),
            reward,
            done,
            truncated: false,
            value: None,
        }
    }

    #[test]
    fn reward_and_termination_helpers() {
        let mut traj = Trajectory::new("t0");
        assert!(traj.is_empty());
        assert!(!traj.is_done());

        traj.steps.push(step(0, 1.0, false));
        traj.steps.push(step(1, 0.5, true));

        assert_eq!(traj.len(), 2);
        assert!(traj.is_done());
        assert!((traj.total_reward() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn discounted_returns_accumulate_backwards() {
        let returns = discounted_returns(&[1.0, 1.0, 1.0], &[false, false, true], 0.9);
        assert!((returns[2] - 1.0).abs() < 1e-12);
        assert!((returns[1] - 1.9).abs() < 1e-12);
        assert!((returns[0] - 2.71).abs() < 1e-12);
    }

    #[test]
    fn discounted_returns_reset_at_episode_boundaries() {
        let returns = discounted_returns(&[1.0, 2.0], &[true, false], 0.5);
        assert!((returns[0] - 1.0).abs() < 1e-12);
        assert!((returns[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn jsonl_round_trip_preserves_identity_and_steps() {
        let mut traj = Trajectory::new("round-trip");
        traj.steps.push(step(0, 0.0, false));
        traj.steps.push(step(1, 1.0, true));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traj.jsonl");
        traj.to_jsonl(&path).unwrap();

        let rehydrated: Trajectory<CounterState, String> =
            Trajectory::from_jsonl(&path).unwrap();
        assert_eq!(rehydrated.traj_id, traj.traj_id);
        assert_eq!(rehydrated.len(), traj.len());
        assert_eq!(rehydrated.steps[1].reward, 1.0);
        assert!(rehydrated.steps[1].done);
    }
}
