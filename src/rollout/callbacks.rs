//! Observer callbacks invoked by every driver at fixed points.
//!
//! A [`Callback`] is notified at four points per transition:
//! `before_transition` (before the agent is consulted), `after_agent_get_asv`
//! (after action selection), `after_env_step` (after the environment applied
//! the action), and `after_transition` (after the transition is assembled).
//! Every point defaults to a no-op; concrete observers implement whatever
//! subset they care about.
//!
//! Drivers await each registered callback, in registration order, before
//! proceeding -- observers therefore see a consistent, race-free view of the
//! just-produced data. Callbacks are observation only: nothing they do may
//! influence which action is taken next.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::env::Message;
use crate::trajectory::Transition;

/// The observer interface, generic over the agent's state and action types.
#[async_trait]
pub trait Callback<S: Send + Sync, A: Send + Sync>: Send + Sync {
    /// Before the agent is queried for a step of trajectory `traj_id`.
    async fn before_transition(
        &self,
        _traj_id: &str,
        _agent_state: &S,
        _observation: Option<&[Message]>,
    ) {
    }

    /// After the agent selected an action.
    async fn after_agent_get_asv(
        &self,
        _traj_id: &str,
        _action: &A,
        _next_agent_state: &S,
        _value_estimate: f64,
    ) {
    }

    /// After the environment applied the action.
    async fn after_env_step(
        &self,
        _traj_id: &str,
        _observation: &[Message],
        _reward: f64,
        _done: bool,
        _truncated: bool,
    ) {
    }

    /// After the transition record was assembled.
    async fn after_transition(&self, _traj_id: &str, _transition: &Transition<S, A>) {}
}

// ---------------------------------------------------------------------------
// Logging observer
// ---------------------------------------------------------------------------

/// Emits a structured tracing line per completed transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCallback;

#[async_trait]
impl<S: Send + Sync, A: Send + Sync> Callback<S, A> for LoggingCallback {
    async fn after_transition(&self, traj_id: &str, transition: &Transition<S, A>) {
        tracing::info!(
            traj_id,
            timestep = transition.timestep,
            reward = transition.reward,
            done = transition.done,
            truncated = transition.truncated,
            "transition recorded"
        );
    }
}

// ---------------------------------------------------------------------------
// Metrics observer
// ---------------------------------------------------------------------------

/// Snapshot of the running aggregate kept by [`MeanMetricsCallback`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsAggregate {
    /// Transitions observed so far.
    pub transitions: usize,
    /// Sum of per-transition rewards.
    pub total_reward: f64,
    /// Transitions that ended their trajectory (done or truncated).
    pub terminals: usize,
}

impl MetricsAggregate {
    /// Mean reward per transition (0.0 before anything was observed).
    pub fn mean_reward(&self) -> f64 {
        if self.transitions == 0 {
            0.0
        } else {
            self.total_reward / self.transitions as f64
        }
    }
}

/// Aggregates mean reward and terminal counts across every transition any
/// driver produces.
#[derive(Debug, Default)]
pub struct MeanMetricsCallback {
    inner: Mutex<MetricsAggregate>,
}

impl MeanMetricsCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the current aggregate.
    pub fn snapshot(&self) -> MetricsAggregate {
        *self.guard()
    }

    fn guard(&self) -> MutexGuard<'_, MetricsAggregate> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<S: Send + Sync, A: Send + Sync> Callback<S, A> for MeanMetricsCallback {
    async fn after_transition(&self, _traj_id: &str, transition: &Transition<S, A>) {
        let mut metrics = self.guard();
        metrics.transitions += 1;
        metrics.total_reward += transition.reward;
        if transition.done || transition.truncated {
            metrics.terminals += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------
