//! Linear trajectory sampling across many environments concurrently.
//!
//! The [`RolloutManager`] drives one independent trajectory per supplied
//! environment: reset the environment and the agent state, then repeatedly
//! ask the agent for an action, apply it, and record the transition until the
//! episode terminates or the step budget runs out. All environments progress
//! concurrently as cooperative tasks; none of them shares agent state or an
//! environment instance with another.

use std::sync::Arc;

use futures::future::try_join_all;
use uuid::Uuid;

use super::{Callbacks, step_once};
use crate::agent::Agent;
use crate::config::RolloutConfig;
use crate::env::Environment;
use crate::error::RolloutError;
use crate::trajectory::Trajectory;

/// Samples independent linear trajectories, one per environment.
pub struct RolloutManager<Ag: Agent> {
    agent: Arc<Ag>,
    config: RolloutConfig,
    callbacks: Callbacks<Ag::State, Ag::Action>,
}

impl<Ag: Agent> RolloutManager<Ag> {
    /// Create a manager around an agent.
    pub fn new(agent: Ag, config: RolloutConfig) -> Self {
        Self {
            agent: Arc::new(agent),
            config,
            callbacks: Vec::new(),
        }
    }

    /// Register the ordered observer list. Callbacks are fired at every
    /// notification point, in this order.
    pub fn with_callbacks(mut self, callbacks: Callbacks<Ag::State, Ag::Action>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Sample one trajectory per environment, all progressing concurrently.
    ///
    /// A trajectory stops at the first terminal or truncated transition, or
    /// after `max_steps` steps when a budget is given. With failure catching
    /// enabled, a failing agent or environment call ends only its own
    /// trajectory (returned with its partial steps); otherwise the first
    /// failure aborts the whole call.
    pub async fn sample_trajectories<E>(
        &self,
        environments: Vec<E>,
        max_steps: Option<usize>,
    ) -> Result<Vec<Trajectory<Ag::State, Ag::Action>>, RolloutError>
    where
        E: Environment<Action = Ag::Action>,
    {
        let rollouts = environments
            .into_iter()
            .map(|env| self.sample_one(env, max_steps));
        try_join_all(rollouts).await
    }

    /// Run a single environment to completion.
    async fn sample_one<E>(
        &self,
        mut env: E,
        max_steps: Option<usize>,
    ) -> Result<Trajectory<Ag::State, Ag::Action>, RolloutError>
    where
        E: Environment<Action = Ag::Action>,
    {
        let traj_id = Uuid::new_v4().to_string();
        let mut trajectory = Trajectory::new(traj_id.clone());

        let (mut observation, tools) = match env.reset().await {
            Ok(reset) => reset,
            Err(cause) if self.config.catch_env_failures => {
                tracing::warn!(traj_id = %traj_id, error = %cause, "environment failed on reset");
                return Ok(trajectory);
            }
            Err(cause) => return Err(RolloutError::Env { traj_id, cause }),
        };

        let mut agent_state = match self.agent.init_state(&tools).await {
            Ok(state) => state,
            Err(cause) if self.config.catch_agent_failures => {
                tracing::warn!(traj_id = %traj_id, error = %cause, "agent failed to initialise state");
                return Ok(trajectory);
            }
            Err(cause) => return Err(RolloutError::Agent { traj_id, cause }),
        };

        let mut timestep = 0usize;
        loop {
            if max_steps.is_some_and(|budget| timestep >= budget) {
                break;
            }

            let transition = match step_once(
                &traj_id,
                self.agent.as_ref(),
                &mut env,
                &agent_state,
                &observation,
                timestep,
                &self.callbacks,
            )
            .await
            {
                Ok(transition) => transition,
                Err(err) if self.config.catches(&err) => {
                    tracing::warn!(traj_id = %traj_id, error = %err, "step failed, ending trajectory early");
                    break;
                }
                Err(err) => return Err(err),
            };

            agent_state = transition.next_agent_state.clone();
            observation = transition.next_observation.clone().unwrap_or_default();
            let finished = transition.done || transition.truncated;
            trajectory.steps.push(transition);
            timestep += 1;
            if finished {
                break;
            }
        }

        tracing::debug!(
            traj_id = %traj_id,
            steps = trajectory.len(),
            reward = trajectory.total_reward(),
            "sampled trajectory"
        );
        Ok(trajectory)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use anyhow::{Result, bail};
    use async_trait::async_trait;

    use super::*;
    use crate::agent::{CounterState, ScriptedAgent};
    use crate::env::{CountingEnv, EnvStep, Message, Tool};
    use crate::rollout::callbacks::testing::CountingCallback;

    #[tokio::test]
    async fn deterministic_rollout_does_not_clobber_states() {
        let manager = RolloutManager::new(ScriptedAgent::default(), RolloutConfig::default());
        let trajectories = manager
            .sample_trajectories(vec![CountingEnv::new()], None)
            .await
            .unwrap();

        let traj = &trajectories[0];
        assert_eq!(traj.len(), 3);
        for (i, step) in traj.steps.iter().enumerate() {
            let count = i as f64;
            assert_eq!(step.timestep, i);
            assert_eq!(step.agent_state.count, count);
            assert_eq!(step.next_agent_state.count, count + 1.0);
            assert_eq!(
                step.observation.as_ref().unwrap()[0].content,
                format!("{count}")
            );
            assert_eq!(
                step.next_observation.as_ref().unwrap()[0].content,
                format!("{}", count + 1.0)
            );
        }
    }

    #[tokio::test]
    async fn every_environment_yields_a_full_length_trajectory() {
        let callback = Arc::new(CountingCallback::default());
        let callbacks: Callbacks<CounterState, String> = vec![callback.clone()];
        let manager = RolloutManager::new(ScriptedAgent::default(), RolloutConfig::default())
            .with_callbacks(callbacks);

        let environments = vec![
            CountingEnv::new().with_limit(100.0),
            CountingEnv::new().with_limit(100.0),
        ];
        let trajectories = manager
            .sample_trajectories(environments, Some(4))
            .await
            .unwrap();

        assert_eq!(trajectories.len(), 2);
        assert!(trajectories.iter().all(|traj| traj.len() == 4));

        // Each callback point fired exactly once per transition.
        assert_eq!(callback.counts(), [8, 8, 8, 8]);
    }

    #[tokio::test]
    async fn trajectory_ids_are_unique() {
        let manager = RolloutManager::new(ScriptedAgent::default(), RolloutConfig::default());
        let trajectories = manager
            .sample_trajectories(vec![CountingEnv::new(), CountingEnv::new()], Some(1))
            .await
            .unwrap();
        assert_ne!(trajectories[0].traj_id, trajectories[1].traj_id);
    }

    /// Fails on the `fail_at`-th step call.
    #[derive(Debug, Clone)]
    struct FlakyEnv {
        steps_taken: usize,
        fail_at: usize,
    }

    #[async_trait]
    impl Environment for FlakyEnv {
        type Action = String;

        async fn reset(&mut self) -> Result<(Vec<Message>, Vec<Tool>)> {
            self.steps_taken = 0;
            Ok((vec![Message::user("0")], Vec::new()))
        }

        async fn step(&mut self, _action: &String) -> Result<EnvStep> {
            self.steps_taken += 1;
            if self.steps_taken >= self.fail_at {
                bail!("environment blew up");
            }
            Ok(EnvStep {
                observation: vec![Message::user(format!("{}", self.steps_taken))],
                reward: 0.0,
                done: false,
                truncated: false,
            })
        }
    }

    #[tokio::test]
    async fn caught_env_failure_returns_the_partial_trajectory() {
        let manager = RolloutManager::new(ScriptedAgent::default(), RolloutConfig::default());
        let env = FlakyEnv {
            steps_taken: 0,
            fail_at: 3,
        };
        let trajectories = manager
            .sample_trajectories(vec![env], Some(10))
            .await
            .unwrap();

        // Two good steps before the third blew up.
        assert_eq!(trajectories.len(), 1);
        assert_eq!(trajectories[0].len(), 2);
    }

    #[tokio::test]
    async fn uncaught_env_failure_aborts_the_call() {
        let config = RolloutConfig {
            catch_agent_failures: false,
            catch_env_failures: false,
        };
        let manager = RolloutManager::new(ScriptedAgent::default(), config);
        let env = FlakyEnv {
            steps_taken: 0,
            fail_at: 1,
        };

        let result = manager.sample_trajectories(vec![env], Some(10)).await;
        assert!(matches!(result, Err(RolloutError::Env { .. })));
    }
}
