//! Width-bounded, score-guided beam search over many environments.
//!
//! For each starting environment the driver keeps at most `beam_width` live
//! beams. Every round, each live beam spawns `samples_per_beam` candidate
//! continuations -- each on its own environment clone and agent-state clone,
//! via the injected clone functions -- scores every candidate's
//! trajectory-so-far with the injected scoring function, and keeps only the
//! top `beam_width` (score descending, ties broken by stable spawn order).
//! Candidates that end their episode retire with their trajectory; rounds
//! stop at `max_steps` or when no live beam remains.

use std::cmp::Ordering;
use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use uuid::Uuid;

use super::tree_search::EnvCloneFn;
use super::{Callbacks, step_once};
use crate::agent::Agent;
use crate::config::BeamSearchConfig;
use crate::env::{Environment, Message};
use crate::error::RolloutError;
use crate::trajectory::Trajectory;

/// Clones an agent state for a new candidate. Injected because agent states
/// may hold resources that are not safely shareable across branches.
pub type AgentCloneFn<S> = Arc<dyn Fn(&S) -> S + Send + Sync>;

/// Scores a trajectory-so-far; higher is better. Must be a pure function of
/// the trajectory.
pub type ScoringFn<S, A> = Arc<dyn Fn(&Trajectory<S, A>) -> f64 + Send + Sync>;

/// One live candidate during beam search. Discarded once its round completes.
pub struct Beam<S, A, E> {
    /// This candidate's private environment clone.
    pub env: E,
    /// This candidate's private agent state.
    pub agent_state: S,
    /// The observation the next step will act on.
    pub observation: Vec<Message>,
    /// Steps accumulated so far.
    pub trajectory: Trajectory<S, A>,
    /// The scoring function's latest verdict on `trajectory`.
    pub score: f64,
}

/// Explores continuations of each environment, keeping only the best-scoring
/// candidates at each depth.
pub struct BeamSearchRollout<Ag: Agent, E> {
    agent: Arc<Ag>,
    env_clone_fn: EnvCloneFn<E>,
    agent_clone_fn: AgentCloneFn<Ag::State>,
    scoring_fn: ScoringFn<Ag::State, Ag::Action>,
    config: BeamSearchConfig,
    callbacks: Callbacks<Ag::State, Ag::Action>,
}

impl<Ag, E> BeamSearchRollout<Ag, E>
where
    Ag: Agent,
    E: Environment<Action = Ag::Action> + Sync,
{
    /// Create a beam-search driver around an agent, the two clone functions,
    /// and a scoring function.
    pub fn new(
        agent: Ag,
        env_clone_fn: impl Fn(&E) -> E + Send + Sync + 'static,
        agent_clone_fn: impl Fn(&Ag::State) -> Ag::State + Send + Sync + 'static,
        scoring_fn: impl Fn(&Trajectory<Ag::State, Ag::Action>) -> f64 + Send + Sync + 'static,
        config: BeamSearchConfig,
    ) -> Self {
        Self {
            agent: Arc::new(agent),
            env_clone_fn: Arc::new(env_clone_fn),
            agent_clone_fn: Arc::new(agent_clone_fn),
            scoring_fn: Arc::new(scoring_fn),
            config,
            callbacks: Vec::new(),
        }
    }

    /// Register the ordered observer list.
    pub fn with_callbacks(mut self, callbacks: Callbacks<Ag::State, Ag::Action>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Run beam search over every environment concurrently.
    ///
    /// Returns one trajectory per surviving beam per starting environment --
    /// possibly fewer than `beam_width` when beams terminate early and are
    /// not replaced.
    pub async fn sample_trajectories(
        &self,
        environments: Vec<E>,
        max_steps: usize,
    ) -> Result<Vec<Trajectory<Ag::State, Ag::Action>>, RolloutError> {
        let searches = environments
            .into_iter()
            .map(|env| self.search_one(env, max_steps));
        let per_env = try_join_all(searches).await?;
        Ok(per_env.into_iter().flatten().collect())
    }

    /// Run the beam rounds for a single starting environment.
    async fn search_one(
        &self,
        mut env: E,
        max_steps: usize,
    ) -> Result<Vec<Trajectory<Ag::State, Ag::Action>>, RolloutError> {
        let base_id = Uuid::new_v4().to_string();

        let (observation, tools) = match env.reset().await {
            Ok(reset) => reset,
            Err(cause) if self.config.rollout.catch_env_failures => {
                tracing::warn!(base_id = %base_id, error = %cause, "environment failed on reset");
                return Ok(Vec::new());
            }
            Err(cause) => {
                return Err(RolloutError::Env {
                    traj_id: base_id,
                    cause,
                });
            }
        };

        let agent_state = match self.agent.init_state(&tools).await {
            Ok(state) => state,
            Err(cause) if self.config.rollout.catch_agent_failures => {
                tracing::warn!(base_id = %base_id, error = %cause, "agent failed to initialise state");
                return Ok(Vec::new());
            }
            Err(cause) => {
                return Err(RolloutError::Agent {
                    traj_id: base_id,
                    cause,
                });
            }
        };

        let mut live = vec![Beam {
            env,
            agent_state,
            observation,
            trajectory: Trajectory::new(format!("{base_id}:0")),
            score: 0.0,
        }];
        let mut finished: Vec<Trajectory<Ag::State, Ag::Action>> = Vec::new();
        let mut spawned = 1usize;

        for _round in 0..max_steps {
            if live.is_empty() {
                break;
            }

            // Spawn every candidate of this round concurrently. Ids are
            // assigned in spawn order so the sort below is reproducible.
            let mut candidates = Vec::with_capacity(live.len() * self.config.samples_per_beam);
            for beam in &live {
                for _ in 0..self.config.samples_per_beam {
                    let candidate_id = format!("{base_id}:{spawned}");
                    spawned += 1;
                    candidates.push(self.sample_candidate(beam, candidate_id));
                }
            }

            let mut survivors = Vec::with_capacity(candidates.len());
            for outcome in join_all(candidates).await {
                match outcome {
                    Ok(Some(beam)) => survivors.push(beam),
                    // A caught failure drops just that candidate.
                    Ok(None) => {}
                    Err(err) => return Err(err),
                }
            }

            // Stable sort: ties keep spawn order.
            survivors.sort_by(|a, b| {
                b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal)
            });
            survivors.truncate(self.config.beam_width);

            live = Vec::with_capacity(survivors.len());
            for beam in survivors {
                if beam.trajectory.is_done() {
                    finished.push(beam.trajectory);
                } else {
                    live.push(beam);
                }
            }
        }

        tracing::debug!(
            base_id = %base_id,
            finished = finished.len(),
            live = live.len(),
            "beam search complete"
        );
        finished.extend(live.into_iter().map(|beam| beam.trajectory));
        Ok(finished)
    }

    /// Step one candidate continuation of `beam`.
    ///
    /// Returns `Ok(None)` when a caught failure dropped the candidate.
    async fn sample_candidate(
        &self,
        beam: &Beam<Ag::State, Ag::Action, E>,
        candidate_id: String,
    ) -> Result<Option<Beam<Ag::State, Ag::Action, E>>, RolloutError> {
        let mut env = (self.env_clone_fn)(&beam.env);
        let agent_state = (self.agent_clone_fn)(&beam.agent_state);

        let transition = match step_once(
            &candidate_id,
            self.agent.as_ref(),
            &mut env,
            &agent_state,
            &beam.observation,
            beam.trajectory.len(),
            &self.callbacks,
        )
        .await
        {
            Ok(transition) => transition,
            Err(err) if self.config.rollout.catches(&err) => {
                tracing::warn!(id = %candidate_id, error = %err, "candidate failed, dropping it");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let mut trajectory = beam.trajectory.clone();
        trajectory.traj_id = candidate_id;
        let next_agent_state = transition.next_agent_state.clone();
        let observation = transition.next_observation.clone().unwrap_or_default();
        trajectory.steps.push(transition);
        let score = (self.scoring_fn)(&trajectory);

        Ok(Some(Beam {
            env,
            agent_state: next_agent_state,
            observation,
            trajectory,
            score,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use anyhow::Result;
    use async_trait::async_trait;

    use super::*;
    use crate::agent::{CounterState, ScriptedAgent};
    use crate::config::RolloutConfig;
    use crate::env::{CountingEnv, EnvStep, Tool};
    use crate::rollout::callbacks::testing::CountingCallback;

    fn config(beam_width: usize, samples_per_beam: usize) -> BeamSearchConfig {
        BeamSearchConfig {
            beam_width,
            samples_per_beam,
            rollout: RolloutConfig::default(),
        }
    }

    #[tokio::test]
    async fn one_trajectory_per_environment_with_minimal_beams() {
        let callback = Arc::new(CountingCallback::default());
        let callbacks: Callbacks<CounterState, String> = vec![callback.clone()];

        let rollout = BeamSearchRollout::new(
            ScriptedAgent::default(),
            CountingEnv::clone,
            |state: &CounterState| *state,
            |traj: &Trajectory<CounterState, String>| traj.total_reward(),
            config(1, 1),
        )
        .with_callbacks(callbacks);

        let environments = vec![CountingEnv::new(), CountingEnv::new()];
        let trajectories = rollout.sample_trajectories(environments, 1).await.unwrap();

        assert_eq!(trajectories.len(), 2);
        assert!(trajectories.iter().all(|traj| traj.len() == 1));
        assert_eq!(callback.counts(), [2, 2, 2, 2]);
    }

    #[tokio::test]
    async fn rounds_advance_all_live_beams_in_lockstep() {
        let rollout = BeamSearchRollout::new(
            ScriptedAgent::default(),
            CountingEnv::clone,
            |state: &CounterState| *state,
            |traj: &Trajectory<CounterState, String>| traj.total_reward(),
            config(2, 2),
        );

        let environments = vec![CountingEnv::new().with_limit(100.0)];
        let trajectories = rollout.sample_trajectories(environments, 3).await.unwrap();

        assert_eq!(trajectories.len(), 2);
        assert!(trajectories.iter().all(|traj| traj.len() == 3));
    }

    #[tokio::test]
    async fn finished_beams_retire_with_their_trajectories() {
        let rollout = BeamSearchRollout::new(
            ScriptedAgent::default(),
            CountingEnv::clone,
            |state: &CounterState| *state,
            |traj: &Trajectory<CounterState, String>| traj.total_reward(),
            config(2, 2),
        );

        // Terminates after a single step, with budget to spare.
        let environments = vec![CountingEnv::new().with_limit(1.0)];
        let trajectories = rollout.sample_trajectories(environments, 5).await.unwrap();

        assert_eq!(trajectories.len(), 2);
        assert!(trajectories.iter().all(|traj| traj.len() == 1));
        assert!(trajectories.iter().all(Trajectory::is_done));
    }

    /// An env whose reward is fixed per instance, so the clone function can
    /// hand each candidate a distinguishable reward.
    #[derive(Debug, Clone)]
    struct SlottedEnv {
        reward: f64,
    }

    #[async_trait]
    impl Environment for SlottedEnv {
        type Action = String;

        async fn reset(&mut self) -> Result<(Vec<Message>, Vec<Tool>)> {
            Ok((vec![Message::user("0")], Vec::new()))
        }

        async fn step(&mut self, _action: &String) -> Result<EnvStep> {
            Ok(EnvStep {
                observation: vec![Message::user("stepped")],
                reward: self.reward,
                done: false,
                truncated: false,
            })
        }
    }

    #[tokio::test]
    async fn the_best_scoring_candidate_survives() {
        // Each clone gets a strictly larger reward than the previous one.
        let clones = Arc::new(AtomicUsize::new(0));
        let env_clone_fn = {
            let clones = Arc::clone(&clones);
            move |_env: &SlottedEnv| SlottedEnv {
                reward: clones.fetch_add(1, AtomicOrdering::SeqCst) as f64,
            }
        };

        let rollout = BeamSearchRollout::new(
            ScriptedAgent::default(),
            env_clone_fn,
            |state: &CounterState| *state,
            |traj: &Trajectory<CounterState, String>| traj.total_reward(),
            config(1, 3),
        );

        let trajectories = rollout
            .sample_trajectories(vec![SlottedEnv { reward: 0.0 }], 1)
            .await
            .unwrap();

        // Candidates earned rewards 0, 1, 2; the top-scoring one survived.
        assert_eq!(trajectories.len(), 1);
        assert!((trajectories[0].total_reward() - 2.0).abs() < 1e-12);
    }
}
