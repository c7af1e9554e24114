//! Branching tree search over a single starting environment.
//!
//! Starting from one reset environment and agent state, every node below the
//! root spawns `branching_factor` children. Each child clones the parent's
//! environment through the injected clone function, takes one agent step on
//! the clone, and inserts the resulting transition into a shared
//! [`TransitionTree`] at `{parent_id}:{branch}`. A branch stops expanding at
//! `max_depth`, on a terminal/truncated transition, or -- when a target
//! reward is configured -- as soon as its own reward meets the target.
//!
//! Concurrency is bounded by a single global semaphore: a node expansion
//! holds a permit for exactly the clone + step + insert portion and releases
//! it before descending into its children, so peak resource usage (live
//! environment clones) never exceeds `concurrency_limit` regardless of
//! branching factor or depth. A child's expansion only starts after its
//! parent's transition is in the tree, which is the sole cross-branch
//! ordering guarantee.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

use super::{Callbacks, step_once};
use crate::agent::Agent;
use crate::config::TreeSearchConfig;
use crate::env::{Environment, Message};
use crate::error::RolloutError;
use crate::trajectory::TransitionTree;

/// Clones an environment for a new branch. Injected because environments are
/// assumed non-trivially copyable.
pub type EnvCloneFn<E> = Arc<dyn Fn(&E) -> E + Send + Sync>;

/// Explores a branching tree of trajectories from one starting environment.
pub struct TreeSearchRollout<Ag: Agent, E> {
    agent: Arc<Ag>,
    env_clone_fn: EnvCloneFn<E>,
    config: TreeSearchConfig,
    callbacks: Callbacks<Ag::State, Ag::Action>,
}

impl<Ag, E> TreeSearchRollout<Ag, E>
where
    Ag: Agent,
    E: Environment<Action = Ag::Action> + Sync,
{
    /// Create a tree-search driver around an agent and an environment clone
    /// function.
    pub fn new(
        agent: Ag,
        env_clone_fn: impl Fn(&E) -> E + Send + Sync + 'static,
        config: TreeSearchConfig,
    ) -> Self {
        Self {
            agent: Arc::new(agent),
            env_clone_fn: Arc::new(env_clone_fn),
            config,
            callbacks: Vec::new(),
        }
    }

    /// Register the ordered observer list.
    pub fn with_callbacks(mut self, callbacks: Callbacks<Ag::State, Ag::Action>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Explore from `env` down to `max_depth` levels below the root and
    /// return the resulting tree.
    ///
    /// The returned tree carries one transition per expanded node; call
    /// [`TransitionTree::assign_mc_value_estimates`] and
    /// [`TransitionTree::get_trajectories`] on it for value backup and path
    /// extraction.
    pub async fn sample_tree(
        &self,
        mut env: E,
        max_depth: usize,
    ) -> Result<TransitionTree<Ag::State, Ag::Action>, RolloutError> {
        let root_id = Uuid::new_v4().to_string();
        let tree = Mutex::new(TransitionTree::new(root_id.clone()));

        let (observation, tools) = match env.reset().await {
            Ok(reset) => reset,
            Err(cause) if self.config.rollout.catch_env_failures => {
                tracing::warn!(root_id = %root_id, error = %cause, "environment failed on reset");
                return Ok(tree.into_inner());
            }
            Err(cause) => {
                return Err(RolloutError::Env {
                    traj_id: root_id,
                    cause,
                });
            }
        };

        let agent_state = match self.agent.init_state(&tools).await {
            Ok(state) => state,
            Err(cause) if self.config.rollout.catch_agent_failures => {
                tracing::warn!(root_id = %root_id, error = %cause, "agent failed to initialise state");
                return Ok(tree.into_inner());
            }
            Err(cause) => {
                return Err(RolloutError::Agent {
                    traj_id: root_id,
                    cause,
                });
            }
        };

        let semaphore = Semaphore::new(self.config.concurrency_limit.max(1));
        self.expand(
            &tree,
            &semaphore,
            &env,
            agent_state,
            observation,
            root_id,
            0,
            max_depth,
        )
        .await?;

        Ok(tree.into_inner())
    }

    /// Spawn and run the children of one node.
    ///
    /// `depth` is the timestep the children will record (0 for children of
    /// the root). Boxed because the recursion depth is runtime data.
    #[allow(clippy::too_many_arguments)]
    fn expand<'a>(
        &'a self,
        tree: &'a Mutex<TransitionTree<Ag::State, Ag::Action>>,
        semaphore: &'a Semaphore,
        env: &'a E,
        agent_state: Ag::State,
        observation: Vec<Message>,
        parent_id: String,
        depth: usize,
        max_depth: usize,
    ) -> BoxFuture<'a, Result<(), RolloutError>> {
        async move {
            if depth >= max_depth {
                return Ok(());
            }

            let branches = (0..self.config.branching_factor).map(|branch| {
                let child_id = format!("{parent_id}:{branch}");
                let agent_state = agent_state.clone();
                let observation = observation.clone();

                async move {
                    // Admission gate: the permit covers clone + step + insert
                    // only; descendants acquire their own.
                    let permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        // The semaphore is never closed.
                        Err(_) => return Ok(()),
                    };

                    let mut child_env = (self.env_clone_fn)(env);
                    let transition = match step_once(
                        &child_id,
                        self.agent.as_ref(),
                        &mut child_env,
                        &agent_state,
                        &observation,
                        depth,
                        &self.callbacks,
                    )
                    .await
                    {
                        Ok(transition) => transition,
                        Err(err) if self.config.rollout.catches(&err) => {
                            tracing::warn!(id = %child_id, error = %err, "branch failed, abandoning it");
                            return Ok(());
                        }
                        Err(err) => return Err(err),
                    };

                    let terminal = transition.done || transition.truncated;
                    let hit_target = self
                        .config
                        .target_reward
                        .is_some_and(|target| transition.reward >= target);
                    let next_agent_state = transition.next_agent_state.clone();
                    let next_observation = transition.next_observation.clone().unwrap_or_default();

                    tree.lock().await.add_transition(&child_id, transition)?;
                    drop(permit);

                    if terminal || hit_target {
                        return Ok(());
                    }

                    self.expand(
                        tree,
                        semaphore,
                        &child_env,
                        next_agent_state,
                        next_observation,
                        child_id,
                        depth + 1,
                        max_depth,
                    )
                    .await
                }
            });

            try_join_all(branches).await.map(|_| ())
        }
        .boxed()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
