//! Rollout drivers: linear sampling, tree search, and beam search.
//!
//! All three drivers share one step primitive (`step_once`): consult the
//! agent, apply the action to the environment, assemble a [`Transition`], and
//! notify every registered callback at the four fixed points. What differs is
//! the exploration strategy wrapped around that primitive:
//! - [`manager::RolloutManager`] -- one independent linear trajectory per
//!   environment.
//! - [`tree_search::TreeSearchRollout`] -- branching exploration of one
//!   environment under a global concurrency cap.
//! - [`beam_search::BeamSearchRollout`] -- width-bounded, score-guided
//!   exploration.

pub mod beam_search;
pub mod callbacks;
pub mod manager;
pub mod tree_search;

// Re-export the drivers and the observer interface at the module level.
pub use beam_search::{Beam, BeamSearchRollout};
pub use callbacks::{Callback, LoggingCallback, MeanMetricsCallback, MetricsAggregate};
pub use manager::RolloutManager;
pub use tree_search::TreeSearchRollout;

use std::sync::Arc;

use crate::agent::Agent;
use crate::env::{Environment, Message};
use crate::error::RolloutError;
use crate::trajectory::Transition;

/// Shorthand for the registered observer list a driver carries.
pub type Callbacks<S, A> = Vec<Arc<dyn Callback<S, A>>>;

/// Drive one agent-environment step and assemble the resulting transition.
///
/// Fires the four callback points in order around the two collaborator calls.
/// Failures are wrapped into [`RolloutError::Agent`] / [`RolloutError::Env`]
/// and left for the caller to catch or propagate per its configuration.
pub(crate) async fn step_once<Ag, E>(
    traj_id: &str,
    agent: &Ag,
    env: &mut E,
    agent_state: &Ag::State,
    observation: &[Message],
    timestep: usize,
    callbacks: &Callbacks<Ag::State, Ag::Action>,
) -> Result<Transition<Ag::State, Ag::Action>, RolloutError>
where
    Ag: Agent,
    E: Environment<Action = Ag::Action>,
{
    for callback in callbacks {
        callback
            .before_transition(traj_id, agent_state, Some(observation))
            .await;
    }

    let (action, next_agent_state, value_estimate) =
        agent
            .get_asv(agent_state, observation)
            .await
            .map_err(|cause| RolloutError::Agent {
                traj_id: traj_id.to_string(),
                cause,
            })?;
    for callback in callbacks {
        callback
            .after_agent_get_asv(traj_id, &action, &next_agent_state, value_estimate)
            .await;
    }

    let step = env.step(&action).await.map_err(|cause| RolloutError::Env {
        traj_id: traj_id.to_string(),
        cause,
    })?;
    for callback in callbacks {
        callback
            .after_env_step(traj_id, &step.observation, step.reward, step.done, step.truncated)
            .await;
    }

    let transition = Transition {
        timestep,
        agent_state: agent_state.clone(),
        next_agent_state,
        observation: Some(observation.to_vec()),
        next_observation: Some(step.observation),
        action: Some(action),
        reward: step.reward,
        done: step.done,
        truncated: step.truncated,
        value: None,
    };
    for callback in callbacks {
        callback.after_transition(traj_id, &transition).await;
    }

    Ok(transition)
}
