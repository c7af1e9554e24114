//! A deterministic scripted agent for tests and the demo CLI.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::traits::Agent;
use crate::env::{Message, Tool};

/// State carried by [`ScriptedAgent`]: the running count parsed from the
/// latest observation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CounterState {
    pub count: f64,
}

/// An agent that always emits a fixed action and tracks the number it reads
/// from the observation.
///
/// Pairs with [`crate::env::CountingEnv`]: the environment renders its
/// counter as the observation, the agent parses it and records `count + 1` as
/// its successor state, which makes state-snapshot bugs in the drivers
/// directly visible in tests.
#[derive(Debug, Clone)]
pub struct ScriptedAgent {
    action: String,
}

impl ScriptedAgent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
        }
    }
}

impl Default for ScriptedAgent {
    fn default() -> Self {
        Self::new("advance")
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    type State = CounterState;
    type Action = String;

    async fn init_state(&self, _tools: &[Tool]) -> Result<CounterState> {
        Ok(CounterState::default())
    }

    async fn get_asv(
        &self,
        state: &CounterState,
        observation: &[Message],
    ) -> Result<(String, CounterState, f64)> {
        let observed = observation
            .first()
            .and_then(|m| m.content.parse::<f64>().ok())
            .unwrap_or(state.count);

        let next_state = CounterState {
            count: observed + 1.0,
        };
        Ok((self.action.clone(), next_state, 0.0))
    }
}
