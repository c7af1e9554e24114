//! A scripted counting environment for tests and the demo CLI.
//!
//! The observation is the current counter value rendered as a user message;
//! each step advances the counter by one (plus optional jitter) and the
//! episode terminates once the counter reaches a configurable limit. The
//! jitter makes concurrent branches distinguishable under tree and beam
//! search without changing the termination behaviour.

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;

use super::traits::{EnvStep, Environment, Message, Tool};

/// A deterministic-by-default counting environment.
#[derive(Debug, Clone)]
pub struct CountingEnv {
    state: f64,
    limit: f64,
    step_reward: f64,
    noise: f64,
}

impl CountingEnv {
    /// Create an environment that terminates once the counter reaches 3.
    pub fn new() -> Self {
        Self {
            state: 0.0,
            limit: 3.0,
            step_reward: 0.0,
            noise: 0.0,
        }
    }

    /// Override the terminal counter value.
    pub fn with_limit(mut self, limit: f64) -> Self {
        self.limit = limit;
        self
    }

    /// Reward emitted on every step (default 0.0).
    pub fn with_step_reward(mut self, step_reward: f64) -> Self {
        self.step_reward = step_reward;
        self
    }

    /// Uniform jitter applied to each increment, so that branches cloned from
    /// the same parent evolve distinguishable observations.
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    fn observe(&self) -> Vec<Message> {
        vec![Message::user(format!("{}", self.state))]
    }
}

impl Default for CountingEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Environment for CountingEnv {
    type Action = String;

    async fn reset(&mut self) -> Result<(Vec<Message>, Vec<Tool>)> {
        self.state = 0.0;
        let tools = vec![Tool::new("advance", "Advance the counter by one.")];
        Ok((self.observe(), tools))
    }

    async fn step(&mut self, _action: &String) -> Result<EnvStep> {
        let jitter = if self.noise > 0.0 {
            rand::thread_rng().gen_range(-self.noise..self.noise)
        } else {
            0.0
        };
        self.state += 1.0 + jitter;

        Ok(EnvStep {
            observation: self.observe(),
            reward: self.step_reward,
            done: self.state >= self.limit,
            truncated: false,
        })
    }
}
