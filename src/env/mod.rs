//! Environment abstractions and the built-in mock environment.
//!
//! Every environment implements the [`Environment`] trait so that the rollout
//! drivers can interact with it uniformly. The [`mock`] module ships a
//! scripted counting environment used by the demo CLI and the test suite, so
//! the full sampling stack can run without external dependencies.

pub mod mock;
pub mod traits;

// Re-export the core trait and value types at the module level.
pub use mock::CountingEnv;
pub use traits::{EnvStep, Environment, Message, Tool};
