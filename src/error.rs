//! Error types for the sampling engine.
//!
//! Two families:
//! - [`TreeError`] -- violations of the transition-tree structural contract.
//!   These always propagate; a malformed insertion or lookup is a programming
//!   error, not a runtime condition to recover from.
//! - [`RolloutError`] -- failures raised by the agent or environment
//!   collaborators during sampling. Depending on driver configuration these
//!   are either propagated (aborting the whole sampling call) or caught and
//!   treated as an early terminal for the affected trajectory/branch.

use thiserror::Error;

/// Structural errors raised by [`crate::trajectory::TransitionTree`].
#[derive(Debug, Error)]
pub enum TreeError {
    /// A transition was inserted under an id whose parent path is absent.
    #[error("parent node `{parent}` is not in the tree (inserting `{id}`)")]
    MissingParent { id: String, parent: String },

    /// A transition was inserted under an id that already exists.
    #[error("transition id `{id}` is already in the tree")]
    DuplicateId { id: String },

    /// An id that cannot attach to the tree root (no path separator).
    #[error("id `{id}` does not descend from the tree root")]
    ForeignId { id: String },

    /// Lookup of an id with no recorded transition.
    #[error("no transition with id `{id}`")]
    NotFound { id: String },

    /// Traversal did not resolve to a proper tree. Unreachable as long as the
    /// insertion invariant holds.
    #[error("tree traversal inconsistency at `{id}`")]
    Cycle { id: String },
}

/// Failures surfaced while driving agent-environment interaction.
#[derive(Debug, Error)]
pub enum RolloutError {
    /// The agent failed while initialising state or selecting an action.
    #[error("agent failure in `{traj_id}`: {cause}")]
    Agent { traj_id: String, cause: anyhow::Error },

    /// The environment failed while resetting or stepping.
    #[error("environment failure in `{traj_id}`: {cause}")]
    Env { traj_id: String, cause: anyhow::Error },

    /// A structural tree error surfaced during tree search. Never caught.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_error_messages_name_the_ids() {
        let err = TreeError::MissingParent {
            id: "root:0:1".to_string(),
            parent: "root:0".to_string(),
        };
        assert!(err.to_string().contains("root:0"));
        assert!(err.to_string().contains("root:0:1"));
    }

    #[test]
    fn rollout_error_wraps_tree_error() {
        let err: RolloutError = TreeError::NotFound {
            id: "root:7".to_string(),
        }
        .into();
        assert!(matches!(err, RolloutError::Tree(TreeError::NotFound { .. })));
    }
}
