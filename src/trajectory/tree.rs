//! A branching tree of transitions addressed by hierarchical path ids.
//!
//! Ids are colon-separated paths rooted at a configurable `root_id`; each
//! segment below the root is the branch index among its siblings, e.g.
//! `root:0:1` is the second child of the root's first child. The tree is an
//! arena (id -> transition map with parents derivable from ids) rather than a
//! pointer-linked structure, which keeps concurrent insertion simple and
//! cycles unrepresentable by construction.
//!
//! Invariant: every non-root id's parent must already be in the tree when the
//! id is inserted; an id one level below the root attaches to the root
//! implicitly. The root itself carries no transition.

use std::collections::{HashMap, HashSet};

use crate::error::TreeError;
use crate::trajectory::types::{Trajectory, Transition};

/// A tree of transitions supporting Monte-Carlo value backup.
#[derive(Debug, Clone)]
pub struct TransitionTree<S, A> {
    root_id: String,
    nodes: HashMap<String, Transition<S, A>>,
    /// Children per node, in insertion (spawn) order.
    children: HashMap<String, Vec<String>>,
}

impl<S: Clone, A: Clone> TransitionTree<S, A> {
    /// Create an empty tree rooted at `root_id`.
    pub fn new(root_id: impl Into<String>) -> Self {
        Self {
            root_id: root_id.into(),
            nodes: HashMap::new(),
            children: HashMap::new(),
        }
    }

    /// The id of the (transition-less) root.
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Number of transitions in the tree (the root does not count).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether any transition has been inserted.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The parent path of an id: the id with its last segment removed.
    fn parent_of(id: &str) -> Option<&str> {
        id.rfind(':').map(|split| &id[..split])
    }

    /// Insert a transition under `id`.
    ///
    /// Fails if the id already exists, if it cannot attach below the root, or
    /// if its parent path has not been inserted yet.
    pub fn add_transition(
        &mut self,
        id: &str,
        transition: Transition<S, A>,
    ) -> Result<(), TreeError> {
        if id == self.root_id || self.nodes.contains_key(id) {
            return Err(TreeError::DuplicateId { id: id.to_string() });
        }
        let parent = Self::parent_of(id).ok_or_else(|| TreeError::ForeignId {
            id: id.to_string(),
        })?;
        if parent != self.root_id && !self.nodes.contains_key(parent) {
            return Err(TreeError::MissingParent {
                id: id.to_string(),
                parent: parent.to_string(),
            });
        }

        self.children
            .entry(parent.to_string())
            .or_default()
            .push(id.to_string());
        self.nodes.insert(id.to_string(), transition);
        Ok(())
    }

    /// Look up the transition stored under `id`.
    pub fn get_transition(&self, id: &str) -> Result<&Transition<S, A>, TreeError> {
        self.nodes.get(id).ok_or_else(|| TreeError::NotFound {
            id: id.to_string(),
        })
    }

    fn is_leaf(&self, id: &str) -> bool {
        self.children.get(id).is_none_or(|kids| kids.is_empty())
    }

    /// Reconstruct every root-to-leaf path as a trajectory.
    ///
    /// A leaf is any id with no recorded child; the trajectory's id is the
    /// leaf's full path id and its steps run from the first branch below the
    /// root down to the leaf. Output is sorted by trajectory id so callers
    /// get a stable order.
    pub fn get_trajectories(&self) -> Vec<Trajectory<S, A>> {
        let mut trajectories = Vec::new();

        for leaf_id in self.nodes.keys() {
            if !self.is_leaf(leaf_id) {
                continue;
            }

            let mut path: Vec<&str> = Vec::new();
            let mut cursor = leaf_id.as_str();
            while cursor != self.root_id {
                path.push(cursor);
                match Self::parent_of(cursor) {
                    Some(parent) => cursor = parent,
                    None => break,
                }
            }
            path.reverse();

            let steps = path.iter().map(|id| self.nodes[*id].clone()).collect();
            trajectories.push(Trajectory {
                traj_id: leaf_id.clone(),
                steps,
            });
        }

        trajectories.sort_by(|a, b| a.traj_id.cmp(&b.traj_id));
        trajectories
    }

    /// Assign every transition its Monte-Carlo value estimate, bottom-up.
    ///
    /// Leaves get `value = reward`. An internal node gets `value = reward +
    /// discount_factor * mean(child values)` -- the *average* over children,
    /// modelling expected return under the implicit branching policy rather
    /// than optimal-branch return. Single pass in post-order; each value is
    /// written exactly once.
    pub fn assign_mc_value_estimates(&mut self, discount_factor: f64) -> Result<(), TreeError> {
        let order = self.post_order()?;

        let mut values: HashMap<String, f64> = HashMap::with_capacity(order.len());
        for id in &order {
            let reward = self
                .get_transition(id)
                .map(|transition| transition.reward)?;
            let value = match self.children.get(id).filter(|kids| !kids.is_empty()) {
                None => reward,
                Some(kids) => {
                    let sum: f64 = kids.iter().map(|kid| values[kid]).sum();
                    reward + discount_factor * (sum / kids.len() as f64)
                }
            };
            values.insert(id.clone(), value);
        }

        for (id, value) in values {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.value = Some(value);
            }
        }
        Ok(())
    }

    /// All node ids with children strictly before their parents.
    ///
    /// Fails with [`TreeError::Cycle`] if the traversal revisits an id or does
    /// not cover the whole arena -- unreachable while the insertion invariant
    /// holds, checked defensively.
    fn post_order(&self) -> Result<Vec<String>, TreeError> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut seen: HashSet<String> = HashSet::with_capacity(self.nodes.len());

        // (id, children already pushed) pairs; a node is emitted on its
        // second visit, after all of its children.
        let mut stack: Vec<(String, bool)> = self
            .children
            .get(self.root_id.as_str())
            .map(|kids| kids.iter().rev().map(|kid| (kid.clone(), false)).collect())
            .unwrap_or_default();

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            if !seen.insert(id.clone()) {
                return Err(TreeError::Cycle { id });
            }
            stack.push((id.clone(), true));
            if let Some(kids) = self.children.get(&id) {
                for kid in kids.iter().rev() {
                    stack.push((kid.clone(), false));
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(TreeError::Cycle {
                id: self.root_id.clone(),
            });
        }
        Ok(order)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// A bare transition with only the fields the tree cares about.
    fn bare(timestep: usize, reward: f64, done: bool) -> Transition<(), ()> {
        Transition {
            timestep,
            agent_state: (),
            next_agent_state: (),
            observation: None,
            next_observation: None,
            action: None,
            reward,
            done,
            truncated: false,
            value: None,
        }
    }

    #[test]
    fn insertion_requires_an_existing_parent() {
        let mut tree: TransitionTree<(), ()> = TransitionTree::new("root");

        let err = tree.add_transition("root:0:0", bare(1, 0.0, false));
        assert!(matches!(err, Err(TreeError::MissingParent { .. })));

        tree.add_transition("root:0", bare(0, 0.0, false)).unwrap();
        tree.add_transition("root:0:0", bare(1, 0.0, false)).unwrap();
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn duplicate_and_foreign_ids_are_rejected() {
        let mut tree: TransitionTree<(), ()> = TransitionTree::new("root");
        tree.add_transition("root:0", bare(0, 0.0, false)).unwrap();

        assert!(matches!(
            tree.add_transition("root:0", bare(0, 0.0, false)),
            Err(TreeError::DuplicateId { .. })
        ));
        assert!(matches!(
            tree.add_transition("root", bare(0, 0.0, false)),
            Err(TreeError::DuplicateId { .. })
        ));
        assert!(matches!(
            tree.add_transition("orphan", bare(0, 0.0, false)),
            Err(TreeError::ForeignId { .. })
        ));
    }

    #[test]
    fn lookup_of_a_missing_id_fails() {
        let tree: TransitionTree<(), ()> = TransitionTree::new("root");
        assert!(matches!(
            tree.get_transition("root:3"),
            Err(TreeError::NotFound { .. })
        ));
    }

    #[test]
    fn trajectories_are_exactly_the_root_to_leaf_paths() {
        let mut tree: TransitionTree<(), ()> = TransitionTree::new("root");
        tree.add_transition("root:0", bare(0, 0.0, false)).unwrap();
        tree.add_transition("root:1", bare(0, 0.0, false)).unwrap();
        tree.add_transition("root:0:0", bare(1, 0.0, true)).unwrap();
        tree.add_transition("root:0:1", bare(1, 0.0, true)).unwrap();

        let trajectories = tree.get_trajectories();
        // Three leaves: root:0:0, root:0:1, root:1.
        assert_eq!(trajectories.len(), 3);

        let ids: Vec<&str> = trajectories.iter().map(|t| t.traj_id.as_str()).collect();
        assert_eq!(ids, vec!["root:0:0", "root:0:1", "root:1"]);

        let deep = &trajectories[0];
        assert_eq!(deep.len(), 2);
        assert_eq!(deep.steps[0].timestep, 0);
        assert_eq!(deep.steps[1].timestep, 1);
    }

    #[test]
    fn mc_value_estimates_average_children() {
        let mut tree: TransitionTree<(), ()> = TransitionTree::new("dummy");

        tree.add_transition("dummy:0", bare(0, 0.0, false)).unwrap();
        tree.add_transition("dummy:0:0", bare(1, 1.0, false)).unwrap();
        for i in 0..3 {
            tree.add_transition(&format!("dummy:0:0:{i}"), bare(2, i as f64, true))
                .unwrap();
        }
        tree.add_transition("dummy:0:1", bare(1, -1.0, true)).unwrap();

        tree.assign_mc_value_estimates(0.9).unwrap();

        // Terminal nodes: value == reward.
        for i in 0..3 {
            assert_eq!(
                tree.get_transition(&format!("dummy:0:0:{i}")).unwrap().value,
                Some(i as f64)
            );
        }
        assert_eq!(tree.get_transition("dummy:0:1").unwrap().value, Some(-1.0));

        // Internal nodes: reward + discount * mean(child values).
        let mid = tree.get_transition("dummy:0:0").unwrap().value.unwrap();
        assert!((mid - (1.0 + 0.9 * 1.0)).abs() < 1e-9);

        let top = tree.get_transition("dummy:0").unwrap().value.unwrap();
        assert!((top - (0.0 + 0.9 * ((1.9 - 1.0) / 2.0))).abs() < 1e-9);
    }

    #[test]
    fn value_pass_touches_every_node_once() {
        let mut tree: TransitionTree<(), ()> = TransitionTree::new("r");
        tree.add_transition("r:0", bare(0, 2.0, true)).unwrap();
        tree.add_transition("r:1", bare(0, 4.0, true)).unwrap();

        tree.assign_mc_value_estimates(1.0).unwrap();
        assert_eq!(tree.get_transition("r:0").unwrap().value, Some(2.0));
        assert_eq!(tree.get_transition("r:1").unwrap().value, Some(4.0));
    }
}
