//! C7: Branch Detector.
//!
//! Finds the leaves of the dangling DAG — commits with no dangling children —
//! and, for each, walks parents to compute the branch's length and the
//! points where it reconnects to local history (§4.7).

use std::collections::{HashSet, VecDeque};

use crate::graph::CommitGraph;
use crate::hash::ObjectId;
use crate::internal::object::branch::Branch;
use crate::internal::object::commit::CommitState;
use crate::inventory::LocalInventory;

/// A dangling commit is a branch end iff its children set is empty and its
/// state is FOUND (§4.7). ERASED commits never become branch ends.
fn is_branch_end(graph: &CommitGraph, sha: ObjectId) -> bool {
    let commit = &graph[&sha];
    commit.state == CommitState::Found && commit.children.is_empty()
}

/// Breadth-first walk over parents restricted to the dangling graph,
/// counting visited commits (length) and recording origins — dangling
/// commits whose parent is in `LocalInventory.commits`.
pub fn detect_branches(graph: &CommitGraph, inventory: &LocalInventory) -> Vec<Branch> {
    let mut branches = Vec::new();

    for &end in graph.keys() {
        if !is_branch_end(graph, end) {
            continue;
        }

        let mut visited: HashSet<ObjectId> = HashSet::new();
        let mut origins: Vec<ObjectId> = Vec::new();
        let mut queue: VecDeque<ObjectId> = VecDeque::new();
        queue.push_back(end);
        visited.insert(end);

        while let Some(sha) = queue.pop_front() {
            let Some(commit) = graph.get(&sha) else { continue };
            for &parent in &commit.parents {
                if inventory.commits.contains(&parent) {
                    origins.push(sha);
                    continue;
                }
                if graph.contains_key(&parent) && visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }

        branches.push(Branch {
            end_commit: end,
            origins,
            length: visited.len(),
        });
    }

    branches
}
