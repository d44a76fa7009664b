//! C5: Commit Graph Resolver.
//!
//! Iterative frontier expansion over a single owned `CommitGraph`. Each pass
//! fetches metadata for every `UNKNOWN`/`INCOMPLETE` commit, then expands
//! parent pointers, inserting new `INCOMPLETE` nodes as needed. Terminates
//! because every iteration either promotes a node to a terminal state or adds
//! a parent that must itself later reach one — the graph is finite, bounded
//! by the forge repository's history (§4.5).

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::errors::Result;
use crate::hash::ObjectId;
use crate::internal::object::commit::{Commit, CommitState};
use crate::internal::object::signature::{CommitSignature, SignatureStatus};
use crate::inventory::LocalInventory;
use crate::remote::{self, CommitRecord, RemoteClient};

/// A map `ObjectId -> Commit`, owned exclusively by the orchestrator and
/// mutated only here.
pub type CommitGraph = HashMap<ObjectId, Commit>;

/// Seeds one `UNKNOWN` node per candidate sha.
pub fn seed(candidates: &HashSet<ObjectId>) -> CommitGraph {
    candidates.iter().map(|&id| (id, Commit::unknown(id))).collect()
}

fn frontier(graph: &CommitGraph) -> Vec<ObjectId> {
    graph
        .values()
        .filter(|c| !c.state.is_terminal())
        .map(|c| c.sha)
        .collect()
}

/// Runs C5 to completion (or until cancelled).
pub async fn resolve(
    graph: &mut CommitGraph,
    client: &dyn RemoteClient,
    inventory: &LocalInventory,
    window: usize,
    worker_pool_size: usize,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        cancel.check()?;

        let pending = frontier(graph);
        if pending.is_empty() {
            break;
        }

        let chunks: Vec<&[ObjectId]> = pending.chunks(window).collect();
        let batches = remote::dispatch_bounded(chunks, worker_pool_size, |chunk| async move {
            let records = client.fetch_commit_batch(chunk).await?;
            Ok((chunk, records))
        })
        .await?;

        for (chunk, records) in batches {
            cancel.check()?;
            for (sha, record) in chunk.iter().zip(records) {
                apply_record(graph, inventory, *sha, record)?;
            }
        }
    }

    info!(
        commits = graph.len(),
        found = graph.values().filter(|c| c.state == CommitState::Found).count(),
        erased = graph.values().filter(|c| c.state == CommitState::Erased).count(),
        "commit graph resolved"
    );
    Ok(())
}

fn apply_record(
    graph: &mut CommitGraph,
    inventory: &LocalInventory,
    sha: ObjectId,
    record: Option<CommitRecord>,
) -> Result<()> {
    let Some(record) = record else {
        debug!(%sha, "commit absent upstream, marking erased");
        if let Some(commit) = graph.get_mut(&sha) {
            commit.state = CommitState::Erased;
        }
        return Ok(());
    };

    let signature_status: SignatureStatus = record.signature_status.parse()?;
    let signature = if signature_status == SignatureStatus::Unsigned {
        CommitSignature::unsigned()
    } else {
        CommitSignature {
            status: signature_status,
            payload: record.signed_payload,
            signature_block: record.signature_block,
        }
    };

    let mut new_incomplete: Vec<(ObjectId, ObjectId)> = Vec::new();

    {
        let commit = graph.get_mut(&sha).expect("frontier entries always exist in the graph");
        commit.tree = Some(record.tree);
        commit.message = Some(record.message);
        commit.author = Some(record.author);
        commit.committer = Some(record.committer);
        commit.signature = Some(signature);

        for parent in &record.parents {
            commit.add_parent(*parent);
        }
        commit.state = CommitState::Found;
    }

    for parent in record.parents {
        match graph.get_mut(&parent) {
            Some(parent_commit) => {
                parent_commit.children.insert(sha);
                if parent_commit.state == CommitState::Unknown {
                    parent_commit.state = CommitState::Incomplete;
                }
            }
            None if !inventory.has_any(&parent) => {
                new_incomplete.push((parent, sha));
            }
            None => {
                // parent resolves into local history; nothing further to track
            }
        }
    }

    for (parent, child) in new_incomplete {
        graph.entry(parent).or_insert_with(|| Commit::incomplete(parent, child));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::object::signature::Person;
    use std::str::FromStr;

    fn sha(n: u8) -> ObjectId {
        ObjectId::from_str(&format!("{:02x}", n).repeat(20)).unwrap()
    }

    fn record(tree: ObjectId, parents: Vec<ObjectId>) -> CommitRecord {
        CommitRecord {
            tree,
            parents,
            author: Person::new("A", "a@example.com", "2024-01-01T00:00:00+00:00"),
            committer: Person::new("A", "a@example.com", "2024-01-01T00:00:00+00:00"),
            message: "msg\n".to_string(),
            signature_status: "unsigned".to_string(),
            signed_payload: None,
            signature_block: None,
        }
    }

    #[test]
    fn absent_commit_becomes_erased() {
        let mut graph = seed(&HashSet::from([sha(1)]));
        let inventory = LocalInventory::default();
        apply_record(&mut graph, &inventory, sha(1), None).unwrap();
        assert_eq!(graph[&sha(1)].state, CommitState::Erased);
    }

    #[test]
    fn found_commit_promotes_unknown_parent_to_incomplete() {
        let mut graph = seed(&HashSet::from([sha(1)]));
        let inventory = LocalInventory::default();
        apply_record(&mut graph, &inventory, sha(1), Some(record(sha(9), vec![sha(2)]))).unwrap();

        assert_eq!(graph[&sha(1)].state, CommitState::Found);
        assert_eq!(graph[&sha(2)].state, CommitState::Incomplete);
        assert!(graph[&sha(2)].children.contains(&sha(1)));
    }

    #[test]
    fn parent_already_local_is_not_added_to_graph() {
        let mut graph = seed(&HashSet::from([sha(1)]));
        let mut inventory = LocalInventory::default();
        inventory.commits.insert(sha(2));
        apply_record(&mut graph, &inventory, sha(1), Some(record(sha(9), vec![sha(2)]))).unwrap();

        assert!(!graph.contains_key(&sha(2)));
    }

    #[test]
    fn unknown_signature_status_is_surfaced() {
        let mut graph = seed(&HashSet::from([sha(1)]));
        let inventory = LocalInventory::default();
        let mut rec = record(sha(9), vec![]);
        rec.signature_status = "not_a_real_status".to_string();
        assert!(apply_record(&mut graph, &inventory, sha(1), Some(rec)).is_err());
    }
}
