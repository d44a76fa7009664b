//! C6: Tree & Blob Resolver.
//!
//! Walks the tree graph rooted at each resolved commit, collecting blob
//! hashes and classifying how each should be retrieved. GitHub is walked one
//! level at a time through [`RemoteClient::fetch_tree_batch`]; GitLab answers
//! the whole graph in one [`RemoteClient::hydrate_commit_tree`] call (§4.6).

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::config::BatchWindows;
use crate::errors::{RecoveryError, Result};
use crate::hash::ObjectId;
use crate::internal::object::blob::Blob;
use crate::internal::object::commit::CommitState;
use crate::internal::object::tree::{EntryKind, Tree, TreeEntry};
use crate::inventory::LocalInventory;
use crate::remote::{self, BlobClass, RemoteClient, RemoteEntryKind, RemoteTreeEntry};

use crate::graph::CommitGraph;

pub type TreeMap = HashMap<ObjectId, Tree>;
pub type BlobMap = HashMap<ObjectId, Blob>;

/// Walks every FOUND commit's tree graph, populating `trees` and `blobs`.
pub async fn resolve(
    graph: &mut CommitGraph,
    trees: &mut TreeMap,
    blobs: &mut BlobMap,
    client: &dyn RemoteClient,
    inventory: &LocalInventory,
    windows: &BatchWindows,
    worker_pool_size: usize,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut to_query: Vec<ObjectId> = Vec::new();
    let mut seen: HashSet<ObjectId> = HashSet::new();

    let commit_shas: Vec<ObjectId> = graph
        .values()
        .filter(|c| c.state == CommitState::Found)
        .map(|c| c.sha)
        .collect();

    for sha in commit_shas {
        cancel.check()?;
        let placeholder = graph[&sha].tree.unwrap_or(ObjectId::ZERO);

        if let Some(hydrated) = client.hydrate_commit_tree(sha).await? {
            graph.get_mut(&sha).unwrap().tree = Some(hydrated.root);
            for (tree_sha, entries) in hydrated.subtrees {
                ingest_tree(trees, blobs, &mut to_query, &mut seen, inventory, tree_sha, entries)?;
            }
            continue;
        }

        if placeholder.is_zero() || inventory.trees.contains(&placeholder) || seen.contains(&placeholder) {
            continue;
        }
        seen.insert(placeholder);
        to_query.push(placeholder);
    }

    while !to_query.is_empty() {
        cancel.check()?;
        let round: Vec<ObjectId> = std::mem::take(&mut to_query);
        let chunks: Vec<&[ObjectId]> = round.chunks(windows.tree_entries).collect();
        let batches = remote::dispatch_bounded(chunks, worker_pool_size, |chunk| async move {
            let results = client.fetch_tree_batch(chunk).await?;
            Ok((chunk, results))
        })
        .await?;

        for (batch, results) in batches {
            for (sha, entries) in batch.iter().zip(results) {
                let Some(entries) = entries else {
                    return Err(RecoveryError::Repository(format!("tree {sha} absent upstream")));
                };
                ingest_tree(trees, blobs, &mut to_query, &mut seen, inventory, *sha, entries)?;
            }
        }
    }

    classify_and_fetch_blobs(blobs, client, windows, worker_pool_size, cancel).await?;

    info!(trees = trees.len(), blobs = blobs.len(), "tree graph resolved");
    Ok(())
}

fn ingest_tree(
    trees: &mut TreeMap,
    blobs: &mut BlobMap,
    to_query: &mut Vec<ObjectId>,
    seen: &mut HashSet<ObjectId>,
    inventory: &LocalInventory,
    sha: ObjectId,
    remote_entries: Vec<RemoteTreeEntry>,
) -> Result<()> {
    let mut entries = Vec::with_capacity(remote_entries.len());

    for remote in remote_entries {
        let kind = match remote.kind {
            RemoteEntryKind::Tree => EntryKind::Tree,
            RemoteEntryKind::Blob => EntryKind::Blob,
            RemoteEntryKind::Commit => EntryKind::Commit, // submodule gitlink, ignored below
        };
        let mode = crate::internal::object::tree::normalize_mode(remote.mode)?;

        match kind {
            EntryKind::Tree => {
                if !inventory.trees.contains(&remote.sha) && seen.insert(remote.sha) {
                    to_query.push(remote.sha);
                }
            }
            EntryKind::Blob => {
                if !inventory.blobs.contains(&remote.sha) {
                    blobs.entry(remote.sha).or_insert_with(|| Blob::pending(remote.sha));
                }
            }
            EntryKind::Commit => {
                debug!(sha = %remote.sha, "ignoring submodule gitlink entry");
            }
        }

        entries.push(TreeEntry {
            mode,
            name: remote.name,
            sha: remote.sha,
            kind,
        });
    }

    let tree = Tree { sha, entries };
    tree.verify()?;
    trees.insert(sha, tree);
    Ok(())
}

async fn classify_and_fetch_blobs(
    blobs: &mut BlobMap,
    client: &dyn RemoteClient,
    windows: &BatchWindows,
    worker_pool_size: usize,
    cancel: &CancellationToken,
) -> Result<()> {
    let pending: Vec<ObjectId> = blobs
        .values()
        .filter(|b| b.bytes.is_none())
        .map(|b| b.sha)
        .collect();

    let mut fetchable: Vec<ObjectId> = Vec::new();

    let chunks: Vec<&[ObjectId]> = pending.chunks(windows.blob_classification).collect();
    let classified = remote::dispatch_bounded(chunks, worker_pool_size, |chunk| async move {
        let classes = client.classify_blobs(chunk).await?;
        Ok((chunk, classes))
    })
    .await?;

    for (chunk, classes) in classified {
        cancel.check()?;
        for (sha, class) in chunk.iter().zip(classes) {
            match class {
                BlobClass::Fetchable => fetchable.push(*sha),
                BlobClass::TooLarge | BlobClass::Binary => {
                    debug!(%sha, ?class, "skipping blob content fetch");
                }
            }
        }
    }

    for chunk in fetchable.chunks(windows.blob_text) {
        cancel.check()?;
        let fetched = remote::dispatch_bounded(chunk.iter().copied(), worker_pool_size, |sha| async move {
            let bytes = client.fetch_blob(&sha).await?;
            Ok((sha, bytes))
        })
        .await?;

        for (sha, bytes) in fetched {
            let blob = blobs.get_mut(&sha).expect("blob entry seeded during tree ingest");
            blob.bytes = Some(bytes);
            blob.verify()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_submodule_entries_without_fetching_them() {
        let mut trees = TreeMap::new();
        let mut blobs = BlobMap::new();
        let mut to_query = Vec::new();
        let mut seen = HashSet::new();
        let inventory = LocalInventory::default();

        let gitlink = ObjectId::compute(crate::internal::object::types::ObjectKind::Commit, b"submodule");
        let remote_entries = vec![RemoteTreeEntry {
            mode: 0o160000,
            name: "vendor/lib".to_string(),
            sha: gitlink,
            kind: RemoteEntryKind::Commit,
        }];

        let sha = Tree::compute_sha(&[TreeEntry {
            mode: 0o160000,
            name: "vendor/lib".to_string(),
            sha: gitlink,
            kind: EntryKind::Commit,
        }]);

        ingest_tree(&mut trees, &mut blobs, &mut to_query, &mut seen, &inventory, sha, remote_entries).unwrap();

        assert!(to_query.is_empty());
        assert!(blobs.is_empty());
        assert!(trees.contains_key(&sha));
    }
}
