//! Drives the recovery pipeline C2 → C4 → C5 → C6 → C7 → C8 → C9 end to end.
//!
//! This is the one place that owns the `CommitGraph`, tree map, and blob map
//! together; every component downstream of C2 only ever sees borrows of them.

use std::collections::HashSet;

use tracing::info;

use crate::aggregator::aggregate_candidates;
use crate::branch_detect::detect_branches;
use crate::cancel::CancellationToken;
use crate::config::{BatchWindows, RecoveryConfig, Server};
use crate::errors::Result;
use crate::graph::{self, CommitGraph};
use crate::internal::object::commit::CommitState;
use crate::internal::object::types::ObjectKind;
use crate::inventory::{self, LocalInventory};
use crate::persist::{self, PersistenceLedger};
use crate::reconstruct::{self, ReconstructOutcome};
use crate::remote::{self, RemoteClient};
use crate::treewalk::{self, BlobMap, TreeMap};
use crate::utils;

/// User-visible counts the orchestrator reports when it finishes (§7).
#[derive(Debug, Default, Clone)]
pub struct RecoverySummary {
    pub recovered_commits: usize,
    pub recovered_trees: usize,
    pub recovered_blobs: usize,
    pub forged_commits: usize,
    pub erased_commits: usize,
    pub dangling_branches: usize,
}

/// Resolves a forge auth token when the caller hasn't already supplied one
/// via `RecoveryConfig::token` (§6): GitHub goes through `GITHUB_TOKEN` /
/// `gh auth token`, GitLab through `GITLAB_TOKEN`. Azure DevOps has no
/// client to authenticate (the factory already fails fast on it).
fn resolve_token(server: Server) -> Option<String> {
    match server {
        Server::GitHub => utils::github_token_from_environment(),
        Server::GitLab => std::env::var("GITLAB_TOKEN").ok(),
        Server::AzureDevOps => None,
    }
}

/// Runs the full recovery pipeline against `config`.
pub async fn run(config: &RecoveryConfig, cancel: &CancellationToken) -> Result<RecoverySummary> {
    utils::fetch_all(&config.git_dir)?;
    let inventory: LocalInventory = inventory::scan(&config.git_dir)?;

    let origin = utils::get_remote_origin(&config.git_dir)?;
    let server = config
        .server
        .or_else(|| Server::infer_from_host(&origin.host))
        .ok_or_else(|| {
            crate::errors::RecoveryError::Repository(format!(
                "cannot infer forge from host {}; pass --server explicitly",
                origin.host
            ))
        })?;

    let token = config.token.clone().or_else(|| resolve_token(server));
    let client = remote::build_client(server, origin, token)?;

    let windows = BatchWindows::default();

    let candidates: HashSet<_> = aggregate_candidates(client.as_ref(), &inventory).await?;
    let mut graph: CommitGraph = graph::seed(&candidates);
    graph::resolve(
        &mut graph,
        client.as_ref(),
        &inventory,
        windows.commit_metadata,
        config.worker_pool_size,
        cancel,
    )
    .await?;

    let mut trees: TreeMap = TreeMap::new();
    let mut blobs: BlobMap = BlobMap::new();
    treewalk::resolve(
        &mut graph,
        &mut trees,
        &mut blobs,
        client.as_ref(),
        &inventory,
        &windows,
        config.worker_pool_size,
        cancel,
    )
    .await?;

    let branches = detect_branches(&graph, &inventory);

    let mut ledger = PersistenceLedger::default();

    for tree in trees.values() {
        let payload = {
            use crate::internal::object::GitObject;
            tree.to_payload()?
        };
        persist::persist_verified(&config.git_dir, ObjectKind::Tree, &payload, tree.sha, &mut ledger)?;
    }

    for blob in blobs.values().filter(|b| b.bytes.is_some()) {
        let payload = blob.bytes.clone().expect("filtered to populated blobs");
        persist::persist_verified(&config.git_dir, ObjectKind::Blob, &payload, blob.sha, &mut ledger)?;
    }

    let mut erased = 0usize;
    for commit in graph.values() {
        cancel.check()?;
        match commit.state {
            CommitState::Found => {
                let outcome: ReconstructOutcome = reconstruct::reconstruct(commit)?;
                persist::persist_commit(&config.git_dir, commit, outcome, &mut ledger)?;
            }
            CommitState::Erased => erased += 1,
            CommitState::Unknown | CommitState::Incomplete => {
                // C5 only terminates once every node is FOUND or ERASED;
                // reaching here means the frontier loop exited early.
                return Err(crate::errors::RecoveryError::Repository(format!(
                    "commit {} left unresolved after graph resolution",
                    commit.sha
                )));
            }
        }
    }

    persist::create_branch_refs(&config.git_dir, &branches, &ledger)?;

    if config.save_summary {
        persist::write_summary(&config.git_dir, &ledger)?;
    }

    let summary = RecoverySummary {
        recovered_commits: ledger.commits.len(),
        recovered_trees: ledger.trees.len(),
        recovered_blobs: ledger.blobs.len(),
        forged_commits: ledger.forged.len(),
        erased_commits: erased,
        dangling_branches: branches.len(),
    };

    info!(?summary, "recovery complete");
    Ok(summary)
}
