//! C2: Local Inventory.
//!
//! Enumerates every object already present in the local store via
//! `git cat-file --batch-check --batch-all-objects` and partitions it by
//! kind. Immutable once built — nothing downstream ever mutates it.

use std::collections::HashSet;
use std::path::Path;

use tracing::info;

use crate::errors::{RecoveryError, Result};
use crate::hash::ObjectId;
use crate::internal::object::types::ObjectKind;
use crate::utils::exec_git;

/// Four disjoint sets of [`ObjectId`], one per object kind (§3).
#[derive(Debug, Clone, Default)]
pub struct LocalInventory {
    pub commits: HashSet<ObjectId>,
    pub trees: HashSet<ObjectId>,
    pub blobs: HashSet<ObjectId>,
    pub tags: HashSet<ObjectId>,
}

impl LocalInventory {
    pub fn contains(&self, id: &ObjectId, kind: ObjectKind) -> bool {
        match kind {
            ObjectKind::Commit => self.commits.contains(id),
            ObjectKind::Tree => self.trees.contains(id),
            ObjectKind::Blob => self.blobs.contains(id),
            ObjectKind::Tag => self.tags.contains(id),
        }
    }

    pub fn has_any(&self, id: &ObjectId) -> bool {
        self.commits.contains(id) || self.trees.contains(id) || self.blobs.contains(id) || self.tags.contains(id)
    }

    /// Parses the `"<sha> <kind> <size>"` lines `git cat-file --batch-check`
    /// emits for `--batch-all-objects`. An unrecognized kind is fatal (§4.2,
    /// §7): a local store reporting an object kind we don't understand means
    /// our model of git's object universe is wrong, which we must not mask.
    pub fn parse(output: &str) -> Result<LocalInventory> {
        let mut inventory = LocalInventory::default();

        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let sha = parts
                .next()
                .ok_or_else(|| RecoveryError::Git(format!("malformed batch-check line: {line}")))?;
            let kind = parts
                .next()
                .ok_or_else(|| RecoveryError::Git(format!("malformed batch-check line: {line}")))?;

            let id: ObjectId = sha
                .parse()
                .map_err(|_| RecoveryError::Git(format!("malformed sha in batch-check line: {line}")))?;

            match kind.parse::<ObjectKind>()? {
                ObjectKind::Commit => inventory.commits.insert(id),
                ObjectKind::Tree => inventory.trees.insert(id),
                ObjectKind::Blob => inventory.blobs.insert(id),
                ObjectKind::Tag => inventory.tags.insert(id),
            };
        }

        Ok(inventory)
    }
}

/// Invokes `git cat-file --batch-check --batch-all-objects` in `git_dir` and
/// builds the [`LocalInventory`].
pub fn scan(git_dir: &Path) -> Result<LocalInventory> {
    let output = exec_git(
        git_dir,
        &["cat-file", "--batch-check", "--batch-all-objects"],
    )?;
    let inventory = LocalInventory::parse(&output)?;
    info!(
        commits = inventory.commits.len(),
        trees = inventory.trees.len(),
        blobs = inventory.blobs.len(),
        tags = inventory.tags.len(),
        "local inventory scanned"
    );
    Ok(inventory)
}
