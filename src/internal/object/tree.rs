//! The `Tree` object: an ordered list of mode/name/sha entries describing one
//! directory level of a recovered commit's file tree.

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::errors::RecoveryError;
use crate::hash::ObjectId;
use crate::internal::object::GitObject;
use crate::internal::object::types::ObjectKind;

/// What a tree entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Tree,
    Blob,
    Commit, // submodule gitlink; ignored per §4.6
}

/// Canonical file modes a tree entry may carry (§3).
pub mod mode {
    pub const TREE: u32 = 0o40000;
    pub const FILE: u32 = 0o100644;
    pub const EXEC: u32 = 0o100755;
    pub const SYMLINK: u32 = 0o120000;
    pub const SUBMODULE: u32 = 0o160000;
}

/// Normalizes the numeric POSIX modes GitHub's GraphQL API returns
/// (16384/33188/33261/40960/57344) to git's canonical octal forms. An
/// unrecognized mode is fatal (§4.6): we must not guess at entry semantics.
pub fn normalize_mode(raw: u32) -> Result<u32, RecoveryError> {
    match raw {
        16384 => Ok(mode::TREE),
        33188 => Ok(mode::FILE),
        33261 => Ok(mode::EXEC),
        40960 => Ok(mode::SYMLINK),
        57344 => Ok(mode::SUBMODULE),
        // already canonical (e.g. GitLab, which reports octal-ish strings directly)
        m if m == mode::TREE
            || m == mode::FILE
            || m == mode::EXEC
            || m == mode::SYMLINK
            || m == mode::SUBMODULE =>
        {
            Ok(m)
        }
        other => Err(RecoveryError::Git(format!("unknown tree entry mode: {other}"))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub mode: u32,
    pub name: String,
    pub sha: ObjectId,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub sha: ObjectId,
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Computes the tree's id from its entries without requiring a known
    /// `sha` up front. Used by the GitLab path (§4.6) to derive a subtree's
    /// identity before it has ever been told one.
    pub fn compute_sha(entries: &[TreeEntry]) -> ObjectId {
        let payload = encode_entries(entries);
        ObjectId::compute(ObjectKind::Tree, &payload)
    }

    /// Verifies `computeId("tree", encodeTree(entries)) == self.sha` (invariant 1, §8).
    pub fn verify(&self) -> Result<(), RecoveryError> {
        let payload = encode_entries(&self.entries);
        codec::verify_id(ObjectKind::Tree, &payload, self.sha, format!("tree {}", self.sha))
    }
}

fn encode_entries(entries: &[TreeEntry]) -> Vec<u8> {
    let borrowed: Vec<(u32, &str, ObjectId)> = entries
        .iter()
        .map(|e| (e.mode, e.name.as_str(), e.sha))
        .collect();
    codec::encode_tree(&borrowed)
}

impl GitObject for Tree {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Tree
    }

    fn to_payload(&self) -> Result<Vec<u8>, RecoveryError> {
        Ok(encode_entries(&self.entries))
    }
}
