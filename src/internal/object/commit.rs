//! The `Commit` object and its resolution state machine.
//!
//! A commit starts life as a bare, `UNKNOWN` sha discovered somewhere in the
//! forge's dangling-hash sources or as another commit's parent pointer. The
//! commit graph resolver (C5, `crate::graph`) walks it through
//! `INCOMPLETE` to a terminal state as metadata arrives.

use std::collections::BTreeSet;

use crate::codec;
use crate::errors::RecoveryError;
use crate::hash::ObjectId;
use crate::internal::object::GitObject;
use crate::internal::object::signature::{CommitSignature, Person, SignatureStatus};
use crate::internal::object::types::ObjectKind;

/// §3: UNKNOWN → INCOMPLETE (discovered as a parent pointer), UNKNOWN/INCOMPLETE
/// → FOUND (full metadata retrieved), UNKNOWN → ERASED (forge reports absent).
/// FOUND and ERASED are terminal; no commit ever leaves them (invariant 3, §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CommitState {
    Unknown,
    Incomplete,
    Found,
    Erased,
}

impl CommitState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommitState::Found | CommitState::Erased)
    }
}

/// A commit in the dangling graph, at whatever resolution state it has
/// reached. `parents` preserves first-sighting insertion order (needed by
/// C8's parent-permutation search, which otherwise has no canonical starting
/// order); `children` is the graph's reverse index, populated only for
/// parents that are themselves tracked in the dangling graph.
#[derive(Debug, Clone)]
pub struct Commit {
    pub sha: ObjectId,
    pub state: CommitState,
    pub tree: Option<ObjectId>,
    pub parents: Vec<ObjectId>,
    pub children: BTreeSet<ObjectId>,
    pub author: Option<Person>,
    pub committer: Option<Person>,
    pub message: Option<String>,
    pub signature: Option<CommitSignature>,
}

impl Commit {
    pub fn unknown(sha: ObjectId) -> Self {
        Commit {
            sha,
            state: CommitState::Unknown,
            tree: None,
            parents: Vec::new(),
            children: BTreeSet::new(),
            author: None,
            committer: None,
            message: None,
            signature: None,
        }
    }

    pub fn incomplete(sha: ObjectId, child: ObjectId) -> Self {
        let mut commit = Commit::unknown(sha);
        commit.state = CommitState::Incomplete;
        commit.children.insert(child);
        commit
    }

    pub fn add_parent(&mut self, parent: ObjectId) {
        if !self.parents.contains(&parent) {
            self.parents.push(parent);
        }
    }

    /// Best-effort unsigned encoding using the commit's own canonical
    /// author/committer rendering and verbatim message — the single variant
    /// most dangling commits actually need. Full variant enumeration lives in
    /// `crate::reconstruct` (C8).
    pub fn encode_unsigned_canonical(&self) -> Result<Vec<u8>, RecoveryError> {
        let tree = self
            .tree
            .ok_or_else(|| RecoveryError::Git(format!("commit {} missing tree", self.sha)))?;
        let author = self
            .author
            .as_ref()
            .ok_or_else(|| RecoveryError::Git(format!("commit {} missing author", self.sha)))?;
        let committer = self
            .committer
            .as_ref()
            .ok_or_else(|| RecoveryError::Git(format!("commit {} missing committer", self.sha)))?;
        let message = self
            .message
            .as_ref()
            .ok_or_else(|| RecoveryError::Git(format!("commit {} missing message", self.sha)))?;

        Ok(codec::encode_commit_unsigned(
            tree,
            &self.parents,
            &author.render_canonical()?,
            &committer.render_canonical()?,
            message,
        ))
    }
}

impl GitObject for Commit {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Commit
    }

    fn to_payload(&self) -> Result<Vec<u8>, RecoveryError> {
        if let Some(sig) = &self.signature {
            if sig.status != SignatureStatus::Unsigned {
                if let (Some(payload), Some(block)) = (&sig.payload, &sig.signature_block) {
                    return Ok(codec::encode_commit_signed(payload, block));
                }
            }
        }
        self.encode_unsigned_canonical()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sha(n: u8) -> ObjectId {
        let hex = format!("{:02x}", n).repeat(20);
        ObjectId::from_str(&hex).unwrap()
    }

    #[test]
    fn add_parent_is_idempotent_and_preserves_order() {
        let mut commit = Commit::unknown(sha(1));
        commit.add_parent(sha(2));
        commit.add_parent(sha(3));
        commit.add_parent(sha(2));
        assert_eq!(commit.parents, vec![sha(2), sha(3)]);
    }

    #[test]
    fn incomplete_seeds_child_link() {
        let commit = Commit::incomplete(sha(1), sha(9));
        assert_eq!(commit.state, CommitState::Incomplete);
        assert!(commit.children.contains(&sha(9)));
    }

    #[test]
    fn terminal_states() {
        assert!(CommitState::Found.is_terminal());
        assert!(CommitState::Erased.is_terminal());
        assert!(!CommitState::Incomplete.is_terminal());
        assert!(!CommitState::Unknown.is_terminal());
    }
}
