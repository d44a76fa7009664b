//! C8: Reconstruction Engine.
//!
//! For each FOUND commit, attempts exact serialization such that
//! `computeId("commit", bytes) == commit.sha`. Signed commits use the
//! forge-provided payload directly; unsigned commits enumerate the Cartesian
//! product of plausible variants (message trailer, caret-unescaping, parent
//! order, author/committer timezone) and halt on the first id match (§4.8).

use tracing::debug;

use crate::codec;
use crate::errors::{RecoveryError, Result};
use crate::hash::ObjectId;
use crate::internal::object::commit::Commit;
use crate::internal::object::signature::SignatureStatus;
use crate::internal::object::types::ObjectKind;

/// The outcome of attempting to reconstruct one commit's bytes.
#[derive(Debug, Clone)]
pub enum ReconstructOutcome {
    /// A variant's bytes hashed to `commit.sha` exactly.
    Exact { payload: Vec<u8> },
    /// No variant matched; the orchestrator may fall back to forgery for
    /// unsigned commits only (§4.8). `payload` is the best-effort
    /// canonical-variant bytes, used to build the forged object.
    NoMatch { payload: Vec<u8> },
}

/// Attempts reconstruction of `commit`. Signed commits never forge: a
/// signature mismatch means the bytes are simply wrong, and forging would
/// only produce a commit whose embedded signature fails GPG verification
/// without any compensating benefit.
pub fn reconstruct(commit: &Commit) -> Result<ReconstructOutcome> {
    let signature = commit
        .signature
        .as_ref()
        .ok_or_else(|| RecoveryError::Git(format!("commit {} missing signature status", commit.sha)))?;

    if signature.status != SignatureStatus::Unsigned {
        let payload = signature
            .payload
            .as_ref()
            .ok_or_else(|| RecoveryError::Repository(format!("commit {} signed but missing payload", commit.sha)))?;
        let block = signature.signature_block.as_ref().ok_or_else(|| {
            RecoveryError::Repository(format!("commit {} signed but missing signature block", commit.sha))
        })?;
        let bytes = codec::encode_commit_signed(payload, block);
        codec::verify_id(ObjectKind::Commit, &bytes, commit.sha, format!("signed commit {}", commit.sha))?;
        return Ok(ReconstructOutcome::Exact { payload: bytes });
    }

    reconstruct_unsigned(commit)
}

fn reconstruct_unsigned(commit: &Commit) -> Result<ReconstructOutcome> {
    let tree = commit
        .tree
        .ok_or_else(|| RecoveryError::Git(format!("commit {} missing tree", commit.sha)))?;
    let raw_message = commit
        .message
        .as_ref()
        .ok_or_else(|| RecoveryError::Git(format!("commit {} missing message", commit.sha)))?;
    let author = commit
        .author
        .as_ref()
        .ok_or_else(|| RecoveryError::Git(format!("commit {} missing author", commit.sha)))?;
    let committer = commit
        .committer
        .as_ref()
        .ok_or_else(|| RecoveryError::Git(format!("commit {} missing committer", commit.sha)))?;

    let unescaped = codec::unescape_caret_controls(raw_message);
    let message_variants = [
        unescaped.clone(),
        format!("{unescaped}\n"),
        format!("{unescaped}\n\n"),
    ];

    let parent_orders = permutations(&commit.parents);
    let author_variants = author.variants();
    let committer_variants = committer.variants();

    let mut first_candidate = None;

    for parents in &parent_orders {
        for message in &message_variants {
            for author_str in &author_variants {
                for committer_str in &committer_variants {
                    let bytes = codec::encode_commit_unsigned(tree, parents, author_str, committer_str, message);
                    if first_candidate.is_none() {
                        first_candidate = Some(bytes.clone());
                    }
                    let computed = ObjectId::compute(ObjectKind::Commit, &bytes);
                    if computed == commit.sha {
                        return Ok(ReconstructOutcome::Exact { payload: bytes });
                    }
                }
            }
        }
    }

    debug!(sha = %commit.sha, variants_tried = parent_orders.len() * message_variants.len() * author_variants.len() * committer_variants.len(), "no reconstruction variant matched");
    Ok(ReconstructOutcome::NoMatch {
        payload: first_candidate.unwrap_or_default(),
    })
}

/// All distinct permutations of a small slice. Typical commits have ≤2
/// parents; this is never called on anything large enough for the `n!`
/// blow-up to matter.
fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let pivot = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, pivot.clone());
            out.push(tail);
        }
    }
    out
}
