//! A dangling branch record: the head of one connected component of the
//! recovered commit graph, ready to become a `dangling_branch_<sha>` ref.

use crate::hash::ObjectId;

#[derive(Debug, Clone)]
pub struct Branch {
    /// The commit with no dangling children — the natural ref target.
    pub end_commit: ObjectId,
    /// Dangling commits whose parent reconnects to local (non-dangling) history.
    pub origins: Vec<ObjectId>,
    /// Distinct dangling commits reachable from `end_commit` via parent walk,
    /// inclusive of `end_commit`.
    pub length: usize,
}
