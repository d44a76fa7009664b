//! C4: Hash-Source Aggregator.
//!
//! Unions every forge-specific dangling-hash source the remote client
//! exposes, then subtracts what's already local. The all-zero sha and empty
//! strings are filtered at the dialect boundary (§4.4); this module only
//! owns the set-subtraction against [`LocalInventory`].

use std::collections::HashSet;

use tracing::info;

use crate::errors::Result;
use crate::hash::ObjectId;
use crate::inventory::LocalInventory;
use crate::remote::RemoteClient;

/// `dangling_ids = candidates - (LocalInventory.commits ∪ LocalInventory.tags)`.
/// Invariant 4 (§8): the result is disjoint from `local_ids` by construction.
pub async fn aggregate_candidates(
    client: &dyn RemoteClient,
    inventory: &LocalInventory,
) -> Result<HashSet<ObjectId>> {
    let candidates = client.dangling_hashes().await?;

    let dangling: HashSet<ObjectId> = candidates
        .into_iter()
        .filter(|id| !id.is_zero())
        .filter(|id| !inventory.commits.contains(id) && !inventory.tags.contains(id))
        .collect();

    info!(count = dangling.len(), "aggregated dangling hash candidates");
    Ok(dangling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{BlobClass, CommitRecord, HydratedTree, RemoteTreeEntry};
    use async_trait::async_trait;
    use std::str::FromStr;

    struct StubClient {
        candidates: Vec<ObjectId>,
    }

    #[async_trait]
    impl RemoteClient for StubClient {
        async fn dangling_hashes(&self) -> Result<Vec<ObjectId>> {
            Ok(self.candidates.clone())
        }
        async fn fetch_commit_batch(&self, _shas: &[ObjectId]) -> Result<Vec<Option<CommitRecord>>> {
            Ok(Vec::new())
        }
        async fn fetch_tree_batch(&self, _shas: &[ObjectId]) -> Result<Vec<Option<Vec<RemoteTreeEntry>>>> {
            Ok(Vec::new())
        }
        async fn classify_blobs(&self, _shas: &[ObjectId]) -> Result<Vec<BlobClass>> {
            Ok(Vec::new())
        }
        async fn fetch_blob(&self, _sha: &ObjectId) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn hydrate_commit_tree(&self, _commit_sha: ObjectId) -> Result<Option<HydratedTree>> {
            Ok(None)
        }
    }

    fn sha(n: u8) -> ObjectId {
        ObjectId::from_str(&format!("{:02x}", n).repeat(20)).unwrap()
    }

    #[tokio::test]
    async fn subtracts_local_commits_and_tags_and_drops_zero() {
        let mut inventory = LocalInventory::default();
        inventory.commits.insert(sha(1));
        inventory.tags.insert(sha(2));

        let client = StubClient {
            candidates: vec![sha(1), sha(2), sha(3), ObjectId::ZERO],
        };

        let dangling = aggregate_candidates(&client, &inventory).await.unwrap();
        assert_eq!(dangling, HashSet::from([sha(3)]));
    }
}
