//! The `Blob` object: file content addressed by its git sha. Bytes are
//! populated only once downloaded — a blob discovered in a tree walk but not
//! yet fetched is a bare id.

use crate::errors::RecoveryError;
use crate::hash::ObjectId;
use crate::internal::object::GitObject;
use crate::internal::object::types::ObjectKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub sha: ObjectId,
    pub bytes: Option<Vec<u8>>,
}

impl Blob {
    pub fn pending(sha: ObjectId) -> Self {
        Blob { sha, bytes: None }
    }

    pub fn verify(&self) -> Result<(), RecoveryError> {
        let bytes = self
            .bytes
            .as_ref()
            .ok_or_else(|| RecoveryError::Git(format!("blob {} has no content to verify", self.sha)))?;
        let computed = ObjectId::compute(ObjectKind::Blob, bytes);
        if computed == self.sha {
            Ok(())
        } else {
            Err(RecoveryError::InvalidSha {
                expected: self.sha.to_string(),
                computed: computed.to_string(),
                context: format!("blob {}", self.sha),
            })
        }
    }
}

impl GitObject for Blob {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Blob
    }

    fn to_payload(&self) -> Result<Vec<u8>, RecoveryError> {
        self.bytes
            .clone()
            .ok_or_else(|| RecoveryError::Git(format!("blob {} has no content", self.sha)))
    }
}
