//! Object model for recovered Git commits, trees, and blobs, plus the
//! supporting `Person`/`Signature` types that make up a commit's identity
//! and (optional) GPG provenance.

pub mod blob;
pub mod branch;
pub mod commit;
pub mod signature;
pub mod tree;
pub mod types;

use crate::{errors::RecoveryError, hash::ObjectId, internal::object::types::ObjectKind};

/// Common interface for the three reconstructible git object kinds.
///
/// Mirrors the on-disk git object model: a type tag plus a byte payload whose
/// SHA-1 (with the `"<kind> <len>\0"` header) is the object's id.
pub trait GitObject {
    fn kind(&self) -> ObjectKind;

    /// Serializes to the exact on-disk payload (header-less; the header is
    /// added by [`ObjectId::compute`]).
    fn to_payload(&self) -> Result<Vec<u8>, RecoveryError>;

    /// Computes the object id from the serialized payload.
    fn object_id(&self) -> Result<ObjectId, RecoveryError> {
        let payload = self.to_payload()?;
        Ok(ObjectId::compute(self.kind(), &payload))
    }
}
