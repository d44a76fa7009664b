//! SHA-1 object identifiers for recovered Git objects.
//!
//! A git object's id is always `SHA1("<kind> <len>\0<payload>")`. Unlike the
//! upstream git-internal crate this engine only ever talks to SHA-1 forges, so
//! there is no per-thread hash-kind selector here: one algorithm, one type.

use std::{fmt::Display, str::FromStr};

use hex::FromHexError;
use serde::{Deserialize, Serialize};
use sha1::Digest;

use crate::internal::object::types::ObjectKind;

/// A 40-lowercase-hex SHA-1 object id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    pub const ZERO: ObjectId = ObjectId([0u8; 20]);

    /// `SHA1("<kind> <len>\0<payload>")`, per the on-disk git object header.
    pub fn compute(kind: ObjectKind, payload: &[u8]) -> ObjectId {
        let mut header = Vec::with_capacity(payload.len() + 24);
        header.extend(kind.as_bytes());
        header.push(b' ');
        header.extend(payload.len().to_string().as_bytes());
        header.push(0);
        header.extend(payload);

        let digest = sha1::Sha1::digest(&header);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest);
        ObjectId(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> crate::errors::Result<ObjectId> {
        if bytes.len() != 20 {
            return Err(crate::errors::RecoveryError::InvalidObjectId(format!(
                "expected 20 raw bytes, got {}",
                bytes.len()
            )));
        }
        let mut b = [0u8; 20];
        b.copy_from_slice(bytes);
        Ok(ObjectId(b))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl std::fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for ObjectId {
    type Err = crate::errors::RecoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 40 {
            return Err(crate::errors::RecoveryError::InvalidObjectId(format!(
                "expected 40 hex chars, got {} ({s})",
                s.len()
            )));
        }
        let bytes: Vec<u8> = hex::decode(s)
            .map_err(|e: FromHexError| crate::errors::RecoveryError::InvalidObjectId(e.to_string()))?;
        ObjectId::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_matches_known_blob_sha() {
        // `git hash-object` of the empty blob.
        let id = ObjectId::compute(ObjectKind::Blob, b"");
        assert_eq!(id.to_string(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn round_trips_through_hex() {
        let id = ObjectId::compute(ObjectKind::Blob, b"hello\n");
        let parsed: ObjectId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!("abc".parse::<ObjectId>().is_err());
    }

    #[test]
    fn zero_is_zero() {
        assert!(ObjectId::ZERO.is_zero());
        assert_eq!(
            ObjectId::ZERO.to_string(),
            "0000000000000000000000000000000000000000"
        );
    }
}
