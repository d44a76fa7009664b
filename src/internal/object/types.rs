//! Object kind enumeration shared by the codec, inventory, and tree walker.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// The four object kinds a git repository (and this engine) ever stores.
///
/// `git cat-file --batch-check --batch-all-objects` reports exactly these four
/// kind names; C2 fails on anything else (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectKind {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            ObjectKind::Commit => b"commit",
            ObjectKind::Tree => b"tree",
            ObjectKind::Blob => b"blob",
            ObjectKind::Tag => b"tag",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Commit => "commit",
            ObjectKind::Tree => "tree",
            ObjectKind::Blob => "blob",
            ObjectKind::Tag => "tag",
        }
    }
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectKind {
    type Err = crate::errors::RecoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commit" => Ok(ObjectKind::Commit),
            "tree" => Ok(ObjectKind::Tree),
            "blob" => Ok(ObjectKind::Blob),
            "tag" => Ok(ObjectKind::Tag),
            other => Err(crate::errors::RecoveryError::Git(format!(
                "unknown object type: {other}"
            ))),
        }
    }
}
