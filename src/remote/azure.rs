//! Azure DevOps is a recognized forge name but has no implementation (§9):
//! the client factory fails fast rather than half-guessing at its API shape.

use crate::errors::RecoveryError;

pub fn unimplemented_error() -> RecoveryError {
    RecoveryError::Repository(
        "azure_devops is recognized but not implemented; pass --server github or --server gitlab".to_string(),
    )
}
