//! Error types for the dangling-object recovery engine.
//!
//! This module defines a unified error enumeration used across local inventory
//! scanning, remote forge queries, commit/tree reconstruction, and persistence.
//! It integrates with `thiserror` to provide rich `Display` implementations and
//! error source chaining where applicable.
//!
//! Notes:
//! - Each variant carries contextual details via its message payload.
//! - C3 absorbs transient errors via retry+sleep and only surfaces
//!   [`RecoveryError::Repository`] / [`RecoveryError::MaxAttempts`].
//! - C8 raises [`RecoveryError::InvalidSha`] locally; the orchestrator decides
//!   whether to forge or re-raise.

use thiserror::Error;

#[derive(Error, Debug)]
/// Unified error enumeration for the recovery engine.
pub enum RecoveryError {
    /// An external `git` subprocess returned a nonzero exit code.
    #[error("command failed -> {cmd}\nstderr -> {stderr}")]
    CommandExecution { cmd: String, stderr: String },

    /// The forge returned an unexpected shape, exhausted retries, or lacks auth.
    #[error("repository error: {0}")]
    Repository(String),

    /// A single call retried more than the hard ceiling (3) allows.
    #[error("maximum attempts to perform query reached")]
    MaxAttempts,

    /// Reconstructed bytes did not hash to the expected object id.
    #[error("invalid sha for {context}: expected {expected}, computed {computed}")]
    InvalidSha {
        expected: String,
        computed: String,
        context: String,
    },

    /// The local object store is inconsistent (e.g. an unknown object kind).
    #[error("git store error: {0}")]
    Git(String),

    /// Cooperative cancellation observed at an iteration boundary.
    #[error("cancelled")]
    Cancelled,

    /// I/O error from a subprocess pipe, the object store, or a summary file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed hex or wrong-length object id.
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    /// A forge reported a commit-signature verification status this engine does
    /// not recognize. Refuses to silently drop data instead of guessing.
    #[error("unknown commit signature status: {0}")]
    UnknownSignatureStatus(String),
}

pub type Result<T> = std::result::Result<T, RecoveryError>;
