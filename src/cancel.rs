//! Cooperative cancellation (§5): checked at C5/C6 iteration boundaries and
//! between per-blob fetches in C3. In-flight requests are never aborted
//! mid-stream — only the next boundary observes the flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::{RecoveryError, Result};

#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RecoveryError::Cancelled)
        } else {
            Ok(())
        }
    }
}
