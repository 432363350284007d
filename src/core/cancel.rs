//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Result, SvalignError};

/// Checked between strips, recursion levels and alignments; never inside
/// tight DP loops. A token can also carry a per-read deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Errors with `Cancelled` once the token fired or the deadline passed.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SvalignError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_passes() {
        assert!(CancelToken::new().check().is_ok());
    }

    #[test]
    fn cancelled_token_errors() {
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(token.check(), Err(SvalignError::Cancelled)));
    }

    #[test]
    fn elapsed_deadline_errors() {
        let token = CancelToken::with_deadline(Instant::now());
        assert!(token.check().is_err());
    }
}
