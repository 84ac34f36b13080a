//! Cancellation handle threaded through long-running scans.

use tokio_util::sync::CancellationToken;

use crate::error::VcsError;

/// Cooperative cancellation for status queries.
///
/// Each dispatched scan gets a [`ProgressToken::child`] of the scheduler's
/// root token, so cancelling the root stops every scan while cancelling a
/// child stops only that one.
#[derive(Debug, Clone, Default)]
pub struct ProgressToken {
    cancel: CancellationToken,
}

impl ProgressToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled together with `self`.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Bail out of the current unit of work if cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::Cancelled`] once the token has been cancelled.
    pub fn check(&self) -> std::result::Result<(), VcsError> {
        if self.is_cancelled() {
            Err(VcsError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Underlying token, for use in async `select!` arms.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
