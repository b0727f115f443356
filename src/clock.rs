//! Cancellation and deadline primitives shared across the pipeline.
//!
//! A [`CancelHandle`] wraps a [`tokio_util::sync::CancellationToken`]: cancelling
//! a Turn's handle transitively cancels every sub-operation spawned from it via
//! [`CancelHandle::child`]. [`race`] is the uniform way blocking calls respect
//! both a deadline and cancellation.

use crate::error::{AtlasError, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One-way cancellation signal, cheaply cloneable and shareable across tasks.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Create a new root cancel handle.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Create a child handle. Cancelling `self` cancels the child; cancelling
    /// the child alone does not affect `self`.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Trigger cancellation for this handle and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// `true` once [`CancelHandle::cancel`] has been called on this handle or
    /// an ancestor.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once cancellation is triggered.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Race a future against a deadline and a cancel handle.
///
/// Returns `Ok(T)` if `fut` completes first, [`AtlasError`] built from
/// `on_timeout` if the deadline elapses first, and `on_cancel` if the cancel
/// handle triggers first.
pub async fn race<T, F>(
    fut: F,
    deadline: Duration,
    cancel: &CancelHandle,
    on_timeout: impl FnOnce() -> AtlasError,
    on_cancel: impl FnOnce() -> AtlasError,
) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(on_cancel()),
        res = tokio::time::timeout(deadline, fut) => {
            res.map_err(|_| on_timeout())
        }
    }
}
