//! A cloneable handle for poking the session from external code.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::Failure;

/// A cloneable handle for poking the session from external code.
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) cancel: Arc<Mutex<CancellationToken>>,
    pub(crate) idle_notify: Arc<tokio::sync::Notify>,
    pub(crate) busy: Arc<AtomicBool>,
}

impl SessionHandle {
    pub(crate) fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            idle_notify: Arc::new(tokio::sync::Notify::new()),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Abort whatever request is in flight.
    ///
    /// The next request gets a fresh token, so aborting is not sticky.
    pub fn abort(&self) {
        self.renew();
    }

    /// Cancel the current token and install a fresh one.
    pub(crate) fn renew(&self) {
        let mut token = self.cancel.lock();
        token.cancel();
        *token = CancellationToken::new();
    }

    /// Token for a request that is about to start.
    pub(crate) fn token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    pub(crate) fn set_busy(&self, busy: bool) {
        let was = self.busy.swap(busy, Ordering::AcqRel);
        if was && !busy {
            self.idle_notify.notify_waiters();
        }
    }

    /// Whether a send or page fetch is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Wait until no request is in flight.
    pub async fn wait_for_idle(&self) {
        let notified = self.idle_notify.notified();
        if !self.is_busy() {
            return;
        }
        notified.await;
    }

    /// Wait until idle, with a timeout.
    /// Returns `true` if idle was reached, `false` on timeout.
    pub async fn wait_for_idle_timeout(&self, timeout: Duration) -> bool {
        if !self.is_busy() {
            return true;
        }
        tokio::time::timeout(timeout, self.wait_for_idle())
            .await
            .is_ok()
    }
}

/// Race a backend call against its timeout and cancellation token.
pub(crate) async fn guarded<T, F>(
    cancel: CancellationToken,
    timeout: Duration,
    request: F,
) -> Result<T, Failure>
where
    F: Future<Output = parley_api::Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Failure::Cancelled),
        outcome = tokio::time::timeout(timeout, request) => match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Failure::Api(e)),
            Err(_) => Err(Failure::TimedOut(timeout)),
        },
    }
}
