use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::runtime::registry::ProcessRegistry;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Process-wide state handed to every worker: the one-shot shutdown flag
/// and the registry of live push processes.
///
/// Cloning is cheap and every clone observes the same flag.
#[derive(Debug, Clone)]
pub struct SupervisorContext {
    shutdown: CancellationToken,
    requested: Arc<AtomicBool>,
    registry: Arc<ProcessRegistry>,
    grace_period: Duration,
}

impl SupervisorContext {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            shutdown: CancellationToken::new(),
            requested: Arc::new(AtomicBool::new(false)),
            registry: Arc::new(ProcessRegistry::new()),
            grace_period,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Sets the shutdown flag. Returns `true` only for the request that
    /// actually set it; the flag is never cleared.
    pub fn request_shutdown(&self) -> bool {
        if self.requested.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shutdown.cancel();
        true
    }

    /// Completes once shutdown has been requested.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.shutdown.cancelled()
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }
}

impl Default for SupervisorContext {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}



#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_is_one_shot() {
        let ctx = SupervisorContext::default();
        let other = ctx.clone();
        assert!(!other.is_cancelled());

        assert!(ctx.request_shutdown());
        assert!(other.is_cancelled());
        assert!(!other.request_shutdown());
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_wakes_waiters() {
        let ctx = SupervisorContext::default();
        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.cancelled().await })
        };
        ctx.request_shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
