//! Execution budget and run cancellation.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Budget for a run.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    /// Max identities in flight at once
    pub max_concurrent: NonZeroUsize,
    /// Time budget per identity (None = unbounded)
    pub time_per_identity: Option<Duration>,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_concurrent: NonZeroUsize::MIN,
            time_per_identity: None,
        }
    }
}

impl Budget {
    /// Create a new budget.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max concurrent identities.
    pub fn with_max_concurrent(mut self, max: NonZeroUsize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set time budget per identity.
    pub fn with_time_per_identity(mut self, duration: Duration) -> Self {
        self.time_per_identity = Some(duration);
        self
    }
}

/// Stops a run: no new identity starts and in-flight ones are abandoned.
#[derive(Debug, Clone)]
pub struct StopHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Create a handle that has not been triggered.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Request the run to stop.
    pub fn stop(&self) {
        self.sender.send_replace(true);
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once a stop is requested.
    pub async fn stopped(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this only ends on a stop.
        let _ = receiver.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_builder() {
        let budget = Budget::new()
            .with_max_concurrent(NonZeroUsize::new(4).unwrap())
            .with_time_per_identity(Duration::from_secs(2));
        assert_eq!(budget.max_concurrent.get(), 4);
        assert_eq!(budget.time_per_identity, Some(Duration::from_secs(2)));
        assert_eq!(Budget::default().max_concurrent.get(), 1);
    }

    #[tokio::test]
    async fn test_stop_handle() {
        let handle = StopHandle::new();
        assert!(!handle.is_stopped());

        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.stopped().await })
        };
        handle.stop();
        waiter.await.unwrap();
        assert!(handle.is_stopped());

        // already stopped handles resolve immediately
        handle.stopped().await;
    }
}
