use tokio::sync::RwLock;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;

/// Admits writes until the writer is closed, and lets [`close`](Self::close) drain them.
///
/// Admission takes the shared lock without waiting. While [`close`](Self::close) holds or waits
/// for the exclusive lock, admission fails immediately instead of queueing behind it. Admitted
/// writes hold a tracker token until they finish, and `close` waits for all tokens before it marks
/// the barrier closed.
#[derive(Debug, Default)]
pub struct ShutdownBarrier {
    closed: RwLock<bool>,
    tracker: TaskTracker,
}

impl ShutdownBarrier {
    /// Creates an open barrier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a write, returning the token it must hold while performing I/O.
    ///
    /// Returns `None` if the barrier is closed or closing.
    pub fn admit(&self) -> Option<TaskTrackerToken> {
        let closed = self.closed.try_read().ok()?;
        if *closed {
            return None;
        }

        Some(self.tracker.token())
    }

    /// Returns `true` once [`close`](Self::close) has completed.
    pub fn is_closed(&self) -> bool {
        self.closed.try_read().map(|closed| *closed).unwrap_or(false)
    }

    /// Waits for all admitted writes and rejects all further writes.
    ///
    /// Calling this more than once is allowed. Later calls return once the first call completed.
    pub async fn close(&self) {
        let mut closed = self.closed.write().await;

        self.tracker.close();
        self.tracker.wait().await;

        *closed = true;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_admit_until_closed() {
        let barrier = ShutdownBarrier::new();

        let token = barrier.admit();
        assert!(token.is_some());
        drop(token);

        barrier.close().await;
        assert!(barrier.is_closed());
        assert!(barrier.admit().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_waits_for_admitted() {
        let barrier = Arc::new(ShutdownBarrier::new());
        let token = barrier.admit().unwrap();

        let closing = tokio::spawn({
            let barrier = Arc::clone(&barrier);
            async move { barrier.close().await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!closing.is_finished());

        // Writes are rejected while the barrier is closing.
        assert!(barrier.admit().is_none());
        assert!(!barrier.is_closed());

        drop(token);
        closing.await.unwrap();
        assert!(barrier.is_closed());
    }

    #[tokio::test]
    async fn test_close_twice() {
        let barrier = ShutdownBarrier::new();
        barrier.close().await;
        barrier.close().await;
        assert!(barrier.admit().is_none());
    }
}
