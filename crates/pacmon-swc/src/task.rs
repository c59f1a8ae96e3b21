//! ---
//! pac_section: "03-device-source"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "SWC heat-pump session, decoder and supervising source."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
use std::future::Future;

use tokio::task::{JoinError, JoinHandle};

/// Spawned task that is aborted when the guard goes out of scope.
pub(crate) struct TaskGuard<T> {
    handle: JoinHandle<T>,
    joined: bool,
}

impl<T: Send + 'static> TaskGuard<T> {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
            joined: false,
        }
    }

    /// Wait for the task. Safe to poll from `select!` since the handle is borrowed.
    pub(crate) async fn join(&mut self) -> Result<T, JoinError> {
        let result = (&mut self.handle).await;
        self.joined = true;
        result
    }

    /// Abort the task and wait until it is gone. Nothing it does can happen afterwards.
    pub(crate) async fn stop(mut self) {
        if !self.joined {
            self.handle.abort();
            let _ = (&mut self.handle).await;
        }
    }
}

impl<T> Drop for TaskGuard<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::{self, error::TryRecvError};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stopped_task_is_gone_when_stop_returns() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let guard = TaskGuard::spawn(async move {
            while tx.send(()).is_ok() {
                tokio::task::yield_now().await;
            }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;

        guard.stop().await;
        while rx.try_recv().is_ok() {}
        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[tokio::test]
    async fn stopping_a_joined_task_is_a_no_op() {
        let mut guard = TaskGuard::spawn(async { 7 });
        assert_eq!(guard.join().await.unwrap(), 7);
        guard.stop().await;
    }
}
