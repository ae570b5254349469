//! Restartable background task runner
//!
//! Both control loops (serial link, remote control) follow the same
//! lifecycle: at most one run in flight, where starting a new run
//! first cancels the old one and waits for it to exit. Configuration
//! changes from the UI race against each other and against shutdown,
//! so the cancel-old / await-old / install-new sequence has to be
//! atomic with respect to concurrent calls.
//!
//! Cancellation is cooperative: run bodies receive a
//! [`CancellationToken`] and must select on it at every await point.

use std::future::Future;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct Run {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// At-most-one-active-instance background task
///
/// [`restart`](RestartableTask::restart) and
/// [`cancel`](RestartableTask::cancel) serialize through an async
/// mutex, so callers on different tasks can race freely. A run that
/// exits on its own (I/O error) leaves stale bookkeeping behind; the
/// next restart simply awaits the already-finished handle.
pub struct RestartableTask {
    name: &'static str,
    current: Mutex<Option<Run>>,
}

impl RestartableTask {
    /// Create an idle task runner; `name` shows up in logs only
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            current: Mutex::new(None),
        }
    }

    /// Begin a new logical run, fully stopping any current run first
    ///
    /// The previous run has observably exited before `run` is spawned;
    /// its cancellation is treated as a normal outcome, never an
    /// error.
    pub async fn restart<F, Fut>(&self, run: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut current = self.current.lock().await;
        self.stop(&mut current).await;
        let cancel = CancellationToken::new();
        debug!(task = self.name, "starting run");
        let handle = tokio::spawn(run(cancel.clone()));
        *current = Some(Run { cancel, handle });
    }

    /// Cancel and await the current run, leaving the instance idle
    pub async fn cancel(&self) {
        let mut current = self.current.lock().await;
        self.stop(&mut current).await;
    }

    /// Whether a run is currently installed
    ///
    /// A run that exited on its own still counts until the next
    /// restart or cancel clears it.
    pub async fn is_running(&self) -> bool {
        self.current.lock().await.is_some()
    }

    async fn stop(&self, current: &mut Option<Run>) {
        if let Some(run) = current.take() {
            run.cancel.cancel();
            if let Err(e) = run.handle.await {
                // Cancellation is the expected path; a panic must not
                // poison the runner, the next restart proceeds anyway.
                if e.is_panic() {
                    warn!(task = self.name, "run panicked: {e}");
                }
            }
            debug!(task = self.name, "run stopped");
        }
    }
}

impl Drop for RestartableTask {
    /// Best-effort teardown: cancel without awaiting
    fn drop(&mut self) {
        if let Ok(mut current) = self.current.try_lock() {
            if let Some(run) = current.take() {
                run.cancel.cancel();
                run.handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_restart_awaits_previous_before_spawning_next() {
        let task = RestartableTask::new("test");
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let first_log = log.clone();
        task.restart(move |token| async move {
            token.cancelled().await;
            first_log.lock().unwrap().push("first cancelled");
        })
        .await;

        let second_log = log.clone();
        task.restart(move |_token| async move {
            second_log.lock().unwrap().push("second started");
        })
        .await;

        task.cancel().await;
        let log = log.lock().unwrap();
        assert_eq!(*log, vec!["first cancelled", "second started"]);
    }

    #[tokio::test]
    async fn test_rapid_restarts_leave_one_run_active() {
        let task = RestartableTask::new("test");
        let active = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let active = active.clone();
            task.restart(move |token| async move {
                active.fetch_add(1, Ordering::SeqCst);
                token.cancelled().await;
                active.fetch_sub(1, Ordering::SeqCst);
            })
            .await;
        }

        // Both restarts have settled; only the second run is alive.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(active.load(Ordering::SeqCst), 1);

        task.cancel().await;
        assert_eq!(active.load(Ordering::SeqCst), 0);
        assert!(!task.is_running().await);
    }

    #[tokio::test]
    async fn test_panicked_run_does_not_poison_runner() {
        let task = RestartableTask::new("test");
        task.restart(|_token| async move {
            panic!("boom");
        })
        .await;

        // The panic is reaped here and swallowed.
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        task.restart(move |_token| async move {
            ran2.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        task.cancel().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_restarts_serialize() {
        let task = Arc::new(RestartableTask::new("test"));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut joins = Vec::new();
        for _ in 0..8 {
            let task = task.clone();
            let active = active.clone();
            let peak = peak.clone();
            joins.push(tokio::spawn(async move {
                task.restart(move |token| async move {
                    let n = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(n, Ordering::SeqCst);
                    token.cancelled().await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }));
        }
        for join in joins {
            join.await.unwrap();
        }
        task.cancel().await;
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }
}
