//! Supervisor - background task lifecycle
//!
//! Every long-running task (the tailer, interval runners) is spawned through
//! the supervisor and holds a [`StopSignal`]. Stopping raises the signal once
//! for all of them; sleeps observe it immediately, so no task waits out its
//! full interval before exiting.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::guard;

/// Default time `join_timeout` waits before aborting stragglers
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Cooperative stop flag shared by supervised tasks
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// True once a stop has been requested
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleep for `duration`, waking early on stop
    ///
    /// Returns true if the sleep was cut short by a stop request.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_stopped() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_stopped(),
            _ = stop_requested(&mut self.rx) => true,
        }
    }
}

/// Resolves once the flag is raised or the supervisor is gone
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        let stopped = *rx.borrow_and_update();
        if stopped || rx.changed().await.is_err() {
            return;
        }
    }
}

/// Owns the background tasks of the process
pub struct Supervisor {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        debug!("Supervisor::new: called");
        let (stop_tx, _) = watch::channel(false);
        Self {
            stop_tx,
            tasks: Vec::new(),
        }
    }

    /// A stop flag tied to this supervisor
    pub fn stop_signal(&self) -> StopSignal {
        StopSignal {
            rx: self.stop_tx.subscribe(),
        }
    }

    /// Spawn a named task
    pub fn spawn<F>(&mut self, name: impl Into<String>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        debug!(task = %name, "Supervisor::spawn: called");
        self.tasks.push((name, tokio::spawn(task)));
    }

    /// Run `job` every `period` until stopped
    ///
    /// With `skip_first` the first run happens after one period instead of
    /// immediately. Runs execute on the blocking thread pool. Errors and
    /// panics from a run are logged and the schedule continues.
    pub fn add_interval<F>(&mut self, name: impl Into<String>, period: Duration, skip_first: bool, mut job: F)
    where
        F: FnMut() -> eyre::Result<()> + Send + 'static,
    {
        let name = name.into();
        let mut stop = self.stop_signal();
        let task_name = name.clone();

        self.spawn(name, async move {
            info!(task = %task_name, period_ms = period.as_millis() as u64, "Interval task started");
            if skip_first && stop.sleep(period).await {
                info!(task = %task_name, "Interval task stopped");
                return;
            }

            loop {
                let ran = tokio::task::spawn_blocking(move || {
                    let outcome = guard::catch(&mut job);
                    (job, outcome)
                })
                .await;

                let (returned, outcome) = match ran {
                    Ok(ran) => ran,
                    Err(e) => {
                        error!(task = %task_name, error = %e, "Interval task run aborted, stopping");
                        return;
                    }
                };
                job = returned;
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(task = %task_name, error = %e, "Interval task run failed"),
                    Err(panic) => error!(task = %task_name, panic = %panic, "Interval task run panicked"),
                }
                if stop.sleep(period).await {
                    break;
                }
            }
            info!(task = %task_name, "Interval task stopped");
        });
    }

    /// Number of supervised tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Raise the stop flag for every task
    pub fn stop(&self) {
        info!(tasks = self.tasks.len(), "Supervisor: stopping tasks");
        self.stop_tx.send_replace(true);
    }

    /// Wait for every task to finish
    pub async fn join(self) {
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                error!(task = %name, error = %e, "Task ended abnormally");
            }
        }
    }

    /// Wait up to `timeout` for the tasks, then abort the rest
    pub async fn join_timeout(self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        for (name, mut handle) in self.tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => debug!(task = %name, "Task finished"),
                Ok(Err(e)) => error!(task = %name, error = %e, "Task ended abnormally"),
                Err(_) => {
                    warn!(task = %name, "Task did not stop in time, aborting");
                    handle.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_sleep_wakes_on_stop() {
        let supervisor = Supervisor::new();
        let mut stop = supervisor.stop_signal();

        let sleeper = tokio::spawn(async move { stop.sleep(Duration::from_secs(3600)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        supervisor.stop();

        let interrupted = tokio::time::timeout(Duration::from_secs(5), sleeper).await.unwrap().unwrap();
        assert!(interrupted);
    }

    #[tokio::test]
    async fn test_sleep_runs_full_without_stop() {
        let supervisor = Supervisor::new();
        let mut stop = supervisor.stop_signal();
        assert!(!stop.sleep(Duration::from_millis(5)).await);
        assert!(!stop.is_stopped());
    }

    #[tokio::test]
    async fn test_stop_signal_after_stop_is_stopped() {
        let supervisor = Supervisor::new();
        supervisor.stop();
        let mut stop = supervisor.stop_signal();
        assert!(stop.is_stopped());
        assert!(stop.sleep(Duration::from_secs(3600)).await);
    }

    #[tokio::test]
    async fn test_interval_runs_immediately() {
        let mut supervisor = Supervisor::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        supervisor.add_interval("count", Duration::from_secs(3600), false, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        supervisor.stop();
        supervisor.join().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_interval_skip_first() {
        let mut supervisor = Supervisor::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        supervisor.add_interval("count", Duration::from_secs(3600), true, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        supervisor.stop();
        supervisor.join().await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_interval_survives_failures() {
        let mut supervisor = Supervisor::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        supervisor.add_interval("flaky", Duration::from_millis(5), false, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            match n {
                0 => Err(eyre::eyre!("first run fails")),
                1 => panic!("second run panics"),
                _ => Ok(()),
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        supervisor.stop();
        supervisor.join().await;
        assert!(runs.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_interval_blocking_job_leaves_runtime_free() {
        let mut supervisor = Supervisor::new();
        let job_thread = Arc::new(std::sync::Mutex::new(None));
        let slot = job_thread.clone();
        supervisor.add_interval("slow", Duration::from_secs(3600), false, move || {
            *slot.lock().unwrap() = Some(std::thread::current().id());
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        });

        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_millis(250));

        supervisor.stop();
        supervisor.join().await;
        let job_thread = job_thread.lock().unwrap().expect("job ran");
        assert_ne!(job_thread, std::thread::current().id());
    }

    #[tokio::test]
    async fn test_join_timeout_aborts_stuck_task() {
        let mut supervisor = Supervisor::new();
        supervisor.spawn("stuck", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        assert_eq!(supervisor.len(), 1);

        supervisor.stop();
        let joined = tokio::time::timeout(
            Duration::from_secs(5),
            supervisor.join_timeout(Duration::from_millis(20)),
        )
        .await;
        assert!(joined.is_ok());
    }
}
