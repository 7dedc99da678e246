//! # Periodic tasks
//!
//! A `PeriodicTask` runs a closure on its own named thread at a fixed rate
//! until either the closure asks to stop or the owner calls `stop`. Each task
//! is independent, there is no shared event loop, so any state the closure
//! touches must be shared through `Arc` and a lock.
//!
//! The thread waits on a stop channel between runs so stopping never has to
//! wait a full period.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use log::{trace, warn};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Handle to a running periodic task.
///
/// Dropping the handle stops the task.
pub struct PeriodicTask {
    name: String,

    stop_sender: Option<Sender<()>>,

    handle: Option<JoinHandle<()>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Value returned by a periodic closure to control the task.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskFlow {
    /// Run again at the next period
    Continue,

    /// Exit the task thread
    Stop,
}

/// Errors which can occur when managing a periodic task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Cannot run a periodic task with a zero period")]
    ZeroPeriod,

    #[error("Could not spawn the task thread: {0}")]
    SpawnError(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PeriodicTask {
    /// Spawn a new task which calls `func` once every `period`.
    ///
    /// The first call happens one period after spawning. Runs are scheduled
    /// at fixed instants, if a run overruns the next one starts immediately
    /// and the schedule is re-based on the current time.
    pub fn spawn<F>(name: &str, period: Duration, mut func: F) -> Result<Self, TaskError>
    where
        F: FnMut() -> TaskFlow + Send + 'static,
    {
        if period == Duration::default() {
            return Err(TaskError::ZeroPeriod);
        }

        let (stop_sender, stop_receiver) = channel::<()>();
        let task_name = name.to_string();

        let handle = thread::Builder::new()
            .name(task_name.clone())
            .spawn(move || {
                let mut next_run = Instant::now() + period;

                loop {
                    let now = Instant::now();
                    let wait = if next_run > now {
                        next_run - now
                    } else {
                        Duration::default()
                    };

                    // Either a stop signal or a dropped handle ends the task
                    match stop_receiver.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => (),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    if func() == TaskFlow::Stop {
                        break;
                    }

                    next_run += period;
                    if next_run < Instant::now() {
                        next_run = Instant::now() + period;
                    }
                }

                trace!("Periodic task \"{}\" exited", task_name);
            })
            .map_err(TaskError::SpawnError)?;

        Ok(Self {
            name: name.to_string(),
            stop_sender: Some(stop_sender),
            handle: Some(handle),
        })
    }

    /// Stop the task and wait for its thread to exit.
    ///
    /// Stopping an already stopped task does nothing. If called from the
    /// task's own thread the task is signalled but not joined.
    pub fn stop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            // The receiver is gone if the task already stopped itself
            sender.send(()).ok();
        }

        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }

            if handle.join().is_err() {
                warn!("Periodic task \"{}\" panicked", self.name);
            }
        }
    }

    /// Returns `true` while the task thread is still running.
    pub fn is_running(&self) -> bool {
        match self.handle {
            Some(ref h) => !h.is_finished(),
            None => false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[test]
    fn test_task_runs_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();

        let mut task = PeriodicTask::spawn("test_task", Duration::from_millis(2), move || {
            c.fetch_add(1, Ordering::SeqCst);
            TaskFlow::Continue
        })
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        task.stop();
        let stopped_count = count.load(Ordering::SeqCst);
        assert!(stopped_count > 0);
        assert!(!task.is_running());

        // No more runs after stop, and stopping again is harmless
        thread::sleep(Duration::from_millis(10));
        task.stop();
        assert_eq!(count.load(Ordering::SeqCst), stopped_count);
    }

    #[test]
    fn test_task_stops_itself() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();

        let mut task = PeriodicTask::spawn("self_stop", Duration::from_millis(1), move || {
            if c.fetch_add(1, Ordering::SeqCst) >= 2 {
                TaskFlow::Stop
            } else {
                TaskFlow::Continue
            }
        })
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(!task.is_running());
        task.stop();
    }

    #[test]
    fn test_stop_does_not_wait_for_period() {
        let mut task = PeriodicTask::spawn("slow", Duration::from_secs(60), || TaskFlow::Continue)
            .unwrap();

        let t0 = Instant::now();
        task.stop();
        assert!(t0.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_zero_period_rejected() {
        match PeriodicTask::spawn("zero", Duration::default(), || TaskFlow::Stop) {
            Err(TaskError::ZeroPeriod) => (),
            _ => panic!("Expected a zero period error"),
        }
    }
}
