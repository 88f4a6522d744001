//! Cancellation and background task supervision.
//!
//! A [`Supervisor`] is shared by every thread of a run. The first failure
//! reported to it cancels the run: work that has not started yet sees the
//! cancellation at its next [`Supervisor::checkpoint`] and stops with
//! [`CacheError::Cancelled`]. Background tasks are registered so the run can
//! wait for all of them before exiting.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::cache::CacheError;

struct Inner {
    cancelled: AtomicBool,
    failures_tx: Sender<CacheError>,
    failures_rx: Receiver<CacheError>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Shared cancellation flag plus the registry of background tasks.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        let (failures_tx, failures_rx) = unbounded();
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                failures_tx,
                failures_rx,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Ask every thread of the run to stop at its next checkpoint.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            log::debug!("Run cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`CacheError::Cancelled`] once the run has been cancelled.
    pub fn checkpoint(&self) -> Result<(), CacheError> {
        if self.is_cancelled() {
            Err(CacheError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Record a failure and cancel the run.
    ///
    /// `Cancelled` only echoes an earlier failure and is not recorded.
    pub fn report(&self, err: CacheError) {
        self.cancel();
        if err.is_cancelled() {
            return;
        }
        log::debug!("Recorded failure: {}", err);
        // The receiver lives in `inner`, so the channel cannot be disconnected here.
        let _ = self.inner.failures_tx.send(err);
    }

    /// Run `task` on a named background thread.
    ///
    /// A failing task is reported, which cancels the run. The thread is joined
    /// by [`Supervisor::join`].
    pub fn spawn<F>(&self, name: impl Into<String>, task: F) -> Result<(), CacheError>
    where
        F: FnOnce() -> Result<(), CacheError> + Send + 'static,
    {
        let name = name.into();
        let supervisor = self.clone();
        let task_name = name.clone();

        let handle = thread::Builder::new().name(name).spawn(move || {
            if let Err(err) = task() {
                if !err.is_cancelled() {
                    log::warn!("Background task {} failed: {}", task_name, err);
                }
                supervisor.report(err);
            }
        })?;

        self.lock_tasks().push(handle);
        Ok(())
    }

    /// Wait for every background task, including tasks spawned while waiting.
    ///
    /// Returns the first failure recorded during the run, if any.
    pub fn join(&self) -> Option<CacheError> {
        loop {
            let next = self.lock_tasks().pop();
            let Some(handle) = next else { break };

            let name = handle.thread().name().unwrap_or("task").to_string();
            if let Err(payload) = handle.join() {
                self.report(CacheError::TaskPanicked(format!(
                    "{}: {}",
                    name,
                    panic_message(payload.as_ref())
                )));
            }
        }

        self.inner.failures_rx.try_recv().ok()
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
