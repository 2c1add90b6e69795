//! Background Maintenance
//!
//! A single worker thread that flushes frozen memtables and compacts
//! segments, fed through a crossbeam channel.
//!
//! ## Failure Handling
//! ```text
//! task ──► attempt ──ok──► done
//!             │
//!            err (retryable) ──► sleep(base · 2^n) ──► attempt   (n < limit)
//!             │
//!            err (fatal / limit reached) ──► error! and drop the task
//! ```
//! The worker never panics on a failed operation; the state it leaves
//! behind is always the state before that attempt.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};

use super::EngineInner;
use crate::error::{LineraError, Result};

/// Work items for the maintenance thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Task {
    /// Flush every frozen memtable, then compact if needed
    Flush,
    /// Compact if the segment count reached the trigger
    Compact,
    /// Exit the worker loop
    Shutdown,
}

/// Handle to the running maintenance thread
pub(crate) struct MaintenanceWorker {
    sender: Sender<Task>,
    handle: Option<JoinHandle<()>>,
}

impl MaintenanceWorker {
    pub fn spawn(
        inner: Arc<EngineInner>,
        sender: Sender<Task>,
        receiver: Receiver<Task>,
    ) -> Result<Self> {
        let handle = thread::Builder::new()
            .name("lineradb-maintenance".to_string())
            .spawn(move || run(inner, receiver))?;

        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    /// Ask the worker to exit and wait for it
    ///
    /// The caller cancels the engine's shutdown token first, so an
    /// in-flight compaction stops early and queued tasks are skipped.
    pub fn stop(&mut self) -> Result<()> {
        let _ = self.sender.send(Task::Shutdown);
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| {
                LineraError::LockPoisoned("maintenance thread panicked".to_string())
            })?;
        }
        Ok(())
    }
}

fn run(inner: Arc<EngineInner>, receiver: Receiver<Task>) {
    tracing::debug!("maintenance worker started");

    while let Ok(task) = receiver.recv() {
        match task {
            Task::Shutdown => break,
            Task::Flush => {
                with_retry(&inner, "flush", || inner.flush_frozen_all().map(|_| ()));
                with_retry(&inner, "compaction", || inner.compact_if_needed());
            }
            Task::Compact => {
                with_retry(&inner, "compaction", || inner.compact_if_needed());
            }
        }
    }

    tracing::debug!("maintenance worker stopped");
}

/// Run `op` until it succeeds, fails fatally, or runs out of attempts
fn with_retry<F>(inner: &EngineInner, operation: &str, mut op: F)
where
    F: FnMut() -> Result<()>,
{
    let limit = inner.config.maintenance_retry_limit.max(1);
    let base = inner.config.maintenance_backoff_ms;

    for attempt in 1..=limit {
        if inner.shutdown.is_cancelled() {
            return;
        }

        match op() {
            Ok(()) => return,
            Err(LineraError::Cancelled) => {
                tracing::debug!(operation, "background operation cancelled");
                return;
            }
            Err(e) if e.is_retryable() && attempt < limit => {
                let delay = base.saturating_mul(1u64 << (attempt - 1).min(16));
                tracing::warn!(
                    operation,
                    attempt,
                    retry_in_ms = delay,
                    error = %e,
                    "background operation failed, retrying"
                );
                thread::sleep(Duration::from_millis(delay));
            }
            Err(e) => {
                tracing::error!(
                    operation,
                    attempts = attempt,
                    error = %e,
                    "background operation failed"
                );
                return;
            }
        }
    }
}
