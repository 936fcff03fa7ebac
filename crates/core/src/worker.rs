//! Process-wide coordinator for the runtime's blocking receive loop.
//!
//! The runtime allows one loop per process, started and stopped globally,
//! while any number of sources may be active at once. The coordinator
//! refcounts active sources and owns the single worker thread:
//!
//! ```text
//! acquire (refs 0 → 1)   spawn "vqe-worker" → runtime.run()
//! acquire (refs n → n+1) no-op
//! release (refs n → n-1) no-op
//! release (refs 1 → 0)   runtime.stop() unless the loop already exited, join
//! ```
//!
//! A stop request that the exited loop never consumed is cleared before the
//! next spawn, so a new loop always runs.
//!
//! The count and the thread handle change together under one lock, so no
//! caller ever observes `refs > 0` without a thread or a thread with
//! `refs == 0`.

use std::sync::{Arc, LazyLock};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::error::{Result, VqeError};
use crate::runtime::{self, ClientRuntime};

static GLOBAL: LazyLock<Arc<WorkerCoordinator>> =
    LazyLock::new(|| WorkerCoordinator::new(runtime::global()));

pub struct WorkerCoordinator {
    runtime: Arc<dyn ClientRuntime>,
    state: Mutex<WorkerState>,
}

#[derive(Default)]
struct WorkerState {
    refs: usize,
    thread: Option<JoinHandle<()>>,
    spawned: u64,
}

/// Point-in-time view of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStatus {
    pub refs: usize,
    /// Whether a worker thread is currently owned.
    pub running: bool,
    /// Whether the owned thread's loop has already returned.
    pub exited: bool,
    /// Worker threads spawned over the coordinator's lifetime.
    pub spawned: u64,
}

impl WorkerCoordinator {
    pub fn new(runtime: Arc<dyn ClientRuntime>) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            state: Mutex::new(WorkerState::default()),
        })
    }

    /// The coordinator for [`runtime::global`].
    pub fn global() -> Arc<Self> {
        GLOBAL.clone()
    }

    pub fn runtime(&self) -> &Arc<dyn ClientRuntime> {
        &self.runtime
    }

    /// Register one active source, starting the worker if it is the first.
    pub fn acquire(self: &Arc<Self>) -> Result<WorkerLease> {
        let mut state = self.state.lock();
        if state.refs == 0 {
            self.spawn(&mut state)?;
        }
        state.refs += 1;
        tracing::debug!(refs = state.refs, "worker acquired");

        Ok(WorkerLease {
            coordinator: self.clone(),
            released: false,
        })
    }

    /// Stop the shared loop and start a fresh one for the current holders.
    ///
    /// Used after the loop was stopped out from under active sources. A
    /// no-op when nothing holds the worker.
    pub fn restart(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.refs == 0 {
            return Ok(());
        }
        self.stop_and_join(&mut state);
        self.spawn(&mut state)?;
        tracing::info!(refs = state.refs, "worker thread restarted");
        Ok(())
    }

    fn spawn(&self, state: &mut WorkerState) -> Result<()> {
        // No loop is running here, so any stop still pending is stale.
        self.runtime.clear_stop();

        let runtime = self.runtime.clone();
        let handle = thread::Builder::new()
            .name("vqe-worker".into())
            .spawn(move || {
                if let Err(e) = runtime.run() {
                    tracing::error!(error = %e, "receive loop failed");
                }
            })
            .map_err(VqeError::WorkerSpawn)?;
        state.thread = Some(handle);
        state.spawned += 1;
        tracing::info!("worker thread started");
        Ok(())
    }

    fn stop_and_join(&self, state: &mut WorkerState) {
        let Some(handle) = state.thread.take() else {
            return;
        };
        if handle.is_finished() {
            tracing::debug!("receive loop already exited");
        } else {
            self.runtime.stop();
        }
        if handle.join().is_err() {
            tracing::error!("worker thread panicked");
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        let Some(refs) = state.refs.checked_sub(1) else {
            tracing::warn!("worker released more often than acquired");
            return;
        };
        state.refs = refs;
        tracing::debug!(refs, "worker released");
        if refs > 0 {
            return;
        }

        self.stop_and_join(&mut state);
        tracing::info!("worker thread stopped");
    }

    pub fn status(&self) -> WorkerStatus {
        let state = self.state.lock();
        WorkerStatus {
            refs: state.refs,
            running: state.thread.is_some(),
            exited: state.thread.as_ref().is_some_and(JoinHandle::is_finished),
            spawned: state.spawned,
        }
    }
}

impl std::fmt::Debug for WorkerCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerCoordinator")
            .field("status", &self.status())
            .finish()
    }
}

/// One acquired reference on the worker. Released on drop.
#[must_use = "dropping the lease releases the worker immediately"]
pub struct WorkerLease {
    coordinator: Arc<WorkerCoordinator>,
    released: bool,
}

impl WorkerLease {
    pub fn coordinator(&self) -> &Arc<WorkerCoordinator> {
        &self.coordinator
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.coordinator.release();
        }
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl std::fmt::Debug for WorkerLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLease")
            .field("released", &self.released)
            .finish()
    }
}
