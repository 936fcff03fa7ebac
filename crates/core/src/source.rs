//! Per-source session: the streaming read loop of one active source.
//!
//! [`SourceSession::start`] performs the whole startup sequence and
//! returns only a fully working session; any failure unwinds what was
//! already set up. Teardown is the reverse order, performed by drop:
//!
//! 1. release the worker lease (the last one stops the shared loop)
//! 2. unbind and destroy the tuner
//! 3. deinitialize the runtime

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::binding::{self, ChannelSource};
use crate::channel::StreamIdentity;
use crate::error::{Result, VqeError};
use crate::runtime::ClientRuntime;
use crate::stats::{self, Counter, Stats};
use crate::tuner::Tuner;
use crate::worker::{WorkerCoordinator, WorkerLease};

/// Size of the buffer allocated for each received packet.
pub const RECEIVE_BUFFER_SIZE: usize = 4096;

/// Default bounded wait of one pull.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// What a source needs to start.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// SDP document or `rtp://` / `udp://` URI.
    pub sdp_or_uri: String,
    /// Runtime configuration file; `None` uses runtime defaults.
    pub config_path: Option<PathBuf>,
    /// Unique tuner name, typically the element's name.
    pub tuner_name: String,
    pub receive_timeout: Duration,
}

impl SourceSettings {
    pub fn new(sdp_or_uri: impl Into<String>, tuner_name: impl Into<String>) -> Self {
        Self {
            sdp_or_uri: sdp_or_uri.into(),
            config_path: None,
            tuner_name: tuner_name.into(),
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
        }
    }
}

/// Balances one successful `initialize`.
struct RuntimeInit(Arc<dyn ClientRuntime>);

impl Drop for RuntimeInit {
    fn drop(&mut self) {
        self.0.deinitialize();
    }
}

/// One started source. Fields drop in declaration order.
pub struct SourceSession {
    lease: WorkerLease,
    tuner: Tuner,
    identity: StreamIdentity,
    receive_timeout: Duration,
    /// Set when an unlock had to stop the shared loop.
    loop_stopped: AtomicBool,
    runtime: Arc<dyn ClientRuntime>,
    _init: RuntimeInit,
}

impl SourceSession {
    pub fn start(coordinator: &Arc<WorkerCoordinator>, settings: &SourceSettings) -> Result<Self> {
        if settings.sdp_or_uri.trim().is_empty() {
            return Err(VqeError::MissingDocument);
        }
        let runtime = coordinator.runtime().clone();

        runtime.initialize(settings.config_path.as_deref())?;
        let init = RuntimeInit(runtime.clone());

        let mut tuner = Tuner::create(runtime.clone(), &settings.tuner_name)?;
        let strategy = ChannelSource::detect(&settings.sdp_or_uri).strategy();
        let identity = binding::bind(&mut tuner, strategy.as_ref())?;

        let lease = coordinator.acquire()?;
        tracing::info!(tuner = %settings.tuner_name, stream = %identity, "source started");

        Ok(Self {
            lease,
            tuner,
            identity,
            receive_timeout: settings.receive_timeout,
            loop_stopped: AtomicBool::new(false),
            runtime,
            _init: init,
        })
    }

    pub fn identity(&self) -> &StreamIdentity {
        &self.identity
    }

    pub fn tuner_name(&self) -> &str {
        self.tuner.name()
    }

    /// Fetch one packet. Blocks for at most the receive timeout.
    ///
    /// Errors affect only this pull; the session stays usable.
    pub fn read_packet(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(RECEIVE_BUFFER_SIZE)
            .map_err(|_| VqeError::Alloc(RECEIVE_BUFFER_SIZE))?;
        buf.resize(RECEIVE_BUFFER_SIZE, 0);

        let len = self.tuner.receive(&mut buf, self.receive_timeout)?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Interrupt an in-flight [`read_packet`](Self::read_packet).
    pub fn unlock(&self) {
        if self.tuner.cancel() {
            tracing::debug!(tuner = self.tuner.name(), "receive cancelled");
            return;
        }
        tracing::warn!(
            tuner = self.tuner.name(),
            "runtime cannot cancel a single tuner; stopping the shared receive loop"
        );
        self.loop_stopped.store(true, Ordering::SeqCst);
        self.runtime.stop();
    }

    /// Undo [`unlock`](Self::unlock), restarting the shared loop if the
    /// unlock stopped it.
    pub fn unlock_stop(&self) -> Result<()> {
        self.tuner.resume();
        if self.loop_stopped.swap(false, Ordering::SeqCst) {
            self.lease.coordinator().restart()?;
        }
        Ok(())
    }

    /// Fresh counters for this session's stream.
    pub fn stats(&self) -> Result<Stats> {
        stats::snapshot(&self.runtime, Some(&self.identity))
    }

    pub fn counter(&self, counter: Counter) -> Result<u64> {
        stats::query(&self.runtime, Some(&self.identity), counter)
    }
}

impl Drop for SourceSession {
    fn drop(&mut self) {
        tracing::info!(tuner = self.tuner.name(), stream = %self.identity, "stopping source");
    }
}

impl std::fmt::Debug for SourceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSession")
            .field("lease", &self.lease)
            .field("tuner", &self.tuner)
            .field("identity", &self.identity)
            .finish()
    }
}
