//! Boundary to the RTP client runtime.
//!
//! The runtime owns everything below the tuner: sockets, jitter buffering,
//! retransmission, rapid channel change, FEC and RTCP. This crate drives it
//! only through [`ClientRuntime`]:
//!
//! | Operation | Purpose |
//! |-----------|---------|
//! | [`initialize`](ClientRuntime::initialize) / [`deinitialize`](ClientRuntime::deinitialize) | Load config; called in matched pairs per active source |
//! | [`create_tuner`](ClientRuntime::create_tuner) / [`destroy_tuner`](ClientRuntime::destroy_tuner) | One receive channel slot per source |
//! | [`parse_sdp`](ClientRuntime::parse_sdp) | SDP text → [`ChannelConfig`] |
//! | [`bind`](ClientRuntime::bind) / [`unbind`](ClientRuntime::unbind) | Start/stop packet flow for a tuner |
//! | [`run`](ClientRuntime::run) / [`stop`](ClientRuntime::stop) | The single, blocking receive/control loop |
//! | [`receive`](ClientRuntime::receive) | Fetch one packet for a tuner |
//! | [`stats`](ClientRuntime::stats) / [`stream_stats`](ClientRuntime::stream_stats) | Counter snapshots |
//!
//! Callers never hold a raw [`TunerId`]; they go through [`Tuner`](crate::Tuner),
//! which destroys the tuner exactly once.

pub mod config;
#[cfg(test)]
pub(crate) mod mock;
mod rtp;
pub mod udp;

use std::fmt;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use crate::channel::{ChannelConfig, ChannelType, StreamIdentity};
use crate::error::Result;
use crate::sdp;
use crate::stats::Stats;

pub use config::RuntimeConfig;
pub use udp::UdpRuntime;

/// Runtime-assigned identifier of one tuner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TunerId(u64);

impl TunerId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TunerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tuner#{}", self.0)
    }
}

/// Per-bind options handed to [`ClientRuntime::bind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindParams {
    /// Request a rapid-channel-change burst on join.
    pub rcc: bool,
    /// Request retransmission of lost packets.
    pub error_repair: bool,
    /// Upper bound on the receive rate, in bits per second.
    pub max_receive_bandwidth: Option<u32>,
}

impl Default for BindParams {
    fn default() -> Self {
        Self {
            rcc: true,
            error_repair: true,
            max_receive_bandwidth: None,
        }
    }
}

/// Operations consumed from the RTP client runtime.
///
/// `run` and `stop` are process-global: only one loop runs per runtime,
/// shared by all tuners. A `stop` issued before the matching `run` has
/// begun must make that `run` return immediately, until
/// [`clear_stop`](ClientRuntime::clear_stop) discards it.
pub trait ClientRuntime: Send + Sync {
    /// Load configuration. Calls nest; each needs a matching
    /// [`deinitialize`](Self::deinitialize).
    fn initialize(&self, config_path: Option<&Path>) -> Result<()>;

    fn deinitialize(&self);

    /// Create a tuner. Names are unique within the process.
    fn create_tuner(&self, name: &str) -> Result<TunerId>;

    /// Destroy a tuner, unbinding it first if needed.
    fn destroy_tuner(&self, tuner: TunerId);

    /// Fresh bind parameters derived from the runtime configuration.
    fn bind_params(&self) -> BindParams {
        BindParams::default()
    }

    fn parse_sdp(&self, sdp: &str, channel_type: ChannelType) -> Result<ChannelConfig> {
        sdp::parse(sdp, channel_type)
    }

    /// Associate a tuner with a channel. Rebinding a bound tuner changes
    /// channel.
    fn bind(&self, tuner: TunerId, channel: &ChannelConfig, params: &BindParams) -> Result<()>;

    fn unbind(&self, tuner: TunerId) -> Result<()>;

    /// Run the receive/control loop. Blocks until [`stop`](Self::stop).
    fn run(&self) -> Result<()>;

    fn stop(&self);

    /// Discard a pending stop request that no `run` consumed. Only called
    /// while no loop is running.
    fn clear_stop(&self);

    /// Copy one packet into `buf`, waiting at most `timeout`.
    fn receive(&self, tuner: TunerId, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Interrupt a blocked [`receive`](Self::receive) on this tuner only.
    /// Returns `false` if the runtime cannot scope cancellation per tuner.
    fn cancel_receive(&self, _tuner: TunerId) -> bool {
        false
    }

    /// Undo [`cancel_receive`](Self::cancel_receive).
    fn resume_receive(&self, _tuner: TunerId) {}

    fn stats(&self) -> Result<Stats>;

    fn stream_stats(&self, identity: &StreamIdentity) -> Result<Stats>;
}

static GLOBAL: LazyLock<Arc<UdpRuntime>> = LazyLock::new(|| Arc::new(UdpRuntime::new()));

/// The process-wide runtime shared by every source in this process.
pub fn global() -> Arc<dyn ClientRuntime> {
    GLOBAL.clone()
}
