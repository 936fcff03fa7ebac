use std::net::Ipv4Addr;
use std::path::Path;

use config::{Config, ConfigError};
use serde::Deserialize;

use super::BindParams;

/// Runtime configuration, read from the file named by a source's
/// `config-path` and overlaid with `VQE_*` environment variables.
///
/// The format follows the file extension (`.toml`, `.yaml`, `.ini`):
///
/// ```toml
/// max_tuners = 4
/// queue_depth = 500
/// multicast_interface = "192.168.1.20"
/// rcc_enable = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of concurrently existing tuners.
    pub max_tuners: usize,
    /// Largest datagram accepted from the network, in bytes.
    pub max_paksize: usize,
    /// Packets buffered per tuner before the oldest is dropped.
    pub queue_depth: usize,
    /// Idle wait of the receive loop between socket sweeps.
    pub poll_interval_ms: u64,
    /// Local interface used for IPv4 multicast joins.
    pub multicast_interface: Option<Ipv4Addr>,
    pub rcc_enable: bool,
    pub error_repair_enable: bool,
    pub max_receive_bandwidth: Option<u32>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_tuners: 8,
            max_paksize: 1512,
            queue_depth: 2000,
            poll_interval_ms: 5,
            multicast_interface: None,
            rcc_enable: true,
            error_repair_enable: true,
            max_receive_bandwidth: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("VQE"))
            .build()?
            .try_deserialize()
    }

    pub fn bind_params(&self) -> BindParams {
        BindParams {
            rcc: self.rcc_enable,
            error_repair: self.error_repair_enable,
            max_receive_bandwidth: self.max_receive_bandwidth,
        }
    }
}
