//! Channel configuration: the parsed, immutable description of one feed.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::error::{Result, VqeError};

/// Kind of channel a tuner can be bound to. Only linear (live) channels
/// are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelType {
    #[default]
    Linear,
}

impl FromStr for ChannelType {
    type Err = VqeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            _ => Err(VqeError::UnsupportedChannelType(s.to_string())),
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
        }
    }
}

/// Framing of the primary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// MPEG-TS carried in RTP.
    Rtp,
    /// Raw MPEG-TS over UDP.
    Udp,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Rtp => "rtp",
            Self::Udp => "udp",
        }
    }
}

/// Parsed result of a session description or stream URI.
///
/// Derived once per document and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Session name (`s=`), if the document had one.
    pub name: Option<String>,
    pub channel_type: ChannelType,
    pub protocol: Protocol,
    /// Destination (group or unicast) address the feed is sent to.
    pub destination: IpAddr,
    pub port: u16,
    /// Source-specific multicast sender, when filtering is requested.
    pub source: Option<IpAddr>,
    /// Explicit RTCP port (`a=rtcp`); conventionally `port + 1` otherwise.
    pub rtcp_port: Option<u16>,
    pub payload_type: Option<u8>,
}

impl ChannelConfig {
    pub fn new(protocol: Protocol, destination: IpAddr, port: u16) -> Self {
        Self {
            name: None,
            channel_type: ChannelType::Linear,
            protocol,
            destination,
            port,
            source: None,
            rtcp_port: None,
            payload_type: None,
        }
    }

    /// Parse a stream URI of the form `rtp://[source@]group:port` or
    /// `udp://[source@]group:port`. IPv6 addresses go in brackets.
    ///
    /// ```
    /// use vqe::channel::{ChannelConfig, Protocol};
    ///
    /// let ch = ChannelConfig::from_uri("rtp://10.0.0.1@232.1.1.1:5000").unwrap();
    /// assert_eq!(ch.protocol, Protocol::Rtp);
    /// assert_eq!(ch.port, 5000);
    /// assert_eq!(ch.source, Some("10.0.0.1".parse().unwrap()));
    /// ```
    pub fn from_uri(uri: &str) -> Result<Self> {
        let invalid = |reason| VqeError::InvalidUri {
            uri: uri.to_string(),
            reason,
        };

        let trimmed = uri.trim();
        let (protocol, rest) = if let Some(rest) = trimmed.strip_prefix("rtp://") {
            (Protocol::Rtp, rest)
        } else if let Some(rest) = trimmed.strip_prefix("udp://") {
            (Protocol::Udp, rest)
        } else {
            return Err(invalid("scheme must be rtp:// or udp://"));
        };
        let rest = rest.trim_end_matches('/');

        let (source, group) = match rest.split_once('@') {
            Some(("", group)) => (None, group),
            Some((source, group)) => {
                let source = parse_host(source).ok_or_else(|| invalid("invalid source address"))?;
                (Some(source), group)
            }
            None => (None, rest),
        };

        let addr: SocketAddr = group
            .parse()
            .map_err(|_| invalid("expected <address>:<port>"))?;
        if addr.port() == 0 {
            return Err(invalid("port must be non-zero"));
        }

        let mut config = Self::new(protocol, addr.ip(), addr.port());
        config.source = source;
        Ok(config)
    }

    pub fn is_multicast(&self) -> bool {
        self.destination.is_multicast()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.destination, self.port)
    }

    /// Canonical `<scheme>://<address>:<port>` form of the destination.
    pub fn canonical_uri(&self) -> String {
        format!("{}://{}", self.protocol.scheme(), self.socket_addr())
    }
}

fn parse_host(text: &str) -> Option<IpAddr> {
    text.trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .ok()
}

/// Canonical key for per-channel statistics lookups.
///
/// Only produced after the runtime accepted a bind, so an identity always
/// names a channel that was actually bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamIdentity(String);

impl StreamIdentity {
    pub(crate) fn for_bound(channel: &ChannelConfig) -> Self {
        Self(channel.canonical_uri())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
