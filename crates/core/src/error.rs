//! Error types for the ingest core.

use std::fmt;
use std::time::Duration;

/// Errors that can occur while assembling, binding or reading a channel.
///
/// Every variant belongs to one [`ErrorCategory`] and carries a stable
/// short [`code`](Self::code), so callers can report failures as
/// category + code + human-readable detail:
///
/// - **Malformed input**: [`InvalidEncoding`](Self::InvalidEncoding),
///   [`MissingDocument`](Self::MissingDocument), [`Sdp`](Self::Sdp),
///   [`InvalidUri`](Self::InvalidUri).
/// - **Binding**: [`UnsupportedChannelType`](Self::UnsupportedChannelType),
///   [`Bind`](Self::Bind), [`UnknownTuner`](Self::UnknownTuner),
///   [`TunerExists`](Self::TunerExists), [`TunerLimit`](Self::TunerLimit).
/// - **Resource**: [`Alloc`](Self::Alloc), [`Stats`](Self::Stats),
///   [`UnknownStream`](Self::UnknownStream).
/// - **Runtime I/O**: [`Io`](Self::Io), [`Timeout`](Self::Timeout),
///   [`Cancelled`](Self::Cancelled), [`Receive`](Self::Receive).
/// - **Lifecycle**: [`NotInitialized`](Self::NotInitialized),
///   [`WorkerSpawn`](Self::WorkerSpawn),
///   [`SourceUnavailable`](Self::SourceUnavailable), [`Host`](Self::Host).
/// - **Configuration**: [`Config`](Self::Config).
#[derive(Debug, thiserror::Error)]
pub enum VqeError {
    /// Underlying socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The buffered session description is not valid UTF-8.
    #[error("session description is not valid UTF-8: {0}")]
    InvalidEncoding(#[from] std::string::FromUtf8Error),

    /// A source was started without any session description or URI.
    #[error("no session description or stream URI configured")]
    MissingDocument,

    /// The runtime could not turn the session description into a channel.
    #[error("failed to parse SDP ({kind}):\n===BEGIN SDP===\n{sdp}\n===END SDP===")]
    Sdp { kind: SdpErrorKind, sdp: String },

    /// A `rtp://` / `udp://` stream URI could not be understood.
    #[error("invalid stream URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: &'static str },

    #[error("unsupported channel type: {0}")]
    UnsupportedChannelType(String),

    /// The runtime refused to bind a tuner to a channel.
    #[error("failed to bind channel: {0}")]
    Bind(String),

    #[error("unknown tuner: {0}")]
    UnknownTuner(String),

    /// Tuner names are unique per process.
    #[error("tuner {0:?} already exists")]
    TunerExists(String),

    #[error("tuner limit reached ({0})")]
    TunerLimit(usize),

    /// A receive buffer could not be allocated.
    #[error("failed to allocate {0} byte receive buffer")]
    Alloc(usize),

    #[error("failed to fetch statistics: {0}")]
    Stats(String),

    #[error("no statistics for stream {0}")]
    UnknownStream(String),

    /// No packet arrived within the receive timeout.
    #[error("receive timed out after {0:?}")]
    Timeout(Duration),

    /// A blocked receive was interrupted by an unlock request.
    #[error("receive cancelled")]
    Cancelled,

    /// Any other receive failure, with the runtime's own diagnostic.
    #[error("receive failed: {0}")]
    Receive(String),

    #[error("client runtime not initialized")]
    NotInitialized,

    /// The shared worker thread could not be launched.
    #[error("failed to start worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// The child source type is not registered in this process.
    #[error("source type {0:?} is not available")]
    SourceUnavailable(String),

    /// The host pipeline refused an operation on a child element.
    #[error("host pipeline error: {0}")]
    Host(String),

    #[error("runtime configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Broad failure class used to decide how far an error propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Undecodable or absent session description. Fatal to the instance.
    MalformedInput,
    /// Channel config or bind rejected. Fatal to the instance.
    Binding,
    /// Allocation or statistics failure. Fatal to the current call only.
    Resource,
    /// Timeout or transport error on receive. The pull may be retried.
    RuntimeIo,
    /// Startup/teardown ordering failure. Fatal to the instance.
    Lifecycle,
    /// Unreadable runtime configuration. Fatal to the instance.
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedInput => write!(f, "malformed input"),
            Self::Binding => write!(f, "binding"),
            Self::Resource => write!(f, "resource"),
            Self::RuntimeIo => write!(f, "runtime I/O"),
            Self::Lifecycle => write!(f, "lifecycle"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

impl VqeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidEncoding(_)
            | Self::MissingDocument
            | Self::Sdp { .. }
            | Self::InvalidUri { .. } => ErrorCategory::MalformedInput,
            Self::UnsupportedChannelType(_)
            | Self::Bind(_)
            | Self::UnknownTuner(_)
            | Self::TunerExists(_)
            | Self::TunerLimit(_) => ErrorCategory::Binding,
            Self::Alloc(_) | Self::Stats(_) | Self::UnknownStream(_) => ErrorCategory::Resource,
            Self::Io(_) | Self::Timeout(_) | Self::Cancelled | Self::Receive(_) => {
                ErrorCategory::RuntimeIo
            }
            Self::NotInitialized
            | Self::WorkerSpawn(_)
            | Self::SourceUnavailable(_)
            | Self::Host(_) => ErrorCategory::Lifecycle,
            Self::Config(_) => ErrorCategory::Configuration,
        }
    }

    /// Stable short identifier, suitable for log fields and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::InvalidEncoding(_) => "invalid-encoding",
            Self::MissingDocument => "missing-document",
            Self::Sdp { .. } => "sdp-parse",
            Self::InvalidUri { .. } => "invalid-uri",
            Self::UnsupportedChannelType(_) => "channel-type",
            Self::Bind(_) => "bind",
            Self::UnknownTuner(_) => "unknown-tuner",
            Self::TunerExists(_) => "tuner-exists",
            Self::TunerLimit(_) => "tuner-limit",
            Self::Alloc(_) => "alloc",
            Self::Stats(_) => "stats",
            Self::UnknownStream(_) => "unknown-stream",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Receive(_) => "receive",
            Self::NotInitialized => "not-initialized",
            Self::WorkerSpawn(_) => "worker-spawn",
            Self::SourceUnavailable(_) => "source-unavailable",
            Self::Host(_) => "host",
            Self::Config(_) => "config",
        }
    }

    /// Whether the error ends the affected instance rather than one call.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.category(),
            ErrorCategory::Resource | ErrorCategory::RuntimeIo
        )
    }
}

/// Specific kind of SDP parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdpErrorKind {
    /// Document was empty or whitespace only.
    Empty,
    /// First line was not `v=0`.
    MissingVersion,
    /// A line did not have the `<type>=<value>` shape.
    InvalidLine(usize),
    /// No `m=` section was present.
    MissingMedia,
    /// The primary `m=` line was malformed or had port 0.
    InvalidMedia,
    /// The `m=` transport is not one this system receives.
    UnsupportedTransport(String),
    /// A `c=` or `o=` address could not be parsed.
    InvalidAddress(String),
    /// Neither `c=` nor `o=` supplied a destination address.
    MissingAddress,
    /// An `a=rtcp` or `a=source-filter` attribute was malformed.
    InvalidAttribute(String),
}

impl fmt::Display for SdpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty document"),
            Self::MissingVersion => write!(f, "missing v=0"),
            Self::InvalidLine(n) => write!(f, "invalid line {n}"),
            Self::MissingMedia => write!(f, "no media section"),
            Self::InvalidMedia => write!(f, "invalid media line"),
            Self::UnsupportedTransport(proto) => write!(f, "unsupported transport {proto}"),
            Self::InvalidAddress(addr) => write!(f, "invalid address {addr}"),
            Self::MissingAddress => write!(f, "no destination address"),
            Self::InvalidAttribute(attr) => write!(f, "invalid attribute {attr}"),
        }
    }
}

/// Convenience alias for `Result<T, VqeError>`.
pub type Result<T> = std::result::Result<T, VqeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdp_error_embeds_document() {
        let err = VqeError::Sdp {
            kind: SdpErrorKind::MissingMedia,
            sdp: "v=0\r\n".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("no media section"));
        assert!(text.contains("===BEGIN SDP===\nv=0\r\n\n===END SDP==="));
        assert_eq!(err.category(), ErrorCategory::MalformedInput);
        assert_eq!(err.code(), "sdp-parse");
    }

    #[test]
    fn receive_failures_are_not_fatal() {
        assert!(!VqeError::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(!VqeError::Alloc(4096).is_fatal());
        assert!(VqeError::Bind("refused".into()).is_fatal());
        assert!(VqeError::SourceUnavailable("vqesrc".into()).is_fatal());
    }
}
