pub mod assembler;
pub mod binding;
pub mod channel;
pub mod demux;
pub mod error;
pub mod registry;
pub mod runtime;
pub mod sdp;
pub mod source;
pub mod stats;
pub mod tuner;
pub mod worker;

pub use assembler::SdpAssembler;
pub use channel::{ChannelConfig, ChannelType, Protocol, StreamIdentity};
pub use demux::{ContainerHost, SdpDemux};
pub use error::{ErrorCategory, Result, VqeError};
pub use registry::SourceRegistry;
pub use runtime::{ClientRuntime, RuntimeConfig, UdpRuntime};
pub use source::{SourceSession, SourceSettings};
pub use stats::{Counter, Stats};
pub use tuner::Tuner;
pub use worker::{WorkerCoordinator, WorkerLease, WorkerStatus};
