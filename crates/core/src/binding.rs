//! Channel binding resolver.
//!
//! Turns a source's `sdp-or-uri` text into a [`ChannelConfig`], binds a
//! [`Tuner`] to it and yields the [`StreamIdentity`] used for statistics.
//!
//! Two resolution strategies exist behind [`BindingStrategy`]:
//!
//! | Strategy | Input | Parsed by |
//! |----------|-------|-----------|
//! | [`SdpBinding`] | session description | [`ClientRuntime::parse_sdp`] |
//! | [`UriBinding`] | `rtp://` / `udp://` URI | [`ChannelConfig::from_uri`] |

use crate::channel::{ChannelConfig, ChannelType, StreamIdentity};
use crate::error::Result;
use crate::runtime::ClientRuntime;
use crate::tuner::Tuner;

/// Resolves some textual channel description into a [`ChannelConfig`].
pub trait BindingStrategy {
    fn resolve(&self, runtime: &dyn ClientRuntime) -> Result<ChannelConfig>;
}

/// Binding driven by a complete session description.
#[derive(Debug, Clone)]
pub struct SdpBinding<'a> {
    pub sdp: &'a str,
    pub channel_type: ChannelType,
}

impl<'a> SdpBinding<'a> {
    pub fn linear(sdp: &'a str) -> Self {
        Self {
            sdp,
            channel_type: ChannelType::Linear,
        }
    }
}

impl BindingStrategy for SdpBinding<'_> {
    fn resolve(&self, runtime: &dyn ClientRuntime) -> Result<ChannelConfig> {
        runtime.parse_sdp(self.sdp, self.channel_type)
    }
}

/// Binding driven by a stream URI.
#[derive(Debug, Clone)]
pub struct UriBinding<'a> {
    pub uri: &'a str,
}

impl BindingStrategy for UriBinding<'_> {
    fn resolve(&self, _runtime: &dyn ClientRuntime) -> Result<ChannelConfig> {
        ChannelConfig::from_uri(self.uri)
    }
}

/// What a `sdp-or-uri` value holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSource<'a> {
    Sdp(&'a str),
    Uri(&'a str),
}

impl<'a> ChannelSource<'a> {
    pub fn detect(text: &'a str) -> Self {
        let trimmed = text.trim();
        if trimmed.starts_with("rtp://") || trimmed.starts_with("udp://") {
            ChannelSource::Uri(trimmed)
        } else {
            ChannelSource::Sdp(text)
        }
    }

    pub fn strategy(self) -> Box<dyn BindingStrategy + 'a> {
        match self {
            ChannelSource::Sdp(sdp) => Box::new(SdpBinding::linear(sdp)),
            ChannelSource::Uri(uri) => Box::new(UriBinding { uri }),
        }
    }
}

/// Resolve `strategy` and bind `tuner` to the result.
///
/// The identity is derived only after the runtime accepted the bind; on
/// any failure no identity exists and the tuner stays unbound.
pub fn bind(tuner: &mut Tuner, strategy: &dyn BindingStrategy) -> Result<StreamIdentity> {
    let params = tuner.runtime().bind_params();
    let channel = strategy.resolve(tuner.runtime().as_ref())?;
    tuner.bind(&channel, &params)?;

    let identity = StreamIdentity::for_bound(&channel);
    tracing::info!(
        tuner = tuner.name(),
        stream = %identity,
        channel = channel.name.as_deref().unwrap_or("-"),
        "channel bound"
    );
    Ok(identity)
}
