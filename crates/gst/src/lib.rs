//! GStreamer elements for live RTP ingest.
//!
//! Registers two elements:
//!
//! - `vqesdpdemux`: a `Bin` that accepts a session description on its
//!   sink pad and, once the document is complete, instantiates a `vqesrc`
//!   configured with it and exposes the child's output as `src`.
//! - `vqesrc`: a live `PushSrc` that tunes to the channel described by its
//!   `sdp-or-uri` property and outputs MPEG-TS packets.
//!
//! ## Usage with gst-launch
//!
//! ```text
//! gst-launch-1.0 filesrc location=channel.sdp ! vqesdpdemux ! tsdemux ! ...
//! gst-launch-1.0 vqesrc sdp-or-uri=rtp://239.1.1.1:5000 ! filesink location=out.ts
//! ```
//!
//! ## `vqesrc` properties
//!
//! | Property      | Type   | Default | Description                                     |
//! |---------------|--------|---------|-------------------------------------------------|
//! | `sdp-or-uri`  | String | `None`  | SDP document or `rtp://` / `udp://` stream URI   |
//! | `config-path` | String | `""`    | Runtime configuration file (empty for defaults) |
//!
//! Every receive counter is additionally exposed as a read-only `u64`
//! property (`primary-rtp-inputs`, `post-repair-losses`, ...), fetched
//! fresh on each read.

mod sdpdemux;
mod vqesrc;

use gst::glib;
use vqe::{ErrorCategory, VqeError};

/// Map a core error onto the matching GStreamer error domain.
pub(crate) fn error_message(err: &VqeError) -> gst::ErrorMessage {
    let detail = format!("[{}] {}", err.code(), err);
    match err.category() {
        ErrorCategory::MalformedInput => gst::error_msg!(gst::StreamError::Format, ["{}", detail]),
        ErrorCategory::Binding => gst::error_msg!(gst::StreamError::Failed, ["{}", detail]),
        ErrorCategory::Resource => gst::error_msg!(gst::ResourceError::Failed, ["{}", detail]),
        ErrorCategory::RuntimeIo => gst::error_msg!(gst::ResourceError::Read, ["{}", detail]),
        ErrorCategory::Lifecycle => gst::error_msg!(gst::CoreError::Failed, ["{}", detail]),
        ErrorCategory::Configuration => {
            gst::error_msg!(gst::LibraryError::Settings, ["{}", detail])
        }
    }
}

fn plugin_init(plugin: &gst::Plugin) -> Result<(), glib::BoolError> {
    vqesrc::register(plugin)?;
    sdpdemux::register(plugin)?;
    Ok(())
}

gst::plugin_define!(
    vqe,
    "Receive live RTP feeds described by SDP documents",
    plugin_init,
    env!("CARGO_PKG_VERSION"),
    "MIT",
    "gst-vqe",
    "vqe",
    env!("CARGO_PKG_REPOSITORY"),
    "2026-10-19"
);
