//! SDP (Session Description Protocol, RFC 8866) parsing into a
//! [`ChannelConfig`].
//!
//! Only the parts needed to receive the primary stream are interpreted:
//!
//! ```text
//! v=0                                          ← must come first
//! o=- 0 0 IN IP4 10.0.0.1                      ← origin (address fallback)
//! s=Channel 1                                  ← channel name
//! c=IN IP4 232.1.1.1/255                       ← session-level connection
//! t=0 0
//! m=video 5000 RTP/AVP 33                      ← primary stream
//! c=IN IP4 232.1.1.1/255                       ← media-level connection
//! a=source-filter: incl IN IP4 232.1.1.1 10.0.0.1
//! a=rtcp:5001
//! m=video 6000 RTP/AVPF 96                     ← repair stream (ignored)
//! ```
//!
//! The destination is the media-level `c=` address, else the session-level
//! one, else the `o=` origin address.

use std::net::IpAddr;

use crate::channel::{ChannelConfig, ChannelType, Protocol};
use crate::error::{Result, SdpErrorKind, VqeError};

/// Parse `text` into the channel configuration of its first media section.
pub fn parse(text: &str, channel_type: ChannelType) -> Result<ChannelConfig> {
    parse_inner(text, channel_type).map_err(|kind| VqeError::Sdp {
        kind,
        sdp: text.to_string(),
    })
}

#[derive(Default)]
struct Media {
    protocol: Option<Protocol>,
    port: u16,
    payload_type: Option<u8>,
    connection: Option<IpAddr>,
    source: Option<IpAddr>,
    rtcp_port: Option<u16>,
}

fn parse_inner(
    text: &str,
    channel_type: ChannelType,
) -> std::result::Result<ChannelConfig, SdpErrorKind> {
    let mut lines = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    match lines.next() {
        None => return Err(SdpErrorKind::Empty),
        Some((_, "v=0")) => {}
        Some(_) => return Err(SdpErrorKind::MissingVersion),
    }

    let mut name = None;
    let mut origin = None;
    let mut session_connection = None;
    let mut media: Option<Media> = None;
    let mut extra_sections = 0usize;

    for (index, line) in lines {
        let (kind, value) = line
            .split_once('=')
            .filter(|(k, _)| k.len() == 1)
            .ok_or(SdpErrorKind::InvalidLine(index + 1))?;

        if extra_sections > 0 {
            if kind == "m" {
                extra_sections += 1;
            }
            continue;
        }

        match (kind, media.as_mut()) {
            ("s", None) => name = Some(value.trim().to_string()).filter(|s| *s != "-"),
            ("o", None) => origin = Some(origin_address(value)?),
            ("c", None) => session_connection = Some(connection_address(value)?),
            ("m", None) => media = Some(media_line(value)?),
            ("m", Some(_)) => extra_sections += 1,
            ("c", Some(m)) => m.connection = Some(connection_address(value)?),
            ("a", Some(m)) => media_attribute(m, value)?,
            _ => {}
        }
    }

    if extra_sections > 0 {
        tracing::debug!(extra_sections, "ignoring secondary media sections");
    }

    let media = media.ok_or(SdpErrorKind::MissingMedia)?;
    let destination = match media.connection.or(session_connection) {
        Some(addr) => addr,
        None => parse_address(origin.ok_or(SdpErrorKind::MissingAddress)?)?,
    };
    let protocol = media.protocol.ok_or(SdpErrorKind::InvalidMedia)?;

    Ok(ChannelConfig {
        name,
        channel_type,
        protocol,
        destination,
        port: media.port,
        source: media.source,
        rtcp_port: media.rtcp_port,
        payload_type: media.payload_type,
    })
}

/// `o=<user> <sess-id> <sess-version> IN IP4 <address>`
///
/// The address may be a host name, so it is only parsed when no `c=` line
/// supplies the destination.
fn origin_address(value: &str) -> std::result::Result<&str, SdpErrorKind> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    match fields.as_slice() {
        [_, _, _, "IN", _, addr] => Ok(*addr),
        _ => Err(SdpErrorKind::InvalidAddress(value.to_string())),
    }
}

/// `c=IN IP4 <address>[/<ttl>[/<count>]]`
fn connection_address(value: &str) -> std::result::Result<IpAddr, SdpErrorKind> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    match fields.as_slice() {
        ["IN", _, addr] => parse_address(addr.split('/').next().unwrap_or_default()),
        _ => Err(SdpErrorKind::InvalidAddress(value.to_string())),
    }
}

fn parse_address(addr: &str) -> std::result::Result<IpAddr, SdpErrorKind> {
    addr.parse()
        .map_err(|_| SdpErrorKind::InvalidAddress(addr.to_string()))
}

/// `m=<media> <port>[/<count>] <proto> <fmt> ...`
fn media_line(value: &str) -> std::result::Result<Media, SdpErrorKind> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    let [_, port, proto, formats @ ..] = fields.as_slice() else {
        return Err(SdpErrorKind::InvalidMedia);
    };

    let port: u16 = port
        .split('/')
        .next()
        .and_then(|p| p.parse().ok())
        .filter(|p| *p != 0)
        .ok_or(SdpErrorKind::InvalidMedia)?;

    let protocol = match proto.to_ascii_uppercase().as_str() {
        "RTP/AVP" | "RTP/AVPF" | "RTP/SAVP" => Protocol::Rtp,
        "UDP" | "MP2T/H2221/UDP" => Protocol::Udp,
        _ => return Err(SdpErrorKind::UnsupportedTransport(proto.to_string())),
    };

    let payload_type = match protocol {
        Protocol::Rtp => formats.first().and_then(|f| f.parse().ok()),
        Protocol::Udp => None,
    };

    Ok(Media {
        protocol: Some(protocol),
        port,
        payload_type,
        ..Media::default()
    })
}

fn media_attribute(media: &mut Media, value: &str) -> std::result::Result<(), SdpErrorKind> {
    let invalid = || SdpErrorKind::InvalidAttribute(value.to_string());

    if let Some(rtcp) = value.strip_prefix("rtcp:") {
        let port = rtcp
            .split_whitespace()
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        media.rtcp_port = Some(port);
    } else if let Some(filter) = value.strip_prefix("source-filter:") {
        // incl IN IP4 <dest> <src>
        let fields: Vec<&str> = filter.split_whitespace().collect();
        match fields.as_slice() {
            ["incl", "IN", _, _dest, src, ..] => {
                media.source = Some(src.parse().map_err(|_| invalid())?);
            }
            ["excl", ..] => {}
            _ => return Err(invalid()),
        }
    }
    Ok(())
}
