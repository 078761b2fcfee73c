//! Session description model and its wire encoding
//!
//! A [`SessionDescription`] carries a numeric session id, a connection
//! address, session-level bandwidth and attributes, and an ordered list of
//! [`MediaBlock`]s. Encoding writes every collection in insertion order so
//! that an encode → decode → encode cycle reproduces the same text.
//!
//! # Examples
//!
//! ```
//! use confcall_sdp_core::{SessionDescription, MediaKind, RTP_AVP};
//!
//! let mut offer = SessionDescription::new(1234, "192.0.2.10");
//! offer
//!     .new_media(MediaKind::Audio, 49170, 1, RTP_AVP)
//!     .set_rtp_payload(0, "PCMU/8000", None)
//!     .set_rtp_payload(127, "telephone-event/8000", Some("0-15"));
//!
//! let text = offer.encode();
//! assert!(text.contains("m=audio 49170 RTP/AVP 0 127\r\n"));
//!
//! let decoded = SessionDescription::parse(&text).unwrap();
//! assert_eq!(decoded.encode(), text);
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::direction::Direction;
use crate::error::{Result, SdpError};
use crate::media::{MediaBlock, MediaKind};
use crate::parser;

const CRLF: &str = "\r\n";

/// An SDP offer or answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    session_id: u64,
    address: String,
    bandwidth: IndexMap<String, u32>,
    attributes: IndexMap<String, String>,
    media: Vec<MediaBlock>,
}

impl SessionDescription {
    /// Start a new description owned by `session_id` at `address`
    pub fn new(session_id: u64, address: impl Into<String>) -> Self {
        Self {
            session_id,
            address: address.into(),
            bandwidth: IndexMap::new(),
            attributes: IndexMap::new(),
            media: Vec::new(),
        }
    }

    /// Decode description text
    pub fn parse(text: &str) -> Result<Self> {
        parser::parse_session_description(text)
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Session-level connection address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Append a media block and return it for further building
    pub fn new_media(
        &mut self,
        kind: impl Into<MediaKind>,
        port: u16,
        port_count: u16,
        protocol: impl Into<String>,
    ) -> &mut MediaBlock {
        self.push_media(MediaBlock::new(kind, port, port_count, protocol))
    }

    pub fn push_media(&mut self, media: MediaBlock) -> &mut MediaBlock {
        self.media.push(media);
        let last = self.media.len() - 1;
        &mut self.media[last]
    }

    pub fn media(&self) -> &[MediaBlock] {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut [MediaBlock] {
        &mut self.media
    }

    /// First media block of the given kind
    pub fn first_media(&self, kind: &MediaKind) -> Option<&MediaBlock> {
        self.media.iter().find(|m| m.kind() == kind)
    }

    pub fn set_bandwidth(&mut self, bw_type: impl Into<String>, kbps: u32) -> &mut Self {
        self.bandwidth.insert(bw_type.into(), kbps);
        self
    }

    pub fn bandwidth(&self, bw_type: &str) -> Option<u32> {
        self.bandwidth.get(bw_type).copied()
    }

    /// Set a session-level attribute; flags use an empty value
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        self.attributes.shift_remove(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Session-level direction, if declared
    pub fn direction(&self) -> Option<Direction> {
        self.attributes.keys().find_map(|k| Direction::from_attribute(k))
    }

    pub fn set_direction(&mut self, direction: Direction) -> &mut Self {
        self.attributes.retain(|k, _| Direction::from_attribute(k).is_none());
        self.set_attribute(direction.attribute_name(), "")
    }

    /// Encode to wire text (CRLF line endings)
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(256);
        let addr_type = address_type(&self.address);

        push_line(&mut out, "v=0");
        push_line(
            &mut out,
            &format!("o=- {id} {id} IN {addr_type} {}", self.address, id = self.session_id),
        );
        push_line(&mut out, "s=-");
        push_line(&mut out, &format!("c=IN {addr_type} {}", self.address));
        push_line(&mut out, "t=0 0");
        encode_bandwidth(&mut out, &self.bandwidth);
        encode_attributes(&mut out, &self.attributes);

        for media in &self.media {
            encode_media(&mut out, media);
        }
        out
    }
}

impl FromStr for SessionDescription {
    type Err = SdpError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

// Crate-internal setters used by the parser
impl SessionDescription {
    pub(crate) fn set_session_id(&mut self, session_id: u64) {
        self.session_id = session_id;
    }

    pub(crate) fn set_address(&mut self, address: impl Into<String>) {
        self.address = address.into();
    }

    pub(crate) fn last_media_mut(&mut self) -> Option<&mut MediaBlock> {
        self.media.last_mut()
    }
}

pub(crate) fn address_type(address: &str) -> &'static str {
    if address.contains(':') {
        "IP6"
    } else {
        "IP4"
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push_str(CRLF);
}

fn encode_bandwidth(out: &mut String, bandwidth: &IndexMap<String, u32>) {
    for (bw_type, kbps) in bandwidth {
        push_line(out, &format!("b={bw_type}:{kbps}"));
    }
}

fn encode_attributes(out: &mut String, attributes: &IndexMap<String, String>) {
    for (name, value) in attributes {
        if value.is_empty() {
            push_line(out, &format!("a={name}"));
        } else {
            push_line(out, &format!("a={name}:{value}"));
        }
    }
}

fn encode_media(out: &mut String, media: &MediaBlock) {
    let port = if media.port_count() > 1 {
        format!("{}/{}", media.port(), media.port_count())
    } else {
        media.port().to_string()
    };
    let mut line = format!("m={} {} {}", media.kind(), port, media.protocol());
    for format in media.formats() {
        line.push(' ');
        line.push_str(&format);
    }
    push_line(out, &line);

    if let Some(address) = media.address() {
        push_line(out, &format!("c=IN {} {}", address_type(address), address));
    }
    for (bw_type, kbps) in media.bandwidths() {
        push_line(out, &format!("b={bw_type}:{kbps}"));
    }
    for (pt, payload) in media.payloads() {
        if let Some(rtpmap) = &payload.rtpmap {
            push_line(out, &format!("a=rtpmap:{pt} {rtpmap}"));
        }
        if let Some(fmtp) = &payload.fmtp {
            push_line(out, &format!("a=fmtp:{pt} {fmtp}"));
        }
    }
    for (name, value) in media.attributes() {
        if value.is_empty() {
            push_line(out, &format!("a={name}"));
        } else {
            push_line(out, &format!("a={name}:{value}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::RTP_AVP;
    use pretty_assertions::assert_eq;

    fn conference_offer() -> SessionDescription {
        let mut sd = SessionDescription::new(1700000000000, "10.0.0.5");
        sd.new_media(MediaKind::Audio, 40000, 1, RTP_AVP)
            .set_bandwidth("AS", 64)
            .set_rtp_payload(0, "PCMU/8000", None)
            .set_rtp_payload(8, "PCMA/8000", None)
            .set_rtp_payload(127, "telephone-event/8000", Some("0-15"));
        sd.new_media(MediaKind::Video, 65432, 1, RTP_AVP)
            .set_bandwidth("AS", 5000)
            .set_rtp_payload(109, "H264/90000", Some("profile-level-id=428016"))
            .set_attribute("framesize", "109 640-480");
        sd
    }

    #[test]
    fn test_encode_layout() {
        let text = conference_offer().encode();
        let expected = "v=0\r\n\
            o=- 1700000000000 1700000000000 IN IP4 10.0.0.5\r\n\
            s=-\r\n\
            c=IN IP4 10.0.0.5\r\n\
            t=0 0\r\n\
            m=audio 40000 RTP/AVP 0 8 127\r\n\
            b=AS:64\r\n\
            a=rtpmap:0 PCMU/8000\r\n\
            a=rtpmap:8 PCMA/8000\r\n\
            a=rtpmap:127 telephone-event/8000\r\n\
            a=fmtp:127 0-15\r\n\
            m=video 65432 RTP/AVP 109\r\n\
            b=AS:5000\r\n\
            a=rtpmap:109 H264/90000\r\n\
            a=fmtp:109 profile-level-id=428016\r\n\
            a=framesize:109 640-480\r\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_round_trip_is_stable() {
        let mut sd = conference_offer();
        sd.set_attribute("sendonly", "").set_attribute("videosendonly", "");
        let first = sd.encode();
        let decoded = SessionDescription::parse(&first).unwrap();
        assert_eq!(decoded, sd);
        assert_eq!(decoded.encode(), first);
    }

    #[test]
    fn test_session_direction() {
        let mut sd = SessionDescription::new(1, "10.0.0.1");
        sd.set_direction(Direction::SendOnly);
        assert_eq!(sd.direction(), Some(Direction::SendOnly));
        sd.set_direction(Direction::RecvOnly);
        assert!(!sd.has_attribute("sendonly"));
        assert_eq!(sd.attribute("recvonly"), Some(""));
    }

    #[test]
    fn test_ipv6_address_type() {
        let sd = SessionDescription::new(7, "2001:db8::1");
        let text = sd.encode();
        assert!(text.contains("c=IN IP6 2001:db8::1\r\n"));
        let decoded: SessionDescription = text.parse().unwrap();
        assert_eq!(decoded.address(), "2001:db8::1");
    }
}
