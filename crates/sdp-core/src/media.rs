//! Media blocks (`m=` sections)

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::Codec;
use crate::direction::Direction;

/// RTP/AVP profile token
pub const RTP_AVP: &str = "RTP/AVP";

/// Media type of an `m=` line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    Video,
    /// Any other media type, kept verbatim
    Other(String),
}

impl MediaKind {
    pub fn as_str(&self) -> &str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Other(s) => s,
        }
    }
}

impl From<&str> for MediaKind {
    fn from(value: &str) -> Self {
        match value {
            "audio" => MediaKind::Audio,
            "video" => MediaKind::Video,
            other => MediaKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// rtpmap/fmtp pair for one payload type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpPayload {
    pub rtpmap: Option<String>,
    pub fmtp: Option<String>,
}

/// One media description inside a session description
///
/// Payload types, bandwidth lines and attributes all keep insertion order,
/// which is also the order they are encoded in. An attribute name may
/// repeat (one `framesize` per video payload, for instance).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaBlock {
    kind: MediaKind,
    port: u16,
    port_count: u16,
    protocol: String,
    address: Option<String>,
    payloads: IndexMap<u8, RtpPayload>,
    /// Non-numeric formats (e.g. for non-RTP protocols)
    other_formats: Vec<String>,
    bandwidth: IndexMap<String, u32>,
    attributes: Vec<(String, String)>,
}

impl MediaBlock {
    pub fn new(kind: impl Into<MediaKind>, port: u16, port_count: u16, protocol: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            port,
            port_count: port_count.max(1),
            protocol: protocol.into(),
            address: None,
            payloads: IndexMap::new(),
            other_formats: Vec::new(),
            bandwidth: IndexMap::new(),
            attributes: Vec::new(),
        }
    }

    pub fn kind(&self) -> &MediaKind {
        &self.kind
    }

    pub fn is_audio(&self) -> bool {
        self.kind == MediaKind::Audio
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn port_count(&self) -> u16 {
        self.port_count
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Media-level connection address, if present
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn set_address(&mut self, address: impl Into<String>) -> &mut Self {
        self.address = Some(address.into());
        self
    }

    /// Add or replace a payload mapping. Re-setting an existing payload
    /// type keeps its original position.
    pub fn set_rtp_payload(&mut self, payload_type: u8, rtpmap: &str, fmtp: Option<&str>) -> &mut Self {
        self.payloads.insert(
            payload_type,
            RtpPayload {
                rtpmap: Some(rtpmap.to_string()),
                fmtp: fmtp.map(str::to_string),
            },
        );
        self
    }

    /// Add a payload mapping from a codec descriptor
    pub fn set_codec(&mut self, codec: &Codec) -> &mut Self {
        self.set_rtp_payload(codec.payload_type, &codec.rtpmap, codec.fmtp.as_deref())
    }

    /// Declare a payload type without rtpmap (static assignment)
    pub fn add_format(&mut self, payload_type: u8) -> &mut Self {
        self.payloads.entry(payload_type).or_default();
        self
    }

    pub fn add_other_format(&mut self, format: impl Into<String>) -> &mut Self {
        self.other_formats.push(format.into());
        self
    }

    pub(crate) fn payload_mut(&mut self, payload_type: u8) -> &mut RtpPayload {
        self.payloads.entry(payload_type).or_default()
    }

    pub fn remove_rtp_payload(&mut self, payload_type: u8) -> Option<RtpPayload> {
        self.payloads.shift_remove(&payload_type)
    }

    /// Payload types in the order they appear on the `m=` line
    pub fn rtp_payload_types(&self) -> Vec<u8> {
        self.payloads.keys().copied().collect()
    }

    pub fn rtp_payload(&self, payload_type: u8) -> Option<&RtpPayload> {
        self.payloads.get(&payload_type)
    }

    pub fn rtpmap(&self, payload_type: u8) -> Option<&str> {
        self.payloads.get(&payload_type).and_then(|p| p.rtpmap.as_deref())
    }

    pub fn fmtp(&self, payload_type: u8) -> Option<&str> {
        self.payloads.get(&payload_type).and_then(|p| p.fmtp.as_deref())
    }

    pub fn payloads(&self) -> impl Iterator<Item = (u8, &RtpPayload)> {
        self.payloads.iter().map(|(pt, p)| (*pt, p))
    }

    /// All formats on the `m=` line, payload types first
    pub fn formats(&self) -> Vec<String> {
        self.payloads
            .keys()
            .map(|pt| pt.to_string())
            .chain(self.other_formats.iter().cloned())
            .collect()
    }

    pub fn set_bandwidth(&mut self, bw_type: impl Into<String>, kbps: u32) -> &mut Self {
        self.bandwidth.insert(bw_type.into(), kbps);
        self
    }

    pub fn bandwidth(&self, bw_type: &str) -> Option<u32> {
        self.bandwidth.get(bw_type).copied()
    }

    pub fn bandwidths(&self) -> impl Iterator<Item = (&str, u32)> {
        self.bandwidth.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Set a named attribute; flags use an empty value
    ///
    /// Replaces every existing value of `name`, keeping the position of the
    /// first one.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter().position(|(k, _)| *k == name) {
            Some(first) => {
                self.attributes[first].1 = value;
                let mut index = 0;
                self.attributes.retain(|(k, _)| {
                    let keep = index <= first || *k != name;
                    index += 1;
                    keep
                });
            }
            None => self.attributes.push((name, value)),
        }
        self
    }

    /// Append an attribute line, keeping any existing lines of the same name
    pub fn add_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// First value of `name`
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attribute_values(name).next()
    }

    /// Every value of `name`, in line order
    pub fn attribute_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        self.attributes
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|(k, _)| k == name)
    }

    /// Remove every line of `name`, returning the first value
    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let first = self.attributes.iter().position(|(k, _)| k == name)?;
        let removed = self.attributes.remove(first).1;
        self.attributes.retain(|(k, _)| k != name);
        Some(removed)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Direction declared on this block, if any
    pub fn direction(&self) -> Option<Direction> {
        self.attributes.iter().find_map(|(k, _)| Direction::from_attribute(k))
    }

    pub fn set_direction(&mut self, direction: Direction) -> &mut Self {
        self.clear_direction();
        self.set_attribute(direction.attribute_name(), "")
    }

    pub fn clear_direction(&mut self) -> &mut Self {
        self.attributes.retain(|(k, _)| Direction::from_attribute(k).is_none());
        self
    }

    /// True for an RTP block that is not disabled (port 0)
    pub fn is_active_rtp(&self, protocol: &str) -> bool {
        self.port > 0 && self.protocol == protocol
    }
}
