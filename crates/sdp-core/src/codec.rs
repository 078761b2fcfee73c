//! Codec descriptors and the local codec capability contract
//!
//! A [`Codec`] is the `(payload type, rtpmap, fmtp)` triple that appears in a
//! media block. The [`CodecCapabilityProvider`] trait is the seam through
//! which the negotiation layer learns which codecs the local device can
//! encode and decode, and how a remote payload entry maps onto one of them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default payload type advertised for DTMF events
pub const DTMF_PAYLOAD_TYPE: u8 = 127;
/// rtpmap advertised for DTMF events
pub const DTMF_RTPMAP: &str = "telephone-event/8000";
/// fmtp advertised for DTMF events
pub const DTMF_FMTP: &str = "0-15";

/// Returns true if an rtpmap names the RFC 4733 event codec
pub fn is_telephone_event(rtpmap: &str) -> bool {
    rtpmap.starts_with("telephone-event")
}

/// An RTP payload mapping for a single codec
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Codec {
    /// RTP payload type number
    pub payload_type: u8,
    /// Encoding name and clock rate, e.g. `PCMU/8000`
    pub rtpmap: String,
    /// Format parameters, if any
    pub fmtp: Option<String>,
}

impl Codec {
    pub fn new(payload_type: u8, rtpmap: impl Into<String>, fmtp: Option<&str>) -> Self {
        Self {
            payload_type,
            rtpmap: rtpmap.into(),
            fmtp: fmtp.map(str::to_string),
        }
    }

    /// Same codec carried under a different payload type
    pub fn with_payload_type(&self, payload_type: u8) -> Self {
        Self {
            payload_type,
            ..self.clone()
        }
    }

    /// Encoding name portion of the rtpmap
    pub fn encoding_name(&self) -> &str {
        self.rtpmap.split('/').next().unwrap_or_default()
    }

    /// Clock rate portion of the rtpmap
    pub fn clock_rate(&self) -> Option<u32> {
        self.rtpmap.split('/').nth(1).and_then(|rate| rate.parse().ok())
    }

    /// Channel count portion of the rtpmap (defaults to 1)
    pub fn channels(&self) -> u8 {
        self.rtpmap
            .split('/')
            .nth(2)
            .and_then(|ch| ch.parse().ok())
            .unwrap_or(1)
    }

    /// True for codecs bound to a static (non-dynamic) payload type
    pub fn is_static(&self) -> bool {
        self.payload_type < 96
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.payload_type, self.rtpmap)
    }
}

/// Local codec capabilities consumed by the negotiation layer
///
/// Implementations enumerate the locally supported codecs in preference
/// order and decide whether a remote payload entry is acceptable. A match
/// returns the local codec re-keyed to the remote payload type.
pub trait CodecCapabilityProvider: Send + Sync {
    /// Locally supported audio codecs, in advertisement order
    fn audio_codecs(&self) -> Vec<Codec>;

    /// Locally supported video codecs, in advertisement order
    fn video_codecs(&self) -> Vec<Codec>;

    /// Map a remote audio payload entry onto a local codec
    fn match_audio(&self, payload_type: u8, rtpmap: Option<&str>, fmtp: Option<&str>) -> Option<Codec>;

    /// Map a remote video payload entry onto a local codec
    fn match_video(&self, payload_type: u8, rtpmap: Option<&str>, fmtp: Option<&str>) -> Option<Codec>;
}

/// Capability provider backed by fixed codec lists
#[derive(Debug, Clone)]
pub struct StaticCodecProvider {
    audio: Vec<Codec>,
    video: Vec<Codec>,
}

impl StaticCodecProvider {
    pub fn new(audio: Vec<Codec>, video: Vec<Codec>) -> Self {
        Self { audio, video }
    }

    /// G.711 and GSM audio only
    pub fn audio_only() -> Self {
        Self::new(default_audio_codecs(), Vec::new())
    }
}

impl Default for StaticCodecProvider {
    fn default() -> Self {
        Self::new(default_audio_codecs(), default_video_codecs())
    }
}

impl CodecCapabilityProvider for StaticCodecProvider {
    fn audio_codecs(&self) -> Vec<Codec> {
        self.audio.clone()
    }

    fn video_codecs(&self) -> Vec<Codec> {
        self.video.clone()
    }

    fn match_audio(&self, payload_type: u8, rtpmap: Option<&str>, fmtp: Option<&str>) -> Option<Codec> {
        match_codec(&self.audio, payload_type, rtpmap, fmtp, true)
    }

    fn match_video(&self, payload_type: u8, rtpmap: Option<&str>, fmtp: Option<&str>) -> Option<Codec> {
        match_codec(&self.video, payload_type, rtpmap, fmtp, false)
    }
}

/// Audio codecs advertised when no provider is configured
pub fn default_audio_codecs() -> Vec<Codec> {
    vec![
        Codec::new(97, "AMR/8000", None),
        Codec::new(3, "GSM/8000", None),
        Codec::new(0, "PCMU/8000", None),
        Codec::new(8, "PCMA/8000", None),
    ]
}

/// Video codecs advertised when no provider is configured
pub fn default_video_codecs() -> Vec<Codec> {
    vec![Codec::new(
        109,
        "H264/90000",
        Some("profile-level-id=428016;packetization-mode=1"),
    )]
}

fn match_codec(
    local: &[Codec],
    payload_type: u8,
    rtpmap: Option<&str>,
    fmtp: Option<&str>,
    check_fmtp: bool,
) -> Option<Codec> {
    let rtpmap = rtpmap.map(str::trim).filter(|r| !r.is_empty());

    let Some(rtpmap) = rtpmap else {
        // Without an rtpmap only static payload types are meaningful.
        return local
            .iter()
            .find(|codec| codec.is_static() && codec.payload_type == payload_type)
            .cloned();
    };

    let remote = Codec::new(payload_type, rtpmap, fmtp);
    local
        .iter()
        .find(|codec| {
            codec.encoding_name().eq_ignore_ascii_case(remote.encoding_name())
                && codec.clock_rate() == remote.clock_rate()
                && codec.channels() == remote.channels()
                && (!check_fmtp || fmtp_compatible(codec.fmtp.as_deref(), fmtp))
        })
        .map(|codec| codec.with_payload_type(payload_type))
}

/// Parameters present on both sides must agree; missing ones are tolerated.
fn fmtp_compatible(local: Option<&str>, remote: Option<&str>) -> bool {
    let (Some(local), Some(remote)) = (local, remote) else {
        return true;
    };
    let remote_params = fmtp_params(remote);
    fmtp_params(local).into_iter().all(|(key, value)| {
        remote_params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map_or(true, |(_, v)| v.eq_ignore_ascii_case(value))
    })
}

/// Split an fmtp string into `key=value` pairs
pub fn fmtp_params(fmtp: &str) -> Vec<(&str, &str)> {
    fmtp.split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (p, ""),
        })
        .collect()
}
