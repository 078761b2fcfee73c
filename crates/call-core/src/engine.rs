//! Offer and answer construction
//!
//! The [`SdpNegotiationEngine`] owns all media-construction policy. It is a
//! pure function of its inputs: the local endpoint (session id, address,
//! audio port), the local codec capabilities, the call configuration and,
//! for resume/hold offers, the codec currently running on the audio stream.
//!
//! | Description      | Audio block                     | Video block   | Session attribute |
//! |------------------|---------------------------------|---------------|-------------------|
//! | initial offer    | all codecs + DTMF               | none          | none              |
//! | conference offer | all codecs + DTMF, `b=AS`       | all codecs    | none              |
//! | continue offer   | active codec + active DTMF type | none          | none              |
//! | hold offer       | as continue                     | none          | `sendonly`        |
//! | invisible offer  | as conference                   | as conference | `videosendonly`   |

use std::sync::Arc;

use confcall_sdp_core::{
    Codec, CodecCapabilityProvider, Direction, MediaBlock, MediaKind, SessionDescription, DTMF_FMTP,
    DTMF_RTPMAP, H264_RTPMAP,
};
use tracing::{debug, warn};

use crate::config::CallConfig;
use crate::errors::{CallError, CallResult};
use crate::media::StreamMode;
use crate::negotiator::{answer_direction, remote_direction, CodecNegotiator};

/// Attribute carrying the advertised video resolution
pub const FRAMESIZE: &str = "framesize";
/// Session attribute marking outbound video as suppressed
pub const VIDEO_SEND_ONLY: &str = "videosendonly";
/// Bandwidth modifier used for all bandwidth hints
pub const BANDWIDTH_AS: &str = "AS";
/// Prefix of the video-only description handed to the video pipeline
pub const SDP_URI_PREFIX: &str = "sdp://";

/// Local side of a description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEndpoint {
    pub session_id: u64,
    pub address: String,
    pub audio_port: u16,
}

impl LocalEndpoint {
    pub fn new(session_id: u64, address: impl Into<String>, audio_port: u16) -> Self {
        Self {
            session_id,
            address: address.into(),
            audio_port,
        }
    }
}

/// Codec state of the live audio stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveAudio {
    pub codec: Codec,
    pub dtmf_payload_type: Option<u8>,
}

/// Result of negotiating the audio stream against a peer description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedAudio {
    /// Remote address, media level first
    pub address: String,
    pub port: u16,
    pub codec: Codec,
    pub dtmf_payload_type: Option<u8>,
    /// One-way direction the peer declared, if any
    pub remote_direction: Option<Direction>,
}

impl NegotiatedAudio {
    /// Stream mode to apply to the local audio stream
    pub fn stream_mode(&self, on_hold: bool) -> StreamMode {
        if on_hold {
            return StreamMode::Normal;
        }
        match self.remote_direction {
            Some(Direction::RecvOnly) => StreamMode::SendOnly,
            Some(Direction::SendOnly) => StreamMode::ReceiveOnly,
            _ => StreamMode::Normal,
        }
    }
}

/// Builds offers and answers for one call session
#[derive(Debug, Clone)]
pub struct SdpNegotiationEngine {
    negotiator: CodecNegotiator,
    config: CallConfig,
}

impl SdpNegotiationEngine {
    pub fn new(capabilities: Arc<dyn CodecCapabilityProvider>, config: CallConfig) -> Self {
        Self {
            negotiator: CodecNegotiator::new(capabilities),
            config,
        }
    }

    pub fn negotiator(&self) -> &CodecNegotiator {
        &self.negotiator
    }

    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    /// Audio-only offer with every local audio codec and DTMF
    pub fn initial_offer(&self, local: &LocalEndpoint) -> SessionDescription {
        let mut offer = SessionDescription::new(local.session_id, local.address.clone());
        self.push_audio_offer(&mut offer, local, None);
        offer
    }

    /// Audio plus video offer with bandwidth hints and resolution
    pub fn conference_offer(&self, local: &LocalEndpoint) -> SessionDescription {
        let mut offer = SessionDescription::new(local.session_id, local.address.clone());
        self.push_audio_offer(&mut offer, local, Some(self.config.audio_bandwidth_kbps));

        let resolution = self.config.video_resolution.as_str();
        let video = offer.new_media(
            MediaKind::Video,
            self.config.local_video_port,
            1,
            self.config.rtp_protocol.clone(),
        );
        video.set_bandwidth(BANDWIDTH_AS, self.config.video_bandwidth_kbps);
        for codec in self.negotiator.capabilities().video_codecs() {
            video
                .set_codec(&codec)
                .add_attribute(FRAMESIZE, format!("{} {}", codec.payload_type, resolution));
        }
        offer
    }

    /// Audio-only offer restating the codec already running on the stream
    pub fn continue_offer(&self, local: &LocalEndpoint, active: &ActiveAudio) -> SessionDescription {
        let mut offer = SessionDescription::new(local.session_id, local.address.clone());
        let audio = offer.new_media(MediaKind::Audio, local.audio_port, 1, self.config.rtp_protocol.clone());
        audio.set_codec(&active.codec);
        if let Some(dtmf) = active.dtmf_payload_type {
            audio.set_rtp_payload(dtmf, DTMF_RTPMAP, Some(DTMF_FMTP));
        }
        offer
    }

    /// Continue offer with the local side marked `sendonly`
    pub fn hold_offer(&self, local: &LocalEndpoint, active: &ActiveAudio) -> SessionDescription {
        let mut offer = self.continue_offer(local, active);
        offer.set_direction(Direction::SendOnly);
        offer
    }

    /// Conference offer with outbound video suppressed
    pub fn invisible_offer(&self, local: &LocalEndpoint) -> SessionDescription {
        let mut offer = self.conference_offer(local);
        offer.set_attribute(VIDEO_SEND_ONLY, "");
        offer
    }

    fn push_audio_offer(&self, offer: &mut SessionDescription, local: &LocalEndpoint, bandwidth: Option<u32>) {
        let audio = offer.new_media(MediaKind::Audio, local.audio_port, 1, self.config.rtp_protocol.clone());
        if let Some(kbps) = bandwidth {
            audio.set_bandwidth(BANDWIDTH_AS, kbps);
        }
        for codec in self.negotiator.capabilities().audio_codecs() {
            audio.set_codec(&codec);
        }
        audio.set_rtp_payload(self.config.dtmf_payload_type, DTMF_RTPMAP, Some(DTMF_FMTP));
    }

    /// Answer a peer description
    ///
    /// An empty description is a late offer and is answered with an initial
    /// offer. Otherwise the first active audio block with a supported codec
    /// is answered; if none exists the whole answer is rejected. When
    /// `conference` is set, the first active video block is answered too if
    /// a video codec matches.
    pub fn create_answer(&self, offer_text: &str, local: &LocalEndpoint, conference: bool) -> CallResult<SessionDescription> {
        if offer_text.trim().is_empty() {
            debug!("Empty peer description, answering with an offer");
            return Ok(self.initial_offer(local));
        }

        let offer = SessionDescription::parse(offer_text)?;
        let mut answer = SessionDescription::new(local.session_id, local.address.clone());
        let protocol = self.config.rtp_protocol.as_str();

        let audio_match = offer
            .media()
            .iter()
            .filter(|media| media.is_audio() && media.is_active_rtp(protocol))
            .find_map(|media| self.negotiator.select_audio_codec(media).map(|codec| (media, codec)));

        let Some((remote_audio, codec)) = audio_match else {
            warn!("Rejecting peer description: no suitable audio codec");
            return Err(CallError::rejected("no suitable codecs"));
        };

        let reply = answer.new_media(MediaKind::Audio, local.audio_port, 1, protocol);
        reply.set_codec(&codec);
        for dtmf in self.negotiator.dtmf_passthrough(remote_audio, &codec) {
            reply.set_rtp_payload(dtmf.payload_type, &dtmf.rtpmap, dtmf.fmtp.as_deref());
        }
        if let Some(direction) = answer_direction(&offer, remote_audio) {
            answer.set_direction(direction);
        }

        if conference {
            if let Some(remote_video) = offer
                .media()
                .iter()
                .find(|media| media.is_video() && media.is_active_rtp(protocol))
            {
                self.answer_video(&mut answer, remote_video);
            }
        }

        Ok(answer)
    }

    fn answer_video(&self, answer: &mut SessionDescription, remote: &MediaBlock) {
        let Some(codec) = self.negotiator.select_video_codec(remote) else {
            debug!("No supported video codec offered, continuing audio-only");
            return;
        };
        let reply = answer.new_media(
            MediaKind::Video,
            self.config.local_video_port,
            1,
            self.config.rtp_protocol.clone(),
        );
        reply
            .set_bandwidth(BANDWIDTH_AS, self.config.video_bandwidth_kbps)
            .set_codec(&codec);
        if let Some(framesize) = payload_framesize(remote, codec.payload_type) {
            reply.set_attribute(FRAMESIZE, framesize);
        }
    }

    /// Derive audio stream parameters from the peer's description
    pub fn negotiate_media(&self, peer_text: &str) -> CallResult<NegotiatedAudio> {
        let peer = SessionDescription::parse(peer_text)?;
        let protocol = self.config.rtp_protocol.as_str();

        for media in peer.media() {
            if !media.is_audio() || !media.is_active_rtp(protocol) {
                continue;
            }
            let Some(codec) = self.negotiator.select_audio_codec(media) else {
                continue;
            };
            let dtmf_payload_type = self
                .negotiator
                .dtmf_passthrough(media, &codec)
                .last()
                .map(|dtmf| dtmf.payload_type);
            return Ok(NegotiatedAudio {
                address: media.address().unwrap_or(peer.address()).to_string(),
                port: media.port(),
                codec,
                dtmf_payload_type,
                remote_direction: remote_direction(&peer, media),
            });
        }
        Err(CallError::rejected("no suitable codecs"))
    }

    /// Address of the first video block of the expected protocol, falling
    /// back to the session address
    pub fn video_address(&self, sd: &SessionDescription) -> String {
        self.first_video(sd)
            .and_then(MediaBlock::address)
            .unwrap_or(sd.address())
            .to_string()
    }

    /// Port of the first video block of the expected protocol, 0xFFFF if none
    pub fn video_port(&self, sd: &SessionDescription) -> u16 {
        self.first_video(sd).map_or(0xFFFF, MediaBlock::port)
    }

    /// Protocol of the first video block of any protocol
    pub fn video_protocol(&self, sd: &SessionDescription) -> Option<String> {
        sd.first_media(&MediaKind::Video)
            .map(|media| media.protocol().to_string())
    }

    fn first_video<'a>(&self, sd: &'a SessionDescription) -> Option<&'a MediaBlock> {
        sd.media()
            .iter()
            .find(|media| media.is_video() && media.protocol() == self.config.rtp_protocol)
    }

    /// Video-only description of the peer's H.264 stream, `sdp://`-prefixed
    ///
    /// Carries the first H.264 payload of the peer's video block under the
    /// local video port, plus its resolution attribute.
    pub fn video_description(&self, session_id: u64, peer: &SessionDescription) -> String {
        let mut description = SessionDescription::new(session_id, self.video_address(peer));
        let h264 = self.first_video(peer).and_then(|media| {
            media
                .payloads()
                .find(|(_, payload)| payload.rtpmap.as_deref() == Some(H264_RTPMAP))
                .map(|(pt, payload)| (media, pt, payload.clone()))
        });

        if let Some((media, payload_type, payload)) = h264 {
            let video = description.new_media(
                MediaKind::Video,
                self.config.local_video_port,
                1,
                self.config.rtp_protocol.clone(),
            );
            video.set_rtp_payload(payload_type, H264_RTPMAP, payload.fmtp.as_deref());
            if let Some(framesize) = payload_framesize(media, payload_type) {
                video.set_attribute(FRAMESIZE, framesize);
            }
        }
        format!("{}{}", SDP_URI_PREFIX, description.encode())
    }
}

/// Resolution line for `payload_type`, falling back to the block's first one
fn payload_framesize(media: &MediaBlock, payload_type: u8) -> Option<&str> {
    let prefix = payload_type.to_string();
    let mut values = media.attribute_values(FRAMESIZE).filter(|v| !v.is_empty());
    let first = values.next()?;
    if first.split_whitespace().next() == Some(prefix.as_str()) {
        return Some(first);
    }
    values
        .find(|v| v.split_whitespace().next() == Some(prefix.as_str()))
        .or(Some(first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VideoResolution;
    use confcall_sdp_core::{StaticCodecProvider, RTP_AVP};
    use pretty_assertions::assert_eq;

    fn engine() -> SdpNegotiationEngine {
        SdpNegotiationEngine::new(Arc::new(StaticCodecProvider::default()), CallConfig::default())
    }

    fn local() -> LocalEndpoint {
        LocalEndpoint::new(42, "10.0.0.2", 40000)
    }

    #[test]
    fn test_initial_offer() {
        let offer = engine().initial_offer(&local());
        assert_eq!(offer.media().len(), 1);
        let audio = &offer.media()[0];
        assert_eq!(audio.port(), 40000);
        assert_eq!(audio.rtp_payload_types(), vec![97, 3, 0, 8, 127]);
        assert_eq!(audio.rtpmap(127), Some("telephone-event/8000"));
        assert_eq!(audio.fmtp(127), Some("0-15"));
        assert_eq!(audio.bandwidth("AS"), None);
    }

    #[test]
    fn test_conference_offer_layout() {
        let engine = SdpNegotiationEngine::new(
            Arc::new(StaticCodecProvider::default()),
            CallConfig::default().with_video_resolution(VideoResolution::Hd720),
        );
        let offer = engine.conference_offer(&local());
        assert_eq!(offer.media().len(), 2);
        assert_eq!(offer.media()[0].bandwidth("AS"), Some(64));

        let video = &offer.media()[1];
        assert_eq!(video.port(), 65432);
        assert_eq!(video.bandwidth("AS"), Some(5000));
        assert_eq!(video.rtp_payload_types(), vec![109]);
        assert_eq!(video.attribute("framesize"), Some("109 1280-720"));
    }

    #[test]
    fn test_conference_offer_framesize_per_video_codec() {
        let provider = StaticCodecProvider::new(
            confcall_sdp_core::default_audio_codecs(),
            vec![
                Codec::new(109, "H264/90000", Some("profile-level-id=428016")),
                Codec::new(110, "H264/90000", Some("profile-level-id=42e01f")),
            ],
        );
        let engine = SdpNegotiationEngine::new(Arc::new(provider), CallConfig::default());
        let offer = engine.conference_offer(&local());

        let video = &offer.media()[1];
        assert_eq!(video.rtp_payload_types(), vec![109, 110]);
        assert_eq!(
            video.attribute_values("framesize").collect::<Vec<_>>(),
            vec!["109 640-480", "110 640-480"]
        );

        let text = offer.encode();
        assert!(text.contains("a=framesize:109 640-480\r\na=framesize:110 640-480\r\n"));
    }

    #[test]
    fn test_answer_copies_framesize_of_selected_payload() {
        let mut peer = SessionDescription::new(7, "10.0.0.9");
        peer.new_media(MediaKind::Audio, 30000, 1, RTP_AVP)
            .set_rtp_payload(0, "PCMU/8000", None);
        peer.new_media(MediaKind::Video, 30002, 1, RTP_AVP)
            .set_rtp_payload(98, "VP8/90000", None)
            .set_rtp_payload(96, "H264/90000", Some("profile-level-id=428016"))
            .add_attribute("framesize", "98 320-240")
            .add_attribute("framesize", "96 1280-720");

        let answer = engine().create_answer(&peer.encode(), &local(), true).unwrap();
        let video = &answer.media()[1];
        assert_eq!(video.attribute("framesize"), Some("96 1280-720"));
    }

    #[test]
    fn test_hold_offer_restates_active_codec() {
        let active = ActiveAudio {
            codec: Codec::new(0, "PCMU/8000", None),
            dtmf_payload_type: Some(101),
        };
        let offer = engine().hold_offer(&local(), &active);
        assert_eq!(offer.direction(), Some(Direction::SendOnly));
        let audio = &offer.media()[0];
        assert_eq!(audio.rtp_payload_types(), vec![0, 101]);
        assert_eq!(audio.rtpmap(101), Some("telephone-event/8000"));

        let resumed = engine().continue_offer(&local(), &active);
        assert_eq!(resumed.direction(), None);
        assert_eq!(resumed.media(), offer.media());
    }

    #[test]
    fn test_invisible_offer_keeps_base_directions() {
        let offer = engine().invisible_offer(&local());
        assert!(offer.has_attribute("videosendonly"));
        assert_eq!(offer.direction(), None);
        assert_eq!(offer.media().len(), 2);
    }

    #[test]
    fn test_answer_scans_past_inactive_blocks() {
        let mut offer = SessionDescription::new(9, "198.51.100.1");
        offer
            .new_media(MediaKind::Audio, 0, 1, RTP_AVP)
            .set_rtp_payload(0, "PCMU/8000", None);
        offer
            .new_media(MediaKind::Audio, 5000, 1, RTP_AVP)
            .set_rtp_payload(18, "G729/8000", None);
        offer
            .new_media(MediaKind::Audio, 6000, 1, RTP_AVP)
            .set_rtp_payload(8, "PCMA/8000", None)
            .set_rtp_payload(101, "telephone-event/8000", Some("0-15"))
            .set_direction(Direction::RecvOnly);

        let answer = engine().create_answer(&offer.encode(), &local(), false).unwrap();
        assert_eq!(answer.media().len(), 1);
        let audio = &answer.media()[0];
        assert_eq!(audio.port(), 40000);
        assert_eq!(audio.rtp_payload_types(), vec![8, 101]);
        assert_eq!(answer.direction(), Some(Direction::SendOnly));
        assert_eq!(audio.direction(), None);
    }

    #[test]
    fn test_answer_without_direction() {
        let mut offer = SessionDescription::new(9, "198.51.100.1");
        offer
            .new_media(MediaKind::Audio, 5000, 1, RTP_AVP)
            .set_rtp_payload(0, "PCMU/8000", None);
        let answer = engine().create_answer(&offer.encode(), &local(), false).unwrap();
        assert_eq!(answer.direction(), None);
        assert!(!answer.encode().contains("sendonly"));
        assert!(!answer.encode().contains("recvonly"));
    }

    #[test]
    fn test_conference_answer_copies_framesize() {
        let mut offer = SessionDescription::new(9, "198.51.100.1");
        offer
            .new_media(MediaKind::Audio, 5000, 1, RTP_AVP)
            .set_rtp_payload(0, "PCMU/8000", None);
        offer
            .new_media(MediaKind::Video, 5002, 1, RTP_AVP)
            .set_rtp_payload(96, "H264/90000", Some("profile-level-id=42e01f"))
            .set_attribute("framesize", "96 1280-720");

        let answer = engine().create_answer(&offer.encode(), &local(), true).unwrap();
        let video = &answer.media()[1];
        assert_eq!(video.rtp_payload_types(), vec![96]);
        assert_eq!(video.port(), 65432);
        assert_eq!(video.bandwidth("AS"), Some(5000));
        assert_eq!(video.attribute("framesize"), Some("96 1280-720"));

        let audio_only = engine().create_answer(&offer.encode(), &local(), false).unwrap();
        assert_eq!(audio_only.media().len(), 1);
    }

    #[test]
    fn test_unsupported_video_is_not_fatal() {
        let mut offer = SessionDescription::new(9, "198.51.100.1");
        offer
            .new_media(MediaKind::Audio, 5000, 1, RTP_AVP)
            .set_rtp_payload(0, "PCMU/8000", None);
        offer
            .new_media(MediaKind::Video, 5002, 1, RTP_AVP)
            .set_rtp_payload(100, "VP8/90000", None);
        let answer = engine().create_answer(&offer.encode(), &local(), true).unwrap();
        assert_eq!(answer.media().len(), 1);
    }

    #[test]
    fn test_video_only_offer_rejected() {
        let mut offer = SessionDescription::new(9, "198.51.100.1");
        offer
            .new_media(MediaKind::Video, 5002, 1, RTP_AVP)
            .set_rtp_payload(100, "VP8/90000", None);
        let err = engine().create_answer(&offer.encode(), &local(), true).unwrap_err();
        assert!(matches!(err, CallError::NegotiationRejected { .. }));
    }

    #[test]
    fn test_late_offer_and_decode_failure() {
        let answer = engine().create_answer("", &local(), true).unwrap();
        assert_eq!(answer, engine().initial_offer(&local()));

        let err = engine().create_answer("v=0\r\nm=audio x RTP/AVP 0\r\n", &local(), false).unwrap_err();
        assert!(matches!(err, CallError::Decode(_)));
    }

    #[test]
    fn test_negotiate_media() {
        let mut peer = SessionDescription::new(9, "198.51.100.1");
        peer.set_direction(Direction::SendOnly);
        peer.new_media(MediaKind::Audio, 5000, 1, RTP_AVP)
            .set_address("198.51.100.9")
            .set_rtp_payload(8, "PCMA/8000", None)
            .set_rtp_payload(101, "telephone-event/8000", Some("0-15"));

        let negotiated = engine().negotiate_media(&peer.encode()).unwrap();
        assert_eq!(negotiated.address, "198.51.100.9");
        assert_eq!(negotiated.port, 5000);
        assert_eq!(negotiated.codec.payload_type, 8);
        assert_eq!(negotiated.dtmf_payload_type, Some(101));
        assert_eq!(negotiated.stream_mode(false), StreamMode::ReceiveOnly);
        assert_eq!(negotiated.stream_mode(true), StreamMode::Normal);
    }

    #[test]
    fn test_video_description() {
        let mut peer = SessionDescription::new(9, "198.51.100.1");
        peer.new_media(MediaKind::Video, 5002, 1, RTP_AVP)
            .set_address("198.51.100.3")
            .set_rtp_payload(97, "VP8/90000", None)
            .set_rtp_payload(96, "H264/90000", Some("profile-level-id=42e01f"))
            .set_attribute("framesize", "96 640-480");

        let engine = engine();
        assert_eq!(engine.video_address(&peer), "198.51.100.3");
        assert_eq!(engine.video_port(&peer), 5002);
        assert_eq!(engine.video_protocol(&peer).as_deref(), Some("RTP/AVP"));

        let description = engine.video_description(7, &peer);
        let body = description.strip_prefix("sdp://").unwrap();
        let parsed = SessionDescription::parse(body).unwrap();
        assert_eq!(parsed.address(), "198.51.100.3");
        let video = &parsed.media()[0];
        assert_eq!(video.port(), 65432);
        assert_eq!(video.rtp_payload_types(), vec![96]);
        assert_eq!(video.attribute("framesize"), Some("96 640-480"));

        let no_video = SessionDescription::new(9, "198.51.100.1");
        assert_eq!(engine.video_port(&no_video), 0xFFFF);
        assert_eq!(engine.video_address(&no_video), "198.51.100.1");
    }
}
