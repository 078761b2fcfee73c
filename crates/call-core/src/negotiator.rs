//! Codec selection against a remote media block
//!
//! Selection is first-match in the remote payload order: the first remote
//! payload type the local capability provider accepts wins, regardless of
//! local preference. Telephone-event payloads are never selected as the
//! media codec; they are carried separately as DTMF passthrough.

use std::sync::Arc;

use confcall_sdp_core::{
    is_telephone_event, Codec, CodecCapabilityProvider, Direction, MediaBlock, SessionDescription,
};
use tracing::debug;

/// A telephone-event payload carried from an offer into its answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtmfPassthrough {
    pub payload_type: u8,
    pub rtpmap: String,
    pub fmtp: Option<String>,
}

/// Picks codecs for answers and media wiring
#[derive(Clone)]
pub struct CodecNegotiator {
    capabilities: Arc<dyn CodecCapabilityProvider>,
}

impl CodecNegotiator {
    pub fn new(capabilities: Arc<dyn CodecCapabilityProvider>) -> Self {
        Self { capabilities }
    }

    /// Local codec capabilities this negotiator matches against
    pub fn capabilities(&self) -> &Arc<dyn CodecCapabilityProvider> {
        &self.capabilities
    }

    /// First remote audio payload the local side supports
    pub fn select_audio_codec(&self, remote: &MediaBlock) -> Option<Codec> {
        self.select(remote, |pt, rtpmap, fmtp| {
            self.capabilities.match_audio(pt, rtpmap, fmtp)
        })
    }

    /// First remote video payload the local side supports
    pub fn select_video_codec(&self, remote: &MediaBlock) -> Option<Codec> {
        self.select(remote, |pt, rtpmap, fmtp| {
            self.capabilities.match_video(pt, rtpmap, fmtp)
        })
    }

    fn select<F>(&self, remote: &MediaBlock, matcher: F) -> Option<Codec>
    where
        F: Fn(u8, Option<&str>, Option<&str>) -> Option<Codec>,
    {
        for (payload_type, payload) in remote.payloads() {
            let rtpmap = payload.rtpmap.as_deref();
            if rtpmap.is_some_and(is_telephone_event) {
                continue;
            }
            if let Some(codec) = matcher(payload_type, rtpmap, payload.fmtp.as_deref()) {
                debug!("Selected {} codec {} from remote block", remote.kind(), codec);
                return Some(codec);
            }
        }
        None
    }

    /// Telephone-event payloads in `remote` other than the selected codec,
    /// in remote order and unmodified
    pub fn dtmf_passthrough(&self, remote: &MediaBlock, selected: &Codec) -> Vec<DtmfPassthrough> {
        remote
            .payloads()
            .filter(|(pt, _)| *pt != selected.payload_type)
            .filter_map(|(payload_type, payload)| {
                let rtpmap = payload.rtpmap.as_deref()?;
                is_telephone_event(rtpmap).then(|| DtmfPassthrough {
                    payload_type,
                    rtpmap: rtpmap.to_string(),
                    fmtp: payload.fmtp.clone(),
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for CodecNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecNegotiator")
            .field("audio_codecs", &self.capabilities.audio_codecs())
            .field("video_codecs", &self.capabilities.video_codecs())
            .finish()
    }
}

/// One-way direction declared for a remote media block, media level first
///
/// Only `sendonly` and `recvonly` count; any other direction attribute is
/// treated as bidirectional.
pub fn remote_direction(offer: &SessionDescription, media: &MediaBlock) -> Option<Direction> {
    let one_way = |d: Option<Direction>| d.filter(|d| matches!(d, Direction::SendOnly | Direction::RecvOnly));
    one_way(media.direction()).or_else(|| one_way(offer.direction()))
}

/// Direction an answer must declare for `media` of `offer`, if any
pub fn answer_direction(offer: &SessionDescription, media: &MediaBlock) -> Option<Direction> {
    remote_direction(offer, media).map(|d| d.inverse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use confcall_sdp_core::{MediaKind, StaticCodecProvider, RTP_AVP};

    fn negotiator(audio: Vec<Codec>) -> CodecNegotiator {
        CodecNegotiator::new(Arc::new(StaticCodecProvider::new(audio, Vec::new())))
    }

    #[test]
    fn test_remote_order_decides() {
        let negotiator = negotiator(vec![
            Codec::new(8, "PCMA/8000", None),
            Codec::new(0, "PCMU/8000", None),
        ]);
        let mut remote = MediaBlock::new(MediaKind::Audio, 4000, 1, RTP_AVP);
        remote
            .set_rtp_payload(97, "OPUS/48000/2", None)
            .set_rtp_payload(0, "PCMU/8000", None)
            .set_rtp_payload(8, "PCMA/8000", None);

        let codec = negotiator.select_audio_codec(&remote).unwrap();
        assert_eq!(codec.payload_type, 0);
        assert_eq!(codec.rtpmap, "PCMU/8000");
    }

    #[test]
    fn test_no_match() {
        let negotiator = negotiator(vec![Codec::new(0, "PCMU/8000", None)]);
        let mut remote = MediaBlock::new(MediaKind::Audio, 4000, 1, RTP_AVP);
        remote
            .set_rtp_payload(18, "G729/8000", None)
            .set_rtp_payload(101, "telephone-event/8000", Some("0-15"));
        assert!(negotiator.select_audio_codec(&remote).is_none());
    }

    #[test]
    fn test_dtmf_passthrough() {
        let negotiator = negotiator(vec![Codec::new(0, "PCMU/8000", None)]);
        let mut remote = MediaBlock::new(MediaKind::Audio, 4000, 1, RTP_AVP);
        remote
            .set_rtp_payload(0, "PCMU/8000", None)
            .set_rtp_payload(101, "telephone-event/8000", Some("0-16"));

        let codec = negotiator.select_audio_codec(&remote).unwrap();
        let dtmf = negotiator.dtmf_passthrough(&remote, &codec);
        assert_eq!(
            dtmf,
            vec![DtmfPassthrough {
                payload_type: 101,
                rtpmap: "telephone-event/8000".to_string(),
                fmtp: Some("0-16".to_string()),
            }]
        );
    }

    #[test]
    fn test_direction_inversion() {
        let mut offer = SessionDescription::new(1, "10.0.0.1");
        offer.new_media(MediaKind::Audio, 4000, 1, RTP_AVP).set_direction(Direction::RecvOnly);
        let media = offer.media()[0].clone();
        assert_eq!(answer_direction(&offer, &media), Some(Direction::SendOnly));

        let mut offer = SessionDescription::new(1, "10.0.0.1");
        offer.set_direction(Direction::SendOnly);
        offer.new_media(MediaKind::Audio, 4000, 1, RTP_AVP);
        let media = offer.media()[0].clone();
        assert_eq!(answer_direction(&offer, &media), Some(Direction::RecvOnly));

        let mut offer = SessionDescription::new(1, "10.0.0.1");
        offer.new_media(MediaKind::Audio, 4000, 1, RTP_AVP).set_direction(Direction::SendRecv);
        let media = offer.media()[0].clone();
        assert_eq!(answer_direction(&offer, &media), None);
    }
}
