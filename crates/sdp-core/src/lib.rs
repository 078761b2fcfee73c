//! # Conference call SDP core
//!
//! Session description handling for the conference call stack:
//!
//! - [`SessionDescription`] / [`MediaBlock`]: an ordered, mutable model of
//!   an SDP document with a deterministic CRLF encoder
//! - [`parser`]: the nom-based decoder behind [`SessionDescription::parse`]
//! - [`Codec`] and [`CodecCapabilityProvider`]: codec descriptors and the
//!   seam for local codec capabilities
//! - [`h264`]: `profile-level-id` interpretation
//!
//! Call-level offer/answer logic lives in `confcall-call-core`.

pub mod codec;
pub mod description;
pub mod direction;
pub mod error;
pub mod h264;
pub mod media;
pub mod parser;

pub use codec::{
    default_audio_codecs, default_video_codecs, fmtp_params, is_telephone_event, Codec,
    CodecCapabilityProvider, StaticCodecProvider, DTMF_FMTP, DTMF_PAYLOAD_TYPE, DTMF_RTPMAP,
};
pub use description::SessionDescription;
pub use direction::Direction;
pub use error::{Result, SdpError};
pub use h264::{
    fmtp_profile_level_id, parse_profile_level_id, session_profile_level_id, H264Level,
    H264ParseError, H264Profile, ProfileLevelId, H264_RTPMAP,
};
pub use media::{MediaBlock, MediaKind, RtpPayload, RTP_AVP};
