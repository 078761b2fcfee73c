//! H.264 `profile-level-id` interpretation
//!
//! The parameter is six hex digits: `profile_idc`, `profile-iop` and
//! `level_idc`. Only the first and last byte are interpreted here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::fmtp_params;
use crate::description::SessionDescription;
use crate::media::RTP_AVP;

/// fmtp key carrying the H.264 profile and level
pub const PROFILE_LEVEL_ID: &str = "profile-level-id";
/// rtpmap of H.264 over RTP
pub const H264_RTPMAP: &str = "H264/90000";

/// H.264 profile (`profile_idc`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum H264Profile {
    Baseline,
    Main,
    Extended,
    High,
    High10,
    High422,
    High444,
    Unknown(u8),
}

impl From<u8> for H264Profile {
    fn from(idc: u8) -> Self {
        match idc {
            66 => H264Profile::Baseline,
            77 => H264Profile::Main,
            88 => H264Profile::Extended,
            100 => H264Profile::High,
            110 => H264Profile::High10,
            122 => H264Profile::High422,
            244 => H264Profile::High444,
            other => H264Profile::Unknown(other),
        }
    }
}

/// H.264 level (`level_idc`)
///
/// `level_idc` 9 is read as level 1 and 10 as level 1b.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum H264Level {
    Level1,
    Level1b,
    Level11,
    Level12,
    Level13,
    Level2,
    Level21,
    Level22,
    Level3,
    Level31,
    Level32,
    Level4,
    Level41,
    Level42,
    Level5,
    Level51,
    Unknown(u8),
}

impl From<u8> for H264Level {
    fn from(idc: u8) -> Self {
        match idc {
            9 => H264Level::Level1,
            10 => H264Level::Level1b,
            11 => H264Level::Level11,
            12 => H264Level::Level12,
            13 => H264Level::Level13,
            20 => H264Level::Level2,
            21 => H264Level::Level21,
            22 => H264Level::Level22,
            30 => H264Level::Level3,
            31 => H264Level::Level31,
            32 => H264Level::Level32,
            40 => H264Level::Level4,
            41 => H264Level::Level41,
            42 => H264Level::Level42,
            50 => H264Level::Level5,
            51 => H264Level::Level51,
            other => H264Level::Unknown(other),
        }
    }
}

/// Errors from reading a `profile-level-id` value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum H264ParseError {
    #[error("profile-level-id must be 6 hex digits, got '{0}'")]
    InvalidLength(String),

    #[error("profile-level-id contains non-hex digits: '{0}'")]
    InvalidHex(String),

    #[error("no profile-level-id parameter present")]
    Missing,
}

/// Decoded profile and level pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileLevelId {
    pub profile: H264Profile,
    pub level: H264Level,
}

/// Parse a bare `profile-level-id` value such as `42e01f`
pub fn parse_profile_level_id(value: &str) -> Result<ProfileLevelId, H264ParseError> {
    let value = value.trim();
    if value.len() != 6 {
        return Err(H264ParseError::InvalidLength(value.to_string()));
    }
    if !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(H264ParseError::InvalidHex(value.to_string()));
    }
    let byte = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&value[range], 16).map_err(|_| H264ParseError::InvalidHex(value.to_string()))
    };
    Ok(ProfileLevelId {
        profile: H264Profile::from(byte(0..2)?),
        level: H264Level::from(byte(4..6)?),
    })
}

/// Find and parse the `profile-level-id` parameter of an fmtp string
pub fn fmtp_profile_level_id(fmtp: &str) -> Result<ProfileLevelId, H264ParseError> {
    let (_, value) = fmtp_params(fmtp)
        .into_iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(PROFILE_LEVEL_ID))
        .ok_or(H264ParseError::Missing)?;
    parse_profile_level_id(value)
}

/// Profile and level of the first H.264 payload in the first active RTP/AVP
/// video block that declares one
pub fn session_profile_level_id(sd: &SessionDescription) -> Result<ProfileLevelId, H264ParseError> {
    for media in sd.media() {
        if !media.is_video() || !media.is_active_rtp(RTP_AVP) {
            continue;
        }
        for (_, payload) in media.payloads() {
            let is_h264 = payload
                .rtpmap
                .as_deref()
                .is_some_and(|rtpmap| rtpmap.contains(H264_RTPMAP));
            match (is_h264, payload.fmtp.as_deref()) {
                (true, Some(fmtp)) => match fmtp_profile_level_id(fmtp) {
                    Err(H264ParseError::Missing) => continue,
                    result => return result,
                },
                _ => continue,
            }
        }
    }
    Err(H264ParseError::Missing)
}
