//! Call configuration
//!
//! [`CallConfig`] holds the per-session knobs of the negotiation engine and
//! the state machine: signaling timeouts, the advertised video resolution,
//! bandwidth hints, the DTMF payload type and the log output settings read
//! by [`logging::init_logging`](crate::logging::init_logging). It can be
//! built in code with the `with_*` methods or loaded from TOML.
//!
//! # Examples
//!
//! ```rust
//! use confcall_call_core::config::{CallConfig, VideoResolution};
//!
//! let config = CallConfig::default()
//!     .with_video_resolution(VideoResolution::Hd720)
//!     .with_session_timeout_secs(10);
//!
//! assert_eq!(config.video_resolution.as_str(), "1280-720");
//! assert!(config.validate().is_ok());
//!
//! let config = CallConfig::from_toml_str(r#"
//!     video_resolution = "vga480"
//!     local_video_port = 50000
//! "#).unwrap();
//! assert_eq!(config.local_video_port, 50000);
//! assert_eq!(config.audio_bandwidth_kbps, 64);
//! ```

use confcall_sdp_core::{DTMF_PAYLOAD_TYPE, RTP_AVP};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{CallError, CallResult};
use crate::logging::parse_log_level;

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Resolution advertised in the `framesize` attribute of video offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoResolution {
    /// 640x480
    #[default]
    Vga480,
    /// 1280x720
    Hd720,
}

impl VideoResolution {
    /// Value written after the payload type in `a=framesize`
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoResolution::Vga480 => "640-480",
            VideoResolution::Hd720 => "1280-720",
        }
    }
}

/// Configuration for a single call session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Timeout for answers to re-invites and transfer offers (seconds)
    pub session_timeout_secs: u64,
    /// Timeout for the outbound call placed on a transferring transport (seconds)
    pub transfer_timeout_secs: u64,
    /// Resolution advertised for every offered video codec
    pub video_resolution: VideoResolution,
    /// `AS` bandwidth hint on conference audio blocks
    pub audio_bandwidth_kbps: u32,
    /// `AS` bandwidth hint on video blocks
    pub video_bandwidth_kbps: u32,
    /// Local port advertised for video
    pub local_video_port: u16,
    /// Payload type used for outbound DTMF events
    pub dtmf_payload_type: u8,
    /// Protocol token expected on negotiable media blocks
    pub rtp_protocol: String,
    /// Level for the call and SDP crates (`trace` to `error`)
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: 5,
            transfer_timeout_secs: 15,
            video_resolution: VideoResolution::default(),
            audio_bandwidth_kbps: 64,
            video_bandwidth_kbps: 5000,
            local_video_port: 65432,
            dtmf_payload_type: DTMF_PAYLOAD_TYPE,
            rtp_protocol: RTP_AVP.to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
        }
    }
}

impl CallConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> CallResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| CallError::config(format!("Invalid call config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_session_timeout_secs(mut self, secs: u64) -> Self {
        self.session_timeout_secs = secs;
        self
    }

    pub fn with_transfer_timeout_secs(mut self, secs: u64) -> Self {
        self.transfer_timeout_secs = secs;
        self
    }

    pub fn with_video_resolution(mut self, resolution: VideoResolution) -> Self {
        self.video_resolution = resolution;
        self
    }

    pub fn with_audio_bandwidth_kbps(mut self, kbps: u32) -> Self {
        self.audio_bandwidth_kbps = kbps;
        self
    }

    pub fn with_video_bandwidth_kbps(mut self, kbps: u32) -> Self {
        self.video_bandwidth_kbps = kbps;
        self
    }

    pub fn with_local_video_port(mut self, port: u16) -> Self {
        self.local_video_port = port;
        self
    }

    pub fn with_dtmf_payload_type(mut self, payload_type: u8) -> Self {
        self.dtmf_payload_type = payload_type;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    /// Check value ranges
    pub fn validate(&self) -> CallResult<()> {
        if self.session_timeout_secs == 0 || self.transfer_timeout_secs == 0 {
            return Err(CallError::config("timeouts must be greater than zero"));
        }
        if self.local_video_port == 0 {
            return Err(CallError::config("local_video_port must be non-zero"));
        }
        if !(96..=127).contains(&self.dtmf_payload_type) {
            return Err(CallError::config(format!(
                "dtmf_payload_type {} is outside the dynamic range 96-127",
                self.dtmf_payload_type
            )));
        }
        if self.rtp_protocol.trim().is_empty() {
            return Err(CallError::config("rtp_protocol must not be empty"));
        }
        parse_log_level(&self.log_level)?;
        Ok(())
    }
}
