//! Media transport collaborator
//!
//! The call core never moves RTP packets itself. Once negotiation settles it
//! configures a [`MediaTransport`] (one audio stream plus its membership in
//! the local audio group) through this interface.

use confcall_sdp_core::Codec;
use serde::{Deserialize, Serialize};

use crate::errors::CallResult;

/// Direction the local audio stream runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamMode {
    Normal,
    SendOnly,
    ReceiveOnly,
}

/// Mode of the audio group the stream is joined to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupMode {
    Normal,
    Muted,
    OnHold,
}

impl GroupMode {
    pub fn from_flags(on_hold: bool, muted: bool) -> Self {
        if on_hold {
            GroupMode::OnHold
        } else if muted {
            GroupMode::Muted
        } else {
            GroupMode::Normal
        }
    }
}

/// One RTP audio stream and its audio group membership
pub trait MediaTransport: Send + Sync {
    /// Local RTP port advertised in descriptions
    fn local_port(&self) -> u16;

    /// Point the stream at the remote endpoint
    fn associate(&mut self, address: &str, port: u16) -> CallResult<()>;

    fn set_codec(&mut self, codec: &Codec);

    /// Codec currently configured, if any
    fn codec(&self) -> Option<Codec>;

    /// Payload type for outbound DTMF events; `None` disables them
    fn set_dtmf_type(&mut self, payload_type: Option<u8>);

    fn dtmf_type(&self) -> Option<u8>;

    fn set_mode(&mut self, mode: StreamMode);

    /// Join the local audio group
    fn join_group(&mut self);

    fn leave_group(&mut self);

    fn is_joined(&self) -> bool;

    /// Apply a mode to the joined group; ignored when not joined
    fn set_group_mode(&mut self, mode: GroupMode);

    /// Send one DTMF event (0-15) through the group
    fn send_dtmf(&mut self, code: u8);

    /// Give back the local socket
    fn release(&mut self);
}

/// Creates audio streams bound to a local address
pub trait MediaTransportFactory: Send + Sync {
    fn create_audio_stream(&self, local_ip: &str) -> CallResult<Box<dyn MediaTransport>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_mode_priority() {
        assert_eq!(GroupMode::from_flags(true, true), GroupMode::OnHold);
        assert_eq!(GroupMode::from_flags(false, true), GroupMode::Muted);
        assert_eq!(GroupMode::from_flags(false, false), GroupMode::Normal);
    }
}
