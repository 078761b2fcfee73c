//! Signaling collaborator
//!
//! A [`SignalingSession`] is one SIP dialog owned by the external signaling
//! layer. Every request made through it is fire-and-forget: the outcome
//! arrives later as a [`SignalingEvent`](crate::events::SignalingEvent).
//!
//! Implementations must not deliver events synchronously from inside these
//! calls; the call session invokes them while holding its state lock.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::CallResult;

/// Identity of a signaling session, used to match events to transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransportId(pub Uuid);

impl TransportId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport-{}", self.0)
    }
}

/// A SIP party
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerProfile {
    pub uri: String,
    pub display_name: Option<String>,
}

impl PeerProfile {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

impl fmt::Display for PeerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "\"{}\" <{}>", name, self.uri),
            None => write!(f, "<{}>", self.uri),
        }
    }
}

/// One signaling dialog carrying a call
pub trait SignalingSession: Send + Sync + fmt::Debug {
    fn id(&self) -> TransportId;

    /// SIP Call-ID of the dialog
    fn call_id(&self) -> String;

    /// Local address media should bind to
    fn local_ip(&self) -> String;

    fn peer_profile(&self) -> Option<PeerProfile>;

    /// Send an INVITE carrying `sdp`
    fn make_call(&self, peer: &PeerProfile, sdp: &str, timeout: Duration) -> CallResult<()>;

    /// Answer an INVITE or re-INVITE with `sdp`
    fn answer_call(&self, sdp: &str, timeout: Duration) -> CallResult<()>;

    /// Send a re-INVITE carrying `sdp`
    fn change_call(&self, sdp: &str, timeout: Duration) -> CallResult<()>;

    /// Refuse a pending re-INVITE, leaving the dialog up
    fn reject_change(&self, reason: &str);

    /// Send BYE/CANCEL as appropriate
    fn end_call(&self);
}
