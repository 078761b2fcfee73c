//! Inbound signaling events
//!
//! Everything the signaling layer reports about a call arrives as one
//! [`SignalingEvent`] and is consumed by
//! [`CallSession::handle_event`](crate::session::CallSession::handle_event).
//! Events the call state machine has no use for (registration progress)
//! still have a variant so the signaling layer can forward blindly.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::errors::SignalingErrorCode;
use crate::transport::{PeerProfile, SignalingSession, TransportId};

/// Event reported by the signaling layer
#[derive(Debug, Clone)]
pub enum SignalingEvent {
    /// An outbound INVITE is on its way
    Calling { transport: TransportId },

    /// The peer is alerting
    RingingBack { transport: TransportId },

    /// Mid-call offer (re-INVITE) received on `session`
    Ringing {
        session: Arc<dyn SignalingSession>,
        peer: PeerProfile,
        sdp: String,
    },

    /// Offer/answer completed; `sdp` is the peer's description
    Established { transport: TransportId, sdp: String },

    Ended { transport: TransportId },

    Busy { transport: TransportId },

    /// A re-INVITE we sent was refused
    CallChangeFailed {
        transport: TransportId,
        code: SignalingErrorCode,
        message: String,
    },

    Error {
        transport: TransportId,
        code: SignalingErrorCode,
        message: String,
    },

    /// The peer asked to move the call onto `new_session`. Without `sdp`
    /// the local side must send the offer.
    Transferring {
        new_session: Arc<dyn SignalingSession>,
        sdp: Option<String>,
    },

    /// Registration progress; irrelevant to calls
    Registration { transport: TransportId },
}

impl SignalingEvent {
    /// Transport the event refers to
    pub fn transport(&self) -> TransportId {
        match self {
            SignalingEvent::Calling { transport }
            | SignalingEvent::RingingBack { transport }
            | SignalingEvent::Established { transport, .. }
            | SignalingEvent::Ended { transport }
            | SignalingEvent::Busy { transport }
            | SignalingEvent::CallChangeFailed { transport, .. }
            | SignalingEvent::Error { transport, .. }
            | SignalingEvent::Registration { transport } => *transport,
            SignalingEvent::Ringing { session, .. } => session.id(),
            SignalingEvent::Transferring { new_session, .. } => new_session.id(),
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            SignalingEvent::Calling { .. } => "calling",
            SignalingEvent::RingingBack { .. } => "ringing-back",
            SignalingEvent::Ringing { .. } => "ringing",
            SignalingEvent::Established { .. } => "established",
            SignalingEvent::Ended { .. } => "ended",
            SignalingEvent::Busy { .. } => "busy",
            SignalingEvent::CallChangeFailed { .. } => "call-change-failed",
            SignalingEvent::Error { .. } => "error",
            SignalingEvent::Transferring { .. } => "transferring",
            SignalingEvent::Registration { .. } => "registration",
        }
    }
}

/// Sending half handed to the signaling layer
pub type SignalingEventSender = mpsc::UnboundedSender<SignalingEvent>;
/// Receiving half consumed by [`CallSession::spawn_event_pump`](crate::session::CallSession::spawn_event_pump)
pub type SignalingEventReceiver = mpsc::UnboundedReceiver<SignalingEvent>;

/// Create the channel the signaling layer posts events into
pub fn signaling_channel() -> (SignalingEventSender, SignalingEventReceiver) {
    mpsc::unbounded_channel()
}
