//! Error types for call control

use confcall_sdp_core::SdpError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for call operations
pub type CallResult<T> = Result<T, CallError>;

/// Errors raised by the call state machine and the negotiation engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// No mutually supported codec
    #[error("Negotiation rejected: {reason}")]
    NegotiationRejected { reason: String },

    /// Operation not allowed in the current call state
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Malformed session description
    #[error("Failed to decode session description: {0}")]
    Decode(#[from] SdpError),

    /// Error reported by the signaling layer
    #[error("Transport error ({code}): {message}")]
    Transport {
        code: SignalingErrorCode,
        message: String,
    },

    #[error("Peer unreachable: {message}")]
    PeerUnreachable { message: String },

    /// Media transport failure
    #[error("Media error: {message}")]
    Media { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl CallError {
    /// Create a negotiation rejection
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::NegotiationRejected {
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(code: SignalingErrorCode, message: impl Into<String>) -> Self {
        Self::Transport {
            code,
            message: message.into(),
        }
    }

    /// Map a code reported by the signaling layer onto the matching variant
    pub fn from_signaling(code: SignalingErrorCode, message: impl Into<String>) -> Self {
        match code {
            SignalingErrorCode::PeerNotReachable => Self::peer_unreachable(message),
            code => Self::transport(code, message),
        }
    }

    pub fn peer_unreachable(message: impl Into<String>) -> Self {
        Self::PeerUnreachable {
            message: message.into(),
        }
    }

    /// Create a media error
    pub fn media(message: impl Into<String>) -> Self {
        Self::Media {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Signaling code to report to listeners for this error
    pub fn signaling_code(&self) -> SignalingErrorCode {
        match self {
            CallError::Transport { code, .. } => *code,
            CallError::PeerUnreachable { .. } => SignalingErrorCode::PeerNotReachable,
            CallError::Decode(_) | CallError::NegotiationRejected { .. } => SignalingErrorCode::ClientError,
            CallError::InvalidState { .. }
            | CallError::Media { .. }
            | CallError::Configuration { .. } => SignalingErrorCode::SocketError,
        }
    }
}

/// Error codes surfaced by the signaling layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalingErrorCode {
    NoError,
    SocketError,
    ServerError,
    TransactionTerminated,
    ClientError,
    TimeOut,
    InvalidRemoteUri,
    PeerNotReachable,
    InvalidCredentials,
    InProgress,
    /// The underlying data connection went away; the call cannot continue
    DataConnectionLost,
    CrossDomainAuthentication,
    ServerUnreachable,
}

impl SignalingErrorCode {
    /// Numeric value used by the SIP stack
    pub fn code(&self) -> i32 {
        match self {
            SignalingErrorCode::NoError => 0,
            SignalingErrorCode::SocketError => -1,
            SignalingErrorCode::ServerError => -2,
            SignalingErrorCode::TransactionTerminated => -3,
            SignalingErrorCode::ClientError => -4,
            SignalingErrorCode::TimeOut => -5,
            SignalingErrorCode::InvalidRemoteUri => -6,
            SignalingErrorCode::PeerNotReachable => -7,
            SignalingErrorCode::InvalidCredentials => -8,
            SignalingErrorCode::InProgress => -9,
            SignalingErrorCode::DataConnectionLost => -10,
            SignalingErrorCode::CrossDomainAuthentication => -11,
            SignalingErrorCode::ServerUnreachable => -12,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        let code = match code {
            0 => SignalingErrorCode::NoError,
            -1 => SignalingErrorCode::SocketError,
            -2 => SignalingErrorCode::ServerError,
            -3 => SignalingErrorCode::TransactionTerminated,
            -4 => SignalingErrorCode::ClientError,
            -5 => SignalingErrorCode::TimeOut,
            -6 => SignalingErrorCode::InvalidRemoteUri,
            -7 => SignalingErrorCode::PeerNotReachable,
            -8 => SignalingErrorCode::InvalidCredentials,
            -9 => SignalingErrorCode::InProgress,
            -10 => SignalingErrorCode::DataConnectionLost,
            -11 => SignalingErrorCode::CrossDomainAuthentication,
            -12 => SignalingErrorCode::ServerUnreachable,
            _ => return None,
        };
        Some(code)
    }

    /// Only a lost data connection forces teardown of an established call
    pub fn is_fatal(&self) -> bool {
        matches!(self, SignalingErrorCode::DataConnectionLost)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalingErrorCode::NoError => "NO_ERROR",
            SignalingErrorCode::SocketError => "SOCKET_ERROR",
            SignalingErrorCode::ServerError => "SERVER_ERROR",
            SignalingErrorCode::TransactionTerminated => "TRANSACTION_TERMINATED",
            SignalingErrorCode::ClientError => "CLIENT_ERROR",
            SignalingErrorCode::TimeOut => "TIME_OUT",
            SignalingErrorCode::InvalidRemoteUri => "INVALID_REMOTE_URI",
            SignalingErrorCode::PeerNotReachable => "PEER_NOT_REACHABLE",
            SignalingErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
            SignalingErrorCode::InProgress => "IN_PROGRESS",
            SignalingErrorCode::DataConnectionLost => "DATA_CONNECTION_LOST",
            SignalingErrorCode::CrossDomainAuthentication => "CROSS_DOMAIN_AUTHENTICATION",
            SignalingErrorCode::ServerUnreachable => "SERVER_UNREACHABLE",
        }
    }
}

impl fmt::Display for SignalingErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_signaling_maps_unreachable_peer() {
        let err = CallError::from_signaling(SignalingErrorCode::PeerNotReachable, "no route");
        assert_eq!(err, CallError::peer_unreachable("no route"));
        assert_eq!(err.signaling_code(), SignalingErrorCode::PeerNotReachable);

        let err = CallError::from_signaling(SignalingErrorCode::TimeOut, "408");
        assert!(matches!(err, CallError::Transport { code: SignalingErrorCode::TimeOut, .. }));
    }

    #[test]
    fn test_only_connection_loss_is_fatal() {
        assert!(SignalingErrorCode::DataConnectionLost.is_fatal());
        assert!(!SignalingErrorCode::TimeOut.is_fatal());
        assert!(!SignalingErrorCode::ServerError.is_fatal());
    }

    #[test]
    fn test_code_mapping() {
        for code in 0..=12 {
            let parsed = SignalingErrorCode::from_code(-code).unwrap();
            assert_eq!(parsed.code(), -code);
        }
        assert_eq!(SignalingErrorCode::from_code(-13), None);
    }

    #[test]
    fn test_decode_error_conversion() {
        let err: CallError = SdpError::missing("o=").into();
        assert!(matches!(err, CallError::Decode(_)));
        assert_eq!(err.signaling_code(), SignalingErrorCode::ClientError);
        assert_eq!(
            CallError::transport(SignalingErrorCode::TimeOut, "no answer").to_string(),
            "Transport error (TIME_OUT): no answer"
        );
    }
}
