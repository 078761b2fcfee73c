//! Media direction attributes (`a=sendonly`, `a=recvonly`, ...)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute name for send-only media
pub const SENDONLY: &str = "sendonly";
/// Attribute name for receive-only media
pub const RECVONLY: &str = "recvonly";
/// Attribute name for bidirectional media
pub const SENDRECV: &str = "sendrecv";
/// Attribute name for inactive media
pub const INACTIVE: &str = "inactive";

/// Direction of a media stream as declared in a description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl Direction {
    /// Attribute name used on the wire
    pub fn attribute_name(&self) -> &'static str {
        match self {
            Direction::SendRecv => SENDRECV,
            Direction::SendOnly => SENDONLY,
            Direction::RecvOnly => RECVONLY,
            Direction::Inactive => INACTIVE,
        }
    }

    /// Look up a direction by attribute name
    pub fn from_attribute(name: &str) -> Option<Self> {
        match name {
            SENDRECV => Some(Direction::SendRecv),
            SENDONLY => Some(Direction::SendOnly),
            RECVONLY => Some(Direction::RecvOnly),
            INACTIVE => Some(Direction::Inactive),
            _ => None,
        }
    }

    /// The direction an answerer must declare in reply to this one
    pub fn inverse(&self) -> Self {
        match self {
            Direction::SendOnly => Direction::RecvOnly,
            Direction::RecvOnly => Direction::SendOnly,
            other => *other,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.attribute_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse() {
        assert_eq!(Direction::SendOnly.inverse(), Direction::RecvOnly);
        assert_eq!(Direction::RecvOnly.inverse(), Direction::SendOnly);
        assert_eq!(Direction::SendRecv.inverse(), Direction::SendRecv);
        assert_eq!(Direction::Inactive.inverse(), Direction::Inactive);
    }

    #[test]
    fn test_attribute_lookup() {
        assert_eq!(Direction::from_attribute("recvonly"), Some(Direction::RecvOnly));
        assert_eq!(Direction::from_attribute("framesize"), None);
        assert_eq!(Direction::SendOnly.to_string(), "sendonly");
    }
}
