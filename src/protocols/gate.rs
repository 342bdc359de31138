//! Gate results and stream direction
//!
//! Result types shared between the scanner and the component forwarding
//! the bytes.

use std::fmt;

/// Direction of a chunk relative to the connection initiator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// From client to server (initiator -> responder)
    ToServer,
    /// From server to client (upstream -> initiator)
    ToClient,
}

impl Direction {
    /// Build from the "bytes came from upstream" flag
    pub fn from_upstream(from_upstream: bool) -> Self {
        if from_upstream {
            Direction::ToClient
        } else {
            Direction::ToServer
        }
    }

    /// True for server -> client bytes
    pub fn is_from_upstream(self) -> bool {
        matches!(self, Direction::ToClient)
    }
}

/// Result of presenting a chunk to the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateResult {
    /// More inbound bytes are needed before a decision can be made
    NeedMoreData,

    /// The caller may go ahead with whatever it was gating
    Proceed,
}

impl GateResult {
    /// Check if the caller must wait for more data
    pub fn is_need_more_data(&self) -> bool {
        matches!(self, Self::NeedMoreData)
    }

    /// Check if the caller may proceed
    pub fn is_proceed(&self) -> bool {
        matches!(self, Self::Proceed)
    }

    /// Signal name used by stream-module style collaborators
    pub fn signal(&self) -> &'static str {
        match self {
            Self::NeedMoreData => "AGAIN",
            Self::Proceed => "OK",
        }
    }
}

impl fmt::Display for GateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.signal())
    }
}

/// Where the session identifier lookup currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Type byte not seen yet
    Pending,

    /// Connection Request seen, terminator not found yet
    Scanning,

    /// Token scanned up to its CR/LF terminator
    Token,

    /// Scan hit the length bound before the terminator
    Truncated,

    /// No token for this connection (other message type, or empty token)
    Absent,
}

impl Resolution {
    /// True once the scanner will no longer change the session identifier
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Token | Self::Truncated | Self::Absent)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Scanning => "scanning",
            Self::Token => "token",
            Self::Truncated => "truncated",
            Self::Absent => "absent",
        };
        f.write_str(s)
    }
}
