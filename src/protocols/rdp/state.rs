//! RDP per-connection scan state

use crate::protocols::gate::Resolution;

/// Counter value before the first message has been classified
pub const FIRST_MESSAGE: u32 = 1;

/// Scan state owned by exactly one connection
#[derive(Debug, Clone)]
pub struct ConnectionScanState {
    /// Classification attempts seen for the inbound direction, starts at 1
    pub messages_seen: u32,
    /// Token bytes accumulated so far, append-only
    pub session_id: Vec<u8>,
    /// Inbound bytes held until the type byte and token terminator arrive
    pub preread: Vec<u8>,
    /// Next preread index the token scan will look at
    pub scan_pos: usize,
    pub resolution: Resolution,
}

impl ConnectionScanState {
    pub fn new() -> Self {
        Self {
            messages_seen: FIRST_MESSAGE,
            session_id: Vec::new(),
            preread: Vec::new(),
            scan_pos: 0,
            resolution: Resolution::Pending,
        }
    }

    /// Classification is only attempted for the first inbound message
    pub fn is_first_message(&self) -> bool {
        self.messages_seen == FIRST_MESSAGE
    }
}

impl Default for ConnectionScanState {
    fn default() -> Self {
        Self::new()
    }
}
