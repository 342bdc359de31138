//! RDP routing-token scanner
//!
//! Watches the client -> server bytes of one connection, classifies the first
//! X.224 TPDU and, for a Connection Request, copies the routing token that
//! starts at [`TOKEN_OFFSET`] up to its CR/LF terminator.
//!
//! The scanner buffers inbound bytes itself until it can decide, so callers
//! may present either per-chunk or cumulative data in arrival order.
//! A token whose terminator arrives in a later chunk keeps being scanned on
//! the following calls.

pub mod state;
pub mod token;
pub mod types;

pub use state::ConnectionScanState;
pub use token::RoutingToken;
pub use types::*;

use tracing::{debug, info, warn};

use crate::protocols::gate::{Direction, GateResult, Resolution};

/// Buffer gate and token scanner for a single connection
///
/// One instance per connection; it performs no I/O and is driven entirely by
/// [`SessionScanner::observe`].
#[derive(Debug, Clone)]
pub struct SessionScanner {
    state: ConnectionScanState,
    max_token_len: usize,
    label: Option<String>,
}

impl SessionScanner {
    pub fn new() -> Self {
        Self {
            state: ConnectionScanState::new(),
            max_token_len: DEFAULT_MAX_TOKEN_LEN,
            label: None,
        }
    }

    /// Limit the number of token bytes scanned before giving up on the terminator
    pub fn with_max_token_len(mut self, max_token_len: usize) -> Self {
        self.max_token_len = max_token_len.max(1);
        self
    }

    /// Attach a connection label to every log event
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Present a chunk of the stream to the gate
    pub fn observe(&mut self, chunk: &[u8], direction: Direction) -> GateResult {
        if direction.is_from_upstream() {
            return GateResult::Proceed;
        }

        if chunk.is_empty() {
            debug!(conn = self.conn(), "No buffer yet");
            return GateResult::NeedMoreData;
        }

        if !self.state.is_first_message() {
            self.state.messages_seen = self.state.messages_seen.saturating_add(1);
            return GateResult::Proceed;
        }

        self.state.preread.extend_from_slice(chunk);

        match self.state.resolution {
            Resolution::Pending => {
                if self.state.preread.len() <= MESSAGE_TYPE_OFFSET {
                    debug!(
                        conn = self.conn(),
                        buffered = self.state.preread.len(),
                        "Waiting for RDP packet type byte"
                    );
                    return GateResult::NeedMoreData;
                }
                self.classify_and_scan();
            }
            Resolution::Scanning => self.scan_token(),
            // resolution always moves messages_seen past the first message
            Resolution::Token | Resolution::Truncated | Resolution::Absent => {}
        }

        if self.state.resolution == Resolution::Scanning {
            return GateResult::NeedMoreData;
        }

        self.state.messages_seen += 1;
        self.state.preread = Vec::new();
        self.state.scan_pos = 0;
        GateResult::Proceed
    }

    /// Same as [`observe`](Self::observe) with the stream-module style flag
    pub fn on_chunk(&mut self, chunk: &[u8], from_upstream: bool) -> GateResult {
        self.observe(chunk, Direction::from_upstream(from_upstream))
    }

    fn classify_and_scan(&mut self) {
        let packet_type = self.state.preread[MESSAGE_TYPE_OFFSET];
        info!(conn = self.conn(), "RDP packet type = {}", packet_type);

        if packet_type == X224_CONNECTION_REQUEST {
            self.state.resolution = Resolution::Scanning;
            self.state.scan_pos = TOKEN_OFFSET;
            self.scan_token();
        } else {
            warn!(
                conn = self.conn(),
                "Received unexpected RDP packet type: {}", packet_type
            );
            self.state.resolution = Resolution::Absent;
        }
    }

    fn scan_token(&mut self) {
        let ConnectionScanState {
            preread,
            session_id,
            scan_pos,
            resolution,
            ..
        } = &mut self.state;

        let mut i = *scan_pos;
        while i < preread.len() {
            if preread[i] == CR {
                match preread.get(i + 1) {
                    Some(&LF) => {
                        *resolution = if session_id.is_empty() {
                            Resolution::Absent
                        } else {
                            Resolution::Token
                        };
                        break;
                    }
                    // CR is the last byte seen so far, the LF may follow
                    None => break,
                    Some(_) => {}
                }
            }
            if session_id.len() >= self.max_token_len {
                *resolution = Resolution::Truncated;
                break;
            }
            session_id.push(preread[i]);
            i += 1;
        }
        *scan_pos = i;

        match self.state.resolution {
            Resolution::Token | Resolution::Absent => {
                info!(conn = self.conn(), "Session ID = \"{}\"", self.session_id());
            }
            Resolution::Truncated => {
                warn!(
                    conn = self.conn(),
                    max_token_len = self.max_token_len,
                    "No routing token terminator, keeping \"{}\"",
                    self.session_id()
                );
            }
            Resolution::Scanning | Resolution::Pending => {
                debug!(
                    conn = self.conn(),
                    scanned = self.state.session_id.len(),
                    "Routing token incomplete, waiting for more data"
                );
            }
        }
    }

    /// Session identifier scanned so far, empty if none
    pub fn session_id(&self) -> String {
        String::from_utf8_lossy(&self.state.session_id).into_owned()
    }

    /// Raw session identifier bytes in stream order
    pub fn session_id_bytes(&self) -> &[u8] {
        &self.state.session_id
    }

    pub fn resolution(&self) -> Resolution {
        self.state.resolution
    }

    pub fn messages_seen(&self) -> u32 {
        self.state.messages_seen
    }

    /// Interpreted routing token once the scan is over
    pub fn routing_token(&self) -> Option<RoutingToken> {
        match self.state.resolution {
            Resolution::Token | Resolution::Truncated => {
                Some(RoutingToken::parse(&self.state.session_id))
            }
            _ => None,
        }
    }

    /// Bytes currently held back for classification
    pub fn buffered(&self) -> usize {
        self.state.preread.len()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn conn(&self) -> &str {
        self.label.as_deref().unwrap_or("-")
    }
}

impl Default for SessionScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Quick check for a TPKT header at the start of a client preamble
pub fn is_tpkt(payload: &[u8]) -> bool {
    payload.len() >= 4 && payload[0] == TPKT_VERSION
}
