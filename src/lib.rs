pub mod config;
pub mod error;
pub mod protocols;
pub mod proxy;
pub mod routes;

use serde::Serialize;

use protocols::{Direction, GateResult, SessionScanner};

pub use config::Config;
pub use error::{GateError, Result};
pub use protocols::{Resolution, RoutingToken};
pub use proxy::RdpGateProxy;
pub use routes::RouteTable;

/// Outcome of replaying a captured client preamble
#[derive(Debug, Clone)]
pub struct CaptureScan {
    pub scanner: SessionScanner,
    /// Gate result for each chunk, in order
    pub results: Vec<GateResult>,
}

impl CaptureScan {
    /// Serializable summary of the scan
    pub fn report(&self) -> CaptureReport {
        CaptureReport {
            signals: self.results.iter().map(|r| r.signal()).collect(),
            resolution: self.scanner.resolution().to_string(),
            session_id: self.scanner.session_id(),
            token: self.scanner.routing_token(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    pub signals: Vec<&'static str>,
    pub resolution: String,
    pub session_id: String,
    pub token: Option<RoutingToken>,
}

/// Feed a captured client -> server byte stream through a fresh scanner
///
/// `chunk_size` of 0 presents the whole capture as a single chunk.
pub fn scan_capture(data: &[u8], chunk_size: usize, max_token_len: usize) -> CaptureScan {
    let mut scanner = SessionScanner::new()
        .with_max_token_len(max_token_len)
        .with_label("capture");

    let results = if chunk_size == 0 || data.is_empty() {
        vec![scanner.observe(data, Direction::ToServer)]
    } else {
        data.chunks(chunk_size)
            .map(|chunk| scanner.observe(chunk, Direction::ToServer))
            .collect()
    };

    CaptureScan { scanner, results }
}

/// Parse a hex dump ("03 00 00 2c ..." or "0300002c...") into bytes
pub fn parse_hex(text: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':')
        .collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks(2)
        .map(|pair| {
            let s = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(s, 16).ok()
        })
        .collect()
}
