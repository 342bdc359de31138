//! Protocol analyzers for connection routing
//!
//! # Architecture
//!
//! A protocol module owns a per-connection scanner that is fed the
//! client -> server bytes through a gate:
//!
//! ```ignore
//! let mut scanner = SessionScanner::new();
//! match scanner.observe(chunk, Direction::ToServer) {
//!     GateResult::NeedMoreData => { /* keep reading */ }
//!     GateResult::Proceed => { /* route with scanner.routing_token() */ }
//! }
//! ```

pub mod gate;
pub mod rdp;

pub use gate::{Direction, GateResult, Resolution};
pub use rdp::{RoutingToken, SessionScanner};
