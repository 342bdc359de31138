//! Routing token interpretation

use std::fmt;

use serde::Serialize;

use super::types::{COOKIE_MSTSHASH_PREFIX, COOKIE_MSTS_PREFIX};

/// What the client put in front of its Connection Request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RoutingToken {
    /// `Cookie: mstshash=<user>`
    Cookie(String),
    /// `Cookie: msts=<load balance info>`
    LoadBalanceInfo(String),
    /// Anything else, kept as text
    Raw(String),
}

impl RoutingToken {
    /// Interpret scanned token bytes; never fails
    pub fn parse(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        if let Some(user) = text.strip_prefix(COOKIE_MSTSHASH_PREFIX) {
            RoutingToken::Cookie(user.to_string())
        } else if let Some(info) = text.strip_prefix(COOKIE_MSTS_PREFIX) {
            RoutingToken::LoadBalanceInfo(info.to_string())
        } else {
            RoutingToken::Raw(text.into_owned())
        }
    }

    /// Key used for route lookups
    pub fn key(&self) -> &str {
        match self {
            RoutingToken::Cookie(v) | RoutingToken::LoadBalanceInfo(v) | RoutingToken::Raw(v) => v,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RoutingToken::Cookie(_) => "cookie",
            RoutingToken::LoadBalanceInfo(_) => "load_balance_info",
            RoutingToken::Raw(_) => "raw",
        }
    }
}

impl fmt::Display for RoutingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind(), self.key())
    }
}
