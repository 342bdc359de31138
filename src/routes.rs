//! Session -> upstream route table
//!
//! Keys are routing keys taken from the client's token. Sessions published
//! with [`RouteTable::add_mapping`] get one key per port, `<session>_<port>`,
//! each pointing at `<server>:<port>`.

use std::collections::BTreeMap;

use tracing::info;

use crate::error::{GateError, Result};
use crate::protocols::rdp::RoutingToken;

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    default_upstream: Option<String>,
    routes: BTreeMap<String, String>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upstream used when a token has no mapping (or there is no token)
    pub fn with_default(mut self, upstream: impl Into<String>) -> Result<Self> {
        let upstream = upstream.into();
        validate_upstream(&upstream)?;
        self.default_upstream = Some(upstream);
        Ok(self)
    }

    pub fn default_upstream(&self) -> Option<&str> {
        self.default_upstream.as_deref()
    }

    /// Map a single routing key to an upstream
    pub fn insert(&mut self, key: impl Into<String>, upstream: impl Into<String>) -> Result<()> {
        let upstream = upstream.into();
        validate_upstream(&upstream)?;
        self.routes.insert(key.into(), upstream);
        Ok(())
    }

    /// Publish a session on `server` for each of `ports`
    pub fn add_mapping(&mut self, session: &str, server: &str, ports: &[u16]) -> Result<()> {
        for port in ports {
            let key = format!("{}_{}", session, port);
            let upstream = format!("{}:{}", server, port);
            info!("New mapping: {} -> {}", key, upstream);
            self.insert(key, upstream)?;
        }
        Ok(())
    }

    /// Drop every key belonging to a session, returns how many were removed
    pub fn remove_session(&mut self, session: &str) -> usize {
        let prefix = format!("{}_", session);
        let before = self.routes.len();
        self.routes
            .retain(|key, _| key != session && !key.starts_with(&prefix));
        let removed = before - self.routes.len();
        info!("Removed {} mapping(s) for session: {}", removed, session);
        removed
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.routes.get(key).map(String::as_str)
    }

    /// Upstream for a token: exact key match, else the default upstream
    pub fn resolve(&self, token: Option<&RoutingToken>) -> Option<&str> {
        token
            .and_then(|t| self.get(t.key()))
            .or(self.default_upstream.as_deref())
    }

    /// Like [`resolve`](Self::resolve) but as an error when nothing matches
    pub fn require(&self, token: Option<&RoutingToken>) -> Result<&str> {
        self.resolve(token).ok_or_else(|| {
            GateError::NoRoute(token.map(|t| t.key().to_string()).unwrap_or_default())
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Entries sorted by key
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Accept `host:port` with a non-empty host and a numeric port
pub fn validate_upstream(upstream: &str) -> Result<()> {
    let (host, port) = upstream
        .rsplit_once(':')
        .ok_or_else(|| GateError::InvalidUpstream(upstream.to_string()))?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(GateError::InvalidUpstream(upstream.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_mapping_per_port() {
        let mut table = RouteTable::new();
        table.add_mapping("alice", "10.0.0.5", &[3389, 3390]).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("alice_3389"), Some("10.0.0.5:3389"));
        assert_eq!(table.get("alice_3390"), Some("10.0.0.5:3390"));
    }

    #[test]
    fn test_remove_session() {
        let mut table = RouteTable::new();
        table.add_mapping("alice", "10.0.0.5", &[3389, 3390]).unwrap();
        table.add_mapping("alicia", "10.0.0.6", &[3389]).unwrap();
        table.insert("alice", "10.0.0.7:3389").unwrap();

        assert_eq!(table.remove_session("alice"), 3);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("alicia_3389"), Some("10.0.0.6:3389"));
    }

    #[test]
    fn test_resolve_exact_then_default() {
        let mut table = RouteTable::new().with_default("10.0.0.1:3389").unwrap();
        table.insert("bob", "10.0.0.2:3389").unwrap();

        let bob = RoutingToken::parse(b"Cookie: mstshash=bob");
        let carol = RoutingToken::parse(b"Cookie: mstshash=carol");

        assert_eq!(table.resolve(Some(&bob)), Some("10.0.0.2:3389"));
        assert_eq!(table.resolve(Some(&carol)), Some("10.0.0.1:3389"));
        assert_eq!(table.resolve(None), Some("10.0.0.1:3389"));
    }

    #[test]
    fn test_require_without_default() {
        let table = RouteTable::new();
        let token = RoutingToken::parse(b"nobody");
        match table.require(Some(&token)) {
            Err(GateError::NoRoute(key)) => assert_eq!(key, "nobody"),
            other => panic!("Expected NoRoute, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_upstream_rejected() {
        let mut table = RouteTable::new();
        assert!(table.insert("a", "10.0.0.1").is_err());
        assert!(table.insert("a", ":3389").is_err());
        assert!(table.insert("a", "host:port").is_err());
        assert!(table.insert("a", "[::1]:3389").is_ok());
        assert!(!table.is_empty());
    }

    #[test]
    fn test_iter_sorted() {
        let mut table = RouteTable::new();
        table.insert("b", "h:2").unwrap();
        table.insert("a", "h:1").unwrap();
        let keys: Vec<_> = table.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
