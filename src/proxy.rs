//! Routing proxy
//!
//! Accepts RDP clients, holds back their first bytes until the scanner has
//! found (or given up on) the routing token, picks an upstream from the route
//! table and then forwards bytes both ways untouched.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ScannerConfig};
use crate::protocols::gate::Direction;
use crate::protocols::rdp::SessionScanner;
use crate::routes::RouteTable;

const READ_BUF_SIZE: usize = 8192;

/// RDP routing proxy
pub struct RdpGateProxy {
    listen_addr: String,
    scanner: ScannerConfig,
    routes: Arc<RwLock<RouteTable>>,
}

impl RdpGateProxy {
    /// Create a new proxy from configuration
    pub fn new(config: &Config) -> Result<Self> {
        let routes = config.route_table()?;

        info!(
            "RDP gate initialized, {} route(s), default upstream: {}",
            routes.len(),
            routes.default_upstream().unwrap_or("none")
        );

        Ok(Self {
            listen_addr: config.listen_addr(),
            scanner: config.scanner.clone(),
            routes: Arc::new(RwLock::new(routes)),
        })
    }

    /// Shared route table, can be updated while the proxy runs
    pub fn routes(&self) -> Arc<RwLock<RouteTable>> {
        self.routes.clone()
    }

    /// Bind the configured address and run the proxy
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.listen_addr))?;

        info!("RDP gate listening on {}", self.listen_addr);

        self.serve(listener).await
    }

    /// Accept loop on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let scanner = self.scanner.clone();
                    let routes = self.routes.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer_addr, scanner, routes).await {
                            debug!("Connection error from {}: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single proxied connection
async fn handle_connection(
    mut client: TcpStream,
    peer_addr: SocketAddr,
    limits: ScannerConfig,
    routes: Arc<RwLock<RouteTable>>,
) -> crate::error::Result<()> {
    let mut scanner = SessionScanner::new()
        .with_max_token_len(limits.max_token_len)
        .with_label(peer_addr.to_string());

    let data = preread(&mut client, &mut scanner, &limits).await?;

    if data.is_empty() {
        return Ok(());
    }

    let token = scanner.routing_token();
    let upstream = {
        let routes = routes.read().await;
        match routes.require(token.as_ref()) {
            Ok(upstream) => upstream.to_string(),
            Err(e) => {
                warn!("Dropping {}: {}", peer_addr, e);
                return Err(e);
            }
        }
    };

    match &token {
        Some(t) => info!("Routing {} ({}) to {}", peer_addr, t, upstream),
        None => info!("Routing {} (no token) to {}", peer_addr, upstream),
    }

    let mut upstream_stream = TcpStream::connect(&upstream).await?;
    upstream_stream.write_all(&data).await?;

    let (to_server, to_client) =
        tokio::io::copy_bidirectional(&mut client, &mut upstream_stream).await?;

    debug!(
        "Connection {} closed: {} bytes to server, {} bytes to client",
        peer_addr,
        data.len() as u64 + to_server,
        to_client
    );

    Ok(())
}

/// Read client bytes through the gate until it lets us proceed
///
/// Stops early on EOF, once `max_preread_bytes` have been held back, or when
/// `preread_timeout_secs` runs out. Returns every byte read, to be replayed
/// to the upstream.
pub async fn preread<R>(
    reader: &mut R,
    scanner: &mut SessionScanner,
    limits: &ScannerConfig,
) -> crate::error::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut data = Vec::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let deadline = Instant::now() + Duration::from_secs(limits.preread_timeout_secs);

    loop {
        let n = match tokio::time::timeout_at(deadline, reader.read(&mut buf)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "Client {} sent no complete connection request within {}s, routing as {}",
                    scanner.label().unwrap_or("-"),
                    limits.preread_timeout_secs,
                    scanner.resolution()
                );
                break;
            }
        };
        if n == 0 {
            break;
        }

        data.extend_from_slice(&buf[..n]);

        if scanner.observe(&buf[..n], Direction::ToServer).is_proceed() {
            break;
        }

        if data.len() >= limits.max_preread_bytes {
            warn!(
                "Client {} sent {} bytes without a complete connection request, routing as {}",
                scanner.label().unwrap_or("-"),
                data.len(),
                scanner.resolution()
            );
            break;
        }
    }

    Ok(data)
}
