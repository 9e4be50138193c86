//! WireGuard reachability probe over UDP.
//!
//! WireGuard drops packets that are not a valid handshake, so nothing ever
//! comes back. A send that the local stack accepts is reported as reachable;
//! this cannot tell a live endpoint from one that silently discards traffic.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;

use super::ProbeError;

const PROBE_PAYLOAD: [u8; 64] = [0u8; 64];

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ProbeError> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ProbeError::Network(format!("DNS resolution failed: {}", e)))?
        .next()
        .ok_or_else(|| ProbeError::Network(format!("No addresses found for {}", host)))
}

/// Send a single datagram to the endpoint. Returns the send latency.
pub async fn run_wireguard_probe(host: &str, port: u16) -> Result<Duration, ProbeError> {
    let target = resolve(host, port).await?;
    let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };

    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|e| ProbeError::Network(format!("failed to bind socket: {}", e)))?;

    let start = Instant::now();
    socket
        .send_to(&PROBE_PAYLOAD, target)
        .await
        .map_err(|e| ProbeError::Network(format!("failed to send: {}", e)))?;

    Ok(start.elapsed())
}
