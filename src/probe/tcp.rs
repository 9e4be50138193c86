//! TCP connect and SSH banner probes.

use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use super::ProbeError;

async fn connect(host: &str, port: u16) -> Result<TcpStream, ProbeError> {
    TcpStream::connect((host, port))
        .await
        .map_err(|e| ProbeError::Network(format!("connect to {}:{} failed: {}", host, port, e)))
}

/// Run a TCP connect probe. Returns the connect latency.
pub async fn run_tcp_probe(host: &str, port: u16) -> Result<Duration, ProbeError> {
    let start = Instant::now();
    let _stream = connect(host, port).await?;
    Ok(start.elapsed())
}

/// Connect and read the server's identification banner. No authentication
/// is attempted.
pub async fn run_ssh_probe(host: &str, port: u16) -> Result<Duration, ProbeError> {
    let start = Instant::now();
    let mut stream = connect(host, port).await?;

    let mut buf = [0u8; 256];
    let n = stream
        .read(&mut buf)
        .await
        .map_err(|e| ProbeError::Network(format!("failed to read banner: {}", e)))?;
    let elapsed = start.elapsed();

    if n == 0 {
        return Err(ProbeError::Protocol("connection closed before SSH banner".to_string()));
    }

    let banner = &buf[..n];
    if !banner.windows(3).any(|w| w == b"SSH") {
        return Err(ProbeError::Protocol(format!(
            "unexpected banner: {}",
            String::from_utf8_lossy(banner).trim()
        )));
    }

    Ok(elapsed)
}
