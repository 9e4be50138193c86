//! Host probe: native ICMP echo with a `ping` command fallback.
//!
//! Native echo runs on a blocking socket inside spawn_blocking.

use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::process::Command;

use super::ProbeError;

const ICMPV4_ECHO_REQUEST: u8 = 8;
const ICMPV4_ECHO_REPLY: u8 = 0;
const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;

static NATIVE_ICMP: OnceLock<bool> = OnceLock::new();

static PING_SEQUENCE: AtomicU16 = AtomicU16::new(0);

/// Whether this process may open ICMP sockets (RAW when privileged, DGRAM otherwise).
fn detect_native_icmp() -> bool {
    match open_icmp_socket(Domain::IPV4, Protocol::ICMPV4) {
        Ok((_, mode)) => {
            tracing::info!("Host probe: using native ICMP ({:?} socket)", mode);
            true
        }
        Err(e) => {
            tracing::info!("Host probe: native ICMP unavailable ({}), using ping command", e);
            false
        }
    }
}

/// Kind of ICMP socket the kernel granted us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IcmpMode {
    /// Privileged; IPv4 replies include the IP header.
    Raw,
    /// Unprivileged (`ping_group_range`); the kernel owns the echo identifier.
    Dgram,
}

fn open_icmp_socket(domain: Domain, protocol: Protocol) -> std::io::Result<(Socket, IcmpMode)> {
    Socket::new(domain, Type::RAW, Some(protocol))
        .map(|s| (s, IcmpMode::Raw))
        .or_else(|_| Socket::new(domain, Type::DGRAM, Some(protocol)).map(|s| (s, IcmpMode::Dgram)))
}

/// Ping a host once. Returns the round-trip time.
pub async fn run_ping_probe(host: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    if !*NATIVE_ICMP.get_or_init(detect_native_icmp) {
        return run_ping_command(host, timeout).await;
    }

    let ip = resolve_host(host).await?;
    let result = tokio::task::spawn_blocking(move || blocking_echo(ip, timeout))
        .await
        .map_err(|e| ProbeError::Network(format!("spawn_blocking failed: {}", e)))?;

    match result {
        Err(ProbeError::Network(msg)) if msg.contains("ermission") || msg.contains("not permitted") => {
            tracing::warn!("Native ping to {} denied, falling back to ping command: {}", host, msg);
            run_ping_command(host, timeout).await
        }
        other => other,
    }
}

async fn resolve_host(host: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| ProbeError::Network(format!("DNS resolution failed: {}", e)))?
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| ProbeError::Network(format!("No addresses found for {}", host)))
}

fn io_error(context: &str, e: std::io::Error) -> ProbeError {
    ProbeError::Network(format!("{}: {}", context, e))
}

/// Send one echo request and wait for the matching reply.
fn blocking_echo(ip: IpAddr, timeout: Duration) -> Result<Duration, ProbeError> {
    let (domain, protocol, request_type, reply_type) = match ip {
        IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4, ICMPV4_ECHO_REQUEST, ICMPV4_ECHO_REPLY),
        IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6, ICMPV6_ECHO_REQUEST, ICMPV6_ECHO_REPLY),
    };

    let (socket, mode) = open_icmp_socket(domain, protocol).map_err(|e| io_error("Failed to create ICMP socket", e))?;
    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| io_error("Failed to set timeout", e))?;
    socket
        .set_write_timeout(Some(timeout))
        .map_err(|e| io_error("Failed to set timeout", e))?;
    socket
        .connect(&SocketAddr::new(ip, 0).into())
        .map_err(|e| io_error("Failed to connect", e))?;

    let identifier: u16 = rand::random();
    let sequence = PING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let packet = build_echo_request(request_type, identifier, sequence);

    let start = Instant::now();
    socket.send(&packet).map_err(|e| io_error("Failed to send", e))?;

    let mut buf = [0u8; 1500];
    loop {
        let len = (&socket).read(&mut buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => ProbeError::Timeout(timeout),
            _ => io_error("Failed to receive", e),
        })?;
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(ProbeError::Timeout(timeout));
        }

        if is_matching_reply(&buf[..len], mode, reply_type, identifier, sequence) {
            return Ok(elapsed);
        }
        // Someone else's packet; keep waiting
    }
}

/// Build an echo request: 8 byte header and 56 bytes of payload.
///
/// ICMPv6 checksums are filled in by the kernel.
fn build_echo_request(icmp_type: u8, identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = vec![0u8; 64];
    packet[0] = icmp_type;
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());
    packet[8..16].copy_from_slice(&rand::random::<u64>().to_be_bytes());

    if icmp_type == ICMPV4_ECHO_REQUEST {
        let checksum = icmp_checksum(&packet);
        packet[2..4].copy_from_slice(&checksum.to_be_bytes());
    }
    packet
}

/// Match a received datagram against our request.
///
/// RAW IPv4 sockets deliver the IP header too. DGRAM sockets rewrite the
/// identifier to the socket's own id and only deliver replies addressed to
/// it, so there the identifier is not compared.
fn is_matching_reply(buf: &[u8], mode: IcmpMode, reply_type: u8, identifier: u16, sequence: u16) -> bool {
    let offset = match mode {
        IcmpMode::Raw if reply_type == ICMPV4_ECHO_REPLY && buf.first().is_some_and(|b| b >> 4 == 4) => {
            usize::from(buf[0] & 0x0f) * 4
        }
        _ => 0,
    };

    let Some(icmp) = buf.get(offset..offset + 8) else {
        return false;
    };
    let identifier_ok = match mode {
        IcmpMode::Raw => u16::from_be_bytes([icmp[4], icmp[5]]) == identifier,
        IcmpMode::Dgram => true,
    };
    icmp[0] == reply_type && identifier_ok && u16::from_be_bytes([icmp[6], icmp[7]]) == sequence
}

/// Internet checksum (RFC 1071).
fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            [hi] => u32::from(*hi) << 8,
            _ => 0,
        })
        .sum();

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Ping via the system command.
async fn run_ping_command(host: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    let timeout_secs = timeout.as_secs().max(1);

    let output = Command::new("ping")
        .args(["-c", "1", "-W", &timeout_secs.to_string(), host])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ProbeError::Command(format!("failed to execute ping: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("timeout") || stdout.contains("100% packet loss") || stdout.contains("100.0% packet loss") {
            return Err(ProbeError::Timeout(timeout));
        }
        return Err(ProbeError::Command(format!("ping failed: {}", stdout.trim())));
    }

    parse_ping_output(&stdout)
}

/// Extract the round-trip time from `ping` output (Linux and macOS formats).
fn parse_ping_output(output: &str) -> Result<Duration, ProbeError> {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            // Per-packet "time=12.3 ms"
            Regex::new(r"time[=<](?P<ms>[0-9.]+)\s*ms").unwrap(),
            // Summary "rtt min/avg/max/mdev = a/b/c/d" or "round-trip min/avg/max/stddev = ..."
            Regex::new(r"(?:rtt|round-trip)\s+min/avg/max/(?:mdev|stddev)\s*=\s*[0-9.]+/(?P<ms>[0-9.]+)/").unwrap(),
        ]
    });

    patterns
        .iter()
        .filter_map(|re| re.captures(output))
        .filter_map(|caps| caps.name("ms")?.as_str().parse::<f64>().ok())
        .map(|ms| Duration::from_secs_f64(ms / 1000.0))
        .next()
        .ok_or_else(|| ProbeError::Command(format!("failed to parse ping output: {}", output)))
}
