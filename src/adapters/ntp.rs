//! SNTP Client Adapter
//!
//! Implements `TimeSource` with a single SNTPv4 client request (RFC 4330).
//! There is no clock filtering or discipline: one request, one reply.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::net::{lookup_host, UdpSocket};
use tracing::debug;

use crate::domain::ports::{NtpResponse, TimeSource};
use crate::error::{Error, Result};

/// Default NTP port.
pub const NTP_PORT: u16 = 123;

const PACKET_LEN: usize = 48;

/// Seconds between the NTP era (1900) and the Unix epoch.
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// LI = 0 (no warning), VN = 4, Mode = 3 (client).
const CLIENT_HEADER: u8 = 0x23;
const MODE_SERVER: u8 = 4;

/// SNTP client over UDP.
#[derive(Debug, Clone, Default)]
pub struct SntpClient;

impl SntpClient {
    pub fn new() -> Self {
        Self
    }
}

/// Append the default port when `server` has none.
fn with_default_port(server: &str) -> String {
    let has_port = match server.rsplit_once(':') {
        // Bracketed IPv6 literal: "[::1]:123"
        Some((host, port)) if host.ends_with(']') => port.parse::<u16>().is_ok(),
        // Bare IPv6 literal has more than one colon and no port.
        Some((host, port)) if !host.contains(':') => port.parse::<u16>().is_ok(),
        _ => false,
    };

    if has_port {
        server.to_string()
    } else if server.contains(':') && !server.starts_with('[') {
        format!("[{}]:{}", server, NTP_PORT)
    } else {
        format!("{}:{}", server, NTP_PORT)
    }
}

/// Convert a wall-clock time to a 64-bit NTP timestamp.
fn to_ntp_timestamp(time: SystemTime) -> u64 {
    let since_unix = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    let seconds = since_unix.as_secs() + NTP_UNIX_OFFSET;
    let fraction = (u64::from(since_unix.subsec_nanos()) << 32) / 1_000_000_000;
    (seconds << 32) | fraction
}

/// Convert a 64-bit NTP timestamp to seconds since the Unix epoch.
fn ntp_to_unix_seconds(timestamp: u64) -> f64 {
    let seconds = (timestamp >> 32) as f64 - NTP_UNIX_OFFSET as f64;
    let fraction = (timestamp & 0xFFFF_FFFF) as f64 / 4_294_967_296.0;
    seconds + fraction
}

fn read_timestamp(packet: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&packet[offset..offset + 8]);
    u64::from_be_bytes(bytes)
}

/// Build a client request carrying `transmit` as its transmit timestamp.
fn build_request(transmit: u64) -> [u8; PACKET_LEN] {
    let mut packet = [0u8; PACKET_LEN];
    packet[0] = CLIENT_HEADER;
    packet[40..48].copy_from_slice(&transmit.to_be_bytes());
    packet
}

/// Validate a server reply and compute offset and delay.
///
/// `sent` is the request transmit timestamp, `received` the local receive time
/// in Unix seconds.
fn parse_response(server: &str, packet: &[u8], sent: u64, received: f64) -> Result<NtpResponse> {
    if packet.len() < PACKET_LEN {
        return Err(Error::probe(
            server,
            format!("short reply of {} bytes", packet.len()),
        ));
    }

    let mode = packet[0] & 0x07;
    if mode != MODE_SERVER {
        return Err(Error::probe(server, format!("unexpected mode {}", mode)));
    }

    let stratum = packet[1];
    if stratum == 0 || stratum > 15 {
        return Err(Error::probe(
            server,
            format!("unusable stratum {}", stratum),
        ));
    }

    let originate = read_timestamp(packet, 24);
    if originate != sent {
        return Err(Error::probe(server, "reply does not match request"));
    }

    let transmit = read_timestamp(packet, 40);
    if transmit == 0 {
        return Err(Error::probe(server, "reply has no transmit timestamp"));
    }

    let t1 = ntp_to_unix_seconds(sent);
    let t2 = ntp_to_unix_seconds(read_timestamp(packet, 32));
    let t3 = ntp_to_unix_seconds(transmit);
    let t4 = received;

    let offset = ((t2 - t1) + (t3 - t4)) / 2.0;
    let delay = ((t4 - t1) - (t3 - t2)).max(0.0);

    Ok(NtpResponse {
        stratum,
        offset,
        round_trip: Duration::from_secs_f64(delay),
    })
}

#[async_trait]
impl TimeSource for SntpClient {
    async fn query(&self, server: &str) -> Result<NtpResponse> {
        let address = lookup_host(with_default_port(server))
            .await
            .map_err(|e| Error::probe(server, e))?
            .next()
            .ok_or_else(|| Error::probe(server, "no addresses returned"))?;

        let bind = if address.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| Error::probe(server, e))?;
        socket
            .connect(address)
            .await
            .map_err(|e| Error::probe(server, e))?;

        let sent = to_ntp_timestamp(SystemTime::now());
        socket
            .send(&build_request(sent))
            .await
            .map_err(|e| Error::probe(server, e))?;

        let mut buf = [0u8; 512];
        let len = socket
            .recv(&mut buf)
            .await
            .map_err(|e| Error::probe(server, e))?;
        let received = ntp_to_unix_seconds(to_ntp_timestamp(SystemTime::now()));

        let response = parse_response(server, &buf[..len], sent, received)?;
        debug!(
            server = %server,
            stratum = response.stratum,
            offset = response.offset,
            "NTP exchange complete"
        );

        Ok(response)
    }
}

// =============================================================================
// Tests
// =============================================================================
