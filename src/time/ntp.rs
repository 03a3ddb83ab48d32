//! Minimal SNTP client.
//!
//! Only what the controller needs: one request, one response, the server's
//! transmit timestamp corrected by half the round trip.

use chrono::{DateTime, Utc};
use std::net::{ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use crate::common::constants::*;
use crate::error::TimeError;

/// Anything that can answer "what time is it" for a named host.
#[cfg_attr(test, mockall::automock)]
pub trait NetworkTimeSource: Send {
    /// Query one host. Every failure is a [`TimeError::TransientSyncFailure`].
    fn query(&self, host: &str) -> Result<DateTime<Utc>, TimeError>;
}

/// SNTP v3 client over UDP with a bounded per-host timeout.
pub struct SntpClient {
    timeout: Duration,
}

impl SntpClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SntpClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_NTP_TIMEOUT))
    }
}

impl NetworkTimeSource for SntpClient {
    fn query(&self, host: &str) -> Result<DateTime<Utc>, TimeError> {
        let addr = (host, NTP_PORT)
            .to_socket_addrs()
            .map_err(|e| TimeError::transient(host, format!("DNS lookup failed: {e}")))?
            .find(|a| a.is_ipv4())
            .ok_or_else(|| TimeError::transient(host, "no IPv4 address"))?;

        let socket =
            UdpSocket::bind("0.0.0.0:0").map_err(|e| TimeError::transient(host, e))?;
        socket
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| TimeError::transient(host, e))?;
        socket
            .set_write_timeout(Some(self.timeout))
            .map_err(|e| TimeError::transient(host, e))?;
        socket
            .connect(addr)
            .map_err(|e| TimeError::transient(host, e))?;

        let mut request = [0u8; NTP_PACKET_LEN];
        request[0] = NTP_CLIENT_REQUEST;

        let sent_at = Instant::now();
        socket
            .send(&request)
            .map_err(|e| TimeError::transient(host, format!("send failed: {e}")))?;

        let mut response = [0u8; 64];
        let len = socket.recv(&mut response).map_err(|e| match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                TimeError::transient(host, format!("no reply within {}s", self.timeout.as_secs()))
            }
            _ => TimeError::transient(host, format!("receive failed: {e}")),
        })?;
        let rtt = sent_at.elapsed();

        parse_response(&response[..len], rtt).map_err(|reason| TimeError::transient(host, reason))
    }
}

/// Decode a server reply into a UTC instant.
///
/// Checks the length and stratum, reads the transmit timestamp (bytes 40..48),
/// converts it from the 1900 NTP epoch and adds half the round trip, capped
/// at one second.
pub fn parse_response(packet: &[u8], rtt: Duration) -> Result<DateTime<Utc>, String> {
    if packet.len() < NTP_PACKET_LEN {
        return Err(format!("short reply ({} bytes)", packet.len()));
    }

    let stratum = packet[1];
    if stratum == 0 || stratum > NTP_MAX_STRATUM {
        return Err(format!("unusable stratum {stratum}"));
    }

    let seconds = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]) as u64;
    let fraction = u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]) as u64;

    let unix_seconds = seconds
        .checked_sub(NTP_UNIX_OFFSET)
        .ok_or_else(|| format!("transmit timestamp {seconds} predates 1970"))?;
    let fraction_micros = (fraction * 1_000_000) >> 32;
    let correction = (rtt.as_micros() as u64 / 2).min(NTP_MAX_RTT_CORRECTION_MICROS);
    let total_micros = unix_seconds * 1_000_000 + fraction_micros + correction;

    DateTime::<Utc>::from_timestamp_micros(total_micros as i64)
        .ok_or_else(|| format!("timestamp {total_micros} out of range"))
}
