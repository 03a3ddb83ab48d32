//! Network reachability as seen by the controller.
//!
//! Bringing the link up is the operating system's job. The controller only
//! needs to know whether a time server is routable, and it asks for a
//! reconnect by re-probing.

use std::net::{ToSocketAddrs, UdpSocket};

pub trait Connectivity {
    /// Whether the network currently looks usable.
    fn is_connected(&mut self) -> bool;

    /// Try to (re)establish connectivity. Returns the new state.
    fn reconnect(&mut self) -> bool {
        self.is_connected()
    }

    /// Time server supplied by the current connection, tried before the
    /// configured list.
    fn custom_ntp_host(&self) -> Option<String> {
        None
    }
}

/// Checks for a route to a probe address with a connected UDP socket.
///
/// `connect` on a UDP socket sends nothing; it resolves the name and asks the
/// kernel for a route, which fails fast when no interface is up.
pub struct RouteProbe {
    probe: String,
    custom_host: Option<String>,
}

impl RouteProbe {
    pub fn new(probe: impl Into<String>, custom_host: Option<String>) -> Self {
        Self {
            probe: probe.into(),
            custom_host,
        }
    }

    fn probe(&self) -> std::io::Result<()> {
        let addr = self
            .probe
            .to_socket_addrs()?
            .find(|a| a.is_ipv4())
            .ok_or_else(|| std::io::Error::other("no IPv4 address for probe"))?;
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(addr)?;
        Ok(())
    }
}

impl Connectivity for RouteProbe {
    fn is_connected(&mut self) -> bool {
        self.probe().is_ok()
    }

    fn custom_ntp_host(&self) -> Option<String> {
        self.custom_host.clone()
    }
}

/// Always disconnected. Used for simulation and for offline deployments.
#[derive(Debug, Default, Clone, Copy)]
pub struct Offline;

impl Connectivity for Offline {
    fn is_connected(&mut self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_never_connects() {
        let mut offline = Offline;
        assert!(!offline.is_connected());
        assert!(!offline.reconnect());
        assert_eq!(offline.custom_ntp_host(), None);
    }

    #[test]
    fn test_unresolvable_probe_is_disconnected() {
        let mut probe = RouteProbe::new("no-such-host.invalid:123", Some("ntp.lan".into()));
        assert!(!probe.is_connected());
        assert_eq!(probe.custom_ntp_host().as_deref(), Some("ntp.lan"));
    }
}
