//! Local port probing.

use planet_core::{PlanetError, Result};
use std::net::{Ipv4Addr, TcpListener};

/// Whether `port` can currently be bound on the loopback interface.
pub fn is_port_free(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}

/// First free port in `preferred..=preferred + span`, skipping `taken`.
pub fn probe_port(preferred: u16, span: u16, taken: &[u16]) -> Result<u16> {
    let last = preferred.saturating_add(span);
    (preferred..=last)
        .find(|p| !taken.contains(p) && is_port_free(*p))
        .ok_or_else(|| {
            PlanetError::Node(format!("no free port between {} and {}", preferred, last))
        })
}

/// Ports picked for one daemon run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePorts {
    pub api: u16,
    pub gateway: u16,
    pub swarm: u16,
}

impl NodePorts {
    /// Probe all three, never handing out the same port twice.
    pub fn probe(api: u16, gateway: u16, swarm: u16, span: u16) -> Result<Self> {
        let api = probe_port(api, span, &[])?;
        let gateway = probe_port(gateway, span, &[api])?;
        let swarm = probe_port(swarm, span, &[api, gateway])?;
        Ok(Self { api, gateway, swarm })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_port_is_skipped() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let busy = listener.local_addr().unwrap().port();
        assert!(!is_port_free(busy));
        let picked = probe_port(busy, 50, &[]).unwrap();
        assert!(picked > busy);
    }

    #[test]
    fn test_taken_ports_are_skipped() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let picked = probe_port(port, 50, &[port]).unwrap();
        assert_ne!(picked, port);
    }

    #[test]
    fn test_exhausted_range_is_error() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let busy = listener.local_addr().unwrap().port();
        assert!(probe_port(busy, 0, &[]).is_err());
    }

    #[test]
    fn test_probe_distinct() {
        let ports = NodePorts::probe(20_500, 20_500, 20_500, 50).unwrap();
        assert_ne!(ports.api, ports.gateway);
        assert_ne!(ports.gateway, ports.swarm);
        assert_ne!(ports.api, ports.swarm);
    }
}
