use std::time::Duration;

use serde::{Deserialize, Serialize};

use deskfriends_protocol::ServerInfo;

/// Ports a relay may listen on, probed in order per host.
pub const PROBE_PORTS: [u16; 5] = [3000, 3001, 3002, 3003, 3004];

/// Used when no usable interface address can be found.
pub const FALLBACK_PREFIX: &str = "192.168.1";

/// Common home-router subnets raced by [`quick_scan`](crate::Scanner::quick_scan)
/// alongside the guessed prefix.
pub const QUICK_SCAN_PREFIXES: [&str; 4] = ["192.168.0", "192.168.1", "192.168.31", "10.0.0"];

/// Timeout for a single `/info` probe during a sweep.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(700);

/// Timeout for a user-initiated single-server test.
pub const TEST_SERVER_TIMEOUT: Duration = Duration::from_millis(3000);

/// Maximum simultaneously in-flight host probes.
pub const DEFAULT_CONCURRENCY: usize = 28;

/// A relay found during a scan. Ephemeral; the list is rebuilt (or, in
/// append mode, merged into) per scan invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredServer {
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub url: String,
    pub pets_online: u32,
}

impl DiscoveredServer {
    /// Builds a scan result from a probe response.
    ///
    /// The ip/port we actually probed win over whatever the relay reports
    /// about itself, since the reported ip may be an interface we can't
    /// route to.
    pub fn from_probe(info: &ServerInfo, ip: &str, port: u16) -> Self {
        Self {
            name: info.name.clone(),
            ip: ip.to_string(),
            port,
            url: format!("http://{ip}:{port}"),
            pets_online: info.pets,
        }
    }

    /// Dedup key within one result list.
    pub fn endpoint(&self) -> (String, u16) {
        (self.ip.clone(), self.port)
    }
}

/// Parameters for one scan invocation.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// `/24` prefixes to sweep. Empty means "guess from local interfaces".
    pub prefixes: Vec<String>,
    pub host_start: u8,
    pub host_end: u8,
    /// Ports probed per host, in order, stopping at the first hit.
    pub ports: Vec<u16>,
    pub probe_timeout: Duration,
    pub concurrency: usize,
    /// Merge into existing results instead of replacing them.
    pub append: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            prefixes: Vec::new(),
            host_start: 1,
            host_end: 254,
            ports: PROBE_PORTS.to_vec(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            append: false,
        }
    }
}

impl ScanConfig {
    /// Number of hosts this configuration will probe.
    pub fn total_hosts(&self) -> usize {
        let per_prefix = (self.host_end as usize).saturating_sub(self.host_start as usize) + 1;
        self.prefixes.len() * per_prefix
    }
}

/// Events emitted while a scan runs.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    ServerFound(DiscoveredServer),
    /// Natural completion; carries the number of servers known afterwards.
    Completed { found: usize },
    /// The scan was stopped before finishing.
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_probe_uses_probed_endpoint() {
        let info = ServerInfo {
            name: "DesktopFriends Server".into(),
            ip: "10.0.0.9".into(),
            port: 9999,
            ws_port: None,
            pets: 2,
        };
        let server = DiscoveredServer::from_probe(&info, "192.168.1.50", 3000);
        assert_eq!(server.ip, "192.168.1.50");
        assert_eq!(server.port, 3000);
        assert_eq!(server.url, "http://192.168.1.50:3000");
        assert_eq!(server.pets_online, 2);
    }

    #[test]
    fn total_hosts_counts_all_prefixes() {
        let config = ScanConfig {
            prefixes: vec!["192.168.0".into(), "192.168.1".into()],
            host_start: 1,
            host_end: 10,
            ..Default::default()
        };
        assert_eq!(config.total_hosts(), 20);
    }

    #[test]
    fn default_config_covers_full_host_range() {
        let config = ScanConfig {
            prefixes: vec!["192.168.1".into()],
            ..Default::default()
        };
        assert_eq!(config.total_hosts(), 254);
        assert_eq!(config.ports, PROBE_PORTS.to_vec());
    }
}
