//! Single-endpoint `/info` probes.

use std::time::Duration;

use tracing::{debug, trace};

use deskfriends_protocol::{SERVER_IDENTITY, ServerInfo};

use crate::types::{DiscoveredServer, TEST_SERVER_TIMEOUT};

/// Probes one `ip:port` for a relay.
///
/// Success requires HTTP 200 and a JSON body whose `name` matches
/// [`SERVER_IDENTITY`]. Every failure mode (timeout, refused, non-200,
/// parse error, wrong identity) is swallowed and reported as `None`.
pub async fn probe_endpoint(
    http: &reqwest::Client,
    ip: &str,
    port: u16,
    timeout: Duration,
) -> Option<DiscoveredServer> {
    let url = format!("http://{ip}:{port}/info");
    let response = http.get(&url).timeout(timeout).send().await.ok()?;
    if !response.status().is_success() {
        trace!(url = %url, status = %response.status(), "probe rejected");
        return None;
    }
    let info: ServerInfo = response.json().await.ok()?;
    if info.name != SERVER_IDENTITY {
        trace!(url = %url, name = %info.name, "probe answered with wrong identity");
        return None;
    }
    debug!(url = %url, pets = info.pets, "relay found");
    Some(DiscoveredServer::from_probe(&info, ip, port))
}

/// Probes a host across the given ports, stopping at the first hit.
pub async fn probe_host(
    http: &reqwest::Client,
    ip: &str,
    ports: &[u16],
    timeout: Duration,
) -> Option<DiscoveredServer> {
    for &port in ports {
        if let Some(server) = probe_endpoint(http, ip, port, timeout).await {
            return Some(server);
        }
    }
    None
}

/// Tests a user-entered server address with a single `/info` probe.
///
/// Returns the server descriptor on success, `None` on any failure.
pub async fn test_server(http: &reqwest::Client, url: &str) -> Option<DiscoveredServer> {
    let base = url.trim_end_matches('/');
    let parsed = reqwest::Url::parse(base).ok()?;
    let host = parsed.host_str()?.to_string();
    let port = parsed.port_or_known_default()?;

    let response = http
        .get(format!("{base}/info"))
        .timeout(TEST_SERVER_TIMEOUT)
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    let info: ServerInfo = response.json().await.ok()?;
    if info.name != SERVER_IDENTITY {
        debug!(url = %base, name = %info.name, "server identity mismatch");
        return None;
    }
    Some(DiscoveredServer::from_probe(&info, &host, port))
}
