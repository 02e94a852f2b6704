//! Local `/24` prefix guessing.
//!
//! There is no multicast discovery protocol on the relay side, so scans
//! sweep candidate subnets. The candidates come from the machine's own
//! interface addresses; when nothing usable is found the hard-coded
//! fallback keeps the scan meaningful on oddly configured hosts.

use std::net::IpAddr;

use tracing::debug;

use crate::types::FALLBACK_PREFIX;

/// Returns deduplicated `/24` prefixes for every usable local IPv4 address.
///
/// Loopback and link-local addresses are skipped. Falls back to
/// [`FALLBACK_PREFIX`] when interface enumeration fails or yields nothing.
pub fn guess_subnet_prefixes() -> Vec<String> {
    let addrs = match if_addrs::get_if_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            debug!("interface enumeration failed: {e}, using fallback prefix");
            return vec![FALLBACK_PREFIX.to_string()];
        }
    };

    let mut prefixes = Vec::new();
    for iface in addrs {
        let IpAddr::V4(ip) = iface.ip() else { continue };
        let octets = ip.octets();
        if octets[0] == 127 {
            continue;
        }
        if octets[0] == 169 && octets[1] == 254 {
            continue;
        }
        let prefix = format!("{}.{}.{}", octets[0], octets[1], octets[2]);
        if !prefixes.contains(&prefix) {
            prefixes.push(prefix);
        }
    }

    if prefixes.is_empty() {
        debug!("no usable interface addresses, using fallback prefix");
        prefixes.push(FALLBACK_PREFIX.to_string());
    }
    prefixes
}

/// Merges prefix lists preserving order and dropping duplicates.
pub fn merge_prefixes(base: Vec<String>, extra: &[&str]) -> Vec<String> {
    let mut merged = base;
    for prefix in extra {
        if !merged.iter().any(|p| p == prefix) {
            merged.push((*prefix).to_string());
        }
    }
    merged
}
