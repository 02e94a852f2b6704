//! LAN relay discovery for DeskFriends.
//!
//! The relay advertises nothing; clients find it by probing `/info` across
//! candidate subnets with bounded concurrency, or by testing a
//! user-entered address directly.

pub mod probe;
pub mod scanner;
pub mod subnet;
pub mod types;

#[doc(hidden)]
pub mod testing;

pub use probe::{probe_endpoint, probe_host, test_server};
pub use scanner::Scanner;
pub use subnet::guess_subnet_prefixes;
pub use types::{
    DEFAULT_CONCURRENCY, DEFAULT_PROBE_TIMEOUT, DiscoveredServer, FALLBACK_PREFIX, PROBE_PORTS,
    QUICK_SCAN_PREFIXES, ScanConfig, ScanEvent, TEST_SERVER_TIMEOUT,
};
