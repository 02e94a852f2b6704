//! Read/write/ping pump tasks backing one relay transport.

use std::time::Duration;

pub(crate) mod ping;
pub(crate) mod read;
pub(crate) mod write;

/// Keepalive ping interval.
pub(crate) const PING_PERIOD: Duration = Duration::from_secs(20);

/// Silence window after which the connection is considered dead.
pub(crate) const PONG_WAIT: Duration = Duration::from_secs(60);

/// Largest text frame accepted from the relay.
pub(crate) const MAX_FRAME_SIZE: usize = 1024 * 1024;
