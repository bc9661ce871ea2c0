//! Configuration for connection sessions.
//!
//! ```rust
//! use astv_session::SessionConfig;
//! use std::time::Duration;
//!
//! let config = SessionConfig::default()
//!     .with_liveness_timeout(Duration::from_secs(1))
//!     .with_max_discover_retries(3);
//! assert_eq!(config.port, 1024);
//! ```

use std::time::Duration;

/// DNS-SD type the server registers under.
pub const DEFAULT_SERVICE_TYPE: &str = "_assistive-tech._udp.local.";

/// UDP port the server listens on.
pub const DEFAULT_PORT: u16 = 1024;

pub(crate) const DEFAULT_BROWSE_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(2);
pub(crate) const DEFAULT_MAX_DISCOVER_RETRIES: u32 = 5;
pub(crate) const DEFAULT_STRENGTH_FLOOR: f32 = 5.0;
pub(crate) const DEFAULT_STRENGTH_WINDOW: usize = 5;
pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Session tuning. The liveness thresholds are protocol tuning rather than
/// invariants, hence configurable.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub service_type: String,
    pub port: u16,
    /// How long discovery browses before giving up.
    pub browse_timeout: Duration,
    pub resolve_timeout: Duration,
    /// Silence after a send before it counts as lost.
    pub liveness_timeout: Duration,
    /// Discover resends before the handshake is declared unanswered.
    pub max_discover_retries: u32,
    /// Strength (percent) below which the link is considered dead.
    pub strength_floor: f32,
    /// Number of samples averaged into the strength.
    pub strength_window: usize,
    /// Socket polling granularity of the blocking driver.
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service_type: DEFAULT_SERVICE_TYPE.to_owned(),
            port: DEFAULT_PORT,
            browse_timeout: DEFAULT_BROWSE_TIMEOUT,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            max_discover_retries: DEFAULT_MAX_DISCOVER_RETRIES,
            strength_floor: DEFAULT_STRENGTH_FLOOR,
            strength_window: DEFAULT_STRENGTH_WINDOW,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service_type(mut self, service_type: &str) -> Self {
        self.service_type = service_type.to_owned();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_browse_timeout(mut self, timeout: Duration) -> Self {
        self.browse_timeout = timeout;
        self
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }

    pub fn with_max_discover_retries(mut self, retries: u32) -> Self {
        self.max_discover_retries = retries;
        self
    }

    pub fn with_strength_floor(mut self, floor: f32) -> Self {
        self.strength_floor = floor;
        self
    }

    /// A window of zero is treated as one.
    pub fn with_strength_window(mut self, window: usize) -> Self {
        self.strength_window = window.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
