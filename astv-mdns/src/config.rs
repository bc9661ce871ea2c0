//! Configuration for a [`Zeroconf`](crate::Zeroconf) instance.
//!
//! # Examples
//!
//! ## Default network instance
//!
//! ```rust,ignore
//! use astv_mdns::{MdnsConfig, Zeroconf};
//!
//! let zc = Zeroconf::new(MdnsConfig::default())?;
//! ```
//!
//! ## Every interface, faster first browse
//!
//! ```rust
//! use astv_mdns::{InterfaceChoice, MdnsConfig};
//! use std::time::Duration;
//!
//! let config = MdnsConfig::default()
//!     .with_interface(InterfaceChoice::All)
//!     .with_browser_initial_delay(Duration::from_millis(250));
//! ```
//!
//! ## Offline instance for tests
//!
//! ```rust
//! use astv_mdns::{MdnsConfig, Zeroconf};
//!
//! let zc = Zeroconf::new(MdnsConfig::default().with_bind_sockets(false)).unwrap();
//! zc.close().unwrap();
//! ```

use std::time::Duration;

/// Default TTL for records we publish (one hour).
pub(crate) const DEFAULT_TTL: u32 = 60 * 60;

/// Spacing between the three probes sent before registering.
pub(crate) const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(175);

/// Spacing between the three announcements of a registration.
pub(crate) const DEFAULT_REGISTER_INTERVAL: Duration = Duration::from_millis(225);

/// Spacing between the three goodbye packets of an unregistration.
pub(crate) const DEFAULT_UNREGISTER_INTERVAL: Duration = Duration::from_millis(125);

/// First delay between browser queries; doubled after every query.
pub(crate) const DEFAULT_BROWSER_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Ceiling for the browser query delay.
pub(crate) const DEFAULT_BROWSER_MAX_DELAY: Duration = Duration::from_secs(20);

/// First delay between resolver queries; doubled after every query.
pub(crate) const DEFAULT_RESOLVE_INITIAL_DELAY: Duration = Duration::from_millis(200);

/// How often the reaper scans the cache for expired records.
pub(crate) const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(10);

/// How long the socket engine sleeps when it has no sockets.
pub(crate) const DEFAULT_ENGINE_IDLE_WAIT: Duration = Duration::from_secs(5);

/// Upper bound of one readiness wait in the socket engine.
pub(crate) const DEFAULT_ENGINE_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Which local interfaces send and answer mDNS traffic.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum InterfaceChoice {
    /// The system default route only (`0.0.0.0`).
    #[default]
    Default,
    /// Every non-loopback IPv4 interface.
    All,
}

/// Configuration for a [`Zeroconf`](crate::Zeroconf) instance.
///
/// All timings default to the values used by common mDNS responders; tests
/// usually shrink them.
#[derive(Clone, Debug)]
pub struct MdnsConfig {
    /// Interfaces used for the responder sockets.
    pub interface: InterfaceChoice,

    /// Whether to open the multicast sockets at all.
    ///
    /// With `false` the instance never touches the network: packets handed to
    /// it are still processed and outgoing packets are counted, then dropped.
    pub bind_sockets: bool,

    /// TTL given to records of registered services.
    pub default_ttl: u32,

    pub check_interval: Duration,
    pub register_interval: Duration,
    pub unregister_interval: Duration,
    pub browser_initial_delay: Duration,
    pub browser_max_delay: Duration,
    pub resolve_initial_delay: Duration,
    pub reap_interval: Duration,
    pub engine_idle_wait: Duration,
    pub engine_poll_timeout: Duration,
}

impl Default for MdnsConfig {
    fn default() -> Self {
        Self {
            interface: InterfaceChoice::Default,
            bind_sockets: true,
            default_ttl: DEFAULT_TTL,
            check_interval: DEFAULT_CHECK_INTERVAL,
            register_interval: DEFAULT_REGISTER_INTERVAL,
            unregister_interval: DEFAULT_UNREGISTER_INTERVAL,
            browser_initial_delay: DEFAULT_BROWSER_INITIAL_DELAY,
            browser_max_delay: DEFAULT_BROWSER_MAX_DELAY,
            resolve_initial_delay: DEFAULT_RESOLVE_INITIAL_DELAY,
            reap_interval: DEFAULT_REAP_INTERVAL,
            engine_idle_wait: DEFAULT_ENGINE_IDLE_WAIT,
            engine_poll_timeout: DEFAULT_ENGINE_POLL_TIMEOUT,
        }
    }
}

impl MdnsConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interface(mut self, interface: InterfaceChoice) -> Self {
        self.interface = interface;
        self
    }

    /// Open (the default) or skip the multicast sockets.
    ///
    /// ```rust
    /// use astv_mdns::MdnsConfig;
    ///
    /// let config = MdnsConfig::default().with_bind_sockets(false);
    /// assert!(!config.bind_sockets);
    /// ```
    pub fn with_bind_sockets(mut self, bind_sockets: bool) -> Self {
        self.bind_sockets = bind_sockets;
        self
    }

    pub fn with_default_ttl(mut self, ttl: u32) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_register_interval(mut self, interval: Duration) -> Self {
        self.register_interval = interval;
        self
    }

    pub fn with_unregister_interval(mut self, interval: Duration) -> Self {
        self.unregister_interval = interval;
        self
    }

    /// Set the delay before the second browser query.
    ///
    /// The first query goes out immediately; each later delay doubles up to
    /// [`browser_max_delay`](Self::browser_max_delay).
    pub fn with_browser_initial_delay(mut self, delay: Duration) -> Self {
        self.browser_initial_delay = delay;
        self
    }

    pub fn with_browser_max_delay(mut self, delay: Duration) -> Self {
        self.browser_max_delay = delay;
        self
    }

    pub fn with_resolve_initial_delay(mut self, delay: Duration) -> Self {
        self.resolve_initial_delay = delay;
        self
    }

    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    pub fn with_engine_idle_wait(mut self, wait: Duration) -> Self {
        self.engine_idle_wait = wait;
        self
    }

    pub fn with_engine_poll_timeout(mut self, timeout: Duration) -> Self {
        self.engine_poll_timeout = timeout;
        self
    }
}
