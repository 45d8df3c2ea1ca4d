// ── Runtime coordinator configuration ──
//
// Describes *which* device to talk to and *what* to poll. Never touches
// disk: the CLI (via htlink-config) builds a `CoordinatorConfig` and
// hands it in at construction or reconfiguration.

use std::time::Duration;

use htlink_proto::TransportConfig;

/// Default TCP port of the serial-over-TCP bridge.
pub const DEFAULT_PORT: u16 = 9999;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_BULK_BATCH_SIZE: usize = 16;
pub const DEFAULT_UNAVAILABLE_AFTER: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub host: String,
    pub port: u16,
    /// Bound for each open, send and receive.
    pub timeout: Duration,
    pub scan_interval: Duration,
    /// Parameters to poll. Empty means the catalog's default selection.
    pub selected_params: Vec<String>,
    /// Whether the write-enable flag may be switched on at all. The flag
    /// itself always starts off.
    pub write_enabled: bool,
    /// Consecutive failed cycles before the device is reported unavailable.
    pub unavailable_after: u32,
    /// Maximum register numbers per bulk request.
    pub bulk_batch_size: usize,
}

impl CoordinatorConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_selected<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_params = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig::new(self.host.clone(), self.port).with_timeout(self.timeout)
    }

    /// Clamp out-of-range tuning knobs to usable values.
    pub(crate) fn normalized(mut self) -> Self {
        self.unavailable_after = self.unavailable_after.max(1);
        self.bulk_batch_size = self.bulk_batch_size.max(1);
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }
        if self.scan_interval.is_zero() {
            self.scan_interval = DEFAULT_SCAN_INTERVAL;
        }
        self
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            selected_params: Vec::new(),
            write_enabled: false,
            unavailable_after: DEFAULT_UNAVAILABLE_AFTER,
            bulk_batch_size: DEFAULT_BULK_BATCH_SIZE,
        }
    }
}
