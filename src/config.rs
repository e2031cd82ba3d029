// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Session tunables.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_cr as serde;
use std::time::Duration;
use uuid::Uuid;

use crate::api::PeripheralProperties;

/// How long a scan runs before it is stopped.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Which sightings a scan reports.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr", default)
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFilter {
    /// Skip peripherals that do not advertise a name.
    pub named_only: bool,
    /// Only report peripherals advertising at least one of these services. Empty means all.
    pub services: Vec<Uuid>,
}

impl ScanFilter {
    pub fn accepts(&self, properties: &PeripheralProperties) -> bool {
        if self.named_only && properties.local_name.as_deref().unwrap_or("").is_empty() {
            return false;
        }
        self.services.is_empty() || properties.services.iter().any(|s| self.services.contains(s))
    }
}

impl Default for ScanFilter {
    fn default() -> Self {
        ScanFilter {
            named_only: true,
            services: Vec::new(),
        }
    }
}

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr", default)
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub scan_timeout: Duration,
    pub connect_timeout: Duration,
    pub scan_filter: ScanFilter,
    /// Capacity of the session event channel. Slow listeners past this lag and lose events.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            scan_filter: ScanFilter::default(),
            event_capacity: 16,
        }
    }
}

impl SessionConfig {
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn scan_filter(mut self, filter: ScanFilter) -> Self {
        self.scan_filter = filter;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
