use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Hundredths of a second since the device booted.
pub type Ticks = u64;

pub const TICKS_PER_SECOND: Ticks = 100;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAddress(pub String);

impl DeviceAddress {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Text before the first dot. Used to tag report lines.
    pub fn short_name(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Row index of the printer alert table: (hrDeviceIndex, prtAlertIndex).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertIndex {
    pub table: u32,
    pub alert: u32,
}

impl AlertIndex {
    pub fn new(table: u32, alert: u32) -> Self {
        Self { table, alert }
    }

    pub fn arcs(&self) -> [u32; 2] {
        [self.table, self.alert]
    }
}

impl fmt::Display for AlertIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.alert)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub index: AlertIndex,
    pub description: String,
    pub elapsed: Duration,
}

impl Alert {
    pub fn report_line(&self, device: &DeviceAddress) -> String {
        format!(
            "[{}] '{}' in {}\n",
            device.short_name(),
            self.description,
            format_elapsed(self.elapsed)
        )
    }
}

/// Time between the alert timestamp and the current uptime, in whole seconds.
/// Returns `None` when the alert claims to be newer than the uptime.
pub fn elapsed_since(alert_ticks: Ticks, uptime_ticks: Ticks) -> Option<Duration> {
    uptime_ticks
        .checked_sub(alert_ticks)
        .map(|ticks| Duration::from_secs(ticks / TICKS_PER_SECOND))
}

/// `H:MM:SS`, prefixed with `N day(s), ` once a day has passed.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    match days {
        0 => format!("{hours}:{minutes:02}:{seconds:02}"),
        1 => format!("1 day, {hours}:{minutes:02}:{seconds:02}"),
        days => format!("{days} days, {hours}:{minutes:02}:{seconds:02}"),
    }
}
