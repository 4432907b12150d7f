use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::ignore::IgnoreList;
use crate::model::{elapsed_since, Alert, AlertIndex, DeviceAddress};
use crate::snmp::{
    ObjectInstance, SnmpClient, SnmpGetRequest, SnmpValue, PRT_ALERT_DESCRIPTION, PRT_ALERT_TIME,
    SYS_UP_TIME_INSTANCE,
};
use crate::{targets, Error};

static INDEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.(\d+)\.(\d+)\s*$").expect("valid regex"));
static DESCRIPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(.*?)\s\{"#).expect("valid regex"));

/// What a single walk line tells us before any follow-up query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub index: AlertIndex,
    pub description: Option<String>,
}

/// Splits a line like
/// `Printer-MIB::prtAlertDescription.1.3 = STRING: "Paper Jam {3}"`
/// into its alert index and, when quoted inline, its description.
pub fn parse_walk_line(device: &DeviceAddress, line: &str) -> Result<WalkEntry, Error> {
    let identifier = line.split_once(" = ").map_or(line, |(identifier, _)| identifier);
    let index = INDEX_RE
        .captures(identifier)
        .and_then(|captures| {
            let table = captures.get(1)?.as_str().parse().ok()?;
            let alert = captures.get(2)?.as_str().parse().ok()?;
            Some(AlertIndex::new(table, alert))
        })
        .ok_or_else(|| Error::MalformedAlertLine {
            address: device.to_string(),
            line: line.to_string(),
        })?;

    let description = DESCRIPTION_RE
        .captures(line)
        .and_then(|captures| captures.get(1))
        .map(|text| text.as_str().to_string());

    Ok(WalkEntry { index, description })
}

/// Text before the ` {` severity marker, or the whole value without one.
pub fn strip_severity(value: &str) -> &str {
    value.split_once(" {").map_or(value, |(text, _)| text)
}

pub struct AlertResolver<'a> {
    client: &'a dyn SnmpClient,
    ignore: &'a IgnoreList,
}

impl<'a> AlertResolver<'a> {
    pub fn new(client: &'a dyn SnmpClient, ignore: &'a IgnoreList) -> Self {
        Self { client, ignore }
    }

    /// Turns one walk line into an alert, or `None` when the ignore list
    /// drops it.
    pub async fn resolve(
        &self,
        device: &DeviceAddress,
        line: &str,
    ) -> Result<Option<Alert>, Error> {
        let entry = parse_walk_line(device, line)?;
        let description = match entry.description {
            Some(description) => description,
            None => {
                debug!(
                    target: targets::ALERTS,
                    address = %device,
                    index = %entry.index,
                    "No inline description, querying prtAlertDescription"
                );
                let value = self
                    .fetch(device, ObjectInstance::alert(PRT_ALERT_DESCRIPTION, entry.index))
                    .await?;
                let text = value.as_text_lossy().unwrap_or_else(|| value.to_string());
                strip_severity(&text).to_string()
            }
        };

        if let Some(tag) = self.ignore.matched_tag(&description) {
            debug!(
                target: targets::ALERTS,
                address = %device,
                index = %entry.index,
                description = %description,
                tag,
                "Alert ignored"
            );
            return Ok(None);
        }

        let alert_ticks = self
            .fetch_ticks(device, ObjectInstance::alert(PRT_ALERT_TIME, entry.index))
            .await?;
        let uptime_ticks = self
            .fetch_ticks(device, ObjectInstance::scalar(SYS_UP_TIME_INSTANCE))
            .await?;
        let elapsed = elapsed_since(alert_ticks, uptime_ticks).unwrap_or_else(|| {
            warn!(
                target: targets::ALERTS,
                address = %device,
                index = %entry.index,
                alert_ticks,
                uptime_ticks,
                "Alert time is after uptime, reporting zero elapsed"
            );
            Duration::ZERO
        });

        debug!(
            target: targets::ALERTS,
            address = %device,
            index = %entry.index,
            description = %description,
            elapsed_secs = elapsed.as_secs(),
            "Active alert"
        );

        Ok(Some(Alert {
            index: entry.index,
            description,
            elapsed,
        }))
    }

    async fn fetch(
        &self,
        device: &DeviceAddress,
        instance: ObjectInstance,
    ) -> Result<SnmpValue, Error> {
        self.client
            .get(SnmpGetRequest::new(device.clone(), instance))
            .await
    }

    async fn fetch_ticks(
        &self,
        device: &DeviceAddress,
        instance: ObjectInstance,
    ) -> Result<u64, Error> {
        let value = self.fetch(device, instance).await?;
        value.as_ticks().ok_or_else(|| Error::SnmpFailure {
            address: device.to_string(),
            details: format!("{} is not a tick count: {value}", instance.symbol()),
        })
    }
}
