use tracing::{debug, info, warn};

use crate::alerts::AlertResolver;
use crate::ignore::IgnoreList;
use crate::model::DeviceAddress;
use crate::snmp::{SnmpClient, SnmpWalkRequest, PRT_ALERT_DESCRIPTION};
use crate::{targets, Error};

/// Raw `prtAlertDescription` walk lines for one printer, in agent order.
pub async fn fetch_alert_lines(
    client: &dyn SnmpClient,
    device: &DeviceAddress,
) -> Result<Vec<String>, Error> {
    let request = SnmpWalkRequest::new(device.clone(), PRT_ALERT_DESCRIPTION);
    let lines: Vec<String> = client
        .walk(request)
        .await?
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .collect();
    debug!(
        target: targets::POLL,
        address = %device,
        count = lines.len(),
        "Alert table fetched"
    );
    Ok(lines)
}

/// Report text for one printer: one line per active alert, or a single line
/// describing why the printer could not be checked.
///
/// Device-level failures are folded into the text after any alerts already
/// resolved. Anything else (a walk line without an alert index, a missing
/// SNMP tool) is returned as an error and ends the run.
pub async fn check_device(
    client: &dyn SnmpClient,
    ignore: &IgnoreList,
    device: &DeviceAddress,
) -> Result<String, Error> {
    let mut text = String::new();
    match collect_alerts(client, ignore, device, &mut text).await {
        Ok(()) => Ok(text),
        Err(error) if error.is_device_level() => {
            warn!(
                target: targets::POLL,
                address = %device,
                error = %error.technical_detail(),
                "Printer check failed"
            );
            text.push_str(&error.report_line(device));
            text.push('\n');
            Ok(text)
        }
        Err(error) => Err(error),
    }
}

async fn collect_alerts(
    client: &dyn SnmpClient,
    ignore: &IgnoreList,
    device: &DeviceAddress,
    text: &mut String,
) -> Result<(), Error> {
    let lines = fetch_alert_lines(client, device).await?;
    let resolver = AlertResolver::new(client, ignore);
    let mut active = 0usize;
    for line in &lines {
        if let Some(alert) = resolver.resolve(device, line).await? {
            text.push_str(&alert.report_line(device));
            active += 1;
        }
    }
    info!(
        target: targets::POLL,
        address = %device,
        listed = lines.len(),
        active,
        "Printer checked"
    );
    Ok(())
}
