use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::ignore::IgnoreList;
use crate::model::DeviceAddress;
use crate::poll::check_device;
use crate::snmp::SnmpClient;
use crate::{targets, Error};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOptions {
    pub parallel: bool,
}

/// Combined output of one run over every requested printer.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub text: String,
    pub devices: usize,
    pub elapsed: Duration,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn summary_line(&self) -> String {
        format!(
            "DONE: {} printers checked in {:.1} seconds",
            self.devices,
            self.elapsed.as_secs_f64()
        )
    }

    /// What goes to stdout: the report, a blank line and the summary.
    /// Nothing at all when no printer had anything to say.
    pub fn render(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut output = self.text.clone();
        if !output.ends_with('\n') {
            output.push('\n');
        }
        output.push('\n');
        output.push_str(&self.summary_line());
        output.push('\n');
        Some(output)
    }
}

/// Polls every printer and concatenates their text in argument order.
pub async fn run(
    client: Arc<dyn SnmpClient>,
    ignore: Arc<IgnoreList>,
    devices: &[DeviceAddress],
    options: PollOptions,
) -> Result<Report, Error> {
    let started = Instant::now();
    info!(
        target: targets::REPORT,
        devices = devices.len(),
        parallel = options.parallel,
        "Checking printers"
    );

    let sections = if options.parallel {
        poll_parallel(client, ignore, devices).await?
    } else {
        let mut sections = Vec::with_capacity(devices.len());
        for device in devices {
            sections.push(check_device(client.as_ref(), &ignore, device).await?);
        }
        sections
    };

    let report = Report {
        text: sections.concat(),
        devices: devices.len(),
        elapsed: started.elapsed(),
    };
    debug!(
        target: targets::REPORT,
        bytes = report.text.len(),
        elapsed_ms = report.elapsed.as_millis(),
        "Report assembled"
    );
    Ok(report)
}

async fn poll_parallel(
    client: Arc<dyn SnmpClient>,
    ignore: Arc<IgnoreList>,
    devices: &[DeviceAddress],
) -> Result<Vec<String>, Error> {
    let handles: Vec<_> = devices
        .iter()
        .cloned()
        .map(|device| {
            let client = Arc::clone(&client);
            let ignore = Arc::clone(&ignore);
            tokio::spawn(async move { check_device(client.as_ref(), &ignore, &device).await })
        })
        .collect();

    let mut sections = Vec::with_capacity(devices.len());
    for (device, handle) in devices.iter().zip(handles) {
        let section = handle.await.map_err(|error| Error::TaskFailed {
            address: device.to_string(),
            details: error.to_string(),
        })?;
        sections.push(section?);
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AlertIndex;
    use crate::snmp::{
        run_future, MockSnmpClient, ObjectInstance, SnmpValue, PRT_ALERT_TIME,
        SYS_UP_TIME_INSTANCE,
    };

    fn devices(addresses: &[&str]) -> Vec<DeviceAddress> {
        addresses.iter().map(|address| DeviceAddress::new(*address)).collect()
    }

    fn script_jam(mock: &MockSnmpClient, address: &str) {
        mock.push_walk(
            address,
            vec!["Printer-MIB::prtAlertDescription.1.3 = STRING: \"Paper Jam {3}\"".to_string()],
        );
        mock.set_value(
            address,
            ObjectInstance::alert(PRT_ALERT_TIME, AlertIndex::new(1, 3)),
            SnmpValue::Timeticks(500),
        );
        mock.set_value(
            address,
            ObjectInstance::scalar(SYS_UP_TIME_INSTANCE),
            SnmpValue::Timeticks(1500),
        );
    }

    #[test]
    fn quiet_printers_render_nothing() {
        let mock = MockSnmpClient::new();
        mock.push_walk("a.example.org", Vec::new());
        mock.push_walk(
            "b.example.org",
            vec!["Printer-MIB::prtAlertDescription.1.1 = STRING: \"Warming up {1}\"".to_string()],
        );
        let report = run_future(run(
            Arc::new(mock),
            Arc::new(IgnoreList::default()),
            &devices(&["a.example.org", "b.example.org"]),
            PollOptions::default(),
        ))
        .expect("run");
        assert!(report.is_empty());
        assert_eq!(report.render(), None);
    }

    #[test]
    fn healthy_and_jammed_printer() {
        let mock = MockSnmpClient::new();
        mock.push_walk("healthy.example.org", Vec::new());
        script_jam(&mock, "jammed.example.org");

        let report = run_future(run(
            Arc::new(mock),
            Arc::new(IgnoreList::default()),
            &devices(&["healthy.example.org", "jammed.example.org"]),
            PollOptions::default(),
        ))
        .expect("run");

        let output = report.render().expect("output");
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "[jammed] 'Paper Jam' in 0:00:10");
        assert_eq!(lines[1], "");
        assert!(lines[2].starts_with("DONE: 2 printers checked in "));
        assert!(lines[2].ends_with(" seconds"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn unknown_host_does_not_stop_the_run() {
        let mock = MockSnmpClient::new();
        mock.push_walk_error(
            "gone.example.org",
            Error::UnknownHost {
                address: "gone.example.org".to_string(),
            },
        );
        script_jam(&mock, "next.example.org");

        let report = run_future(run(
            Arc::new(mock),
            Arc::new(IgnoreList::default()),
            &devices(&["gone.example.org", "next.example.org"]),
            PollOptions::default(),
        ))
        .expect("run");
        assert_eq!(
            report.text,
            "[gone] host 'gone.example.org' unknown or offline\n[next] 'Paper Jam' in 0:00:10\n"
        );
    }

    #[test]
    fn parallel_run_keeps_argument_order() {
        let mock = MockSnmpClient::new();
        let addresses = ["p1.example.org", "p2.example.org", "p3.example.org"];
        for address in addresses {
            script_jam(&mock, address);
        }

        let report = run_future(run(
            Arc::new(mock),
            Arc::new(IgnoreList::default()),
            &devices(&addresses),
            PollOptions { parallel: true },
        ))
        .expect("run");
        assert_eq!(
            report.text,
            "[p1] 'Paper Jam' in 0:00:10\n[p2] 'Paper Jam' in 0:00:10\n[p3] 'Paper Jam' in 0:00:10\n"
        );
        assert_eq!(report.devices, 3);
    }

    #[test]
    fn summary_uses_one_decimal() {
        let report = Report {
            text: "x\n".to_string(),
            devices: 4,
            elapsed: Duration::from_millis(2_345),
        };
        assert_eq!(report.summary_line(), "DONE: 4 printers checked in 2.3 seconds");
        assert_eq!(
            report.render().as_deref(),
            Some("x\n\nDONE: 4 printers checked in 2.3 seconds\n")
        );
    }
}
