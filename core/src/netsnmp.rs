use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, trace, warn};

use crate::model::DeviceAddress;
use crate::snmp::{
    SnmpClient, SnmpConfig, SnmpFuture, SnmpGetRequest, SnmpValue, SnmpVersion, SnmpWalkRequest,
};
use crate::{targets, Error};

/// Backend that shells out to the net-snmp command line tools.
#[derive(Debug, Clone)]
pub struct NetSnmpClient {
    config: SnmpConfig,
}

impl NetSnmpClient {
    pub fn new(config: SnmpConfig) -> Self {
        Self { config }
    }

    pub async fn walk(&self, request: SnmpWalkRequest) -> Result<Vec<String>, Error> {
        let SnmpWalkRequest {
            address,
            object,
            max_results,
        } = request;
        let symbol = object.symbol();

        debug!(
            target: targets::SNMP,
            address = %address,
            root = %symbol,
            tool = %self.config.snmpwalk,
            "SNMP WALK"
        );

        let mut command = self.command(&self.config.snmpwalk, self.config.walk_version);
        command.arg(address.as_str()).arg(&symbol);
        let output = command.output().await.map_err(|source| Error::ToolSpawn {
            tool: self.config.snmpwalk.clone(),
            source,
        })?;

        let stdout = match classify_output(
            &address,
            &self.config.snmpwalk,
            output.status.success(),
            output.status.code(),
            &output.stdout,
            &output.stderr,
        ) {
            Ok(Some(stdout)) => stdout,
            Ok(None) => {
                warn!(
                    target: targets::SNMP,
                    address = %address,
                    status = ?output.status.code(),
                    "snmpwalk failed without diagnostics, treating as no alerts"
                );
                return Ok(Vec::new());
            }
            Err(error) => {
                warn!(
                    target: targets::SNMP,
                    address = %address,
                    error = %error.technical_detail(),
                    "SNMP WALK failed"
                );
                return Err(error);
            }
        };

        let lines = filter_walk_lines(&stdout, object.name, max_results);
        debug!(
            target: targets::SNMP,
            address = %address,
            count = lines.len(),
            "SNMP WALK ok"
        );
        for line in &lines {
            trace!(target: targets::SNMP, address = %address, line = %line, "SNMP walk line");
        }
        Ok(lines)
    }

    pub async fn get(&self, request: SnmpGetRequest) -> Result<SnmpValue, Error> {
        let SnmpGetRequest { address, instance } = request;
        let symbol = instance.symbol();

        debug!(
            target: targets::SNMP,
            address = %address,
            oid = %symbol,
            tool = %self.config.snmpget,
            "SNMP GET"
        );

        let mut command = self.command(&self.config.snmpget, self.config.get_version);
        command.arg("-Oqvt").arg(address.as_str()).arg(&symbol);
        let output = command.output().await.map_err(|source| Error::ToolSpawn {
            tool: self.config.snmpget.clone(),
            source,
        })?;

        let stdout = classify_output(
            &address,
            &self.config.snmpget,
            output.status.success(),
            output.status.code(),
            &output.stdout,
            &output.stderr,
        )
        .and_then(|stdout| {
            stdout.ok_or_else(|| Error::ToolFailure {
                address: address.to_string(),
                tool: self.config.snmpget.clone(),
                status: output.status.code(),
                stderr: format!("no value returned for {symbol}"),
            })
        })
        .inspect_err(|error| {
            warn!(
                target: targets::SNMP,
                address = %address,
                error = %error.technical_detail(),
                "SNMP GET failed"
            );
        })?;

        let value = SnmpValue::from_cli_text(&stdout);
        trace!(
            target: targets::SNMP,
            address = %address,
            oid = %symbol,
            value = %value,
            "SNMP value"
        );
        Ok(value)
    }

    fn command(&self, program: &str, version: SnmpVersion) -> Command {
        let mut command = Command::new(program);
        command
            .env("MIBS", self.config.mibs.search_list())
            .args(common_args(&self.config, version))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

/// Options shared by `snmpwalk` and `snmpget`. `-t` and `-r` only appear
/// when configured, so the tools keep their own defaults otherwise.
pub(crate) fn common_args(config: &SnmpConfig, version: SnmpVersion) -> Vec<String> {
    let mut args = vec![
        "-v".to_string(),
        version.as_cli_arg().to_string(),
        "-c".to_string(),
        config.community.clone(),
        "-M".to_string(),
        format!("{}/", config.mibs.dir().display()),
        "-m".to_string(),
        "all".to_string(),
    ];
    if let Some(timeout) = config.timeout {
        args.push("-t".to_string());
        args.push(timeout.as_secs_f64().to_string());
    }
    if let Some(retries) = config.retries {
        args.push("-r".to_string());
        args.push(retries.to_string());
    }
    args
}

impl SnmpClient for NetSnmpClient {
    fn walk<'a>(&'a self, request: SnmpWalkRequest) -> SnmpFuture<'a, Vec<String>> {
        Box::pin(async move { NetSnmpClient::walk(self, request).await })
    }

    fn get<'a>(&'a self, request: SnmpGetRequest) -> SnmpFuture<'a, SnmpValue> {
        Box::pin(async move { NetSnmpClient::get(self, request).await })
    }
}

/// Sorts a finished tool run into stdout, silence, or an error.
///
/// A non-zero exit with nothing on stderr yields `Ok(None)`. The tools exit
/// that way when the table is simply empty.
pub(crate) fn classify_output(
    address: &DeviceAddress,
    tool: &str,
    success: bool,
    status: Option<i32>,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<Option<String>, Error> {
    if success {
        return Ok(Some(String::from_utf8_lossy(stdout).into_owned()));
    }

    let stderr = String::from_utf8_lossy(stderr);
    if stderr.trim().is_empty() {
        return Ok(None);
    }
    if stderr.contains("Unknown host") {
        return Err(Error::UnknownHost {
            address: address.to_string(),
        });
    }
    Err(Error::ToolFailure {
        address: address.to_string(),
        tool: tool.to_string(),
        status,
        stderr: stderr.into_owned(),
    })
}

/// Keeps the non-empty lines that carry `<name>.`; `max_results == 0` means
/// no limit.
pub(crate) fn filter_walk_lines(stdout: &str, name: &str, max_results: usize) -> Vec<String> {
    let marker = format!("{name}.");
    let limit = if max_results == 0 {
        usize::MAX
    } else {
        max_results
    };
    stdout
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty() && line.contains(&marker))
        .take(limit)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::snmp::MibPaths;

    fn config() -> SnmpConfig {
        SnmpConfig {
            mibs: MibPaths::new("/opt/printalert/mibs"),
            ..SnmpConfig::default()
        }
    }

    fn device() -> DeviceAddress {
        DeviceAddress::new("kopi1.example.org")
    }

    #[test]
    fn success_returns_stdout() {
        let result = classify_output(&device(), "snmpwalk", true, Some(0), b"abc\n", b"");
        assert_eq!(result.expect("ok").as_deref(), Some("abc\n"));
    }

    #[test]
    fn silent_failure_means_no_output() {
        let result = classify_output(&device(), "snmpwalk", false, Some(1), b"", b"  \n");
        assert!(result.expect("ok").is_none());
    }

    #[test]
    fn unknown_host_is_detected() {
        let stderr = b"snmpwalk: Unknown host (kopi1.example.org) (Name or service not known)\n";
        let error = classify_output(&device(), "snmpwalk", false, Some(1), b"", stderr)
            .expect_err("error");
        assert!(matches!(error, Error::UnknownHost { .. }));
    }

    #[test]
    fn other_diagnostics_are_tool_failures() {
        let stderr = b"Timeout: No Response from kopi1.example.org\n";
        let error = classify_output(&device(), "snmpwalk", false, Some(1), b"", stderr)
            .expect_err("error");
        match error {
            Error::ToolFailure { tool, stderr, status, .. } => {
                assert_eq!(tool, "snmpwalk");
                assert_eq!(status, Some(1));
                assert!(stderr.starts_with("Timeout"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn walk_output_is_filtered_to_alert_descriptions() {
        let stdout = "Printer-MIB::prtAlertDescription.1.1 = STRING: \"Toner low: Cyan {12}\"\n\
                      \n\
                      SNMPv2-MIB::sysDescr.0 = STRING: printer\n\
                      Printer-MIB::prtAlertDescription.1.4 = STRING: \"Paper Jam {3}\"\n";
        let lines = filter_walk_lines(stdout, "prtAlertDescription", 0);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("\"Paper Jam {3}\""));
        assert_eq!(filter_walk_lines(stdout, "prtAlertDescription", 1).len(), 1);
    }

    #[test]
    fn tool_defaults_are_kept_when_unset() {
        let args = common_args(&config(), SnmpVersion::V2c);
        assert_eq!(
            args,
            vec!["-v", "2c", "-c", "public", "-M", "/opt/printalert/mibs/", "-m", "all"]
        );
    }

    #[test]
    fn configured_timeout_keeps_fractional_seconds() {
        let mut config = config();
        config.timeout = Some(Duration::from_millis(1500));
        config.retries = Some(0);
        let args = common_args(&config, SnmpVersion::V1);
        assert_eq!(&args[..2], ["-v", "1"]);
        assert_eq!(&args[8..], ["-t", "1.5", "-r", "0"]);

        config.timeout = Some(Duration::from_millis(250));
        config.retries = None;
        let args = common_args(&config, SnmpVersion::V1);
        assert_eq!(&args[8..], ["-t", "0.25"]);
    }
}
