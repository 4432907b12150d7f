use crate::model::DeviceAddress;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown host {address}")]
    UnknownHost { address: String },
    #[error("{tool} failed for {address}")]
    ToolFailure {
        address: String,
        tool: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("Failed to start {tool}")]
    ToolSpawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("SNMP authentication failed for {address}")]
    SnmpAuth {
        address: String,
        details: Option<String>,
    },
    #[error("SNMP timeout for {address}")]
    SnmpTimeout { address: String, timeout_ms: u64 },
    #[error("SNMP failure for {address}")]
    SnmpFailure { address: String, details: String },
    #[error("Malformed alert line from {address}")]
    MalformedAlertLine { address: String, line: String },
    #[error("Polling task failed for {address}")]
    TaskFailed { address: String, details: String },
    #[error("Async runtime could not start")]
    Runtime {
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid ignore pattern")]
    IgnorePattern { details: String },
    #[error("RON config error")]
    Ron {
        path: Option<String>,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("Config read error")]
    ConfigIo {
        path: Option<String>,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Errors that only affect one printer. They end up as report lines and
    /// polling moves on to the next address.
    pub fn is_device_level(&self) -> bool {
        matches!(
            self,
            Error::UnknownHost { .. }
                | Error::ToolFailure { .. }
                | Error::SnmpAuth { .. }
                | Error::SnmpTimeout { .. }
                | Error::SnmpFailure { .. }
        )
    }

    /// Renders a device-level error the way it appears in the report.
    pub fn report_line(&self, device: &DeviceAddress) -> String {
        let short = device.short_name();
        match self {
            Error::UnknownHost { address } => {
                format!("[{short}] host '{address}' unknown or offline")
            }
            Error::ToolFailure { stderr, .. } => {
                format!("[{short}] unexpected error: '{}'", stderr.trim_end())
            }
            other => format!("[{short}] unexpected error: '{}'", other.technical_detail()),
        }
    }

    pub fn user_summary(&self) -> String {
        match self {
            Error::UnknownHost { address } => format!("Host {address} is unknown or offline."),
            Error::ToolFailure { address, tool, .. } => {
                format!("{tool} reported an error for {address}.")
            }
            Error::ToolSpawn { tool, .. } => format!("Could not run {tool}."),
            Error::SnmpAuth { address, .. } => {
                format!("SNMP authentication failed for {address}.")
            }
            Error::SnmpTimeout { address, .. } => {
                format!("SNMP request timed out for {address}.")
            }
            Error::SnmpFailure { address, .. } => format!("SNMP error for {address}."),
            Error::MalformedAlertLine { address, .. } => {
                format!("Unreadable alert entry from {address}.")
            }
            Error::TaskFailed { address, .. } => format!("Polling {address} failed."),
            Error::Runtime { .. } => "Async runtime could not start.".to_string(),
            Error::IgnorePattern { .. } => "Ignore list could not be compiled.".to_string(),
            Error::Ron { .. } => "Failed to parse configuration file.".to_string(),
            Error::ConfigIo { .. } => "Failed to read configuration file.".to_string(),
        }
    }

    pub fn technical_detail(&self) -> String {
        match self {
            Error::UnknownHost { address } => format!("Unknown host {address}."),
            Error::ToolFailure {
                address,
                tool,
                status,
                stderr,
            } => {
                let status = status
                    .map(|code| format!(" status={code}"))
                    .unwrap_or_default();
                format!("{tool} failed for {address}{status}: {}", stderr.trim_end())
            }
            Error::ToolSpawn { tool, source } => format!("Failed to start {tool}: {source}"),
            Error::SnmpAuth { address, details } => {
                let extra = details
                    .as_ref()
                    .map(|text| format!(" ({text})"))
                    .unwrap_or_default();
                format!("SNMP auth failed for {address}{extra}.")
            }
            Error::SnmpTimeout {
                address,
                timeout_ms,
            } => format!("SNMP timeout after {timeout_ms}ms for {address}."),
            Error::SnmpFailure { address, details } => {
                format!("SNMP failure for {address}: {details}")
            }
            Error::MalformedAlertLine { address, line } => {
                format!("No alert index in line from {address}: {line:?}")
            }
            Error::TaskFailed { address, details } => {
                format!("Polling task for {address} failed: {details}")
            }
            Error::Runtime { source } => format!("Async runtime could not start: {source}"),
            Error::IgnorePattern { details } => format!("Invalid ignore pattern: {details}"),
            Error::Ron { path, source } => {
                let path = path
                    .as_ref()
                    .map(|value| format!(" path={value}."))
                    .unwrap_or_default();
                format!("RON config error.{path} {source}")
            }
            Error::ConfigIo { path, source } => {
                let path = path
                    .as_ref()
                    .map(|value| format!(" path={value}."))
                    .unwrap_or_default();
                format!("Config read error.{path} {source}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_host_renders_short_name() {
        let device = DeviceAddress::new("printer7.example.org");
        let error = Error::UnknownHost {
            address: device.to_string(),
        };
        assert!(error.is_device_level());
        assert_eq!(
            error.report_line(&device),
            "[printer7] host 'printer7.example.org' unknown or offline"
        );
    }

    #[test]
    fn tool_failure_renders_diagnostic() {
        let device = DeviceAddress::new("lab-printer.local");
        let error = Error::ToolFailure {
            address: device.to_string(),
            tool: "snmpwalk".to_string(),
            status: Some(1),
            stderr: "Timeout: No Response from lab-printer.local\n".to_string(),
        };
        assert_eq!(
            error.report_line(&device),
            "[lab-printer] unexpected error: 'Timeout: No Response from lab-printer.local'"
        );
    }

    #[test]
    fn malformed_line_is_fatal() {
        let error = Error::MalformedAlertLine {
            address: "p1".to_string(),
            line: "garbage".to_string(),
        };
        assert!(!error.is_device_level());
        assert!(error.technical_detail().contains("garbage"));
    }
}
