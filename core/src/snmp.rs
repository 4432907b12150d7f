use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{AlertIndex, DeviceAddress, Ticks};
use crate::Error;

pub const PRINTER_MIB_FILE: &str = "Printer-MIB.my";
pub const EVENT_MIB_FILE: &str = "DISMAN-EVENT-MIB.txt";

/// A named MIB object together with its numeric OID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MibObject {
    pub module: &'static str,
    pub name: &'static str,
    pub oid: &'static [u32],
}

impl MibObject {
    pub fn symbol(&self) -> String {
        format!("{}::{}", self.module, self.name)
    }

    pub fn oid(&self) -> Oid {
        Oid::from_slice(self.oid)
    }
}

pub const PRT_ALERT_DESCRIPTION: MibObject = MibObject {
    module: "Printer-MIB",
    name: "prtAlertDescription",
    oid: &[1, 3, 6, 1, 2, 1, 43, 18, 1, 1, 8],
};

pub const PRT_ALERT_TIME: MibObject = MibObject {
    module: "Printer-MIB",
    name: "prtAlertTime",
    oid: &[1, 3, 6, 1, 2, 1, 43, 18, 1, 1, 9],
};

pub const SYS_UP_TIME_INSTANCE: MibObject = MibObject {
    module: "DISMAN-EVENT-MIB",
    name: "sysUpTimeInstance",
    oid: &[1, 3, 6, 1, 2, 1, 1, 3, 0],
};

/// One concrete instance to fetch with a GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInstance {
    pub object: MibObject,
    pub index: Option<AlertIndex>,
}

impl ObjectInstance {
    pub fn scalar(object: MibObject) -> Self {
        Self {
            object,
            index: None,
        }
    }

    pub fn alert(object: MibObject, index: AlertIndex) -> Self {
        Self {
            object,
            index: Some(index),
        }
    }

    pub fn symbol(&self) -> String {
        match self.index {
            Some(index) => format!("{}.{index}", self.object.symbol()),
            None => self.object.symbol(),
        }
    }

    pub fn oid(&self) -> Oid {
        let mut arcs = self.object.oid.to_vec();
        if let Some(index) = self.index {
            arcs.extend(index.arcs());
        }
        Oid(arcs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnmpVersion {
    V1,
    V2c,
}

impl SnmpVersion {
    pub fn as_cli_arg(self) -> &'static str {
        match self {
            SnmpVersion::V1 => "1",
            SnmpVersion::V2c => "2c",
        }
    }
}

/// Location of the two MIB definition files handed to the SNMP tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MibPaths {
    dir: PathBuf,
}

impl MibPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<exe_dir>/../mibs`, falling back to `./mibs` when the executable
    /// path is not available.
    pub fn beside_executable() -> Self {
        let dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().and_then(Path::parent).map(Path::to_path_buf))
            .map(|root| root.join("mibs"))
            .unwrap_or_else(|| PathBuf::from("mibs"));
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn printer_mib(&self) -> PathBuf {
        self.dir.join(PRINTER_MIB_FILE)
    }

    pub fn event_mib(&self) -> PathBuf {
        self.dir.join(EVENT_MIB_FILE)
    }

    /// MIB files that are not present on disk.
    pub fn missing(&self) -> Vec<PathBuf> {
        [self.printer_mib(), self.event_mib()]
            .into_iter()
            .filter(|path| !path.is_file())
            .collect()
    }

    /// Colon separated, as net-snmp expects in `MIBS`.
    pub fn search_list(&self) -> String {
        format!(
            "{}:{}",
            self.printer_mib().display(),
            self.event_mib().display()
        )
    }
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_RETRIES: u32 = 1;

/// `timeout` and `retries` left at `None` mean "tool default" for net-snmp
/// and [`DEFAULT_TIMEOUT`] / [`DEFAULT_RETRIES`] for the native backend.
#[derive(Debug, Clone)]
pub struct SnmpConfig {
    pub community: String,
    pub walk_version: SnmpVersion,
    pub get_version: SnmpVersion,
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
    pub mibs: MibPaths,
    pub snmpwalk: String,
    pub snmpget: String,
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            community: "public".to_string(),
            walk_version: SnmpVersion::V2c,
            get_version: SnmpVersion::V1,
            timeout: None,
            retries: None,
            mibs: MibPaths::beside_executable(),
            snmpwalk: "snmpwalk".to_string(),
            snmpget: "snmpget".to_string(),
        }
    }
}

impl SnmpConfig {
    pub fn request_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn request_retries(&self) -> u32 {
        self.retries.unwrap_or(DEFAULT_RETRIES)
    }
}

#[derive(Debug, Clone)]
pub struct SnmpGetRequest {
    pub address: DeviceAddress,
    pub instance: ObjectInstance,
}

impl SnmpGetRequest {
    pub fn new(address: DeviceAddress, instance: ObjectInstance) -> Self {
        Self { address, instance }
    }
}

#[derive(Debug, Clone)]
pub struct SnmpWalkRequest {
    pub address: DeviceAddress,
    pub object: MibObject,
    /// Upper bound on returned rows; `0` means unbounded.
    pub max_results: usize,
}

impl SnmpWalkRequest {
    pub fn new(address: DeviceAddress, object: MibObject) -> Self {
        Self {
            address,
            object,
            max_results: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Oid(pub Vec<u32>);

impl Oid {
    pub fn from_slice(slice: &[u32]) -> Self {
        Self(slice.to_vec())
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn is_descendant_of(&self, root: &Oid) -> bool {
        let root = root.as_slice();
        self.0.len() > root.len() && self.0[..root.len()] == root[..]
    }

    /// Arcs following `root`, or an empty slice when this OID is not below it.
    pub fn suffix_after(&self, root: &Oid) -> &[u32] {
        if self.is_descendant_of(root) {
            &self.0[root.0.len()..]
        } else {
            &[]
        }
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            first = false;
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidParseError {
    pub component: String,
}

impl fmt::Display for OidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid OID component: {}", self.component)
    }
}

impl std::error::Error for OidParseError {}

impl FromStr for Oid {
    type Err = OidParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = Vec::new();
        for part in value.split('.') {
            if part.is_empty() {
                continue;
            }
            let parsed = part.parse::<u32>().map_err(|_| OidParseError {
                component: part.to_string(),
            })?;
            parts.push(parsed);
        }

        if parts.is_empty() {
            return Err(OidParseError {
                component: value.to_string(),
            });
        }

        Ok(Oid(parts))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnmpValue {
    Null,
    Integer(i64),
    Unsigned32(u32),
    Counter32(u32),
    Counter64(u64),
    Timeticks(u32),
    OctetString(Vec<u8>),
    ObjectIdentifier(Oid),
    IpAddress([u8; 4]),
    Opaque(Vec<u8>),
    Other(String),
}

impl SnmpValue {
    /// Parses a value printed by `snmpget -Oqvt`: quoted strings become
    /// octet strings, bare numbers become integers, and runs of hex pairs
    /// (how net-snmp prints non-printable strings) are decoded to bytes.
    pub fn from_cli_text(text: &str) -> Self {
        let text = text.trim();
        if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
            return SnmpValue::OctetString(text[1..text.len() - 1].as_bytes().to_vec());
        }
        if let Ok(value) = text.parse::<i64>() {
            return SnmpValue::Integer(value);
        }
        if text.starts_with("No Such") || text.starts_with("No more variables") {
            return SnmpValue::Other(text.to_string());
        }
        if let Some(bytes) = decode_hex_pairs(text) {
            return SnmpValue::OctetString(bytes);
        }
        SnmpValue::OctetString(text.as_bytes().to_vec())
    }

    pub fn as_ticks(&self) -> Option<Ticks> {
        match self {
            SnmpValue::Timeticks(value) => Some(u64::from(*value)),
            SnmpValue::Unsigned32(value) => Some(u64::from(*value)),
            SnmpValue::Counter32(value) => Some(u64::from(*value)),
            SnmpValue::Counter64(value) => Some(*value),
            SnmpValue::Integer(value) => (*value >= 0).then_some(*value as u64),
            _ => None,
        }
    }

    pub fn as_text_lossy(&self) -> Option<String> {
        match self {
            SnmpValue::OctetString(bytes) | SnmpValue::Opaque(bytes) => Some(decode_text(bytes)),
            _ => None,
        }
    }
}

/// `4D 6F 64 ...` to bytes. Line breaks between pairs are allowed, anything
/// else rejects the whole text.
fn decode_hex_pairs(text: &str) -> Option<Vec<u8>> {
    let mut bytes = Vec::new();
    for pair in text.split_whitespace() {
        if pair.len() != 2 {
            return None;
        }
        bytes.push(u8::from_str_radix(pair, 16).ok()?);
    }
    (!bytes.is_empty()).then_some(bytes)
}

/// UTF-8 when valid, otherwise Latin-1, which is what printers that do not
/// speak UTF-8 put in their alert strings.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|byte| char::from(*byte)).collect(),
    }
}

impl fmt::Display for SnmpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnmpValue::Null => f.write_str("null"),
            SnmpValue::Integer(value) => write!(f, "{value}"),
            SnmpValue::Unsigned32(value) => write!(f, "{value}"),
            SnmpValue::Counter32(value) => write!(f, "{value}"),
            SnmpValue::Counter64(value) => write!(f, "{value}"),
            SnmpValue::Timeticks(value) => write!(f, "{value} ticks"),
            SnmpValue::OctetString(bytes) | SnmpValue::Opaque(bytes) => {
                f.write_str(&decode_text(bytes))
            }
            SnmpValue::ObjectIdentifier(oid) => write!(f, "{oid}"),
            SnmpValue::IpAddress(bytes) => {
                write!(f, "{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
            }
            SnmpValue::Other(value) => f.write_str(value),
        }
    }
}

pub type SnmpFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

/// Access to a printer's SNMP agent.
///
/// `walk` yields one text line per varbind, shaped like `snmpwalk` output
/// (`Printer-MIB::prtAlertDescription.1.3 = STRING: "..."`), so the alert
/// parser never needs to know which backend produced it.
pub trait SnmpClient: Send + Sync {
    fn walk<'a>(&'a self, request: SnmpWalkRequest) -> SnmpFuture<'a, Vec<String>>;

    fn get<'a>(&'a self, request: SnmpGetRequest) -> SnmpFuture<'a, SnmpValue>;
}

/// Scripted client for tests. Walk results are queued per address, GET
/// values are keyed by address and instance symbol. Every request is logged.
#[derive(Debug, Clone, Default)]
pub struct MockSnmpClient {
    walks: Arc<Mutex<HashMap<String, VecDeque<Result<Vec<String>, Error>>>>>,
    values: Arc<Mutex<HashMap<(String, String), SnmpValue>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockSnmpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_walk(&self, address: &str, lines: Vec<String>) {
        self.push_walk_result(address, Ok(lines));
    }

    pub fn push_walk_error(&self, address: &str, error: Error) {
        self.push_walk_result(address, Err(error));
    }

    fn push_walk_result(&self, address: &str, result: Result<Vec<String>, Error>) {
        if let Ok(mut walks) = self.walks.lock() {
            walks
                .entry(address.to_string())
                .or_default()
                .push_back(result);
        }
    }

    pub fn set_value(&self, address: &str, instance: ObjectInstance, value: SnmpValue) {
        if let Ok(mut values) = self.values.lock() {
            values.insert((address.to_string(), instance.symbol()), value);
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn record(&self, entry: String) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(entry);
        }
    }
}

impl SnmpClient for MockSnmpClient {
    fn walk<'a>(&'a self, request: SnmpWalkRequest) -> SnmpFuture<'a, Vec<String>> {
        Box::pin(async move {
            let address = request.address.to_string();
            self.record(format!("walk {address} {}", request.object.symbol()));
            let next = self
                .walks
                .lock()
                .ok()
                .and_then(|mut walks| walks.get_mut(&address).and_then(VecDeque::pop_front));
            next.unwrap_or_else(|| {
                Err(Error::SnmpFailure {
                    address,
                    details: "MockSnmpClient has no walk scripted".to_string(),
                })
            })
        })
    }

    fn get<'a>(&'a self, request: SnmpGetRequest) -> SnmpFuture<'a, SnmpValue> {
        Box::pin(async move {
            let address = request.address.to_string();
            let symbol = request.instance.symbol();
            self.record(format!("get {address} {symbol}"));
            let value = self
                .values
                .lock()
                .ok()
                .and_then(|values| values.get(&(address.clone(), symbol.clone())).cloned());
            value.ok_or_else(|| Error::SnmpFailure {
                address,
                details: format!("MockSnmpClient has no value for {symbol}"),
            })
        })
    }
}

#[cfg(test)]
pub(crate) fn run_future<T>(future: impl Future<Output = T>) -> T {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");
    runtime.block_on(future)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid_parses_and_formats() {
        let oid: Oid = "1.3.6.1.2.1.1.3.0".parse().expect("parse oid");
        assert_eq!(oid.to_string(), "1.3.6.1.2.1.1.3.0");
        assert_eq!(oid, SYS_UP_TIME_INSTANCE.oid());
    }

    #[test]
    fn instance_symbols_and_oids() {
        let instance = ObjectInstance::alert(PRT_ALERT_TIME, AlertIndex::new(1, 3));
        assert_eq!(instance.symbol(), "Printer-MIB::prtAlertTime.1.3");
        assert_eq!(instance.oid().to_string(), "1.3.6.1.2.1.43.18.1.1.9.1.3");
        assert_eq!(
            ObjectInstance::scalar(SYS_UP_TIME_INSTANCE).symbol(),
            "DISMAN-EVENT-MIB::sysUpTimeInstance"
        );
    }

    #[test]
    fn suffix_after_root() {
        let root = PRT_ALERT_DESCRIPTION.oid();
        let oid: Oid = "1.3.6.1.2.1.43.18.1.1.8.1.12".parse().expect("oid");
        assert_eq!(oid.suffix_after(&root), &[1, 12]);
        assert!(SYS_UP_TIME_INSTANCE.oid().suffix_after(&root).is_empty());
    }

    #[test]
    fn mib_search_list_is_colon_separated() {
        let mibs = MibPaths::new("/opt/printalert/mibs");
        assert_eq!(
            mibs.search_list(),
            "/opt/printalert/mibs/Printer-MIB.my:/opt/printalert/mibs/DISMAN-EVENT-MIB.txt"
        );
    }

    #[test]
    fn missing_mib_files_are_listed() {
        let mibs = MibPaths::new("/nonexistent/printalert/mibs");
        assert_eq!(mibs.missing(), vec![mibs.printer_mib(), mibs.event_mib()]);
    }

    #[test]
    fn cli_values_parse() {
        assert_eq!(SnmpValue::from_cli_text("1500\n").as_ticks(), Some(1500));
        assert_eq!(
            SnmpValue::from_cli_text("\"Paper Jam {3}\"").as_text_lossy().as_deref(),
            Some("Paper Jam {3}")
        );
        assert!(matches!(
            SnmpValue::from_cli_text("No Such Instance currently exists at this OID"),
            SnmpValue::Other(_)
        ));
        assert_eq!(SnmpValue::Integer(-4).as_ticks(), None);
    }

    #[test]
    fn hex_string_output_is_decoded() {
        let value = SnmpValue::from_cli_text(
            "4D 6F 64 75 73 20 66 6F 72 20 6C 61 76 74 20 73 \n74 72 F8 6D 20 7B 31 7D \n",
        );
        assert_eq!(
            value.as_text_lossy().as_deref(),
            Some("Modus for lavt str\u{f8}m {1}")
        );
        assert_eq!(
            SnmpValue::from_cli_text("50 61 70 65 72").as_text_lossy().as_deref(),
            Some("Paper")
        );
    }

    #[test]
    fn plain_text_is_not_mistaken_for_hex() {
        assert_eq!(
            SnmpValue::from_cli_text("Cover open").as_text_lossy().as_deref(),
            Some("Cover open")
        );
        assert_eq!(
            SnmpValue::from_cli_text("AB CDE").as_text_lossy().as_deref(),
            Some("AB CDE")
        );
    }

    #[test]
    fn default_config_leaves_tool_timeouts_unset() {
        let config = SnmpConfig::default();
        assert_eq!(config.timeout, None);
        assert_eq!(config.retries, None);
        assert_eq!(config.request_timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.request_retries(), DEFAULT_RETRIES);
    }

    #[test]
    fn mock_returns_scripted_walk_and_logs_requests() {
        let mock = MockSnmpClient::new();
        mock.push_walk("p1", vec!["line".to_string()]);
        let request = SnmpWalkRequest::new(DeviceAddress::new("p1"), PRT_ALERT_DESCRIPTION);
        let lines = run_future(mock.walk(request)).expect("walk");
        assert_eq!(lines, vec!["line".to_string()]);
        assert_eq!(
            mock.requests(),
            vec!["walk p1 Printer-MIB::prtAlertDescription".to_string()]
        );
    }

    #[test]
    fn mock_missing_value_is_an_error() {
        let mock = MockSnmpClient::new();
        let request = SnmpGetRequest::new(
            DeviceAddress::new("p1"),
            ObjectInstance::scalar(SYS_UP_TIME_INSTANCE),
        );
        let error = run_future(mock.get(request)).expect_err("expected error");
        match error {
            Error::SnmpFailure { address, .. } => assert_eq!(address, "p1"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
