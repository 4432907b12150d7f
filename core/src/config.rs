use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ignore::{default_ignore_tags, IgnoreList};
use crate::native::SnmpV2cClient;
use crate::netsnmp::NetSnmpClient;
use crate::report::PollOptions;
use crate::snmp::{MibPaths, SnmpClient, SnmpConfig, SnmpVersion};
use crate::{targets, Error};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    /// `snmpwalk` / `snmpget` child processes.
    #[default]
    NetSnmp,
    /// In-process SNMP over UDP.
    Native,
}

/// Contents of an optional RON config file. Every field may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub backend: Option<Backend>,
    pub community: Option<String>,
    pub walk_version: Option<SnmpVersion>,
    pub get_version: Option<SnmpVersion>,
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub mibs_dir: Option<PathBuf>,
    pub snmpwalk: Option<String>,
    pub snmpget: Option<String>,
    pub parallel: Option<bool>,
    pub replace_ignore: bool,
    pub extra_ignore: BTreeMap<String, Vec<String>>,
}

impl FileConfig {
    pub fn parse(text: &str, path: Option<&Path>) -> Result<Self, Error> {
        ron::from_str(text).map_err(|source| Error::Ron {
            path: path.map(|value| value.display().to_string()),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|source| Error::ConfigIo {
            path: Some(path.display().to_string()),
            source,
        })?;
        let config = Self::parse(&text, Some(path))?;
        info!(target: targets::CONFIG, path = %path.display(), "Config file loaded");
        Ok(config)
    }
}

/// Effective settings for a run after defaults, file and flags are merged.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: Backend,
    pub snmp: SnmpConfig,
    pub poll: PollOptions,
    pub ignore: BTreeMap<String, Vec<String>>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            snmp: SnmpConfig::default(),
            poll: PollOptions::default(),
            ignore: default_ignore_tags(),
        }
    }
}

impl AppConfig {
    pub fn apply_file(&mut self, file: FileConfig) {
        let FileConfig {
            backend,
            community,
            walk_version,
            get_version,
            timeout_ms,
            retries,
            mibs_dir,
            snmpwalk,
            snmpget,
            parallel,
            replace_ignore,
            extra_ignore,
        } = file;

        if let Some(backend) = backend {
            self.backend = backend;
        }
        if let Some(community) = community {
            self.snmp.community = community;
        }
        if let Some(version) = walk_version {
            self.snmp.walk_version = version;
        }
        if let Some(version) = get_version {
            self.snmp.get_version = version;
        }
        if let Some(timeout_ms) = timeout_ms {
            self.snmp.timeout = Some(Duration::from_millis(timeout_ms));
        }
        if let Some(retries) = retries {
            self.snmp.retries = Some(retries);
        }
        if let Some(dir) = mibs_dir {
            self.snmp.mibs = MibPaths::new(dir);
        }
        if let Some(program) = snmpwalk {
            self.snmp.snmpwalk = program;
        }
        if let Some(program) = snmpget {
            self.snmp.snmpget = program;
        }
        if let Some(parallel) = parallel {
            self.poll.parallel = parallel;
        }
        if replace_ignore {
            self.ignore.clear();
        }
        for (tag, phrases) in extra_ignore {
            self.ignore.entry(tag).or_default().extend(phrases);
        }
    }

    pub fn ignore_list(&self) -> Result<IgnoreList, Error> {
        IgnoreList::new(self.ignore.clone())
    }

    pub fn client(&self) -> Arc<dyn SnmpClient> {
        debug!(
            target: targets::CONFIG,
            backend = ?self.backend,
            community = %self.snmp.community,
            mibs = %self.snmp.mibs.dir().display(),
            timeout = ?self.snmp.timeout,
            retries = ?self.snmp.retries,
            "SNMP client configured"
        );
        if self.backend == Backend::NetSnmp {
            for path in self.snmp.mibs.missing() {
                warn!(
                    target: targets::CONFIG,
                    path = %path.display(),
                    "MIB file not found, symbolic names will not resolve"
                );
            }
        }
        match self.backend {
            Backend::NetSnmp => Arc::new(NetSnmpClient::new(self.snmp.clone())),
            Backend::Native => Arc::new(SnmpV2cClient::new(self.snmp.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_keeps_defaults() {
        let file = FileConfig::parse("()", None).expect("parse");
        let mut config = AppConfig::default();
        config.apply_file(file);
        assert_eq!(config.backend, Backend::NetSnmp);
        assert_eq!(config.snmp.community, "public");
        assert_eq!(config.snmp.walk_version, SnmpVersion::V2c);
        assert_eq!(config.snmp.get_version, SnmpVersion::V1);
        assert!(!config.poll.parallel);
        assert_eq!(config.ignore, default_ignore_tags());
    }

    #[test]
    fn file_overrides_and_extends() {
        let text = r#"(
            backend: Some(Native),
            community: Some("printers"),
            timeout_ms: Some(500),
            mibs_dir: Some("/usr/share/printalert/mibs"),
            parallel: Some(true),
            extra_ignore: {
                "warm-up": ["kalibrerer"],
                "toner-order": ["toner ordered"],
            },
        )"#;
        let file = FileConfig::parse(text, None).expect("parse");
        let mut config = AppConfig::default();
        config.apply_file(file);

        assert_eq!(config.backend, Backend::Native);
        assert_eq!(config.snmp.community, "printers");
        assert_eq!(config.snmp.timeout, Some(Duration::from_millis(500)));
        assert_eq!(config.snmp.retries, None);
        assert_eq!(
            config.snmp.mibs.printer_mib(),
            PathBuf::from("/usr/share/printalert/mibs/Printer-MIB.my")
        );
        assert!(config.poll.parallel);
        assert!(config.ignore["warm-up"].contains(&"warming up".to_string()));
        assert!(config.ignore["warm-up"].contains(&"kalibrerer".to_string()));

        let ignore = config.ignore_list().expect("ignore list");
        assert!(ignore.matches("Toner ordered by service"));
        assert!(ignore.matches("Kalibrerer"));
    }

    #[test]
    fn replace_ignore_drops_builtin_phrases() {
        let text = r#"(replace_ignore: true, extra_ignore: { "only": ["door open"] })"#;
        let mut config = AppConfig::default();
        config.apply_file(FileConfig::parse(text, None).expect("parse"));
        let ignore = config.ignore_list().expect("ignore list");
        assert!(ignore.matches("Door open"));
        assert!(!ignore.matches("Low: toner"));
    }

    #[test]
    fn invalid_ron_reports_path() {
        let error = FileConfig::parse("(backend: Some(Carrier))", Some(Path::new("cfg.ron")))
            .expect_err("invalid");
        assert!(error.technical_detail().contains("cfg.ron"));
    }

    #[test]
    fn missing_file_is_config_io_error() {
        let error = FileConfig::load(Path::new("/nonexistent/printalert.ron")).expect_err("missing");
        assert!(matches!(error, Error::ConfigIo { .. }));
    }
}
