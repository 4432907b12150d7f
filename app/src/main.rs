mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use printalert_core::{
    run, targets, AppConfig, Backend, DeviceAddress, Error, FileConfig, MibPaths, SnmpClient,
};

use crate::logging::{init_logging, LogLevel};

const USAGE: &str = "Usage: printalert <printer_address>...";

/// Report active alerts on network printers over SNMP.
#[derive(Debug, Parser)]
#[command(name = "printalert", version, about)]
struct Args {
    /// Printer hostnames or IP addresses.
    #[arg(value_name = "PRINTER_ADDRESS")]
    addresses: Vec<String>,

    /// RON config file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    #[arg(long)]
    community: Option<String>,

    /// Directory holding Printer-MIB.my (RFC 3805) and DISMAN-EVENT-MIB.txt
    /// (RFC 2981). Defaults to `../mibs` next to the executable.
    #[arg(long, value_name = "DIR")]
    mibs_dir: Option<PathBuf>,

    /// Per-request timeout. Unset keeps the net-snmp tool default.
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Unset keeps the net-snmp tool default.
    #[arg(long)]
    retries: Option<u32>,

    /// Poll all printers at once. Output order stays the argument order.
    #[arg(long)]
    parallel: bool,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    NetSnmp,
    Native,
}

impl From<BackendArg> for Backend {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::NetSnmp => Backend::NetSnmp,
            BackendArg::Native => Backend::Native,
        }
    }
}

impl Args {
    fn app_config(&self) -> Result<AppConfig, Error> {
        let mut config = AppConfig::default();
        if let Some(path) = &self.config {
            config.apply_file(FileConfig::load(path)?);
        }
        if let Some(backend) = self.backend {
            config.backend = backend.into();
        }
        if let Some(community) = &self.community {
            config.snmp.community = community.clone();
        }
        if let Some(dir) = &self.mibs_dir {
            config.snmp.mibs = MibPaths::new(dir);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.snmp.timeout = Some(Duration::from_millis(timeout_ms));
        }
        if let Some(retries) = self.retries {
            config.snmp.retries = Some(retries);
        }
        if self.parallel {
            config.poll.parallel = true;
        }
        Ok(config)
    }
}

/// How a run ends: what goes to stdout and which exit code follows.
#[derive(Debug)]
enum Outcome {
    Usage,
    Report(Option<String>),
    Aborted(Error),
}

impl Outcome {
    fn exit_code(&self) -> u8 {
        match self {
            Outcome::Report(_) => 0,
            Outcome::Usage => 1,
            Outcome::Aborted(_) => 2,
        }
    }

    fn stdout(&self) -> Option<String> {
        match self {
            Outcome::Usage => Some(format!("{USAGE}\n")),
            Outcome::Report(text) => text.clone(),
            Outcome::Aborted(_) => None,
        }
    }
}

impl From<Result<Option<String>, Error>> for Outcome {
    fn from(result: Result<Option<String>, Error>) -> Self {
        match result {
            Ok(text) => Outcome::Report(text),
            Err(error) => Outcome::Aborted(error),
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    if !args.addresses.is_empty() {
        init_logging(args.log_level);
        tracing::debug!(target: targets::CONFIG, ?args, "printalert starting");
    }

    let outcome = execute(&args);
    if let Outcome::Aborted(error) = &outcome {
        tracing::error!(
            target: targets::REPORT,
            error = %error.technical_detail(),
            "Run aborted"
        );
        eprintln!("printalert: {}", error.user_summary());
        eprintln!("{}", error.technical_detail());
    }
    if let Some(text) = outcome.stdout() {
        print!("{text}");
    }
    ExitCode::from(outcome.exit_code())
}

fn execute(args: &Args) -> Outcome {
    if args.addresses.is_empty() {
        return Outcome::Usage;
    }
    let config = match args.app_config() {
        Ok(config) => config,
        Err(error) => return Outcome::Aborted(error),
    };
    let client = config.client();
    check_printers(args, &config, client).into()
}

fn check_printers(
    args: &Args,
    config: &AppConfig,
    client: Arc<dyn SnmpClient>,
) -> Result<Option<String>, Error> {
    let ignore = Arc::new(config.ignore_list()?);
    let devices: Vec<DeviceAddress> = args.addresses.iter().map(DeviceAddress::new).collect();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|source| Error::Runtime { source })?;
    let report = runtime.block_on(run(client, ignore, &devices, config.poll))?;
    Ok(report.render())
}
