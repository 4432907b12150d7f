pub mod alerts;
pub mod config;
pub mod error;
pub mod ignore;
pub mod model;
pub mod native;
pub mod netsnmp;
pub mod poll;
pub mod report;
pub mod snmp;
pub mod targets;

pub use alerts::{parse_walk_line, strip_severity, AlertResolver, WalkEntry};
pub use config::{AppConfig, Backend, FileConfig};
pub use error::Error;
pub use ignore::{default_ignore_tags, IgnoreList, DEFAULT_IGNORE};
pub use model::{
    elapsed_since, format_elapsed, Alert, AlertIndex, DeviceAddress, Ticks, TICKS_PER_SECOND,
};
pub use native::SnmpV2cClient;
pub use netsnmp::NetSnmpClient;
pub use poll::{check_device, fetch_alert_lines};
pub use report::{run, PollOptions, Report};
pub use snmp::{
    MibObject, MibPaths, MockSnmpClient, ObjectInstance, Oid, OidParseError, SnmpClient,
    SnmpConfig, SnmpFuture, SnmpGetRequest, SnmpValue, SnmpVersion, SnmpWalkRequest,
    DEFAULT_RETRIES, DEFAULT_TIMEOUT, PRT_ALERT_DESCRIPTION, PRT_ALERT_TIME, SYS_UP_TIME_INSTANCE,
};
