pub const SNMP: &str = "printalert::snmp";
pub const POLL: &str = "printalert::poll";
pub const ALERTS: &str = "printalert::alerts";
pub const CONFIG: &str = "printalert::config";
pub const REPORT: &str = "printalert::report";
