use std::io;
use std::time::Duration;

use snmp2::{AsyncSession, Error as Snmp2Error, Oid as Snmp2Oid, Value as Snmp2Value};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::model::DeviceAddress;
use crate::snmp::{
    MibObject, Oid, SnmpClient, SnmpConfig, SnmpFuture, SnmpGetRequest, SnmpValue, SnmpVersion,
    SnmpWalkRequest,
};
use crate::{targets, Error};

const SNMP_PORT: u16 = 161;

/// Speaks SNMP directly over UDP instead of spawning net-snmp tools.
#[derive(Debug, Clone)]
pub struct SnmpV2cClient {
    config: SnmpConfig,
}

impl SnmpV2cClient {
    pub fn new(config: SnmpConfig) -> Self {
        Self { config }
    }

    pub async fn get(&self, request: SnmpGetRequest) -> Result<SnmpValue, Error> {
        let SnmpGetRequest { address, instance } = request;
        let oid = instance.oid();

        debug!(
            target: targets::SNMP,
            address = %address,
            oid = %oid,
            timeout_ms = duration_ms(self.config.request_timeout()),
            retries = self.config.request_retries(),
            "SNMP GET"
        );

        let result = async {
            let mut session =
                open_session(&address, self.config.get_version, &self.config).await?;
            let snmp_oid = to_snmp2_oid(&address, &oid)?;
            get_with_retries(&mut session, &address, &self.config, &snmp_oid).await
        }
        .await;

        match result {
            Ok(value) => {
                trace!(
                    target: targets::SNMP,
                    address = %address,
                    oid = %oid,
                    value = %value,
                    "SNMP value"
                );
                Ok(value)
            }
            Err(error) => {
                warn!(
                    target: targets::SNMP,
                    address = %address,
                    error = %error.technical_detail(),
                    "SNMP GET failed"
                );
                Err(error)
            }
        }
    }

    pub async fn walk(&self, request: SnmpWalkRequest) -> Result<Vec<String>, Error> {
        let SnmpWalkRequest {
            address,
            object,
            max_results,
        } = request;

        debug!(
            target: targets::SNMP,
            address = %address,
            root = %object.oid(),
            max_results,
            timeout_ms = duration_ms(self.config.request_timeout()),
            retries = self.config.request_retries(),
            "SNMP WALK"
        );

        match async_walk(&address, object, max_results, &self.config).await {
            Ok(lines) => {
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
            Err(error) => {
                warn!(
                    target: targets::SNMP,
                    address = %address,
                    error = %error.technical_detail(),
                    "SNMP WALK failed"
                );
                Err(error)
            }
        }
    }
}

impl SnmpClient for SnmpV2cClient {
    fn walk<'a>(&'a self, request: SnmpWalkRequest) -> SnmpFuture<'a, Vec<String>> {
        Box::pin(async move { SnmpV2cClient::walk(self, request).await })
    }

    fn get<'a>(&'a self, request: SnmpGetRequest) -> SnmpFuture<'a, SnmpValue> {
        Box::pin(async move { SnmpV2cClient::get(self, request).await })
    }
}

async fn async_walk(
    address: &DeviceAddress,
    object: MibObject,
    max_results: usize,
    config: &SnmpConfig,
) -> Result<Vec<String>, Error> {
    let mut session = open_session(address, config.walk_version, config).await?;
    let root_oid = object.oid();
    let mut current = to_snmp2_oid(address, &root_oid)?;
    let mut lines = Vec::new();
    let mut remaining = max_results;
    let request_timeout = config.request_timeout();
    let retries = config.request_retries();
    let timeout_ms = duration_ms(request_timeout);

    loop {
        if max_results > 0 {
            if remaining == 0 {
                break;
            }
            remaining -= 1;
        }

        let mut attempts = 0;
        let pdu = loop {
            match timeout(request_timeout, session.getnext(&current)).await {
                Ok(Ok(pdu)) => break pdu,
                Ok(Err(error)) => {
                    if attempts < retries {
                        attempts += 1;
                        continue;
                    }
                    return Err(map_snmp2_error(address, error));
                }
                Err(_) => {
                    if attempts < retries {
                        attempts += 1;
                        continue;
                    }
                    return Err(Error::SnmpTimeout {
                        address: address.to_string(),
                        timeout_ms,
                    });
                }
            }
        };

        let mut progressed = false;
        for (oid, value) in pdu.varbinds {
            let mapped_oid = map_snmp2_oid(address, &oid);
            if !mapped_oid.is_descendant_of(&root_oid) || oid == current {
                return Ok(lines);
            }
            if let Some(line) = render_walk_line(object, &mapped_oid, &map_snmp2_value(value)) {
                lines.push(line);
            }
            current = oid.to_owned();
            progressed = true;
        }

        if !progressed {
            break;
        }
    }

    Ok(lines)
}

/// Renders a varbind the way `snmpwalk` prints it with the MIBs loaded.
pub(crate) fn render_walk_line(object: MibObject, oid: &Oid, value: &SnmpValue) -> Option<String> {
    let suffix = oid.suffix_after(&object.oid());
    if suffix.is_empty() {
        return None;
    }
    let suffix: Vec<String> = suffix.iter().map(u32::to_string).collect();
    let rendered = match value {
        SnmpValue::OctetString(_) | SnmpValue::Opaque(_) => format!("STRING: \"{value}\""),
        SnmpValue::Other(text) => text.clone(),
        other => format!("{other}"),
    };
    Some(format!("{}.{} = {rendered}", object.symbol(), suffix.join(".")))
}

async fn open_session(
    address: &DeviceAddress,
    version: SnmpVersion,
    config: &SnmpConfig,
) -> Result<AsyncSession, Error> {
    let request_timeout = config.request_timeout();
    let timeout_ms = duration_ms(request_timeout);
    let community = config.community.as_bytes();
    let target = format!("{}:{SNMP_PORT}", address.as_str());
    let session = match version {
        SnmpVersion::V1 => {
            timeout(
                request_timeout,
                AsyncSession::new_v1(target.as_str(), community, 0),
            )
            .await
        }
        SnmpVersion::V2c => {
            timeout(
                request_timeout,
                AsyncSession::new_v2c(target.as_str(), community, 0),
            )
            .await
        }
    };
    match session {
        Ok(Ok(session)) => Ok(session),
        Ok(Err(error)) => Err(map_snmp2_io_error(address, timeout_ms, error)),
        Err(_) => Err(Error::SnmpTimeout {
            address: address.to_string(),
            timeout_ms,
        }),
    }
}

async fn get_with_retries(
    session: &mut AsyncSession,
    address: &DeviceAddress,
    config: &SnmpConfig,
    oid: &Snmp2Oid<'_>,
) -> Result<SnmpValue, Error> {
    let request_timeout = config.request_timeout();
    let retries = config.request_retries();
    let timeout_ms = duration_ms(request_timeout);
    let mut attempts = 0;
    loop {
        match timeout(request_timeout, session.get(oid)).await {
            Ok(Ok(mut pdu)) => {
                return pdu
                    .varbinds
                    .next()
                    .map(|(_, value)| map_snmp2_value(value))
                    .ok_or_else(|| Error::SnmpFailure {
                        address: address.to_string(),
                        details: "empty GET response".to_string(),
                    });
            }
            Ok(Err(error)) => {
                if attempts < retries {
                    attempts += 1;
                    continue;
                }
                return Err(map_snmp2_error(address, error));
            }
            Err(_) => {
                if attempts < retries {
                    attempts += 1;
                    continue;
                }
                return Err(Error::SnmpTimeout {
                    address: address.to_string(),
                    timeout_ms,
                });
            }
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

fn to_snmp2_oid(address: &DeviceAddress, oid: &Oid) -> Result<Snmp2Oid<'static>, Error> {
    let arcs: Vec<u64> = oid.as_slice().iter().map(|value| u64::from(*value)).collect();
    Snmp2Oid::from(arcs.as_slice()).map_err(|error| Error::SnmpFailure {
        address: address.to_string(),
        details: format!("Invalid OID {oid}: {error:?}"),
    })
}

fn is_lookup_failure(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::InvalidInput
    ) || error.to_string().contains("lookup address")
}

fn map_snmp2_io_error(address: &DeviceAddress, timeout_ms: u64, error: io::Error) -> Error {
    if error.kind() == io::ErrorKind::TimedOut {
        Error::SnmpTimeout {
            address: address.to_string(),
            timeout_ms,
        }
    } else if is_lookup_failure(&error) {
        Error::UnknownHost {
            address: address.to_string(),
        }
    } else {
        Error::SnmpFailure {
            address: address.to_string(),
            details: error.to_string(),
        }
    }
}

fn map_snmp2_error(address: &DeviceAddress, error: Snmp2Error) -> Error {
    match error {
        Snmp2Error::CommunityMismatch => Error::SnmpAuth {
            address: address.to_string(),
            details: Some(format!("{error}")),
        },
        other => Error::SnmpFailure {
            address: address.to_string(),
            details: other.to_string(),
        },
    }
}

fn map_snmp2_oid(address: &DeviceAddress, oid: &Snmp2Oid<'_>) -> Oid {
    let Some(iter) = oid.iter() else {
        warn!(
            target: targets::SNMP,
            address = %address,
            "Failed to parse SNMP OID"
        );
        return Oid(Vec::new());
    };

    let mut arcs = Vec::new();
    for arc in iter {
        match u32::try_from(arc) {
            Ok(value) => arcs.push(value),
            Err(_) => {
                warn!(
                    target: targets::SNMP,
                    address = %address,
                    arc = arc,
                    "SNMP OID component out of range"
                );
                return Oid(Vec::new());
            }
        }
    }

    Oid(arcs)
}

fn map_snmp2_value(value: Snmp2Value<'_>) -> SnmpValue {
    match value {
        Snmp2Value::Null => SnmpValue::Null,
        Snmp2Value::Integer(value) => SnmpValue::Integer(value),
        Snmp2Value::OctetString(value) => SnmpValue::OctetString(value.to_vec()),
        Snmp2Value::ObjectIdentifier(value) => match value.iter() {
            Some(iter) => SnmpValue::ObjectIdentifier(Oid(
                iter.filter_map(|arc| u32::try_from(arc).ok()).collect(),
            )),
            None => SnmpValue::Other("ObjectIdentifier".to_string()),
        },
        Snmp2Value::IpAddress(value) => SnmpValue::IpAddress(value),
        Snmp2Value::Counter32(value) => SnmpValue::Counter32(value),
        Snmp2Value::Unsigned32(value) => SnmpValue::Unsigned32(value),
        Snmp2Value::Timeticks(value) => SnmpValue::Timeticks(value),
        Snmp2Value::Counter64(value) => SnmpValue::Counter64(value),
        Snmp2Value::Opaque(value) => SnmpValue::Opaque(value.to_vec()),
        Snmp2Value::EndOfMibView => SnmpValue::Other("EndOfMibView".to_string()),
        Snmp2Value::NoSuchObject => SnmpValue::Other("NoSuchObject".to_string()),
        Snmp2Value::NoSuchInstance => SnmpValue::Other("NoSuchInstance".to_string()),
        Snmp2Value::Sequence(_) => SnmpValue::Other("Sequence".to_string()),
        Snmp2Value::Set(_) => SnmpValue::Other("Set".to_string()),
        Snmp2Value::Constructed(tag, _) => SnmpValue::Other(format!("Constructed({tag})")),
        Snmp2Value::GetRequest(_) => SnmpValue::Other("GetRequest".to_string()),
        Snmp2Value::GetNextRequest(_) => SnmpValue::Other("GetNextRequest".to_string()),
        Snmp2Value::GetBulkRequest(_) => SnmpValue::Other("GetBulkRequest".to_string()),
        Snmp2Value::Response(_) => SnmpValue::Other("Response".to_string()),
        Snmp2Value::SetRequest(_) => SnmpValue::Other("SetRequest".to_string()),
        Snmp2Value::InformRequest(_) => SnmpValue::Other("InformRequest".to_string()),
        Snmp2Value::Trap(_) => SnmpValue::Other("Trap".to_string()),
        Snmp2Value::Report(_) => SnmpValue::Other("Report".to_string()),
        Snmp2Value::Boolean(value) => SnmpValue::Other(format!("Boolean({value})")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snmp::PRT_ALERT_DESCRIPTION;

    #[test]
    fn renders_walk_line_like_snmpwalk() {
        let oid: Oid = "1.3.6.1.2.1.43.18.1.1.8.1.3".parse().expect("oid");
        let value = SnmpValue::OctetString(b"Paper Jam {3}".to_vec());
        assert_eq!(
            render_walk_line(PRT_ALERT_DESCRIPTION, &oid, &value).as_deref(),
            Some("Printer-MIB::prtAlertDescription.1.3 = STRING: \"Paper Jam {3}\"")
        );
    }

    #[test]
    fn latin1_descriptions_render_readably() {
        let oid: Oid = "1.3.6.1.2.1.43.18.1.1.8.1.7".parse().expect("oid");
        let value = SnmpValue::OctetString(b"Lavt str\xF8m {1}".to_vec());
        assert_eq!(
            render_walk_line(PRT_ALERT_DESCRIPTION, &oid, &value).as_deref(),
            Some("Printer-MIB::prtAlertDescription.1.7 = STRING: \"Lavt str\u{f8}m {1}\"")
        );
    }

    #[test]
    fn skips_varbinds_outside_root() {
        let oid: Oid = "1.3.6.1.2.1.1.3.0".parse().expect("oid");
        assert!(render_walk_line(PRT_ALERT_DESCRIPTION, &oid, &SnmpValue::Null).is_none());
    }

    #[test]
    fn lookup_failures_become_unknown_host() {
        let address = DeviceAddress::new("nowhere.invalid");
        let error = io::Error::other("failed to lookup address information: Name or service not known");
        assert!(matches!(
            map_snmp2_io_error(&address, 2000, error),
            Error::UnknownHost { .. }
        ));
        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "timed out");
        assert!(matches!(
            map_snmp2_io_error(&address, 2000, timed_out),
            Error::SnmpTimeout { timeout_ms: 2000, .. }
        ));
    }
}
