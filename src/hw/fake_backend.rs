use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use strum_macros::{Display, EnumString};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace};

use super::model::{CharacteristicInfo, CharacteristicRef, PeripheralIdentity, ServiceInfo};
use super::transport::{
    AttemptId, ConnectionState, EventSender, Permission, ScanFailure, ScanId, ScanStrategy,
    ScanTicket, Transport, TransportEvent,
};
use crate::error::{FixtureError, InteractionError};
use crate::protocol::{self, EndpointId};

const DEFAULT_NOTIFICATIONS: [&[u8]; 2] = [
    b"bird, 1, 45.421500, -75.697200",
    b"drone, 2, 45.422000, -75.698000",
];

/// Parsed fake scan fixture records.
#[derive(Debug, Clone, Default, derive_more::Into)]
pub(crate) struct ScanFixture {
    devices: Vec<PeripheralIdentity>,
}

impl FromStr for ScanFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let devices = parse_scan_fixture(value)?;
        Ok(Self { devices })
    }
}

/// Parsed fake notification payload fixtures.
#[derive(Debug, Clone, derive_more::Into)]
pub(crate) struct NotificationPayloads {
    payloads: Vec<Vec<u8>>,
}

impl FromStr for NotificationPayloads {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let payloads = parse_notifications(value)?;
        Ok(Self { payloads })
    }
}

/// Scan failure codes the fake reports, one per scan start.
#[derive(Debug, Clone, Default, derive_more::Into)]
pub(crate) struct ScanFailureQueue {
    failures: Vec<ScanFailure>,
}

impl FromStr for ScanFailureQueue {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let failures = value
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(|code| {
                code.parse::<i32>()
                    .map(ScanFailure::from_code)
                    .map_err(|_error| FixtureError::InvalidScanFailureCode {
                        value: code.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { failures })
    }
}

/// GATT layouts the fake peripheral can expose.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum GattFixture {
    /// A battery notifier followed by Location and Navigation / Location and Speed.
    #[default]
    LocationNavigation,
    /// A vendor service with a write characteristic and a notify characteristic.
    GenericNotify,
    /// A vendor service whose only pushing characteristic indicates.
    IndicateOnly,
    /// Location and Speed without a configuration descriptor.
    NotifyWithoutDescriptor,
    /// Only readable characteristics.
    NoNotify,
}

/// One operation a transport was asked to perform.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TransportCall {
    RadioCheck,
    StartScan { strategy: ScanStrategy },
    StopScan,
    Connect { address: String },
    DiscoverServices,
    SetNotification { uuid: String, enabled: bool },
    WriteDescriptor { uuid: String, value: Vec<u8> },
    Disconnect,
    Close,
}

/// Shared record of calls made to a fake transport.
#[derive(Debug, Clone, Default)]
pub struct FakeCallLog {
    calls: Arc<Mutex<Vec<TransportCall>>>,
}

impl FakeCallLog {
    /// Returns every call made so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, call: TransportCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

/// Settings for constructing a fake transport.
#[derive(Debug, Builder)]
pub(crate) struct FakeBackendConfig {
    scan_fixture: ScanFixture,
    notifications: Option<NotificationPayloads>,
    #[builder(default)]
    gatt: GattFixture,
    #[builder(default)]
    scan_failures: ScanFailureQueue,
    #[builder(default)]
    radio_off: bool,
    #[builder(default)]
    scan_unsupported: bool,
    #[builder(default)]
    denied_permissions: Vec<Permission>,
    #[builder(default)]
    connect_fails: bool,
    #[builder(default)]
    discovery_delay: Duration,
    #[builder(default)]
    call_log: FakeCallLog,
}

/// Fake transport used in tests and non-hardware environments.
///
/// Events are delivered on the controller channel in the order a real stack
/// would produce them.
#[derive(Debug)]
pub(crate) struct FakeTransport {
    events: EventSender,
    devices: Vec<PeripheralIdentity>,
    gatt: GattFixture,
    notifications: Vec<Vec<u8>>,
    scan_failures: VecDeque<ScanFailure>,
    radio_off: bool,
    scan_unsupported: bool,
    denied_permissions: Vec<Permission>,
    connect_fails: bool,
    discovery_delay: Duration,
    call_log: FakeCallLog,
    discovery_task: Option<JoinHandle<()>>,
    connected: Option<AttemptId>,
    services_discovered: bool,
}

impl FakeTransport {
    /// Creates a fake transport delivering events on `events`.
    pub(crate) fn new(config: FakeBackendConfig, events: EventSender) -> Self {
        let notifications = config.notifications.map_or_else(
            || DEFAULT_NOTIFICATIONS.map(<[u8]>::to_vec).to_vec(),
            Into::into,
        );
        let failures: Vec<ScanFailure> = config.scan_failures.into();

        Self {
            events,
            devices: config.scan_fixture.into(),
            gatt: config.gatt,
            notifications,
            scan_failures: failures.into(),
            radio_off: config.radio_off,
            scan_unsupported: config.scan_unsupported,
            denied_permissions: config.denied_permissions,
            connect_fails: config.connect_fails,
            discovery_delay: config.discovery_delay,
            call_log: config.call_log,
            discovery_task: None,
            connected: None,
            services_discovered: false,
        }
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            trace!("controller channel closed; dropping fake transport event");
        }
    }

    fn emit_notifications(&self, attempt: AttemptId, characteristic: &CharacteristicRef) {
        for value in &self.notifications {
            self.emit(TransportEvent::CharacteristicChanged {
                attempt,
                uuid: characteristic.uuid().to_string(),
                value: value.clone(),
            });
        }
    }

    fn find_characteristic(&self, characteristic: &CharacteristicRef) -> Option<CharacteristicInfo> {
        gatt_services(self.gatt)
            .into_iter()
            .filter(|service| service.uuid().eq_ignore_ascii_case(characteristic.service_uuid()))
            .flat_map(|service| service.characteristics().to_vec())
            .find(|candidate| characteristic.matches_uuid(candidate.uuid()))
    }

    fn abort_discovery(&mut self) {
        if let Some(task) = self.discovery_task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn is_radio_enabled(&self) -> Result<bool, InteractionError> {
        self.call_log.push(TransportCall::RadioCheck);
        Ok(!self.radio_off)
    }

    fn is_scan_supported(&self) -> bool {
        !self.scan_unsupported
    }

    fn has_permission(&self, permission: Permission) -> bool {
        !self.denied_permissions.contains(&permission)
    }

    async fn start_scan(&mut self, ticket: ScanTicket) -> Result<(), InteractionError> {
        self.call_log.push(TransportCall::StartScan {
            strategy: ticket.strategy,
        });
        self.abort_discovery();

        if let Some(failure) = self.scan_failures.pop_front() {
            debug!(%failure, "fake scan failing");
            self.emit(TransportEvent::ScanFailed {
                scan: ticket.id,
                failure,
            });
            return Ok(());
        }

        if self.discovery_delay.is_zero() {
            for identity in &self.devices {
                self.emit(discovered(ticket.id, identity));
            }
            return Ok(());
        }

        let events = self.events.clone();
        let devices = self.devices.clone();
        let delay = self.discovery_delay;
        self.discovery_task = Some(tokio::spawn(async move {
            sleep(delay).await;
            for identity in &devices {
                if events.send(discovered(ticket.id, identity)).is_err() {
                    return;
                }
            }
        }));
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<(), InteractionError> {
        self.call_log.push(TransportCall::StopScan);
        self.abort_discovery();
        Ok(())
    }

    async fn connect(
        &mut self,
        attempt: AttemptId,
        identity: &PeripheralIdentity,
    ) -> Result<(), InteractionError> {
        self.call_log.push(TransportCall::Connect {
            address: identity.address().to_string(),
        });

        let known = self
            .devices
            .iter()
            .any(|device| device.address() == identity.address());
        if self.connect_fails || !known {
            return Err(InteractionError::UnknownPeripheral {
                address: identity.address().to_string(),
            });
        }

        self.connected = Some(attempt);
        self.services_discovered = false;
        self.emit(TransportEvent::ConnectionStateChanged {
            attempt,
            state: ConnectionState::Connected,
        });
        Ok(())
    }

    async fn discover_services(&mut self) -> Result<(), InteractionError> {
        self.call_log.push(TransportCall::DiscoverServices);
        let attempt = self.connected.ok_or(InteractionError::NotConnected)?;
        self.services_discovered = true;
        self.emit(TransportEvent::ServicesDiscovered { attempt });
        Ok(())
    }

    fn services(&self) -> Vec<ServiceInfo> {
        if self.connected.is_some() && self.services_discovered {
            gatt_services(self.gatt)
        } else {
            Vec::new()
        }
    }

    async fn set_notification(
        &mut self,
        characteristic: &CharacteristicRef,
        enabled: bool,
    ) -> Result<(), InteractionError> {
        self.call_log.push(TransportCall::SetNotification {
            uuid: characteristic.uuid().to_string(),
            enabled,
        });
        let attempt = self.connected.ok_or(InteractionError::NotConnected)?;
        let info = self.find_characteristic(characteristic).ok_or_else(|| {
            InteractionError::UnknownCharacteristic {
                uuid: characteristic.uuid().to_string(),
            }
        })?;

        if enabled && info.descriptors().is_empty() {
            self.emit_notifications(attempt, characteristic);
        }
        Ok(())
    }

    async fn write_descriptor(
        &mut self,
        characteristic: &CharacteristicRef,
        descriptor_uuid: &str,
        value: &[u8],
    ) -> Result<(), InteractionError> {
        self.call_log.push(TransportCall::WriteDescriptor {
            uuid: descriptor_uuid.to_string(),
            value: value.to_vec(),
        });
        let attempt = self.connected.ok_or(InteractionError::NotConnected)?;

        self.emit(TransportEvent::DescriptorWritten {
            attempt,
            characteristic: characteristic.clone(),
        });
        if value != [0x00, 0x00] {
            self.emit_notifications(attempt, characteristic);
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), InteractionError> {
        self.call_log.push(TransportCall::Disconnect);
        if let Some(attempt) = self.connected {
            self.emit(TransportEvent::ConnectionStateChanged {
                attempt,
                state: ConnectionState::Disconnected,
            });
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.call_log.push(TransportCall::Close);
        self.connected = None;
        self.services_discovered = false;
    }
}

impl Drop for FakeTransport {
    fn drop(&mut self) {
        self.abort_discovery();
    }
}

fn discovered(scan: ScanId, identity: &PeripheralIdentity) -> TransportEvent {
    TransportEvent::Discovered {
        scan,
        identity: identity.clone(),
    }
}

fn parse_scan_fixture(raw_fixture: &str) -> Result<Vec<PeripheralIdentity>, FixtureError> {
    if raw_fixture.trim().is_empty() {
        return Ok(Vec::new());
    }

    raw_fixture
        .split(';')
        .map(parse_scan_record)
        .collect::<Result<Vec<_>, _>>()
}

fn parse_scan_record(raw_record: &str) -> Result<PeripheralIdentity, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    let [address, name, rssi] = fields.as_slice() else {
        return Err(FixtureError::InvalidRecordFieldCount);
    };
    if address.is_empty() {
        return Err(FixtureError::EmptyAddress);
    }

    let name = match *name {
        "" | "-" => None,
        name => Some(name.to_string()),
    };
    let rssi = match *rssi {
        "" | "-" => None,
        rssi => Some(rssi.parse::<i16>()?),
    };

    Ok(PeripheralIdentity::new(*address, name).with_rssi(rssi))
}

fn parse_notifications(raw_value: &str) -> Result<Vec<Vec<u8>>, FixtureError> {
    if raw_value.is_empty() {
        return Ok(Vec::new());
    }
    raw_value.split(';').map(parse_payload).collect()
}

fn parse_payload(raw_value: &str) -> Result<Vec<u8>, FixtureError> {
    if let Some(text) = raw_value.strip_prefix("text:") {
        return Ok(text.as_bytes().to_vec());
    }

    let cleaned: String = raw_value.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&cleaned).map_err(|source| FixtureError::InvalidHex {
        value: raw_value.to_string(),
        source,
    })
}

fn gatt_services(gatt: GattFixture) -> Vec<ServiceInfo> {
    let cccd = protocol::endpoint_metadata(EndpointId::ClientConfigurationDescriptor).uuid();
    let ln_service = protocol::endpoint_metadata(EndpointId::LocationNavigationService).uuid();
    let ln_characteristic =
        protocol::endpoint_metadata(EndpointId::LocationSpeedCharacteristic).uuid();
    let characteristic = |uuid: &str, properties: &[&str], with_cccd: bool| {
        CharacteristicInfo::new(
            uuid,
            properties.iter().map(ToString::to_string).collect(),
            if with_cccd {
                vec![cccd.to_string()]
            } else {
                Vec::new()
            },
        )
    };

    match gatt {
        GattFixture::LocationNavigation => vec![
            ServiceInfo::new("0000180f-0000-1000-8000-00805f9b34fb", true, vec![
                characteristic("00002a19-0000-1000-8000-00805f9b34fb", &["read", "notify"], true),
            ]),
            ServiceInfo::new(ln_service, true, vec![characteristic(
                ln_characteristic,
                &["notify"],
                true,
            )]),
        ],
        GattFixture::GenericNotify => vec![ServiceInfo::new(
            "0000ffe0-0000-1000-8000-00805f9b34fb",
            true,
            vec![
                characteristic("0000ffe1-0000-1000-8000-00805f9b34fb", &["write"], false),
                characteristic("0000ffe2-0000-1000-8000-00805f9b34fb", &["read", "notify"], true),
            ],
        )],
        GattFixture::IndicateOnly => vec![ServiceInfo::new(
            "0000ffe0-0000-1000-8000-00805f9b34fb",
            true,
            vec![characteristic(
                "0000ffe4-0000-1000-8000-00805f9b34fb",
                &["indicate"],
                true,
            )],
        )],
        GattFixture::NotifyWithoutDescriptor => vec![ServiceInfo::new(ln_service, true, vec![
            characteristic(ln_characteristic, &["notify"], false),
        ])],
        GattFixture::NoNotify => vec![ServiceInfo::new(
            "0000180a-0000-1000-8000-00805f9b34fb",
            true,
            vec![characteristic(
                "00002a29-0000-1000-8000-00805f9b34fb",
                &["read"],
                false,
            )],
        )],
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("AA:BB|Drone-1|-43", 1)]
    #[case("AA:BB|Drone-1|-43;CC:DD|-|-", 2)]
    #[case("", 0)]
    fn parse_scan_fixture_parses_records(#[case] fixture: &str, #[case] expected_count: usize) {
        let devices = parse_scan_fixture(fixture).expect("fixture should parse");
        assert_eq!(expected_count, devices.len());
    }

    #[test]
    fn parse_scan_record_maps_dash_to_none() {
        let identity = parse_scan_record("CC:DD|-|-").expect("record should parse");
        assert_eq!(None, identity.name());
        assert_eq!(None, identity.rssi());
    }

    #[test]
    fn parse_scan_fixture_rejects_invalid_field_count() {
        let result = parse_scan_fixture("AA:BB|Drone-1");
        assert_matches!(result, Err(FixtureError::InvalidRecordFieldCount));
    }

    #[test]
    fn parse_scan_fixture_rejects_empty_address() {
        let result = parse_scan_fixture("|Drone-1|-40");
        assert_matches!(result, Err(FixtureError::EmptyAddress));
    }

    #[rstest]
    #[case("text:bird, 1, 2, 3", vec![b"bird, 1, 2, 3".to_vec()])]
    #[case("00 01;text:hi", vec![vec![0x00, 0x01], b"hi".to_vec()])]
    #[case("text:a;;DEAD", vec![b"a".to_vec(), Vec::new(), vec![0xDE, 0xAD]])]
    fn parse_notifications_mixes_hex_and_text(
        #[case] raw: &str,
        #[case] expected: Vec<Vec<u8>>,
    ) {
        assert_eq!(expected, parse_notifications(raw).expect("fixture should parse"));
    }

    #[test]
    fn parse_notifications_rejects_odd_hex() {
        let result = parse_notifications("ABC");
        assert_matches!(result, Err(FixtureError::InvalidHex { .. }));
    }

    #[test]
    fn scan_failure_queue_parses_codes() {
        let queue: ScanFailureQueue = "2, 3".parse().expect("codes should parse");
        let failures: Vec<ScanFailure> = queue.into();
        assert_eq!(
            vec![ScanFailure::RegistrationFailed, ScanFailure::InternalError],
            failures
        );
    }

    #[test]
    fn gatt_fixture_parses_kebab_case() {
        assert_eq!(
            Ok(GattFixture::IndicateOnly),
            "indicate-only".parse::<GattFixture>()
        );
    }
}
