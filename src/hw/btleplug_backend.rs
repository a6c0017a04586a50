use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, CharPropFlags, Characteristic, Manager as _,
    Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tracing::{debug, info, instrument, trace, warn};

use super::model::{CharacteristicInfo, CharacteristicRef, PeripheralIdentity, ServiceInfo};
use super::transport::{
    AttemptId, ConnectionState, EventSender, Permission, ScanFailure, ScanStrategy, ScanTicket,
    Transport, TransportEvent,
};
use crate::error::InteractionError;
use crate::protocol::{self, EndpointId};

const LEGACY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Transport backed by `btleplug` on the first available adapter.
#[derive(Debug)]
pub(crate) struct BtleplugBackend {
    adapter: Adapter,
    events: EventSender,
    scan_task: Option<JoinHandle<()>>,
    connection: Option<ActiveConnection>,
}

#[derive(Debug)]
struct ActiveConnection {
    attempt: AttemptId,
    peripheral: Peripheral,
    tasks: Vec<JoinHandle<()>>,
    notification_task: Option<JoinHandle<()>>,
}

impl ActiveConnection {
    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(task) = self.notification_task.take() {
            task.abort();
        }
    }
}

impl BtleplugBackend {
    /// Opens the first BLE adapter.
    pub(crate) async fn new(events: EventSender) -> Result<Self, InteractionError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(InteractionError::NoAdapters)?;
        match adapter.adapter_info().await {
            Ok(name) => info!(adapter = %name, "using BLE adapter"),
            Err(error) => debug!(?error, "failed to read adapter info"),
        }

        Ok(Self {
            adapter,
            events,
            scan_task: None,
            connection: None,
        })
    }

    fn abort_scan_task(&mut self) {
        if let Some(task) = self.scan_task.take() {
            task.abort();
        }
    }

    fn connection(&self) -> Result<&ActiveConnection, InteractionError> {
        self.connection.as_ref().ok_or(InteractionError::NotConnected)
    }

    fn characteristic_for(
        &self,
        characteristic: &CharacteristicRef,
    ) -> Result<Characteristic, InteractionError> {
        self.connection()?
            .peripheral
            .characteristics()
            .into_iter()
            .find(|candidate| {
                characteristic.matches_uuid(&candidate.uuid.to_string())
                    && candidate
                        .service_uuid
                        .to_string()
                        .eq_ignore_ascii_case(characteristic.service_uuid())
            })
            .ok_or_else(|| InteractionError::UnknownCharacteristic {
                uuid: characteristic.uuid().to_string(),
            })
    }

    async fn find_peripheral(&self, address: &str) -> Result<Peripheral, InteractionError> {
        self.adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|peripheral| {
                peripheral.id().to_string() == address
                    || peripheral.address().to_string().eq_ignore_ascii_case(address)
            })
            .ok_or_else(|| InteractionError::UnknownPeripheral {
                address: address.to_string(),
            })
    }

    async fn spawn_modern_scan(&mut self, ticket: ScanTicket) -> Result<(), InteractionError> {
        let mut central_events = match self.adapter.events().await {
            Ok(central_events) => central_events,
            Err(error) => {
                warn!(?error, "failed to register modern scanner");
                send(&self.events, TransportEvent::ScanFailed {
                    scan: ticket.id,
                    failure: ScanFailure::RegistrationFailed,
                });
                return Ok(());
            }
        };
        self.adapter.start_scan(ScanFilter::default()).await?;

        let adapter = self.adapter.clone();
        let events = self.events.clone();
        self.scan_task = Some(tokio::spawn(async move {
            while let Some(event) = central_events.next().await {
                let (CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id)) = event
                else {
                    continue;
                };
                let peripheral = match adapter.peripheral(&id).await {
                    Ok(peripheral) => peripheral,
                    Err(error) => {
                        trace!(?error, "discovered peripheral vanished before lookup");
                        continue;
                    }
                };
                let identity = identity_for(&peripheral).await;
                if !send(&events, TransportEvent::Discovered {
                    scan: ticket.id,
                    identity,
                }) {
                    return;
                }
            }
        }));
        Ok(())
    }

    async fn spawn_legacy_scan(&mut self, ticket: ScanTicket) -> Result<(), InteractionError> {
        self.adapter.start_scan(ScanFilter::default()).await?;

        let adapter = self.adapter.clone();
        let events = self.events.clone();
        self.scan_task = Some(tokio::spawn(async move {
            let mut reported = HashSet::new();
            loop {
                let peripherals = match adapter.peripherals().await {
                    Ok(peripherals) => peripherals,
                    Err(error) => {
                        warn!(?error, "legacy scan poll failed");
                        send(&events, TransportEvent::ScanFailed {
                            scan: ticket.id,
                            failure: ScanFailure::InternalError,
                        });
                        return;
                    }
                };
                for peripheral in peripherals {
                    if !reported.insert(peripheral.id()) {
                        continue;
                    }
                    let identity = identity_for(&peripheral).await;
                    if !send(&events, TransportEvent::Discovered {
                        scan: ticket.id,
                        identity,
                    }) {
                        return;
                    }
                }

                sleep(LEGACY_POLL_INTERVAL).await;
            }
        }));
        Ok(())
    }
}

#[async_trait]
impl Transport for BtleplugBackend {
    async fn is_radio_enabled(&self) -> Result<bool, InteractionError> {
        let state = self.adapter.adapter_state().await?;
        trace!(?state, "adapter state");
        Ok(!matches!(state, CentralState::PoweredOff))
    }

    fn is_scan_supported(&self) -> bool {
        true
    }

    fn has_permission(&self, _permission: Permission) -> bool {
        true
    }

    #[instrument(skip_all, level = "debug", fields(scan = %ticket.id, strategy = %ticket.strategy))]
    async fn start_scan(&mut self, ticket: ScanTicket) -> Result<(), InteractionError> {
        self.abort_scan_task();
        match ticket.strategy {
            ScanStrategy::Modern => self.spawn_modern_scan(ticket).await,
            ScanStrategy::Legacy => self.spawn_legacy_scan(ticket).await,
        }
    }

    async fn stop_scan(&mut self) -> Result<(), InteractionError> {
        self.abort_scan_task();
        self.adapter.stop_scan().await?;
        Ok(())
    }

    #[instrument(skip_all, level = "debug", fields(%attempt, address = identity.address()))]
    async fn connect(
        &mut self,
        attempt: AttemptId,
        identity: &PeripheralIdentity,
    ) -> Result<(), InteractionError> {
        let peripheral = self.find_peripheral(identity.address()).await?;
        let peripheral_id = peripheral.id();
        let mut central_events = self.adapter.events().await?;

        let events = self.events.clone();
        let watcher = tokio::spawn(async move {
            while let Some(event) = central_events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event
                    && id == peripheral_id
                {
                    send(&events, TransportEvent::ConnectionStateChanged {
                        attempt,
                        state: ConnectionState::Disconnected,
                    });
                    return;
                }
            }
        });

        let events = self.events.clone();
        let connecting = peripheral.clone();
        let connector = tokio::spawn(async move {
            let state = match connecting.connect().await {
                Ok(()) => ConnectionState::Connected,
                Err(error) => {
                    warn!(?error, "peripheral connection failed");
                    ConnectionState::Disconnected
                }
            };
            send(&events, TransportEvent::ConnectionStateChanged { attempt, state });
        });

        self.connection = Some(ActiveConnection {
            attempt,
            peripheral,
            tasks: vec![watcher, connector],
            notification_task: None,
        });
        Ok(())
    }

    async fn discover_services(&mut self) -> Result<(), InteractionError> {
        let events = self.events.clone();
        let connection = self
            .connection
            .as_mut()
            .ok_or(InteractionError::NotConnected)?;
        let attempt = connection.attempt;
        let peripheral = connection.peripheral.clone();

        connection.tasks.push(tokio::spawn(async move {
            let event = match peripheral.discover_services().await {
                Ok(()) => TransportEvent::ServicesDiscovered { attempt },
                Err(error) => {
                    warn!(?error, "service discovery failed");
                    TransportEvent::ConnectionStateChanged {
                        attempt,
                        state: ConnectionState::Disconnected,
                    }
                }
            };
            send(&events, event);
        }));
        Ok(())
    }

    fn services(&self) -> Vec<ServiceInfo> {
        let Some(connection) = &self.connection else {
            return Vec::new();
        };

        connection
            .peripheral
            .services()
            .into_iter()
            .map(|service| {
                let characteristics = service
                    .characteristics
                    .iter()
                    .map(|characteristic| {
                        CharacteristicInfo::new(
                            characteristic.uuid.to_string(),
                            property_labels(characteristic.properties),
                            characteristic
                                .descriptors
                                .iter()
                                .map(|descriptor| descriptor.uuid.to_string())
                                .collect(),
                        )
                    })
                    .collect();
                ServiceInfo::new(service.uuid.to_string(), service.primary, characteristics)
            })
            .collect()
    }

    async fn set_notification(
        &mut self,
        characteristic: &CharacteristicRef,
        enabled: bool,
    ) -> Result<(), InteractionError> {
        let target = self.characteristic_for(characteristic)?;
        let events = self.events.clone();
        let connection = self
            .connection
            .as_mut()
            .ok_or(InteractionError::NotConnected)?;
        if let Some(task) = connection.notification_task.take() {
            task.abort();
        }
        if !enabled {
            return Ok(());
        }

        let attempt = connection.attempt;
        let mut notifications = connection.peripheral.notifications().await?;
        // Without a configuration descriptor no write will subscribe later.
        if !has_configuration_descriptor(&target) {
            trace!("subscribing without configuration descriptor");
            connection.peripheral.subscribe(&target).await?;
        }
        connection.notification_task = Some(tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if !send(&events, TransportEvent::CharacteristicChanged {
                    attempt,
                    uuid: notification.uuid.to_string(),
                    value: notification.value,
                }) {
                    return;
                }
            }
        }));
        Ok(())
    }

    #[instrument(skip_all, level = "debug", fields(characteristic = characteristic.uuid()))]
    async fn write_descriptor(
        &mut self,
        characteristic: &CharacteristicRef,
        descriptor_uuid: &str,
        value: &[u8],
    ) -> Result<(), InteractionError> {
        let target = self.characteristic_for(characteristic)?;
        let connection = self.connection()?;
        trace!(descriptor = descriptor_uuid, "writing configuration descriptor");
        if value.iter().all(|byte| *byte == 0) {
            connection.peripheral.unsubscribe(&target).await?;
        } else {
            connection.peripheral.subscribe(&target).await?;
        }

        send(&self.events, TransportEvent::DescriptorWritten {
            attempt: connection.attempt,
            characteristic: characteristic.clone(),
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), InteractionError> {
        let Some(connection) = &self.connection else {
            return Ok(());
        };
        if connection.peripheral.is_connected().await? {
            connection.peripheral.disconnect().await?;
        }
        Ok(())
    }

    async fn close(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        connection.abort_tasks();
        match connection.peripheral.is_connected().await {
            Ok(true) => {
                if let Err(error) = connection.peripheral.disconnect().await {
                    debug!(?error, "failed to release connection on close");
                }
            }
            Ok(false) => {}
            Err(error) => debug!(?error, "failed to query connection state on close"),
        }
    }
}

impl Drop for BtleplugBackend {
    fn drop(&mut self) {
        self.abort_scan_task();
        if let Some(connection) = self.connection.as_mut() {
            connection.abort_tasks();
        }
    }
}

fn send(events: &EventSender, event: TransportEvent) -> bool {
    let delivered = events.send(event).is_ok();
    if !delivered {
        trace!("controller channel closed; dropping transport event");
    }
    delivered
}

async fn identity_for(peripheral: &Peripheral) -> PeripheralIdentity {
    let address = peripheral.id().to_string();
    match peripheral.properties().await {
        Ok(Some(properties)) => {
            PeripheralIdentity::new(address, properties.local_name).with_rssi(properties.rssi)
        }
        Ok(None) => PeripheralIdentity::new(address, None),
        Err(error) => {
            trace!(?error, "failed to read peripheral properties");
            PeripheralIdentity::new(address, None)
        }
    }
}

fn has_configuration_descriptor(characteristic: &Characteristic) -> bool {
    characteristic.descriptors.iter().any(|descriptor| {
        protocol::is_endpoint(
            &descriptor.uuid.to_string(),
            EndpointId::ClientConfigurationDescriptor,
        )
    })
}

fn property_labels(flags: CharPropFlags) -> Vec<String> {
    let labels: Vec<String> = flags
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect();
    if labels.is_empty() {
        vec!["none".to_string()]
    } else {
        labels
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use btleplug::api::Descriptor;
    use btleplug::api::bleuuid::uuid_from_u16;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn characteristic_with_descriptors(descriptors: &[u16]) -> Characteristic {
        let uuid = uuid_from_u16(0x2A67);
        let service_uuid = uuid_from_u16(0x1819);
        Characteristic {
            uuid,
            service_uuid,
            properties: CharPropFlags::NOTIFY,
            descriptors: descriptors
                .iter()
                .map(|short| Descriptor {
                    uuid: uuid_from_u16(*short),
                    service_uuid,
                    characteristic_uuid: uuid,
                })
                .collect::<BTreeSet<_>>(),
        }
    }

    #[rstest]
    #[case::configuration(&[0x2902], true)]
    #[case::user_description_only(&[0x2901], false)]
    #[case::none(&[], false)]
    #[case::among_others(&[0x2901, 0x2902], true)]
    fn configuration_descriptor_decides_local_subscribe(
        #[case] descriptors: &[u16],
        #[case] expected: bool,
    ) {
        let characteristic = characteristic_with_descriptors(descriptors);
        assert_eq!(expected, has_configuration_descriptor(&characteristic));
    }

    #[rstest]
    #[case(CharPropFlags::NOTIFY, vec!["notify"])]
    #[case(CharPropFlags::READ | CharPropFlags::INDICATE, vec!["read", "indicate"])]
    #[case(CharPropFlags::empty(), vec!["none"])]
    fn property_labels_match_resolution_vocabulary(
        #[case] flags: CharPropFlags,
        #[case] expected: Vec<&str>,
    ) {
        assert_eq!(expected, property_labels(flags));
    }
}
