use serde_with::SerializeDisplay;
use tracing::instrument;

use super::model::{CharacteristicInfo, CharacteristicRef, ServiceInfo};
use crate::protocol::{self, ENABLE_INDICATION_VALUE, ENABLE_NOTIFICATION_VALUE, EndpointId};

/// How the resolved characteristic pushes values.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display, SerializeDisplay)]
pub enum SubscriptionKind {
    #[display("notify")]
    Notify,
    #[display("indicate")]
    Indicate,
}

impl SubscriptionKind {
    /// Returns the configuration descriptor value enabling this delivery mode.
    pub(crate) fn descriptor_value(self) -> [u8; 2] {
        match self {
            Self::Notify => ENABLE_NOTIFICATION_VALUE,
            Self::Indicate => ENABLE_INDICATION_VALUE,
        }
    }
}

/// Why a characteristic was chosen for streaming.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub(crate) enum ResolutionSource {
    #[display("location_and_speed")]
    WellKnown,
    #[display("first_notifiable")]
    FirstNotifiable,
}

/// The characteristic a session streams from.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct ResolvedCharacteristic {
    pub(crate) characteristic: CharacteristicRef,
    pub(crate) kind: SubscriptionKind,
    pub(crate) source: ResolutionSource,
    /// Configuration descriptor UUID, when the characteristic exposes one.
    pub(crate) cccd: Option<String>,
}

/// Picks the characteristic to stream from.
///
/// The Location and Speed characteristic inside the Location and Navigation
/// service wins whenever present. Otherwise the first notify- or
/// indicate-capable characteristic in enumeration order is used.
#[instrument(skip(services), level = "debug", fields(service_count = services.len()))]
pub(crate) fn resolve_stream_characteristic(
    services: &[ServiceInfo],
) -> Option<ResolvedCharacteristic> {
    if let Some(resolved) = resolve_well_known(services) {
        return Some(resolved);
    }

    services.iter().find_map(|service| {
        service
            .characteristics()
            .iter()
            .find(|characteristic| supports_notify(characteristic))
            .map(|characteristic| {
                resolved(service, characteristic, ResolutionSource::FirstNotifiable)
            })
    })
}

fn resolve_well_known(services: &[ServiceInfo]) -> Option<ResolvedCharacteristic> {
    let service = services
        .iter()
        .find(|service| protocol::is_endpoint(service.uuid(), EndpointId::LocationNavigationService))?;
    let characteristic = service.characteristics().iter().find(|characteristic| {
        protocol::is_endpoint(characteristic.uuid(), EndpointId::LocationSpeedCharacteristic)
    })?;

    Some(resolved(service, characteristic, ResolutionSource::WellKnown))
}

fn resolved(
    service: &ServiceInfo,
    characteristic: &CharacteristicInfo,
    source: ResolutionSource,
) -> ResolvedCharacteristic {
    let kind = if !characteristic_has_property(characteristic, "notify")
        && characteristic_has_property(characteristic, "indicate")
    {
        SubscriptionKind::Indicate
    } else {
        SubscriptionKind::Notify
    };
    let cccd = characteristic
        .descriptors()
        .iter()
        .find(|uuid| protocol::is_endpoint(uuid, EndpointId::ClientConfigurationDescriptor))
        .map(|uuid| uuid.to_ascii_lowercase());

    ResolvedCharacteristic {
        characteristic: CharacteristicRef::new(service.uuid(), characteristic.uuid()),
        kind,
        source,
        cccd,
    }
}

fn supports_notify(characteristic: &CharacteristicInfo) -> bool {
    characteristic_has_property(characteristic, "notify")
        || characteristic_has_property(characteristic, "indicate")
}

fn characteristic_has_property(characteristic: &CharacteristicInfo, property: &str) -> bool {
    characteristic
        .properties()
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(property))
}
