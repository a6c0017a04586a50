use std::collections::HashMap;
use std::sync::LazyLock;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

/// Descriptor value that enables notifications.
pub(crate) const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// Descriptor value that enables indications.
pub(crate) const ENABLE_INDICATION_VALUE: [u8; 2] = [0x02, 0x00];

/// Well-known GATT endpoints used by detection peripherals.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display)]
pub enum EndpointId {
    /// Location and Navigation service (`0x1819`).
    #[strum(to_string = "location_navigation_service")]
    LocationNavigationService,
    /// Location and Speed characteristic (`0x2A67`).
    #[strum(to_string = "location_speed_characteristic")]
    LocationSpeedCharacteristic,
    /// Client Characteristic Configuration descriptor (`0x2902`).
    #[strum(to_string = "client_configuration_descriptor")]
    ClientConfigurationDescriptor,
}

impl EndpointId {
    /// Returns the endpoint UUID in lowercase hyphenated form.
    #[must_use]
    pub fn uuid(self) -> &'static str {
        endpoint_metadata(self).uuid()
    }
}

/// Descriptive metadata for one protocol endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct EndpointMetadata {
    name: &'static str,
    uuid: &'static str,
}

impl EndpointMetadata {
    /// Human-readable endpoint name.
    pub(crate) fn name(self) -> &'static str {
        self.name
    }

    /// Endpoint UUID in lowercase hyphenated form.
    pub(crate) fn uuid(self) -> &'static str {
        self.uuid
    }
}

/// Endpoint metadata keyed by typed endpoint IDs.
pub(crate) static ENDPOINTS_BY_ID: LazyLock<HashMap<EndpointId, EndpointMetadata>> =
    LazyLock::new(|| {
        EndpointId::iter()
            .map(|endpoint| (endpoint, metadata_for(endpoint)))
            .collect()
    });

/// Returns metadata for one endpoint.
pub(crate) fn endpoint_metadata(endpoint: EndpointId) -> EndpointMetadata {
    *ENDPOINTS_BY_ID
        .get(&endpoint)
        .unwrap_or(&metadata_for(endpoint))
}

/// Returns whether a UUID string names the given endpoint, ignoring case.
pub(crate) fn is_endpoint(uuid: &str, endpoint: EndpointId) -> bool {
    uuid.eq_ignore_ascii_case(endpoint_metadata(endpoint).uuid())
}

/// Returns the human-readable name of a well-known endpoint UUID.
pub(crate) fn endpoint_name(uuid: &str) -> Option<&'static str> {
    EndpointId::iter()
        .find(|endpoint| is_endpoint(uuid, *endpoint))
        .map(|endpoint| endpoint_metadata(endpoint).name())
}

fn metadata_for(endpoint: EndpointId) -> EndpointMetadata {
    match endpoint {
        EndpointId::LocationNavigationService => EndpointMetadata {
            name: "Location and Navigation",
            uuid: "00001819-0000-1000-8000-00805f9b34fb",
        },
        EndpointId::LocationSpeedCharacteristic => EndpointMetadata {
            name: "Location and Speed",
            uuid: "00002a67-0000-1000-8000-00805f9b34fb",
        },
        EndpointId::ClientConfigurationDescriptor => EndpointMetadata {
            name: "Client Characteristic Configuration",
            uuid: "00002902-0000-1000-8000-00805f9b34fb",
        },
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn endpoint_uuids_are_lowercase() {
        for endpoint in EndpointId::iter() {
            let uuid = endpoint.uuid();
            assert_eq!(uuid.to_lowercase(), uuid);
        }
    }

    #[test]
    fn is_endpoint_ignores_case() {
        assert!(is_endpoint(
            "00002A67-0000-1000-8000-00805F9B34FB",
            EndpointId::LocationSpeedCharacteristic
        ));
        assert!(!is_endpoint(
            "00002a67-0000-1000-8000-00805f9b34fb",
            EndpointId::LocationNavigationService
        ));
    }

    #[rstest]
    #[case("00002A67-0000-1000-8000-00805F9B34FB", Some("Location and Speed"))]
    #[case("0000fff1-0000-1000-8000-00805f9b34fb", None)]
    fn endpoint_name_resolves_known_uuids(#[case] uuid: &str, #[case] expected: Option<&str>) {
        assert_eq!(expected, endpoint_name(uuid));
    }
}
