use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A peripheral reported by the transport during discovery.
///
/// Identity is the transport address alone; the name and signal strength are
/// informational and may change between sightings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeripheralIdentity {
    address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    rssi: Option<i16>,
}

impl PeripheralIdentity {
    /// Creates an identity with an optional advertised name.
    #[must_use]
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
            rssi: None,
        }
    }

    /// Attaches the RSSI observed with this sighting.
    #[must_use]
    pub fn with_rssi(mut self, rssi: Option<i16>) -> Self {
        self.rssi = rssi;
        self
    }

    /// Returns the transport address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the advertised name, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the RSSI from the sighting that produced this identity.
    #[must_use]
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    /// Returns whether the advertised name starts with a prefix.
    pub(crate) fn name_starts_with(&self, prefix: &str) -> bool {
        self.name.as_deref().is_some_and(|name| name.starts_with(prefix))
    }
}

impl PartialEq for PeripheralIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for PeripheralIdentity {}

impl Hash for PeripheralIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

/// A characteristic description discovered on a connected peripheral.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CharacteristicInfo {
    uuid: String,
    properties: Vec<String>,
    descriptors: Vec<String>,
}

impl CharacteristicInfo {
    /// Creates a characteristic description.
    #[must_use]
    pub fn new(uuid: impl Into<String>, properties: Vec<String>, descriptors: Vec<String>) -> Self {
        Self {
            uuid: uuid.into(),
            properties,
            descriptors,
        }
    }

    /// Returns the characteristic UUID.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Returns property labels for this characteristic.
    #[must_use]
    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    /// Returns descriptor UUIDs attached to this characteristic.
    #[must_use]
    pub fn descriptors(&self) -> &[String] {
        &self.descriptors
    }
}

/// A GATT service with discovered characteristics in enumeration order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ServiceInfo {
    uuid: String,
    primary: bool,
    characteristics: Vec<CharacteristicInfo>,
}

impl ServiceInfo {
    /// Creates a service description.
    #[must_use]
    pub fn new(uuid: impl Into<String>, primary: bool, characteristics: Vec<CharacteristicInfo>) -> Self {
        Self {
            uuid: uuid.into(),
            primary,
            characteristics,
        }
    }

    /// Returns the service UUID.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Returns all characteristics in this service.
    #[must_use]
    pub fn characteristics(&self) -> &[CharacteristicInfo] {
        &self.characteristics
    }
}

/// Addresses one characteristic within one service.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize)]
pub struct CharacteristicRef {
    service_uuid: String,
    uuid: String,
}

impl CharacteristicRef {
    /// Creates a characteristic reference; UUIDs are normalised to lowercase.
    #[must_use]
    pub fn new(service_uuid: &str, uuid: &str) -> Self {
        Self {
            service_uuid: service_uuid.to_ascii_lowercase(),
            uuid: uuid.to_ascii_lowercase(),
        }
    }

    /// Returns the owning service UUID.
    #[must_use]
    pub fn service_uuid(&self) -> &str {
        &self.service_uuid
    }

    /// Returns the characteristic UUID.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Returns whether a notification source UUID addresses this characteristic.
    #[must_use]
    pub fn matches_uuid(&self, uuid: &str) -> bool {
        self.uuid.eq_ignore_ascii_case(uuid)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn identity_equality_ignores_name_and_rssi() {
        let first = PeripheralIdentity::new("AA:BB", Some("drone".to_string())).with_rssi(Some(-40));
        let second = PeripheralIdentity::new("AA:BB", None);

        assert_eq!(first, second);
        let set: HashSet<_> = [first, second].into_iter().collect();
        assert_eq!(1, set.len());
    }

    #[test]
    fn identity_serialisation_skips_rssi() -> anyhow::Result<()> {
        let identity = PeripheralIdentity::new("AA:BB", Some("drone".to_string())).with_rssi(Some(-40));

        let json = serde_json::to_string(&identity)?;
        assert_eq!(r#"{"address":"AA:BB","name":"drone"}"#, json);

        let restored: PeripheralIdentity = serde_json::from_str(&json)?;
        assert_eq!(Some("drone"), restored.name());
        assert_eq!(None, restored.rssi());
        Ok(())
    }

    #[test]
    fn characteristic_ref_matches_case_insensitively() {
        let characteristic = CharacteristicRef::new("0000180D-0000", "00002A37-0000");
        assert!(characteristic.matches_uuid("00002a37-0000"));
        assert_eq!("00002a37-0000", characteristic.uuid());
    }
}
