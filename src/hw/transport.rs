use async_trait::async_trait;
use derive_more::{Display, From, Into};
use serde::Serialize;
use strum_macros::{Display as StrumDisplay, EnumString};
use tokio::sync::mpsc;

use super::model::{CharacteristicRef, PeripheralIdentity, ServiceInfo};
use crate::error::InteractionError;

/// Sender half used by transports to deliver events to the controller.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiver half consumed by the controller.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Correlates discovery callbacks with the scan that produced them.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, From, Into)]
#[display("scan#{_0}")]
pub struct ScanId(u64);

/// Correlates connection callbacks with the connect attempt that produced them.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, From, Into)]
#[display("attempt#{_0}")]
pub struct AttemptId(u64);

/// Platform scanning API used for one discovery window.
#[derive(Debug, Clone, Copy, Eq, PartialEq, StrumDisplay, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStrategy {
    /// Batched scanner with filters and settings.
    #[strum(to_string = "modern")]
    Modern,
    /// Single-callback scanner kept for stacks that reject modern registration.
    #[strum(to_string = "legacy")]
    Legacy,
}

impl ScanStrategy {
    /// Returns the runtime permission this strategy needs.
    #[must_use]
    pub fn required_permission(self) -> Permission {
        match self {
            Self::Modern => Permission::Scan,
            Self::Legacy => Permission::Location,
        }
    }
}

/// Runtime permissions a transport may require.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, StrumDisplay, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Permission {
    Scan,
    Location,
    Connect,
}

/// Fatal scan errors reported by the platform, keyed by platform error code.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub enum ScanFailure {
    #[display("already started (code 1)")]
    AlreadyStarted,
    #[display("application registration failed (code 2)")]
    RegistrationFailed,
    #[display("internal error (code 3)")]
    InternalError,
    #[display("feature unsupported (code 4)")]
    FeatureUnsupported,
    #[display("out of hardware resources (code 5)")]
    OutOfHardwareResources,
    #[display("unknown error (code {_0})")]
    Other(i32),
}

impl ScanFailure {
    /// Maps a platform scan error code.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::AlreadyStarted,
            2 => Self::RegistrationFailed,
            3 => Self::InternalError,
            4 => Self::FeatureUnsupported,
            5 => Self::OutOfHardwareResources,
            other => Self::Other(other),
        }
    }

    /// Returns the platform error code.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::AlreadyStarted => 1,
            Self::RegistrationFailed => 2,
            Self::InternalError => 3,
            Self::FeatureUnsupported => 4,
            Self::OutOfHardwareResources => 5,
            Self::Other(code) => code,
        }
    }

    /// Returns whether the scanner could not be registered with the stack.
    ///
    /// This is the only failure that pins discovery to the legacy strategy.
    #[must_use]
    pub fn is_registration_failure(self) -> bool {
        matches!(self, Self::RegistrationFailed)
    }
}

/// Link-layer connection state reported by the transport.
#[derive(Debug, Clone, Copy, Eq, PartialEq, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Parameters for one transport scan.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ScanTicket {
    pub id: ScanId,
    pub strategy: ScanStrategy,
}

/// Closed set of callbacks a transport delivers to the controller.
///
/// Every variant carries the scan or attempt it belongs to so late callbacks
/// from superseded operations can be recognised and dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Discovered {
        scan: ScanId,
        identity: PeripheralIdentity,
    },
    ScanFailed {
        scan: ScanId,
        failure: ScanFailure,
    },
    ConnectionStateChanged {
        attempt: AttemptId,
        state: ConnectionState,
    },
    ServicesDiscovered {
        attempt: AttemptId,
    },
    DescriptorWritten {
        attempt: AttemptId,
        characteristic: CharacteristicRef,
    },
    CharacteristicChanged {
        attempt: AttemptId,
        uuid: String,
        value: Vec<u8>,
    },
}

/// Platform BLE operations the link controller depends on.
///
/// Completion of asynchronous steps (connection, service discovery,
/// descriptor writes, discoveries) is reported through [`TransportEvent`]s on
/// the channel the transport was opened with; returned errors only mean the
/// request itself was rejected.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns whether the Bluetooth radio is powered on.
    async fn is_radio_enabled(&self) -> Result<bool, InteractionError>;

    /// Returns whether the platform can scan at all.
    fn is_scan_supported(&self) -> bool;

    /// Returns whether a runtime permission has been granted.
    fn has_permission(&self, permission: Permission) -> bool;

    /// Starts discovery using the ticket's strategy.
    async fn start_scan(&mut self, ticket: ScanTicket) -> Result<(), InteractionError>;

    /// Stops any active discovery.
    async fn stop_scan(&mut self) -> Result<(), InteractionError>;

    /// Starts connecting to a peripheral.
    async fn connect(
        &mut self,
        attempt: AttemptId,
        identity: &PeripheralIdentity,
    ) -> Result<(), InteractionError>;

    /// Starts service discovery on the connected peripheral.
    async fn discover_services(&mut self) -> Result<(), InteractionError>;

    /// Returns discovered services in platform enumeration order.
    fn services(&self) -> Vec<ServiceInfo>;

    /// Enables or disables local delivery of a characteristic's notifications.
    async fn set_notification(
        &mut self,
        characteristic: &CharacteristicRef,
        enabled: bool,
    ) -> Result<(), InteractionError>;

    /// Writes a descriptor value on a characteristic.
    async fn write_descriptor(
        &mut self,
        characteristic: &CharacteristicRef,
        descriptor_uuid: &str,
        value: &[u8],
    ) -> Result<(), InteractionError>;

    /// Requests a link-layer disconnect.
    async fn disconnect(&mut self) -> Result<(), InteractionError>;

    /// Releases every connection resource unconditionally.
    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1, ScanFailure::AlreadyStarted)]
    #[case(2, ScanFailure::RegistrationFailed)]
    #[case(5, ScanFailure::OutOfHardwareResources)]
    #[case(42, ScanFailure::Other(42))]
    fn scan_failure_maps_platform_codes(#[case] code: i32, #[case] expected: ScanFailure) {
        let failure = ScanFailure::from_code(code);
        assert_eq!(expected, failure);
        assert_eq!(code, failure.code());
    }

    #[test]
    fn only_registration_failure_pins_legacy() {
        let pinning: Vec<_> = (0..=6)
            .map(ScanFailure::from_code)
            .filter(|failure| failure.is_registration_failure())
            .collect();
        assert_eq!(vec![ScanFailure::RegistrationFailed], pinning);
    }

    #[rstest]
    #[case(ScanStrategy::Modern, Permission::Scan)]
    #[case(ScanStrategy::Legacy, Permission::Location)]
    fn strategy_requires_permission(#[case] strategy: ScanStrategy, #[case] permission: Permission) {
        assert_eq!(permission, strategy.required_permission());
    }

    #[test]
    fn permission_parses_lowercase_names() -> anyhow::Result<()> {
        assert_eq!(Permission::Location, "location".parse()?);
        Ok(())
    }
}
