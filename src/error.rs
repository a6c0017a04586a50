use derive_more::From;
use serde::Serialize;
use strum_macros::Display;
use thiserror::Error;

use crate::hw::{Permission, ScanFailure, ScanStrategy};

/// Errors returned by BLE interaction operations.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("no peripheral with address `{address}` is known to the adapter")]
    UnknownPeripheral { address: String },
    #[error("no peripheral is connected")]
    NotConnected,
    #[error("characteristic `{uuid}` was not found on the connected peripheral")]
    UnknownCharacteristic { uuid: String },
    #[error("failed while waiting for Ctrl+C")]
    CtrlC { source: std::io::Error },
    #[error("failed while reading or writing the remembered peer")]
    PeerStoreIo { source: std::io::Error },
    #[error("invalid persisted peer record: `{record}`")]
    InvalidPeerRecord { record: String },
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Errors returned when parsing fake interaction fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("fixture records must contain three pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("fixture records cannot have an empty address")]
    EmptyAddress,
    #[error("failed to parse RSSI value")]
    InvalidRssi(#[from] std::num::ParseIntError),
    #[error("notification payload `{value}` is not valid hex")]
    InvalidHex {
        value: String,
        source: hex::FromHexError,
    },
    #[error("scan failure code `{value}` is not an integer")]
    InvalidScanFailureCode { value: String },
}

/// Conditions that must hold before an operation may start.
///
/// None of these change controller state; retrying after the condition is
/// satisfied is always safe.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum PreconditionFailure {
    #[error("the Bluetooth radio is turned off")]
    RadioDisabled,
    #[error("this platform cannot scan for BLE peripherals")]
    ScanUnsupported,
    #[error("the `{permission}` permission has not been granted")]
    PermissionMissing { permission: Permission },
    #[error("no peripheral has been connected before")]
    NoRememberedPeer,
}

/// Failures reported by the transport after an operation was accepted.
#[derive(Debug, Error)]
pub enum TransportFailure {
    #[error("{strategy} scan failed: {failure}")]
    ScanFailed {
        strategy: ScanStrategy,
        failure: ScanFailure,
    },
    #[error("failed to start scanning")]
    ScanStart { source: InteractionError },
    #[error("failed to connect to `{address}`")]
    Connect {
        address: String,
        source: InteractionError,
    },
    #[error("connection to `{address}` was lost")]
    ConnectionLost { address: String },
    #[error("service discovery on `{address}` failed")]
    ServiceDiscovery {
        address: String,
        source: InteractionError,
    },
    #[error("failed to subscribe to `{characteristic}`")]
    Subscribe {
        characteristic: String,
        source: InteractionError,
    },
}

/// Coarse classification used when reporting failures to the user.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    #[strum(to_string = "precondition")]
    Precondition,
    #[strum(to_string = "transport")]
    Transport,
    #[strum(to_string = "protocol mismatch")]
    ProtocolMismatch,
}

/// Errors returned by the link controller's scan and connection operations.
#[derive(Debug, Error, From)]
pub enum LinkError {
    #[error(transparent)]
    #[from(PreconditionFailure)]
    Precondition(PreconditionFailure),
    #[error(transparent)]
    #[from(TransportFailure, Box<TransportFailure>)]
    Transport(Box<TransportFailure>),
    #[error("`{address}` exposes no characteristic that can notify or indicate")]
    NoUsableCharacteristic { address: String },
    #[error("the link controller has shut down")]
    ControllerClosed,
}

impl LinkError {
    /// Returns the reporting class for this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Precondition(_) => ErrorClass::Precondition,
            Self::Transport(_) | Self::ControllerClosed => ErrorClass::Transport,
            Self::NoUsableCharacteristic { .. } => ErrorClass::ProtocolMismatch,
        }
    }
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("missing fake scan fixture while fake mode is enabled")]
    MissingFakeScanFixture,
}

/// Errors that end a CLI command after the controller accepted it.
#[derive(Debug, Error)]
pub(crate) enum CommandError {
    #[error("no peripherals were discovered during the scan window")]
    NoDevicesFound,
    #[error("no discovered peripheral matches {filter}")]
    NoMatchingDevice { filter: String },
    #[error("{class} failure: {reason}")]
    Reported { class: ErrorClass, reason: String },
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(LinkError::Precondition(PreconditionFailure::RadioDisabled), ErrorClass::Precondition)]
    #[case(
        LinkError::from(TransportFailure::ConnectionLost { address: "AA".to_string() }),
        ErrorClass::Transport
    )]
    #[case(
        LinkError::NoUsableCharacteristic { address: "AA".to_string() },
        ErrorClass::ProtocolMismatch
    )]
    fn link_error_reports_its_class(#[case] error: LinkError, #[case] expected: ErrorClass) {
        assert_eq!(expected, error.class());
    }

    #[test]
    fn scan_failure_message_names_strategy_and_code() {
        let error = TransportFailure::ScanFailed {
            strategy: ScanStrategy::Modern,
            failure: ScanFailure::InternalError,
        };
        assert_eq!("modern scan failed: internal error (code 3)", error.to_string());
    }

    #[test]
    fn permission_failure_names_permission() {
        let error = PreconditionFailure::PermissionMissing {
            permission: Permission::Location,
        };
        assert_eq!(
            "the `location` permission has not been granted",
            error.to_string()
        );
    }
}
