use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{ErrorClass, LinkError};
use crate::hw::{PeripheralIdentity, ScanStrategy, SubscriptionKind};
use crate::notification::DetectionRecord;

/// Why a scan window closed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStopReason {
    /// The window elapsed; the caller must select a peripheral.
    #[display("window elapsed")]
    WindowElapsed,
    /// The caller stopped the scan.
    #[display("cancelled")]
    Cancelled,
    /// A connection attempt took over the radio.
    #[display("superseded by connect")]
    SupersededByConnect,
}

/// Informational notices that are not failures.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    #[display("a scan is already running")]
    AlreadyScanning,
    #[display("modern scanner registration failed; using legacy scanning from now on")]
    LegacyScanFallback,
}

/// A classified failure with a short human-readable reason.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct FailureNotice {
    class: ErrorClass,
    reason: String,
}

impl FailureNotice {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        self.class
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<&LinkError> for FailureNotice {
    fn from(error: &LinkError) -> Self {
        Self {
            class: error.class(),
            reason: error.to_string(),
        }
    }
}

/// Push-style updates for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LinkUpdate {
    ScanStarted {
        strategy: ScanStrategy,
    },
    /// Carries the registry snapshot; after `WindowElapsed` a selection is required.
    ScanStopped {
        reason: ScanStopReason,
        devices: Vec<PeripheralIdentity>,
    },
    Connecting {
        peer: PeripheralIdentity,
    },
    Connected {
        peer: PeripheralIdentity,
    },
    Streaming {
        characteristic: String,
        kind: SubscriptionKind,
    },
    Disconnected {
        peer: PeripheralIdentity,
    },
    /// Hex and text projection of one accepted notification.
    Payload {
        hex: String,
        text: Option<String>,
    },
    Record {
        record: DetectionRecord,
    },
    InvalidPayload,
    AwaitingData,
    Notice {
        notice: Notice,
    },
    Failure {
        failure: FailureNotice,
    },
}

impl LinkUpdate {
    pub(crate) fn failure(error: &LinkError) -> Self {
        Self::Failure {
            failure: FailureNotice::from(error),
        }
    }
}

/// Sender half of the update stream.
#[derive(Debug, Clone)]
pub(crate) struct Outbox {
    sender: mpsc::UnboundedSender<LinkUpdate>,
}

impl Outbox {
    pub(crate) fn new(sender: mpsc::UnboundedSender<LinkUpdate>) -> Self {
        Self { sender }
    }

    pub(crate) fn send(&self, update: LinkUpdate) {
        if self.sender.send(update).is_err() {
            trace!("presentation channel closed; dropping update");
        }
    }
}
