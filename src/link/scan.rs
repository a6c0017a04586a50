use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

use super::registry::DeviceRegistry;
use super::update::{LinkUpdate, Notice, Outbox, ScanStopReason};
use crate::error::{LinkError, PreconditionFailure, TransportFailure};
use crate::hw::{PeripheralIdentity, ScanFailure, ScanId, ScanStrategy, ScanTicket, Transport};

/// Default discovery window.
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum ScanState {
    Idle,
    Scanning { id: ScanId, deadline: Instant },
}

/// Time-boxed discovery with a one-way Modern to Legacy strategy downgrade.
#[derive(Debug)]
pub struct ScanController {
    state: ScanState,
    strategy: ScanStrategy,
    registry: DeviceRegistry,
    window: Duration,
    next_id: u64,
}

impl ScanController {
    /// Creates an idle controller using the modern strategy.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            state: ScanState::Idle,
            strategy: ScanStrategy::Modern,
            registry: DeviceRegistry::default(),
            window,
            next_id: 0,
        }
    }

    /// Strategy the next scan will use.
    #[must_use]
    pub fn strategy(&self) -> ScanStrategy {
        self.strategy
    }

    #[must_use]
    pub fn is_scanning(&self) -> bool {
        matches!(self.state, ScanState::Scanning { .. })
    }

    /// Deadline of the active scan window, if scanning.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            ScanState::Idle => None,
            ScanState::Scanning { deadline, .. } => Some(deadline),
        }
    }

    /// Peripherals recorded during the current or most recent window.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PeripheralIdentity> {
        self.registry.snapshot()
    }

    /// Starts a discovery window.
    ///
    /// Starting while a window is open only reports [`Notice::AlreadyScanning`].
    ///
    /// # Errors
    ///
    /// Returns a precondition failure when the radio is off, scanning is not
    /// supported, or the strategy's permission is missing; returns a transport
    /// failure when the platform rejects the scan request.
    #[instrument(skip_all, level = "debug", fields(strategy = %self.strategy))]
    pub(crate) async fn start_scan(
        &mut self,
        transport: &mut dyn Transport,
        outbox: &Outbox,
    ) -> Result<(), LinkError> {
        if self.is_scanning() {
            debug!("scan already running");
            outbox.send(LinkUpdate::Notice {
                notice: Notice::AlreadyScanning,
            });
            return Ok(());
        }

        if let Err(error) = transport.stop_scan().await {
            debug!(?error, "failed to stop stray scan");
        }

        self.check_preconditions(transport).await?;

        self.registry.reset();
        self.next_id += 1;
        let id = ScanId::from(self.next_id);
        self.state = ScanState::Scanning {
            id,
            deadline: Instant::now() + self.window,
        };
        info!(%id, window = ?self.window, "scan started");
        outbox.send(LinkUpdate::ScanStarted {
            strategy: self.strategy,
        });

        let ticket = ScanTicket {
            id,
            strategy: self.strategy,
        };
        if let Err(source) = transport.start_scan(ticket).await {
            self.state = ScanState::Idle;
            return Err(TransportFailure::ScanStart { source }.into());
        }
        Ok(())
    }

    async fn check_preconditions(&self, transport: &dyn Transport) -> Result<(), LinkError> {
        let radio_enabled = transport
            .is_radio_enabled()
            .await
            .map_err(|source| TransportFailure::ScanStart { source })?;
        if !radio_enabled {
            return Err(PreconditionFailure::RadioDisabled.into());
        }
        if !transport.is_scan_supported() {
            return Err(PreconditionFailure::ScanUnsupported.into());
        }
        let permission = self.strategy.required_permission();
        if !transport.has_permission(permission) {
            return Err(PreconditionFailure::PermissionMissing { permission }.into());
        }
        Ok(())
    }

    /// Records a discovery belonging to the active window.
    pub(crate) fn on_discovered(&mut self, scan: ScanId, identity: PeripheralIdentity) {
        match self.state {
            ScanState::Scanning { id, .. } if id == scan => {
                let address = identity.address().to_string();
                if self.registry.record_if_new(identity) {
                    debug!(%address, "discovered peripheral");
                }
            }
            _ => trace!(%scan, "ignoring discovery from inactive scan"),
        }
    }

    /// Closes the window once its deadline passed.
    ///
    /// Returns the snapshot the caller must choose from, which may be empty.
    pub(crate) async fn on_deadline(
        &mut self,
        transport: &mut dyn Transport,
        outbox: &Outbox,
    ) -> Option<Vec<PeripheralIdentity>> {
        let ScanState::Scanning { deadline, .. } = self.state else {
            return None;
        };
        if Instant::now() < deadline {
            return None;
        }

        Some(
            self.finish(transport, outbox, ScanStopReason::WindowElapsed)
                .await,
        )
    }

    /// Stops the active window; does nothing when idle.
    pub(crate) async fn stop_scan(
        &mut self,
        transport: &mut dyn Transport,
        outbox: &Outbox,
        reason: ScanStopReason,
    ) {
        if self.is_scanning() {
            self.finish(transport, outbox, reason).await;
        }
    }

    async fn finish(
        &mut self,
        transport: &mut dyn Transport,
        outbox: &Outbox,
        reason: ScanStopReason,
    ) -> Vec<PeripheralIdentity> {
        self.state = ScanState::Idle;
        if let Err(error) = transport.stop_scan().await {
            warn!(?error, "failed to stop transport scan");
        }

        let devices = self.registry.snapshot();
        info!(%reason, device_count = devices.len(), "scan stopped");
        outbox.send(LinkUpdate::ScanStopped {
            reason,
            devices: devices.clone(),
        });
        devices
    }

    /// Handles a fatal scan error from the transport.
    ///
    /// Returns the failure that ended the window, or `None` for stale reports.
    pub(crate) fn on_scan_failed(
        &mut self,
        scan: ScanId,
        failure: ScanFailure,
        outbox: &Outbox,
    ) -> Option<LinkError> {
        match self.state {
            ScanState::Scanning { id, .. } if id == scan => {}
            _ => {
                trace!(%scan, %failure, "ignoring failure from inactive scan");
                return None;
            }
        }

        self.state = ScanState::Idle;
        let strategy = self.strategy;
        let error = LinkError::from(TransportFailure::ScanFailed { strategy, failure });

        if failure.is_registration_failure() && strategy == ScanStrategy::Modern {
            warn!(%failure, "pinning discovery to legacy scanning");
            self.strategy = ScanStrategy::Legacy;
            outbox.send(LinkUpdate::Notice {
                notice: Notice::LegacyScanFallback,
            });
        } else {
            warn!(%failure, %strategy, "scan failed");
            outbox.send(LinkUpdate::failure(&error));
        }
        Some(error)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn new_controller_is_idle_and_modern() {
        let controller = ScanController::new(DEFAULT_SCAN_WINDOW);

        assert!(!controller.is_scanning());
        assert_eq!(ScanStrategy::Modern, controller.strategy());
        assert_eq!(None, controller.deadline());
    }

    #[test]
    fn failure_while_idle_is_ignored() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let outbox = Outbox::new(sender);
        let mut controller = ScanController::new(DEFAULT_SCAN_WINDOW);

        let outcome =
            controller.on_scan_failed(ScanId::from(7), ScanFailure::RegistrationFailed, &outbox);

        assert!(outcome.is_none());
        assert_eq!(ScanStrategy::Modern, controller.strategy());
        assert!(receiver.try_recv().is_err());
    }
}
