use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use super::connection::ConnectionSession;
use super::scan::ScanController;
use super::update::{LinkUpdate, Outbox, ScanStopReason};
use crate::error::LinkError;
use crate::hw::{EventReceiver, PeerStore, PeripheralIdentity, Transport, TransportEvent};

const COMMAND_CHANNEL_CAPACITY: usize = 16;

type Reply = oneshot::Sender<Result<(), LinkError>>;

#[derive(Debug)]
enum LinkCommand {
    StartScan(Reply),
    StopScan(Reply),
    Connect(PeripheralIdentity, Reply),
    ReconnectToLast(Reply),
    Disconnect(Reply),
}

/// Single owner of scan and connection state.
///
/// Commands, transport events and the scan deadline are applied one at a
/// time, either through [`LinkController::run`] or by calling the methods
/// directly.
pub struct LinkController {
    transport: Box<dyn Transport>,
    events: EventReceiver,
    commands: mpsc::Receiver<LinkCommand>,
    command_sender: Option<mpsc::Sender<LinkCommand>>,
    scan: ScanController,
    session: ConnectionSession,
    peers: PeerStore,
    outbox: Outbox,
}

impl LinkController {
    /// Creates a controller over an opened transport.
    ///
    /// `events` must be the receiver paired with the sender the transport was
    /// opened with; every [`LinkUpdate`] is pushed to `updates`.
    #[must_use]
    pub fn new(
        transport: Box<dyn Transport>,
        events: EventReceiver,
        peers: PeerStore,
        updates: mpsc::UnboundedSender<LinkUpdate>,
        scan_window: Duration,
    ) -> Self {
        let (command_sender, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        Self {
            transport,
            events,
            commands,
            command_sender: Some(command_sender),
            scan: ScanController::new(scan_window),
            session: ConnectionSession::default(),
            peers,
            outbox: Outbox::new(updates),
        }
    }

    /// Returns a handle for issuing commands to [`LinkController::run`].
    ///
    /// The run loop ends once every handle has been dropped.
    #[must_use]
    pub fn handle(&self) -> LinkHandle {
        LinkHandle {
            sender: self.command_sender.clone(),
        }
    }

    #[must_use]
    pub fn scan(&self) -> &ScanController {
        &self.scan
    }

    #[must_use]
    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    #[must_use]
    pub fn peers(&self) -> &PeerStore {
        &self.peers
    }

    /// Opens a discovery window.
    ///
    /// # Errors
    ///
    /// Returns the precondition or transport failure that prevented scanning.
    pub async fn start_scan(&mut self) -> Result<(), LinkError> {
        let result = self
            .scan
            .start_scan(self.transport.as_mut(), &self.outbox)
            .await;
        self.report(result)
    }

    /// Stops the discovery window, if one is open.
    pub async fn stop_scan(&mut self) {
        self.scan
            .stop_scan(
                self.transport.as_mut(),
                &self.outbox,
                ScanStopReason::Cancelled,
            )
            .await;
    }

    /// Connects to a peripheral, stopping any active scan first.
    ///
    /// A failed precondition leaves the scan running.
    ///
    /// # Errors
    ///
    /// Returns the precondition or transport failure that prevented connecting.
    pub async fn connect(&mut self, identity: PeripheralIdentity) -> Result<(), LinkError> {
        let permitted = ConnectionSession::check_connect_permission(self.transport.as_ref());
        let result = match permitted {
            Ok(()) => self.open_session(identity).await,
            Err(error) => Err(error),
        };
        self.report(result)
    }

    /// Connects to the remembered peer.
    ///
    /// # Errors
    ///
    /// Returns a precondition failure when there is no remembered peer or the
    /// radio is off, or the failure from connecting.
    pub async fn reconnect_to_last(&mut self) -> Result<(), LinkError> {
        let target = ConnectionSession::reconnect_target(self.transport.as_ref(), &self.peers).await;
        let result = match target {
            Ok(peer) => self.open_session(peer).await,
            Err(error) => Err(error),
        };
        self.report(result)
    }

    async fn open_session(&mut self, identity: PeripheralIdentity) -> Result<(), LinkError> {
        self.scan
            .stop_scan(
                self.transport.as_mut(),
                &self.outbox,
                ScanStopReason::SupersededByConnect,
            )
            .await;
        self.session
            .connect(identity, self.transport.as_mut(), &mut self.peers, &self.outbox)
            .await
    }

    /// Disconnects the open session, if any.
    pub async fn disconnect(&mut self) {
        self.session
            .disconnect(self.transport.as_mut(), &self.outbox)
            .await;
    }

    fn report(&self, result: Result<(), LinkError>) -> Result<(), LinkError> {
        if let Err(error) = &result {
            debug!(%error, class = %error.class(), "command failed");
            self.outbox.send(LinkUpdate::failure(error));
        }
        result
    }

    /// Applies every transport event already queued.
    ///
    /// Returns how many events were applied.
    pub async fn process_pending_events(&mut self) -> usize {
        let mut applied = 0usize;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event).await;
            applied += 1;
        }
        applied
    }

    /// Closes the scan window if its deadline has passed.
    ///
    /// Returns the snapshot to select from when the window closed.
    pub async fn poll_deadline(&mut self) -> Option<Vec<PeripheralIdentity>> {
        self.scan
            .on_deadline(self.transport.as_mut(), &self.outbox)
            .await
    }

    /// Applies one transport event.
    pub async fn handle_event(&mut self, event: TransportEvent) {
        let transport = self.transport.as_mut();
        let outbox = &self.outbox;
        match event {
            TransportEvent::Discovered { scan, identity } => {
                self.scan.on_discovered(scan, identity);
            }
            TransportEvent::ScanFailed { scan, failure } => {
                self.scan.on_scan_failed(scan, failure, outbox);
            }
            TransportEvent::ConnectionStateChanged { attempt, state } => {
                self.session
                    .on_connection_state(attempt, state, transport, outbox)
                    .await;
            }
            TransportEvent::ServicesDiscovered { attempt } => {
                self.session
                    .on_services_discovered(attempt, transport, outbox)
                    .await;
            }
            TransportEvent::DescriptorWritten {
                attempt,
                characteristic,
            } => {
                self.session
                    .on_descriptor_written(attempt, &characteristic, outbox);
            }
            TransportEvent::CharacteristicChanged {
                attempt,
                uuid,
                value,
            } => {
                self.session
                    .on_characteristic_changed(attempt, &uuid, &value, outbox);
            }
        }
    }

    async fn handle_command(&mut self, command: LinkCommand) {
        let (result, reply) = match command {
            LinkCommand::StartScan(reply) => (self.start_scan().await, reply),
            LinkCommand::StopScan(reply) => {
                self.stop_scan().await;
                (Ok(()), reply)
            }
            LinkCommand::Connect(identity, reply) => (self.connect(identity).await, reply),
            LinkCommand::ReconnectToLast(reply) => (self.reconnect_to_last().await, reply),
            LinkCommand::Disconnect(reply) => {
                self.disconnect().await;
                (Ok(()), reply)
            }
        };
        if reply.send(result).is_err() {
            trace!("command caller went away before the reply");
        }
    }

    /// Runs the serialised event loop until cancelled or every handle is dropped.
    ///
    /// Any open scan or session is torn down before returning.
    #[instrument(skip_all, level = "debug")]
    pub async fn run(mut self, cancel: CancellationToken) {
        self.command_sender = None;
        info!("link controller running");

        loop {
            let deadline = self.scan.deadline();
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                () = wait_for(deadline) => {
                    self.poll_deadline().await;
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
            }
        }

        self.stop_scan().await;
        self.disconnect().await;
        info!("link controller stopped");
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cloneable command handle for a running [`LinkController`].
#[derive(Debug, Clone)]
pub struct LinkHandle {
    sender: Option<mpsc::Sender<LinkCommand>>,
}

impl LinkHandle {
    async fn request(
        &self,
        command: impl FnOnce(Reply) -> LinkCommand,
    ) -> Result<(), LinkError> {
        let sender = self.sender.as_ref().ok_or(LinkError::ControllerClosed)?;
        let (reply, response) = oneshot::channel();
        sender
            .send(command(reply))
            .await
            .map_err(|_error| LinkError::ControllerClosed)?;
        response.await.map_err(|_error| LinkError::ControllerClosed)?
    }

    /// Opens a discovery window.
    ///
    /// # Errors
    ///
    /// Returns the failure that prevented scanning, or
    /// [`LinkError::ControllerClosed`] when the controller is gone.
    pub async fn start_scan(&self) -> Result<(), LinkError> {
        self.request(LinkCommand::StartScan).await
    }

    /// Stops the discovery window.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ControllerClosed`] when the controller is gone.
    pub async fn stop_scan(&self) -> Result<(), LinkError> {
        self.request(LinkCommand::StopScan).await
    }

    /// Connects to a peripheral.
    ///
    /// # Errors
    ///
    /// Returns the failure that prevented connecting, or
    /// [`LinkError::ControllerClosed`] when the controller is gone.
    pub async fn connect(&self, identity: PeripheralIdentity) -> Result<(), LinkError> {
        self.request(|reply| LinkCommand::Connect(identity, reply))
            .await
    }

    /// Connects to the remembered peer.
    ///
    /// # Errors
    ///
    /// Returns the failure that prevented reconnecting, or
    /// [`LinkError::ControllerClosed`] when the controller is gone.
    pub async fn reconnect_to_last(&self) -> Result<(), LinkError> {
        self.request(LinkCommand::ReconnectToLast).await
    }

    /// Disconnects the open session.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ControllerClosed`] when the controller is gone.
    pub async fn disconnect(&self) -> Result<(), LinkError> {
        self.request(LinkCommand::Disconnect).await
    }
}
