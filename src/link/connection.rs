use serde::Serialize;
use tracing::{debug, info, instrument, trace, warn};

use super::update::{LinkUpdate, Outbox};
use crate::error::{InteractionError, LinkError, PreconditionFailure, TransportFailure};
use crate::hw::{
    AttemptId, CharacteristicRef, ConnectionState, PeerStore, PeripheralIdentity, Permission,
    ResolvedCharacteristic, Transport, resolve_stream_characteristic,
};
use crate::notification::{DecodeOutcome, DetectionRecord, PayloadDecoder};

/// Lifecycle state of the connection session.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[display("disconnected")]
    Disconnected,
    #[display("connecting")]
    Connecting,
    #[display("service discovery")]
    ServiceDiscovery,
    #[display("subscribing")]
    Subscribing,
    #[display("streaming")]
    Streaming,
    /// Connected, but nothing on the peripheral can push data.
    #[display("stalled")]
    Stalled,
}

#[derive(Debug)]
struct ActiveSession {
    attempt: AttemptId,
    target: PeripheralIdentity,
    state: SessionState,
    resolved: Option<ResolvedCharacteristic>,
}

/// Owns the single peripheral connection and its subscription.
#[derive(Debug, Default)]
pub struct ConnectionSession {
    session: Option<ActiveSession>,
    last_record: Option<DetectionRecord>,
    next_attempt: u64,
}

impl ConnectionSession {
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Disconnected, |session| session.state)
    }

    /// Peripheral targeted by the open session.
    #[must_use]
    pub fn target(&self) -> Option<&PeripheralIdentity> {
        self.session.as_ref().map(|session| &session.target)
    }

    /// Characteristic whose notifications are decoded.
    #[must_use]
    pub fn active_characteristic(&self) -> Option<&CharacteristicRef> {
        self.session
            .as_ref()
            .and_then(|session| session.resolved.as_ref())
            .map(|resolved| &resolved.characteristic)
    }

    /// Most recent successfully decoded record of the open session.
    #[must_use]
    pub fn last_record(&self) -> Option<&DetectionRecord> {
        self.last_record.as_ref()
    }

    fn current_mut(&mut self, attempt: AttemptId) -> Option<&mut ActiveSession> {
        self.session
            .as_mut()
            .filter(|session| session.attempt == attempt)
    }

    /// Fails when the platform would refuse a connection attempt.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionFailure::PermissionMissing`] for the connect
    /// permission.
    pub(crate) fn check_connect_permission(transport: &dyn Transport) -> Result<(), LinkError> {
        if transport.has_permission(Permission::Connect) {
            Ok(())
        } else {
            Err(PreconditionFailure::PermissionMissing {
                permission: Permission::Connect,
            }
            .into())
        }
    }

    /// Resolves the remembered peer and checks it can be connected to now.
    ///
    /// Nothing is changed, so a failure here leaves any open scan or session
    /// as it was.
    ///
    /// # Errors
    ///
    /// Returns a precondition failure when no peer is remembered, the radio is
    /// off or the connect permission is missing.
    pub(crate) async fn reconnect_target(
        transport: &dyn Transport,
        peers: &PeerStore,
    ) -> Result<PeripheralIdentity, LinkError> {
        let Some(peer) = peers.last().cloned() else {
            return Err(PreconditionFailure::NoRememberedPeer.into());
        };
        let radio_enabled = transport.is_radio_enabled().await.map_err(|source| {
            TransportFailure::Connect {
                address: peer.address().to_string(),
                source,
            }
        })?;
        if !radio_enabled {
            return Err(PreconditionFailure::RadioDisabled.into());
        }
        Self::check_connect_permission(transport)?;
        Ok(peer)
    }

    /// Opens a session, force-closing any previous one first.
    ///
    /// The target is remembered before the attempt is made so a failed attempt
    /// can still be retried with [`ConnectionSession::reconnect_target`].
    ///
    /// # Errors
    ///
    /// Returns a precondition failure without touching existing state when the
    /// connect permission is missing, or a transport failure when the platform
    /// rejects the attempt.
    #[instrument(skip_all, level = "debug", fields(address = identity.address()))]
    pub(crate) async fn connect(
        &mut self,
        identity: PeripheralIdentity,
        transport: &mut dyn Transport,
        peers: &mut PeerStore,
        outbox: &Outbox,
    ) -> Result<(), LinkError> {
        Self::check_connect_permission(transport)?;

        self.close_session(transport, outbox).await;

        if let Err(error) = peers.remember(&identity) {
            warn!(?error, "failed to persist last connected peer");
        }

        self.next_attempt += 1;
        let attempt = AttemptId::from(self.next_attempt);
        self.session = Some(ActiveSession {
            attempt,
            target: identity.clone(),
            state: SessionState::Connecting,
            resolved: None,
        });
        info!(%attempt, "connecting");
        outbox.send(LinkUpdate::Connecting {
            peer: identity.clone(),
        });

        if let Err(source) = transport.connect(attempt, &identity).await {
            self.session = None;
            transport.close().await;
            outbox.send(LinkUpdate::Disconnected {
                peer: identity.clone(),
            });
            return Err(TransportFailure::Connect {
                address: identity.address().to_string(),
                source,
            }
            .into());
        }
        Ok(())
    }

    /// Disconnects and closes the open session; does nothing when disconnected.
    pub(crate) async fn disconnect(&mut self, transport: &mut dyn Transport, outbox: &Outbox) {
        if self.session.is_none() {
            return;
        }
        if let Err(error) = transport.disconnect().await {
            debug!(?error, "transport disconnect failed; closing anyway");
        }
        self.close_session(transport, outbox).await;
    }

    async fn close_session(&mut self, transport: &mut dyn Transport, outbox: &Outbox) {
        let Some(session) = self.session.take() else {
            return;
        };
        transport.close().await;
        self.last_record = None;
        info!(attempt = %session.attempt, "session closed");
        outbox.send(LinkUpdate::Disconnected {
            peer: session.target,
        });
    }

    /// Applies a link-layer state change for an attempt.
    pub(crate) async fn on_connection_state(
        &mut self,
        attempt: AttemptId,
        state: ConnectionState,
        transport: &mut dyn Transport,
        outbox: &Outbox,
    ) -> Option<LinkError> {
        let Some(session) = self.current_mut(attempt) else {
            trace!(%attempt, %state, "ignoring state change for inactive attempt");
            return None;
        };

        match state {
            ConnectionState::Connected => {
                if session.state != SessionState::Connecting {
                    trace!(%attempt, current = %session.state, "ignoring repeated connect");
                    return None;
                }
                session.state = SessionState::ServiceDiscovery;
                let address = session.target.address().to_string();
                info!(%attempt, "connected; discovering services");
                outbox.send(LinkUpdate::Connected {
                    peer: session.target.clone(),
                });

                if let Err(source) = transport.discover_services().await {
                    return Some(
                        self.fail_and_close(
                            TransportFailure::ServiceDiscovery { address, source }.into(),
                            transport,
                            outbox,
                        )
                        .await,
                    );
                }
                None
            }
            ConnectionState::Disconnected => {
                let address = session.target.address().to_string();
                warn!(%attempt, "peripheral disconnected");
                Some(
                    self.fail_and_close(
                        TransportFailure::ConnectionLost { address }.into(),
                        transport,
                        outbox,
                    )
                    .await,
                )
            }
        }
    }

    /// Resolves and subscribes to the streaming characteristic.
    pub(crate) async fn on_services_discovered(
        &mut self,
        attempt: AttemptId,
        transport: &mut dyn Transport,
        outbox: &Outbox,
    ) -> Option<LinkError> {
        let services = transport.services();
        let Some(session) = self.current_mut(attempt) else {
            trace!(%attempt, "ignoring service discovery for inactive attempt");
            return None;
        };
        if session.state != SessionState::ServiceDiscovery {
            trace!(%attempt, current = %session.state, "ignoring repeated service discovery");
            return None;
        }

        let Some(resolved) = resolve_stream_characteristic(&services) else {
            session.state = SessionState::Stalled;
            let error = LinkError::NoUsableCharacteristic {
                address: session.target.address().to_string(),
            };
            warn!(%attempt, "no notifiable characteristic; awaiting disconnect");
            outbox.send(LinkUpdate::failure(&error));
            return Some(error);
        };

        info!(
            %attempt,
            characteristic = resolved.characteristic.uuid(),
            source = %resolved.source,
            "subscribing"
        );
        session.state = SessionState::Subscribing;
        session.resolved = Some(resolved.clone());

        if let Err(source) = transport
            .set_notification(&resolved.characteristic, true)
            .await
        {
            return Some(self.subscribe_failed(&resolved, source, transport, outbox).await);
        }

        match &resolved.cccd {
            Some(cccd) => {
                let value = resolved.kind.descriptor_value();
                if let Err(source) = transport
                    .write_descriptor(&resolved.characteristic, cccd, &value)
                    .await
                {
                    return Some(self.subscribe_failed(&resolved, source, transport, outbox).await);
                }
            }
            None => self.enter_streaming(outbox),
        }
        None
    }

    /// Completes the subscription once the configuration descriptor is written.
    pub(crate) fn on_descriptor_written(
        &mut self,
        attempt: AttemptId,
        characteristic: &CharacteristicRef,
        outbox: &Outbox,
    ) {
        let matches = self.current_mut(attempt).is_some_and(|session| {
            session.state == SessionState::Subscribing
                && session
                    .resolved
                    .as_ref()
                    .is_some_and(|resolved| resolved.characteristic == *characteristic)
        });
        if matches {
            self.enter_streaming(outbox);
        } else {
            trace!(%attempt, "ignoring descriptor write for inactive subscription");
        }
    }

    fn enter_streaming(&mut self, outbox: &Outbox) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(resolved) = &session.resolved else {
            return;
        };
        session.state = SessionState::Streaming;
        info!(characteristic = resolved.characteristic.uuid(), "streaming");
        outbox.send(LinkUpdate::Streaming {
            characteristic: resolved.characteristic.uuid().to_string(),
            kind: resolved.kind,
        });
    }

    /// Decodes a notification addressed to the active characteristic.
    ///
    /// Notifications for other characteristics, other attempts, or arriving
    /// outside `Streaming` are dropped.
    pub(crate) fn on_characteristic_changed(
        &mut self,
        attempt: AttemptId,
        uuid: &str,
        value: &[u8],
        outbox: &Outbox,
    ) {
        let accepted = self.session.as_ref().is_some_and(|session| {
            session.attempt == attempt
                && session.state == SessionState::Streaming
                && session
                    .resolved
                    .as_ref()
                    .is_some_and(|resolved| resolved.characteristic.matches_uuid(uuid))
        });
        if !accepted {
            trace!(%attempt, uuid, "dropping notification for inactive characteristic");
            return;
        }

        let (hex, text, outcome) = PayloadDecoder::decode(value).into_parts();
        outbox.send(LinkUpdate::Payload { hex, text });
        match outcome {
            DecodeOutcome::Decoded(record) => {
                debug!(kind = record.kind(), target_id = record.target_id(), "decoded record");
                self.last_record = Some(record.clone());
                outbox.send(LinkUpdate::Record { record });
            }
            DecodeOutcome::Invalid => outbox.send(LinkUpdate::InvalidPayload),
            DecodeOutcome::NoText => outbox.send(LinkUpdate::AwaitingData),
        }
    }

    async fn subscribe_failed(
        &mut self,
        resolved: &ResolvedCharacteristic,
        source: InteractionError,
        transport: &mut dyn Transport,
        outbox: &Outbox,
    ) -> LinkError {
        let error = TransportFailure::Subscribe {
            characteristic: resolved.characteristic.uuid().to_string(),
            source,
        };
        self.fail_and_close(error.into(), transport, outbox).await
    }

    async fn fail_and_close(
        &mut self,
        error: LinkError,
        transport: &mut dyn Transport,
        outbox: &Outbox,
    ) -> LinkError {
        outbox.send(LinkUpdate::failure(&error));
        self.close_session(transport, outbox).await;
        error
    }
}
