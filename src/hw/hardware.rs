use async_trait::async_trait;
use tracing::info;

use super::btleplug_backend::BtleplugBackend;
use super::fake_backend::{FakeBackendConfig, FakeTransport};
use super::transport::{EventSender, Transport};
use crate::error::InteractionError;

/// Runtime BLE backend selection.
#[derive(Debug)]
pub(crate) enum HardwareBackend {
    Real,
    Fake(FakeBackendConfig),
}

/// Builds an injected hardware client for the selected runtime backend.
pub(crate) fn hardware_client_from_backend(backend: HardwareBackend) -> Box<dyn HardwareClient> {
    match backend {
        HardwareBackend::Real => Box::new(RealHardwareClient),
        HardwareBackend::Fake(config) => Box::new(FakeHardwareClient { config }),
    }
}

/// Opens a transport bound to an event channel.
#[async_trait]
pub trait HardwareClient: Send + Sync {
    /// Opens the transport; every callback it produces is sent on `events`.
    async fn open(self: Box<Self>, events: EventSender)
    -> Result<Box<dyn Transport>, InteractionError>;
}

#[derive(Debug)]
struct RealHardwareClient;

#[async_trait]
impl HardwareClient for RealHardwareClient {
    async fn open(
        self: Box<Self>,
        events: EventSender,
    ) -> Result<Box<dyn Transport>, InteractionError> {
        Ok(Box::new(BtleplugBackend::new(events).await?))
    }
}

#[derive(Debug)]
struct FakeHardwareClient {
    config: FakeBackendConfig,
}

#[async_trait]
impl HardwareClient for FakeHardwareClient {
    async fn open(
        self: Box<Self>,
        events: EventSender,
    ) -> Result<Box<dyn Transport>, InteractionError> {
        info!("using fake BLE backend");
        let Self { config } = *self;
        Ok(Box::new(FakeTransport::new(config, events)))
    }
}
