mod btleplug_backend;
mod fake_backend;
mod hardware;
mod model;
mod peer_store;
mod session;
mod transport;

pub(crate) use self::fake_backend::{
    FakeBackendConfig, NotificationPayloads, ScanFailureQueue, ScanFixture,
};
pub use self::fake_backend::{FakeCallLog, GattFixture, TransportCall};
pub use self::hardware::HardwareClient;
pub(crate) use self::hardware::{HardwareBackend, hardware_client_from_backend};
pub use self::model::{CharacteristicInfo, CharacteristicRef, PeripheralIdentity, ServiceInfo};
pub use self::peer_store::PeerStore;
pub(crate) use self::session::{ResolvedCharacteristic, resolve_stream_characteristic};
pub use self::session::SubscriptionKind;
pub use self::transport::{
    AttemptId, ConnectionState, EventReceiver, EventSender, Permission, ScanFailure, ScanId,
    ScanStrategy, ScanTicket, Transport, TransportEvent,
};
