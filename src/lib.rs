mod app;
mod cli;
mod error;
mod hw;
mod link;
mod notification;
mod protocol;
mod telemetry;
mod terminal;
mod utils;

pub use app::{fake_hardware_client, real_hardware_client, run, run_with_clients};
pub use cli::{
    Args, Command, FakeArgs, LastArgs, ListenArgs, LogLevel, OutputFormat, ReconnectArgs,
    RunOptions, ScanArgs,
};
pub use error::{
    ErrorClass, FixtureError, InteractionError, LinkError, PreconditionFailure, TransportFailure,
};
pub use hw::{
    AttemptId, CharacteristicInfo, CharacteristicRef, ConnectionState, EventReceiver, EventSender,
    FakeCallLog, GattFixture, HardwareClient, PeerStore, PeripheralIdentity, Permission,
    ScanFailure, ScanId, ScanStrategy, ScanTicket, ServiceInfo, SubscriptionKind, Transport,
    TransportCall, TransportEvent,
};
pub use link::{
    ConnectionSession, DEFAULT_SCAN_WINDOW, DeviceRegistry, FailureNotice, LinkController,
    LinkHandle, LinkUpdate, Notice, ScanController, ScanStopReason, SessionState,
};
pub use notification::{DecodeOutcome, DecodedPayload, DetectionRecord, PayloadDecoder};
pub use protocol::EndpointId;
pub use terminal::TerminalClient;
