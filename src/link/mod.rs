mod connection;
mod controller;
mod registry;
mod scan;
mod update;

pub use connection::{ConnectionSession, SessionState};
pub use controller::{LinkController, LinkHandle};
pub use registry::DeviceRegistry;
pub use scan::{DEFAULT_SCAN_WINDOW, ScanController};
pub use update::{FailureNotice, LinkUpdate, Notice, ScanStopReason};
