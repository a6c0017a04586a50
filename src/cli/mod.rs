pub(crate) mod command;
pub(crate) mod last;
pub(crate) mod listen;
pub(crate) mod reconnect;
pub(crate) mod scan;
pub(crate) mod stream;
pub(crate) mod ui;

pub use self::command::{Args, Command, FakeArgs, LogLevel, OutputFormat, RunOptions};
pub use self::last::LastArgs;
pub use self::listen::ListenArgs;
pub use self::reconnect::ReconnectArgs;
pub use self::scan::ScanArgs;
