use std::path::PathBuf;
use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::cli::last::LastArgs;
use crate::cli::listen::ListenArgs;
use crate::cli::reconnect::ReconnectArgs;
use crate::cli::scan::ScanArgs;
use crate::error::{CliConfigError, FixtureError};
use crate::hw::{
    FakeBackendConfig, FakeCallLog, GattFixture, NotificationPayloads, Permission,
    ScanFailureQueue, ScanFixture,
};

/// Command-line options for the detection-stream BLE client.
#[derive(Debug, Parser)]
#[command(
    name = "dronelink",
    about = "Discover, connect to, and stream detection records from BLE peripherals."
)]
pub struct Args {
    /// Overrides `RUST_LOG` with a single log level.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output style; defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output_format: Option<OutputFormat>,
    /// File holding the remembered peer; defaults to the platform state directory.
    #[arg(long, global = true)]
    peer_store: Option<PathBuf>,
    /// Uses the fake BLE backend with fixture-driven discovery and payloads.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake scan fixtures in the form `address|name|rssi;...`.
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_scan: Option<ScanFixture>,
    /// Fake notification payloads, `;`-separated hex or `text:` literals.
    #[arg(long, global = true, requires = "fake")]
    fake_notifications: Option<NotificationPayloads>,
    /// GATT layout exposed by the fake peripheral.
    #[arg(long, global = true, requires = "fake")]
    fake_gatt: Option<GattFixture>,
    /// Comma-separated platform scan error codes, one consumed per scan start.
    #[arg(long, global = true, requires = "fake")]
    fake_scan_failures: Option<ScanFailureQueue>,
    /// Reports the fake radio as turned off.
    #[arg(long, global = true, requires = "fake")]
    fake_radio_off: bool,
    /// Reports the fake platform as unable to scan.
    #[arg(long, global = true, requires = "fake")]
    fake_scan_unsupported: bool,
    /// Comma-separated permissions the fake platform has not granted.
    #[arg(long, global = true, requires = "fake", value_delimiter = ',')]
    fake_deny: Vec<Permission>,
    /// Makes every fake connection attempt fail.
    #[arg(long, global = true, requires = "fake")]
    fake_connect_fails: bool,
    /// Artificial fake discovery delay (e.g. `250ms`, `2s`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_discovery_delay: Option<Duration>,
    #[arg(skip)]
    fake_call_log: FakeCallLog,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use dronelink::{Args, Command, ListenArgs};
    ///
    /// let last = Args::new(Command::Last(Default::default()));
    /// let listen = Args::new(Command::Listen(ListenArgs::new(Some(10))));
    /// let _ = (last, listen);
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            log_level: None,
            output_format: None,
            peer_store: None,
            fake: false,
            fake_scan: None,
            fake_notifications: None,
            fake_gatt: None,
            fake_scan_failures: None,
            fake_radio_off: false,
            fake_scan_unsupported: false,
            fake_deny: Vec::new(),
            fake_connect_fails: false,
            fake_discovery_delay: None,
            fake_call_log: FakeCallLog::default(),
            command,
        }
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = Some(output_format);
        self
    }

    /// Sets the remembered-peer file.
    #[must_use]
    pub fn with_peer_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.peer_store = Some(path.into());
        self
    }

    /// Enables fake backend mode with pre-parsed fake configuration.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            scan,
            notifications,
            gatt,
            scan_failures,
            radio_off,
            scan_unsupported,
            denied_permissions,
            connect_fails,
            discovery_delay,
            call_log,
        } = fake;

        self.fake = true;
        self.fake_scan = Some(scan);
        self.fake_notifications = notifications;
        self.fake_gatt = Some(gatt);
        self.fake_scan_failures = Some(scan_failures);
        self.fake_radio_off = radio_off;
        self.fake_scan_unsupported = scan_unsupported;
        self.fake_deny = denied_permissions;
        self.fake_connect_fails = connect_fails;
        self.fake_discovery_delay = Some(discovery_delay);
        self.fake_call_log = call_log;
        self
    }

    /// Returns the log level override, if any.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Returns the options that apply to every command.
    #[must_use]
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            log_level: self.log_level,
            output_format: self.output_format,
            peer_store: self.peer_store.clone(),
        }
    }

    /// Splits parsed CLI arguments into command and optional fake-client settings.
    ///
    /// # Errors
    ///
    /// Returns an error if CLI backend configuration is invalid.
    pub fn into_command_and_fake_args(self) -> anyhow::Result<(Command, Option<FakeArgs>)> {
        let Args {
            fake,
            fake_scan,
            fake_notifications,
            fake_gatt,
            fake_scan_failures,
            fake_radio_off,
            fake_scan_unsupported,
            fake_deny,
            fake_connect_fails,
            fake_discovery_delay,
            fake_call_log,
            command,
            ..
        } = self;

        let fake_args = if fake {
            let Some(scan) = fake_scan else {
                return Err(CliConfigError::MissingFakeScanFixture.into());
            };
            Some(FakeArgs {
                scan,
                notifications: fake_notifications,
                gatt: fake_gatt.unwrap_or_default(),
                scan_failures: fake_scan_failures.unwrap_or_default(),
                radio_off: fake_radio_off,
                scan_unsupported: fake_scan_unsupported,
                denied_permissions: fake_deny,
                connect_fails: fake_connect_fails,
                discovery_delay: fake_discovery_delay.unwrap_or(Duration::ZERO),
                call_log: fake_call_log,
            })
        } else {
            None
        };

        Ok((command, fake_args))
    }
}

/// Options shared by every command.
#[derive(Debug, Clone, Default, Builder)]
pub struct RunOptions {
    log_level: Option<LogLevel>,
    output_format: Option<OutputFormat>,
    #[builder(into)]
    peer_store: Option<PathBuf>,
}

impl RunOptions {
    pub(crate) fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    pub(crate) fn output_format(&self) -> Option<OutputFormat> {
        self.output_format
    }

    pub(crate) fn peer_store(&self) -> Option<&std::path::Path> {
        self.peer_store.as_deref()
    }
}

/// Fake backend arguments for programmatic runs.
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    scan: ScanFixture,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    notifications: Option<NotificationPayloads>,
    #[builder(default)]
    gatt: GattFixture,
    #[builder(
        default,
        with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() }
    )]
    scan_failures: ScanFailureQueue,
    #[builder(default)]
    radio_off: bool,
    #[builder(default)]
    scan_unsupported: bool,
    #[builder(default)]
    denied_permissions: Vec<Permission>,
    #[builder(default)]
    connect_fails: bool,
    #[builder(default)]
    discovery_delay: Duration,
    /// Records every transport call the fake receives.
    #[builder(default)]
    call_log: FakeCallLog,
}

impl FakeArgs {
    pub(crate) fn into_backend_config(self) -> FakeBackendConfig {
        let Self {
            scan,
            notifications,
            gatt,
            scan_failures,
            radio_off,
            scan_unsupported,
            denied_permissions,
            connect_fails,
            discovery_delay,
            call_log,
        } = self;

        FakeBackendConfig::builder()
            .scan_fixture(scan)
            .maybe_notifications(notifications)
            .gatt(gatt)
            .scan_failures(scan_failures)
            .radio_off(radio_off)
            .scan_unsupported(scan_unsupported)
            .denied_permissions(denied_permissions)
            .connect_fails(connect_fails)
            .discovery_delay(discovery_delay)
            .call_log(call_log)
            .build()
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one discovery window and print every peripheral seen.
    Scan(ScanArgs),
    /// Scan, pick a peripheral, connect, and stream decoded detection records.
    Listen(ListenArgs),
    /// Connect to the remembered peripheral and stream decoded detection records.
    Reconnect(ReconnectArgs),
    /// Print the remembered peripheral.
    Last(LastArgs),
}

/// Log level override for telemetry.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// How command output is written to stdout.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable views.
    Pretty,
    /// One JSON object per line.
    Json,
}

pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
