use std::io;

use anyhow::Result;
use tracing::instrument;

use crate::cli::ui::{Spinner, UpdateWriter};
use crate::cli::{Command, FakeArgs, LogLevel, OutputFormat, RunOptions};
use crate::hw::{HardwareBackend, HardwareClient, PeerStore, hardware_client_from_backend};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Creates a hardware client backed by the real BLE transport.
#[must_use]
pub fn real_hardware_client() -> Box<dyn HardwareClient> {
    hardware_client_from_backend(HardwareBackend::Real)
}

/// Creates a hardware client backed by fake BLE fixtures.
#[must_use]
pub fn fake_hardware_client(fake_args: FakeArgs) -> Box<dyn HardwareClient> {
    hardware_client_from_backend(HardwareBackend::Fake(fake_args.into_backend_config()))
}

/// Runs the CLI command against the process terminal.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = dronelink::Args::try_parse_from([
///     "dronelink",
///     "--fake",
///     "--fake-scan",
///     "AA:BB:CC|drone|-43",
///     "scan",
///     "--window",
///     "50ms",
/// ])?;
/// let options = args.run_options();
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let hardware_client = match maybe_fake_args {
///     Some(fake_args) => dronelink::fake_hardware_client(fake_args),
///     None => dronelink::real_hardware_client(),
/// };
/// let mut out = Vec::new();
/// dronelink::run(command, &mut out, hardware_client, options).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the peer store cannot be
/// loaded, BLE interaction fails, or output writing fails.
pub async fn run<W>(
    command: Command,
    out: &mut W,
    hardware_client: Box<dyn HardwareClient>,
    options: RunOptions,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients(
        command,
        out,
        &SystemTerminalClient,
        hardware_client,
        options,
    )
    .await
}

/// Runs the CLI command with injected clients.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// struct FakeTerminal;
/// impl dronelink::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let options = dronelink::RunOptions::builder()
///     .output_format(dronelink::OutputFormat::Json)
///     .peer_store(std::env::temp_dir().join("dronelink-doc-peer.json"))
///     .build();
/// let mut out = Vec::new();
/// dronelink::run_with_clients(
///     dronelink::Command::Last(Default::default()),
///     &mut out,
///     &FakeTerminal,
///     dronelink::real_hardware_client(),
///     options,
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the peer store cannot be
/// loaded, BLE interaction fails, or output writing fails.
#[instrument(
    skip(out, terminal_client, hardware_client, options),
    level = "info",
    fields(command = %command_name(&command))
)]
pub async fn run_with_clients<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    hardware_client: Box<dyn HardwareClient>,
    options: RunOptions,
) -> Result<()>
where
    W: io::Write,
{
    let interactive = terminal_client.stderr_is_terminal();
    telemetry::initialise_tracing(
        "dronelink",
        interactive,
        options.log_level().map(LogLevel::as_level_filter),
    )?;

    let output_format = options
        .output_format()
        .unwrap_or(if terminal_client.stdout_is_terminal() {
            OutputFormat::Pretty
        } else {
            OutputFormat::Json
        });
    let writer = UpdateWriter::new(output_format, terminal_client.stdout_is_terminal());
    let spinner = Spinner::new(interactive && output_format == OutputFormat::Pretty);
    let peers = PeerStore::load(options.peer_store())?;

    match command {
        Command::Scan(args) => {
            crate::cli::scan::run(hardware_client, peers, &args, &writer, &spinner, out).await
        }
        Command::Listen(args) => {
            crate::cli::listen::run(hardware_client, peers, &args, &writer, &spinner, out).await
        }
        Command::Reconnect(args) => {
            crate::cli::reconnect::run(hardware_client, peers, &args, &writer, out).await
        }
        Command::Last(_args) => crate::cli::last::run(&peers, &writer, out),
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Scan(_args) => "scan",
        Command::Listen(_args) => "listen",
        Command::Reconnect(_args) => "reconnect",
        Command::Last(_args) => "last",
    }
}
