use std::io;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing::info;

use crate::error::CommandError;
use crate::hw::{HardwareClient, PeerStore, PeripheralIdentity};
use crate::link::DEFAULT_SCAN_WINDOW;

use super::command::parse_duration;
use super::stream::{LinkRuntime, StreamSummary};
use super::ui::{Spinner, UpdateWriter};

/// Arguments for the `listen` command.
#[derive(Debug, Clone, Args)]
pub struct ListenArgs {
    /// Connect to the peripheral with this address.
    #[arg(long, conflicts_with = "name_prefix")]
    device: Option<String>,
    /// Connect to the first peripheral whose advertised name starts with this prefix.
    #[arg(long)]
    name_prefix: Option<String>,
    /// Length of the discovery window (e.g. `500ms`, `10s`).
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    window: Duration,
    /// Stop after this many decoded records. If omitted, listen until Ctrl+C.
    #[arg(long)]
    max_records: Option<usize>,
}

impl ListenArgs {
    /// Creates listen arguments with an optional record limit.
    #[must_use]
    pub fn new(max_records: Option<usize>) -> Self {
        Self {
            device: None,
            name_prefix: None,
            window: DEFAULT_SCAN_WINDOW,
            max_records,
        }
    }

    /// Selects the peripheral by address instead of taking the first one found.
    #[must_use]
    pub fn with_device(mut self, address: impl Into<String>) -> Self {
        self.device = Some(address.into());
        self.name_prefix = None;
        self
    }

    /// Selects the first peripheral whose name starts with `prefix`.
    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self.device = None;
        self
    }

    /// Sets the discovery window.
    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    fn select(&self, devices: Vec<PeripheralIdentity>) -> Result<PeripheralIdentity, CommandError> {
        if devices.is_empty() {
            return Err(CommandError::NoDevicesFound);
        }
        let (filter, selected) = match (&self.device, &self.name_prefix) {
            (Some(address), _) => (
                format!("address `{address}`"),
                devices
                    .into_iter()
                    .find(|device| device.address().eq_ignore_ascii_case(address)),
            ),
            (None, Some(prefix)) => (
                format!("name prefix `{prefix}`"),
                devices
                    .into_iter()
                    .find(|device| device.name_starts_with(prefix)),
            ),
            (None, None) => (String::new(), devices.into_iter().next()),
        };
        selected.ok_or(CommandError::NoMatchingDevice { filter })
    }
}

/// Executes the `listen` command.
pub(crate) async fn run<W>(
    client: Box<dyn HardwareClient>,
    peers: PeerStore,
    args: &ListenArgs,
    writer: &UpdateWriter,
    spinner: &Spinner,
    out: &mut W,
) -> Result<()>
where
    W: io::Write,
{
    let mut runtime = LinkRuntime::start(client, peers, args.window).await?;
    let result = select_and_stream(&mut runtime, args, writer, spinner, out).await;
    runtime.shutdown().await;

    writer.write_summary(out, &result?)
}

async fn select_and_stream<W>(
    runtime: &mut LinkRuntime,
    args: &ListenArgs,
    writer: &UpdateWriter,
    spinner: &Spinner,
    out: &mut W,
) -> Result<StreamSummary>
where
    W: io::Write,
{
    let devices = runtime.discover(writer, spinner, out).await?;
    let peer = args.select(devices)?;
    info!(address = peer.address(), "selected peripheral");
    runtime.handle().connect(peer).await?;
    runtime.stream_records(args.max_records, writer, out).await
}
