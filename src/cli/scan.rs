use std::io;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

use crate::hw::{HardwareClient, PeerStore};
use crate::link::DEFAULT_SCAN_WINDOW;

use super::command::parse_duration;
use super::stream::LinkRuntime;
use super::ui::{Spinner, UpdateWriter};

/// Arguments for the `scan` command.
#[derive(Debug, Clone, Args)]
pub struct ScanArgs {
    /// Length of the discovery window (e.g. `500ms`, `10s`).
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    window: Duration,
}

impl ScanArgs {
    /// Creates scan arguments with an explicit window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self { window }
    }
}

impl Default for ScanArgs {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_WINDOW)
    }
}

/// Executes the `scan` command.
pub(crate) async fn run<W>(
    client: Box<dyn HardwareClient>,
    peers: PeerStore,
    args: &ScanArgs,
    writer: &UpdateWriter,
    spinner: &Spinner,
    out: &mut W,
) -> Result<()>
where
    W: io::Write,
{
    let mut runtime = LinkRuntime::start(client, peers, args.window).await?;
    let result = runtime.discover(writer, spinner, out).await;
    runtime.shutdown().await;
    result.map(|_devices| ())
}
