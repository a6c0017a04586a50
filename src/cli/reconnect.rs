use std::io;

use anyhow::Result;
use clap::Args;

use crate::hw::{HardwareClient, PeerStore};
use crate::link::DEFAULT_SCAN_WINDOW;

use super::stream::{LinkRuntime, StreamSummary};
use super::ui::UpdateWriter;

/// Arguments for the `reconnect` command.
#[derive(Debug, Clone, Default, Args)]
pub struct ReconnectArgs {
    /// Stop after this many decoded records. If omitted, listen until Ctrl+C.
    #[arg(long)]
    max_records: Option<usize>,
}

impl ReconnectArgs {
    /// Creates reconnect arguments with an optional record limit.
    #[must_use]
    pub fn new(max_records: Option<usize>) -> Self {
        Self { max_records }
    }
}

/// Executes the `reconnect` command.
pub(crate) async fn run<W>(
    client: Box<dyn HardwareClient>,
    peers: PeerStore,
    args: &ReconnectArgs,
    writer: &UpdateWriter,
    out: &mut W,
) -> Result<()>
where
    W: io::Write,
{
    let mut runtime = LinkRuntime::start(client, peers, DEFAULT_SCAN_WINDOW).await?;
    let result = reconnect_and_stream(&mut runtime, args, writer, out).await;
    runtime.shutdown().await;

    writer.write_summary(out, &result?)
}

async fn reconnect_and_stream<W>(
    runtime: &mut LinkRuntime,
    args: &ReconnectArgs,
    writer: &UpdateWriter,
    out: &mut W,
) -> Result<StreamSummary>
where
    W: io::Write,
{
    runtime.handle().reconnect_to_last().await?;
    runtime.stream_records(args.max_records, writer, out).await
}
