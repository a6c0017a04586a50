use std::io;

use anyhow::Result;
use clap::Args;

use crate::hw::PeerStore;

use super::ui::UpdateWriter;

/// Arguments for the `last` command.
#[derive(Debug, Clone, Default, Args)]
pub struct LastArgs {}

/// Executes the `last` command.
pub(crate) fn run<W>(peers: &PeerStore, writer: &UpdateWriter, out: &mut W) -> Result<()>
where
    W: io::Write,
{
    writer.write_last_peer(out, peers.last())
}
