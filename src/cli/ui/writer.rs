use std::io;

use anyhow::Result;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::cli::stream::StreamSummary;
use crate::hw::PeripheralIdentity;
use crate::link::LinkUpdate;

use super::device_view::PeripheralView;
use super::painter::Painter;
use super::stream_view::{StreamSummaryView, UpdateView};

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename = "last_peer")]
struct LastPeerLine<'a> {
    peer: Option<&'a PeripheralIdentity>,
}

/// Writes command output as pretty views or JSON lines.
#[derive(Debug)]
pub(crate) struct UpdateWriter {
    format: OutputFormat,
    painter: Painter,
}

impl UpdateWriter {
    pub(crate) fn new(format: OutputFormat, use_colour: bool) -> Self {
        Self {
            format,
            painter: Painter::new(use_colour && format == OutputFormat::Pretty),
        }
    }

    pub(crate) fn write_update<W>(&self, out: &mut W, update: &LinkUpdate) -> Result<()>
    where
        W: io::Write,
    {
        match self.format {
            OutputFormat::Pretty => writeln!(out, "{}", UpdateView::new(update, &self.painter))?,
            OutputFormat::Json => write_json_line(out, update)?,
        }
        Ok(())
    }

    pub(crate) fn write_summary<W>(&self, out: &mut W, summary: &StreamSummary) -> Result<()>
    where
        W: io::Write,
    {
        match self.format {
            OutputFormat::Pretty => {
                writeln!(out)?;
                writeln!(out, "{}", StreamSummaryView::new(summary, &self.painter))?;
            }
            OutputFormat::Json => write_json_line(out, summary)?,
        }
        Ok(())
    }

    pub(crate) fn write_last_peer<W>(
        &self,
        out: &mut W,
        peer: Option<&PeripheralIdentity>,
    ) -> Result<()>
    where
        W: io::Write,
    {
        match (self.format, peer) {
            (OutputFormat::Pretty, Some(peer)) => {
                writeln!(out, "{}", self.painter.heading("Remembered peer:"))?;
                writeln!(out, "{}", PeripheralView::new(peer, &self.painter))?;
            }
            (OutputFormat::Pretty, None) => writeln!(
                out,
                "{}",
                self.painter.warning("No peripheral has been connected yet.")
            )?,
            (OutputFormat::Json, peer) => write_json_line(out, &LastPeerLine { peer })?,
        }
        Ok(())
    }
}

fn write_json_line<W, T>(out: &mut W, value: &T) -> Result<()>
where
    W: io::Write,
    T: Serialize + ?Sized,
{
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
