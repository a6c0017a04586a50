use std::io;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::{CommandError, InteractionError, LinkError};
use crate::hw::{HardwareClient, PeerStore, PeripheralIdentity};
use crate::link::{LinkController, LinkHandle, LinkUpdate, Notice, ScanStopReason};

use super::ui::{Spinner, UpdateWriter};

/// Why a record stream ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum StreamStopReason {
    #[display("reached record limit")]
    ReachedLimit,
    #[display("interrupted")]
    Interrupted,
    #[display("peer disconnected")]
    PeerDisconnected,
}

/// Totals reported when a record stream ends.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(tag = "event", rename = "summary")]
pub(crate) struct StreamSummary {
    records: usize,
    stop_reason: StreamStopReason,
}

impl StreamSummary {
    pub(crate) fn new(records: usize, stop_reason: StreamStopReason) -> Self {
        Self {
            records,
            stop_reason,
        }
    }

    pub(crate) fn records(&self) -> usize {
        self.records
    }

    pub(crate) fn stop_reason(&self) -> StreamStopReason {
        self.stop_reason
    }
}

/// A link controller running on its own task, plus the channels to drive it.
pub(crate) struct LinkRuntime {
    handle: LinkHandle,
    updates: mpsc::UnboundedReceiver<LinkUpdate>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LinkRuntime {
    /// Opens the transport and spawns the controller loop.
    pub(crate) async fn start(
        client: Box<dyn HardwareClient>,
        peers: PeerStore,
        scan_window: Duration,
    ) -> Result<Self, InteractionError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = client.open(events_tx).await?;
        let (updates_tx, updates) = mpsc::unbounded_channel();
        let controller = LinkController::new(transport, events_rx, peers, updates_tx, scan_window);
        let handle = controller.handle();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(controller.run(cancel.clone()));

        Ok(Self {
            handle,
            updates,
            cancel,
            task,
        })
    }

    pub(crate) fn handle(&self) -> &LinkHandle {
        &self.handle
    }

    async fn next_update(&mut self) -> Result<LinkUpdate, LinkError> {
        self.updates.recv().await.ok_or(LinkError::ControllerClosed)
    }

    /// Runs discovery windows until one elapses and returns its snapshot.
    ///
    /// A legacy-scan fallback notice restarts discovery with the pinned
    /// strategy.
    #[instrument(skip_all, level = "info")]
    pub(crate) async fn discover<W>(
        &mut self,
        writer: &UpdateWriter,
        spinner: &Spinner,
        out: &mut W,
    ) -> Result<Vec<PeripheralIdentity>>
    where
        W: io::Write,
    {
        loop {
            self.handle.start_scan().await?;
            let outcome = spinner
                .with_spinner(
                    "Scanning for peripherals...",
                    self.wait_for_scan_outcome(writer, out),
                )
                .await?;
            match outcome {
                Some(devices) => return Ok(devices),
                None => info!("retrying discovery with the legacy scanner"),
            }
        }
    }

    async fn wait_for_scan_outcome<W>(
        &mut self,
        writer: &UpdateWriter,
        out: &mut W,
    ) -> Result<Option<Vec<PeripheralIdentity>>>
    where
        W: io::Write,
    {
        loop {
            let update = self.next_update().await?;
            writer.write_update(out, &update)?;
            match update {
                LinkUpdate::ScanStopped {
                    reason: ScanStopReason::WindowElapsed,
                    devices,
                } => return Ok(Some(devices)),
                LinkUpdate::Notice {
                    notice: Notice::LegacyScanFallback,
                } => return Ok(None),
                LinkUpdate::Failure { failure } => {
                    return Err(CommandError::Reported {
                        class: failure.class(),
                        reason: failure.reason().to_string(),
                    }
                    .into());
                }
                _ => {}
            }
        }
    }

    /// Prints updates until the record limit, Ctrl+C, or the peer goes away.
    #[instrument(skip(self, writer, out), level = "info")]
    pub(crate) async fn stream_records<W>(
        &mut self,
        max_records: Option<usize>,
        writer: &UpdateWriter,
        out: &mut W,
    ) -> Result<StreamSummary>
    where
        W: io::Write,
    {
        let mut records = 0usize;
        if max_records == Some(0) {
            return Ok(StreamSummary::new(records, StreamStopReason::ReachedLimit));
        }

        let stop_reason = loop {
            let update = tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal.map_err(|source| InteractionError::CtrlC { source })?;
                    break StreamStopReason::Interrupted;
                }
                update = self.next_update() => update?,
            };
            writer.write_update(out, &update)?;

            match update {
                LinkUpdate::Record { .. } => {
                    records += 1;
                    if max_records.is_some_and(|limit| records >= limit) {
                        break StreamStopReason::ReachedLimit;
                    }
                }
                LinkUpdate::Disconnected { .. } => break StreamStopReason::PeerDisconnected,
                LinkUpdate::Failure { failure } => {
                    return Err(CommandError::Reported {
                        class: failure.class(),
                        reason: failure.reason().to_string(),
                    }
                    .into());
                }
                _ => {}
            }
        };

        debug!(records, %stop_reason, "record stream ended");
        Ok(StreamSummary::new(records, stop_reason))
    }

    /// Cancels the controller and waits for it to tear down the link.
    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(error) = self.task.await {
            debug!(?error, "link controller task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn summary_serialises_with_event_tag() -> anyhow::Result<()> {
        let summary = StreamSummary::new(3, StreamStopReason::PeerDisconnected);

        assert_eq!(
            r#"{"event":"summary","records":3,"stop_reason":"peer_disconnected"}"#,
            serde_json::to_string(&summary)?
        );
        Ok(())
    }
}
