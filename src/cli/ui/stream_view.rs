use std::fmt::{self, Display, Formatter};

use crate::cli::stream::{StreamStopReason, StreamSummary};
use crate::link::LinkUpdate;
use crate::notification::DetectionRecord;
use crate::protocol;
use crate::utils::format_coordinate;

use super::device_view::DeviceListView;
use super::painter::Painter;

/// Renders one link update as human-readable text.
pub(crate) struct UpdateView<'a> {
    update: &'a LinkUpdate,
    painter: &'a Painter,
}

impl<'a> UpdateView<'a> {
    pub(crate) fn new(update: &'a LinkUpdate, painter: &'a Painter) -> Self {
        Self { update, painter }
    }
}

impl Display for UpdateView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let painter = self.painter;
        match self.update {
            LinkUpdate::ScanStarted { strategy } => write!(
                f,
                "{} {}",
                painter.heading("Scanning"),
                painter.muted(format!("({strategy} scan)"))
            ),
            LinkUpdate::ScanStopped { reason, devices } => {
                write!(
                    f,
                    "{} {reason} {}",
                    painter.heading("Scan stopped:"),
                    painter.value(format!("- {} device(s)", devices.len()))
                )?;
                write!(f, "\n{}", DeviceListView::new(devices, painter))
            }
            LinkUpdate::Connecting { peer } => {
                write!(f, "Connecting to {}", painter.value(peer.address()))
            }
            LinkUpdate::Connected { peer } => write!(
                f,
                "{} to {}",
                painter.success("Connected"),
                painter.value(peer.address())
            ),
            LinkUpdate::Streaming {
                characteristic,
                kind,
            } => {
                let detail = match protocol::endpoint_name(characteristic) {
                    Some(name) => format!("({kind}, {name})"),
                    None => format!("({kind})"),
                };
                write!(
                    f,
                    "{} {} {}",
                    painter.heading("Streaming"),
                    painter.value(characteristic),
                    painter.muted(detail)
                )
            }
            LinkUpdate::Disconnected { peer } => write!(
                f,
                "{} from {}",
                painter.warning("Disconnected"),
                painter.value(peer.address())
            ),
            LinkUpdate::Payload { hex, text } => {
                write!(f, "{} raw={hex}", painter.muted("payload"))?;
                if let Some(text) = text {
                    write!(f, " text={text:?}")?;
                }
                Ok(())
            }
            LinkUpdate::Record { record } => write!(f, "{}", RecordView::new(record, painter)),
            LinkUpdate::InvalidPayload => write!(
                f,
                "{} {}",
                painter.warning("invalid payload"),
                painter.muted("(no TYPE, ID, LAT, LON record)")
            ),
            LinkUpdate::AwaitingData => write!(f, "{}", painter.muted("awaiting parseable data")),
            LinkUpdate::Notice { notice } => write!(f, "{} {notice}", painter.warning("notice:")),
            LinkUpdate::Failure { failure } => write!(
                f,
                "{} {}",
                painter.failure(format!("{} failure:", failure.class())),
                failure.reason()
            ),
        }
    }
}

/// Renders a decoded detection record on one line.
pub(crate) struct RecordView<'a> {
    record: &'a DetectionRecord,
    painter: &'a Painter,
}

impl<'a> RecordView<'a> {
    pub(crate) fn new(record: &'a DetectionRecord, painter: &'a Painter) -> Self {
        Self { record, painter }
    }
}

impl Display for RecordView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} #{} at {}, {}",
            self.painter.success("record"),
            self.painter.value(self.record.kind()),
            self.record.target_id(),
            format_coordinate(self.record.latitude()),
            format_coordinate(self.record.longitude())
        )
    }
}

/// Renders the end-of-stream summary.
pub(crate) struct StreamSummaryView<'a> {
    summary: &'a StreamSummary,
    painter: &'a Painter,
}

impl<'a> StreamSummaryView<'a> {
    pub(crate) fn new(summary: &'a StreamSummary, painter: &'a Painter) -> Self {
        Self { summary, painter }
    }
}

impl Display for StreamSummaryView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let reason = self.summary.stop_reason();
        let stop_reason = match reason {
            StreamStopReason::ReachedLimit => self.painter.success(reason.to_string()),
            StreamStopReason::Interrupted | StreamStopReason::PeerDisconnected => {
                self.painter.warning(reason.to_string())
            }
        };
        write!(
            f,
            "{} {} {}",
            self.painter.heading("Stopped:"),
            stop_reason,
            self.painter
                .value(format!("- received {} record(s)", self.summary.records()))
        )
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use rstest::rstest;

    use super::*;
    use crate::error::{LinkError, PreconditionFailure};
    use crate::hw::{PeripheralIdentity, ScanStrategy, SubscriptionKind};
    use crate::link::Notice;

    fn render(update: &LinkUpdate) -> String {
        let painter = Painter::new(false);
        UpdateView::new(update, &painter).to_string()
    }

    #[test]
    fn record_renders_six_decimal_coordinates() {
        let update = LinkUpdate::Record {
            record: DetectionRecord::new("bird", 4, 45.2, -75.3),
        };

        assert_snapshot!(render(&update), @"record bird #4 at 45.200000, -75.300000");
    }

    #[test]
    fn payload_renders_hex_and_text() {
        let update = LinkUpdate::Payload {
            hex: "68 69".to_string(),
            text: Some("hi".to_string()),
        };

        assert_snapshot!(render(&update), @r#"payload raw=68 69 text="hi""#);
    }

    #[test]
    fn payload_without_text_omits_text() {
        let update = LinkUpdate::Payload {
            hex: "00 01".to_string(),
            text: None,
        };

        assert_snapshot!(render(&update), @"payload raw=00 01");
    }

    #[rstest]
    #[case::scan_started(
        LinkUpdate::ScanStarted { strategy: ScanStrategy::Legacy },
        "Scanning (legacy scan)"
    )]
    #[case::connecting(
        LinkUpdate::Connecting { peer: PeripheralIdentity::new("AA:BB", None) },
        "Connecting to AA:BB"
    )]
    #[case::streaming(
        LinkUpdate::Streaming {
            characteristic: "00002a67-0000-1000-8000-00805f9b34fb".to_string(),
            kind: SubscriptionKind::Indicate,
        },
        "Streaming 00002a67-0000-1000-8000-00805f9b34fb (indicate, Location and Speed)"
    )]
    #[case::awaiting(LinkUpdate::AwaitingData, "awaiting parseable data")]
    #[case::notice(
        LinkUpdate::Notice { notice: Notice::AlreadyScanning },
        "notice: a scan is already running"
    )]
    #[case::failure(
        LinkUpdate::failure(&LinkError::Precondition(PreconditionFailure::RadioDisabled)),
        "precondition failure: the Bluetooth radio is turned off"
    )]
    fn single_line_updates_render(#[case] update: LinkUpdate, #[case] expected: &str) {
        pretty_assertions::assert_eq!(expected, render(&update));
    }

    #[test]
    fn summary_renders_stop_reason_and_count() {
        let summary = StreamSummary::new(2, StreamStopReason::ReachedLimit);
        let painter = Painter::new(false);

        assert_snapshot!(
            StreamSummaryView::new(&summary, &painter).to_string(),
            @"Stopped: reached record limit - received 2 record(s)"
        );
    }
}
