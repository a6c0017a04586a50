use std::fmt::{self, Display, Formatter};

use crate::hw::PeripheralIdentity;
use crate::utils::format_rssi;

use super::painter::Painter;
use super::table::Table;

const UNKNOWN_NAME: &str = "<unknown>";

/// Renders one peripheral as a key-value table.
pub(crate) struct PeripheralView<'a> {
    peer: &'a PeripheralIdentity,
    painter: &'a Painter,
}

impl<'a> PeripheralView<'a> {
    pub(crate) fn new(peer: &'a PeripheralIdentity, painter: &'a Painter) -> Self {
        Self { peer, painter }
    }
}

impl Display for PeripheralView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = self.peer.name().unwrap_or(UNKNOWN_NAME);
        let table = Table::key_value(
            self.painter,
            vec![
                ("address", self.painter.value(self.peer.address())),
                ("name", self.painter.value(name)),
            ],
        );
        write!(f, "{table}")
    }
}

/// Renders a scan snapshot in first-seen order.
pub(crate) struct DeviceListView<'a> {
    devices: &'a [PeripheralIdentity],
    painter: &'a Painter,
}

impl<'a> DeviceListView<'a> {
    pub(crate) fn new(devices: &'a [PeripheralIdentity], painter: &'a Painter) -> Self {
        Self { devices, painter }
    }
}

impl Display for DeviceListView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.devices.is_empty() {
            return write!(f, "{}", self.painter.warning("No devices found."));
        }

        let rows = self
            .devices
            .iter()
            .enumerate()
            .map(|(index, device)| {
                vec![
                    (index + 1).to_string(),
                    self.painter.value(device.address()),
                    device.name().unwrap_or(UNKNOWN_NAME).to_string(),
                    format_rssi(device.rssi()),
                ]
            })
            .collect();
        let table = Table::grid(["#", "address", "name", "rssi"], rows);
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn peripheral_view_shows_unknown_name() {
        let peer = PeripheralIdentity::new("AA:BB", None);
        let painter = Painter::new(false);

        assert_snapshot!(PeripheralView::new(&peer, &painter).to_string(), @r"
        ╭─────────┬───────────╮
        │ field   │ value     │
        ├─────────┼───────────┤
        │ address │ AA:BB     │
        │ name    │ <unknown> │
        ╰─────────┴───────────╯
        ");
    }

    #[test]
    fn device_list_numbers_devices_in_order() {
        let devices = vec![
            PeripheralIdentity::new("AA:BB", Some("drone".into())).with_rssi(Some(-43)),
            PeripheralIdentity::new("CC:DD", None),
        ];
        let painter = Painter::new(false);

        assert_snapshot!(DeviceListView::new(&devices, &painter).to_string(), @r"
        ╭───┬─────────┬───────────┬──────╮
        │ # │ address │ name      │ rssi │
        ├───┼─────────┼───────────┼──────┤
        │ 1 │ AA:BB   │ drone     │ -43  │
        │ 2 │ CC:DD   │ <unknown> │ -    │
        ╰───┴─────────┴───────────┴──────╯
        ");
    }

    #[test]
    fn empty_device_list_says_so() {
        let painter = Painter::new(false);

        assert_snapshot!(DeviceListView::new(&[], &painter).to_string(), @"No devices found.");
    }
}
