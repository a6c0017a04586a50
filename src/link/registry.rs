use std::collections::HashSet;

use crate::hw::PeripheralIdentity;

/// Peripherals seen during one scan window, deduplicated by address.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    seen: HashSet<String>,
    ordered: Vec<PeripheralIdentity>,
}

impl DeviceRegistry {
    /// Forgets every recorded peripheral.
    pub fn reset(&mut self) {
        self.seen.clear();
        self.ordered.clear();
    }

    /// Records a peripheral unless its address was already seen.
    ///
    /// Returns whether the identity was new.
    pub fn record_if_new(&mut self, identity: PeripheralIdentity) -> bool {
        if !self.seen.insert(identity.address().to_string()) {
            return false;
        }
        self.ordered.push(identity);
        true
    }

    /// Returns recorded peripherals in first-seen order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PeripheralIdentity> {
        self.ordered.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn identity(address: &str, name: Option<&str>) -> PeripheralIdentity {
        PeripheralIdentity::new(address, name.map(ToString::to_string))
    }

    #[test]
    fn record_if_new_keeps_first_seen_order() {
        let mut registry = DeviceRegistry::default();

        assert!(registry.record_if_new(identity("BB", Some("second"))));
        assert!(registry.record_if_new(identity("AA", Some("first"))));
        assert!(!registry.record_if_new(identity("BB", Some("renamed"))));

        let addresses: Vec<_> = registry
            .snapshot()
            .iter()
            .map(|identity| identity.address().to_string())
            .collect();
        assert_eq!(vec!["BB", "AA"], addresses);
        assert_eq!(Some("second"), registry.snapshot()[0].name());
    }

    #[test]
    fn reset_clears_entries() {
        let mut registry = DeviceRegistry::default();
        registry.record_if_new(identity("AA", None));

        registry.reset();

        assert!(registry.is_empty());
        assert!(registry.record_if_new(identity("AA", None)));
        assert_eq!(1, registry.len());
    }
}
