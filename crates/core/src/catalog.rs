//! Equipment catalog with O(1) device resolution and company mirroring.

use std::collections::HashMap;

use punchsync_domain::constants::{COMPANY_MIRRORS, MAPPED_EQUIPMENT};
use punchsync_domain::EquipmentMapping;

/// Preloaded device → ERP coordinate catalog.
///
/// Backed by the compiled-in table by default; tests may construct arbitrary
/// catalogs. Iteration order follows the table, lookups go through an index.
pub struct EquipmentCatalog {
    entries: Vec<EquipmentMapping>,
    by_device: HashMap<i64, usize>,
    mirrors: HashMap<i64, i64>,
}

impl EquipmentCatalog {
    pub fn new(entries: Vec<EquipmentMapping>, mirrors: &[(i64, i64)]) -> Self {
        let by_device = entries.iter().enumerate().map(|(idx, m)| (m.device_id, idx)).collect();
        Self { entries, by_device, mirrors: mirrors.iter().copied().collect() }
    }

    /// Catalog compiled into the binary.
    pub fn builtin() -> Self {
        Self::new(MAPPED_EQUIPMENT.to_vec(), COMPANY_MIRRORS)
    }

    pub fn resolve(&self, device_id: i64) -> Option<&EquipmentMapping> {
        self.by_device.get(&device_id).map(|idx| &self.entries[*idx])
    }

    /// Partner company sharing this company's terminals, if any.
    pub fn mirror_of(&self, company_code: i64) -> Option<i64> {
        self.mirrors.get(&company_code).copied()
    }

    pub fn entries(&self) -> &[EquipmentMapping] {
        &self.entries
    }

    pub fn device_ids(&self) -> Vec<i64> {
        self.entries.iter().map(|m| m.device_id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for EquipmentCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_resolves_every_mapped_device() {
        let catalog = EquipmentCatalog::builtin();
        assert_eq!(catalog.len(), 7);

        let mapping = catalog.resolve(6).expect("device 6 mapped");
        assert_eq!(mapping.company_code, 1);
        assert_eq!(mapping.branch_code, 2);
        assert_eq!(mapping.terminal_code, 9006);
    }

    #[test]
    fn unknown_devices_resolve_to_none() {
        let catalog = EquipmentCatalog::builtin();
        assert!(catalog.resolve(99).is_none());
    }

    #[test]
    fn mirror_is_symmetric_for_the_configured_pair() {
        let catalog = EquipmentCatalog::builtin();
        assert_eq!(catalog.mirror_of(1), Some(5));
        assert_eq!(catalog.mirror_of(5), Some(1));
        assert_eq!(catalog.mirror_of(2), None);
    }

    #[test]
    fn custom_catalogs_use_their_own_tables() {
        let entries = vec![EquipmentMapping {
            device_id: 42,
            company_code: 7,
            branch_code: 1,
            terminal_code: 9042,
        }];
        let catalog = EquipmentCatalog::new(entries, &[(7, 8)]);

        assert_eq!(catalog.resolve(42).map(|m| m.terminal_code), Some(9042));
        assert_eq!(catalog.mirror_of(7), Some(8));
        assert_eq!(catalog.mirror_of(8), None);
    }
}
