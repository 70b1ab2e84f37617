//! Equipment catalog and terminal discovery types.

use serde::{Deserialize, Serialize};

use crate::constants::DEVICE_HEALTHY_STATUS;

/// Immutable mapping from a terminal device to its ERP coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentMapping {
    pub device_id: i64,
    pub company_code: i64,
    pub branch_code: i64,
    pub terminal_code: i64,
}

impl EquipmentMapping {
    /// Same device and terminal, imported under a different company.
    #[must_use]
    pub fn with_company(self, company_code: i64) -> Self {
        Self { company_code, ..self }
    }
}

/// Live terminal record as reported by the terminal-management API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDevice {
    pub id: i64,
    pub name: String,
    pub status: String,
}

impl RemoteDevice {
    pub fn is_healthy(&self) -> bool {
        self.status == DEVICE_HEALTHY_STATUS
    }
}

/// Outcome of a targeted discovery pass over the remote catalog.
///
/// Devices never seen on any page are in neither partition; callers decide
/// how to treat misses.
#[derive(Debug, Clone, Default)]
pub struct DeviceLookup {
    pub healthy: Vec<RemoteDevice>,
    pub unhealthy: Vec<RemoteDevice>,
}

impl DeviceLookup {
    pub fn healthy_device(&self, device_id: i64) -> Option<&RemoteDevice> {
        self.healthy.iter().find(|d| d.id == device_id)
    }

    pub fn unhealthy_device(&self, device_id: i64) -> Option<&RemoteDevice> {
        self.unhealthy.iter().find(|d| d.id == device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_matches_exact_status() {
        let device = RemoteDevice { id: 6, name: "Dock A".into(), status: "OK".into() };
        assert!(device.is_healthy());

        let device = RemoteDevice { id: 6, name: "Dock A".into(), status: "Offline".into() };
        assert!(!device.is_healthy());
    }

    #[test]
    fn with_company_keeps_device_coordinates() {
        let mapping =
            EquipmentMapping { device_id: 6, company_code: 1, branch_code: 2, terminal_code: 9006 };
        let mirrored = mapping.with_company(5);

        assert_eq!(mirrored.company_code, 5);
        assert_eq!(mirrored.device_id, 6);
        assert_eq!(mirrored.branch_code, 2);
        assert_eq!(mirrored.terminal_code, 9006);
    }
}
