//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! application.

use crate::types::EquipmentMapping;

/// Static catalog of every terminal wired into the import routine.
///
/// Device ids are the terminal-management API ids; company, branch and
/// collection-terminal codes are the ERP coordinates the punches are imported
/// under.
pub const MAPPED_EQUIPMENT: &[EquipmentMapping] = &[
    EquipmentMapping { device_id: 6, company_code: 1, branch_code: 2, terminal_code: 9006 },
    EquipmentMapping { device_id: 1, company_code: 5, branch_code: 1, terminal_code: 9003 },
    EquipmentMapping { device_id: 2, company_code: 5, branch_code: 1, terminal_code: 9004 },
    EquipmentMapping { device_id: 9, company_code: 1, branch_code: 5, terminal_code: 9005 },
    EquipmentMapping { device_id: 3, company_code: 1, branch_code: 1, terminal_code: 9007 },
    EquipmentMapping { device_id: 4, company_code: 1, branch_code: 7, terminal_code: 9001 },
    EquipmentMapping { device_id: 5, company_code: 1, branch_code: 7, terminal_code: 9002 },
];

/// Company pairs that share physical terminals; each side of a pair also
/// imports under the other.
pub const COMPANY_MIRRORS: &[(i64, i64)] = &[(1, 5), (5, 1)];

// Terminal-management API
pub const DEVICE_HEALTHY_STATUS: &str = "OK";
pub const DEVICE_PAGE_SIZE: usize = 100;

// ERP batch-import process signature
pub const ERP_PROCESS_SERVER: &str = "PtoProcImportacaoBatidas";
pub const ERP_PROCESS_ACTION: &str = "PtoActionProcImportacaoBatidas";
pub const ERP_PROCESS_LABEL: &str = "Importação de Batidas";
pub const ERP_PROCESS_USER: &str = "PortalMatriculaInt";
pub const ERP_CLOCK_LAYOUT: &str = "001";
pub const ERP_SUCCESS_SENTINEL: &str = "1";

// Queue job key prefixes (stable: keys outlive process restarts)
pub const IMPORT_JOB_KEY_PREFIX: &str = "importacao";
pub const NOTIFY_JOB_KEY_PREFIX: &str = "notificacao-job";
