//! Import pipeline failure taxonomy.

use punchsync_domain::Stage;
use thiserror::Error;

/// Failure raised by one pipeline stage.
///
/// The variant determines the stage reported in the `ProcessingResult`; the
/// enclosing queue's retry policy decides whether another attempt happens.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("session acquisition failed: {0}")]
    Auth(String),

    #[error("device {0} is not present in the remote catalog")]
    DeviceNotFound(i64),

    #[error("device {device_id} ({name}) is unhealthy: status {status}")]
    DeviceUnhealthy { device_id: i64, name: String, status: String },

    #[error("device discovery failed: {0}")]
    Discovery(String),

    #[error("AFD download failed: {0}")]
    Download(String),

    #[error("artifact archive failed: {0}")]
    Archive(String),

    #[error("ERP import call failed: {0}")]
    ImportCall(String),

    #[error("ERP rejected the import: {response}")]
    ImportRejected { response: String },
}

impl PipelineError {
    /// Stage at which the enclosing run stops.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Auth(_)
            | Self::DeviceNotFound(_)
            | Self::DeviceUnhealthy { .. }
            | Self::Discovery(_) => Stage::Lookup,
            Self::Download(_) => Stage::Download,
            Self::Archive(_) => Stage::Save,
            Self::ImportCall(_) | Self::ImportRejected { .. } => Stage::Import,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_follow_the_state_machine() {
        assert_eq!(PipelineError::Auth("login refused".into()).stage(), Stage::Lookup);
        assert_eq!(PipelineError::DeviceNotFound(6).stage(), Stage::Lookup);
        assert_eq!(PipelineError::Download("timeout".into()).stage(), Stage::Download);
        assert_eq!(PipelineError::Archive("store down".into()).stage(), Stage::Save);
        assert_eq!(PipelineError::ImportCall("502".into()).stage(), Stage::Import);
        assert_eq!(
            PipelineError::ImportRejected { response: "0".into() }.stage(),
            Stage::Import
        );
    }
}
