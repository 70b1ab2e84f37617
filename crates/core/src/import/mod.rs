//! Import pipeline domain

pub mod error;
pub mod pipeline;
pub mod routine;

pub use error::PipelineError;
pub use pipeline::{afd_file_name, is_sentinel_success, ImportPipeline, ImportPipelineConfig};
pub use routine::ImportRoutine;
