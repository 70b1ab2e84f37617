//! Domain data types grouped by area.

pub mod equipment;
pub mod jobs;
pub mod records;
pub mod report;

pub use equipment::*;
pub use jobs::*;
pub use records::*;
pub use report::*;
