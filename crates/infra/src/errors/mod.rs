//! Error conversions between external crates and the domain error type.

mod conversions;

pub use conversions::InfraError;
