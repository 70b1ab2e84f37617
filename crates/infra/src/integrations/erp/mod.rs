//! ERP process API integration
//!
//! The ERP exposes its batch-import procedure over a REST process endpoint.
//! The call is a fire-and-trigger: the response body is the scheduling
//! verdict, not the import outcome, which lands asynchronously in the ERP
//! job registry.

pub mod client;

pub use client::ErpProcessClient;
