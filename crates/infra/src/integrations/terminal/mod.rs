//! Terminal-management platform integration
//!
//! The platform fronts the physical punch clocks. Access is a bearer token
//! from `POST /login`; the token carries no server-side expiry, so
//! [`TerminalSession`] ages it out client-side and collapses concurrent
//! refreshes into a single login.

pub mod client;
pub mod session;

pub use client::TerminalClient;
pub use session::TerminalSession;
