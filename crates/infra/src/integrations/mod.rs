//! External service integrations

pub mod chat;
pub mod erp;
pub mod storage;
pub mod terminal;

pub use chat::WebhookNotifier;
pub use erp::ErpProcessClient;
pub use storage::HttpObjectStore;
pub use terminal::{TerminalClient, TerminalSession};
