//! CLI command handlers

pub mod commands;
pub mod session;

pub use commands::{batch, convert, merge, parse_date, templates};
pub use session::Session;
