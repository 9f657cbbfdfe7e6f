//! Sheetmap API Server module
//!
//! HTTP REST API over the conversion engine.
//! Run with `sheetmap-server`.

pub mod handlers;
pub mod server;

pub use server::{router, run_api_server, AppState};
