//! Process configuration shared by the CLI and the server.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::address::MAX_ROW;

pub const DEFAULT_TEMPLATES_DIR: &str = "templates";
pub const DEFAULT_CONFIG_FILE: &str = "template_config.json";
/// 10 MiB
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_ROWS_PER_RUN: usize = 1000;
pub const DEFAULT_MAX_SOURCES_PER_RUN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub templates_dir: PathBuf,
    /// File name inside `templates_dir` (.json, .yaml or .yml)
    pub config_file: String,
    pub max_file_size: usize,
    pub max_rows_per_run: usize,
    pub max_sources_per_run: usize,
    pub host: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from(DEFAULT_TEMPLATES_DIR),
            config_file: DEFAULT_CONFIG_FILE.to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_rows_per_run: DEFAULT_MAX_ROWS_PER_RUN,
            max_sources_per_run: DEFAULT_MAX_SOURCES_PER_RUN,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl AppConfig {
    pub fn engine_limits(&self) -> EngineLimits {
        EngineLimits {
            max_rows_per_run: self.max_rows_per_run,
            max_sheet_rows: MAX_ROW,
            max_sources_per_run: self.max_sources_per_run,
        }
    }
}

/// Bounds enforced on multi-source runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    /// Capacity check: rows one run may produce
    pub max_rows_per_run: usize,
    /// Capacity check: last addressable row of the output sheet
    pub max_sheet_rows: u32,
    /// Request guard: sources accepted in one request
    pub max_sources_per_run: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_rows_per_run: DEFAULT_MAX_ROWS_PER_RUN,
            max_sheet_rows: MAX_ROW,
            max_sources_per_run: DEFAULT_MAX_SOURCES_PER_RUN,
        }
    }
}
