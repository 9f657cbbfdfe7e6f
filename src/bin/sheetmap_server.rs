//! Sheetmap API Server binary
//!
//! HTTP REST API for template conversion.
//! Provides convert, batch, merge and template endpoints.

use clap::Parser;
use royalbit_sheetmap::api::run_api_server;
use royalbit_sheetmap::config::AppConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sheetmap-server")]
#[command(version)]
#[command(author = "RoyalBit Inc. <admin@royalbit.ca>")]
#[command(about = "Sheetmap API Server - HTTP REST API for workbook template conversion")]
#[command(long_about = r#"
Sheetmap API Server - HTTP REST API

Provides RESTful endpoints for all conversion modes:
  - POST /api/v1/convert           - Fill one template from one source
  - POST /api/v1/batch             - Fill several templates into a zip archive
  - POST /api/v1/merge             - Fold several sources into one template
  - GET  /api/v1/templates         - List templates
  - POST /api/v1/templates/reload  - Reload the template configuration

Additional endpoints:
  - GET  /health           - Health check
  - GET  /version          - Server version info
  - GET  /                 - API documentation

Settings come from --config (YAML), then any flag or SHEETMAP_* variable
given overrides the file.

Example usage:
  sheetmap-server --templates-dir ./templates
  sheetmap-server --config sheetmap.yaml --port 3000

  curl -X POST http://localhost:8080/api/v1/convert \
    -H "Content-Type: application/json" \
    -d '{"source_path": "report.xlsb", "template_id": "form_a", "output_dir": "out"}'
"#)]
struct Args {
    /// YAML settings file
    #[arg(short, long, env = "SHEETMAP_CONFIG")]
    config: Option<PathBuf>,

    /// Host address to bind to (use 0.0.0.0 for all interfaces)
    #[arg(short = 'H', long, env = "SHEETMAP_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "SHEETMAP_PORT")]
    port: Option<u16>,

    /// Directory holding the template workbooks and their configuration
    #[arg(long, env = "SHEETMAP_TEMPLATES_DIR")]
    templates_dir: Option<PathBuf>,

    /// Template configuration file inside the templates directory
    #[arg(long, env = "SHEETMAP_CONFIG_FILE")]
    config_file: Option<String>,

    /// Largest accepted source workbook, in bytes
    #[arg(long, env = "SHEETMAP_MAX_FILE_SIZE")]
    max_file_size: Option<usize>,

    /// Most rows one multi-source run may produce
    #[arg(long, env = "SHEETMAP_MAX_ROWS_PER_RUN")]
    max_rows_per_run: Option<usize>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => serde_yaml::from_str(&std::fs::read_to_string(path)?)?,
            None => AppConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = self.templates_dir {
            config.templates_dir = dir;
        }
        if let Some(file) = self.config_file {
            config.config_file = file;
        }
        if let Some(size) = self.max_file_size {
            config.max_file_size = size;
        }
        if let Some(rows) = self.max_rows_per_run {
            config.max_rows_per_run = rows;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;
    run_api_server(config).await
}
