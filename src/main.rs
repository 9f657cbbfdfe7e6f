use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use royalbit_sheetmap::cli;
use royalbit_sheetmap::config::{AppConfig, DEFAULT_CONFIG_FILE, DEFAULT_TEMPLATES_DIR};
use royalbit_sheetmap::error::TransferResult;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sheetmap")]
#[command(about = "Copy cells from submitted workbooks into formatted Excel templates.")]
#[command(long_about = "Sheetmap - template mapping engine for spreadsheets

Reads .xlsb / .xlsx / .xlsm / .xls sources and fills .xlsx templates
according to the mapping declared for each template.

COMMANDS:
  templates   - List configured templates
  convert     - Fill one template from one source
  batch       - Fill several templates from one source, zipped
  merge       - Fold several sources into one template, one row each

EXAMPLES:
  sheetmap templates --all
  sheetmap convert report.xlsb --template application_form -o out/
  sheetmap batch report.xlsb --templates form_a,form_b --facility \"Shibuya\"
  sheetmap merge a.xlsb b.xlsb c.xlsb --template roster --labels A,B,C")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Directory holding the template workbooks and their configuration
    #[arg(long, global = true, default_value = DEFAULT_TEMPLATES_DIR, env = "SHEETMAP_TEMPLATES_DIR")]
    templates_dir: PathBuf,

    /// Template configuration file inside the templates directory (.json, .yaml, .yml)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE, env = "SHEETMAP_CONFIG_FILE")]
    config_file: String,

    /// Log engine progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured templates
    Templates {
        /// Include inactive templates
        #[arg(long)]
        all: bool,
    },

    /// Fill one template from one source workbook
    Convert {
        /// Source workbook
        source: PathBuf,

        /// Template id
        #[arg(short, long)]
        template: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    #[command(long_about = "Fill several templates from one source workbook.

Every selected template that is active and mapped is filled; the results
are packed into {facility}_{YYYYMMDD}.zip. A template that fails is
reported and skipped. The command fails only if none succeed.")]
    /// Fill several templates from one source and zip the results
    Batch {
        /// Source workbook
        source: PathBuf,

        /// Template ids (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        templates: Vec<String>,

        /// Facility label used in the archive name
        #[arg(short, long)]
        facility: String,

        /// Date stamp for the archive name (YYYYMMDD, default today)
        #[arg(long, value_parser = cli::parse_date)]
        date: Option<NaiveDate>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    #[command(long_about = "Fold several source workbooks into one template.

Each source fills the template's mapped cells on its own row, starting at
--start-row (default: the template's configured start row). Sources that
cannot be read are reported and do not take a row.")]
    /// Fold several sources into one template, one row each
    Merge {
        /// Source workbooks, in row order
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Template id
        #[arg(short, long)]
        template: String,

        /// One label per source (comma-separated, default: file names)
        #[arg(short, long, value_delimiter = ',')]
        labels: Option<Vec<String>>,

        /// First destination row
        #[arg(long)]
        start_row: Option<u32>,

        /// Date stamp for the output name (YYYYMMDD, default today)
        #[arg(long, value_parser = cli::parse_date)]
        date: Option<NaiveDate>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let fallback = if verbose {
        "royalbit_sheetmap=debug"
    } else {
        "royalbit_sheetmap=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> TransferResult<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let config = AppConfig {
        templates_dir: cli.global.templates_dir,
        config_file: cli.global.config_file,
        ..AppConfig::default()
    };

    match cli.command {
        Commands::Templates { all } => cli::templates(&config, all),

        Commands::Convert {
            source,
            template,
            output,
        } => cli::convert(&config, source, template, output),

        Commands::Batch {
            source,
            templates,
            facility,
            date,
            output,
        } => cli::batch(&config, source, templates, facility, date, output),

        Commands::Merge {
            sources,
            template,
            labels,
            start_row,
            date,
            output,
        } => cli::merge(&config, sources, template, labels, start_row, date, output),
    }
}
