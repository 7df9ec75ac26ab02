//! Command line front end; results are printed to stdout as JSON, logs go to stderr.
use anyhow::Context;
use anyhow::Result;
use boq_sheet::convert::convert_xls_to_xlsx;
use boq_sheet::extract::file_info;
use boq_sheet::extract::sheet_names;
use boq_sheet::ExcelProcessor;
use boq_sheet::ExtractionConfig;
use boq_sheet::OutputOptions;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "boq-sheet", version)]
#[command(about = "Extract bill-of-quantity tables and their images from Excel workbooks", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every product table of a workbook
    Extract {
        /// Workbook to read (.xlsx, .xlsm or .xls)
        file: PathBuf,

        /// Directory receiving the imgs/ folder; images are skipped without it
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Session id used in public image URLs
        #[arg(long)]
        session_id: Option<String>,

        /// File id used in public image URLs
        #[arg(long)]
        file_id: Option<String>,

        /// TOML file overriding keyword vocabularies and converter settings
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        pretty: bool,
    },

    /// Show size and sheet list of a workbook
    Info { file: PathBuf },

    /// List sheet names in workbook order
    Sheets { file: PathBuf },

    /// Rewrite a legacy .xls workbook as .xlsx next to it
    Convert { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Extract { file, output_dir, session_id, file_id, config, pretty } => {
            let config = match config {
                Some(path) => ExtractionConfig::from_toml_file(&path)?,
                None => ExtractionConfig::default(),
            };
            let options = OutputOptions { output_dir, session_id, file_id };
            let report = ExcelProcessor::new(config).process_file(&file, &options);
            println!("{}", report.to_json(pretty).context("serialize extraction report failed")?);
        }
        Commands::Info { file } => {
            let info = file_info(&file).with_context(|| format!("read workbook failed: {}", file.display()))?;
            print_json(&info)?;
        }
        Commands::Sheets { file } => {
            let names = sheet_names(&file).with_context(|| format!("read workbook failed: {}", file.display()))?;
            print_json(&names)?;
        }
        Commands::Convert { file } => {
            let output = convert_xls_to_xlsx(&file).with_context(|| format!("convert failed: {}", file.display()))?;
            print_json(&json!({ "converted": output.display().to_string() }))?;
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("serialize output failed")?);
    Ok(())
}
