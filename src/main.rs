use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, trace};

mod config;
mod error;
mod frame;
mod fs;
mod io;
mod runtime;
mod session;

use config::PipelineConfig;
use session::SharedSessionProvider;

#[derive(Parser)]
#[command(name = "sales-ingest")]
#[command(about = "Load sales records from CSV and store them as partitioned Parquet", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingest job
    Run {
        /// Path to pipeline YAML file (built-in defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the input CSV path
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Override the output root, e.g. hdfs://namenode:9000/sales or /tmp/sales
        #[arg(short, long)]
        output_root: Option<String>,

        /// Override the session master URL, e.g. local[4]
        #[arg(short, long)]
        master: Option<String>,

        /// Write a JSON run manifest to this path
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Validate a pipeline configuration
    Validate {
        /// Path to pipeline YAML file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the normalized schema of the input without writing anything
    Schema {
        /// Path to pipeline YAML file (built-in defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the input CSV path
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Show version information
    Version,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_yaml_file(path),
        None => Ok(PipelineConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 1)
        .with_thread_ids(cli.verbose >= 2)
        .with_line_number(cli.verbose >= 2)
        .init();

    debug!("sales-ingest started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    match cli.command {
        Commands::Run {
            config,
            input,
            output_root,
            master,
            manifest,
        } => {
            let mut pipeline = load_config(config.as_ref())?;
            if let Some(input) = input {
                pipeline.input.path = input;
            }
            if let Some(root) = output_root {
                pipeline.output.root = root;
            }
            if let Some(master) = master {
                pipeline.session.master = master;
            }

            let provider = SharedSessionProvider::new();
            let run = runtime::run_pipeline(&pipeline, &provider)?;
            if let Some(path) = manifest {
                run.write_to_file(&path)?;
                println!(
                    "✓ Manifest written to: {} ({} files recorded)",
                    path.display(),
                    run.file_count()
                );
            }
        }
        Commands::Validate { config } => {
            let _pipeline = PipelineConfig::from_yaml_file(&config)?;
            println!("✓ Pipeline configuration is valid");
        }
        Commands::Schema { config, input } => {
            let mut pipeline = load_config(config.as_ref())?;
            if let Some(input) = input {
                pipeline.input.path = input;
            }
            let table = io::load_table(&pipeline.input)?;
            let normalized = frame::schema::normalize_schema(table.schema());
            print!("{}", frame::schema::tree_string(&normalized));
            let duplicates = frame::schema::duplicate_names(&normalized);
            if !duplicates.is_empty() {
                return Err(error::IngestError::DuplicateColumns(duplicates).into());
            }
        }
        Commands::Version => {
            println!("sales-ingest version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
