use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::IngestError;
use crate::frame::{schema, DataFrame, SaveMode};
use crate::io;
use crate::session::{build_session, SessionGuard, SessionProvider};

mod manifest;
pub use manifest::{ColumnManifest, RunManifest};

/// `<root>/<base>_<epoch_seconds>.parquet`
pub fn output_path(root: &str, base_name: &str, epoch_seconds: i64) -> String {
    format!(
        "{}/{}_{}.parquet",
        root.trim_end_matches('/'),
        base_name,
        epoch_seconds
    )
}

pub fn run_pipeline(config: &PipelineConfig, provider: &dyn SessionProvider) -> Result<RunManifest> {
    run_pipeline_at(config, provider, Utc::now().timestamp())
}

/// Run the ingest job, naming the output after `epoch_seconds`.
///
/// The session is released when this returns, whether or not the run succeeded.
pub fn run_pipeline_at(
    config: &PipelineConfig,
    provider: &dyn SessionProvider,
    epoch_seconds: i64,
) -> Result<RunManifest> {
    config.validate()?;

    let session = build_session(provider, &config.session.app_name, &config.session)
        .context("Failed to build session")?;
    let guard = SessionGuard::new(provider, session);
    info!(
        session_id = guard.id(),
        app = guard.app_name(),
        master = ?guard.master(),
        executor_memory = guard.executor_memory(),
        dynamic_allocation = guard.dynamic_allocation(),
        parallelism = guard.default_parallelism(),
        "session ready"
    );

    println!("Loading input from: {}", config.input.path.display());
    let table = io::load_table(&config.input)?;
    println!(
        "  Read {} rows, {} columns",
        table.num_rows(),
        table.num_columns()
    );
    debug!(columns = ?table.column_names(), "input loaded");

    let raw = DataFrame::from_table(guard.session().clone(), &table)?;
    let df = raw.with_normalized_column_names()?;
    debug!(
        rows = df.count(),
        partitions = df.partitions().len(),
        columns = ?df.columns(),
        "dataframe ready"
    );
    let duplicates = df.duplicate_columns();
    if !duplicates.is_empty() {
        return Err(IngestError::DuplicateColumns(duplicates).into());
    }

    println!("Sales Dataframe created with schema : ");
    df.print_schema();

    let output = &config.output;
    let target = output_path(&output.root, &output.base_name, epoch_seconds);
    let mode = SaveMode::parse(&output.mode)?;
    let summary = df
        .write()
        .option("header", output.header)
        .option("compression", &output.compression)
        .partition_by(output.partition_by.iter().cloned())
        .mode(mode)
        .webhdfs(output.webhdfs.clone())
        .parquet(&target)
        .with_context(|| format!("Failed to write {}", target))?;

    if summary.skipped {
        println!("✓ {} already exists, nothing written", target);
    } else {
        println!(
            "✓ Sales Dataframe stored in {} ({} rows, {} partitions)",
            target,
            summary.total_rows,
            summary.partitions.len()
        );
    }

    let columns = raw
        .schema()
        .fields()
        .iter()
        .zip(df.schema().fields().iter())
        .map(|(before, after)| ColumnManifest {
            source_name: before.name().clone(),
            name: after.name().clone(),
            data_type: schema::type_name(after.data_type()),
        })
        .collect();

    Ok(RunManifest {
        app_name: guard.app_name().to_string(),
        session_id: guard.id(),
        input_path: config.input.path.display().to_string(),
        output_path: target,
        started_at: Utc
            .timestamp_opt(epoch_seconds, 0)
            .single()
            .unwrap_or_else(Utc::now),
        epoch_seconds,
        mode,
        total_rows: summary.total_rows,
        columns,
        partitions: summary.partitions,
        skipped: summary.skipped,
    })
}
