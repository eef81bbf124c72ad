use anyhow::{Context, Result};
use arrow::csv::ReaderBuilder;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::fs::File;
use std::io::ErrorKind;
use tracing::debug;

use crate::config::InputConfig;
use crate::error::IngestError;

/// A CSV file loaded wholesale into Arrow record batches.
#[derive(Debug, Clone)]
pub struct Table {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Table {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }
}

/// Read the configured CSV file, inferring the schema from its leading rows.
pub fn load_table(input: &InputConfig) -> Result<Table> {
    if let Ok(cwd) = std::env::current_dir() {
        debug!(cwd = %cwd.display(), path = %input.path.display(), "loading table");
    }

    let file = File::open(&input.path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => anyhow::Error::from(IngestError::InputNotFound(input.path.clone())),
        _ => anyhow::Error::from(e).context(format!("Failed to open {}", input.path.display())),
    })?;

    let reader = ReaderBuilder::new()
        .has_header(input.has_header)
        .with_delimiter(input.delimiter_byte()?)
        .infer_schema(Some(input.infer_schema_rows))
        .with_batch_size(input.batch_size)
        .build(file)
        .with_context(|| format!("Failed to infer schema of {}", input.path.display()))?;

    let schema = reader.schema();
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to parse {}", input.path.display()))?;

    let table = Table::new(schema, batches);
    debug!(
        rows = table.num_rows(),
        columns = table.num_columns(),
        "table loaded"
    );
    Ok(table)
}
