use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};
use uuid::Uuid;

use super::partition::split_by_partition;
use super::DataFrame;
use crate::config::WebHdfsSettings;
use crate::error::IngestError;
use crate::fs::{self, FileSystem};
use crate::io::parquet::{encode_batches, Codec};

/// What to do when the target directory already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    /// Delete the existing directory, then write.
    Overwrite,
    /// Add new part files next to the existing ones.
    Append,
    #[default]
    ErrorIfExists,
    /// Leave the existing directory alone and write nothing.
    Ignore,
}

impl SaveMode {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(SaveMode::Overwrite),
            "append" => Ok(SaveMode::Append),
            "error" | "errorifexists" => Ok(SaveMode::ErrorIfExists),
            "ignore" => Ok(SaveMode::Ignore),
            other => Err(IngestError::Config(format!("unknown save mode: {}", other)).into()),
        }
    }
}

/// Rows and files written under one partition directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionSummary {
    /// Relative to the dataset root; empty when the dataset is not partitioned.
    pub dir: String,
    pub rows: usize,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteSummary {
    pub uri: String,
    pub mode: SaveMode,
    /// Sorted by directory.
    pub partitions: Vec<PartitionSummary>,
    pub total_rows: usize,
    /// True when `Ignore` mode found an existing target and wrote nothing.
    pub skipped: bool,
}

struct WrittenFile {
    dir: String,
    path: String,
    rows: usize,
}

/// Builder for persisting a [`DataFrame`] as a Hive-partitioned Parquet dataset.
pub struct DataFrameWriter<'a> {
    df: &'a DataFrame,
    options: BTreeMap<String, String>,
    partition_by: Vec<String>,
    mode: SaveMode,
    webhdfs: WebHdfsSettings,
}

impl<'a> DataFrameWriter<'a> {
    pub(super) fn new(df: &'a DataFrame) -> Self {
        Self {
            df,
            options: BTreeMap::new(),
            partition_by: Vec::new(),
            mode: SaveMode::default(),
            webhdfs: WebHdfsSettings::default(),
        }
    }

    pub fn option(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.options.insert(key.into(), value.to_string());
        self
    }

    pub fn partition_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partition_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn mode(mut self, mode: SaveMode) -> Self {
        self.mode = mode;
        self
    }

    /// Settings used when the target is an `hdfs://` URI.
    pub fn webhdfs(mut self, settings: WebHdfsSettings) -> Self {
        self.webhdfs = settings;
        self
    }

    pub fn parquet(self, uri: &str) -> Result<WriteSummary> {
        let (filesystem, root) = fs::resolve(uri, &self.webhdfs)?;
        self.save(uri, filesystem.as_ref(), &root)
    }

    fn save(&self, uri: &str, filesystem: &dyn FileSystem, root: &str) -> Result<WriteSummary> {
        let schema = self.df.schema();
        let mut partition_columns = Vec::with_capacity(self.partition_by.len());
        for name in &self.partition_by {
            let idx = schema
                .fields()
                .iter()
                .position(|f| f.name() == name)
                .ok_or_else(|| IngestError::ColumnNotFound(name.clone()))?;
            partition_columns.push(idx);
        }
        if !partition_columns.is_empty() && partition_columns.len() >= schema.fields().len() {
            return Err(IngestError::AllColumnsPartitioned.into());
        }

        let codec = match self.options.get("compression") {
            Some(name) => Codec::parse(name)?,
            None => Codec::default(),
        };
        if self.options.contains_key("header") {
            debug!("option 'header' has no effect on parquet output");
        }

        if filesystem.exists(root)? {
            match self.mode {
                SaveMode::Overwrite => {
                    info!(%uri, "overwriting existing dataset");
                    filesystem.delete(root)?;
                }
                SaveMode::ErrorIfExists => {
                    return Err(IngestError::PathExists(uri.to_string()).into());
                }
                SaveMode::Ignore => {
                    info!(%uri, "dataset exists, skipping write");
                    return Ok(WriteSummary {
                        uri: uri.to_string(),
                        mode: self.mode,
                        partitions: Vec::new(),
                        total_rows: 0,
                        skipped: true,
                    });
                }
                SaveMode::Append => {}
            }
        }
        filesystem.mkdirs(root)?;
        debug!(scheme = filesystem.scheme(), %root, "target directory ready");

        let job_id = Uuid::new_v4();
        let partitions = self.df.partitions();
        let pb = ProgressBar::new(partitions.len() as u64);
        pb.set_style(ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tasks ({percent}%)",
        )?);

        // Each dataframe partition is one task on the session's executor pool
        let written: Vec<Vec<WrittenFile>> = self.df.session().run(|| {
            partitions
                .par_iter()
                .enumerate()
                .map(|(task, batch)| {
                    let files = write_task(
                        filesystem,
                        root,
                        task,
                        batch,
                        &partition_columns,
                        codec,
                        job_id,
                    )
                    .with_context(|| format!("Failed to write task {}", task))?;
                    pb.inc(1);
                    Ok(files)
                })
                .collect::<Result<Vec<_>>>()
        })?;
        pb.finish_and_clear();

        filesystem.write(&fs::join(root, "_SUCCESS"), &[])?;

        let mut by_dir: HashMap<String, PartitionSummary> = HashMap::new();
        for file in written.into_iter().flatten() {
            let entry = by_dir.entry(file.dir.clone()).or_insert_with(|| PartitionSummary {
                dir: file.dir.clone(),
                ..PartitionSummary::default()
            });
            entry.rows += file.rows;
            entry.files.push(file.path);
        }
        let mut summaries: Vec<PartitionSummary> = by_dir.into_values().collect();
        summaries.sort_by(|a, b| a.dir.cmp(&b.dir));
        for summary in &mut summaries {
            summary.files.sort();
        }
        let total_rows = summaries.iter().map(|p| p.rows).sum();

        info!(
            %uri,
            partitions = summaries.len(),
            rows = total_rows,
            "dataset written"
        );

        Ok(WriteSummary {
            uri: uri.to_string(),
            mode: self.mode,
            partitions: summaries,
            total_rows,
            skipped: false,
        })
    }
}

fn write_task(
    filesystem: &dyn FileSystem,
    root: &str,
    task: usize,
    batch: &arrow::record_batch::RecordBatch,
    partition_columns: &[usize],
    codec: Codec,
    job_id: Uuid,
) -> Result<Vec<WrittenFile>> {
    if batch.num_rows() == 0 {
        return Ok(Vec::new());
    }

    let file_name = format!(
        "part-{:05}-{}.c000{}.parquet",
        task,
        job_id,
        codec.file_infix()
    );
    let mut files = Vec::new();
    for slice in split_by_partition(batch, partition_columns)? {
        let dir_path = if slice.dir.is_empty() {
            root.to_string()
        } else {
            fs::join(root, &slice.dir)
        };
        let path = fs::join(&dir_path, &file_name);
        let bytes = encode_batches(slice.batch.schema(), &[slice.batch.clone()], codec)?;
        filesystem.write(&path, &bytes)?;
        debug!(task, %path, rows = slice.batch.num_rows(), "part file written");
        files.push(WrittenFile {
            dir: slice.dir,
            path,
            rows: slice.batch.num_rows(),
        });
    }
    Ok(files)
}
