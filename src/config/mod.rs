use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::IngestError;

/// Full description of one ingest run. Every field has a default, so an empty
/// YAML document (or no document at all) describes the stock sales job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub session: SessionSettings,
    pub input: InputConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub app_name: String,
    pub master: String,
    pub deploy_mode: String,
    pub driver_bind_address: String,
    pub executor_memory: String,
    pub dynamic_allocation: bool,
    pub connect_timeout_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            app_name: "pyspark-notebook".to_string(),
            master: "spark://spark-master:7077".to_string(),
            deploy_mode: "client".to_string(),
            driver_bind_address: "0.0.0.0".to_string(),
            executor_memory: "2G".to_string(),
            dynamic_allocation: false,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Resolved against the process working directory when relative.
    pub path: PathBuf,
    pub delimiter: String,
    pub has_header: bool,
    pub infer_schema_rows: usize,
    pub batch_size: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("plugins/data/salesRecord.csv"),
            delimiter: ",".to_string(),
            has_header: true,
            infer_schema_rows: 1000,
            batch_size: 8192,
        }
    }
}

impl InputConfig {
    pub fn delimiter_byte(&self) -> Result<u8> {
        match self.delimiter.as_bytes() {
            [b] => Ok(*b),
            _ => Err(IngestError::Config(format!(
                "delimiter must be a single byte, got {:?}",
                self.delimiter
            ))
            .into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory URI the timestamped dataset is created under.
    pub root: String,
    pub base_name: String,
    pub partition_by: Vec<String>,
    pub mode: String,
    pub header: bool,
    pub compression: String,
    pub webhdfs: WebHdfsSettings,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: "hdfs://hadoop-namenode:9000/sales".to_string(),
            base_name: "salesRecord".to_string(),
            partition_by: vec!["Country".to_string()],
            mode: "overwrite".to_string(),
            header: true,
            compression: "snappy".to_string(),
            webhdfs: WebHdfsSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebHdfsSettings {
    /// HTTP port of the namenode's WebHDFS endpoint (the `hdfs://` URI carries the RPC port).
    pub port: u16,
    pub user: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for WebHdfsSettings {
    fn default() -> Self {
        Self {
            port: 9870,
            user: None,
            request_timeout_secs: 120,
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty mapping
        let config: PipelineConfig = if content.trim().is_empty() {
            PipelineConfig::default()
        } else {
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.app_name.trim().is_empty() {
            return Err(IngestError::Config("session.app_name must not be empty".into()).into());
        }
        if self.input.path.as_os_str().is_empty() {
            return Err(IngestError::Config("input.path must not be empty".into()).into());
        }
        self.input.delimiter_byte()?;
        if self.input.batch_size == 0 {
            return Err(IngestError::Config("input.batch_size must be positive".into()).into());
        }
        if self.output.base_name.trim().is_empty() {
            return Err(IngestError::Config("output.base_name must not be empty".into()).into());
        }
        if self.output.partition_by.is_empty() {
            return Err(
                IngestError::Config("output.partition_by needs at least one column".into()).into(),
            );
        }

        // Check partition columns are unique
        let mut seen = std::collections::HashSet::new();
        for column in &self.output.partition_by {
            if !seen.insert(column) {
                return Err(IngestError::Config(format!(
                    "Duplicate partition column: {}",
                    column
                ))
                .into());
            }
        }

        if self.session.connect_timeout_secs == 0 {
            return Err(
                IngestError::Config("session.connect_timeout_secs must be positive".into()).into(),
            );
        }
        if self.output.webhdfs.request_timeout_secs == 0 {
            return Err(IngestError::Config(
                "output.webhdfs.request_timeout_secs must be positive".into(),
            )
            .into());
        }

        // Mode and compression are parsed here so a bad value fails before the session starts
        crate::frame::SaveMode::parse(&self.output.mode)?;
        crate::io::parquet::Codec::parse(&self.output.compression)?;

        Ok(())
    }
}
