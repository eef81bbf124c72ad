use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::frame::{PartitionSummary, SaveMode};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub app_name: String,
    pub session_id: u64,
    pub input_path: String,
    pub output_path: String,
    pub started_at: DateTime<Utc>,
    pub epoch_seconds: i64,
    pub mode: SaveMode,
    pub total_rows: usize,
    pub columns: Vec<ColumnManifest>,
    pub partitions: Vec<PartitionSummary>,
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnManifest {
    pub source_name: String,
    pub name: String,
    pub data_type: String,
}

impl RunManifest {
    pub fn file_count(&self) -> usize {
        self.partitions.iter().map(|p| p.files.len()).sum()
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }
}
