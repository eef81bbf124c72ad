use std::path::PathBuf;
use thiserror::Error;

/// Failures the pipeline reports with a specific kind.
///
/// Everything else (Arrow, Parquet, I/O, HTTP) travels as `anyhow::Error` with context
/// attached at the call site; callers that care about a specific kind use
/// `err.downcast_ref::<IngestError>()`.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Duplicate column names after normalization: {}", .0.join(", "))]
    DuplicateColumns(Vec<String>),

    #[error("Cannot use all columns as partition columns")]
    AllColumnsPartitioned,

    #[error("Path already exists: {0}")]
    PathExists(String),

    #[error("Unsupported filesystem scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid master URL: {0}")]
    InvalidMaster(String),

    #[error("Invalid memory size: {0}")]
    InvalidMemory(String),

    #[error("Invalid value for session option {key}: {value}")]
    InvalidOption { key: String, value: String },

    #[error("Cannot reach cluster coordinator at {address}: {source}")]
    CoordinatorUnreachable {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("WebHDFS request failed with status {status}: {message}")]
    WebHdfs { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}
