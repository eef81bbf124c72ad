use anyhow::{Context, Result};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::IngestError;

/// Page compression for written part files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Snappy,
    Gzip,
    Zstd,
    Uncompressed,
}

impl Codec {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "snappy" => Ok(Codec::Snappy),
            "gzip" => Ok(Codec::Gzip),
            "zstd" => Ok(Codec::Zstd),
            "none" | "uncompressed" => Ok(Codec::Uncompressed),
            other => Err(IngestError::Config(format!("unknown compression codec: {}", other)).into()),
        }
    }

    /// Infix used in part file names, e.g. `.snappy` in `part-00000-<id>.c000.snappy.parquet`.
    pub fn file_infix(&self) -> &'static str {
        match self {
            Codec::Snappy => ".snappy",
            Codec::Gzip => ".gz",
            Codec::Zstd => ".zstd",
            Codec::Uncompressed => "",
        }
    }

    fn compression(&self) -> Compression {
        match self {
            Codec::Snappy => Compression::SNAPPY,
            Codec::Gzip => Compression::GZIP,
            Codec::Zstd => Compression::ZSTD,
            Codec::Uncompressed => Compression::UNCOMPRESSED,
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Codec::Snappy
    }
}

/// Encode `batches` as one Parquet file and return its bytes.
///
/// The file is staged in a temporary file because the writer needs a seekable sink;
/// the bytes are then handed to whichever filesystem owns the destination.
pub fn encode_batches(schema: SchemaRef, batches: &[RecordBatch], codec: Codec) -> Result<Vec<u8>> {
    if batches.is_empty() {
        anyhow::bail!("No batches to write");
    }

    let staging = tempfile::NamedTempFile::new().context("Failed to create staging file")?;
    let file = staging.reopen()?;
    let props = WriterProperties::builder()
        .set_compression(codec.compression())
        .build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;

    for batch in batches {
        writer.write(batch)?;
    }

    writer.close()?;
    let bytes = std::fs::read(staging.path()).context("Failed to read staged parquet file")?;
    Ok(bytes)
}

/// Read every record batch of a local Parquet file.
#[cfg(test)]
pub(crate) fn read_batches(path: &std::path::Path) -> Result<Vec<RecordBatch>> {
    use parquet::file::reader::SerializedFileReader;
    use std::sync::Arc;

    let file = std::fs::File::open(path)?;
    let file_reader = Arc::new(SerializedFileReader::new(file)?);
    let mut arrow_reader = parquet::arrow::ParquetFileArrowReader::new(file_reader);
    let reader_iter = parquet::arrow::ArrowReader::get_record_reader(&mut arrow_reader, 1024)?;

    reader_iter
        .map(|batch| batch.map_err(anyhow::Error::from))
        .collect()
}
