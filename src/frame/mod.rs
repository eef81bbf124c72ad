//! Session-bound, partitioned dataframes.

use anyhow::{Context, Result};
use arrow::array::ArrayRef;
use arrow::compute::kernels::concat::concat;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

use crate::io::Table;
use crate::session::Session;

mod partition;
pub mod schema;
mod writer;

pub use writer::{DataFrameWriter, PartitionSummary, SaveMode, WriteSummary};

/// A table split into row partitions that are processed as independent tasks
/// on the owning session's executor pool.
#[derive(Debug, Clone)]
pub struct DataFrame {
    session: Arc<Session>,
    schema: SchemaRef,
    partitions: Vec<RecordBatch>,
}

impl DataFrame {
    /// Spread the table's rows over `session.default_parallelism()` contiguous partitions.
    pub fn from_table(session: Arc<Session>, table: &Table) -> Result<Self> {
        let total = table.num_rows();
        let num_partitions = session.default_parallelism().max(1).min(total.max(1));
        let mut partitions = Vec::with_capacity(num_partitions);

        if total > 0 {
            let base = total / num_partitions;
            let extra = total % num_partitions;
            let mut cursor = RowCursor::new(table.batches());
            for i in 0..num_partitions {
                let len = base + usize::from(i < extra);
                let pieces = cursor.take(len);
                partitions.push(concat_batches(table.schema(), &pieces)?);
            }
        }

        Ok(Self {
            session,
            schema: table.schema().clone(),
            partitions,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn partitions(&self) -> &[RecordBatch] {
        &self.partitions
    }

    pub fn columns(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.partitions.iter().map(|p| p.num_rows()).sum()
    }

    /// New dataframe whose column names have spaces replaced by underscores.
    ///
    /// Collisions are kept as duplicate names; see [`DataFrame::duplicate_columns`].
    pub fn with_normalized_column_names(&self) -> Result<Self> {
        let renamed: SchemaRef = Arc::new(schema::normalize_schema(&self.schema));
        let partitions = self
            .partitions
            .iter()
            .map(|p| RecordBatch::try_new(renamed.clone(), p.columns().to_vec()))
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to rename columns")?;

        Ok(Self {
            session: Arc::clone(&self.session),
            schema: renamed,
            partitions,
        })
    }

    pub fn duplicate_columns(&self) -> Vec<String> {
        schema::duplicate_names(&self.schema)
    }

    pub fn tree_string(&self) -> String {
        schema::tree_string(&self.schema)
    }

    pub fn print_schema(&self) {
        print!("{}", self.tree_string());
    }

    pub fn write(&self) -> DataFrameWriter<'_> {
        DataFrameWriter::new(self)
    }
}

/// Walks a sequence of batches handing out row ranges that may span batch boundaries.
struct RowCursor<'a> {
    batches: &'a [RecordBatch],
    batch: usize,
    offset: usize,
}

impl<'a> RowCursor<'a> {
    fn new(batches: &'a [RecordBatch]) -> Self {
        Self {
            batches,
            batch: 0,
            offset: 0,
        }
    }

    fn take(&mut self, mut len: usize) -> Vec<RecordBatch> {
        let mut pieces = Vec::new();
        while len > 0 && self.batch < self.batches.len() {
            let current = &self.batches[self.batch];
            let available = current.num_rows() - self.offset;
            let n = available.min(len);
            if n > 0 {
                pieces.push(current.slice(self.offset, n));
            }
            self.offset += n;
            len -= n;
            if self.offset == current.num_rows() {
                self.batch += 1;
                self.offset = 0;
            }
        }
        pieces
    }
}

fn concat_batches(schema: &SchemaRef, pieces: &[RecordBatch]) -> Result<RecordBatch> {
    if let [single] = pieces {
        return Ok(single.clone());
    }
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for i in 0..schema.fields().len() {
        let arrays: Vec<&dyn arrow::array::Array> =
            pieces.iter().map(|b| b.column(i).as_ref()).collect();
        columns.push(concat(&arrays)?);
    }
    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputConfig;
    use crate::io::csv::fixtures::{write_fixture, SALES_CSV};
    use crate::io::load_table;
    use crate::session::local_settings;

    fn session(threads: usize) -> Arc<Session> {
        Arc::new(Session::start(local_settings(threads).to_conf("frame-test")).unwrap())
    }

    fn sales_table(batch_size: usize) -> Table {
        let dir = tempfile::tempdir().unwrap();
        let input = InputConfig {
            path: write_fixture(dir.path(), SALES_CSV),
            batch_size,
            ..InputConfig::default()
        };
        load_table(&input).unwrap()
    }

    #[test]
    fn spreads_rows_over_session_parallelism() {
        let df = DataFrame::from_table(session(4), &sales_table(8192)).unwrap();
        let sizes: Vec<usize> = df.partitions().iter().map(|p| p.num_rows()).collect();
        assert_eq!(sizes, vec![2, 2, 1, 1]);
        assert_eq!(df.count(), 6);
    }

    #[test]
    fn partitions_may_span_loader_batches() {
        let df = DataFrame::from_table(session(2), &sales_table(4)).unwrap();
        let sizes: Vec<usize> = df.partitions().iter().map(|p| p.num_rows()).collect();
        assert_eq!(sizes, vec![3, 3]);
    }

    #[test]
    fn never_creates_more_partitions_than_rows() {
        let df = DataFrame::from_table(session(16), &sales_table(8192)).unwrap();
        assert_eq!(df.partitions().len(), 6);
    }

    #[test]
    fn empty_table_has_no_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let input = InputConfig {
            path: write_fixture(dir.path(), "Region,Country\n"),
            ..InputConfig::default()
        };
        let table = load_table(&input).unwrap();
        let df = DataFrame::from_table(session(2), &table).unwrap();
        assert!(df.partitions().is_empty());
        assert_eq!(df.columns(), vec!["Region", "Country"]);
    }

    #[test]
    fn normalizes_names_without_touching_data() {
        let df = DataFrame::from_table(session(2), &sales_table(8192)).unwrap();
        let renamed = df.with_normalized_column_names().unwrap();

        for (before, after) in df.columns().iter().zip(renamed.columns()) {
            assert_eq!(after, before.replace(' ', "_"));
        }
        assert!(renamed.columns().contains(&"Item_Type".to_string()));
        assert!(renamed.columns().contains(&"Country".to_string()));
        assert_eq!(renamed.count(), df.count());
        assert!(renamed.duplicate_columns().is_empty());
        // The source dataframe keeps its names
        assert!(df.columns().contains(&"Item Type".to_string()));
    }

    #[test]
    fn reports_rename_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let input = InputConfig {
            path: write_fixture(dir.path(), "Order ID,Order_ID\n1,2\n"),
            ..InputConfig::default()
        };
        let df = DataFrame::from_table(session(1), &load_table(&input).unwrap()).unwrap();
        let renamed = df.with_normalized_column_names().unwrap();
        assert_eq!(renamed.columns(), vec!["Order_ID", "Order_ID"]);
        assert_eq!(renamed.duplicate_columns(), vec!["Order_ID"]);
    }

    #[test]
    fn tree_string_lists_every_column() {
        let df = DataFrame::from_table(session(1), &sales_table(8192))
            .unwrap()
            .with_normalized_column_names()
            .unwrap();
        let tree = df.tree_string();
        assert!(tree.starts_with("root\n"));
        assert!(tree.contains(" |-- Item_Type: string (nullable = true)\n"));
        assert!(tree.contains(" |-- Units_Sold: long (nullable = true)\n"));
        assert_eq!(tree.lines().count(), 11);
    }
}
