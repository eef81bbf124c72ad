use anyhow::Result;
use arrow::array::{Array, ArrayRef, BooleanArray};
use arrow::compute::filter_record_batch;
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use std::collections::HashMap;
use std::sync::Arc;

/// Directory value used for null and empty partition values.
pub const DEFAULT_PARTITION_NAME: &str = "__HIVE_DEFAULT_PARTITION__";

/// Percent-escape characters that are unsafe in a directory name (`/`, `=`, `%`, ...).
pub fn escape_path_name(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if needs_escaping(c) {
            out.push_str(&format!("%{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

fn needs_escaping(c: char) -> bool {
    matches!(
        c,
        '\u{01}'..='\u{1F}'
            | '"'
            | '#'
            | '%'
            | '\''
            | '*'
            | '/'
            | ':'
            | '='
            | '?'
            | '\\'
            | '\u{7F}'
            | '{'
            | '['
            | ']'
            | '^'
    )
}

/// `col=value` directory name for one row.
fn path_fragment(name: &str, column: &ArrayRef, row: usize) -> Result<String> {
    let value = if column.is_null(row) {
        None
    } else {
        Some(array_value_to_string(column, row)?)
    };
    let value = match value.as_deref() {
        None | Some("") => DEFAULT_PARTITION_NAME.to_string(),
        Some(v) => escape_path_name(v),
    };
    Ok(format!("{}={}", escape_path_name(name), value))
}

/// Rows of one batch that share the same partition directory.
#[derive(Debug)]
pub struct PartitionSlice {
    /// Relative directory, e.g. `Region=Europe/Country=France`.
    pub dir: String,
    /// The rows with the partition columns removed.
    pub batch: RecordBatch,
}

/// Split `batch` by the values of `partition_columns` (indices into its schema).
///
/// Slices come back in order of first appearance of their directory.
pub fn split_by_partition(
    batch: &RecordBatch,
    partition_columns: &[usize],
) -> Result<Vec<PartitionSlice>> {
    let schema = batch.schema();
    let mut order: Vec<String> = Vec::new();
    let mut rows: HashMap<String, Vec<bool>> = HashMap::new();

    for row in 0..batch.num_rows() {
        let mut fragments = Vec::with_capacity(partition_columns.len());
        for &idx in partition_columns {
            fragments.push(path_fragment(
                schema.field(idx).name(),
                batch.column(idx),
                row,
            )?);
        }
        let dir = fragments.join("/");
        let mask = rows.entry(dir.clone()).or_insert_with(|| {
            order.push(dir);
            vec![false; batch.num_rows()]
        });
        mask[row] = true;
    }

    let data_columns: Vec<usize> = (0..batch.num_columns())
        .filter(|i| !partition_columns.contains(i))
        .collect();
    let data_schema = Arc::new(Schema::new(
        data_columns
            .iter()
            .map(|&i| schema.field(i).clone())
            .collect(),
    ));

    let mut slices = Vec::with_capacity(order.len());
    for dir in order {
        let mask = BooleanArray::from(rows.remove(&dir).unwrap_or_default());
        let filtered = filter_record_batch(batch, &mask)?;
        let columns = data_columns
            .iter()
            .map(|&i| filtered.column(i).clone())
            .collect();
        slices.push(PartitionSlice {
            dir,
            batch: RecordBatch::try_new(data_schema.clone(), columns)?,
        });
    }
    Ok(slices)
}
