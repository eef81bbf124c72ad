pub mod csv;
pub mod parquet;

pub use self::csv::{load_table, Table};
