use arrow::datatypes::{DataType, Field, Schema};
use std::collections::HashMap;

/// Replace every space in a column name with an underscore.
pub fn normalize_column_name(name: &str) -> String {
    name.replace(' ', "_")
}

/// Same fields, types and nullability, with normalized names.
///
/// Two columns that differ only in spaces versus underscores end up with the same
/// name; use [`duplicate_names`] to detect that.
pub fn normalize_schema(schema: &Schema) -> Schema {
    let fields = schema
        .fields()
        .iter()
        .map(|f| {
            Field::new(
                normalize_column_name(f.name()).as_str(),
                f.data_type().clone(),
                f.is_nullable(),
            )
        })
        .collect::<Vec<_>>();
    Schema::new(fields)
}

/// Names that occur more than once, in order of first repetition.
pub fn duplicate_names(schema: &Schema) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut duplicates = Vec::new();
    for field in schema.fields() {
        let count = counts.entry(field.name().as_str()).or_insert(0);
        *count += 1;
        if *count == 2 {
            duplicates.push(field.name().clone());
        }
    }
    duplicates
}

/// SQL-style type name used when printing schemas.
pub fn type_name(data_type: &DataType) -> String {
    match data_type {
        DataType::Utf8 | DataType::LargeUtf8 => "string".to_string(),
        DataType::Boolean => "boolean".to_string(),
        DataType::Int8 => "byte".to_string(),
        DataType::Int16 => "short".to_string(),
        DataType::Int32 => "integer".to_string(),
        DataType::Int64 => "long".to_string(),
        DataType::Float32 => "float".to_string(),
        DataType::Float64 => "double".to_string(),
        DataType::Date32 | DataType::Date64 => "date".to_string(),
        DataType::Timestamp(_, _) => "timestamp".to_string(),
        DataType::Binary | DataType::LargeBinary => "binary".to_string(),
        DataType::Null => "void".to_string(),
        other => format!("{:?}", other).to_lowercase(),
    }
}

/// Render `schema` as an indented tree:
///
/// ```text
/// root
///  |-- Region: string (nullable = true)
///  |-- Units_Sold: long (nullable = true)
/// ```
pub fn tree_string(schema: &Schema) -> String {
    let mut out = String::from("root\n");
    for field in schema.fields() {
        out.push_str(&format!(
            " |-- {}: {} (nullable = {})\n",
            field.name(),
            type_name(field.data_type()),
            field.is_nullable()
        ));
    }
    out
}
