//! Column type detection and batch assembly for SQLite rows
//!
//! SQLite values are dynamically typed, so each fetched page is typed from
//! the values it actually contains.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use rp_core::{Batch, CursorError};
use rusqlite::types::Value;

/// Pick the narrowest Arrow type that holds every non-null value
pub fn infer_column_type(values: &[&Value]) -> DataType {
    let mut is_int = true;
    let mut is_float = true;
    let mut seen = false;

    for value in values {
        match value {
            Value::Null => {}
            Value::Integer(_) => seen = true,
            Value::Real(_) => {
                seen = true;
                is_int = false;
            }
            Value::Text(_) | Value::Blob(_) => {
                seen = true;
                is_int = false;
                is_float = false;
            }
        }
    }

    if !seen {
        DataType::Utf8
    } else if is_int {
        DataType::Int64
    } else if is_float {
        DataType::Float64
    } else {
        DataType::Utf8
    }
}

/// Assemble a record batch from row-major SQLite values
pub fn build_batch(names: &[String], rows: &[Vec<Value>]) -> Result<Batch, CursorError> {
    let mut fields = Vec::with_capacity(names.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(names.len());

    for (col_idx, name) in names.iter().enumerate() {
        let column: Vec<&Value> = rows.iter().map(|row| &row[col_idx]).collect();
        let data_type = infer_column_type(&column);
        arrays.push(build_array(&data_type, &column));
        fields.push(Field::new(name, data_type, true));
    }

    Ok(Batch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

fn build_array(data_type: &DataType, column: &[&Value]) -> ArrayRef {
    match data_type {
        DataType::Int64 => {
            let mut builder = Int64Builder::with_capacity(column.len());
            for value in column {
                match value {
                    Value::Integer(i) => builder.append_value(*i),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::with_capacity(column.len());
            for value in column {
                match value {
                    Value::Real(f) => builder.append_value(*f),
                    Value::Integer(i) => builder.append_value(*i as f64),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        _ => {
            let mut builder = StringBuilder::new();
            for value in column {
                match value {
                    Value::Text(s) => builder.append_value(s),
                    Value::Integer(i) => builder.append_value(i.to_string()),
                    Value::Real(f) => builder.append_value(f.to_string()),
                    Value::Blob(b) => builder.append_value(format!("<{} bytes>", b.len())),
                    Value::Null => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
    }
}
