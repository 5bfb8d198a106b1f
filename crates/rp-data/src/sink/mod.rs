//! Row sink backed by Arrow record batches
//!
//! Cell conversion is a strategy object injected per sink, with optional
//! per-column overrides, rather than a process-wide converter table.

use std::sync::Arc;

use ahash::AHashMap;
use arrow::array::{Array, AsArray};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, SchemaRef,
    UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use rp_core::{Batch, CellValue, FillMode, RowSink};

/// Turns one Arrow cell into a consumer-facing value
pub trait CellConverter: Send + Sync {
    fn convert(&self, array: &dyn Array, row: usize) -> CellValue;
}

/// Default conversion by Arrow data type; anything exotic is rendered as text
#[derive(Debug, Default, Clone, Copy)]
pub struct ArrowCellConverter;

impl CellConverter for ArrowCellConverter {
    fn convert(&self, array: &dyn Array, row: usize) -> CellValue {
        if array.is_null(row) {
            return CellValue::Null;
        }

        match array.data_type() {
            DataType::Boolean => CellValue::Bool(array.as_boolean().value(row)),
            DataType::Int8 => CellValue::Int(array.as_primitive::<Int8Type>().value(row) as i64),
            DataType::Int16 => CellValue::Int(array.as_primitive::<Int16Type>().value(row) as i64),
            DataType::Int32 => CellValue::Int(array.as_primitive::<Int32Type>().value(row) as i64),
            DataType::Int64 => CellValue::Int(array.as_primitive::<Int64Type>().value(row)),
            DataType::UInt8 => CellValue::Int(array.as_primitive::<UInt8Type>().value(row) as i64),
            DataType::UInt16 => CellValue::Int(array.as_primitive::<UInt16Type>().value(row) as i64),
            DataType::UInt32 => CellValue::Int(array.as_primitive::<UInt32Type>().value(row) as i64),
            DataType::UInt64 => CellValue::Int(array.as_primitive::<UInt64Type>().value(row) as i64),
            DataType::Float32 => {
                CellValue::Float(array.as_primitive::<Float32Type>().value(row) as f64)
            }
            DataType::Float64 => CellValue::Float(array.as_primitive::<Float64Type>().value(row)),
            DataType::Utf8 => CellValue::Text(array.as_string::<i32>().value(row).to_string()),
            DataType::LargeUtf8 => CellValue::Text(array.as_string::<i64>().value(row).to_string()),
            _ => match ArrayFormatter::try_new(array, &FormatOptions::default()) {
                Ok(formatter) => CellValue::Text(formatter.value(row).to_string()),
                Err(e) => {
                    tracing::warn!(error = %e, data_type = %array.data_type(), "unformattable cell");
                    CellValue::Null
                }
            },
        }
    }
}

/// Sink holding the batches merged by a controller
pub struct BatchSink {
    batches: Vec<Batch>,
    row_count: usize,
    converter: Arc<dyn CellConverter>,
    column_converters: AHashMap<usize, Arc<dyn CellConverter>>,
}

impl BatchSink {
    /// Sink using [`ArrowCellConverter`] for every column
    pub fn new() -> Self {
        Self::with_converter(Arc::new(ArrowCellConverter))
    }

    pub fn with_converter(converter: Arc<dyn CellConverter>) -> Self {
        Self {
            batches: Vec::new(),
            row_count: 0,
            converter,
            column_converters: AHashMap::new(),
        }
    }

    /// Use a dedicated converter for one column
    pub fn set_column_converter(&mut self, column: usize, converter: Arc<dyn CellConverter>) {
        self.column_converters.insert(column, converter);
    }

    /// Schema of the rows currently held
    pub fn schema(&self) -> Option<SchemaRef> {
        self.batches.first().map(|b| b.schema())
    }

    /// Render one row for logs and demos
    pub fn row_text(&self, row: usize) -> Option<Vec<String>> {
        let columns = self.batches.first()?.num_columns();
        (0..columns)
            .map(|col| self.value_at(row, col).map(|v| v.to_string()))
            .collect()
    }

    fn locate(&self, mut row: usize) -> Option<(&Batch, usize)> {
        for batch in &self.batches {
            if row < batch.num_rows() {
                return Some((batch, row));
            }
            row -= batch.num_rows();
        }
        None
    }
}

impl Default for BatchSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RowSink for BatchSink {
    fn add_batch(&mut self, batch: Batch, mode: FillMode) {
        if mode == FillMode::Overwrite {
            self.clear();
        }
        self.row_count += batch.num_rows();
        // Keep empty batches while the sink is empty so the schema stays known
        if batch.num_rows() > 0 || self.batches.is_empty() {
            self.batches.push(batch);
        }
    }

    fn clear(&mut self) {
        self.batches.clear();
        self.row_count = 0;
    }

    fn row_count(&self) -> usize {
        self.row_count
    }

    fn value_at(&self, row: usize, col: usize) -> Option<CellValue> {
        let (batch, local) = self.locate(row)?;
        if col >= batch.num_columns() {
            return None;
        }
        let converter = self.column_converters.get(&col).unwrap_or(&self.converter);
        Some(converter.convert(batch.column(col).as_ref(), local))
    }
}
