use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray,
    UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use chrono::{DateTime, Utc};
use parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter};

use gs_sweep::GridSpace;
use gs_types::{Cell, CellStatus, GsError, GsResult, PersistenceError, Value, ValueKind};

use crate::snapshot::{SnapshotHeader, StoreSnapshot};

/// Schema metadata key holding the JSON encoded snapshot header
pub const HEADER_METADATA_KEY: &str = "gridsweep.header";

const STATUS: &str = "status";
const PRIORITY: &str = "priority";
const DURATION: &str = "duration";
const IDENTIFIER: &str = "uuid";
const ERROR: &str = "error";
const FINISHED_AT: &str = "finished_at";

fn coord_column(name: &str) -> String {
    format!("coord.{name}")
}

fn arg_column(name: &str) -> String {
    format!("arg.{name}")
}

fn result_column(name: &str) -> String {
    format!("result.{name}")
}

fn arrow_error(e: arrow::error::ArrowError) -> GsError {
    GsError::Arrow(e.to_string())
}

fn parquet_error(e: parquet::errors::ParquetError) -> GsError {
    GsError::Parquet(e.to_string())
}

fn corruption(message: String) -> GsError {
    PersistenceError::Corruption { message }.into()
}

/// Write a snapshot as one row per cell.
///
/// Scalar outputs get native columns; complex, array and object outputs and
/// all custom arguments are stored as JSON text.
pub fn write_parquet(snapshot: &StoreSnapshot, path: &Path) -> GsResult<()> {
    let batch = snapshot_to_record_batch(snapshot)?;
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).map_err(parquet_error)?;
    writer.write(&batch).map_err(parquet_error)?;
    writer.close().map_err(parquet_error)?;
    Ok(())
}

/// Read a snapshot written by [`write_parquet`].
pub fn read_parquet(path: &Path) -> GsResult<StoreSnapshot> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(parquet_error)?;

    let header_json = builder
        .schema()
        .metadata()
        .get(HEADER_METADATA_KEY)
        .cloned()
        .or_else(|| {
            builder
                .metadata()
                .file_metadata()
                .key_value_metadata()
                .and_then(|kvs| kvs.iter().find(|kv| kv.key == HEADER_METADATA_KEY))
                .and_then(|kv| kv.value.clone())
        })
        .ok_or_else(|| corruption("snapshot header is missing".to_string()))?;
    let header: SnapshotHeader = serde_json::from_str(&header_json)?;
    let grid = GridSpace::new(header.parameters.clone())?;

    let reader = builder.build().map_err(parquet_error)?;
    let mut cells = Vec::with_capacity(grid.cardinality());
    for batch in reader {
        let batch = batch.map_err(arrow_error)?;
        record_batch_to_cells(&batch, &header, &grid, &mut cells)?;
    }

    if cells.len() != grid.cardinality() {
        return Err(corruption(format!(
            "expected {} rows, found {}",
            grid.cardinality(),
            cells.len()
        )));
    }
    Ok(StoreSnapshot { header, cells })
}

fn snapshot_to_record_batch(snapshot: &StoreSnapshot) -> GsResult<RecordBatch> {
    let header = &snapshot.header;
    let cells = &snapshot.cells;
    let grid = GridSpace::new(header.parameters.clone())?;
    if cells.len() != grid.cardinality() {
        return Err(corruption(format!(
            "snapshot has {} cells for a grid of {} points",
            cells.len(),
            grid.cardinality()
        )));
    }

    let mut fields = Vec::new();
    let mut arrays: Vec<ArrayRef> = Vec::new();

    let coords: Vec<_> = grid.coordinates().collect();
    for (dim, name) in grid.dims().iter().enumerate() {
        let indices: Vec<u64> = coords.iter().map(|c| c.indices()[dim] as u64).collect();
        fields.push(Field::new(coord_column(name), DataType::UInt64, false));
        arrays.push(Arc::new(UInt64Array::from(indices)));
    }

    let statuses: Vec<String> = cells.iter().map(|c| c.status.code().to_string()).collect();
    let priorities: Vec<i64> = cells.iter().map(|c| c.priority).collect();
    let durations: Vec<Option<f64>> = cells.iter().map(|c| c.duration).collect();
    let identifiers: Vec<Option<String>> = cells.iter().map(|c| c.identifier.clone()).collect();
    let errors: Vec<Option<String>> = cells.iter().map(|c| c.error.clone()).collect();
    let finished: Vec<Option<String>> = cells
        .iter()
        .map(|c| c.finished_at.map(|t| t.to_rfc3339()))
        .collect();

    fields.push(Field::new(STATUS, DataType::Utf8, false));
    arrays.push(Arc::new(StringArray::from(statuses)));
    fields.push(Field::new(PRIORITY, DataType::Int64, false));
    arrays.push(Arc::new(Int64Array::from(priorities)));
    fields.push(Field::new(DURATION, DataType::Float64, true));
    arrays.push(Arc::new(Float64Array::from(durations)));
    fields.push(Field::new(IDENTIFIER, DataType::Utf8, true));
    arrays.push(Arc::new(StringArray::from(identifiers)));
    fields.push(Field::new(ERROR, DataType::Utf8, true));
    arrays.push(Arc::new(StringArray::from(errors)));
    fields.push(Field::new(FINISHED_AT, DataType::Utf8, true));
    arrays.push(Arc::new(StringArray::from(finished)));

    for name in &header.custom_arguments {
        let values = cells
            .iter()
            .map(|c| c.custom_args.get(name).map(serde_json::to_string).transpose())
            .collect::<Result<Vec<Option<String>>, _>>()?;
        fields.push(Field::new(arg_column(name), DataType::Utf8, true));
        arrays.push(Arc::new(StringArray::from(values)));
    }

    for output in &header.outputs.outputs {
        let values: Vec<Option<&Value>> = cells.iter().map(|c| c.results.get(&output.name)).collect();
        let (data_type, array) = encode_output(&output.name, output.kind, &values)?;
        fields.push(Field::new(result_column(&output.name), data_type, true));
        arrays.push(array);
    }

    let metadata = HashMap::from([(
        HEADER_METADATA_KEY.to_string(),
        serde_json::to_string(header)?,
    )]);
    let schema = Arc::new(Schema::new_with_metadata(fields, metadata));
    RecordBatch::try_new(schema, arrays).map_err(arrow_error)
}

fn kind_error(name: &str, expected: ValueKind, value: &Value) -> GsError {
    corruption(format!(
        "output '{name}' is declared as {expected} but a cell holds {}",
        value.kind()
    ))
}

fn encode_output(name: &str, kind: ValueKind, values: &[Option<&Value>]) -> GsResult<(DataType, ArrayRef)> {
    let encoded: (DataType, ArrayRef) = match kind {
        ValueKind::Int => {
            let column = values
                .iter()
                .map(|v| v.map(|v| v.as_i64().ok_or_else(|| kind_error(name, kind, v))).transpose())
                .collect::<GsResult<Vec<Option<i64>>>>()?;
            (DataType::Int64, Arc::new(Int64Array::from(column)))
        }
        ValueKind::Float => {
            let column = values
                .iter()
                .map(|v| v.map(|v| v.as_f64().ok_or_else(|| kind_error(name, kind, v))).transpose())
                .collect::<GsResult<Vec<Option<f64>>>>()?;
            (DataType::Float64, Arc::new(Float64Array::from(column)))
        }
        ValueKind::Bool => {
            let column = values
                .iter()
                .map(|v| v.map(|v| v.as_bool().ok_or_else(|| kind_error(name, kind, v))).transpose())
                .collect::<GsResult<Vec<Option<bool>>>>()?;
            (DataType::Boolean, Arc::new(BooleanArray::from(column)))
        }
        ValueKind::Str => {
            let column = values
                .iter()
                .map(|v| {
                    v.map(|v| {
                        v.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| kind_error(name, kind, v))
                    })
                    .transpose()
                })
                .collect::<GsResult<Vec<Option<String>>>>()?;
            (DataType::Utf8, Arc::new(StringArray::from(column)))
        }
        ValueKind::Complex | ValueKind::Array | ValueKind::Object => {
            let column = values
                .iter()
                .map(|v| v.map(serde_json::to_string).transpose())
                .collect::<Result<Vec<Option<String>>, _>>()?;
            (DataType::Utf8, Arc::new(StringArray::from(column)))
        }
    };
    Ok(encoded)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> GsResult<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| corruption(format!("missing or invalid column '{name}'")))
}

fn opt_string(array: &StringArray, row: usize) -> Option<String> {
    if array.is_null(row) {
        None
    } else {
        Some(array.value(row).to_string())
    }
}

fn decode_output(batch: &RecordBatch, name: &str, kind: ValueKind, row: usize) -> GsResult<Option<Value>> {
    let column_name = result_column(name);
    let value = match kind {
        ValueKind::Int => {
            let array = column::<Int64Array>(batch, &column_name)?;
            (!array.is_null(row)).then(|| Value::Int(array.value(row)))
        }
        ValueKind::Float => {
            let array = column::<Float64Array>(batch, &column_name)?;
            (!array.is_null(row)).then(|| Value::Float(array.value(row)))
        }
        ValueKind::Bool => {
            let array = column::<BooleanArray>(batch, &column_name)?;
            (!array.is_null(row)).then(|| Value::Bool(array.value(row)))
        }
        ValueKind::Str => {
            let array = column::<StringArray>(batch, &column_name)?;
            opt_string(array, row).map(Value::Str)
        }
        ValueKind::Complex | ValueKind::Array | ValueKind::Object => {
            let array = column::<StringArray>(batch, &column_name)?;
            match opt_string(array, row) {
                Some(json) => Some(serde_json::from_str(&json)?),
                None => None,
            }
        }
    };
    Ok(value)
}

fn record_batch_to_cells(
    batch: &RecordBatch,
    header: &SnapshotHeader,
    grid: &GridSpace,
    cells: &mut Vec<Cell>,
) -> GsResult<()> {
    let dims = grid.dims();
    let coord_arrays = dims
        .iter()
        .map(|name| column::<UInt64Array>(batch, &coord_column(name)))
        .collect::<GsResult<Vec<_>>>()?;
    let statuses = column::<StringArray>(batch, STATUS)?;
    let priorities = column::<Int64Array>(batch, PRIORITY)?;
    let durations = column::<Float64Array>(batch, DURATION)?;
    let identifiers = column::<StringArray>(batch, IDENTIFIER)?;
    let errors = column::<StringArray>(batch, ERROR)?;
    let finished = column::<StringArray>(batch, FINISHED_AT)?;
    let arg_arrays = header
        .custom_arguments
        .iter()
        .map(|name| Ok((name, column::<StringArray>(batch, &arg_column(name))?)))
        .collect::<GsResult<Vec<_>>>()?;

    for row in 0..batch.num_rows() {
        let expected = grid
            .coordinate_at(cells.len())
            .ok_or_else(|| corruption("more rows than grid points".to_string()))?;
        for (dim, array) in coord_arrays.iter().enumerate() {
            if array.value(row) as usize != expected.indices()[dim] {
                return Err(corruption(format!(
                    "row {} is out of order, expected coordinate {}",
                    cells.len(),
                    expected
                )));
            }
        }

        let code = statuses.value(row);
        let status = code
            .chars()
            .next()
            .and_then(CellStatus::from_code)
            .ok_or_else(|| corruption(format!("unknown status code '{code}'")))?;

        let mut cell = Cell::new();
        cell.status = status;
        cell.priority = priorities.value(row);
        cell.duration = (!durations.is_null(row)).then(|| durations.value(row));
        cell.identifier = opt_string(identifiers, row);
        cell.error = opt_string(errors, row);
        cell.finished_at = match opt_string(finished, row) {
            Some(text) => Some(
                DateTime::parse_from_rfc3339(&text)
                    .map_err(|e| corruption(format!("bad timestamp '{text}': {e}")))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        for (name, array) in &arg_arrays {
            if let Some(json) = opt_string(array, row) {
                cell.custom_args.insert(name.to_string(), serde_json::from_str(&json)?);
            }
        }
        for output in &header.outputs.outputs {
            if let Some(value) = decode_output(batch, &output.name, output.kind, row)? {
                cell.results.insert(output.name.clone(), value);
            }
        }

        cells.push(cell);
    }
    Ok(())
}
