//! Arrow record batches back to examples.
use anyhow::{bail, Result};
use arrow_array::cast::AsArray;
use arrow_array::types::{Float64Type, Int64Type};
use arrow_array::{Array, ArrayRef, RecordBatch};
use arrow_cast::cast;
use arrow_schema::DataType;
use biodatasets_features::Example;
use std::collections::BTreeMap;

pub fn record_batch_to_examples(batch: &RecordBatch) -> Result<Vec<Example>> {
    let schema = batch.schema();
    let columns = batch
        .columns()
        .iter()
        .map(|column| array_to_examples(column))
        .collect::<Result<Vec<_>>>()?;

    let mut rows: Vec<BTreeMap<String, Example>> = vec![BTreeMap::new(); batch.num_rows()];
    for (field, column) in schema.fields().iter().zip(columns) {
        for (row, value) in rows.iter_mut().zip(column) {
            row.insert(field.name().clone(), value);
        }
    }
    Ok(rows.into_iter().map(Example::Map).collect())
}

fn list_values(array: Option<ArrayRef>) -> Result<Example> {
    match array {
        Some(values) => Ok(Example::List(array_to_examples(&values)?)),
        None => Ok(Example::Null),
    }
}

pub fn array_to_examples(array: &ArrayRef) -> Result<Vec<Example>> {
    let values = match array.data_type() {
        DataType::Null => vec![Example::Null; array.len()],
        DataType::Boolean => array
            .as_boolean()
            .iter()
            .map(|v| v.map(Example::Bool).unwrap_or_default())
            .collect(),
        dt if dt.is_integer() => cast(array, &DataType::Int64)?
            .as_primitive::<Int64Type>()
            .iter()
            .map(|v| v.map(Example::Int).unwrap_or_default())
            .collect(),
        dt if dt.is_floating() => cast(array, &DataType::Float64)?
            .as_primitive::<Float64Type>()
            .iter()
            .map(|v| v.map(Example::Float).unwrap_or_default())
            .collect(),
        DataType::Utf8 => array
            .as_string::<i32>()
            .iter()
            .map(|v| v.map(Example::from).unwrap_or_default())
            .collect(),
        DataType::LargeUtf8 => array
            .as_string::<i64>()
            .iter()
            .map(|v| v.map(Example::from).unwrap_or_default())
            .collect(),
        DataType::Binary => array
            .as_binary::<i32>()
            .iter()
            .map(|v| v.map(|b| Example::Bytes(b.to_vec())).unwrap_or_default())
            .collect(),
        DataType::LargeBinary => array
            .as_binary::<i64>()
            .iter()
            .map(|v| v.map(|b| Example::Bytes(b.to_vec())).unwrap_or_default())
            .collect(),
        DataType::List(_) => array
            .as_list::<i32>()
            .iter()
            .map(list_values)
            .collect::<Result<_>>()?,
        DataType::LargeList(_) => array
            .as_list::<i64>()
            .iter()
            .map(list_values)
            .collect::<Result<_>>()?,
        DataType::FixedSizeList(_, _) => array
            .as_fixed_size_list()
            .iter()
            .map(list_values)
            .collect::<Result<_>>()?,
        DataType::Struct(fields) => {
            let structs = array.as_struct();
            let mut rows: Vec<BTreeMap<String, Example>> = vec![BTreeMap::new(); array.len()];
            for (field, column) in fields.iter().zip(structs.columns()) {
                for (row, value) in rows.iter_mut().zip(array_to_examples(column)?) {
                    row.insert(field.name().clone(), value);
                }
            }
            rows.into_iter()
                .enumerate()
                .map(|(idx, row)| {
                    if structs.is_null(idx) {
                        Example::Null
                    } else {
                        Example::Map(row)
                    }
                })
                .collect()
        }
        other => bail!("arrow type {other} cannot be read into examples"),
    };
    Ok(values)
}
