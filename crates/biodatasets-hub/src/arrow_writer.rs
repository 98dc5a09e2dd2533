//! Encoded examples to Arrow record batches.
//!
//! Arrays are built from the physical Arrow type of each column, so custom
//! features only need to produce values shaped like their storage schema.
use anyhow::{anyhow, bail, Context, Result};
use arrow_array::{
    new_null_array, ArrayRef, BinaryArray, BooleanArray, FixedSizeListArray, Float64Array,
    Int64Array, LargeBinaryArray, LargeListArray, LargeStringArray, ListArray, NullArray,
    RecordBatch, StringArray, StructArray,
};
use arrow_buffer::{NullBuffer, OffsetBuffer};
use arrow_cast::{cast_with_options, CastOptions};
use arrow_schema::{DataType, SchemaRef};
use biodatasets_features::Example;
use std::sync::Arc;

fn strict_cast() -> CastOptions<'static> {
    CastOptions {
        safe: false,
        ..Default::default()
    }
}

static NULL: Example = Example::Null;

/// Builds one record batch from rows already encoded against the schema's features.
pub fn examples_to_record_batch(schema: SchemaRef, rows: &[Example]) -> Result<RecordBatch> {
    let columns = schema
        .fields()
        .iter()
        .map(|field| {
            let values: Vec<&Example> = rows
                .iter()
                .map(|row| row.get(field.name()).unwrap_or(&NULL))
                .collect();
            build_array(field.data_type(), &values)
                .with_context(|| format!("failed to build column `{}`", field.name()))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(RecordBatch::try_new(schema, columns)?)
}

fn nulls(values: &[&Example]) -> Option<NullBuffer> {
    values
        .iter()
        .any(|value| value.is_null())
        .then(|| NullBuffer::from(values.iter().map(|value| !value.is_null()).collect::<Vec<_>>()))
}

fn mismatch(expected: &DataType, value: &Example) -> anyhow::Error {
    anyhow!("cannot store a {} value in a {expected} column", value.kind())
}

fn build_array(data_type: &DataType, values: &[&Example]) -> Result<ArrayRef> {
    let array: ArrayRef = match data_type {
        DataType::Null => Arc::new(NullArray::new(values.len())),
        DataType::Boolean => Arc::new(
            values
                .iter()
                .map(|value| match value {
                    Example::Null => Ok(None),
                    Example::Bool(b) => Ok(Some(*b)),
                    other => Err(mismatch(data_type, other)),
                })
                .collect::<Result<BooleanArray>>()?,
        ),
        dt if dt.is_integer() => {
            let ints = values
                .iter()
                .map(|value| match value {
                    Example::Null => Ok(None),
                    Example::Int(i) => Ok(Some(*i)),
                    Example::Bool(b) => Ok(Some(i64::from(*b))),
                    other => Err(mismatch(data_type, other)),
                })
                .collect::<Result<Int64Array>>()?;
            // out of range values must fail rather than turn into nulls
            cast_with_options(&ints, dt, &strict_cast())?
        }
        dt if dt.is_floating() => {
            let floats = values
                .iter()
                .map(|value| match value {
                    Example::Null => Ok(None),
                    Example::Float(f) => Ok(Some(*f)),
                    Example::Int(i) => Ok(Some(*i as f64)),
                    other => Err(mismatch(data_type, other)),
                })
                .collect::<Result<Float64Array>>()?;
            cast_with_options(&floats, dt, &strict_cast())?
        }
        DataType::Utf8 => Arc::new(strings(data_type, values)?.into_iter().collect::<StringArray>()),
        DataType::LargeUtf8 => Arc::new(strings(data_type, values)?.into_iter().collect::<LargeStringArray>()),
        DataType::Binary => Arc::new(BinaryArray::from(binaries(data_type, values)?)),
        DataType::LargeBinary => Arc::new(LargeBinaryArray::from(binaries(data_type, values)?)),
        DataType::List(field) => {
            let (lengths, children) = list_children(data_type, values)?;
            let child = build_array(field.data_type(), &children)?;
            Arc::new(ListArray::try_new(
                field.clone(),
                OffsetBuffer::from_lengths(lengths),
                child,
                nulls(values),
            )?)
        }
        DataType::LargeList(field) => {
            let (lengths, children) = list_children(data_type, values)?;
            let child = build_array(field.data_type(), &children)?;
            Arc::new(LargeListArray::try_new(
                field.clone(),
                OffsetBuffer::from_lengths(lengths),
                child,
                nulls(values),
            )?)
        }
        DataType::FixedSizeList(field, size) => {
            let width = *size as usize;
            let mut children = Vec::with_capacity(values.len() * width);
            for value in values {
                match value {
                    Example::Null => children.extend(std::iter::repeat(&NULL).take(width)),
                    Example::List(items) if items.len() == width => children.extend(items.iter()),
                    Example::List(items) => bail!(
                        "expected a list of length {width}, got {} items",
                        items.len()
                    ),
                    other => return Err(mismatch(data_type, other)),
                }
            }
            let child = build_array(field.data_type(), &children)?;
            Arc::new(FixedSizeListArray::try_new(
                field.clone(),
                *size,
                child,
                nulls(values),
            )?)
        }
        DataType::Struct(fields) => {
            if values.is_empty() {
                return Ok(new_null_array(data_type, 0));
            }
            for value in values {
                if !matches!(value, Example::Null | Example::Map(_)) {
                    return Err(mismatch(data_type, value));
                }
            }
            let children = fields
                .iter()
                .map(|field| {
                    let column: Vec<&Example> = values
                        .iter()
                        .map(|value| value.get(field.name()).unwrap_or(&NULL))
                        .collect();
                    build_array(field.data_type(), &column)
                        .with_context(|| format!("in field `{}`", field.name()))
                })
                .collect::<Result<Vec<_>>>()?;
            Arc::new(StructArray::try_new(fields.clone(), children, nulls(values))?)
        }
        other => bail!("arrow type {other} is not supported for storage"),
    };
    Ok(array)
}

fn strings<'a>(data_type: &DataType, values: &[&'a Example]) -> Result<Vec<Option<&'a str>>> {
    values
        .iter()
        .map(|value| match value {
            Example::Null => Ok(None),
            Example::Str(s) => Ok(Some(s.as_str())),
            other => Err(mismatch(data_type, other)),
        })
        .collect()
}

fn binaries<'a>(data_type: &DataType, values: &[&'a Example]) -> Result<Vec<Option<&'a [u8]>>> {
    values
        .iter()
        .map(|value| match value {
            Example::Null => Ok(None),
            Example::Bytes(b) => Ok(Some(b.as_slice())),
            Example::Str(s) => Ok(Some(s.as_bytes())),
            other => Err(mismatch(data_type, other)),
        })
        .collect()
}

fn list_children<'a>(data_type: &DataType, values: &[&'a Example]) -> Result<(Vec<usize>, Vec<&'a Example>)> {
    let mut lengths = Vec::with_capacity(values.len());
    let mut children = Vec::new();
    for value in values {
        match value {
            Example::Null => lengths.push(0),
            Example::List(items) => {
                lengths.push(items.len());
                children.extend(items.iter());
            }
            other => return Err(mismatch(data_type, other)),
        }
    }
    Ok((lengths, children))
}
