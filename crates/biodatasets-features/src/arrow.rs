//! Arrow schema for features, with the feature dict embedded as metadata.
use crate::custom::FeatureRegistry;
use crate::error::{FeatureError, Result};
use crate::leaves::{Dtype, LeafKind};
use crate::schema::{Features, SchemaNode};
use arrow_schema::{DataType, Field, Fields, Schema};
use serde_json::{json, Value as Json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Schema metadata key holding `{"info": {"features": ...}}`.
pub const METADATA_KEY: &str = "biodatasets";

/// Same payload, under the key generic dataset readers look for.
pub const HF_METADATA_KEY: &str = "huggingface";

const LIST_ITEM: &str = "item";

fn item_field(data_type: DataType) -> Arc<Field> {
    Arc::new(Field::new(LIST_ITEM, data_type, true))
}

pub fn dtype_to_arrow(dtype: Dtype) -> DataType {
    match dtype {
        Dtype::Null => DataType::Null,
        Dtype::Bool => DataType::Boolean,
        Dtype::Int8 => DataType::Int8,
        Dtype::Int16 => DataType::Int16,
        Dtype::Int32 => DataType::Int32,
        Dtype::Int64 => DataType::Int64,
        Dtype::Uint8 => DataType::UInt8,
        Dtype::Uint16 => DataType::UInt16,
        Dtype::Uint32 => DataType::UInt32,
        Dtype::Uint64 => DataType::UInt64,
        Dtype::Float16 => DataType::Float16,
        Dtype::Float32 => DataType::Float32,
        Dtype::Float64 => DataType::Float64,
        Dtype::String => DataType::Utf8,
        Dtype::LargeString => DataType::LargeUtf8,
        Dtype::Binary => DataType::Binary,
        Dtype::LargeBinary => DataType::LargeBinary,
    }
}

pub fn arrow_to_dtype(data_type: &DataType) -> Option<Dtype> {
    let dtype = match data_type {
        DataType::Null => Dtype::Null,
        DataType::Boolean => Dtype::Bool,
        DataType::Int8 => Dtype::Int8,
        DataType::Int16 => Dtype::Int16,
        DataType::Int32 => Dtype::Int32,
        DataType::Int64 => Dtype::Int64,
        DataType::UInt8 => Dtype::Uint8,
        DataType::UInt16 => Dtype::Uint16,
        DataType::UInt32 => Dtype::Uint32,
        DataType::UInt64 => Dtype::Uint64,
        DataType::Float16 => Dtype::Float16,
        DataType::Float32 => Dtype::Float32,
        DataType::Float64 => Dtype::Float64,
        DataType::Utf8 => Dtype::String,
        DataType::LargeUtf8 => Dtype::LargeString,
        DataType::Binary => Dtype::Binary,
        DataType::LargeBinary => Dtype::LargeBinary,
        _ => return None,
    };
    Some(dtype)
}

/// Storage struct of file blobs: `{bytes: binary, path: string}`.
pub fn blob_arrow_type() -> DataType {
    DataType::Struct(Fields::from(vec![
        Field::new("bytes", DataType::Binary, true),
        Field::new("path", DataType::Utf8, true),
    ]))
}

fn list_type(child: DataType, length: i64) -> DataType {
    if length >= 0 {
        DataType::FixedSizeList(item_field(child), length as i32)
    } else {
        DataType::List(item_field(child))
    }
}

impl SchemaNode {
    /// The Arrow type this node is stored as.
    pub fn arrow_type(&self) -> DataType {
        match self {
            SchemaNode::Mapping(features) => DataType::Struct(features.arrow_fields()),
            SchemaNode::FixedList(child) => DataType::List(item_field(child.arrow_type())),
            SchemaNode::LargeList(child) => DataType::LargeList(item_field(child.arrow_type())),
            SchemaNode::NullableSequence { feature, length } => match feature.as_ref() {
                // a sequence of records is stored as a struct of lists
                SchemaNode::Mapping(fields) => DataType::Struct(
                    fields
                        .iter()
                        .map(|(name, node)| Field::new(name, list_type(node.arrow_type(), *length), true))
                        .collect(),
                ),
                child => list_type(child.arrow_type(), *length),
            },
            SchemaNode::Leaf(leaf) => match leaf {
                LeafKind::Value(value) => dtype_to_arrow(value.dtype),
                LeafKind::ClassLabel(_) => DataType::Int64,
                LeafKind::Audio(_) | LeafKind::Image(_) => blob_arrow_type(),
                LeafKind::Custom(feature) => feature.storage_schema().arrow_type(),
            },
        }
    }
}

/// Infers a feature from a physical Arrow type.
pub fn generate_from_arrow_type(data_type: &DataType) -> Result<SchemaNode> {
    match data_type {
        DataType::Struct(fields) => fields
            .iter()
            .map(|field| Ok((field.name().clone(), generate_from_arrow_type(field.data_type())?)))
            .collect::<Result<Features>>()
            .map(SchemaNode::Mapping),
        DataType::List(item) => Ok(SchemaNode::sequence(generate_from_arrow_type(item.data_type())?)),
        DataType::LargeList(item) => Ok(SchemaNode::large_list(generate_from_arrow_type(item.data_type())?)),
        DataType::FixedSizeList(item, length) => Ok(SchemaNode::sequence_with_length(
            generate_from_arrow_type(item.data_type())?,
            *length as i64,
        )),
        other => arrow_to_dtype(other)
            .map(SchemaNode::value)
            .ok_or_else(|| FeatureError::UnsupportedArrowType(other.to_string())),
    }
}

impl Features {
    pub fn arrow_fields(&self) -> Fields {
        self.iter()
            .map(|(name, node)| Field::new(name, node.arrow_type(), true))
            .collect()
    }

    /// Arrow schema with the feature dict embedded under [`METADATA_KEY`].
    pub fn arrow_schema(&self) -> Result<Schema> {
        let payload = serde_json::to_string(&json!({"info": {"features": self.to_dict()}}))?;
        let metadata = HashMap::from([
            (METADATA_KEY.to_string(), payload.clone()),
            (HF_METADATA_KEY.to_string(), payload),
        ]);
        Ok(Schema::new(self.arrow_fields()).with_metadata(metadata))
    }

    /// Rebuilds features from an Arrow schema.
    ///
    /// Embedded features are used for every field whose physical type still
    /// matches; other fields are inferred from their Arrow type. With
    /// `force_hf_features` the `biodatasets` metadata is ignored.
    pub fn from_arrow_schema(
        schema: &Schema,
        registry: &FeatureRegistry,
        force_hf_features: bool,
    ) -> Result<Features> {
        let metadata = schema.metadata();
        let embedded = match metadata.get(METADATA_KEY) {
            Some(payload) if !force_hf_features => Some(embedded_features(payload, registry)?),
            _ => match metadata.get(HF_METADATA_KEY) {
                Some(payload) => embedded_features(payload, registry)
                    .inspect_err(|err| warn!("ignoring embedded features: {err}"))
                    .ok(),
                None => None,
            },
        }
        .flatten();

        schema
            .fields()
            .iter()
            .map(|field| {
                let known = embedded
                    .as_ref()
                    .and_then(|features| features.get(field.name()))
                    .filter(|node| &node.arrow_type() == field.data_type());
                let node = match known {
                    Some(node) => node.clone(),
                    None => generate_from_arrow_type(field.data_type())?,
                };
                Ok((field.name().clone(), node))
            })
            .collect()
    }
}

fn embedded_features(payload: &str, registry: &FeatureRegistry) -> Result<Option<Features>> {
    let metadata: Json = serde_json::from_str(payload)?;
    match metadata.pointer("/info/features") {
        Some(Json::Null) | None => Ok(None),
        Some(dict) => Features::from_dict(dict, registry).map(Some),
    }
}
