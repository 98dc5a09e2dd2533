//! JSON dict representation of features, as embedded in Arrow metadata.
//!
//! Leaves and list types are objects tagged with `_type`; mappings are plain
//! objects; the bare list form is a one-element array.
use crate::custom::FeatureRegistry;
use crate::error::{FeatureError, Result};
use crate::leaves::{Audio, ClassLabel, Dtype, Image, LeafKind, Value};
use crate::schema::{Features, SchemaNode};
use serde_json::{json, Map, Value as Json};
use std::str::FromStr;

impl SchemaNode {
    pub fn to_dict(&self) -> Json {
        match self {
            SchemaNode::Mapping(features) => features.to_dict(),
            SchemaNode::FixedList(child) => Json::Array(vec![child.to_dict()]),
            SchemaNode::LargeList(child) => json!({
                "feature": child.to_dict(),
                "_type": "LargeList",
            }),
            SchemaNode::NullableSequence { feature, length } => json!({
                "feature": feature.to_dict(),
                "length": length,
                "_type": "Sequence",
            }),
            SchemaNode::Leaf(leaf) => leaf_to_dict(leaf),
        }
    }

    pub fn from_dict(value: &Json, registry: &FeatureRegistry) -> Result<Self> {
        match value {
            Json::Array(items) => match items.as_slice() {
                [child] => Ok(SchemaNode::list(SchemaNode::from_dict(child, registry)?)),
                _ => Err(FeatureError::invalid(format!(
                    "list features hold exactly one sub-feature, got {}",
                    items.len()
                ))),
            },
            Json::Object(obj) => match obj.get("_type") {
                Some(Json::String(type_name)) => typed_from_dict(type_name, obj, registry),
                Some(other) => Err(FeatureError::invalid(format!("`_type` must be a string, got {other}"))),
                None => Features::from_dict_map(obj, registry).map(SchemaNode::Mapping),
            },
            other => Err(FeatureError::invalid(format!(
                "expected a dict or a list feature, got {other}"
            ))),
        }
    }
}

impl Features {
    pub fn to_dict(&self) -> Json {
        Json::Object(
            self.iter()
                .map(|(name, node)| (name.to_string(), node.to_dict()))
                .collect(),
        )
    }

    pub fn from_dict(value: &Json, registry: &FeatureRegistry) -> Result<Self> {
        match value {
            Json::Object(obj) => Self::from_dict_map(obj, registry),
            other => Err(FeatureError::invalid(format!("features must be a dict, got {other}"))),
        }
    }

    fn from_dict_map(obj: &Map<String, Json>, registry: &FeatureRegistry) -> Result<Self> {
        obj.iter()
            .map(|(name, sub)| Ok((name.clone(), SchemaNode::from_dict(sub, registry)?)))
            .collect()
    }
}

fn leaf_to_dict(leaf: &LeafKind) -> Json {
    match leaf {
        LeafKind::Value(value) => json!({"dtype": value.dtype.to_string(), "_type": "Value"}),
        LeafKind::ClassLabel(label) => json!({"names": label.names, "_type": "ClassLabel"}),
        LeafKind::Audio(audio) => json!({
            "sampling_rate": audio.sampling_rate,
            "mono": audio.mono,
            "decode": audio.decode,
            "_type": "Audio",
        }),
        LeafKind::Image(image) => json!({
            "mode": image.mode,
            "decode": image.decode,
            "_type": "Image",
        }),
        LeafKind::Custom(feature) => {
            let mut obj = feature.params();
            obj.insert("_type".to_string(), Json::String(feature.type_name().to_string()));
            Json::Object(obj)
        }
    }
}

fn sub_feature(obj: &Map<String, Json>, registry: &FeatureRegistry) -> Result<SchemaNode> {
    let feature = obj
        .get("feature")
        .ok_or_else(|| FeatureError::invalid("missing `feature`"))?;
    SchemaNode::from_dict(feature, registry)
}

fn typed_from_dict(type_name: &str, obj: &Map<String, Json>, registry: &FeatureRegistry) -> Result<SchemaNode> {
    let node = match type_name {
        "Value" => {
            let dtype = obj
                .get("dtype")
                .and_then(Json::as_str)
                .ok_or_else(|| FeatureError::invalid("Value needs a string `dtype`"))?;
            let dtype = Dtype::from_str(dtype)
                .map_err(|_| FeatureError::invalid(format!("unknown dtype `{dtype}`")))?;
            SchemaNode::Leaf(LeafKind::Value(Value::new(dtype)))
        }
        "ClassLabel" => SchemaNode::Leaf(LeafKind::ClassLabel(class_label_from_dict(obj)?)),
        "Audio" => SchemaNode::Leaf(LeafKind::Audio(Audio {
            sampling_rate: obj
                .get("sampling_rate")
                .and_then(Json::as_u64)
                .map(|rate| rate as u32),
            mono: obj.get("mono").and_then(Json::as_bool).unwrap_or(true),
            decode: obj.get("decode").and_then(Json::as_bool).unwrap_or(true),
        })),
        "Image" => SchemaNode::Leaf(LeafKind::Image(Image {
            mode: obj.get("mode").and_then(Json::as_str).map(str::to_string),
            decode: obj.get("decode").and_then(Json::as_bool).unwrap_or(true),
        })),
        "Sequence" => SchemaNode::sequence_with_length(
            sub_feature(obj, registry)?,
            obj.get("length").and_then(Json::as_i64).unwrap_or(-1),
        ),
        "LargeList" => SchemaNode::large_list(sub_feature(obj, registry)?),
        custom => {
            let mut params = obj.clone();
            params.remove("_type");
            SchemaNode::Leaf(LeafKind::Custom(registry.build(custom, &params)?))
        }
    };
    Ok(node)
}

fn class_label_from_dict(obj: &Map<String, Json>) -> Result<ClassLabel> {
    match (obj.get("names"), obj.get("num_classes")) {
        (Some(Json::Array(names)), _) => names
            .iter()
            .map(|name| {
                name.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| FeatureError::invalid(format!("class names must be strings, got {name}")))
            })
            .collect::<Result<Vec<_>>>()
            .map(|names| ClassLabel { names }),
        (_, Some(Json::Number(n))) => {
            let n = n
                .as_u64()
                .ok_or_else(|| FeatureError::invalid("`num_classes` must be a positive integer"))?;
            Ok(ClassLabel::new((0..n).map(|i| i.to_string())))
        }
        _ => Err(FeatureError::invalid("ClassLabel needs `names` or `num_classes`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_features() -> Features {
        let record = Features::new()
            .with("start", SchemaNode::value(Dtype::Int32))
            .with("kind", SchemaNode::class_label(["helix", "sheet"]));
        Features::new()
            .with("id", SchemaNode::value(Dtype::String))
            .with("expr", SchemaNode::sequence(SchemaNode::value(Dtype::Float32)))
            .with("coords", SchemaNode::sequence_with_length(SchemaNode::value(Dtype::Float32), 3))
            .with("segments", SchemaNode::sequence(SchemaNode::Mapping(record)))
            .with("tags", SchemaNode::list(SchemaNode::value(Dtype::String)))
            .with("scores", SchemaNode::large_list(SchemaNode::value(Dtype::Float64)))
            .with("picture", SchemaNode::image(Image::default()))
            .with("clip", SchemaNode::audio(Audio { sampling_rate: Some(16_000), ..Default::default() }))
    }

    #[test]
    fn test_dict_shape() {
        let dict = sample_features().to_dict();
        assert_eq!(dict["id"], json!({"dtype": "string", "_type": "Value"}));
        assert_eq!(dict["tags"], json!([{"dtype": "string", "_type": "Value"}]));
        assert_eq!(dict["expr"]["length"], json!(-1));
        assert_eq!(dict["segments"]["feature"]["kind"]["names"], json!(["helix", "sheet"]));
        // key order follows declaration order
        let keys: Vec<_> = dict.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys[0], "id");
        assert_eq!(keys[7], "clip");
    }

    #[test]
    fn test_dict_round_trip() {
        let features = sample_features();
        let parsed = Features::from_dict(&features.to_dict(), &FeatureRegistry::new()).unwrap();
        assert_eq!(parsed, features);
    }

    #[test]
    fn test_unknown_type_fails() {
        let dict = json!({"s": {"_type": "StructureFeature"}});
        let err = Features::from_dict(&dict, &FeatureRegistry::new()).unwrap_err();
        assert!(matches!(err, FeatureError::UnknownFeatureType(name) if name == "StructureFeature"));
    }

    #[test]
    fn test_class_label_from_num_classes() {
        let dict = json!({"label": {"num_classes": 3, "_type": "ClassLabel"}});
        let features = Features::from_dict(&dict, &FeatureRegistry::new()).unwrap();
        assert_eq!(
            features.get("label"),
            Some(&SchemaNode::class_label(["0", "1", "2"]))
        );
    }
}
