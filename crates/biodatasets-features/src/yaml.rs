//! Simplified YAML list form of features, as stored in dataset card metadata.
//!
//! ```yaml
//! - name: id
//!   dtype: string
//! - name: expression
//!   sequence: float32
//! - name: label
//!   dtype:
//!     class_label:
//!       names:
//!         '0': negative
//!         '1': positive
//! ```
use crate::custom::FeatureRegistry;
use crate::error::{FeatureError, Result};
use crate::leaves::Dtype;
use crate::schema::Features;
use serde_json::{json, Map, Value as Json};
use std::str::FromStr;

const LIST_TYPES: [&str; 3] = ["large_list", "list", "sequence"];

impl Features {
    /// Projects the features to the YAML-friendly list form.
    pub fn to_yaml_list(&self) -> Result<Json> {
        match to_yaml_inner(self.to_dict())? {
            Json::Object(mut obj) => obj
                .remove("struct")
                .ok_or_else(|| FeatureError::invalid("features did not project to a struct")),
            other => Err(FeatureError::invalid(format!("unexpected projection {other}"))),
        }
    }

    /// Parses the YAML list form back into features.
    pub fn from_yaml_list(yaml_data: &Json, registry: &FeatureRegistry) -> Result<Self> {
        let dict = from_yaml_inner(yaml_data.clone())?;
        Features::from_dict(&dict, registry)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_yaml_list()?)?)
    }

    pub fn from_yaml_str(yaml: &str, registry: &FeatureRegistry) -> Result<Self> {
        let yaml_data: Json = serde_yaml::from_str(yaml)?;
        Self::from_yaml_list(&yaml_data, registry)
    }
}

pub fn camelcase_to_snakecase(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    for c in name.chars() {
        if c.is_uppercase() && prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit()) {
            out.push('_');
        }
        out.extend(c.to_lowercase());
        prev = Some(c);
    }
    out
}

pub fn snakecase_to_camelcase(name: &str) -> String {
    name.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

fn expect_object(value: Json) -> Result<Map<String, Json>> {
    match value {
        Json::Object(obj) => Ok(obj),
        other => Err(FeatureError::invalid(format!("expected a dict, got {other}"))),
    }
}

fn simplify(mut feature: Map<String, Json>) -> Map<String, Json> {
    for list_type in LIST_TYPES {
        // list_type: {dtype: int32}  ->  list_type: int32
        // list_type: {struct: [...]} ->  list_type: [...]
        let unwrapped = match feature.get(list_type) {
            Some(Json::Object(inner)) if inner.len() == 1 => inner
                .get("dtype")
                .or_else(|| inner.get("struct"))
                .cloned(),
            _ => None,
        };
        if let Some(inner) = unwrapped {
            feature.insert(list_type.to_string(), inner);
        }
    }
    // class_label.names: [a, b] -> {'0': a, '1': b}
    if let Some(Json::Object(label)) = feature.get_mut("class_label") {
        if let Some(Json::Array(names)) = label.get("names") {
            let by_id: Map<String, Json> = names
                .iter()
                .enumerate()
                .map(|(id, name)| (id.to_string(), name.clone()))
                .collect();
            label.insert("names".to_string(), Json::Object(by_id));
        }
    }
    feature
}

fn to_yaml_inner(obj: Json) -> Result<Json> {
    match obj {
        Json::Object(mut obj) => {
            let type_name = match obj.remove("_type") {
                Some(Json::String(t)) => Some(t),
                Some(other) => return Err(FeatureError::invalid(format!("bad `_type` {other}"))),
                None => None,
            };
            match type_name.as_deref() {
                Some(list_type @ ("LargeList" | "Sequence")) => {
                    let feature = obj
                        .remove("feature")
                        .ok_or_else(|| FeatureError::invalid("missing `feature`"))?;
                    let key = if list_type == "LargeList" { "large_list" } else { "sequence" };
                    if obj.get("length").and_then(Json::as_i64) == Some(-1) {
                        obj.remove("length");
                    }
                    let mut out = Map::new();
                    out.insert(key.to_string(), to_yaml_inner(feature)?);
                    out.extend(obj);
                    Ok(Json::Object(simplify(out)))
                }
                Some("Value") => Ok(Json::Object(obj)),
                Some(t) if obj.is_empty() => Ok(json!({"dtype": camelcase_to_snakecase(t)})),
                Some(t) => {
                    let mut inner = Map::new();
                    inner.insert(camelcase_to_snakecase(t), Json::Object(obj));
                    Ok(json!({"dtype": Json::Object(simplify(inner))}))
                }
                None => {
                    let fields = obj
                        .into_iter()
                        .map(|(name, feature)| {
                            let mut entry = Map::new();
                            entry.insert("name".to_string(), Json::String(name));
                            entry.extend(expect_object(to_yaml_inner(feature)?)?);
                            Ok(Json::Object(entry))
                        })
                        .collect::<Result<Vec<_>>>()?;
                    Ok(json!({"struct": fields}))
                }
            }
        }
        Json::Array(mut items) if items.len() == 1 => {
            let inner = expect_object(to_yaml_inner(items.remove(0))?)?;
            let mut out = Map::new();
            out.insert("list".to_string(), Json::Object(simplify(inner)));
            Ok(Json::Object(simplify(out)))
        }
        other => Err(FeatureError::invalid(format!(
            "expected a dict or a one-element list, got {other}"
        ))),
    }
}

fn unsimplify(mut feature: Map<String, Json>) -> Result<Map<String, Json>> {
    for list_type in LIST_TYPES {
        // list_type: int32 -> list_type: {dtype: int32}
        if let Some(Json::String(dtype)) = feature.get(list_type) {
            let wrapped = json!({"dtype": dtype});
            feature.insert(list_type.to_string(), wrapped);
        }
    }
    if let Some(Json::Object(label)) = feature.get_mut("class_label") {
        if let Some(Json::Object(by_id)) = label.get("names") {
            let names = names_from_ids(by_id)?;
            label.insert("names".to_string(), Json::Array(names));
        }
    }
    Ok(feature)
}

/// `{'0': a, '1': b}` -> `[a, b]`, rejecting gaps in the id range.
fn names_from_ids(by_id: &Map<String, Json>) -> Result<Vec<Json>> {
    let mut ids = by_id
        .iter()
        .map(|(id, name)| {
            id.parse::<usize>()
                .map(|id| (id, name.clone()))
                .map_err(|_| FeatureError::invalid(format!("class label id `{id}` is not an integer")))
        })
        .collect::<Result<Vec<_>>>()?;
    ids.sort_by_key(|(id, _)| *id);
    if let Some((max, _)) = ids.last() {
        let contiguous = ids.iter().enumerate().all(|(idx, (id, _))| idx == *id);
        if !contiguous {
            return Err(FeatureError::InvalidClassLabel {
                expected_len: max + 1,
            });
        }
    }
    Ok(ids.into_iter().map(|(_, name)| name).collect())
}

fn from_yaml_inner(obj: Json) -> Result<Json> {
    match obj {
        Json::Object(obj) if obj.is_empty() => Ok(Json::Object(obj)),
        Json::Object(obj) => {
            if let Some((key, type_name)) = [("large_list", "LargeList"), ("sequence", "Sequence")]
                .into_iter()
                .find(|(key, _)| obj.contains_key(*key))
            {
                let mut obj = unsimplify(obj)?;
                let feature = obj.remove(key).unwrap_or(Json::Null);
                let mut out = Map::new();
                out.insert("feature".to_string(), from_yaml_inner(feature)?);
                if type_name == "Sequence" && !obj.contains_key("length") {
                    out.insert("length".to_string(), json!(-1));
                }
                out.extend(obj);
                out.insert("_type".to_string(), json!(type_name));
                return Ok(Json::Object(out));
            }
            if obj.contains_key("list") {
                let mut obj = unsimplify(obj)?;
                let feature = obj.remove("list").unwrap_or(Json::Null);
                return Ok(Json::Array(vec![from_yaml_inner(feature)?]));
            }
            if let Some(fields) = obj.get("struct") {
                return from_yaml_inner(fields.clone());
            }
            if let Some(dtype) = obj.get("dtype") {
                return match dtype {
                    Json::String(name) if Dtype::from_str(name).is_ok() => {
                        Ok(json!({"dtype": name, "_type": "Value"}))
                    }
                    // parameterless features such as `image`
                    Json::String(name) => Ok(json!({"_type": snakecase_to_camelcase(name)})),
                    other => from_yaml_inner(other.clone()),
                };
            }
            if obj.len() != 1 {
                return Err(FeatureError::invalid(format!(
                    "cannot interpret feature {}",
                    Json::Object(obj)
                )));
            }
            let mut obj = unsimplify(obj)?;
            let key = obj.keys().next().cloned().unwrap_or_default();
            let mut out = match obj.remove(&key) {
                Some(Json::Object(params)) => params,
                Some(Json::Null) | None => Map::new(),
                Some(other) => {
                    return Err(FeatureError::invalid(format!(
                        "parameters of `{key}` must be a dict, got {other}"
                    )))
                }
            };
            out.insert("_type".to_string(), json!(snakecase_to_camelcase(&key)));
            Ok(Json::Object(out))
        }
        Json::Array(fields) => {
            let mut out = Map::new();
            for field in fields {
                let mut field = expect_object(field)?;
                let name = match field.remove("name") {
                    Some(Json::String(name)) => name,
                    _ => return Err(FeatureError::invalid("struct fields need a string `name`")),
                };
                out.insert(name, from_yaml_inner(Json::Object(field))?);
            }
            Ok(Json::Object(out))
        }
        other => Err(FeatureError::invalid(format!(
            "expected a dict or a list, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaves::{Audio, Image};
    use crate::schema::SchemaNode;

    fn sample_features() -> Features {
        let record = Features::new()
            .with("start", SchemaNode::value(Dtype::Int32))
            .with("end", SchemaNode::value(Dtype::Int32));
        Features::new()
            .with("id", SchemaNode::value(Dtype::String))
            .with("expression", SchemaNode::sequence(SchemaNode::value(Dtype::Float32)))
            .with("label", SchemaNode::class_label(["negative", "positive"]))
            .with("coords", SchemaNode::sequence_with_length(SchemaNode::value(Dtype::Float32), 3))
            .with("segments", SchemaNode::large_list(SchemaNode::Mapping(record.clone())))
            .with("nested", SchemaNode::list(SchemaNode::list(SchemaNode::value(Dtype::Int64))))
            .with("meta", SchemaNode::Mapping(record))
            .with("picture", SchemaNode::image(Image::default()))
            .with("clip", SchemaNode::audio(Audio::default()))
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(camelcase_to_snakecase("ClassLabel"), "class_label");
        assert_eq!(camelcase_to_snakecase("StructureFeature"), "structure_feature");
        assert_eq!(camelcase_to_snakecase("Image"), "image");
        assert_eq!(snakecase_to_camelcase("atom_array_feature"), "AtomArrayFeature");
        assert_eq!(snakecase_to_camelcase("image"), "Image");
    }

    #[test]
    fn test_simplified_shape() {
        let yaml = sample_features().to_yaml_list().unwrap();
        assert_eq!(yaml[0], json!({"name": "id", "dtype": "string"}));
        assert_eq!(yaml[1], json!({"name": "expression", "sequence": "float32"}));
        assert_eq!(
            yaml[2],
            json!({"name": "label", "dtype": {"class_label": {"names": {"0": "negative", "1": "positive"}}}})
        );
        assert_eq!(yaml[3], json!({"name": "coords", "sequence": "float32", "length": 3}));
        assert_eq!(
            yaml[4],
            json!({"name": "segments", "large_list": [
                {"name": "start", "dtype": "int32"},
                {"name": "end", "dtype": "int32"}
            ]})
        );
        assert_eq!(yaml[5], json!({"name": "nested", "list": {"list": "int64"}}));
    }

    #[test]
    fn test_yaml_round_trip() {
        let features = sample_features();
        let yaml = features.to_yaml_list().unwrap();
        let parsed = Features::from_yaml_list(&yaml, &FeatureRegistry::new()).unwrap();
        assert_eq!(parsed, features);

        let text = features.to_yaml_string().unwrap();
        let parsed = Features::from_yaml_str(&text, &FeatureRegistry::new()).unwrap();
        assert_eq!(parsed, features);
    }

    #[test]
    fn test_class_label_gap_is_rejected() {
        let yaml = json!([
            {"name": "label", "dtype": {"class_label": {"names": {"0": "a", "2": "b"}}}}
        ]);
        let err = Features::from_yaml_list(&yaml, &FeatureRegistry::new()).unwrap_err();
        assert!(matches!(err, FeatureError::InvalidClassLabel { expected_len: 3 }));
    }

    #[test]
    fn test_class_label_ids_are_sorted_numerically() {
        let names: Map<String, Json> = (0..12).map(|i| (i.to_string(), json!(format!("c{i}")))).collect();
        let yaml = json!([{"name": "label", "dtype": {"class_label": {"names": names}}}]);
        let features = Features::from_yaml_list(&yaml, &FeatureRegistry::new()).unwrap();
        let expected: Vec<String> = (0..12).map(|i| format!("c{i}")).collect();
        assert_eq!(features.get("label"), Some(&SchemaNode::class_label(expected)));
    }

    #[test]
    fn test_hand_written_yaml() {
        let text = r#"
- name: id
  dtype: string
- name: expression
  sequence: float32
- name: image
  dtype: image
"#;
        let features = Features::from_yaml_str(text, &FeatureRegistry::new()).unwrap();
        assert_eq!(features.get("id"), Some(&SchemaNode::value(Dtype::String)));
        assert_eq!(
            features.get("expression"),
            Some(&SchemaNode::sequence(SchemaNode::value(Dtype::Float32)))
        );
        assert_eq!(features.get("image"), Some(&SchemaNode::image(Image::default())));
    }
}
