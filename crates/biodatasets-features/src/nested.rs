//! Schema-directed encoding and decoding of nested examples.
//!
//! Lists are transformed element by element, except for lists of lists: there
//! both directions first transform a single sample element (the first element
//! that is not null and, when it is a list, not empty, checked recursively) and
//! leave the outer list untouched when that sample comes back unchanged. A
//! sample that is not itself a list always leads to every element being
//! transformed, so mixed scalar lists such as `[0, "pos"]` are fully coerced.
use crate::custom::DecodeContext;
use crate::error::{FeatureError, Result};
use crate::example::Example;
use crate::leaves::LeafKind;
use crate::schema::{Features, SchemaNode};
use std::collections::BTreeMap;

/// Whether `obj` is non-null and, for lists, has a non-null non-empty first
/// element (following the list schema when one is given).
pub fn check_non_null_non_empty_recursive(obj: &Example, schema: Option<&SchemaNode>) -> bool {
    match obj {
        Example::Null => false,
        Example::List(items) if schema.map_or(true, SchemaNode::is_list_like) => {
            match items.first() {
                Some(first) => {
                    check_non_null_non_empty_recursive(first, schema.and_then(SchemaNode::list_child))
                }
                None => false,
            }
        }
        _ => true,
    }
}

fn sample_element<'a>(items: &'a [Example], sub_schema: &SchemaNode) -> Option<&'a Example> {
    items
        .iter()
        .find(|item| check_non_null_non_empty_recursive(item, Some(sub_schema)))
        .or_else(|| items.last())
}

fn expect_list(obj: Example) -> Result<Option<Vec<Example>>> {
    match obj {
        Example::Null => Ok(None),
        Example::List(items) => Ok(Some(items)),
        // strings must never be iterated as sequences
        other => Err(FeatureError::mismatch("list", other.kind())),
    }
}

/// Encodes `obj` for storage according to `schema`.
///
/// `is_nested` is false only for the root call; a null root mapping is an error.
pub fn encode_nested_example(schema: &SchemaNode, obj: Example, is_nested: bool) -> Result<Example> {
    match schema {
        SchemaNode::Mapping(features) => encode_mapping(features, obj, is_nested),
        SchemaNode::FixedList(sub_schema) | SchemaNode::LargeList(sub_schema) => {
            match expect_list(obj)? {
                Some(items) => encode_list(sub_schema, items),
                None => Ok(Example::Null),
            }
        }
        SchemaNode::NullableSequence { feature, .. } => match feature.as_ref() {
            // list of dicts and dict of lists both become a dict of lists
            SchemaNode::Mapping(fields) => encode_dict_sequence(fields, obj),
            sub_schema => match expect_list(obj)? {
                Some(items) => encode_list(sub_schema, items),
                None => Ok(Example::Null),
            },
        },
        SchemaNode::Leaf(leaf) => encode_leaf(leaf, obj),
    }
}

pub(crate) fn encode_mapping(features: &Features, obj: Example, is_nested: bool) -> Result<Example> {
    match obj {
        Example::Null if !is_nested => Err(FeatureError::mismatch("dict", "None")),
        Example::Null => Ok(Example::Null),
        Example::Map(mut map) => {
            let mut out = BTreeMap::new();
            for (name, sub_schema) in features.iter() {
                let value = map.remove(name).unwrap_or_default();
                out.insert(name.to_string(), encode_nested_example(sub_schema, value, true)?);
            }
            Ok(Example::Map(out))
        }
        other => Err(FeatureError::mismatch("dict", other.kind())),
    }
}

fn encode_list(sub_schema: &SchemaNode, items: Vec<Example>) -> Result<Example> {
    let walk = match sample_element(&items, sub_schema) {
        Some(sample @ Example::List(_)) => &encode_nested_example(sub_schema, sample.clone(), true)? != sample,
        Some(_) => true,
        None => false,
    };
    if !walk {
        return Ok(Example::List(items));
    }
    items
        .into_iter()
        .map(|item| encode_nested_example(sub_schema, item, true))
        .collect::<Result<Vec<_>>>()
        .map(Example::List)
}

fn encode_dict_sequence(fields: &Features, obj: Example) -> Result<Example> {
    let mut out = BTreeMap::new();
    match obj {
        Example::Null => return Ok(Example::Null),
        Example::List(records) => {
            let mut records = records
                .into_iter()
                .map(|record| match record {
                    Example::Map(map) => Ok(map),
                    other => Err(FeatureError::mismatch("dict", other.kind())),
                })
                .collect::<Result<Vec<_>>>()?;
            for (name, sub_schema) in fields.iter() {
                let column = records
                    .iter_mut()
                    .map(|record| {
                        let value = record.remove(name).unwrap_or_default();
                        encode_nested_example(sub_schema, value, true)
                    })
                    .collect::<Result<Vec<_>>>()?;
                out.insert(name.to_string(), Example::List(column));
            }
        }
        Example::Map(mut map) => {
            for (name, sub_schema) in fields.iter() {
                let column = match map.remove(name) {
                    None | Some(Example::Null) => Example::Null,
                    Some(Example::List(items)) => Example::List(
                        items
                            .into_iter()
                            .map(|item| encode_nested_example(sub_schema, item, true))
                            .collect::<Result<Vec<_>>>()?,
                    ),
                    Some(other) => return Err(FeatureError::mismatch("list", other.kind())),
                };
                out.insert(name.to_string(), column);
            }
        }
        other => return Err(FeatureError::mismatch("list or dict", other.kind())),
    }
    Ok(Example::Map(out))
}

fn encode_leaf(leaf: &LeafKind, obj: Example) -> Result<Example> {
    if obj.is_null() {
        return Ok(Example::Null);
    }
    match leaf {
        LeafKind::Value(value) => value.encode_example(obj),
        LeafKind::ClassLabel(label) => label.encode_example(obj),
        LeafKind::Audio(audio) => audio.encode_example(obj),
        LeafKind::Image(image) => image.encode_example(obj),
        LeafKind::Custom(feature) if feature.requires_encoding() => feature.encode_example(obj),
        LeafKind::Custom(_) => Ok(obj),
    }
}

/// Decodes a stored `obj` for a caller according to `schema`.
pub fn decode_nested_example(schema: &SchemaNode, obj: Example, ctx: &DecodeContext) -> Result<Example> {
    match schema {
        SchemaNode::Mapping(features) => decode_mapping(features, obj, ctx),
        SchemaNode::FixedList(sub_schema) | SchemaNode::LargeList(sub_schema) => {
            decode_list(sub_schema, obj, ctx)
        }
        SchemaNode::NullableSequence { feature, .. } => match feature.as_ref() {
            SchemaNode::Mapping(fields) => match obj {
                Example::Null => Ok(Example::Null),
                Example::Map(mut map) => {
                    let mut out = BTreeMap::new();
                    for (name, sub_schema) in fields.iter() {
                        let column = map.remove(name).unwrap_or_default();
                        out.insert(name.to_string(), decode_list(sub_schema, column, ctx)?);
                    }
                    Ok(Example::Map(out))
                }
                other => Err(FeatureError::mismatch("dict", other.kind())),
            },
            sub_schema => decode_list(sub_schema, obj, ctx),
        },
        SchemaNode::Leaf(leaf) => decode_leaf(leaf, obj, ctx),
    }
}

pub(crate) fn decode_mapping(features: &Features, obj: Example, ctx: &DecodeContext) -> Result<Example> {
    match obj {
        Example::Null => Ok(Example::Null),
        Example::Map(mut map) => {
            let mut out = BTreeMap::new();
            for (name, sub_schema) in features.iter() {
                let value = map.remove(name).unwrap_or_default();
                out.insert(name.to_string(), decode_nested_example(sub_schema, value, ctx)?);
            }
            Ok(Example::Map(out))
        }
        other => Err(FeatureError::mismatch("dict", other.kind())),
    }
}

fn decode_list(sub_schema: &SchemaNode, obj: Example, ctx: &DecodeContext) -> Result<Example> {
    let Some(items) = expect_list(obj)? else {
        return Ok(Example::Null);
    };
    let walk = match sample_element(&items, sub_schema) {
        Some(sample @ Example::List(_)) => &decode_nested_example(sub_schema, sample.clone(), ctx)? != sample,
        Some(_) => true,
        None => false,
    };
    if !walk {
        return Ok(Example::List(items));
    }
    items
        .into_iter()
        .map(|item| decode_nested_example(sub_schema, item, ctx))
        .collect::<Result<Vec<_>>>()
        .map(Example::List)
}

fn decode_leaf(leaf: &LeafKind, obj: Example, ctx: &DecodeContext) -> Result<Example> {
    if obj.is_null() || !ctx.enabled {
        return Ok(obj);
    }
    match leaf {
        LeafKind::Audio(audio) if audio.decode => audio.decode_example(obj, &ctx.token_per_repo_id),
        LeafKind::Image(image) if image.decode => image.decode_example(obj, &ctx.token_per_repo_id),
        LeafKind::Custom(feature) if feature.requires_decoding() && feature.decode() => {
            feature.decode_example(obj, &ctx.token_per_repo_id)
        }
        _ => Ok(obj),
    }
}
