//! Schema tree describing the shape of dataset examples.
use crate::custom::{CustomFeature, DecodeContext};
use crate::error::{FeatureError, Result};
use crate::example::Example;
use crate::leaves::{Audio, ClassLabel, Dtype, Image, LeafKind, Value};
use crate::nested::{decode_mapping, encode_mapping};
use std::sync::Arc;

/// One node of a schema.
///
/// `FixedList` is the bare `[feature]` list form, `NullableSequence` carries a
/// `length` where `-1` means variable length.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Mapping(Features),
    FixedList(Box<SchemaNode>),
    LargeList(Box<SchemaNode>),
    NullableSequence { feature: Box<SchemaNode>, length: i64 },
    Leaf(LeafKind),
}

impl SchemaNode {
    pub fn value(dtype: Dtype) -> Self {
        SchemaNode::Leaf(LeafKind::Value(Value::new(dtype)))
    }

    pub fn class_label<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        SchemaNode::Leaf(LeafKind::ClassLabel(ClassLabel::new(names)))
    }

    pub fn audio(audio: Audio) -> Self {
        SchemaNode::Leaf(LeafKind::Audio(audio))
    }

    pub fn image(image: Image) -> Self {
        SchemaNode::Leaf(LeafKind::Image(image))
    }

    pub fn custom(feature: impl CustomFeature + 'static) -> Self {
        SchemaNode::Leaf(LeafKind::Custom(Arc::new(feature)))
    }

    pub fn sequence(feature: SchemaNode) -> Self {
        Self::sequence_with_length(feature, -1)
    }

    pub fn sequence_with_length(feature: SchemaNode, length: i64) -> Self {
        SchemaNode::NullableSequence {
            feature: Box::new(feature),
            length,
        }
    }

    pub fn list(feature: SchemaNode) -> Self {
        SchemaNode::FixedList(Box::new(feature))
    }

    pub fn large_list(feature: SchemaNode) -> Self {
        SchemaNode::LargeList(Box::new(feature))
    }

    /// Child schema of list-like nodes.
    pub fn list_child(&self) -> Option<&SchemaNode> {
        match self {
            SchemaNode::FixedList(child) | SchemaNode::LargeList(child) => Some(child),
            SchemaNode::NullableSequence { feature, .. } => Some(feature),
            _ => None,
        }
    }

    pub fn is_list_like(&self) -> bool {
        self.list_child().is_some()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SchemaNode::Mapping(_) => "dict",
            SchemaNode::FixedList(_) => "list",
            SchemaNode::LargeList(_) => "LargeList",
            SchemaNode::NullableSequence { .. } => "Sequence",
            SchemaNode::Leaf(leaf) => leaf.type_name(),
        }
    }
}

impl From<Features> for SchemaNode {
    fn from(features: Features) -> Self {
        SchemaNode::Mapping(features)
    }
}

/// The ordered set of named top-level features of a dataset.
#[derive(Debug, Clone, Default)]
pub struct Features {
    fields: Vec<(String, SchemaNode)>,
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, replacing an existing one of the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, node: SchemaNode) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = node,
            None => self.fields.push((name, node)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, node: SchemaNode) -> Self {
        self.insert(name, node);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, node)| node)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaNode)> {
        self.fields.iter().map(|(n, node)| (n.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Encodes one top-level row for storage.
    pub fn encode_row(&self, row: Example) -> Result<Example> {
        encode_mapping(self, row, false)
    }

    /// Decodes one stored row for a caller.
    pub fn decode_row(&self, row: Example, ctx: &DecodeContext) -> Result<Example> {
        decode_mapping(self, row, ctx)
    }

    /// Not available on the feature set; use [`Features::encode_row`].
    pub fn encode_example(&self, _example: Example) -> Result<Example> {
        Err(FeatureError::NotImplemented(
            "Features::encode_example is not implemented, use encode_row".to_string(),
        ))
    }

    /// Not available on the feature set; use [`Features::decode_row`].
    pub fn decode_example(&self, _example: Example) -> Result<Example> {
        Err(FeatureError::NotImplemented(
            "Features::decode_example is not implemented, use decode_row".to_string(),
        ))
    }
}

impl PartialEq for Features {
    // field order is irrelevant
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(name, node)| other.get(name).is_some_and(|o| o == node))
    }
}

impl<K: Into<String>> FromIterator<(K, SchemaNode)> for Features {
    fn from_iter<I: IntoIterator<Item = (K, SchemaNode)>>(iter: I) -> Self {
        let mut features = Features::new();
        for (name, node) in iter {
            features.insert(name, node);
        }
        features
    }
}
