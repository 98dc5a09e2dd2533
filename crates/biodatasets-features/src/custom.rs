//! Extension point for feature types outside the built-in leaf set.
//!
//! Crates register their custom features in a [`FeatureRegistry`] so that the
//! dict, YAML and Arrow representations can be turned back into live features.
use crate::error::{FeatureError, Result};
use crate::example::Example;
use crate::schema::SchemaNode;
use serde_json::{Map, Value as Json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Hub tokens keyed by repository id, forwarded to leaf decoders that fetch
/// remote files.
pub type TokenPerRepoId = HashMap<String, Option<String>>;

/// Per-call decoding switches.
#[derive(Debug, Clone)]
pub struct DecodeContext {
    pub enabled: bool,
    pub token_per_repo_id: TokenPerRepoId,
}

impl Default for DecodeContext {
    fn default() -> Self {
        Self {
            enabled: true,
            token_per_repo_id: TokenPerRepoId::new(),
        }
    }
}

impl DecodeContext {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn with_token(mut self, repo_id: impl Into<String>, token: Option<String>) -> Self {
        self.token_per_repo_id.insert(repo_id.into(), token);
        self
    }
}

/// A leaf feature with its own storage layout and (optionally) its own
/// encoding and decoding logic.
pub trait CustomFeature: fmt::Debug + Send + Sync {
    /// The `_type` tag used in the dict representation, e.g. `StructureFeature`.
    fn type_name(&self) -> &'static str;

    fn requires_encoding(&self) -> bool {
        false
    }

    fn requires_decoding(&self) -> bool {
        false
    }

    /// Instance-level switch, on top of [`DecodeContext::enabled`].
    fn decode(&self) -> bool {
        true
    }

    /// Shape of the stored value, expressed with built-in nodes.
    fn storage_schema(&self) -> SchemaNode;

    /// Parameters written next to `_type` in the dict representation.
    fn params(&self) -> Map<String, Json> {
        Map::new()
    }

    fn encode_example(&self, example: Example) -> Result<Example> {
        if self.requires_encoding() {
            self.encode_inner(example)
        } else {
            Ok(example)
        }
    }

    fn encode_inner(&self, _example: Example) -> Result<Example> {
        Err(FeatureError::NotImplemented(format!(
            "{} sets `requires_encoding` but does not implement encoding",
            self.type_name()
        )))
    }

    fn decode_example(&self, example: Example, tokens: &TokenPerRepoId) -> Result<Example> {
        if self.requires_decoding() {
            self.decode_inner(example, tokens)
        } else {
            Ok(example)
        }
    }

    fn decode_inner(&self, _example: Example, _tokens: &TokenPerRepoId) -> Result<Example> {
        Err(FeatureError::NotImplemented(format!(
            "{} sets `requires_decoding` but does not implement decoding",
            self.type_name()
        )))
    }
}

type FeatureConstructor = fn(&Map<String, Json>) -> Result<Arc<dyn CustomFeature>>;

/// Maps `_type` tags to constructors for custom features.
#[derive(Clone, Default)]
pub struct FeatureRegistry {
    constructors: HashMap<&'static str, FeatureConstructor>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_name: &'static str, constructor: FeatureConstructor) {
        self.constructors.insert(type_name, constructor);
    }

    pub fn with(mut self, type_name: &'static str, constructor: FeatureConstructor) -> Self {
        self.register(type_name, constructor);
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    pub fn build(&self, type_name: &str, params: &Map<String, Json>) -> Result<Arc<dyn CustomFeature>> {
        let constructor = self
            .constructors
            .get(type_name)
            .ok_or_else(|| FeatureError::UnknownFeatureType(type_name.to_string()))?;
        constructor(params)
    }
}

impl fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("FeatureRegistry").field("types", &names).finish()
    }
}

/// Reads an optional boolean parameter, falling back to `default`.
pub fn bool_param(params: &Map<String, Json>, key: &str, default: bool) -> Result<bool> {
    match params.get(key) {
        None | Some(Json::Null) => Ok(default),
        Some(Json::Bool(b)) => Ok(*b),
        Some(other) => Err(FeatureError::invalid(format!(
            "`{key}` must be a boolean, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaves::{Dtype, LeafKind, Value};

    #[derive(Debug)]
    struct Flagged;

    impl CustomFeature for Flagged {
        fn type_name(&self) -> &'static str {
            "Flagged"
        }
        fn requires_encoding(&self) -> bool {
            true
        }
        fn storage_schema(&self) -> SchemaNode {
            SchemaNode::Leaf(LeafKind::Value(Value::new(Dtype::String)))
        }
    }

    #[test]
    fn test_missing_inner_encoder_is_not_implemented() {
        let err = Flagged.encode_example(Example::from("x")).unwrap_err();
        assert!(matches!(err, FeatureError::NotImplemented(_)));
        // decoding is not requested, so the value passes through
        let out = Flagged
            .decode_example(Example::from("x"), &TokenPerRepoId::new())
            .unwrap();
        assert_eq!(out, Example::from("x"));
    }

    #[test]
    fn test_registry_unknown_type() {
        let registry = FeatureRegistry::new().with("Flagged", |_| Ok(Arc::new(Flagged)));
        assert!(registry.contains("Flagged"));
        assert!(registry.build("Flagged", &Map::new()).is_ok());
        assert!(matches!(
            registry.build("Nope", &Map::new()),
            Err(FeatureError::UnknownFeatureType(_))
        ));
    }
}
