//! # biodatasets-features
//!
//! Typed, nested schemas for dataset columns and the conversion of example
//! values to and from their stored form.
//!
//! __biodatasets-features__ provides:
//! * Built-in leaf features ([`Value`], [`ClassLabel`], [`Audio`], [`Image`])
//! * List and mapping nodes composed into a [`SchemaNode`] tree
//! * Recursive encoding and decoding of examples against a schema
//! * The dict, YAML and Arrow schema representations of a [`Features`] set
//! * A [`CustomFeature`] trait and [`FeatureRegistry`] for domain leaf types
//!
//! The main entry point is [`Features`], which maps column names to schema
//! nodes and encodes whole rows with [`Features::encode_row`].
//!
mod arrow;
pub mod blob;
mod custom;
mod dict;
mod error;
mod example;
mod leaves;
mod nested;
mod schema;
mod yaml;

pub use self::arrow::{
    arrow_to_dtype, blob_arrow_type, dtype_to_arrow, generate_from_arrow_type, HF_METADATA_KEY,
    METADATA_KEY,
};
pub use self::custom::{bool_param, CustomFeature, DecodeContext, FeatureRegistry, TokenPerRepoId};
pub use self::error::{FeatureError, Result};
pub use self::example::Example;
pub use self::leaves::{Audio, ClassLabel, Dtype, Image, LeafKind, Value};
pub use self::nested::{check_non_null_non_empty_recursive, decode_nested_example, encode_nested_example};
pub use self::schema::{Features, SchemaNode};
pub use self::yaml::{camelcase_to_snakecase, snakecase_to_camelcase};
