//! Built-in leaf features: scalar values, class labels and file blobs.
use crate::blob;
use crate::custom::{CustomFeature, TokenPerRepoId};
use crate::error::{FeatureError, Result};
use crate::example::Example;
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString};

/// Scalar storage types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Dtype {
    Null,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float16,
    Float32,
    Float64,
    String,
    LargeString,
    Binary,
    LargeBinary,
}

impl Dtype {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Dtype::Int8
                | Dtype::Int16
                | Dtype::Int32
                | Dtype::Int64
                | Dtype::Uint8
                | Dtype::Uint16
                | Dtype::Uint32
                | Dtype::Uint64
        )
    }

    /// Checks that `value` fits this integer dtype.
    fn check_integer(&self, value: i64) -> Result<i64> {
        let fits = match self {
            Dtype::Int8 => i8::try_from(value).is_ok(),
            Dtype::Int16 => i16::try_from(value).is_ok(),
            Dtype::Int32 => i32::try_from(value).is_ok(),
            Dtype::Uint8 => u8::try_from(value).is_ok(),
            Dtype::Uint16 => u16::try_from(value).is_ok(),
            Dtype::Uint32 => u32::try_from(value).is_ok(),
            Dtype::Uint64 => u64::try_from(value).is_ok(),
            _ => true,
        };
        if fits {
            Ok(value)
        } else {
            Err(FeatureError::mismatch(self.to_string(), format!("out of range value {value}")))
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Dtype::Float16 | Dtype::Float32 | Dtype::Float64)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Dtype::String | Dtype::LargeString)
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Dtype::Binary | Dtype::LargeBinary)
    }
}

/// A scalar column of a fixed [`Dtype`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value {
    pub dtype: Dtype,
}

impl Value {
    pub fn new(dtype: Dtype) -> Self {
        Self { dtype }
    }

    /// Coerces a scalar to the representation stored for this dtype.
    pub fn encode_example(&self, example: Example) -> Result<Example> {
        let dtype = self.dtype;
        let mismatch = |got: &Example| FeatureError::mismatch(dtype.to_string(), got.kind());
        match (dtype, example) {
            (_, Example::Null) => Ok(Example::Null),
            (Dtype::Null, other) => Err(mismatch(&other)),
            (Dtype::Bool, Example::Bool(b)) => Ok(Example::Bool(b)),
            (Dtype::Bool, Example::Int(i)) => Ok(Example::Bool(i != 0)),
            (Dtype::Bool, Example::Float(f)) => Ok(Example::Bool(f != 0.0)),
            (d, Example::Int(i)) if d.is_integer() => d.check_integer(i).map(Example::Int),
            (d, Example::Bool(b)) if d.is_integer() => Ok(Example::Int(b as i64)),
            // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
            (d, Example::Float(f)) if d.is_integer() => {
                let f = f.trunc();
                if !f.is_finite() || f < i64::MIN as f64 || f >= i64::MAX as f64 {
                    return Err(FeatureError::mismatch(dtype.to_string(), format!("float {f}")));
                }
                d.check_integer(f as i64).map(Example::Int)
            }
            (d, Example::Str(s)) if d.is_integer() => s
                .trim()
                .parse::<i64>()
                .map_err(|_| FeatureError::mismatch(dtype.to_string(), format!("string {s:?}")))
                .and_then(|i| d.check_integer(i))
                .map(Example::Int),
            (d, Example::Float(f)) if d.is_float() => Ok(Example::Float(f)),
            (d, Example::Int(i)) if d.is_float() => Ok(Example::Float(i as f64)),
            (d, Example::Bool(b)) if d.is_float() => Ok(Example::Float(b as i64 as f64)),
            (d, Example::Str(s)) if d.is_float() => s
                .trim()
                .parse::<f64>()
                .map(Example::Float)
                .map_err(|_| FeatureError::mismatch(dtype.to_string(), format!("string {s:?}"))),
            (d, Example::Str(s)) if d.is_string() => Ok(Example::Str(s)),
            (d, Example::Int(i)) if d.is_string() => Ok(Example::Str(i.to_string())),
            (d, Example::Float(f)) if d.is_string() => Ok(Example::Str(f.to_string())),
            (d, Example::Bool(b)) if d.is_string() => Ok(Example::Str(b.to_string())),
            (d, Example::Bytes(b)) if d.is_binary() => Ok(Example::Bytes(b)),
            (d, Example::Str(s)) if d.is_binary() => Ok(Example::Bytes(s.into_bytes())),
            (_, other) => Err(mismatch(&other)),
        }
    }
}

/// Integer-encoded categorical labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabel {
    pub names: Vec<String>,
}

impl ClassLabel {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.names.len()
    }

    pub fn str2int(&self, label: &str) -> Result<i64> {
        self.names
            .iter()
            .position(|name| name == label)
            .map(|idx| idx as i64)
            .ok_or_else(|| self.unknown(label))
    }

    pub fn int2str(&self, id: i64) -> Result<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.names.get(idx))
            .map(String::as_str)
            .ok_or_else(|| self.unknown(&id.to_string()))
    }

    /// Label names become ids; in-range ids and `-1` (no label) are kept.
    pub fn encode_example(&self, example: Example) -> Result<Example> {
        match example {
            Example::Null => Ok(Example::Null),
            Example::Str(label) => match self.str2int(&label) {
                Ok(id) => Ok(Example::Int(id)),
                // numeric strings are accepted as ids
                Err(err) => match label.trim().parse::<i64>() {
                    Ok(id) => self.check_id(id),
                    Err(_) => Err(err),
                },
            },
            Example::Int(id) => self.check_id(id),
            other => Err(FeatureError::mismatch("class label", other.kind())),
        }
    }

    fn check_id(&self, id: i64) -> Result<Example> {
        if id == -1 || (0..self.num_classes() as i64).contains(&id) {
            Ok(Example::Int(id))
        } else {
            Err(self.unknown(&id.to_string()))
        }
    }

    fn unknown(&self, label: &str) -> FeatureError {
        FeatureError::UnknownLabel {
            label: label.to_string(),
            names: self.names.clone(),
        }
    }
}

/// Audio file stored as `{bytes, path}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Audio {
    pub sampling_rate: Option<u32>,
    pub mono: bool,
    pub decode: bool,
}

impl Default for Audio {
    fn default() -> Self {
        Self {
            sampling_rate: None,
            mono: true,
            decode: true,
        }
    }
}

/// Image file stored as `{bytes, path}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub mode: Option<String>,
    pub decode: bool,
}

impl Default for Image {
    fn default() -> Self {
        Self {
            mode: None,
            decode: true,
        }
    }
}

impl Audio {
    pub fn encode_example(&self, example: Example) -> Result<Example> {
        blob::encode_blob(example)
    }

    /// Resolves the stored blob to bytes; waveform decoding is left to callers.
    pub fn decode_example(&self, example: Example, tokens: &TokenPerRepoId) -> Result<Example> {
        blob::resolve_blob(example, tokens)
    }
}

impl Image {
    pub fn encode_example(&self, example: Example) -> Result<Example> {
        blob::encode_blob(example)
    }

    /// Resolves the stored blob to bytes; pixel decoding is left to callers.
    pub fn decode_example(&self, example: Example, tokens: &TokenPerRepoId) -> Result<Example> {
        blob::resolve_blob(example, tokens)
    }
}

/// The closed set of leaf kinds a schema can reference.
#[derive(Debug, Clone)]
pub enum LeafKind {
    Value(Value),
    ClassLabel(ClassLabel),
    Audio(Audio),
    Image(Image),
    Custom(Arc<dyn CustomFeature>),
}

impl LeafKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            LeafKind::Value(_) => "Value",
            LeafKind::ClassLabel(_) => "ClassLabel",
            LeafKind::Audio(_) => "Audio",
            LeafKind::Image(_) => "Image",
            LeafKind::Custom(feature) => feature.type_name(),
        }
    }
}

impl PartialEq for LeafKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LeafKind::Value(a), LeafKind::Value(b)) => a == b,
            (LeafKind::ClassLabel(a), LeafKind::ClassLabel(b)) => a == b,
            (LeafKind::Audio(a), LeafKind::Audio(b)) => a == b,
            (LeafKind::Image(a), LeafKind::Image(b)) => a == b,
            (LeafKind::Custom(a), LeafKind::Custom(b)) => {
                a.type_name() == b.type_name() && a.params() == b.params()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_dtype_names() {
        assert_eq!(Dtype::from_str("large_string").unwrap(), Dtype::LargeString);
        assert_eq!(Dtype::Float32.to_string(), "float32");
        assert_eq!(Dtype::Uint8.to_string(), "uint8");
        assert!(Dtype::from_str("float128").is_err());
    }

    #[test]
    fn test_integer_ranges() {
        let int8 = Value::new(Dtype::Int8);
        assert_eq!(int8.encode_example(Example::Int(-128)).unwrap(), Example::Int(-128));
        assert!(int8.encode_example(Example::Int(300)).is_err());
        assert!(int8.encode_example(Example::from("128")).is_err());
        assert!(int8.encode_example(Example::Float(127.9)).is_ok());
        assert!(int8.encode_example(Example::Float(128.0)).is_err());

        let uint32 = Value::new(Dtype::Uint32);
        assert!(uint32.encode_example(Example::Int(-1)).is_err());
        assert!(uint32.encode_example(Example::Int(u32::MAX.into())).is_ok());

        let int64 = Value::new(Dtype::Int64);
        assert!(int64.encode_example(Example::Float(f64::NAN)).is_err());
        assert!(int64.encode_example(Example::Float(f64::NEG_INFINITY)).is_err());
        assert!(int64.encode_example(Example::Float(1e19)).is_err());
        assert_eq!(int64.encode_example(Example::Float(-2.7)).unwrap(), Example::Int(-2));
    }

    #[test]
    fn test_value_coercion() {
        let float = Value::new(Dtype::Float32);
        assert_eq!(float.encode_example(Example::Int(2)).unwrap(), Example::Float(2.0));
        assert_eq!(float.encode_example(Example::Float(1.5)).unwrap(), Example::Float(1.5));

        let int = Value::new(Dtype::Int64);
        assert_eq!(int.encode_example(Example::from("7")).unwrap(), Example::Int(7));
        assert!(int.encode_example(Example::from("seven")).is_err());

        let string = Value::new(Dtype::String);
        assert_eq!(string.encode_example(Example::Int(3)).unwrap(), Example::from("3"));
        assert!(matches!(
            string.encode_example(Example::List(vec![])),
            Err(FeatureError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_class_label_encoding() {
        let label = ClassLabel::new(["negative", "positive"]);
        assert_eq!(label.encode_example(Example::from("positive")).unwrap(), Example::Int(1));
        assert_eq!(label.encode_example(Example::Int(0)).unwrap(), Example::Int(0));
        assert_eq!(label.encode_example(Example::Int(-1)).unwrap(), Example::Int(-1));
        assert!(matches!(
            label.encode_example(Example::from("neutral")),
            Err(FeatureError::UnknownLabel { .. })
        ));
        assert!(label.encode_example(Example::Int(2)).is_err());
        assert_eq!(label.int2str(1).unwrap(), "positive");
    }
}
