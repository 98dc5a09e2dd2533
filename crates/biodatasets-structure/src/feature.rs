//! Custom dataset features for protein structures.
use crate::atoms::AtomArray;
use crate::error::StructureError;
use crate::format::{gunzip, gzip, is_gzipped, StructureFormat};
use biodatasets_features::blob::read_blob_bytes;
use biodatasets_features::{
    bool_param, CustomFeature, Dtype, Example, FeatureError, FeatureRegistry, Features,
    Result as FeatureResult, SchemaNode, TokenPerRepoId,
};
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A structure file stored verbatim as `{bytes, path, format}`.
///
/// Decoding parses the file into an [`AtomArray`] example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureFeature {
    /// Gzip file contents that are not compressed already.
    pub compress: bool,
    pub decode: bool,
}

impl Default for StructureFeature {
    fn default() -> Self {
        Self {
            compress: false,
            decode: true,
        }
    }
}

/// A structure stored as its parsed atom table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomArrayFeature {
    pub backbone_only: bool,
}

/// A structure file resolved to its contents.
#[derive(Debug)]
struct StructureFile {
    bytes: Vec<u8>,
    path: Option<String>,
    format: StructureFormat,
}

impl StructureFile {
    /// Accepts a path, raw bytes or a `{bytes, path, format}` map.
    fn resolve(example: Example, tokens: &TokenPerRepoId) -> FeatureResult<Self> {
        let (bytes, path, format) = match example {
            Example::Str(path) => (None, Some(path), None),
            Example::Bytes(bytes) => (Some(bytes), None, None),
            Example::Map(mut map) => (
                take_bytes(&mut map)?,
                take_string(&mut map, "path")?,
                take_string(&mut map, "format")?,
            ),
            other => {
                return Err(FeatureError::mismatch(
                    "structure path, bytes or {bytes, path, format}",
                    other.kind(),
                ))
            }
        };
        let bytes = match (bytes, &path) {
            (Some(bytes), _) => bytes,
            (None, Some(path)) => read_blob_bytes(path, tokens)?,
            (None, None) => {
                return Err(FeatureError::mismatch(
                    "a structure with `bytes` or `path`",
                    "neither",
                ))
            }
        };
        let format = match (format, &path) {
            (Some(format), _) => format
                .parse::<StructureFormat>()
                .map_err(|_| StructureError::UnsupportedFormat(format))?,
            (None, Some(path)) => match StructureFormat::from_path(path) {
                Some((format, _)) => format,
                None => sniff_format(&bytes)?,
            },
            (None, None) => sniff_format(&bytes)?,
        };
        Ok(Self {
            bytes,
            path,
            format,
        })
    }

    fn atom_array(&self) -> FeatureResult<AtomArray> {
        Ok(AtomArray::from_structure(&self.bytes, self.format)?)
    }
}

fn take_bytes(map: &mut BTreeMap<String, Example>) -> FeatureResult<Option<Vec<u8>>> {
    match map.remove("bytes") {
        None | Some(Example::Null) => Ok(None),
        Some(Example::Bytes(bytes)) => Ok(Some(bytes)),
        Some(other) => Err(FeatureError::mismatch("bytes", other.kind())),
    }
}

fn take_string(map: &mut BTreeMap<String, Example>, key: &str) -> FeatureResult<Option<String>> {
    match map.remove(key) {
        None | Some(Example::Null) => Ok(None),
        Some(Example::Str(value)) => Ok(Some(value)),
        Some(other) => Err(FeatureError::mismatch(format!("string `{key}`"), other.kind())),
    }
}

/// mmCIF files open with a `data_` block, everything else is read as PDB.
fn sniff_format(contents: &[u8]) -> FeatureResult<StructureFormat> {
    let head = if is_gzipped(contents) {
        gunzip(contents)?
    } else {
        contents.to_vec()
    };
    let text = String::from_utf8_lossy(&head);
    let first = text.lines().map(str::trim).find(|line| !line.is_empty() && !line.starts_with('#'));
    match first {
        Some(line) if line.starts_with("data_") => Ok(StructureFormat::Cif),
        Some(_) => Ok(StructureFormat::Pdb),
        None => Err(StructureError::Empty.into()),
    }
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

impl CustomFeature for StructureFeature {
    fn type_name(&self) -> &'static str {
        "StructureFeature"
    }

    fn requires_encoding(&self) -> bool {
        true
    }

    fn requires_decoding(&self) -> bool {
        true
    }

    fn decode(&self) -> bool {
        self.decode
    }

    fn storage_schema(&self) -> SchemaNode {
        SchemaNode::Mapping(
            Features::new()
                .with("bytes", SchemaNode::value(Dtype::Binary))
                .with("path", SchemaNode::value(Dtype::String))
                .with("format", SchemaNode::value(Dtype::String)),
        )
    }

    fn params(&self) -> Map<String, Json> {
        let mut params = Map::new();
        params.insert("compress".to_string(), Json::Bool(self.compress));
        params.insert("decode".to_string(), Json::Bool(self.decode));
        params
    }

    fn encode_inner(&self, example: Example) -> FeatureResult<Example> {
        let file = StructureFile::resolve(example, &TokenPerRepoId::new())?;
        let bytes = if self.compress && !is_gzipped(&file.bytes) {
            gzip(&file.bytes)?
        } else {
            file.bytes
        };
        Ok(Example::map([
            ("bytes", Example::Bytes(bytes)),
            ("path", Example::from(file.path.as_deref().map(file_name))),
            ("format", Example::from(file.format.to_string())),
        ]))
    }

    fn decode_inner(&self, example: Example, tokens: &TokenPerRepoId) -> FeatureResult<Example> {
        let file = StructureFile::resolve(example, tokens)?;
        debug!(format = %file.format, path = ?file.path, "decoding structure");
        Ok(file.atom_array()?.to_example())
    }
}

impl CustomFeature for AtomArrayFeature {
    fn type_name(&self) -> &'static str {
        "AtomArrayFeature"
    }

    fn requires_encoding(&self) -> bool {
        true
    }

    fn storage_schema(&self) -> SchemaNode {
        SchemaNode::Mapping(AtomArray::storage_features())
    }

    fn params(&self) -> Map<String, Json> {
        let mut params = Map::new();
        params.insert("backbone_only".to_string(), Json::Bool(self.backbone_only));
        params
    }

    fn encode_inner(&self, example: Example) -> FeatureResult<Example> {
        let parsed = matches!(&example, Example::Map(map) if map.contains_key("coords"));
        let atoms = if parsed {
            AtomArray::from_example(&example)?
        } else {
            StructureFile::resolve(example, &TokenPerRepoId::new())?.atom_array()?
        };
        let atoms = if self.backbone_only {
            atoms.backbone()
        } else {
            atoms
        };
        Ok(atoms.to_example())
    }
}

/// Registry with the structure features, for reading stored schemas back.
pub fn structure_registry() -> FeatureRegistry {
    FeatureRegistry::new()
        .with("StructureFeature", |params| {
            Ok(Arc::new(StructureFeature {
                compress: bool_param(params, "compress", false)?,
                decode: bool_param(params, "decode", true)?,
            }))
        })
        .with("AtomArrayFeature", |params| {
            Ok(Arc::new(AtomArrayFeature {
                backbone_only: bool_param(params, "backbone_only", false)?,
            }))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use biodatasets_features::DecodeContext;
    use biodatasets_test_data::TestFile;

    fn structure_features(feature: impl CustomFeature + 'static) -> Features {
        Features::new()
            .with("id", SchemaNode::value(Dtype::String))
            .with("structure", SchemaNode::custom(feature))
    }

    #[test]
    fn test_structure_feature_encode_decode() {
        let (prot_file, _temp) = TestFile::protein_pdb().create_temp().unwrap();
        let features = structure_features(StructureFeature::default());
        let row = Example::map([("id", Example::from("1gas")), ("structure", Example::from(prot_file.as_str()))]);

        let encoded = features.encode_row(row).unwrap();
        let stored = encoded.get("structure").unwrap();
        assert_eq!(stored.get("format"), Some(&Example::from("pdb")));
        assert_eq!(
            stored.get("bytes").and_then(Example::as_bytes),
            Some(TestFile::protein_pdb().bytes())
        );
        // only the file name is kept
        assert!(!stored.get("path").and_then(Example::as_str).unwrap().contains('/'));

        let decoded = features.decode_row(encoded.clone(), &DecodeContext::default()).unwrap();
        let atoms = AtomArray::from_example(decoded.get("structure").unwrap()).unwrap();
        assert_eq!(atoms.len(), 16);

        let raw = features.decode_row(encoded.clone(), &DecodeContext::disabled()).unwrap();
        assert_eq!(raw, encoded);
    }

    #[test]
    fn test_compressed_structure_decodes() {
        let feature = StructureFeature {
            compress: true,
            ..Default::default()
        };
        let encoded = feature
            .encode_example(Example::Bytes(TestFile::protein_pdb().bytes().to_vec()))
            .unwrap();
        assert!(is_gzipped(encoded.get("bytes").and_then(Example::as_bytes).unwrap()));
        assert_eq!(encoded.get("path"), Some(&Example::Null));

        let decoded = feature.decode_example(encoded, &TokenPerRepoId::new()).unwrap();
        assert_eq!(AtomArray::from_example(&decoded).unwrap().len(), 16);
    }

    #[test]
    fn test_fcz_is_stored_but_not_decoded() {
        let feature = StructureFeature::default();
        let stored = feature
            .encode_example(Example::map([
                ("bytes", Example::Bytes(b"FCZ\x00".to_vec())),
                ("path", Example::from("model.fcz")),
            ]))
            .unwrap();
        assert_eq!(stored.get("format"), Some(&Example::from("fcz")));

        let err = feature.decode_example(stored, &TokenPerRepoId::new()).unwrap_err();
        assert!(err.to_string().contains("unsupported structure format `fcz`"));
    }

    #[test]
    fn test_atom_array_feature_backbone() {
        let (prot_file, _temp) = TestFile::protein_pdb().create_temp().unwrap();
        let features = structure_features(AtomArrayFeature { backbone_only: true });
        let row = Example::map([("id", Example::from("1gas")), ("structure", Example::from(prot_file.as_str()))]);

        let encoded = features.encode_row(row).unwrap();
        let atoms = AtomArray::from_example(encoded.get("structure").unwrap()).unwrap();
        assert_eq!(atoms.len(), 12);

        // an already parsed atom array is validated and kept
        let again = AtomArrayFeature::default()
            .encode_example(atoms.to_example())
            .unwrap();
        assert_eq!(AtomArray::from_example(&again).unwrap(), atoms);
    }

    #[test]
    fn test_registry_round_trip() {
        let features = Features::new()
            .with(
                "structure",
                SchemaNode::custom(StructureFeature {
                    compress: true,
                    decode: false,
                }),
            )
            .with("atoms", SchemaNode::custom(AtomArrayFeature { backbone_only: true }));
        let registry = structure_registry();

        let from_dict = Features::from_dict(&features.to_dict(), &registry).unwrap();
        assert_eq!(from_dict, features);

        let yaml = features.to_yaml_string().unwrap();
        assert!(yaml.contains("structure_feature"));
        assert_eq!(Features::from_yaml_str(&yaml, &registry).unwrap(), features);

        let schema = features.arrow_schema().unwrap();
        assert_eq!(Features::from_arrow_schema(&schema, &registry, false).unwrap(), features);
    }

    #[test]
    fn test_sniff_format() {
        assert_eq!(sniff_format(TestFile::protein_cif().bytes()).unwrap(), StructureFormat::Cif);
        assert_eq!(sniff_format(TestFile::protein_pdb().bytes()).unwrap(), StructureFormat::Pdb);
        assert_eq!(sniff_format(TestFile::protein_pdb_gz().bytes()).unwrap(), StructureFormat::Pdb);
        assert!(sniff_format(b"\n\n").is_err());
    }
}
