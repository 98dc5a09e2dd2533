//! Dataset builder over a directory of structure files.
//!
//! Every `.pdb`, `.cif` or `.fcz` file under the data directory becomes one
//! row with the file in the `structure` column. Rows can be labelled by their
//! parent directory and joined with a `metadata.csv` or `metadata.jsonl` file
//! at the root of the data directory.
use crate::error::{Result, StructureError};
use crate::feature::{AtomArrayFeature, StructureFeature};
use crate::format::StructureFormat;
use biodatasets_features::{ClassLabel, Dtype, Example, Features, LeafKind, SchemaNode};
use bon::Builder;
use itertools::Itertools;
use polars::prelude::{AnyValue, CsvReadOptions, DataType, SerReader};
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Column holding the structure of each row.
pub const BASE_COLUMN_NAME: &str = "structure";

/// Column holding the directory label of each row.
pub const LABEL_COLUMN_NAME: &str = "label";

const METADATA_CSV: &str = "metadata.csv";
const METADATA_JSONL: &str = "metadata.jsonl";
const FILE_NAME_COLUMN: &str = "file_name";

#[derive(Debug, Clone, Builder)]
pub struct StructureFolderConfig {
    #[builder(into)]
    pub data_dir: PathBuf,
    /// `None` infers labels from the directory layout.
    pub drop_labels: Option<bool>,
    pub drop_metadata: Option<bool>,
    /// Store parsed atom arrays instead of the raw files.
    #[builder(default)]
    pub as_array: bool,
    #[builder(default)]
    pub backbone_only: bool,
}

/// Metadata columns keyed by the relative file name they describe.
#[derive(Debug, Default)]
struct Metadata {
    features: Features,
    rows: HashMap<String, BTreeMap<String, Example>>,
}

#[derive(Debug)]
pub struct StructureFolder {
    config: StructureFolderConfig,
    files: Vec<PathBuf>,
    labels: Option<ClassLabel>,
    metadata: Option<Metadata>,
}

impl StructureFolder {
    /// Scans the data directory and resolves labels and metadata.
    pub fn new(config: StructureFolderConfig) -> Result<Self> {
        let data_dir = &config.data_dir;
        let files = WalkDir::new(data_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()))
            .map_ok(|entry| entry.into_path())
            .filter_ok(|path| path.is_file() && StructureFormat::is_structure_file(path))
            .map_ok(|path| path.strip_prefix(data_dir).map(Path::to_path_buf).unwrap_or(path))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        info!(data_dir = %data_dir.display(), files = files.len(), "scanned structure folder");

        let metadata_path = metadata_file(data_dir)?;
        let metadata = match (&metadata_path, config.drop_metadata) {
            (Some(path), drop) if drop != Some(true) => Some(read_metadata(path)?),
            _ => None,
        };

        let label_names: Vec<String> = files.iter().map(|file| parent_label(data_dir, file)).unique().sorted().collect();
        let add_labels = match config.drop_labels {
            Some(drop) => !drop,
            None => {
                let same_depth = files.iter().map(|file| file.components().count()).all_equal();
                metadata_path.is_none() && same_depth && label_names.len() > 1
            }
        };
        let labels = add_labels.then(|| ClassLabel::new(label_names));
        if let Some(labels) = &labels {
            debug!(names = ?labels.names, "labelling rows by parent directory");
        }

        Ok(Self {
            config,
            files,
            labels,
            metadata,
        })
    }

    /// Structure files, relative to the data directory.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn base_feature(&self) -> SchemaNode {
        if self.config.as_array {
            SchemaNode::custom(AtomArrayFeature {
                backbone_only: self.config.backbone_only,
            })
        } else {
            SchemaNode::custom(StructureFeature::default())
        }
    }

    pub fn features(&self) -> Features {
        let mut features = Features::new().with(BASE_COLUMN_NAME, self.base_feature());
        if let Some(metadata) = &self.metadata {
            for (name, node) in metadata.features.iter() {
                features.insert(name, node.clone());
            }
        }
        if let Some(labels) = &self.labels {
            features.insert(LABEL_COLUMN_NAME, SchemaNode::Leaf(LeafKind::ClassLabel(labels.clone())));
        }
        features
    }

    /// One unencoded row per structure file.
    pub fn examples(&self) -> Vec<Example> {
        self.files
            .iter()
            .map(|file| {
                let mut row = BTreeMap::new();
                let full_path = self.config.data_dir.join(file);
                row.insert(
                    BASE_COLUMN_NAME.to_string(),
                    Example::from(full_path.to_string_lossy().into_owned()),
                );
                if let Some(metadata) = &self.metadata {
                    let key = relative_key(file);
                    match metadata.rows.get(&key) {
                        Some(values) => row.extend(values.clone()),
                        None => {
                            warn!(file = %key, "no metadata row for structure file");
                            row.extend(metadata.features.names().map(|name| (name.to_string(), Example::Null)));
                        }
                    }
                }
                if self.labels.is_some() {
                    row.insert(
                        LABEL_COLUMN_NAME.to_string(),
                        Example::from(parent_label(&self.config.data_dir, file)),
                    );
                }
                Example::Map(row)
            })
            .collect()
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|name| name.starts_with('.'))
}

fn relative_key(file: &Path) -> String {
    file.components()
        .map(|part| part.as_os_str().to_string_lossy())
        .join("/")
}

/// Name of the directory holding `file`; files at the root take the data directory's name.
fn parent_label(data_dir: &Path, file: &Path) -> String {
    let parent = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => data_dir.to_path_buf(),
    };
    parent
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn metadata_file(data_dir: &Path) -> Result<Option<PathBuf>> {
    let candidates: Vec<PathBuf> = [METADATA_CSV, METADATA_JSONL]
        .iter()
        .map(|name| data_dir.join(name))
        .filter(|path| path.is_file())
        .collect();
    match candidates.as_slice() {
        [] => Ok(None),
        [path] => Ok(Some(path.clone())),
        _ => Err(StructureError::Metadata {
            path: data_dir.to_path_buf(),
            message: "found both metadata.csv and metadata.jsonl, keep only one".to_string(),
        }),
    }
}

fn read_metadata(path: &Path) -> Result<Metadata> {
    let metadata = if path.extension().is_some_and(|ext| ext == "csv") {
        read_metadata_csv(path)?
    } else {
        read_metadata_jsonl(path)?
    };
    debug!(path = %path.display(), columns = metadata.features.len(), rows = metadata.rows.len(), "read metadata");
    Ok(metadata)
}

fn missing_file_name(path: &Path) -> StructureError {
    StructureError::Metadata {
        path: path.to_path_buf(),
        message: format!("missing `{FILE_NAME_COLUMN}` column"),
    }
}

fn read_metadata_csv(path: &Path) -> Result<Metadata> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let file_names = df
        .get_columns()
        .iter()
        .find(|column| column.name().as_str() == FILE_NAME_COLUMN)
        .ok_or_else(|| missing_file_name(path))?;
    let keys = (0..df.height())
        .map(|idx| Ok(any_value_to_example(file_names.get(idx)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut metadata = Metadata::default();
    let mut rows: Vec<BTreeMap<String, Example>> = vec![BTreeMap::new(); df.height()];
    for column in df.get_columns() {
        let name = column.name().as_str();
        if name == FILE_NAME_COLUMN {
            continue;
        }
        metadata.features.insert(name, SchemaNode::value(polars_dtype(column.dtype())));
        for (idx, row) in rows.iter_mut().enumerate() {
            row.insert(name.to_string(), any_value_to_example(column.get(idx)?));
        }
    }
    for (key, row) in keys.into_iter().zip(rows) {
        match key {
            Example::Str(key) => {
                metadata.rows.insert(normalize_key(&key), row);
            }
            other => {
                return Err(StructureError::Metadata {
                    path: path.to_path_buf(),
                    message: format!("`{FILE_NAME_COLUMN}` must be a string, got {}", other.kind()),
                })
            }
        }
    }
    Ok(metadata)
}

fn read_metadata_jsonl(path: &Path) -> Result<Metadata> {
    let file = std::fs::File::open(path).map_err(|e| StructureError::io(path, e))?;
    let mut metadata = Metadata::default();
    let mut inferred: Vec<(String, Option<SchemaNode>)> = Vec::new();

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| StructureError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: serde_json::Map<String, Json> = serde_json::from_str(&line).map_err(|e| StructureError::Metadata {
            path: path.to_path_buf(),
            message: format!("line {}: {e}", line_no + 1),
        })?;
        let mut row = BTreeMap::new();
        let mut key = None;
        for (name, value) in record {
            if name == FILE_NAME_COLUMN {
                key = value.as_str().map(normalize_key);
                continue;
            }
            match inferred.iter_mut().find(|(column, _)| *column == name) {
                Some((_, node @ None)) => *node = infer_json_feature(&value),
                Some(_) => {}
                None => inferred.push((name.clone(), infer_json_feature(&value))),
            }
            row.insert(name, Example::from(value));
        }
        let key = key.ok_or_else(|| missing_file_name(path))?;
        metadata.rows.insert(key, row);
    }
    for (name, node) in inferred {
        // all-null columns fall back to strings
        metadata
            .features
            .insert(name, node.unwrap_or_else(|| SchemaNode::value(Dtype::String)));
    }
    Ok(metadata)
}

fn normalize_key(key: &str) -> String {
    key.trim_start_matches("./").replace('\\', "/")
}

fn infer_json_feature(value: &Json) -> Option<SchemaNode> {
    match value {
        Json::Null => None,
        Json::Bool(_) => Some(SchemaNode::value(Dtype::Bool)),
        Json::Number(n) if n.is_i64() || n.is_u64() => Some(SchemaNode::value(Dtype::Int64)),
        Json::Number(_) => Some(SchemaNode::value(Dtype::Float64)),
        Json::String(_) => Some(SchemaNode::value(Dtype::String)),
        Json::Array(items) => items
            .iter()
            .find_map(infer_json_feature)
            .map(SchemaNode::sequence),
        Json::Object(fields) => {
            let features: Features = fields
                .iter()
                .map(|(name, value)| {
                    let node = infer_json_feature(value).unwrap_or_else(|| SchemaNode::value(Dtype::String));
                    (name.clone(), node)
                })
                .collect();
            Some(SchemaNode::Mapping(features))
        }
    }
}

fn polars_dtype(dtype: &DataType) -> Dtype {
    match dtype {
        DataType::Boolean => Dtype::Bool,
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => Dtype::Int64,
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => Dtype::Int64,
        DataType::Float32 | DataType::Float64 => Dtype::Float64,
        _ => Dtype::String,
    }
}

fn any_value_to_example(value: AnyValue) -> Example {
    match value {
        AnyValue::Null => Example::Null,
        AnyValue::Boolean(b) => Example::Bool(b),
        AnyValue::Int8(v) => Example::Int(v.into()),
        AnyValue::Int16(v) => Example::Int(v.into()),
        AnyValue::Int32(v) => Example::Int(v.into()),
        AnyValue::Int64(v) => Example::Int(v),
        AnyValue::UInt8(v) => Example::Int(v.into()),
        AnyValue::UInt16(v) => Example::Int(v.into()),
        AnyValue::UInt32(v) => Example::Int(v.into()),
        // values past i64::MAX keep their magnitude as floats
        AnyValue::UInt64(v) => i64::try_from(v).map_or(Example::Float(v as f64), Example::Int),
        AnyValue::Float32(v) => Example::Float(v.into()),
        AnyValue::Float64(v) => Example::Float(v),
        AnyValue::String(s) => Example::from(s),
        other => Example::from(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biodatasets_test_data::TestFile;
    use std::fs;

    #[test]
    fn test_labels_from_directories() {
        let dir = tempfile::tempdir().unwrap();
        TestFile::protein_pdb().write_to(dir.path().join("kinase"), "1abc").unwrap();
        TestFile::protein_cif().write_to(dir.path().join("kinase"), "2abc").unwrap();
        TestFile::protein_pdb().write_to(dir.path().join("protease"), "3abc").unwrap();
        fs::write(dir.path().join("protease").join("notes.txt"), "skip me").unwrap();

        let folder = StructureFolder::new(StructureFolderConfig::builder().data_dir(dir.path()).build()).unwrap();
        assert_eq!(folder.files().len(), 3);

        let features = folder.features();
        assert_eq!(features.names().collect::<Vec<_>>(), [BASE_COLUMN_NAME, LABEL_COLUMN_NAME]);
        assert_eq!(features.get(LABEL_COLUMN_NAME), Some(&SchemaNode::class_label(["kinase", "protease"])));

        let encoded: Vec<Example> = folder
            .examples()
            .into_iter()
            .map(|row| features.encode_row(row).unwrap())
            .collect();
        let labels: Vec<_> = encoded.iter().map(|row| row.get(LABEL_COLUMN_NAME).cloned()).collect();
        assert_eq!(
            labels,
            [Some(Example::Int(0)), Some(Example::Int(0)), Some(Example::Int(1))]
        );
        assert_eq!(
            encoded[1].get(BASE_COLUMN_NAME).and_then(|s| s.get("format")),
            Some(&Example::from("cif"))
        );
    }

    #[test]
    fn test_single_directory_gets_no_labels() {
        let dir = tempfile::tempdir().unwrap();
        TestFile::protein_pdb().write_to(dir.path(), "1abc").unwrap();
        TestFile::protein_pdb().write_to(dir.path(), "2abc").unwrap();

        let folder = StructureFolder::new(StructureFolderConfig::builder().data_dir(dir.path()).build()).unwrap();
        assert!(!folder.features().contains(LABEL_COLUMN_NAME));

        let forced = StructureFolder::new(
            StructureFolderConfig::builder()
                .data_dir(dir.path())
                .drop_labels(false)
                .build(),
        )
        .unwrap();
        assert!(forced.features().contains(LABEL_COLUMN_NAME));
    }

    #[test]
    fn test_csv_metadata_join() {
        let dir = tempfile::tempdir().unwrap();
        TestFile::protein_pdb().write_to(dir.path().join("a"), "1abc").unwrap();
        TestFile::protein_pdb().write_to(dir.path().join("b"), "2abc").unwrap();
        fs::write(
            dir.path().join(METADATA_CSV),
            "file_name,resolution,method\na/1abc.pdb,1.5,xray\nb/2abc.pdb,2.25,nmr\n",
        )
        .unwrap();

        let folder = StructureFolder::new(StructureFolderConfig::builder().data_dir(dir.path()).build()).unwrap();
        let features = folder.features();
        // a metadata file switches label inference off
        assert!(!features.contains(LABEL_COLUMN_NAME));
        assert_eq!(features.get("resolution"), Some(&SchemaNode::value(Dtype::Float64)));
        assert_eq!(features.get("method"), Some(&SchemaNode::value(Dtype::String)));

        let rows = folder.examples();
        assert_eq!(rows[1].get("resolution"), Some(&Example::Float(2.25)));
        assert_eq!(rows[0].get("method"), Some(&Example::from("xray")));

        let without = StructureFolder::new(
            StructureFolderConfig::builder()
                .data_dir(dir.path())
                .drop_metadata(true)
                .build(),
        )
        .unwrap();
        assert_eq!(without.features().len(), 1);
    }

    #[test]
    fn test_jsonl_metadata_join() {
        let dir = tempfile::tempdir().unwrap();
        TestFile::protein_pdb().write_to(dir.path(), "1abc").unwrap();
        fs::write(
            dir.path().join(METADATA_JSONL),
            "{\"file_name\": \"1abc.pdb\", \"chains\": [\"A\"], \"score\": null}\n",
        )
        .unwrap();

        let folder = StructureFolder::new(
            StructureFolderConfig::builder()
                .data_dir(dir.path())
                .as_array(true)
                .build(),
        )
        .unwrap();
        let features = folder.features();
        assert_eq!(features.get("chains"), Some(&SchemaNode::sequence(SchemaNode::value(Dtype::String))));
        assert_eq!(features.get("score"), Some(&SchemaNode::value(Dtype::String)));

        let row = features.encode_row(folder.examples().remove(0)).unwrap();
        assert_eq!(row.get("score"), Some(&Example::Null));
        let atoms = crate::AtomArray::from_example(row.get(BASE_COLUMN_NAME).unwrap()).unwrap();
        assert_eq!(atoms.len(), 16);
    }

    #[test]
    fn test_two_metadata_files_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(METADATA_CSV), "file_name\n").unwrap();
        fs::write(dir.path().join(METADATA_JSONL), "").unwrap();
        let err = StructureFolder::new(StructureFolderConfig::builder().data_dir(dir.path()).build()).unwrap_err();
        assert!(matches!(err, StructureError::Metadata { .. }));
    }

    #[test]
    fn test_large_unsigned_metadata_does_not_wrap() {
        assert_eq!(any_value_to_example(AnyValue::UInt64(42)), Example::Int(42));
        assert_eq!(
            any_value_to_example(AnyValue::UInt64(u64::MAX)),
            Example::Float(u64::MAX as f64)
        );
    }
}
