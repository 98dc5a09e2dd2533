//! Parquet-backed datasets built from row generators.
use crate::arrow_reader::record_batch_to_examples;
use crate::arrow_writer::examples_to_record_batch;
use crate::card::{DatasetCard, SplitInfo};
use crate::client::{CommitInfo, CommitOperation, HubClient};
use anyhow::{bail, Context, Result};
use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use biodatasets_features::{DecodeContext, Example, FeatureRegistry, Features};
use bon::Builder;
use itertools::{Either, Itertools};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rayon::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_MAX_SHARD_SIZE: u64 = 500_000_000;
pub const README: &str = "README.md";
/// Rows per batch when shards are rewritten.
const RESHARD_BATCH_ROWS: usize = 64;

#[derive(Debug, Clone, Builder)]
pub struct GeneratorOptions {
    /// Directory the Parquet shards are written to.
    #[builder(into)]
    pub cache_dir: PathBuf,
    #[builder(into, default = String::from("train"))]
    pub split: String,
    #[builder(default = 1)]
    pub num_proc: usize,
    #[builder(default = DEFAULT_MAX_SHARD_SIZE)]
    pub max_shard_size: u64,
    /// Rows encoded and written per record batch.
    #[builder(default = 1000)]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Builder)]
pub struct PushOptions {
    #[builder(into, default = String::from("default"))]
    pub config_name: String,
    /// Defaults to the split the dataset was built with.
    #[builder(into)]
    pub split: Option<String>,
    /// Shards larger than this are rewritten before the upload.
    pub max_shard_size: Option<u64>,
    #[builder(default)]
    pub private: bool,
    #[builder(into)]
    pub token: Option<String>,
    #[builder(into, default = String::from("main"))]
    pub revision: String,
    #[builder(into)]
    pub endpoint: Option<String>,
    #[builder(into)]
    pub commit_message: Option<String>,
}

/// One split stored as a list of Parquet shards.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Features,
    split: String,
    shards: Vec<PathBuf>,
    num_rows: usize,
}

impl Dataset {
    /// Encodes `rows` against `features` and writes them as Parquet shards.
    ///
    /// Rows are encoded in batches on a dedicated pool of `num_proc` threads.
    /// The first failing row aborts the whole build.
    pub fn from_generator<I, E>(features: Features, rows: I, options: GeneratorOptions) -> Result<Self>
    where
        I: IntoIterator<Item = std::result::Result<Example, E>>,
        E: Into<anyhow::Error>,
    {
        fs::create_dir_all(&options.cache_dir)
            .with_context(|| format!("failed to create {}", options.cache_dir.display()))?;
        let schema = Arc::new(features.arrow_schema()?);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.num_proc.max(1))
            .build()?;
        let mut shards = ShardWriter::new(&options.cache_dir, &options.split, schema.clone(), options.max_shard_size);

        let mut num_rows = 0;
        let chunks = rows.into_iter().chunks(options.batch_size.max(1));
        for chunk in &chunks {
            let batch = chunk
                .collect::<std::result::Result<Vec<_>, E>>()
                .map_err(Into::<anyhow::Error>::into)
                .context("row generator failed")?;
            let encoded = pool.install(|| {
                batch
                    .into_par_iter()
                    .map(|row| features.encode_row(row))
                    .collect::<biodatasets_features::Result<Vec<_>>>()
            })?;
            shards.write(&examples_to_record_batch(schema.clone(), &encoded)?)?;
            num_rows += encoded.len();
            debug!(num_rows, "encoded batch");
        }
        let shards = shards.finish()?;
        info!(num_rows, num_shards = shards.len(), split = %options.split, "generated dataset");
        Ok(Self {
            features,
            split: options.split,
            shards,
            num_rows,
        })
    }

    /// Opens existing shards; features come from the embedded schema metadata.
    pub fn from_parquet_files(
        files: impl IntoIterator<Item = impl Into<PathBuf>>,
        split: impl Into<String>,
        registry: &FeatureRegistry,
    ) -> Result<Self> {
        let shards: Vec<PathBuf> = files.into_iter().map(Into::into).collect();
        let Some(first) = shards.first() else {
            bail!("a dataset needs at least one parquet file");
        };
        let features = Features::from_arrow_schema(open_shard(first)?.schema(), registry, false)?;
        let num_rows = shards
            .iter()
            .map(|shard| Ok(open_shard(shard)?.metadata().file_metadata().num_rows() as usize))
            .sum::<Result<usize>>()?;
        Ok(Self {
            features,
            split: split.into(),
            shards,
            num_rows,
        })
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    pub fn split(&self) -> &str {
        &self.split
    }

    pub fn shards(&self) -> &[PathBuf] {
        &self.shards
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Total size of the shards on disk.
    pub fn num_bytes(&self) -> Result<u64> {
        self.shards
            .iter()
            .map(|shard| Ok(fs::metadata(shard)?.len()))
            .sum()
    }

    /// Stored rows, as encoded.
    pub fn iter_encoded(&self) -> impl Iterator<Item = Result<Example>> + '_ {
        self.shards.iter().flat_map(|shard| match read_shard(shard) {
            Ok(rows) => Either::Left(rows.into_iter().map(Ok)),
            Err(err) => Either::Right(std::iter::once(Err(err))),
        })
    }

    /// Stored rows, decoded for callers.
    pub fn iter_examples<'a>(&'a self, ctx: &'a DecodeContext) -> impl Iterator<Item = Result<Example>> + 'a {
        self.iter_encoded().map(move |row| {
            self.features
                .decode_row(row?, ctx)
                .map_err(anyhow::Error::from)
        })
    }

    /// Rewrites the shards into `dir`, none larger than `max_shard_size`.
    pub fn reshard(&self, dir: &Path, max_shard_size: u64) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let schema = Arc::new(self.features.arrow_schema()?);
        let mut writer = ShardWriter::new(dir, &self.split, schema.clone(), max_shard_size);
        for shard in &self.shards {
            for batch in read_batches(shard, RESHARD_BATCH_ROWS)? {
                writer.write(&RecordBatch::try_new(schema.clone(), batch.columns().to_vec())?)?;
            }
        }
        Ok(Self {
            features: self.features.clone(),
            split: self.split.clone(),
            shards: writer.finish()?,
            num_rows: self.num_rows,
        })
    }

    fn split_info(&self, split: &str) -> Result<SplitInfo> {
        Ok(SplitInfo {
            name: split.to_string(),
            num_bytes: self.num_bytes()?,
            num_examples: self.num_rows,
        })
    }

    /// Writes `<dir>/<config_name>/<shards>` and updates `<dir>/README.md`.
    pub fn save_to_disk(&self, dir: &Path, config_name: &str) -> Result<PathBuf> {
        let data_dir = dir.join(config_name);
        fs::create_dir_all(&data_dir).with_context(|| format!("failed to create {}", data_dir.display()))?;
        for stale in fs::read_dir(&data_dir)? {
            let path = stale?.path();
            if is_split_shard(&path, &self.split) {
                fs::remove_file(&path)?;
            }
        }
        for shard in &self.shards {
            let Some(name) = shard.file_name() else {
                bail!("shard path {} has no file name", shard.display());
            };
            fs::copy(shard, data_dir.join(name))
                .with_context(|| format!("failed to copy {}", shard.display()))?;
        }

        let readme = dir.join(README);
        let mut card = match fs::read_to_string(&readme) {
            Ok(text) => DatasetCard::parse(&text)?,
            Err(_) => DatasetCard::default(),
        };
        card.upsert_config(config_name, &self.features, &self.split_info(&self.split)?)?;
        fs::write(&readme, card.render()?)?;
        info!(dir = %dir.display(), config_name, "saved dataset");
        Ok(data_dir)
    }

    /// Uploads the shards and an updated dataset card in a single commit.
    pub fn push_to_hub(&self, repo_id: &str, options: PushOptions) -> Result<CommitInfo> {
        let client = HubClient::from_env(options.token.clone(), options.endpoint.clone())?;
        let split = options.split.clone().unwrap_or_else(|| self.split.clone());

        // kept alive until the upload finishes
        let scratch = tempfile::tempdir()?;
        let resharded;
        let dataset = match options.max_shard_size {
            Some(max) if self.exceeds_shard_size(max)? => {
                info!(max_shard_size = max, "resharding before upload");
                resharded = self.reshard(scratch.path(), max)?;
                &resharded
            }
            _ => self,
        };

        client.create_repo(repo_id, options.private)?;

        let mut operations = Vec::new();
        let mut uploaded = Vec::new();
        for shard in &dataset.shards {
            let name = shard_name(shard, &split, &self.split)?;
            let path_in_repo = format!("{}/{name}", options.config_name);
            operations.push(CommitOperation::lfs(path_in_repo.clone(), shard)?);
            uploaded.push(path_in_repo);
        }
        let existing = client.list_files(repo_id, &options.revision, &options.config_name)?;
        for path in existing {
            if is_split_shard(Path::new(&path), &split) && !uploaded.contains(&path) {
                debug!(path, "removing stale shard");
                operations.push(CommitOperation::Delete { path_in_repo: path });
            }
        }

        let mut card = match client.read_file(repo_id, &options.revision, README)? {
            Some(text) => DatasetCard::parse(&text)?,
            None => DatasetCard::default(),
        };
        card.upsert_config(&options.config_name, &dataset.features, &dataset.split_info(&split)?)?;
        operations.push(CommitOperation::Add {
            path_in_repo: README.to_string(),
            content: card.render()?.into_bytes(),
        });

        client.upload_lfs(repo_id, &options.revision, &operations)?;
        let message = options
            .commit_message
            .unwrap_or_else(|| "Upload dataset".to_string());
        client.create_commit(repo_id, &options.revision, &message, &operations)
    }

    fn exceeds_shard_size(&self, max: u64) -> Result<bool> {
        for shard in &self.shards {
            if fs::metadata(shard)?.len() > max {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// File name of a shard, renamed when it is uploaded under another split.
fn shard_name(shard: &Path, split: &str, built_as: &str) -> Result<String> {
    let Some(name) = shard.file_name().and_then(|name| name.to_str()) else {
        bail!("shard path {} has no file name", shard.display());
    };
    Ok(match name.strip_prefix(built_as) {
        Some(rest) if split != built_as => format!("{split}{rest}"),
        _ => name.to_string(),
    })
}

fn is_split_shard(path: &Path, split: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(&format!("{split}-")) && name.ends_with(".parquet"))
}

fn open_shard(path: &Path) -> Result<ParquetRecordBatchReaderBuilder<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("failed to read parquet file {}", path.display()))
}

fn read_batches(path: &Path, batch_size: usize) -> Result<Vec<RecordBatch>> {
    Ok(open_shard(path)?
        .with_batch_size(batch_size)
        .build()?
        .collect::<std::result::Result<Vec<_>, _>>()?)
}

fn read_shard(path: &Path) -> Result<Vec<Example>> {
    let mut rows = Vec::new();
    for batch in read_batches(path, 1024)? {
        rows.extend(record_batch_to_examples(&batch)?);
    }
    Ok(rows)
}

/// Writes record batches into numbered Parquet shards of bounded size.
struct ShardWriter {
    dir: PathBuf,
    split: String,
    schema: SchemaRef,
    max_shard_size: u64,
    current: Option<ArrowWriter<File>>,
    written: Vec<PathBuf>,
}

impl ShardWriter {
    fn new(dir: &Path, split: &str, schema: SchemaRef, max_shard_size: u64) -> Self {
        Self {
            dir: dir.to_path_buf(),
            split: split.to_string(),
            schema,
            max_shard_size,
            current: None,
            written: Vec::new(),
        }
    }

    fn open(&mut self) -> Result<ArrowWriter<File>> {
        let path = self
            .dir
            .join(format!("{}-{:05}.parquet.partial", self.split, self.written.len()));
        let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        self.written.push(path);
        Ok(ArrowWriter::try_new(file, self.schema.clone(), Some(props))?)
    }

    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        let mut writer = match self.current.take() {
            Some(writer) => writer,
            None => self.open()?,
        };
        writer.write(batch)?;
        if writer.bytes_written() + writer.in_progress_size() >= self.max_shard_size as usize {
            writer.close()?;
        } else {
            self.current = Some(writer);
        }
        Ok(())
    }

    /// Closes the last shard and gives every shard its final
    /// `<split>-NNNNN-of-NNNNN.parquet` name.
    fn finish(mut self) -> Result<Vec<PathBuf>> {
        if self.written.is_empty() {
            let writer = self.open()?;
            self.current = Some(writer);
        }
        if let Some(writer) = self.current.take() {
            writer.close()?;
        }
        let total = self.written.len();
        self.written
            .iter()
            .enumerate()
            .map(|(idx, partial)| {
                let path = self
                    .dir
                    .join(format!("{}-{idx:05}-of-{total:05}.parquet", self.split));
                fs::rename(partial, &path)?;
                Ok(path)
            })
            .collect()
    }
}

/// Parses sizes such as `350MB`, `1GiB` or `1000`.
///
/// Decimal units written with a lowercase `b` (`5Gb`) are bits.
pub fn parse_size(size: &str) -> Result<u64> {
    let size = size.trim();
    if let Ok(bytes) = size.parse::<u64>() {
        return Ok(bytes);
    }
    let split = size
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(size.len());
    let (number, unit) = size.split_at(split);
    let number: f64 = number
        .parse()
        .with_context(|| format!("invalid size `{size}`"))?;
    let unit = unit.trim();
    let (multiplier, decimal) = match unit.to_ascii_uppercase().as_str() {
        "B" => (1u64, false),
        "KB" => (1_000, true),
        "MB" => (1_000_000, true),
        "GB" => (1_000_000_000, true),
        "TB" => (1_000_000_000_000, true),
        "KIB" => (1 << 10, false),
        "MIB" => (1 << 20, false),
        "GIB" => (1 << 30, false),
        "TIB" => (1 << 40, false),
        _ => bail!("invalid size `{size}`, expected a unit such as MB or GiB"),
    };
    let bytes = (number * multiplier as f64) as u64;
    Ok(if decimal && unit.ends_with('b') {
        bytes / 8
    } else {
        bytes
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use biodatasets_features::{Dtype, SchemaNode};

    fn features() -> Features {
        Features::new()
            .with("id", SchemaNode::value(Dtype::String))
            .with("expression", SchemaNode::sequence(SchemaNode::value(Dtype::Float32)))
    }

    fn rows(n: usize) -> Vec<Result<Example>> {
        (0..n)
            .map(|idx| {
                Ok(Example::map([
                    ("id", Example::from(format!("gene{idx}"))),
                    ("expression", Example::from(vec![idx as f32, 0.5])),
                ]))
            })
            .collect()
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("350MB").unwrap(), 350_000_000);
        assert_eq!(parse_size("1GiB").unwrap(), 1 << 30);
        assert_eq!(parse_size("2kib").unwrap(), 2048);
        assert_eq!(parse_size("1000").unwrap(), 1000);
        assert_eq!(parse_size("8Mb").unwrap(), 1_000_000);
        assert!(parse_size("lots").is_err());
        assert!(parse_size("5 parsecs").is_err());
    }

    #[test]
    fn test_generator_shards_and_names() {
        let dir = tempfile::tempdir().unwrap();
        let options = GeneratorOptions::builder()
            .cache_dir(dir.path())
            .num_proc(2)
            .batch_size(4)
            .max_shard_size(1)
            .build();
        let dataset = Dataset::from_generator(features(), rows(10), options).unwrap();
        assert_eq!(dataset.num_rows(), 10);
        assert_eq!(dataset.shards().len(), 3);
        let last = dataset.shards()[2].file_name().unwrap().to_str().unwrap();
        assert_eq!(last, "train-00002-of-00003.parquet");

        let ids: Vec<String> = dataset
            .iter_examples(&DecodeContext::default())
            .map(|row| row.unwrap().get("id").unwrap().as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids.len(), 10);
        assert_eq!(ids[9], "gene9");
    }

    #[test]
    fn test_empty_generator_writes_one_shard() {
        let dir = tempfile::tempdir().unwrap();
        let options = GeneratorOptions::builder().cache_dir(dir.path()).split("test").build();
        let dataset = Dataset::from_generator(features(), Vec::<Result<Example>>::new(), options).unwrap();
        assert_eq!(dataset.num_rows(), 0);
        assert_eq!(dataset.shards().len(), 1);

        let reopened = Dataset::from_parquet_files(dataset.shards().to_vec(), "test", &FeatureRegistry::new()).unwrap();
        assert_eq!(reopened.features(), &features());
        assert_eq!(reopened.iter_encoded().count(), 0);
    }

    #[test]
    fn test_row_error_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = rows(3);
        input.push(Ok(Example::map([("id", Example::Int(1)), ("expression", Example::from("nope"))])));
        let options = GeneratorOptions::builder().cache_dir(dir.path()).build();
        assert!(Dataset::from_generator(features(), input, options).is_err());

        let failing = vec![Err(anyhow::anyhow!("source exhausted"))];
        let options = GeneratorOptions::builder().cache_dir(dir.path()).build();
        let err = Dataset::from_generator(features(), failing, options).unwrap_err();
        assert!(format!("{err:#}").contains("source exhausted"));
    }

    #[test]
    fn test_reshard_and_rename() {
        let dir = tempfile::tempdir().unwrap();
        let options = GeneratorOptions::builder().cache_dir(dir.path().join("cache")).batch_size(50).build();
        let dataset = Dataset::from_generator(features(), rows(150), options).unwrap();
        assert_eq!(dataset.shards().len(), 1);

        let resharded = dataset.reshard(&dir.path().join("small"), 1).unwrap();
        assert_eq!(resharded.shards().len(), 3);
        assert_eq!(resharded.iter_encoded().count(), 150);

        let name = shard_name(&resharded.shards()[0], "validation", "train").unwrap();
        assert_eq!(name, "validation-00000-of-00003.parquet");
        assert!(is_split_shard(Path::new("default/train-00000-of-00001.parquet"), "train"));
        assert!(!is_split_shard(Path::new("default/test-00000-of-00001.parquet"), "train"));
    }
}
