//! # biodatasets-hub
//!
//! Building, storing and publishing datasets.
//!
//! __biodatasets-hub__ provides:
//! * [`Dataset`], Parquet shards generated from rows encoded against [`Features`](biodatasets_features::Features)
//! * [`DatasetCard`], the `README.md` whose front matter lists configs and features
//! * [`HubClient`], repository creation, LFS uploads and commits against the hub API
//!
//! ```no_run
//! use biodatasets_features::{Dtype, Example, Features, SchemaNode};
//! use biodatasets_hub::{Dataset, GeneratorOptions, PushOptions};
//!
//! # fn main() -> anyhow::Result<()> {
//! let features = Features::new().with("id", SchemaNode::value(Dtype::String));
//! let rows = vec![Ok::<_, anyhow::Error>(Example::map([("id", "g1")]))];
//! let options = GeneratorOptions::builder().cache_dir("cache").build();
//! let dataset = Dataset::from_generator(features, rows, options)?;
//! dataset.push_to_hub("user/genes", PushOptions::builder().build())?;
//! # Ok(())
//! # }
//! ```
mod arrow_reader;
mod arrow_writer;
mod card;
mod client;
mod dataset;

pub use self::arrow_reader::{array_to_examples, record_batch_to_examples};
pub use self::arrow_writer::examples_to_record_batch;
pub use self::card::{DatasetCard, SplitInfo};
pub use self::client::{
    resolve_endpoint, resolve_token, sha256_file, CommitInfo, CommitOperation, HubClient,
    DEFAULT_ENDPOINT,
};
pub use self::dataset::{
    parse_size, Dataset, GeneratorOptions, PushOptions, DEFAULT_MAX_SHARD_SIZE, README,
};
