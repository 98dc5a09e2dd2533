use crate::expression::{read_expression_matrix, GeneExpression};
use crate::structures::StructureIndex;
use anyhow::{Context, Result};
use biodatasets_features::{Dtype, Example, Features, SchemaNode};
use biodatasets_hub::{parse_size, Dataset, GeneratorOptions, PushOptions};
use biodatasets_structure::{AtomArrayFeature, StructureFeature, StructureFormat};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const MAX_SHARD_SIZE: &str = "350MB";

/// Builds a gene expression dataset with matching structures and uploads it.
#[derive(Parser, Debug)]
#[command(name = "upload-sc-rna-seq", author, version, about, long_about = None)]
pub struct Cli {
    #[arg(long = "config_name")]
    config_name: Option<String>,

    /// PDB 2-letter codes
    #[arg(long = "pair_codes", num_args = 1..)]
    pair_codes: Option<Vec<String>>,

    /// Whether to drop sidechains
    #[arg(long = "backbone_only")]
    backbone_only: bool,

    /// Whether to store parsed atom arrays
    #[arg(long = "as_array")]
    as_array: bool,

    /// Directory holding downloaded structures
    #[arg(long = "pdb_download_dir", default_value = "data/pdb")]
    pdb_download_dir: PathBuf,

    /// Temporary directory (for caching built dataset)
    #[arg(long = "temp_dir")]
    temp_dir: Option<PathBuf>,

    /// Whether to gzip the stored structure files
    #[arg(long)]
    compress: bool,

    /// Whether to remove source CIF files once they are stored
    #[arg(long = "remove_cif")]
    remove_cif: bool,

    /// Number of threads encoding rows
    #[arg(long = "num_proc", default_value_t = 1)]
    num_proc: usize,

    /// Expression matrix CSV, one row per cell and one column per gene
    #[arg(long = "sc_data_path")]
    sc_data_path: PathBuf,

    #[arg(long = "repo_id", default_value = "biodatasets/pdb")]
    repo_id: String,

    /// Save the dataset here instead of pushing it to the hub
    #[arg(long = "output_dir")]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    private: bool,
}

impl Cli {
    fn features(&self) -> Features {
        let structure = if self.as_array {
            SchemaNode::custom(AtomArrayFeature {
                backbone_only: self.backbone_only,
            })
        } else {
            SchemaNode::custom(StructureFeature {
                compress: self.compress,
                decode: true,
            })
        };
        Features::new()
            .with("id", SchemaNode::value(Dtype::String))
            .with("expression", SchemaNode::sequence(SchemaNode::value(Dtype::Float32)))
            .with("structure", structure)
    }

    pub fn execute(self) -> Result<()> {
        fs::create_dir_all(&self.pdb_download_dir)
            .with_context(|| format!("failed to create {}", self.pdb_download_dir.display()))?;
        if let Some(temp_dir) = &self.temp_dir {
            fs::create_dir_all(temp_dir).with_context(|| format!("failed to create {}", temp_dir.display()))?;
        }
        if self.backbone_only && !self.as_array {
            warn!("--backbone_only only applies together with --as_array");
        }

        let genes = read_expression_matrix(&self.sc_data_path)?;
        let index = StructureIndex::scan(&self.pdb_download_dir, self.pair_codes.as_deref())?;
        let embedded: Vec<PathBuf> = genes
            .iter()
            .filter_map(|gene| index.lookup(&gene.gene))
            .map(Path::to_path_buf)
            .collect();
        info!(genes = genes.len(), with_structure = embedded.len(), "matched structures");

        let rows = genes.into_iter().map(|gene| Ok::<_, anyhow::Error>(gene_row(gene, &index)));
        let cache = match &self.temp_dir {
            Some(dir) => tempfile::tempdir_in(dir)?,
            None => tempfile::tempdir()?,
        };
        let options = GeneratorOptions::builder()
            .cache_dir(cache.path())
            .split("train")
            .num_proc(self.num_proc)
            .build();
        let dataset = Dataset::from_generator(self.features(), rows, options)?;

        let config_name = self.config_name.as_deref().unwrap_or("default");
        match &self.output_dir {
            Some(output_dir) => {
                let saved = dataset.save_to_disk(output_dir, config_name)?;
                info!(dir = %saved.display(), "dataset saved");
            }
            None => {
                let options = PushOptions::builder()
                    .config_name(config_name)
                    .max_shard_size(parse_size(MAX_SHARD_SIZE)?)
                    .private(self.private)
                    .build();
                let commit = dataset.push_to_hub(&self.repo_id, options)?;
                info!(url = %commit.commit_url, "dataset pushed");
            }
        }

        if self.remove_cif {
            remove_cif_sources(&embedded)?;
        }
        Ok(())
    }
}

fn gene_row(gene: GeneExpression, index: &StructureIndex) -> Example {
    let structure = index
        .lookup(&gene.gene)
        .map(|path| path.to_string_lossy().into_owned());
    let expression: Vec<Example> = gene.values.into_iter().map(Example::from).collect();
    Example::map([
        ("id", Example::from(gene.gene)),
        ("expression", Example::List(expression)),
        ("structure", Example::from(structure)),
    ])
}

fn remove_cif_sources(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        if matches!(StructureFormat::from_path(path), Some((StructureFormat::Cif, _))) {
            fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))?;
            info!(file = %path.display(), "removed cif source");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_underscore_flags() {
        let cli = Cli::try_parse_from([
            "upload-sc-rna-seq",
            "--sc_data_path",
            "expr.csv",
            "--pair_codes",
            "ab",
            "cd",
            "--as_array",
            "--num_proc",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.pair_codes, Some(vec!["ab".to_string(), "cd".to_string()]));
        assert_eq!(cli.pdb_download_dir, PathBuf::from("data/pdb"));
        assert_eq!(cli.repo_id, "biodatasets/pdb");
        assert_eq!(cli.num_proc, 4);
        assert!(cli.as_array && !cli.compress);
    }
}
