//! Structure file formats and raw file handling.
use crate::error::{Result, StructureError};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use pdbtbx::PDB;
use std::io::{Read, Write};
use std::path::Path;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tempfile::Builder;
use tracing::debug;

const GZ_SUFFIX: &str = ".gz";

/// File formats recognised in structure datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StructureFormat {
    Pdb,
    Cif,
    /// Foldcomp compressed structures, stored but never parsed.
    Fcz,
}

impl StructureFormat {
    pub fn extension(&self) -> String {
        format!(".{self}")
    }

    /// Detects the format of a file name, and whether it carries a `.gz` suffix.
    pub fn from_path(path: impl AsRef<Path>) -> Option<(Self, bool)> {
        let name = path.as_ref().file_name()?.to_str()?.to_ascii_lowercase();
        let (name, gzipped) = match name.strip_suffix(GZ_SUFFIX) {
            Some(stem) => (stem.to_string(), true),
            None => (name, false),
        };
        let (_, extension) = name.rsplit_once('.')?;
        extension.parse().ok().map(|format| (format, gzipped))
    }

    /// Whether `path` has one of the structure extensions (case-insensitive).
    pub fn is_structure_file(path: impl AsRef<Path>) -> bool {
        Self::from_path(path).is_some_and(|(_, gzipped)| !gzipped)
    }

    pub fn extensions() -> Vec<String> {
        Self::iter().map(|format| format.extension()).collect()
    }

    /// Parses structure file contents.
    ///
    /// The contents are staged in a temporary file so that the parser can
    /// pick its reader from the extension.
    pub fn parse(&self, contents: &[u8]) -> Result<PDB> {
        if *self == StructureFormat::Fcz {
            return Err(StructureError::UnsupportedFormat(self.to_string()));
        }
        let temp = Builder::new()
            .suffix(&self.extension())
            .tempfile()
            .map_err(|e| StructureError::io(std::env::temp_dir(), e))?;
        std::fs::write(temp.path(), contents).map_err(|e| StructureError::io(temp.path(), e))?;

        let path = temp.path().to_string_lossy().into_owned();
        let (pdb, warnings) = pdbtbx::open(path.as_str()).map_err(|errors| StructureError::Parse {
            format: self.to_string(),
            message: errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        })?;
        if !warnings.is_empty() {
            debug!(format = %self, count = warnings.len(), "structure parsed with warnings");
        }
        Ok(pdb)
    }
}

pub fn is_gzipped(contents: &[u8]) -> bool {
    contents.starts_with(&[0x1f, 0x8b])
}

pub fn gzip(contents: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(contents)
        .and_then(|_| encoder.finish())
        .map_err(|e| StructureError::io("<gzip>", e))
}

pub fn gunzip(contents: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(contents)
        .read_to_end(&mut out)
        .map_err(|e| StructureError::io("<gzip>", e))?;
    Ok(out)
}
