//! Structure files available in the download directory.
use anyhow::Result;
use biodatasets_structure::StructureFormat;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Structure files keyed by their lowercase stem (`1abc` for `1ABC.cif.gz`).
#[derive(Debug, Default)]
pub struct StructureIndex {
    files: HashMap<String, PathBuf>,
}

fn stem(path: &Path) -> Option<String> {
    StructureFormat::from_path(path)?;
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    name.rsplit_once('.').map(|(stem, _)| stem.to_string())
}

/// PDB ids are grouped by their middle two characters (`ab` for `1abc`).
fn pair_code(stem: &str) -> Option<&str> {
    stem.get(1..3)
}

impl StructureIndex {
    /// Indexes `dir`, keeping only ids whose pair code is in `pair_codes` when given.
    pub fn scan(dir: &Path, pair_codes: Option<&[String]>) -> Result<Self> {
        let pair_codes: Option<Vec<String>> =
            pair_codes.map(|codes| codes.iter().map(|code| code.to_ascii_lowercase()).collect());
        let mut files = HashMap::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(stem) = stem(entry.path()) else {
                continue;
            };
            let allowed = match (&pair_codes, pair_code(&stem)) {
                (None, _) => true,
                (Some(codes), Some(code)) => codes.iter().any(|c| c == code),
                (Some(_), None) => false,
            };
            if !allowed {
                debug!(file = %entry.path().display(), "skipping structure outside pair codes");
                continue;
            }
            files.entry(stem).or_insert_with(|| entry.into_path());
        }
        info!(dir = %dir.display(), structures = files.len(), "indexed structure files");
        Ok(Self { files })
    }

    /// Structure whose stem matches `name`, ignoring case.
    pub fn lookup(&self, name: &str) -> Option<&Path> {
        self.files.get(&name.to_ascii_lowercase()).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_stems_and_pair_codes() {
        assert_eq!(stem(Path::new("x/1ABC.cif.gz")).as_deref(), Some("1abc"));
        assert_eq!(stem(Path::new("1abc.pdb")).as_deref(), Some("1abc"));
        assert_eq!(stem(Path::new("notes.txt")), None);
        assert_eq!(pair_code("1abc"), Some("ab"));
        assert_eq!(pair_code("x"), None);
    }

    #[test]
    fn test_scan_filters_pair_codes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("ab")).unwrap();
        fs::write(dir.path().join("ab/1ABC.cif"), "data_1ABC\n").unwrap();
        fs::write(dir.path().join("2xyz.pdb"), "END\n").unwrap();
        fs::write(dir.path().join("readme.txt"), "").unwrap();

        let all = StructureIndex::scan(dir.path(), None).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.lookup("1abc").is_some());
        assert!(all.lookup("2XYZ").is_some());

        let codes = vec!["AB".to_string()];
        let filtered = StructureIndex::scan(dir.path(), Some(&codes)).unwrap();
        assert_eq!(filtered.len(), 1);
        assert!(filtered.lookup("2xyz").is_none());
    }
}
