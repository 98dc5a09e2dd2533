//! biodatasets-test-data
//!
//! A module to provide structure files embedded in the crate for use in testing.
//!
//! The test files are represented as `TestFile` objects which package the raw binary data
//! and create temporary files for programs to operate on.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile};

#[derive(Debug)]
/// Test File
///
/// Example usage:
///
/// ```ignore
/// // returns (filepath, _tempfile_handle).
/// // _handle ensures the tempfile remains in scope
/// use biodatasets_test_data::TestFile;
/// let (prot_file, _temp) = TestFile::protein_pdb().create_temp().unwrap();
/// ```
pub struct TestFile {
    filebinary: &'static [u8],
    suffix: &'static str,
}

impl TestFile {
    /// Gly-Ala-Ser tripeptide plus one water; 16 atoms, 12 backbone atoms.
    pub fn protein_pdb() -> Self {
        Self {
            filebinary: include_bytes!("../data/structures/1gas.pdb"),
            suffix: "pdb",
        }
    }
    /// The same tripeptide in mmCIF.
    pub fn protein_cif() -> Self {
        Self {
            filebinary: include_bytes!("../data/structures/1gas.cif"),
            suffix: "cif",
        }
    }
    /// The tripeptide PDB file, gzipped.
    pub fn protein_pdb_gz() -> Self {
        Self {
            filebinary: include_bytes!("../data/structures/1gas.pdb.gz"),
            suffix: "pdb.gz",
        }
    }

    pub fn bytes(&self) -> &'static [u8] {
        self.filebinary
    }

    pub fn suffix(&self) -> &'static str {
        self.suffix
    }

    pub fn create_temp(&self) -> io::Result<(String, NamedTempFile)> {
        let temp = Builder::new()
            .suffix(&format!(".{}", self.suffix))
            .tempfile()?;

        fs::write(&temp, self.filebinary)?;
        let path = temp.path().to_string_lossy().into_owned();

        Ok((path, temp))
    }

    /// Writes the file as `<dir>/<stem>.<suffix>`, creating `dir` if needed.
    pub fn write_to(&self, dir: impl AsRef<Path>, stem: &str) -> io::Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{stem}.{}", self.suffix));
        fs::write(&path, self.filebinary)?;
        Ok(path)
    }
}
