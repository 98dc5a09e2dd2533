//! # biodatasets-structure
//!
//! Protein structure support for biodatasets.
//!
//! __biodatasets-structure__ provides:
//! * [`AtomArray`], a column-oriented atom table read from PDB and mmCIF files
//! * [`StructureFeature`], storing structure files verbatim and decoding them to atom arrays
//! * [`AtomArrayFeature`], storing parsed atom arrays
//! * [`StructureFolder`], a dataset builder over a directory of structure files
//!
//! Schemas holding the structure features are read back with the registry from
//! [`structure_registry`].
//!
mod atoms;
mod error;
mod feature;
mod folder;
mod format;

pub use self::atoms::{AtomArray, BACKBONE_ATOMS};
pub use self::error::{Result, StructureError};
pub use self::feature::{structure_registry, AtomArrayFeature, StructureFeature};
pub use self::folder::{StructureFolder, StructureFolderConfig, BASE_COLUMN_NAME, LABEL_COLUMN_NAME};
pub use self::format::{gunzip, gzip, is_gzipped, StructureFormat};
