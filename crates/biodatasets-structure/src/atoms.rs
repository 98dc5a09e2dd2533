//! Column-oriented atom table built from parsed structures.
use crate::error::{Result, StructureError};
use crate::format::{gunzip, StructureFormat};
use biodatasets_features::{Dtype, Example, FeatureError, Features, SchemaNode};
use itertools::{izip, Itertools};
use pdbtbx::PDB;
use std::path::Path;

/// Atom names kept by [`AtomArray::backbone`].
pub const BACKBONE_ATOMS: [&str; 4] = ["N", "CA", "C", "O"];

/// Per-atom annotations of a single model, one entry per atom in every column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomArray {
    pub coords: Vec<[f32; 3]>,
    pub atom_names: Vec<String>,
    pub res_names: Vec<String>,
    pub res_ids: Vec<i32>,
    pub chain_ids: Vec<String>,
    pub elements: Vec<String>,
    pub is_hetero: Vec<bool>,
}

impl From<&PDB> for AtomArray {
    // PDB --> Chain --> Residue --> Atom; everything is collected in one pass
    fn from(pdb_data: &PDB) -> Self {
        let (coords, atom_names, res_names, res_ids, chain_ids, elements, is_hetero): (
            Vec<[f32; 3]>,
            Vec<String>,
            Vec<String>,
            Vec<i32>,
            Vec<String>,
            Vec<String>,
            Vec<bool>,
        ) = pdb_data
            .chains()
            .flat_map(|chain| {
                let chain_id = chain.id().to_string();
                chain.residues().flat_map(move |residue| {
                    let (res_number, _insertion_code) = residue.id();
                    let res_id = res_number as i32;
                    let res_name = residue.name().unwrap_or_default().to_string();
                    let chain_id = chain_id.clone();
                    residue.atoms().map(move |atom| {
                        let (x, y, z) = atom.pos();
                        (
                            [x as f32, y as f32, z as f32],
                            atom.name().to_string(),
                            res_name.clone(),
                            res_id,
                            chain_id.clone(),
                            atom.element()
                                .map(|element| element.symbol().to_string())
                                .unwrap_or_default(),
                            atom.hetero(),
                        )
                    })
                })
            })
            .multiunzip();

        AtomArray {
            coords,
            atom_names,
            res_names,
            res_ids,
            chain_ids,
            elements,
            is_hetero,
        }
    }
}

impl AtomArray {
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Parses raw structure file contents, gzipped or not.
    pub fn from_structure(contents: &[u8], format: StructureFormat) -> Result<Self> {
        let pdb = if crate::format::is_gzipped(contents) {
            format.parse(&gunzip(contents)?)?
        } else {
            format.parse(contents)?
        };
        let atoms = AtomArray::from(&pdb);
        if atoms.is_empty() {
            return Err(StructureError::Empty);
        }
        Ok(atoms)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (format, _) = StructureFormat::from_path(path)
            .ok_or_else(|| StructureError::UnsupportedFormat(path.display().to_string()))?;
        let contents = std::fs::read(path).map_err(|e| StructureError::io(path, e))?;
        Self::from_structure(&contents, format)
    }

    /// Keeps the `N`, `CA`, `C` and `O` atoms of polymer residues.
    pub fn backbone(&self) -> AtomArray {
        let mask: Vec<bool> = izip!(&self.atom_names, &self.is_hetero)
            .map(|(name, hetero)| !hetero && BACKBONE_ATOMS.contains(&name.as_str()))
            .collect();
        self.select(&mask)
    }

    fn select(&self, mask: &[bool]) -> AtomArray {
        fn keep<T: Clone>(column: &[T], mask: &[bool]) -> Vec<T> {
            column
                .iter()
                .zip(mask)
                .filter(|(_, keep)| **keep)
                .map(|(value, _)| value.clone())
                .collect()
        }
        AtomArray {
            coords: keep(&self.coords, mask),
            atom_names: keep(&self.atom_names, mask),
            res_names: keep(&self.res_names, mask),
            res_ids: keep(&self.res_ids, mask),
            chain_ids: keep(&self.chain_ids, mask),
            elements: keep(&self.elements, mask),
            is_hetero: keep(&self.is_hetero, mask),
        }
    }

    pub fn residue_count(&self) -> usize {
        izip!(&self.chain_ids, &self.res_ids).dedup().count()
    }

    /// Stored layout of an atom array: one list per annotation.
    pub fn storage_features() -> Features {
        let list = |dtype| SchemaNode::sequence(SchemaNode::value(dtype));
        Features::new()
            .with(
                "coords",
                SchemaNode::sequence(SchemaNode::sequence_with_length(
                    SchemaNode::value(Dtype::Float32),
                    3,
                )),
            )
            .with("atom_name", list(Dtype::String))
            .with("res_name", list(Dtype::String))
            .with("res_id", list(Dtype::Int32))
            .with("chain_id", list(Dtype::String))
            .with("element", list(Dtype::String))
            .with("is_hetero", list(Dtype::Bool))
    }

    pub fn to_example(&self) -> Example {
        let strings = |column: &[String]| {
            Example::List(column.iter().map(|s| Example::from(s.as_str())).collect())
        };
        Example::map([
            (
                "coords",
                Example::List(
                    self.coords
                        .iter()
                        .map(|xyz| Example::from(xyz.to_vec()))
                        .collect(),
                ),
            ),
            ("atom_name", strings(&self.atom_names)),
            ("res_name", strings(&self.res_names)),
            (
                "res_id",
                Example::List(self.res_ids.iter().map(|&id| Example::from(id)).collect()),
            ),
            ("chain_id", strings(&self.chain_ids)),
            ("element", strings(&self.elements)),
            (
                "is_hetero",
                Example::List(self.is_hetero.iter().map(|&h| Example::from(h)).collect()),
            ),
        ])
    }

    /// Rebuilds an atom array from its stored map, checking that all columns agree in length.
    pub fn from_example(example: &Example) -> Result<Self> {
        let coords = column(example, "coords")?
            .iter()
            .map(|xyz| match xyz.as_list() {
                Some([x, y, z]) => match (x.as_f64(), y.as_f64(), z.as_f64()) {
                    (Some(x), Some(y), Some(z)) => Ok([x as f32, y as f32, z as f32]),
                    _ => Err(FeatureError::mismatch("three numeric coordinates", "non-numeric values").into()),
                },
                _ => Err(FeatureError::mismatch("a coordinate triple", xyz.kind()).into()),
            })
            .collect::<Result<Vec<_>>>()?;

        let atoms = AtomArray {
            atom_names: strings(example, "atom_name")?,
            res_names: strings(example, "res_name")?,
            res_ids: column(example, "res_id")?
                .iter()
                .map(|id| {
                    id.as_i64()
                        .map(|id| id as i32)
                        .ok_or_else(|| FeatureError::mismatch("int", id.kind()).into())
                })
                .collect::<Result<Vec<_>>>()?,
            chain_ids: strings(example, "chain_id")?,
            elements: strings(example, "element")?,
            is_hetero: column(example, "is_hetero")?
                .iter()
                .map(|flag| match flag {
                    Example::Bool(b) => Ok(*b),
                    other => Err(FeatureError::mismatch("bool", other.kind()).into()),
                })
                .collect::<Result<Vec<_>>>()?,
            coords,
        };
        atoms.check_lengths()?;
        Ok(atoms)
    }

    fn check_lengths(&self) -> Result<()> {
        let expected = self.coords.len();
        let lengths = [
            ("atom_name", self.atom_names.len()),
            ("res_name", self.res_names.len()),
            ("res_id", self.res_ids.len()),
            ("chain_id", self.chain_ids.len()),
            ("element", self.elements.len()),
            ("is_hetero", self.is_hetero.len()),
        ];
        match lengths.into_iter().find(|(_, len)| *len != expected) {
            Some((column, len)) => Err(StructureError::ColumnLength {
                column,
                len,
                expected,
            }),
            None => Ok(()),
        }
    }
}

fn column<'a>(example: &'a Example, name: &'static str) -> Result<&'a [Example]> {
    match example.get(name) {
        Some(Example::List(items)) => Ok(items),
        Some(other) => Err(FeatureError::mismatch(format!("list for `{name}`"), other.kind()).into()),
        None => Err(StructureError::MissingColumn(name)),
    }
}

fn strings(example: &Example, name: &'static str) -> Result<Vec<String>> {
    column(example, name)?
        .iter()
        .map(|value| {
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| FeatureError::mismatch("string", value.kind()).into())
        })
        .collect()
}
