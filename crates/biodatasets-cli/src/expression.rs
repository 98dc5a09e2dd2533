//! Single-cell expression matrices.
use anyhow::{Context, Result};
use polars::prelude::{Column, CsvReadOptions, DataType, SerReader};
use std::path::Path;
use tracing::info;

/// Expression of one gene across all cells.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneExpression {
    pub gene: String,
    pub values: Vec<Option<f32>>,
}

/// Leading columns naming cells rather than genes, recognised by header only.
fn is_cell_index(column: &Column) -> bool {
    let name = column.name().as_str();
    name.is_empty() || name.eq_ignore_ascii_case("cell_id") || name.starts_with("Unnamed")
}

/// Reads a CSV matrix with one row per cell and one column per gene.
pub fn read_expression_matrix(path: &Path) -> Result<Vec<GeneExpression>> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .with_context(|| format!("failed to read expression matrix {}", path.display()))?;

    let columns = df.get_columns();
    let skip = usize::from(columns.first().is_some_and(is_cell_index));
    let genes = columns[skip..]
        .iter()
        .map(|column| {
            let series = column
                .as_materialized_series()
                .strict_cast(&DataType::Float64)
                .with_context(|| format!("gene column `{}` is not numeric", column.name()))?;
            let values = series.f64()?.into_iter().map(|v| v.map(|v| v as f32)).collect();
            Ok(GeneExpression {
                gene: column.name().to_string(),
                values,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    info!(path = %path.display(), cells = df.height(), genes = genes.len(), "read expression matrix");
    Ok(genes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_reads_genes_and_skips_cell_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expr.csv");
        fs::write(&path, "cell_id,GAS1,ACTB\nc1,0.5,1\nc2,,2\n").unwrap();
        let genes = read_expression_matrix(&path).unwrap();
        assert_eq!(genes.len(), 2);
        assert_eq!(genes[0].gene, "GAS1");
        assert_eq!(genes[0].values, vec![Some(0.5), None]);
        assert_eq!(genes[1].values, vec![Some(1.0), Some(2.0)]);
    }

    #[test]
    fn test_non_numeric_gene_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expr.csv");
        fs::write(&path, "GAS1,ACTB\nx,2\n1,3\n").unwrap();
        let err = read_expression_matrix(&path).unwrap_err();
        assert!(format!("{err:#}").contains("GAS1"));
    }

    #[test]
    fn test_string_cell_ids_need_an_index_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expr.csv");
        fs::write(&path, "Unnamed: 0,GAS1\nc1,1\nc2,2\n").unwrap();
        let genes = read_expression_matrix(&path).unwrap();
        assert_eq!(genes.len(), 1);
        assert_eq!(genes[0].gene, "GAS1");

        fs::write(&path, "barcode,GAS1\nc1,1\n").unwrap();
        assert!(read_expression_matrix(&path).is_err());
    }

    #[test]
    fn test_matrix_without_cell_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expr.csv");
        fs::write(&path, "GAS1,ACTB\n1,2\n").unwrap();
        let genes = read_expression_matrix(&path).unwrap();
        assert_eq!(genes.iter().map(|g| g.gene.as_str()).collect::<Vec<_>>(), ["GAS1", "ACTB"]);
    }
}
