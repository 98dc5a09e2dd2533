use assert_cmd::Command;
use biodatasets_features::Example;
use biodatasets_hub::Dataset;
use biodatasets_structure::structure_registry;
use biodatasets_test_data::TestFile;
use std::fs;
use std::path::Path;

fn write_matrix(dir: &Path) -> String {
    let path = dir.join("expression.csv");
    fs::write(&path, "cell_id,GAS1,ACTB,TP53\nc1,0.5,1.0,0\nc2,1.5,0,2.0\n").unwrap();
    path.to_string_lossy().into_owned()
}

fn saved_rows(output: &Path) -> Vec<Example> {
    let shard = output.join("default").join("train-00000-of-00001.parquet");
    let dataset = Dataset::from_parquet_files([shard], "train", &structure_registry()).unwrap();
    dataset.iter_encoded().map(Result::unwrap).collect()
}

#[test]
fn test_help() {
    let mut cmd = Command::cargo_bin("upload-sc-rna-seq").unwrap();
    let assert = cmd.arg("--help").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(stdout.contains("--pair_codes"));
    assert!(stdout.contains("--pdb_download_dir"));
}

#[test]
fn test_local_output() {
    let work = tempfile::tempdir().unwrap();
    let pdb_dir = work.path().join("pdb");
    TestFile::protein_pdb().write_to(&pdb_dir, "gas1").unwrap();
    TestFile::protein_cif().write_to(&pdb_dir, "ACTB").unwrap();
    let output = work.path().join("out");

    let mut cmd = Command::cargo_bin("upload-sc-rna-seq").unwrap();
    cmd.arg("--sc_data_path")
        .arg(write_matrix(work.path()))
        .arg("--pdb_download_dir")
        .arg(&pdb_dir)
        .arg("--temp_dir")
        .arg(work.path().join("tmp"))
        .arg("--compress")
        .arg("--remove_cif")
        .arg("--output_dir")
        .arg(&output);
    cmd.assert().success();

    assert!(output.join("README.md").exists());
    let rows = saved_rows(&output);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get("id"), Some(&Example::from("GAS1")));
    assert_eq!(
        rows[0].get("expression"),
        Some(&Example::List(vec![Example::Float(0.5), Example::Float(1.5)]))
    );
    let structure = rows[0].get("structure").unwrap();
    assert_eq!(structure.get("path").unwrap().as_str(), Some("gas1.pdb"));
    assert_eq!(rows[1].get("structure").unwrap().get("format").unwrap().as_str(), Some("cif"));
    assert!(rows[2].get("structure").unwrap().is_null());

    assert!(pdb_dir.join("gas1.pdb").exists());
    assert!(!pdb_dir.join("ACTB.cif").exists());
}

#[test]
fn test_pair_codes_filter_structures() {
    let work = tempfile::tempdir().unwrap();
    let pdb_dir = work.path().join("pdb");
    TestFile::protein_pdb().write_to(&pdb_dir, "gas1").unwrap();
    let output = work.path().join("out");

    let mut cmd = Command::cargo_bin("upload-sc-rna-seq").unwrap();
    cmd.arg("--sc_data_path")
        .arg(write_matrix(work.path()))
        .arg("--pdb_download_dir")
        .arg(&pdb_dir)
        .arg("--pair_codes")
        .arg("zz")
        .arg("--as_array")
        .arg("--output_dir")
        .arg(&output);
    cmd.assert().success();

    let rows = saved_rows(&output);
    assert!(rows.iter().all(|row| row.get("structure").unwrap().is_null()));
}

#[test]
fn test_missing_matrix_fails() {
    let work = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("upload-sc-rna-seq").unwrap();
    cmd.arg("--sc_data_path")
        .arg(work.path().join("missing.csv"))
        .arg("--pdb_download_dir")
        .arg(work.path().join("pdb"))
        .arg("--output_dir")
        .arg(work.path().join("out"));
    cmd.assert().failure();
    assert!(work.path().join("pdb").is_dir());
}
