use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = Command::new(cargo_bin!("psd2flow"));
    cmd.arg("--cache-dir")
        .arg(dir.path())
        .arg("--db-path")
        .arg(dir.path().join("some_db"))
        .args(["show", "--step", "consent-creation"]);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains(
            "'storage-rocksdb' feature is not enabled. Falling back to the JSON file cache.",
        ));
    assert!(!dir.path().join("some_db").exists());
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("psd2flow"));
    cmd.arg("--cache-dir")
        .arg(dir.path())
        .arg("--db-path")
        .arg(&db_path)
        .args(["show", "--step", "consent-creation"]);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING").not());
    assert!(db_path.exists());
}
