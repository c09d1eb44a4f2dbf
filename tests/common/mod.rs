#![allow(dead_code)]

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create a fresh temporary database, returning the connection, dir handle, and db path.
/// The caller must hold onto `TempDir` to keep the temp directory alive.
pub fn setup_db() -> (Connection, TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let conn = covtrend::db::open(&db_path).unwrap();
    covtrend::db::init_schema(&conn).unwrap();
    (conn, dir, db_path)
}

/// Path of a document under `tests/fixtures`.
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Write a single-environment document with the given root and unit
/// statement coverage into `dir`.
pub fn write_statement_doc(dir: &Path, name: &str, covered: u32, total: u32) -> PathBuf {
    let path = dir.join(name);
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<report>
  <version value="2"/>
  <coverage type="statement, %" value="{covered}/{total}"/>
  <coverage type="branch, %" value="1/2"/>
  <environment name="ENV">
    <unit name="file.c">
      <coverage type="statement, %" value="{covered}/{total}"/>
    </unit>
  </environment>
</report>
"#
    );
    std::fs::write(&path, xml).unwrap();
    path
}
