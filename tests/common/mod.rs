#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::{TempDir, tempdir};
use vizbind::{
    lineage::Trigger,
    table::{Derivation, Row, Table, build_table},
};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

/// Row objects from a JSON array literal.
pub fn rows(values: Value) -> Vec<Row> {
    serde_json::from_value(values).expect("rows are objects")
}

pub fn table(id: &str, values: Value) -> Table {
    build_table(id, &rows(values), true, None)
}

/// A table derived from `source` by `instruction`.
pub fn derived_table(id: &str, source: &str, instruction: &str, values: Value) -> Table {
    let derive = Derivation {
        source: vec![source.to_string()],
        code: String::new(),
        explanation: None,
        dialog: Vec::new(),
        trigger: Trigger::new(source, instruction, id),
    };
    build_table(id, &rows(values), false, Some(derive))
}

pub const POPULATION_CSV: &str = "\
Country,Sex,Age,Population
Norway,F,0-9,310000
Norway,M,0-9,325000
Norway,F,10-19,300000
Norway,M,10-19,318000
Norway,M,20-29,352000
";
