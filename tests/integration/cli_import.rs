#![allow(missing_docs)]

#[path = "../common/mod.rs"]
mod common;

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

use common::{sample_tree, write_file};

const FIXTURES: &str = r#"
[[repositories]]
id = "r1"
name = "Repository One"

[[users]]
id = "u1"
name = "User One"
"#;

struct Workspace {
    dir: TempDir,
    db: PathBuf,
    data: PathBuf,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let db = dir.path().join("graph.db");
        let data = dir.path().join("data");
        let config = dir.path().join("cli.toml");
        sample_tree(&data);
        fs::write(dir.path().join("fixtures.toml"), FIXTURES).expect("write fixtures");
        Self {
            dir,
            db,
            data,
            config,
        }
    }

    fn fixtures(&self) -> PathBuf {
        self.dir.path().join("fixtures.toml")
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("arbor");
        cmd.env("ARBOR_CONFIG", &self.config)
            .env_remove("ARBOR_DB")
            .env_remove("RUST_LOG")
            .arg("--theme")
            .arg("plain");
        cmd
    }

    fn json(&self, args: &[&str], db: Option<&Path>) -> Value {
        let mut cmd = self.cmd();
        if let Some(db) = db {
            cmd.arg("--db").arg(db);
        }
        let output = cmd
            .args(["--format", "json"])
            .args(args)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&output).expect("valid json")
    }

    fn seed(&self) {
        self.cmd().arg("--db").arg(&self.db).arg("init").assert().success();
        self.cmd()
            .arg("--db")
            .arg(&self.db)
            .arg("load-fixtures")
            .arg(self.fixtures())
            .assert()
            .success();
    }
}

#[test]
fn init_creates_empty_database() {
    let ws = Workspace::new();
    let json = ws.json(&["init"], Some(&ws.db));
    assert!(ws.db.exists());
    assert_eq!(json["documentary_units"], 0);
    assert_eq!(json["events"], 0);
}

#[test]
fn load_fixtures_is_idempotent() {
    let ws = Workspace::new();
    let fixtures = ws.fixtures();
    let fixtures = fixtures.to_str().expect("utf-8 path");
    let first = ws.json(&["load-fixtures", fixtures], Some(&ws.db));
    let second = ws.json(&["load-fixtures", fixtures], Some(&ws.db));
    assert_eq!(first["created"], 2);
    assert_eq!(second["created"], 0);
    assert_eq!(second["existing"], 2);
}

#[test]
fn import_reports_counts_and_stats_reflect_them() {
    let ws = Workspace::new();
    ws.seed();
    let data = ws.data.to_str().expect("utf-8 path");

    let report = ws.json(
        &["import", data, "--repository", "r1", "--user", "u1"],
        Some(&ws.db),
    );
    assert_eq!(report["created"], 3);
    assert_eq!(report["updated"], 0);
    assert_eq!(report["layout"], "hierarchical");

    let again = ws.json(
        &["import", data, "--repository", "r1", "--user", "u1", "--commit-every", "1"],
        Some(&ws.db),
    );
    assert_eq!(again["created"], 0);
    assert_eq!(again["updated"], 3);

    let stats = ws.json(&["stats"], Some(&ws.db));
    assert_eq!(stats["repositories"], 1);
    assert_eq!(stats["users"], 1);
    assert_eq!(stats["documentary_units"], 3);
    assert_eq!(stats["events"], 2);
}

#[test]
fn text_output_summarizes_import() {
    let ws = Workspace::new();
    ws.seed();
    let output = ws
        .cmd()
        .arg("--db")
        .arg(&ws.db)
        .arg("import")
        .arg(&ws.data)
        .args(["--repository", "r1", "--user", "u1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf-8");
    assert!(text.contains("Imported 3 items, updated 0 items"), "{text}");
}

#[test]
fn unknown_user_fails_without_writing() {
    let ws = Workspace::new();
    ws.seed();
    let output = ws
        .cmd()
        .arg("--db")
        .arg(&ws.db)
        .arg("import")
        .arg(&ws.data)
        .args(["--repository", "r1", "--user", "ghost"])
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).expect("utf-8");
    assert!(stderr.contains("error: user 'ghost' not found"), "{stderr}");

    let stats = ws.json(&["stats"], Some(&ws.db));
    assert_eq!(stats["documentary_units"], 0);
    assert_eq!(stats["events"], 0);
}

#[test]
fn malformed_record_rolls_back_the_whole_import() {
    let ws = Workspace::new();
    ws.seed();
    write_file(&ws.data, "002/irn011.xml", "<ead><archdesc><did>");

    ws.cmd()
        .arg("--db")
        .arg(&ws.db)
        .arg("import")
        .arg(&ws.data)
        .args(["--repository", "r1", "--user", "u1"])
        .assert()
        .failure()
        .code(1);

    let stats = ws.json(&["stats"], Some(&ws.db));
    assert_eq!(stats["documentary_units"], 0);
    assert_eq!(stats["events"], 0);
}

#[test]
fn config_file_supplies_database_and_import_defaults() {
    let ws = Workspace::new();
    fs::write(
        &ws.config,
        format!(
            "[database]\ndefault = {:?}\n\n[import]\nlayout = \"flat\"\nsource = \"USHMM\"\n",
            ws.db.display().to_string()
        ),
    )
    .expect("write config");
    ws.seed();

    let data = ws.data.to_str().expect("utf-8 path");
    let report = ws.json(&["import", data, "--repository", "r1", "--user", "u1"], None);
    assert_eq!(report["layout"], "flat");
    assert_eq!(report["created"], 2);

    let report = ws.json(
        &["import", data, "--repository", "r1", "--user", "u1", "--layout", "hierarchical"],
        None,
    );
    assert_eq!(report["layout"], "hierarchical");
    assert_eq!(report["created"], 1);
    assert_eq!(report["updated"], 2);
}

#[test]
fn missing_database_is_reported() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("stats")
        .assert()
        .failure()
        .code(1);
}
