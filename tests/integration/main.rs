//! Integration tests for Weft
//!
//! These drive the `weft` binary against small projects on disk.

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;
use weft_builder::BuilderArtifact;

const USER: &str = "export const userModel = gql.default(({ model }) => model.User({}, () => ({})));\n";

const QUERY: &str = r#"import { userModel } from "./models/user";
export const getUser = gql.default(({ query }) => query.operation({}, () => ({ ...userModel.fragment() })));
"#;

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/models/user.ts", USER);
    write(dir.path(), "src/app.ts", QUERY);
    write(
        dir.path(),
        "weft.toml",
        "entries = [\"src/app.ts\"]\nschema_hash = \"schema-1\"\n",
    );
    dir
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn weft(root: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_weft"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("Failed to execute weft")
}

fn read_artifact(path: &Path) -> BuilderArtifact {
    tokio_test::block_on(BuilderArtifact::read_json(path)).unwrap()
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_weft"))
        .arg("--help")
        .output()
        .expect("Failed to execute weft");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Incremental build engine"));
    assert!(stdout.contains("watch"));
}

#[test]
fn test_build_writes_artifact() {
    let dir = project();
    let output = weft(dir.path(), &["build"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let artifact = read_artifact(&dir.path().join(".weft/artifact.json"));
    assert_eq!(artifact.elements.len(), 2);
    assert_eq!(artifact.report.stats.misses, 2);
    assert_eq!(artifact.meta.as_ref().unwrap().schema_hash, "schema-1");
    assert!(artifact.report.warnings.is_empty());
}

#[test]
fn test_second_build_hits_the_disk_cache() {
    let dir = project();
    assert!(weft(dir.path(), &["build"]).status.success());
    assert!(weft(dir.path(), &["build"]).status.success());

    let artifact = read_artifact(&dir.path().join(".weft/artifact.json"));
    assert_eq!(artifact.report.stats.hits, 2);
    assert_eq!(artifact.report.stats.misses, 0);
}

#[test]
fn test_clear_then_build_misses() {
    let dir = project();
    assert!(weft(dir.path(), &["build"]).status.success());
    assert!(weft(dir.path(), &["clear"]).status.success());
    assert!(!dir.path().join(".weft/snapshots").exists());

    let out = dir.path().join("out.json");
    let out_arg = out.to_string_lossy().to_string();
    assert!(weft(dir.path(), &["build", "--output", &out_arg]).status.success());
    assert_eq!(read_artifact(&out).report.stats.misses, 2);
}

#[test]
fn test_missing_entries_fail() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "weft.toml", "entries = [\"src/*.ts\"]\n");
    let output = weft(dir.path(), &["build"]);
    assert!(!output.status.success());
}
