#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

const FENCED_ANSWER: &str =
    r#"["sh", "-c", "cat > /dev/null; printf '```rust\nfn main() {}\n```\n'"]"#;

#[allow(deprecated)]
fn shadow_sync(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("shadow-sync").expect("binary");
    cmd.current_dir(root)
        .env_remove("SHADOW_SYNC_GENERATOR")
        .env_remove("SHADOW_SYNC_DEBOUNCE_MS")
        .arg("--quiet");
    cmd
}

fn setup_project() -> (TempDir, PathBuf) {
    let temp = tempdir().expect("tempdir");
    let root = temp.path().canonicalize().expect("canonical root");
    fs::create_dir_all(root.join("src")).expect("mkdir");
    fs::write(root.join("src/main.rs"), "").expect("write target");
    (temp, root)
}

fn shadow_path(root: &Path) -> PathBuf {
    root.join(".shadows/src/main.rs.shadow")
}

#[test]
fn open_prints_the_shadow_path_and_creates_it() {
    let (_temp, root) = setup_project();
    shadow_sync(&root)
        .args(["open", "src/main.rs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("main.rs.shadow"));
    assert!(shadow_path(&root).is_file());
}

#[test]
fn convert_writes_the_target_then_short_circuits() {
    let (_temp, root) = setup_project();
    shadow_sync(&root).args(["open", "src/main.rs"]).assert().success();
    fs::write(shadow_path(&root), "an empty main function").expect("edit shadow");

    shadow_sync(&root)
        .args(["diff", "src/main.rs"])
        .assert()
        .success()
        .stdout("+ an empty main function\n");

    let output = shadow_sync(&root)
        .env("SHADOW_SYNC_GENERATOR", FENCED_ANSWER)
        .args(["convert", "--json", "src/main.rs"])
        .output()
        .expect("run convert");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["outcome"]["kind"], "converted");
    assert_eq!(report["dependencies"]["kind"], "skipped");
    assert_eq!(
        fs::read_to_string(root.join("src/main.rs")).expect("target"),
        "fn main() {}"
    );

    shadow_sync(&root)
        .env("SHADOW_SYNC_GENERATOR", FENCED_ANSWER)
        .args(["convert", "src/main.rs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unchanged"));
}

#[test]
fn convert_without_a_generator_fails_and_keeps_the_checkpoint() {
    let (_temp, root) = setup_project();
    shadow_sync(&root).args(["open", "src/main.rs"]).assert().success();
    fs::write(shadow_path(&root), "print hello").expect("edit shadow");

    shadow_sync(&root)
        .args(["convert", "src/main.rs"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no generator command"));

    shadow_sync(&root)
        .args(["diff", "src/main.rs"])
        .assert()
        .success()
        .stdout("+ print hello\n");
}

#[test]
fn generator_comes_from_the_config_file() {
    let (_temp, root) = setup_project();
    fs::write(
        root.join("shadow-sync.toml"),
        "[generator]\ncommand = [\"sh\", \"-c\", \"cat > /dev/null; echo 'fn main() { run(); }'\"]\n",
    )
    .expect("config");
    shadow_sync(&root).args(["open", "src/main.rs"]).assert().success();
    fs::write(shadow_path(&root), "call run").expect("edit shadow");

    shadow_sync(&root)
        .args(["convert", &shadow_path(&root).to_string_lossy()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    assert_eq!(
        fs::read_to_string(root.join("src/main.rs")).expect("target"),
        "fn main() { run(); }"
    );
}

#[test]
fn cleanup_reports_removed_ghosts() {
    let (_temp, root) = setup_project();
    fs::write(root.join("src/lib.rs"), "").expect("write lib");
    shadow_sync(&root).args(["open", "src/main.rs"]).assert().success();
    shadow_sync(&root).args(["open", "src/lib.rs"]).assert().success();
    fs::remove_file(root.join(".shadows/src/lib.rs.shadow")).expect("delete shadow");

    let output = shadow_sync(&root)
        .args(["cleanup", "--json"])
        .output()
        .expect("run cleanup");
    assert!(output.status.success());
    let removed: Vec<String> = serde_json::from_slice(&output.stdout).expect("json list");
    assert_eq!(removed.len(), 1);
    assert!(removed[0].ends_with("lib.rs.shadow"));

    shadow_sync(&root)
        .arg("cleanup")
        .assert()
        .success()
        .stdout("Removed 0 ghost checkpoint(s)\n");
}

#[test]
fn paths_outside_the_root_are_rejected() {
    let (_temp, root) = setup_project();
    let elsewhere = tempdir().expect("tempdir");
    fs::write(elsewhere.path().join("x.rs"), "").expect("write");
    shadow_sync(&root)
        .arg("open")
        .arg(elsewhere.path().join("x.rs"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside the project root"));
}
