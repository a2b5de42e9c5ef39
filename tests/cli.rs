use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::tempdir;

fn loader_command(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("corpus-loader").expect("Binary exists");
    // An isolated cwd keeps any developer .env out of the picture.
    cmd.current_dir(dir.path())
        .env_clear()
        .env("TRACKER_DB_PATH", dir.path().join("tracker.db"))
        .env("CORPUS_BASE_URL", "http://127.0.0.1:1")
        .env("CORPUS_NAME", "docs")
        .env("CORPUS_API_KEY", "test-key");
    cmd
}

#[test]
fn run_fails_when_required_env_is_missing() {
    let dir = tempdir().expect("tempdir");
    let manifest = dir.path().join("plugins.yml");
    write(&manifest, "plugins: []\n").expect("manifest written");

    let mut cmd = Command::cargo_bin("corpus-loader").expect("Binary exists");
    cmd.current_dir(dir.path())
        .env_clear()
        .arg("run")
        .arg("--manifest")
        .arg(&manifest);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("CORPUS_BASE_URL"));
}

#[test]
fn run_fails_when_manifest_is_missing() {
    let dir = tempdir().expect("tempdir");

    let mut cmd = loader_command(&dir);
    cmd.arg("run")
        .arg("--manifest")
        .arg(dir.path().join("nope.yml"));

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("manifest"));
}

#[test]
fn run_succeeds_with_an_empty_manifest() {
    let dir = tempdir().expect("tempdir");
    let manifest = dir.path().join("plugins.yml");
    write(&manifest, "plugins: []\n").expect("manifest written");

    let mut cmd = loader_command(&dir);
    cmd.arg("run").arg("--manifest").arg(&manifest);

    // Zero plugins means zero work and a clean exit; the tracker db is
    // still created, proving the store came up.
    cmd.assert().success();
    assert!(
        dir.path().join("tracker.db").exists(),
        "Version store should be initialised on startup"
    );
}

#[test]
fn run_succeeds_even_when_every_plugin_entry_is_broken() {
    let dir = tempdir().expect("tempdir");
    let manifest = dir.path().join("plugins.yml");
    write(
        &manifest,
        r#"
plugins:
  - name: ghost
    classname: NoSuchClass
  - name: misconfigured
    classname: MigrationTracker
    config:
      sheet_id: "only-this"
"#,
    )
    .expect("manifest written");

    let mut cmd = loader_command(&dir);
    cmd.arg("run").arg("--manifest").arg(&manifest);

    // Per-entry problems are isolated; the pass still completes.
    cmd.assert().success();
}
