//! Integration tests for the store and project subcommands

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn scaffold_store(root: &Path) {
    fs::create_dir_all(root.join("templates/hello")).unwrap();
    fs::create_dir_all(root.join("config")).unwrap();
    fs::write(
        root.join("store.yaml"),
        "id: genomics\nname: Genomics Templates\nversion: \"1.4.0\"\n",
    )
    .unwrap();
    fs::write(
        root.join("templates/hello/template.yaml"),
        "id: hello\nrender:\n  files:\n    - \"greeting.txt.tera -> greeting.txt\"\n",
    )
    .unwrap();
    fs::write(root.join("templates/hello/greeting.txt.tera"), "hi\n").unwrap();
    fs::write(
        root.join("config/settings.yaml"),
        "policy:\n  project_name:\n    regex: \"^[0-9]{6}_\"\n    message: must start with YYMMDD_\n",
    )
    .unwrap();
    fs::write(
        root.join("config/authors.yaml"),
        "authors:\n  - id: ckuo\n    name: Chao-Chung Kuo\n",
    )
    .unwrap();
}

fn biopm(cache: &Path) -> Command {
    let mut cmd = Command::cargo_bin("biopm").unwrap();
    cmd.env("BIOPM_CACHE", cache);
    cmd
}

#[test]
fn test_store_add_list_info_remove() {
    let temp = TempDir::new().unwrap();
    let store_dir = temp.path().join("genomics-store");
    scaffold_store(&store_dir);
    let cache = temp.path().join("cache");

    biopm(&cache)
        .args(["store", "add"])
        .arg(&store_dir)
        .arg("--activate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Added store 'genomics' (1.4.0)"))
        .stdout(predicate::str::contains("Active store: genomics"));

    biopm(&cache)
        .args(["store", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("genomics 1.4.0 *"));

    biopm(&cache)
        .args(["store", "info", "genomics"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Version:  1.4.0"));

    biopm(&cache)
        .args(["store", "remove", "genomics"])
        .assert()
        .success();

    biopm(&cache)
        .args(["store", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No stores registered"));
}

#[test]
fn test_store_add_without_manifest_fails() {
    let temp = TempDir::new().unwrap();
    let bad = temp.path().join("not-a-store");
    fs::create_dir_all(&bad).unwrap();

    biopm(&temp.path().join("cache"))
        .args(["store", "add"])
        .arg(&bad)
        .assert()
        .failure()
        .stderr(predicate::str::contains("store.yaml not found"));
}

#[test]
fn test_store_activate_unknown_fails() {
    let temp = TempDir::new().unwrap();
    biopm(&temp.path().join("cache"))
        .args(["store", "activate", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown store id"));
}

#[test]
fn test_project_init_requires_active_store() {
    let temp = TempDir::new().unwrap();
    biopm(&temp.path().join("cache"))
        .args(["project", "init", "250903_TEST"])
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no active resource store"));
}

#[test]
fn test_project_init_enforces_name_policy() {
    let temp = TempDir::new().unwrap();
    let store_dir = temp.path().join("genomics-store");
    scaffold_store(&store_dir);
    let cache = temp.path().join("cache");
    biopm(&cache)
        .args(["store", "add"])
        .arg(&store_dir)
        .arg("--activate")
        .assert()
        .success();

    biopm(&cache)
        .args(["project", "init", "bad_name"])
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("must start with YYMMDD_"));

    biopm(&cache)
        .args(["project", "init", "250903_TEST", "--author", "ckuo"])
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized project '250903_TEST'"));
    assert!(temp.path().join("250903_TEST/project.yaml").exists());

    // re-init is refused
    biopm(&cache)
        .args(["project", "init", "250903_TEST"])
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_project_info_and_status() {
    let temp = TempDir::new().unwrap();
    let store_dir = temp.path().join("genomics-store");
    scaffold_store(&store_dir);
    let cache = temp.path().join("cache");
    biopm(&cache)
        .args(["store", "add"])
        .arg(&store_dir)
        .arg("--activate")
        .assert()
        .success();
    biopm(&cache)
        .args(["project", "init", "250903_TEST"])
        .current_dir(temp.path())
        .assert()
        .success();

    let project = temp.path().join("250903_TEST");
    biopm(&cache)
        .args(["project", "info", "--dir"])
        .arg(&project)
        .assert()
        .success()
        .stdout(predicate::str::contains("Project:  250903_TEST"))
        .stdout(predicate::str::contains("Status:   initiated"));

    biopm(&cache)
        .args(["project", "status", "--dir"])
        .arg(&project)
        .assert()
        .success()
        .stdout(predicate::str::contains("no templates rendered yet"));
}

#[test]
fn test_project_adopt_records_and_copies() {
    let temp = TempDir::new().unwrap();
    let store_dir = temp.path().join("genomics-store");
    scaffold_store(&store_dir);
    let cache = temp.path().join("cache");
    biopm(&cache)
        .args(["store", "add"])
        .arg(&store_dir)
        .arg("--activate")
        .assert()
        .success();
    biopm(&cache)
        .args(["project", "init", "250903_TEST"])
        .current_dir(temp.path())
        .assert()
        .success();

    // an ad-hoc directory rendered elsewhere
    let adhoc = temp.path().join("qc_batch1");
    fs::create_dir_all(&adhoc).unwrap();
    fs::write(adhoc.join("results.txt"), "ok\n").unwrap();
    fs::write(
        adhoc.join("biopm.meta.yaml"),
        concat!(
            "schema_version: 1\n",
            "source:\n",
            "  store_id: genomics\n",
            "  store_version: \"1.4.0\"\n",
            "  template_id: hello\n",
            "status: completed\n",
            "params:\n  sample_id: S42\n",
            "published: {}\n",
        ),
    )
    .unwrap();

    let project = temp.path().join("250903_TEST");
    biopm(&cache)
        .args(["project", "adopt", "--from"])
        .arg(&adhoc)
        .arg("--dir")
        .arg(&project)
        .assert()
        .success()
        .stdout(predicate::str::contains("qc_batch1: added"));

    assert!(project.join("qc_batch1/results.txt").exists());
    let state = fs::read_to_string(project.join("project.yaml")).unwrap();
    assert!(state.contains("qc_batch1"));
    assert!(state.contains("source_template: hello"));
    assert!(state.contains("completed"));
}
