//! End-to-end tests for the template render/run/publish lifecycle

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DESCRIPTOR: &str = r#"
id: rnaseq
description: Minimal RNA-seq scaffold
params:
  sample_id:
    type: str
    required: true
  threads:
    type: int
    default: 4
render:
  into: "${ctx.project.name}/${ctx.template.id}"
  files:
    - "run.sh.tera -> run.sh"
    - "samples.csv -> samples.csv"
run:
  entry: run.sh
  args: ["${ctx.params.sample_id}"]
  env:
    THREADS: "${ctx.params.threads}"
publish:
  report: resolvers.paths:report
"#;

fn scaffold_store(root: &Path) {
    fs::create_dir_all(root.join("templates/rnaseq")).unwrap();
    fs::create_dir_all(root.join("workflows/qc_summary")).unwrap();
    fs::create_dir_all(root.join("resolvers")).unwrap();
    fs::write(
        root.join("store.yaml"),
        "id: genomics\nname: Genomics Templates\nversion: \"1.4.0\"\n",
    )
    .unwrap();
    fs::write(root.join("templates/rnaseq/template.yaml"), DESCRIPTOR).unwrap();
    fs::write(
        root.join("templates/rnaseq/run.sh.tera"),
        "#!/bin/sh\necho \"processing $1 with $THREADS threads\"\n",
    )
    .unwrap();
    fs::write(root.join("templates/rnaseq/samples.csv"), "sample,lane\n").unwrap();
    fs::write(
        root.join("resolvers/paths.sh"),
        "#!/bin/sh\nprintf '\"local:/out/report.html\"'\n",
    )
    .unwrap();
    fs::write(
        root.join("workflows/qc_summary/workflow.yaml"),
        "id: qc_summary\nrender:\n  files:\n    - \"summary.sh.tera -> summary.sh\"\nrun:\n  entry: summary.sh\n",
    )
    .unwrap();
    fs::write(
        root.join("workflows/qc_summary/summary.sh.tera"),
        "#!/bin/sh\necho \"qc summary for {{ ctx.project.name }}\"\n",
    )
    .unwrap();
}

struct Fixture {
    temp: TempDir,
    cache: PathBuf,
    project: PathBuf,
}

fn fixture() -> Fixture {
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
    Fixture {
        temp,
        cache,
        project,
    }
}

fn biopm(cache: &Path) -> Command {
    let mut cmd = Command::cargo_bin("biopm").unwrap();
    cmd.env("BIOPM_CACHE", cache);
    cmd
}

#[test]
fn test_render_run_publish_lifecycle() {
    let fx = fixture();

    biopm(&fx.cache)
        .args(["template", "render", "rnaseq", "--param", "sample_id=S42", "--dir"])
        .arg(&fx.project)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 2 file(s)"))
        .stdout(predicate::str::contains("run.sh"));

    let target = fx.project.join("rnaseq");
    let run_sh = fs::read_to_string(target.join("run.sh")).unwrap();
    assert!(run_sh.contains("processing"));
    assert!(target.join("samples.csv").exists());

    let state = fs::read_to_string(fx.project.join("project.yaml")).unwrap();
    assert!(state.contains("status: active"));
    assert!(state.contains("sample_id: S42"));
    assert!(state.contains("threads: 4"));

    biopm(&fx.cache)
        .args(["template", "run", "rnaseq", "--dir"])
        .arg(&fx.project)
        .assert()
        .success()
        .stdout(predicate::str::contains("processing S42 with 4 threads"));
    let state = fs::read_to_string(fx.project.join("project.yaml")).unwrap();
    assert!(state.contains("status: completed"));

    biopm(&fx.cache)
        .args(["template", "publish", "rnaseq", "--dir"])
        .arg(&fx.project)
        .assert()
        .success()
        .stdout(predicate::str::contains("report: \"local:/out/report.html\""));
    let state = fs::read_to_string(fx.project.join("project.yaml")).unwrap();
    assert!(state.contains("report: local:/out/report.html"));
}

#[test]
fn test_render_missing_required_param_fails() {
    let fx = fixture();
    biopm(&fx.cache)
        .args(["template", "render", "rnaseq", "--dir"])
        .arg(&fx.project)
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required parameters"))
        .stderr(predicate::str::contains("sample_id"));
    assert!(!fx.project.join("rnaseq").exists());
}

#[test]
fn test_render_dry_run_writes_nothing() {
    let fx = fixture();
    biopm(&fx.cache)
        .args([
            "template", "render", "rnaseq", "--param", "sample_id=S42", "--dry-run", "--dir",
        ])
        .arg(&fx.project)
        .assert()
        .success()
        .stdout(predicate::str::contains("Would write 2 file(s)"));
    assert!(!fx.project.join("rnaseq").exists());
    let state = fs::read_to_string(fx.project.join("project.yaml")).unwrap();
    assert!(!state.contains("rnaseq"));
}

#[test]
fn test_render_with_alias_creates_second_instance() {
    let fx = fixture();
    biopm(&fx.cache)
        .args(["template", "render", "rnaseq", "--param", "sample_id=S1", "--dir"])
        .arg(&fx.project)
        .assert()
        .success();
    biopm(&fx.cache)
        .args([
            "template",
            "render",
            "rnaseq",
            "--param",
            "sample_id=S2",
            "--alias",
            "rnaseq_batch2",
            "--dir",
        ])
        .arg(&fx.project)
        .assert()
        .success();

    assert!(fx.project.join("rnaseq/run.sh").exists());
    assert!(fx.project.join("rnaseq_batch2/run.sh").exists());
    let state = fs::read_to_string(fx.project.join("project.yaml")).unwrap();
    assert!(state.contains("id: rnaseq_batch2"));
    assert!(state.contains("sample_id: S1"));
    assert!(state.contains("sample_id: S2"));
}

#[test]
fn test_run_before_render_fails() {
    let fx = fixture();
    biopm(&fx.cache)
        .args(["template", "run", "rnaseq", "--dir"])
        .arg(&fx.project)
        .assert()
        .failure()
        .stderr(predicate::str::contains("render"));
}

#[test]
fn test_unknown_template_fails() {
    let fx = fixture();
    biopm(&fx.cache)
        .args(["template", "render", "nope", "--dir"])
        .arg(&fx.project)
        .assert()
        .failure()
        .stderr(predicate::str::contains("template 'nope' not found"));
}

#[test]
fn test_adhoc_render_and_adopt() {
    let fx = fixture();
    let out = fx.temp.path().join("rnaseq_adhoc");

    biopm(&fx.cache)
        .args([
            "template", "render", "rnaseq", "--param", "sample_id=S42", "--out",
        ])
        .arg(&out)
        .assert()
        .success();
    assert!(out.join("run.sh").exists());
    assert!(out.join("biopm.meta.yaml").exists());

    biopm(&fx.cache)
        .args(["template", "run", "rnaseq", "--out"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("processing S42"));
    let meta = fs::read_to_string(out.join("biopm.meta.yaml")).unwrap();
    assert!(meta.contains("status: completed"));

    biopm(&fx.cache)
        .args(["project", "adopt", "--from"])
        .arg(&out)
        .arg("--dir")
        .arg(&fx.project)
        .assert()
        .success()
        .stdout(predicate::str::contains("rnaseq_adhoc: added"));
    assert!(fx.project.join("rnaseq_adhoc/run.sh").exists());
}

#[test]
fn test_adhoc_run_and_publish_require_prior_render() {
    let fx = fixture();
    let out = fx.temp.path().join("never_rendered");
    fs::create_dir_all(&out).unwrap();

    biopm(&fx.cache)
        .args(["template", "publish", "rnaseq", "--out"])
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not an ad-hoc output directory"));
    assert!(!out.join("biopm.meta.yaml").exists());

    biopm(&fx.cache)
        .args(["template", "run", "rnaseq", "--out"])
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not an ad-hoc output directory"));
    assert!(!out.join("biopm.meta.yaml").exists());
}

#[test]
fn test_workflow_render_and_run() {
    let fx = fixture();

    biopm(&fx.cache)
        .args(["workflow", "render", "qc_summary", "--dir"])
        .arg(&fx.project)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 1 file(s)"));
    assert!(fx.project.join("qc_summary/summary.sh").exists());

    biopm(&fx.cache)
        .args(["workflow", "run", "qc_summary", "--dir"])
        .arg(&fx.project)
        .assert()
        .success()
        .stdout(predicate::str::contains("qc summary for 250903_TEST"));

    // workflows never touch the project state
    let state = fs::read_to_string(fx.project.join("project.yaml")).unwrap();
    assert!(!state.contains("qc_summary"));
}

#[test]
fn test_failed_run_is_recorded() {
    let fx = fixture();
    // Swap the cached template body for a failing one.
    let cached = fx.cache.join("stores/genomics/templates/rnaseq/run.sh.tera");
    fs::write(&cached, "#!/bin/sh\necho 'aligner crashed' >&2\nexit 2\n").unwrap();

    biopm(&fx.cache)
        .args(["template", "render", "rnaseq", "--param", "sample_id=S42", "--dir"])
        .arg(&fx.project)
        .assert()
        .success();
    biopm(&fx.cache)
        .args(["template", "run", "rnaseq", "--dir"])
        .arg(&fx.project)
        .assert()
        .failure()
        .stderr(predicate::str::contains("aligner crashed"));

    let state = fs::read_to_string(fx.project.join("project.yaml")).unwrap();
    assert!(state.contains("status: failed"));
    assert!(state.contains("aligner crashed"));
}
