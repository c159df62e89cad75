//! Template rendering.
//!
//! Given a descriptor's file mappings and a resolved context, writes
//! rendered/copied files into the computed target directory. Sources
//! carrying the `.tera` marker extension are rendered through Tera
//! with the context exposed as `ctx`; everything else is copied
//! byte-for-byte. Rendering is all-or-nothing: every template body is
//! expanded in memory before the first file is written, so a failed
//! expansion never leaves a half-written target directory.

use std::path::{Component, Path, PathBuf};

use tera::Tera;
use tracing::{debug, info};

use crate::core::context::Ctx;
use crate::core::descriptor::Descriptor;
use crate::core::{Error, Result};
use crate::core::interpolate::expand_path;
use crate::infrastructure::fsio::{copy_file, make_executable, mkdirp, write_text};
use crate::store::active::ActiveStore;

/// Marker extension for files rendered through the template engine
pub const TEMPLATE_MARKER: &str = ".tera";

/// One step of the render plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanItem {
    /// Render `src` through Tera into `dst`
    Render { src: PathBuf, dst: PathBuf },
    /// Copy `src` byte-for-byte to `dst`
    Copy { src: PathBuf, dst: PathBuf },
    /// Mark the run entry executable
    Chmod { dst: PathBuf },
}

impl PlanItem {
    pub fn dst(&self) -> &Path {
        match self {
            PlanItem::Render { dst, .. } | PlanItem::Copy { dst, .. } | PlanItem::Chmod { dst } => {
                dst
            }
        }
    }
}

/// Outcome of a plan or render call
#[derive(Debug, Clone)]
pub struct RenderResult {
    pub target_dir: PathBuf,
    pub files: Vec<PlanItem>,
}

/// Compute the absolute target directory for a render.
///
/// `ctx.template.render_into` is expanded against the context and
/// joined under `base_dir`; in project mode an optional
/// `parent_directory` is inserted one level above the template's own
/// folder segment.
pub fn target_dir(descriptor: &Descriptor, ctx: &Ctx, base_dir: &Path) -> Result<PathBuf> {
    let into = expand_path(&ctx.template.render_into, ctx)?;
    let mut rel = PathBuf::from(into);
    if ctx.project.is_some() {
        if let Some(parent_dir) = &descriptor.render.parent_directory {
            rel = insert_parent(&rel, parent_dir);
        }
    }
    Ok(normalize(&base_dir.join(rel)))
}

/// Compute the full render plan without touching the filesystem.
pub fn plan(
    store: &ActiveStore,
    descriptor: &Descriptor,
    ctx: &Ctx,
    base_dir: &Path,
) -> Result<RenderResult> {
    let target = target_dir(descriptor, ctx, base_dir)?;
    let template_root = descriptor.source_root(store);

    let mut files = Vec::with_capacity(descriptor.render.files.len() + 1);
    for mapping in &descriptor.render.files {
        let src = template_root.join(&mapping.src);
        let dst = target.join(&mapping.dst);
        if mapping.src.ends_with(TEMPLATE_MARKER) {
            files.push(PlanItem::Render { src, dst });
        } else {
            files.push(PlanItem::Copy { src, dst });
        }
    }
    if let Some(run) = &descriptor.run {
        files.push(PlanItem::Chmod {
            dst: target.join(&run.entry),
        });
    }

    Ok(RenderResult {
        target_dir: target,
        files,
    })
}

/// Execute the render plan. With `dry_run` the identical plan is
/// returned and the filesystem is left untouched.
pub fn render(
    store: &ActiveStore,
    descriptor: &Descriptor,
    ctx: &Ctx,
    base_dir: &Path,
    dry_run: bool,
) -> Result<RenderResult> {
    let result = plan(store, descriptor, ctx, base_dir)?;
    if dry_run {
        debug!(target = %result.target_dir.display(), "Dry run, skipping writes");
        return Ok(result);
    }

    // Stage every rendered body in memory first; nothing is written
    // until all sources exist and all expansions succeed.
    let mut tera = Tera::default();
    let mut staged: Vec<(PathBuf, String)> = Vec::new();
    let tera_ctx = ctx.to_tera();

    for item in &result.files {
        match item {
            PlanItem::Render { src, dst } => {
                let body = std::fs::read_to_string(src).map_err(|_| {
                    Error::render(format!("template source not found: {}", src.display()))
                })?;
                let name = src.to_string_lossy().to_string();
                tera.add_raw_template(&name, &body)
                    .map_err(|e| render_failure(src, &e))?;
                let rendered = tera
                    .render(&name, &tera_ctx)
                    .map_err(|e| render_failure(src, &e))?;
                staged.push((dst.clone(), rendered));
            }
            PlanItem::Copy { src, .. } => {
                if !src.is_file() {
                    return Err(Error::render(format!(
                        "template source not found: {}",
                        src.display()
                    )));
                }
            }
            PlanItem::Chmod { .. } => {}
        }
    }

    mkdirp(&result.target_dir)?;
    for (dst, body) in &staged {
        write_text(dst, body)?;
    }
    for item in &result.files {
        match item {
            PlanItem::Copy { src, dst } => copy_file(src, dst)?,
            PlanItem::Chmod { dst } => make_executable(dst)?,
            PlanItem::Render { .. } => {}
        }
    }

    info!(
        target = %result.target_dir.display(),
        files = result.files.len(),
        "Rendered template"
    );
    Ok(result)
}

fn render_failure(src: &Path, error: &tera::Error) -> Error {
    // Tera nests the interesting detail (undefined variable, parse
    // position) in the error source chain.
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    Error::render(format!("{}: {message}", src.display()))
}

fn insert_parent(rel: &Path, parent_dir: &str) -> PathBuf {
    let mut components: Vec<&std::ffi::OsStr> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s),
            _ => None,
        })
        .collect();
    match components.pop() {
        Some(last) => {
            let mut out = PathBuf::new();
            for c in components {
                out.push(c);
            }
            out.push(parent_dir);
            out.push(last);
            out
        }
        None => PathBuf::from(parent_dir),
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::{CtxProject, CtxTemplate};
    use serde_json::{Map, json};
    use std::fs;
    use tempfile::tempdir;

    fn scaffold(descriptor_yaml: &str, files: &[(&str, &str)]) -> (tempfile::TempDir, ActiveStore) {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("store.yaml"),
            "id: demo\nname: Demo\nversion: \"1.0.0\"\n",
        )
        .unwrap();
        let tpl = dir.path().join("templates/hello");
        fs::create_dir_all(&tpl).unwrap();
        fs::write(tpl.join("template.yaml"), descriptor_yaml).unwrap();
        for (name, body) in files {
            fs::write(tpl.join(name), body).unwrap();
        }
        let store = ActiveStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn ctx(render_into: &str, params: Map<String, serde_json::Value>, base: &Path) -> Ctx {
        Ctx::new(
            Some(CtxProject {
                name: "250903_TEST".to_string(),
                project_path: "local:/projects/250903_TEST".to_string(),
            }),
            CtxTemplate {
                id: "hello".to_string(),
                render_into: render_into.to_string(),
                run_entry: Some("run.sh".to_string()),
            },
            params,
            base,
        )
    }

    const DESC: &str = r#"
id: hello
render:
  into: "${ctx.project.name}/${ctx.template.id}"
  files:
    - "run.sh.tera -> run.sh"
    - "samples.csv -> samples.csv"
run:
  entry: run.sh
"#;

    #[test]
    fn test_target_dir_expansion() {
        let (_dir, store) = scaffold(DESC, &[]);
        let desc = Descriptor::load(&store, "hello").unwrap();
        let base = tempdir().unwrap();
        let c = ctx(&desc.render.into.clone(), Map::new(), base.path());
        let target = target_dir(&desc, &c, base.path()).unwrap();
        assert!(target.ends_with("250903_TEST/hello"));
    }

    #[test]
    fn test_parent_directory_inserted_above_template_segment() {
        let yaml = r#"
id: hello
render:
  into: "${ctx.project.name}/${ctx.template.id}"
  parent_directory: analysis
"#;
        let (_dir, store) = scaffold(yaml, &[]);
        let desc = Descriptor::load(&store, "hello").unwrap();
        let base = tempdir().unwrap();
        let c = ctx(&desc.render.into.clone(), Map::new(), base.path());
        let target = target_dir(&desc, &c, base.path()).unwrap();
        assert!(target.ends_with("250903_TEST/analysis/hello"));
    }

    #[test]
    fn test_render_writes_and_marks_entry_executable() {
        let (_dir, store) = scaffold(
            DESC,
            &[
                ("run.sh.tera", "#!/bin/sh\necho {{ ctx.params.sample_id }}\n"),
                ("samples.csv", "sample,lane\nS42,1\n"),
            ],
        );
        let desc = Descriptor::load(&store, "hello").unwrap();
        let base = tempdir().unwrap();
        let mut params = Map::new();
        params.insert("sample_id".to_string(), json!("S42"));
        let c = ctx(&desc.render.into.clone(), params, base.path());

        let result = render(&store, &desc, &c, base.path(), false).unwrap();
        let run_sh = result.target_dir.join("run.sh");
        assert_eq!(
            fs::read_to_string(&run_sh).unwrap(),
            "#!/bin/sh\necho S42\n"
        );
        assert_eq!(
            fs::read_to_string(result.target_dir.join("samples.csv")).unwrap(),
            "sample,lane\nS42,1\n"
        );
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&run_sh).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn test_render_is_idempotent() {
        let (_dir, store) = scaffold(DESC, &[("run.sh.tera", "echo hi\n"), ("samples.csv", "x\n")]);
        let desc = Descriptor::load(&store, "hello").unwrap();
        let base = tempdir().unwrap();
        let c = ctx(&desc.render.into.clone(), Map::new(), base.path());

        let first = render(&store, &desc, &c, base.path(), false).unwrap();
        let body_first = fs::read_to_string(first.target_dir.join("run.sh")).unwrap();
        let second = render(&store, &desc, &c, base.path(), false).unwrap();
        let body_second = fs::read_to_string(second.target_dir.join("run.sh")).unwrap();
        assert_eq!(body_first, body_second);
        assert_eq!(first.target_dir, second.target_dir);
    }

    #[test]
    fn test_dry_run_touches_nothing_but_reports_same_plan() {
        let (_dir, store) = scaffold(DESC, &[("run.sh.tera", "echo hi\n"), ("samples.csv", "x\n")]);
        let desc = Descriptor::load(&store, "hello").unwrap();
        let base = tempdir().unwrap();
        let c = ctx(&desc.render.into.clone(), Map::new(), base.path());

        let dry = render(&store, &desc, &c, base.path(), true).unwrap();
        assert!(!dry.target_dir.exists());
        assert!(fs::read_dir(base.path()).unwrap().next().is_none());

        let real = render(&store, &desc, &c, base.path(), false).unwrap();
        assert_eq!(dry.target_dir, real.target_dir);
        assert_eq!(dry.files, real.files);
    }

    #[test]
    fn test_undefined_variable_fails_and_leaves_no_partial_dir() {
        let (_dir, store) = scaffold(
            DESC,
            &[
                ("run.sh.tera", "echo {{ ctx.params.missing }}\n"),
                ("samples.csv", "x\n"),
            ],
        );
        let desc = Descriptor::load(&store, "hello").unwrap();
        let base = tempdir().unwrap();
        let c = ctx(&desc.render.into.clone(), Map::new(), base.path());

        let err = render(&store, &desc, &c, base.path(), false).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("run.sh.tera"), "message was: {msg}");
        assert!(!base.path().join("250903_TEST").exists());
    }

    #[test]
    fn test_missing_source_names_path() {
        let (_dir, store) = scaffold(DESC, &[("run.sh.tera", "echo hi\n")]);
        let desc = Descriptor::load(&store, "hello").unwrap();
        let base = tempdir().unwrap();
        let c = ctx(&desc.render.into.clone(), Map::new(), base.path());

        let err = render(&store, &desc, &c, base.path(), false).unwrap_err();
        assert!(err.to_string().contains("template source not found"));
        assert!(err.to_string().contains("samples.csv"));
    }

    #[test]
    fn test_adhoc_renders_into_base_dir() {
        let (_dir, store) = scaffold(DESC, &[("run.sh.tera", "echo hi\n"), ("samples.csv", "x\n")]);
        let desc = Descriptor::load(&store, "hello").unwrap();
        let base = tempdir().unwrap();
        let mut c = ctx(".", Map::new(), base.path());
        c.project = None;

        let result = render(&store, &desc, &c, base.path(), false).unwrap();
        assert_eq!(result.target_dir, normalize(base.path()));
        assert!(base.path().join("run.sh").exists());
    }
}
