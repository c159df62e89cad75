//! Lifecycle orchestrator.
//!
//! Drives the render / run / publish operations over a template
//! instance, in project mode (state in `project.yaml`) or ad-hoc mode
//! (state in `biopm.meta.yaml` inside the output directory). Each
//! operation is a fixed stage sequence; the first failing stage aborts
//! the command, and the failing stage is reported in the logs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::core::context::{Ctx, CtxProject, CtxTemplate};
use crate::core::descriptor::Descriptor;
use crate::core::{Error, Result};
use crate::core::interpolate::expand_full;
use crate::core::params;
use crate::infrastructure::exec::{ProcessOutput, run_process, tool_on_path};
use crate::lifecycle::hooks::{HookPoint, run_hooks};
use crate::lifecycle::invoker::CallableInvoker;
use crate::lifecycle::publish::{merge_published, resolve_all};
use crate::render::{self, RenderResult};
use crate::state::adhoc::{AdhocMeta, AdhocSource};
use crate::state::project::{EntryStatus, ProjectState, ProjectStatus, TemplateSource};
use crate::store::active::ActiveStore;
use crate::store::registry::now_iso;

/// Lifecycle stage, reported on failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    PreRender,
    Render,
    PostRender,
    PreRun,
    Run,
    PostRun,
    Publish,
    Persist,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::PreRender => "pre_render",
            Self::Render => "render",
            Self::PostRender => "post_render",
            Self::PreRun => "pre_run",
            Self::Run => "run",
            Self::PostRun => "post_run",
            Self::Publish => "publish",
            Self::Persist => "persist",
        }
    }
}

/// Where template state lives for this invocation
#[derive(Debug, Clone)]
pub enum Mode {
    /// Inside a project directory carrying `project.yaml`
    Project { dir: PathBuf },
    /// Stand-alone output directory with `biopm.meta.yaml`
    AdHoc { out: PathBuf },
}

/// Options for `template render`
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Raw `KEY=VALUE` pairs from `--param`
    pub params: Vec<String>,
    pub dry_run: bool,
    /// Render under a different entry id, independent of the
    /// un-aliased instance
    pub alias: Option<String>,
}

/// Orchestrates template lifecycle operations against the active
/// store.
pub struct TemplateService<'a> {
    store: &'a ActiveStore,
    invoker: &'a dyn CallableInvoker,
}

enum Workspace {
    Project {
        dir: PathBuf,
        base_dir: PathBuf,
        state: ProjectState,
    },
    AdHoc {
        out: PathBuf,
        meta: AdhocMeta,
    },
}

impl Workspace {
    /// Open existing state. In ad-hoc mode the directory must already
    /// carry its metadata record: run and publish never fabricate one.
    fn open(mode: &Mode) -> Result<Self> {
        match mode {
            Mode::Project { dir } => {
                let dir = dir.canonicalize().map_err(|e| Error::io(dir, e))?;
                let state = ProjectState::load(&dir)?;
                let base_dir = dir.parent().map(Path::to_path_buf).unwrap_or_else(|| dir.clone());
                Ok(Self::Project {
                    dir,
                    base_dir,
                    state,
                })
            }
            Mode::AdHoc { out } => {
                let meta = AdhocMeta::load(out)?;
                Ok(Self::AdHoc {
                    out: out.clone(),
                    meta,
                })
            }
        }
    }

    /// Like `open`, except a never-rendered ad-hoc directory starts a
    /// fresh metadata record. Render only.
    fn open_for_render(mode: &Mode) -> Result<Self> {
        match mode {
            Mode::Project { .. } => Self::open(mode),
            Mode::AdHoc { out } => {
                let meta = AdhocMeta::load_or_new(out, None)?;
                Ok(Self::AdHoc {
                    out: out.clone(),
                    meta,
                })
            }
        }
    }

    fn project_view(&self) -> Option<CtxProject> {
        match self {
            Self::Project { state, .. } => Some(CtxProject {
                name: state.name.clone(),
                project_path: state.project_path.clone(),
            }),
            Self::AdHoc { .. } => None,
        }
    }

    fn base_dir(&self) -> &Path {
        match self {
            Self::Project { base_dir, .. } => base_dir,
            Self::AdHoc { out, .. } => out,
        }
    }

    fn stored_params(&self, entry_id: &str) -> Map<String, Value> {
        match self {
            Self::Project { state, .. } => state
                .entry(entry_id)
                .map(|e| e.params.clone())
                .unwrap_or_default(),
            Self::AdHoc { meta, .. } => meta.params.clone(),
        }
    }
}

impl<'a> TemplateService<'a> {
    pub fn new(store: &'a ActiveStore, invoker: &'a dyn CallableInvoker) -> Self {
        Self { store, invoker }
    }

    /// Render a template instance: dependency check, parameter
    /// resolution, `pre_render` hooks, file rendering, `post_render`
    /// hooks, state persistence.
    pub fn render(
        &self,
        template_id: &str,
        mode: &Mode,
        opts: &RenderOptions,
    ) -> Result<RenderResult> {
        let descriptor = Descriptor::load(self.store, template_id)?;
        warn_missing_tools(&descriptor);
        let entry_id = opts.alias.as_deref().unwrap_or(template_id);

        let mut workspace = Workspace::open_for_render(mode)?;
        if let Workspace::Project { state, .. } = &workspace {
            at(Stage::Resolve, check_dependencies(state, &descriptor))?;
        }

        let ctx_like = self.build_ctx(&workspace, &descriptor, entry_id, Map::new());
        let cli = params::parse_cli_pairs(&opts.params)?;
        let stored = workspace.stored_params(entry_id);
        let resolved = at(
            Stage::Resolve,
            params::resolve(&descriptor, &stored, &cli, &ctx_like),
        )?;
        let ctx = self.build_ctx(&workspace, &descriptor, entry_id, resolved.clone());

        if opts.dry_run {
            let result = render::render(self.store, &descriptor, &ctx, workspace.base_dir(), true)?;
            info!(template = entry_id, target = %result.target_dir.display(), "Dry run complete");
            return Ok(result);
        }

        at(
            Stage::PreRender,
            run_hooks(HookPoint::PreRender, &descriptor.hooks, &ctx, self.invoker),
        )?;
        let result = at(
            Stage::Render,
            render::render(self.store, &descriptor, &ctx, workspace.base_dir(), false),
        )?;
        at(
            Stage::PostRender,
            run_hooks(HookPoint::PostRender, &descriptor.hooks, &ctx, self.invoker),
        )?;

        match &mut workspace {
            Workspace::Project { dir, state, .. } => {
                let source = self.source_record();
                let entry = state.ensure_entry(entry_id, template_id);
                entry.params = resolved;
                entry.status = EntryStatus::Active;
                entry.rendered_at = Some(now_iso());
                entry.source = Some(source);
                entry.last_error = None;
                state.status = ProjectStatus::Active;
                at(Stage::Persist, state.save(dir))?;
            }
            Workspace::AdHoc { meta, .. } => {
                meta.params = resolved;
                meta.status = EntryStatus::Active;
                meta.source = Some(AdhocSource {
                    store_id: self.store.manifest.id.clone(),
                    store_version: self.store.manifest.version.clone(),
                    template_id: template_id.to_string(),
                });
                at(Stage::Persist, meta.save(&result.target_dir))?;
            }
        }

        info!(template = entry_id, target = %result.target_dir.display(), "Render complete");
        Ok(result)
    }

    /// Execute a rendered instance's entry script: `pre_run` hooks,
    /// synchronous execution in the target directory, persistence,
    /// `post_run` hooks.
    ///
    /// A non-zero exit records `status: failed` with the captured
    /// stderr before the error propagates. A `post_run` hook failure
    /// fails the command but leaves the completed run recorded.
    pub fn run(&self, entry_id: &str, mode: &Mode) -> Result<ProcessOutput> {
        let mut workspace = Workspace::open(mode)?;
        let descriptor = self.descriptor_for(&workspace, entry_id)?;
        let Some(run_spec) = descriptor.run.clone() else {
            return Err(Error::config(format!(
                "template '{}' declares no run entry",
                descriptor.id
            )));
        };
        warn_missing_tools(&descriptor);

        let ctx = self.build_ctx(
            &workspace,
            &descriptor,
            entry_id,
            workspace.stored_params(entry_id),
        );
        let target = render::target_dir(&descriptor, &ctx, workspace.base_dir())?;
        let entry_path = target.join(&run_spec.entry);
        if !entry_path.is_file() {
            return Err(Error::state(format!(
                "run entry not found at {}; run `biopm template render {}` first",
                entry_path.display(),
                descriptor.id
            )));
        }

        at(
            Stage::PreRun,
            run_hooks(HookPoint::PreRun, &descriptor.hooks, &ctx, self.invoker),
        )?;

        let mut args = Vec::with_capacity(run_spec.args.len());
        for arg in &run_spec.args {
            args.push(expand_full(arg, &ctx)?);
        }
        let mut env = BTreeMap::new();
        for (key, value) in &run_spec.env {
            env.insert(key.clone(), expand_full(value, &ctx)?);
        }

        info!(template = entry_id, entry = %run_spec.entry, "Executing run entry");
        let program = entry_path.to_string_lossy().to_string();
        let output = at(
            Stage::Run,
            run_process(&program, &args, &target, &env, None),
        )?;

        if !output.is_success() {
            self.persist_run_outcome(
                &mut workspace,
                entry_id,
                EntryStatus::Failed,
                Some(output.stderr.clone()),
                &target,
            )?;
            return Err(Error::Run {
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        self.persist_run_outcome(&mut workspace, entry_id, EntryStatus::Completed, None, &target)?;
        at(
            Stage::PostRun,
            run_hooks(HookPoint::PostRun, &descriptor.hooks, &ctx, self.invoker),
        )?;
        info!(template = entry_id, "Run complete");
        Ok(output)
    }

    /// Invoke every publish resolver and merge the results into the
    /// entry's `published` map. Entry status is unchanged.
    pub fn publish(&self, entry_id: &str, mode: &Mode) -> Result<Map<String, Value>> {
        let mut workspace = Workspace::open(mode)?;
        let descriptor = self.descriptor_for(&workspace, entry_id)?;
        let ctx = self.build_ctx(
            &workspace,
            &descriptor,
            entry_id,
            workspace.stored_params(entry_id),
        );

        let resolved = at(
            Stage::Publish,
            resolve_all(&descriptor.publish, &ctx, self.invoker),
        )?;

        match &mut workspace {
            Workspace::Project { dir, state, .. } => {
                let entry = state.entry_mut(entry_id).ok_or_else(|| {
                    Error::state(format!("no entry '{entry_id}' in project state"))
                })?;
                merge_published(&mut entry.published, resolved.clone());
                // A template without a run entry is complete once its
                // outputs are published.
                if descriptor.run.is_none() && entry.status == EntryStatus::Active {
                    entry.status = EntryStatus::Completed;
                }
                at(Stage::Persist, state.save(dir))?;
            }
            Workspace::AdHoc { out, meta } => {
                merge_published(&mut meta.published, resolved.clone());
                if descriptor.run.is_none() && meta.status == EntryStatus::Active {
                    meta.status = EntryStatus::Completed;
                }
                at(Stage::Persist, meta.save(out))?;
            }
        }

        info!(template = entry_id, keys = resolved.len(), "Publish complete");
        Ok(resolved)
    }

    /// Render a workflow's files into the project. Workflows reuse
    /// the renderer and parameter machinery but carry no project
    /// state: `project.yaml` is never touched.
    pub fn render_workflow(
        &self,
        workflow_id: &str,
        dir: &Path,
        opts: &RenderOptions,
    ) -> Result<RenderResult> {
        let descriptor = Descriptor::load_workflow(self.store, workflow_id)?;
        warn_missing_tools(&descriptor);
        let workspace = Workspace::open(&Mode::Project {
            dir: dir.to_path_buf(),
        })?;

        let ctx_like = self.build_ctx(&workspace, &descriptor, workflow_id, Map::new());
        let cli = params::parse_cli_pairs(&opts.params)?;
        let resolved = at(
            Stage::Resolve,
            params::resolve(&descriptor, &Map::new(), &cli, &ctx_like),
        )?;
        let ctx = self.build_ctx(&workspace, &descriptor, workflow_id, resolved);

        let result = at(
            Stage::Render,
            render::render(self.store, &descriptor, &ctx, workspace.base_dir(), opts.dry_run),
        )?;
        info!(workflow = workflow_id, target = %result.target_dir.display(), "Workflow render complete");
        Ok(result)
    }

    /// Execute a rendered workflow's entry script in its target
    /// directory. No status is recorded anywhere.
    pub fn run_workflow(&self, workflow_id: &str, dir: &Path) -> Result<ProcessOutput> {
        let descriptor = Descriptor::load_workflow(self.store, workflow_id)?;
        let Some(run_spec) = descriptor.run.clone() else {
            return Err(Error::config(format!(
                "workflow '{}' declares no run entry",
                descriptor.id
            )));
        };
        let workspace = Workspace::open(&Mode::Project {
            dir: dir.to_path_buf(),
        })?;
        let ctx = self.build_ctx(&workspace, &descriptor, workflow_id, Map::new());
        let target = render::target_dir(&descriptor, &ctx, workspace.base_dir())?;
        let entry_path = target.join(&run_spec.entry);
        if !entry_path.is_file() {
            return Err(Error::state(format!(
                "run entry not found at {}; run `biopm workflow render {}` first",
                entry_path.display(),
                descriptor.id
            )));
        }

        let mut args = Vec::with_capacity(run_spec.args.len());
        for arg in &run_spec.args {
            args.push(expand_full(arg, &ctx)?);
        }
        let mut env = BTreeMap::new();
        for (key, value) in &run_spec.env {
            env.insert(key.clone(), expand_full(value, &ctx)?);
        }

        info!(workflow = workflow_id, entry = %run_spec.entry, "Executing workflow entry");
        let program = entry_path.to_string_lossy().to_string();
        let output = at(Stage::Run, run_process(&program, &args, &target, &env, None))?;
        if !output.is_success() {
            return Err(Error::Run {
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        info!(workflow = workflow_id, "Workflow run complete");
        Ok(output)
    }

    /// Load the descriptor behind an entry id: the entry's
    /// `source_template` in project mode (so aliases resolve), the id
    /// itself ad-hoc.
    fn descriptor_for(&self, workspace: &Workspace, entry_id: &str) -> Result<Descriptor> {
        let template_id = match workspace {
            Workspace::Project { state, .. } => state
                .entry(entry_id)
                .map(|e| e.source_template.clone())
                .ok_or_else(|| {
                    Error::state(format!(
                        "no entry '{entry_id}' in project state; run `biopm template render {entry_id}` first"
                    ))
                })?,
            Workspace::AdHoc { meta, .. } => meta
                .template_id()
                .unwrap_or(entry_id)
                .to_string(),
        };
        Descriptor::load(self.store, &template_id)
    }

    fn build_ctx(
        &self,
        workspace: &Workspace,
        descriptor: &Descriptor,
        entry_id: &str,
        params: Map<String, Value>,
    ) -> Ctx {
        let render_into = match workspace {
            Workspace::Project { .. } => descriptor.render.into.clone(),
            Workspace::AdHoc { .. } => ".".to_string(),
        };
        Ctx::new(
            workspace.project_view(),
            CtxTemplate {
                id: entry_id.to_string(),
                render_into,
                run_entry: descriptor.run.as_ref().map(|r| r.entry.clone()),
            },
            params,
            workspace.base_dir(),
        )
    }

    fn source_record(&self) -> TemplateSource {
        TemplateSource {
            store_id: self.store.manifest.id.clone(),
            store_version: self.store.manifest.version.clone(),
        }
    }

    fn persist_run_outcome(
        &self,
        workspace: &mut Workspace,
        entry_id: &str,
        status: EntryStatus,
        last_error: Option<String>,
        target: &Path,
    ) -> Result<()> {
        match workspace {
            Workspace::Project { dir, state, .. } => {
                let entry = state.entry_mut(entry_id).ok_or_else(|| {
                    Error::state(format!("no entry '{entry_id}' in project state"))
                })?;
                entry.status = status;
                entry.last_error = last_error;
                at(Stage::Persist, state.save(dir))
            }
            Workspace::AdHoc { meta, .. } => {
                meta.status = status;
                at(Stage::Persist, meta.save(target))
            }
        }
    }
}

fn at<T>(stage: Stage, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        error!(stage = stage.as_str(), error = %err, "Lifecycle stage failed");
    }
    result
}

fn warn_missing_tools(descriptor: &Descriptor) {
    for tool in &descriptor.tools.required {
        if !tool_on_path(tool) {
            warn!(tool = %tool, template = %descriptor.id, "Required tool not found on PATH");
        }
    }
}

/// Every `required_templates` id must already be rendered and either
/// completed or carrying published outputs.
fn check_dependencies(state: &ProjectState, descriptor: &Descriptor) -> Result<()> {
    let mut problems = Vec::new();
    for dep in &descriptor.required_templates {
        match state.entry(dep) {
            Some(entry)
                if entry.status == EntryStatus::Completed || !entry.published.is_empty() => {}
            Some(entry) => problems.push(format!("'{dep}' is {}", entry.status.as_str())),
            None => problems.push(format!("'{dep}' has not been rendered")),
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::Dependency(format!(
            "template '{}' requires: {}",
            descriptor.id,
            problems.join("; ")
        )))
    }
}
