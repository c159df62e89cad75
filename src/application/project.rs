//! Project-level operations: init, info, status, adopt.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::info;

use crate::core::{Error, Result};
use crate::core::hostpath::HostPath;
use crate::infrastructure::fsio::{copy_tree, mkdirp};
use crate::state::adhoc::AdhocMeta;
use crate::state::project::{AdoptOutcome, OnExists, ProjectState};
use crate::store::active::{ActiveStore, Author};

/// Options for `project init`
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Parent directory the project folder is created under
    pub outdir: PathBuf,
    /// Explicit host-aware project path, e.g. `nextgen:/projects/X`
    pub path: Option<String>,
    /// Author ids resolved against the store's `authors.yaml`
    pub authors: Vec<String>,
    /// Ad-hoc directories to adopt right after init
    pub adopt: Vec<PathBuf>,
}

/// Create a new project directory with its `project.yaml`.
///
/// The name is validated against the active store's project-name
/// policy; an existing directory with a state file is an error.
pub fn init(store: &ActiveStore, name: &str, opts: &InitOptions) -> Result<PathBuf> {
    check_name_policy(store, name)?;

    let dir = opts.outdir.join(name);
    if ProjectState::file_path(&dir).exists() {
        return Err(Error::state(format!(
            "project already exists at {}",
            dir.display()
        )));
    }

    let authors = resolve_authors(store, &opts.authors)?;
    mkdirp(&dir)?;
    let project_path = match &opts.path {
        Some(raw) => HostPath::from_raw(raw, "local")?.to_string(),
        None => {
            let abs = dir.canonicalize().map_err(|e| Error::io(&dir, e))?;
            HostPath::from_raw(&abs.to_string_lossy(), "local")?.to_string()
        }
    };

    let state = ProjectState::new(name, project_path, authors);
    state.save(&dir)?;
    info!(project = name, dir = %dir.display(), "Initialized project");

    for from in &opts.adopt {
        adopt(&dir, std::slice::from_ref(from), OnExists::Merge)?;
    }
    Ok(dir)
}

/// Adopt ad-hoc output directories into a project.
///
/// Each source directory must carry a `biopm.meta.yaml`; its basename
/// becomes the entry id. Unless the entry was skipped, directories
/// living outside the project are copied under it.
pub fn adopt(
    project_dir: &Path,
    from: &[PathBuf],
    on_exists: OnExists,
) -> Result<Vec<(String, AdoptOutcome)>> {
    let mut state = ProjectState::load(project_dir)?;
    let project_dir = project_dir
        .canonicalize()
        .map_err(|e| Error::io(project_dir, e))?;

    let mut outcomes = Vec::with_capacity(from.len());
    for dir in from {
        let dir = dir.canonicalize().map_err(|e| Error::io(dir, e))?;
        let meta = AdhocMeta::load(&dir)?;
        let id = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::state(format!("cannot derive entry id from {}", dir.display())))?;

        let outcome = state.adopt(&meta, &id, on_exists);
        if outcome != AdoptOutcome::Skipped && !dir.starts_with(&project_dir) {
            copy_tree(&dir, &project_dir.join(&id))?;
        }
        info!(entry = %id, outcome = outcome.as_str(), "Adopted directory");
        outcomes.push((id, outcome));
    }

    state.save(&project_dir)?;
    Ok(outcomes)
}

/// Human-readable project header.
pub fn info_text(project_dir: &Path) -> Result<String> {
    let state = ProjectState::load(project_dir)?;
    let mut out = String::new();
    let _ = writeln!(out, "Project:  {}", state.name);
    let _ = writeln!(out, "Path:     {}", state.project_path);
    let _ = writeln!(out, "Status:   {}", state.status.as_str());
    if let Some(created) = &state.created {
        let _ = writeln!(out, "Created:  {created}");
    }
    if !state.authors.is_empty() {
        let names: Vec<&str> = state
            .authors
            .iter()
            .map(|a| a.name.as_deref().unwrap_or(a.id.as_str()))
            .collect();
        let _ = writeln!(out, "Authors:  {}", names.join(", "));
    }
    let _ = writeln!(out, "Templates: {}", state.templates.len());
    Ok(out)
}

/// Per-entry status table.
pub fn status_text(project_dir: &Path) -> Result<String> {
    let state = ProjectState::load(project_dir)?;
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", state.name, state.status.as_str());
    if state.templates.is_empty() {
        let _ = writeln!(out, "  no templates rendered yet");
        return Ok(out);
    }
    for entry in &state.templates {
        let alias_note = if entry.id != entry.source_template {
            format!(" (from {})", entry.source_template)
        } else {
            String::new()
        };
        let _ = writeln!(
            out,
            "  {:<24} {}{}",
            entry.id,
            entry.status.as_str(),
            alias_note
        );
        if let Some(err) = &entry.last_error {
            let first = err.lines().next().unwrap_or("");
            let _ = writeln!(out, "    last error: {first}");
        }
        for (key, value) in &entry.published {
            let _ = writeln!(out, "    {key}: {value}");
        }
    }
    Ok(out)
}

fn check_name_policy(store: &ActiveStore, name: &str) -> Result<()> {
    let Some(pattern) = &store.name_policy.regex else {
        return Ok(());
    };
    let re = Regex::new(pattern)
        .map_err(|e| Error::config(format!("invalid project-name policy regex: {e}")))?;
    if re.is_match(name) {
        return Ok(());
    }
    let message = store
        .name_policy
        .message
        .clone()
        .unwrap_or_else(|| format!("must match {pattern}"));
    Err(Error::config(format!(
        "project name '{name}' rejected by store policy: {message}"
    )))
}

fn resolve_authors(store: &ActiveStore, ids: &[String]) -> Result<Vec<Author>> {
    let mut authors = Vec::with_capacity(ids.len());
    for id in ids {
        let author = store.author_by_id(id).ok_or_else(|| {
            Error::config(format!(
                "unknown author id '{id}'; known: {}",
                store
                    .authors
                    .iter()
                    .map(|a| a.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;
        authors.push(author.clone());
    }
    Ok(authors)
}
