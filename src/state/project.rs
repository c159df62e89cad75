//! Project state (`project.yaml`).
//!
//! One YAML document per project directory records the project header
//! plus one entry per rendered template instance. Writes always go
//! through the atomic save in `yamlio`, so readers never observe a
//! half-written state file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{Error, Result};
use crate::infrastructure::yamlio::{load_yaml, save_yaml_atomic};
use crate::state::adhoc::AdhocMeta;
use crate::store::active::Author;
use crate::store::registry::now_iso;

pub const PROJECT_FILENAME: &str = "project.yaml";

/// Lifecycle status of a template entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    NotStarted,
    Active,
    Completed,
    Failed,
}

impl Default for EntryStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl EntryStatus {
    /// Ordering used when merging adopted entries: keep whichever
    /// side has progressed further.
    pub fn rank(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Active => 1,
            Self::Failed => 2,
            Self::Completed => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Overall project status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Initiated,
    Active,
    Closed,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

/// Which store (and version) a rendered entry came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSource {
    pub store_id: String,
    pub store_version: String,
}

/// One rendered template instance inside a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateEntry {
    /// Instance id; differs from `source_template` when rendered
    /// with an alias
    pub id: String,
    pub source_template: String,
    #[serde(default)]
    pub status: EntryStatus,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub published: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<TemplateSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_at: Option<String>,
    /// Captured stderr of the most recent failed run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl TemplateEntry {
    pub fn new(id: impl Into<String>, source_template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_template: source_template.into(),
            status: EntryStatus::NotStarted,
            params: Map::new(),
            published: Map::new(),
            source: None,
            rendered_at: None,
            last_error: None,
        }
    }
}

/// How `adopt` treats an entry id that already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OnExists {
    /// Leave the existing entry untouched
    Skip,
    /// Union params/published (adopted side wins), keep the more
    /// advanced status
    #[default]
    Merge,
    /// Replace the existing entry wholesale
    Overwrite,
}

/// Result of adopting one directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdoptOutcome {
    Added,
    Skipped,
    Merged,
    Overwritten,
}

impl AdoptOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Skipped => "skipped",
            Self::Merged => "merged",
            Self::Overwritten => "overwritten",
        }
    }
}

/// Persisted project state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectState {
    pub schema_version: u32,
    pub name: String,
    /// Host-aware path string, e.g. `nextgen:/projects/250901_Demo`
    pub project_path: String,
    pub status: ProjectStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub templates: Vec<TemplateEntry>,
}

impl ProjectState {
    pub fn new(
        name: impl Into<String>,
        project_path: impl Into<String>,
        authors: Vec<Author>,
    ) -> Self {
        Self {
            schema_version: 1,
            name: name.into(),
            project_path: project_path.into(),
            status: ProjectStatus::Initiated,
            created: Some(now_iso()),
            authors,
            templates: Vec::new(),
        }
    }

    pub fn file_path(dir: &Path) -> PathBuf {
        dir.join(PROJECT_FILENAME)
    }

    /// Load the state file from a project directory.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = Self::file_path(dir);
        if !path.exists() {
            return Err(Error::state(format!(
                "no {} found in {}; run `biopm project init` first",
                PROJECT_FILENAME,
                dir.display()
            )));
        }
        load_yaml(&path)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        save_yaml_atomic(&Self::file_path(dir), self)
    }

    pub fn entry(&self, id: &str) -> Option<&TemplateEntry> {
        self.templates.iter().find(|e| e.id == id)
    }

    pub fn entry_mut(&mut self, id: &str) -> Option<&mut TemplateEntry> {
        self.templates.iter_mut().find(|e| e.id == id)
    }

    /// Fetch the entry for `id`, creating a fresh `not_started` one if
    /// this is the first render under that id.
    pub fn ensure_entry(
        &mut self,
        id: &str,
        source_template: &str,
    ) -> &mut TemplateEntry {
        let idx = match self.templates.iter().position(|e| e.id == id) {
            Some(idx) => idx,
            None => {
                self.templates
                    .push(TemplateEntry::new(id, source_template));
                self.templates.len() - 1
            }
        };
        &mut self.templates[idx]
    }

    /// Fold an ad-hoc directory's metadata into this project under
    /// entry `id`.
    pub fn adopt(&mut self, meta: &AdhocMeta, id: &str, on_exists: OnExists) -> AdoptOutcome {
        let incoming = meta.to_entry(id);
        let Some(existing) = self.entry_mut(id) else {
            self.templates.push(incoming);
            return AdoptOutcome::Added;
        };
        match on_exists {
            OnExists::Skip => AdoptOutcome::Skipped,
            OnExists::Overwrite => {
                *existing = incoming;
                AdoptOutcome::Overwritten
            }
            OnExists::Merge => {
                for (k, v) in &incoming.params {
                    existing.params.insert(k.clone(), v.clone());
                }
                for (k, v) in &incoming.published {
                    existing.published.insert(k.clone(), v.clone());
                }
                if incoming.status.rank() > existing.status.rank() {
                    existing.status = incoming.status;
                }
                if incoming.source.is_some() {
                    existing.source = incoming.source;
                }
                AdoptOutcome::Merged
            }
        }
    }
}
