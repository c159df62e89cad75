//! Ad-hoc render metadata (`biopm.meta.yaml`).
//!
//! When a template is rendered outside a project (`--out` without a
//! project directory), a small metadata file is written next to the
//! output so the directory can later be adopted into a project.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{Error, Result};
use crate::infrastructure::yamlio::{load_yaml, save_yaml_atomic};
use crate::state::project::{EntryStatus, TemplateEntry, TemplateSource};

pub const ADHOC_META_FILENAME: &str = "biopm.meta.yaml";

/// Provenance of an ad-hoc render
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdhocSource {
    pub store_id: String,
    pub store_version: String,
    pub template_id: String,
}

/// Metadata written into an ad-hoc output directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdhocMeta {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<AdhocSource>,
    #[serde(default)]
    pub status: EntryStatus,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub published: Map<String, Value>,
}

impl AdhocMeta {
    pub fn new(source: Option<AdhocSource>) -> Self {
        Self {
            schema_version: 1,
            source,
            status: EntryStatus::NotStarted,
            params: Map::new(),
            published: Map::new(),
        }
    }

    pub fn file_path(dir: &Path) -> PathBuf {
        dir.join(ADHOC_META_FILENAME)
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = Self::file_path(dir);
        if !path.exists() {
            return Err(Error::state(format!(
                "no {} found in {}; not an ad-hoc output directory",
                ADHOC_META_FILENAME,
                dir.display()
            )));
        }
        load_yaml(&path)
    }

    /// Load the metadata if present, else start a fresh record.
    pub fn load_or_new(dir: &Path, source: Option<AdhocSource>) -> Result<Self> {
        if Self::file_path(dir).exists() {
            Self::load(dir)
        } else {
            Ok(Self::new(source))
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        save_yaml_atomic(&Self::file_path(dir), self)
    }

    /// The template id this directory was rendered from, when known.
    pub fn template_id(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.template_id.as_str())
    }

    /// Project-entry view of this metadata, used by adopt.
    pub fn to_entry(&self, id: &str) -> TemplateEntry {
        TemplateEntry {
            id: id.to_string(),
            source_template: self
                .template_id()
                .unwrap_or(id)
                .to_string(),
            status: self.status,
            params: self.params.clone(),
            published: self.published.clone(),
            source: self.source.as_ref().map(|s| TemplateSource {
                store_id: s.store_id.clone(),
                store_version: s.store_version.clone(),
            }),
            rendered_at: None,
            last_error: None,
        }
    }
}
