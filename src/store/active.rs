//! The active resource store, resolved once per command.
//!
//! Rather than ambient global state, the active store is an explicit
//! value threaded through every operation: its root, standard folder
//! layout, manifest fields, and the optional config files under
//! `config/` (hosts, authors, settings).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::{Error, Result};
use crate::infrastructure::yamlio::load_yaml;
use crate::store::registry::{STORE_MANIFEST, StoreManifest, StoreRegistry};

pub const DESCRIPTOR_FILENAME: &str = "template.yaml";
pub const WORKFLOW_DESCRIPTOR_FILENAME: &str = "workflow.yaml";

/// Author entry from `config/authors.yaml`
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct Author {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AuthorsFile {
    #[serde(default)]
    authors: Vec<Author>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct HostEntry {
    #[serde(default)]
    mount_prefix: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct HostsFile {
    #[serde(default)]
    hosts: HashMap<String, HostEntry>,
}

/// Project-name policy from `config/settings.yaml`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamePolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PolicySection {
    #[serde(default)]
    project_name: NamePolicy,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    policy: PolicySection,
}

/// Active store context: root paths, manifest, and loaded config
#[derive(Debug, Clone)]
pub struct ActiveStore {
    root: PathBuf,
    pub manifest: StoreManifest,
    pub authors: Vec<Author>,
    /// host key -> local mount prefix
    pub hosts: HashMap<String, String>,
    pub name_policy: NamePolicy,
}

impl ActiveStore {
    /// Resolve the registry's active store and load its config.
    pub fn from_registry(registry: &StoreRegistry) -> Result<Self> {
        let index = registry.load_index()?;
        let active_id = index.active.as_deref().ok_or_else(|| {
            Error::store("no active resource store; run `biopm store activate <id>` first")
        })?;
        let record = index.stores.get(active_id).ok_or_else(|| {
            Error::store(format!("active store '{active_id}' not found in registry"))
        })?;
        let root = PathBuf::from(&record.cache_path);
        if !root.exists() {
            return Err(Error::store(format!(
                "active store path does not exist: {}",
                root.display()
            )));
        }
        Self::open(root)
    }

    /// Open a store directly from a directory (used by tests and
    /// by `store add` validation).
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let manifest: StoreManifest = load_yaml(&root.join(STORE_MANIFEST))?;

        let authors = load_optional::<AuthorsFile>(&root.join("config/authors.yaml"))?
            .unwrap_or_default()
            .authors;
        let hosts = load_optional::<HostsFile>(&root.join("config/hosts.yaml"))?
            .unwrap_or_default()
            .hosts
            .into_iter()
            .map(|(k, v)| (k, v.mount_prefix))
            .collect();
        let name_policy = load_optional::<SettingsFile>(&root.join("config/settings.yaml"))?
            .unwrap_or_default()
            .policy
            .project_name;

        Ok(Self {
            root,
            manifest,
            authors,
            hosts,
            name_policy,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join("templates")
    }

    pub fn template_root(&self, template_id: &str) -> PathBuf {
        self.templates_dir().join(template_id)
    }

    pub fn descriptor_path(&self, template_id: &str) -> PathBuf {
        self.template_root(template_id).join(DESCRIPTOR_FILENAME)
    }

    pub fn workflows_dir(&self) -> PathBuf {
        self.root.join("workflows")
    }

    pub fn workflow_root(&self, workflow_id: &str) -> PathBuf {
        self.workflows_dir().join(workflow_id)
    }

    pub fn workflow_descriptor_path(&self, workflow_id: &str) -> PathBuf {
        self.workflow_root(workflow_id)
            .join(WORKFLOW_DESCRIPTOR_FILENAME)
    }

    pub fn author_by_id(&self, id: &str) -> Option<&Author> {
        self.authors.iter().find(|a| a.id == id)
    }

    /// List template ids available in this store (folders that carry a
    /// descriptor file).
    pub fn list_templates(&self) -> Result<Vec<String>> {
        let dir = self.templates_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| Error::io(&dir, e))? {
            let entry = entry.map_err(|e| Error::io(&dir, e))?;
            if entry.path().join(DESCRIPTOR_FILENAME).exists() {
                ids.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

fn load_optional<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    load_yaml(path).map(Some)
}
