//! Resource store registry.
//!
//! Stores are directory snapshots cached under the biopm cache root
//! (`$BIOPM_CACHE` or `~/.biopm`), tracked in `stores.yaml`. Exactly
//! one store may be active at a time; every template command resolves
//! its descriptors, hooks, and resolvers against the active store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::{Error, Result};
use crate::infrastructure::exec::run_process;
use crate::infrastructure::fsio::{copy_tree, remove_tree};
use crate::infrastructure::yamlio::{load_yaml, save_yaml_atomic};

pub const STORES_FILENAME: &str = "stores.yaml";
pub const STORE_MANIFEST: &str = "store.yaml";

/// One cached resource store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRecord {
    pub id: String,
    /// Where the snapshot came from (local path for now)
    pub source: String,
    pub cache_path: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// Persisted registry of all known stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreIndex {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,
    #[serde(default)]
    pub stores: BTreeMap<String, StoreRecord>,
}

impl Default for StoreIndex {
    fn default() -> Self {
        Self {
            schema_version: 1,
            updated: None,
            active: None,
            stores: BTreeMap::new(),
        }
    }
}

/// `store.yaml` manifest at the root of every resource store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,
}

/// Registry handle rooted at a cache directory.
///
/// Constructed once per command invocation; all mutations re-read and
/// fully rewrite `stores.yaml` (last writer wins, per the shared
/// resource discipline).
#[derive(Debug, Clone)]
pub struct StoreRegistry {
    cache_root: PathBuf,
}

impl StoreRegistry {
    /// Open the registry at the default cache root
    /// (`$BIOPM_CACHE`, else `~/.biopm`).
    pub fn open_default() -> Result<Self> {
        let root = match std::env::var_os("BIOPM_CACHE") {
            Some(v) => PathBuf::from(v),
            None => dirs::home_dir()
                .ok_or_else(|| Error::store("cannot determine home directory for cache root"))?
                .join(".biopm"),
        };
        Ok(Self::open(root))
    }

    pub fn open(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.cache_root.join(STORES_FILENAME)
    }

    fn snapshots_dir(&self) -> PathBuf {
        self.cache_root.join("stores")
    }

    pub fn load_index(&self) -> Result<StoreIndex> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(StoreIndex::default());
        }
        load_yaml(&path)
    }

    fn save_index(&self, mut index: StoreIndex) -> Result<()> {
        index.updated = Some(now_iso());
        save_yaml_atomic(&self.index_path(), &index)
    }

    /// Add a store from a local directory snapshot, validating its
    /// manifest first. Re-adding an existing id refreshes the cache.
    pub fn add(&self, source: &Path, activate: bool) -> Result<StoreRecord> {
        let source = source
            .canonicalize()
            .map_err(|e| Error::io(source, e))?;
        let manifest = read_manifest(&source)?;

        let dest = self.snapshots_dir().join(&manifest.id);
        remove_tree(&dest)?;
        copy_tree(&source, &dest)?;

        let record = StoreRecord {
            id: manifest.id.clone(),
            source: source.to_string_lossy().to_string(),
            cache_path: dest.to_string_lossy().to_string(),
            version: manifest.version.clone(),
            commit: detect_git_commit(&dest),
            last_updated: Some(now_iso()),
        };

        let mut index = self.load_index()?;
        index.stores.insert(manifest.id.clone(), record.clone());
        if activate {
            index.active = Some(manifest.id.clone());
        }
        self.save_index(index)?;
        info!(store = %manifest.id, version = %manifest.version, "Added resource store");
        Ok(record)
    }

    pub fn activate(&self, store_id: &str) -> Result<()> {
        let mut index = self.load_index()?;
        if !index.stores.contains_key(store_id) {
            return Err(Error::store(format!("unknown store id: {store_id}")));
        }
        index.active = Some(store_id.to_string());
        self.save_index(index)
    }

    /// Remove a store and its cached snapshot. Idempotent.
    pub fn remove(&self, store_id: &str) -> Result<()> {
        let mut index = self.load_index()?;
        let Some(record) = index.stores.remove(store_id) else {
            return Ok(());
        };
        remove_tree(Path::new(&record.cache_path))?;
        if index.active.as_deref() == Some(store_id) {
            index.active = None;
        }
        self.save_index(index)
    }

    /// Re-read the cached manifest and refresh version/commit metadata.
    pub fn update(&self, store_id: &str) -> Result<StoreRecord> {
        let mut index = self.load_index()?;
        let record = index
            .stores
            .get_mut(store_id)
            .ok_or_else(|| Error::store(format!("unknown store id: {store_id}")))?;
        let cache_path = PathBuf::from(&record.cache_path);
        let manifest = read_manifest(&cache_path)?;
        record.version = manifest.version;
        record.commit = detect_git_commit(&cache_path);
        record.last_updated = Some(now_iso());
        let updated = record.clone();
        self.save_index(index)?;
        Ok(updated)
    }

    pub fn info(&self, store_id: &str) -> Result<StoreRecord> {
        self.load_index()?
            .stores
            .get(store_id)
            .cloned()
            .ok_or_else(|| Error::store(format!("unknown store id: {store_id}")))
    }
}

fn read_manifest(store_root: &Path) -> Result<StoreManifest> {
    let path = store_root.join(STORE_MANIFEST);
    if !path.exists() {
        return Err(Error::store(format!(
            "{} not found in {}",
            STORE_MANIFEST,
            store_root.display()
        )));
    }
    load_yaml(&path)
}

fn detect_git_commit(path: &Path) -> Option<String> {
    if !path.join(".git").exists() {
        return None;
    }
    let out = run_process(
        "git",
        &["rev-parse".to_string(), "HEAD".to_string()],
        path,
        &BTreeMap::new(),
        None,
    )
    .ok()?;
    if out.is_success() {
        let commit = out.stdout.trim().to_string();
        debug!(%commit, "Detected store commit");
        (!commit.is_empty()).then_some(commit)
    } else {
        None
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
