//! YAML read/write primitives.
//!
//! Every persisted mapping (project state, ad-hoc metadata, template
//! descriptors, store registry) goes through these two functions.
//! Writes are atomic: serialize to a temp file next to the target,
//! then rename over it, so readers never observe a partial file.

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::{Error, Result};

/// Read a YAML mapping from `path` into `T`.
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    serde_yaml::from_str(&text).map_err(|e| Error::Yaml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Atomically write `value` as YAML to `path`.
///
/// Creates parent directories as needed. The temp file lives in the
/// same directory as the target so the final rename stays on one
/// filesystem.
pub fn save_yaml_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_yaml::to_string(value).map_err(|e| Error::Yaml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, text).map_err(|e| Error::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::io(path, e)
    })?;
    Ok(())
}
