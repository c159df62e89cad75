//! Filesystem primitives used by the renderer and store registry.

use std::fs;
use std::path::Path;

use crate::core::{Error, Result};

/// Create a directory and its parents. No-op if it already exists.
pub fn mkdirp(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| Error::io(path, e))
}

/// Write text to a file, creating parent directories as needed.
pub fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        mkdirp(parent)?;
    }
    fs::write(path, text).map_err(|e| Error::io(path, e))
}

/// Copy a file byte-for-byte, creating destination parents.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        mkdirp(parent)?;
    }
    fs::copy(src, dst).map_err(|e| Error::io(src, e))?;
    Ok(())
}

/// Add execute bits (u/g/o) to a file. No-op if it does not exist.
pub fn make_executable(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let meta = fs::metadata(path).map_err(|e| Error::io(path, e))?;
        let mut perms = meta.permissions();
        perms.set_mode(perms.mode() | 0o111);
        fs::set_permissions(path, perms).map_err(|e| Error::io(path, e))?;
    }
    Ok(())
}

/// Recursively copy a directory tree (store snapshots).
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    mkdirp(dst)?;
    for entry in fs::read_dir(src).map_err(|e| Error::io(src, e))? {
        let entry = entry.map_err(|e| Error::io(src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| Error::io(&from, e))?;
        if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else if file_type.is_file() {
            fs::copy(&from, &to).map_err(|e| Error::io(&from, e))?;
        }
        // Symlinks in store snapshots are skipped rather than followed.
    }
    Ok(())
}

/// Remove a directory tree if present.
pub fn remove_tree(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path).map_err(|e| Error::io(path, e))?;
    }
    Ok(())
}
