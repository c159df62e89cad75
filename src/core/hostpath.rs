//! Host-aware path strings.
//!
//! A `HostPath` is the portable location form persisted in project
//! state: `host:/abs/posix/path`. The host key maps to a local mount
//! prefix in the active store's `config/hosts.yaml`, so the same
//! project file works on machines with different mount points.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

/// Canonical host-qualified path: `host:/abs/path`.
///
/// Two `HostPath`s are equal iff their normalized `(host, path)` pairs
/// match. Materializing with an unknown host is an explicit error,
/// never a silent fallback to the wrong directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostPath {
    host: String,
    abs_path: String,
}

impl HostPath {
    /// Parse a raw string, qualifying bare absolute paths with `current_host`.
    ///
    /// Accepts `host:/abs/path`, `host:rel/path` (leading slash added),
    /// or a bare `/abs/path`.
    pub fn from_raw(raw: &str, current_host: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(Error::config("empty host path"));
        }
        match raw.split_once(':') {
            Some((host, rest)) => {
                if host.trim().is_empty() {
                    return Err(Error::config(format!("host path missing host: '{raw}'")));
                }
                let path = if rest.starts_with('/') {
                    rest.to_string()
                } else {
                    format!("/{rest}")
                };
                Ok(Self {
                    host: host.trim().to_string(),
                    abs_path: normalize(&path),
                })
            }
            None => {
                let path = if raw.starts_with('/') {
                    raw.to_string()
                } else {
                    format!("/{raw}")
                };
                Ok(Self {
                    host: current_host.to_string(),
                    abs_path: normalize(&path),
                })
            }
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn abs_path(&self) -> &str {
        &self.abs_path
    }

    /// Convert to a local filesystem path using a host -> mount-prefix map.
    ///
    /// The prefix is joined in front of the stored absolute path. An
    /// unknown host fails explicitly.
    pub fn materialize(&self, hosts: &HashMap<String, String>) -> Result<PathBuf> {
        let prefix = hosts.get(&self.host).ok_or_else(|| {
            Error::config(format!(
                "unknown host '{}' in path '{}' (known hosts: {})",
                self.host,
                self,
                known_hosts(hosts)
            ))
        })?;
        if prefix.is_empty() {
            return Ok(PathBuf::from(&self.abs_path));
        }
        let joined = format!(
            "{}/{}",
            prefix.trim_end_matches('/'),
            self.abs_path.trim_start_matches('/')
        );
        Ok(PathBuf::from(joined))
    }
}

impl fmt::Display for HostPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.abs_path)
    }
}

impl TryFrom<String> for HostPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        // Serialized form always carries an explicit host.
        if !value.contains(':') {
            return Err(Error::config(format!(
                "host path '{value}' missing 'host:' prefix"
            )));
        }
        HostPath::from_raw(&value, "")
    }
}

impl From<HostPath> for String {
    fn from(value: HostPath) -> Self {
        value.to_string()
    }
}

fn normalize(path: &str) -> String {
    // Collapse duplicate slashes and strip a trailing one (keep root "/").
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for ch in path.chars() {
        if ch == '/' {
            if !prev_slash {
                out.push(ch);
            }
            prev_slash = true;
        } else {
            out.push(ch);
            prev_slash = false;
        }
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

fn known_hosts(hosts: &HashMap<String, String>) -> String {
    let mut keys: Vec<&str> = hosts.keys().map(String::as_str).collect();
    keys.sort_unstable();
    if keys.is_empty() {
        "none".to_string()
    } else {
        keys.join(", ")
    }
}
