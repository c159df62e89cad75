//! Error handling for the biopm library.
//!
//! One `Error` enum covers the whole failure taxonomy: configuration,
//! parameter resolution, rendering, dependency checks, hook/resolver
//! invocation, run execution, and state-file access. Commands abort on
//! the first fatal error; the only deliberate partial write is a failed
//! run, which records `status: failed` before the error propagates.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for biopm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for biopm operations
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed descriptor, store manifest, or registry entry
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parameter resolution failure (missing/invalid params, aggregated)
    #[error("Parameter error: {0}")]
    Param(String),

    /// Template rendering failure (undefined placeholder, missing source)
    #[error("Render error: {0}")]
    Render(String),

    /// A required prior template is absent or not completed
    #[error("Dependency error: {0}")]
    Dependency(String),

    /// Hook or publish resolver failure, with the offending dotted reference
    #[error("Hook error in '{reference}': {message}")]
    Hook { reference: String, message: String },

    /// Entry script exited non-zero; stdout/stderr are surfaced verbatim
    #[error("Run failed with exit code {exit_code}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}")]
    Run {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// Project or ad-hoc state file missing or unreadable
    #[error("State error: {0}")]
    State(String),

    /// Resource store registry failure
    #[error("Store error: {0}")]
    Store(String),

    /// I/O error with the path that triggered it
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML read/write error with the offending path
    #[error("YAML error at {path}: {message}")]
    Yaml { path: PathBuf, message: String },

    /// Template engine error
    #[error("Template engine error: {0}")]
    Tera(#[from] tera::Error),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new parameter error
    pub fn param<S: Into<String>>(msg: S) -> Self {
        Self::Param(msg.into())
    }

    /// Create a new render error
    pub fn render<S: Into<String>>(msg: S) -> Self {
        Self::Render(msg.into())
    }

    /// Create a new state error
    pub fn state<S: Into<String>>(msg: S) -> Self {
        Self::State(msg.into())
    }

    /// Create a new store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new hook error for a dotted reference
    pub fn hook<R: Into<String>, M: Into<String>>(reference: R, message: M) -> Self {
        Self::Hook {
            reference: reference.into(),
            message: message.into(),
        }
    }

    /// Wrap an I/O error with the path it occurred at
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
