//! Callable references and their invocation seam.
//!
//! Hooks and publish resolvers are named by dotted references like
//! `hooks.prepare:main` that resolve to scripts inside the active
//! store. The `CallableInvoker` trait decouples the lifecycle logic
//! from process execution; tests substitute an in-memory invoker.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::core::context::Ctx;
use crate::core::{Error, Result};
use crate::infrastructure::exec::run_process;

/// Default function name when a reference omits `:func`
pub const DEFAULT_FUNC: &str = "main";

/// Extensions tried when resolving a dotted reference to a script
const SCRIPT_EXTENSIONS: &[&str] = &["", ".sh", ".py"];

/// Parsed form of a dotted callable reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallableRef {
    /// Dotted module path, e.g. `hooks.prepare`
    pub module: String,
    pub func: String,
}

impl CallableRef {
    /// Parse `module.path[:func]`; the function defaults to `main`.
    pub fn parse(raw: &str) -> Result<Self> {
        let (module, func) = match raw.split_once(':') {
            Some((m, f)) => (m, f),
            None => (raw, DEFAULT_FUNC),
        };
        if module.is_empty()
            || func.is_empty()
            || module.split('.').any(|part| {
                part.is_empty()
                    || !part
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_')
            })
        {
            return Err(Error::config(format!("invalid callable reference: {raw}")));
        }
        Ok(Self {
            module: module.to_string(),
            func: func.to_string(),
        })
    }

    /// Relative path of the module inside a store, without extension.
    pub fn relative_path(&self) -> PathBuf {
        self.module.split('.').collect()
    }
}

impl std::fmt::Display for CallableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.module, self.func)
    }
}

/// Seam for invoking hooks and publish resolvers
pub trait CallableInvoker {
    fn invoke(&self, reference: &CallableRef, ctx: &Ctx, args: &Map<String, Value>)
    -> Result<Value>;
}

/// Production invoker: runs the referenced store script as a child
/// process.
///
/// The payload `{func, ctx, args}` is serialized to JSON on stdin and
/// the trimmed stdout is parsed back as a JSON value (empty output is
/// `null`, non-JSON output is kept as a plain string). A non-zero
/// exit is fatal.
pub struct StoreScriptInvoker {
    store_root: PathBuf,
}

impl StoreScriptInvoker {
    pub fn new(store_root: impl Into<PathBuf>) -> Self {
        Self {
            store_root: store_root.into(),
        }
    }

    /// Dotted references resolve inside the active store only.
    fn resolve_script(&self, reference: &CallableRef) -> Result<PathBuf> {
        let base = self.store_root.join(reference.relative_path());
        for ext in SCRIPT_EXTENSIONS {
            let candidate = if ext.is_empty() {
                base.clone()
            } else {
                PathBuf::from(format!("{}{ext}", base.display()))
            };
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(Error::hook(
            reference.to_string(),
            format!("script not found under store: {}", base.display()),
        ))
    }
}

impl CallableInvoker for StoreScriptInvoker {
    fn invoke(
        &self,
        reference: &CallableRef,
        ctx: &Ctx,
        args: &Map<String, Value>,
    ) -> Result<Value> {
        let script = self.resolve_script(reference)?;
        let payload = json!({
            "func": reference.func,
            "ctx": ctx.to_json(),
            "args": args,
        })
        .to_string();

        let (program, argv) = interpreter_for(&script);
        debug!(reference = %reference, script = %script.display(), "Invoking store callable");
        let out = run_process(&program, &argv, &self.store_root, &BTreeMap::new(), Some(&payload))
            .map_err(|e| Error::hook(reference.to_string(), e.to_string()))?;

        if !out.is_success() {
            return Err(Error::hook(
                reference.to_string(),
                format!(
                    "exited with code {}: {}",
                    out.exit_code,
                    out.stderr.trim()
                ),
            ));
        }

        let stdout = out.stdout.trim();
        if stdout.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(stdout).unwrap_or_else(|_| Value::String(stdout.to_string())))
    }
}

fn interpreter_for(script: &Path) -> (String, Vec<String>) {
    let path = script.to_string_lossy().to_string();
    match script.extension().and_then(|e| e.to_str()) {
        Some("py") => ("python3".to_string(), vec![path]),
        Some("sh") => ("sh".to_string(), vec![path]),
        _ => (path, Vec::new()),
    }
}
