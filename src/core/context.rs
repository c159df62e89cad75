//! Invocation context - the read-only bundle threaded through
//! rendering, hooks, and publish resolvers.
//!
//! A `Ctx` is built once at the start of a render/run/publish command
//! and never mutated afterwards; if resolution changes the params, a
//! new context is built.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::error::Result;
use crate::core::hostpath::HostPath;

/// Minimal project view exposed to templates, hooks, and resolvers
#[derive(Debug, Clone, Serialize)]
pub struct CtxProject {
    pub name: String,
    /// Host-aware path string, e.g. `nextgen:/projects/250901_Demo`
    pub project_path: String,
}

/// Minimal template view for the current operation
#[derive(Debug, Clone, Serialize)]
pub struct CtxTemplate {
    /// Instance id (alias when rendered with `--alias`)
    pub id: String,
    pub render_into: String,
    pub run_entry: Option<String>,
}

/// Unified context passed into Tera, hooks, and publish resolvers
#[derive(Debug, Clone, Serialize)]
pub struct Ctx {
    /// Project view, absent in ad-hoc mode
    pub project: Option<CtxProject>,
    pub template: CtxTemplate,
    /// Final resolved parameter values
    pub params: Map<String, Value>,
    /// Render/run base directory
    pub cwd: PathBuf,
}

impl Ctx {
    pub fn new(
        project: Option<CtxProject>,
        template: CtxTemplate,
        params: Map<String, Value>,
        cwd: &Path,
    ) -> Self {
        Self {
            project,
            template,
            params,
            cwd: cwd.to_path_buf(),
        }
    }

    /// JSON view of the whole context, used for `${ctx.*}` lookup and
    /// for serializing the context to hook/resolver processes.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Tera context with the whole bundle exposed under the `ctx` key.
    pub fn to_tera(&self) -> tera::Context {
        let mut c = tera::Context::new();
        c.insert("ctx", self);
        c
    }

    /// Resolve a dotted path like `project.name` against this context.
    pub fn lookup(&self, dotted: &str) -> Option<Value> {
        let mut cur = self.to_json();
        for part in dotted.split('.') {
            cur = cur.get(part)?.clone();
        }
        Some(cur)
    }

    /// Local base directory for this invocation: the materialized
    /// project path in project mode, `cwd` in ad-hoc mode.
    pub fn project_dir(&self, hosts: &HashMap<String, String>) -> Result<PathBuf> {
        match &self.project {
            Some(p) => {
                let hp = HostPath::from_raw(&p.project_path, "local")?;
                hp.materialize(hosts)
            }
            None => Ok(self.cwd.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_ctx() -> Ctx {
        let mut params = Map::new();
        params.insert("threads".to_string(), json!(8));
        params.insert("sample_id".to_string(), json!("S42"));
        Ctx::new(
            Some(CtxProject {
                name: "250903_TEST".to_string(),
                project_path: "nextgen:/projects/250903_TEST".to_string(),
            }),
            CtxTemplate {
                id: "hello".to_string(),
                render_into: "${ctx.project.name}/${ctx.template.id}".to_string(),
                run_entry: Some("run.sh".to_string()),
            },
            params,
            Path::new("/work"),
        )
    }

    #[test]
    fn test_lookup_project_name() {
        let ctx = sample_ctx();
        assert_eq!(ctx.lookup("project.name"), Some(json!("250903_TEST")));
    }

    #[test]
    fn test_lookup_params() {
        let ctx = sample_ctx();
        assert_eq!(ctx.lookup("params.threads"), Some(json!(8)));
        assert_eq!(ctx.lookup("params.nope"), None);
    }

    #[test]
    fn test_lookup_template_id() {
        let ctx = sample_ctx();
        assert_eq!(ctx.lookup("template.id"), Some(json!("hello")));
    }

    #[test]
    fn test_project_dir_materializes_hostpath() {
        let ctx = sample_ctx();
        let mut hosts = HashMap::new();
        hosts.insert("nextgen".to_string(), "/mnt/nextgen".to_string());
        assert_eq!(
            ctx.project_dir(&hosts).unwrap(),
            PathBuf::from("/mnt/nextgen/projects/250903_TEST")
        );
    }

    #[test]
    fn test_project_dir_adhoc_falls_back_to_cwd() {
        let mut ctx = sample_ctx();
        ctx.project = None;
        assert_eq!(
            ctx.project_dir(&HashMap::new()).unwrap(),
            PathBuf::from("/work")
        );
    }

    #[test]
    fn test_to_tera_exposes_ctx_key() {
        let ctx = sample_ctx();
        let mut tera = tera::Tera::default();
        tera.add_raw_template("t", "{{ ctx.project.name }}/{{ ctx.params.sample_id }}")
            .unwrap();
        let out = tera.render("t", &ctx.to_tera()).unwrap();
        assert_eq!(out, "250903_TEST/S42");
    }
}
