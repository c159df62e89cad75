//! Template descriptors.
//!
//! A descriptor is the `template.yaml` record inside a store's
//! `templates/<id>/` folder: declared parameters, the render plan,
//! the run entry, lifecycle hooks, publish resolvers, dependencies,
//! and advisory tool requirements. The descriptor `id` must equal its
//! folder name; that invariant is enforced at load time.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::core::error::{Error, Result};
use crate::infrastructure::yamlio::load_yaml;
use crate::store::active::ActiveStore;

/// Declared parameter type; CLI values are coerced to this
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    Str,
    Int,
    Float,
    Bool,
}

/// Path existence check applied after placeholder expansion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistsKind {
    File,
    Dir,
    Any,
}

/// One declared parameter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParamSpec {
    #[serde(rename = "type", default)]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default, deserialize_with = "de_exists")]
    pub exists: Option<ExistsKind>,
    #[serde(default)]
    pub description: Option<String>,
    /// Optional dedicated CLI flag name (informational)
    #[serde(default)]
    pub cli: Option<String>,
}

/// Ordered parameter map - declaration order is preserved so error
/// aggregation and help output follow the descriptor.
#[derive(Debug, Clone, Default)]
pub struct ParamMap(Vec<(String, ParamSpec)>);

impl ParamMap {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamSpec)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: Vec<(String, ParamSpec)>) -> Self {
        Self(pairs)
    }
}

impl<'de> Deserialize<'de> for ParamMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct Visitor;

        impl<'de> serde::de::Visitor<'de> for Visitor {
            type Value = ParamMap;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a mapping of parameter name to spec")
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut pairs: Vec<(String, ParamSpec)> = Vec::new();
                while let Some((key, value)) = access.next_entry::<String, ParamSpec>()? {
                    if pairs.iter().any(|(k, _)| *k == key) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate parameter '{key}'"
                        )));
                    }
                    pairs.push((key, value));
                }
                Ok(ParamMap(pairs))
            }
        }

        deserializer.deserialize_map(Visitor)
    }
}

/// One `src -> dst` rule from `render.files`.
///
/// Accepts the compact string form `"run.sh.tera -> run.sh"` or an
/// explicit `{src, dst}` mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMapping {
    pub src: String,
    pub dst: String,
}

impl<'de> Deserialize<'de> for FileMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Line(String),
            Pair { src: String, dst: String },
        }

        match Raw::deserialize(deserializer)? {
            Raw::Line(line) => {
                let (src, dst) = line.split_once("->").ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        "invalid render.files entry '{line}': expected 'src -> dst'"
                    ))
                })?;
                Ok(FileMapping {
                    src: src.trim().to_string(),
                    dst: dst.trim().to_string(),
                })
            }
            Raw::Pair { src, dst } => Ok(FileMapping { src, dst }),
        }
    }
}

/// `render` section
#[derive(Debug, Clone, Deserialize)]
pub struct RenderSpec {
    #[serde(default = "default_render_into")]
    pub into: String,
    #[serde(default)]
    pub files: Vec<FileMapping>,
    /// Project mode only: inserted one level above the template's own
    /// folder segment in the target path
    #[serde(default)]
    pub parent_directory: Option<String>,
}

impl Default for RenderSpec {
    fn default() -> Self {
        Self {
            into: default_render_into(),
            files: Vec::new(),
            parent_directory: None,
        }
    }
}

fn default_render_into() -> String {
    "${ctx.project.name}/${ctx.template.id}".to_string()
}

/// `run` section
#[derive(Debug, Clone, Deserialize)]
pub struct RunSpec {
    pub entry: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Lifecycle hooks: ordered dotted callable references per point
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HooksSpec {
    #[serde(default)]
    pub pre_render: Vec<String>,
    #[serde(default)]
    pub post_render: Vec<String>,
    #[serde(default)]
    pub pre_run: Vec<String>,
    #[serde(default)]
    pub post_run: Vec<String>,
}

/// One `publish` entry: resolver reference plus static args
#[derive(Debug, Clone)]
pub struct PublishSpec {
    pub resolver: String,
    pub args: Map<String, Value>,
}

/// Advisory tool requirements - warnings only, never enforced
#[derive(Debug, Clone, Default)]
pub struct ToolsSpec {
    pub required: Vec<String>,
    pub optional: Vec<String>,
}

/// Which store folder a descriptor was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Template,
    Workflow,
}

/// In-memory representation of `template.yaml` (or `workflow.yaml`;
/// workflows share the descriptor shape)
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub id: String,
    pub kind: DescriptorKind,
    pub description: Option<String>,
    pub params: ParamMap,
    pub render: RenderSpec,
    pub run: Option<RunSpec>,
    pub hooks: HooksSpec,
    pub publish: Vec<(String, PublishSpec)>,
    pub required_templates: Vec<String>,
    pub tools: ToolsSpec,
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    id: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    params: ParamMap,
    #[serde(default)]
    render: RenderSpec,
    #[serde(default)]
    run: Option<RunSpec>,
    #[serde(default)]
    hooks: HooksSpec,
    #[serde(default)]
    publish: BTreeMap<String, Value>,
    #[serde(default)]
    required_templates: Vec<String>,
    #[serde(default)]
    tools: Option<Value>,
}

impl Descriptor {
    /// Load and validate the descriptor for `template_id` from the
    /// active store.
    pub fn load(store: &ActiveStore, template_id: &str) -> Result<Self> {
        let path = store.descriptor_path(template_id);
        if !path.exists() {
            return Err(Error::config(format!(
                "template '{template_id}' not found in store '{}' (missing {})",
                store.manifest.id,
                path.display()
            )));
        }
        let raw: RawDescriptor = load_yaml(&path)?;
        Self::from_raw(raw, template_id, DescriptorKind::Template)
    }

    /// Load `workflows/<id>/workflow.yaml`. Workflows reuse the
    /// template descriptor shape; a missing `id` falls back to the
    /// folder name.
    pub fn load_workflow(store: &ActiveStore, workflow_id: &str) -> Result<Self> {
        let path = store.workflow_descriptor_path(workflow_id);
        if !path.exists() {
            return Err(Error::config(format!(
                "workflow '{workflow_id}' not found in store '{}' (missing {})",
                store.manifest.id,
                path.display()
            )));
        }
        let mut raw: RawDescriptor = load_yaml(&path)?;
        raw.id.get_or_insert_with(|| workflow_id.to_string());
        Self::from_raw(raw, workflow_id, DescriptorKind::Workflow)
    }

    /// Directory the descriptor's source files resolve against.
    pub fn source_root(&self, store: &ActiveStore) -> PathBuf {
        match self.kind {
            DescriptorKind::Template => store.template_root(&self.id),
            DescriptorKind::Workflow => store.workflow_root(&self.id),
        }
    }

    fn from_raw(raw: RawDescriptor, template_id: &str, kind: DescriptorKind) -> Result<Self> {
        match raw.id.as_deref() {
            Some(id) if id == template_id => {}
            other => {
                return Err(Error::config(format!(
                    "descriptor id mismatch: expected '{template_id}', got '{}'",
                    other.unwrap_or("<missing>")
                )));
            }
        }

        let mut publish = Vec::new();
        for (key, value) in raw.publish {
            publish.push((key.clone(), normalize_publish(&key, value)?));
        }

        Ok(Self {
            id: template_id.to_string(),
            kind,
            description: raw.description,
            params: raw.params,
            render: raw.render,
            run: raw.run,
            hooks: raw.hooks,
            publish,
            required_templates: raw.required_templates,
            tools: normalize_tools(raw.tools)?,
        })
    }
}

fn normalize_publish(key: &str, value: Value) -> Result<PublishSpec> {
    match value {
        // Bare string shorthand for {resolver: <s>, args: {}}
        Value::String(resolver) => Ok(PublishSpec {
            resolver,
            args: Map::new(),
        }),
        Value::Object(mut map) => {
            let resolver = match map.remove("resolver") {
                Some(Value::String(s)) => s,
                Some(_) => {
                    return Err(Error::config(format!(
                        "publish entry '{key}': 'resolver' must be a string"
                    )));
                }
                None => {
                    return Err(Error::config(format!(
                        "publish entry '{key}' missing 'resolver' key"
                    )));
                }
            };
            let args = match map.remove("args") {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(args)) => args,
                Some(_) => {
                    return Err(Error::config(format!(
                        "publish entry '{key}': 'args' must be a mapping"
                    )));
                }
            };
            Ok(PublishSpec { resolver, args })
        }
        _ => Err(Error::config(format!(
            "publish entry '{key}' must be a string or mapping"
        ))),
    }
}

fn normalize_tools(value: Option<Value>) -> Result<ToolsSpec> {
    let Some(value) = value else {
        return Ok(ToolsSpec::default());
    };
    match value {
        // A bare list means every listed tool is required.
        Value::Array(items) => Ok(ToolsSpec {
            required: string_list(items, "tools")?,
            optional: Vec::new(),
        }),
        Value::Object(mut map) => {
            let required = match map.remove("required") {
                Some(Value::Array(items)) => string_list(items, "tools.required")?,
                None | Some(Value::Null) => Vec::new(),
                Some(_) => return Err(Error::config("tools.required must be a list")),
            };
            let optional = match map.remove("optional") {
                Some(Value::Array(items)) => string_list(items, "tools.optional")?,
                None | Some(Value::Null) => Vec::new(),
                Some(_) => return Err(Error::config("tools.optional must be a list")),
            };
            Ok(ToolsSpec { required, optional })
        }
        _ => Err(Error::config("tools must be a list or mapping")),
    }
}

fn string_list(items: Vec<Value>, field: &str) -> Result<Vec<String>> {
    items
        .into_iter()
        .map(|v| match v {
            Value::String(s) => Ok(s),
            other => Err(Error::config(format!(
                "{field} entries must be strings, got {other}"
            ))),
        })
        .collect()
}

fn de_exists<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<ExistsKind>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None | Some(Raw::Bool(false)) => Ok(None),
        // `exists: true` is shorthand for `exists: any`
        Some(Raw::Bool(true)) => Ok(Some(ExistsKind::Any)),
        Some(Raw::Text(s)) => match s.to_lowercase().as_str() {
            "file" => Ok(Some(ExistsKind::File)),
            "dir" => Ok(Some(ExistsKind::Dir)),
            "any" => Ok(Some(ExistsKind::Any)),
            "none" => Ok(None),
            other => Err(serde::de::Error::custom(format!(
                "invalid exists value '{other}' (expected file|dir|any|none)"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const MANIFEST: &str = "id: demo\nname: Demo\nversion: \"1.0.0\"\n";

    fn store_with_descriptor(yaml: &str) -> (tempfile::TempDir, ActiveStore) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("store.yaml"), MANIFEST).unwrap();
        fs::create_dir_all(dir.path().join("templates/hello")).unwrap();
        fs::write(dir.path().join("templates/hello/template.yaml"), yaml).unwrap();
        let store = ActiveStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_load_full_descriptor() {
        let yaml = r#"
id: hello
description: Greeting template
params:
  threads:
    type: int
    default: 8
  sample_id:
    type: str
    required: true
  fastq_dir:
    type: str
    exists: dir
render:
  into: "${ctx.project.name}/${ctx.template.id}"
  files:
    - "run.sh.tera -> run.sh"
    - src: config.yaml
      dst: config.yaml
run:
  entry: run.sh
  args: ["--threads", "${ctx.params.threads}"]
  env:
    LANG: C
hooks:
  post_render:
    - hooks.finalize
publish:
  report: resolvers.report_path
  qc:
    resolver: "resolvers.qc:collect"
    args:
      min_reads: 1000
required_templates:
  - demultiplex
tools:
  required: [fastqc]
  optional: [multiqc]
"#;
        let (_dir, store) = store_with_descriptor(yaml);
        let desc = Descriptor::load(&store, "hello").unwrap();

        assert_eq!(desc.id, "hello");
        assert_eq!(desc.params.len(), 3);
        let keys: Vec<&str> = desc.params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["threads", "sample_id", "fastq_dir"]);
        assert_eq!(desc.params.get("threads").unwrap().param_type, ParamType::Int);
        assert!(desc.params.get("sample_id").unwrap().required);
        assert_eq!(
            desc.params.get("fastq_dir").unwrap().exists,
            Some(ExistsKind::Dir)
        );

        assert_eq!(desc.render.files.len(), 2);
        assert_eq!(
            desc.render.files[0],
            FileMapping {
                src: "run.sh.tera".to_string(),
                dst: "run.sh".to_string()
            }
        );

        let run = desc.run.as_ref().unwrap();
        assert_eq!(run.entry, "run.sh");
        assert_eq!(run.env.get("LANG").unwrap(), "C");

        assert_eq!(desc.hooks.post_render, vec!["hooks.finalize"]);
        assert_eq!(desc.publish.len(), 2);
        let (key, spec) = &desc.publish[1];
        assert_eq!(key, "report");
        assert_eq!(spec.resolver, "resolvers.report_path");
        assert_eq!(desc.required_templates, vec!["demultiplex"]);
        assert_eq!(desc.tools.required, vec!["fastqc"]);
    }

    #[test]
    fn test_id_mismatch_is_config_error() {
        let (_dir, store) = store_with_descriptor("id: other\n");
        let err = Descriptor::load(&store, "hello").unwrap_err();
        assert!(err.to_string().contains("descriptor id mismatch"));
    }

    #[test]
    fn test_missing_descriptor_names_template() {
        let (_dir, store) = store_with_descriptor("id: hello\n");
        let err = Descriptor::load(&store, "absent").unwrap_err();
        assert!(err.to_string().contains("template 'absent' not found"));
    }

    #[test]
    fn test_publish_missing_resolver_names_key() {
        let yaml = "id: hello\npublish:\n  report:\n    args: {}\n";
        let (_dir, store) = store_with_descriptor(yaml);
        let err = Descriptor::load(&store, "hello").unwrap_err();
        assert!(err.to_string().contains("publish entry 'report' missing 'resolver' key"));
    }

    #[test]
    fn test_exists_true_means_any() {
        let yaml = "id: hello\nparams:\n  p:\n    exists: true\n";
        let (_dir, store) = store_with_descriptor(yaml);
        let desc = Descriptor::load(&store, "hello").unwrap();
        assert_eq!(desc.params.get("p").unwrap().exists, Some(ExistsKind::Any));
    }

    #[test]
    fn test_bad_file_mapping_rejected() {
        let yaml = "id: hello\nrender:\n  files:\n    - \"no-arrow-here\"\n";
        let (_dir, store) = store_with_descriptor(yaml);
        assert!(Descriptor::load(&store, "hello").is_err());
    }

    #[test]
    fn test_bare_tools_list_is_required() {
        let yaml = "id: hello\ntools: [bcl-convert, fastqc]\n";
        let (_dir, store) = store_with_descriptor(yaml);
        let desc = Descriptor::load(&store, "hello").unwrap();
        assert_eq!(desc.tools.required, vec!["bcl-convert", "fastqc"]);
        assert!(desc.tools.optional.is_empty());
    }

    #[test]
    fn test_default_render_into() {
        let (_dir, store) = store_with_descriptor("id: hello\n");
        let desc = Descriptor::load(&store, "hello").unwrap();
        assert_eq!(desc.render.into, "${ctx.project.name}/${ctx.template.id}");
    }
}
