//! Parameter resolution.
//!
//! Final parameter values come from three sources, lowest to highest
//! precedence: descriptor defaults, project-stored values, CLI
//! `--param KEY=VALUE` overrides. CLI values arrive as strings and are
//! coerced to the declared type. Problems are aggregated: one error
//! lists every missing or invalid parameter, not just the first.
//!
//! Pure function over its inputs; the only filesystem access is the
//! optional `exists` validation of path-like values.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value, json};

use crate::core::context::Ctx;
use crate::core::descriptor::{Descriptor, ExistsKind, ParamType};
use crate::core::error::{Error, Result};
use crate::core::interpolate::expand_path;

/// Parse repeated `--param KEY=VALUE` arguments.
pub fn parse_cli_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            Error::param(format!("invalid --param '{pair}': expected KEY=VALUE"))
        })?;
        out.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(out)
}

/// Compute final parameter values for a template.
///
/// `stored` holds the params persisted for this template id (empty in
/// a first render); `ctx_like` is a params-free context used only for
/// `${ctx.*}` expansion of string values.
pub fn resolve(
    descriptor: &Descriptor,
    stored: &Map<String, Value>,
    cli: &BTreeMap<String, String>,
    ctx_like: &Ctx,
) -> Result<Map<String, Value>> {
    // Reject overrides for parameters the descriptor never declared.
    let unknown: Vec<&str> = cli
        .keys()
        .filter(|k| !descriptor.params.contains(k))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(Error::param(format!(
            "unknown parameter(s) for template '{}': {}",
            descriptor.id,
            unknown.join(", ")
        )));
    }

    let mut merged: Map<String, Value> = Map::new();

    // 1) descriptor defaults
    for (name, spec) in descriptor.params.iter() {
        if let Some(default) = &spec.default {
            if !default.is_null() {
                merged.insert(name.to_string(), default.clone());
            }
        }
    }

    // 2) project-stored values
    for (name, value) in stored {
        merged.insert(name.clone(), value.clone());
    }

    // 3) CLI overrides
    for (name, value) in cli {
        merged.insert(name.clone(), Value::String(value.clone()));
    }

    // 4) coercion + ${ctx.*} expansion + exists checks, aggregated
    let mut problems: Vec<String> = Vec::new();
    for (name, spec) in descriptor.params.iter() {
        let Some(value) = merged.get(name).cloned() else {
            continue;
        };
        let coerced = match coerce(&value, spec.param_type) {
            Ok(v) => v,
            Err(msg) => {
                problems.push(format!("{name}: {msg}"));
                continue;
            }
        };
        let expanded = match &coerced {
            Value::String(s) if s.contains("${ctx.") => match expand_path(s, ctx_like) {
                Ok(out) => Value::String(out),
                Err(e) => {
                    problems.push(format!("{name}: {e}"));
                    continue;
                }
            },
            other => other.clone(),
        };
        if let Some(kind) = spec.exists {
            if let Err(msg) = check_exists(&expanded, kind) {
                problems.push(format!("{name}: {msg}"));
                continue;
            }
        }
        merged.insert(name.to_string(), expanded);
    }

    // 5) required check - every still-missing key is reported together
    let missing: Vec<&str> = descriptor
        .params
        .iter()
        .filter(|(name, spec)| {
            spec.required && merged.get(*name).map(Value::is_null).unwrap_or(true)
        })
        .map(|(name, _)| name)
        .collect();
    if !missing.is_empty() {
        problems.push(format!(
            "missing required parameters: {}",
            missing.join(", ")
        ));
    }

    if !problems.is_empty() {
        return Err(Error::param(format!(
            "template '{}': {}",
            descriptor.id,
            problems.join("; ")
        )));
    }

    Ok(merged)
}

fn coerce(value: &Value, target: ParamType) -> std::result::Result<Value, String> {
    match target {
        ParamType::Str => Ok(value.clone()),
        ParamType::Int => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|n| json!(n))
                .map_err(|_| format!("cannot coerce '{s}' to int")),
            other => Err(format!("cannot coerce {other} to int")),
        },
        ParamType::Float => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(|n| json!(n))
                .map_err(|_| format!("cannot coerce '{s}' to float")),
            other => Err(format!("cannot coerce {other} to float")),
        },
        ParamType::Bool => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::Number(n) if n.as_i64() == Some(0) => Ok(json!(false)),
            Value::Number(n) if n.as_i64() == Some(1) => Ok(json!(true)),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "y" | "on" => Ok(json!(true)),
                "0" | "false" | "no" | "n" | "off" => Ok(json!(false)),
                other => Err(format!("cannot coerce '{other}' to bool")),
            },
            other => Err(format!("cannot coerce {other} to bool")),
        },
    }
}

fn check_exists(value: &Value, kind: ExistsKind) -> std::result::Result<(), String> {
    let Value::String(path) = value else {
        return Err(format!("exists check requires a path string, got {value}"));
    };
    let p = Path::new(path);
    let ok = match kind {
        ExistsKind::File => p.is_file(),
        ExistsKind::Dir => p.is_dir(),
        ExistsKind::Any => p.exists(),
    };
    if ok {
        Ok(())
    } else {
        let wanted = match kind {
            ExistsKind::File => "file",
            ExistsKind::Dir => "directory",
            ExistsKind::Any => "path",
        };
        Err(format!("{wanted} does not exist: {path}"))
    }
}
