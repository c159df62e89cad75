//! `${ctx.*}` placeholder expansion for path-level strings.
//!
//! Path-level expansion (used in `render.into` and in param defaults)
//! shares the context model with body-level Tera rendering but uses a
//! simpler `${ctx.a.b}` grammar. Both are strict: an undefined
//! reference is an error, never an empty substitution.
//!
//! Path-level strings must not reference `ctx.params.*` - param
//! defaults would otherwise depend on not-yet-resolved values, which
//! makes evaluation order ambiguous.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::core::context::Ctx;
use crate::core::error::{Error, Result};

static CTX_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{ctx\.([A-Za-z0-9_.]+)\}").expect("valid placeholder regex"));

/// Expand every `${ctx.<path>}` occurrence in a path-level string.
///
/// Fails on undefined references and on any `ctx.params.*` reference.
pub fn expand_path(input: &str, ctx: &Ctx) -> Result<String> {
    expand(input, ctx, false)
}

/// Expand with full context access, including `ctx.params.*`.
///
/// Used for `run.args` / `run.env` values, which are evaluated after
/// parameter resolution.
pub fn expand_full(input: &str, ctx: &Ctx) -> Result<String> {
    expand(input, ctx, true)
}

fn expand(input: &str, ctx: &Ctx, allow_params: bool) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in CTX_PATTERN.captures_iter(input) {
        let whole = caps.get(0).expect("match");
        let dotted = &caps[1];
        if !allow_params && (dotted == "params" || dotted.starts_with("params.")) {
            return Err(Error::render(format!(
                "placeholder '${{ctx.{dotted}}}' may not reference ctx.params in path-level strings"
            )));
        }
        let value = ctx.lookup(dotted).ok_or_else(|| {
            Error::render(format!("undefined placeholder '${{ctx.{dotted}}}' in '{input}'"))
        })?;
        out.push_str(&input[last..whole.start()]);
        out.push_str(&render_scalar(dotted, &value, input)?);
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

fn render_scalar(dotted: &str, value: &Value, input: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Err(Error::render(format!(
            "placeholder '${{ctx.{dotted}}}' resolved to null in '{input}'"
        ))),
        _ => Err(Error::render(format!(
            "placeholder '${{ctx.{dotted}}}' resolved to a non-scalar value in '{input}'"
        ))),
    }
}
