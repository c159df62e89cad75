//! Publish resolvers.
//!
//! A descriptor's `publish` section maps output keys to resolver
//! references. Each resolver is invoked with the context and its
//! declared args; `null` is a valid published value. Resolution is
//! all-or-nothing: every resolver must succeed before any result is
//! merged into the entry's `published` map.

use serde_json::{Map, Value};
use tracing::debug;

use crate::core::context::Ctx;
use crate::core::descriptor::PublishSpec;
use crate::core::{Error, Result};
use crate::lifecycle::invoker::{CallableInvoker, CallableRef};

/// Resolve every publish key. Returns the full key -> value map.
pub fn resolve_all(
    publish: &[(String, PublishSpec)],
    ctx: &Ctx,
    invoker: &dyn CallableInvoker,
) -> Result<Map<String, Value>> {
    let mut resolved = Map::new();
    for (key, spec) in publish {
        let reference = CallableRef::parse(&spec.resolver).map_err(|_| {
            Error::config(format!(
                "publish key '{key}': invalid resolver reference '{}'",
                spec.resolver
            ))
        })?;
        debug!(key = %key, resolver = %reference, "Resolving publish key");
        let value = invoker.invoke(&reference, ctx, &spec.args)?;
        resolved.insert(key.clone(), value);
    }
    Ok(resolved)
}

/// Merge resolved values into an entry's `published` map: new keys
/// are added, existing keys overwritten, unrelated keys kept.
pub fn merge_published(published: &mut Map<String, Value>, resolved: Map<String, Value>) {
    for (key, value) in resolved {
        published.insert(key, value);
    }
}
