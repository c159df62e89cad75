//! Hook runner.
//!
//! Descriptors may attach callable references to four lifecycle
//! points. Hooks run in declaration order; the first failure aborts
//! the sequence and fails the lifecycle step that triggered it.

use serde_json::{Map, Value};
use tracing::debug;

use crate::core::context::Ctx;
use crate::core::descriptor::HooksSpec;
use crate::core::Result;
use crate::lifecycle::invoker::{CallableInvoker, CallableRef};

/// The four lifecycle points hooks can attach to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    PreRender,
    PostRender,
    PreRun,
    PostRun,
}

impl HookPoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreRender => "pre_render",
            Self::PostRender => "post_render",
            Self::PreRun => "pre_run",
            Self::PostRun => "post_run",
        }
    }

    pub fn refs(self, hooks: &HooksSpec) -> &[String] {
        match self {
            Self::PreRender => &hooks.pre_render,
            Self::PostRender => &hooks.post_render,
            Self::PreRun => &hooks.pre_run,
            Self::PostRun => &hooks.post_run,
        }
    }
}

/// Run every hook registered at `point`, in declaration order.
///
/// Hook return values are discarded; only success/failure matters.
pub fn run_hooks(
    point: HookPoint,
    hooks: &HooksSpec,
    ctx: &Ctx,
    invoker: &dyn CallableInvoker,
) -> Result<()> {
    for raw in point.refs(hooks) {
        let reference = CallableRef::parse(raw)?;
        debug!(point = point.as_str(), hook = %reference, "Running hook");
        invoker.invoke(&reference, ctx, &Map::<String, Value>::new())?;
    }
    Ok(())
}
