//! Template lifecycle: hook running, publish resolution, and the
//! render/run/publish orchestrator.

pub mod hooks;
pub mod invoker;
pub mod publish;
pub mod service;

pub use service::{Mode, RenderOptions, TemplateService};
