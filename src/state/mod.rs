//! Persisted state: project state files and ad-hoc render metadata.

pub mod adhoc;
pub mod project;
