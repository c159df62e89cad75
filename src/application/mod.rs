//! Application services sitting between the CLI and the domain
//! layers.

pub mod project;
