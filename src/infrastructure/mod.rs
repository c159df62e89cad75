//! Infrastructure primitives: process execution, filesystem helpers,
//! and atomic YAML persistence.

pub mod exec;
pub mod fsio;
pub mod yamlio;
