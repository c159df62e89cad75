//! Core domain layer: errors, host-aware paths, invocation context,
//! template descriptors, and parameter/placeholder resolution.

pub mod context;
pub mod descriptor;
pub mod error;
pub mod hostpath;
pub mod interpolate;
pub mod params;

pub use error::{Error, Result};
