//! Resource stores: the cached-store registry and the active-store
//! view commands operate against.

pub mod active;
pub mod registry;

pub use active::ActiveStore;
pub use registry::StoreRegistry;
