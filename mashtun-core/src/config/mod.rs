//! Configuration types
//!
//! Board-agnostic settings and the persistent layout constants. The header
//! at the start of the region is stored as postcard binary data.

pub mod types;

pub use types::*;
