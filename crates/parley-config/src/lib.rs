//! Configuration for Parley memory stores.
//!
//! Owns the config schema, JSON5 loading, layer merging, and validation used
//! to pick and tune a memory backend.

mod error;
mod loader;
mod model;

/// Public error type returned by config loading and validation APIs.
pub use error::ConfigError;
/// Configuration schema models.
pub use model::*;
