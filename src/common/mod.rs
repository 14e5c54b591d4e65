//! Common utilities and definitions shared across modules
//!
//! This module contains the error type, the replacement configuration and
//! the well-known names used by the backport passes.

pub mod config;
pub mod consts;
pub mod error;

// Re-export commonly used items for convenience
pub use config::{Config, Preset};
pub use error::{Error, Result};
pub use consts::*;
