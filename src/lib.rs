//! retroclass
//!
//! Retrofits compiled class files so they run on older virtual machines.
//!
//! ## Architecture
//!
//! - **classfile**: in-memory class file model with a reader, a writer and
//!   class pools used for symbol resolution
//! - **backport**: the wildcard replacement engine, the class converter and
//!   the lambda call site model
//! - **common**: errors, configuration and well-known names
//! - **bin**: command-line interface
//!
//! ## Conversion Flow
//!
//! ```text
//! .class bytes → read_class → ApiConverter (ReplacementTable) → writer → .class bytes
//!                     ↓
//!              CallSiteCollector → CallSiteRecord predicates
//! ```

pub mod backport;
pub mod classfile;
pub mod common;

pub use common::{Config, Error, Preset, Result};

use backport::{ApiConverter, ReplacementTable};
use classfile::{read_class, ClassfileWritable};

/// Convert the bytes of one class file, returning the rewritten bytes if
/// anything changed
pub fn convert_bytes(bytes: &[u8], table: &ReplacementTable) -> Result<Option<Vec<u8>>> {
    let mut class = read_class(bytes)?;
    if ApiConverter::new(table).convert(&mut class)? {
        Ok(Some(class.to_classfile_bytes()?))
    } else {
        Ok(None)
    }
}
