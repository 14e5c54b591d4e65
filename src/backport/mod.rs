//! Backport passes
//!
//! - [`pattern`]: wildcard patterns and `<N>` templates
//! - [`replacement`]: ordered type and method replacement tables
//! - [`descriptor`]: descriptor and generic signature rewriting
//! - [`converter`]: applies a replacement table to a whole class
//! - [`lambda`] and [`collector`]: the lambda call site model

pub mod collector;
pub mod converter;
pub mod descriptor;
pub mod lambda;
pub mod pattern;
pub mod replacement;

pub use collector::CallSiteCollector;
pub use converter::{convert_all, ApiConverter, ClassModifiedListener, InstructionListener, InstructionSite};
pub use lambda::{CallSiteRecord, ReferenceKind, ResolvedClass, ResolvedMember};
pub use pattern::{Captures, Pattern, Template};
pub use replacement::{MethodInvocation, MethodReplacement, MethodTarget, ReplacementTable, TypeReplacement};
