//! In-memory class file model
//!
//! This module holds the structures the backport passes read and edit:
//! the constant pool, fields, methods and the attributes that can carry
//! descriptors, plus a binary reader and writer so real `.class` files
//! can be processed.

pub mod attribute;
pub mod class;
pub mod classpool;
pub mod code;
pub mod constpool;
pub mod defs;
pub mod error;
pub mod field;
pub mod flag;
pub mod method;
pub mod opcodes;
pub mod reader;
pub mod verify;
pub mod writer;

pub use class::ClassFile;
pub use classpool::{ClassPool, ClassResolver, PoolKind};
pub use constpool::{Constant, ConstantPool, MemberRef};
pub use error::{ClassFormatError, ClassFormatResult};
pub use reader::read_class;
pub use writer::ClassfileWritable;
