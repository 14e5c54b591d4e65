//! Errors raised while reading, writing or editing class files

use thiserror::Error;

/// Errors that can occur while decoding or editing a class file
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ClassFormatError {
    #[error("Unexpected end of class data at offset {offset} (needed {needed} more bytes)")]
    Truncated { offset: usize, needed: usize },
    #[error("Bad magic number 0x{0:08X}")]
    BadMagic(u32),
    #[error("Unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag { tag: u8, index: u16 },
    #[error("Invalid constant pool index: {0}")]
    InvalidIndex(u16),
    #[error("Constant pool entry {index} is not a {expected}")]
    UnexpectedConstant { index: u16, expected: &'static str },
    #[error("Invalid modified UTF-8 in constant {0}")]
    InvalidUtf8(u16),
    #[error("Utf8 constant of {0} bytes exceeds the u2 length limit")]
    Utf8TooLong(usize),
    #[error("Constant pool is out of space")]
    OutOfSpace,
    #[error("Invalid element value tag '{0}'")]
    InvalidElementTag(char),
    #[error("Invalid opcode 0x{opcode:02X} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    #[error("Trailing bytes after class data: {0}")]
    TrailingBytes(usize),
}

/// Result type for class file operations
pub type ClassFormatResult<T> = Result<T, ClassFormatError>;
