use thiserror::Error;

use crate::classfile::error::ClassFormatError;

/// Result type for retroclass operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the retroclass engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Invalid replacement template '{template}': {message}")]
    InvalidTemplate { template: String, message: String },

    #[error("Malformed descriptor '{descriptor}' at offset {position}")]
    MalformedDescriptor { descriptor: String, position: usize },

    #[error("Malformed class file: {message}")]
    MalformedClass { message: String },

    #[error("Class file format error: {0}")]
    ClassFormat(#[from] ClassFormatError),
}

impl Error {
    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create an invalid pattern error
    pub fn invalid_pattern(pattern: &str, message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            message: message.into(),
        }
    }

    /// Create an invalid template error
    pub fn invalid_template(template: &str, message: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            template: template.to_string(),
            message: message.into(),
        }
    }

    /// Create a malformed descriptor error pointing at a byte offset
    pub fn malformed_descriptor(descriptor: &str, position: usize) -> Self {
        Self::MalformedDescriptor {
            descriptor: descriptor.to_string(),
            position,
        }
    }

    /// Create a malformed class error
    pub fn malformed_class(message: impl Into<String>) -> Self {
        Self::MalformedClass { message: message.into() }
    }

    /// True for errors raised while building replacement tables
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::InvalidPattern { .. } | Self::InvalidTemplate { .. }
        )
    }
}
