//! Replacement configuration loaded from TOML
//!
//! The configuration only carries raw strings; patterns and templates are
//! compiled (and validated) when a [`ReplacementTable`] is built from it.
//!
//! [`ReplacementTable`]: crate::backport::replacement::ReplacementTable

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{Error, Result};

/// Built-in replacement tables that can be appended after user entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// `java/time/**` to the ThreeTen backport (`org/threeten/bp/**`)
    Threeten,
}

impl std::str::FromStr for Preset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "threeten" | "threetenbp" => Ok(Preset::Threeten),
            other => Err(Error::config_error(format!("unknown preset '{}'", other))),
        }
    }
}

/// How a replaced method is invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationConfig {
    /// Same opcode as the original call
    #[default]
    Keep,
    /// Static helper taking the receiver as its first argument
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeReplacementConfig {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodReplacementConfig {
    pub class: String,
    pub name: String,
    #[serde(default = "any_descriptor")]
    pub descriptor: String,
    pub replacement_class: String,
    /// Unset keeps the original method name
    #[serde(default)]
    pub replacement_name: Option<String>,
    /// Unset keeps the original descriptor
    #[serde(default)]
    pub replacement_descriptor: Option<String>,
    #[serde(default)]
    pub invocation: InvocationConfig,
    /// Emit an `InterfaceMethodref` for the replacement target
    #[serde(default)]
    pub interface: bool,
}

fn any_descriptor() -> String {
    "**".to_string()
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub preset: Option<Preset>,
    #[serde(default)]
    pub types: Vec<TypeReplacementConfig>,
    #[serde(default)]
    pub methods: Vec<MethodReplacementConfig>,
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config_error(e.to_string()))
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Configuration holding only the given preset
    pub fn with_preset(preset: Preset) -> Self {
        Self { preset: Some(preset), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.preset.is_none() && self.types.is_empty() && self.methods.is_empty()
    }
}
