//! Ordered replacement tables for type names and method references

use tracing::debug;

use super::pattern::{Pattern, Template};
use crate::common::config::{Config, InvocationConfig, MethodReplacementConfig, Preset, TypeReplacementConfig};
use crate::common::error::{Error, Result};

/// Rename of every type whose internal name matches `pattern`
#[derive(Debug, Clone)]
pub struct TypeReplacement {
    pattern: Pattern,
    template: Template,
}

impl TypeReplacement {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self> {
        let pattern = Pattern::compile(pattern)?;
        let template = Template::parse(replacement, pattern.wildcard_count())?;
        Ok(Self { pattern, template })
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Replacement name for `name`, if the pattern matches
    pub fn apply(&self, name: &str) -> Option<String> {
        self.pattern
            .matches(name)
            .map(|captures| self.template.substitute(&captures))
    }
}

/// How a replaced method call is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MethodInvocation {
    /// Keep the original invocation opcode
    #[default]
    Keep,
    /// Call a static helper that takes the receiver as its first argument
    Static,
}

impl From<InvocationConfig> for MethodInvocation {
    fn from(config: InvocationConfig) -> Self {
        match config {
            InvocationConfig::Keep => MethodInvocation::Keep,
            InvocationConfig::Static => MethodInvocation::Static,
        }
    }
}

/// One pattern plus the template expanded from its captures. A missing
/// template keeps the matched text.
#[derive(Debug, Clone)]
struct Rule {
    pattern: Pattern,
    template: Option<Template>,
}

impl Rule {
    fn new(pattern: &str, template: Option<&str>) -> Result<Self> {
        let pattern = Pattern::compile(pattern)?;
        let template = template
            .map(|t| Template::parse(t, pattern.wildcard_count()))
            .transpose()?;
        Ok(Self { pattern, template })
    }

    fn apply(&self, value: &str) -> Option<String> {
        let captures = self.pattern.matches(value)?;
        Some(match &self.template {
            Some(template) => template.substitute(&captures),
            None => value.to_string(),
        })
    }
}

/// Redirect of method references matching class, name and descriptor patterns
#[derive(Debug, Clone)]
pub struct MethodReplacement {
    class: Rule,
    name: Rule,
    descriptor: Rule,
    invocation: MethodInvocation,
    interface: bool,
}

impl MethodReplacement {
    /// Build a replacement. `None` for the name or descriptor template keeps
    /// the original value.
    pub fn new(
        class: (&str, &str),
        name: (&str, Option<&str>),
        descriptor: (&str, Option<&str>),
    ) -> Result<Self> {
        Ok(Self {
            class: Rule::new(class.0, Some(class.1))?,
            name: Rule::new(name.0, name.1)?,
            descriptor: Rule::new(descriptor.0, descriptor.1)?,
            invocation: MethodInvocation::Keep,
            interface: false,
        })
    }

    pub fn with_invocation(mut self, invocation: MethodInvocation) -> Self {
        self.invocation = invocation;
        self
    }

    /// Emit the new target as an `InterfaceMethodref`
    pub fn with_interface(mut self, interface: bool) -> Self {
        self.interface = interface;
        self
    }

    fn key(&self) -> (&str, &str, &str) {
        (self.class.pattern.as_str(), self.name.pattern.as_str(), self.descriptor.pattern.as_str())
    }

    /// New target for a reference, if all three patterns match
    pub fn apply(&self, class: &str, name: &str, descriptor: &str) -> Option<MethodTarget> {
        // Check every pattern before allocating any replacement text
        if !(self.class.pattern.is_match(class)
            && self.name.pattern.is_match(name)
            && self.descriptor.pattern.is_match(descriptor))
        {
            return None;
        }
        Some(MethodTarget {
            class_name: self.class.apply(class)?,
            name: self.name.apply(name)?,
            descriptor: self.descriptor.apply(descriptor)?,
            invocation: self.invocation,
            interface: self.interface,
        })
    }
}

impl TryFrom<&MethodReplacementConfig> for MethodReplacement {
    type Error = Error;

    fn try_from(config: &MethodReplacementConfig) -> Result<Self> {
        Ok(MethodReplacement::new(
            (config.class.as_str(), config.replacement_class.as_str()),
            (config.name.as_str(), config.replacement_name.as_deref()),
            (config.descriptor.as_str(), config.replacement_descriptor.as_deref()),
        )?
        .with_invocation(config.invocation.into())
        .with_interface(config.interface))
    }
}

impl TryFrom<&TypeReplacementConfig> for TypeReplacement {
    type Error = Error;

    fn try_from(config: &TypeReplacementConfig) -> Result<Self> {
        TypeReplacement::new(&config.pattern, &config.replacement)
    }
}

/// Resolved target of a replaced method reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodTarget {
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
    pub invocation: MethodInvocation,
    pub interface: bool,
}

impl MethodTarget {
    /// Descriptor to emit for a call that originally had `receiver` on the
    /// stack. Static helpers take the receiver as an extra first parameter.
    pub fn call_descriptor(&self, receiver: Option<&str>) -> String {
        match (self.invocation, receiver) {
            (MethodInvocation::Static, Some(receiver)) => {
                let params = self.descriptor.strip_prefix('(').unwrap_or(&self.descriptor);
                if receiver.starts_with('[') {
                    format!("({}{}", receiver, params)
                } else {
                    format!("(L{};{}", receiver, params)
                }
            }
            _ => self.descriptor.clone(),
        }
    }
}

/// Type and method replacements, consulted in declaration order
///
/// Immutable once built, so one table can be shared by every worker.
#[derive(Debug, Clone, Default)]
pub struct ReplacementTable {
    types: Vec<TypeReplacement>,
    methods: Vec<MethodReplacement>,
}

impl ReplacementTable {
    /// Build a table, rejecting patterns that repeat an earlier entry
    pub fn new(types: Vec<TypeReplacement>, methods: Vec<MethodReplacement>) -> Result<Self> {
        for (i, entry) in types.iter().enumerate() {
            if types[..i].iter().any(|earlier| earlier.pattern == entry.pattern) {
                return Err(Error::config_error(format!(
                    "type pattern '{}' is shadowed by an earlier identical pattern",
                    entry.pattern
                )));
            }
        }
        for (i, entry) in methods.iter().enumerate() {
            if methods[..i].iter().any(|earlier| earlier.key() == entry.key()) {
                let (class, name, descriptor) = entry.key();
                return Err(Error::config_error(format!(
                    "method pattern '{}.{}{}' is shadowed by an earlier identical pattern",
                    class, name, descriptor
                )));
            }
        }
        Ok(Self { types, methods })
    }

    /// Table built from `(pattern, replacement)` type pairs only
    pub fn from_type_pairs(pairs: &[(&str, &str)]) -> Result<Self> {
        let types = pairs
            .iter()
            .map(|(pattern, replacement)| TypeReplacement::new(pattern, replacement))
            .collect::<Result<Vec<_>>>()?;
        Self::new(types, Vec::new())
    }

    /// User entries followed by the selected preset
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut types = config
            .types
            .iter()
            .map(TypeReplacement::try_from)
            .collect::<Result<Vec<_>>>()?;
        let methods = config
            .methods
            .iter()
            .map(MethodReplacement::try_from)
            .collect::<Result<Vec<_>>>()?;
        if let Some(preset) = config.preset {
            types.extend(preset_types(preset)?);
        }
        let table = Self::new(types, methods)?;
        debug!(types = table.types.len(), methods = table.methods.len(), "built replacement table");
        Ok(table)
    }

    /// `java.time` to the ThreeTen backport
    pub fn threeten_backport() -> Result<Self> {
        Self::new(preset_types(Preset::Threeten)?, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.methods.is_empty()
    }

    pub fn types(&self) -> &[TypeReplacement] {
        &self.types
    }

    pub fn methods(&self) -> &[MethodReplacement] {
        &self.methods
    }

    /// Replacement for a type's internal name; first matching entry wins
    pub fn resolve(&self, name: &str) -> Option<String> {
        self.types.iter().find_map(|entry| entry.apply(name))
    }

    /// Replacement target for a method reference; first matching entry wins
    pub fn resolve_method(&self, class: &str, name: &str, descriptor: &str) -> Option<MethodTarget> {
        self.methods
            .iter()
            .find_map(|entry| entry.apply(class, name, descriptor))
    }
}

fn preset_types(preset: Preset) -> Result<Vec<TypeReplacement>> {
    match preset {
        Preset::Threeten => Ok(vec![TypeReplacement::new("java/time/**", "org/threeten/bp/<1>")?]),
    }
}
