//! Lambda call site model and the predicates that classify a call site
//!
//! A [`CallSiteRecord`] is a snapshot of one `invokedynamic` call site
//! bootstrapped by `LambdaMetafactory`: what it implements, what it
//! captures and which method it ends up calling. The predicates are pure
//! functions of the record; anything that could not be resolved makes them
//! answer conservatively.

use std::fmt;

use crate::classfile::defs::{reference_kinds::*, CONSTRUCTOR_METHOD_NAME};
use crate::classfile::flag::{access_flags::*, Visibility};
use crate::common::consts::{LAMBDA_METHOD_PREFIX, SERIALIZABLE_INTERFACE};
use crate::common::error::{Error, Result};

/// Kind of the implementation method handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    InvokeStatic,
    InvokeVirtual,
    InvokeSpecial,
    InvokeInterface,
    NewInvokeSpecial,
}

impl ReferenceKind {
    /// Decode a `MethodHandle` reference kind. Field handles yield `None`.
    pub fn from_handle_kind(kind: u8) -> Option<Self> {
        Some(match kind {
            REF_INVOKE_STATIC => ReferenceKind::InvokeStatic,
            REF_INVOKE_VIRTUAL => ReferenceKind::InvokeVirtual,
            REF_INVOKE_SPECIAL => ReferenceKind::InvokeSpecial,
            REF_INVOKE_INTERFACE => ReferenceKind::InvokeInterface,
            REF_NEW_INVOKE_SPECIAL => ReferenceKind::NewInvokeSpecial,
            _ => return None,
        })
    }

    pub fn handle_kind(self) -> u8 {
        match self {
            ReferenceKind::InvokeStatic => REF_INVOKE_STATIC,
            ReferenceKind::InvokeVirtual => REF_INVOKE_VIRTUAL,
            ReferenceKind::InvokeSpecial => REF_INVOKE_SPECIAL,
            ReferenceKind::InvokeInterface => REF_INVOKE_INTERFACE,
            ReferenceKind::NewInvokeSpecial => REF_NEW_INVOKE_SPECIAL,
        }
    }
}

/// Snapshot of a class found in the class pools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedClass {
    pub name: String,
    pub access_flags: u16,
}

impl ResolvedClass {
    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    pub fn is_public(&self) -> bool {
        self.access_flags & ACC_PUBLIC != 0
    }
}

/// Snapshot of the method a call site targets, as declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMember {
    /// Class that declares the member, which may be a supertype of the
    /// referenced class
    pub declaring_class: String,
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
}

impl ResolvedMember {
    pub fn is_private(&self) -> bool {
        self.access_flags & ACC_PRIVATE != 0
    }

    pub fn is_synthetic(&self) -> bool {
        self.access_flags & ACC_SYNTHETIC != 0
    }

    pub fn visibility(&self) -> Visibility {
        Visibility::from_flags(self.access_flags)
    }
}

/// One lambda call site, keyed by its bootstrap method index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSiteRecord {
    /// Class containing the call site
    pub owner_class: String,
    pub bootstrap_index: u16,
    /// Constant pool indices of the static bootstrap arguments
    pub bootstrap_args: Vec<u16>,
    /// Descriptor of the `invokedynamic`; its parameters are the captured values
    pub factory_descriptor: String,
    /// Functional interface first, then marker interfaces
    pub implemented_interfaces: Vec<String>,
    pub bridge_descriptors: Vec<String>,
    pub functional_method_name: String,
    pub functional_method_descriptor: String,
    pub target_kind: ReferenceKind,
    pub target_class_name: Option<String>,
    pub target_method_name: Option<String>,
    pub target_method_descriptor: Option<String>,
    pub resolved_target_class: Option<ResolvedClass>,
    pub resolved_target_member: Option<ResolvedMember>,
}

impl CallSiteRecord {
    /// A record with only its identity and target kind filled in
    pub fn new(owner_class: impl Into<String>, bootstrap_index: u16, target_kind: ReferenceKind) -> Self {
        Self {
            owner_class: owner_class.into(),
            bootstrap_index,
            bootstrap_args: Vec::new(),
            factory_descriptor: String::new(),
            implemented_interfaces: Vec::new(),
            bridge_descriptors: Vec::new(),
            functional_method_name: String::new(),
            functional_method_descriptor: String::new(),
            target_kind,
            target_class_name: None,
            target_method_name: None,
            target_method_descriptor: None,
            resolved_target_class: None,
            resolved_target_member: None,
        }
    }

    /// The functional interface the call site produces
    pub fn functional_interface(&self) -> Option<&str> {
        self.implemented_interfaces.first().map(String::as_str)
    }

    /// Number of values captured by the lambda
    pub fn captured_count(&self) -> Result<usize> {
        super::descriptor::parameter_count(&self.factory_descriptor)
    }

    /// No captured values: one instance can serve every evaluation
    pub fn is_stateless(&self) -> bool {
        self.factory_descriptor.starts_with("()")
    }

    pub fn is_serializable(&self) -> bool {
        self.implemented_interfaces
            .iter()
            .any(|name| name == SERIALIZABLE_INTERFACE)
    }

    /// Whether the target is an existing method rather than a synthesized
    /// lambda body. A record without a target name is malformed.
    pub fn is_method_reference(&self) -> Result<bool> {
        match &self.target_method_name {
            Some(name) => Ok(!name.starts_with(LAMBDA_METHOD_PREFIX)),
            None => Err(Error::malformed_class(format!(
                "call site {} in {} has no target method name",
                self.bootstrap_index, self.owner_class
            ))),
        }
    }

    pub fn invokes_static_interface_method(&self) -> bool {
        self.target_kind == ReferenceKind::InvokeStatic
            && self
                .resolved_target_class
                .as_ref()
                .is_some_and(ResolvedClass::is_interface)
    }

    pub fn references_private_constructor(&self) -> bool {
        let constructor = self.target_kind == ReferenceKind::NewInvokeSpecial
            || self.target_method_name.as_deref() == Some(CONSTRUCTOR_METHOD_NAME);
        constructor
            && self
                .resolved_target_member
                .as_ref()
                .is_some_and(ResolvedMember::is_private)
    }

    pub fn references_private_synthetic_interface_method(&self) -> bool {
        let in_interface = self
            .resolved_target_class
            .as_ref()
            .is_some_and(ResolvedClass::is_interface);
        in_interface
            && self
                .resolved_target_member
                .as_ref()
                .is_some_and(|m| m.is_private() && m.is_synthetic())
    }

    /// Whether a class generated next to the owner class could not call the
    /// target directly. Anything unresolved needs an accessor.
    pub fn needs_accessor_method(&self) -> bool {
        let (Some(class), Some(member)) = (&self.resolved_target_class, &self.resolved_target_member) else {
            return true;
        };
        if self.target_method_name.is_none() || self.target_method_descriptor.is_none() {
            return true;
        }
        let owner_package = package_of(&self.owner_class);
        let member_accessible = match member.visibility() {
            Visibility::Public => true,
            Visibility::Private => false,
            Visibility::Protected | Visibility::PackagePrivate => {
                package_of(&member.declaring_class) == owner_package
            }
        };
        let class_accessible = class.is_public() || package_of(&class.name) == owner_package;
        !(member_accessible && class_accessible)
    }
}

/// Package part of an internal name; empty for the default package
pub fn package_of(internal_name: &str) -> &str {
    internal_name.rfind('/').map_or("", |i| &internal_name[..i])
}

impl fmt::Display for CallSiteRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {}.{}{} -> {:?} {}.{}{}",
            self.bootstrap_index,
            self.functional_interface().unwrap_or("?"),
            self.functional_method_name,
            self.functional_method_descriptor,
            self.target_kind,
            self.target_class_name.as_deref().unwrap_or("?"),
            self.target_method_name.as_deref().unwrap_or("?"),
            self.target_method_descriptor.as_deref().unwrap_or("?"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(kind: ReferenceKind, class_flags: u16, member_flags: u16) -> CallSiteRecord {
        CallSiteRecord {
            factory_descriptor: "()Ljava/util/function/Supplier;".into(),
            implemented_interfaces: vec!["java/util/function/Supplier".into()],
            target_class_name: Some("demo/Target".into()),
            target_method_name: Some("make".into()),
            target_method_descriptor: Some("()Ljava/lang/Object;".into()),
            resolved_target_class: Some(ResolvedClass { name: "demo/Target".into(), access_flags: class_flags }),
            resolved_target_member: Some(ResolvedMember {
                declaring_class: "demo/Target".into(),
                name: "make".into(),
                descriptor: "()Ljava/lang/Object;".into(),
                access_flags: member_flags,
            }),
            ..CallSiteRecord::new("demo/Main", 0, kind)
        }
    }

    #[test]
    fn handle_kinds_round_trip() {
        for kind in 5..=9 {
            assert_eq!(ReferenceKind::from_handle_kind(kind).unwrap().handle_kind(), kind);
        }
        assert_eq!(ReferenceKind::from_handle_kind(REF_GET_FIELD), None);
    }

    #[test]
    fn stateless_depends_on_factory_parameters() {
        let mut record = resolved(ReferenceKind::InvokeStatic, ACC_PUBLIC, ACC_PUBLIC);
        assert!(record.is_stateless());
        assert_eq!(record.captured_count().unwrap(), 0);
        record.factory_descriptor = "(Ljava/lang/String;)Ljava/util/function/Supplier;".into();
        assert!(!record.is_stateless());
        assert_eq!(record.captured_count().unwrap(), 1);
    }

    #[test]
    fn lambda_bodies_are_not_method_references() {
        let mut record = resolved(ReferenceKind::InvokeStatic, ACC_PUBLIC, ACC_PUBLIC);
        record.target_method_name = Some("lambda$main$0".into());
        assert!(!record.is_method_reference().unwrap());
        record.target_method_name = Some("valueOf".into());
        assert!(record.is_method_reference().unwrap());
        record.target_method_name = None;
        assert!(record.is_method_reference().is_err());
    }

    #[test]
    fn static_interface_target_needs_resolution() {
        let mut record = resolved(ReferenceKind::InvokeStatic, ACC_PUBLIC | ACC_INTERFACE, ACC_PUBLIC | ACC_STATIC);
        assert!(record.invokes_static_interface_method());
        record.resolved_target_class = Some(ResolvedClass { name: "demo/Target".into(), access_flags: ACC_PUBLIC });
        assert!(!record.invokes_static_interface_method());
        record.resolved_target_class = None;
        assert!(!record.invokes_static_interface_method());
        let virtual_call = resolved(ReferenceKind::InvokeVirtual, ACC_INTERFACE, ACC_PUBLIC);
        assert!(!virtual_call.invokes_static_interface_method());
    }

    #[test]
    fn private_constructor_and_synthetic_interface_method() {
        let mut record = resolved(ReferenceKind::NewInvokeSpecial, ACC_PUBLIC, ACC_PRIVATE);
        record.target_method_name = Some("<init>".into());
        assert!(record.references_private_constructor());
        record.resolved_target_member = None;
        assert!(!record.references_private_constructor());

        let record = resolved(ReferenceKind::InvokeSpecial, ACC_INTERFACE, ACC_PRIVATE | ACC_SYNTHETIC);
        assert!(record.references_private_synthetic_interface_method());
        let record = resolved(ReferenceKind::InvokeSpecial, ACC_INTERFACE, ACC_PRIVATE);
        assert!(!record.references_private_synthetic_interface_method());
    }

    #[test]
    fn serializable_marker_is_detected_anywhere() {
        let mut record = resolved(ReferenceKind::InvokeStatic, ACC_PUBLIC, ACC_PUBLIC);
        assert!(!record.is_serializable());
        record.implemented_interfaces.push(SERIALIZABLE_INTERFACE.into());
        assert!(record.is_serializable());
    }

    #[test]
    fn accessor_rules_follow_visibility_and_packages() {
        assert!(!resolved(ReferenceKind::InvokeStatic, ACC_PUBLIC, ACC_PUBLIC).needs_accessor_method());
        assert!(resolved(ReferenceKind::InvokeStatic, ACC_PUBLIC, ACC_PRIVATE).needs_accessor_method());
        // Same package as the owner
        assert!(!resolved(ReferenceKind::InvokeStatic, 0, 0).needs_accessor_method());
        assert!(!resolved(ReferenceKind::InvokeVirtual, ACC_PUBLIC, ACC_PROTECTED).needs_accessor_method());

        let mut other_package = resolved(ReferenceKind::InvokeStatic, ACC_PUBLIC, 0);
        other_package.resolved_target_member.as_mut().unwrap().declaring_class = "lib/Base".into();
        assert!(other_package.needs_accessor_method());

        let mut hidden_class = resolved(ReferenceKind::InvokeStatic, 0, ACC_PUBLIC);
        hidden_class.resolved_target_class.as_mut().unwrap().name = "lib/Hidden".into();
        assert!(hidden_class.needs_accessor_method());

        let mut unresolved = resolved(ReferenceKind::InvokeStatic, ACC_PUBLIC, ACC_PUBLIC);
        unresolved.resolved_target_class = None;
        assert!(unresolved.needs_accessor_method());
        let mut nameless = resolved(ReferenceKind::InvokeStatic, ACC_PUBLIC, ACC_PUBLIC);
        nameless.target_method_descriptor = None;
        assert!(nameless.needs_accessor_method());
    }

    #[test]
    fn package_of_internal_names() {
        assert_eq!(package_of("java/util/Map$Entry"), "java/util");
        assert_eq!(package_of("Main"), "");
    }
}
