// Common test utilities: in-memory class builders
#![allow(dead_code)]

use retroclass::classfile::attribute::{
    AttributeInfo, BootstrapMethod, BootstrapMethodsAttribute, CodeAttribute, NamedAttribute,
};
use retroclass::classfile::defs::reference_kinds::REF_INVOKE_STATIC;
use retroclass::classfile::field::FieldInfo;
use retroclass::classfile::flag::access_flags::*;
use retroclass::classfile::method::MethodInfo;
use retroclass::classfile::ClassFile;

pub const LAMBDA_FACTORY_DESCRIPTOR: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;";
pub const ALT_FACTORY_DESCRIPTOR: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;";

/// Public class extending `java/lang/Object`
pub fn class_named(name: &str) -> ClassFile {
    let mut class = ClassFile::new();
    class.access_flags = ACC_PUBLIC | ACC_SUPER;
    class.this_class = class.constant_pool.add_class(name).unwrap();
    class.super_class = class.constant_pool.find_or_add_class("java/lang/Object").unwrap();
    class
}

pub fn interface_named(name: &str) -> ClassFile {
    let mut class = class_named(name);
    class.access_flags = ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT;
    class
}

pub fn add_field(class: &mut ClassFile, flags: u16, name: &str, descriptor: &str) -> usize {
    let name_index = class.constant_pool.find_or_add_utf8(name).unwrap();
    let descriptor_index = class.constant_pool.find_or_add_utf8(descriptor).unwrap();
    class.fields.push(FieldInfo::new(flags, name_index, descriptor_index));
    class.fields.len() - 1
}

/// Add a method, with a `Code` attribute when `code` is given
pub fn add_method(class: &mut ClassFile, flags: u16, name: &str, descriptor: &str, code: Option<Vec<u8>>) -> usize {
    let name_index = class.constant_pool.find_or_add_utf8(name).unwrap();
    let descriptor_index = class.constant_pool.find_or_add_utf8(descriptor).unwrap();
    let mut method = MethodInfo::new(flags, name_index, descriptor_index);
    if let Some(code) = code {
        method
            .attributes
            .push(attribute(class, "Code", AttributeInfo::Code(CodeAttribute::new(4, 4, code))));
    }
    class.methods.push(method);
    class.methods.len() - 1
}

pub fn attribute(class: &mut ClassFile, name: &str, info: AttributeInfo) -> NamedAttribute {
    NamedAttribute::with_name(&mut class.constant_pool, name, info).unwrap()
}

/// Two-byte operand of an instruction
pub fn u2(index: u16) -> [u8; 2] {
    index.to_be_bytes()
}

/// Append a bootstrap method, creating the attribute on first use.
/// Returns its index.
pub fn add_bootstrap_method(class: &mut ClassFile, bootstrap_method: u16, arguments: Vec<u16>) -> u16 {
    let method = BootstrapMethod { bootstrap_method, bootstrap_arguments: arguments };
    for attr in &mut class.attributes {
        if let AttributeInfo::BootstrapMethods(bsm) = &mut attr.info {
            bsm.bootstrap_methods.push(method);
            return (bsm.bootstrap_methods.len() - 1) as u16;
        }
    }
    let attr = attribute(
        class,
        "BootstrapMethods",
        AttributeInfo::BootstrapMethods(BootstrapMethodsAttribute { bootstrap_methods: vec![method] }),
    );
    class.attributes.push(attr);
    0
}

/// The implementation side of a lambda call site
pub struct Target<'a> {
    pub kind: u8,
    pub class: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub interface: bool,
}

/// Add a `LambdaMetafactory.metafactory` call site. Returns the bootstrap
/// index and the `InvokeDynamic` constant index.
pub fn add_lambda(
    class: &mut ClassFile,
    method_name: &str,
    factory_descriptor: &str,
    sam_descriptor: &str,
    target: &Target<'_>,
) -> (u16, u16) {
    let cp = &mut class.constant_pool;
    let factory = cp
        .find_or_add_method_ref(false, "java/lang/invoke/LambdaMetafactory", "metafactory", LAMBDA_FACTORY_DESCRIPTOR)
        .unwrap();
    let bootstrap = cp.add_method_handle(REF_INVOKE_STATIC, factory).unwrap();
    let arguments = lambda_arguments(class, sam_descriptor, target);
    finish_call_site(class, bootstrap, arguments, method_name, factory_descriptor)
}

/// Add a `LambdaMetafactory.altMetafactory` call site with the given flags
/// and trailing arguments (marker and bridge lists)
pub fn add_alt_lambda(
    class: &mut ClassFile,
    method_name: &str,
    factory_descriptor: &str,
    sam_descriptor: &str,
    target: &Target<'_>,
    flags: i32,
    markers: &[&str],
    bridges: &[&str],
) -> (u16, u16) {
    let factory = class
        .constant_pool
        .find_or_add_method_ref(false, "java/lang/invoke/LambdaMetafactory", "altMetafactory", ALT_FACTORY_DESCRIPTOR)
        .unwrap();
    let bootstrap = class.constant_pool.add_method_handle(REF_INVOKE_STATIC, factory).unwrap();
    let mut arguments = lambda_arguments(class, sam_descriptor, target);
    let cp = &mut class.constant_pool;
    arguments.push(cp.add_integer(flags).unwrap());
    if !markers.is_empty() {
        arguments.push(cp.add_integer(markers.len() as i32).unwrap());
        for marker in markers {
            arguments.push(cp.find_or_add_class(marker).unwrap());
        }
    }
    if !bridges.is_empty() {
        arguments.push(cp.add_integer(bridges.len() as i32).unwrap());
        for bridge in bridges {
            arguments.push(cp.add_method_type(bridge).unwrap());
        }
    }
    finish_call_site(class, bootstrap, arguments, method_name, factory_descriptor)
}

fn lambda_arguments(class: &mut ClassFile, sam_descriptor: &str, target: &Target<'_>) -> Vec<u16> {
    let cp = &mut class.constant_pool;
    let sam = cp.add_method_type(sam_descriptor).unwrap();
    let member = cp
        .find_or_add_method_ref(target.interface, target.class, target.name, target.descriptor)
        .unwrap();
    let handle = cp.add_method_handle(target.kind, member).unwrap();
    let instantiated = cp.add_method_type(sam_descriptor).unwrap();
    vec![sam, handle, instantiated]
}

fn finish_call_site(
    class: &mut ClassFile,
    bootstrap: u16,
    arguments: Vec<u16>,
    method_name: &str,
    factory_descriptor: &str,
) -> (u16, u16) {
    let bootstrap_index = add_bootstrap_method(class, bootstrap, arguments);
    let indy = class
        .constant_pool
        .add_invoke_dynamic(bootstrap_index, method_name, factory_descriptor)
        .unwrap();
    (bootstrap_index, indy)
}
