//! Structural index checks for an in-memory class file
//!
//! Not a bytecode verifier: this only confirms that every index the
//! backport passes may have re-pointed still lands on a constant of the
//! expected kind.

use super::attribute::{Annotation, AttributeInfo, ElementValue, NamedAttribute};
use super::class::ClassFile;
use super::constpool::{Constant, ConstantPool};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConstantPoolVerifyError {
    #[error("Invalid constant pool index {0}")]
    InvalidConstantPoolIndex(u16),
    #[error("Invalid constant pool index type {0}")]
    InvalidConstantPoolIndexType(u16),
    #[error("BootstrapMethods attribute not defined")]
    BootstrapMethodsNotDefined,
    #[error("Invalid bootstrap method index {0}")]
    InvalidBootstrapMethodIndex(u16),
    #[error("Invalid {what} reference {index}")]
    InvalidReference { what: &'static str, index: u16 },
}

pub type Result<T> = std::result::Result<T, ConstantPoolVerifyError>;

/// Verify constant pool cross references and the indices held by members
/// and descriptor-bearing attributes
pub fn verify(class_file: &ClassFile) -> Result<()> {
    verify_constant_indexes(class_file)?;
    let pool = &class_file.constant_pool;
    expect_class(pool, class_file.this_class, "this_class")?;
    if class_file.super_class != 0 {
        expect_class(pool, class_file.super_class, "super_class")?;
    }
    for &interface in &class_file.interfaces {
        expect_class(pool, interface, "interface")?;
    }
    for field in &class_file.fields {
        expect_utf8(pool, field.name_index, "field name")?;
        expect_utf8(pool, field.descriptor_index, "field descriptor")?;
        verify_attributes(pool, &field.attributes)?;
    }
    for method in &class_file.methods {
        expect_utf8(pool, method.name_index, "method name")?;
        expect_utf8(pool, method.descriptor_index, "method descriptor")?;
        verify_attributes(pool, &method.attributes)?;
    }
    verify_attributes(pool, &class_file.attributes)
}

fn verify_constant_indexes(class_file: &ClassFile) -> Result<()> {
    let pool = &class_file.constant_pool;
    let bootstrap_count = class_file
        .bootstrap_methods()
        .map(|bsm| bsm.bootstrap_methods.len());
    for (index, constant) in pool.iter() {
        match constant {
            Constant::Class(name_index)
            | Constant::Module(name_index)
            | Constant::Package(name_index)
            | Constant::String(name_index)
            | Constant::MethodType(name_index) => kind(pool, index, *name_index, |c| matches!(c, Constant::Utf8(_)))?,
            Constant::FieldRef(class_index, nat_index)
            | Constant::MethodRef(class_index, nat_index)
            | Constant::InterfaceMethodRef(class_index, nat_index) => {
                kind(pool, index, *class_index, |c| matches!(c, Constant::Class(_)))?;
                kind(pool, index, *nat_index, |c| matches!(c, Constant::NameAndType(..)))?;
            }
            Constant::NameAndType(name_index, desc_index) => {
                kind(pool, index, *name_index, |c| matches!(c, Constant::Utf8(_)))?;
                kind(pool, index, *desc_index, |c| matches!(c, Constant::Utf8(_)))?;
            }
            Constant::MethodHandle(_kind, reference_index) => kind(pool, index, *reference_index, |c| {
                matches!(c, Constant::FieldRef(..) | Constant::MethodRef(..) | Constant::InterfaceMethodRef(..))
            })?,
            Constant::Dynamic(bsm_index, nat_index) | Constant::InvokeDynamic(bsm_index, nat_index) => {
                match bootstrap_count {
                    None => return Err(ConstantPoolVerifyError::BootstrapMethodsNotDefined),
                    Some(count) if *bsm_index as usize >= count => {
                        return Err(ConstantPoolVerifyError::InvalidBootstrapMethodIndex(*bsm_index))
                    }
                    Some(_) => {}
                }
                kind(pool, index, *nat_index, |c| matches!(c, Constant::NameAndType(..)))?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn kind(pool: &ConstantPool, owner: u16, target: u16, ok: impl Fn(&Constant) -> bool) -> Result<()> {
    match pool.get(target) {
        Some(c) if ok(c) => Ok(()),
        None => Err(ConstantPoolVerifyError::InvalidConstantPoolIndex(owner)),
        _ => Err(ConstantPoolVerifyError::InvalidConstantPoolIndexType(owner)),
    }
}

fn expect_utf8(pool: &ConstantPool, index: u16, what: &'static str) -> Result<()> {
    match pool.get(index) {
        Some(Constant::Utf8(_)) => Ok(()),
        _ => Err(ConstantPoolVerifyError::InvalidReference { what, index }),
    }
}

fn expect_class(pool: &ConstantPool, index: u16, what: &'static str) -> Result<()> {
    match pool.get(index) {
        Some(Constant::Class(_)) => Ok(()),
        _ => Err(ConstantPoolVerifyError::InvalidReference { what, index }),
    }
}

fn verify_attributes(pool: &ConstantPool, attributes: &[NamedAttribute]) -> Result<()> {
    for attribute in attributes {
        expect_utf8(pool, attribute.name_index, "attribute name")?;
        if let Some(name) = attribute.info.canonical_name() {
            if pool.utf8(attribute.name_index).ok() != Some(name) {
                return Err(ConstantPoolVerifyError::InvalidReference {
                    what: "attribute name",
                    index: attribute.name_index,
                });
            }
        }
        match &attribute.info {
            AttributeInfo::Code(code) => verify_attributes(pool, &code.attributes)?,
            AttributeInfo::Signature(s) => expect_utf8(pool, s.signature_index, "signature")?,
            AttributeInfo::LocalVariableTable(t) => {
                for e in &t.entries {
                    expect_utf8(pool, e.descriptor_index, "local variable descriptor")?;
                }
            }
            AttributeInfo::LocalVariableTypeTable(t) => {
                for e in &t.entries {
                    expect_utf8(pool, e.signature_index, "local variable signature")?;
                }
            }
            AttributeInfo::RuntimeVisibleAnnotations(a) | AttributeInfo::RuntimeInvisibleAnnotations(a) => {
                for annotation in &a.annotations {
                    verify_annotation(pool, annotation)?;
                }
            }
            AttributeInfo::RuntimeVisibleParameterAnnotations(p)
            | AttributeInfo::RuntimeInvisibleParameterAnnotations(p) => {
                for annotation in p.parameters.iter().flatten() {
                    verify_annotation(pool, annotation)?;
                }
            }
            AttributeInfo::AnnotationDefault(value) => verify_element_value(pool, value)?,
            AttributeInfo::BootstrapMethods(_) | AttributeInfo::Raw(_) => {}
        }
    }
    Ok(())
}

fn verify_annotation(pool: &ConstantPool, annotation: &Annotation) -> Result<()> {
    expect_utf8(pool, annotation.type_index, "annotation type")?;
    for pair in &annotation.elements {
        verify_element_value(pool, &pair.value)?;
    }
    Ok(())
}

fn verify_element_value(pool: &ConstantPool, value: &ElementValue) -> Result<()> {
    match value {
        ElementValue::Const { .. } => Ok(()),
        ElementValue::Enum { type_name_index, .. } => expect_utf8(pool, *type_name_index, "enum type"),
        ElementValue::Class { class_info_index } => expect_utf8(pool, *class_info_index, "class element"),
        ElementValue::Annotation(annotation) => verify_annotation(pool, annotation),
        ElementValue::Array(values) => values.iter().try_for_each(|v| verify_element_value(pool, v)),
    }
}
