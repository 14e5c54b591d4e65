//! Attributes, annotations and exception table structures for Java class files
//!
//! Attributes that can embed descriptors or class references are decoded
//! into typed variants; every other attribute is kept as raw bytes and
//! written back untouched.

use super::constpool::ConstantPool;
use super::error::ClassFormatResult;
use crate::common::consts::*;

/// An attribute together with the constant pool index of its name
#[derive(Debug, Clone, PartialEq)]
pub struct NamedAttribute {
    pub name_index: u16,
    pub info: AttributeInfo,
}

impl NamedAttribute {
    pub fn new(name_index: u16, info: AttributeInfo) -> Self {
        Self { name_index, info }
    }

    /// Build an attribute, allocating (or reusing) its name in the pool
    pub fn with_name(constant_pool: &mut ConstantPool, name: &str, info: AttributeInfo) -> ClassFormatResult<Self> {
        let name_index = constant_pool.find_or_add_utf8(name)?;
        Ok(Self::new(name_index, info))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeInfo {
    Code(CodeAttribute),
    Signature(SignatureAttribute),
    LocalVariableTable(LocalVariableTableAttribute),
    LocalVariableTypeTable(LocalVariableTypeTableAttribute),
    RuntimeVisibleAnnotations(AnnotationsAttribute),
    RuntimeInvisibleAnnotations(AnnotationsAttribute),
    RuntimeVisibleParameterAnnotations(ParameterAnnotationsAttribute),
    RuntimeInvisibleParameterAnnotations(ParameterAnnotationsAttribute),
    AnnotationDefault(ElementValue),
    BootstrapMethods(BootstrapMethodsAttribute),
    /// Any attribute the backport passes never need to look inside
    Raw(Vec<u8>),
}

impl AttributeInfo {
    /// Attribute name this variant is read from and written as, if fixed
    pub fn canonical_name(&self) -> Option<&'static str> {
        Some(match self {
            AttributeInfo::Code(_) => ATTR_CODE,
            AttributeInfo::Signature(_) => ATTR_SIGNATURE,
            AttributeInfo::LocalVariableTable(_) => ATTR_LOCAL_VARIABLE_TABLE,
            AttributeInfo::LocalVariableTypeTable(_) => ATTR_LOCAL_VARIABLE_TYPE_TABLE,
            AttributeInfo::RuntimeVisibleAnnotations(_) => ATTR_RUNTIME_VISIBLE_ANNOTATIONS,
            AttributeInfo::RuntimeInvisibleAnnotations(_) => ATTR_RUNTIME_INVISIBLE_ANNOTATIONS,
            AttributeInfo::RuntimeVisibleParameterAnnotations(_) => ATTR_RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS,
            AttributeInfo::RuntimeInvisibleParameterAnnotations(_) => ATTR_RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS,
            AttributeInfo::AnnotationDefault(_) => ATTR_ANNOTATION_DEFAULT,
            AttributeInfo::BootstrapMethods(_) => ATTR_BOOTSTRAP_METHODS,
            AttributeInfo::Raw(_) => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<NamedAttribute>,
}

impl CodeAttribute {
    pub fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        Self {
            max_stack,
            max_locals,
            code,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureAttribute {
    pub signature_index: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalVariableTableAttribute {
    pub entries: Vec<LocalVariableEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalVariableTypeTableAttribute {
    pub entries: Vec<LocalVariableTypeEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariableTypeEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub signature_index: u16,
    pub index: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationsAttribute {
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterAnnotationsAttribute {
    /// One annotation list per formal parameter
    pub parameters: Vec<Vec<Annotation>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Field descriptor of the annotation interface
    pub type_index: u16,
    pub elements: Vec<ElementValuePair>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementValuePair {
    pub name_index: u16,
    pub value: ElementValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// `B C D F I J S Z s`
    Const { tag: u8, const_value_index: u16 },
    Enum { type_name_index: u16, const_name_index: u16 },
    /// Return descriptor of the referenced class, e.g. `Ljava/lang/String;` or `V`
    Class { class_info_index: u16 },
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

impl ElementValue {
    pub fn tag(&self) -> u8 {
        match self {
            ElementValue::Const { tag, .. } => *tag,
            ElementValue::Enum { .. } => b'e',
            ElementValue::Class { .. } => b'c',
            ElementValue::Annotation(_) => b'@',
            ElementValue::Array(_) => b'[',
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapMethodsAttribute {
    pub bootstrap_methods: Vec<BootstrapMethod>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethod {
    /// `MethodHandle` constant of the bootstrap method
    pub bootstrap_method: u16,
    /// Constant pool indices of the static arguments
    pub bootstrap_arguments: Vec<u16>,
}
