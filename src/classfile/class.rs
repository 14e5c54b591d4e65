//! Core classfile structure: ClassFile

use super::attribute::{AttributeInfo, BootstrapMethodsAttribute, NamedAttribute};
use super::constpool::ConstantPool;
use super::defs::{JAVA_1_8, MAGIC};
use super::error::ClassFormatResult;
use super::field::FieldInfo;
use super::flag::access_flags;
use super::method::MethodInfo;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub magic: u32,
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<NamedAttribute>,
}

impl Default for ClassFile {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassFile {
    pub fn new() -> Self {
        Self {
            magic: MAGIC,
            minor_version: 0,
            major_version: JAVA_1_8,
            constant_pool: ConstantPool::new(),
            access_flags: 0,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Internal name of this class
    pub fn name(&self) -> ClassFormatResult<&str> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Internal name of the superclass, `None` for `java/lang/Object`
    pub fn super_name(&self) -> ClassFormatResult<Option<&str>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    pub fn interface_names(&self) -> ClassFormatResult<Vec<&str>> {
        self.interfaces
            .iter()
            .map(|&index| self.constant_pool.class_name(index))
            .collect()
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & access_flags::ACC_INTERFACE != 0
    }

    /// Look up a declared method by name and descriptor
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| {
            self.constant_pool.utf8(m.name_index).ok() == Some(name)
                && self.constant_pool.utf8(m.descriptor_index).ok() == Some(descriptor)
        })
    }

    pub fn bootstrap_methods(&self) -> Option<&BootstrapMethodsAttribute> {
        self.attributes.iter().find_map(|a| match &a.info {
            AttributeInfo::BootstrapMethods(bsm) => Some(bsm),
            _ => None,
        })
    }
}
