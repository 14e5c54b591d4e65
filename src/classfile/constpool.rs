//! Constant pool and constants for Java class files
//!
//! Indices handed out and accepted by [`ConstantPool`] are the 1-based
//! indices used inside class files. `Long` and `Double` occupy two slots;
//! the second slot holds [`Constant::Unusable`].

use super::error::{ClassFormatError, ClassFormatResult};
use super::writer::encode_modified_utf8;

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    Dynamic(u16, u16),
    InvokeDynamic(u16, u16),
    Module(u16),
    Package(u16),
    /// Second slot of a `Long` or `Double`
    Unusable,
}

pub mod constant_tags {
    pub const CONSTANT_UTF8: u8 = 1;
    pub const CONSTANT_INTEGER: u8 = 3;
    pub const CONSTANT_FLOAT: u8 = 4;
    pub const CONSTANT_LONG: u8 = 5;
    pub const CONSTANT_DOUBLE: u8 = 6;
    pub const CONSTANT_CLASS: u8 = 7;
    pub const CONSTANT_STRING: u8 = 8;
    pub const CONSTANT_FIELDREF: u8 = 9;
    pub const CONSTANT_METHODREF: u8 = 10;
    pub const CONSTANT_INTERFACEMETHODREF: u8 = 11;
    pub const CONSTANT_NAMEANDTYPE: u8 = 12;
    pub const CONSTANT_METHODHANDLE: u8 = 15;
    pub const CONSTANT_METHODTYPE: u8 = 16;
    pub const CONSTANT_DYNAMIC: u8 = 17;
    pub const CONSTANT_INVOKEDYNAMIC: u8 = 18;
    pub const CONSTANT_MODULE: u8 = 19;
    pub const CONSTANT_PACKAGE: u8 = 20;
}

impl Constant {
    /// Tag byte of this constant in the class file
    pub fn tag(&self) -> u8 {
        use constant_tags::*;
        match self {
            Constant::Utf8(_) => CONSTANT_UTF8,
            Constant::Integer(_) => CONSTANT_INTEGER,
            Constant::Float(_) => CONSTANT_FLOAT,
            Constant::Long(_) => CONSTANT_LONG,
            Constant::Double(_) => CONSTANT_DOUBLE,
            Constant::Class(_) => CONSTANT_CLASS,
            Constant::String(_) => CONSTANT_STRING,
            Constant::FieldRef(..) => CONSTANT_FIELDREF,
            Constant::MethodRef(..) => CONSTANT_METHODREF,
            Constant::InterfaceMethodRef(..) => CONSTANT_INTERFACEMETHODREF,
            Constant::NameAndType(..) => CONSTANT_NAMEANDTYPE,
            Constant::MethodHandle(..) => CONSTANT_METHODHANDLE,
            Constant::MethodType(_) => CONSTANT_METHODTYPE,
            Constant::Dynamic(..) => CONSTANT_DYNAMIC,
            Constant::InvokeDynamic(..) => CONSTANT_INVOKEDYNAMIC,
            Constant::Module(_) => CONSTANT_MODULE,
            Constant::Package(_) => CONSTANT_PACKAGE,
            Constant::Unusable => 0,
        }
    }

    /// Whether this constant takes two constant pool slots
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// Symbolic view of a field or method reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub class_name: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantPool {
    pub(crate) constants: Vec<Constant>,
}

impl ConstantPool {
    pub fn new() -> Self { Self { constants: Vec::new() } }

    /// The `constant_pool_count` value written to the class file
    pub fn count(&self) -> u16 {
        (self.constants.len() + 1) as u16
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        if index == 0 {
            return None;
        }
        self.constants.get(index as usize - 1)
    }

    /// Iterate over `(index, constant)` pairs, skipping unusable slots
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.constants
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, c)| ((i + 1) as u16, c))
    }

    /// Overwrite an existing entry. Wide entries cannot be swapped in or out.
    pub fn set(&mut self, index: u16, constant: Constant) -> ClassFormatResult<()> {
        let slot = index
            .checked_sub(1)
            .and_then(|i| self.constants.get_mut(i as usize))
            .ok_or(ClassFormatError::InvalidIndex(index))?;
        if slot.is_wide() != constant.is_wide() || matches!(slot, Constant::Unusable) {
            return Err(ClassFormatError::InvalidIndex(index));
        }
        check_encodable(&constant)?;
        *slot = constant;
        Ok(())
    }

    /// Append a constant and return its index
    pub fn add(&mut self, constant: Constant) -> ClassFormatResult<u16> {
        check_encodable(&constant)?;
        let needed = if constant.is_wide() { 2 } else { 1 };
        if self.constants.len() + needed >= u16::MAX as usize {
            return Err(ClassFormatError::OutOfSpace);
        }
        let wide = constant.is_wide();
        self.constants.push(constant);
        let index = self.constants.len() as u16;
        if wide {
            self.constants.push(Constant::Unusable);
        }
        Ok(index)
    }

    pub fn utf8(&self, index: u16) -> ClassFormatResult<&str> {
        match self.get(index) {
            Some(Constant::Utf8(value)) => Ok(value),
            Some(_) => Err(ClassFormatError::UnexpectedConstant { index, expected: "Utf8" }),
            None => Err(ClassFormatError::InvalidIndex(index)),
        }
    }

    /// Name stored in a `Class` constant
    pub fn class_name(&self, index: u16) -> ClassFormatResult<&str> {
        match self.get(index) {
            Some(Constant::Class(name_index)) => self.utf8(*name_index),
            Some(_) => Err(ClassFormatError::UnexpectedConstant { index, expected: "Class" }),
            None => Err(ClassFormatError::InvalidIndex(index)),
        }
    }

    /// `(name, descriptor)` of a `NameAndType` constant
    pub fn name_and_type(&self, index: u16) -> ClassFormatResult<(&str, &str)> {
        match self.get(index) {
            Some(Constant::NameAndType(name_index, descriptor_index)) => {
                Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?))
            }
            Some(_) => Err(ClassFormatError::UnexpectedConstant { index, expected: "NameAndType" }),
            None => Err(ClassFormatError::InvalidIndex(index)),
        }
    }

    /// Resolve a `FieldRef`, `MethodRef` or `InterfaceMethodRef` constant
    pub fn member_ref(&self, index: u16) -> ClassFormatResult<MemberRef<'_>> {
        match self.get(index) {
            Some(Constant::FieldRef(class_index, nat_index))
            | Some(Constant::MethodRef(class_index, nat_index))
            | Some(Constant::InterfaceMethodRef(class_index, nat_index)) => {
                let class_name = self.class_name(*class_index)?;
                let (name, descriptor) = self.name_and_type(*nat_index)?;
                Ok(MemberRef { class_name, name, descriptor })
            }
            Some(_) => Err(ClassFormatError::UnexpectedConstant { index, expected: "member reference" }),
            None => Err(ClassFormatError::InvalidIndex(index)),
        }
    }

    pub fn add_utf8(&mut self, value: &str) -> ClassFormatResult<u16> {
        self.add(Constant::Utf8(value.to_string()))
    }
    pub fn add_class(&mut self, name: &str) -> ClassFormatResult<u16> {
        let name_index = self.add_utf8(name)?;
        self.add(Constant::Class(name_index))
    }
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> ClassFormatResult<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.add(Constant::NameAndType(name_index, descriptor_index))
    }
    pub fn add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> ClassFormatResult<u16> {
        let class_index = self.add_class(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::FieldRef(class_index, name_and_type_index))
    }
    pub fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> ClassFormatResult<u16> {
        let class_index = self.add_class(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::MethodRef(class_index, name_and_type_index))
    }
    pub fn add_interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> ClassFormatResult<u16> {
        let class_index = self.add_class(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::InterfaceMethodRef(class_index, name_and_type_index))
    }
    pub fn add_string(&mut self, value: &str) -> ClassFormatResult<u16> {
        let utf8_index = self.add_utf8(value)?;
        self.add(Constant::String(utf8_index))
    }
    pub fn add_integer(&mut self, value: i32) -> ClassFormatResult<u16> {
        self.add(Constant::Integer(value))
    }
    pub fn add_long(&mut self, value: i64) -> ClassFormatResult<u16> {
        self.add(Constant::Long(value))
    }
    pub fn add_method_handle(&mut self, reference_kind: u8, reference_index: u16) -> ClassFormatResult<u16> {
        self.add(Constant::MethodHandle(reference_kind, reference_index))
    }
    pub fn add_method_type(&mut self, descriptor: &str) -> ClassFormatResult<u16> {
        let descriptor_index = self.add_utf8(descriptor)?;
        self.add(Constant::MethodType(descriptor_index))
    }
    pub fn add_invoke_dynamic(&mut self, bootstrap_index: u16, name: &str, descriptor: &str) -> ClassFormatResult<u16> {
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::InvokeDynamic(bootstrap_index, name_and_type_index))
    }

    fn find(&self, wanted: &Constant) -> Option<u16> {
        self.iter().find(|(_, c)| *c == wanted).map(|(i, _)| i)
    }

    pub fn find_utf8(&self, value: &str) -> Option<u16> {
        self.iter()
            .find(|(_, c)| matches!(c, Constant::Utf8(s) if s == value))
            .map(|(i, _)| i)
    }

    /// Reuse an existing `Utf8` entry holding `value`, or append one
    pub fn find_or_add_utf8(&mut self, value: &str) -> ClassFormatResult<u16> {
        match self.find_utf8(value) {
            Some(index) => Ok(index),
            None => self.add_utf8(value),
        }
    }

    pub fn find_or_add_class(&mut self, name: &str) -> ClassFormatResult<u16> {
        let name_index = self.find_or_add_utf8(name)?;
        self.find_or_add(Constant::Class(name_index))
    }

    pub fn find_or_add_name_and_type(&mut self, name: &str, descriptor: &str) -> ClassFormatResult<u16> {
        let name_index = self.find_or_add_utf8(name)?;
        let descriptor_index = self.find_or_add_utf8(descriptor)?;
        self.find_or_add(Constant::NameAndType(name_index, descriptor_index))
    }

    /// Reuse or append a `MethodRef` (or `InterfaceMethodRef`) constant
    pub fn find_or_add_method_ref(
        &mut self,
        interface: bool,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> ClassFormatResult<u16> {
        let class_index = self.find_or_add_class(class)?;
        let nat_index = self.find_or_add_name_and_type(name, descriptor)?;
        let constant = if interface {
            Constant::InterfaceMethodRef(class_index, nat_index)
        } else {
            Constant::MethodRef(class_index, nat_index)
        };
        self.find_or_add(constant)
    }

    fn find_or_add(&mut self, constant: Constant) -> ClassFormatResult<u16> {
        match self.find(&constant) {
            Some(index) => Ok(index),
            None => self.add(constant),
        }
    }
}

/// Utf8 constants must fit the u2 length prefix of their encoded form
fn check_encodable(constant: &Constant) -> ClassFormatResult<()> {
    if let Constant::Utf8(value) = constant {
        let length = encode_modified_utf8(value).len();
        if length > u16::MAX as usize {
            return Err(ClassFormatError::Utf8TooLong(length));
        }
    }
    Ok(())
}
