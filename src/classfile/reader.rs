//! Class file decoding
//!
//! Mirrors [`super::writer`]: every structure written there is read here.
//! Attributes are decoded by name; names without a typed variant are kept
//! as [`AttributeInfo::Raw`].

use super::attribute::*;
use super::class::ClassFile;
use super::constpool::{constant_tags::*, Constant, ConstantPool};
use super::defs::MAGIC;
use super::error::{ClassFormatError, ClassFormatResult};
use super::field::FieldInfo;
use super::method::MethodInfo;
use crate::common::consts::*;

/// Parse a complete class file
pub fn read_class(bytes: &[u8]) -> ClassFormatResult<ClassFile> {
    let mut reader = ByteReader::new(bytes);
    let magic = reader.u4()?;
    if magic != MAGIC {
        return Err(ClassFormatError::BadMagic(magic));
    }
    let minor_version = reader.u2()?;
    let major_version = reader.u2()?;
    let constant_pool = read_constant_pool(&mut reader)?;
    let access_flags = reader.u2()?;
    let this_class = reader.u2()?;
    let super_class = reader.u2()?;

    let interfaces_count = reader.u2()?;
    let mut interfaces = Vec::with_capacity(interfaces_count as usize);
    for _ in 0..interfaces_count {
        interfaces.push(reader.u2()?);
    }

    let fields_count = reader.u2()?;
    let mut fields = Vec::with_capacity(fields_count as usize);
    for _ in 0..fields_count {
        let access_flags = reader.u2()?;
        let name_index = reader.u2()?;
        let descriptor_index = reader.u2()?;
        let attributes = read_attributes(&mut reader, &constant_pool)?;
        fields.push(FieldInfo { access_flags, name_index, descriptor_index, attributes });
    }

    let methods_count = reader.u2()?;
    let mut methods = Vec::with_capacity(methods_count as usize);
    for _ in 0..methods_count {
        let access_flags = reader.u2()?;
        let name_index = reader.u2()?;
        let descriptor_index = reader.u2()?;
        let attributes = read_attributes(&mut reader, &constant_pool)?;
        methods.push(MethodInfo { access_flags, name_index, descriptor_index, attributes });
    }

    let attributes = read_attributes(&mut reader, &constant_pool)?;
    if reader.remaining() != 0 {
        return Err(ClassFormatError::TrailingBytes(reader.remaining()));
    }

    Ok(ClassFile {
        magic,
        minor_version,
        major_version,
        constant_pool,
        access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        attributes,
    })
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    fn take(&mut self, n: usize) -> ClassFormatResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(ClassFormatError::Truncated {
                offset: self.position,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.bytes[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }

    fn u1(&mut self) -> ClassFormatResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u2(&mut self) -> ClassFormatResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u4(&mut self) -> ClassFormatResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u8(&mut self) -> ClassFormatResult<u64> {
        let hi = self.u4()? as u64;
        let lo = self.u4()? as u64;
        Ok(hi << 32 | lo)
    }
}

fn read_constant_pool(reader: &mut ByteReader<'_>) -> ClassFormatResult<ConstantPool> {
    let count = reader.u2()?;
    let mut pool = ConstantPool::new();
    let mut index: u16 = 1;
    while index < count {
        let tag = reader.u1()?;
        let constant = match tag {
            CONSTANT_UTF8 => {
                let length = reader.u2()? as usize;
                let bytes = reader.take(length)?;
                let value = decode_modified_utf8(bytes).ok_or(ClassFormatError::InvalidUtf8(index))?;
                Constant::Utf8(value)
            }
            CONSTANT_INTEGER => Constant::Integer(reader.u4()? as i32),
            CONSTANT_FLOAT => Constant::Float(f32::from_bits(reader.u4()?)),
            CONSTANT_LONG => Constant::Long(reader.u8()? as i64),
            CONSTANT_DOUBLE => Constant::Double(f64::from_bits(reader.u8()?)),
            CONSTANT_CLASS => Constant::Class(reader.u2()?),
            CONSTANT_STRING => Constant::String(reader.u2()?),
            CONSTANT_FIELDREF => Constant::FieldRef(reader.u2()?, reader.u2()?),
            CONSTANT_METHODREF => Constant::MethodRef(reader.u2()?, reader.u2()?),
            CONSTANT_INTERFACEMETHODREF => Constant::InterfaceMethodRef(reader.u2()?, reader.u2()?),
            CONSTANT_NAMEANDTYPE => Constant::NameAndType(reader.u2()?, reader.u2()?),
            CONSTANT_METHODHANDLE => Constant::MethodHandle(reader.u1()?, reader.u2()?),
            CONSTANT_METHODTYPE => Constant::MethodType(reader.u2()?),
            CONSTANT_DYNAMIC => Constant::Dynamic(reader.u2()?, reader.u2()?),
            CONSTANT_INVOKEDYNAMIC => Constant::InvokeDynamic(reader.u2()?, reader.u2()?),
            CONSTANT_MODULE => Constant::Module(reader.u2()?),
            CONSTANT_PACKAGE => Constant::Package(reader.u2()?),
            _ => return Err(ClassFormatError::UnknownConstantTag { tag, index }),
        };
        let wide = constant.is_wide();
        pool.add(constant)?;
        index += if wide { 2 } else { 1 };
    }
    Ok(pool)
}

fn read_attributes(reader: &mut ByteReader<'_>, pool: &ConstantPool) -> ClassFormatResult<Vec<NamedAttribute>> {
    let count = reader.u2()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_index = reader.u2()?;
        let length = reader.u4()? as usize;
        let payload = reader.take(length)?;
        let name = pool.utf8(name_index)?;
        let info = read_attribute_info(name, payload, pool)?;
        attributes.push(NamedAttribute::new(name_index, info));
    }
    Ok(attributes)
}

fn read_attribute_info(name: &str, payload: &[u8], pool: &ConstantPool) -> ClassFormatResult<AttributeInfo> {
    let mut r = ByteReader::new(payload);
    let info = match name {
        ATTR_CODE => {
            let max_stack = r.u2()?;
            let max_locals = r.u2()?;
            let code_length = r.u4()? as usize;
            let code = r.take(code_length)?.to_vec();
            let table_length = r.u2()?;
            let mut exception_table = Vec::with_capacity(table_length as usize);
            for _ in 0..table_length {
                exception_table.push(ExceptionTableEntry {
                    start_pc: r.u2()?,
                    end_pc: r.u2()?,
                    handler_pc: r.u2()?,
                    catch_type: r.u2()?,
                });
            }
            let attributes = read_attributes(&mut r, pool)?;
            AttributeInfo::Code(CodeAttribute { max_stack, max_locals, code, exception_table, attributes })
        }
        ATTR_SIGNATURE => AttributeInfo::Signature(SignatureAttribute { signature_index: r.u2()? }),
        ATTR_LOCAL_VARIABLE_TABLE => {
            let count = r.u2()?;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                entries.push(LocalVariableEntry {
                    start_pc: r.u2()?,
                    length: r.u2()?,
                    name_index: r.u2()?,
                    descriptor_index: r.u2()?,
                    index: r.u2()?,
                });
            }
            AttributeInfo::LocalVariableTable(LocalVariableTableAttribute { entries })
        }
        ATTR_LOCAL_VARIABLE_TYPE_TABLE => {
            let count = r.u2()?;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                entries.push(LocalVariableTypeEntry {
                    start_pc: r.u2()?,
                    length: r.u2()?,
                    name_index: r.u2()?,
                    signature_index: r.u2()?,
                    index: r.u2()?,
                });
            }
            AttributeInfo::LocalVariableTypeTable(LocalVariableTypeTableAttribute { entries })
        }
        ATTR_RUNTIME_VISIBLE_ANNOTATIONS => AttributeInfo::RuntimeVisibleAnnotations(read_annotations(&mut r)?),
        ATTR_RUNTIME_INVISIBLE_ANNOTATIONS => AttributeInfo::RuntimeInvisibleAnnotations(read_annotations(&mut r)?),
        ATTR_RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS => {
            AttributeInfo::RuntimeVisibleParameterAnnotations(read_parameter_annotations(&mut r)?)
        }
        ATTR_RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS => {
            AttributeInfo::RuntimeInvisibleParameterAnnotations(read_parameter_annotations(&mut r)?)
        }
        ATTR_ANNOTATION_DEFAULT => AttributeInfo::AnnotationDefault(read_element_value(&mut r)?),
        ATTR_BOOTSTRAP_METHODS => {
            let count = r.u2()?;
            let mut bootstrap_methods = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let bootstrap_method = r.u2()?;
                let argument_count = r.u2()?;
                let mut bootstrap_arguments = Vec::with_capacity(argument_count as usize);
                for _ in 0..argument_count {
                    bootstrap_arguments.push(r.u2()?);
                }
                bootstrap_methods.push(BootstrapMethod { bootstrap_method, bootstrap_arguments });
            }
            AttributeInfo::BootstrapMethods(BootstrapMethodsAttribute { bootstrap_methods })
        }
        _ => return Ok(AttributeInfo::Raw(payload.to_vec())),
    };
    if r.remaining() != 0 {
        return Err(ClassFormatError::TrailingBytes(r.remaining()));
    }
    Ok(info)
}

fn read_annotations(r: &mut ByteReader<'_>) -> ClassFormatResult<AnnotationsAttribute> {
    let count = r.u2()?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        annotations.push(read_annotation(r)?);
    }
    Ok(AnnotationsAttribute { annotations })
}

fn read_parameter_annotations(r: &mut ByteReader<'_>) -> ClassFormatResult<ParameterAnnotationsAttribute> {
    let count = r.u1()?;
    let mut parameters = Vec::with_capacity(count as usize);
    for _ in 0..count {
        parameters.push(read_annotations(r)?.annotations);
    }
    Ok(ParameterAnnotationsAttribute { parameters })
}

fn read_annotation(r: &mut ByteReader<'_>) -> ClassFormatResult<Annotation> {
    let type_index = r.u2()?;
    let count = r.u2()?;
    let mut elements = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_index = r.u2()?;
        let value = read_element_value(r)?;
        elements.push(ElementValuePair { name_index, value });
    }
    Ok(Annotation { type_index, elements })
}

fn read_element_value(r: &mut ByteReader<'_>) -> ClassFormatResult<ElementValue> {
    let tag = r.u1()?;
    Ok(match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => {
            ElementValue::Const { tag, const_value_index: r.u2()? }
        }
        b'e' => ElementValue::Enum { type_name_index: r.u2()?, const_name_index: r.u2()? },
        b'c' => ElementValue::Class { class_info_index: r.u2()? },
        b'@' => ElementValue::Annotation(read_annotation(r)?),
        b'[' => {
            let count = r.u2()?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(read_element_value(r)?);
            }
            ElementValue::Array(values)
        }
        other => return Err(ClassFormatError::InvalidElementTag(other as char)),
    })
}

/// Decode the JVM's modified UTF-8 (JVMS 4.4.7)
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            if b == 0 {
                return None;
            }
            units.push(b as u16);
            i += 1;
        } else if b & 0xe0 == 0xc0 {
            let b2 = *bytes.get(i + 1)?;
            if b2 & 0xc0 != 0x80 {
                return None;
            }
            units.push(((b as u16 & 0x1f) << 6) | (b2 as u16 & 0x3f));
            i += 2;
        } else if b & 0xf0 == 0xe0 {
            let b2 = *bytes.get(i + 1)?;
            let b3 = *bytes.get(i + 2)?;
            if b2 & 0xc0 != 0x80 || b3 & 0xc0 != 0x80 {
                return None;
            }
            units.push(((b as u16 & 0x0f) << 12) | ((b2 as u16 & 0x3f) << 6) | (b3 as u16 & 0x3f));
            i += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}
