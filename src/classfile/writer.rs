//! Trait-based serialization for classfile structures

use std::io::Write;

use super::attribute::*;
use super::class::ClassFile;
use super::constpool::{Constant, ConstantPool};
use super::field::FieldInfo;
use super::method::MethodInfo;

/// An object which can be written into a classfile.
/// This trait provides a unified interface for serializing all classfile components.
pub trait ClassfileWritable {
    /// Writes the bytes of this object into the given buffer.
    ///
    /// # Arguments
    ///
    /// * `buffer` - classfile byte-buffer into which this object should be written
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()>;

    /// Writes the bytes of this object into a newly created buffer.
    ///
    /// Fails with `InvalidData` when a string or table no longer fits the
    /// length field the class file format gives it.
    fn to_classfile_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_to_classfile(&mut buffer)?;
        Ok(buffer)
    }
}

fn write_u2<W: Write>(buffer: &mut W, value: u16) -> std::io::Result<()> {
    buffer.write_all(&value.to_be_bytes())
}

fn write_len_u2<W: Write>(buffer: &mut W, len: usize) -> std::io::Result<()> {
    let value = u16::try_from(len)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "table exceeds u2 length"))?;
    write_u2(buffer, value)
}

impl ClassfileWritable for ClassFile {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        buffer.write_all(&self.magic.to_be_bytes())?;
        write_u2(buffer, self.minor_version)?;
        write_u2(buffer, self.major_version)?;

        self.constant_pool.write_to_classfile(buffer)?;

        write_u2(buffer, self.access_flags)?;
        write_u2(buffer, self.this_class)?;
        write_u2(buffer, self.super_class)?;

        write_len_u2(buffer, self.interfaces.len())?;
        for interface in &self.interfaces {
            write_u2(buffer, *interface)?;
        }

        write_len_u2(buffer, self.fields.len())?;
        for field in &self.fields {
            field.write_to_classfile(buffer)?;
        }

        write_len_u2(buffer, self.methods.len())?;
        for method in &self.methods {
            method.write_to_classfile(buffer)?;
        }

        write_attributes(buffer, &self.attributes)
    }
}

impl ClassfileWritable for ConstantPool {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        write_u2(buffer, self.count())?;
        for constant in &self.constants {
            constant.write_to_classfile(buffer)?;
        }
        Ok(())
    }
}

impl ClassfileWritable for Constant {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        use Constant::*;

        if let Unusable = self {
            // Second slot of a wide constant has no bytes of its own
            return Ok(());
        }
        buffer.write_all(&[self.tag()])?;
        match self {
            Utf8(value) => {
                let bytes = encode_modified_utf8(value);
                write_len_u2(buffer, bytes.len())?;
                buffer.write_all(&bytes)?;
            }
            Integer(value) => buffer.write_all(&value.to_be_bytes())?,
            Float(value) => buffer.write_all(&value.to_bits().to_be_bytes())?,
            Long(value) => buffer.write_all(&value.to_be_bytes())?,
            Double(value) => buffer.write_all(&value.to_bits().to_be_bytes())?,
            Class(index) | String(index) | MethodType(index) | Module(index) | Package(index) => {
                write_u2(buffer, *index)?
            }
            FieldRef(a, b)
            | MethodRef(a, b)
            | InterfaceMethodRef(a, b)
            | NameAndType(a, b)
            | Dynamic(a, b)
            | InvokeDynamic(a, b) => {
                write_u2(buffer, *a)?;
                write_u2(buffer, *b)?;
            }
            MethodHandle(reference_kind, reference_index) => {
                buffer.write_all(&[*reference_kind])?;
                write_u2(buffer, *reference_index)?;
            }
            Unusable => {}
        }
        Ok(())
    }
}

impl ClassfileWritable for FieldInfo {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        write_u2(buffer, self.access_flags)?;
        write_u2(buffer, self.name_index)?;
        write_u2(buffer, self.descriptor_index)?;
        write_attributes(buffer, &self.attributes)
    }
}

impl ClassfileWritable for MethodInfo {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        write_u2(buffer, self.access_flags)?;
        write_u2(buffer, self.name_index)?;
        write_u2(buffer, self.descriptor_index)?;
        write_attributes(buffer, &self.attributes)
    }
}

fn write_attributes<W: Write>(buffer: &mut W, attributes: &[NamedAttribute]) -> std::io::Result<()> {
    write_len_u2(buffer, attributes.len())?;
    for attribute in attributes {
        attribute.write_to_classfile(buffer)?;
    }
    Ok(())
}

impl ClassfileWritable for NamedAttribute {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        write_u2(buffer, self.name_index)?;
        let payload = self.info.to_classfile_bytes()?;
        let length = u32::try_from(payload.len())
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "attribute too large"))?;
        buffer.write_all(&length.to_be_bytes())?;
        buffer.write_all(&payload)
    }
}

impl ClassfileWritable for AttributeInfo {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        match self {
            AttributeInfo::Code(code) => {
                write_u2(buffer, code.max_stack)?;
                write_u2(buffer, code.max_locals)?;
                buffer.write_all(&(code.code.len() as u32).to_be_bytes())?;
                buffer.write_all(&code.code)?;
                write_len_u2(buffer, code.exception_table.len())?;
                for entry in &code.exception_table {
                    write_u2(buffer, entry.start_pc)?;
                    write_u2(buffer, entry.end_pc)?;
                    write_u2(buffer, entry.handler_pc)?;
                    write_u2(buffer, entry.catch_type)?;
                }
                write_attributes(buffer, &code.attributes)
            }
            AttributeInfo::Signature(signature) => write_u2(buffer, signature.signature_index),
            AttributeInfo::LocalVariableTable(table) => {
                write_len_u2(buffer, table.entries.len())?;
                for e in &table.entries {
                    write_u2(buffer, e.start_pc)?;
                    write_u2(buffer, e.length)?;
                    write_u2(buffer, e.name_index)?;
                    write_u2(buffer, e.descriptor_index)?;
                    write_u2(buffer, e.index)?;
                }
                Ok(())
            }
            AttributeInfo::LocalVariableTypeTable(table) => {
                write_len_u2(buffer, table.entries.len())?;
                for e in &table.entries {
                    write_u2(buffer, e.start_pc)?;
                    write_u2(buffer, e.length)?;
                    write_u2(buffer, e.name_index)?;
                    write_u2(buffer, e.signature_index)?;
                    write_u2(buffer, e.index)?;
                }
                Ok(())
            }
            AttributeInfo::RuntimeVisibleAnnotations(a) | AttributeInfo::RuntimeInvisibleAnnotations(a) => {
                write_annotations(buffer, &a.annotations)
            }
            AttributeInfo::RuntimeVisibleParameterAnnotations(p)
            | AttributeInfo::RuntimeInvisibleParameterAnnotations(p) => {
                let count = u8::try_from(p.parameters.len())
                    .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "too many parameters"))?;
                buffer.write_all(&[count])?;
                for annotations in &p.parameters {
                    write_annotations(buffer, annotations)?;
                }
                Ok(())
            }
            AttributeInfo::AnnotationDefault(value) => value.write_to_classfile(buffer),
            AttributeInfo::BootstrapMethods(bsm) => {
                write_len_u2(buffer, bsm.bootstrap_methods.len())?;
                for method in &bsm.bootstrap_methods {
                    write_u2(buffer, method.bootstrap_method)?;
                    write_len_u2(buffer, method.bootstrap_arguments.len())?;
                    for argument in &method.bootstrap_arguments {
                        write_u2(buffer, *argument)?;
                    }
                }
                Ok(())
            }
            AttributeInfo::Raw(bytes) => buffer.write_all(bytes),
        }
    }
}

fn write_annotations<W: Write>(buffer: &mut W, annotations: &[Annotation]) -> std::io::Result<()> {
    write_len_u2(buffer, annotations.len())?;
    for annotation in annotations {
        annotation.write_to_classfile(buffer)?;
    }
    Ok(())
}

impl ClassfileWritable for Annotation {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        write_u2(buffer, self.type_index)?;
        write_len_u2(buffer, self.elements.len())?;
        for pair in &self.elements {
            write_u2(buffer, pair.name_index)?;
            pair.value.write_to_classfile(buffer)?;
        }
        Ok(())
    }
}

impl ClassfileWritable for ElementValue {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        buffer.write_all(&[self.tag()])?;
        match self {
            ElementValue::Const { const_value_index, .. } => write_u2(buffer, *const_value_index),
            ElementValue::Enum { type_name_index, const_name_index } => {
                write_u2(buffer, *type_name_index)?;
                write_u2(buffer, *const_name_index)
            }
            ElementValue::Class { class_info_index } => write_u2(buffer, *class_info_index),
            ElementValue::Annotation(annotation) => annotation.write_to_classfile(buffer),
            ElementValue::Array(values) => {
                write_len_u2(buffer, values.len())?;
                for value in values {
                    value.write_to_classfile(buffer)?;
                }
                Ok(())
            }
        }
    }
}

/// Encode a string as the JVM's modified UTF-8 (JVMS 4.4.7)
pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007f => bytes.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                bytes.push(0xc0 | ((unit >> 6) & 0x1f) as u8);
                bytes.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                bytes.push(0xe0 | ((unit >> 12) & 0x0f) as u8);
                bytes.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                bytes.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::reader::{decode_modified_utf8, read_class};

    #[test]
    fn modified_utf8_round_trips_nul_and_supplementary() {
        let text = "a\0\u{e9}\u{1F600}";
        let encoded = encode_modified_utf8(text);
        assert_eq!(&encoded[1..3], &[0xc0, 0x80]);
        assert_eq!(decode_modified_utf8(&encoded).as_deref(), Some(text));
    }

    #[test]
    fn written_class_reads_back_identically() {
        let mut class = ClassFile::new();
        class.this_class = class.constant_pool.add_class("demo/Point").unwrap();
        class.super_class = class.constant_pool.add_class("java/lang/Object").unwrap();
        class.constant_pool.add_long(42).unwrap();
        let name = class.constant_pool.add_utf8("x").unwrap();
        let desc = class.constant_pool.add_utf8("I").unwrap();
        let mut field = FieldInfo::new(0x0001, name, desc);
        let deprecated = class.constant_pool.add_utf8("Deprecated").unwrap();
        field.attributes.push(NamedAttribute::new(deprecated, AttributeInfo::Raw(Vec::new())));
        class.fields.push(field);

        let bytes = class.to_classfile_bytes().unwrap();
        let read = read_class(&bytes).unwrap();
        assert_eq!(read, class);
        assert_eq!(read.to_classfile_bytes().unwrap(), bytes);
    }

    #[test]
    fn oversized_table_is_an_error_not_a_short_buffer() {
        let mut class = ClassFile::new();
        class.this_class = class.constant_pool.add_class("demo/Wide").unwrap();
        let object = class.constant_pool.add_class("java/lang/Object").unwrap();
        class.interfaces = vec![object; u16::MAX as usize + 1];

        let err = class.to_classfile_bytes().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
