//! API conversion of a whole class file
//!
//! [`ApiConverter`] applies a [`ReplacementTable`] to every location of a
//! class that can name another type: constant pool class and member
//! references, member descriptors, generic signatures, annotations and
//! local variable tables. Method replacements additionally retarget
//! `invoke*` instructions.
//!
//! Conversion runs on a private copy of the class. The copy replaces the
//! caller's class only when every location was processed, so a failure
//! part way through leaves the original untouched.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};

use rayon::prelude::*;
use tracing::{debug, trace};

use super::descriptor::{self, DescriptorKind};
use super::replacement::{MethodInvocation, ReplacementTable};
use crate::classfile::attribute::{Annotation, AttributeInfo, ElementValue, NamedAttribute};
use crate::classfile::class::ClassFile;
use crate::classfile::code::{constant_operand, Instructions};
use crate::classfile::constpool::{Constant, ConstantPool};
use crate::classfile::opcodes::*;
use crate::common::error::{Error, Result};

/// Notified once for every class the converter changed
pub trait ClassModifiedListener {
    fn class_modified(&mut self, class: &ClassFile);
}

impl<F: FnMut(&ClassFile)> ClassModifiedListener for F {
    fn class_modified(&mut self, class: &ClassFile) {
        self(class)
    }
}

/// Notified once for every instruction whose referenced constant changed
pub trait InstructionListener {
    fn instruction_changed(&mut self, class: &ClassFile, site: &InstructionSite);
}

impl<F: FnMut(&ClassFile, &InstructionSite)> InstructionListener for F {
    fn instruction_changed(&mut self, class: &ClassFile, site: &InstructionSite) {
        self(class, site)
    }
}

/// An instruction as it reads after conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionSite {
    /// Index into `ClassFile::methods`
    pub method_index: usize,
    pub offset: usize,
    pub opcode: u8,
    pub constant_index: u16,
}

/// Rewrites classes against one replacement table
pub struct ApiConverter<'t, 'l> {
    table: &'t ReplacementTable,
    class_listener: Option<&'l mut dyn ClassModifiedListener>,
    instruction_listener: Option<&'l mut dyn InstructionListener>,
}

impl<'t, 'l> ApiConverter<'t, 'l> {
    pub fn new(table: &'t ReplacementTable) -> Self {
        Self { table, class_listener: None, instruction_listener: None }
    }

    pub fn with_class_listener(mut self, listener: &'l mut dyn ClassModifiedListener) -> Self {
        self.class_listener = Some(listener);
        self
    }

    pub fn with_instruction_listener(mut self, listener: &'l mut dyn InstructionListener) -> Self {
        self.instruction_listener = Some(listener);
        self
    }

    /// Convert one class in place. Returns whether anything changed.
    pub fn convert(&mut self, class: &mut ClassFile) -> Result<bool> {
        if self.table.is_empty() {
            return Ok(false);
        }
        let mut work = class.clone();
        let sites = convert_class(self.table, &mut work)?;
        let Some(sites) = sites else {
            return Ok(false);
        };

        *class = work;
        debug!(
            class = class.name().unwrap_or("<unnamed>"),
            instructions = sites.len(),
            "converted class"
        );
        if let Some(listener) = self.class_listener.as_deref_mut() {
            listener.class_modified(class);
        }
        if let Some(listener) = self.instruction_listener.as_deref_mut() {
            for site in &sites {
                listener.instruction_changed(class, site);
            }
        }
        Ok(true)
    }
}

/// Convert independent classes in parallel. Results are in input order.
pub fn convert_all(table: &ReplacementTable, classes: &mut [ClassFile]) -> Vec<Result<bool>> {
    classes
        .par_iter_mut()
        .map(|class| ApiConverter::new(table).convert(class))
        .collect()
}

/// Rewrite `class` in place. `None` when nothing changed, otherwise the
/// instructions whose operands now mean something else.
fn convert_class(table: &ReplacementTable, class: &mut ClassFile) -> Result<Option<Vec<InstructionSite>>> {
    let ClassFile { constant_pool, this_class, fields, methods, attributes, .. } = class;
    let mut modified = false;

    let mut sites = BTreeSet::new();
    if !table.methods().is_empty() {
        for (method_index, method) in methods.iter_mut().enumerate() {
            let Some(code) = method.code_mut() else { continue };
            for offset in replace_method_calls(table, constant_pool, &mut code.code)? {
                sites.insert((method_index, offset));
            }
        }
        modified |= !sites.is_empty();
    }

    let changed = rewrite_constant_pool(table, constant_pool, *this_class)?;
    modified |= !changed.is_empty();
    if !changed.is_empty() {
        for (method_index, method) in methods.iter().enumerate() {
            let Some(code) = method.code() else { continue };
            for insn in Instructions::new(&code.code) {
                let insn = insn?;
                if let Some(index) = insn.constant_index(&code.code) {
                    if references_changed(constant_pool, index, &changed) {
                        sites.insert((method_index, insn.offset));
                    }
                }
            }
        }
    }

    let mut members = MemberRewriter { table, pool: constant_pool, modified: false };
    for field in fields.iter_mut() {
        members.rewrite_index(&mut field.descriptor_index, DescriptorKind::Field)?;
        members.rewrite_attributes(&mut field.attributes, DescriptorKind::FieldSignature)?;
    }
    for method in methods.iter_mut() {
        members.rewrite_index(&mut method.descriptor_index, DescriptorKind::Method)?;
        members.rewrite_attributes(&mut method.attributes, DescriptorKind::MethodSignature)?;
    }
    members.rewrite_attributes(attributes, DescriptorKind::ClassSignature)?;
    modified |= members.modified;

    if !modified {
        return Ok(None);
    }
    let sites = sites
        .into_iter()
        .map(|(method_index, offset)| {
            let code = methods[method_index].code().map(|c| c.code.as_slice()).unwrap_or_default();
            InstructionSite {
                method_index,
                offset,
                opcode: code.get(offset).copied().unwrap_or(NOP),
                constant_index: constant_operand(code, offset).unwrap_or(0),
            }
        })
        .collect();
    Ok(Some(sites))
}

/// Retarget invocations matched by a method replacement. Returns the
/// offsets of the patched instructions.
fn replace_method_calls(table: &ReplacementTable, pool: &mut ConstantPool, code: &mut [u8]) -> Result<Vec<usize>> {
    let mut patched = Vec::new();
    let instructions = Instructions::new(code).collect::<std::result::Result<Vec<_>, _>>()?;
    for insn in instructions {
        if !is_method_invocation(insn.opcode) {
            continue;
        }
        let Some(index) = insn.constant_index(code) else { continue };
        let member = pool.member_ref(index)?;
        let Some(target) = table.resolve_method(member.class_name, member.name, member.descriptor) else {
            continue;
        };
        let (opcode, receiver) = match (target.invocation, insn.opcode) {
            (MethodInvocation::Static, INVOKEVIRTUAL | INVOKEINTERFACE) => (INVOKESTATIC, Some(member.class_name)),
            // Constructor and super calls cannot become static calls
            (MethodInvocation::Static, INVOKESPECIAL) => continue,
            (_, opcode) => (opcode, None),
        };
        let descriptor = target.call_descriptor(receiver);
        let interface = match opcode {
            INVOKEVIRTUAL => false,
            INVOKEINTERFACE => true,
            _ => target.interface,
        };
        trace!(
            from = %format!("{}.{}{}", member.class_name, member.name, member.descriptor),
            to = %format!("{}.{}{}", target.class_name, target.name, descriptor),
            offset = insn.offset,
            "replacing method call"
        );

        let new_index = pool.find_or_add_method_ref(interface, &target.class_name, &target.name, &descriptor)?;
        let at = insn.offset;
        code[at] = opcode;
        code[at + 1..at + 3].copy_from_slice(&new_index.to_be_bytes());
        match (insn.opcode, opcode) {
            (INVOKEINTERFACE, INVOKESTATIC) => {
                code[at + 3] = NOP;
                code[at + 4] = NOP;
            }
            (INVOKEINTERFACE, INVOKEINTERFACE) => {
                let count = descriptor::parameter_slots(&descriptor)? + 1;
                code[at + 3] = u8::try_from(count).map_err(|_| {
                    Error::malformed_class(format!(
                        "invokeinterface {}.{}{} needs {count} argument slots",
                        target.class_name, target.name, descriptor
                    ))
                })?;
            }
            _ => {}
        }
        patched.push(at);
    }
    Ok(patched)
}

/// Rewrite `Class`, `NameAndType` and `MethodType` constants. Returns the
/// indices of the constants that now point at different text.
fn rewrite_constant_pool(table: &ReplacementTable, pool: &mut ConstantPool, this_class: u16) -> Result<HashSet<u16>> {
    let mut changed = HashSet::new();
    let end = pool.count();
    for index in 1..end {
        let updated = match pool.get(index) {
            Some(Constant::Class(name_index)) if index != this_class => {
                let name_index = *name_index;
                repoint(table, pool, name_index, DescriptorKind::ClassName)?.map(Constant::Class)
            }
            Some(Constant::NameAndType(name_index, descriptor_index)) => {
                let (name_index, descriptor_index) = (*name_index, *descriptor_index);
                let kind = if pool.utf8(descriptor_index)?.starts_with('(') {
                    DescriptorKind::Method
                } else {
                    DescriptorKind::Field
                };
                repoint(table, pool, descriptor_index, kind)?.map(|d| Constant::NameAndType(name_index, d))
            }
            Some(Constant::MethodType(descriptor_index)) => {
                let descriptor_index = *descriptor_index;
                repoint(table, pool, descriptor_index, DescriptorKind::Method)?.map(Constant::MethodType)
            }
            _ => None,
        };
        if let Some(constant) = updated {
            trace!(index, ?constant, "rewrote constant");
            pool.set(index, constant)?;
            changed.insert(index);
        }
    }
    Ok(changed)
}

/// Index of a `Utf8` constant holding the rewritten text, if it changed
fn repoint(table: &ReplacementTable, pool: &mut ConstantPool, index: u16, kind: DescriptorKind) -> Result<Option<u16>> {
    let rewritten = match descriptor::rewrite(kind, pool.utf8(index)?, table)? {
        Cow::Borrowed(_) => return Ok(None),
        Cow::Owned(text) => text,
    };
    Ok(Some(pool.find_or_add_utf8(&rewritten)?))
}

/// Whether the constant at `index`, or a constant it refers to, changed
fn references_changed(pool: &ConstantPool, index: u16, changed: &HashSet<u16>) -> bool {
    if changed.contains(&index) {
        return true;
    }
    match pool.get(index) {
        Some(Constant::FieldRef(class_index, nat_index))
        | Some(Constant::MethodRef(class_index, nat_index))
        | Some(Constant::InterfaceMethodRef(class_index, nat_index)) => {
            changed.contains(class_index) || changed.contains(nat_index)
        }
        Some(Constant::MethodHandle(_, reference_index)) => references_changed(pool, *reference_index, changed),
        Some(Constant::Dynamic(_, nat_index)) | Some(Constant::InvokeDynamic(_, nat_index)) => {
            changed.contains(nat_index)
        }
        _ => false,
    }
}

/// Rewrites descriptor-bearing indices held outside the constant pool
struct MemberRewriter<'t, 'p> {
    table: &'t ReplacementTable,
    pool: &'p mut ConstantPool,
    modified: bool,
}

impl MemberRewriter<'_, '_> {
    fn rewrite_index(&mut self, index: &mut u16, kind: DescriptorKind) -> Result<()> {
        if let Some(new_index) = repoint(self.table, self.pool, *index, kind)? {
            trace!(old = *index, new = new_index, ?kind, "rewrote descriptor");
            *index = new_index;
            self.modified = true;
        }
        Ok(())
    }

    /// `signature` is the grammar of `Signature` attributes at this level
    fn rewrite_attributes(&mut self, attributes: &mut [NamedAttribute], signature: DescriptorKind) -> Result<()> {
        for attribute in attributes {
            match &mut attribute.info {
                AttributeInfo::Code(code) => self.rewrite_attributes(&mut code.attributes, signature)?,
                AttributeInfo::Signature(s) => self.rewrite_index(&mut s.signature_index, signature)?,
                AttributeInfo::LocalVariableTable(table) => {
                    for entry in &mut table.entries {
                        self.rewrite_index(&mut entry.descriptor_index, DescriptorKind::Field)?;
                    }
                }
                AttributeInfo::LocalVariableTypeTable(table) => {
                    for entry in &mut table.entries {
                        self.rewrite_index(&mut entry.signature_index, DescriptorKind::FieldSignature)?;
                    }
                }
                AttributeInfo::RuntimeVisibleAnnotations(a) | AttributeInfo::RuntimeInvisibleAnnotations(a) => {
                    for annotation in &mut a.annotations {
                        self.rewrite_annotation(annotation)?;
                    }
                }
                AttributeInfo::RuntimeVisibleParameterAnnotations(p)
                | AttributeInfo::RuntimeInvisibleParameterAnnotations(p) => {
                    for annotation in p.parameters.iter_mut().flatten() {
                        self.rewrite_annotation(annotation)?;
                    }
                }
                AttributeInfo::AnnotationDefault(value) => self.rewrite_element_value(value)?,
                AttributeInfo::BootstrapMethods(_) | AttributeInfo::Raw(_) => {}
            }
        }
        Ok(())
    }

    fn rewrite_annotation(&mut self, annotation: &mut Annotation) -> Result<()> {
        self.rewrite_index(&mut annotation.type_index, DescriptorKind::Field)?;
        for pair in &mut annotation.elements {
            self.rewrite_element_value(&mut pair.value)?;
        }
        Ok(())
    }

    fn rewrite_element_value(&mut self, value: &mut ElementValue) -> Result<()> {
        match value {
            ElementValue::Const { .. } => Ok(()),
            ElementValue::Enum { type_name_index, .. } => self.rewrite_index(type_name_index, DescriptorKind::Field),
            ElementValue::Class { class_info_index } => self.rewrite_index(class_info_index, DescriptorKind::Return),
            ElementValue::Annotation(annotation) => self.rewrite_annotation(annotation),
            ElementValue::Array(values) => values.iter_mut().try_for_each(|v| self.rewrite_element_value(v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backport::replacement::MethodReplacement;
    use crate::classfile::attribute::CodeAttribute;
    use crate::classfile::method::MethodInfo;

    fn table() -> ReplacementTable {
        ReplacementTable::from_type_pairs(&[("java/time/**", "org/threeten/bp/<1>")]).unwrap()
    }

    fn class_calling(owner: &str, name: &str, descriptor: &str) -> (ClassFile, u16) {
        let mut class = ClassFile::new();
        class.this_class = class.constant_pool.add_class("demo/Main").unwrap();
        let method_ref = class.constant_pool.add_method_ref(owner, name, descriptor).unwrap();
        let method_name = class.constant_pool.add_utf8("run").unwrap();
        let method_desc = class.constant_pool.add_utf8("()V").unwrap();
        let [hi, lo] = method_ref.to_be_bytes();
        let code = CodeAttribute::new(1, 1, vec![INVOKESTATIC, hi, lo, RETURN]);
        let mut method = MethodInfo::new(0x0009, method_name, method_desc);
        method
            .attributes
            .push(NamedAttribute::with_name(&mut class.constant_pool, "Code", AttributeInfo::Code(code)).unwrap());
        class.methods.push(method);
        (class, method_ref)
    }

    #[test]
    fn class_reference_change_reports_instruction() {
        let (mut class, method_ref) = class_calling("java/time/Instant", "now", "()Ljava/time/Instant;");
        let mut sites = Vec::new();
        let mut record = |_: &ClassFile, site: &InstructionSite| sites.push(*site);
        let table = table();
        let changed = ApiConverter::new(&table)
            .with_instruction_listener(&mut record)
            .convert(&mut class)
            .unwrap();
        assert!(changed);
        assert_eq!(
            sites,
            vec![InstructionSite { method_index: 0, offset: 0, opcode: INVOKESTATIC, constant_index: method_ref }]
        );
        let member = class.constant_pool.member_ref(method_ref).unwrap();
        assert_eq!(member.class_name, "org/threeten/bp/Instant");
        assert_eq!(member.descriptor, "()Lorg/threeten/bp/Instant;");
    }

    #[test]
    fn this_class_is_never_renamed() {
        let mut class = ClassFile::new();
        class.this_class = class.constant_pool.add_class("java/time/Local").unwrap();
        let table = table();
        assert!(!ApiConverter::new(&table).convert(&mut class).unwrap());
        assert_eq!(class.name().unwrap(), "java/time/Local");
    }

    #[test]
    fn shared_utf8_entries_are_not_edited_in_place() {
        let (mut class, _) = class_calling("java/time/Instant", "now", "()V");
        let shared = class.constant_pool.find_utf8("java/time/Instant").unwrap();
        let literal = class.constant_pool.add(Constant::String(shared)).unwrap();
        let table = table();
        ApiConverter::new(&table).convert(&mut class).unwrap();
        match class.constant_pool.get(literal) {
            Some(Constant::String(utf8)) => {
                assert_eq!(class.constant_pool.utf8(*utf8).unwrap(), "java/time/Instant")
            }
            other => panic!("unexpected constant {:?}", other),
        }
    }

    #[test]
    fn interface_call_to_static_helper_is_padded() {
        let mut class = ClassFile::new();
        class.this_class = class.constant_pool.add_class("demo/Main").unwrap();
        let iref = class
            .constant_pool
            .add_interface_method_ref("java/util/Collection", "stream", "()Ljava/util/stream/Stream;")
            .unwrap();
        let [hi, lo] = iref.to_be_bytes();
        let name = class.constant_pool.add_utf8("run").unwrap();
        let desc = class.constant_pool.add_utf8("()V").unwrap();
        let code = CodeAttribute::new(1, 1, vec![ALOAD_0, INVOKEINTERFACE, hi, lo, 1, 0, ARETURN]);
        let mut method = MethodInfo::new(0x0001, name, desc);
        method
            .attributes
            .push(NamedAttribute::with_name(&mut class.constant_pool, "Code", AttributeInfo::Code(code)).unwrap());
        class.methods.push(method);

        let replacement = MethodReplacement::new(
            ("java/util/Collection", "j8/util/stream/StreamSupport"),
            ("stream", None),
            ("**", None),
        )
        .unwrap()
        .with_invocation(MethodInvocation::Static);
        let table = ReplacementTable::new(Vec::new(), vec![replacement]).unwrap();
        assert!(ApiConverter::new(&table).convert(&mut class).unwrap());

        let code = &class.methods[0].code().unwrap().code;
        assert_eq!(code.len(), 7);
        assert_eq!(code[1], INVOKESTATIC);
        assert_eq!(&code[4..6], &[NOP, NOP]);
        let target = class.constant_pool.member_ref(u16::from_be_bytes([code[2], code[3]])).unwrap();
        assert_eq!(target.class_name, "j8/util/stream/StreamSupport");
        assert_eq!(target.descriptor, "(Ljava/util/Collection;)Ljava/util/stream/Stream;");
    }
}
