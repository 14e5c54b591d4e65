//! Rewriting of descriptors and generic signatures (JVMS 4.3, 4.7.9.1)
//!
//! Every class name found in the input is passed through a
//! [`ReplacementTable`]. The output is only allocated once a name actually
//! changes; otherwise the input slice itself is handed back as
//! `Cow::Borrowed`, so callers can tell "nothing to do" apart from
//! "rewritten to the same text" without comparing strings.

use std::borrow::Cow;

use super::replacement::ReplacementTable;
use crate::common::error::{Error, Result};

/// Which grammar an input string follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Field,
    Method,
    /// Field descriptor or `V`, as stored in class-valued annotation elements
    Return,
    ClassSignature,
    FieldSignature,
    MethodSignature,
    /// Internal name or array descriptor, as stored in a `Class` constant
    ClassName,
}

/// Rewrite `input` according to the grammar named by `kind`
pub fn rewrite<'a>(kind: DescriptorKind, input: &'a str, table: &ReplacementTable) -> Result<Cow<'a, str>> {
    match kind {
        DescriptorKind::Field => rewrite_field_descriptor(input, table),
        DescriptorKind::Method => rewrite_method_descriptor(input, table),
        DescriptorKind::Return => rewrite_return_descriptor(input, table),
        DescriptorKind::ClassSignature => rewrite_class_signature(input, table),
        DescriptorKind::FieldSignature => rewrite_field_signature(input, table),
        DescriptorKind::MethodSignature => rewrite_method_signature(input, table),
        DescriptorKind::ClassName => rewrite_class_name(input, table),
    }
}

pub fn rewrite_field_descriptor<'a>(input: &'a str, table: &ReplacementTable) -> Result<Cow<'a, str>> {
    let mut p = Parser::new(input, Some(table));
    p.field_type()?;
    p.finish()
}

pub fn rewrite_method_descriptor<'a>(input: &'a str, table: &ReplacementTable) -> Result<Cow<'a, str>> {
    let mut p = Parser::new(input, Some(table));
    p.method_descriptor()?;
    p.finish()
}

pub fn rewrite_return_descriptor<'a>(input: &'a str, table: &ReplacementTable) -> Result<Cow<'a, str>> {
    let mut p = Parser::new(input, Some(table));
    if !p.consume(b'V') {
        p.field_type()?;
    }
    p.finish()
}

pub fn rewrite_class_signature<'a>(input: &'a str, table: &ReplacementTable) -> Result<Cow<'a, str>> {
    let mut p = Parser::new(input, Some(table));
    if p.peek() == Some(b'<') {
        p.type_parameters()?;
    }
    // Superclass, then any number of superinterfaces
    p.class_type_signature()?;
    while p.more() {
        p.class_type_signature()?;
    }
    p.finish()
}

pub fn rewrite_field_signature<'a>(input: &'a str, table: &ReplacementTable) -> Result<Cow<'a, str>> {
    let mut p = Parser::new(input, Some(table));
    p.type_signature()?;
    p.finish()
}

pub fn rewrite_method_signature<'a>(input: &'a str, table: &ReplacementTable) -> Result<Cow<'a, str>> {
    let mut p = Parser::new(input, Some(table));
    if p.peek() == Some(b'<') {
        p.type_parameters()?;
    }
    p.expect(b'(')?;
    while p.peek() != Some(b')') {
        p.type_signature()?;
    }
    p.expect(b')')?;
    if !p.consume(b'V') {
        p.type_signature()?;
    }
    while p.consume(b'^') {
        if p.peek() == Some(b'T') {
            p.type_variable()?;
        } else {
            p.class_type_signature()?;
        }
    }
    p.finish()
}

/// Rewrite the value of a `Class` constant: a bare internal name, or an
/// array descriptor for array classes
pub fn rewrite_class_name<'a>(input: &'a str, table: &ReplacementTable) -> Result<Cow<'a, str>> {
    if input.starts_with('[') {
        return rewrite_field_descriptor(input, table);
    }
    if input.is_empty() || input.contains(&[';', '[', '<', '>', '.'][..]) {
        return Err(Error::malformed_descriptor(input, 0));
    }
    Ok(match table.resolve(input) {
        Some(name) if name != input => Cow::Owned(name),
        _ => Cow::Borrowed(input),
    })
}

/// Parameter types declared by a method descriptor, in order
pub fn parameter_types(descriptor: &str) -> Result<Vec<&str>> {
    let mut p = Parser::new(descriptor, None);
    p.expect(b'(')?;
    let mut params = Vec::new();
    while p.peek() != Some(b')') {
        let start = p.pos;
        p.field_type()?;
        params.push(&descriptor[start..p.pos]);
    }
    p.expect(b')')?;
    if !p.consume(b'V') {
        p.field_type()?;
    }
    p.finish()?;
    Ok(params)
}

/// Number of parameters declared by a method descriptor
pub fn parameter_count(descriptor: &str) -> Result<usize> {
    parameter_types(descriptor).map(|params| params.len())
}

/// Operand stack slots taken by the parameters (`J` and `D` take two)
pub fn parameter_slots(descriptor: &str) -> Result<usize> {
    Ok(parameter_types(descriptor)?
        .iter()
        .map(|t| if matches!(*t, "J" | "D") { 2 } else { 1 })
        .sum())
}

/// Internal name of the class a method descriptor returns, if it returns one
pub fn return_class_name(descriptor: &str) -> Result<Option<&str>> {
    parameter_count(descriptor)?;
    let start = descriptor.rfind(')').map_or(0, |i| i + 1);
    Ok(descriptor[start..]
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';')))
}

struct Parser<'a, 't> {
    input: &'a str,
    pos: usize,
    table: Option<&'t ReplacementTable>,
    /// Rewritten text up to `copied`, allocated on the first change
    out: Option<String>,
    copied: usize,
}

impl<'a, 't> Parser<'a, 't> {
    fn new(input: &'a str, table: Option<&'t ReplacementTable>) -> Self {
        Self { input, pos: 0, table, out: None, copied: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn more(&self) -> bool {
        self.pos < self.input.len()
    }

    fn consume(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: u8) -> Result<()> {
        if self.consume(c) {
            Ok(())
        } else {
            Err(self.error())
        }
    }

    fn error(&self) -> Error {
        Error::malformed_descriptor(self.input, self.pos)
    }

    fn finish(mut self) -> Result<Cow<'a, str>> {
        if self.more() {
            return Err(self.error());
        }
        Ok(match self.out.take() {
            Some(mut out) => {
                out.push_str(&self.input[self.copied..]);
                Cow::Owned(out)
            }
            None => Cow::Borrowed(self.input),
        })
    }

    /// Run the class name at `start..end` through the table
    fn resolve(&mut self, start: usize, end: usize) {
        let Some(table) = self.table else { return };
        let input = self.input;
        let name = &input[start..end];
        let Some(replacement) = table.resolve(name) else { return };
        if replacement == name {
            return;
        }
        let out = self
            .out
            .get_or_insert_with(|| String::with_capacity(input.len() + replacement.len()));
        out.push_str(&input[self.copied..start]);
        out.push_str(&replacement);
        self.copied = end;
    }

    /// Scan up to (not including) the first byte in `stops`
    fn identifier(&mut self, stops: &[u8]) -> Result<(usize, usize)> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if stops.contains(&c) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error());
        }
        Ok((start, self.pos))
    }

    fn method_descriptor(&mut self) -> Result<()> {
        self.expect(b'(')?;
        while self.peek() != Some(b')') {
            self.field_type()?;
        }
        self.expect(b')')?;
        if !self.consume(b'V') {
            self.field_type()?;
        }
        Ok(())
    }

    fn field_type(&mut self) -> Result<()> {
        while self.consume(b'[') {}
        match self.peek() {
            Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => {
                self.pos += 1;
                Ok(())
            }
            Some(b'L') => {
                self.pos += 1;
                let (start, end) = self.identifier(b";<>.[")?;
                self.expect(b';')?;
                self.resolve(start, end);
                Ok(())
            }
            _ => Err(self.error()),
        }
    }

    /// JavaTypeSignature: reference type or base type
    fn type_signature(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => {
                self.pos += 1;
                Ok(())
            }
            _ => self.reference_type_signature(),
        }
    }

    fn reference_type_signature(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'L') => self.class_type_signature(),
            Some(b'T') => self.type_variable(),
            Some(b'[') => {
                self.pos += 1;
                self.type_signature()
            }
            _ => Err(self.error()),
        }
    }

    fn type_variable(&mut self) -> Result<()> {
        self.expect(b'T')?;
        self.identifier(b";<>./:")?;
        self.expect(b';')
    }

    fn class_type_signature(&mut self) -> Result<()> {
        self.expect(b'L')?;
        let (start, end) = self.identifier(b";<>.")?;
        self.resolve(start, end);
        if self.peek() == Some(b'<') {
            self.type_arguments()?;
        }
        // Inner class suffixes stay as written
        while self.consume(b'.') {
            self.identifier(b";<>./")?;
            if self.peek() == Some(b'<') {
                self.type_arguments()?;
            }
        }
        self.expect(b';')
    }

    fn type_arguments(&mut self) -> Result<()> {
        self.expect(b'<')?;
        loop {
            match self.peek() {
                Some(b'*') => self.pos += 1,
                Some(b'+' | b'-') => {
                    self.pos += 1;
                    self.reference_type_signature()?;
                }
                _ => self.reference_type_signature()?,
            }
            if self.consume(b'>') {
                return Ok(());
            }
        }
    }

    fn type_parameters(&mut self) -> Result<()> {
        self.expect(b'<')?;
        loop {
            self.identifier(b":<>;/.")?;
            self.expect(b':')?;
            // Class bound may be empty when only interface bounds follow
            if !matches!(self.peek(), Some(b':') | Some(b'>')) {
                self.reference_type_signature()?;
            }
            while self.consume(b':') {
                self.reference_type_signature()?;
            }
            if self.consume(b'>') {
                return Ok(());
            }
        }
    }
}
