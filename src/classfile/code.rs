//! Instruction decoding over raw `Code` bytes
//!
//! The backport passes never move instructions; they only need to find
//! instruction boundaries and the constant pool operands of the
//! instructions that carry one.

use super::error::{ClassFormatError, ClassFormatResult};
use super::opcodes::*;

/// One decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: u8,
    pub length: usize,
}

impl Instruction {
    /// Constant pool index referenced by this instruction, if any
    pub fn constant_index(&self, code: &[u8]) -> Option<u16> {
        constant_operand(code, self.offset)
    }
}

/// Constant pool index referenced by the instruction at `offset`, if any
pub fn constant_operand(code: &[u8], offset: usize) -> Option<u16> {
    let at = offset + 1;
    match *code.get(offset)? {
        LDC => code.get(at).map(|&b| b as u16),
        LDC_W | LDC2_W | GETSTATIC | PUTSTATIC | GETFIELD | PUTFIELD | INVOKEVIRTUAL
        | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE | INVOKEDYNAMIC | NEW
        | ANEWARRAY | CHECKCAST | INSTANCEOF | MULTIANEWARRAY => read_u16(code, at),
        _ => None,
    }
}

fn read_u16(code: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*code.get(at)?, *code.get(at + 1)?]))
}

fn read_i32(code: &[u8], at: usize) -> ClassFormatResult<i32> {
    match code.get(at..at + 4) {
        Some(b) => Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]])),
        None => Err(ClassFormatError::Truncated { offset: at, needed: 4 }),
    }
}

/// Length of an instruction whose size does not depend on its operands
fn fixed_length(opcode: u8) -> Option<usize> {
    Some(match opcode {
        0x00..=0x0f => 1,
        BIPUSH | LDC => 2,
        SIPUSH | LDC_W | LDC2_W => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        IINC => 3,
        0x85..=0x98 => 1,
        0x99..=0xa8 => 3,
        0xa9 => 2,
        0xac..=0xb1 => 1,
        GETSTATIC..=INVOKESTATIC => 3,
        INVOKEINTERFACE | INVOKEDYNAMIC => 5,
        NEW => 3,
        NEWARRAY => 2,
        ANEWARRAY => 3,
        0xbe | 0xbf => 1,
        CHECKCAST | INSTANCEOF => 3,
        0xc2 | 0xc3 => 1,
        MULTIANEWARRAY => 4,
        0xc6 | 0xc7 => 3,
        0xc8 | 0xc9 => 5,
        _ => return None,
    })
}

/// Total length of the instruction starting at `offset`
pub fn instruction_length(code: &[u8], offset: usize) -> ClassFormatResult<usize> {
    let opcode = *code
        .get(offset)
        .ok_or(ClassFormatError::Truncated { offset, needed: 1 })?;
    if let Some(length) = fixed_length(opcode) {
        return Ok(length);
    }
    match opcode {
        TABLESWITCH => {
            let operands = (offset + 4) & !3;
            let low = read_i32(code, operands + 4)?;
            let high = read_i32(code, operands + 8)?;
            let entries = (high as i64 - low as i64 + 1).max(0) as usize;
            Ok(operands + 12 + entries * 4 - offset)
        }
        LOOKUPSWITCH => {
            let operands = (offset + 4) & !3;
            let pairs = read_i32(code, operands + 4)?.max(0) as usize;
            Ok(operands + 8 + pairs * 8 - offset)
        }
        WIDE => match code.get(offset + 1) {
            Some(&IINC) => Ok(6),
            Some(_) => Ok(4),
            None => Err(ClassFormatError::Truncated { offset: offset + 1, needed: 1 }),
        },
        _ => Err(ClassFormatError::InvalidOpcode { opcode, offset }),
    }
}

/// Iterator over the instructions of a method body
pub struct Instructions<'a> {
    code: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Instructions<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self { code, offset: 0, failed: false }
    }
}

impl Iterator for Instructions<'_> {
    type Item = ClassFormatResult<Instruction>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.code.len() {
            return None;
        }
        let offset = self.offset;
        match instruction_length(self.code, offset) {
            Ok(length) if offset + length <= self.code.len() => {
                self.offset += length;
                Some(Ok(Instruction { offset, opcode: self.code[offset], length }))
            }
            Ok(length) => {
                self.failed = true;
                Some(Err(ClassFormatError::Truncated {
                    offset,
                    needed: offset + length - self.code.len(),
                }))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Decode every instruction, failing on the first malformed one
pub fn decode(code: &[u8]) -> ClassFormatResult<Vec<Instruction>> {
    Instructions::new(code).collect()
}
