/// Java bytecode instruction opcodes
///
/// Only the opcodes the backport passes inspect or emit are named here;
/// instruction lengths for the full set live in [`super::code`].

pub const NOP: u8 = 0x00;
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;
pub const IINC: u8 = 0x84;
pub const RETURN: u8 = 0xb1;
pub const ARETURN: u8 = 0xb0;

// Object model
pub const GETSTATIC: u8 = 0xb2;
pub const PUTSTATIC: u8 = 0xb3;
pub const GETFIELD: u8 = 0xb4;
pub const PUTFIELD: u8 = 0xb5;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
pub const INVOKEINTERFACE: u8 = 0xb9;
pub const INVOKEDYNAMIC: u8 = 0xba;
pub const NEW: u8 = 0xbb;
pub const NEWARRAY: u8 = 0xbc;
pub const ANEWARRAY: u8 = 0xbd;
pub const CHECKCAST: u8 = 0xc0;
pub const INSTANCEOF: u8 = 0xc1;
pub const MULTIANEWARRAY: u8 = 0xc5;

// Variable length
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;
pub const WIDE: u8 = 0xc4;

pub const ALOAD_0: u8 = 0x2a;
pub const GOTO: u8 = 0xa7;

/// Whether the opcode is one of the four method invocation instructions
/// that reference a `MethodRef`/`InterfaceMethodRef`
pub fn is_method_invocation(opcode: u8) -> bool {
    matches!(opcode, INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE)
}
