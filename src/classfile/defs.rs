//! Generic classfile-specific definitions

/// Header of Java class file (magic number)
pub const MAGIC: u32 = 0xCAFEBABE;

/// Name of a constructor
pub const CONSTRUCTOR_METHOD_NAME: &str = "<init>";

/// Name of a static initializer
pub const STATIC_INITIALIZER_METHOD_NAME: &str = "<clinit>";

/// JVM version constants
pub mod major_versions {
    pub const JAVA_1_1: u16 = 45;
    pub const JAVA_5_0: u16 = 49;
    pub const JAVA_6_0: u16 = 50;
    pub const JAVA_7: u16 = 51;
    pub const JAVA_8: u16 = 52;
    pub const JAVA_9: u16 = 53;
    pub const JAVA_11: u16 = 55;
    pub const JAVA_17: u16 = 61;
    pub const JAVA_21: u16 = 65;
}

pub const JAVA_1_8: u16 = major_versions::JAVA_8;

/// Method handle reference kinds (JVMS 4.4.8)
pub mod reference_kinds {
    pub const REF_GET_FIELD: u8 = 1;
    pub const REF_GET_STATIC: u8 = 2;
    pub const REF_PUT_FIELD: u8 = 3;
    pub const REF_PUT_STATIC: u8 = 4;
    pub const REF_INVOKE_VIRTUAL: u8 = 5;
    pub const REF_INVOKE_STATIC: u8 = 6;
    pub const REF_INVOKE_SPECIAL: u8 = 7;
    pub const REF_NEW_INVOKE_SPECIAL: u8 = 8;
    pub const REF_INVOKE_INTERFACE: u8 = 9;
}
