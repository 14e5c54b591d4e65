// Well-known names used by the backport passes

/// Name prefix javac gives to methods synthesized for lambda bodies
pub const LAMBDA_METHOD_PREFIX: &str = "lambda$";

/// Marker interface that makes a lambda serializable
pub const SERIALIZABLE_INTERFACE: &str = "java/io/Serializable";

pub const LAMBDA_METAFACTORY_CLASS: &str = "java/lang/invoke/LambdaMetafactory";
pub const LAMBDA_METAFACTORY_METHOD: &str = "metafactory";
pub const LAMBDA_ALT_METAFACTORY_METHOD: &str = "altMetafactory";

// altMetafactory flag bits
pub const FLAG_SERIALIZABLE: i32 = 1 << 0;
pub const FLAG_MARKERS: i32 = 1 << 1;
pub const FLAG_BRIDGES: i32 = 1 << 2;

// Upper bound on superclass/superinterface hops during member resolution
pub const MAX_HIERARCHY_STEPS: usize = 10_000;

// Attribute names visited by the converter
pub const ATTR_CODE: &str = "Code";
pub const ATTR_SIGNATURE: &str = "Signature";
pub const ATTR_LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
pub const ATTR_LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
pub const ATTR_RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
pub const ATTR_RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
pub const ATTR_RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeVisibleParameterAnnotations";
pub const ATTR_RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeInvisibleParameterAnnotations";
pub const ATTR_ANNOTATION_DEFAULT: &str = "AnnotationDefault";
pub const ATTR_BOOTSTRAP_METHODS: &str = "BootstrapMethods";
