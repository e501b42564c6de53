//! Platform class library known to inference before any user code is seen.

use super::env::Environment;
use super::types::{Type, TypeDefinition};

pub const OBJECT: &str = "java.lang.Object";
pub const STRING: &str = "java.lang.String";
pub const THROWABLE: &str = "java.lang.Throwable";
pub const EXCEPTION: &str = "java.lang.Exception";
pub const RUNTIME_EXCEPTION: &str = "java.lang.RuntimeException";
pub const ERROR: &str = "java.lang.Error";

pub const PRIMITIVES: &[&str] = &["boolean", "byte", "char", "short", "int", "long", "float", "double"];

// (name, superclass)
const PLATFORM_CLASSES: &[(&str, Option<&str>)] = &[
    (OBJECT, None),
    (STRING, Some(OBJECT)),
    (THROWABLE, Some(OBJECT)),
    (EXCEPTION, Some(THROWABLE)),
    (RUNTIME_EXCEPTION, Some(EXCEPTION)),
    (ERROR, Some(THROWABLE)),
    ("java.lang.IllegalArgumentException", Some(RUNTIME_EXCEPTION)),
    ("java.lang.IllegalStateException", Some(RUNTIME_EXCEPTION)),
    ("java.lang.UnsupportedOperationException", Some(RUNTIME_EXCEPTION)),
];

const ALIASES: &[(&str, &str)] = &[
    ("Object", OBJECT),
    ("String", STRING),
    ("Throwable", THROWABLE),
    ("Exception", EXCEPTION),
    ("RuntimeException", RUNTIME_EXCEPTION),
    ("StandardError", RUNTIME_EXCEPTION),
    ("fixnum", "int"),
];

/// Register primitives, platform classes and their short aliases.
pub fn seed(env: &mut Environment) {
    for prim in PRIMITIVES {
        env.learn_type(prim, Type::named(*prim));
    }
    for (name, superclass) in PLATFORM_CLASSES {
        env.register_definition(TypeDefinition::new(*name, superclass.map(Type::named), Vec::new()));
    }
    for (short, long) in ALIASES {
        env.alias_type(short, long);
    }
}
