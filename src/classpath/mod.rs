//! Sources of externally defined types: built-in stubs, compiled class bytes,
//! and jar archives.

mod builtin;
mod class_bytes;
#[cfg(feature = "jar")]
mod jar;

pub use builtin::{function_type, BuiltinProvider, MAX_FUNCTION_ARITY};
pub use class_bytes::{type_def_from_class, ClassBytesProvider};
#[cfg(feature = "jar")]
pub use jar::{JarError, JarProvider, JarResult};

use crate::compile::semantic::TypeDef;

/// Looks up a type by internal name (`java/util/List`).
pub trait TypeProvider {
    fn load(&self, internal_name: &str) -> Option<TypeDef>;
}
