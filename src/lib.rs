//! A compiler for the Mocha language, targeting [Java class files](https://docs.oracle.com/javase/specs/jvms/se10/html/jvms-4.html).
//!
//! Source units go through three stages: the layout scanner and parser
//! build an AST, semantic resolution turns it into typed class outputs, and
//! the emitter writes class-file bytes through the `binrw` model in
//! [`types`].
//!
//! ```rust
//! use mocha_compiler::{compile, CompileOptions, SourceUnit};
//!
//! let units = [SourceUnit::new("hello.mo", "class Hello\n    greet():String = \"hi\"\n")];
//! let modules = compile(&units, &CompileOptions::default()).unwrap();
//! assert!(modules.get("Hello").is_some());
//! ```

use std::fs::File;
use std::io::{prelude::*, BufReader, Cursor};
use std::path::Path;

use binrw::{BinRead, BinResult};

#[macro_use]
extern crate bitflags;

pub mod attribute_info;
pub mod constant_info;
pub mod field_info;
pub mod method_info;

pub mod code_attribute;

pub mod classpath;
pub mod compile;
pub mod descriptor;
pub mod types;

pub use compile::{
    compile, CompileError, CompileOptions, CompiledModules, Compiler, ErrorMode, LayoutMode, SourceUnit,
};
pub use types::*;

/// Read a class file from `path`.
pub fn read_class_file(path: impl AsRef<Path>) -> BinResult<ClassFile> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_class_from_reader(&mut reader)
}

/// Read a class file from any reader; trailing bytes are ignored.
///
/// ```rust
/// let mut reader = "this_will_be_parsed_as_classfile".as_bytes();
/// assert!(mocha_compiler::read_class_from_reader(&mut reader).is_err());
/// ```
pub fn read_class_from_reader<T: Read>(reader: &mut T) -> BinResult<ClassFile> {
    let mut class_bytes = Vec::new();
    reader.read_to_end(&mut class_bytes)?;
    ClassFile::read(&mut Cursor::new(class_bytes))
}
