pub mod ast;
pub mod codegen;
pub mod emitter;
pub mod parser;
pub mod scanner;
pub mod semantic;
pub mod stack_calc;
pub mod util;

use std::fmt;
use std::io::Cursor;

use binrw::{BinRead, BinResult};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use crate::classpath::{BuiltinProvider, TypeProvider};
use crate::ClassFile;

use self::semantic::{SemanticProcessor, TypeRegistry};

/// 1-based source position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl Pos {
    pub fn new(line: u32, column: u32) -> Self {
        Pos { line, column }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("{unit}:{pos}: layout error: {message}")]
    Layout { unit: String, pos: Pos, message: String },
    #[error("{unit}:{pos}: syntax error: {message}")]
    Syntax { unit: String, pos: Pos, message: String },
    #[error("{unit}:{pos}: {message}")]
    Resolution { unit: String, pos: Pos, message: String },
    #[error("encoding error: {message}")]
    Encoding { message: String },
    #[error("{} compile errors, first: {}", .0.len(), .0.first().map(|e| e.to_string()).unwrap_or_default())]
    Collected(Vec<CompileError>),
}

impl CompileError {
    pub fn layout(unit: &str, pos: Pos, message: impl Into<String>) -> Self {
        CompileError::Layout {
            unit: unit.to_string(),
            pos,
            message: message.into(),
        }
    }

    pub fn syntax(unit: &str, pos: Pos, message: impl Into<String>) -> Self {
        CompileError::Syntax {
            unit: unit.to_string(),
            pos,
            message: message.into(),
        }
    }

    pub fn resolution(unit: &str, pos: Pos, message: impl Into<String>) -> Self {
        CompileError::Resolution {
            unit: unit.to_string(),
            pos,
            message: message.into(),
        }
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        CompileError::Encoding {
            message: message.into(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            CompileError::Layout { message, .. }
            | CompileError::Syntax { message, .. }
            | CompileError::Resolution { message, .. }
            | CompileError::Encoding { message } => message.clone(),
            CompileError::Collected(errors) => errors
                .iter()
                .map(|e| e.message())
                .collect::<Vec<_>>()
                .join("; "),
        }
    }

    pub fn pos(&self) -> Option<Pos> {
        match self {
            CompileError::Layout { pos, .. }
            | CompileError::Syntax { pos, .. }
            | CompileError::Resolution { pos, .. } => Some(*pos),
            _ => None,
        }
    }

    /// Every leaf error, flattening `Collected`.
    pub fn flatten(&self) -> Vec<&CompileError> {
        match self {
            CompileError::Collected(errors) => errors.iter().flat_map(|e| e.flatten()).collect(),
            other => vec![other],
        }
    }
}

impl From<binrw::Error> for CompileError {
    fn from(err: binrw::Error) -> Self {
        CompileError::encoding(err.to_string())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LayoutMode {
    #[default]
    Indent,
    Brace,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorMode {
    #[default]
    FailFast,
    Collect,
}

#[derive(Clone, Debug)]
pub struct CompileOptions {
    /// Width of one indentation level.
    pub indentation: usize,
    pub layout: LayoutMode,
    pub error_mode: ErrorMode,
    /// (major, minor) written into every class file.
    pub class_version: (u16, u16),
    pub emit_source_file: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            indentation: 4,
            layout: LayoutMode::Indent,
            error_mode: ErrorMode::FailFast,
            class_version: (49, 0),
            emit_source_file: true,
        }
    }
}

/// The one error sink shared by every stage.
#[derive(Debug)]
pub struct ErrorManager {
    mode: ErrorMode,
    errors: Vec<CompileError>,
}

impl ErrorManager {
    pub fn new(mode: ErrorMode) -> Self {
        ErrorManager {
            mode,
            errors: Vec::new(),
        }
    }

    pub fn mode(&self) -> ErrorMode {
        self.mode
    }

    /// Fail-fast: hand the error back so the caller stops. Collect: record it
    /// and let the caller keep going.
    pub fn report(&mut self, err: CompileError) -> Result<(), CompileError> {
        debug!(%err, "compile error");
        match self.mode {
            ErrorMode::FailFast => Err(err),
            ErrorMode::Collect => {
                match err {
                    CompileError::Collected(inner) => self.errors.extend(inner),
                    other => self.errors.push(other),
                }
                Ok(())
            }
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    /// Stop between stages once anything has been recorded.
    pub fn checkpoint(&mut self) -> Result<(), CompileError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(CompileError::Collected(std::mem::take(&mut self.errors)))
        }
    }

    pub fn finish(mut self) -> Result<(), CompileError> {
        self.checkpoint()
    }
}

#[derive(Clone, Debug)]
pub struct SourceUnit {
    pub name: String,
    pub text: String,
}

impl SourceUnit {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        SourceUnit {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Class-file bytes keyed by dotted type name, in registration order.
#[derive(Clone, Debug, Default)]
pub struct CompiledModules {
    classes: IndexMap<String, Vec<u8>>,
}

impl CompiledModules {
    pub fn insert(&mut self, name: String, bytes: Vec<u8>) {
        self.classes.insert(name, bytes);
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.classes.get(name).map(|b| b.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.classes.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Read a produced class back into the binary model.
    pub fn class_file(&self, name: &str) -> Option<BinResult<ClassFile>> {
        let bytes = self.classes.get(name)?;
        Some(ClassFile::read(&mut Cursor::new(bytes)))
    }

    pub fn into_map(self) -> IndexMap<String, Vec<u8>> {
        self.classes
    }
}

/// Compilation session with pluggable class-path providers.
pub struct Compiler {
    options: CompileOptions,
    providers: Vec<Box<dyn TypeProvider>>,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Compiler {
            options,
            providers: Vec::new(),
        }
    }

    /// Providers are consulted in the order added, before the built-in stubs.
    pub fn with_provider(mut self, provider: impl TypeProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    #[tracing::instrument(skip_all, fields(units = units.len()))]
    pub fn compile(self, units: &[SourceUnit]) -> Result<CompiledModules, CompileError> {
        let Compiler { options, mut providers } = self;
        let mut errors = ErrorManager::new(options.error_mode);

        let mut parsed = Vec::with_capacity(units.len());
        for unit in units {
            let result = scanner::scan(&unit.name, &unit.text, &options, &mut errors)
                .and_then(|tree| parser::parse(&unit.name, &tree, &mut errors));
            match result {
                Ok(ast) => parsed.push(ast),
                Err(err) => errors.report(err)?,
            }
        }
        errors.checkpoint()?;
        debug!(units = parsed.len(), "parsing finished");

        providers.push(Box::new(BuiltinProvider::new()));
        let registry = TypeRegistry::new(providers);
        let classes = SemanticProcessor::new(&registry, &mut errors).process(&parsed)?;
        errors.checkpoint()?;

        let mut modules = CompiledModules::default();
        for class in &classes {
            let bytes = emitter::emit_class(class, &options)?;
            modules.insert(crate::descriptor::internal_to_source_name(&class.name), bytes);
        }
        debug!(classes = modules.len(), "emission finished");
        errors.finish()?;
        Ok(modules)
    }
}

/// Compile a set of source units with the built-in class path.
pub fn compile(units: &[SourceUnit], options: &CompileOptions) -> Result<CompiledModules, CompileError> {
    Compiler::new(options.clone()).compile(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_fast_returns_the_error() {
        let mut errors = ErrorManager::new(ErrorMode::FailFast);
        let err = CompileError::syntax("a.mo", Pos::new(1, 2), "bad");
        assert_eq!(errors.report(err.clone()), Err(err));
        assert!(!errors.has_errors());
    }

    #[test]
    fn collect_mode_accumulates() {
        let mut errors = ErrorManager::new(ErrorMode::Collect);
        errors.report(CompileError::syntax("a.mo", Pos::new(1, 1), "one")).unwrap();
        errors.report(CompileError::resolution("a.mo", Pos::new(2, 1), "two")).unwrap();
        match errors.finish() {
            Err(CompileError::Collected(all)) => assert_eq!(all.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn error_display_carries_position() {
        let err = CompileError::layout("m.mo", Pos::new(3, 5), "bad indentation");
        assert_eq!(err.to_string(), "m.mo:3:5: layout error: bad indentation");
    }
}
