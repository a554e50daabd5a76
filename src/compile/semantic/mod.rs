//! Semantic resolution: AST to typed, emission-ready class outputs.
//!
//! Phases run in a fixed order and each is a barrier for the next:
//! registration of every source type, import contexts, hierarchy (parents,
//! interfaces, cycle rejection), member signatures, the abstract-method check,
//! and finally body lowering. Lambdas and inner methods synthesized while
//! lowering a class are appended to that class's output.

mod annotations;
mod body;
mod calls;
mod closure;
pub mod convert;
mod expr;
mod hierarchy;
pub mod imports;
pub mod ir;
mod lower;
mod members;
pub mod overload;
mod stmt;
mod sugar;
pub mod types;

use tracing::debug;

use crate::compile::ast::{ClassDef, Unit};
use crate::compile::{CompileError, ErrorManager};

pub use self::imports::ImportContext;
pub use self::ir::*;
pub use self::types::{FieldSig, Guard, MethodSig, TypeDef, TypeKind, TypeRegistry};

/// A type declared in one of the compiled units.
#[derive(Debug)]
pub(crate) struct SourceClass<'a> {
    /// Internal name.
    pub name: String,
    /// Index of the declaring unit.
    pub unit: usize,
    pub def: &'a ClassDef,
}

pub struct SemanticProcessor<'r, 'e> {
    registry: &'r TypeRegistry,
    errors: &'e mut ErrorManager,
}

impl<'r, 'e> SemanticProcessor<'r, 'e> {
    pub fn new(registry: &'r TypeRegistry, errors: &'e mut ErrorManager) -> Self {
        SemanticProcessor { registry, errors }
    }

    /// Resolve every unit; classes come back in registration order, each
    /// followed by the auxiliary classes synthesized for it.
    #[tracing::instrument(skip_all, fields(units = units.len()))]
    pub fn process(mut self, units: &[Unit]) -> Result<Vec<ClassOutput>, CompileError> {
        let sources = self.register(units)?;
        debug!(types = sources.len(), "types registered");

        let mut imports = Vec::with_capacity(units.len());
        for unit in units {
            match ImportContext::build(unit, self.registry) {
                Ok(ctx) => imports.push(ctx),
                Err(err) => {
                    self.errors.report(err)?;
                    imports.push(ImportContext::default());
                }
            }
        }
        self.errors.checkpoint()?;

        self.resolve_hierarchy(&sources, &imports)?;
        self.errors.checkpoint()?;
        debug!("hierarchy resolved");

        let mut plans = Vec::with_capacity(sources.len());
        for source in &sources {
            plans.push(self.plan_members(source, &imports[source.unit])?);
        }
        self.check_overrides(&sources, &imports)?;
        self.errors.checkpoint()?;
        debug!(classes = plans.len(), "members declared");

        let mut out = Vec::new();
        for plan in &plans {
            let file = units[plan.unit].name.clone();
            let classes = self.lower_class(plan, &imports[plan.unit], &file)?;
            out.extend(classes);
        }
        debug!(classes = out.len(), "bodies lowered");
        Ok(out)
    }

    fn report(&mut self, err: CompileError) -> Result<(), CompileError> {
        self.errors.report(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classpath::BuiltinProvider;
    use crate::compile::{parser, scanner, CompileOptions, ErrorMode};

    pub(crate) fn analyze(src: &str) -> Result<Vec<ClassOutput>, CompileError> {
        analyze_units(&[("test.mo", src)], ErrorMode::FailFast)
    }

    pub(crate) fn parse_one(src: &str) -> Unit {
        let mut errors = ErrorManager::new(ErrorMode::FailFast);
        let tree = scanner::scan("test.mo", src, &CompileOptions::default(), &mut errors).unwrap();
        parser::parse("test.mo", &tree, &mut errors).unwrap()
    }

    pub(crate) fn analyze_units(units: &[(&str, &str)], mode: ErrorMode) -> Result<Vec<ClassOutput>, CompileError> {
        let options = CompileOptions::default();
        let mut errors = ErrorManager::new(mode);
        let mut parsed = Vec::new();
        for (name, text) in units {
            let tree = scanner::scan(name, text, &options, &mut errors)?;
            parsed.push(parser::parse(name, &tree, &mut errors)?);
        }
        let registry = TypeRegistry::new(vec![Box::new(BuiltinProvider::new())]);
        let out = SemanticProcessor::new(&registry, &mut errors).process(&parsed)?;
        errors.finish()?;
        Ok(out)
    }

    #[test]
    fn classes_keep_registration_order() {
        let out = analyze("class A\nclass B\ninterface I\n").unwrap();
        let names: Vec<&str> = out.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "I"]);
    }

    #[test]
    fn cross_unit_references_resolve_in_any_order() {
        let out = analyze_units(
            &[("a.mo", "package p\nclass A : B\n"), ("b.mo", "package p\nclass B\n")],
            ErrorMode::FailFast,
        )
        .unwrap();
        assert_eq!(out[0].super_name.as_deref(), Some("p/B"));
    }

    #[test]
    fn collect_mode_reports_every_bad_statement() {
        let src = "class A\n    def m()\n        x = nope1\n        y = nope2\n";
        match analyze_units(&[("a.mo", src)], ErrorMode::Collect) {
            Err(CompileError::Collected(all)) => assert_eq!(all.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }
}
