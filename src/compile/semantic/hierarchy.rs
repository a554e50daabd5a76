use std::collections::HashSet;

use tracing::trace;

use crate::classpath::function_type;
use crate::compile::ast::{ClassDef, ClassKind, Modifier, Stmt, Unit};
use crate::compile::CompileError;
use crate::descriptor::{JvmType, OBJECT};
use crate::types::ClassAccessFlags;

use super::imports::ImportContext;
use super::types::{TypeDef, TypeKind};
use super::{SemanticProcessor, SourceClass};

const ANNOTATION: &str = "java/lang/annotation/Annotation";

fn skeleton(name: &str, def: &ClassDef) -> TypeDef {
    let kind = match def.kind {
        ClassKind::Interface => TypeKind::Interface,
        ClassKind::Annotation => TypeKind::Annotation,
        _ => TypeKind::Class,
    };
    let mut ty = TypeDef::new(name, kind);
    if kind == TypeKind::Class {
        ty.access |= ClassAccessFlags::SUPER;
        if def.has(Modifier::Abstract) {
            ty.access |= ClassAccessFlags::ABSTRACT;
        }
    }
    if kind == TypeKind::Annotation {
        ty.interfaces.push(ANNOTATION.to_string());
    }
    ty.is_object = def.kind == ClassKind::Object;
    ty.is_implicit = def.has(Modifier::Implicit);
    ty.from_source = true;
    ty
}

impl SemanticProcessor<'_, '_> {
    /// Put every declared type into the registry before anything is resolved.
    pub(super) fn register<'a>(&mut self, units: &'a [Unit]) -> Result<Vec<SourceClass<'a>>, CompileError> {
        let mut out: Vec<SourceClass<'a>> = Vec::new();
        for (index, unit) in units.iter().enumerate() {
            let package = unit.package.join("/");
            for item in &unit.items {
                let Stmt::Class(def) = item else {
                    self.report(CompileError::resolution(
                        &unit.name,
                        item.pos(),
                        "only type definitions may appear at the top level",
                    ))?;
                    continue;
                };
                let name = if package.is_empty() {
                    def.name.clone()
                } else {
                    format!("{}/{}", package, def.name)
                };
                if out.iter().any(|s| s.name == name) {
                    self.report(CompileError::resolution(
                        &unit.name,
                        def.pos,
                        format!("duplicate type {}", def.name),
                    ))?;
                    continue;
                }
                self.registry.define(skeleton(&name, def));
                trace!(name = %name, "registered source type");
                out.push(SourceClass { name, unit: index, def });
            }
        }
        Ok(out)
    }

    /// Resolve parents and interfaces, then reject inheritance cycles.
    pub(super) fn resolve_hierarchy(
        &mut self,
        sources: &[SourceClass<'_>],
        imports: &[ImportContext],
    ) -> Result<(), CompileError> {
        for source in sources {
            let ctx = &imports[source.unit];
            match self.resolve_supers(source, ctx) {
                Ok((parent, interfaces)) => self.registry.update(&source.name, |def| {
                    if parent.is_some() {
                        def.parent = parent;
                    }
                    for iface in interfaces {
                        if !def.interfaces.contains(&iface) {
                            def.interfaces.push(iface);
                        }
                    }
                }),
                Err(err) => self.report(err)?,
            }
        }
        self.reject_cycles(sources, imports)
    }

    fn resolve_supers(
        &self,
        source: &SourceClass<'_>,
        ctx: &ImportContext,
    ) -> Result<(Option<String>, Vec<String>), CompileError> {
        let def = source.def;
        let mut parent = None;
        let mut interfaces = Vec::new();

        let mut named = Vec::new();
        if let Some(p) = &def.parent {
            named.push((p, true));
        }
        named.extend(def.interfaces.iter().map(|i| (i, false)));

        for (ty_ref, first) in named {
            let ty = ctx.resolve_type(self.registry, ty_ref)?;
            let JvmType::Reference(name) = ty else {
                return Err(CompileError::resolution(
                    &ctx.unit,
                    ty_ref.pos,
                    format!("cannot inherit from {}", ty_ref.display()),
                ));
            };
            let is_interface = self.registry.get(&name).map_or(false, |d| d.is_interface());
            let class_kind = !matches!(def.kind, ClassKind::Interface | ClassKind::Annotation);
            if class_kind && first && !is_interface {
                parent = Some(name);
            } else if is_interface {
                interfaces.push(name);
            } else {
                return Err(CompileError::resolution(
                    &ctx.unit,
                    ty_ref.pos,
                    format!("{} is not an interface", ty_ref.display()),
                ));
            }
        }

        if def.kind == ClassKind::Fun && parent.is_none() && interfaces.is_empty() {
            interfaces.push(function_type(def.params.len()));
        }
        if parent.is_none() && !def.parent_args.is_empty() {
            return Err(CompileError::resolution(
                &ctx.unit,
                def.pos,
                "constructor arguments given to an interface",
            ));
        }
        Ok((parent, interfaces))
    }

    /// Classes and interfaces are checked separately; the first type found on
    /// a cycle is reported and its offending edge dropped so later walks end.
    fn reject_cycles(&mut self, sources: &[SourceClass<'_>], imports: &[ImportContext]) -> Result<(), CompileError> {
        let mut reported: HashSet<String> = HashSet::new();
        for source in sources {
            if reported.contains(&source.name) {
                continue;
            }
            let Some(def) = self.registry.get(&source.name) else {
                continue;
            };
            let cycle = if def.is_interface() {
                self.interface_cycle(&source.name)
            } else {
                self.class_cycle(&source.name)
            };
            let Some(cycle) = cycle else { continue };
            let unit = &imports[source.unit].unit;
            let path: Vec<String> = cycle.iter().map(|n| crate::descriptor::internal_to_source_name(n)).collect();
            reported.extend(cycle.iter().cloned());
            let next = cycle.get(1).cloned();
            self.registry.update(&source.name, |d| {
                if d.is_interface() {
                    d.interfaces.retain(|i| Some(i) != next.as_ref());
                } else {
                    d.parent = Some(OBJECT.to_string());
                }
            });
            self.report(CompileError::resolution(
                unit,
                source.def.pos,
                format!("cyclic inheritance: {}", path.join(" -> ")),
            ))?;
        }
        Ok(())
    }

    /// `start -> parent -> ... -> start`, following parents only.
    fn class_cycle(&self, start: &str) -> Option<Vec<String>> {
        let mut path = vec![start.to_string()];
        let mut seen = HashSet::new();
        let mut current = start.to_string();
        loop {
            let parent = self.registry.get(&current)?.parent.clone()?;
            if parent == start {
                path.push(parent);
                return Some(path);
            }
            if !seen.insert(parent.clone()) {
                return None;
            }
            path.push(parent.clone());
            current = parent;
        }
    }

    fn interface_cycle(&self, start: &str) -> Option<Vec<String>> {
        fn walk(
            this: &SemanticProcessor<'_, '_>,
            start: &str,
            current: &str,
            path: &mut Vec<String>,
            seen: &mut HashSet<String>,
        ) -> bool {
            let Some(def) = this.registry.get(current) else {
                return false;
            };
            for next in &def.interfaces {
                if next == start {
                    path.push(next.clone());
                    return true;
                }
                if seen.insert(next.clone()) {
                    path.push(next.clone());
                    if walk(this, start, next, path, seen) {
                        return true;
                    }
                    path.pop();
                }
            }
            false
        }

        let mut path = vec![start.to_string()];
        let mut seen = HashSet::new();
        walk(self, start, start, &mut path, &mut seen).then_some(path)
    }

    /// Concrete classes must implement every inherited abstract method, and
    /// an override may not change the return type incompatibly.
    pub(super) fn check_overrides(
        &mut self,
        sources: &[SourceClass<'_>],
        imports: &[ImportContext],
    ) -> Result<(), CompileError> {
        for source in sources {
            let Some(def) = self.registry.get(&source.name) else {
                continue;
            };
            let unit = imports[source.unit].unit.clone();

            for own in &def.methods {
                for sup in self.registry.supertypes(&source.name) {
                    let Some(sup_def) = self.registry.get(&sup) else { continue };
                    let clash = sup_def
                        .methods
                        .iter()
                        .find(|m| m.name == own.name && m.params == own.params && !m.is_static());
                    if let Some(inherited) = clash {
                        let compatible = inherited.ret == own.ret
                            || (own.ret.is_reference() && self.registry.assignable(&own.ret, &inherited.ret));
                        if !compatible {
                            self.report(CompileError::resolution(
                                &unit,
                                source.def.pos,
                                format!(
                                    "{} overrides {}.{} with an incompatible return type",
                                    own.display(),
                                    crate::descriptor::internal_to_source_name(&sup),
                                    inherited.display()
                                ),
                            ))?;
                        }
                    }
                }
            }

            if def.is_interface() || def.is_abstract() {
                continue;
            }
            for missing in self.registry.unimplemented_abstract(&source.name) {
                self.report(CompileError::resolution(
                    &unit,
                    source.def.pos,
                    format!(
                        "{} does not implement {} from {}",
                        source.def.name,
                        missing.display(),
                        crate::descriptor::internal_to_source_name(&missing.owner)
                    ),
                ))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::compile::semantic::tests::{analyze, analyze_units};
    use crate::compile::ErrorMode;

    fn cycle_error(src: &str) -> String {
        match analyze(src) {
            Err(err) => err.message(),
            Ok(_) => panic!("cycle accepted"),
        }
    }

    #[test]
    fn two_class_cycle() {
        assert!(cycle_error("class A : B\nclass B : A\n").contains("cyclic inheritance"));
    }

    #[test]
    fn three_class_cycle() {
        assert!(cycle_error("class A : B\nclass B : C\nclass C : A\n").contains("cyclic inheritance"));
    }

    #[test]
    fn interface_cycles_are_checked_separately() {
        assert!(cycle_error("interface I : J\ninterface J : I\n").contains("cyclic inheritance"));
        assert!(cycle_error("interface I : J\ninterface J : K\ninterface K : I\n").contains("cyclic inheritance"));
    }

    #[test]
    fn every_cycle_is_reported_once_in_collect_mode() {
        let src = "class A : B\nclass B : A\ninterface I : J\ninterface J : I\n";
        match analyze_units(&[("c.mo", src)], ErrorMode::Collect) {
            Err(err) => assert_eq!(err.flatten().len(), 2),
            Ok(_) => panic!("cycles accepted"),
        }
    }

    #[test]
    fn parent_interface_moves_to_interfaces() {
        let out = analyze("interface I\nclass A : I\n").unwrap();
        let a = out.iter().find(|c| c.name == "A").unwrap();
        assert_eq!(a.super_name.as_deref(), Some("java/lang/Object"));
        assert_eq!(a.interfaces, vec!["I".to_string()]);
    }

    #[test]
    fn missing_abstract_implementation() {
        let err = analyze("interface I\n    run():int\nclass A : I\n").unwrap_err();
        assert!(err.message().contains("does not implement run"), "{}", err);
    }

    #[test]
    fn abstract_class_may_leave_methods_open() {
        assert!(analyze("interface I\n    run():int\nabstract class A : I\n").is_ok());
    }
}
