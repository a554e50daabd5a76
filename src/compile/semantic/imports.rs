//! Per-unit name lookup: explicit imports, the unit's own package, then the
//! wildcard packages.

use std::collections::HashMap;

use tracing::trace;

use crate::compile::ast::{Import, ImportKind, TypeRef, Unit};
use crate::compile::CompileError;
use crate::descriptor::JvmType;

use super::types::TypeRegistry;

/// Packages every unit sees without importing them.
const DEFAULT_PACKAGES: &[&str] = &["java/lang", "mocha/lang"];

pub const PRIMITIVES_IMPLICIT: &str = "mocha/lang/implicit/PrimitivesImplicit";

#[derive(Clone, Debug, Default)]
pub struct ImportContext {
    pub unit: String,
    /// Internal package prefix, `a/b`, empty for the default package.
    pub package: String,
    types: HashMap<String, String>,
    packages: Vec<String>,
    /// Types whose static members are visible unqualified.
    pub static_types: Vec<String>,
    /// Implicit objects consulted for `cast` conversions, in import order.
    pub implicits: Vec<String>,
}

impl ImportContext {
    /// Record the unit's imports. Types named by imports must already be
    /// registered or loadable.
    pub fn build(unit: &Unit, registry: &TypeRegistry) -> Result<Self, CompileError> {
        let mut ctx = ImportContext {
            unit: unit.name.clone(),
            package: unit.package.join("/"),
            ..Default::default()
        };
        ctx.packages.push(ctx.package.clone());
        ctx.packages.extend(DEFAULT_PACKAGES.iter().map(|p| p.to_string()));
        ctx.implicits.push(PRIMITIVES_IMPLICIT.to_string());

        for import in &unit.imports {
            ctx.add(import, registry)?;
        }
        trace!(
            unit = %ctx.unit,
            types = ctx.types.len(),
            packages = ctx.packages.len(),
            implicits = ctx.implicits.len(),
            "imports resolved"
        );
        Ok(ctx)
    }

    fn add(&mut self, import: &Import, registry: &TypeRegistry) -> Result<(), CompileError> {
        let internal = import.path.join("/");
        let require = |registry: &TypeRegistry| {
            if registry.contains(&internal) {
                Ok(())
            } else {
                Err(CompileError::resolution(
                    &self.unit,
                    import.pos,
                    format!("cannot find imported type {}", import.path.join("::")),
                ))
            }
        };
        match import.kind {
            ImportKind::Type => {
                require(registry)?;
                let simple = import.path.last().cloned().unwrap_or_default();
                self.types.insert(simple, internal);
            }
            ImportKind::Package => {
                if !self.packages.contains(&internal) {
                    self.packages.push(internal);
                }
            }
            ImportKind::Static => {
                require(registry)?;
                self.static_types.push(internal);
            }
            ImportKind::Implicit => {
                require(registry)?;
                let implicit = registry.get(&internal).map_or(false, |d| d.is_implicit);
                if !implicit {
                    return Err(CompileError::resolution(
                        &self.unit,
                        import.pos,
                        format!("{} is not an implicit object", import.path.join("::")),
                    ));
                }
                if !self.implicits.contains(&internal) {
                    self.implicits.push(internal);
                }
            }
        }
        Ok(())
    }

    /// Internal name for a simple or `::`-qualified type name.
    pub fn resolve_name(&self, registry: &TypeRegistry, name: &str) -> Option<String> {
        if name.contains("::") {
            let internal = name.replace("::", "/");
            return registry.contains(&internal).then_some(internal);
        }
        if let Some(found) = self.types.get(name) {
            return Some(found.clone());
        }
        self.packages.iter().find_map(|package| {
            let candidate = if package.is_empty() {
                name.to_string()
            } else {
                format!("{}/{}", package, name)
            };
            registry.contains(&candidate).then_some(candidate)
        })
    }

    /// Resolve a written type; `Unit` is `void`.
    pub fn resolve_type(&self, registry: &TypeRegistry, ty: &TypeRef) -> Result<JvmType, CompileError> {
        let base = match ty.path.as_slice() {
            [single] => match JvmType::from_keyword(single) {
                Some(prim) => Some(prim),
                None => self.resolve_name(registry, single).map(JvmType::Reference),
            },
            path => self.resolve_name(registry, &path.join("::")).map(JvmType::Reference),
        };
        let Some(mut out) = base else {
            return Err(CompileError::resolution(
                &self.unit,
                ty.pos,
                format!("cannot find type {}", ty.display()),
            ));
        };
        if out == JvmType::Void && ty.dims > 0 {
            return Err(CompileError::resolution(&self.unit, ty.pos, "array of Unit"));
        }
        for _ in 0..ty.dims {
            out = JvmType::Array(Box::new(out));
        }
        Ok(out)
    }

    /// Internal name a source-defined type in this unit gets.
    pub fn qualify(&self, simple: &str) -> String {
        if self.package.is_empty() {
            simple.to_string()
        } else {
            format!("{}/{}", self.package, simple)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classpath::BuiltinProvider;
    use crate::compile::Pos;

    fn unit(package: &[&str], imports: Vec<Import>) -> Unit {
        Unit {
            name: "t.mo".into(),
            package: package.iter().map(|s| s.to_string()).collect(),
            imports,
            items: Vec::new(),
        }
    }

    fn import(path: &[&str], kind: ImportKind) -> Import {
        Import {
            path: path.iter().map(|s| s.to_string()).collect(),
            kind,
            pos: Pos::new(1, 1),
        }
    }

    #[test]
    fn java_lang_is_always_visible() {
        let registry = TypeRegistry::new(vec![Box::new(BuiltinProvider::new())]);
        let ctx = ImportContext::build(&unit(&[], vec![]), &registry).unwrap();
        assert_eq!(ctx.resolve_name(&registry, "String").as_deref(), Some("java/lang/String"));
        assert_eq!(ctx.resolve_name(&registry, "ArrayList"), None);
    }

    #[test]
    fn explicit_and_wildcard_imports() {
        let registry = TypeRegistry::new(vec![Box::new(BuiltinProvider::new())]);
        let ctx = ImportContext::build(
            &unit(
                &["app"],
                vec![
                    import(&["java", "util", "ArrayList"], ImportKind::Type),
                    import(&["java", "util"], ImportKind::Package),
                ],
            ),
            &registry,
        )
        .unwrap();
        assert_eq!(ctx.resolve_name(&registry, "ArrayList").as_deref(), Some("java/util/ArrayList"));
        assert_eq!(ctx.resolve_name(&registry, "HashMap").as_deref(), Some("java/util/HashMap"));
        assert_eq!(ctx.qualify("Main"), "app/Main");

        let ty = ctx
            .resolve_type(
                &registry,
                &TypeRef {
                    path: vec!["int".into()],
                    dims: 2,
                    pos: Pos::default(),
                },
            )
            .unwrap();
        assert_eq!(ty.to_descriptor(), "[[I");
    }

    #[test]
    fn missing_import_is_reported() {
        let registry = TypeRegistry::new(vec![Box::new(BuiltinProvider::new())]);
        let err = ImportContext::build(&unit(&[], vec![import(&["no", "Such"], ImportKind::Type)]), &registry)
            .unwrap_err();
        assert!(err.message().contains("no::Such"));
    }

    #[test]
    fn implicit_import_requires_an_implicit_object() {
        let registry = TypeRegistry::new(vec![Box::new(BuiltinProvider::new())]);
        let err = ImportContext::build(
            &unit(&[], vec![import(&["java", "lang", "String"], ImportKind::Implicit)]),
            &registry,
        )
        .unwrap_err();
        assert!(err.message().contains("not an implicit object"));
    }
}
