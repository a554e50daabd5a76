//! Annotation literals to element values, plus the annotations the compiler
//! attaches on its own.

use crate::compile::ast::{Annotation, Expr, ExprKind, TypeRef, UnaryOp};
use crate::compile::{CompileError, Pos};
use crate::descriptor::JvmType;

use super::imports::ImportContext;
use super::ir::{AnnotationValue, ElementVal};
use super::types::{TypeKind, TypeRegistry};

pub(crate) const RETENTION: &str = "java/lang/annotation/Retention";
const RETENTION_POLICY: &str = "java/lang/annotation/RetentionPolicy";
const IMPLICIT_IMPORTS: &str = "mocha/lang/ImplicitImports";
const IMPLICIT: &str = "mocha/lang/Implicit";

pub(crate) struct AnnotationConverter<'a> {
    pub registry: &'a TypeRegistry,
    pub imports: &'a ImportContext,
}

impl AnnotationConverter<'_> {
    fn err(&self, pos: Pos, message: impl Into<String>) -> CompileError {
        CompileError::resolution(&self.imports.unit, pos, message)
    }

    pub fn convert_all(&self, annotations: &[Annotation]) -> Result<Vec<AnnotationValue>, CompileError> {
        annotations.iter().map(|a| self.convert(a)).collect()
    }

    pub fn convert(&self, anno: &Annotation) -> Result<AnnotationValue, CompileError> {
        let ty = match self.imports.resolve_type(self.registry, &anno.ty)? {
            JvmType::Reference(name) => name,
            other => return Err(self.err(anno.pos, format!("{} is not an annotation type", other))),
        };
        let def = self
            .registry
            .get(&ty)
            .ok_or_else(|| self.err(anno.pos, format!("unknown annotation {}", ty)))?;
        if def.kind != TypeKind::Annotation {
            return Err(self.err(anno.pos, format!("{} is not an annotation type", ty.replace('/', "::"))));
        }

        let mut values = Vec::with_capacity(anno.args.len());
        for (key, expr) in &anno.args {
            let element = def
                .methods
                .iter()
                .find(|m| m.name == *key && m.params.is_empty())
                .ok_or_else(|| self.err(expr.pos, format!("{} has no element {}", ty.replace('/', "::"), key)))?;
            values.push((key.clone(), self.element(expr, &element.ret)?));
        }
        Ok(AnnotationValue { ty, values })
    }

    /// Convert `e` to a constant of the element type `ty`.
    pub fn element(&self, e: &Expr, ty: &JvmType) -> Result<ElementVal, CompileError> {
        if let JvmType::Array(elem) = ty {
            return match &e.kind {
                ExprKind::List(items) => Ok(ElementVal::Array(
                    items.iter().map(|i| self.element(i, elem)).collect::<Result<_, _>>()?,
                )),
                _ => Ok(ElementVal::Array(vec![self.element(e, elem)?])),
            };
        }
        let mismatch = || self.err(e.pos, format!("annotation element of type {} cannot hold this value", ty));
        match (&e.kind, ty) {
            (ExprKind::Unary { op: UnaryOp::Neg, expr }, _) => match self.element(expr, ty)? {
                ElementVal::Int(v) => Ok(ElementVal::Int(v.wrapping_neg())),
                ElementVal::Long(v) => Ok(ElementVal::Long(v.wrapping_neg())),
                ElementVal::Float(v) => Ok(ElementVal::Float(-v)),
                ElementVal::Double(v) => Ok(ElementVal::Double(-v)),
                ElementVal::Short(v) => Ok(ElementVal::Short(v.wrapping_neg())),
                ElementVal::Byte(v) => Ok(ElementVal::Byte(v.wrapping_neg())),
                _ => Err(mismatch()),
            },
            (ExprKind::Int(v), _) => int_element(i64::from(*v), ty).ok_or_else(mismatch),
            (ExprKind::Long(v), _) => int_element(*v, ty).ok_or_else(mismatch),
            (ExprKind::Float(v), JvmType::Float) => Ok(ElementVal::Float(*v)),
            (ExprKind::Float(v), JvmType::Double) => Ok(ElementVal::Double(f64::from(*v))),
            (ExprKind::Double(v), JvmType::Double) => Ok(ElementVal::Double(*v)),
            (ExprKind::Double(v), JvmType::Float) => Ok(ElementVal::Float(*v as f32)),
            (ExprKind::Bool(v), JvmType::Boolean) => Ok(ElementVal::Bool(*v)),
            (ExprKind::Str(s), JvmType::Char) => {
                let mut units = s.encode_utf16();
                match (units.next(), units.next()) {
                    (Some(c), None) => Ok(ElementVal::Char(c)),
                    _ => Err(self.err(e.pos, "a char element needs a one-character string")),
                }
            }
            (ExprKind::Str(s), t) if t.is_object() || *t == JvmType::string() => Ok(ElementVal::Str(s.clone())),
            (ExprKind::TypeOf(t), _) if is_class(ty) => Ok(ElementVal::Class(self.imports.resolve_type(self.registry, t)?)),
            (ExprKind::Name(name), _) if is_class(ty) => {
                let t = TypeRef {
                    path: name.split("::").map(str::to_string).collect(),
                    dims: 0,
                    pos: e.pos,
                };
                Ok(ElementVal::Class(self.imports.resolve_type(self.registry, &t)?))
            }
            (ExprKind::Annotation(inner), JvmType::Reference(expected)) => {
                let value = self.convert(inner)?;
                if value.ty != *expected {
                    return Err(mismatch());
                }
                Ok(ElementVal::Annotation(value))
            }
            (ExprKind::Name(name), JvmType::Reference(owner)) => self.enum_constant(owner, name, e.pos),
            (ExprKind::Access { name, .. }, JvmType::Reference(owner)) => self.enum_constant(owner, name, e.pos),
            _ => Err(mismatch()),
        }
    }

    fn enum_constant(&self, owner: &str, name: &str, pos: Pos) -> Result<ElementVal, CompileError> {
        let field = self
            .registry
            .find_field(owner, name)
            .filter(|f| f.is_static() && f.ty == JvmType::reference(owner))
            .ok_or_else(|| self.err(pos, format!("{} is not a constant of {}", name, owner.replace('/', "::"))))?;
        Ok(ElementVal::Enum {
            ty: owner.to_string(),
            name: field.name,
        })
    }
}

fn is_class(ty: &JvmType) -> bool {
    *ty == JvmType::reference("java/lang/Class")
}

fn int_element(v: i64, ty: &JvmType) -> Option<ElementVal> {
    Some(match ty {
        JvmType::Int => ElementVal::Int(i32::try_from(v).ok()?),
        JvmType::Long => ElementVal::Long(v),
        JvmType::Short => ElementVal::Short(i16::try_from(v).ok()?),
        JvmType::Byte => ElementVal::Byte(i8::try_from(v).ok()?),
        JvmType::Char => ElementVal::Char(u16::try_from(v).ok()?),
        JvmType::Float => ElementVal::Float(v as f32),
        JvmType::Double => ElementVal::Double(v as f64),
        _ => return None,
    })
}

/// `@Retention(RUNTIME)`, carried by every annotation type compiled here.
pub(crate) fn retention_runtime() -> AnnotationValue {
    AnnotationValue {
        ty: RETENTION.to_string(),
        values: vec![(
            "value".to_string(),
            ElementVal::Enum {
                ty: RETENTION_POLICY.to_string(),
                name: "RUNTIME".to_string(),
            },
        )],
    }
}

/// The implicit objects a class was compiled against, in lookup order.
pub(crate) fn implicit_imports(ctx: &ImportContext) -> AnnotationValue {
    let classes = ctx
        .implicits
        .iter()
        .map(|name| ElementVal::Class(JvmType::reference(name.as_str())))
        .collect();
    AnnotationValue {
        ty: IMPLICIT_IMPORTS.to_string(),
        values: vec![("implicitImports".to_string(), ElementVal::Array(classes))],
    }
}

pub(crate) fn implicit_marker() -> AnnotationValue {
    AnnotationValue {
        ty: IMPLICIT.to_string(),
        values: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use crate::compile::semantic::tests::analyze;
    use crate::compile::semantic::{AnnotationValue, ElementVal};
    use crate::descriptor::JvmType;

    fn find<'a>(annos: &'a [AnnotationValue], ty: &str) -> &'a AnnotationValue {
        annos.iter().find(|a| a.ty == ty).unwrap()
    }

    #[test]
    fn every_class_records_its_implicit_imports() {
        let out = analyze("class A\n").unwrap();
        let anno = find(&out[0].annotations, "mocha/lang/ImplicitImports");
        assert_eq!(
            anno.values,
            vec![(
                "implicitImports".to_string(),
                ElementVal::Array(vec![ElementVal::Class(JvmType::reference(
                    "mocha/lang/implicit/PrimitivesImplicit"
                ))])
            )]
        );
    }

    #[test]
    fn source_annotations_are_retained_at_run_time() {
        let out = analyze("annotation Tag\n    name:String = \"x\"\n    level:int\n@Tag(level=2)\nclass A\n").unwrap();
        let tag = &out[0];
        let retention = find(&tag.annotations, "java/lang/annotation/Retention");
        assert!(matches!(&retention.values[0].1, ElementVal::Enum { name, .. } if name == "RUNTIME"));
        let name = tag.method("name").unwrap();
        assert_eq!(name.annotation_default, Some(ElementVal::Str("x".to_string())));
        assert!(tag.method("level").unwrap().annotation_default.is_none());

        let a = out.iter().find(|c| c.name == "A").unwrap();
        let used = find(&a.annotations, "Tag");
        assert_eq!(used.values, vec![("level".to_string(), ElementVal::Int(2))]);
    }

    #[test]
    fn mismatched_element_values_are_rejected() {
        let err = analyze("annotation Tag\n    level:int\n@Tag(level=\"high\")\nclass A\n").unwrap_err();
        assert!(err.message().contains("cannot hold"));
    }
}
