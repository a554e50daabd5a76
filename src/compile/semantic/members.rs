//! Member signatures of source types, declared before any body is lowered.

use tracing::trace;

use crate::compile::ast::{Annotation, ClassDef, ClassKind, Expr, ExprKind, MethodDef, Modifier, Param, Stmt, VarDef};
use crate::compile::{CompileError, Pos};
use crate::descriptor::JvmType;
use crate::field_info::FieldAccessFlags;
use crate::method_info::MethodAccessFlags;

use super::imports::ImportContext;
pub(crate) use super::types::Guard;
use super::types::{FieldSig, MethodSig};
use super::{SemanticProcessor, SourceClass};

pub(crate) const SINGLETON: &str = "singletonInstance";

#[derive(Debug)]
pub(crate) struct ParamInfo<'a> {
    pub name: String,
    /// Type in the method descriptor.
    pub ty: JvmType,
    /// Type the body sees, when it differs (`fun` parameters typed narrower
    /// than the functional method).
    pub local_ty: JvmType,
    pub mutable: bool,
    pub guards: Vec<Guard>,
    pub annotations: &'a [Annotation],
}

/// Data-class members generated without source.
#[derive(Clone, Debug)]
pub(crate) enum Synth {
    Getter(FieldSig),
    Setter(FieldSig),
    Equals,
    HashCode,
    ToString,
    Unapply,
}

#[derive(Debug)]
pub(crate) enum BodySource<'a> {
    Abstract,
    Block(&'a [Stmt]),
    /// Default-parameter overload: call `target` with the declared
    /// parameters followed by `default`.
    Forward { target: MethodSig, default: &'a Expr },
    /// Annotation element with its optional default.
    Element(Option<&'a Expr>),
    Synthetic(Synth),
}

#[derive(Debug)]
pub(crate) struct MethodPlan<'a> {
    pub sig: MethodSig,
    pub params: Vec<ParamInfo<'a>>,
    pub body: BodySource<'a>,
    /// The last expression statement is the result (`fun` bodies).
    pub implicit_return: bool,
    pub annotations: &'a [Annotation],
    pub pos: Pos,
}

#[derive(Debug)]
pub(crate) struct FieldPlan<'a> {
    pub sig: FieldSig,
    pub init: Option<&'a Expr>,
    pub annotations: &'a [Annotation],
    pub pos: Pos,
}

/// One step of a constructor or static initializer, in source order.
#[derive(Debug)]
pub(crate) enum InitStep<'a> {
    Field(usize),
    Stmt(&'a Stmt),
}

#[derive(Debug)]
pub(crate) struct ClassPlan<'a> {
    pub name: String,
    pub unit: usize,
    pub def: &'a ClassDef,
    pub fields: Vec<FieldPlan<'a>>,
    pub methods: Vec<MethodPlan<'a>>,
    pub ctors: Vec<MethodPlan<'a>>,
    pub init: Vec<InitStep<'a>>,
    pub static_init: Vec<InitStep<'a>>,
}

impl ClassPlan<'_> {
    pub fn is_interface(&self) -> bool {
        matches!(self.def.kind, ClassKind::Interface | ClassKind::Annotation)
    }
}

fn literal_type(expr: &Expr) -> Option<JvmType> {
    Some(match &expr.kind {
        ExprKind::Int(_) => JvmType::Int,
        ExprKind::Long(_) => JvmType::Long,
        ExprKind::Float(_) => JvmType::Float,
        ExprKind::Double(_) => JvmType::Double,
        ExprKind::Bool(_) => JvmType::Boolean,
        ExprKind::Str(_) => JvmType::string(),
        _ => return None,
    })
}

fn method_access(modifiers: &[Modifier], is_static: bool) -> MethodAccessFlags {
    let mut access = if modifiers.contains(&Modifier::Private) {
        MethodAccessFlags::PRIVATE
    } else if modifiers.contains(&Modifier::Protected) {
        MethodAccessFlags::PROTECTED
    } else {
        MethodAccessFlags::PUBLIC
    };
    if is_static {
        access |= MethodAccessFlags::STATIC;
    }
    access
}

fn field_access(modifiers: &[Modifier], is_static: bool) -> FieldAccessFlags {
    let mut access = if modifiers.contains(&Modifier::Private) {
        FieldAccessFlags::PRIVATE
    } else if modifiers.contains(&Modifier::Protected) {
        FieldAccessFlags::PROTECTED
    } else {
        FieldAccessFlags::PUBLIC
    };
    if is_static {
        access |= FieldAccessFlags::STATIC;
    }
    if modifiers.contains(&Modifier::Val) {
        access |= FieldAccessFlags::FINAL;
    }
    access
}

pub(crate) fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

struct Planner<'p, 'a> {
    registry: &'p super::TypeRegistry,
    ctx: &'p ImportContext,
    plan: ClassPlan<'a>,
    errors: Vec<CompileError>,
}

impl<'p, 'a> Planner<'p, 'a> {
    fn err(&self, pos: Pos, message: impl Into<String>) -> CompileError {
        CompileError::resolution(&self.ctx.unit, pos, message)
    }

    fn owner(&self) -> &str {
        &self.plan.name
    }

    fn resolve(&self, ty: &crate::compile::ast::TypeRef) -> Result<JvmType, CompileError> {
        self.ctx.resolve_type(self.registry, ty)
    }

    fn param_infos(&self, params: &'a [Param]) -> Result<Vec<ParamInfo<'a>>, CompileError> {
        let mut out = Vec::with_capacity(params.len());
        for p in params {
            let ty = match &p.ty {
                Some(t) => self.resolve(t)?,
                None => JvmType::object(),
            };
            if ty == JvmType::Void {
                return Err(self.err(p.pos, format!("parameter {} cannot be Unit", p.name)));
            }
            if out.iter().any(|o: &ParamInfo| o.name == p.name) {
                return Err(self.err(p.pos, format!("duplicate parameter {}", p.name)));
            }
            out.push(ParamInfo {
                name: p.name.clone(),
                local_ty: ty.clone(),
                ty,
                mutable: !p.modifiers.contains(&Modifier::Val),
                guards: Guard::of(&p.modifiers),
                annotations: &p.annotations,
            });
        }
        Ok(out)
    }

    /// The full signature plus one forwarding overload per defaulted
    /// trailing parameter, each calling the next larger one.
    #[allow(clippy::too_many_arguments)]
    fn with_defaults(
        &self,
        name: &str,
        params: &'a [Param],
        infos: Vec<ParamInfo<'a>>,
        ret: JvmType,
        access: MethodAccessFlags,
        body: BodySource<'a>,
        annotations: &'a [Annotation],
        pos: Pos,
    ) -> Vec<MethodPlan<'a>> {
        let types: Vec<JvmType> = infos.iter().map(|p| p.ty.clone()).collect();
        let full = MethodSig::new(self.owner(), name, types.clone(), ret.clone(), access);
        let mut out = vec![MethodPlan {
            sig: full.clone(),
            params: infos,
            body,
            implicit_return: false,
            annotations,
            pos,
        }];
        let mut target = full;
        for count in (0..params.len()).rev() {
            let Some(default) = params[count].default.as_ref() else {
                break;
            };
            let sig = MethodSig::new(self.owner(), name, types[..count].to_vec(), ret.clone(), access);
            let params = out[0].params[..count]
                .iter()
                .map(|p| ParamInfo {
                    name: p.name.clone(),
                    ty: p.ty.clone(),
                    local_ty: p.local_ty.clone(),
                    mutable: p.mutable,
                    guards: Vec::new(),
                    annotations: &[],
                })
                .collect();
            out.push(MethodPlan {
                sig: sig.clone(),
                params,
                body: BodySource::Forward { target, default },
                implicit_return: false,
                annotations: &[],
                pos,
            });
            target = sig;
        }
        out
    }

    fn field(&mut self, var: &'a VarDef, is_static: bool) -> Result<usize, CompileError> {
        let ty = match (&var.ty, &var.init) {
            (Some(t), _) => self.resolve(t)?,
            (None, Some(init)) => literal_type(init).unwrap_or_else(JvmType::object),
            (None, None) => JvmType::object(),
        };
        if ty == JvmType::Void {
            return Err(self.err(var.pos, format!("field {} cannot be Unit", var.name)));
        }
        if self.plan.fields.iter().any(|f| f.sig.name == var.name) {
            return Err(self.err(var.pos, format!("duplicate field {}", var.name)));
        }
        let mut access = field_access(&var.modifiers, is_static);
        if self.plan.is_interface() {
            access = FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL;
        }
        let sig = FieldSig::new(self.owner(), &var.name, ty, access).with_guards(Guard::of(&var.modifiers));
        self.plan.fields.push(FieldPlan {
            sig,
            init: var.init.as_ref(),
            annotations: &var.annotations,
            pos: var.pos,
        });
        Ok(self.plan.fields.len() - 1)
    }

    fn method(&mut self, m: &'a MethodDef, is_static: bool) -> Result<(), CompileError> {
        let interface = self.plan.is_interface();
        let ret = match &m.ret {
            Some(t) => self.resolve(t)?,
            None => JvmType::object(),
        };
        let infos = self.param_infos(&m.params)?;
        let mut access = method_access(&m.modifiers, is_static);
        let body = match (&m.body, interface) {
            (Some(_), true) => return Err(self.err(m.pos, "interface methods cannot have bodies")),
            (Some(b), false) => BodySource::Block(b),
            (None, _) => {
                if is_static {
                    return Err(self.err(m.pos, format!("static method {} needs a body", m.name)));
                }
                if !interface && !self.plan.def.has(Modifier::Abstract) {
                    return Err(self.err(
                        m.pos,
                        format!("{} is abstract but {} is not", m.name, self.plan.def.name),
                    ));
                }
                access |= MethodAccessFlags::ABSTRACT;
                BodySource::Abstract
            }
        };
        if interface {
            access = MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT;
        }
        let plans = self.with_defaults(&m.name, &m.params, infos, ret, access, body, &m.annotations, m.pos);
        for plan in plans {
            if self
                .plan
                .methods
                .iter()
                .any(|o| o.sig.name == plan.sig.name && o.sig.params == plan.sig.params)
            {
                return Err(self.err(m.pos, format!("duplicate method {}", plan.sig.display())));
            }
            self.plan.methods.push(plan);
        }
        Ok(())
    }

    fn element(&mut self, var: &'a VarDef) -> Result<(), CompileError> {
        let ty = match (&var.ty, &var.init) {
            (Some(t), _) => self.resolve(t)?,
            (None, Some(init)) => literal_type(init)
                .ok_or_else(|| self.err(var.pos, format!("annotation element {} needs a type", var.name)))?,
            (None, None) => return Err(self.err(var.pos, format!("annotation element {} needs a type", var.name))),
        };
        let sig = MethodSig::new(
            self.owner(),
            &var.name,
            Vec::new(),
            ty,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        );
        self.plan.methods.push(MethodPlan {
            sig,
            params: Vec::new(),
            body: BodySource::Element(var.init.as_ref()),
            implicit_return: false,
            annotations: &var.annotations,
            pos: var.pos,
        });
        Ok(())
    }

    fn body_item(&mut self, stmt: &'a Stmt, is_static: bool) -> Result<(), CompileError> {
        let kind = self.plan.def.kind;
        match stmt {
            Stmt::Class(c) => Err(self.err(c.pos, "nested type definitions are not supported")),
            Stmt::Var(v) if kind == ClassKind::Annotation => self.element(v),
            Stmt::Var(v) => {
                let index = self.field(v, is_static || self.plan.is_interface())?;
                if is_static || self.plan.is_interface() {
                    self.plan.static_init.push(InitStep::Field(index));
                } else {
                    self.plan.init.push(InitStep::Field(index));
                }
                Ok(())
            }
            Stmt::Method(m) => self.method(m, is_static || m.modifiers.contains(&Modifier::Static)),
            Stmt::Static(items, _) => {
                for item in items {
                    if let Err(err) = self.body_item(item, true) {
                        self.errors.push(err);
                    }
                }
                Ok(())
            }
            Stmt::Pass(_) => Ok(()),
            other if self.plan.is_interface() => {
                Err(self.err(other.pos(), "interfaces may only declare methods and constants"))
            }
            other if is_static => {
                self.plan.static_init.push(InitStep::Stmt(other));
                Ok(())
            }
            other => {
                self.plan.init.push(InitStep::Stmt(other));
                Ok(())
            }
        }
    }

    fn constructors(&mut self) -> Result<(), CompileError> {
        let def = self.plan.def;
        if self.plan.is_interface() {
            return Ok(());
        }
        if def.kind == ClassKind::Object && !def.params.is_empty() {
            return Err(self.err(def.pos, "objects take no constructor parameters"));
        }
        let access = if def.kind == ClassKind::Object {
            MethodAccessFlags::PRIVATE
        } else {
            MethodAccessFlags::PUBLIC
        };
        if def.kind == ClassKind::Fun {
            self.plan.ctors.push(MethodPlan {
                sig: MethodSig::new(self.owner(), "<init>", Vec::new(), JvmType::Void, access),
                params: Vec::new(),
                body: BodySource::Block(&[]),
                implicit_return: false,
                annotations: &[],
                pos: def.pos,
            });
            return Ok(());
        }

        let infos = self.param_infos(&def.params)?;
        for (p, src) in infos.iter().zip(&def.params) {
            let mut modifiers = src.modifiers.clone();
            if !p.mutable && !modifiers.contains(&Modifier::Val) {
                modifiers.push(Modifier::Val);
            }
            let sig = FieldSig::new(self.owner(), &p.name, p.ty.clone(), field_access(&modifiers, false))
                .with_guards(p.guards.clone());
            self.plan.fields.push(FieldPlan {
                sig,
                init: None,
                annotations: &[],
                pos: src.pos,
            });
        }
        let ctors = self.with_defaults(
            "<init>",
            &def.params,
            infos,
            JvmType::Void,
            access,
            BodySource::Block(&[]),
            &[],
            def.pos,
        );
        self.plan.ctors.extend(ctors);
        Ok(())
    }

    /// `fun F(x): T` implements the single abstract method of its supertype.
    fn functional_method(&mut self) -> Result<(), CompileError> {
        let def = self.plan.def;
        let sam = self
            .registry
            .single_abstract_method(&self.plan.name)
            .ok_or_else(|| self.err(def.pos, format!("fun {} needs a supertype with one abstract method", def.name)))?;
        if sam.params.len() != def.params.len() {
            return Err(self.err(
                def.pos,
                format!("fun {} takes {} parameters but {} expects {}", def.name, def.params.len(), sam.display(), sam.params.len()),
            ));
        }
        let mut infos = self.param_infos(&def.params)?;
        for (info, (declared, ty)) in infos.iter_mut().zip(def.params.iter().zip(&sam.params)) {
            info.local_ty = if declared.ty.is_some() { info.ty.clone() } else { ty.clone() };
            info.ty = ty.clone();
        }
        let access = MethodAccessFlags::PUBLIC;
        self.plan.methods.push(MethodPlan {
            sig: MethodSig::new(self.owner(), &sam.name, sam.params.clone(), sam.ret.clone(), access),
            params: infos,
            body: BodySource::Block(&def.body),
            implicit_return: true,
            annotations: &[],
            pos: def.pos,
        });
        Ok(())
    }

    fn synthesize_data(&mut self) {
        let owner = self.owner().to_string();
        let declared: Vec<(String, Vec<JvmType>)> = self
            .plan
            .methods
            .iter()
            .map(|m| (m.sig.name.clone(), m.sig.params.clone()))
            .collect();
        let add = |plans: &mut Vec<MethodPlan<'a>>, sig: MethodSig, synth: Synth, pos: Pos| {
            if declared.iter().any(|(n, p)| *n == sig.name && *p == sig.params) {
                return;
            }
            plans.push(MethodPlan {
                sig,
                params: Vec::new(),
                body: BodySource::Synthetic(synth),
                implicit_return: false,
                annotations: &[],
                pos,
            });
        };
        let pos = self.plan.def.pos;
        let mut plans = Vec::new();
        let instance: Vec<FieldSig> = self
            .plan
            .fields
            .iter()
            .filter(|f| !f.sig.is_static())
            .map(|f| f.sig.clone())
            .collect();
        for field in &instance {
            let getter_name = if field.ty == JvmType::Boolean {
                format!("is{}", capitalize(&field.name))
            } else {
                format!("get{}", capitalize(&field.name))
            };
            let getter = MethodSig::new(&owner, &getter_name, vec![], field.ty.clone(), MethodAccessFlags::PUBLIC);
            add(&mut plans, getter, Synth::Getter(field.clone()), pos);
            if !field.access.contains(FieldAccessFlags::FINAL) {
                let setter = MethodSig::new(
                    &owner,
                    &format!("set{}", capitalize(&field.name)),
                    vec![field.ty.clone()],
                    JvmType::Void,
                    MethodAccessFlags::PUBLIC,
                );
                add(&mut plans, setter, Synth::Setter(field.clone()), pos);
            }
        }
        let public = MethodAccessFlags::PUBLIC;
        add(
            &mut plans,
            MethodSig::new(&owner, "equals", vec![JvmType::object()], JvmType::Boolean, public),
            Synth::Equals,
            pos,
        );
        add(&mut plans, MethodSig::new(&owner, "hashCode", vec![], JvmType::Int, public), Synth::HashCode, pos);
        add(&mut plans, MethodSig::new(&owner, "toString", vec![], JvmType::string(), public), Synth::ToString, pos);
        add(
            &mut plans,
            MethodSig::new(
                &owner,
                "unapply",
                vec![JvmType::object()],
                JvmType::reference("java/util/List"),
                public | MethodAccessFlags::STATIC,
            ),
            Synth::Unapply,
            pos,
        );
        for plan in plans.iter_mut() {
            if let BodySource::Synthetic(Synth::Setter(field)) = &plan.body {
                plan.params.push(ParamInfo {
                    name: field.name.clone(),
                    ty: field.ty.clone(),
                    local_ty: field.ty.clone(),
                    mutable: true,
                    guards: Vec::new(),
                    annotations: &[],
                });
            }
        }
        self.plan.methods.extend(plans);
    }
}

impl SemanticProcessor<'_, '_> {
    /// Declare fields, methods, and constructors of one source type and
    /// publish them to the registry.
    pub(super) fn plan_members<'a>(
        &mut self,
        source: &SourceClass<'a>,
        ctx: &ImportContext,
    ) -> Result<ClassPlan<'a>, CompileError> {
        let def = source.def;
        let mut planner = Planner {
            registry: self.registry,
            ctx,
            plan: ClassPlan {
                name: source.name.clone(),
                unit: source.unit,
                def,
                fields: Vec::new(),
                methods: Vec::new(),
                ctors: Vec::new(),
                init: Vec::new(),
                static_init: Vec::new(),
            },
            errors: Vec::new(),
        };

        if let Err(err) = planner.constructors() {
            planner.errors.push(err);
        }
        if def.kind == ClassKind::Fun {
            if let Err(err) = planner.functional_method() {
                planner.errors.push(err);
            }
        } else {
            for item in &def.body {
                if let Err(err) = planner.body_item(item, false) {
                    planner.errors.push(err);
                }
            }
        }
        if def.kind == ClassKind::Object {
            let ty = JvmType::reference(source.name.as_str());
            let access = FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL;
            planner.plan.fields.push(FieldPlan {
                sig: FieldSig::new(&source.name, SINGLETON, ty, access),
                init: None,
                annotations: &[],
                pos: def.pos,
            });
        }
        if def.has(Modifier::Data) {
            planner.synthesize_data();
        }

        let Planner { plan, errors, .. } = planner;
        for err in errors {
            self.report(err)?;
        }

        let fields: Vec<FieldSig> = plan.fields.iter().map(|f| f.sig.clone()).collect();
        let methods: Vec<MethodSig> = plan.methods.iter().map(|m| m.sig.clone()).collect();
        let ctors: Vec<MethodSig> = plan.ctors.iter().map(|m| m.sig.clone()).collect();
        trace!(
            class = %plan.name,
            fields = fields.len(),
            methods = methods.len(),
            ctors = ctors.len(),
            "members declared"
        );
        self.registry.update(&plan.name, |d| {
            d.fields = fields;
            d.methods = methods;
            d.constructors = ctors;
        });
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use crate::compile::semantic::tests::analyze;
    use crate::descriptor::JvmType;

    #[test]
    fn default_parameters_generate_forwarding_overloads() {
        let out = analyze("class C(a:int, b=1, c=2)\n    m(x:int, y:int = 3):int = x + y\n").unwrap();
        let c = &out[0];
        let ctors: Vec<String> = c.methods.iter().filter(|m| m.name == "<init>").map(|m| m.descriptor()).collect();
        assert_eq!(ctors.len(), 3);
        assert!(ctors.contains(&"(I)V".to_string()));
        assert!(ctors.contains(&"(ILjava/lang/Object;)V".to_string()));
        let ms: Vec<String> = c.methods.iter().filter(|m| m.name == "m").map(|m| m.descriptor()).collect();
        assert_eq!(ms, vec!["(II)I".to_string(), "(I)I".to_string()]);
    }

    #[test]
    fn untyped_members_default_to_object() {
        let out = analyze("class C\n    f = 1\n    g = foo()\n    foo() = 2\n").unwrap();
        let c = &out[0];
        assert_eq!(c.field("f").unwrap().ty, JvmType::Int);
        assert_eq!(c.field("g").unwrap().ty, JvmType::object());
        assert_eq!(c.method("foo").unwrap().ret, JvmType::object());
    }

    #[test]
    fn data_class_members() {
        let out = analyze("data class P(x:int, val y:String)\n").unwrap();
        let p = &out[0];
        for name in ["getX", "setX", "getY", "equals", "hashCode", "toString", "unapply"] {
            assert!(p.method(name).is_some(), "missing {}", name);
        }
        assert!(p.method("setY").is_none());
    }

    #[test]
    fn object_has_private_constructor_and_singleton() {
        let out = analyze("object O\n    hello() = 1\n").unwrap();
        let o = &out[0];
        let ctor = o.method("<init>").unwrap();
        assert!(ctor.access.contains(crate::method_info::MethodAccessFlags::PRIVATE));
        assert!(o.field("singletonInstance").is_some());
        assert!(o.method("<clinit>").is_some());
    }

    #[test]
    fn interface_bodies_are_rejected() {
        let err = analyze("interface I\n    m():int = 1\n").unwrap_err();
        assert!(err.message().contains("cannot have bodies"));
    }
}
