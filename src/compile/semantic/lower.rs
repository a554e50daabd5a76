//! Body lowering of one planned class into its [`ClassOutput`] and the
//! auxiliary classes synthesized for it.

use tracing::{debug, trace};

use crate::compile::ast::{ClassKind, Stmt};
use crate::compile::{CompileError, Pos};
use crate::descriptor::{JvmType, OBJECT};
use crate::field_info::FieldAccessFlags;
use crate::method_info::MethodAccessFlags;
use crate::types::ClassAccessFlags;

use super::annotations::{self, AnnotationConverter};
use super::body::{BodyBuilder, ClassScope, Synthesized};
use super::closure::captured_names;
use super::imports::ImportContext;
use super::ir::*;
use super::members::{BodySource, ClassPlan, FieldPlan, InitStep, MethodPlan, SINGLETON};
use super::types::TypeKind;
use super::SemanticProcessor;

impl SemanticProcessor<'_, '_> {
    /// Lower every body of `plan`. The class comes first, followed by the
    /// lambda classes created for it.
    #[tracing::instrument(skip_all, fields(class = %plan.name))]
    pub(super) fn lower_class(
        &mut self,
        plan: &ClassPlan<'_>,
        ctx: &ImportContext,
        file: &str,
    ) -> Result<Vec<ClassOutput>, CompileError> {
        let scope = ClassScope {
            registry: self.registry,
            imports: ctx,
            host: plan.name.clone(),
            source_file: file.to_string(),
        };
        let converter = AnnotationConverter {
            registry: self.registry,
            imports: ctx,
        };
        let mut synth = Synthesized::default();

        let mut fields = Vec::with_capacity(plan.fields.len());
        for field in &plan.fields {
            let annotations = match converter.convert_all(field.annotations) {
                Ok(a) => a,
                Err(err) => {
                    self.report(err)?;
                    Vec::new()
                }
            };
            fields.push(FieldOutput {
                name: field.sig.name.clone(),
                ty: field.sig.ty.clone(),
                access: field.sig.access,
                annotations,
            });
        }

        let mut methods = Vec::with_capacity(plan.methods.len() + plan.ctors.len() + 1);
        let init_stmts = steps_stmts(&plan.init);
        for ctor in &plan.ctors {
            let lowered = self.lower_ctor(&scope, &mut synth, plan, ctor, &init_stmts);
            self.keep(lowered, &converter, ctor, &mut methods)?;
        }
        for method in &plan.methods {
            let lowered = self.lower_method(&scope, &mut synth, method, &converter);
            self.keep(lowered, &converter, method, &mut methods)?;
        }
        if plan.def.kind == ClassKind::Object || !plan.static_init.is_empty() {
            match self.lower_static_init(&scope, &mut synth, plan) {
                Ok(body) => methods.push(MethodOutput {
                    name: "<clinit>".to_string(),
                    params: Vec::new(),
                    ret: JvmType::Void,
                    access: MethodAccessFlags::STATIC,
                    body: Some(body),
                    annotations: Vec::new(),
                    param_annotations: Vec::new(),
                    annotation_default: None,
                }),
                Err(err) => self.report(err)?,
            }
        }
        methods.append(&mut synth.methods);
        for field in fields.iter_mut().filter(|f| synth.widened_fields.contains(&f.name)) {
            field.access.remove(FieldAccessFlags::PRIVATE);
        }
        for method in &mut methods {
            if synth.widened_methods.contains(&(method.name.clone(), method.descriptor())) {
                method.access.remove(MethodAccessFlags::PRIVATE);
            }
        }
        if !synth.widened_fields.is_empty() || !synth.widened_methods.is_empty() {
            trace!(
                fields = synth.widened_fields.len(),
                methods = synth.widened_methods.len(),
                "private members widened for lambdas"
            );
        }

        let def = self
            .registry
            .get(&plan.name)
            .ok_or_else(|| CompileError::resolution(&ctx.unit, plan.def.pos, format!("{} vanished", plan.name)))?;
        let mut class_annotations = match converter.convert_all(&plan.def.annotations) {
            Ok(a) => a,
            Err(err) => {
                self.report(err)?;
                Vec::new()
            }
        };
        if def.kind == TypeKind::Annotation && !class_annotations.iter().any(|a| a.ty == annotations::RETENTION) {
            class_annotations.push(annotations::retention_runtime());
        }
        if def.is_implicit {
            class_annotations.push(annotations::implicit_marker());
        }
        if def.kind == TypeKind::Class {
            class_annotations.push(annotations::implicit_imports(ctx));
        }

        let mut out = vec![ClassOutput {
            name: plan.name.clone(),
            access: def.access,
            super_name: Some(def.parent.clone().unwrap_or_else(|| OBJECT.to_string())),
            interfaces: def.interfaces.clone(),
            fields,
            methods,
            annotations: class_annotations,
            source_file: Some(file.to_string()),
        }];
        for mut class in synth.classes {
            if class.access.contains(ClassAccessFlags::SUPER) {
                class.annotations.push(annotations::implicit_imports(ctx));
            }
            out.push(class);
        }
        debug!(outputs = out.len(), "class lowered");
        Ok(out)
    }

    /// Attach annotations to a lowered method, or report why it failed.
    fn keep(
        &mut self,
        lowered: Result<(Option<MethodBody>, Option<ElementVal>), CompileError>,
        converter: &AnnotationConverter<'_>,
        plan: &MethodPlan<'_>,
        methods: &mut Vec<MethodOutput>,
    ) -> Result<(), CompileError> {
        let (body, annotation_default) = match lowered {
            Ok(parts) => parts,
            Err(err) => return self.report(err),
        };
        let annotations = converter.convert_all(plan.annotations);
        let param_annotations: Result<Vec<_>, _> = plan.params.iter().map(|p| converter.convert_all(p.annotations)).collect();
        let (annotations, param_annotations) = match (annotations, param_annotations) {
            (Ok(a), Ok(p)) => (a, p),
            (Err(err), _) | (_, Err(err)) => return self.report(err),
        };
        let param_annotations = if param_annotations.iter().all(Vec::is_empty) {
            Vec::new()
        } else {
            param_annotations
        };
        methods.push(MethodOutput {
            name: plan.sig.name.clone(),
            params: plan.sig.params.clone(),
            ret: plan.sig.ret.clone(),
            access: plan.sig.access,
            body,
            annotations,
            param_annotations,
            annotation_default,
        });
        Ok(())
    }

    fn lower_method(
        &mut self,
        scope: &ClassScope<'_>,
        synth: &mut Synthesized,
        plan: &MethodPlan<'_>,
        converter: &AnnotationConverter<'_>,
    ) -> Result<(Option<MethodBody>, Option<ElementVal>), CompileError> {
        let sig = &plan.sig;
        trace!(method = %sig.display(), "lowering");
        let stmts = match &plan.body {
            BodySource::Abstract => return Ok((None, None)),
            BodySource::Element(default) => {
                let value = default.map(|e| converter.element(e, &sig.ret)).transpose()?;
                return Ok((None, value));
            }
            BodySource::Block(stmts) => *stmts,
            BodySource::Forward { .. } | BodySource::Synthetic(_) => &[],
        };

        let mut b = BodyBuilder::for_host(scope, &mut *self.errors, synth, sig.is_static(), sig.ret.clone());
        b.cells = captured_names(stmts).into_iter().collect();
        b.declare_params(&plan.params, plan.pos)?;
        match &plan.body {
            BodySource::Forward { target, default } => {
                let call = b.forward(&plan.params, target, default, plan.pos)?;
                if target.ret == JvmType::Void {
                    b.cx.emit(Ins::Eval(call));
                    b.cx.emit(Ins::Return(None));
                } else {
                    b.cx.emit(Ins::Return(Some(call)));
                }
            }
            BodySource::Synthetic(kind) => {
                // parameters without a declared name still need their slots
                for ty in sig.params.iter().skip(plan.params.len()) {
                    b.temp(ty);
                }
                b.synthetic_body(kind, plan.pos)?;
            }
            _ => b.lower_body(stmts, plan.implicit_return)?,
        }
        Ok((Some(b.finish()), None))
    }

    fn lower_ctor(
        &mut self,
        scope: &ClassScope<'_>,
        synth: &mut Synthesized,
        plan: &ClassPlan<'_>,
        ctor: &MethodPlan<'_>,
        init_stmts: &[Stmt],
    ) -> Result<(Option<MethodBody>, Option<ElementVal>), CompileError> {
        let mut b = BodyBuilder::for_host(scope, &mut *self.errors, synth, false, JvmType::Void);
        b.in_ctor = true;
        b.cells = captured_names(init_stmts).into_iter().collect();
        b.declare_params(&ctor.params, ctor.pos)?;

        if let BodySource::Forward { target, default } = &ctor.body {
            // a shorter constructor delegates to the next longer one
            let call = b.forward(&ctor.params, target, default, ctor.pos)?;
            b.cx.emit(Ins::Eval(call));
            return Ok((Some(b.finish()), None));
        }

        let parent_args = if plan.def.kind == ClassKind::Fun { &[][..] } else { &plan.def.parent_args[..] };
        let super_call = b.super_ctor(parent_args, ctor.pos)?;
        b.cx.emit(super_call);
        let this = b.this_value(ctor.pos)?;
        for param in &ctor.params {
            let Some(field) = plan.fields.iter().find(|f| f.sig.name == param.name && !f.sig.is_static()) else {
                continue;
            };
            let local = b
                .cx
                .lookup(&param.name)
                .cloned()
                .ok_or_else(|| b.err(ctor.pos, format!("parameter {} is not bound", param.name)))?;
            let value = b.read_local(&local);
            b.cx.emit(Ins::PutField {
                field: field.sig.field_ref(),
                target: this.clone(),
                value,
            });
        }
        b.init_steps(&plan.init, &plan.fields)?;
        Ok((Some(b.finish()), None))
    }

    fn lower_static_init(
        &mut self,
        scope: &ClassScope<'_>,
        synth: &mut Synthesized,
        plan: &ClassPlan<'_>,
    ) -> Result<MethodBody, CompileError> {
        let mut b = BodyBuilder::for_host(scope, &mut *self.errors, synth, true, JvmType::Void);
        b.in_static_init = true;
        b.cells = captured_names(&steps_stmts(&plan.static_init)).into_iter().collect();
        if plan.def.kind == ClassKind::Object {
            let ty = JvmType::reference(plan.name.as_str());
            b.cx.emit(Ins::PutStatic {
                field: FieldRef::new(&plan.name, SINGLETON, ty),
                value: Value::new_object(&plan.name, Vec::new(), Vec::new()),
            });
        }
        b.init_steps(&plan.static_init, &plan.fields)?;
        Ok(b.finish())
    }
}

/// The statements among initializer steps, for capture analysis.
fn steps_stmts(steps: &[InitStep<'_>]) -> Vec<Stmt> {
    steps
        .iter()
        .filter_map(|s| match s {
            InitStep::Stmt(stmt) => Some((*stmt).clone()),
            InitStep::Field(_) => None,
        })
        .collect()
}

impl BodyBuilder<'_, '_> {
    /// Call `target` with the parameters in scope plus the default value of
    /// the next one.
    fn forward(
        &mut self,
        params: &[super::members::ParamInfo<'_>],
        target: &super::types::MethodSig,
        default: &crate::compile::ast::Expr,
        pos: Pos,
    ) -> Result<Value, CompileError> {
        let mut args = Vec::with_capacity(target.params.len());
        for param in params {
            let local = self
                .cx
                .lookup(&param.name)
                .cloned()
                .ok_or_else(|| self.err(pos, format!("parameter {} is not bound", param.name)))?;
            let value = self.read_local(&local);
            args.push(self.coerce(value, &param.ty, pos)?);
        }
        let last = target
            .params
            .last()
            .cloned()
            .ok_or_else(|| self.err(pos, "forwarding target takes no parameters"))?;
        let value = self.expr(default, Some(&last))?;
        args.push(self.coerce(value, &last, default.pos)?);

        if target.is_static() {
            return Ok(Value::invoke_static(target.method_ref(), args));
        }
        let this = self.this_value(pos)?;
        let kind = if target.name == "<init>" {
            InvokeKind::Special
        } else {
            self.registry().invoke_kind(target)
        };
        Ok(Value::invoke(kind, target.method_ref(), Some(this), args))
    }

    /// Field initializers and loose statements, in source order. A failing
    /// step is reported and the rest still run.
    fn init_steps(&mut self, steps: &[InitStep<'_>], fields: &[FieldPlan<'_>]) -> Result<(), CompileError> {
        for step in steps {
            let result = match step {
                InitStep::Stmt(stmt) => self.stmt(stmt),
                InitStep::Field(index) => self.init_field(&fields[*index]),
            };
            if let Err(err) = result {
                self.errors.report(err)?;
            }
        }
        Ok(())
    }

    fn init_field(&mut self, field: &FieldPlan<'_>) -> Result<(), CompileError> {
        let sig = &field.sig;
        let Some(init) = field.init else {
            return Ok(());
        };
        let value = self.expr(init, Some(&sig.ty))?;
        let value = self.coerce(value, &sig.ty, init.pos)?;
        if sig.is_static() {
            self.cx.emit(Ins::PutStatic {
                field: sig.field_ref(),
                value,
            });
            let current = Value::get_static(sig.field_ref());
            for guard in &sig.guards {
                let checks = self.guard(*guard, current.clone(), &sig.name);
                self.cx.ins.extend(checks);
            }
        } else {
            let this = self.this_value(field.pos)?;
            self.cx.emit(Ins::PutField {
                field: sig.field_ref(),
                target: this.clone(),
                value,
            });
            let current = Value::get_field(sig.field_ref(), this);
            for guard in &sig.guards {
                let checks = self.guard(*guard, current.clone(), &sig.name);
                self.cx.ins.extend(checks);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::compile::semantic::tests::analyze;
    use crate::compile::semantic::{Ins, InvokeKind, ValueKind};
    use crate::method_info::MethodAccessFlags;

    #[test]
    fn constructors_call_the_parent_then_store_parameters() {
        let out = analyze("class P(a:int)\nclass C(b:int):P(b + 1)\n    c = b * 2\n").unwrap();
        let c = out.iter().find(|c| c.name == "C").unwrap();
        let ins = &c.method("<init>").unwrap().body.as_ref().unwrap().ins;
        let Ins::Eval(call) = &ins[0] else {
            panic!("expected the parent call first: {:?}", ins[0]);
        };
        let ValueKind::Invoke { kind, method, .. } = &call.kind else {
            panic!("{:?}", call);
        };
        assert_eq!(*kind, InvokeKind::Special);
        assert_eq!((method.owner.as_str(), method.descriptor().as_str()), ("P", "(I)V"));
        let stored: Vec<&str> = ins
            .iter()
            .filter_map(|i| match i {
                Ins::PutField { field, .. } => Some(field.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(stored, vec!["b", "c"]);
    }

    #[test]
    fn shorter_constructors_delegate() {
        let out = analyze("class C(a:int, b:int = 7)\n").unwrap();
        let short = out[0]
            .methods
            .iter()
            .find(|m| m.name == "<init>" && m.params.len() == 1)
            .unwrap();
        let text = format!("{:?}", short.body.as_ref().unwrap().ins);
        assert!(text.contains("Int(7)"));
        assert!(!text.contains("java/lang/Object\", name: \"<init>\""));
    }

    #[test]
    fn objects_initialize_their_singleton_first() {
        let out = analyze("object O\n    static\n        n = 3\n").unwrap();
        let clinit = out[0].method("<clinit>").unwrap();
        assert!(clinit.access.contains(MethodAccessFlags::STATIC));
        let ins = &clinit.body.as_ref().unwrap().ins;
        assert!(matches!(&ins[0], Ins::PutStatic { field, .. } if field.name == "singletonInstance"));
        assert!(matches!(&ins[1], Ins::PutStatic { field, .. } if field.name == "n"));
    }

    #[test]
    fn lambda_classes_follow_their_host() {
        let out = analyze("class A\n    m():Object = (x) -> x\n").unwrap();
        let names: Vec<&str> = out.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "A$Mocha$Lambda$1"]);
    }
}
