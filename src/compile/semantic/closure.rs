//! Closures: lambda classes and inner methods lifted onto the host.
//!
//! Captured locals live in `Pointer` cells so a closure and its enclosing
//! body observe each other's writes. A lambda class stores the cells in
//! fields and copies them into locals on entry; an inner method receives
//! them as leading parameters.

use indexmap::IndexSet;
use tracing::debug;

use crate::compile::ast::{Case, Expr, ExprKind, MethodDef, Modifier, Param, Pattern, Stmt};
use crate::compile::{CompileError, Pos};
use crate::descriptor::{JvmType, OBJECT};
use crate::field_info::FieldAccessFlags;
use crate::method_info::MethodAccessFlags;
use crate::types::ClassAccessFlags;

use super::body::{BodyBuilder, InnerFn, Local, MethodCx, POINTER};
use super::ir::*;
use super::members::{Guard, ParamInfo};
use crate::classpath::{function_type, MAX_FUNCTION_ARITY};

const OUTER: &str = "this$0";

/// Names a piece of syntax mentions, in first-use order.
#[derive(Default)]
struct Walker {
    names: IndexSet<String>,
    calls: IndexSet<String>,
    /// An explicit `this` appears somewhere in the syntax.
    this: bool,
}

impl Walker {
    fn stmts(&mut self, stmts: &[Stmt]) {
        stmts.iter().for_each(|s| self.stmt(s));
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Class(_) | Stmt::Break(_) | Stmt::Continue(_) | Stmt::Pass(_) => {}
            Stmt::Method(m) => self.method(m),
            Stmt::Var(v) => {
                if let Some(init) = &v.init {
                    self.expr(init);
                }
            }
            Stmt::Expr(e) | Stmt::Throw(e, _) => self.expr(e),
            Stmt::Return(value, _) => {
                if let Some(e) = value {
                    self.expr(e);
                }
            }
            Stmt::If { branches, otherwise, .. } => {
                for (cond, body) in branches {
                    self.expr(cond);
                    self.stmts(body);
                }
                if let Some(body) = otherwise {
                    self.stmts(body);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.expr(cond);
                self.stmts(body);
            }
            Stmt::For { iter, body, .. } => {
                self.expr(iter);
                self.stmts(body);
            }
            Stmt::Try { body, catches, finally, .. } => {
                self.stmts(body);
                for c in catches {
                    self.stmts(&c.body);
                }
                if let Some(body) = finally {
                    self.stmts(body);
                }
            }
            Stmt::Synchronized { locks, body, .. } => {
                locks.iter().for_each(|l| self.expr(l));
                self.stmts(body);
            }
            Stmt::Static(body, _) => self.stmts(body),
            Stmt::Destructure { pattern, value, .. } => {
                self.pattern(pattern);
                self.expr(value);
            }
        }
    }

    fn method(&mut self, m: &MethodDef) {
        self.params(&m.params);
        if let Some(body) = &m.body {
            self.stmts(body);
        }
    }

    fn params(&mut self, params: &[Param]) {
        for p in params {
            if let Some(d) = &p.default {
                self.expr(d);
            }
        }
    }

    fn pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Value(e) => self.expr(e),
            Pattern::Destruct { subs, .. } => subs.iter().for_each(|s| self.pattern(s)),
            _ => {}
        }
    }

    fn cases(&mut self, cases: &[Case]) {
        for case in cases {
            self.pattern(&case.pattern);
            if let Some(g) = &case.guard {
                self.expr(g);
            }
            self.stmts(&case.body);
        }
    }

    fn expr(&mut self, e: &Expr) {
        match &e.kind {
            ExprKind::Name(name) => {
                if !name.contains("::") {
                    self.names.insert(name.clone());
                }
            }
            ExprKind::Access { target, .. } => self.expr(target),
            ExprKind::Call { target, name, args } => {
                match target {
                    Some(t) => self.expr(t),
                    None => {
                        self.calls.insert(name.clone());
                        self.names.insert(name.clone());
                    }
                }
                args.iter().for_each(|a| self.expr(a));
            }
            ExprKind::Apply { callee, args } => {
                self.expr(callee);
                args.iter().for_each(|a| self.expr(a));
            }
            ExprKind::New { args, .. } => args.iter().for_each(|a| self.expr(a)),
            ExprKind::NewArray { len, .. } => self.expr(len),
            ExprKind::Index { target, index } => {
                self.expr(target);
                self.expr(index);
            }
            ExprKind::List(items) => items.iter().for_each(|i| self.expr(i)),
            ExprKind::Map(pairs) => {
                for (k, v) in pairs {
                    self.expr(k);
                    self.expr(v);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } | ExprKind::Custom { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            ExprKind::Unary { expr, .. } | ExprKind::As { expr, .. } | ExprKind::Is { expr, .. } => self.expr(expr),
            ExprKind::Assign { target, value, .. } => {
                self.expr(target);
                self.expr(value);
            }
            ExprKind::IncDec { target, .. } => self.expr(target),
            ExprKind::Lambda { params, body, .. } => {
                self.params(params);
                self.stmts(body);
            }
            ExprKind::Match { value, cases } => {
                self.expr(value);
                self.cases(cases);
            }
            ExprKind::Destructure { pattern, value } => {
                self.pattern(pattern);
                self.expr(value);
            }
            ExprKind::Int(_)
            | ExprKind::Long(_)
            | ExprKind::Float(_)
            | ExprKind::Double(_)
            | ExprKind::Str(_)
            | ExprKind::Bool(_)
            | ExprKind::Null
            | ExprKind::TypeOf(_)
            | ExprKind::Annotation(_) => {}
            ExprKind::This => self.this = true,
        }
    }
}

/// Visits a body until it reaches a closure, which is then walked
/// completely.
#[derive(Default)]
struct Probe {
    inside: Walker,
}

impl Probe {
    fn stmt(&mut self, stmt: &Stmt) {
        let mut exprs: Vec<&Expr> = Vec::new();
        let mut nested: Vec<&[Stmt]> = Vec::new();
        match stmt {
            Stmt::Method(m) => {
                self.inside.method(m);
                return;
            }
            Stmt::Class(_) | Stmt::Break(_) | Stmt::Continue(_) | Stmt::Pass(_) => {}
            Stmt::Var(v) => exprs.extend(v.init.as_ref()),
            Stmt::Expr(e) | Stmt::Throw(e, _) => exprs.push(e),
            Stmt::Return(value, _) => exprs.extend(value.as_ref()),
            Stmt::If { branches, otherwise, .. } => {
                for (cond, body) in branches {
                    exprs.push(cond);
                    nested.push(body);
                }
                nested.extend(otherwise.as_deref());
            }
            Stmt::While { cond, body, .. } => {
                exprs.push(cond);
                nested.push(body);
            }
            Stmt::For { iter, body, .. } => {
                exprs.push(iter);
                nested.push(body);
            }
            Stmt::Try { body, catches, finally, .. } => {
                nested.push(body);
                nested.extend(catches.iter().map(|c| c.body.as_slice()));
                nested.extend(finally.as_deref());
            }
            Stmt::Synchronized { locks, body, .. } => {
                exprs.extend(locks.iter());
                nested.push(body);
            }
            Stmt::Static(body, _) => nested.push(body),
            Stmt::Destructure { value, .. } => exprs.push(value),
        }
        for e in exprs {
            self.expr(e);
        }
        for body in nested {
            body.iter().for_each(|s| self.stmt(s));
        }
    }

    fn expr(&mut self, e: &Expr) {
        match &e.kind {
            ExprKind::Lambda { params, body, .. } => {
                self.inside.params(params);
                self.inside.stmts(body);
            }
            ExprKind::Access { target, .. } => self.expr(target),
            ExprKind::Call { target, args, .. } => {
                if let Some(t) = target {
                    self.expr(t);
                }
                args.iter().for_each(|a| self.expr(a));
            }
            ExprKind::Apply { callee, args } => {
                self.expr(callee);
                args.iter().for_each(|a| self.expr(a));
            }
            ExprKind::New { args, .. } => args.iter().for_each(|a| self.expr(a)),
            ExprKind::NewArray { len, .. } => self.expr(len),
            ExprKind::Index { target, index } => {
                self.expr(target);
                self.expr(index);
            }
            ExprKind::List(items) => items.iter().for_each(|i| self.expr(i)),
            ExprKind::Map(pairs) => {
                for (k, v) in pairs {
                    self.expr(k);
                    self.expr(v);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } | ExprKind::Custom { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            ExprKind::Unary { expr, .. } | ExprKind::As { expr, .. } | ExprKind::Is { expr, .. } => self.expr(expr),
            ExprKind::Assign { target, value, .. } => {
                self.expr(target);
                self.expr(value);
            }
            ExprKind::IncDec { target, .. } => self.expr(target),
            ExprKind::Match { value, cases } => {
                self.expr(value);
                for case in cases {
                    if let Pattern::Value(v) = &case.pattern {
                        self.expr(v);
                    }
                    if let Some(g) = &case.guard {
                        self.expr(g);
                    }
                    case.body.iter().for_each(|s| self.stmt(s));
                }
            }
            ExprKind::Destructure { value, .. } => self.expr(value),
            _ => {}
        }
    }
}

/// Names mentioned inside any closure nested in `stmts`; locals with these
/// names are declared as cells.
pub(crate) fn captured_names(stmts: &[Stmt]) -> IndexSet<String> {
    let mut probe = Probe::default();
    stmts.iter().for_each(|s| probe.stmt(s));
    let Walker { mut names, calls, .. } = probe.inside;
    names.extend(calls);
    names
}

/// Names a closure body mentions, not counting its own parameters.
fn free_names(params: &[String], body: &[Stmt], defaults: &[Param]) -> Walker {
    let mut walker = Walker::default();
    walker.params(defaults);
    walker.stmts(body);
    walker.names.retain(|n| !params.contains(n));
    walker
}

fn lambda_params(params: &[Param], implicit: bool, arity: usize) -> Vec<Param> {
    if implicit && params.is_empty() && arity == 1 {
        return vec![Param::plain("it", Pos::default())];
    }
    params.to_vec()
}

impl BodyBuilder<'_, '_> {
    /// Outer locals a closure must capture, including those needed by inner
    /// functions it calls.
    fn captures_of(&self, walker: &Walker) -> Vec<(String, Local)> {
        let mut out: Vec<(String, Local)> = Vec::new();
        let push = |name: &str, out: &mut Vec<(String, Local)>| {
            if out.iter().any(|(n, _)| n == name) {
                return;
            }
            if let Some(local) = self.cx.lookup(name) {
                out.push((name.to_string(), local.clone()));
            }
        };
        for name in &walker.names {
            push(name, &mut out);
        }
        for call in &walker.calls {
            if let Some(inner) = self.cx.lookup_inner(call) {
                for name in &inner.captures {
                    push(name, &mut out);
                }
            }
        }
        out
    }

    /// Whether a closure body reaches the host instance: `this`, `super`,
    /// an instance field or a method of the host that is not a captured
    /// local.
    fn touches_host(&self, walker: &Walker, captures: &[(String, Local)]) -> bool {
        if walker.this {
            return true;
        }
        let captured = |name: &str| captures.iter().any(|(n, _)| n == name);
        let field = walker.names.iter().any(|name| {
            name == "super"
                || (!captured(name)
                    && self
                        .registry()
                        .find_field(self.host(), name)
                        .map_or(false, |f| !f.is_static()))
        });
        field
            || walker.calls.iter().any(|call| {
                if captured(call) {
                    return false;
                }
                match self.cx.lookup_inner(call) {
                    Some(inner) => !inner.is_static,
                    None => !self.registry().find_methods(self.host(), call).is_empty(),
                }
            })
    }

    /// A `Pointer` holding the local: its own cell, or a fresh one holding
    /// a copy of the current value.
    fn pointer_for(&mut self, name: &str, local: &Local) -> Value {
        if let Some(cell) = self.cell_of(name) {
            return cell;
        }
        let pointer_ty = JvmType::reference(POINTER);
        let slot = self.temp(&pointer_ty);
        let current = self.read_local(local);
        let ins = vec![
            Ins::Store {
                slot,
                value: Value::new_object(POINTER, vec![], vec![]),
            },
            Ins::Eval(Value::invoke(
                InvokeKind::Virtual,
                MethodRef::new(POINTER, "set", vec![JvmType::object()], JvmType::Void),
                Some(Value::local(slot, pointer_ty.clone())),
                vec![super::convert::to_object(current)],
            )),
        ];
        Value::pack(ins, Value::local(slot, pointer_ty))
    }

    fn param_infos<'p>(&self, params: &'p [Param], types: &[JvmType]) -> Result<Vec<ParamInfo<'p>>, CompileError> {
        let mut out = Vec::with_capacity(params.len());
        for (p, ty) in params.iter().zip(types) {
            let local_ty = match &p.ty {
                Some(t) => self.imports().resolve_type(self.registry(), t)?,
                None => ty.clone(),
            };
            if local_ty == JvmType::Void {
                return Err(self.err(p.pos, format!("parameter {} cannot be Unit", p.name)));
            }
            out.push(ParamInfo {
                name: p.name.clone(),
                ty: ty.clone(),
                local_ty,
                mutable: !p.modifiers.contains(&Modifier::Val),
                guards: Guard::of(&p.modifiers),
                annotations: &p.annotations,
            });
        }
        Ok(out)
    }

    /// A lambda literal: a fresh class implementing the expected functional
    /// interface, or `FunctionN` when none is expected.
    pub fn lambda(
        &mut self,
        params: &[Param],
        body: &[Stmt],
        implicit: bool,
        expected: Option<&JvmType>,
        pos: Pos,
    ) -> Result<Value, CompileError> {
        let sam = match expected {
            Some(JvmType::Reference(name)) if name != OBJECT => self.registry().single_abstract_method(name),
            _ => None,
        };
        let (iface, method, sam_params, ret) = match &sam {
            Some(sam) => (sam.owner.clone(), sam.name.clone(), sam.params.clone(), sam.ret.clone()),
            None => {
                let arity = if implicit && params.is_empty() { 1 } else { params.len() };
                if arity > MAX_FUNCTION_ARITY {
                    return Err(self.err(pos, format!("lambdas take at most {} parameters", MAX_FUNCTION_ARITY)));
                }
                (function_type(arity), "apply".to_string(), vec![JvmType::object(); arity], JvmType::object())
            }
        };
        let params = lambda_params(params, implicit, sam_params.len());
        if params.len() != sam_params.len() {
            return Err(self.err(
                pos,
                format!("lambda takes {} parameters but {} expects {}", params.len(), iface.replace('/', "::"), sam_params.len()),
            ));
        }
        let infos = self.param_infos(&params, &sam_params)?;

        let param_names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
        let walker = free_names(&param_names, body, &params);
        let captures = self.captures_of(&walker);
        let outer = self.host_this.clone().filter(|_| self.touches_host(&walker, &captures));
        let inners = self.cx.visible_inners();

        let name = self.synth.next_lambda(self.host());
        let lambda_ty = JvmType::reference(name.as_str());
        let host_ty = JvmType::reference(self.host());
        debug!(lambda = %name, implements = %iface, captures = captures.len(), outer = outer.is_some(), "lambda");

        let mut fields = Vec::new();
        let mut ctor_params = Vec::new();
        let mut ctor_args = Vec::new();
        if let Some(outer) = outer.clone() {
            fields.push(FieldOutput {
                name: OUTER.to_string(),
                ty: host_ty.clone(),
                access: FieldAccessFlags::FINAL | FieldAccessFlags::SYNTHETIC,
                annotations: Vec::new(),
            });
            ctor_params.push(host_ty.clone());
            ctor_args.push(outer);
        }
        for (captured, local) in &captures {
            fields.push(FieldOutput {
                name: captured.clone(),
                ty: JvmType::reference(POINTER),
                access: FieldAccessFlags::FINAL | FieldAccessFlags::SYNTHETIC,
                annotations: Vec::new(),
            });
            ctor_params.push(JvmType::reference(POINTER));
            let pointer = self.pointer_for(captured, local);
            ctor_args.push(pointer);
        }

        let ctor = MethodOutput {
            name: "<init>".to_string(),
            params: ctor_params.clone(),
            ret: JvmType::Void,
            access: MethodAccessFlags::PUBLIC,
            body: Some(field_ctor(&name, &fields)),
            annotations: Vec::new(),
            param_annotations: Vec::new(),
            annotation_default: None,
        };

        let outer_this = outer
            .is_some()
            .then(|| Value::get_field(FieldRef::new(&name, OUTER, host_ty.clone()), Value::local(0, lambda_ty.clone())));
        let mut inner = BodyBuilder {
            scope: self.scope,
            errors: &mut *self.errors,
            synth: &mut *self.synth,
            class: name.clone(),
            is_static: false,
            host_this: outer_this,
            in_ctor: false,
            in_static_init: false,
            ret: ret.clone(),
            cells: captured_names(body).into_iter().collect(),
            cx: MethodCx::new(1),
        };
        for (n, f) in inners {
            inner.cx.bind_inner(&n, f);
        }
        inner.declare_params(&infos, pos)?;
        for (captured, local) in &captures {
            let slot = inner.temp(&JvmType::reference(POINTER));
            let cell = Value::get_field(
                FieldRef::new(&name, captured, JvmType::reference(POINTER)),
                Value::local(0, lambda_ty.clone()),
            );
            inner.cx.emit(Ins::Store { slot, value: cell });
            inner.cx.bind_local(
                captured,
                Local {
                    slot,
                    ty: local.ty.clone(),
                    mutable: local.mutable,
                    cell: true,
                    guards: local.guards.clone(),
                },
            );
        }
        inner.lower_body(body, true)?;
        let sam_body = inner.finish();

        let sam_method = MethodOutput {
            name: method,
            params: sam_params,
            ret,
            access: MethodAccessFlags::PUBLIC,
            body: Some(sam_body),
            annotations: Vec::new(),
            param_annotations: Vec::new(),
            annotation_default: None,
        };
        self.synth.classes.push(ClassOutput {
            name: name.clone(),
            access: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER | ClassAccessFlags::FINAL | ClassAccessFlags::SYNTHETIC,
            super_name: Some(OBJECT.to_string()),
            interfaces: vec![iface.clone()],
            fields,
            methods: vec![ctor, sam_method],
            annotations: Vec::new(),
            source_file: Some(self.scope.source_file.clone()),
        });

        Ok(Value::new(
            JvmType::reference(iface),
            ValueKind::New {
                class: name,
                ctor: ctor_params,
                args: ctor_args,
            },
        ))
    }

    /// A method defined inside a body becomes a synthetic host method;
    /// captured cells are passed ahead of the declared parameters.
    pub fn inner_method(&mut self, m: &MethodDef) -> Result<(), CompileError> {
        let Some(body) = &m.body else {
            return Err(self.err(m.pos, format!("inner function {} needs a body", m.name)));
        };
        if let Some(p) = m.params.iter().find(|p| p.default.is_some()) {
            return Err(self.err(p.pos, "inner functions cannot declare default parameters"));
        }
        let mut declared = Vec::with_capacity(m.params.len());
        for p in &m.params {
            declared.push(match &p.ty {
                Some(t) => self.imports().resolve_type(self.registry(), t)?,
                None => JvmType::object(),
            });
        }
        let ret = match &m.ret {
            Some(t) => self.imports().resolve_type(self.registry(), t)?,
            None => JvmType::object(),
        };

        let param_names: Vec<String> = m.params.iter().map(|p| p.name.clone()).collect();
        let walker = free_names(&param_names, body, &[]);
        let captures: Vec<(String, Local)> = self
            .captures_of(&walker)
            .into_iter()
            .filter(|(n, _)| *n != m.name)
            .collect();

        let is_static = self.host_this.is_none();
        let lifted = self.synth.next_inner(&m.name);
        let mut params: Vec<JvmType> = vec![JvmType::reference(POINTER); captures.len()];
        params.extend(declared.iter().cloned());
        let method_ref = MethodRef::new(self.host(), &lifted, params.clone(), ret.clone());
        self.cx.bind_inner(
            &m.name,
            InnerFn {
                method: method_ref,
                captures: captures.iter().map(|(n, _)| n.clone()).collect(),
                is_static,
            },
        );
        debug!(inner = %lifted, captures = captures.len(), "inner method");

        let infos = self.param_infos(&m.params, &declared)?;
        let inners = self.cx.visible_inners();
        let host_ty = JvmType::reference(self.host());
        let mut inner = BodyBuilder {
            scope: self.scope,
            errors: &mut *self.errors,
            synth: &mut *self.synth,
            class: self.scope.host.clone(),
            is_static,
            host_this: (!is_static).then(|| Value::local(0, host_ty)),
            in_ctor: false,
            in_static_init: false,
            ret: ret.clone(),
            cells: captured_names(body).into_iter().collect(),
            cx: MethodCx::new(u16::from(!is_static)),
        };
        for (n, f) in inners {
            inner.cx.bind_inner(&n, f);
        }
        for (captured, local) in &captures {
            let slot = inner.temp(&JvmType::reference(POINTER));
            inner.cx.bind_local(
                captured,
                Local {
                    slot,
                    ty: local.ty.clone(),
                    mutable: local.mutable,
                    cell: true,
                    guards: local.guards.clone(),
                },
            );
        }
        inner.declare_params(&infos, m.pos)?;
        inner.lower_body(body, false)?;
        let lowered = inner.finish();

        let mut access = MethodAccessFlags::PUBLIC | MethodAccessFlags::SYNTHETIC;
        if is_static {
            access |= MethodAccessFlags::STATIC;
        }
        self.synth.methods.push(MethodOutput {
            name: lifted,
            params,
            ret,
            access,
            body: Some(lowered),
            annotations: Vec::new(),
            param_annotations: Vec::new(),
            annotation_default: None,
        });
        Ok(())
    }
}

/// `super()` then one `putfield` per constructor parameter.
fn field_ctor(class: &str, fields: &[FieldOutput]) -> MethodBody {
    let this = Value::local(0, JvmType::reference(class));
    let mut ins = vec![Ins::Eval(Value::invoke(
        InvokeKind::Special,
        MethodRef::new(OBJECT, "<init>", vec![], JvmType::Void),
        Some(this.clone()),
        vec![],
    ))];
    let mut slot = 1;
    for field in fields {
        ins.push(Ins::PutField {
            field: FieldRef::new(class, &field.name, field.ty.clone()),
            target: this.clone(),
            value: Value::local(slot, field.ty.clone()),
        });
        slot += field.ty.slot_size();
    }
    ins.push(Ins::Return(None));
    MethodBody {
        ins,
        exceptions: Vec::new(),
        max_locals: slot,
        labels: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::semantic::tests::analyze;

    #[test]
    fn only_names_inside_closures_become_cells() {
        let src = "class A\n    m():Unit\n        a = 1\n        b = 2\n        f = (x) -> x + a\n";
        let unit = crate::compile::semantic::tests::parse_one(src);
        let crate::compile::ast::Stmt::Class(class) = &unit.items[0] else {
            panic!("expected a class");
        };
        let crate::compile::ast::Stmt::Method(m) = &class.body[0] else {
            panic!("expected a method");
        };
        let cells = captured_names(m.body.as_deref().unwrap());
        assert!(cells.contains("a"));
        assert!(cells.contains("x"));
        assert!(!cells.contains("b"));
    }

    #[test]
    fn lambda_becomes_a_function_class() {
        let out = analyze("class A\n    m():Object\n        n = 41\n        f = (x) -> x + n\n        return f\n").unwrap();
        let lambda = out.iter().find(|c| c.name == "A$Mocha$Lambda$1").unwrap();
        assert_eq!(lambda.interfaces, vec!["mocha/lang/function/Function1".to_string()]);
        assert!(lambda.field("this$0").is_none());
        assert_eq!(lambda.field("n").unwrap().ty, JvmType::reference(POINTER));
        let apply = lambda.method("apply").unwrap();
        assert_eq!(apply.descriptor(), "(Ljava/lang/Object;)Ljava/lang/Object;");
    }

    #[test]
    fn lambda_fields_are_exactly_its_captures() {
        let src = "class A\n    m():Object\n        a = 1\n        b = 2\n        c = 3\n        f = (x) -> x + a + b\n        return f\n";
        let out = analyze(src).unwrap();
        let lambda = out.iter().find(|c| c.name == "A$Mocha$Lambda$1").unwrap();
        let fields: Vec<&str> = lambda.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["a", "b"]);
        assert_eq!(
            lambda.method("<init>").unwrap().descriptor(),
            "(Lmocha/lang/Pointer;Lmocha/lang/Pointer;)V"
        );
    }

    #[test]
    fn outer_instance_is_kept_only_when_used() {
        let src = concat!(
            "class A\n",
            "    count:int = 0\n",
            "    bump():int = count + 1\n",
            "    viaField():Object = (x) -> x + count\n",
            "    viaMethod():Object = (x) -> x + bump()\n",
            "    viaThis():Object = (x) -> this\n",
        );
        let out = analyze(src).unwrap();
        for n in 1..=3 {
            let lambda = out.iter().find(|c| c.name == format!("A$Mocha$Lambda${}", n)).unwrap();
            let fields: Vec<&str> = lambda.fields.iter().map(|f| f.name.as_str()).collect();
            assert_eq!(fields, vec!["this$0"], "lambda {}", n);
            assert_eq!(lambda.method("<init>").unwrap().descriptor(), "(LA;)V");
        }
    }

    #[test]
    fn static_lambdas_have_no_outer_instance() {
        let src = "class A\n    static m():Object\n        a = 1\n        b = 2\n        c = 3\n        return (x) -> x + a + c\n";
        let out = analyze(src).unwrap();
        let lambda = out.iter().find(|c| c.name == "A$Mocha$Lambda$1").unwrap();
        let fields: Vec<&str> = lambda.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["a", "c"]);
    }

    #[test]
    fn private_members_used_by_lambdas_are_widened() {
        let src = concat!(
            "class A\n",
            "    private count:int = 0\n",
            "    private hidden:int = 0\n",
            "    private secret():String = \"s\"\n",
            "    private other():String = \"o\"\n",
            "    m():Object = (x) -> secret() + count\n",
            "    n():String = other() + hidden\n",
        );
        let out = analyze(src).unwrap();
        let a = &out[0];
        assert!(!a.method("secret").unwrap().access.contains(MethodAccessFlags::PRIVATE));
        assert!(!a.field("count").unwrap().access.contains(FieldAccessFlags::PRIVATE));
        assert!(a.method("other").unwrap().access.contains(MethodAccessFlags::PRIVATE));
        assert!(a.field("hidden").unwrap().access.contains(FieldAccessFlags::PRIVATE));
    }

    #[test]
    fn private_members_of_other_classes_are_rejected() {
        let src = "class B\n    private secret():int = 1\nclass A\n    m(b:B):int = b.secret()\n";
        let err = analyze(src).unwrap_err();
        assert!(err.message().contains("is private in B"), "{}", err.message());
    }

    #[test]
    fn expected_interface_decides_the_method() {
        let src = "class A\n    run(r:Runnable):Unit\n        r.run()\n    m():Unit\n        run({ System.out.println(\"hi\") })\n";
        let out = analyze(src).unwrap();
        let lambda = out.iter().find(|c| c.name == "A$Mocha$Lambda$1").unwrap();
        assert_eq!(lambda.interfaces, vec!["java/lang/Runnable".to_string()]);
        assert_eq!(lambda.method("run").unwrap().descriptor(), "()V");
    }

    #[test]
    fn inner_methods_take_cells_first() {
        let src = "class A\n    m():int\n        total = 0\n        def add(k:int):Unit\n            total += k\n        add(2)\n        return total\n";
        let out = analyze(src).unwrap();
        let a = &out[0];
        let lifted = a.methods.iter().find(|m| m.name.starts_with("add$Mocha$Inner$")).unwrap();
        assert_eq!(lifted.params[0], JvmType::reference(POINTER));
        assert_eq!(lifted.params[1], JvmType::Int);
    }
}
