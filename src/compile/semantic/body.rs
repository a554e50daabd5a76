//! Per-method lowering state shared by the statement, expression, and call
//! lowering passes.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::compile::ast::{ExprKind, Stmt};
use crate::compile::{CompileError, ErrorManager, Pos};
use crate::descriptor::{JvmType, OBJECT};
use crate::field_info::FieldAccessFlags;
use crate::method_info::MethodAccessFlags;

use super::convert::{self, box_type, to_object};
use super::imports::ImportContext;
use super::ir::*;
use super::members::{Guard, ParamInfo};
use super::types::{FieldSig, MethodSig, TypeRegistry};

pub(crate) const POINTER: &str = "mocha/lang/Pointer";
pub(crate) const THROWABLE: &str = "java/lang/Throwable";
const GUARD_ERROR: &str = "mocha/lang/GuardViolationError";

/// What every body of one source class sees.
pub(crate) struct ClassScope<'a> {
    pub registry: &'a TypeRegistry,
    pub imports: &'a ImportContext,
    /// Internal name of the source class.
    pub host: String,
    pub source_file: String,
}

/// Classes and host methods created while lowering one source class.
#[derive(Default)]
pub(crate) struct Synthesized {
    pub classes: Vec<ClassOutput>,
    pub methods: Vec<MethodOutput>,
    /// Private host fields a lambda class reads or writes.
    pub widened_fields: HashSet<String>,
    /// Private host methods a lambda class calls, by name and descriptor.
    pub widened_methods: HashSet<(String, String)>,
    lambdas: usize,
    inners: usize,
}

impl Synthesized {
    pub fn next_lambda(&mut self, host: &str) -> String {
        self.lambdas += 1;
        format!("{}$Mocha$Lambda${}", host, self.lambdas)
    }

    pub fn next_inner(&mut self, name: &str) -> String {
        self.inners += 1;
        format!("{}$Mocha$Inner${}", name, self.inners)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Local {
    pub slot: u16,
    pub ty: JvmType,
    pub mutable: bool,
    /// The slot holds a `Pointer` shared with closures.
    pub cell: bool,
    /// Checked again after every assignment.
    pub guards: Vec<Guard>,
}

/// A method defined inside another body, lifted onto the host class.
#[derive(Clone, Debug)]
pub(crate) struct InnerFn {
    pub method: MethodRef,
    /// Captured locals passed as leading `Pointer` arguments.
    pub captures: Vec<String>,
    pub is_static: bool,
}

#[derive(Default)]
struct Scope {
    locals: HashMap<String, Local>,
    inners: HashMap<String, InnerFn>,
}

/// A range of instructions covered by a handler; closed and reopened around
/// jumps that leave it.
#[derive(Clone, Debug)]
pub(crate) struct Protect {
    pub open: Label,
    pub ranges: Vec<(Label, Label)>,
}

impl Protect {
    pub fn new(open: Label) -> Self {
        Protect { open, ranges: Vec::new() }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum Frame {
    Loop { brk: Label, cont: Label },
    Finally { body: Vec<Stmt>, protect: Protect },
    Monitor { slot: u16, protect: Protect },
}

impl Frame {
    fn protect_mut(&mut self) -> Option<&mut Protect> {
        match self {
            Frame::Loop { .. } => None,
            Frame::Finally { protect, .. } | Frame::Monitor { protect, .. } => Some(protect),
        }
    }
}

/// Instruction stream, locals, and labels of one method under construction.
pub(crate) struct MethodCx {
    scopes: Vec<Scope>,
    next_slot: u16,
    max_locals: u16,
    labels: usize,
    pub ins: Vec<Ins>,
    pub exceptions: Vec<ExceptionRange>,
    pub frames: Vec<Frame>,
}

impl MethodCx {
    /// `first_slot` is past `this` and the parameters.
    pub fn new(first_slot: u16) -> Self {
        MethodCx {
            scopes: vec![Scope::default()],
            next_slot: first_slot,
            max_locals: first_slot,
            labels: 0,
            ins: Vec::new(),
            exceptions: Vec::new(),
            frames: Vec::new(),
        }
    }

    pub fn label(&mut self) -> Label {
        self.labels += 1;
        Label(self.labels - 1)
    }

    pub fn bind(&mut self, label: Label) {
        self.ins.push(Ins::Label(label));
    }

    pub fn emit(&mut self, ins: Ins) {
        self.ins.push(ins);
    }

    /// A fresh slot; slots are never reused within a method.
    pub fn alloc(&mut self, ty: &JvmType) -> u16 {
        let slot = self.next_slot;
        self.next_slot += ty.slot_size().max(1);
        self.max_locals = self.max_locals.max(self.next_slot);
        slot
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Local> {
        self.scopes.iter().rev().find_map(|s| s.locals.get(name))
    }

    pub fn lookup_inner(&self, name: &str) -> Option<&InnerFn> {
        self.scopes.iter().rev().find_map(|s| s.inners.get(name))
    }

    pub fn declared_here(&self, name: &str) -> bool {
        self.scopes.last().map_or(false, |s| s.locals.contains_key(name))
    }

    pub fn bind_local(&mut self, name: &str, local: Local) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.locals.insert(name.to_string(), local);
        }
    }

    pub fn bind_inner(&mut self, name: &str, inner: InnerFn) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.inners.insert(name.to_string(), inner);
        }
    }

    /// Every inner method visible from here, innermost binding first.
    pub fn visible_inners(&self) -> Vec<(String, InnerFn)> {
        let mut out: Vec<(String, InnerFn)> = Vec::new();
        for scope in self.scopes.iter().rev() {
            for (name, inner) in &scope.inners {
                if !out.iter().any(|(n, _)| n == name) {
                    out.push((name.clone(), inner.clone()));
                }
            }
        }
        out
    }

    pub fn falls_through(&self) -> bool {
        self.ins.last().map_or(true, |i| !i.is_terminal())
    }

    /// End the current protected range of frame `index` here. Returns false
    /// for frames without a handler.
    pub fn close_range(&mut self, index: usize) -> bool {
        if self.frames[index].protect_mut().is_none() {
            return false;
        }
        let end = self.label();
        self.bind(end);
        if let Some(protect) = self.frames[index].protect_mut() {
            let open = protect.open;
            protect.ranges.push((open, end));
        }
        true
    }

    pub fn reopen(&mut self, closed: &[usize]) {
        for &index in closed {
            let start = self.label();
            self.bind(start);
            if let Some(protect) = self.frames[index].protect_mut() {
                protect.open = start;
            }
        }
    }

    pub fn into_body(self) -> MethodBody {
        MethodBody {
            ins: self.ins,
            exceptions: self.exceptions,
            max_locals: self.max_locals,
            labels: self.labels,
        }
    }
}

/// Lowers the statements of one method body into [`Ins`].
pub(crate) struct BodyBuilder<'a, 'e> {
    pub scope: &'a ClassScope<'a>,
    pub errors: &'e mut ErrorManager,
    pub synth: &'e mut Synthesized,
    /// Class the method is emitted into: the host or a lambda class.
    pub class: String,
    pub is_static: bool,
    /// How to reach the host instance: `this`, or `this.this$0` in a lambda.
    pub host_this: Option<Value>,
    pub in_ctor: bool,
    pub in_static_init: bool,
    pub ret: JvmType,
    /// Locals some closure in this body captures.
    pub cells: HashSet<String>,
    pub cx: MethodCx,
}

impl<'a, 'e> BodyBuilder<'a, 'e> {
    /// A builder for a method on the host class; slots for `this` and the
    /// parameters are reserved.
    pub fn for_host(
        scope: &'a ClassScope<'a>,
        errors: &'e mut ErrorManager,
        synth: &'e mut Synthesized,
        is_static: bool,
        ret: JvmType,
    ) -> Self {
        let host_this = (!is_static).then(|| Value::local(0, JvmType::reference(scope.host.as_str())));
        BodyBuilder {
            class: scope.host.clone(),
            scope,
            errors,
            synth,
            is_static,
            host_this,
            in_ctor: false,
            in_static_init: false,
            ret,
            cells: HashSet::new(),
            cx: MethodCx::new(u16::from(!is_static)),
        }
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.scope.registry
    }

    pub fn imports(&self) -> &'a ImportContext {
        self.scope.imports
    }

    pub fn host(&self) -> &'a str {
        self.scope.host.as_str()
    }

    pub fn err(&self, pos: Pos, message: impl Into<String>) -> CompileError {
        CompileError::resolution(&self.scope.imports.unit, pos, message)
    }

    pub fn coerce(&self, value: Value, to: &JvmType, pos: Pos) -> Result<Value, CompileError> {
        convert::coerce(self.registry(), value, to, false).map_err(|m| self.err(pos, m))
    }

    pub fn cast(&self, value: Value, to: &JvmType, pos: Pos) -> Result<Value, CompileError> {
        convert::coerce(self.registry(), value, to, true).map_err(|m| self.err(pos, m))
    }

    pub fn this_value(&self, pos: Pos) -> Result<Value, CompileError> {
        self.host_this
            .clone()
            .ok_or_else(|| self.err(pos, "`this` is not available in a static context"))
    }

    /// A field reference usable from the class being emitted. Private
    /// host fields used by a lambda class are emitted package-private.
    pub fn reach_field(&mut self, field: &FieldSig, pos: Pos) -> Result<FieldRef, CompileError> {
        if field.access.contains(FieldAccessFlags::PRIVATE) && field.owner != self.class {
            if field.owner != self.host() {
                return Err(self.err(
                    pos,
                    format!("field {} is private in {}", field.name, field.owner.replace('/', "::")),
                ));
            }
            self.synth.widened_fields.insert(field.name.clone());
        }
        Ok(field.field_ref())
    }

    /// A method reference usable from the class being emitted, widening
    /// private host methods the same way as fields.
    pub fn reach_method(&mut self, sig: &MethodSig, pos: Pos) -> Result<MethodRef, CompileError> {
        if sig.access.contains(MethodAccessFlags::PRIVATE) && sig.owner != self.class {
            if sig.owner != self.host() {
                return Err(self.err(pos, format!("{} is private in {}", sig.display(), sig.owner.replace('/', "::"))));
            }
            self.synth.widened_methods.insert((sig.name.clone(), sig.descriptor()));
        }
        Ok(sig.method_ref())
    }

    pub fn this_class(&self) -> Value {
        Value::class_literal(JvmType::reference(self.class.as_str()))
    }

    pub fn temp(&mut self, ty: &JvmType) -> u16 {
        self.cx.alloc(ty)
    }

    /// Lower statements in a nested scope.
    pub fn block(&mut self, stmts: &[Stmt]) -> Result<(), CompileError> {
        self.cx.push_scope();
        let result = self.stmts(stmts);
        self.cx.pop_scope();
        result
    }

    /// Lower statements in the current scope; in collect mode a failed
    /// statement is reported and lowering moves on to the next one.
    pub fn stmts(&mut self, stmts: &[Stmt]) -> Result<(), CompileError> {
        for stmt in stmts {
            if let Err(err) = self.stmt(stmt) {
                self.errors.report(err)?;
            }
        }
        Ok(())
    }

    /// The whole body; with `implicit_return` a trailing expression
    /// statement is the result.
    pub fn lower_body(&mut self, stmts: &[Stmt], implicit_return: bool) -> Result<(), CompileError> {
        let tail = match stmts.split_last() {
            Some((Stmt::Expr(e), rest))
                if implicit_return
                    && self.ret != JvmType::Void
                    && !matches!(e.kind, ExprKind::Assign { .. } | ExprKind::IncDec { .. }) =>
            {
                Some((e, rest))
            }
            _ => None,
        };
        let Some((last, rest)) = tail else {
            return self.stmts(stmts);
        };
        self.stmts(rest)?;
        let ret = self.ret.clone();
        let result = self.expr(last, Some(&ret)).and_then(|v| {
            if v.is_void() && ret.is_reference() {
                // a Unit tail of a function returning an object yields null
                self.cx.emit(Ins::Eval(v));
                return Ok(Value::new(ret.clone(), ValueKind::Const(Const::Null)));
            }
            self.coerce(v, &ret, last.pos)
        });
        match result {
            Ok(value) => self.cx.emit(Ins::Return(Some(value))),
            Err(err) => self.errors.report(err)?,
        }
        Ok(())
    }

    /// Bind parameters to their slots. Parameters captured by closures or
    /// typed narrower than the descriptor get a fresh local.
    pub fn declare_params(&mut self, params: &[ParamInfo<'_>], pos: Pos) -> Result<(), CompileError> {
        let slots: Vec<u16> = params.iter().map(|p| self.cx.alloc(&p.ty)).collect();
        for (p, slot) in params.iter().zip(slots) {
            let incoming = Value::local(slot, p.ty.clone());
            let local = if p.local_ty != p.ty || self.cells.contains(&p.name) {
                let value = self.cast(incoming, &p.local_ty, pos)?;
                let local = self.declare_guarded(&p.name, p.local_ty.clone(), p.mutable, p.guards.clone(), pos)?;
                let store = self.write_local(&local, value);
                self.cx.emit(store);
                local
            } else {
                let local = Local {
                    slot,
                    ty: p.ty.clone(),
                    mutable: p.mutable,
                    cell: false,
                    guards: p.guards.clone(),
                };
                self.cx.bind_local(&p.name, local.clone());
                local
            };
            let checks = self.guard_local(&local, &p.name);
            self.cx.ins.extend(checks);
        }
        Ok(())
    }

    /// Declare a local in the innermost scope. The slot is initialized right
    /// away so every later read is definitely assigned.
    pub fn declare(&mut self, name: &str, ty: JvmType, mutable: bool, pos: Pos) -> Result<Local, CompileError> {
        self.declare_guarded(name, ty, mutable, Vec::new(), pos)
    }

    pub fn declare_guarded(
        &mut self,
        name: &str,
        ty: JvmType,
        mutable: bool,
        guards: Vec<Guard>,
        pos: Pos,
    ) -> Result<Local, CompileError> {
        if self.cx.declared_here(name) {
            return Err(self.err(pos, format!("{} is already defined in this scope", name)));
        }
        let cell = self.cells.contains(name);
        let slot = if cell {
            let slot = self.cx.alloc(&JvmType::reference(POINTER));
            let pointer = Value::new_object(POINTER, vec![], vec![]);
            self.cx.emit(Ins::Store { slot, value: pointer });
            slot
        } else {
            let slot = self.cx.alloc(&ty);
            self.cx.emit(Ins::Store {
                slot,
                value: default_value(&ty),
            });
            slot
        };
        trace!(name, slot, cell, "local declared");
        let local = Local {
            slot,
            ty,
            mutable,
            cell,
            guards,
        };
        if cell && local.ty.is_primitive() {
            let init = self.write_local(&local, default_value(&local.ty));
            self.cx.emit(init);
        }
        self.cx.bind_local(name, local.clone());
        Ok(local)
    }

    pub fn read_local(&self, local: &Local) -> Value {
        if !local.cell {
            return Value::local(local.slot, local.ty.clone());
        }
        let pointer = Value::local(local.slot, JvmType::reference(POINTER));
        let raw = Value::invoke(
            InvokeKind::Virtual,
            MethodRef::new(POINTER, "get", vec![], JvmType::object()),
            Some(pointer),
            vec![],
        );
        from_object(raw, &local.ty)
    }

    /// Store into a local; `value` must already have the local's type.
    pub fn write_local(&self, local: &Local, value: Value) -> Ins {
        if !local.cell {
            return Ins::Store { slot: local.slot, value };
        }
        let pointer = Value::local(local.slot, JvmType::reference(POINTER));
        Ins::Eval(Value::invoke(
            InvokeKind::Virtual,
            MethodRef::new(POINTER, "set", vec![JvmType::object()], JvmType::Void),
            Some(pointer),
            vec![to_object(value)],
        ))
    }

    /// The `Pointer` itself of a captured local.
    pub fn cell_of(&self, name: &str) -> Option<Value> {
        self.cx
            .lookup(name)
            .filter(|l| l.cell)
            .map(|l| Value::local(l.slot, JvmType::reference(POINTER)))
    }

    /// Checks a guarded value, throwing `GuardViolationError` on failure.
    /// Re-run the guards of a local after a write.
    pub fn guard_local(&mut self, local: &Local, name: &str) -> Vec<Ins> {
        let mut out = Vec::new();
        for guard in local.guards.clone() {
            let value = self.read_local(local);
            out.extend(self.guard(guard, value, name));
        }
        out
    }

    pub fn guard(&mut self, guard: Guard, value: Value, name: &str) -> Vec<Ins> {
        if value.ty.is_primitive() {
            return Vec::new();
        }
        let ok = self.cx.label();
        let cond = match guard {
            Guard::NonNull => Cond::Not(Box::new(Cond::IsNull(value))),
            Guard::NonEmpty => Cond::Truthy(convert::runtime_cast(value, &JvmType::Boolean)),
        };
        let error = Value::new_object(
            GUARD_ERROR,
            vec![JvmType::string()],
            vec![Value::str(&format!("{} {}", guard.label(), name))],
        );
        vec![
            Ins::Branch {
                cond,
                target: ok,
                when: true,
            },
            Ins::Throw(error),
            Ins::Label(ok),
        ]
    }

    /// Append the fall-through return and hand the body over.
    pub fn finish(mut self) -> MethodBody {
        if self.cx.falls_through() {
            let value = (self.ret != JvmType::Void).then(|| default_value(&self.ret));
            self.cx.emit(Ins::Return(value));
        }
        trace!(class = %self.class, ins = self.cx.ins.len(), "body lowered");
        self.cx.into_body()
    }
}

/// Zero, `false`, or `null` of a type.
pub(crate) fn default_value(ty: &JvmType) -> Value {
    match ty {
        JvmType::Long => Value::long(0),
        JvmType::Float => Value::float(0.0),
        JvmType::Double => Value::double(0.0),
        t if t.is_int_like() => Value::new(t.clone(), ValueKind::Const(Const::Int(0))),
        t => Value::new(t.clone(), ValueKind::Const(Const::Null)),
    }
}

/// Narrow an `Object` to `ty`, unboxing primitives through their wrapper.
pub(crate) fn from_object(value: Value, ty: &JvmType) -> Value {
    if *ty == value.ty || ty.is_object() {
        return value;
    }
    if let Some(wrapper) = box_type(ty) {
        let boxed = Value::new(JvmType::reference(wrapper), ValueKind::CheckCast(Box::new(value)));
        return unbox(boxed, ty);
    }
    Value::new(ty.clone(), ValueKind::CheckCast(Box::new(value)))
}

fn unbox(boxed: Value, prim: &JvmType) -> Value {
    let owner = box_type(prim).unwrap_or(OBJECT);
    let accessor = match prim {
        JvmType::Boolean => "booleanValue".to_string(),
        JvmType::Char => "charValue".to_string(),
        other => format!("{}Value", other.simple_name()),
    };
    Value::invoke(
        InvokeKind::Virtual,
        MethodRef::new(owner, &accessor, vec![], prim.clone()),
        Some(boxed),
        vec![],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_never_reused() {
        let mut cx = MethodCx::new(1);
        let a = cx.alloc(&JvmType::Long);
        cx.push_scope();
        let b = cx.alloc(&JvmType::Int);
        cx.pop_scope();
        let c = cx.alloc(&JvmType::object());
        assert_eq!((a, b, c), (1, 3, 4));
        assert_eq!(cx.into_body().max_locals, 5);
    }

    #[test]
    fn closing_ranges_skips_loops() {
        let mut cx = MethodCx::new(0);
        let open = cx.label();
        let (brk, cont) = (cx.label(), cx.label());
        cx.frames.push(Frame::Finally {
            body: Vec::new(),
            protect: Protect::new(open),
        });
        cx.frames.push(Frame::Loop { brk, cont });
        assert!(!cx.close_range(1));
        assert!(cx.close_range(0));
        cx.reopen(&[0]);
        let Frame::Finally { protect, .. } = &cx.frames[0] else {
            panic!("frame order changed");
        };
        assert_eq!(protect.ranges.len(), 1);
        assert_ne!(protect.open, open);
    }

    #[test]
    fn object_values_unbox_through_the_wrapper() {
        let raw = Value::local(1, JvmType::object());
        let v = from_object(raw, &JvmType::Int);
        assert_eq!(v.ty, JvmType::Int);
        let ValueKind::Invoke { method, .. } = &v.kind else {
            panic!("expected an accessor call");
        };
        assert_eq!(method.name, "intValue");
        assert_eq!(method.owner, "java/lang/Integer");
    }
}
