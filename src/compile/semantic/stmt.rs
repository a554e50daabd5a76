//! Statement lowering: control flow, loops, exception handling, and the
//! unwinding of `finally` and monitor frames on early exits.

use tracing::trace;

use crate::compile::ast::{BinOp, Catch, Expr, ExprKind, Modifier, Stmt, VarDef};
use crate::compile::{CompileError, Pos};
use crate::descriptor::{JvmType, OBJECT};

use super::body::{BodyBuilder, Frame, Protect, THROWABLE};
use super::convert::{to_object, RUNTIME};
use super::ir::*;
use super::members::Guard;

const ITERATOR: &str = "java/util/Iterator";
const ITERABLE: &str = "java/lang/Iterable";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Jump {
    Break,
    Continue,
}

impl BodyBuilder<'_, '_> {
    pub fn stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Var(var) => self.var_stmt(var),
            Stmt::Expr(e) => self.expr_stmt(e),
            Stmt::If {
                branches, otherwise, ..
            } => self.if_stmt(branches, otherwise.as_deref()),
            Stmt::While {
                cond, body, do_while, ..
            } => {
                if *do_while {
                    self.do_while_stmt(cond, body)
                } else {
                    self.while_stmt(cond, body)
                }
            }
            Stmt::For { var, iter, body, pos } => self.for_stmt(var, iter, body, *pos),
            Stmt::Break(pos) => self.jump(Jump::Break, *pos),
            Stmt::Continue(pos) => self.jump(Jump::Continue, *pos),
            Stmt::Return(value, pos) => self.return_stmt(value.as_ref(), *pos),
            Stmt::Throw(value, pos) => self.throw_stmt(value, *pos),
            Stmt::Try {
                body, catches, finally, ..
            } => self.try_stmt(body, catches, finally.as_deref()),
            Stmt::Synchronized { locks, body, .. } => self.sync_stmt(locks, body),
            Stmt::Destructure { pattern, value, pos } => self.destructure_stmt(pattern, value, *pos),
            Stmt::Method(m) => self.inner_method(m),
            Stmt::Static(_, pos) => Err(self.err(*pos, "static blocks may only appear in type bodies")),
            Stmt::Class(c) => Err(self.err(c.pos, "nested type definitions are not supported")),
            Stmt::Pass(_) => Ok(()),
        }
    }

    fn expr_stmt(&mut self, e: &Expr) -> Result<(), CompileError> {
        match &e.kind {
            ExprKind::Assign { target, op, value } => self.assign_stmt(target, *op, value, e.pos),
            ExprKind::IncDec { target, delta, .. } => {
                let one = Expr::new(ExprKind::Int(*delta), e.pos);
                self.assign_stmt(target, Some(BinOp::Add), &one, e.pos)
            }
            _ => {
                let value = self.expr(e, None)?;
                self.cx.emit(Ins::Eval(value));
                Ok(())
            }
        }
    }

    fn var_stmt(&mut self, var: &VarDef) -> Result<(), CompileError> {
        let declared = match &var.ty {
            Some(t) => Some(self.imports().resolve_type(self.registry(), t)?),
            None => None,
        };
        let init = match &var.init {
            Some(e) => Some(self.expr(e, declared.as_ref())?),
            None => None,
        };
        let ty = match (&declared, &init) {
            (Some(t), _) => t.clone(),
            (None, Some(v)) => local_type(&v.ty).ok_or_else(|| self.err(var.pos, "expression has no value"))?,
            (None, None) => JvmType::object(),
        };
        if ty == JvmType::Void {
            return Err(self.err(var.pos, format!("{} cannot be Unit", var.name)));
        }
        let value = match init {
            Some(v) => Some(self.coerce(v, &ty, var.pos)?),
            None => None,
        };
        let mutable = !var.modifiers.contains(&Modifier::Val);
        let local = self.declare_guarded(&var.name, ty, mutable, Guard::of(&var.modifiers), var.pos)?;
        if let Some(value) = value {
            let store = self.write_local(&local, value);
            self.cx.emit(store);
        }
        let checks = self.guard_local(&local, &var.name);
        self.cx.ins.extend(checks);
        Ok(())
    }

    fn if_stmt(&mut self, branches: &[(Expr, Vec<Stmt>)], otherwise: Option<&[Stmt]>) -> Result<(), CompileError> {
        let end = self.cx.label();
        // bindings made by a destructuring condition stay visible in its branch
        self.cx.push_scope();
        let result = self.if_chain(branches, otherwise, end);
        self.cx.pop_scope();
        self.cx.bind(end);
        result
    }

    fn if_chain(&mut self, branches: &[(Expr, Vec<Stmt>)], otherwise: Option<&[Stmt]>, end: Label) -> Result<(), CompileError> {
        for (cond, body) in branches {
            let next = self.cx.label();
            let test = self.cond(cond)?;
            self.cx.emit(Ins::Branch {
                cond: test,
                target: next,
                when: false,
            });
            self.block(body)?;
            if self.cx.falls_through() {
                self.cx.emit(Ins::Goto(end));
            }
            self.cx.bind(next);
        }
        if let Some(body) = otherwise {
            self.block(body)?;
        }
        Ok(())
    }

    fn while_stmt(&mut self, cond: &Expr, body: &[Stmt]) -> Result<(), CompileError> {
        let (top, end) = (self.cx.label(), self.cx.label());
        self.cx.push_scope();
        self.cx.bind(top);
        let result = self.cond(cond).and_then(|test| {
            self.cx.emit(Ins::Branch {
                cond: test,
                target: end,
                when: false,
            });
            self.loop_body(body, end, top)
        });
        self.cx.pop_scope();
        self.cx.emit(Ins::Goto(top));
        self.cx.bind(end);
        result
    }

    fn do_while_stmt(&mut self, cond: &Expr, body: &[Stmt]) -> Result<(), CompileError> {
        let (top, test_at, end) = (self.cx.label(), self.cx.label(), self.cx.label());
        self.cx.bind(top);
        self.loop_body(body, end, test_at)?;
        self.cx.bind(test_at);
        let test = self.cond(cond)?;
        self.cx.emit(Ins::Branch {
            cond: test,
            target: top,
            when: true,
        });
        self.cx.bind(end);
        Ok(())
    }

    fn loop_body(&mut self, body: &[Stmt], brk: Label, cont: Label) -> Result<(), CompileError> {
        let depth = self.cx.frames.len();
        self.cx.frames.push(Frame::Loop { brk, cont });
        let result = self.block(body);
        self.cx.frames.truncate(depth);
        result
    }

    fn for_stmt(&mut self, var: &str, iter: &Expr, body: &[Stmt], pos: Pos) -> Result<(), CompileError> {
        self.cx.push_scope();
        let result = match &iter.kind {
            ExprKind::Binary { op, lhs, rhs } if matches!(op, BinOp::Range | BinOp::RangeExclusive) => {
                self.for_range(var, lhs, rhs, *op == BinOp::Range, body, pos)
            }
            _ => self.for_each(var, iter, body, pos),
        };
        self.cx.pop_scope();
        result
    }

    /// `for i in a..b` counts with an `int` instead of building a range.
    fn for_range(
        &mut self,
        var: &str,
        from: &Expr,
        to: &Expr,
        inclusive: bool,
        body: &[Stmt],
        pos: Pos,
    ) -> Result<(), CompileError> {
        let start = self.expr(from, Some(&JvmType::Int))?;
        let start = self.coerce(start, &JvmType::Int, from.pos)?;
        let limit = self.expr(to, Some(&JvmType::Int))?;
        let limit = self.coerce(limit, &JvmType::Int, to.pos)?;
        let limit_slot = self.temp(&JvmType::Int);
        self.cx.emit(Ins::Store {
            slot: limit_slot,
            value: limit,
        });
        let counter = self.declare(var, JvmType::Int, true, pos)?;
        let init = self.write_local(&counter, start);
        self.cx.emit(init);

        let (test, step, end) = (self.cx.label(), self.cx.label(), self.cx.label());
        self.cx.bind(test);
        self.cx.emit(Ins::Branch {
            cond: Cond::Compare {
                op: if inclusive { CmpOp::Gt } else { CmpOp::Ge },
                lhs: self.read_local(&counter),
                rhs: Value::local(limit_slot, JvmType::Int),
            },
            target: end,
            when: true,
        });
        let result = self.loop_body(body, end, step);
        self.cx.bind(step);
        let next = Value::new(
            JvmType::Int,
            ValueKind::Arith {
                op: ArithOp::Add,
                lhs: Box::new(self.read_local(&counter)),
                rhs: Box::new(Value::int(1)),
            },
        );
        let bump = self.write_local(&counter, next);
        self.cx.emit(bump);
        self.cx.emit(Ins::Goto(test));
        self.cx.bind(end);
        result
    }

    fn for_each(&mut self, var: &str, iter: &Expr, body: &[Stmt], pos: Pos) -> Result<(), CompileError> {
        let source = self.expr(iter, None)?;
        if let JvmType::Array(elem) = source.ty.clone() {
            return self.for_array(var, source, *elem, body, pos);
        }
        if source.ty.is_primitive() || source.ty == JvmType::Null {
            return Err(self.err(iter.pos, format!("cannot iterate over {}", source.ty)));
        }

        let iterator_ty = JvmType::reference(ITERATOR);
        let iterator = if source.ty == iterator_ty {
            source
        } else if self.registry().assignable(&source.ty, &JvmType::reference(ITERABLE)) {
            let owner = match &source.ty {
                JvmType::Reference(name) if self.registry().get(name).map_or(false, |d| d.is_interface()) => name.clone(),
                JvmType::Reference(name) => name.clone(),
                _ => ITERABLE.to_string(),
            };
            let kind = if self.registry().get(&owner).map_or(true, |d| d.is_interface()) {
                InvokeKind::Interface
            } else {
                InvokeKind::Virtual
            };
            Value::invoke(kind, MethodRef::new(&owner, "iterator", vec![], iterator_ty.clone()), Some(source), vec![])
        } else {
            Value::invoke_static(
                MethodRef::new(RUNTIME, "iterator", vec![JvmType::object()], iterator_ty.clone()),
                vec![to_object(source)],
            )
        };
        let it = self.temp(&iterator_ty);
        self.cx.emit(Ins::Store { slot: it, value: iterator });
        let element = self.declare(var, JvmType::object(), true, pos)?;

        let (test, end) = (self.cx.label(), self.cx.label());
        self.cx.bind(test);
        let has_next = Value::invoke(
            InvokeKind::Interface,
            MethodRef::new(ITERATOR, "hasNext", vec![], JvmType::Boolean),
            Some(Value::local(it, iterator_ty.clone())),
            vec![],
        );
        self.cx.emit(Ins::Branch {
            cond: Cond::Truthy(has_next),
            target: end,
            when: false,
        });
        let next = Value::invoke(
            InvokeKind::Interface,
            MethodRef::new(ITERATOR, "next", vec![], JvmType::object()),
            Some(Value::local(it, iterator_ty)),
            vec![],
        );
        let store = self.write_local(&element, next);
        self.cx.emit(store);
        let result = self.loop_body(body, end, test);
        self.cx.emit(Ins::Goto(test));
        self.cx.bind(end);
        result
    }

    fn for_array(&mut self, var: &str, array: Value, elem: JvmType, body: &[Stmt], pos: Pos) -> Result<(), CompileError> {
        let array_ty = array.ty.clone();
        let arr = self.temp(&array_ty);
        self.cx.emit(Ins::Store { slot: arr, value: array });
        let index = self.temp(&JvmType::Int);
        self.cx.emit(Ins::Store {
            slot: index,
            value: Value::int(0),
        });
        let element = self.declare(var, elem.clone(), true, pos)?;

        let (test, step, end) = (self.cx.label(), self.cx.label(), self.cx.label());
        self.cx.bind(test);
        self.cx.emit(Ins::Branch {
            cond: Cond::Compare {
                op: CmpOp::Ge,
                lhs: Value::local(index, JvmType::Int),
                rhs: Value::new(
                    JvmType::Int,
                    ValueKind::ArrayLength(Box::new(Value::local(arr, array_ty.clone()))),
                ),
            },
            target: end,
            when: true,
        });
        let load = Value::new(
            elem,
            ValueKind::ArrayLoad {
                array: Box::new(Value::local(arr, array_ty)),
                index: Box::new(Value::local(index, JvmType::Int)),
            },
        );
        let store = self.write_local(&element, load);
        self.cx.emit(store);
        let result = self.loop_body(body, end, step);
        self.cx.bind(step);
        self.cx.emit(Ins::Store {
            slot: index,
            value: Value::new(
                JvmType::Int,
                ValueKind::Arith {
                    op: ArithOp::Add,
                    lhs: Box::new(Value::local(index, JvmType::Int)),
                    rhs: Box::new(Value::int(1)),
                },
            ),
        });
        self.cx.emit(Ins::Goto(test));
        self.cx.bind(end);
        result
    }

    fn jump(&mut self, kind: Jump, pos: Pos) -> Result<(), CompileError> {
        let found = self.cx.frames.iter().enumerate().rev().find_map(|(i, f)| match f {
            Frame::Loop { brk, cont } => Some((i, *brk, *cont)),
            _ => None,
        });
        let Some((index, brk, cont)) = found else {
            let word = if kind == Jump::Break { "break" } else { "continue" };
            return Err(self.err(pos, format!("{} outside of a loop", word)));
        };
        let closed = self.unwind(index + 1)?;
        self.cx.emit(Ins::Goto(if kind == Jump::Break { brk } else { cont }));
        self.cx.reopen(&closed);
        Ok(())
    }

    fn return_stmt(&mut self, value: Option<&Expr>, pos: Pos) -> Result<(), CompileError> {
        let ret = self.ret.clone();
        let value = match (value, ret == JvmType::Void) {
            (Some(e), true) => {
                let v = self.expr(e, None)?;
                if !v.is_void() {
                    return Err(self.err(pos, "cannot return a value from a Unit method"));
                }
                self.cx.emit(Ins::Eval(v));
                None
            }
            (Some(e), false) => {
                let v = self.expr(e, Some(&ret))?;
                Some(self.coerce(v, &ret, e.pos)?)
            }
            (None, true) => None,
            (None, false) => Some(super::body::default_value(&ret)),
        };
        let pending = self.cx.frames.iter().any(|f| !matches!(f, Frame::Loop { .. }));
        if !pending {
            self.cx.emit(Ins::Return(value));
            return Ok(());
        }
        let result = match value {
            Some(v) => {
                let slot = self.temp(&ret);
                self.cx.emit(Ins::Store { slot, value: v });
                Some(Value::local(slot, ret))
            }
            None => None,
        };
        let closed = self.unwind(0)?;
        self.cx.emit(Ins::Return(result));
        self.cx.reopen(&closed);
        Ok(())
    }

    /// Leave every frame above `depth`: close its range, then run its
    /// `finally` body or release its monitor. Returns the closed frames.
    fn unwind(&mut self, depth: usize) -> Result<Vec<usize>, CompileError> {
        let mut closed = Vec::new();
        for index in (depth..self.cx.frames.len()).rev() {
            if !self.cx.close_range(index) {
                continue;
            }
            closed.push(index);
            match self.cx.frames[index].clone() {
                Frame::Finally { body, .. } => {
                    let inner = self.cx.frames.split_off(index);
                    let result = self.block(&body);
                    self.cx.frames.extend(inner);
                    result?;
                }
                Frame::Monitor { slot, .. } => {
                    self.cx.emit(Ins::MonitorExit(Value::local(slot, JvmType::object())));
                }
                Frame::Loop { .. } => {}
            }
        }
        Ok(closed)
    }

    fn throw_stmt(&mut self, value: &Expr, pos: Pos) -> Result<(), CompileError> {
        let v = self.expr(value, None)?;
        let throwable = JvmType::reference(THROWABLE);
        let v = if self.registry().assignable(&v.ty, &throwable) {
            v
        } else if v.ty.is_reference() {
            Value::new(throwable, ValueKind::CheckCast(Box::new(v)))
        } else {
            return Err(self.err(pos, format!("cannot throw {}", v.ty)));
        };
        self.cx.emit(Ins::Throw(v));
        Ok(())
    }

    fn try_stmt(&mut self, body: &[Stmt], catches: &[Catch], finally: Option<&[Stmt]>) -> Result<(), CompileError> {
        let Some(finally) = finally else {
            return self.try_catch(body, catches);
        };
        let depth = self.cx.frames.len();
        let open = self.cx.label();
        self.cx.bind(open);
        self.cx.frames.push(Frame::Finally {
            body: finally.to_vec(),
            protect: Protect::new(open),
        });
        let result = self.try_catch(body, catches);
        self.cx.frames.truncate(depth + 1);
        self.cx.close_range(depth);
        let ranges = match self.cx.frames.pop() {
            Some(Frame::Finally { protect, .. }) => protect.ranges,
            _ => Vec::new(),
        };

        let after = self.cx.label();
        self.block(finally)?;
        if self.cx.falls_through() {
            self.cx.emit(Ins::Goto(after));
        }

        let handler = self.cx.label();
        let caught = self.temp(&JvmType::reference(THROWABLE));
        self.cx.emit(Ins::Catch {
            label: handler,
            slot: caught,
        });
        self.block(finally)?;
        self.cx.emit(Ins::Throw(Value::local(caught, JvmType::reference(THROWABLE))));
        self.cx.bind(after);

        trace!(ranges = ranges.len(), "finally lowered");
        for (start, end) in ranges {
            self.cx.exceptions.push(ExceptionRange {
                start,
                end,
                handler,
                catch_type: None,
            });
        }
        result
    }

    /// One `Throwable` handler tests the catch clauses in order and
    /// rethrows when none matches.
    fn try_catch(&mut self, body: &[Stmt], catches: &[Catch]) -> Result<(), CompileError> {
        if catches.is_empty() {
            return self.block(body);
        }
        let throwable = JvmType::reference(THROWABLE);
        let (start, end, after, handler) = (self.cx.label(), self.cx.label(), self.cx.label(), self.cx.label());
        self.cx.bind(start);
        self.block(body)?;
        self.cx.bind(end);
        if self.cx.falls_through() {
            self.cx.emit(Ins::Goto(after));
        }

        let caught = self.temp(&throwable);
        self.cx.emit(Ins::Catch {
            label: handler,
            slot: caught,
        });
        for clause in catches {
            let ty = match &clause.ty {
                Some(t) => self.imports().resolve_type(self.registry(), t)?,
                None => throwable.clone(),
            };
            if !self.registry().assignable(&ty, &throwable) {
                return Err(self.err(clause.pos, format!("{} is not a Throwable", ty)));
            }
            let next = self.cx.label();
            let exception = Value::local(caught, throwable.clone());
            if ty != throwable {
                self.cx.emit(Ins::Branch {
                    cond: Cond::Truthy(Value::new(
                        JvmType::Boolean,
                        ValueKind::InstanceOf {
                            value: Box::new(exception.clone()),
                            class: ty.clone(),
                        },
                    )),
                    target: next,
                    when: false,
                });
            }
            self.cx.push_scope();
            let bound = self.declare(&clause.name, ty.clone(), true, clause.pos).map(|local| {
                let value = if ty == throwable {
                    exception
                } else {
                    Value::new(ty.clone(), ValueKind::CheckCast(Box::new(exception)))
                };
                self.write_local(&local, value)
            });
            let result = bound.and_then(|store| {
                self.cx.emit(store);
                self.stmts(&clause.body)
            });
            self.cx.pop_scope();
            result?;
            if self.cx.falls_through() {
                self.cx.emit(Ins::Goto(after));
            }
            self.cx.bind(next);
        }
        self.cx.emit(Ins::Throw(Value::local(caught, throwable)));
        self.cx.bind(after);
        self.cx.exceptions.push(ExceptionRange {
            start,
            end,
            handler,
            catch_type: Some(THROWABLE.to_string()),
        });
        Ok(())
    }

    /// `synchronized(a, b)` nests one monitor per lock, released on every
    /// exit including exceptional ones.
    fn sync_stmt(&mut self, locks: &[Expr], body: &[Stmt]) -> Result<(), CompileError> {
        let Some((first, rest)) = locks.split_first() else {
            return self.block(body);
        };
        let lock = self.expr(first, None)?;
        if lock.ty.is_primitive() {
            return Err(self.err(first.pos, format!("cannot synchronize on {}", lock.ty)));
        }
        let object = JvmType::reference(OBJECT);
        let slot = self.temp(&object);
        self.cx.emit(Ins::Store { slot, value: lock });
        self.cx.emit(Ins::MonitorEnter(Value::local(slot, object.clone())));

        let depth = self.cx.frames.len();
        let open = self.cx.label();
        self.cx.bind(open);
        self.cx.frames.push(Frame::Monitor {
            slot,
            protect: Protect::new(open),
        });
        let result = self.sync_stmt(rest, body);
        self.cx.frames.truncate(depth + 1);
        self.cx.close_range(depth);
        let ranges = match self.cx.frames.pop() {
            Some(Frame::Monitor { protect, .. }) => protect.ranges,
            _ => Vec::new(),
        };
        let after = self.cx.label();
        self.cx.emit(Ins::MonitorExit(Value::local(slot, object.clone())));
        self.cx.emit(Ins::Goto(after));

        let handler = self.cx.label();
        let caught = self.temp(&JvmType::reference(THROWABLE));
        self.cx.emit(Ins::Catch {
            label: handler,
            slot: caught,
        });
        self.cx.emit(Ins::MonitorExit(Value::local(slot, object)));
        self.cx.emit(Ins::Throw(Value::local(caught, JvmType::reference(THROWABLE))));
        self.cx.bind(after);
        for (start, end) in ranges {
            self.cx.exceptions.push(ExceptionRange {
                start,
                end,
                handler,
                catch_type: None,
            });
        }
        result
    }
}

/// Type a local takes from its initializer.
pub(crate) fn local_type(ty: &JvmType) -> Option<JvmType> {
    match ty {
        JvmType::Void => None,
        JvmType::Null => Some(JvmType::object()),
        t => Some(t.clone()),
    }
}

#[cfg(test)]
mod tests {
    use crate::compile::semantic::tests::analyze;
    use crate::compile::semantic::{ClassOutput, Ins, MethodBody};

    fn body<'a>(out: &'a [ClassOutput], method: &str) -> &'a MethodBody {
        out[0].method(method).and_then(|m| m.body.as_ref()).unwrap()
    }

    #[test]
    fn finally_runs_on_every_exit() {
        let src = "class A\n    m(x:int):int\n        try\n            if x > 0\n                return 1\n        finally\n            System.out.println(\"f\")\n        return 2\n";
        let out = analyze(src).unwrap();
        let b = body(&out, "m");
        let prints = b
            .ins
            .iter()
            .filter(|i| format!("{:?}", i).contains("\"println\""))
            .count();
        // early return, normal exit, and the exceptional handler
        assert_eq!(prints, 3);
        assert_eq!(b.exceptions.len(), 2);
        assert!(b.exceptions.iter().all(|e| e.catch_type.is_none()));
    }

    fn guard_checks(b: &MethodBody) -> usize {
        format!("{:?}", b.ins).matches("mocha/lang/GuardViolationError").count()
    }

    #[test]
    fn guarded_locals_are_checked_on_every_write() {
        let src = concat!(
            "class A\n",
            "    m():Unit\n",
            "        nonnull s:String = \"a\"\n",
            "        s = null\n",
            "        s += \"b\"\n",
            "        t = \"plain\"\n",
            "        t = null\n",
        );
        let out = analyze(src).unwrap();
        assert_eq!(guard_checks(body(&out, "m")), 3);
    }

    #[test]
    fn guarded_fields_are_checked_on_every_write() {
        let src = concat!(
            "class A\n",
            "    nonempty name:String = \"x\"\n",
            "    rename(n:String):Unit\n",
            "        name = n\n",
            "    clear(other:A):Unit\n",
            "        other.name = null\n",
        );
        let out = analyze(src).unwrap();
        assert_eq!(guard_checks(body(&out, "rename")), 1);
        assert_eq!(guard_checks(body(&out, "clear")), 1);
        assert_eq!(guard_checks(body(&out, "<init>")), 1);
    }

    #[test]
    fn guarded_parameters_stay_guarded() {
        let out = analyze("class A\n    m(nonnull s:String):Unit\n        s = null\n").unwrap();
        assert_eq!(guard_checks(body(&out, "m")), 2);
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let err = analyze("class A\n    m():Unit\n        break\n").unwrap_err();
        assert!(err.message().contains("break outside of a loop"));
    }

    #[test]
    fn synchronized_releases_on_exception() {
        let out = analyze("class A\n    m(a, b):Unit\n        synchronized(a, b)\n            ...\n").unwrap();
        let b = body(&out, "m");
        let enters = b.ins.iter().filter(|i| matches!(i, Ins::MonitorEnter(_))).count();
        let exits = b.ins.iter().filter(|i| matches!(i, Ins::MonitorExit(_))).count();
        assert_eq!(enters, 2);
        assert_eq!(exits, 4);
    }

    #[test]
    fn catch_clauses_share_one_handler() {
        let src = "class A\n    m():Unit\n        try\n            ...\n        catch e:RuntimeException\n            ...\n        catch e\n            ...\n";
        let out = analyze(src).unwrap();
        let b = body(&out, "m");
        assert_eq!(b.exceptions.len(), 1);
        assert_eq!(b.exceptions[0].catch_type.as_deref(), Some("java/lang/Throwable"));
    }
}
