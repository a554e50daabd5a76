//! Pattern matching, destructuring, and the generated members of data
//! classes.

use crate::compile::ast::{BinOp, Case, Expr, ExprKind, Pattern, Stmt, TypeRef};
use crate::compile::{CompileError, Pos};
use crate::descriptor::{simple_class_name, JvmType, OBJECT};

use super::body::{default_value, BodyBuilder};
use super::convert::{box_type, to_object, RUNTIME};
use super::expr::{append, STRING_BUILDER};
use super::ir::*;
use super::members::{Synth, SINGLETON};
use super::overload::{self, Selection};
use super::stmt::local_type;
use super::types::FieldSig;

const LIST: &str = "java/util/List";
const ARRAY_LIST: &str = "java/util/ArrayList";
const MATCH_ERROR: &str = "mocha/lang/MatchError";

fn class_of(ty: &JvmType) -> JvmType {
    match box_type(ty) {
        Some(wrapper) => JvmType::reference(wrapper),
        None => ty.clone(),
    }
}

impl BodyBuilder<'_, '_> {
    /// Declare every name a pattern binds before any test runs, so each one
    /// is assigned on all paths.
    fn declare_bindings(&mut self, pattern: &Pattern, subject: &JvmType) -> Result<(), CompileError> {
        match pattern {
            Pattern::Bind(name, pos) => {
                let ty = local_type(subject).unwrap_or_else(JvmType::object);
                self.declare(name, ty, true, *pos)?;
            }
            Pattern::Type { bind: Some(name), ty, pos } => {
                let ty = self.imports().resolve_type(self.registry(), ty)?;
                self.declare(name, ty, true, *pos)?;
            }
            Pattern::Destruct { subs, .. } => {
                for sub in subs {
                    self.declare_bindings(sub, &JvmType::object())?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn bind_pattern(&mut self, name: &str, value: Value, pos: Pos, out: &mut Vec<Ins>) -> Result<(), CompileError> {
        let local = self
            .cx
            .lookup(name)
            .cloned()
            .ok_or_else(|| self.err(pos, format!("pattern variable {} is not declared", name)))?;
        let value = self.cast(value, &local.ty, pos)?;
        out.push(self.write_local(&local, value));
        Ok(())
    }

    /// Test `subject` against `pattern`, jumping to `fail` on the first
    /// mismatch. `subject` must be side-effect free.
    fn pattern_test(&mut self, pattern: &Pattern, subject: Value, fail: Label, out: &mut Vec<Ins>) -> Result<(), CompileError> {
        match pattern {
            Pattern::Wildcard(_) => Ok(()),
            Pattern::Bind(name, pos) => self.bind_pattern(name, subject, *pos, out),
            Pattern::Value(e) => {
                let expected = self.expr(e, None)?;
                let cond = if subject.ty.is_primitive() && expected.ty.is_primitive() {
                    self.compare_values(BinOp::Eq, subject, expected, e.pos)?
                } else {
                    Cond::Truthy(Value::invoke_static(
                        MethodRef::new(RUNTIME, "is", vec![JvmType::object(), JvmType::object()], JvmType::Boolean),
                        vec![to_object(subject), to_object(expected)],
                    ))
                };
                out.push(Ins::Branch {
                    cond,
                    target: fail,
                    when: false,
                });
                Ok(())
            }
            Pattern::Type { bind, ty, pos } => {
                let ty = self.imports().resolve_type(self.registry(), ty)?;
                let subject = if subject.ty.is_primitive() && !ty.is_primitive() {
                    to_object(subject)
                } else {
                    subject
                };
                if !subject.ty.is_primitive() {
                    out.push(Ins::Branch {
                        cond: Cond::Truthy(Value::new(
                            JvmType::Boolean,
                            ValueKind::InstanceOf {
                                value: Box::new(subject.clone()),
                                class: class_of(&ty),
                            },
                        )),
                        target: fail,
                        when: false,
                    });
                } else if subject.ty != ty {
                    out.push(Ins::Goto(fail));
                    return Ok(());
                }
                if let Some(name) = bind {
                    self.bind_pattern(name, subject, *pos, out)?;
                }
                Ok(())
            }
            Pattern::Destruct { ty, subs, pos } => self.destruct_test(ty, subs, subject, *pos, fail, out),
        }
    }

    /// `T(p1, ..)`: call `T.unapply`, check for a list of the right size,
    /// then test each element.
    fn destruct_test(
        &mut self,
        ty: &TypeRef,
        subs: &[Pattern],
        subject: Value,
        pos: Pos,
        fail: Label,
        out: &mut Vec<Ins>,
    ) -> Result<(), CompileError> {
        let owner = match self.imports().resolve_type(self.registry(), ty)? {
            JvmType::Reference(name) => name,
            other => return Err(self.err(pos, format!("{} cannot be destructured", other))),
        };
        let candidates: Vec<_> = self
            .registry()
            .find_methods(&owner, "unapply")
            .into_iter()
            .filter(|m| m.is_static() && m.params.len() == 1)
            .collect();
        let subject = to_object(subject);
        let unapply = match overload::select(self.registry(), &candidates, &[JvmType::object()]) {
            Selection::Found(sig) => sig,
            _ => candidates
                .into_iter()
                .next()
                .ok_or_else(|| self.err(pos, format!("{} has no unapply", owner.replace('/', "::"))))?,
        };
        let param = unapply.params[0].clone();
        if !self.registry().assignable(&subject.ty, &param) {
            out.push(Ins::Branch {
                cond: Cond::Truthy(Value::new(
                    JvmType::Boolean,
                    ValueKind::InstanceOf {
                        value: Box::new(subject.clone()),
                        class: class_of(&param),
                    },
                )),
                target: fail,
                when: false,
            });
        }
        let arg = self.cast(subject, &param, pos)?;
        let list_ty = JvmType::reference(LIST);
        let parts = self.cast(Value::invoke_static(unapply.method_ref(), vec![arg]), &list_ty, pos)?;
        let slot = self.temp(&list_ty);
        out.push(Ins::Store { slot, value: parts });
        let parts = Value::local(slot, list_ty);
        out.push(Ins::Branch {
            cond: Cond::IsNull(parts.clone()),
            target: fail,
            when: true,
        });
        let size = Value::invoke(
            InvokeKind::Interface,
            MethodRef::new(LIST, "size", vec![], JvmType::Int),
            Some(parts.clone()),
            vec![],
        );
        out.push(Ins::Branch {
            cond: Cond::Compare {
                op: CmpOp::Ne,
                lhs: size,
                rhs: Value::int(subs.len() as i32),
            },
            target: fail,
            when: true,
        });
        for (i, sub) in subs.iter().enumerate() {
            if matches!(sub, Pattern::Wildcard(_)) {
                continue;
            }
            let elem = Value::invoke(
                InvokeKind::Interface,
                MethodRef::new(LIST, "get", vec![JvmType::Int], JvmType::object()),
                Some(parts.clone()),
                vec![Value::int(i as i32)],
            );
            let slot = self.temp(&JvmType::object());
            out.push(Ins::Store { slot, value: elem });
            self.pattern_test(sub, Value::local(slot, JvmType::object()), fail, out)?;
        }
        Ok(())
    }

    /// Evaluate `value` once into a temporary.
    fn subject(&mut self, value: &Expr, out: &mut Vec<Ins>) -> Result<Value, CompileError> {
        let v = self.expr(value, None)?;
        let ty = local_type(&v.ty).ok_or_else(|| self.err(value.pos, "expression has no value"))?;
        let slot = self.temp(&ty);
        out.push(Ins::Store { slot, value: v });
        Ok(Value::local(slot, ty))
    }

    /// `P(a, b) <- e` as a statement; on mismatch the bindings keep their
    /// default values.
    pub fn destructure_stmt(&mut self, pattern: &Pattern, value: &Expr, _pos: Pos) -> Result<(), CompileError> {
        let mut out = Vec::new();
        let subject = self.subject(value, &mut out)?;
        self.declare_bindings(pattern, &subject.ty)?;
        let done = self.cx.label();
        self.pattern_test(pattern, subject, done, &mut out)?;
        self.cx.ins.extend(out);
        self.cx.bind(done);
        Ok(())
    }

    /// `P(a, b) <- e` as a condition: true when the pattern matched.
    pub fn destructure_value(&mut self, pattern: &Pattern, value: &Expr, _pos: Pos) -> Result<Value, CompileError> {
        let mut out = Vec::new();
        let subject = self.subject(value, &mut out)?;
        self.declare_bindings(pattern, &subject.ty)?;
        let fail = self.cx.label();
        let end = self.cx.label();
        let slot = self.temp(&JvmType::Boolean);
        self.pattern_test(pattern, subject, fail, &mut out)?;
        out.extend([
            Ins::Store {
                slot,
                value: Value::bool(true),
            },
            Ins::Goto(end),
            Ins::Label(fail),
            Ins::Store {
                slot,
                value: Value::bool(false),
            },
            Ins::Label(end),
        ]);
        Ok(Value::pack(out, Value::local(slot, JvmType::Boolean)))
    }

    /// `e match` with ordered cases; no matching case throws `MatchError`.
    pub fn match_expr(&mut self, value: &Expr, cases: &[Case], expected: Option<&JvmType>, _pos: Pos) -> Result<Value, CompileError> {
        let result_ty = expected
            .filter(|t| **t != JvmType::Void && **t != JvmType::Null)
            .cloned()
            .unwrap_or_else(JvmType::object);
        let mut out = Vec::new();
        let subject = self.subject(value, &mut out)?;
        let result = self.temp(&result_ty);
        let end = self.cx.label();

        for case in cases {
            let next = self.cx.label();
            self.cx.push_scope();
            let lowered = self.match_case(case, &subject, &result_ty, result, next, end, &mut out);
            self.cx.pop_scope();
            lowered?;
            out.push(Ins::Label(next));
        }
        out.push(Ins::Throw(Value::new_object(
            MATCH_ERROR,
            vec![JvmType::object()],
            vec![to_object(subject)],
        )));
        out.push(Ins::Label(end));
        Ok(Value::pack(out, Value::local(result, result_ty)))
    }

    #[allow(clippy::too_many_arguments)]
    fn match_case(
        &mut self,
        case: &Case,
        subject: &Value,
        result_ty: &JvmType,
        result: u16,
        next: Label,
        end: Label,
        out: &mut Vec<Ins>,
    ) -> Result<(), CompileError> {
        self.declare_bindings(&case.pattern, &subject.ty)?;
        self.pattern_test(&case.pattern, subject.clone(), next, out)?;
        if let Some(guard) = &case.guard {
            let cond = self.cond(guard)?;
            out.push(Ins::Branch {
                cond,
                target: next,
                when: false,
            });
        }

        // the body's statements are collected on their own and spliced in
        let saved = std::mem::take(&mut self.cx.ins);
        let lowered = self.case_body(&case.body, result_ty, result);
        let body = std::mem::replace(&mut self.cx.ins, saved);
        lowered?;
        out.extend(body);
        if out.last().map_or(true, |i| !i.is_terminal()) {
            out.push(Ins::Goto(end));
        }
        Ok(())
    }

    fn case_body(&mut self, body: &[Stmt], result_ty: &JvmType, result: u16) -> Result<(), CompileError> {
        let (last, rest) = match body.split_last() {
            Some((Stmt::Expr(e), rest)) if !matches!(e.kind, ExprKind::Assign { .. } | ExprKind::IncDec { .. }) => (Some(e), rest),
            _ => (None, body),
        };
        self.stmts(rest)?;
        let value = match last {
            Some(e) => {
                let v = self.expr(e, Some(result_ty))?;
                if v.is_void() {
                    self.cx.emit(Ins::Eval(v));
                    default_value(result_ty)
                } else {
                    self.coerce(v, result_ty, e.pos)?
                }
            }
            None => default_value(result_ty),
        };
        if self.cx.falls_through() {
            self.cx.emit(Ins::Store { slot: result, value });
        }
        Ok(())
    }

    /// Instance fields of the host in declaration order.
    fn data_fields(&self) -> Vec<FieldSig> {
        self.registry()
            .get(self.host())
            .map(|d| {
                d.fields
                    .iter()
                    .filter(|f| !f.is_static() && f.name != SINGLETON)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Body of a generated data-class member.
    pub(crate) fn synthetic_body(&mut self, synth: &Synth, pos: Pos) -> Result<(), CompileError> {
        let host = self.host().to_string();
        let host_ty = JvmType::reference(host.as_str());
        match synth {
            Synth::Getter(field) => {
                let this = self.this_value(pos)?;
                self.cx.emit(Ins::Return(Some(Value::get_field(field.field_ref(), this))));
            }
            Synth::Setter(field) => {
                let this = self.this_value(pos)?;
                let local = self
                    .cx
                    .lookup(&field.name)
                    .cloned()
                    .ok_or_else(|| self.err(pos, "setter parameter missing"))?;
                let value = self.read_local(&local);
                for guard in &field.guards {
                    let checks = self.guard(*guard, value.clone(), &field.name);
                    self.cx.ins.extend(checks);
                }
                self.cx.emit(Ins::PutField {
                    field: field.field_ref(),
                    target: this,
                    value,
                });
                self.cx.emit(Ins::Return(None));
            }
            Synth::Equals => {
                let this = self.this_value(pos)?;
                let other = Value::local(1, JvmType::object());
                let no = self.cx.label();
                self.cx.emit(Ins::Branch {
                    cond: Cond::Truthy(Value::new(
                        JvmType::Boolean,
                        ValueKind::InstanceOf {
                            value: Box::new(other.clone()),
                            class: host_ty.clone(),
                        },
                    )),
                    target: no,
                    when: false,
                });
                let slot = self.temp(&host_ty);
                self.cx.emit(Ins::Store {
                    slot,
                    value: Value::new(host_ty.clone(), ValueKind::CheckCast(Box::new(other))),
                });
                for field in self.data_fields() {
                    let mine = Value::get_field(field.field_ref(), this.clone());
                    let theirs = Value::get_field(field.field_ref(), Value::local(slot, host_ty.clone()));
                    let same = if field.ty.is_primitive() {
                        Cond::Compare {
                            op: CmpOp::Eq,
                            lhs: mine,
                            rhs: theirs,
                        }
                    } else {
                        Cond::Truthy(Value::invoke_static(
                            MethodRef::new("java/util/Objects", "equals", vec![JvmType::object(), JvmType::object()], JvmType::Boolean),
                            vec![mine, theirs],
                        ))
                    };
                    self.cx.emit(Ins::Branch {
                        cond: same,
                        target: no,
                        when: false,
                    });
                }
                self.cx.emit(Ins::Return(Some(Value::bool(true))));
                self.cx.bind(no);
                self.cx.emit(Ins::Return(Some(Value::bool(false))));
            }
            Synth::HashCode => {
                let this = self.this_value(pos)?;
                let values: Vec<Value> = self
                    .data_fields()
                    .iter()
                    .map(|f| to_object(Value::get_field(f.field_ref(), this.clone())))
                    .collect();
                let array = self.object_array(values);
                let hash = Value::invoke_static(
                    MethodRef::new(
                        "java/util/Arrays",
                        "hashCode",
                        vec![JvmType::Array(Box::new(JvmType::object()))],
                        JvmType::Int,
                    ),
                    vec![array],
                );
                self.cx.emit(Ins::Return(Some(hash)));
            }
            Synth::ToString => {
                let this = self.this_value(pos)?;
                let mut builder = Value::new_object(STRING_BUILDER, vec![], vec![]);
                builder = append(builder, Value::str(&format!("{}(", simple_class_name(&host))));
                for (i, field) in self.data_fields().iter().enumerate() {
                    let label = if i == 0 {
                        format!("{}=", field.name)
                    } else {
                        format!(", {}=", field.name)
                    };
                    builder = append(builder, Value::str(&label));
                    builder = append(builder, Value::get_field(field.field_ref(), this.clone()));
                }
                builder = append(builder, Value::str(")"));
                let text = Value::invoke(
                    InvokeKind::Virtual,
                    MethodRef::new(STRING_BUILDER, "toString", vec![], JvmType::string()),
                    Some(builder),
                    vec![],
                );
                self.cx.emit(Ins::Return(Some(text)));
            }
            Synth::Unapply => {
                let value = Value::local(0, JvmType::object());
                let no = self.cx.label();
                self.cx.emit(Ins::Branch {
                    cond: Cond::Truthy(Value::new(
                        JvmType::Boolean,
                        ValueKind::InstanceOf {
                            value: Box::new(value.clone()),
                            class: host_ty.clone(),
                        },
                    )),
                    target: no,
                    when: false,
                });
                let typed = Value::new(host_ty.clone(), ValueKind::CheckCast(Box::new(value)));
                let slot = self.temp(&host_ty);
                self.cx.emit(Ins::Store { slot, value: typed });
                let list_ty = JvmType::reference(ARRAY_LIST);
                let list = self.temp(&list_ty);
                self.cx.emit(Ins::Store {
                    slot: list,
                    value: Value::new_object(ARRAY_LIST, vec![], vec![]),
                });
                for field in self.data_fields() {
                    let v = Value::get_field(field.field_ref(), Value::local(slot, host_ty.clone()));
                    self.cx.emit(Ins::Eval(Value::invoke(
                        InvokeKind::Virtual,
                        MethodRef::new(ARRAY_LIST, "add", vec![JvmType::object()], JvmType::Boolean),
                        Some(Value::local(list, list_ty.clone())),
                        vec![to_object(v)],
                    )));
                }
                self.cx.emit(Ins::Return(Some(Value::local(list, list_ty))));
                self.cx.bind(no);
                self.cx.emit(Ins::Return(Some(Value::new(
                    JvmType::reference(LIST),
                    ValueKind::Const(Const::Null),
                ))));
            }
        }
        Ok(())
    }

    /// `new Object[] { values.. }`.
    pub(crate) fn object_array(&mut self, values: Vec<Value>) -> Value {
        let array_ty = JvmType::Array(Box::new(JvmType::object()));
        let slot = self.temp(&array_ty);
        let mut ins = vec![Ins::Store {
            slot,
            value: Value::new(
                array_ty.clone(),
                ValueKind::NewArray {
                    elem: JvmType::reference(OBJECT),
                    len: Box::new(Value::int(values.len() as i32)),
                },
            ),
        }];
        for (i, v) in values.into_iter().enumerate() {
            ins.push(Ins::ArrayStore {
                array: Value::local(slot, array_ty.clone()),
                index: Value::int(i as i32),
                value: to_object(v),
            });
        }
        Value::pack(ins, Value::local(slot, array_ty))
    }
}

#[cfg(test)]
mod tests {
    use crate::compile::semantic::tests::analyze;
    use crate::compile::semantic::{ClassOutput, Ins, MethodBody};

    fn body<'a>(out: &'a [ClassOutput], class: &str, method: &str) -> &'a MethodBody {
        out.iter()
            .find(|c| c.name == class)
            .and_then(|c| c.method(method))
            .and_then(|m| m.body.as_ref())
            .unwrap()
    }

    #[test]
    fn match_falls_back_to_match_error() {
        let src = concat!(
            "class A\n",
            "    m(x):Object\n",
            "        r = x match\n",
            "            case 1 => \"one\"\n",
            "            case s: String => s\n",
            "        return r\n",
        );
        let out = analyze(src).unwrap();
        let text = format!("{:?}", body(&out, "A", "m").ins);
        assert!(text.contains("mocha/lang/MatchError"));
        assert!(text.contains("\"is\""));
        assert!(text.contains("InstanceOf"));
    }

    #[test]
    fn primitive_subjects_are_boxed_for_reference_types() {
        let src = concat!(
            "class A\n",
            "    m():Object\n",
            "        r = 5 match\n",
            "            case s: String => \"str\"\n",
            "            case n: Number => \"num\"\n",
            "            case _ => \"other\"\n",
            "        return r\n",
        );
        let out = analyze(src).unwrap();
        let text = format!("{:?}", body(&out, "A", "m").ins);
        assert!(text.contains("java/lang/Number"));
        assert!(text.contains("\"valueOf\""));
        assert_eq!(text.matches("InstanceOf").count(), 2);
    }

    #[test]
    fn primitive_type_patterns_still_compare_exactly() {
        let src = "class A\n    m():Object\n        r = 5 match\n            case d: double => \"d\"\n            case i: int => \"i\"\n        return r\n";
        let out = analyze(src).unwrap();
        let text = format!("{:?}", body(&out, "A", "m").ins);
        assert!(!text.contains("InstanceOf"));
    }

    #[test]
    fn destructuring_checks_the_element_count() {
        let src = "data class P(x:int, y:int)\nclass A\n    m(v):int\n        P(a, b) <- v\n        return 0\n";
        let out = analyze(src).unwrap();
        let text = format!("{:?}", body(&out, "A", "m").ins);
        assert!(text.contains("\"unapply\""));
        assert!(text.contains("\"size\""));
        assert!(!body(&out, "A", "m").ins.iter().any(|i| matches!(i, Ins::Throw(_))));
    }

    #[test]
    fn data_classes_get_structural_members() {
        let out = analyze("data class P(x:int, name:String)\n").unwrap();
        let p = &out[0];
        for name in ["getX", "getName", "equals", "hashCode", "toString", "unapply"] {
            assert!(p.method(name).and_then(|m| m.body.as_ref()).is_some(), "{}", name);
        }
        let text = format!("{:?}", body(&out, "P", "toString").ins);
        assert!(text.contains("\"P(\""));
        assert!(text.contains("\", name=\""));
    }
}
