//! Expression lowering: literals, names, operators, conditions, and
//! assignment targets.

use crate::compile::ast::{BinOp, Expr, ExprKind, UnaryOp};
use crate::compile::{CompileError, Pos};
use crate::descriptor::{JvmType, STRING};

use super::body::{BodyBuilder, Local};
use super::calls::Arg;
use super::convert::{arithmetic_type, binary_numeric_type, runtime_cast, to_object, unbox_type};
use super::ir::*;
use super::members::SINGLETON;
use super::stmt::local_type;
use super::types::MethodSig;

pub(crate) const STRING_BUILDER: &str = "java/lang/StringBuilder";
const ARRAY_LIST: &str = "java/util/ArrayList";
const LINKED_HASH_MAP: &str = "java/util/LinkedHashMap";
const RANGE_LIST: &str = "mocha/lang/RangeList";
const OBJECTS: &str = "java/util/Objects";

/// Something that can be assigned to.
#[derive(Clone, Debug)]
pub(crate) enum Place {
    Local(Local),
    Field { field: FieldRef, target: Value },
    Static(FieldRef),
    Array { array: Value, index: Value, elem: JvmType },
    /// A getter/setter pair, or `get`/`set` and `get`/`put` with a key.
    Accessor {
        target: Value,
        key: Option<Value>,
        get: Option<MethodSig>,
        set: Option<MethodSig>,
        ty: JvmType,
    },
    /// Field access resolved at run time.
    Dynamic { target: Value, name: String },
    /// Index access resolved at run time.
    DynamicIndex { target: Value, index: Value },
}

impl Place {
    pub fn ty(&self) -> JvmType {
        match self {
            Place::Local(local) => local.ty.clone(),
            Place::Field { field, .. } | Place::Static(field) => field.ty.clone(),
            Place::Array { elem, .. } => elem.clone(),
            Place::Accessor { ty, .. } => ty.clone(),
            Place::Dynamic { .. } | Place::DynamicIndex { .. } => JvmType::object(),
        }
    }
}

fn is_integral(ty: &JvmType) -> bool {
    matches!(
        ty,
        JvmType::Byte | JvmType::Short | JvmType::Char | JvmType::Int | JvmType::Long
    )
}

fn arith_op(op: BinOp) -> Option<ArithOp> {
    Some(match op {
        BinOp::Add => ArithOp::Add,
        BinOp::Sub => ArithOp::Sub,
        BinOp::Mul => ArithOp::Mul,
        BinOp::Div => ArithOp::Div,
        BinOp::Rem => ArithOp::Rem,
        BinOp::Shl => ArithOp::Shl,
        BinOp::Shr => ArithOp::Shr,
        BinOp::Ushr => ArithOp::Ushr,
        BinOp::BitAnd => ArithOp::And,
        BinOp::BitOr => ArithOp::Or,
        BinOp::Xor => ArithOp::Xor,
        _ => return None,
    })
}

/// Method called when an operator's operands are not primitives.
fn operator_method(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "subtract",
        BinOp::Mul => "multiply",
        BinOp::Div => "divide",
        BinOp::Rem => "remainder",
        BinOp::Shl => "shiftLeft",
        BinOp::Shr => "shiftRight",
        BinOp::Ushr => "unsignedShiftRight",
        BinOp::BitAnd => "and",
        BinOp::BitOr => "or",
        BinOp::Xor => "xor",
        BinOp::Gt => "gt",
        BinOp::Lt => "lt",
        BinOp::Ge => "ge",
        BinOp::Le => "le",
        BinOp::Pow => "pow",
        _ => "apply",
    }
}

fn cmp_op(op: BinOp) -> Option<CmpOp> {
    Some(match op {
        BinOp::Eq | BinOp::RefEq => CmpOp::Eq,
        BinOp::Ne | BinOp::RefNe => CmpOp::Ne,
        BinOp::Lt => CmpOp::Lt,
        BinOp::Gt => CmpOp::Gt,
        BinOp::Le => CmpOp::Le,
        BinOp::Ge => CmpOp::Ge,
        _ => return None,
    })
}

fn negate_if(cond: Cond, negate: bool) -> Cond {
    if negate {
        Cond::Not(Box::new(cond))
    } else {
        cond
    }
}

impl BodyBuilder<'_, '_> {
    pub fn expr(&mut self, e: &Expr, expected: Option<&JvmType>) -> Result<Value, CompileError> {
        let pos = e.pos;
        match &e.kind {
            ExprKind::Int(v) => Ok(Value::int(*v)),
            ExprKind::Long(v) => Ok(Value::long(*v)),
            ExprKind::Float(v) => Ok(Value::float(*v)),
            ExprKind::Double(v) => Ok(Value::double(*v)),
            ExprKind::Str(s) => Ok(Value::str(s)),
            ExprKind::Bool(b) => Ok(Value::bool(*b)),
            ExprKind::Null => Ok(Value::null()),
            ExprKind::This => self.this_value(pos),
            ExprKind::Name(name) => self.name_value(name, pos),
            ExprKind::Access { target, name } => self.access(target, name, pos),
            ExprKind::Call { target, name, args } => self.call(target.as_deref(), name, args, pos),
            ExprKind::Apply { callee, args } => {
                let f = self.expr(callee, None)?;
                self.apply(f, args, pos)
            }
            ExprKind::New { ty, args } => {
                let ty = self.imports().resolve_type(self.registry(), ty)?;
                self.construct(&ty, args, pos)
            }
            ExprKind::NewArray { elem, len } => {
                let elem = self.imports().resolve_type(self.registry(), elem)?;
                if elem == JvmType::Void {
                    return Err(self.err(pos, "array of Unit"));
                }
                let len = self.expr(len, Some(&JvmType::Int))?;
                let len = self.coerce(len, &JvmType::Int, pos)?;
                Ok(Value::new(
                    JvmType::Array(Box::new(elem.clone())),
                    ValueKind::NewArray {
                        elem,
                        len: Box::new(len),
                    },
                ))
            }
            ExprKind::Index { target, index } => {
                let (prep, place) = self.place_of_index(target, index, false)?;
                let value = self.read_place(&place, pos)?;
                Ok(if prep.is_empty() { value } else { Value::pack(prep, value) })
            }
            ExprKind::List(items) => self.list_literal(items, expected, pos),
            ExprKind::Map(pairs) => self.map_literal(pairs),
            ExprKind::Binary { op, lhs, rhs } => self.binary(e, *op, lhs, rhs),
            ExprKind::Custom { op, lhs, rhs } => self.call(Some(lhs), op, std::slice::from_ref(&**rhs), pos),
            ExprKind::Unary { op, expr } => self.unary(e, *op, expr),
            ExprKind::Assign { target, op, value } => self.assign_value(target, *op, value, pos),
            ExprKind::IncDec { target, delta, prefix } => self.incdec_value(target, *delta, *prefix, pos),
            ExprKind::Lambda { params, body, implicit } => self.lambda(params, body, *implicit, expected, pos),
            ExprKind::Match { value, cases } => self.match_expr(value, cases, expected, pos),
            ExprKind::TypeOf(ty) => {
                let ty = self.imports().resolve_type(self.registry(), ty)?;
                Ok(Value::class_literal(ty))
            }
            ExprKind::As { expr, ty } => {
                let ty = self.imports().resolve_type(self.registry(), ty)?;
                let v = self.expr(expr, Some(&ty))?;
                self.cast(v, &ty, pos)
            }
            ExprKind::Is { expr, ty } => {
                let ty = self.imports().resolve_type(self.registry(), ty)?;
                let class = match super::convert::box_type(&ty) {
                    Some(wrapper) => JvmType::reference(wrapper),
                    None => ty,
                };
                let v = self.expr(expr, None)?;
                Ok(Value::new(
                    JvmType::Boolean,
                    ValueKind::InstanceOf {
                        value: Box::new(to_object(v)),
                        class,
                    },
                ))
            }
            ExprKind::Destructure { pattern, value } => self.destructure_value(pattern, value, pos),
            ExprKind::Annotation(_) => Err(self.err(pos, "an annotation is not a value")),
        }
    }

    /// A plain identifier: local, field, static import, zero-argument call,
    /// or the singleton of an `object`.
    pub fn name_value(&mut self, name: &str, pos: Pos) -> Result<Value, CompileError> {
        if let Some(local) = self.cx.lookup(name).cloned() {
            return Ok(self.read_local(&local));
        }
        if name == "super" {
            return Err(self.err(pos, "`super` may only be used to call a parent method"));
        }
        if !name.contains("::") {
            if let Some(v) = self.field_value(name, pos)? {
                return Ok(v);
            }
            if self.has_callable(name) {
                return self.call(None, name, &[], pos);
            }
        }
        if let Some(ty) = self.imports().resolve_name(self.registry(), name) {
            return self.singleton(&ty, pos);
        }
        Err(self.err(pos, format!("cannot resolve {}", name)))
    }

    pub fn singleton(&self, ty: &str, pos: Pos) -> Result<Value, CompileError> {
        if self.registry().get(ty).map_or(false, |d| d.is_object) {
            Ok(Value::get_static(FieldRef::new(ty, SINGLETON, JvmType::reference(ty))))
        } else {
            Err(self.err(pos, format!("type {} is not a value", ty.replace('/', "::"))))
        }
    }

    /// A field of the host class or a statically imported field.
    fn field_value(&mut self, name: &str, pos: Pos) -> Result<Option<Value>, CompileError> {
        if let Some(field) = self.registry().find_field(self.host(), name) {
            if field.is_static() {
                return Ok(Some(Value::get_static(self.reach_field(&field, pos)?)));
            }
            let this = self
                .host_this
                .clone()
                .ok_or_else(|| self.err(pos, format!("instance field {} used from a static context", name)))?;
            return Ok(Some(Value::get_field(self.reach_field(&field, pos)?, this)));
        }
        for ty in &self.imports().static_types {
            if let Some(field) = self.registry().find_field(ty, name).filter(|f| f.is_static()) {
                return Ok(Some(Value::get_static(self.reach_field(&field, pos)?)));
            }
        }
        Ok(None)
    }

    fn has_callable(&self, name: &str) -> bool {
        self.cx.lookup_inner(name).is_some()
            || !self.registry().find_methods(self.host(), name).is_empty()
            || self
                .imports()
                .static_types
                .iter()
                .any(|t| self.registry().find_methods(t, name).iter().any(|m| m.is_static()))
    }

    /// An assignment to `name` declares a new local.
    fn is_new_local(&self, name: &str) -> bool {
        !name.contains("::")
            && self.cx.lookup(name).is_none()
            && self.registry().find_field(self.host(), name).is_none()
            && !self
                .imports()
                .static_types
                .iter()
                .any(|t| self.registry().find_field(t, name).map_or(false, |f| f.is_static()))
    }

    /// Lower a boolean context with short-circuit structure kept.
    pub fn cond(&mut self, e: &Expr) -> Result<Cond, CompileError> {
        match &e.kind {
            ExprKind::Binary { op: BinOp::And, lhs, rhs } => {
                let l = self.cond(lhs)?;
                let r = self.cond(rhs)?;
                Ok(Cond::And(Box::new(l), Box::new(r)))
            }
            ExprKind::Binary { op: BinOp::Or, lhs, rhs } => {
                let l = self.cond(lhs)?;
                let r = self.cond(rhs)?;
                Ok(Cond::Or(Box::new(l), Box::new(r)))
            }
            ExprKind::Unary { op: UnaryOp::Not, expr } => Ok(Cond::Not(Box::new(self.cond(expr)?))),
            ExprKind::Binary { op, lhs, rhs } if cmp_op(*op).is_some() => self.comparison(*op, lhs, rhs, e.pos),
            _ => {
                let v = self.expr(e, Some(&JvmType::Boolean))?;
                self.truthy(v, e.pos)
            }
        }
    }

    /// Truthiness of an arbitrary value.
    pub fn truthy(&self, v: Value, pos: Pos) -> Result<Cond, CompileError> {
        match &v.ty {
            JvmType::Boolean => Ok(match v.kind {
                ValueKind::Cond(c) => *c,
                _ => Cond::Truthy(v),
            }),
            JvmType::Void => Err(self.err(pos, "expression has no value")),
            JvmType::Null => Ok(Cond::Truthy(Value::bool(false))),
            JvmType::Long | JvmType::Float | JvmType::Double => {
                let zero = super::body::default_value(&v.ty);
                Ok(Cond::Compare {
                    op: CmpOp::Ne,
                    lhs: v,
                    rhs: zero,
                })
            }
            t if t.is_int_like() => Ok(Cond::Truthy(v)),
            t if unbox_type(t) == Some(JvmType::Boolean) => {
                let unboxed = self.coerce(v, &JvmType::Boolean, pos)?;
                Ok(Cond::Truthy(unboxed))
            }
            _ => Ok(Cond::Truthy(runtime_cast(to_object(v), &JvmType::Boolean))),
        }
    }

    fn comparison(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, pos: Pos) -> Result<Cond, CompileError> {
        let l = self.expr(lhs, None)?;
        let r = self.expr(rhs, None)?;
        self.compare_values(op, l, r, pos)
    }

    pub(crate) fn compare_values(&mut self, op: BinOp, l: Value, r: Value, pos: Pos) -> Result<Cond, CompileError> {
        let cmp = cmp_op(op).ok_or_else(|| self.err(pos, format!("{} is not a comparison", op.symbol())))?;
        if l.is_void() || r.is_void() {
            return Err(self.err(pos, "expression has no value"));
        }
        let equality = matches!(op, BinOp::Eq | BinOp::Ne | BinOp::RefEq | BinOp::RefNe);
        let negate = cmp == CmpOp::Ne;

        if equality && (l.ty == JvmType::Null || r.ty == JvmType::Null) {
            let other = if l.ty == JvmType::Null { r } else { l };
            if other.ty.is_primitive() {
                return Ok(Cond::Truthy(Value::bool(negate)));
            }
            return Ok(negate_if(Cond::IsNull(other), negate));
        }

        let (lt, rt) = (arithmetic_type(&l.ty), arithmetic_type(&r.ty));
        let some_primitive = l.ty.is_primitive() || r.ty.is_primitive();
        if let (Some(a), Some(b)) = (&lt, &rt) {
            if some_primitive || !equality {
                if let Some(common) = binary_numeric_type(a, b) {
                    let l = self.coerce(l, &common, pos)?;
                    let r = self.coerce(r, &common, pos)?;
                    return Ok(Cond::Compare { op: cmp, lhs: l, rhs: r });
                }
                if equality && *a == JvmType::Boolean && *b == JvmType::Boolean {
                    let l = self.coerce(l, &JvmType::Boolean, pos)?;
                    let r = self.coerce(r, &JvmType::Boolean, pos)?;
                    return Ok(Cond::Compare { op: cmp, lhs: l, rhs: r });
                }
            }
        }

        if matches!(op, BinOp::RefEq | BinOp::RefNe) {
            return Ok(Cond::Compare {
                op: cmp,
                lhs: to_object(l),
                rhs: to_object(r),
            });
        }
        if equality {
            let equals = Value::invoke_static(
                MethodRef::new(OBJECTS, "equals", vec![JvmType::object(), JvmType::object()], JvmType::Boolean),
                vec![to_object(l), to_object(r)],
            );
            return Ok(negate_if(Cond::Truthy(equals), negate));
        }
        let result = self.operator_call(op, l, r, pos)?;
        self.truthy(result, pos)
    }

    fn binary(&mut self, whole: &Expr, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<Value, CompileError> {
        let pos = whole.pos;
        match op {
            BinOp::And | BinOp::Or => Ok(Value::cond(self.cond(whole)?)),
            _ if cmp_op(op).is_some() => Ok(Value::cond(self.cond(whole)?)),
            BinOp::Range | BinOp::RangeExclusive => {
                let from = self.expr(lhs, Some(&JvmType::Int))?;
                let from = self.coerce(from, &JvmType::Int, lhs.pos)?;
                let to = self.expr(rhs, Some(&JvmType::Int))?;
                let to = self.coerce(to, &JvmType::Int, rhs.pos)?;
                Ok(Value::new_object(
                    RANGE_LIST,
                    vec![JvmType::Int, JvmType::Int, JvmType::Boolean],
                    vec![from, to, Value::bool(op == BinOp::Range)],
                ))
            }
            BinOp::In => {
                let needle = self.expr(lhs, None)?;
                let haystack = self.expr(rhs, None)?;
                if !haystack.ty.is_reference() || haystack.ty == JvmType::Null {
                    return Err(self.err(pos, format!("`in` needs a container, found {}", haystack.ty)));
                }
                let found = self.method_call(haystack, "contains", vec![Arg::Ready(to_object(needle))], pos)?;
                Ok(Value::cond(self.truthy(found, pos)?))
            }
            _ => {
                let l = self.expr(lhs, None)?;
                let r = self.expr(rhs, None)?;
                self.binary_values(op, l, r, pos)
            }
        }
    }

    /// Arithmetic, bitwise, shift, and power operators on evaluated
    /// operands; non-primitive operands dispatch to a method.
    pub fn binary_values(&mut self, op: BinOp, l: Value, r: Value, pos: Pos) -> Result<Value, CompileError> {
        if l.is_void() || r.is_void() {
            return Err(self.err(pos, "expression has no value"));
        }
        if op == BinOp::Add && (l.ty == JvmType::string() || r.ty == JvmType::string()) {
            return Ok(self.concat(l, r));
        }
        let (lt, rt) = (arithmetic_type(&l.ty), arithmetic_type(&r.ty));
        if let (Some(a), Some(b)) = (lt, rt) {
            match op {
                BinOp::Shl | BinOp::Shr | BinOp::Ushr if is_integral(&a) && is_integral(&b) => {
                    let ty = binary_numeric_type(&a, &JvmType::Int).unwrap_or(JvmType::Int);
                    let l = self.coerce(l, &ty, pos)?;
                    let r = self.cast(r, &JvmType::Int, pos)?;
                    return Ok(arith(op, ty, l, r));
                }
                BinOp::BitAnd | BinOp::BitOr | BinOp::Xor if a == JvmType::Boolean && b == JvmType::Boolean => {
                    let l = self.coerce(l, &JvmType::Boolean, pos)?;
                    let r = self.coerce(r, &JvmType::Boolean, pos)?;
                    return Ok(arith(op, JvmType::Boolean, l, r));
                }
                BinOp::BitAnd | BinOp::BitOr | BinOp::Xor if is_integral(&a) && is_integral(&b) => {
                    let ty = binary_numeric_type(&a, &b).unwrap_or(JvmType::Int);
                    let l = self.coerce(l, &ty, pos)?;
                    let r = self.coerce(r, &ty, pos)?;
                    return Ok(arith(op, ty, l, r));
                }
                BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
                    if let Some(ty) = binary_numeric_type(&a, &b) {
                        let l = self.coerce(l, &ty, pos)?;
                        let r = self.coerce(r, &ty, pos)?;
                        return Ok(arith(op, ty, l, r));
                    }
                }
                BinOp::Pow if binary_numeric_type(&a, &b).is_some() => {
                    let l = self.coerce(l, &JvmType::Double, pos)?;
                    let r = self.coerce(r, &JvmType::Double, pos)?;
                    return Ok(Value::invoke_static(
                        MethodRef::new("java/lang/Math", "pow", vec![JvmType::Double, JvmType::Double], JvmType::Double),
                        vec![l, r],
                    ));
                }
                _ => {}
            }
            if l.ty.is_primitive() && r.ty.is_primitive() {
                return Err(self.err(
                    pos,
                    format!("operator {} cannot be applied to {} and {}", op.symbol(), l.ty, r.ty),
                ));
            }
        }
        if arith_op(op).is_none() && op != BinOp::Pow {
            return Err(self.err(pos, format!("operator {} cannot be used here", op.symbol())));
        }
        self.operator_call(op, l, r, pos)
    }

    /// `l.method(r)` for an operator on objects.
    fn operator_call(&mut self, op: BinOp, l: Value, r: Value, pos: Pos) -> Result<Value, CompileError> {
        if l.ty == JvmType::Null {
            return Err(self.err(pos, format!("operator {} applied to null", op.symbol())));
        }
        if l.ty.is_primitive() && r.ty.is_primitive() {
            return Err(self.err(
                pos,
                format!("operator {} cannot be applied to {} and {}", op.symbol(), l.ty, r.ty),
            ));
        }
        self.method_call(to_object(l), operator_method(op), vec![Arg::Ready(r)], pos)
    }

    /// String concatenation through `StringBuilder`.
    fn concat(&self, l: Value, r: Value) -> Value {
        let builder = Value::new_object(STRING_BUILDER, vec![], vec![]);
        let builder = append(append(builder, l), r);
        Value::invoke(
            InvokeKind::Virtual,
            MethodRef::new(STRING_BUILDER, "toString", vec![], JvmType::string()),
            Some(builder),
            vec![],
        )
    }

    fn unary(&mut self, whole: &Expr, op: UnaryOp, operand: &Expr) -> Result<Value, CompileError> {
        let pos = whole.pos;
        if op == UnaryOp::Not {
            return Ok(Value::cond(self.cond(whole)?));
        }
        let v = self.expr(operand, None)?;
        if v.is_void() {
            return Err(self.err(pos, "expression has no value"));
        }
        let numeric = arithmetic_type(&v.ty).and_then(|t| binary_numeric_type(&t, &JvmType::Int));
        match (op, numeric) {
            (UnaryOp::Plus, Some(ty)) => self.coerce(v, &ty, pos),
            (UnaryOp::Neg, Some(ty)) => {
                let v = self.coerce(v, &ty, pos)?;
                Ok(Value::new(ty, ValueKind::Neg(Box::new(v))))
            }
            (UnaryOp::BitNot, Some(ty)) if ty == JvmType::Int || ty == JvmType::Long => {
                let v = self.coerce(v, &ty, pos)?;
                let ones = if ty == JvmType::Long { Value::long(-1) } else { Value::int(-1) };
                Ok(arith(BinOp::Xor, ty, v, ones))
            }
            (UnaryOp::Plus, None) if v.ty.is_reference() => Ok(v),
            (UnaryOp::Neg, None) if v.ty.is_reference() && v.ty != JvmType::Null => {
                self.method_call(v, "negate", Vec::new(), pos)
            }
            (UnaryOp::BitNot, None) if v.ty.is_reference() && v.ty != JvmType::Null => {
                self.method_call(v, "not", Vec::new(), pos)
            }
            _ => Err(self.err(pos, format!("unary operator cannot be applied to {}", v.ty))),
        }
    }

    fn list_literal(&mut self, items: &[Expr], expected: Option<&JvmType>, pos: Pos) -> Result<Value, CompileError> {
        if let Some(JvmType::Array(elem)) = expected {
            let array_ty = JvmType::Array(elem.clone());
            let slot = self.temp(&array_ty);
            let mut ins = vec![Ins::Store {
                slot,
                value: Value::new(
                    array_ty.clone(),
                    ValueKind::NewArray {
                        elem: (**elem).clone(),
                        len: Box::new(Value::int(items.len() as i32)),
                    },
                ),
            }];
            for (i, item) in items.iter().enumerate() {
                let v = self.expr(item, Some(elem))?;
                let v = self.coerce(v, elem, item.pos)?;
                ins.push(Ins::ArrayStore {
                    array: Value::local(slot, array_ty.clone()),
                    index: Value::int(i as i32),
                    value: v,
                });
            }
            return Ok(Value::pack(ins, Value::local(slot, array_ty)));
        }
        let list_ty = JvmType::reference(ARRAY_LIST);
        let slot = self.temp(&list_ty);
        let mut ins = vec![Ins::Store {
            slot,
            value: Value::new_object(ARRAY_LIST, vec![], vec![]),
        }];
        for item in items {
            let v = self.expr(item, None)?;
            if v.is_void() {
                return Err(self.err(pos, "list element has no value"));
            }
            ins.push(Ins::Eval(Value::invoke(
                InvokeKind::Virtual,
                MethodRef::new(ARRAY_LIST, "add", vec![JvmType::object()], JvmType::Boolean),
                Some(Value::local(slot, list_ty.clone())),
                vec![to_object(v)],
            )));
        }
        Ok(Value::pack(ins, Value::local(slot, list_ty)))
    }

    fn map_literal(&mut self, pairs: &[(Expr, Expr)]) -> Result<Value, CompileError> {
        let map_ty = JvmType::reference(LINKED_HASH_MAP);
        let slot = self.temp(&map_ty);
        let mut ins = vec![Ins::Store {
            slot,
            value: Value::new_object(LINKED_HASH_MAP, vec![], vec![]),
        }];
        for (key, value) in pairs {
            let k = self.expr(key, None)?;
            let v = self.expr(value, None)?;
            if k.is_void() || v.is_void() {
                return Err(self.err(key.pos, "map entry has no value"));
            }
            ins.push(Ins::Eval(Value::invoke(
                InvokeKind::Virtual,
                MethodRef::new(
                    LINKED_HASH_MAP,
                    "put",
                    vec![JvmType::object(), JvmType::object()],
                    JvmType::object(),
                ),
                Some(Value::local(slot, map_ty.clone())),
                vec![to_object(k), to_object(v)],
            )));
        }
        Ok(Value::pack(ins, Value::local(slot, map_ty)))
    }

    pub fn assign_stmt(&mut self, target: &Expr, op: Option<BinOp>, value: &Expr, pos: Pos) -> Result<(), CompileError> {
        if let (None, ExprKind::Name(name)) = (op, &target.kind) {
            if self.is_new_local(name) {
                let (local, v) = self.new_local(name, value, pos)?;
                let store = self.write_local(&local, v);
                self.cx.emit(store);
                return Ok(());
            }
        }
        let (prep, place) = self.place(target, op.is_some())?;
        self.cx.ins.extend(prep);
        let v = self.assigned_value(&place, op, value, pos)?;
        let store = self.write_place(&place, v, target)?;
        self.cx.ins.extend(store);
        Ok(())
    }

    fn new_local(&mut self, name: &str, value: &Expr, pos: Pos) -> Result<(Local, Value), CompileError> {
        let v = self.expr(value, None)?;
        let ty = local_type(&v.ty).ok_or_else(|| self.err(pos, "expression has no value"))?;
        let v = self.coerce(v, &ty, pos)?;
        let local = self.declare(name, ty, true, pos)?;
        Ok((local, v))
    }

    fn assign_value(&mut self, target: &Expr, op: Option<BinOp>, value: &Expr, pos: Pos) -> Result<Value, CompileError> {
        if let (None, ExprKind::Name(name)) = (op, &target.kind) {
            if self.is_new_local(name) {
                let (local, v) = self.new_local(name, value, pos)?;
                let store = self.write_local(&local, v);
                return Ok(Value::pack(vec![store], self.read_local(&local)));
            }
        }
        let (mut ins, place) = self.place(target, op.is_some())?;
        let v = self.assigned_value(&place, op, value, pos)?;
        let ty = place.ty();
        let slot = self.temp(&ty);
        ins.push(Ins::Store { slot, value: v });
        ins.extend(self.write_place(&place, Value::local(slot, ty.clone()), target)?);
        Ok(Value::pack(ins, Value::local(slot, ty)))
    }

    fn incdec_value(&mut self, target: &Expr, delta: i32, prefix: bool, pos: Pos) -> Result<Value, CompileError> {
        let (mut ins, place) = self.place(target, true)?;
        let ty = place.ty();
        let slot = self.temp(&ty);
        let current = self.read_place(&place, pos)?;
        if prefix {
            let next = self.binary_values(BinOp::Add, current, Value::int(delta), pos)?;
            let next = self.cast(next, &ty, pos)?;
            ins.push(Ins::Store { slot, value: next });
            ins.extend(self.write_place(&place, Value::local(slot, ty.clone()), target)?);
        } else {
            ins.push(Ins::Store { slot, value: current });
            let next = self.binary_values(BinOp::Add, Value::local(slot, ty.clone()), Value::int(delta), pos)?;
            let next = self.cast(next, &ty, pos)?;
            ins.extend(self.write_place(&place, next, target)?);
        }
        Ok(Value::pack(ins, Value::local(slot, ty)))
    }

    /// The value stored by `place = value` or `place op= value`; compound
    /// assignment narrows back implicitly.
    fn assigned_value(&mut self, place: &Place, op: Option<BinOp>, value: &Expr, pos: Pos) -> Result<Value, CompileError> {
        let ty = place.ty();
        match op {
            None => {
                let v = self.expr(value, Some(&ty))?;
                self.coerce(v, &ty, pos)
            }
            Some(op) => {
                let current = self.read_place(place, pos)?;
                let rhs = self.expr(value, None)?;
                let combined = self.binary_values(op, current, rhs, pos)?;
                self.cast(combined, &ty, pos)
            }
        }
    }

    /// Resolve an assignment target. With `stable`, sub-expressions are
    /// evaluated once into temporaries so the place can be read and written.
    pub fn place(&mut self, target: &Expr, stable: bool) -> Result<(Vec<Ins>, Place), CompileError> {
        let pos = target.pos;
        match &target.kind {
            ExprKind::Name(name) => self.name_place(name, pos).map(|p| (Vec::new(), p)),
            ExprKind::Access { target: owner, name } => {
                if let Some(ty) = self.type_target(owner) {
                    let field = self
                        .registry()
                        .find_field(&ty, name)
                        .filter(|f| f.is_static())
                        .ok_or_else(|| self.err(pos, format!("no static field {} on {}", name, ty.replace('/', "::"))))?;
                    self.check_final(&field, pos)?;
                    return Ok((Vec::new(), Place::Static(self.reach_field(&field, pos)?)));
                }
                let mut prep = Vec::new();
                let recv = self.expr(owner, None)?;
                let recv = self.stash(recv, stable, &mut prep);
                let place = self.member_place(recv, name, pos)?;
                Ok((prep, place))
            }
            ExprKind::Index { target: owner, index } => self.place_of_index(owner, index, stable),
            _ => Err(self.err(pos, "cannot assign to this expression")),
        }
    }

    fn place_of_index(&mut self, owner: &Expr, index: &Expr, stable: bool) -> Result<(Vec<Ins>, Place), CompileError> {
        let mut prep = Vec::new();
        let recv = self.expr(owner, None)?;
        let recv = self.stash(recv, stable, &mut prep);
        let key = self.expr(index, None)?;
        let key = self.stash(key, stable, &mut prep);
        let place = self.index_place(recv, key, index.pos)?;
        Ok((prep, place))
    }

    fn name_place(&mut self, name: &str, pos: Pos) -> Result<Place, CompileError> {
        if let Some(local) = self.cx.lookup(name).cloned() {
            if !local.mutable {
                return Err(self.err(pos, format!("cannot reassign val {}", name)));
            }
            return Ok(Place::Local(local));
        }
        if let Some(field) = self.registry().find_field(self.host(), name) {
            self.check_final(&field, pos)?;
            if field.is_static() {
                return Ok(Place::Static(self.reach_field(&field, pos)?));
            }
            let this = self
                .host_this
                .clone()
                .ok_or_else(|| self.err(pos, format!("instance field {} used from a static context", name)))?;
            return Ok(Place::Field {
                field: self.reach_field(&field, pos)?,
                target: this,
            });
        }
        for ty in &self.imports().static_types {
            if let Some(field) = self.registry().find_field(ty, name).filter(|f| f.is_static()) {
                self.check_final(&field, pos)?;
                return Ok(Place::Static(self.reach_field(&field, pos)?));
            }
        }
        Err(self.err(pos, format!("cannot resolve {}", name)))
    }

    /// `val` fields are written only by their own class's initializers.
    pub fn check_final(&self, field: &super::types::FieldSig, pos: Pos) -> Result<(), CompileError> {
        use crate::field_info::FieldAccessFlags;
        if !field.access.contains(FieldAccessFlags::FINAL) {
            return Ok(());
        }
        let own = field.owner == self.host() && self.class == self.host();
        let initializing = if field.is_static() { self.in_static_init } else { self.in_ctor };
        if own && initializing {
            Ok(())
        } else {
            Err(self.err(pos, format!("cannot assign to val field {}", field.name)))
        }
    }

    /// Spill a value to a temporary when it must be evaluated only once.
    fn stash(&mut self, v: Value, stable: bool, prep: &mut Vec<Ins>) -> Value {
        if !stable || matches!(v.kind, ValueKind::Local(_) | ValueKind::Const(_)) {
            return v;
        }
        let ty = local_type(&v.ty).unwrap_or_else(JvmType::object);
        let slot = self.temp(&ty);
        prep.push(Ins::Store { slot, value: v });
        Value::local(slot, ty)
    }
}

fn arith(op: BinOp, ty: JvmType, lhs: Value, rhs: Value) -> Value {
    Value::new(
        ty,
        ValueKind::Arith {
            op: arith_op(op).unwrap_or(ArithOp::Add),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    )
}

/// `builder.append(v)` with the overload matching `v`'s stack kind.
pub(crate) fn append(builder: Value, v: Value) -> Value {
    let param = match &v.ty {
        JvmType::Boolean => JvmType::Boolean,
        JvmType::Char => JvmType::Char,
        JvmType::Byte | JvmType::Short | JvmType::Int => JvmType::Int,
        JvmType::Long => JvmType::Long,
        JvmType::Float => JvmType::Float,
        JvmType::Double => JvmType::Double,
        JvmType::Reference(name) if name == STRING => JvmType::string(),
        _ => JvmType::object(),
    };
    Value::invoke(
        InvokeKind::Virtual,
        MethodRef::new(STRING_BUILDER, "append", vec![param], JvmType::reference(STRING_BUILDER)),
        Some(builder),
        vec![v],
    )
}

#[cfg(test)]
mod tests {
    use crate::compile::semantic::tests::analyze;
    use crate::compile::semantic::{ArithOp, ClassOutput, Ins, MethodBody, ValueKind};
    use crate::descriptor::JvmType;

    fn body<'a>(out: &'a [ClassOutput], method: &str) -> &'a MethodBody {
        out[0].method(method).and_then(|m| m.body.as_ref()).unwrap()
    }

    fn returned(b: &MethodBody) -> &crate::compile::semantic::Value {
        b.ins
            .iter()
            .find_map(|i| match i {
                Ins::Return(Some(v)) => Some(v),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn mixed_arithmetic_promotes() {
        let out = analyze("class A\n    m(a:int, b:long):long = a + b\n").unwrap();
        let v = returned(body(&out, "m"));
        assert_eq!(v.ty, JvmType::Long);
        let ValueKind::Arith { op, lhs, .. } = &v.kind else {
            panic!("expected arithmetic, got {:?}", v);
        };
        assert_eq!(*op, ArithOp::Add);
        assert!(matches!(lhs.kind, ValueKind::Convert(_)));
    }

    #[test]
    fn each_operator_family_takes_its_own_type() {
        let src = concat!(
            "class A\n",
            "    shift(a:long, n:int):long = a << n\n",
            "    both(a:boolean, b:boolean):boolean = a & b\n",
            "    mask(a:int, b:long):long = a | b\n",
            "    power(a:int, b:int):double = a ^^ b\n",
        );
        let out = analyze(src).unwrap();
        assert_eq!(returned(body(&out, "shift")).ty, JvmType::Long);
        assert_eq!(returned(body(&out, "both")).ty, JvmType::Boolean);
        assert_eq!(returned(body(&out, "mask")).ty, JvmType::Long);
        let power = format!("{:?}", returned(body(&out, "power")));
        assert!(power.contains("\"pow\""), "{}", power);
        let err = analyze("class A\n    m(a:boolean, b:int):int = a - b\n").unwrap_err();
        assert!(err.message().contains("cannot be applied to bool and int"), "{}", err.message());
    }

    #[test]
    fn string_plus_uses_a_builder() {
        let out = analyze("class A\n    m(n:int):String = \"n=\" + n\n").unwrap();
        let text = format!("{:?}", returned(body(&out, "m")));
        assert!(text.contains("java/lang/StringBuilder"));
        assert!(text.contains("append"));
    }

    #[test]
    fn object_operands_dispatch_by_name() {
        let out = analyze("class A\n    m(a, b) = a - b\n").unwrap();
        let text = format!("{:?}", returned(body(&out, "m")));
        assert!(text.contains("\"subtract\""), "{}", text);
        assert!(text.contains("Dynamic {"));
    }

    #[test]
    fn locals_take_their_initializer_type() {
        let out = analyze("class A\n    m():double\n        x = 1\n        y = x * 2.5\n        return y\n").unwrap();
        let v = returned(body(&out, "m"));
        assert_eq!(v.ty, JvmType::Double);
    }

    #[test]
    fn val_locals_cannot_be_reassigned() {
        let err = analyze("class A\n    m():Unit\n        val x = 1\n        x = 2\n").unwrap_err();
        assert!(err.message().contains("cannot reassign val x"));
    }

    #[test]
    fn narrowing_needs_a_cast() {
        let err = analyze("class A\n    m(x:long):int = x\n").unwrap_err();
        assert!(err.message().contains("without `as`"));
        assert!(analyze("class A\n    m(x:long):int = x as int\n").is_ok());
    }
}
