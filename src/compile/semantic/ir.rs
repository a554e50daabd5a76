//! Typed instruction graph handed from semantic analysis to code generation.
//!
//! Values are trees that leave exactly one result on the operand stack (none
//! for `void` invocations); instructions are flat and reference branch targets
//! by [`Label`] rather than by offset.

use crate::descriptor::{method_descriptor, JvmType};
use crate::field_info::FieldAccessFlags;
use crate::method_info::MethodAccessFlags;
use crate::types::ClassAccessFlags;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Label(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvokeKind {
    Static,
    Virtual,
    Interface,
    Special,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub params: Vec<JvmType>,
    pub ret: JvmType,
}

impl MethodRef {
    pub fn new(owner: &str, name: &str, params: Vec<JvmType>, ret: JvmType) -> Self {
        MethodRef {
            owner: owner.to_string(),
            name: name.to_string(),
            params,
            ret,
        }
    }

    pub fn descriptor(&self) -> String {
        method_descriptor(&self.params, &self.ret)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldRef {
    pub owner: String,
    pub name: String,
    pub ty: JvmType,
}

impl FieldRef {
    pub fn new(owner: &str, name: &str, ty: JvmType) -> Self {
        FieldRef {
            owner: owner.to_string(),
            name: name.to_string(),
            ty,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Const {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Null,
    /// Class literal; primitives load the wrapper's `TYPE` field.
    Class(JvmType),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl CmpOp {
    pub fn negate(self) -> CmpOp {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Ge => CmpOp::Lt,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Le => CmpOp::Gt,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    pub ty: JvmType,
    pub kind: ValueKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueKind {
    Const(Const),
    Local(u16),
    GetField {
        field: FieldRef,
        target: Box<Value>,
    },
    GetStatic(FieldRef),
    Invoke {
        kind: InvokeKind,
        method: MethodRef,
        target: Option<Box<Value>>,
        args: Vec<Value>,
    },
    /// Call selected at run time by the dispatch helper; arguments are
    /// already boxed.
    Dynamic {
        caller: String,
        target: Option<Box<Value>>,
        name: String,
        args: Vec<Value>,
    },
    New {
        class: String,
        ctor: Vec<JvmType>,
        args: Vec<Value>,
    },
    NewArray {
        elem: JvmType,
        len: Box<Value>,
    },
    ArrayLength(Box<Value>),
    ArrayLoad {
        array: Box<Value>,
        index: Box<Value>,
    },
    /// `checkcast` to the value's own type.
    CheckCast(Box<Value>),
    /// Primitive conversion from the inner value's type to this one.
    Convert(Box<Value>),
    InstanceOf {
        value: Box<Value>,
        class: JvmType,
    },
    /// Both operands already share the result type, except shift counts
    /// which are `int`.
    Arith {
        op: ArithOp,
        lhs: Box<Value>,
        rhs: Box<Value>,
    },
    Neg(Box<Value>),
    /// Materialize a condition as `0` / `1`.
    Cond(Box<Cond>),
    /// Run side effects, then produce `result`.
    Pack {
        ins: Vec<Ins>,
        result: Box<Value>,
    },
}

impl Value {
    pub fn new(ty: JvmType, kind: ValueKind) -> Self {
        Value { ty, kind }
    }

    pub fn int(v: i32) -> Self {
        Value::new(JvmType::Int, ValueKind::Const(Const::Int(v)))
    }

    pub fn long(v: i64) -> Self {
        Value::new(JvmType::Long, ValueKind::Const(Const::Long(v)))
    }

    pub fn float(v: f32) -> Self {
        Value::new(JvmType::Float, ValueKind::Const(Const::Float(v)))
    }

    pub fn double(v: f64) -> Self {
        Value::new(JvmType::Double, ValueKind::Const(Const::Double(v)))
    }

    pub fn bool(v: bool) -> Self {
        Value::new(JvmType::Boolean, ValueKind::Const(Const::Int(i32::from(v))))
    }

    pub fn str(s: &str) -> Self {
        Value::new(JvmType::string(), ValueKind::Const(Const::Str(s.to_string())))
    }

    pub fn null() -> Self {
        Value::new(JvmType::Null, ValueKind::Const(Const::Null))
    }

    pub fn class_literal(ty: JvmType) -> Self {
        Value::new(JvmType::reference("java/lang/Class"), ValueKind::Const(Const::Class(ty)))
    }

    pub fn local(slot: u16, ty: JvmType) -> Self {
        Value::new(ty, ValueKind::Local(slot))
    }

    pub fn get_field(field: FieldRef, target: Value) -> Self {
        Value::new(
            field.ty.clone(),
            ValueKind::GetField {
                field,
                target: Box::new(target),
            },
        )
    }

    pub fn get_static(field: FieldRef) -> Self {
        Value::new(field.ty.clone(), ValueKind::GetStatic(field))
    }

    pub fn invoke(kind: InvokeKind, method: MethodRef, target: Option<Value>, args: Vec<Value>) -> Self {
        Value::new(
            method.ret.clone(),
            ValueKind::Invoke {
                kind,
                method,
                target: target.map(Box::new),
                args,
            },
        )
    }

    pub fn invoke_static(method: MethodRef, args: Vec<Value>) -> Self {
        Value::invoke(InvokeKind::Static, method, None, args)
    }

    pub fn new_object(class: &str, ctor: Vec<JvmType>, args: Vec<Value>) -> Self {
        Value::new(
            JvmType::reference(class),
            ValueKind::New {
                class: class.to_string(),
                ctor,
                args,
            },
        )
    }

    pub fn cond(cond: Cond) -> Self {
        Value::new(JvmType::Boolean, ValueKind::Cond(Box::new(cond)))
    }

    pub fn pack(ins: Vec<Ins>, result: Value) -> Self {
        Value::new(
            result.ty.clone(),
            ValueKind::Pack {
                ins,
                result: Box::new(result),
            },
        )
    }

    pub fn is_void(&self) -> bool {
        self.ty == JvmType::Void
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Cond {
    /// An int-like value, true when non-zero.
    Truthy(Value),
    Not(Box<Cond>),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
    /// Operands share one stack kind; references only take `Eq` / `Ne`.
    Compare {
        op: CmpOp,
        lhs: Value,
        rhs: Value,
    },
    IsNull(Value),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Ins {
    /// Evaluate and discard.
    Eval(Value),
    Store {
        slot: u16,
        value: Value,
    },
    PutField {
        field: FieldRef,
        target: Value,
        value: Value,
    },
    PutStatic {
        field: FieldRef,
        value: Value,
    },
    ArrayStore {
        array: Value,
        index: Value,
        value: Value,
    },
    Label(Label),
    Goto(Label),
    /// Jump to `target` when `cond` evaluates to `when`.
    Branch {
        cond: Cond,
        target: Label,
        when: bool,
    },
    /// Exception handler entry; the caught throwable is stored into `slot`.
    Catch {
        label: Label,
        slot: u16,
    },
    Return(Option<Value>),
    Throw(Value),
    MonitorEnter(Value),
    MonitorExit(Value),
}

impl Ins {
    /// Control never falls through to the next instruction.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Ins::Goto(_) | Ins::Return(_) | Ins::Throw(_))
    }
}

/// Protected range `[start, end)` with its handler; `None` catches anything.
#[derive(Clone, Debug, PartialEq)]
pub struct ExceptionRange {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    pub catch_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MethodBody {
    pub ins: Vec<Ins>,
    pub exceptions: Vec<ExceptionRange>,
    pub max_locals: u16,
    pub labels: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElementVal {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Char(u16),
    Byte(i8),
    Short(i16),
    Str(String),
    Class(JvmType),
    Enum { ty: String, name: String },
    Annotation(AnnotationValue),
    Array(Vec<ElementVal>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationValue {
    /// Internal name of the annotation type.
    pub ty: String,
    pub values: Vec<(String, ElementVal)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldOutput {
    pub name: String,
    pub ty: JvmType,
    pub access: FieldAccessFlags,
    pub annotations: Vec<AnnotationValue>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodOutput {
    pub name: String,
    pub params: Vec<JvmType>,
    pub ret: JvmType,
    pub access: MethodAccessFlags,
    /// `None` for abstract and annotation-element methods.
    pub body: Option<MethodBody>,
    pub annotations: Vec<AnnotationValue>,
    pub param_annotations: Vec<Vec<AnnotationValue>>,
    pub annotation_default: Option<ElementVal>,
}

impl MethodOutput {
    pub fn descriptor(&self) -> String {
        method_descriptor(&self.params, &self.ret)
    }
}

/// One class ready for emission.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassOutput {
    pub name: String,
    pub access: ClassAccessFlags,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldOutput>,
    pub methods: Vec<MethodOutput>,
    pub annotations: Vec<AnnotationValue>,
    pub source_file: Option<String>,
}

impl ClassOutput {
    pub fn method(&self, name: &str) -> Option<&MethodOutput> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldOutput> {
        self.fields.iter().find(|f| f.name == name)
    }
}
