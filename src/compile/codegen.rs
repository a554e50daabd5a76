//! Bytecode generation: lowers a [`MethodBody`] to JVM instructions.
//!
//! Branches are emitted with a zero placeholder and recorded as patches;
//! once every instruction is in place the patch pass converts label
//! positions into relative byte offsets.

use std::collections::HashMap;

use tracing::trace;

use crate::attribute_info::ExceptionEntry;
use crate::code_attribute::Instruction;
use crate::constant_info::ConstantPool;
use crate::descriptor::{newarray_code, JvmType, OBJECT};

use super::semantic::convert::box_type;
use super::semantic::ir::{
    ArithOp, CmpOp, Cond, Const, FieldRef, Ins, InvokeKind, MethodBody, MethodRef, Value, ValueKind,
};
use super::stack_calc;
use super::util::{code_length, compute_byte_addresses};
use super::CompileError;

/// Runtime entry point for calls resolved by name at run time.
pub const DYNAMIC: &str = "mocha/lang/Dynamic";
const DYNAMIC_INVOKE: &str = "(Ljava/lang/Class;Ljava/lang/Object;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/Object;";

#[derive(Debug)]
pub struct GeneratedCode {
    pub instructions: Vec<Instruction>,
    pub max_stack: u16,
    pub max_locals: u16,
    pub exception_table: Vec<ExceptionEntry>,
}

/// Generate code for one method body, interning constants into `pool`.
pub fn generate(body: &MethodBody, pool: &mut ConstantPool) -> Result<GeneratedCode, CompileError> {
    let mut gen = CodeGenerator::new(pool, body.labels);
    for ins in &body.ins {
        gen.gen_ins(ins)?;
    }
    gen.finish(body)
}

/// Operand stack category of a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Int,
    Long,
    Float,
    Double,
    Ref,
    Void,
}

fn kind(ty: &JvmType) -> Kind {
    match ty {
        JvmType::Long => Kind::Long,
        JvmType::Float => Kind::Float,
        JvmType::Double => Kind::Double,
        JvmType::Void => Kind::Void,
        t if t.is_int_like() => Kind::Int,
        _ => Kind::Ref,
    }
}

struct CodeGenerator<'p> {
    pool: &'p mut ConstantPool,
    instructions: Vec<Instruction>,
    /// Instruction index each label is bound to.
    labels: Vec<Option<usize>>,
    /// (instruction index, label) pairs awaiting offsets.
    patches: Vec<(usize, usize)>,
    /// Stack effects that depend on a descriptor, by instruction index.
    effects: HashMap<usize, i32>,
}

impl<'p> CodeGenerator<'p> {
    fn new(pool: &'p mut ConstantPool, labels: usize) -> Self {
        CodeGenerator {
            pool,
            instructions: Vec::new(),
            labels: vec![None; labels],
            patches: Vec::new(),
            effects: HashMap::new(),
        }
    }

    fn emit(&mut self, instr: Instruction) -> usize {
        self.instructions.push(instr);
        self.instructions.len() - 1
    }

    fn emit_with_effect(&mut self, instr: Instruction, effect: i32) {
        let idx = self.emit(instr);
        self.effects.insert(idx, effect);
    }

    fn new_label(&mut self) -> usize {
        self.labels.push(None);
        self.labels.len() - 1
    }

    fn bind(&mut self, label: usize) -> Result<(), CompileError> {
        let slot = self
            .labels
            .get_mut(label)
            .ok_or_else(|| CompileError::encoding(format!("label {} out of range", label)))?;
        if slot.is_some() {
            return Err(CompileError::encoding(format!("label {} bound twice", label)));
        }
        *slot = Some(self.instructions.len());
        Ok(())
    }

    fn emit_branch(&mut self, instr_fn: fn(i16) -> Instruction, label: usize) {
        let idx = self.emit(instr_fn(0));
        self.patches.push((idx, label));
    }

    fn label_index(&self, label: usize) -> Result<usize, CompileError> {
        self.labels
            .get(label)
            .copied()
            .flatten()
            .ok_or_else(|| CompileError::encoding(format!("label {} never bound", label)))
    }

    // ---- constants -------------------------------------------------------

    fn emit_int_const(&mut self, value: i32) {
        let instr = match value {
            -1 => Instruction::Iconstm1,
            0 => Instruction::Iconst0,
            1 => Instruction::Iconst1,
            2 => Instruction::Iconst2,
            3 => Instruction::Iconst3,
            4 => Instruction::Iconst4,
            5 => Instruction::Iconst5,
            v if i8::try_from(v).is_ok() => Instruction::Bipush(v as i8),
            v if i16::try_from(v).is_ok() => Instruction::Sipush(v as i16),
            v => {
                let idx = self.pool.integer(v);
                self.ldc_instr(idx)
            }
        };
        self.emit(instr);
    }

    fn emit_long_const(&mut self, value: i64) {
        let instr = match value {
            0 => Instruction::Lconst0,
            1 => Instruction::Lconst1,
            v => Instruction::Ldc2W(self.pool.long(v)),
        };
        self.emit(instr);
    }

    fn emit_float_const(&mut self, value: f32) {
        let instr = if value.to_bits() == 0.0f32.to_bits() {
            Instruction::Fconst0
        } else if value == 1.0 {
            Instruction::Fconst1
        } else if value == 2.0 {
            Instruction::Fconst2
        } else {
            let idx = self.pool.float(value);
            self.ldc_instr(idx)
        };
        self.emit(instr);
    }

    fn emit_double_const(&mut self, value: f64) {
        let instr = if value.to_bits() == 0.0f64.to_bits() {
            Instruction::Dconst0
        } else if value == 1.0 {
            Instruction::Dconst1
        } else {
            Instruction::Ldc2W(self.pool.double(value))
        };
        self.emit(instr);
    }

    fn ldc_instr(&self, idx: u16) -> Instruction {
        match u8::try_from(idx) {
            Ok(short) => Instruction::Ldc(short),
            Err(_) => Instruction::LdcW(idx),
        }
    }

    fn emit_ldc(&mut self, idx: u16) {
        let instr = self.ldc_instr(idx);
        self.emit(instr);
    }

    fn emit_class_const(&mut self, name: &str) {
        let idx = self.pool.class(name);
        self.emit_ldc(idx);
    }

    fn gen_const(&mut self, c: &Const, ty: &JvmType) -> Result<(), CompileError> {
        match c {
            Const::Int(v) => match kind(ty) {
                Kind::Long => self.emit_long_const(i64::from(*v)),
                Kind::Float => self.emit_float_const(*v as f32),
                Kind::Double => self.emit_double_const(f64::from(*v)),
                _ => self.emit_int_const(*v),
            },
            Const::Long(v) => self.emit_long_const(*v),
            Const::Float(v) => self.emit_float_const(*v),
            Const::Double(v) => self.emit_double_const(*v),
            Const::Str(s) => {
                let idx = self.pool.string(s);
                self.emit_ldc(idx);
            }
            Const::Null => {
                self.emit(Instruction::Aconstnull);
            }
            Const::Class(t) => {
                let wrapper = match t {
                    JvmType::Void => Some("java/lang/Void"),
                    t => box_type(t),
                };
                match (wrapper, t.class_constant_name()) {
                    (Some(wrapper), _) => {
                        let idx = self.pool.field_ref(wrapper, "TYPE", "Ljava/lang/Class;");
                        self.emit_with_effect(Instruction::Getstatic(idx), 1);
                    }
                    (None, Some(name)) => self.emit_class_const(&name),
                    (None, None) => return Err(CompileError::encoding(format!("no class literal for {}", t))),
                }
            }
        }
        Ok(())
    }

    // ---- locals ----------------------------------------------------------

    fn emit_load(&mut self, ty: &JvmType, slot: u16) -> Result<(), CompileError> {
        use Instruction::*;
        let instr = match (kind(ty), slot) {
            (Kind::Int, 0) => Iload0,
            (Kind::Int, 1) => Iload1,
            (Kind::Int, 2) => Iload2,
            (Kind::Int, 3) => Iload3,
            (Kind::Long, 0) => Lload0,
            (Kind::Long, 1) => Lload1,
            (Kind::Long, 2) => Lload2,
            (Kind::Long, 3) => Lload3,
            (Kind::Float, 0) => Fload0,
            (Kind::Float, 1) => Fload1,
            (Kind::Float, 2) => Fload2,
            (Kind::Float, 3) => Fload3,
            (Kind::Double, 0) => Dload0,
            (Kind::Double, 1) => Dload1,
            (Kind::Double, 2) => Dload2,
            (Kind::Double, 3) => Dload3,
            (Kind::Ref, 0) => Aload0,
            (Kind::Ref, 1) => Aload1,
            (Kind::Ref, 2) => Aload2,
            (Kind::Ref, 3) => Aload3,
            (k, s) if s <= 255 => match k {
                Kind::Int => Iload(s as u8),
                Kind::Long => Lload(s as u8),
                Kind::Float => Fload(s as u8),
                Kind::Double => Dload(s as u8),
                Kind::Ref => Aload(s as u8),
                Kind::Void => return Err(CompileError::encoding("load of a void local")),
            },
            (k, s) => match k {
                Kind::Int => IloadWide(s),
                Kind::Long => LloadWide(s),
                Kind::Float => FloadWide(s),
                Kind::Double => DloadWide(s),
                Kind::Ref => AloadWide(s),
                Kind::Void => return Err(CompileError::encoding("load of a void local")),
            },
        };
        self.emit(instr);
        Ok(())
    }

    fn emit_store(&mut self, ty: &JvmType, slot: u16) -> Result<(), CompileError> {
        use Instruction::*;
        let instr = match (kind(ty), slot) {
            (Kind::Int, 0) => Istore0,
            (Kind::Int, 1) => Istore1,
            (Kind::Int, 2) => Istore2,
            (Kind::Int, 3) => Istore3,
            (Kind::Long, 0) => Lstore0,
            (Kind::Long, 1) => Lstore1,
            (Kind::Long, 2) => Lstore2,
            (Kind::Long, 3) => Lstore3,
            (Kind::Float, 0) => Fstore0,
            (Kind::Float, 1) => Fstore1,
            (Kind::Float, 2) => Fstore2,
            (Kind::Float, 3) => Fstore3,
            (Kind::Double, 0) => Dstore0,
            (Kind::Double, 1) => Dstore1,
            (Kind::Double, 2) => Dstore2,
            (Kind::Double, 3) => Dstore3,
            (Kind::Ref, 0) => Astore0,
            (Kind::Ref, 1) => Astore1,
            (Kind::Ref, 2) => Astore2,
            (Kind::Ref, 3) => Astore3,
            (k, s) if s <= 255 => match k {
                Kind::Int => Istore(s as u8),
                Kind::Long => Lstore(s as u8),
                Kind::Float => Fstore(s as u8),
                Kind::Double => Dstore(s as u8),
                Kind::Ref => Astore(s as u8),
                Kind::Void => return Err(CompileError::encoding("store of a void value")),
            },
            (k, s) => match k {
                Kind::Int => IstoreWide(s),
                Kind::Long => LstoreWide(s),
                Kind::Float => FstoreWide(s),
                Kind::Double => DstoreWide(s),
                Kind::Ref => AstoreWide(s),
                Kind::Void => return Err(CompileError::encoding("store of a void value")),
            },
        };
        self.emit(instr);
        Ok(())
    }

    // ---- members ---------------------------------------------------------

    fn emit_field(&mut self, field: &FieldRef, make: fn(u16) -> Instruction, effect: i32) {
        let idx = self.pool.field_ref(&field.owner, &field.name, &field.ty.to_descriptor());
        self.emit_with_effect(make(idx), effect);
    }

    fn emit_invoke(&mut self, invoke: InvokeKind, method: &MethodRef) -> Result<(), CompileError> {
        let arg_slots: u16 = method.params.iter().map(JvmType::slot_size).sum();
        let receiver = i32::from(invoke != InvokeKind::Static);
        let effect = i32::from(method.ret.slot_size()) - i32::from(arg_slots) - receiver;
        let descriptor = method.descriptor();
        let instr = match invoke {
            InvokeKind::Static => Instruction::Invokestatic(self.pool.method_ref(&method.owner, &method.name, &descriptor)),
            InvokeKind::Virtual => {
                Instruction::Invokevirtual(self.pool.method_ref(&method.owner, &method.name, &descriptor))
            }
            InvokeKind::Special => {
                Instruction::Invokespecial(self.pool.method_ref(&method.owner, &method.name, &descriptor))
            }
            InvokeKind::Interface => {
                let count = u8::try_from(arg_slots + 1)
                    .map_err(|_| CompileError::encoding(format!("too many arguments to {}", method.name)))?;
                Instruction::Invokeinterface {
                    index: self.pool.interface_method_ref(&method.owner, &method.name, &descriptor),
                    count,
                    filler: 0,
                }
            }
        };
        self.emit_with_effect(instr, effect);
        Ok(())
    }

    fn class_index(&mut self, ty: &JvmType) -> Result<u16, CompileError> {
        let name = ty
            .class_constant_name()
            .ok_or_else(|| CompileError::encoding(format!("{} is not a class type", ty)))?;
        Ok(self.pool.class(&name))
    }

    // ---- values ----------------------------------------------------------

    fn gen_value(&mut self, v: &Value) -> Result<(), CompileError> {
        match &v.kind {
            ValueKind::Const(c) => self.gen_const(c, &v.ty)?,
            ValueKind::Local(slot) => self.emit_load(&v.ty, *slot)?,
            ValueKind::GetField { field, target } => {
                self.gen_value(target)?;
                self.emit_field(field, Instruction::Getfield, i32::from(field.ty.slot_size()) - 1);
            }
            ValueKind::GetStatic(field) => {
                self.emit_field(field, Instruction::Getstatic, i32::from(field.ty.slot_size()));
            }
            ValueKind::Invoke {
                kind: invoke,
                method,
                target,
                args,
            } => {
                if let Some(target) = target {
                    self.gen_value(target)?;
                }
                for arg in args {
                    self.gen_value(arg)?;
                }
                self.emit_invoke(*invoke, method)?;
            }
            ValueKind::Dynamic {
                caller,
                target,
                name,
                args,
            } => {
                self.emit_class_const(caller);
                match target {
                    Some(target) => self.gen_value(target)?,
                    None => {
                        self.emit(Instruction::Aconstnull);
                    }
                }
                let name_idx = self.pool.string(name);
                self.emit_ldc(name_idx);
                self.gen_object_array(args)?;
                let idx = self.pool.method_ref(DYNAMIC, "invoke", DYNAMIC_INVOKE);
                self.emit_with_effect(Instruction::Invokestatic(idx), -3);
            }
            ValueKind::New { class, ctor, args } => {
                let idx = self.pool.class(class);
                self.emit(Instruction::New(idx));
                self.emit(Instruction::Dup);
                for arg in args {
                    self.gen_value(arg)?;
                }
                let init = MethodRef::new(class, "<init>", ctor.clone(), JvmType::Void);
                self.emit_invoke(InvokeKind::Special, &init)?;
            }
            ValueKind::NewArray { elem, len } => {
                self.gen_value(len)?;
                match newarray_code(elem) {
                    Some(code) => {
                        self.emit(Instruction::Newarray(code));
                    }
                    None => {
                        let idx = self.class_index(elem)?;
                        self.emit(Instruction::Anewarray(idx));
                    }
                }
            }
            ValueKind::ArrayLength(array) => {
                self.gen_value(array)?;
                self.emit(Instruction::Arraylength);
            }
            ValueKind::ArrayLoad { array, index } => {
                self.gen_value(array)?;
                self.gen_value(index)?;
                self.emit(array_load(&v.ty));
            }
            ValueKind::CheckCast(inner) => {
                self.gen_value(inner)?;
                if inner.ty != v.ty && v.ty.is_reference() && v.ty != JvmType::Null {
                    let idx = self.class_index(&v.ty)?;
                    self.emit(Instruction::Checkcast(idx));
                }
            }
            ValueKind::Convert(inner) => {
                self.gen_value(inner)?;
                self.gen_convert(&inner.ty, &v.ty)?;
            }
            ValueKind::InstanceOf { value, class } => {
                self.gen_value(value)?;
                let idx = self.class_index(class)?;
                self.emit(Instruction::Instanceof(idx));
            }
            ValueKind::Arith { op, lhs, rhs } => {
                self.gen_value(lhs)?;
                self.gen_value(rhs)?;
                let instr = arith(*op, kind(&v.ty))
                    .ok_or_else(|| CompileError::encoding(format!("no {:?} instruction for {}", op, v.ty)))?;
                self.emit(instr);
            }
            ValueKind::Neg(inner) => {
                self.gen_value(inner)?;
                let instr = match kind(&v.ty) {
                    Kind::Int => Instruction::Ineg,
                    Kind::Long => Instruction::Lneg,
                    Kind::Float => Instruction::Fneg,
                    Kind::Double => Instruction::Dneg,
                    _ => return Err(CompileError::encoding(format!("cannot negate {}", v.ty))),
                };
                self.emit(instr);
            }
            ValueKind::Cond(cond) => {
                let otherwise = self.new_label();
                let end = self.new_label();
                self.gen_branch(cond, otherwise, false)?;
                self.emit(Instruction::Iconst1);
                self.emit_branch(Instruction::Goto, end);
                self.bind(otherwise)?;
                self.emit(Instruction::Iconst0);
                self.bind(end)?;
            }
            ValueKind::Pack { ins, result } => {
                for i in ins {
                    self.gen_ins(i)?;
                }
                self.gen_value(result)?;
            }
        }
        Ok(())
    }

    fn gen_object_array(&mut self, values: &[Value]) -> Result<(), CompileError> {
        let len = i32::try_from(values.len()).map_err(|_| CompileError::encoding("too many arguments"))?;
        self.emit_int_const(len);
        let idx = self.pool.class(OBJECT);
        self.emit(Instruction::Anewarray(idx));
        for (i, value) in values.iter().enumerate() {
            self.emit(Instruction::Dup);
            self.emit_int_const(i as i32);
            self.gen_value(value)?;
            self.emit(Instruction::Aastore);
        }
        Ok(())
    }

    fn gen_convert(&mut self, from: &JvmType, to: &JvmType) -> Result<(), CompileError> {
        use Instruction::*;
        let widen = match (kind(from), kind(to)) {
            (f, t) if f == t => None,
            (Kind::Int, Kind::Long) => Some(I2l),
            (Kind::Int, Kind::Float) => Some(I2f),
            (Kind::Int, Kind::Double) => Some(I2d),
            (Kind::Long, Kind::Int) => Some(L2i),
            (Kind::Long, Kind::Float) => Some(L2f),
            (Kind::Long, Kind::Double) => Some(L2d),
            (Kind::Float, Kind::Int) => Some(F2i),
            (Kind::Float, Kind::Long) => Some(F2l),
            (Kind::Float, Kind::Double) => Some(F2d),
            (Kind::Double, Kind::Int) => Some(D2i),
            (Kind::Double, Kind::Long) => Some(D2l),
            (Kind::Double, Kind::Float) => Some(D2f),
            _ => return Err(CompileError::encoding(format!("cannot convert {} to {}", from, to))),
        };
        if let Some(instr) = widen {
            self.emit(instr);
        }
        let narrow = match to {
            JvmType::Byte if *from != JvmType::Byte => Some(I2b),
            JvmType::Char if *from != JvmType::Char => Some(I2c),
            JvmType::Short if !matches!(from, JvmType::Short | JvmType::Byte) => Some(I2s),
            _ => None,
        };
        if let Some(instr) = narrow {
            self.emit(instr);
        }
        Ok(())
    }

    // ---- conditions ------------------------------------------------------

    /// Jump to `target` when `cond` evaluates to `when`; fall through otherwise.
    fn gen_branch(&mut self, cond: &Cond, target: usize, when: bool) -> Result<(), CompileError> {
        match cond {
            Cond::Truthy(v) => {
                self.gen_value(v)?;
                self.emit_branch(if when { Instruction::Ifne } else { Instruction::Ifeq }, target);
            }
            Cond::Not(inner) => self.gen_branch(inner, target, !when)?,
            Cond::And(a, b) => {
                if when {
                    let skip = self.new_label();
                    self.gen_branch(a, skip, false)?;
                    self.gen_branch(b, target, true)?;
                    self.bind(skip)?;
                } else {
                    self.gen_branch(a, target, false)?;
                    self.gen_branch(b, target, false)?;
                }
            }
            Cond::Or(a, b) => {
                if when {
                    self.gen_branch(a, target, true)?;
                    self.gen_branch(b, target, true)?;
                } else {
                    let skip = self.new_label();
                    self.gen_branch(a, skip, true)?;
                    self.gen_branch(b, target, false)?;
                    self.bind(skip)?;
                }
            }
            Cond::Compare { op, lhs, rhs } => self.gen_compare(*op, lhs, rhs, target, when)?,
            Cond::IsNull(v) => {
                self.gen_value(v)?;
                self.emit_branch(if when { Instruction::Ifnull } else { Instruction::Ifnonnull }, target);
            }
        }
        Ok(())
    }

    fn gen_compare(&mut self, op: CmpOp, lhs: &Value, rhs: &Value, target: usize, when: bool) -> Result<(), CompileError> {
        let jump = if when { op } else { op.negate() };
        let operand = if lhs.ty == JvmType::Null { &rhs.ty } else { &lhs.ty };
        match kind(operand) {
            Kind::Int => {
                if is_zero(rhs) {
                    self.gen_value(lhs)?;
                    self.emit_branch(if_zero(jump), target);
                } else {
                    self.gen_value(lhs)?;
                    self.gen_value(rhs)?;
                    self.emit_branch(if_icmp(jump), target);
                }
            }
            Kind::Long => {
                self.gen_value(lhs)?;
                self.gen_value(rhs)?;
                self.emit(Instruction::Lcmp);
                self.emit_branch(if_zero(jump), target);
            }
            k @ (Kind::Float | Kind::Double) => {
                self.gen_value(lhs)?;
                self.gen_value(rhs)?;
                // NaN must make the original comparison false.
                let greater_on_nan = matches!(op, CmpOp::Lt | CmpOp::Le);
                let instr = match (k, greater_on_nan) {
                    (Kind::Float, true) => Instruction::Fcmpg,
                    (Kind::Float, false) => Instruction::Fcmpl,
                    (_, true) => Instruction::Dcmpg,
                    (_, false) => Instruction::Dcmpl,
                };
                self.emit(instr);
                self.emit_branch(if_zero(jump), target);
            }
            Kind::Ref => {
                let null_test = match jump {
                    CmpOp::Eq => Instruction::Ifnull,
                    CmpOp::Ne => Instruction::Ifnonnull,
                    _ => return Err(CompileError::encoding(format!("references cannot be ordered with {:?}", op))),
                };
                if is_null(rhs) {
                    self.gen_value(lhs)?;
                    self.emit_branch(null_test, target);
                } else if is_null(lhs) {
                    self.gen_value(rhs)?;
                    self.emit_branch(null_test, target);
                } else {
                    self.gen_value(lhs)?;
                    self.gen_value(rhs)?;
                    let acmp = if jump == CmpOp::Eq { Instruction::IfAcmpeq } else { Instruction::IfAcmpne };
                    self.emit_branch(acmp, target);
                }
            }
            Kind::Void => return Err(CompileError::encoding("comparison of a void value")),
        }
        Ok(())
    }

    // ---- instructions ----------------------------------------------------

    fn gen_ins(&mut self, ins: &Ins) -> Result<(), CompileError> {
        match ins {
            Ins::Eval(v) => {
                self.gen_value(v)?;
                match v.ty.slot_size() {
                    0 => {}
                    1 => {
                        self.emit(Instruction::Pop);
                    }
                    _ => {
                        self.emit(Instruction::Pop2);
                    }
                }
            }
            Ins::Store { slot, value } => {
                self.gen_value(value)?;
                self.emit_store(&value.ty, *slot)?;
            }
            Ins::PutField { field, target, value } => {
                self.gen_value(target)?;
                self.gen_value(value)?;
                self.emit_field(field, Instruction::Putfield, -1 - i32::from(field.ty.slot_size()));
            }
            Ins::PutStatic { field, value } => {
                self.gen_value(value)?;
                self.emit_field(field, Instruction::Putstatic, -i32::from(field.ty.slot_size()));
            }
            Ins::ArrayStore { array, index, value } => {
                self.gen_value(array)?;
                self.gen_value(index)?;
                self.gen_value(value)?;
                let elem = match &array.ty {
                    JvmType::Array(elem) => elem.as_ref(),
                    _ => &value.ty,
                };
                self.emit(array_store(elem));
            }
            Ins::Label(label) => self.bind(label.0)?,
            Ins::Goto(label) => self.emit_branch(Instruction::Goto, label.0),
            Ins::Branch { cond, target, when } => self.gen_branch(cond, target.0, *when)?,
            Ins::Catch { label, slot } => {
                self.bind(label.0)?;
                self.emit_store(&JvmType::object(), *slot)?;
            }
            Ins::Return(None) => {
                self.emit(Instruction::Return);
            }
            Ins::Return(Some(v)) => {
                self.gen_value(v)?;
                let instr = match kind(&v.ty) {
                    Kind::Int => Instruction::Ireturn,
                    Kind::Long => Instruction::Lreturn,
                    Kind::Float => Instruction::Freturn,
                    Kind::Double => Instruction::Dreturn,
                    Kind::Ref => Instruction::Areturn,
                    Kind::Void => Instruction::Return,
                };
                self.emit(instr);
            }
            Ins::Throw(v) => {
                self.gen_value(v)?;
                self.emit(Instruction::Athrow);
            }
            Ins::MonitorEnter(v) => {
                self.gen_value(v)?;
                self.emit(Instruction::Monitorenter);
            }
            Ins::MonitorExit(v) => {
                self.gen_value(v)?;
                self.emit(Instruction::Monitorexit);
            }
        }
        Ok(())
    }

    // ---- finishing -------------------------------------------------------

    fn resolve_patches(&mut self) -> Result<(), CompileError> {
        let addresses = compute_byte_addresses(&self.instructions);
        let end = code_length(&self.instructions);
        let address_of = |idx: usize| addresses.get(idx).copied().unwrap_or(end);
        for &(idx, label) in &self.patches {
            let target = self.label_index(label)?;
            let offset = i64::from(address_of(target)) - i64::from(address_of(idx));
            let offset = i16::try_from(offset)
                .map_err(|_| CompileError::encoding(format!("branch offset {} exceeds 16 bits", offset)))?;
            patch_branch_offset(&mut self.instructions[idx], offset)?;
        }
        Ok(())
    }

    fn build_exception_table(&mut self, body: &MethodBody) -> Result<(Vec<ExceptionEntry>, Vec<usize>), CompileError> {
        let addresses = compute_byte_addresses(&self.instructions);
        let end = code_length(&self.instructions);
        let pc = |idx: usize| -> Result<u16, CompileError> {
            let addr = addresses.get(idx).copied().unwrap_or(end);
            u16::try_from(addr).map_err(|_| CompileError::encoding("method code exceeds 65535 bytes"))
        };
        let mut table = Vec::with_capacity(body.exceptions.len());
        let mut handlers = Vec::with_capacity(body.exceptions.len());
        for range in &body.exceptions {
            let start = self.label_index(range.start.0)?;
            let stop = self.label_index(range.end.0)?;
            if start >= stop {
                continue;
            }
            let handler = self.label_index(range.handler.0)?;
            handlers.push(handler);
            let catch_type = match &range.catch_type {
                Some(name) => self.pool.class(name),
                None => 0,
            };
            table.push(ExceptionEntry {
                start_pc: pc(start)?,
                end_pc: pc(stop)?,
                handler_pc: pc(handler)?,
                catch_type,
            });
        }
        Ok((table, handlers))
    }

    fn finish(mut self, body: &MethodBody) -> Result<GeneratedCode, CompileError> {
        self.resolve_patches()?;
        let (exception_table, handlers) = self.build_exception_table(body)?;
        let max_stack = stack_calc::compute_max_stack(&self.instructions, &handlers, &self.effects)?;
        trace!(instructions = self.instructions.len(), max_stack, "method generated");
        Ok(GeneratedCode {
            instructions: self.instructions,
            max_stack,
            max_locals: body.max_locals,
            exception_table,
        })
    }
}

fn is_zero(v: &Value) -> bool {
    matches!(v.kind, ValueKind::Const(Const::Int(0)))
}

fn is_null(v: &Value) -> bool {
    matches!(v.kind, ValueKind::Const(Const::Null))
}

fn if_zero(op: CmpOp) -> fn(i16) -> Instruction {
    match op {
        CmpOp::Eq => Instruction::Ifeq,
        CmpOp::Ne => Instruction::Ifne,
        CmpOp::Lt => Instruction::Iflt,
        CmpOp::Ge => Instruction::Ifge,
        CmpOp::Gt => Instruction::Ifgt,
        CmpOp::Le => Instruction::Ifle,
    }
}

fn if_icmp(op: CmpOp) -> fn(i16) -> Instruction {
    match op {
        CmpOp::Eq => Instruction::IfIcmpeq,
        CmpOp::Ne => Instruction::IfIcmpne,
        CmpOp::Lt => Instruction::IfIcmplt,
        CmpOp::Ge => Instruction::IfIcmpge,
        CmpOp::Gt => Instruction::IfIcmpgt,
        CmpOp::Le => Instruction::IfIcmple,
    }
}

fn patch_branch_offset(instr: &mut Instruction, offset: i16) -> Result<(), CompileError> {
    use Instruction::*;
    match instr {
        Ifeq(o) | Ifne(o) | Iflt(o) | Ifge(o) | Ifgt(o) | Ifle(o) | IfIcmpeq(o) | IfIcmpne(o) | IfIcmplt(o)
        | IfIcmpge(o) | IfIcmpgt(o) | IfIcmple(o) | IfAcmpeq(o) | IfAcmpne(o) | Goto(o) | Ifnull(o)
        | Ifnonnull(o) => {
            *o = offset;
            Ok(())
        }
        other => Err(CompileError::encoding(format!("{:?} is not a branch", other))),
    }
}

fn arith(op: ArithOp, k: Kind) -> Option<Instruction> {
    use Instruction::*;
    Some(match (op, k) {
        (ArithOp::Add, Kind::Int) => Iadd,
        (ArithOp::Add, Kind::Long) => Ladd,
        (ArithOp::Add, Kind::Float) => Fadd,
        (ArithOp::Add, Kind::Double) => Dadd,
        (ArithOp::Sub, Kind::Int) => Isub,
        (ArithOp::Sub, Kind::Long) => Lsub,
        (ArithOp::Sub, Kind::Float) => Fsub,
        (ArithOp::Sub, Kind::Double) => Dsub,
        (ArithOp::Mul, Kind::Int) => Imul,
        (ArithOp::Mul, Kind::Long) => Lmul,
        (ArithOp::Mul, Kind::Float) => Fmul,
        (ArithOp::Mul, Kind::Double) => Dmul,
        (ArithOp::Div, Kind::Int) => Idiv,
        (ArithOp::Div, Kind::Long) => Ldiv,
        (ArithOp::Div, Kind::Float) => Fdiv,
        (ArithOp::Div, Kind::Double) => Ddiv,
        (ArithOp::Rem, Kind::Int) => Irem,
        (ArithOp::Rem, Kind::Long) => Lrem,
        (ArithOp::Rem, Kind::Float) => Frem,
        (ArithOp::Rem, Kind::Double) => Drem,
        (ArithOp::Shl, Kind::Int) => Ishl,
        (ArithOp::Shl, Kind::Long) => Lshl,
        (ArithOp::Shr, Kind::Int) => Ishr,
        (ArithOp::Shr, Kind::Long) => Lshr,
        (ArithOp::Ushr, Kind::Int) => Iushr,
        (ArithOp::Ushr, Kind::Long) => Lushr,
        (ArithOp::And, Kind::Int) => Iand,
        (ArithOp::And, Kind::Long) => Land,
        (ArithOp::Or, Kind::Int) => Ior,
        (ArithOp::Or, Kind::Long) => Lor,
        (ArithOp::Xor, Kind::Int) => Ixor,
        (ArithOp::Xor, Kind::Long) => Lxor,
        _ => return None,
    })
}

fn array_load(elem: &JvmType) -> Instruction {
    match elem {
        JvmType::Int => Instruction::Iaload,
        JvmType::Long => Instruction::Laload,
        JvmType::Float => Instruction::Faload,
        JvmType::Double => Instruction::Daload,
        JvmType::Byte | JvmType::Boolean => Instruction::Baload,
        JvmType::Char => Instruction::Caload,
        JvmType::Short => Instruction::Saload,
        _ => Instruction::Aaload,
    }
}

fn array_store(elem: &JvmType) -> Instruction {
    match elem {
        JvmType::Int => Instruction::Iastore,
        JvmType::Long => Instruction::Lastore,
        JvmType::Float => Instruction::Fastore,
        JvmType::Double => Instruction::Dastore,
        JvmType::Byte | JvmType::Boolean => Instruction::Bastore,
        JvmType::Char => Instruction::Castore,
        JvmType::Short => Instruction::Sastore,
        _ => Instruction::Aastore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::semantic::ir::{ExceptionRange, Label};

    fn body(ins: Vec<Ins>, labels: usize, max_locals: u16) -> MethodBody {
        MethodBody {
            ins,
            exceptions: Vec::new(),
            max_locals,
            labels,
        }
    }

    fn gen(body: &MethodBody) -> GeneratedCode {
        generate(body, &mut ConstantPool::new()).unwrap()
    }

    #[test]
    fn int_constants_use_the_shortest_form() {
        let ins = [-1, 5, 100, 1000, 70000]
            .into_iter()
            .map(|v| Ins::Eval(Value::int(v)))
            .chain([Ins::Return(None)])
            .collect();
        let code = gen(&body(ins, 0, 0));
        assert_eq!(code.instructions[0], Instruction::Iconstm1);
        assert_eq!(code.instructions[2], Instruction::Iconst5);
        assert_eq!(code.instructions[4], Instruction::Bipush(100));
        assert_eq!(code.instructions[6], Instruction::Sipush(1000));
        assert!(matches!(code.instructions[8], Instruction::Ldc(_)));
        assert_eq!(code.max_stack, 1);
    }

    #[test]
    fn materialized_conditions_branch_over_the_true_arm() {
        let cond = Cond::Compare {
            op: CmpOp::Lt,
            lhs: Value::local(0, JvmType::Int),
            rhs: Value::int(0),
        };
        let code = gen(&body(vec![Ins::Return(Some(Value::cond(cond)))], 0, 1));
        assert_eq!(
            code.instructions,
            vec![
                Instruction::Iload0,
                Instruction::Ifge(7),
                Instruction::Iconst1,
                Instruction::Goto(4),
                Instruction::Iconst0,
                Instruction::Ireturn,
            ]
        );
        assert_eq!(code.max_stack, 1);
    }

    #[test]
    fn float_ordering_treats_nan_as_false() {
        let cond = Cond::Compare {
            op: CmpOp::Lt,
            lhs: Value::local(0, JvmType::Float),
            rhs: Value::local(1, JvmType::Float),
        };
        let ins = vec![
            Ins::Branch {
                cond,
                target: Label(0),
                when: true,
            },
            Ins::Label(Label(0)),
            Ins::Return(None),
        ];
        let code = gen(&body(ins, 1, 2));
        assert_eq!(code.instructions[2], Instruction::Fcmpg);
        assert_eq!(code.instructions[3], Instruction::Iflt(3));
    }

    #[test]
    fn backward_gotos_get_negative_offsets() {
        let ins = vec![
            Ins::Label(Label(0)),
            Ins::Store {
                slot: 0,
                value: Value::int(1),
            },
            Ins::Goto(Label(0)),
        ];
        let code = gen(&body(ins, 1, 1));
        assert_eq!(code.instructions, vec![Instruction::Iconst1, Instruction::Istore0, Instruction::Goto(-2)]);
    }

    #[test]
    fn wide_values_count_two_stack_slots() {
        let sum = Value::new(
            JvmType::Long,
            ValueKind::Arith {
                op: ArithOp::Add,
                lhs: Box::new(Value::local(0, JvmType::Long)),
                rhs: Box::new(Value::long(7)),
            },
        );
        let code = gen(&body(vec![Ins::Return(Some(sum))], 0, 2));
        assert_eq!(code.max_stack, 4);
        assert_eq!(code.instructions.last(), Some(&Instruction::Lreturn));
    }

    #[test]
    fn dynamic_calls_box_arguments_into_an_array() {
        let call = Value::new(
            JvmType::object(),
            ValueKind::Dynamic {
                caller: "A".into(),
                target: Some(Box::new(Value::local(0, JvmType::object()))),
                name: "size".into(),
                args: vec![Value::str("x")],
            },
        );
        let mut pool = ConstantPool::new();
        let code = generate(&body(vec![Ins::Return(Some(call))], 0, 1), &mut pool).unwrap();
        assert!(code.instructions.contains(&Instruction::Aastore));
        assert!(matches!(code.instructions.last(), Some(Instruction::Areturn)));
        // class, target, name, array, dup, index, value
        assert_eq!(code.max_stack, 7);
    }

    #[test]
    fn empty_protected_ranges_are_dropped() {
        let mut b = body(
            vec![
                Ins::Label(Label(0)),
                Ins::Label(Label(1)),
                Ins::Return(None),
                Ins::Catch {
                    label: Label(2),
                    slot: 0,
                },
                Ins::Return(None),
            ],
            3,
            1,
        );
        b.exceptions.push(ExceptionRange {
            start: Label(0),
            end: Label(1),
            handler: Label(2),
            catch_type: None,
        });
        assert!(gen(&b).exception_table.is_empty());
    }

    #[test]
    fn handlers_start_with_the_throwable_on_the_stack() {
        let mut b = body(
            vec![
                Ins::Label(Label(0)),
                Ins::Eval(Value::invoke_static(
                    MethodRef::new("A", "run", Vec::new(), JvmType::Void),
                    Vec::new(),
                )),
                Ins::Label(Label(1)),
                Ins::Return(None),
                Ins::Catch {
                    label: Label(2),
                    slot: 0,
                },
                Ins::Return(None),
            ],
            3,
            1,
        );
        b.exceptions.push(ExceptionRange {
            start: Label(0),
            end: Label(1),
            handler: Label(2),
            catch_type: Some("java/lang/RuntimeException".into()),
        });
        let code = gen(&b);
        assert_eq!(code.exception_table.len(), 1);
        let entry = &code.exception_table[0];
        assert_eq!((entry.start_pc, entry.end_pc, entry.handler_pc), (0, 3, 4));
        assert_ne!(entry.catch_type, 0);
        assert_eq!(code.max_stack, 1);
    }

    #[test]
    fn unbound_labels_are_an_encoding_error() {
        let b = body(vec![Ins::Goto(Label(0))], 1, 0);
        let err = generate(&b, &mut ConstantPool::new()).unwrap_err();
        assert!(matches!(err, CompileError::Encoding { .. }));
    }
}
