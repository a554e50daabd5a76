//! Numeric promotion, boxing, and implicit conversions between value types.

use crate::descriptor::{JvmType, OBJECT, STRING};

use super::ir::{Const, MethodRef, Value, ValueKind};
use super::types::TypeRegistry;

pub const RUNTIME: &str = "mocha/lang/Runtime";

/// Wrapper class for a primitive.
pub fn box_type(prim: &JvmType) -> Option<&'static str> {
    Some(match prim {
        JvmType::Int => "java/lang/Integer",
        JvmType::Long => "java/lang/Long",
        JvmType::Float => "java/lang/Float",
        JvmType::Double => "java/lang/Double",
        JvmType::Byte => "java/lang/Byte",
        JvmType::Short => "java/lang/Short",
        JvmType::Char => "java/lang/Character",
        JvmType::Boolean => "java/lang/Boolean",
        _ => return None,
    })
}

/// Primitive wrapped by a wrapper class.
pub fn unbox_type(ty: &JvmType) -> Option<JvmType> {
    let JvmType::Reference(name) = ty else {
        return None;
    };
    Some(match name.as_str() {
        "java/lang/Integer" => JvmType::Int,
        "java/lang/Long" => JvmType::Long,
        "java/lang/Float" => JvmType::Float,
        "java/lang/Double" => JvmType::Double,
        "java/lang/Byte" => JvmType::Byte,
        "java/lang/Short" => JvmType::Short,
        "java/lang/Character" => JvmType::Char,
        "java/lang/Boolean" => JvmType::Boolean,
        _ => return None,
    })
}

/// The primitive a value computes with: itself, or what its wrapper holds.
pub fn arithmetic_type(ty: &JvmType) -> Option<JvmType> {
    if ty.is_primitive() {
        Some(ty.clone())
    } else {
        unbox_type(ty)
    }
}

fn rank(ty: &JvmType) -> Option<u32> {
    Some(match ty {
        JvmType::Byte => 0,
        JvmType::Short => 1,
        JvmType::Char => 1,
        JvmType::Int => 2,
        JvmType::Long => 3,
        JvmType::Float => 4,
        JvmType::Double => 5,
        _ => return None,
    })
}

/// Promotion steps for a widening primitive conversion, `None` if the
/// conversion narrows or crosses into `char`.
pub fn widening_steps(from: &JvmType, to: &JvmType) -> Option<u32> {
    if from == to {
        return Some(0);
    }
    if *to == JvmType::Char || (*from == JvmType::Char && matches!(to, JvmType::Byte | JvmType::Short)) {
        return None;
    }
    let (f, t) = (rank(from)?, rank(to)?);
    (t > f).then(|| t - f)
}

/// Binary numeric promotion: the wider operand wins, and anything narrower
/// than `int` computes as `int`.
pub fn binary_numeric_type(a: &JvmType, b: &JvmType) -> Option<JvmType> {
    let (ra, rb) = (rank(a)?, rank(b)?);
    Some(match ra.max(rb) {
        5 => JvmType::Double,
        4 => JvmType::Float,
        3 => JvmType::Long,
        _ => JvmType::Int,
    })
}

/// Operand type of the stack instruction family (`i`, `l`, `f`, `d`).
pub fn stack_type(ty: &JvmType) -> JvmType {
    match ty {
        t if t.is_int_like() => JvmType::Int,
        JvmType::Long | JvmType::Float | JvmType::Double => ty.clone(),
        _ => JvmType::object(),
    }
}

pub fn box_value(value: Value) -> Value {
    let Some(wrapper) = box_type(&value.ty) else {
        return value;
    };
    let prim = value.ty.clone();
    Value::invoke_static(
        MethodRef::new(wrapper, "valueOf", vec![prim], JvmType::reference(wrapper)),
        vec![value],
    )
}

/// Box primitives; references pass through.
pub fn to_object(value: Value) -> Value {
    if value.ty.is_primitive() {
        box_value(value)
    } else {
        value
    }
}

/// Unbox a wrapper with its `xxxValue` accessor.
fn unbox_wrapper(value: Value, prim: &JvmType) -> Value {
    let JvmType::Reference(owner) = value.ty.clone() else {
        return value;
    };
    let accessor = match prim {
        JvmType::Int => "intValue",
        JvmType::Long => "longValue",
        JvmType::Float => "floatValue",
        JvmType::Double => "doubleValue",
        JvmType::Byte => "byteValue",
        JvmType::Short => "shortValue",
        JvmType::Char => "charValue",
        _ => "booleanValue",
    };
    Value::invoke(
        super::ir::InvokeKind::Virtual,
        MethodRef::new(&owner, accessor, vec![], prim.clone()),
        Some(value),
        vec![],
    )
}

/// `Runtime.castToX(Object)` for a value of unknown dynamic type.
pub fn runtime_cast(value: Value, prim: &JvmType) -> Value {
    let name = match prim {
        JvmType::Int => "castToInt",
        JvmType::Long => "castToLong",
        JvmType::Float => "castToFloat",
        JvmType::Double => "castToDouble",
        JvmType::Byte => "castToByte",
        JvmType::Short => "castToShort",
        JvmType::Char => "castToChar",
        _ => "castToBool",
    };
    Value::invoke_static(
        MethodRef::new(RUNTIME, name, vec![JvmType::object()], prim.clone()),
        vec![value],
    )
}

fn convert_primitive(value: Value, to: &JvmType) -> Value {
    if value.ty == *to {
        return value;
    }
    if let ValueKind::Const(c) = &value.kind {
        if let Some(folded) = fold_constant(c, to) {
            return folded;
        }
    }
    Value::new(to.clone(), ValueKind::Convert(Box::new(value)))
}

fn fold_constant(c: &Const, to: &JvmType) -> Option<Value> {
    let as_f64 = match c {
        Const::Int(v) => *v as f64,
        Const::Long(v) => *v as f64,
        Const::Float(v) => *v as f64,
        Const::Double(v) => *v,
        _ => return None,
    };
    let as_i64 = match c {
        Const::Int(v) => *v as i64,
        Const::Long(v) => *v,
        _ => return None,
    };
    Some(match to {
        JvmType::Long => Value::long(as_i64),
        JvmType::Float => Value::float(as_f64 as f32),
        JvmType::Double => Value::double(as_f64),
        t if t.is_int_like() && *t != JvmType::Boolean => {
            let v = i32::try_from(as_i64).ok()?;
            Value::new(t.clone(), ValueKind::Const(Const::Int(v)))
        }
        _ => return None,
    })
}

fn int_constant(value: &Value) -> Option<i64> {
    match &value.kind {
        ValueKind::Const(Const::Int(v)) => Some(*v as i64),
        _ => None,
    }
}

fn fits(v: i64, to: &JvmType) -> bool {
    match to {
        JvmType::Byte => i8::try_from(v).is_ok(),
        JvmType::Short => i16::try_from(v).is_ok(),
        JvmType::Char => u16::try_from(v).is_ok(),
        _ => false,
    }
}

/// Convert `value` so it can be stored where `to` is expected.
///
/// `explicit` (an `as` cast) additionally allows primitive narrowing.
pub fn coerce(registry: &TypeRegistry, value: Value, to: &JvmType, explicit: bool) -> Result<Value, String> {
    let from = value.ty.clone();
    if from == *to {
        return Ok(value);
    }
    if from == JvmType::Void {
        return Err("expression has no value".into());
    }
    if *to == JvmType::Void {
        return Ok(value);
    }

    match (from.is_primitive(), to.is_primitive()) {
        (true, true) => {
            if from == JvmType::Boolean || *to == JvmType::Boolean {
                return Err(format!("cannot convert {} to {}", from, to));
            }
            if widening_steps(&from, to).is_some() || explicit {
                return Ok(convert_primitive(value, to));
            }
            match int_constant(&value) {
                Some(v) if fits(v, to) => Ok(convert_primitive(value, to)),
                _ => Err(format!("cannot narrow {} to {} without `as`", from, to)),
            }
        }
        (true, false) => {
            let wrapper = box_type(&from).unwrap_or(OBJECT);
            let wrapper_ty = JvmType::reference(wrapper);
            if registry.assignable(&wrapper_ty, to) {
                return Ok(box_value(value));
            }
            if let Some(target_prim) = unbox_type(to) {
                let converted = coerce(registry, value, &target_prim, explicit)?;
                return Ok(box_value(converted));
            }
            Err(format!("cannot convert {} to {}", from, to))
        }
        (false, true) => {
            if let Some(prim) = unbox_type(&from) {
                let unboxed = unbox_wrapper(value, &prim);
                return coerce(registry, unboxed, to, explicit);
            }
            if from == JvmType::string() && *to == JvmType::Char {
                if let ValueKind::Const(Const::Str(s)) = &value.kind {
                    let mut units = s.encode_utf16();
                    return match (units.next(), units.next()) {
                        (Some(c), None) => Ok(Value::new(JvmType::Char, ValueKind::Const(Const::Int(c as i32)))),
                        _ => Err(format!("string literal \"{}\" is not a single character", s)),
                    };
                }
            }
            if from == JvmType::Null {
                return Err(format!("null cannot be converted to {}", to));
            }
            if from.is_reference() {
                return Ok(runtime_cast(value, to));
            }
            Err(format!("cannot convert {} to {}", from, to))
        }
        (false, false) => {
            if from == JvmType::Null {
                return Ok(Value::new(to.clone(), ValueKind::Const(Const::Null)));
            }
            if registry.assignable(&from, to) {
                return Ok(value);
            }
            if *to == JvmType::string() && explicit {
                return Ok(Value::invoke_static(
                    MethodRef::new(STRING, "valueOf", vec![JvmType::object()], JvmType::string()),
                    vec![value],
                ));
            }
            Ok(Value::new(to.clone(), ValueKind::CheckCast(Box::new(value))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classpath::BuiltinProvider;
    use proptest::prelude::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::new(vec![Box::new(BuiltinProvider::new())])
    }

    fn numeric() -> impl Strategy<Value = JvmType> {
        prop_oneof![
            Just(JvmType::Byte),
            Just(JvmType::Short),
            Just(JvmType::Char),
            Just(JvmType::Int),
            Just(JvmType::Long),
            Just(JvmType::Float),
            Just(JvmType::Double),
        ]
    }

    proptest! {
        #[test]
        fn promotion_picks_the_widest_kind(a in numeric(), b in numeric()) {
            let result = binary_numeric_type(&a, &b).unwrap();
            prop_assert_eq!(binary_numeric_type(&b, &a).unwrap(), result.clone());
            let expected = if a == JvmType::Double || b == JvmType::Double {
                JvmType::Double
            } else if a == JvmType::Float || b == JvmType::Float {
                JvmType::Float
            } else if a == JvmType::Long || b == JvmType::Long {
                JvmType::Long
            } else {
                JvmType::Int
            };
            prop_assert_eq!(&result, &expected);
            prop_assert!(widening_steps(&stack_type(&a), &result).is_some());
        }
    }

    #[test]
    fn narrow_literals_fit_their_target() {
        let reg = registry();
        let v = coerce(&reg, Value::int(9), &JvmType::Byte, false).unwrap();
        assert_eq!(v.ty, JvmType::Byte);
        assert!(coerce(&reg, Value::int(300), &JvmType::Byte, false).is_err());
        assert_eq!(coerce(&reg, Value::int(1), &JvmType::Long, false).unwrap(), Value::long(1));
    }

    #[test]
    fn single_character_strings_become_chars() {
        let reg = registry();
        let c = coerce(&reg, Value::str("a"), &JvmType::Char, false).unwrap();
        assert_eq!(c.kind, ValueKind::Const(Const::Int('a' as i32)));
        assert!(coerce(&reg, Value::str("ab"), &JvmType::Char, false).is_err());
    }

    #[test]
    fn boxing_targets_supertypes() {
        let reg = registry();
        let boxed = coerce(&reg, Value::int(1), &JvmType::object(), false).unwrap();
        assert_eq!(boxed.ty, JvmType::reference("java/lang/Integer"));
        let widened = coerce(&reg, Value::int(1), &JvmType::reference("java/lang/Long"), false).unwrap();
        assert_eq!(widened.ty, JvmType::reference("java/lang/Long"));
    }

    #[test]
    fn object_to_primitive_goes_through_the_runtime() {
        let reg = registry();
        let v = coerce(&reg, Value::local(1, JvmType::object()), &JvmType::Boolean, false).unwrap();
        match v.kind {
            ValueKind::Invoke { method, .. } => assert_eq!(method.name, "castToBool"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
