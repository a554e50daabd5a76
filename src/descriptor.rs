//! JVM type descriptors and the value types the compiler reasons about.

use std::fmt;

pub const OBJECT: &str = "java/lang/Object";
pub const STRING: &str = "java/lang/String";

/// Represents a JVM type from a descriptor string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum JvmType {
    Int,
    Long,
    Float,
    Double,
    Byte,
    Char,
    Short,
    Boolean,
    Void,
    Reference(String),
    Array(Box<JvmType>),
    /// Type of the `null` literal; assignable to every reference type.
    Null,
}

impl JvmType {
    pub fn object() -> Self {
        JvmType::Reference(OBJECT.into())
    }

    pub fn string() -> Self {
        JvmType::Reference(STRING.into())
    }

    pub fn reference(name: impl Into<String>) -> Self {
        JvmType::Reference(name.into())
    }

    /// Returns true if this type occupies two slots on the JVM stack.
    pub fn is_wide(&self) -> bool {
        matches!(self, JvmType::Long | JvmType::Double)
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, JvmType::Reference(_) | JvmType::Array(_) | JvmType::Null | JvmType::Void)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JvmType::Reference(_) | JvmType::Array(_) | JvmType::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            JvmType::Int
                | JvmType::Long
                | JvmType::Float
                | JvmType::Double
                | JvmType::Byte
                | JvmType::Char
                | JvmType::Short
        )
    }

    /// Types that live on the operand stack as a JVM `int`.
    pub fn is_int_like(&self) -> bool {
        matches!(
            self,
            JvmType::Int | JvmType::Byte | JvmType::Char | JvmType::Short | JvmType::Boolean
        )
    }

    pub fn is_object(&self) -> bool {
        matches!(self, JvmType::Reference(name) if name == OBJECT)
    }

    /// Number of local-variable / operand-stack slots.
    pub fn slot_size(&self) -> u16 {
        match self {
            JvmType::Void => 0,
            t if t.is_wide() => 2,
            _ => 1,
        }
    }

    /// Name usable in a `CONSTANT_Class`: internal name for classes, the
    /// descriptor for arrays.
    pub fn class_constant_name(&self) -> Option<String> {
        match self {
            JvmType::Reference(name) => Some(name.clone()),
            JvmType::Array(_) => Some(self.to_descriptor()),
            _ => None,
        }
    }

    /// Returns the JVM descriptor string for this type.
    pub fn to_descriptor(&self) -> String {
        match self {
            JvmType::Int => "I".into(),
            JvmType::Long => "J".into(),
            JvmType::Float => "F".into(),
            JvmType::Double => "D".into(),
            JvmType::Byte => "B".into(),
            JvmType::Char => "C".into(),
            JvmType::Short => "S".into(),
            JvmType::Boolean => "Z".into(),
            JvmType::Void => "V".into(),
            JvmType::Reference(name) => format!("L{};", name),
            JvmType::Array(inner) => format!("[{}", inner.to_descriptor()),
            JvmType::Null => format!("L{};", OBJECT),
        }
    }

    /// Returns the source-level name for diagnostics.
    pub fn simple_name(&self) -> String {
        match self {
            JvmType::Int => "int".into(),
            JvmType::Long => "long".into(),
            JvmType::Float => "float".into(),
            JvmType::Double => "double".into(),
            JvmType::Byte => "byte".into(),
            JvmType::Char => "char".into(),
            JvmType::Short => "short".into(),
            JvmType::Boolean => "bool".into(),
            JvmType::Void => "Unit".into(),
            JvmType::Reference(name) => internal_to_source_name(name),
            JvmType::Array(inner) => format!("{}[]", inner.simple_name()),
            JvmType::Null => "null".into(),
        }
    }

    /// Primitive type for a source keyword (`int`, `bool`, ...).
    pub fn from_keyword(word: &str) -> Option<JvmType> {
        Some(match word {
            "int" => JvmType::Int,
            "long" => JvmType::Long,
            "float" => JvmType::Float,
            "double" => JvmType::Double,
            "byte" => JvmType::Byte,
            "char" => JvmType::Char,
            "short" => JvmType::Short,
            "bool" | "boolean" => JvmType::Boolean,
            "Unit" | "void" => JvmType::Void,
            _ => return None,
        })
    }
}

impl fmt::Display for JvmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.simple_name())
    }
}

/// Parse a single type descriptor starting at position `pos` in `desc`.
/// Returns (JvmType, next_position).
pub fn parse_type_at(desc: &str, pos: usize) -> Option<(JvmType, usize)> {
    let bytes = desc.as_bytes();
    if pos >= bytes.len() {
        return None;
    }
    match bytes[pos] {
        b'B' => Some((JvmType::Byte, pos + 1)),
        b'C' => Some((JvmType::Char, pos + 1)),
        b'D' => Some((JvmType::Double, pos + 1)),
        b'F' => Some((JvmType::Float, pos + 1)),
        b'I' => Some((JvmType::Int, pos + 1)),
        b'J' => Some((JvmType::Long, pos + 1)),
        b'S' => Some((JvmType::Short, pos + 1)),
        b'Z' => Some((JvmType::Boolean, pos + 1)),
        b'V' => Some((JvmType::Void, pos + 1)),
        b'L' => {
            let semi = desc[pos + 1..].find(';')?;
            let class_name = &desc[pos + 1..pos + 1 + semi];
            Some((JvmType::Reference(class_name.to_string()), pos + 1 + semi + 1))
        }
        b'[' => {
            let (inner, next) = parse_type_at(desc, pos + 1)?;
            Some((JvmType::Array(Box::new(inner)), next))
        }
        _ => None,
    }
}

/// Parse a full type descriptor string.
pub fn parse_type_descriptor(desc: &str) -> Option<JvmType> {
    let (ty, next) = parse_type_at(desc, 0)?;
    if next != desc.len() {
        return None;
    }
    Some(ty)
}

/// Parse a method descriptor, e.g. "(II)V" -> ([Int, Int], Void)
pub fn parse_method_descriptor(desc: &str) -> Option<(Vec<JvmType>, JvmType)> {
    if !desc.starts_with('(') {
        return None;
    }
    let close = desc.find(')')?;
    let mut params = Vec::new();
    let mut pos = 1;
    while pos < close {
        let (ty, next) = parse_type_at(desc, pos)?;
        params.push(ty);
        pos = next;
    }
    let (ret, _) = parse_type_at(desc, close + 1)?;
    Some((params, ret))
}

pub fn method_descriptor(params: &[JvmType], ret: &JvmType) -> String {
    let mut desc = String::from("(");
    for p in params {
        desc.push_str(&p.to_descriptor());
    }
    desc.push(')');
    desc.push_str(&ret.to_descriptor());
    desc
}

/// Convert internal class name to source name.
pub fn internal_to_source_name(name: &str) -> String {
    name.replace('/', ".")
}

/// Get just the simple class name from an internal name.
pub fn simple_class_name(name: &str) -> &str {
    match name.rfind('/') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Get the package from an internal name.
pub fn package_name(name: &str) -> Option<&str> {
    name.rfind('/').map(|pos| &name[..pos])
}

/// `newarray` type code for a primitive element type.
pub fn newarray_code(elem: &JvmType) -> Option<u8> {
    Some(match elem {
        JvmType::Boolean => 4,
        JvmType::Char => 5,
        JvmType::Float => 6,
        JvmType::Double => 7,
        JvmType::Byte => 8,
        JvmType::Short => 9,
        JvmType::Int => 10,
        JvmType::Long => 11,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitives() {
        assert_eq!(parse_type_descriptor("I"), Some(JvmType::Int));
        assert_eq!(parse_type_descriptor("J"), Some(JvmType::Long));
        assert_eq!(parse_type_descriptor("Z"), Some(JvmType::Boolean));
        assert_eq!(parse_type_descriptor("II"), None);
    }

    #[test]
    fn test_parse_array() {
        assert_eq!(
            parse_type_descriptor("[[Ljava/lang/Object;"),
            Some(JvmType::Array(Box::new(JvmType::Array(Box::new(JvmType::object())))))
        );
    }

    #[test]
    fn test_method_descriptor_round_trip() {
        let (params, ret) = parse_method_descriptor("(Ljava/lang/String;I)[B").unwrap();
        assert_eq!(params, vec![JvmType::string(), JvmType::Int]);
        assert_eq!(ret, JvmType::Array(Box::new(JvmType::Byte)));
        assert_eq!(method_descriptor(&params, &ret), "(Ljava/lang/String;I)[B");
    }

    #[test]
    fn test_class_constant_name() {
        assert_eq!(JvmType::string().class_constant_name().as_deref(), Some("java/lang/String"));
        assert_eq!(
            JvmType::Array(Box::new(JvmType::Int)).class_constant_name().as_deref(),
            Some("[I")
        );
        assert_eq!(JvmType::Int.class_constant_name(), None);
    }

    #[test]
    fn test_internal_names() {
        assert_eq!(internal_to_source_name("java/lang/String"), "java.lang.String");
        assert_eq!(simple_class_name("java/lang/String"), "String");
        assert_eq!(package_name("NoPackage"), None);
    }
}
