use std::collections::HashMap;

use super::types::*;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum PoolKey {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(String),
    String(String),
    NameAndType(String, String),
    FieldRef(String, String, String),
    MethodRef(String, String, String),
    InterfaceMethodRef(String, String, String),
}

/// Deduplicating constant-pool builder used while emitting one class.
///
/// Indices are stable once handed out; wide constants reserve two slots.
#[derive(Clone, Debug, Default)]
pub struct ConstantPool {
    entries: Vec<ConstantInfo>,
    reverse_map: HashMap<PoolKey, u16>,
    overflowed: bool,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, key: PoolKey, entry: ConstantInfo) -> u16 {
        if let Some(&idx) = self.reverse_map.get(&key) {
            return idx;
        }
        let wide = entry.is_wide();
        let next = self.entries.len() + 1;
        if next + usize::from(wide) > u16::MAX as usize - 1 {
            self.overflowed = true;
            return 0;
        }
        let idx = next as u16;
        self.entries.push(entry);
        if wide {
            self.entries.push(ConstantInfo::Unusable);
        }
        self.reverse_map.insert(key, idx);
        idx
    }

    pub fn utf8(&mut self, value: &str) -> u16 {
        self.insert(
            PoolKey::Utf8(value.to_string()),
            ConstantInfo::Utf8(Utf8Constant::new(value)),
        )
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        self.insert(PoolKey::Integer(value), ConstantInfo::Integer(IntegerConstant { value }))
    }

    pub fn float(&mut self, value: f32) -> u16 {
        self.insert(PoolKey::Float(value.to_bits()), ConstantInfo::Float(FloatConstant { value }))
    }

    pub fn long(&mut self, value: i64) -> u16 {
        self.insert(PoolKey::Long(value), ConstantInfo::Long(LongConstant { value }))
    }

    pub fn double(&mut self, value: f64) -> u16 {
        self.insert(PoolKey::Double(value.to_bits()), ConstantInfo::Double(DoubleConstant { value }))
    }

    /// Class constant for an internal name (`java/lang/String`) or an array
    /// descriptor (`[I`).
    pub fn class(&mut self, internal_name: &str) -> u16 {
        if let Some(&idx) = self.reverse_map.get(&PoolKey::Class(internal_name.to_string())) {
            return idx;
        }
        let name_index = self.utf8(internal_name);
        self.insert(
            PoolKey::Class(internal_name.to_string()),
            ConstantInfo::Class(ClassConstant { name_index }),
        )
    }

    pub fn string(&mut self, value: &str) -> u16 {
        if let Some(&idx) = self.reverse_map.get(&PoolKey::String(value.to_string())) {
            return idx;
        }
        let string_index = self.utf8(value);
        self.insert(
            PoolKey::String(value.to_string()),
            ConstantInfo::String(StringConstant { string_index }),
        )
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let key = PoolKey::NameAndType(name.to_string(), descriptor.to_string());
        if let Some(&idx) = self.reverse_map.get(&key) {
            return idx;
        }
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.insert(
            key,
            ConstantInfo::NameAndType(NameAndTypeConstant {
                name_index,
                descriptor_index,
            }),
        )
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let key = PoolKey::FieldRef(owner.to_string(), name.to_string(), descriptor.to_string());
        if let Some(&idx) = self.reverse_map.get(&key) {
            return idx;
        }
        let class_index = self.class(owner);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.insert(
            key,
            ConstantInfo::FieldRef(FieldRefConstant {
                class_index,
                name_and_type_index,
            }),
        )
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let key = PoolKey::MethodRef(owner.to_string(), name.to_string(), descriptor.to_string());
        if let Some(&idx) = self.reverse_map.get(&key) {
            return idx;
        }
        let class_index = self.class(owner);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.insert(
            key,
            ConstantInfo::MethodRef(MethodRefConstant {
                class_index,
                name_and_type_index,
            }),
        )
    }

    pub fn interface_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let key = PoolKey::InterfaceMethodRef(owner.to_string(), name.to_string(), descriptor.to_string());
        if let Some(&idx) = self.reverse_map.get(&key) {
            return idx;
        }
        let class_index = self.class(owner);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.insert(
            key,
            ConstantInfo::InterfaceMethodRef(InterfaceMethodRefConstant {
                class_index,
                name_and_type_index,
            }),
        )
    }

    /// Whether more than 65534 slots were requested.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// `constant_pool_count` as written in the class header.
    pub fn count(&self) -> u16 {
        (self.entries.len() + 1) as u16
    }

    pub fn entries(&self) -> &[ConstantInfo] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ConstantInfo> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_utf8_and_classes() {
        let mut pool = ConstantPool::new();
        let a = pool.class("java/lang/Object");
        let b = pool.class("java/lang/Object");
        assert_eq!(a, b);
        assert_eq!(pool.utf8("java/lang/Object"), 1);
        assert_eq!(a, 2);
        assert_eq!(pool.count(), 3);
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantPool::new();
        let l = pool.long(5);
        let next = pool.integer(1);
        assert_eq!(l, 1);
        assert_eq!(next, 3);
        assert_eq!(pool.entries()[1], ConstantInfo::Unusable);
    }

    #[test]
    fn method_ref_builds_chain() {
        let mut pool = ConstantPool::new();
        let idx = pool.method_ref("java/io/PrintStream", "println", "(I)V");
        match &pool.entries()[idx as usize - 1] {
            ConstantInfo::MethodRef(m) => {
                assert_eq!(super::super::class_name_at(pool.entries(), m.class_index).as_deref(), Some("java/io/PrintStream"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
