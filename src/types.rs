use crate::attribute_info::AttributeInfo;
use crate::constant_info::{read_const_pool, write_const_pool, ConstantInfo};
use crate::field_info::FieldInfo;
use crate::method_info::MethodInfo;

use binrw::binrw;

#[derive(Clone, Debug)]
#[binrw]
#[brw(big, magic = b"\xca\xfe\xba\xbe")]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub const_pool_size: u16,
    #[br(parse_with = read_const_pool, args(const_pool_size))]
    #[bw(write_with = write_const_pool)]
    pub const_pool: Vec<ConstantInfo>,
    pub access_flags: ClassAccessFlags,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces_count: u16,
    #[br(count = interfaces_count)]
    pub interfaces: Vec<u16>,
    pub fields_count: u16,
    #[br(count = fields_count)]
    pub fields: Vec<FieldInfo>,
    pub methods_count: u16,
    #[br(count = methods_count)]
    pub methods: Vec<MethodInfo>,
    pub attributes_count: u16,
    #[br(count = attributes_count)]
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    /// Internal name of the class at `this_class`.
    pub fn this_class_name(&self) -> Option<String> {
        crate::constant_info::class_name_at(&self.const_pool, self.this_class)
    }

    /// Internal name of the superclass; `None` for `java/lang/Object` itself.
    pub fn super_class_name(&self) -> Option<String> {
        if self.super_class == 0 {
            return None;
        }
        crate::constant_info::class_name_at(&self.const_pool, self.super_class)
    }

    pub fn interface_names(&self) -> Vec<String> {
        self.interfaces
            .iter()
            .filter_map(|&idx| crate::constant_info::class_name_at(&self.const_pool, idx))
            .collect()
    }

    /// Resolve a Utf8 constant by pool index.
    pub fn utf8(&self, index: u16) -> Option<String> {
        crate::constant_info::utf8_at(&self.const_pool, index)
    }

    /// Find an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes
            .iter()
            .find(|a| self.utf8(a.attribute_name_index).as_deref() == Some(name))
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[binrw]
pub struct ClassAccessFlags(u16);

bitflags! {
    impl ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;     //	Declared public; may be accessed from outside its package.
        const FINAL = 0x0010;      //	Declared final; no subclasses allowed.
        const SUPER = 0x0020;      //	Treat superclass methods specially when invoked by the invokespecial instruction.
        const INTERFACE = 0x0200;  //	Is an interface, not a class.
        const ABSTRACT = 0x0400;   //	Declared abstract; must not be instantiated.
        const SYNTHETIC = 0x1000;  //	Declared synthetic; not present in the source code.
        const ANNOTATION = 0x2000; //	Declared as an annotation type.
        const ENUM = 0x4000;       //	Declared as an enum type.
    }
}
