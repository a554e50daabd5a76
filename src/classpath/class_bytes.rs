use std::collections::HashMap;
use std::io::Cursor;

use binrw::{BinRead, BinResult};
use tracing::warn;

use crate::compile::semantic::{FieldSig, MethodSig, TypeDef, TypeKind};
use crate::compile::CompiledModules;
use crate::descriptor::{parse_method_descriptor, parse_type_descriptor};
use crate::types::{ClassAccessFlags, ClassFile};

use super::TypeProvider;

/// Types backed by compiled `.class` bytes, e.g. the output of an earlier
/// session.
#[derive(Clone, Debug, Default)]
pub struct ClassBytesProvider {
    classes: HashMap<String, Vec<u8>>,
}

impl ClassBytesProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one class file; returns its internal name.
    pub fn add(&mut self, bytes: Vec<u8>) -> BinResult<String> {
        let class = ClassFile::read(&mut Cursor::new(&bytes))?;
        let name = class.this_class_name().ok_or_else(|| binrw::Error::AssertFail {
            pos: 0,
            message: "this_class does not name a class constant".into(),
        })?;
        self.classes.insert(name.clone(), bytes);
        Ok(name)
    }

    pub fn from_modules(modules: &CompiledModules) -> BinResult<Self> {
        let mut provider = Self::new();
        for (_, bytes) in modules.iter() {
            provider.add(bytes.to_vec())?;
        }
        Ok(provider)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl TypeProvider for ClassBytesProvider {
    fn load(&self, internal_name: &str) -> Option<TypeDef> {
        let bytes = self.classes.get(internal_name)?;
        match ClassFile::read(&mut Cursor::new(bytes)) {
            Ok(class) => type_def_from_class(&class),
            Err(err) => {
                warn!(internal_name, %err, "unreadable class bytes");
                None
            }
        }
    }
}

/// Member signatures of a parsed class file.
pub fn type_def_from_class(class: &ClassFile) -> Option<TypeDef> {
    let name = class.this_class_name()?;
    let kind = if class.access_flags.contains(ClassAccessFlags::ANNOTATION) {
        TypeKind::Annotation
    } else if class.access_flags.contains(ClassAccessFlags::INTERFACE) {
        TypeKind::Interface
    } else {
        TypeKind::Class
    };
    let mut def = TypeDef::new(&name, kind);
    def.access = class.access_flags;
    def.parent = class.super_class_name();
    if kind != TypeKind::Class {
        def.parent = None;
    }
    def.interfaces = class.interface_names();

    for field in &class.fields {
        let (field_name, descriptor) = field.signature(&class.const_pool)?;
        let ty = parse_type_descriptor(&descriptor)?;
        def.fields.push(FieldSig::new(&name, &field_name, ty, field.access_flags));
    }
    for method in &class.methods {
        let (method_name, descriptor) = method.signature(&class.const_pool)?;
        if method_name == "<clinit>" {
            continue;
        }
        let (params, ret) = parse_method_descriptor(&descriptor)?;
        let sig = MethodSig::new(&name, &method_name, params, ret, method.access_flags);
        if method_name == "<init>" {
            def.constructors.push(sig);
        } else {
            def.methods.push(sig);
        }
    }
    def.is_object = def.fields.iter().any(|f| f.name == "singletonInstance" && f.is_static());
    def.is_implicit = class.attribute("RuntimeVisibleAnnotations").map_or(false, |attr| {
        // the Implicit marker is the only annotation we need to recognise here
        let marker = "Lmocha/lang/Implicit;";
        class.const_pool.iter().any(|c| matches!(c, crate::constant_info::ConstantInfo::Utf8(u) if u.value() == marker))
            && !attr.info.is_empty()
    });
    Some(def)
}
