//! Type descriptors and the session-wide registry that owns them.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use crate::classpath::TypeProvider;
use crate::compile::ast::Modifier;
use crate::descriptor::{method_descriptor, JvmType, OBJECT};
use crate::field_info::FieldAccessFlags;
use crate::method_info::MethodAccessFlags;
use crate::types::ClassAccessFlags;

use super::ir::{FieldRef, InvokeKind, MethodRef};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Interface,
    Annotation,
}

/// A check re-run after every write to a guarded variable or field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Guard {
    NonNull,
    NonEmpty,
}

impl Guard {
    pub fn of(modifiers: &[Modifier]) -> Vec<Guard> {
        let mut out = Vec::new();
        if modifiers.contains(&Modifier::NonNull) {
            out.push(Guard::NonNull);
        }
        if modifiers.contains(&Modifier::NonEmpty) {
            out.push(Guard::NonEmpty);
        }
        out
    }

    pub fn label(self) -> &'static str {
        match self {
            Guard::NonNull => "nonnull",
            Guard::NonEmpty => "nonempty",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldSig {
    pub owner: String,
    pub name: String,
    pub ty: JvmType,
    pub access: FieldAccessFlags,
    /// Declared in source with `nonnull`/`nonempty`.
    pub guards: Vec<Guard>,
}

impl FieldSig {
    pub fn new(owner: &str, name: &str, ty: JvmType, access: FieldAccessFlags) -> Self {
        FieldSig {
            owner: owner.to_string(),
            name: name.to_string(),
            ty,
            access,
            guards: Vec::new(),
        }
    }

    pub fn with_guards(mut self, guards: Vec<Guard>) -> Self {
        self.guards = guards;
        self
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(FieldAccessFlags::STATIC)
    }

    pub fn field_ref(&self) -> FieldRef {
        FieldRef::new(&self.owner, &self.name, self.ty.clone())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodSig {
    pub owner: String,
    pub name: String,
    pub params: Vec<JvmType>,
    pub ret: JvmType,
    pub access: MethodAccessFlags,
}

impl MethodSig {
    pub fn new(owner: &str, name: &str, params: Vec<JvmType>, ret: JvmType, access: MethodAccessFlags) -> Self {
        MethodSig {
            owner: owner.to_string(),
            name: name.to_string(),
            params,
            ret,
            access,
        }
    }

    pub fn descriptor(&self) -> String {
        method_descriptor(&self.params, &self.ret)
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_abstract(&self) -> bool {
        self.access.contains(MethodAccessFlags::ABSTRACT)
    }

    pub fn method_ref(&self) -> MethodRef {
        MethodRef::new(&self.owner, &self.name, self.params.clone(), self.ret.clone())
    }

    /// `name(params)ret` for diagnostics.
    pub fn display(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.simple_name()).collect();
        format!("{}({}):{}", self.name, params.join(", "), self.ret.simple_name())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeDef {
    /// Internal name, `a/b/C`.
    pub name: String,
    pub kind: TypeKind,
    pub access: ClassAccessFlags,
    pub parent: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldSig>,
    pub methods: Vec<MethodSig>,
    pub constructors: Vec<MethodSig>,
    /// Singleton `object` type with a `singletonInstance` field.
    pub is_object: bool,
    /// Contributes `cast` conversions when imported implicitly.
    pub is_implicit: bool,
    pub from_source: bool,
    /// Only part of the members are known; a missing member is looked up
    /// at run time instead of being an error.
    pub partial: bool,
}

impl TypeDef {
    pub fn new(name: &str, kind: TypeKind) -> Self {
        let access = match kind {
            TypeKind::Class => ClassAccessFlags::PUBLIC,
            TypeKind::Interface => ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
            TypeKind::Annotation => {
                ClassAccessFlags::PUBLIC
                    | ClassAccessFlags::INTERFACE
                    | ClassAccessFlags::ABSTRACT
                    | ClassAccessFlags::ANNOTATION
            }
        };
        TypeDef {
            name: name.to_string(),
            kind,
            access,
            parent: if kind == TypeKind::Class && name != OBJECT {
                Some(OBJECT.to_string())
            } else {
                None
            },
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            is_object: false,
            is_implicit: false,
            from_source: false,
            partial: false,
        }
    }

    pub fn is_interface(&self) -> bool {
        self.kind != TypeKind::Class
    }

    pub fn is_abstract(&self) -> bool {
        self.access.contains(ClassAccessFlags::ABSTRACT)
    }

    /// Parent plus interfaces; interfaces see `Object` as their parent.
    pub fn direct_supers(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(parent) = &self.parent {
            out.push(parent.clone());
        }
        out.extend(self.interfaces.iter().cloned());
        if self.is_interface() && self.name != OBJECT {
            out.push(OBJECT.to_string());
        }
        out
    }

    pub fn declared_field(&self, name: &str) -> Option<&FieldSig> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Every type visible to one compilation session, keyed by internal name.
///
/// Source types are defined up front; everything else is loaded lazily from
/// the providers in order and cached, including misses.
pub struct TypeRegistry {
    types: RefCell<IndexMap<String, Rc<TypeDef>>>,
    missing: RefCell<HashSet<String>>,
    providers: Vec<Box<dyn TypeProvider>>,
}

impl TypeRegistry {
    pub fn new(providers: Vec<Box<dyn TypeProvider>>) -> Self {
        TypeRegistry {
            types: RefCell::new(IndexMap::new()),
            missing: RefCell::new(HashSet::new()),
            providers,
        }
    }

    pub fn get(&self, name: &str) -> Option<Rc<TypeDef>> {
        if let Some(def) = self.types.borrow().get(name) {
            return Some(def.clone());
        }
        if self.missing.borrow().contains(name) {
            return None;
        }
        let loaded = self.providers.iter().find_map(|p| p.load(name));
        match loaded {
            Some(def) => {
                trace!(name, "loaded class-path type");
                let def = Rc::new(def);
                self.types.borrow_mut().insert(name.to_string(), def.clone());
                Some(def)
            }
            None => {
                self.missing.borrow_mut().insert(name.to_string());
                None
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert or replace a definition.
    pub fn define(&self, def: TypeDef) {
        self.missing.borrow_mut().remove(&def.name);
        self.types.borrow_mut().insert(def.name.clone(), Rc::new(def));
    }

    pub fn update(&self, name: &str, f: impl FnOnce(&mut TypeDef)) {
        let current = self.types.borrow().get(name).cloned();
        if let Some(def) = current {
            let mut def = (*def).clone();
            f(&mut def);
            self.types.borrow_mut().insert(name.to_string(), Rc::new(def));
        }
    }

    /// Source-defined types in registration order.
    pub fn source_types(&self) -> Vec<Rc<TypeDef>> {
        self.types.borrow().values().filter(|d| d.from_source).cloned().collect()
    }

    /// Breadth-first walk over all supertypes with their distance.
    fn walk_supers(&self, name: &str) -> Vec<(String, u32)> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert(name.to_string());
        queue.push_back((name.to_string(), 0u32));
        while let Some((current, depth)) = queue.pop_front() {
            let Some(def) = self.get(&current) else {
                continue;
            };
            for sup in def.direct_supers() {
                if seen.insert(sup.clone()) {
                    out.push((sup.clone(), depth + 1));
                    queue.push_back((sup, depth + 1));
                }
            }
        }
        out
    }

    /// Whether `name` or one of its supertypes has an incomplete member
    /// table.
    pub fn has_partial_members(&self, name: &str) -> bool {
        std::iter::once(name.to_string())
            .chain(self.supertypes(name))
            .any(|t| self.get(&t).map_or(false, |d| d.partial))
    }

    /// All proper supertypes, nearest first.
    pub fn supertypes(&self, name: &str) -> Vec<String> {
        self.walk_supers(name).into_iter().map(|(n, _)| n).collect()
    }

    /// Number of inheritance edges from `from` up to `to`.
    pub fn super_distance(&self, from: &str, to: &str) -> Option<u32> {
        if from == to {
            return Some(0);
        }
        if to == OBJECT {
            // unknown class-path types still extend Object
            return Some(
                self.walk_supers(from)
                    .into_iter()
                    .find(|(n, _)| n == OBJECT)
                    .map_or(1, |(_, d)| d),
            );
        }
        self.walk_supers(from).into_iter().find(|(n, _)| n == to).map(|(_, d)| d)
    }

    pub fn is_subtype(&self, from: &str, to: &str) -> bool {
        self.super_distance(from, to).is_some()
    }

    /// Reference assignability, including arrays.
    pub fn assignable(&self, from: &JvmType, to: &JvmType) -> bool {
        match (from, to) {
            (JvmType::Null, t) => t.is_reference(),
            (JvmType::Reference(a), JvmType::Reference(b)) => self.is_subtype(a, b),
            (JvmType::Array(_), JvmType::Reference(b)) => {
                b == OBJECT || b == "java/lang/Cloneable" || b == "java/io/Serializable"
            }
            (JvmType::Array(a), JvmType::Array(b)) => {
                if a.is_primitive() || b.is_primitive() {
                    a == b
                } else {
                    self.assignable(a, b)
                }
            }
            (a, b) => a == b,
        }
    }

    pub fn find_field(&self, owner: &str, name: &str) -> Option<FieldSig> {
        if let Some(f) = self.get(owner).and_then(|d| d.declared_field(name).cloned()) {
            return Some(f);
        }
        self.supertypes(owner)
            .into_iter()
            .find_map(|sup| self.get(&sup).and_then(|d| d.declared_field(name).cloned()))
    }

    /// Methods named `name` visible on `owner`; an override hides the
    /// inherited method with the same parameters.
    pub fn find_methods(&self, owner: &str, name: &str) -> Vec<MethodSig> {
        let mut out: Vec<MethodSig> = Vec::new();
        let mut chain = vec![owner.to_string()];
        chain.extend(self.supertypes(owner));
        for ty in chain {
            let Some(def) = self.get(&ty) else { continue };
            for m in def.methods.iter().filter(|m| m.name == name) {
                if !out.iter().any(|o| o.params == m.params) {
                    out.push(m.clone());
                }
            }
        }
        out
    }

    pub fn constructors(&self, owner: &str) -> Vec<MethodSig> {
        self.get(owner).map(|d| d.constructors.clone()).unwrap_or_default()
    }

    /// How to call `sig`: interfaces need `invokeinterface`.
    pub fn invoke_kind(&self, sig: &MethodSig) -> InvokeKind {
        if sig.is_static() {
            InvokeKind::Static
        } else if self.get(&sig.owner).map_or(false, |d| d.is_interface()) {
            InvokeKind::Interface
        } else {
            InvokeKind::Virtual
        }
    }

    /// Abstract methods reachable from `name` with no concrete implementation
    /// anywhere in its class chain.
    pub fn unimplemented_abstract(&self, name: &str) -> Vec<MethodSig> {
        let mut chain = vec![name.to_string()];
        chain.extend(self.supertypes(name));

        let defs: Vec<Rc<TypeDef>> = chain.iter().filter_map(|n| self.get(n)).collect();
        let mut concrete: Vec<&MethodSig> = Vec::new();
        for def in &defs {
            if def.is_interface() {
                continue;
            }
            concrete.extend(def.methods.iter().filter(|m| !m.is_abstract() && !m.is_static()));
        }

        let mut missing: Vec<MethodSig> = Vec::new();
        for def in &defs {
            for m in def.methods.iter().filter(|m| m.is_abstract()) {
                let implemented = concrete.iter().any(|c| c.name == m.name && c.params == m.params);
                let seen = missing.iter().any(|x| x.name == m.name && x.params == m.params);
                if !implemented && !seen {
                    missing.push(m.clone());
                }
            }
        }
        missing
    }

    /// The single abstract method of a functional type.
    pub fn single_abstract_method(&self, name: &str) -> Option<MethodSig> {
        let def = self.get(name)?;
        let mut methods = self.unimplemented_abstract(name);
        if def.is_interface() {
            // interfaces may redeclare Object's public methods
            methods.retain(|m| !matches!(m.name.as_str(), "equals" | "hashCode" | "toString"));
        }
        if methods.len() == 1 {
            methods.pop()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classpath::BuiltinProvider;

    fn registry() -> TypeRegistry {
        TypeRegistry::new(vec![Box::new(BuiltinProvider::new())])
    }

    fn class(name: &str, parent: &str, interfaces: &[&str]) -> TypeDef {
        let mut def = TypeDef::new(name, TypeKind::Class);
        def.parent = Some(parent.to_string());
        def.interfaces = interfaces.iter().map(|s| s.to_string()).collect();
        def.from_source = true;
        def
    }

    #[test]
    fn distances_follow_the_hierarchy() {
        let reg = registry();
        assert_eq!(reg.super_distance("java/lang/Integer", "java/lang/Number"), Some(1));
        assert_eq!(reg.super_distance("java/lang/Integer", OBJECT), Some(2));
        assert_eq!(reg.super_distance("java/util/ArrayList", "java/util/List"), Some(1));
        assert!(reg.super_distance("java/lang/String", "java/lang/Integer").is_none());
    }

    #[test]
    fn overrides_hide_inherited_methods() {
        let reg = registry();
        let mut base = class("Base", OBJECT, &[]);
        base.methods.push(MethodSig::new("Base", "m", vec![JvmType::Int], JvmType::Void, MethodAccessFlags::PUBLIC));
        let mut derived = class("Derived", "Base", &[]);
        derived.methods.push(MethodSig::new("Derived", "m", vec![JvmType::Int], JvmType::Void, MethodAccessFlags::PUBLIC));
        reg.define(base);
        reg.define(derived);
        let found = reg.find_methods("Derived", "m");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].owner, "Derived");
    }

    #[test]
    fn reports_unimplemented_interface_methods() {
        let reg = registry();
        let mut iface = TypeDef::new("I", TypeKind::Interface);
        iface.methods.push(MethodSig::new(
            "I",
            "run",
            vec![],
            JvmType::Void,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        ));
        reg.define(iface);
        reg.define(class("C", OBJECT, &["I"]));
        let missing = reg.unimplemented_abstract("C");
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "run");
        assert_eq!(reg.single_abstract_method("I").map(|m| m.name), Some("run".to_string()));
    }

    #[test]
    fn missing_types_are_cached() {
        let reg = registry();
        assert!(reg.get("no/such/Type").is_none());
        reg.define(class("no/such/Type", OBJECT, &[]));
        assert!(reg.get("no/such/Type").is_some());
    }
}
