use crate::compile::semantic::{FieldSig, MethodSig, TypeDef, TypeKind};
use crate::descriptor::{parse_method_descriptor, parse_type_descriptor, JvmType, OBJECT};
use crate::field_info::FieldAccessFlags;
use crate::method_info::MethodAccessFlags;
use crate::types::ClassAccessFlags;

use super::TypeProvider;

const P: u16 = 0x0001;
const PS: u16 = 0x0009;
const PA: u16 = 0x0401;
const PSF: u16 = 0x0019;

struct Stub {
    name: &'static str,
    kind: TypeKind,
    parent: Option<&'static str>,
    interfaces: &'static [&'static str],
    abstract_class: bool,
    /// `(name, descriptor, flags)`; `<init>` entries are constructors and
    /// descriptors not starting with `(` are fields.
    members: &'static [(&'static str, &'static str, u16)],
}

const fn class(
    name: &'static str,
    parent: Option<&'static str>,
    interfaces: &'static [&'static str],
    members: &'static [(&'static str, &'static str, u16)],
) -> Stub {
    Stub {
        name,
        kind: TypeKind::Class,
        parent,
        interfaces,
        abstract_class: false,
        members,
    }
}

const fn interface(
    name: &'static str,
    interfaces: &'static [&'static str],
    members: &'static [(&'static str, &'static str, u16)],
) -> Stub {
    Stub {
        name,
        kind: TypeKind::Interface,
        parent: None,
        interfaces,
        abstract_class: false,
        members,
    }
}

const THROWABLE_CTORS: &[(&str, &str, u16)] = &[
    ("<init>", "()V", P),
    ("<init>", "(Ljava/lang/String;)V", P),
    ("<init>", "(Ljava/lang/String;Ljava/lang/Throwable;)V", P),
];

const COLLECTION: &[(&str, &str, u16)] = &[
    ("size", "()I", PA),
    ("isEmpty", "()Z", PA),
    ("contains", "(Ljava/lang/Object;)Z", PA),
    ("add", "(Ljava/lang/Object;)Z", PA),
    ("remove", "(Ljava/lang/Object;)Z", PA),
    ("addAll", "(Ljava/util/Collection;)Z", PA),
    ("clear", "()V", PA),
    ("toArray", "()[Ljava/lang/Object;", PA),
];

const LIST: &[(&str, &str, u16)] = &[
    ("get", "(I)Ljava/lang/Object;", PA),
    ("set", "(ILjava/lang/Object;)Ljava/lang/Object;", PA),
    ("add", "(ILjava/lang/Object;)V", PA),
    ("remove", "(I)Ljava/lang/Object;", PA),
    ("indexOf", "(Ljava/lang/Object;)I", PA),
    ("subList", "(II)Ljava/util/List;", PA),
];

const MAP: &[(&str, &str, u16)] = &[
    ("get", "(Ljava/lang/Object;)Ljava/lang/Object;", PA),
    ("put", "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;", PA),
    ("containsKey", "(Ljava/lang/Object;)Z", PA),
    ("remove", "(Ljava/lang/Object;)Ljava/lang/Object;", PA),
    ("size", "()I", PA),
    ("isEmpty", "()Z", PA),
    ("keySet", "()Ljava/util/Set;", PA),
    ("values", "()Ljava/util/Collection;", PA),
];

const HASH_MAP: &[(&str, &str, u16)] = &[
    ("<init>", "()V", P),
    ("get", "(Ljava/lang/Object;)Ljava/lang/Object;", P),
    ("put", "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;", P),
    ("containsKey", "(Ljava/lang/Object;)Z", P),
    ("remove", "(Ljava/lang/Object;)Ljava/lang/Object;", P),
    ("size", "()I", P),
    ("isEmpty", "()Z", P),
    ("keySet", "()Ljava/util/Set;", P),
    ("values", "()Ljava/util/Collection;", P),
];

const PRINT: &[(&str, &str, u16)] = &[
    ("println", "()V", P),
    ("println", "(I)V", P),
    ("println", "(J)V", P),
    ("println", "(F)V", P),
    ("println", "(D)V", P),
    ("println", "(Z)V", P),
    ("println", "(C)V", P),
    ("println", "(Ljava/lang/String;)V", P),
    ("println", "(Ljava/lang/Object;)V", P),
    ("print", "(I)V", P),
    ("print", "(J)V", P),
    ("print", "(D)V", P),
    ("print", "(Z)V", P),
    ("print", "(C)V", P),
    ("print", "(Ljava/lang/String;)V", P),
    ("print", "(Ljava/lang/Object;)V", P),
];

const STUBS: &[Stub] = &[
    class(
        OBJECT,
        None,
        &[],
        &[
            ("<init>", "()V", P),
            ("equals", "(Ljava/lang/Object;)Z", P),
            ("hashCode", "()I", P),
            ("toString", "()Ljava/lang/String;", P),
            ("getClass", "()Ljava/lang/Class;", P),
        ],
    ),
    class(
        "java/lang/String",
        None,
        &["java/lang/CharSequence", "java/lang/Comparable", "java/io/Serializable"],
        &[
            ("<init>", "()V", P),
            ("length", "()I", P),
            ("charAt", "(I)C", P),
            ("isEmpty", "()Z", P),
            ("substring", "(I)Ljava/lang/String;", P),
            ("substring", "(II)Ljava/lang/String;", P),
            ("indexOf", "(Ljava/lang/String;)I", P),
            ("contains", "(Ljava/lang/CharSequence;)Z", P),
            ("startsWith", "(Ljava/lang/String;)Z", P),
            ("endsWith", "(Ljava/lang/String;)Z", P),
            ("concat", "(Ljava/lang/String;)Ljava/lang/String;", P),
            ("trim", "()Ljava/lang/String;", P),
            ("toUpperCase", "()Ljava/lang/String;", P),
            ("toLowerCase", "()Ljava/lang/String;", P),
            ("split", "(Ljava/lang/String;)[Ljava/lang/String;", P),
            ("compareTo", "(Ljava/lang/String;)I", P),
            ("valueOf", "(Ljava/lang/Object;)Ljava/lang/String;", PS),
        ],
    ),
    interface("java/lang/CharSequence", &[], &[("length", "()I", PA), ("charAt", "(I)C", PA)]),
    interface("java/lang/Comparable", &[], &[("compareTo", "(Ljava/lang/Object;)I", PA)]),
    interface("java/lang/Runnable", &[], &[("run", "()V", PA)]),
    interface("java/lang/Iterable", &[], &[("iterator", "()Ljava/util/Iterator;", PA)]),
    interface("java/lang/Cloneable", &[], &[]),
    interface("java/io/Serializable", &[], &[]),
    class(
        "java/lang/StringBuilder",
        None,
        &["java/lang/CharSequence"],
        &[
            ("<init>", "()V", P),
            ("<init>", "(Ljava/lang/String;)V", P),
            ("append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;", P),
            ("append", "(Ljava/lang/Object;)Ljava/lang/StringBuilder;", P),
            ("append", "(I)Ljava/lang/StringBuilder;", P),
            ("append", "(J)Ljava/lang/StringBuilder;", P),
            ("append", "(F)Ljava/lang/StringBuilder;", P),
            ("append", "(D)Ljava/lang/StringBuilder;", P),
            ("append", "(Z)Ljava/lang/StringBuilder;", P),
            ("append", "(C)Ljava/lang/StringBuilder;", P),
            ("length", "()I", P),
            ("charAt", "(I)C", P),
            ("toString", "()Ljava/lang/String;", P),
        ],
    ),
    Stub {
        name: "java/lang/Number",
        kind: TypeKind::Class,
        parent: None,
        interfaces: &["java/io/Serializable"],
        abstract_class: true,
        members: &[
            ("<init>", "()V", P),
            ("intValue", "()I", PA),
            ("longValue", "()J", PA),
            ("floatValue", "()F", PA),
            ("doubleValue", "()D", PA),
            ("byteValue", "()B", P),
            ("shortValue", "()S", P),
        ],
    },
    class(
        "java/lang/Integer",
        Some("java/lang/Number"),
        &["java/lang/Comparable"],
        &[
            ("<init>", "(I)V", P),
            ("valueOf", "(I)Ljava/lang/Integer;", PS),
            ("parseInt", "(Ljava/lang/String;)I", PS),
            ("intValue", "()I", P),
            ("longValue", "()J", P),
            ("floatValue", "()F", P),
            ("doubleValue", "()D", P),
            ("TYPE", "Ljava/lang/Class;", PSF),
            ("MAX_VALUE", "I", PSF),
            ("MIN_VALUE", "I", PSF),
        ],
    ),
    class(
        "java/lang/Long",
        Some("java/lang/Number"),
        &["java/lang/Comparable"],
        &[
            ("<init>", "(J)V", P),
            ("valueOf", "(J)Ljava/lang/Long;", PS),
            ("parseLong", "(Ljava/lang/String;)J", PS),
            ("intValue", "()I", P),
            ("longValue", "()J", P),
            ("floatValue", "()F", P),
            ("doubleValue", "()D", P),
            ("TYPE", "Ljava/lang/Class;", PSF),
            ("MAX_VALUE", "J", PSF),
            ("MIN_VALUE", "J", PSF),
        ],
    ),
    class(
        "java/lang/Float",
        Some("java/lang/Number"),
        &["java/lang/Comparable"],
        &[
            ("<init>", "(F)V", P),
            ("valueOf", "(F)Ljava/lang/Float;", PS),
            ("intValue", "()I", P),
            ("longValue", "()J", P),
            ("floatValue", "()F", P),
            ("doubleValue", "()D", P),
            ("TYPE", "Ljava/lang/Class;", PSF),
        ],
    ),
    class(
        "java/lang/Double",
        Some("java/lang/Number"),
        &["java/lang/Comparable"],
        &[
            ("<init>", "(D)V", P),
            ("valueOf", "(D)Ljava/lang/Double;", PS),
            ("parseDouble", "(Ljava/lang/String;)D", PS),
            ("intValue", "()I", P),
            ("longValue", "()J", P),
            ("floatValue", "()F", P),
            ("doubleValue", "()D", P),
            ("TYPE", "Ljava/lang/Class;", PSF),
        ],
    ),
    class(
        "java/lang/Short",
        Some("java/lang/Number"),
        &["java/lang/Comparable"],
        &[
            ("valueOf", "(S)Ljava/lang/Short;", PS),
            ("intValue", "()I", P),
            ("longValue", "()J", P),
            ("floatValue", "()F", P),
            ("doubleValue", "()D", P),
            ("shortValue", "()S", P),
            ("TYPE", "Ljava/lang/Class;", PSF),
        ],
    ),
    class(
        "java/lang/Byte",
        Some("java/lang/Number"),
        &["java/lang/Comparable"],
        &[
            ("valueOf", "(B)Ljava/lang/Byte;", PS),
            ("intValue", "()I", P),
            ("longValue", "()J", P),
            ("floatValue", "()F", P),
            ("doubleValue", "()D", P),
            ("byteValue", "()B", P),
            ("TYPE", "Ljava/lang/Class;", PSF),
        ],
    ),
    class(
        "java/lang/Character",
        None,
        &["java/lang/Comparable", "java/io/Serializable"],
        &[
            ("valueOf", "(C)Ljava/lang/Character;", PS),
            ("charValue", "()C", P),
            ("TYPE", "Ljava/lang/Class;", PSF),
        ],
    ),
    class(
        "java/lang/Boolean",
        None,
        &["java/lang/Comparable", "java/io/Serializable"],
        &[
            ("valueOf", "(Z)Ljava/lang/Boolean;", PS),
            ("booleanValue", "()Z", P),
            ("TYPE", "Ljava/lang/Class;", PSF),
            ("TRUE", "Ljava/lang/Boolean;", PSF),
            ("FALSE", "Ljava/lang/Boolean;", PSF),
        ],
    ),
    class("java/lang/Void", None, &[], &[("TYPE", "Ljava/lang/Class;", PSF)]),
    class(
        "java/lang/Math",
        None,
        &[],
        &[
            ("pow", "(DD)D", PS),
            ("sqrt", "(D)D", PS),
            ("abs", "(I)I", PS),
            ("abs", "(J)J", PS),
            ("abs", "(D)D", PS),
            ("max", "(II)I", PS),
            ("max", "(JJ)J", PS),
            ("max", "(DD)D", PS),
            ("min", "(II)I", PS),
            ("min", "(JJ)J", PS),
            ("min", "(DD)D", PS),
        ],
    ),
    class(
        "java/lang/System",
        None,
        &[],
        &[
            ("out", "Ljava/io/PrintStream;", PSF),
            ("err", "Ljava/io/PrintStream;", PSF),
            ("currentTimeMillis", "()J", PS),
            ("nanoTime", "()J", PS),
            ("exit", "(I)V", PS),
        ],
    ),
    class("java/io/PrintStream", None, &[], PRINT),
    class(
        "java/lang/Class",
        None,
        &[],
        &[
            ("getName", "()Ljava/lang/String;", P),
            ("isInstance", "(Ljava/lang/Object;)Z", P),
        ],
    ),
    class(
        "java/lang/Throwable",
        None,
        &["java/io/Serializable"],
        &[
            ("<init>", "()V", P),
            ("<init>", "(Ljava/lang/String;)V", P),
            ("<init>", "(Ljava/lang/String;Ljava/lang/Throwable;)V", P),
            ("getMessage", "()Ljava/lang/String;", P),
            ("getCause", "()Ljava/lang/Throwable;", P),
            ("printStackTrace", "()V", P),
        ],
    ),
    class("java/lang/Exception", Some("java/lang/Throwable"), &[], THROWABLE_CTORS),
    class("java/lang/Error", Some("java/lang/Throwable"), &[], THROWABLE_CTORS),
    class("java/lang/RuntimeException", Some("java/lang/Exception"), &[], THROWABLE_CTORS),
    class("java/lang/IllegalArgumentException", Some("java/lang/RuntimeException"), &[], THROWABLE_CTORS),
    class("java/lang/IllegalStateException", Some("java/lang/RuntimeException"), &[], THROWABLE_CTORS),
    class("java/lang/UnsupportedOperationException", Some("java/lang/RuntimeException"), &[], THROWABLE_CTORS),
    class("java/lang/ArithmeticException", Some("java/lang/RuntimeException"), &[], &[("<init>", "()V", P), ("<init>", "(Ljava/lang/String;)V", P)]),
    class("java/lang/NullPointerException", Some("java/lang/RuntimeException"), &[], &[("<init>", "()V", P), ("<init>", "(Ljava/lang/String;)V", P)]),
    class("java/lang/ClassCastException", Some("java/lang/RuntimeException"), &[], &[("<init>", "()V", P), ("<init>", "(Ljava/lang/String;)V", P)]),
    class("java/lang/IndexOutOfBoundsException", Some("java/lang/RuntimeException"), &[], &[("<init>", "()V", P), ("<init>", "(Ljava/lang/String;)V", P)]),
    interface(
        "java/util/Iterator",
        &[],
        &[
            ("hasNext", "()Z", PA),
            ("next", "()Ljava/lang/Object;", PA),
            ("remove", "()V", PA),
        ],
    ),
    interface("java/util/Collection", &["java/lang/Iterable"], COLLECTION),
    interface("java/util/List", &["java/util/Collection"], LIST),
    interface("java/util/Set", &["java/util/Collection"], &[]),
    interface("java/util/Map", &[], MAP),
    interface("java/util/RandomAccess", &[], &[]),
    class(
        "java/util/ArrayList",
        None,
        &["java/util/List", "java/util/RandomAccess", "java/lang/Cloneable", "java/io/Serializable"],
        &[
            ("<init>", "()V", P),
            ("<init>", "(I)V", P),
            ("<init>", "(Ljava/util/Collection;)V", P),
            ("add", "(Ljava/lang/Object;)Z", P),
            ("add", "(ILjava/lang/Object;)V", P),
            ("get", "(I)Ljava/lang/Object;", P),
            ("set", "(ILjava/lang/Object;)Ljava/lang/Object;", P),
            ("remove", "(I)Ljava/lang/Object;", P),
            ("remove", "(Ljava/lang/Object;)Z", P),
            ("size", "()I", P),
            ("isEmpty", "()Z", P),
            ("contains", "(Ljava/lang/Object;)Z", P),
            ("indexOf", "(Ljava/lang/Object;)I", P),
            ("clear", "()V", P),
            ("addAll", "(Ljava/util/Collection;)Z", P),
            ("iterator", "()Ljava/util/Iterator;", P),
            ("toArray", "()[Ljava/lang/Object;", P),
            ("subList", "(II)Ljava/util/List;", P),
        ],
    ),
    class(
        "java/util/HashSet",
        None,
        &["java/util/Set", "java/lang/Cloneable", "java/io/Serializable"],
        &[
            ("<init>", "()V", P),
            ("add", "(Ljava/lang/Object;)Z", P),
            ("remove", "(Ljava/lang/Object;)Z", P),
            ("contains", "(Ljava/lang/Object;)Z", P),
            ("size", "()I", P),
            ("isEmpty", "()Z", P),
            ("clear", "()V", P),
            ("addAll", "(Ljava/util/Collection;)Z", P),
            ("iterator", "()Ljava/util/Iterator;", P),
            ("toArray", "()[Ljava/lang/Object;", P),
        ],
    ),
    class("java/util/HashMap", None, &["java/util/Map", "java/lang/Cloneable", "java/io/Serializable"], HASH_MAP),
    class("java/util/LinkedHashMap", Some("java/util/HashMap"), &["java/util/Map"], &[("<init>", "()V", P)]),
    class(
        "java/util/Objects",
        None,
        &[],
        &[
            ("equals", "(Ljava/lang/Object;Ljava/lang/Object;)Z", PS),
            ("hashCode", "(Ljava/lang/Object;)I", PS),
            ("toString", "(Ljava/lang/Object;)Ljava/lang/String;", PS),
            ("requireNonNull", "(Ljava/lang/Object;)Ljava/lang/Object;", PS),
        ],
    ),
    class(
        "java/util/Arrays",
        None,
        &[],
        &[
            ("hashCode", "([Ljava/lang/Object;)I", PS),
            ("asList", "([Ljava/lang/Object;)Ljava/util/List;", PS),
            ("toString", "([Ljava/lang/Object;)Ljava/lang/String;", PS),
        ],
    ),
    interface("java/lang/annotation/Annotation", &[], &[]),
    Stub {
        name: "java/lang/annotation/Retention",
        kind: TypeKind::Annotation,
        parent: None,
        interfaces: &["java/lang/annotation/Annotation"],
        abstract_class: false,
        members: &[("value", "()Ljava/lang/annotation/RetentionPolicy;", PA)],
    },
    class(
        "java/lang/annotation/RetentionPolicy",
        None,
        &[],
        &[
            ("SOURCE", "Ljava/lang/annotation/RetentionPolicy;", PSF),
            ("CLASS", "Ljava/lang/annotation/RetentionPolicy;", PSF),
            ("RUNTIME", "Ljava/lang/annotation/RetentionPolicy;", PSF),
        ],
    ),
    Stub {
        name: "java/lang/Deprecated",
        kind: TypeKind::Annotation,
        parent: None,
        interfaces: &["java/lang/annotation/Annotation"],
        abstract_class: false,
        members: &[],
    },
    class(
        "mocha/lang/Dynamic",
        None,
        &[],
        &[(
            "invoke",
            "(Ljava/lang/Class;Ljava/lang/Object;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/Object;",
            PS,
        )],
    ),
    class(
        "mocha/lang/Pointer",
        None,
        &[],
        &[
            ("<init>", "()V", P),
            ("get", "()Ljava/lang/Object;", P),
            ("set", "(Ljava/lang/Object;)V", P),
        ],
    ),
    class("mocha/lang/RangeList", None, &["java/util/List"], &[("<init>", "(IIZ)V", P)]),
    class(
        "mocha/lang/Runtime",
        None,
        &[],
        &[
            ("castToBool", "(Ljava/lang/Object;)Z", PS),
            ("castToInt", "(Ljava/lang/Object;)I", PS),
            ("castToLong", "(Ljava/lang/Object;)J", PS),
            ("castToFloat", "(Ljava/lang/Object;)F", PS),
            ("castToDouble", "(Ljava/lang/Object;)D", PS),
            ("castToByte", "(Ljava/lang/Object;)B", PS),
            ("castToShort", "(Ljava/lang/Object;)S", PS),
            ("castToChar", "(Ljava/lang/Object;)C", PS),
            ("is", "(Ljava/lang/Object;Ljava/lang/Object;)Z", PS),
            ("iterator", "(Ljava/lang/Object;)Ljava/util/Iterator;", PS),
            (
                "getField",
                "(Ljava/lang/Object;Ljava/lang/String;Ljava/lang/Class;)Ljava/lang/Object;",
                PS,
            ),
            (
                "putField",
                "(Ljava/lang/Object;Ljava/lang/String;Ljava/lang/Object;Ljava/lang/Class;)V",
                PS,
            ),
        ],
    ),
    class(
        "mocha/lang/GuardViolationError",
        Some("java/lang/RuntimeException"),
        &[],
        &[("<init>", "(Ljava/lang/String;)V", P)],
    ),
    class(
        "mocha/lang/MatchError",
        Some("java/lang/RuntimeException"),
        &[],
        &[("<init>", "(Ljava/lang/Object;)V", P)],
    ),
    Stub {
        name: "mocha/lang/ImplicitImports",
        kind: TypeKind::Annotation,
        parent: None,
        interfaces: &["java/lang/annotation/Annotation"],
        abstract_class: false,
        members: &[("implicitImports", "()[Ljava/lang/Class;", PA)],
    },
    Stub {
        name: "mocha/lang/Implicit",
        kind: TypeKind::Annotation,
        parent: None,
        interfaces: &["java/lang/annotation/Annotation"],
        abstract_class: false,
        members: &[],
    },
    class(
        "mocha/lang/implicit/PrimitivesImplicit",
        None,
        &[],
        &[("singletonInstance", "Lmocha/lang/implicit/PrimitivesImplicit;", PSF)],
    ),
];

pub const FUNCTION_PREFIX: &str = "mocha/lang/function/Function";
pub const MAX_FUNCTION_ARITY: usize = 9;

/// Internal name of the generic function interface for `arity` parameters.
pub fn function_type(arity: usize) -> String {
    format!("{}{}", FUNCTION_PREFIX, arity)
}

/// Stub definitions for the JDK classes and runtime helpers emitted code
/// relies on.
#[derive(Debug, Default)]
pub struct BuiltinProvider;

impl BuiltinProvider {
    pub fn new() -> Self {
        BuiltinProvider
    }
}

impl TypeProvider for BuiltinProvider {
    fn load(&self, internal_name: &str) -> Option<TypeDef> {
        if let Some(arity) = internal_name.strip_prefix(FUNCTION_PREFIX) {
            let arity: usize = arity.parse().ok()?;
            return (arity <= MAX_FUNCTION_ARITY).then(|| function_def(arity));
        }
        STUBS.iter().find(|s| s.name == internal_name).map(build)
    }
}

fn function_def(arity: usize) -> TypeDef {
    let name = function_type(arity);
    let mut def = TypeDef::new(&name, TypeKind::Interface);
    def.methods.push(MethodSig::new(
        &name,
        "apply",
        vec![JvmType::object(); arity],
        JvmType::object(),
        MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
    ));
    def
}

fn build(stub: &Stub) -> TypeDef {
    let mut def = TypeDef::new(stub.name, stub.kind);
    if let Some(parent) = stub.parent {
        def.parent = Some(parent.to_string());
    }
    if stub.abstract_class {
        def.access |= ClassAccessFlags::ABSTRACT;
    }
    def.interfaces = stub.interfaces.iter().map(|s| s.to_string()).collect();
    for &(name, desc, flags) in stub.members {
        if let Some((params, ret)) = parse_method_descriptor(desc) {
            let sig = MethodSig::new(stub.name, name, params, ret, MethodAccessFlags::from_bits_truncate(flags));
            if name == "<init>" {
                def.constructors.push(sig);
            } else {
                def.methods.push(sig);
            }
        } else if let Some(ty) = parse_type_descriptor(desc) {
            def.fields
                .push(FieldSig::new(stub.name, name, ty, FieldAccessFlags::from_bits_truncate(flags)));
        }
    }
    def.is_object = def.fields.iter().any(|f| f.name == "singletonInstance" && f.is_static());
    def.is_implicit = stub.name == "mocha/lang/implicit/PrimitivesImplicit";
    // JDK stubs list only the commonly used members
    def.partial = stub.name.starts_with("java/") && stub.name != OBJECT;
    def
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_stub_descriptor_parses() {
        for stub in STUBS {
            for &(name, desc, _) in stub.members {
                assert!(
                    parse_method_descriptor(desc).is_some() || parse_type_descriptor(desc).is_some(),
                    "{}.{} has a bad descriptor {}",
                    stub.name,
                    name,
                    desc
                );
            }
        }
    }

    #[test]
    fn function_interfaces_are_synthesized() {
        let provider = BuiltinProvider::new();
        let f2 = provider.load("mocha/lang/function/Function2").unwrap();
        assert!(f2.is_interface());
        assert_eq!(f2.methods[0].params.len(), 2);
        assert!(provider.load("mocha/lang/function/Function10").is_none());
    }

    #[test]
    fn object_has_no_parent() {
        let provider = BuiltinProvider::new();
        assert_eq!(provider.load(OBJECT).unwrap().parent, None);
        assert_eq!(
            provider.load("java/lang/Integer").unwrap().parent.as_deref(),
            Some("java/lang/Number")
        );
        assert!(provider.load("mocha/lang/implicit/PrimitivesImplicit").unwrap().is_object);
    }
}
