use super::*;

use mocha_compiler::attribute_info::{
    AnnotationDefaultAttribute, ElementValue, RuntimeAnnotation, RuntimeVisibleAnnotationsAttribute,
};
use mocha_compiler::ClassAccessFlags;

fn visible_annotations(class: &ClassFile, attributes: &[AttributeInfo]) -> Vec<RuntimeAnnotation> {
    let attr = attribute(class, attributes, "RuntimeVisibleAnnotations").expect("no RuntimeVisibleAnnotations");
    RuntimeVisibleAnnotationsAttribute::read_be(&mut Cursor::new(&attr.info))
        .unwrap()
        .annotations
}

fn find<'a>(class: &ClassFile, annotations: &'a [RuntimeAnnotation], descriptor: &str) -> &'a RuntimeAnnotation {
    annotations
        .iter()
        .find(|a| class.utf8(a.type_index).as_deref() == Some(descriptor))
        .unwrap_or_else(|| panic!("no annotation {}", descriptor))
}

#[test]
fn classes_record_their_implicit_imports() {
    let modules = compile_src("class A\n");
    let class = class_file(&modules, "A");
    let annotations = visible_annotations(&class, &class.attributes);
    let imports = find(&class, &annotations, "Lmocha/lang/ImplicitImports;");

    assert_eq!(imports.element_value_pairs.len(), 1);
    let pair = &imports.element_value_pairs[0];
    assert_eq!(class.utf8(pair.element_name_index).as_deref(), Some("implicitImports"));
    let ElementValue::Array(array) = &pair.value else {
        panic!("expected an array, got {:?}", pair.value);
    };
    let classes: Vec<String> = array
        .values
        .iter()
        .filter_map(|v| match v {
            ElementValue::ClassInfo(idx) => class.utf8(*idx),
            _ => None,
        })
        .collect();
    assert_eq!(classes, vec!["Lmocha/lang/implicit/PrimitivesImplicit;".to_string()]);
}

#[test]
fn annotation_types_keep_defaults_and_retention() {
    let modules = compile_src("annotation Tag\n    name:String = \"x\"\n    level:int\n@Tag(level=2)\nclass A\n");

    let tag = class_file(&modules, "Tag");
    assert!(tag.access_flags.contains(ClassAccessFlags::ANNOTATION | ClassAccessFlags::INTERFACE));
    assert_eq!(tag.interface_names(), vec!["java/lang/annotation/Annotation".to_string()]);
    let annotations = visible_annotations(&tag, &tag.attributes);
    let retention = find(&tag, &annotations, "Ljava/lang/annotation/Retention;");
    let ElementValue::EnumConst(policy) = &retention.element_value_pairs[0].value else {
        panic!("expected an enum constant");
    };
    assert_eq!(tag.utf8(policy.const_name_index).as_deref(), Some("RUNTIME"));

    let name = method(&tag, "name");
    assert_eq!(descriptor(&tag, name), "()Ljava/lang/String;");
    let default = attribute(&tag, &name.attributes, "AnnotationDefault").expect("name has a default");
    let default = AnnotationDefaultAttribute::read_be(&mut Cursor::new(&default.info)).unwrap();
    let ElementValue::String(idx) = default.default_value else {
        panic!("expected a string default");
    };
    assert_eq!(tag.utf8(idx).as_deref(), Some("x"));
    assert!(attribute(&tag, &method(&tag, "level").attributes, "AnnotationDefault").is_none());

    let a = class_file(&modules, "A");
    let annotations = visible_annotations(&a, &a.attributes);
    let used = find(&a, &annotations, "LTag;");
    assert_eq!(used.element_value_pairs.len(), 1);
    assert_eq!(a.utf8(used.element_value_pairs[0].element_name_index).as_deref(), Some("level"));
    assert!(matches!(used.element_value_pairs[0].value, ElementValue::Int(_)));
}

#[test]
fn method_annotations_are_written_on_the_method() {
    let modules = compile_src("annotation Marker\nclass A\n    @Marker\n    m():int = 1\n");
    let class = class_file(&modules, "A");
    let m = method(&class, "m");
    let annotations = visible_annotations(&class, &m.attributes);
    find(&class, &annotations, "LMarker;");
    assert!(attribute(&class, &m.attributes, "RuntimeVisibleParameterAnnotations").is_none());
}
