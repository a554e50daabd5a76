use super::*;

use mocha_compiler::field_info::FieldAccessFlags;
use mocha_compiler::method_info::MethodAccessFlags;
use mocha_compiler::ClassAccessFlags;

#[test]
fn packages_name_the_module() {
    let modules = compile_src("package demo::app\nclass Greeter\n    greet(name:String):String = \"hi \" + name\n");
    assert_eq!(modules.names().collect::<Vec<_>>(), vec!["demo.app.Greeter"]);

    let class = class_file(&modules, "demo.app.Greeter");
    assert_eq!(class.this_class_name().as_deref(), Some("demo/app/Greeter"));
    assert_eq!(class.super_class_name().as_deref(), Some("java/lang/Object"));
    assert_eq!((class.major_version, class.minor_version), (49, 0));
    assert!(class.access_flags.contains(ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER));

    let greet = method(&class, "greet");
    assert_eq!(descriptor(&class, greet), "(Ljava/lang/String;)Ljava/lang/String;");
    let code = code(&class, greet);
    assert!(code.max_locals >= 2);
    assert!(code.max_stack >= 2);
    assert_eq!(code.code.last(), Some(&0xb0)); // areturn
}

#[test]
fn every_class_gets_a_source_file() {
    let modules = compile_src("class A\n");
    let class = class_file(&modules, "A");
    assert!(class.attribute("SourceFile").is_some());
    assert!(!methods(&class, "<init>").is_empty());
}

#[test]
fn interfaces_are_abstract_and_implemented() {
    let modules = compile_src("interface Shape\n    area():double\nclass Square(side:double):Shape\n    area():double = side * side\n");

    let shape = class_file(&modules, "Shape");
    assert!(shape
        .access_flags
        .contains(ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT));
    let area = method(&shape, "area");
    assert!(area.access_flags.contains(MethodAccessFlags::ABSTRACT));
    assert!(attribute(&shape, &area.attributes, "Code").is_none());

    let square = class_file(&modules, "Square");
    assert_eq!(square.interface_names(), vec!["Shape".to_string()]);
    let area = method(&square, "area");
    assert_eq!(descriptor(&square, area), "()D");
    assert_eq!(code(&square, area).code.last(), Some(&0xaf)); // dreturn
    let ctor = method(&square, "<init>");
    assert_eq!(descriptor(&square, ctor), "(D)V");
}

#[test]
fn objects_hold_a_singleton() {
    let modules = compile_src("object Registry\n    size() = 0\n");
    let class = class_file(&modules, "Registry");

    let singleton = class
        .fields
        .iter()
        .find(|f| class.utf8(f.name_index).as_deref() == Some("singletonInstance"))
        .expect("singleton field");
    assert!(singleton.access_flags.contains(FieldAccessFlags::STATIC));
    assert_eq!(class.utf8(singleton.descriptor_index).as_deref(), Some("LRegistry;"));

    let ctor = method(&class, "<init>");
    assert!(ctor.access_flags.contains(MethodAccessFlags::PRIVATE));
    let clinit = method(&class, "<clinit>");
    assert!(clinit.access_flags.contains(MethodAccessFlags::STATIC));
}

#[test]
fn data_classes_carry_structural_members() {
    let modules = compile_src("data class Point(x:int, y:int)\n");
    let class = class_file(&modules, "Point");

    let expected = [
        ("getX", "()I"),
        ("getY", "()I"),
        ("equals", "(Ljava/lang/Object;)Z"),
        ("hashCode", "()I"),
        ("toString", "()Ljava/lang/String;"),
    ];
    for (name, desc) in expected {
        assert_eq!(descriptor(&class, method(&class, name)), desc, "{}", name);
    }
    let unapply = method(&class, "unapply");
    assert!(unapply.access_flags.contains(MethodAccessFlags::STATIC));

    let fields: Vec<String> = class.fields.iter().filter_map(|f| class.utf8(f.name_index)).collect();
    assert_eq!(fields, vec!["x".to_string(), "y".to_string()]);
}

#[test]
fn default_parameters_generate_overloads() {
    let modules = compile_src("class C\n    m(x:int, y:int = 3):int = x + y\n");
    let class = class_file(&modules, "C");
    let mut descriptors: Vec<String> = methods(&class, "m").into_iter().map(|m| descriptor(&class, m)).collect();
    descriptors.sort();
    assert_eq!(descriptors, vec!["(I)I".to_string(), "(II)I".to_string()]);
}

#[test]
fn lambdas_become_function_classes() {
    let modules = compile_src("class A\n    m():Object = (x) -> x\n");
    assert_eq!(modules.names().collect::<Vec<_>>(), vec!["A", "A$Mocha$Lambda$1"]);

    let lambda = class_file(&modules, "A$Mocha$Lambda$1");
    assert!(lambda
        .access_flags
        .contains(ClassAccessFlags::FINAL | ClassAccessFlags::SYNTHETIC));
    assert_eq!(lambda.interface_names(), vec!["mocha/lang/function/Function1".to_string()]);
    let apply = lambda
        .methods
        .iter()
        .find(|m| lambda.utf8(m.name_index).as_deref() != Some("<init>"))
        .expect("functional method");
    assert!(attribute(&lambda, &apply.attributes, "Code").is_some());
}

#[test]
fn closures_hold_one_cell_per_captured_local() {
    for header in ["    static m():Object\n", "    m():Object\n"] {
        let src = format!(
            "class A\n{}        a = 1\n        b = 2\n        c = 3\n        return (x) -> x + a + b\n",
            header
        );
        let modules = compile_src(&src);
        let lambda = class_file(&modules, "A$Mocha$Lambda$1");
        let fields: Vec<String> = lambda.fields.iter().filter_map(|f| lambda.utf8(f.name_index)).collect();
        assert_eq!(fields, vec!["a".to_string(), "b".to_string()], "{}", header);
        let ctor = method(&lambda, "<init>");
        assert_eq!(descriptor(&lambda, ctor), "(Lmocha/lang/Pointer;Lmocha/lang/Pointer;)V");
    }
}

#[test]
fn private_members_reached_from_lambdas_lose_private() {
    let src = concat!(
        "class Main\n",
        "    private secret():String = \"s\"\n",
        "    m():Object = (x) -> secret()\n",
    );
    let modules = compile_src(src);
    let class = class_file(&modules, "Main");
    let secret = method(&class, "secret");
    assert!(!secret.access_flags.contains(MethodAccessFlags::PRIVATE));
}

#[test]
fn static_methods_use_static_descriptors() {
    let modules = compile_src("class Main\n    static main(args:String[]):Unit\n        System.out.println(\"hi\")\n");
    let class = class_file(&modules, "Main");
    let main = method(&class, "main");
    assert!(main.access_flags.contains(MethodAccessFlags::STATIC));
    assert_eq!(descriptor(&class, main), "([Ljava/lang/String;)V");
    let code = code(&class, main);
    assert_eq!(code.code.first(), Some(&0xb2)); // getstatic System.out
    assert_eq!(code.code.last(), Some(&0xb1)); // return
}

#[test]
fn handlers_land_in_the_exception_table() {
    let src = concat!(
        "class A\n",
        "    m():int\n",
        "        try\n",
        "            System.out.println(\"x\")\n",
        "        catch e:RuntimeException\n",
        "            return -1\n",
        "        return 1\n",
    );
    let modules = compile_src(src);
    let class = class_file(&modules, "A");
    let code = code(&class, method(&class, "m"));
    assert_eq!(code.exception_table.len(), 1);
    let entry = &code.exception_table[0];
    assert!(entry.start_pc < entry.end_pc);
    assert!(entry.handler_pc >= entry.end_pc);
    let caught = mocha_compiler::constant_info::class_name_at(&class.const_pool, entry.catch_type);
    assert_eq!(caught.as_deref(), Some("java/lang/Throwable"));
}

#[test]
fn static_blocks_initialize_static_fields() {
    let modules = compile_src("class Counter\n    static\n        count = 5\n");
    let class = class_file(&modules, "Counter");
    let count = class
        .fields
        .iter()
        .find(|f| class.utf8(f.name_index).as_deref() == Some("count"))
        .expect("static field");
    assert!(count.access_flags.contains(FieldAccessFlags::STATIC));
    assert_eq!(class.utf8(count.descriptor_index).as_deref(), Some("I"));
    assert!(!methods(&class, "<clinit>").is_empty());
}
