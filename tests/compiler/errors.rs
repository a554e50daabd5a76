use super::*;

#[test]
fn inconsistent_dedent_is_a_layout_error() {
    let err = compile_err("class A\n    a = 1\n  b = 2\n");
    assert!(matches!(err, CompileError::Layout { .. }), "{:?}", err);
    assert_eq!(err.pos().map(|p| p.line), Some(3));
    assert!(err.to_string().starts_with("test.mo:3:"), "{}", err);
}

#[test]
fn parameters_after_defaults_are_a_syntax_error() {
    let err = compile_err("class C(a=1, b)\n");
    assert!(matches!(err, CompileError::Syntax { .. }), "{:?}", err);
    assert!(err.message().contains("without default"), "{}", err.message());
}

#[test]
fn unknown_names_fail_resolution() {
    let err = compile_err("class A\n    m():int\n        return missing\n");
    assert!(matches!(err, CompileError::Resolution { .. }), "{:?}", err);
    assert!(err.message().contains("missing"), "{}", err.message());
    assert_eq!(err.pos().map(|p| p.line), Some(3));
}

#[test]
fn equally_good_overloads_are_ambiguous() {
    let src = "class A\n    f(x:long, y:int):int = 1\n    f(x:int, y:long):int = 2\n    g():int = f(1, 2)\n";
    let err = compile_err(src);
    assert!(err.message().contains("ambiguous call"), "{}", err.message());
}

#[test]
fn inheritance_cycles_are_rejected() {
    let err = compile_err("class A : B\nclass B : A\n");
    assert!(err.to_string().contains("cyclic inheritance"), "{}", err);
}

#[test]
fn narrowing_needs_an_explicit_cast() {
    assert!(matches!(
        compile_err("class A\n    m(x:long):int = x\n"),
        CompileError::Resolution { .. }
    ));
    compile_src("class A\n    m(x:long):int = x as int\n");
}

#[test]
fn collect_mode_reports_every_error() {
    let src = "class A\n    def m()\n        x = nope1\n        y = nope2\n";
    let err = compile_units(&[("a.mo", src)], ErrorMode::Collect).unwrap_err();
    let CompileError::Collected(all) = &err else {
        panic!("expected collected errors, got {:?}", err);
    };
    assert_eq!(all.len(), 2);
    assert_eq!(err.flatten().len(), 2);
    assert!(err.to_string().starts_with("2 compile errors"), "{}", err);
}

#[test]
fn errors_name_their_unit() {
    let err = compile_units(
        &[("good.mo", "class Good\n"), ("bad.mo", "class Bad\n    m() = undefinedThing\n")],
        ErrorMode::FailFast,
    )
    .unwrap_err();
    assert!(err.to_string().starts_with("bad.mo:2:"), "{}", err);
}
