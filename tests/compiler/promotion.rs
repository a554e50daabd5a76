use super::*;

use proptest::prelude::*;

const NUMERIC: [&str; 6] = ["byte", "short", "int", "long", "float", "double"];

fn rank(ty: &str) -> usize {
    match ty {
        "long" => 1,
        "float" => 2,
        "double" => 3,
        _ => 0,
    }
}

/// Binary numeric promotion: the wider operand wins and anything narrower
/// than `int` becomes `int`.
fn promoted(a: &str, b: &str) -> &'static str {
    ["int", "long", "float", "double"][rank(a).max(rank(b))]
}

fn return_descriptor(ty: &str) -> &'static str {
    match ty {
        "int" => "I",
        "long" => "J",
        "float" => "F",
        _ => "D",
    }
}

fn adder(a: &str, b: &str, ret: &str) -> String {
    format!("class A\n    m(a:{}, b:{}):{} = a + b\n", a, b, ret)
}

proptest! {
    #[test]
    fn sums_take_the_promoted_type(
        a in prop::sample::select(NUMERIC.to_vec()),
        b in prop::sample::select(NUMERIC.to_vec()),
    ) {
        let ret = promoted(a, b);
        let src = adder(a, b, ret);
        let modules = compile_units(&[("test.mo", src.as_str())], ErrorMode::FailFast)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let class = class_file(&modules, "A");
        let desc = descriptor(&class, method(&class, "m"));
        prop_assert!(desc.ends_with(return_descriptor(ret)), "{}", desc);
    }

    #[test]
    fn wide_sums_do_not_narrow_implicitly(
        a in prop::sample::select(NUMERIC.to_vec()),
        b in prop::sample::select(NUMERIC.to_vec()),
    ) {
        prop_assume!(promoted(a, b) != "int");
        let src = adder(a, b, "int");
        let result = compile_units(&[("test.mo", src.as_str())], ErrorMode::FailFast);
        prop_assert!(result.is_err());
    }
}
