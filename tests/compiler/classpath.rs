use super::*;

use mocha_compiler::classpath::ClassBytesProvider;
use mocha_compiler::Compiler;

const LIBRARY: &str = "package lib\nclass Base\n    twice(x:int):int = x * 2\n";
const CLIENT: &str = "import lib::Base\nclass User\n    m():int = Base().twice(21)\n";

fn calls_into_base(modules: &CompiledModules) {
    let user = class_file(modules, "User");
    let code = code(&user, method(&user, "m"));
    assert_eq!(code.code.first(), Some(&0xbb)); // new lib/Base
    assert!(code.code.contains(&0xb6)); // invokevirtual twice
    let referenced: Vec<String> = user
        .const_pool
        .iter()
        .enumerate()
        .filter_map(|(i, _)| mocha_compiler::constant_info::class_name_at(&user.const_pool, i as u16))
        .collect();
    assert!(referenced.iter().any(|n| n == "lib/Base"), "{:?}", referenced);
}

#[test]
fn earlier_output_serves_as_a_classpath() {
    let library = compile_src(LIBRARY);
    assert!(library.get("lib.Base").is_some());

    let provider = ClassBytesProvider::from_modules(&library).unwrap();
    assert_eq!(provider.len(), 1);
    let client = Compiler::new(CompileOptions::default())
        .with_provider(provider)
        .compile(&[SourceUnit::new("user.mo", CLIENT)])
        .unwrap();
    assert_eq!(client.names().collect::<Vec<_>>(), vec!["User"]);
    calls_into_base(&client);
}

#[test]
fn missing_classpath_entries_fail_resolution() {
    let err = compile_err(CLIENT);
    assert!(matches!(err, CompileError::Resolution { .. }), "{:?}", err);
}

#[cfg(feature = "jar")]
#[test]
fn jars_round_trip_through_the_provider() {
    use mocha_compiler::classpath::JarProvider;

    let library = compile_src(LIBRARY);
    let jar = library.to_jar_bytes().unwrap();
    let provider = JarProvider::from_bytes(&jar).unwrap();
    assert_eq!(provider.len(), 1);

    let client = Compiler::new(CompileOptions::default())
        .with_provider(provider)
        .compile(&[SourceUnit::new("user.mo", CLIENT)])
        .unwrap();
    calls_into_base(&client);
}
