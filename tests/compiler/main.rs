use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use std::process::Command;

use binrw::BinRead;
use mocha_compiler::attribute_info::{AttributeInfo, CodeAttribute};
use mocha_compiler::method_info::MethodInfo;
use mocha_compiler::{compile, ClassFile, CompileError, CompileOptions, CompiledModules, ErrorMode, SourceUnit};
use tracing_subscriber::EnvFilter;

mod annotations;
mod classes;
mod classpath;
mod e2e;
mod errors;
mod promotion;

// --- Test helpers ---

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn compile_units(units: &[(&str, &str)], mode: ErrorMode) -> Result<CompiledModules, CompileError> {
    init_tracing();
    let units: Vec<SourceUnit> = units.iter().map(|(name, text)| SourceUnit::new(*name, *text)).collect();
    let options = CompileOptions {
        error_mode: mode,
        ..CompileOptions::default()
    };
    compile(&units, &options)
}

fn compile_src(src: &str) -> CompiledModules {
    compile_units(&[("test.mo", src)], ErrorMode::FailFast).unwrap_or_else(|e| panic!("compile failed: {}", e))
}

fn compile_err(src: &str) -> CompileError {
    match compile_units(&[("test.mo", src)], ErrorMode::FailFast) {
        Ok(modules) => panic!("expected an error, got {:?}", modules.names().collect::<Vec<_>>()),
        Err(err) => err,
    }
}

fn class_file(modules: &CompiledModules, name: &str) -> ClassFile {
    modules
        .class_file(name)
        .unwrap_or_else(|| panic!("no class {}", name))
        .expect("emitted class does not read back")
}

fn methods<'a>(class: &'a ClassFile, name: &str) -> Vec<&'a MethodInfo> {
    class
        .methods
        .iter()
        .filter(|m| class.utf8(m.name_index).as_deref() == Some(name))
        .collect()
}

fn method<'a>(class: &'a ClassFile, name: &str) -> &'a MethodInfo {
    methods(class, name)
        .into_iter()
        .next()
        .unwrap_or_else(|| panic!("no method {}", name))
}

fn descriptor(class: &ClassFile, method: &MethodInfo) -> String {
    method.signature(&class.const_pool).unwrap().1
}

fn attribute<'a>(class: &ClassFile, attributes: &'a [AttributeInfo], name: &str) -> Option<&'a AttributeInfo> {
    attributes
        .iter()
        .find(|a| class.utf8(a.attribute_name_index).as_deref() == Some(name))
}

fn code(class: &ClassFile, method: &MethodInfo) -> CodeAttribute {
    let attr = attribute(class, &method.attributes, "Code").expect("method has no Code");
    CodeAttribute::read_be(&mut Cursor::new(&attr.info)).unwrap()
}

fn java_available() -> bool {
    Command::new("java")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Write every module under a fresh directory and run `main_class` there.
fn run_main(test_name: &str, modules: &CompiledModules, main_class: &str) -> String {
    let tmp_dir: PathBuf = std::env::temp_dir().join(format!("mocha_compile_{}", test_name));
    let _ = fs::remove_dir_all(&tmp_dir);
    for (name, bytes) in modules.iter() {
        let path = tmp_dir.join(format!("{}.class", name.replace('.', "/")));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, bytes).expect("failed to write class file");
    }

    let run = Command::new("java")
        .arg("-cp")
        .arg(&tmp_dir)
        .arg(main_class)
        .output()
        .expect("failed to run java");
    assert!(
        run.status.success(),
        "java failed (exit {}): stderr={}",
        run.status,
        String::from_utf8_lossy(&run.stderr)
    );
    String::from_utf8_lossy(&run.stdout).replace("\r\n", "\n").trim().to_string()
}
