//! End-to-end tests: source to IR, to object bytes, and to JIT-compiled code.

use std::ffi::{c_char, CStr};
use std::fs;
use std::path::PathBuf;

use tarn::backend::cranelift::{CraneliftBackend, JitProgram};
use tarn::backend::Backend;
use tarn::ir::{BinOp, Comparison, Instruction, Module};
use tarn::typechecker::types::Type;
use tarn::{output_path, read_source, CompileError, Compiler};

fn compile(source: &str) -> Module {
    Compiler::new()
        .compile_source(source, "test")
        .expect("source should compile")
}

fn jit(source: &str) -> JitProgram {
    CraneliftBackend::new()
        .jit(&compile(source))
        .expect("jit compilation should succeed")
}

fn function_ptr(program: &JitProgram, name: &str) -> *const u8 {
    program
        .function_ptr(name)
        .unwrap_or_else(|| panic!("function '{}' should be compiled", name))
}

fn count_defined(module: &Module, name: &str) -> usize {
    module
        .functions
        .iter()
        .filter(|function| function.name == name && !function.is_declaration())
        .count()
}

fn scratch_file(name: &str, source: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tarn-tests-{}", std::process::id()));
    fs::create_dir_all(&dir).expect("scratch dir should be creatable");
    let path = dir.join(name);
    fs::write(&path, source).expect("scratch file should be writable");
    let _ = fs::remove_file(output_path(&path));
    path
}

#[test]
fn integer_add_runs() {
    let program = jit("add a b = a + b\n");
    let add: extern "C" fn(i64, i64) -> i64 =
        unsafe { std::mem::transmute(function_ptr(&program, "add")) };
    assert_eq!(add(2, 3), 5);
    assert_eq!(add(-7, 4), -3);
}

#[test]
fn integer_operators_never_use_float_instructions() {
    let module = compile("poly a b = a * a - b + 1\n");
    let poly = module.function("poly").expect("poly should exist");
    for inst in poly.instructions() {
        if let Instruction::BinOp { op, .. } = inst {
            assert!(matches!(op, BinOp::IAdd | BinOp::ISub | BinOp::IMul), "{}", inst);
        }
    }
}

#[test]
fn float_operators_never_use_integer_instructions() {
    let module = compile("poly a_float b_float = a * a - b + 1.0\n");
    let poly = module.function("poly").expect("poly should exist");
    for inst in poly.instructions() {
        if let Instruction::BinOp { op, .. } = inst {
            assert!(matches!(op, BinOp::FAdd | BinOp::FSub | BinOp::FMul), "{}", inst);
        }
    }

    let program = CraneliftBackend::new().jit(&module).expect("jit should succeed");
    let poly: extern "C" fn(f64, f64) -> f64 =
        unsafe { std::mem::transmute(function_ptr(&program, "poly")) };
    assert_eq!(poly(3.0, 2.0), 8.0);
}

#[test]
fn choose_takes_then_branch() {
    let program = jit("choose = if 1 < 2 then 10 else 20\n");
    let choose: extern "C" fn() -> i64 =
        unsafe { std::mem::transmute(function_ptr(&program, "choose")) };
    assert_eq!(choose(), 10);
}

#[test]
fn float_if_uses_float_compare_and_phi() {
    let source = "choose x_float = if x < 0.5 then 1.0 else (if x then 2.0 else 3.0)\n";
    let module = compile(source);
    let choose = module.function("choose").expect("choose should exist");
    let instructions: Vec<&Instruction> = choose.instructions().collect();

    assert!(instructions.iter().any(|inst| matches!(
        inst,
        Instruction::Compare {
            cond: Comparison::FloatUlt,
            ..
        }
    )));
    assert!(instructions.iter().any(|inst| matches!(
        inst,
        Instruction::Compare {
            cond: Comparison::FloatOne,
            ..
        }
    )));
    assert!(instructions
        .iter()
        .any(|inst| matches!(inst, Instruction::Phi { ty: Type::Float, .. })));

    let program = CraneliftBackend::new().jit(&module).expect("jit should succeed");
    let choose: extern "C" fn(f64) -> f64 =
        unsafe { std::mem::transmute(function_ptr(&program, "choose")) };
    assert_eq!(choose(0.25), 1.0);
    assert_eq!(choose(1.0), 2.0);
    assert_eq!(choose(f64::NAN), 1.0);
}

#[test]
fn integer_less_than_is_unsigned() {
    let program = jit("lt a b = a < b\n");
    let lt: extern "C" fn(i64, i64) -> u8 =
        unsafe { std::mem::transmute(function_ptr(&program, "lt")) };
    assert_eq!(lt(1, 2), 0xFF);
    assert_eq!(lt(2, 1), 0);
    assert_eq!(lt(-1, 2), 0);
}

#[test]
fn comparison_results_are_sign_extended_chr_values() {
    let program = jit("both a b c d = (a < b) + (c < d)
flt x_float = x < 1.0
");
    let both: extern "C" fn(i64, i64, i64, i64) -> i8 =
        unsafe { std::mem::transmute(function_ptr(&program, "both")) };
    assert_eq!(both(1, 2, 3, 4), -2);
    assert_eq!(both(1, 2, 4, 3), -1);
    assert_eq!(both(2, 1, 4, 3), 0);

    let flt: extern "C" fn(f64) -> i8 =
        unsafe { std::mem::transmute(function_ptr(&program, "flt")) };
    assert_eq!(flt(0.5), -1);
    assert_eq!(flt(2.0), 0);
}

#[test]
fn chr_condition_compares_against_chr_zero() {
    let program = jit("pick c_chr = if c then 'y' else 'n'\n");
    let pick: extern "C" fn(u8) -> u8 =
        unsafe { std::mem::transmute(function_ptr(&program, "pick")) };
    assert_eq!(pick(3), b'y');
    assert_eq!(pick(0), b'n');
}

#[test]
fn nested_if_merges_from_inner_exit_block() {
    let program = jit("sign x = if x then (if x < 100 then 1 else 2) else 0\n");
    let sign: extern "C" fn(i64) -> i64 =
        unsafe { std::mem::transmute(function_ptr(&program, "sign")) };
    assert_eq!(sign(0), 0);
    assert_eq!(sign(5), 1);
    assert_eq!(sign(500), 2);
}

#[test]
fn declared_function_can_recurse() {
    let source = "fact n = int\nfact n = if n < 2 then 1 else n * (fact (n - 1))\n";
    let program = jit(source);
    let fact: extern "C" fn(i64) -> i64 =
        unsafe { std::mem::transmute(function_ptr(&program, "fact")) };
    assert_eq!(fact(5), 120);
}

#[test]
fn calls_between_user_functions() {
    let program = jit("sq x = x * x\nsum_sq a b = (sq a) + (sq b)\n");
    let sum_sq: extern "C" fn(i64, i64) -> i64 =
        unsafe { std::mem::transmute(function_ptr(&program, "sum_sq")) };
    assert_eq!(sum_sq(3, 4), 25);
}

#[test]
fn itod_is_absent_unless_referenced() {
    let module = compile("one = 1\n");
    assert!(module.function("itod").is_none());
}

#[test]
fn itod_is_generated_once_when_referenced() {
    let source = "f x = itod x\ng x = (itod x) + (itod 1)\n";
    let module = compile(source);
    assert_eq!(count_defined(&module, "itod"), 1);
    assert_eq!(
        module
            .functions
            .iter()
            .filter(|function| function.name == "itod")
            .count(),
        1
    );

    let program = CraneliftBackend::new().jit(&module).expect("jit should succeed");
    let g: extern "C" fn(i64) -> f64 = unsafe { std::mem::transmute(function_ptr(&program, "g")) };
    assert_eq!(g(41), 42.0);
}

#[test]
fn string_literal_points_at_nul_terminated_data() {
    let program = jit("greet = \"hello\"\n");
    let greet: extern "C" fn() -> *const c_char =
        unsafe { std::mem::transmute(function_ptr(&program, "greet")) };
    let text = unsafe { CStr::from_ptr(greet()) };
    assert_eq!(text.to_str().unwrap(), "hello");
}

#[test]
fn external_declaration_compiles_to_object() {
    let source = "cos x_float = float\nshift x_float = (cos x) + 1.0\n";
    let module = compile(source);
    assert!(module.function("cos").expect("cos should be declared").is_declaration());

    let bytes = CraneliftBackend::new()
        .generate(&module)
        .expect("object emission should succeed");
    assert!(!bytes.is_empty());
}

#[test]
fn object_output_is_deterministic() {
    let source = "add a b = a + b\nhalf x = (itod x) * 0.5\nname = \"tarn\"\n";
    let compiler = Compiler::new();
    let first = compiler.compile_to_object(source, "det").expect("first compile");
    let second = compiler.compile_to_object(source, "det").expect("second compile");
    assert_eq!(first, second);
}

#[test]
fn compile_file_writes_object_next_to_source() {
    let path = scratch_file("ok.tn", "add a b = a + b\n");
    let output = Compiler::new()
        .compile_file(&path)
        .expect("compile_file should succeed");
    assert_eq!(output, output_path(&path));
    assert!(output.to_string_lossy().ends_with("ok.tns"));
    assert!(!fs::read(&output).expect("object should exist").is_empty());
}

#[test]
fn failed_compile_writes_nothing() {
    for (name, source) in [
        ("unknown.tn", "f = g 1\n"),
        ("arity.tn", "add a b = a + b\nmain = add 1\n"),
        ("syntax.tn", "dup a a = a\n"),
    ] {
        let path = scratch_file(name, source);
        assert!(Compiler::new().compile_file(&path).is_err());
        assert!(!output_path(&path).exists(), "{} produced output", name);
    }
}

#[test]
fn loaded_source_is_compiled_without_rereading() {
    let path = scratch_file("loaded.tn", "broken = 1 )\n");
    let source = read_source(&path).expect("source should be readable");
    fs::remove_file(&path).expect("scratch file should be removable");

    let err = Compiler::new()
        .compile_loaded_file(&path, &source)
        .unwrap_err();
    let rendered = tarn::errors::pretty::format_compile_error("loaded.tn", &source, &err);
    assert!(rendered.contains("broken = 1 )\n           ^"), "{}", rendered);

    let output = Compiler::new()
        .compile_loaded_file(&path, "one = 1\n")
        .expect("loaded source should compile");
    assert!(!fs::read(&output).expect("object should exist").is_empty());
}

#[test]
fn missing_file_is_an_io_error() {
    let err = Compiler::new()
        .compile_file(std::path::Path::new("/definitely/not/here.tn"))
        .unwrap_err();
    assert!(matches!(err, CompileError::Io { action: "read", .. }));
}
