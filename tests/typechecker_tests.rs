use tarn::{CompileError, Compiler};

fn semantic_error(source: &str) -> String {
    match Compiler::new().compile_source(source, "typecheck") {
        Err(CompileError::Semantic(err)) => err.message,
        Err(other) => panic!("expected semantic error, got {}", other),
        Ok(module) => panic!("expected semantic error, got module:\n{}", module),
    }
}

fn compiles(source: &str) {
    if let Err(err) = Compiler::new().compile_source(source, "typecheck") {
        panic!("expected {:?} to compile, got {}", source, err);
    }
}

#[test]
fn float_parameter_plus_int_literal_is_rejected() {
    let message = semantic_error("f a_float = a + 1\n");
    assert!(message.contains("mismatched operand types"), "{}", message);
}

#[test]
fn float_parameter_plus_float_literal_is_accepted() {
    compiles("f a_float = a + 1.0\n");
}

#[test]
fn unknown_function_is_rejected() {
    let message = semantic_error("f = g 1\n");
    assert!(message.contains("unknown function: g"), "{}", message);
}

#[test]
fn wrong_arity_is_rejected() {
    let message = semantic_error("add a b = a + b\nmain = add 1\n");
    assert!(message.contains("expects 2 argument(s), got 1"), "{}", message);
}

#[test]
fn argument_type_must_match_parameter() {
    let message = semantic_error("half x_float = x * 0.5\nmain = half 3\n");
    assert!(message.contains("expects float, got int"), "{}", message);
}

#[test]
fn if_arms_must_agree() {
    let message = semantic_error("f = if 1 then 2 else 3.0\n");
    assert!(message.contains("if arms have different types"), "{}", message);
}

#[test]
fn string_condition_is_rejected() {
    let message = semantic_error("f = if \"yes\" then 1 else 2\n");
    assert!(message.contains("if condition"), "{}", message);
}

#[test]
fn division_and_greater_are_unknown_operators() {
    for source in ["f a b = a / b\n", "f a b = a % b\n", "f a b = a > b\n"] {
        let message = semantic_error(source);
        assert!(message.contains("unknown operator"), "{}", message);
    }
}

#[test]
fn chr_and_int_do_not_mix() {
    let message = semantic_error("f c_chr = c + 1\n");
    assert!(message.contains("mismatched operand types"), "{}", message);
    compiles("f c_chr = c + 'a'\n");
}

#[test]
fn function_is_not_visible_in_its_own_body() {
    let message = semantic_error("count n = count n\n");
    assert!(message.contains("unknown function: count"), "{}", message);
    compiles("count n = int\ncount n = if n then count (n - 1) else 0\n");
}

#[test]
fn top_level_expressions_are_checked() {
    let message = semantic_error("1 + 2.0\n");
    assert!(message.contains("mismatched operand types"), "{}", message);
    compiles("one = 1\none + 1\n");
}

#[test]
fn definition_must_match_declaration() {
    let message = semantic_error("f x = int\nf x = 1.5\n");
    assert!(message.contains("conflicting signatures"), "{}", message);
}

#[test]
fn nested_definition_is_rejected() {
    let message = semantic_error("f = (g = 1)\n");
    assert!(message.contains("top level"), "{}", message);
}

#[test]
fn wide_char_literal_is_rejected() {
    let message = semantic_error("f = 'λ'\n");
    assert!(message.contains("does not fit in a chr"), "{}", message);
}
