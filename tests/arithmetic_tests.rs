// Arithmetic and Error value propagation

use ciphel::ast::build::*;
use ciphel::ast::{BinOp, CoreFn, Stmt};
use ciphel::host::{ChargeReason, MockHost};
use ciphel::memory::value::{ErrorValue, Value};
use ciphel::{Interpreter, RuntimeConfig, RuntimeError};

fn run_program(instructions: Vec<Stmt>) -> Interpreter {
    let mut interpreter = Interpreter::new(MockHost::new(), RuntimeConfig::default());
    interpreter.load(program(instructions)).expect("Loading failed");
    interpreter.run().expect("Execution failed");
    interpreter
}

fn error_value(message: &str, cost: u64) -> Value {
    Value::Error(ErrorValue::new(message, cost))
}

#[test]
fn test_integer_arithmetic() {
    let interpreter = run_program(vec![
        let_("a", sub(mul(num(6), num(7)), num(2))),
        let_("b", bin(BinOp::Div, num(7), num(2))),
        let_("c", bin(BinOp::Mod, num(7), num(2))),
        let_("d", add(num(1), float(0.5))),
    ]);

    assert_eq!(interpreter.general_var("a"), Some(&Value::Number(40)));
    assert_eq!(interpreter.general_var("b"), Some(&Value::Number(3)));
    assert_eq!(interpreter.general_var("c"), Some(&Value::Number(1)));
    assert_eq!(interpreter.general_var("d"), Some(&Value::Float(1.5)));
}

#[test]
fn test_string_concatenation() {
    let interpreter = run_program(vec![let_("s", add(string("ab"), string("c")))]);

    assert_eq!(
        interpreter.general_var("s"),
        Some(&Value::StaticString("abc".to_string()))
    );
}

#[test]
fn test_division_by_zero_is_an_error_value() {
    let interpreter = run_program(vec![let_("q", bin(BinOp::Div, num(1), num(0)))]);

    assert_eq!(
        interpreter.general_var("q"),
        Some(&error_value("division by zero", 1))
    );
}

#[test]
fn test_overflow_is_an_error_value() {
    let interpreter = run_program(vec![let_("big", add(num(i64::MAX), num(1)))]);

    assert_eq!(
        interpreter.general_var("big"),
        Some(&error_value("integer overflow", 1))
    );
}

#[test]
fn test_error_operand_propagates() {
    let interpreter = run_program(vec![
        let_("x", error("E", 5)),
        let_("y", add(var("x"), num(1))),
    ]);

    assert_eq!(interpreter.general_var("y"), Some(&error_value("E", 5)));
    // Declaring the literal is free; the addition is one hop
    assert_eq!(interpreter.host().charged_for(ChargeReason::ErrorPropagation), 5);
}

#[test]
fn test_each_hop_is_charged() {
    let interpreter = run_program(vec![
        let_("x", error("E", 5)),
        let_("y", add(var("x"), num(1))),
        let_("z", mul(var("y"), num(2))),
        let_("w", sub(var("z"), num(3))),
    ]);

    assert_eq!(interpreter.general_var("w"), Some(&error_value("E", 5)));
    assert_eq!(interpreter.host().charged_for(ChargeReason::ErrorPropagation), 15);
}

#[test]
fn test_error_argument_binds_parameter() {
    let interpreter = run_program(vec![
        func("id", &["a"], vec![ret(Some(var("a")))]),
        let_("x", error("E", 1)),
        let_("y", call("id", vec![var("x")])),
    ]);

    assert_eq!(interpreter.general_var("y"), Some(&error_value("E", 1)));
    // Parameter binding and return value
    assert_eq!(interpreter.host().charged_for(ChargeReason::ErrorPropagation), 2);
}

#[test]
fn test_corrupted_condition_taints_branch() {
    let interpreter = run_program(vec![
        let_("x", error("E", 2)),
        let_("z", num(0)),
        let_("other", num(0)),
        if_(
            var("x"),
            vec![assign("z", num(1))],
            Some(vec![assign("other", num(1))]),
        ),
    ]);

    assert_eq!(interpreter.general_var("z"), Some(&error_value("E", 2)));
    // The else branch never runs
    assert_eq!(interpreter.general_var("other"), Some(&Value::Number(0)));
}

#[test]
fn test_corrupted_while_runs_once() {
    let interpreter = run_program(vec![
        let_("x", error("E", 1)),
        let_("n", num(0)),
        while_(var("x"), vec![assign("n", add(var("n"), num(1)))]),
    ]);

    assert_eq!(interpreter.general_var("n"), Some(&error_value("E", 1)));
    assert_eq!(interpreter.host().charged_for(ChargeReason::LoopIteration), 3);
}

#[test]
fn test_try_contains_error() {
    let interpreter = run_program(vec![
        let_("r", num(0)),
        try_(
            vec![let_("y", error("E", 1))],
            Some(vec![assign("r", num(2))]),
        ),
    ]);

    assert_eq!(interpreter.general_var("r"), Some(&Value::Number(2)));
    assert_eq!(interpreter.general_var("y"), None);
    assert_eq!(interpreter.host().charged_for(ChargeReason::ErrorPropagation), 0);
}

#[test]
fn test_try_contains_propagated_error() {
    let interpreter = run_program(vec![
        let_("x", error("E", 4)),
        let_("r", num(0)),
        try_(
            vec![let_("y", add(var("x"), num(1))), assign("r", num(1))],
            Some(vec![assign("r", num(2))]),
        ),
    ]);

    assert_eq!(interpreter.general_var("r"), Some(&Value::Number(2)));
    assert_eq!(interpreter.host().charged_for(ChargeReason::ErrorPropagation), 4);
}

#[test]
fn test_try_without_error_skips_fallback() {
    let interpreter = run_program(vec![
        let_("r", num(0)),
        try_(vec![assign("r", num(1))], Some(vec![assign("r", num(2))])),
    ]);

    assert_eq!(interpreter.general_var("r"), Some(&Value::Number(1)));
}

#[test]
fn test_try_expression_fallback() {
    let interpreter = run_program(vec![
        let_("r", try_expr(error("E", 1), Some(num(7)))),
        let_("s", try_expr(num(3), Some(num(7)))),
    ]);

    assert_eq!(interpreter.general_var("r"), Some(&Value::Number(7)));
    assert_eq!(interpreter.general_var("s"), Some(&Value::Number(3)));
}

#[test]
fn test_tuple_destructuring_error() {
    let interpreter = run_program(vec![let_tuple(&["a", "b"], error("E", 1))]);

    assert_eq!(interpreter.general_var("a"), Some(&error_value("E", 1)));
    assert_eq!(interpreter.general_var("b"), Some(&error_value("E", 1)));
}

#[test]
fn test_corrupted_cell_is_reset() {
    let interpreter = run_program(vec![
        exec(core(CoreFn::SetCellContent, vec![num(3), error("E", 1)])),
        exec(core(CoreFn::SetCellMode, vec![num(4), num(2)])),
    ]);

    let host = interpreter.host();
    assert_eq!(host.resets.len(), 1);
    assert_eq!(host.resets[0].0, 3);
    assert_eq!(host.cell_changes.len(), 1);
    assert_eq!(host.cell_changes[0].cell, 4);
}

#[test]
fn test_error_in_non_payload_position_propagates() {
    let mut interpreter = Interpreter::new(MockHost::new(), RuntimeConfig::default());
    interpreter
        .load(program(vec![
            let_("v", vector(vec![num(1)])),
            let_("i", error("E", 3)),
            let_("item", core(CoreFn::VecGet, vec![var("v"), var("i")])),
        ]))
        .expect("Loading failed");

    assert!(interpreter.run().is_ok());
    assert_eq!(interpreter.general_var("item"), Some(&error_value("E", 3)));
    assert_eq!(interpreter.host().charged_for(ChargeReason::ErrorPropagation), 3);
}

#[test]
fn test_type_mismatch_is_fatal() {
    let mut interpreter = Interpreter::new(MockHost::new(), RuntimeConfig::default());
    interpreter
        .load(program(vec![let_("bad", add(num(1), boolean(true)))]))
        .expect("Loading failed");

    assert!(matches!(
        interpreter.run(),
        Err(RuntimeError::TypeError { .. })
    ));
}
