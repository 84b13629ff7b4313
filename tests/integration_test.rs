// Integration tests for the Ciphel runtime

use ciphel::ast::build::*;
use ciphel::ast::{CoreFn, Pattern, Literal, Place, Stmt};
use ciphel::host::{ChargeReason, MockHost};
use ciphel::memory::value::{ErrorValue, Value};
use ciphel::{Interpreter, RunOutcome, RuntimeConfig, RuntimeError};

fn run_with(config: RuntimeConfig, instructions: Vec<Stmt>) -> (Interpreter, Result<RunOutcome, RuntimeError>) {
    let mut interpreter = Interpreter::new(MockHost::new(), config);
    interpreter.load(program(instructions)).expect("Loading failed");
    let result = interpreter.run();
    (interpreter, result)
}

fn run_program(instructions: Vec<Stmt>) -> (Interpreter, Result<RunOutcome, RuntimeError>) {
    run_with(RuntimeConfig::default(), instructions)
}

#[test]
fn test_shadowing_leaves_outer_binding() {
    let (interpreter, result) = run_program(vec![
        let_("x", num(1)),
        scope(vec![let_("x", num(2)), assign("x", add(var("x"), num(10)))]),
        let_("a", var("x")),
    ]);

    assert_eq!(result, Ok(RunOutcome::Finished));
    assert_eq!(interpreter.general_var("a"), Some(&Value::Number(1)));
}

#[test]
fn test_child_mutation_visible_after_exit() {
    let (interpreter, result) = run_program(vec![
        let_("x", num(1)),
        scope(vec![scope(vec![assign("x", num(5))])]),
    ]);

    assert!(result.is_ok(), "Execution failed: {:?}", result);
    assert_eq!(interpreter.general_var("x"), Some(&Value::Number(5)));
    // Every child scope is gone
    assert_eq!(interpreter.scopes().len(), 1);
}

#[test]
fn test_function_recursion() {
    let (interpreter, result) = run_program(vec![
        func(
            "fact",
            &["n"],
            vec![
                if_(lt(var("n"), num(2)), vec![ret(Some(num(1)))], None),
                ret(Some(mul(var("n"), call("fact", vec![sub(var("n"), num(1))])))),
            ],
        ),
        let_("r", call("fact", vec![num(5)])),
    ]);

    assert!(result.is_ok(), "Execution failed: {:?}", result);
    assert_eq!(interpreter.general_var("r"), Some(&Value::Number(120)));
}

#[test]
fn test_function_cannot_see_caller_locals() {
    let (_, result) = run_program(vec![
        func("peek", &[], vec![ret(Some(var("y")))]),
        scope(vec![let_("y", num(3)), let_("r", call("peek", vec![]))]),
    ]);

    assert_eq!(
        result,
        Err(RuntimeError::UnresolvedVariable {
            name: "y".to_string()
        })
    );
}

#[test]
fn test_argument_count_mismatch() {
    let (_, result) = run_program(vec![
        func("f", &["a"], vec![ret(Some(var("a")))]),
        let_("r", call("f", vec![])),
    ]);

    assert_eq!(
        result,
        Err(RuntimeError::ArgumentCountMismatch {
            function: "f".to_string(),
            expected: 1,
            got: 0,
        })
    );
}

#[test]
fn test_closure_state_persists_between_calls() {
    let (interpreter, result) = run_program(vec![
        let_("counter", num(0)),
        let_(
            "inc",
            closure(
                &[],
                vec![
                    assign("counter", add(var("counter"), num(1))),
                    ret(Some(var("counter"))),
                ],
            ),
        ),
        let_("a", call("inc", vec![])),
        let_("b", call("inc", vec![])),
    ]);

    assert!(result.is_ok(), "Execution failed: {:?}", result);
    assert_eq!(interpreter.general_var("a"), Some(&Value::Number(1)));
    assert_eq!(interpreter.general_var("b"), Some(&Value::Number(2)));
    // The closure mutated its own captured copy
    assert_eq!(interpreter.general_var("counter"), Some(&Value::Number(0)));
}

#[test]
fn test_for_loop_charges_each_iteration() {
    let (interpreter, result) = run_program(vec![
        let_("s", num(0)),
        for_("i", range(num(0), num(3)), vec![assign("s", add(var("s"), var("i")))]),
    ]);

    assert!(result.is_ok(), "Execution failed: {:?}", result);
    assert_eq!(interpreter.general_var("s"), Some(&Value::Number(3)));
    // Body weight 3, three iterations
    assert_eq!(interpreter.host().charged_for(ChargeReason::LoopIteration), 9);
}

#[test]
fn test_while_with_break() {
    let (interpreter, result) = run_program(vec![
        let_("n", num(0)),
        while_(
            boolean(true),
            vec![
                assign("n", add(var("n"), num(1))),
                if_(eq(var("n"), num(3)), vec![Stmt::Break], None),
            ],
        ),
    ]);

    assert!(result.is_ok(), "Execution failed: {:?}", result);
    assert_eq!(interpreter.general_var("n"), Some(&Value::Number(3)));
}

#[test]
fn test_loop_limit() {
    let config = RuntimeConfig::default().with_max_loop_iterations(10);
    let (_, result) = run_with(config, vec![loop_(vec![])]);

    assert_eq!(result, Err(RuntimeError::LoopLimitExceeded { limit: 10 }));
}

#[test]
fn test_match_selects_first_matching_arm() {
    let (interpreter, result) = run_program(vec![
        let_("k", num(2)),
        let_("out", num(0)),
        match_(
            var("k"),
            vec![
                (Pattern::Literal(Literal::Number(1)), vec![assign("out", num(10))]),
                (Pattern::Literal(Literal::Number(2)), vec![assign("out", num(20))]),
                (Pattern::Wildcard, vec![assign("out", num(30))]),
            ],
            None,
        ),
    ]);

    assert!(result.is_ok(), "Execution failed: {:?}", result);
    assert_eq!(interpreter.general_var("out"), Some(&Value::Number(20)));
}

#[test]
fn test_write_through_stack_address() {
    let (interpreter, result) = run_program(vec![
        let_("x", num(1)),
        let_("p", addr(var("x"))),
        assign_place(Place::Deref(var("p")), num(5)),
        let_("y", deref(var("p"))),
    ]);

    assert!(result.is_ok(), "Execution failed: {:?}", result);
    assert_eq!(interpreter.general_var("x"), Some(&Value::Number(5)));
    assert_eq!(interpreter.general_var("y"), Some(&Value::Number(5)));
}

#[test]
fn test_struct_field_write() {
    let (interpreter, result) = run_program(vec![
        let_("s", strukt(vec![("a", num(1)), ("b", num(2))])),
        assign_place(
            Place::Field {
                target: Box::new(Place::Variable("s".to_string())),
                field: "a".to_string(),
            },
            num(5),
        ),
        let_("r", add(field(var("s"), "a"), field(var("s"), "b"))),
    ]);

    assert!(result.is_ok(), "Execution failed: {:?}", result);
    assert_eq!(interpreter.general_var("r"), Some(&Value::Number(7)));
}

#[test]
fn test_call_site_weight() {
    // Body of weight 100: one hundred literals summed
    let body = (1..100).fold(num(1), |acc, _| add(acc, num(1)));
    let three = add(var("a"), add(var("b"), var("c")));
    let four = add(add(var("a"), var("b")), add(var("c"), var("d")));

    let mut interpreter = Interpreter::new(MockHost::new(), RuntimeConfig::default());
    let ids = interpreter
        .load(program(vec![
            func("f", &["x", "y"], vec![ret(Some(body))]),
            let_("a", num(1)),
            let_("b", num(1)),
            let_("c", num(1)),
            let_("d", num(1)),
            exec(call("f", vec![three, four])),
        ]))
        .expect("Loading failed");
    interpreter.run().expect("Execution failed");

    // ceil(100 / 10) + 3 + 4
    assert_eq!(interpreter.instruction_weight(ids[5]), Some(17));
    assert!(interpreter
        .host()
        .charges
        .contains(&(17, ChargeReason::Instruction)));
}

#[test]
fn test_failed_instruction_rolls_back() {
    let (interpreter, result) = run_program(vec![
        let_("v", vector(vec![])),
        let_("x", num(1)),
        scope(vec![
            exec(core(CoreFn::VecPush, vec![var("v"), num(1)])),
            exec(core(CoreFn::SetCellMode, vec![num(0), num(1)])),
            assign("x", num(2)),
            let_("bad", var("missing")),
        ]),
    ]);

    assert_eq!(
        result,
        Err(RuntimeError::UnresolvedVariable {
            name: "missing".to_string()
        })
    );
    assert_eq!(interpreter.general_var("x"), Some(&Value::Number(1)));
    let Some(Value::Vector(handle)) = interpreter.general_var("v") else {
        panic!("v is not a vector");
    };
    assert!(interpreter.heap().vector(*handle).unwrap().items.is_empty());

    let host = interpreter.host();
    assert!(host.cell_changes.is_empty());
    assert_eq!(host.charged_for(ChargeReason::HeapGrowth), 0);
    // Only the two successful declarations were charged
    assert_eq!(host.charged_for(ChargeReason::Instruction), 4);
}

#[test]
fn test_execution_resumes_after_failure() {
    let mut interpreter = Interpreter::new(MockHost::new(), RuntimeConfig::default());
    interpreter
        .load(program(vec![let_("bad", var("missing")), let_("ok", num(1))]))
        .expect("Loading failed");

    assert!(interpreter.run().is_err());
    assert_eq!(interpreter.run(), Ok(RunOutcome::Finished));
    assert_eq!(interpreter.general_var("bad"), None);
    assert_eq!(interpreter.general_var("ok"), Some(&Value::Number(1)));
}

#[test]
fn test_platform_call() {
    fn double(args: &[Value]) -> Value {
        match args.first() {
            Some(Value::Number(n)) => Value::Number(n * 2),
            _ => Value::Unit,
        }
    }

    let mut host = MockHost::new();
    host.register("double", double);
    let mut interpreter = Interpreter::new(host, RuntimeConfig::default());
    interpreter
        .load(program(vec![let_("r", platform("double", vec![num(21)]))]))
        .expect("Loading failed");
    interpreter.run().expect("Execution failed");

    assert_eq!(interpreter.general_var("r"), Some(&Value::Number(42)));
    assert_eq!(interpreter.host().platform_calls.len(), 1);
    // Flat 10 plus the argument, plus the declaration
    assert_eq!(interpreter.host().charged_for(ChargeReason::Instruction), 12);
}

#[test]
fn test_unknown_platform_function() {
    let (_, result) = run_program(vec![exec(platform("nope", vec![]))]);

    assert_eq!(
        result,
        Err(RuntimeError::UnknownPlatformFunction {
            name: "nope".to_string()
        })
    );
}

#[test]
fn test_top_level_return_finishes() {
    let (interpreter, result) = run_program(vec![let_("a", num(1)), ret(None), let_("b", num(2))]);

    assert_eq!(result, Ok(RunOutcome::Finished));
    assert!(interpreter.is_terminated());
    assert_eq!(interpreter.general_var("b"), None);
}

#[test]
fn test_for_over_error_iterable_runs_once() {
    let (interpreter, result) = run_program(vec![
        let_("x", error("E", 7)),
        let_("seen", num(0)),
        for_("i", var("x"), vec![assign("seen", add(var("i"), num(1)))]),
    ]);

    assert!(result.is_ok(), "Execution failed: {:?}", result);
    assert_eq!(
        interpreter.general_var("seen"),
        Some(&Value::Error(ErrorValue::new("E", 7)))
    );
    // One iteration, one hop through the addition
    assert_eq!(interpreter.host().charged_for(ChargeReason::LoopIteration), 3);
    assert_eq!(interpreter.host().charged_for(ChargeReason::ErrorPropagation), 7);
}

#[test]
fn test_match_on_error_takes_first_arm_tainted() {
    let (interpreter, result) = run_program(vec![
        let_("x", error("E", 2)),
        let_("first", num(0)),
        let_("second", num(0)),
        match_(
            var("x"),
            vec![
                (Pattern::Literal(Literal::Number(1)), vec![assign("first", num(10))]),
                (Pattern::Wildcard, vec![assign("second", num(20))]),
            ],
            None,
        ),
    ]);

    assert!(result.is_ok(), "Execution failed: {:?}", result);
    assert_eq!(
        interpreter.general_var("first"),
        Some(&Value::Error(ErrorValue::new("E", 2)))
    );
    assert_eq!(interpreter.general_var("second"), Some(&Value::Number(0)));
    assert_eq!(interpreter.host().charged_for(ChargeReason::ErrorPropagation), 2);
}

#[test]
fn test_function_redefined_in_child_shadows_only_there() {
    let (interpreter, result) = run_program(vec![
        func("f", &[], vec![ret(Some(num(1)))]),
        let_("inner", num(0)),
        scope(vec![
            func("f", &[], vec![ret(Some(num(2)))]),
            assign("inner", call("f", vec![])),
        ]),
        let_("outer", call("f", vec![])),
    ]);

    assert!(result.is_ok(), "Execution failed: {:?}", result);
    assert_eq!(interpreter.general_var("inner"), Some(&Value::Number(2)));
    assert_eq!(interpreter.general_var("outer"), Some(&Value::Number(1)));
}

#[test]
fn test_function_sees_its_defining_scope() {
    let (interpreter, result) = run_program(vec![
        let_("out", num(0)),
        let_("sum", num(0)),
        scope(vec![
            let_("k", num(4)),
            func("getk", &[], vec![ret(Some(var("k")))]),
            func("twice", &[], vec![ret(Some(mul(call("getk", vec![]), num(2))))]),
            assign("out", call("getk", vec![])),
            assign("sum", call("twice", vec![])),
        ]),
    ]);

    assert!(result.is_ok(), "Execution failed: {:?}", result);
    assert_eq!(interpreter.general_var("out"), Some(&Value::Number(4)));
    // Sibling function defined in the same child scope
    assert_eq!(interpreter.general_var("sum"), Some(&Value::Number(8)));
}

#[test]
fn test_zero_tick_budget_still_progresses() {
    let config = RuntimeConfig::default().with_tick_budget(0);
    let (interpreter, result) = run_with(config, vec![let_("a", num(1)), let_("b", num(2))]);

    assert_eq!(result, Ok(RunOutcome::Finished));
    assert_eq!(interpreter.general_var("b"), Some(&Value::Number(2)));
    assert_eq!(interpreter.current_tick(), 3);
}

#[test]
fn test_long_range_value_rejected() {
    let config = RuntimeConfig::default().with_max_range_len(10);
    let (interpreter, result) = run_with(config, vec![let_("r", range(num(0), num(100)))]);

    assert_eq!(result, Err(RuntimeError::RangeTooLong { len: 100, limit: 10 }));
    assert_eq!(interpreter.general_var("r"), None);
}

#[test]
fn test_long_range_loop_is_lazy() {
    let config = RuntimeConfig::default().with_max_range_len(10);
    let (interpreter, result) = run_with(
        config,
        vec![
            let_("n", num(0)),
            for_("i", range(num(0), num(100)), vec![assign("n", add(var("n"), num(1)))]),
        ],
    );

    assert!(result.is_ok(), "Execution failed: {:?}", result);
    assert_eq!(interpreter.general_var("n"), Some(&Value::Number(100)));
}

#[test]
fn test_max_cost_error_saturates_charges() {
    let (interpreter, result) = run_program(vec![
        let_("x", error("E", u64::MAX)),
        let_("y", add(var("x"), num(1))),
        let_("z", add(var("y"), num(1))),
    ]);

    assert!(result.is_ok(), "Execution failed: {:?}", result);
    assert_eq!(
        interpreter.host().charged_for(ChargeReason::ErrorPropagation),
        u64::MAX
    );
    assert_eq!(interpreter.host().energy, i64::MIN);
}

#[test]
fn test_string_functions() {
    let (interpreter, result) = run_program(vec![
        let_("s", core(CoreFn::StrAppend, vec![string("ab"), string("cd")])),
        let_("t", core(CoreFn::StrAppend, vec![var("s"), chr('!')])),
        let_("n", core(CoreFn::StrLen, vec![var("t")])),
        let_("c", core(CoreFn::CharAt, vec![var("t"), num(2)])),
    ]);

    assert!(result.is_ok(), "Execution failed: {:?}", result);
    assert_eq!(
        interpreter.general_var("t"),
        Some(&Value::StaticString("abcd!".to_string()))
    );
    assert_eq!(interpreter.general_var("n"), Some(&Value::Number(5)));
    assert_eq!(interpreter.general_var("c"), Some(&Value::Char('c')));
}

#[test]
fn test_char_at_out_of_bounds() {
    let (_, result) = run_program(vec![let_("c", core(CoreFn::CharAt, vec![string("ab"), num(2)]))]);

    assert_eq!(result, Err(RuntimeError::IndexOutOfBounds { index: 2, len: 2 }));
}

#[test]
fn test_math_functions() {
    let (interpreter, result) = run_program(vec![
        let_("a", core(CoreFn::Abs, vec![num(-3)])),
        let_("p", core(CoreFn::Pow, vec![num(3), num(4)])),
        let_("r", core(CoreFn::Sqrt, vec![num(16)])),
        let_("big", core(CoreFn::Pow, vec![num(10), num(40)])),
    ]);

    assert!(result.is_ok(), "Execution failed: {:?}", result);
    assert_eq!(interpreter.general_var("a"), Some(&Value::Number(3)));
    assert_eq!(interpreter.general_var("p"), Some(&Value::Number(81)));
    assert_eq!(interpreter.general_var("r"), Some(&Value::Float(4.0)));
    assert_eq!(
        interpreter.general_var("big"),
        Some(&Value::Error(ErrorValue::new("integer overflow", 1)))
    );
}

#[test]
fn test_failed_assert_rolls_back() {
    let (interpreter, result) = run_program(vec![
        let_("x", num(1)),
        scope(vec![
            assign("x", num(2)),
            exec(core(CoreFn::Assert, vec![eq(var("x"), num(3))])),
        ]),
    ]);

    assert_eq!(result, Err(RuntimeError::AssertionFailed));
    assert_eq!(interpreter.general_var("x"), Some(&Value::Number(1)));
}
