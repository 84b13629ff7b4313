//! Casm weight: the static sp cost of an AST node
//!
//! Weights are derived on demand and never stored. A loop's static weight
//! covers only its iterator or condition; the engine charges the body's
//! weight again on every iteration.
//!
//! The only non-local input is the body weight of a called user function,
//! supplied through [`CalleeWeights`]. Callee bodies are weighed with
//! [`NoCallees`], so calls nested inside them contribute only their
//! arguments and recursion never has to be followed.

use crate::ast::*;
use crate::interpreter::constants::{CALL_WEIGHT_DIVISOR, PLATFORM_CALL_WEIGHT};

/// Runtime library tariff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tariff {
    Low = 1,
    Medium = 2,
    High = 4,
    Extreme = 8,
}

/// Resolves the body weight of a called function
pub trait CalleeWeights {
    fn body_weight(&self, callee: &Expr) -> Option<u64>;
}

/// Treats every callee as weightless
pub struct NoCallees;

impl CalleeWeights for NoCallees {
    fn body_weight(&self, _callee: &Expr) -> Option<u64> {
        None
    }
}

pub fn core_tariff(function: CoreFn) -> Tariff {
    use CoreFn::*;
    match function {
        VecWithCapacity => Tariff::High,
        VecPush => Tariff::Medium,
        VecPop | VecRemove => Tariff::Low,
        VecContains => Tariff::Medium,
        VecGet | VecSet | VecLen | VecCapacity => Tariff::Low,
        MapWithCapacity => Tariff::Medium,
        MapInsert | MapDelete => Tariff::High,
        MapGet | MapContains | MapKeys => Tariff::Medium,
        MapLen | MapCapacity => Tariff::Low,
        VecExtend => Tariff::High,
        VecClear | MapClear => Tariff::Low,
        StrAppend => Tariff::Medium,
        StrLen | CharAt => Tariff::Low,
        Abs | Floor | Ceil => Tariff::Low,
        Sqrt | Pow => Tariff::Medium,
        Assert => Tariff::Low,
        Chan => Tariff::Extreme,
        ChanAttach | ChanDetach => Tariff::Low,
        Send | Receive => Tariff::Medium,
        SetCellMode | SetCellState | SetCellSubstate | SetCellContent => Tariff::Medium,
        MoveCursor => Tariff::Low,
    }
}

/// Condition weight of one subscription: (narrow, broad)
pub fn observable_weight(observable: &ObservableSpec) -> u64 {
    fn pick(narrow: bool, weights: (u64, u64)) -> u64 {
        if narrow {
            weights.0
        } else {
            weights.1
        }
    }

    match observable {
        ObservableSpec::HeapChange(target) => pick(target.is_some(), (2, 6)),
        ObservableSpec::CursorMove(target) => pick(target.is_some(), (2, 4)),
        ObservableSpec::Cell {
            aspect: CellAspect::Any,
            cell,
        } => pick(cell.is_some(), (3, 6)),
        ObservableSpec::Cell { cell, .. } => pick(cell.is_some(), (2, 4)),
        ObservableSpec::EventFired(target) => pick(target.is_some(), (1, 3)),
        ObservableSpec::Command { command, .. } => pick(command.is_some(), (2, 5)),
        ObservableSpec::EnergyThreshold { .. } | ObservableSpec::EcrThreshold { .. } => 3,
        ObservableSpec::InstructionCommitted(target)
        | ObservableSpec::InstructionReverted(target) => pick(target.is_some(), (1, 3)),
    }
}

/// Call-site share of a callee body: ceil(10%)
pub fn call_share(body_weight: u64) -> u64 {
    body_weight.div_ceil(CALL_WEIGHT_DIVISOR)
}

fn sum<'a, C: CalleeWeights + ?Sized>(exprs: impl IntoIterator<Item = &'a Expr>, callees: &C) -> u64 {
    exprs.into_iter().map(|e| expr_weight(e, callees)).sum()
}

pub fn call_weight<C: CalleeWeights + ?Sized>(call: &Call, callees: &C) -> u64 {
    let args = sum(&call.args, callees);
    let base = match &call.callee {
        Callee::Function(callee) => callees.body_weight(callee).map_or(0, call_share),
        Callee::Platform(_) => PLATFORM_CALL_WEIGHT,
        Callee::Core(function) => core_tariff(*function) as u64,
    };
    base + args
}

pub fn expr_weight<C: CalleeWeights + ?Sized>(expr: &Expr, callees: &C) -> u64 {
    match expr {
        Expr::Literal(_) | Expr::Error { .. } | Expr::Variable(_) => 1,
        Expr::Slice(items) | Expr::Tuple(items) | Expr::Vector(items) => 1 + sum(items, callees),
        Expr::Struct(fields) => 1 + sum(fields.iter().map(|(_, e)| e), callees),
        Expr::Map(entries) => {
            1 + entries
                .iter()
                .map(|(k, v)| expr_weight(k, callees) + expr_weight(v, callees))
                .sum::<u64>()
        }
        Expr::Closure(def) => function_weight(def),
        Expr::Range { start, end } => expr_weight(start, callees) + expr_weight(end, callees),

        Expr::AddressOf(_) => 1,
        Expr::Deref(inner) => 2 + expr_weight(inner, callees),

        Expr::Unary { operand, .. } => 1 + expr_weight(operand, callees),
        Expr::Binary { lhs, rhs, .. } => expr_weight(lhs, callees) + expr_weight(rhs, callees),
        Expr::Paren(inner) => expr_weight(inner, callees),
        Expr::Field { target, .. } | Expr::TupleIndex { target, .. } => expr_weight(target, callees),
        Expr::Index { target, index } => expr_weight(target, callees) + expr_weight(index, callees),

        Expr::If {
            condition,
            then_branch,
            else_branch,
        } => {
            expr_weight(condition, callees)
                + expr_weight(then_branch, callees).max(expr_weight(else_branch, callees))
        }
        Expr::Match {
            scrutinee,
            arms,
            default,
        } => {
            let widest = arms
                .iter()
                .map(|(_, e)| e)
                .chain(default.as_deref())
                .map(|e| expr_weight(e, callees))
                .max()
                .unwrap_or(0);
            expr_weight(scrutinee, callees) + widest
        }
        Expr::Try { main, fallback } => {
            3 * expr_weight(main, callees) + fallback.as_deref().map_or(0, |e| expr_weight(e, callees))
        }
        Expr::Call(call) => call_weight(call, callees),
    }
}

/// 1 per parameter plus the body. Nested calls are weighed as weightless callees.
pub fn function_weight(def: &FunctionDef) -> u64 {
    def.params.len() as u64 + block_weight(&def.body, &NoCallees)
}

pub fn block_weight<C: CalleeWeights + ?Sized>(block: &Block, callees: &C) -> u64 {
    block.instructions.iter().map(|s| stmt_weight(s, callees)).sum()
}

fn place_prefix(place: &Place) -> u64 {
    if place.is_simple() {
        1
    } else {
        2
    }
}

pub fn stmt_weight<C: CalleeWeights + ?Sized>(stmt: &Stmt, callees: &C) -> u64 {
    match stmt {
        Stmt::Declare { pattern, value } => {
            let prefix = match pattern {
                DeclPattern::Name(_) => 1,
                DeclPattern::Tuple(_) => 2,
            };
            prefix + expr_weight(value, callees)
        }
        Stmt::Assign { target, value } => place_prefix(target) + expr_weight(value, callees),

        // Static part only; bodies are charged per iteration
        Stmt::For { iterable, .. } => expr_weight(iterable, callees),
        Stmt::While { condition, .. } => expr_weight(condition, callees),
        Stmt::Loop { .. } => 0,

        Stmt::Function(def) => function_weight(def),
        Stmt::Event(def) => {
            def.observables.iter().map(observable_weight).sum::<u64>()
                + def.trigger.as_ref().map_or(0, |t| expr_weight(t, callees))
                + block_weight(&def.body, callees)
        }
        Stmt::RemoveEvent(_) => 1,

        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => {
            let main = block_weight(then_branch, callees);
            let other = else_branch.as_ref().map_or(0, |b| block_weight(b, callees));
            expr_weight(condition, callees) + main.max(other)
        }
        Stmt::Match {
            scrutinee,
            arms,
            default,
        } => {
            let widest = arms
                .iter()
                .map(|arm| &arm.body)
                .chain(default.as_ref())
                .map(|b| block_weight(b, callees))
                .max()
                .unwrap_or(0);
            expr_weight(scrutinee, callees) + widest
        }
        Stmt::Try { main, fallback } => {
            3 * block_weight(main, callees) + fallback.as_ref().map_or(0, |b| block_weight(b, callees))
        }
        Stmt::Call(call) => call_weight(call, callees),
        Stmt::Scope(block) => block_weight(block, callees),
        Stmt::Return(value) => value.as_ref().map_or(0, |v| expr_weight(v, callees)),
        Stmt::Break | Stmt::Continue | Stmt::Free(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;

    struct FixedBody(u64);

    impl CalleeWeights for FixedBody {
        fn body_weight(&self, _callee: &Expr) -> Option<u64> {
            Some(self.0)
        }
    }

    #[test]
    fn test_call_weight_example() {
        // Arguments of weight 3 and 4
        let three = add(var("a"), add(var("b"), var("c")));
        let four = add(add(var("a"), var("b")), add(var("c"), var("d")));
        assert_eq!(expr_weight(&three, &NoCallees), 3);
        assert_eq!(expr_weight(&four, &NoCallees), 4);

        let call = call("f", vec![three, four]);
        assert_eq!(expr_weight(&call, &FixedBody(100)), 17);
    }

    #[test]
    fn test_call_share_rounds_up() {
        assert_eq!(call_share(0), 0);
        assert_eq!(call_share(1), 1);
        assert_eq!(call_share(10), 1);
        assert_eq!(call_share(11), 2);
    }

    #[test]
    fn test_platform_call_is_flat() {
        assert_eq!(expr_weight(&platform("scan", vec![]), &FixedBody(500)), 10);
        assert_eq!(expr_weight(&platform("scan", vec![num(1)]), &NoCallees), 11);
    }

    #[test]
    fn test_weight_is_deterministic() {
        let stmt = if_(
            lt(var("x"), num(3)),
            vec![assign("x", add(var("x"), num(1)))],
            Some(vec![ret(Some(num(0)))]),
        );
        let first = stmt_weight(&stmt, &NoCallees);
        assert_eq!(first, stmt_weight(&stmt, &NoCallees));
        // cond 2 + max(assign 1 + 2, return 1)
        assert_eq!(first, 5);
    }

    #[test]
    fn test_expression_weights() {
        assert_eq!(expr_weight(&deref(var("p")), &NoCallees), 3);
        assert_eq!(expr_weight(&addr(var("x")), &NoCallees), 1);
        assert_eq!(expr_weight(&neg(num(1)), &NoCallees), 2);
        assert_eq!(expr_weight(&paren(num(1)), &NoCallees), 1);
        assert_eq!(expr_weight(&index(var("v"), num(0)), &NoCallees), 2);
        assert_eq!(expr_weight(&vector(vec![num(1), num(2)]), &NoCallees), 3);
        assert_eq!(
            expr_weight(&core(CoreFn::VecPush, vec![var("v"), num(1)]), &NoCallees),
            4
        );
        // 3 * main + else
        assert_eq!(expr_weight(&try_expr(num(1), Some(num(2))), &NoCallees), 4);
    }

    #[test]
    fn test_statement_weights() {
        assert_eq!(stmt_weight(&let_("x", num(1)), &NoCallees), 2);
        assert_eq!(stmt_weight(&let_tuple(&["a", "b"], var("t")), &NoCallees), 3);
        let field_assign = assign_place(
            Place::Field {
                target: Box::new(Place::Variable("s".into())),
                field: "f".into(),
            },
            num(1),
        );
        assert_eq!(stmt_weight(&field_assign, &NoCallees), 3);
        assert_eq!(stmt_weight(&free("x"), &NoCallees), 1);
        assert_eq!(stmt_weight(&Stmt::Break, &NoCallees), 1);
        assert_eq!(stmt_weight(&func("f", &["a", "b"], vec![ret(Some(var("a")))]), &NoCallees), 3);
        assert_eq!(stmt_weight(&try_(vec![let_("x", num(1))], None), &NoCallees), 6);
    }

    #[test]
    fn test_loop_static_weight_excludes_body() {
        let body = vec![let_("y", num(1)), let_("z", num(2))];
        assert_eq!(stmt_weight(&while_(boolean(true), body.clone()), &NoCallees), 1);
        assert_eq!(stmt_weight(&loop_(body.clone()), &NoCallees), 0);
        assert_eq!(stmt_weight(&for_("i", range(num(0), num(3)), body), &NoCallees), 2);
    }

    #[test]
    fn test_broad_subscriptions_cost_more() {
        let narrow = [
            ObservableSpec::HeapChange(Some(var("v"))),
            ObservableSpec::CursorMove(Some(num(0))),
            ObservableSpec::Cell {
                aspect: CellAspect::Mode,
                cell: Some(num(0)),
            },
            ObservableSpec::Cell {
                aspect: CellAspect::Any,
                cell: Some(num(0)),
            },
            ObservableSpec::EventFired(Some("e".into())),
            ObservableSpec::Command {
                outcome: CommandOutcome::Failed,
                command: Some(num(1)),
            },
            ObservableSpec::InstructionCommitted(Some(num(0))),
            ObservableSpec::InstructionReverted(Some(num(0))),
        ];
        for spec in narrow {
            let broad = match spec.clone() {
                ObservableSpec::HeapChange(_) => ObservableSpec::HeapChange(None),
                ObservableSpec::CursorMove(_) => ObservableSpec::CursorMove(None),
                ObservableSpec::Cell { aspect, .. } => ObservableSpec::Cell { aspect, cell: None },
                ObservableSpec::EventFired(_) => ObservableSpec::EventFired(None),
                ObservableSpec::Command { outcome, .. } => ObservableSpec::Command {
                    outcome,
                    command: None,
                },
                ObservableSpec::InstructionCommitted(_) => ObservableSpec::InstructionCommitted(None),
                ObservableSpec::InstructionReverted(_) => ObservableSpec::InstructionReverted(None),
                other => other,
            };
            assert!(observable_weight(&broad) > observable_weight(&spec), "{spec:?}");
        }
    }

    #[test]
    fn test_event_definition_weight() {
        let stmt = event(
            "e",
            vec![ObservableSpec::HeapChange(None), ObservableSpec::EventFired(Some("x".into()))],
            Some(boolean(true)),
            vec![let_("a", num(1))],
        );
        // 6 + 1 + trigger 1 + body 2
        assert_eq!(stmt_weight(&stmt, &NoCallees), 10);
    }
}
