//! Small constructors for assembling ASTs by hand.
//!
//! Front ends produce the tree directly; embedders and tests use these
//! helpers instead of spelling out every `Box::new`.
//!
//! ```
//! use ciphel::ast::build::*;
//!
//! let program = program(vec![
//!     let_("x", num(1)),
//!     assign("x", add(var("x"), num(2))),
//! ]);
//! assert_eq!(program.instructions.len(), 2);
//! ```

use std::rc::Rc;

use super::*;

pub fn program(instructions: Vec<Stmt>) -> Program {
    Program::new(instructions)
}

pub fn block(instructions: Vec<Stmt>) -> Block {
    Block::new(instructions)
}

// ---- expressions ----

pub fn num(n: i64) -> Expr {
    Expr::Literal(Literal::Number(n))
}

pub fn float(f: f64) -> Expr {
    Expr::Literal(Literal::Float(f))
}

pub fn boolean(b: bool) -> Expr {
    Expr::Literal(Literal::Bool(b))
}

pub fn chr(c: char) -> Expr {
    Expr::Literal(Literal::Char(c))
}

pub fn string(s: &str) -> Expr {
    Expr::Literal(Literal::Str(s.to_string()))
}

pub fn unit() -> Expr {
    Expr::Literal(Literal::Unit)
}

pub fn error(message: &str, energy_cost: u64) -> Expr {
    Expr::Error {
        message: message.to_string(),
        energy_cost,
    }
}

pub fn var(name: &str) -> Expr {
    Expr::Variable(name.to_string())
}

pub fn slice(items: Vec<Expr>) -> Expr {
    Expr::Slice(items)
}

pub fn tuple(items: Vec<Expr>) -> Expr {
    Expr::Tuple(items)
}

pub fn strukt(fields: Vec<(&str, Expr)>) -> Expr {
    Expr::Struct(
        fields
            .into_iter()
            .map(|(name, expr)| (name.to_string(), expr))
            .collect(),
    )
}

pub fn range(start: Expr, end: Expr) -> Expr {
    Expr::Range {
        start: Box::new(start),
        end: Box::new(end),
    }
}

pub fn vector(items: Vec<Expr>) -> Expr {
    Expr::Vector(items)
}

pub fn map(entries: Vec<(Expr, Expr)>) -> Expr {
    Expr::Map(entries)
}

pub fn closure(params: &[&str], body: Vec<Stmt>) -> Expr {
    Expr::Closure(Rc::new(FunctionDef {
        name: String::new(),
        params: params.iter().map(|p| p.to_string()).collect(),
        body: Block::new(body),
    }))
}

pub fn addr(expr: Expr) -> Expr {
    Expr::AddressOf(Box::new(expr))
}

pub fn deref(expr: Expr) -> Expr {
    Expr::Deref(Box::new(expr))
}

pub fn neg(expr: Expr) -> Expr {
    Expr::Unary {
        op: UnOp::Neg,
        operand: Box::new(expr),
    }
}

pub fn not(expr: Expr) -> Expr {
    Expr::Unary {
        op: UnOp::Not,
        operand: Box::new(expr),
    }
}

pub fn bin(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    bin(BinOp::Add, lhs, rhs)
}

pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
    bin(BinOp::Sub, lhs, rhs)
}

pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
    bin(BinOp::Mul, lhs, rhs)
}

pub fn lt(lhs: Expr, rhs: Expr) -> Expr {
    bin(BinOp::Lt, lhs, rhs)
}

pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
    bin(BinOp::Eq, lhs, rhs)
}

pub fn paren(expr: Expr) -> Expr {
    Expr::Paren(Box::new(expr))
}

pub fn field(target: Expr, name: &str) -> Expr {
    Expr::Field {
        target: Box::new(target),
        field: name.to_string(),
    }
}

pub fn nth(target: Expr, index: usize) -> Expr {
    Expr::TupleIndex {
        target: Box::new(target),
        index,
    }
}

pub fn index(target: Expr, index: Expr) -> Expr {
    Expr::Index {
        target: Box::new(target),
        index: Box::new(index),
    }
}

pub fn if_expr(condition: Expr, then_branch: Expr, else_branch: Expr) -> Expr {
    Expr::If {
        condition: Box::new(condition),
        then_branch: Box::new(then_branch),
        else_branch: Box::new(else_branch),
    }
}

pub fn try_expr(main: Expr, fallback: Option<Expr>) -> Expr {
    Expr::Try {
        main: Box::new(main),
        fallback: fallback.map(Box::new),
    }
}

pub fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call(Call {
        callee: Callee::Function(Box::new(var(name))),
        args,
    })
}

pub fn platform(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call(Call {
        callee: Callee::Platform(name.to_string()),
        args,
    })
}

pub fn core(function: CoreFn, args: Vec<Expr>) -> Expr {
    Expr::Call(Call {
        callee: Callee::Core(function),
        args,
    })
}

// ---- statements ----

pub fn let_(name: &str, value: Expr) -> Stmt {
    Stmt::Declare {
        pattern: DeclPattern::Name(name.to_string()),
        value,
    }
}

pub fn let_tuple(names: &[&str], value: Expr) -> Stmt {
    Stmt::Declare {
        pattern: DeclPattern::Tuple(names.iter().map(|n| n.to_string()).collect()),
        value,
    }
}

pub fn assign(name: &str, value: Expr) -> Stmt {
    Stmt::Assign {
        target: Place::Variable(name.to_string()),
        value,
    }
}

pub fn assign_place(target: Place, value: Expr) -> Stmt {
    Stmt::Assign { target, value }
}

pub fn for_(item: &str, iterable: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::For {
        item: item.to_string(),
        iterable,
        body: Block::new(body),
    }
}

pub fn while_(condition: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::While {
        condition,
        body: Block::new(body),
    }
}

pub fn loop_(body: Vec<Stmt>) -> Stmt {
    Stmt::Loop {
        body: Block::new(body),
    }
}

pub fn func(name: &str, params: &[&str], body: Vec<Stmt>) -> Stmt {
    Stmt::Function(Rc::new(FunctionDef {
        name: name.to_string(),
        params: params.iter().map(|p| p.to_string()).collect(),
        body: Block::new(body),
    }))
}

pub fn event(
    name: &str,
    observables: Vec<ObservableSpec>,
    trigger: Option<Expr>,
    body: Vec<Stmt>,
) -> Stmt {
    Stmt::Event(Rc::new(EventDef {
        name: name.to_string(),
        observables,
        trigger,
        body: Block::new(body),
    }))
}

pub fn if_(condition: Expr, then_branch: Vec<Stmt>, else_branch: Option<Vec<Stmt>>) -> Stmt {
    Stmt::If {
        condition,
        then_branch: Block::new(then_branch),
        else_branch: else_branch.map(Block::new),
    }
}

pub fn match_(scrutinee: Expr, arms: Vec<(Pattern, Vec<Stmt>)>, default: Option<Vec<Stmt>>) -> Stmt {
    Stmt::Match {
        scrutinee,
        arms: arms
            .into_iter()
            .map(|(pattern, body)| MatchArm {
                pattern,
                body: Block::new(body),
            })
            .collect(),
        default: default.map(Block::new),
    }
}

pub fn try_(main: Vec<Stmt>, fallback: Option<Vec<Stmt>>) -> Stmt {
    Stmt::Try {
        main: Block::new(main),
        fallback: fallback.map(Block::new),
    }
}

pub fn scope(instructions: Vec<Stmt>) -> Stmt {
    Stmt::Scope(Block::new(instructions))
}

pub fn ret(value: Option<Expr>) -> Stmt {
    Stmt::Return(value)
}

pub fn free(name: &str) -> Stmt {
    Stmt::Free(name.to_string())
}

/// Turns a call expression into a call statement.
///
/// Any other expression is wrapped in a throwaway declaration so it is
/// still evaluated.
pub fn exec(expr: Expr) -> Stmt {
    match expr {
        Expr::Call(call) => Stmt::Call(call),
        other => let_("_", other),
    }
}
