// AST definitions consumed by the Ciphel runtime
//
// The runtime never parses text: an external front end (or the helpers in
// [`build`]) hands it a tree of statements and expressions.

pub mod build;

use std::rc::Rc;

/// Variable, function and field identifier
pub type Name = String;

/// Literal constants
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(i64),
    Float(f64),
    Char(char),
    Bool(bool),
    Str(String),
    Unit,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg, // -x
    Not, // !x
}

/// Comparison used by the energy and ECR threshold observables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl Comparator {
    pub fn holds(&self, value: f64, level: f64) -> bool {
        match self {
            Comparator::Less => value < level,
            Comparator::LessEqual => value <= level,
            Comparator::Greater => value > level,
            Comparator::GreaterEqual => value >= level,
        }
    }
}

/// Which part of a ribbon cell a write or an observable refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellAspect {
    Mode,
    State,
    Substate,
    Content,
    /// Any of the above (observables only)
    Any,
}

/// Outcome class of a command reported by the command log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandOutcome {
    Executed,
    Failed,
    Succeeded,
}

/// Runtime library functions implemented by the engine itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreFn {
    // Vectors
    VecWithCapacity,
    VecPush,
    VecPop,
    VecRemove,
    VecContains,
    VecGet,
    VecSet,
    VecLen,
    VecCapacity,
    VecExtend,
    VecClear,
    // Maps
    MapWithCapacity,
    MapInsert,
    MapGet,
    MapContains,
    MapDelete,
    MapLen,
    MapCapacity,
    MapKeys,
    MapClear,
    // Strings
    StrAppend,
    StrLen,
    CharAt,
    // Math
    Abs,
    Floor,
    Ceil,
    Sqrt,
    Pow,
    // Checks
    Assert,
    // Channels
    Chan,
    ChanAttach,
    ChanDetach,
    Send,
    Receive,
    // Ribbon
    SetCellMode,
    SetCellState,
    SetCellSubstate,
    SetCellContent,
    MoveCursor,
}

/// The target of a call
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// A user function or closure, resolved like any other value
    Function(Box<Expr>),
    /// A platform API function provided by the host
    Platform(Name),
    /// A runtime library function
    Core(CoreFn),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub callee: Callee,
    pub args: Vec<Expr>,
}

/// Function (and closure) definition
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Name,
    pub params: Vec<Name>,
    pub body: Block,
}

/// Match pattern
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Literal(Literal),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Block,
}

/// Expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Error {
        message: String,
        energy_cost: u64,
    },
    Variable(Name),

    // Static data
    Slice(Vec<Expr>),
    Tuple(Vec<Expr>),
    Struct(Vec<(Name, Expr)>),
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
    },

    // Heap data
    Vector(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Closure(Rc<FunctionDef>),

    // Addresses
    AddressOf(Box<Expr>), // &x
    Deref(Box<Expr>),     // *p

    // Operations
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Paren(Box<Expr>),
    Field {
        target: Box<Expr>,
        field: Name,
    },
    TupleIndex {
        target: Box<Expr>,
        index: usize,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },

    // Flows
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Match {
        scrutinee: Box<Expr>,
        arms: Vec<(Pattern, Expr)>,
        default: Option<Box<Expr>>,
    },
    Try {
        main: Box<Expr>,
        fallback: Option<Box<Expr>>,
    },
    Call(Call),
}

/// Assignable locations
#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    Variable(Name),
    Field { target: Box<Place>, field: Name },
    TupleIndex { target: Box<Place>, index: usize },
    Index { target: Box<Place>, index: Expr },
    Deref(Expr),
}

impl Place {
    /// The variable at the root of this place, if any
    pub fn root(&self) -> Option<&str> {
        match self {
            Place::Variable(name) => Some(name),
            Place::Field { target, .. }
            | Place::TupleIndex { target, .. }
            | Place::Index { target, .. } => target.root(),
            Place::Deref(_) => None,
        }
    }

    pub fn is_simple(&self) -> bool {
        matches!(self, Place::Variable(_))
    }
}

/// Left-hand side of a declaration
#[derive(Debug, Clone, PartialEq)]
pub enum DeclPattern {
    Name(Name),
    Tuple(Vec<Name>),
}

/// Subscription in an event condition. `None` targets mean "any".
#[derive(Debug, Clone, PartialEq)]
pub enum ObservableSpec {
    HeapChange(Option<Expr>),
    CursorMove(Option<Expr>),
    Cell {
        aspect: CellAspect,
        cell: Option<Expr>,
    },
    EventFired(Option<Name>),
    Command {
        outcome: CommandOutcome,
        command: Option<Expr>,
    },
    EnergyThreshold {
        level: Expr,
        comparator: Comparator,
    },
    EcrThreshold {
        level: Expr,
        comparator: Comparator,
    },
    InstructionCommitted(Option<Expr>),
    InstructionReverted(Option<Expr>),
}

/// Event definition
#[derive(Debug, Clone, PartialEq)]
pub struct EventDef {
    pub name: Name,
    pub observables: Vec<ObservableSpec>,
    pub trigger: Option<Expr>,
    pub body: Block,
}

/// A lexical scope body
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub instructions: Vec<Stmt>,
}

impl Block {
    pub fn new(instructions: Vec<Stmt>) -> Self {
        Block { instructions }
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Statements (instructions)
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Declare {
        pattern: DeclPattern,
        value: Expr,
    },
    Assign {
        target: Place,
        value: Expr,
    },
    For {
        item: Name,
        iterable: Expr,
        body: Block,
    },
    While {
        condition: Expr,
        body: Block,
    },
    Loop {
        body: Block,
    },
    Function(Rc<FunctionDef>),
    Event(Rc<EventDef>),
    RemoveEvent(Name),
    If {
        condition: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    Match {
        scrutinee: Expr,
        arms: Vec<MatchArm>,
        default: Option<Block>,
    },
    Try {
        main: Block,
        fallback: Option<Block>,
    },
    Call(Call),
    Scope(Block),
    Return(Option<Expr>),
    Break,
    Continue,
    Free(Name),
}

/// The initial general-scope instructions of a program
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub instructions: Vec<Stmt>,
}

impl Program {
    pub fn new(instructions: Vec<Stmt>) -> Self {
        Program { instructions }
    }
}
