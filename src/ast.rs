// File: src/ast.rs
//
// Parse tree for the Probotics scripting language. The parser builds this
// from the token stream; the compiler walks it to emit a flat instruction
// list. Kept intentionally small -- the language has no modules, no
// closures beyond lexical scope, and no user-defined exceptions.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Identifier(String),
    Binary { left: Box<Expr>, op: BinOp, right: Box<Expr> },
    Not(Box<Expr>),
    /// `a.b` — `target` evaluates to the owning object.
    Property { target: Box<Expr>, name: String },
    /// `a[i]` — `index` may be a string or integer at runtime.
    Index { target: Box<Expr>, index: Box<Expr> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// `target := value`. `target` must be an assignable form: `Identifier`,
    /// `Property`, or `Index` — enforced by the parser, not the AST's shape.
    Assign { target: Box<Expr>, value: Box<Expr> },
    /// `(arg1, arg2) { ... }` or a bare `{ ... }` (zero-arg block).
    Block { arg_names: Vec<String>, body: Vec<Stmt> },
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    If { condition: Expr, then_branch: Vec<Stmt>, else_branch: Option<Vec<Stmt>> },
    While { condition: Expr, body: Vec<Stmt> },
    Break,
    Next,
    Return(Option<Expr>),
}
