/*
Lingo bytecode toolchain

MIT License

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/

//! Typed AST for the Lingo dialect. One sum type per category; every node
//! carries its source position. Identifier scopes are resolved at parse
//! time, so a well-formed tree never reaches the generator with an
//! unresolved name.

use lingo_common::Pos;

/// Where a resolved identifier lives. Properties shadow everything
/// because they belong to the script instance, not the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    Global,
    Property,
}

/// Host-provided `the` built-ins. The discriminant doubles as the THE
/// instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TheId {
    MoviePath = 0,
    Frame = 1,
    DirSeparator = 2,
    Milliseconds = 3,
    RandomSeed = 4,
    Platform = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    Concat,
    ConcatSp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Int(i32),
    Float(f64),
    Str(String),
    Symbol(String),
    Void,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub pos: Pos,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(LiteralValue),
    Identifier { name: String, scope: Scope },
    The(TheId),
    List(Vec<Expr>),
    PropList(Vec<(Expr, Expr)>),
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: UnOp, expr: Box<Expr> },
    Dot { expr: Box<Expr>, name: String },
    Index { expr: Box<Expr>, from: Box<Expr>, to: Option<Box<Expr>> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
}

impl Expr {
    pub fn new(pos: Pos, kind: ExprKind) -> Self {
        Self { pos, kind }
    }

    /// Assignable targets: a plain identifier, a dot access, or a
    /// non-range index.
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Identifier { .. }
                | ExprKind::Dot { .. }
                | ExprKind::Index { to: None, .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub pos: Pos,
    pub kind: StmtKind,
}

impl Stmt {
    pub fn new(pos: Pos, kind: StmtKind) -> Self {
        Self { pos, kind }
    }
}

#[derive(Debug, Clone)]
pub struct IfBranch {
    pub condition: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct CaseClause {
    pub literals: Vec<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Return(Option<Expr>),
    Assign { lvalue: Expr, rvalue: Expr },
    Expr(Expr),
    If { branches: Vec<IfBranch>, else_body: Option<Vec<Stmt>> },
    RepeatWhile { condition: Expr, body: Vec<Stmt> },
    RepeatTo { iterator: Box<Expr>, init: Box<Expr>, to: Box<Expr>, down: bool, body: Vec<Stmt> },
    RepeatIn { iterator: Box<Expr>, iterable: Box<Expr>, body: Vec<Stmt> },
    ExitRepeat,
    NextRepeat,
    Put(Expr),
    PutOn { expr: Expr, target: Expr, before: bool },
    Case { expr: Expr, clauses: Vec<CaseClause>, otherwise: Option<Vec<Stmt>> },
}

/// One `on name ... end` block. `locals` is the set of names first
/// introduced by assignment inside the body, in first-seen order.
#[derive(Debug, Clone)]
pub struct HandlerDecl {
    pub pos: Pos,
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub locals: Vec<String>,
}

/// A parsed script: its property declarations and its handlers, in
/// source order.
#[derive(Debug, Clone, Default)]
pub struct Root {
    pub properties: Vec<String>,
    pub handlers: Vec<HandlerDecl>,
}
