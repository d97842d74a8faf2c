//! Syntax module for Exemplar snippets
//!
//! This module provides the Abstract Syntax Tree types for the teaching subset of
//! JavaScript, with source location tracking on every expression and statement.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

pub mod parser;

pub use parser::parse;

/// Represents a span in the source code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both.
    pub fn join(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Interned identifier text.
pub type Name = Rc<str>;

/// A parsed snippet.
#[derive(Debug, Clone)]
pub struct Program {
    pub body: Vec<Stmt>,
    /// `var` names hoisted to the top-level scope.
    pub var_names: Vec<Name>,
}

// ============================================================================
// STATEMENTS
// ============================================================================

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expr(Expr),
    VarDecl(VarDecl),
    Function(Rc<FunctionDef>),
    Class(Rc<ClassDef>),
    Block(Vec<Stmt>),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForEach {
        kind: ForEachKind,
        binding: ForBinding,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Try {
        block: Vec<Stmt>,
        handler: Option<CatchClause>,
        finalizer: Option<Vec<Stmt>>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Throw(Expr),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclKind {
    Let,
    Const,
    Var,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub kind: DeclKind,
    pub declarators: Vec<Declarator>,
}

#[derive(Debug, Clone)]
pub struct Declarator {
    pub target: Pattern,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum ForInit {
    VarDecl(VarDecl),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForEachKind {
    Of,
    In,
}

#[derive(Debug, Clone)]
pub struct ForBinding {
    /// `None` assigns to an existing binding: `for (x of xs)`.
    pub kind: Option<DeclKind>,
    pub target: Pattern,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// `None` for `default:`.
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub param: Option<Pattern>,
    pub body: Vec<Stmt>,
}

// ============================================================================
// FUNCTIONS AND CLASSES
// ============================================================================

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: Option<Name>,
    pub params: Vec<PatternElement>,
    pub rest: Option<Pattern>,
    pub body: FunctionBody,
    pub is_arrow: bool,
    pub var_names: Vec<Name>,
    pub span: Span,
}

impl FunctionDef {
    /// Number of parameters before the first default or rest, as reported by `fn.length`.
    pub fn arity(&self) -> usize {
        self.params
            .iter()
            .take_while(|p| p.default.is_none())
            .count()
    }
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: Option<Name>,
    pub parent: Option<Expr>,
    pub constructor: Rc<FunctionDef>,
    pub methods: Vec<ClassMethod>,
    pub fields: Vec<ClassField>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ClassMethod {
    pub key: PropKey,
    pub is_static: bool,
    pub func: Rc<FunctionDef>,
}

#[derive(Debug, Clone)]
pub struct ClassField {
    pub key: PropKey,
    pub is_static: bool,
    pub value: Option<Expr>,
}

// ============================================================================
// PATTERNS
// ============================================================================

#[derive(Debug, Clone)]
pub enum Pattern {
    Ident(Name, Span),
    Array {
        elements: Vec<Option<PatternElement>>,
        rest: Option<Box<Pattern>>,
        span: Span,
    },
    Object {
        props: Vec<ObjectPatternProp>,
        rest: Option<Name>,
        span: Span,
    },
    /// Assignment-only target such as `obj.x` inside `[obj.x, y] = pair`.
    Expr(Box<Expr>),
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Ident(_, span) => *span,
            Pattern::Array { span, .. } | Pattern::Object { span, .. } => *span,
            Pattern::Expr(expr) => expr.span,
        }
    }

    /// Every identifier the pattern binds, in source order.
    pub fn bound_names(&self, names: &mut Vec<Name>) {
        match self {
            Pattern::Ident(name, _) => names.push(name.clone()),
            Pattern::Array { elements, rest, .. } => {
                for element in elements.iter().flatten() {
                    element.pattern.bound_names(names);
                }
                if let Some(rest) = rest {
                    rest.bound_names(names);
                }
            }
            Pattern::Object { props, rest, .. } => {
                for prop in props {
                    prop.value.pattern.bound_names(names);
                }
                if let Some(rest) = rest {
                    names.push(rest.clone());
                }
            }
            Pattern::Expr(_) => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatternElement {
    pub pattern: Pattern,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct ObjectPatternProp {
    pub key: PropKey,
    pub value: PatternElement,
}

#[derive(Debug, Clone)]
pub enum PropKey {
    Static(Name),
    Computed(Box<Expr>),
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Number(f64),
    String(Name),
    Template {
        quasis: Vec<Name>,
        exprs: Vec<Expr>,
    },
    Bool(bool),
    Null,
    This,
    Ident(Name),
    Array(Vec<ArrayElement>),
    Object(Vec<PropertyDef>),
    Function(Rc<FunctionDef>),
    Class(Rc<ClassDef>),
    Unary {
        op: UnaryOp,
        argument: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Pattern>,
        value: Box<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: MemberProp,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<ArrayElement>,
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        args: Vec<ArrayElement>,
    },
    SuperCall(Vec<ArrayElement>),
    SuperMember(Name),
}

/// An element of an array literal or an argument list.
#[derive(Debug, Clone)]
pub enum ArrayElement {
    Item(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum PropertyDef {
    KeyValue(PropKey, Expr),
    Shorthand(Name, Span),
    Method(PropKey, Rc<FunctionDef>),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum MemberProp {
    Named(Name),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
    Delete,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    StrictEq,
    StrictNe,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    InstanceOf,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
    Logical(LogicalOp),
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Exp => "**",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNe => "!==",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::InstanceOf => "instanceof",
            BinaryOp::In => "in",
        }
    }
}

// ============================================================================
// HOISTING
// ============================================================================

/// Collects the `var` names declared anywhere in `body`, without entering nested functions.
pub fn collect_var_names(body: &[Stmt]) -> Vec<Name> {
    let mut names = Vec::new();
    for stmt in body {
        collect_stmt_vars(stmt, &mut names);
    }
    let mut seen = std::collections::HashSet::new();
    names.retain(|name| seen.insert(name.clone()));
    names
}

fn collect_decl_vars(decl: &VarDecl, names: &mut Vec<Name>) {
    if decl.kind != DeclKind::Var {
        return;
    }
    for declarator in &decl.declarators {
        declarator.target.bound_names(names);
    }
}

fn collect_stmt_vars(stmt: &Stmt, names: &mut Vec<Name>) {
    match &stmt.kind {
        StmtKind::VarDecl(decl) => collect_decl_vars(decl, names),
        StmtKind::Block(body) => body.iter().for_each(|s| collect_stmt_vars(s, names)),
        StmtKind::If {
            consequent,
            alternate,
            ..
        } => {
            collect_stmt_vars(consequent, names);
            if let Some(alternate) = alternate {
                collect_stmt_vars(alternate, names);
            }
        }
        StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } => {
            collect_stmt_vars(body, names)
        }
        StmtKind::For { init, body, .. } => {
            if let Some(ForInit::VarDecl(decl)) = init {
                collect_decl_vars(decl, names);
            }
            collect_stmt_vars(body, names);
        }
        StmtKind::ForEach { binding, body, .. } => {
            if binding.kind == Some(DeclKind::Var) {
                binding.target.bound_names(names);
            }
            collect_stmt_vars(body, names);
        }
        StmtKind::Switch { cases, .. } => {
            for case in cases {
                case.body.iter().for_each(|s| collect_stmt_vars(s, names));
            }
        }
        StmtKind::Try {
            block,
            handler,
            finalizer,
        } => {
            block.iter().for_each(|s| collect_stmt_vars(s, names));
            if let Some(handler) = handler {
                handler.body.iter().for_each(|s| collect_stmt_vars(s, names));
            }
            if let Some(finalizer) = finalizer {
                finalizer.iter().for_each(|s| collect_stmt_vars(s, names));
            }
        }
        _ => {}
    }
}
