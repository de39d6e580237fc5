//! The abstract syntax tree.
//!
//! The tree is owned (`Box`/`Vec`) and carries a [`Span`] on every node.
//! Passes never mutate a tree in place: the construct analyser consumes a
//! [`Module`] and produces a new one, so the parser output can be kept for
//! diffing when debugging a rewrite.

use quill_core::{BinaryOp, Span, UnaryOp};

/// A parsed compilation unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub stmts: Vec<Stmt>,
}

impl Module {
    /// Iterate the function definitions at module level.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.stmts.iter().filter_map(|s| match &s.kind {
            StmtKind::FunctionDef(f) => Some(f),
            _ => None,
        })
    }

    /// Iterate the class definitions at module level.
    pub fn classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.stmts.iter().filter_map(|s| match &s.kind {
            StmtKind::ClassDef(c) => Some(c),
            _ => None,
        })
    }
}

/// A statement with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

/// All statement forms.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    /// `target = value`
    Assign { target: Expr, value: Expr },
    /// `target: annotation = value`
    AnnAssign {
        target: Expr,
        annotation: TypeAnnotation,
        value: Expr,
    },
    /// `target op= value`
    AugAssign {
        target: Expr,
        op: BinaryOp,
        value: Expr,
    },
    /// `if`/`elif` chain with optional final `else`.
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
    },
    While { cond: Expr, body: Vec<Stmt> },
    /// `for target in iterable:`
    For {
        target: String,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Return { value: Option<Expr> },
    /// A bare expression evaluated for effect.
    Expr(Expr),
    /// `import module`
    Import { module: String },
    /// `from module import a, b`
    FromImport {
        module: String,
        names: Vec<String>,
    },
    /// `raise exc`
    Raise { exc: Expr },
    Pass,
    Break,
    Continue,
}

/// A decorator applied to a function or class.
#[derive(Debug, Clone, PartialEq)]
pub struct Decorator {
    pub name: String,
    /// Keyword arguments: `@public(safe=True)`.
    pub kwargs: Vec<(String, Expr)>,
    pub span: Span,
}

/// A function parameter as written.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamNode {
    pub name: String,
    pub annotation: Option<TypeAnnotation>,
    pub default: Option<Expr>,
    pub span: Span,
}

/// A function or method definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub decorators: Vec<Decorator>,
    pub params: Vec<ParamNode>,
    pub returns: Option<TypeAnnotation>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

impl FunctionDef {
    /// Find a decorator by name.
    pub fn decorator(&self, name: &str) -> Option<&Decorator> {
        self.decorators.iter().find(|d| d.name == name)
    }
}

/// A class definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub decorators: Vec<Decorator>,
    pub bases: Vec<String>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

impl ClassDef {
    /// Iterate the method definitions in the class body.
    pub fn methods(&self) -> impl Iterator<Item = &FunctionDef> {
        self.body.iter().filter_map(|s| match &s.kind {
            StmtKind::FunctionDef(f) => Some(f),
            _ => None,
        })
    }
}

/// A type annotation as written.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
    pub kind: TypeAnnotationKind,
    pub span: Span,
}

/// Annotation forms.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeAnnotationKind {
    /// `int`, `UInt160`, a class name.
    Name(String),
    /// `list[int]`, `dict[str, int]`, `tuple[int, str]`.
    Generic {
        name: String,
        args: Vec<TypeAnnotation>,
    },
}

/// An expression with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    /// Whether this expression is a literal constant (recursively, for
    /// displays of constants).
    pub fn is_constant(&self) -> bool {
        match &self.kind {
            ExprKind::Int(_)
            | ExprKind::Str(_)
            | ExprKind::Bytes(_)
            | ExprKind::Bool(_)
            | ExprKind::NoneLit => true,
            ExprKind::List(items) | ExprKind::Tuple(items) => {
                items.iter().all(Expr::is_constant)
            }
            _ => false,
        }
    }
}

/// All expression forms.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Name(String),
    Int(i128),
    Str(String),
    Bytes(Vec<u8>),
    Bool(bool),
    NoneLit,
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    /// `value.attr`
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    /// `value[index]`
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    /// `value[lower:upper]`
    Slice {
        value: Box<Expr>,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
    },
}
