//! The abstract syntax tree.
//!
//! Expressions, statements and type expressions are three separate tagged
//! unions. Every node carries the token that originated it so that later
//! stages get diagnostics positions for free; recursive children are boxed.

use crate::token::{Token, TokenKind};

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A name reference. The name is the token's lexeme.
    Identifier { token: Token },
    Number { token: Token, value: f64 },
    /// The cooked string value is the token's lexeme.
    String { token: Token },
    Boolean { token: Token, value: bool },
    Nil { token: Token },
    /// The receiver of the current method.
    SelfValue { token: Token },
    /// The parent class, usable as `super(...)` or `super.m(...)`.
    Super { token: Token },
    Table { token: Token, entries: Vec<TableEntry> },
    Prefix {
        token: Token,
        operator: UnaryOp,
        operand: Box<Expr>,
    },
    Infix {
        token: Token,
        operator: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        token: Token,
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },
    Member {
        token: Token,
        object: Box<Expr>,
        property: Token,
    },
    Index {
        token: Token,
        object: Box<Expr>,
        index: Box<Expr>,
    },
}

impl Expr {
    /// The token diagnostics should point at. Compound expressions defer to
    /// their leftmost operand, which is where the expression starts in the
    /// source.
    pub fn token(&self) -> &Token {
        match self {
            Expr::Identifier { token }
            | Expr::Number { token, .. }
            | Expr::String { token }
            | Expr::Boolean { token, .. }
            | Expr::Nil { token }
            | Expr::SelfValue { token }
            | Expr::Super { token }
            | Expr::Table { token, .. }
            | Expr::Prefix { token, .. } => token,
            Expr::Infix { left, .. } => left.token(),
            Expr::Call { callee, .. } => callee.token(),
            Expr::Member { object, .. } => object.token(),
            Expr::Index { object, .. } => object.token(),
        }
    }
}

/// One entry of a table literal. Positional values and keyed pairs mix
/// freely; source order is preserved.
#[derive(Clone, Debug, PartialEq)]
pub enum TableEntry {
    Value(Expr),
    /// `name = value`
    Pair { key: Token, value: Expr },
    /// `[expr] = value`
    Computed { key: Expr, value: Expr },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Not,
    Bang,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Minus => "-",
            UnaryOp::Not => "not",
            UnaryOp::Bang => "!",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// Not lexed from source; kept so generator-only trees emit correctly.
    Pow,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Concat,
    And,
    Or,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "~=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::LtEq => "<=",
            BinaryOp::GtEq => ">=",
            BinaryOp::Concat => "..",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    pub fn from_token(kind: TokenKind) -> Option<BinaryOp> {
        Some(match kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Asterisk => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::NotEq | TokenKind::NotEqLua => BinaryOp::NotEq,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::LtEq => BinaryOp::LtEq,
            TokenKind::GtEq => BinaryOp::GtEq,
            TokenKind::Concat => BinaryOp::Concat,
            TokenKind::And => BinaryOp::And,
            TokenKind::Or => BinaryOp::Or,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Variable {
        token: Token,
        name: Token,
        is_const: bool,
        ty: Option<TypeExpr>,
        value: Option<Expr>,
    },
    Function(FunctionDecl),
    Block(Block),
    Return {
        token: Token,
        value: Option<Expr>,
    },
    /// Else-if chains are nested `if` statements inside the alternative;
    /// there is no dedicated else-if node.
    If {
        token: Token,
        condition: Expr,
        consequence: Block,
        alternative: Option<Block>,
    },
    While {
        token: Token,
        condition: Expr,
        body: Block,
    },
    NumericFor {
        token: Token,
        variable: Token,
        start: Expr,
        end: Expr,
        step: Option<Expr>,
        body: Block,
    },
    GenericFor {
        token: Token,
        variable: Token,
        iterator: Expr,
        body: Block,
    },
    Do {
        token: Token,
        body: Block,
    },
    Break {
        token: Token,
    },
    Expression {
        expr: Expr,
    },
    Assignment {
        token: Token,
        target: Expr,
        value: Expr,
    },
    Class(ClassDecl),
    Interface(InterfaceDecl),
    Enum(EnumDecl),
    TypeAlias(TypeAliasDecl),
    Declare {
        token: Token,
        declaration: Box<Stmt>,
    },
    Export {
        token: Token,
        statement: Box<Stmt>,
    },
    Import {
        token: Token,
        /// Empty for wildcard imports.
        names: Vec<Token>,
        wildcard: bool,
        module: String,
    },
}

impl Stmt {
    pub fn token(&self) -> &Token {
        match self {
            Stmt::Variable { token, .. }
            | Stmt::Return { token, .. }
            | Stmt::If { token, .. }
            | Stmt::While { token, .. }
            | Stmt::NumericFor { token, .. }
            | Stmt::GenericFor { token, .. }
            | Stmt::Do { token, .. }
            | Stmt::Break { token }
            | Stmt::Assignment { token, .. }
            | Stmt::Declare { token, .. }
            | Stmt::Export { token, .. }
            | Stmt::Import { token, .. } => token,
            Stmt::Function(decl) => &decl.token,
            Stmt::Block(block) => &block.token,
            Stmt::Expression { expr } => expr.token(),
            Stmt::Class(decl) => &decl.token,
            Stmt::Interface(decl) => &decl.token,
            Stmt::Enum(decl) => &decl.token,
            Stmt::TypeAlias(decl) => &decl.token,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub token: Token,
    pub statements: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    pub token: Token,
    pub name: Token,
    pub generic_params: Vec<Token>,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<TypeExpr>,
    /// `None` for ambient declarations, which have no body.
    pub body: Option<Block>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: Token,
    pub ty: Option<TypeExpr>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassDecl {
    pub token: Token,
    pub name: Token,
    pub is_abstract: bool,
    pub generic_params: Vec<Token>,
    pub parent: Option<Token>,
    pub implements: Vec<Token>,
    pub properties: Vec<ClassProperty>,
    pub methods: Vec<ClassMethod>,
    pub constructor: Option<ConstructorDecl>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassProperty {
    pub name: Token,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_readonly: bool,
    pub ty: TypeExpr,
    pub value: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassMethod {
    pub name: Token,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_abstract: bool,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<TypeExpr>,
    /// `None` for abstract methods and ambient declarations.
    pub body: Option<Block>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConstructorDecl {
    pub token: Token,
    pub parameters: Vec<Parameter>,
    pub body: Option<Block>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceDecl {
    pub token: Token,
    pub name: Token,
    pub extends: Vec<Token>,
    pub properties: Vec<InterfaceProperty>,
    pub methods: Vec<InterfaceMethod>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceProperty {
    pub name: Token,
    pub ty: TypeExpr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceMethod {
    pub name: Token,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<TypeExpr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumDecl {
    pub token: Token,
    pub name: Token,
    /// Declared order; the generator relies on it for auto indices.
    pub members: Vec<EnumMember>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumMember {
    pub name: Token,
    pub value: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeAliasDecl {
    pub token: Token,
    pub name: Token,
    pub generic_params: Vec<Token>,
    /// `type Name = ...` form.
    pub aliased: Option<TypeExpr>,
    /// `type Name ... end` object-shape form.
    pub shape: Vec<InterfaceProperty>,
}

/// Type expressions, parsed in annotation positions only.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    /// A named type: a primitive, a declared type, or a generic parameter.
    Name { token: Token },
    /// `nil` used as a type.
    Nil { token: Token },
    /// A string literal used as a singleton type.
    StringLiteral { token: Token },
    /// A number literal used as a singleton type.
    NumberLiteral { token: Token, value: f64 },
    /// `T[]`
    Array { token: Token, element: Box<TypeExpr> },
    /// `table<K, V>`
    Table {
        token: Token,
        key: Box<TypeExpr>,
        value: Box<TypeExpr>,
    },
    /// `Name<T1, ..., Tn>`
    Generic {
        token: Token,
        base: Box<TypeExpr>,
        arguments: Vec<TypeExpr>,
    },
    /// `T?`
    Optional { token: Token, base: Box<TypeExpr> },
    /// `A | B | C`, flat by construction.
    Union { token: Token, members: Vec<TypeExpr> },
    /// `(T1, T2)`
    Tuple { token: Token, elements: Vec<TypeExpr> },
    /// `(T1, T2) => R` or `function(T1, T2): R`.
    Function {
        token: Token,
        parameters: Vec<TypeExpr>,
        return_type: Option<Box<TypeExpr>>,
    },
}

impl TypeExpr {
    pub fn token(&self) -> &Token {
        match self {
            TypeExpr::Name { token }
            | TypeExpr::Nil { token }
            | TypeExpr::StringLiteral { token }
            | TypeExpr::NumberLiteral { token, .. }
            | TypeExpr::Array { token, .. }
            | TypeExpr::Table { token, .. }
            | TypeExpr::Generic { token, .. }
            | TypeExpr::Optional { token, .. }
            | TypeExpr::Union { token, .. }
            | TypeExpr::Tuple { token, .. }
            | TypeExpr::Function { token, .. } => token,
        }
    }

    /// Builds a union from already-parsed members, flattening any member
    /// that is itself a union. No union node ever contains another union as
    /// a direct child.
    pub fn union_of(token: Token, members: Vec<TypeExpr>) -> TypeExpr {
        let mut flat = Vec::with_capacity(members.len());
        for member in members {
            match member {
                TypeExpr::Union { members, .. } => flat.extend(members),
                other => flat.push(other),
            }
        }
        TypeExpr::Union {
            token,
            members: flat,
        }
    }
}
