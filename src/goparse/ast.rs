use std::fmt;
use std::path::PathBuf;

/// A parsed Go source file.
#[derive(Debug, Clone)]
pub struct GoFile {
    pub path: PathBuf,
    pub package_name: String,
    pub imports: Vec<ImportSpec>,
    pub decls: Vec<Decl>,
}

impl GoFile {
    /// Resolves an identifier used as a package qualifier to an import path.
    /// Falls back to matching the last path segment when no alias is declared.
    pub fn resolve_import(&self, ident: &str) -> Option<&str> {
        for import in &self.imports {
            match &import.alias {
                Some(alias) if alias == ident => return Some(&import.path),
                Some(_) => continue,
                None => {
                    let last = import.path.rsplit('/').next().unwrap_or(&import.path);
                    if last == ident {
                        return Some(&import.path);
                    }
                }
            }
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct ImportSpec {
    pub alias: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone)]
pub enum Decl {
    Func(FuncDecl),
    Type(TypeDecl),
    Const(ValueDecl),
    Var(ValueDecl),
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: String,
    pub receiver: Option<Receiver>,
    pub params: Vec<ParamGroup>,
    pub results: Vec<TypeExpr>,
    /// `None` for declarations without a body, and in light load mode.
    pub body: Option<Block>,
    pub doc: String,
    pub line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone)]
pub struct Receiver {
    pub name: Option<String>,
    pub type_name: String,
    pub is_pointer: bool,
}

/// One name group in a parameter list (`a, b int` is a single group).
#[derive(Debug, Clone)]
pub struct ParamGroup {
    pub names: Vec<String>,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub doc: String,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct ValueDecl {
    pub specs: Vec<ValueSpec>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct ValueSpec {
    pub names: Vec<String>,
    pub ty: Option<TypeExpr>,
    pub values: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Ident(String),
    /// A qualified type such as `gin.Context`.
    Selector { package: String, name: String },
    Pointer(Box<TypeExpr>),
    Slice(Box<TypeExpr>),
    Array {
        len: Option<i64>,
        elem: Box<TypeExpr>,
    },
    Map {
        key: Box<TypeExpr>,
        value: Box<TypeExpr>,
    },
    Struct(Vec<StructField>),
    Interface,
    Func,
    Chan(Box<TypeExpr>),
    Variadic(Box<TypeExpr>),
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Ident(name) => write!(f, "{}", name),
            TypeExpr::Selector { package, name } => write!(f, "{}.{}", package, name),
            TypeExpr::Pointer(elem) => write!(f, "*{}", elem),
            TypeExpr::Slice(elem) => write!(f, "[]{}", elem),
            TypeExpr::Array { len, elem } => match len {
                Some(n) => write!(f, "[{}]{}", n, elem),
                None => write!(f, "[...]{}", elem),
            },
            TypeExpr::Map { key, value } => write!(f, "map[{}]{}", key, value),
            TypeExpr::Struct(fields) => {
                let names: Vec<&str> = fields.iter().filter_map(|field| field.ident()).collect();
                write!(f, "struct{{{}}}", names.join("; "))
            }
            TypeExpr::Interface => write!(f, "interface{{}}"),
            TypeExpr::Func => write!(f, "func"),
            TypeExpr::Chan(elem) => write!(f, "chan {}", elem),
            TypeExpr::Variadic(elem) => write!(f, "...{}", elem),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    /// Empty for embedded fields.
    pub names: Vec<String>,
    pub ty: TypeExpr,
    pub tag: Option<String>,
    pub doc: String,
    pub embedded: bool,
}

impl StructField {
    /// The identifier the field is addressed by: its name, or the type name
    /// for embedded fields.
    pub fn ident(&self) -> Option<&str> {
        if let Some(first) = self.names.first() {
            return Some(first);
        }
        match &self.ty {
            TypeExpr::Ident(name) => Some(name),
            TypeExpr::Selector { name, .. } => Some(name),
            TypeExpr::Pointer(inner) => match inner.as_ref() {
                TypeExpr::Ident(name) => Some(name),
                TypeExpr::Selector { name, .. } => Some(name),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    Assign {
        lhs: Vec<Expr>,
        rhs: Vec<Expr>,
        /// `true` for `:=` short variable declarations.
        define: bool,
    },
    Decl(Box<Decl>),
    Return(Vec<Expr>),
    If {
        init: Option<Box<Stmt>>,
        cond: Expr,
        then: Block,
        else_: Option<Box<Stmt>>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Block,
    },
    Range {
        key: Option<String>,
        value: Option<String>,
        expr: Expr,
        body: Block,
    },
    Switch {
        init: Option<Box<Stmt>>,
        tag: Option<Expr>,
        cases: Vec<CaseClause>,
    },
    /// `switch v := x.(type) { ... }`
    TypeSwitch {
        binding: Option<String>,
        expr: Expr,
        cases: Vec<CaseClause>,
    },
    Select(Vec<CaseClause>),
    Block(Block),
    Go(Expr),
    Defer(Expr),
    IncDec(Expr),
    Branch(&'static str),
    Send { channel: Expr, value: Expr },
    Empty,
}

#[derive(Debug, Clone)]
pub struct CaseClause {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Ident(String),
    Lit(Lit),
    Selector {
        expr: Box<Expr>,
        sel: String,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        line: usize,
    },
    Unary {
        op: &'static str,
        expr: Box<Expr>,
    },
    Binary {
        op: &'static str,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `*x` — dereference in expression position.
    Star(Box<Expr>),
    Index {
        expr: Box<Expr>,
        index: Box<Expr>,
    },
    SliceExpr(Box<Expr>),
    Composite {
        ty: TypeExpr,
        elems: Vec<Expr>,
    },
    KeyValue {
        key: Box<Expr>,
        value: Box<Expr>,
    },
    FuncLit {
        params: Vec<ParamGroup>,
        body: Block,
    },
    TypeAssert {
        expr: Box<Expr>,
        ty: Option<TypeExpr>,
    },
    /// A type used in expression position (conversions, make/new arguments).
    TypeRef(TypeExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Int(i64),
    Float(f64),
    Str(String),
    Char(char),
}

impl Expr {
    /// A printable name for a call's function expression, for log messages.
    pub fn call_name(&self) -> String {
        match self {
            Expr::Ident(name) => name.clone(),
            Expr::Selector { expr, sel } => match expr.as_ref() {
                Expr::Ident(base) => format!("{}.{}", base, sel),
                _ => sel.clone(),
            },
            _ => String::new(),
        }
    }
}
