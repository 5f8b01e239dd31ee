/// A single lexical token with its source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

/// Go token kinds, reduced to the subset this tool consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Keyword(Keyword),
    Int(i64),
    Float(f64),
    /// Interpreted or raw string literal, already unquoted.
    Str(String),
    /// Raw (backquoted) string literal; kept distinct because struct tags use it.
    RawStr(String),
    Char(char),
    /// Operators and punctuation, stored verbatim (e.g. ":=", "<-", "...").
    Op(&'static str),
    /// A semicolon, explicit or inserted by the lexer.
    Semi,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Break,
    Case,
    Chan,
    Const,
    Continue,
    Default,
    Defer,
    Else,
    Fallthrough,
    For,
    Func,
    Go,
    Goto,
    If,
    Import,
    Interface,
    Map,
    Package,
    Range,
    Return,
    Select,
    Struct,
    Switch,
    Type,
    Var,
}

impl Keyword {
    pub fn from_str(s: &str) -> Option<Keyword> {
        Some(match s {
            "break" => Keyword::Break,
            "case" => Keyword::Case,
            "chan" => Keyword::Chan,
            "const" => Keyword::Const,
            "continue" => Keyword::Continue,
            "default" => Keyword::Default,
            "defer" => Keyword::Defer,
            "else" => Keyword::Else,
            "fallthrough" => Keyword::Fallthrough,
            "for" => Keyword::For,
            "func" => Keyword::Func,
            "go" => Keyword::Go,
            "goto" => Keyword::Goto,
            "if" => Keyword::If,
            "import" => Keyword::Import,
            "interface" => Keyword::Interface,
            "map" => Keyword::Map,
            "package" => Keyword::Package,
            "range" => Keyword::Range,
            "return" => Keyword::Return,
            "select" => Keyword::Select,
            "struct" => Keyword::Struct,
            "switch" => Keyword::Switch,
            "type" => Keyword::Type,
            "var" => Keyword::Var,
            _ => return None,
        })
    }
}

impl TokenKind {
    /// Whether Go's automatic semicolon insertion applies after this token.
    pub fn ends_statement(&self) -> bool {
        match self {
            TokenKind::Ident(_)
            | TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::RawStr(_)
            | TokenKind::Char(_) => true,
            TokenKind::Keyword(k) => matches!(
                k,
                Keyword::Break | Keyword::Continue | Keyword::Fallthrough | Keyword::Return
            ),
            TokenKind::Op(op) => matches!(*op, "++" | "--" | ")" | "]" | "}"),
            _ => false,
        }
    }
}

/// A block of contiguous line comments, retained for doc attachment.
#[derive(Debug, Clone)]
pub struct CommentGroup {
    /// Line of the last comment in the group.
    pub end_line: usize,
    /// Comment text with the `//` markers stripped.
    pub lines: Vec<String>,
}

impl CommentGroup {
    pub fn text(&self) -> String {
        let parts: Vec<&str> = self
            .lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        parts.join(" ")
    }
}
