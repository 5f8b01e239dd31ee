use super::token::{CommentGroup, Keyword, Token, TokenKind};
use crate::error::{Error, Result};
use std::path::Path;

/// Lexes Go source into a token stream with Go's automatic semicolon
/// insertion applied, collecting line-comment groups for doc attachment.
pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
    file: &'a Path,
    tokens: Vec<Token>,
    comments: Vec<CommentGroup>,
    pending_comment: Option<CommentGroup>,
}

const OPERATORS: &[&str] = &[
    "<<=", ">>=", "&^=", "...", "&&", "||", "<-", "++", "--", "==", "!=", "<=", ">=", ":=", "+=",
    "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<", ">>", "&^", "+", "-", "*", "/", "%", "&", "|",
    "^", "<", ">", "=", "!", "(", ")", "[", "]", "{", "}", ",", ".", ":",
];

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, file: &'a Path) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            file,
            tokens: Vec::new(),
            comments: Vec::new(),
            pending_comment: None,
        }
    }

    pub fn tokenize(mut self) -> Result<(Vec<Token>, Vec<CommentGroup>)> {
        loop {
            self.skip_spaces()?;
            if self.pos >= self.src.len() {
                self.insert_semi_if_needed();
                self.flush_comment();
                self.tokens.push(Token {
                    kind: TokenKind::Eof,
                    line: self.line,
                });
                return Ok((self.tokens, self.comments));
            }

            let c = self.src[self.pos];
            if c == b'\n' {
                self.insert_semi_if_needed();
                self.line += 1;
                self.pos += 1;
                continue;
            }
            if c == b'/' && self.peek(1) == Some(b'/') {
                self.lex_line_comment();
                continue;
            }
            if c == b'/' && self.peek(1) == Some(b'*') {
                self.lex_block_comment()?;
                continue;
            }

            // Any real token separates the pending comment group from later decls
            // unless the group ends on the directly preceding line.
            self.flush_distant_comment();

            if c.is_ascii_alphabetic() || c == b'_' {
                self.lex_ident();
            } else if c.is_ascii_digit() {
                self.lex_number()?;
            } else if c == b'"' {
                self.lex_string()?;
            } else if c == b'`' {
                self.lex_raw_string()?;
            } else if c == b'\'' {
                self.lex_char()?;
            } else if c == b';' {
                self.pos += 1;
                self.push(TokenKind::Semi);
            } else {
                self.lex_operator()?;
            }
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            line: self.line,
        });
    }

    fn err(&self, message: impl Into<String>) -> Error {
        Error::Syntax {
            file: self.file.to_path_buf(),
            line: self.line,
            message: message.into(),
        }
    }

    fn skip_spaces(&mut self) -> Result<()> {
        while let Some(c) = self.src.get(self.pos) {
            match c {
                b' ' | b'\t' | b'\r' => self.pos += 1,
                _ => break,
            }
        }
        Ok(())
    }

    fn insert_semi_if_needed(&mut self) {
        if let Some(last) = self.tokens.last() {
            if last.kind.ends_statement() {
                self.push(TokenKind::Semi);
            }
        }
    }

    fn lex_line_comment(&mut self) {
        let start = self.pos + 2;
        let mut end = start;
        while end < self.src.len() && self.src[end] != b'\n' {
            end += 1;
        }
        let text = String::from_utf8_lossy(&self.src[start..end]).to_string();
        self.pos = end;

        match &mut self.pending_comment {
            Some(group) if group.end_line + 1 == self.line => {
                group.lines.push(text);
                group.end_line = self.line;
            }
            _ => {
                self.flush_comment();
                self.pending_comment = Some(CommentGroup {
                    end_line: self.line,
                    lines: vec![text],
                });
            }
        }
        // A comment line cannot trigger semicolon insertion on its own, but a
        // comment trailing real tokens must not swallow the newline's effect.
        self.insert_semi_if_needed();
    }

    fn lex_block_comment(&mut self) -> Result<()> {
        self.pos += 2;
        loop {
            match self.src.get(self.pos) {
                None => return Err(self.err("unterminated block comment")),
                Some(b'\n') => {
                    self.line += 1;
                    self.pos += 1;
                }
                Some(b'*') if self.peek(1) == Some(b'/') => {
                    self.pos += 2;
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn flush_comment(&mut self) {
        if let Some(group) = self.pending_comment.take() {
            self.comments.push(group);
        }
    }

    fn flush_distant_comment(&mut self) {
        let distant = match &self.pending_comment {
            Some(group) => group.end_line + 1 < self.line,
            None => false,
        };
        if distant {
            self.flush_comment();
        }
    }

    fn lex_ident(&mut self) {
        let start = self.pos;
        while let Some(c) = self.src.get(self.pos) {
            if c.is_ascii_alphanumeric() || *c == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word = String::from_utf8_lossy(&self.src[start..self.pos]).to_string();
        match Keyword::from_str(&word) {
            Some(kw) => self.push(TokenKind::Keyword(kw)),
            None => self.push(TokenKind::Ident(word)),
        }
    }

    fn lex_number(&mut self) -> Result<()> {
        let start = self.pos;
        let mut is_float = false;
        let radix = if self.src[self.pos] == b'0' {
            match self.peek(1) {
                Some(b'x') | Some(b'X') => {
                    self.pos += 2;
                    16
                }
                Some(b'b') | Some(b'B') => {
                    self.pos += 2;
                    2
                }
                Some(b'o') | Some(b'O') => {
                    self.pos += 2;
                    8
                }
                _ => 10,
            }
        } else {
            10
        };

        while let Some(&c) = self.src.get(self.pos) {
            if c == b'_' {
                self.pos += 1;
            } else if (c as char).is_digit(radix) {
                self.pos += 1;
            } else if radix == 10 && (c == b'.' || c == b'e' || c == b'E') {
                if c == b'.' && self.peek(1) == Some(b'.') {
                    // Start of "..." or a selector on an int receiver; stop here.
                    break;
                }
                is_float = true;
                self.pos += 1;
                if (c == b'e' || c == b'E')
                    && matches!(self.src.get(self.pos), Some(b'+') | Some(b'-'))
                {
                    self.pos += 1;
                }
            } else if radix == 16 && (c as char).is_ascii_hexdigit() {
                self.pos += 1;
            } else {
                break;
            }
        }

        let raw: String = String::from_utf8_lossy(&self.src[start..self.pos])
            .chars()
            .filter(|c| *c != '_')
            .collect();
        if is_float {
            let value: f64 = raw
                .parse()
                .map_err(|_| self.err(format!("malformed float literal {}", raw)))?;
            self.push(TokenKind::Float(value));
        } else {
            let digits = match radix {
                16 => raw.trim_start_matches("0x").trim_start_matches("0X"),
                2 => raw.trim_start_matches("0b").trim_start_matches("0B"),
                8 => raw.trim_start_matches("0o").trim_start_matches("0O"),
                _ => raw.as_str(),
            };
            // Legacy octal (leading zero) still parses as base 8.
            let (digits, radix) = if radix == 10 && digits.len() > 1 && digits.starts_with('0') {
                (&digits[1..], 8)
            } else {
                (digits, radix)
            };
            let value = i64::from_str_radix(digits, radix)
                .map_err(|_| self.err(format!("malformed int literal {}", raw)))?;
            self.push(TokenKind::Int(value));
        }
        Ok(())
    }

    fn lex_string(&mut self) -> Result<()> {
        self.pos += 1;
        let mut value = String::new();
        loop {
            match self.src.get(self.pos) {
                None | Some(b'\n') => return Err(self.err("unterminated string literal")),
                Some(b'"') => {
                    self.pos += 1;
                    self.push(TokenKind::Str(value));
                    return Ok(());
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let escaped = self
                        .src
                        .get(self.pos)
                        .copied()
                        .ok_or_else(|| self.err("unterminated escape"))?;
                    value.push(unescape(escaped));
                    self.pos += 1;
                }
                Some(&c) => {
                    value.push(c as char);
                    self.pos += 1;
                }
            }
        }
    }

    fn lex_raw_string(&mut self) -> Result<()> {
        self.pos += 1;
        let start = self.pos;
        loop {
            match self.src.get(self.pos) {
                None => return Err(self.err("unterminated raw string literal")),
                Some(b'`') => {
                    let value = String::from_utf8_lossy(&self.src[start..self.pos]).to_string();
                    self.pos += 1;
                    self.push(TokenKind::RawStr(value));
                    return Ok(());
                }
                Some(b'\n') => {
                    self.line += 1;
                    self.pos += 1;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn lex_char(&mut self) -> Result<()> {
        self.pos += 1;
        let c = match self.src.get(self.pos) {
            Some(b'\\') => {
                self.pos += 1;
                let escaped = self
                    .src
                    .get(self.pos)
                    .copied()
                    .ok_or_else(|| self.err("unterminated rune literal"))?;
                unescape(escaped)
            }
            Some(&c) => c as char,
            None => return Err(self.err("unterminated rune literal")),
        };
        self.pos += 1;
        if self.src.get(self.pos) != Some(&b'\'') {
            // Multi-byte runes and \u escapes are skipped to the closing quote.
            while let Some(&b) = self.src.get(self.pos) {
                if b == b'\'' || b == b'\n' {
                    break;
                }
                self.pos += 1;
            }
            if self.src.get(self.pos) != Some(&b'\'') {
                return Err(self.err("unterminated rune literal"));
            }
        }
        self.pos += 1;
        self.push(TokenKind::Char(c));
        Ok(())
    }

    fn lex_operator(&mut self) -> Result<()> {
        for op in OPERATORS {
            if self.src[self.pos..].starts_with(op.as_bytes()) {
                self.pos += op.len();
                self.push(TokenKind::Op(op));
                return Ok(());
            }
        }
        Err(self.err(format!(
            "unexpected character {:?}",
            self.src[self.pos] as char
        )))
    }
}

fn unescape(c: u8) -> char {
    match c {
        b'n' => '\n',
        b't' => '\t',
        b'r' => '\r',
        b'\\' => '\\',
        b'"' => '"',
        b'\'' => '\'',
        b'0' => '\0',
        other => other as char,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn lex(src: &str) -> Vec<TokenKind> {
        let path = PathBuf::from("test.go");
        let (tokens, _) = Lexer::new(src, &path).tokenize().unwrap();
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_idents_and_keywords() {
        let kinds = lex("package main");
        assert_eq!(kinds[0], TokenKind::Keyword(Keyword::Package));
        assert_eq!(kinds[1], TokenKind::Ident("main".to_string()));
    }

    #[test]
    fn test_semicolon_insertion() {
        let kinds = lex("x := 1\ny := 2\n");
        assert!(kinds.contains(&TokenKind::Semi));
        let semis = kinds.iter().filter(|k| **k == TokenKind::Semi).count();
        assert_eq!(semis, 2);
    }

    #[test]
    fn test_no_semicolon_after_open_brace() {
        let kinds = lex("func f() {\n}\n");
        // No semicolon between "{" and "}"
        let brace_pos = kinds.iter().position(|k| *k == TokenKind::Op("{")).unwrap();
        assert_ne!(kinds[brace_pos + 1], TokenKind::Semi);
    }

    #[test]
    fn test_string_literals() {
        let kinds = lex(r#"s := "hello\nworld""#);
        assert!(kinds.contains(&TokenKind::Str("hello\nworld".to_string())));
    }

    #[test]
    fn test_raw_string_tag() {
        let kinds = lex("`json:\"id\"`");
        assert_eq!(kinds[0], TokenKind::RawStr("json:\"id\"".to_string()));
    }

    #[test]
    fn test_numbers() {
        let kinds = lex("a := 42; b := 0x1F; c := 3.25; d := 1_000");
        assert!(kinds.contains(&TokenKind::Int(42)));
        assert!(kinds.contains(&TokenKind::Int(31)));
        assert!(kinds.contains(&TokenKind::Float(3.25)));
        assert!(kinds.contains(&TokenKind::Int(1000)));
    }

    #[test]
    fn test_comment_groups_collected() {
        let src = "// GetUser returns a user.\n// It never fails.\nfunc GetUser() {}\n";
        let path = PathBuf::from("test.go");
        let (_, comments) = Lexer::new(src, &path).tokenize().unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(
            comments[0].text(),
            "GetUser returns a user. It never fails."
        );
        assert_eq!(comments[0].end_line, 2);
    }

    #[test]
    fn test_multi_char_operators() {
        let kinds = lex("a <= b && c != d");
        assert!(kinds.contains(&TokenKind::Op("<=")));
        assert!(kinds.contains(&TokenKind::Op("&&")));
        assert!(kinds.contains(&TokenKind::Op("!=")));
    }
}
