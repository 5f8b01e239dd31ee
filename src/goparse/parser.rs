use super::ast::*;
use super::lexer::Lexer;
use super::token::{CommentGroup, Keyword, Token, TokenKind};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Recursive-descent parser over the lexer's token stream.
///
/// Parses the Go subset this tool consumes: declarations, type expressions,
/// statements and expressions. Constructs outside the subset fail with a
/// syntax error naming the file and line.
pub struct Parser {
    tokens: Vec<Token>,
    comments: Vec<CommentGroup>,
    pos: usize,
    prev_line: usize,
    file: PathBuf,
    /// Composite literals are suppressed in if/for/switch headers, as in Go's
    /// own grammar.
    no_composite: bool,
    /// Trailing specs of grouped `type (...)` declarations, drained into the
    /// file's flat decl list.
    pending_type_specs: Vec<TypeDecl>,
}

pub fn parse_source(src: &str, path: &Path) -> Result<GoFile> {
    let (tokens, comments) = Lexer::new(src, path).tokenize()?;
    Parser {
        tokens,
        comments,
        pos: 0,
        prev_line: 1,
        file: path.to_path_buf(),
        no_composite: false,
        pending_type_specs: Vec::new(),
    }
    .parse_file()
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        match self.tokens.get(self.pos + offset) {
            Some(tok) => &tok.kind,
            None => &TokenKind::Eof,
        }
    }

    fn line(&self) -> usize {
        self.tokens[self.pos].line
    }

    fn bump(&mut self) -> TokenKind {
        let tok = self.tokens[self.pos].clone();
        self.prev_line = tok.line;
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok.kind
    }

    fn err(&self, message: impl Into<String>) -> Error {
        Error::Syntax {
            file: self.file.clone(),
            line: self.line(),
            message: message.into(),
        }
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), TokenKind::Op(o) if *o == op) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.err(format!("expected {:?}, found {:?}", op, self.peek())))
        }
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), TokenKind::Op(o) if *o == op)
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek(), TokenKind::Keyword(k) if *k == kw)
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.at_keyword(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_semis(&mut self) {
        while matches!(self.peek(), TokenKind::Semi) {
            self.bump();
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek() {
            TokenKind::Ident(_) => match self.bump() {
                TokenKind::Ident(name) => Ok(name),
                _ => unreachable!(),
            },
            other => Err(self.err(format!("expected identifier, found {:?}", other))),
        }
    }

    fn doc_for_line(&self, line: usize) -> String {
        if line == 0 {
            return String::new();
        }
        self.comments
            .iter()
            .find(|group| group.end_line + 1 == line)
            .map(|group| group.text())
            .unwrap_or_default()
    }

    fn parse_file(mut self) -> Result<GoFile> {
        self.eat_semis();
        if !self.eat_keyword(Keyword::Package) {
            return Err(self.err("expected package clause"));
        }
        let package_name = self.expect_ident()?;
        self.eat_semis();

        let mut imports = Vec::new();
        while self.at_keyword(Keyword::Import) {
            self.bump();
            if self.eat_op("(") {
                self.eat_semis();
                while !self.at_op(")") {
                    imports.push(self.parse_import_spec()?);
                    self.eat_semis();
                }
                self.expect_op(")")?;
            } else {
                imports.push(self.parse_import_spec()?);
            }
            self.eat_semis();
        }

        let mut decls = Vec::new();
        loop {
            self.eat_semis();
            if matches!(self.peek(), TokenKind::Eof) {
                break;
            }
            decls.push(self.parse_decl()?);
            for spec in std::mem::take(&mut self.pending_type_specs) {
                decls.push(Decl::Type(spec));
            }
        }

        Ok(GoFile {
            path: self.file.clone(),
            package_name,
            imports,
            decls,
        })
    }

    fn parse_import_spec(&mut self) -> Result<ImportSpec> {
        let alias = match self.peek() {
            TokenKind::Ident(_) => Some(self.expect_ident()?),
            TokenKind::Op(".") => {
                self.bump();
                Some(".".to_string())
            }
            _ => None,
        };
        match self.bump() {
            TokenKind::Str(path) | TokenKind::RawStr(path) => Ok(ImportSpec { alias, path }),
            other => Err(self.err(format!("expected import path, found {:?}", other))),
        }
    }

    fn parse_decl(&mut self) -> Result<Decl> {
        let doc = self.doc_for_line(self.line());
        match self.peek() {
            TokenKind::Keyword(Keyword::Func) => Ok(Decl::Func(self.parse_func_decl(doc)?)),
            TokenKind::Keyword(Keyword::Type) => self.parse_type_decl(doc),
            TokenKind::Keyword(Keyword::Const) => {
                let line = self.line();
                self.bump();
                Ok(Decl::Const(self.parse_value_decl(line)?))
            }
            TokenKind::Keyword(Keyword::Var) => {
                let line = self.line();
                self.bump();
                Ok(Decl::Var(self.parse_value_decl(line)?))
            }
            other => Err(self.err(format!("expected declaration, found {:?}", other))),
        }
    }

    fn parse_func_decl(&mut self, doc: String) -> Result<FuncDecl> {
        let line = self.line();
        self.bump(); // func

        let receiver = if self.at_op("(") {
            Some(self.parse_receiver()?)
        } else {
            None
        };

        let name = self.expect_ident()?;

        // Type parameter lists are skipped; the tool does not model generics.
        if self.at_op("[") {
            self.skip_balanced("[", "]")?;
        }

        let params = self.parse_params()?;
        let results = self.parse_results()?;

        let body = if self.at_op("{") {
            Some(self.parse_block()?)
        } else {
            None
        };
        let end_line = self.prev_line;

        Ok(FuncDecl {
            name,
            receiver,
            params,
            results,
            body,
            doc,
            line,
            end_line,
        })
    }

    fn parse_receiver(&mut self) -> Result<Receiver> {
        self.expect_op("(")?;
        let first = self.expect_ident()?;
        let (name, is_pointer, type_name) = if self.at_op(")") {
            // Unnamed receiver: (Server)
            (None, false, first)
        } else if self.eat_op("*") {
            (Some(first), true, self.expect_ident()?)
        } else {
            (Some(first), false, self.expect_ident()?)
        };
        self.expect_op(")")?;
        Ok(Receiver {
            name,
            type_name,
            is_pointer,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<ParamGroup>> {
        self.expect_op("(")?;
        let mut items: Vec<(Option<String>, TypeExpr)> = Vec::new();
        while !self.at_op(")") {
            if matches!(self.peek(), TokenKind::Ident(_)) && self.starts_type_at(1) {
                let name = self.expect_ident()?;
                let ty = self.parse_type()?;
                items.push((Some(name), ty));
            } else {
                let ty = self.parse_type()?;
                items.push((None, ty));
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;

        // Regroup: bare identifiers preceding a named item share its type
        // (`a, b int` parses as [a] then (b, int)).
        let named = items.iter().any(|(name, _)| name.is_some());
        let mut groups = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for (name, ty) in items {
            match name {
                Some(name) => {
                    pending.push(name);
                    groups.push(ParamGroup {
                        names: std::mem::take(&mut pending),
                        ty,
                    });
                }
                None => {
                    if named {
                        if let TypeExpr::Ident(ident) = &ty {
                            pending.push(ident.clone());
                            continue;
                        }
                    }
                    groups.push(ParamGroup {
                        names: Vec::new(),
                        ty,
                    });
                }
            }
        }
        Ok(groups)
    }

    fn parse_results(&mut self) -> Result<Vec<TypeExpr>> {
        if self.at_op("(") {
            let groups = self.parse_params()?;
            Ok(groups.into_iter().map(|g| g.ty).collect())
        } else if self.starts_type_at(0) {
            Ok(vec![self.parse_type()?])
        } else {
            Ok(Vec::new())
        }
    }

    fn starts_type_at(&self, offset: usize) -> bool {
        match self.peek_at(offset) {
            TokenKind::Ident(_) => true,
            TokenKind::Op(op) => matches!(*op, "*" | "[" | "..." | "(" | "<-"),
            TokenKind::Keyword(k) => matches!(
                k,
                Keyword::Map
                    | Keyword::Func
                    | Keyword::Chan
                    | Keyword::Interface
                    | Keyword::Struct
            ),
            _ => false,
        }
    }

    fn parse_type(&mut self) -> Result<TypeExpr> {
        match self.peek().clone() {
            TokenKind::Op("*") => {
                self.bump();
                Ok(TypeExpr::Pointer(Box::new(self.parse_type()?)))
            }
            TokenKind::Op("...") => {
                self.bump();
                Ok(TypeExpr::Variadic(Box::new(self.parse_type()?)))
            }
            TokenKind::Op("(") => {
                self.bump();
                let ty = self.parse_type()?;
                self.expect_op(")")?;
                Ok(ty)
            }
            TokenKind::Op("[") => {
                self.bump();
                if self.eat_op("]") {
                    return Ok(TypeExpr::Slice(Box::new(self.parse_type()?)));
                }
                let len = if self.eat_op("...") {
                    None
                } else {
                    match self.peek() {
                        TokenKind::Int(n) => {
                            let n = *n;
                            self.bump();
                            Some(n)
                        }
                        _ => {
                            // Non-literal array length; skip the expression.
                            self.skip_until_op("]")?;
                            None
                        }
                    }
                };
                self.expect_op("]")?;
                Ok(TypeExpr::Array {
                    len,
                    elem: Box::new(self.parse_type()?),
                })
            }
            TokenKind::Op("<-") => {
                self.bump();
                if !self.eat_keyword(Keyword::Chan) {
                    return Err(self.err("expected chan after <-"));
                }
                Ok(TypeExpr::Chan(Box::new(self.parse_type()?)))
            }
            TokenKind::Keyword(Keyword::Map) => {
                self.bump();
                self.expect_op("[")?;
                let key = self.parse_type()?;
                self.expect_op("]")?;
                let value = self.parse_type()?;
                Ok(TypeExpr::Map {
                    key: Box::new(key),
                    value: Box::new(value),
                })
            }
            TokenKind::Keyword(Keyword::Chan) => {
                self.bump();
                self.eat_op("<-");
                Ok(TypeExpr::Chan(Box::new(self.parse_type()?)))
            }
            TokenKind::Keyword(Keyword::Struct) => {
                self.bump();
                self.parse_struct_type()
            }
            TokenKind::Keyword(Keyword::Interface) => {
                self.bump();
                self.skip_balanced("{", "}")?;
                Ok(TypeExpr::Interface)
            }
            TokenKind::Keyword(Keyword::Func) => {
                self.bump();
                let _ = self.parse_params()?;
                let _ = self.parse_results()?;
                Ok(TypeExpr::Func)
            }
            TokenKind::Ident(_) => {
                let name = self.expect_ident()?;
                if self.at_op(".") && matches!(self.peek_at(1), TokenKind::Ident(_)) {
                    self.bump();
                    let sel = self.expect_ident()?;
                    Ok(TypeExpr::Selector { package: name, name: sel })
                } else {
                    Ok(TypeExpr::Ident(name))
                }
            }
            other => Err(self.err(format!("expected type, found {:?}", other))),
        }
    }

    fn parse_struct_type(&mut self) -> Result<TypeExpr> {
        self.expect_op("{")?;
        self.eat_semis();
        let mut fields = Vec::new();
        while !self.at_op("}") {
            let doc = self.doc_for_line(self.line());
            let field = self.parse_struct_field(doc)?;
            fields.push(field);
            self.eat_semis();
        }
        self.expect_op("}")?;
        Ok(TypeExpr::Struct(fields))
    }

    fn parse_struct_field(&mut self, doc: String) -> Result<StructField> {
        let (names, ty, embedded) = if self.at_op("*") {
            (Vec::new(), self.parse_type()?, true)
        } else {
            let first = self.expect_ident()?;
            if self.at_op(".") {
                // Embedded qualified type: pkg.Name
                self.bump();
                let sel = self.expect_ident()?;
                (
                    Vec::new(),
                    TypeExpr::Selector {
                        package: first,
                        name: sel,
                    },
                    true,
                )
            } else if self.at_op(",") {
                let mut names = vec![first];
                while self.eat_op(",") {
                    names.push(self.expect_ident()?);
                }
                (names, self.parse_type()?, false)
            } else if self.starts_type_at(0) {
                (vec![first], self.parse_type()?, false)
            } else {
                // Bare identifier: an embedded local type.
                (Vec::new(), TypeExpr::Ident(first), true)
            }
        };

        let tag = match self.peek() {
            TokenKind::Str(_) | TokenKind::RawStr(_) => match self.bump() {
                TokenKind::Str(tag) | TokenKind::RawStr(tag) => Some(tag),
                _ => unreachable!(),
            },
            _ => None,
        };

        Ok(StructField {
            names,
            ty,
            tag,
            doc,
            embedded,
        })
    }

    fn parse_type_decl(&mut self, doc: String) -> Result<Decl> {
        self.bump(); // type
        if self.eat_op("(") {
            // Grouped specs are flattened into individual decls; the first is
            // returned and the rest queued for the file-level decl list.
            self.eat_semis();
            let line = self.line();
            let spec_doc = self.doc_for_line(line);
            let mut first =
                self.parse_type_spec(if spec_doc.is_empty() { doc } else { spec_doc })?;
            first.line = line;
            self.eat_semis();
            while !self.at_op(")") {
                let line = self.line();
                let spec_doc = self.doc_for_line(line);
                let mut spec = self.parse_type_spec(spec_doc)?;
                spec.line = line;
                self.pending_type_specs.push(spec);
                self.eat_semis();
            }
            self.expect_op(")")?;
            return Ok(Decl::Type(first));
        }
        let line = self.line();
        let mut spec = self.parse_type_spec(doc)?;
        spec.line = line;
        Ok(Decl::Type(spec))
    }

    fn parse_type_spec(&mut self, doc: String) -> Result<TypeDecl> {
        let line = self.line();
        let name = self.expect_ident()?;
        if self.at_op("[") {
            self.skip_balanced("[", "]")?;
        }
        self.eat_op("="); // type alias
        let ty = self.parse_type()?;
        Ok(TypeDecl {
            name,
            ty,
            doc,
            line,
        })
    }

    fn parse_value_decl(&mut self, line: usize) -> Result<ValueDecl> {
        let mut specs = Vec::new();
        if self.eat_op("(") {
            self.eat_semis();
            while !self.at_op(")") {
                specs.push(self.parse_value_spec()?);
                self.eat_semis();
            }
            self.expect_op(")")?;
        } else {
            specs.push(self.parse_value_spec()?);
        }
        Ok(ValueDecl { specs, line })
    }

    fn parse_value_spec(&mut self) -> Result<ValueSpec> {
        let mut names = vec![self.expect_ident()?];
        while self.eat_op(",") {
            names.push(self.expect_ident()?);
        }
        let ty = if self.starts_type_at(0) && !self.at_op("=") {
            Some(self.parse_type()?)
        } else {
            None
        };
        let mut values = Vec::new();
        if self.eat_op("=") {
            values.push(self.parse_expr()?);
            while self.eat_op(",") {
                values.push(self.parse_expr()?);
            }
        }
        Ok(ValueSpec { names, ty, values })
    }

    fn parse_block(&mut self) -> Result<Block> {
        self.expect_op("{")?;
        let mut stmts = Vec::new();
        loop {
            self.eat_semis();
            if self.at_op("}") {
                break;
            }
            if matches!(self.peek(), TokenKind::Eof) {
                return Err(self.err("unexpected end of file in block"));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect_op("}")?;
        Ok(Block { stmts })
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        match self.peek().clone() {
            TokenKind::Semi => {
                self.bump();
                Ok(Stmt::Empty)
            }
            TokenKind::Op("{") => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Keyword(Keyword::Var) => {
                let line = self.line();
                self.bump();
                Ok(Stmt::Decl(Box::new(Decl::Var(self.parse_value_decl(line)?))))
            }
            TokenKind::Keyword(Keyword::Const) => {
                let line = self.line();
                self.bump();
                Ok(Stmt::Decl(Box::new(Decl::Const(
                    self.parse_value_decl(line)?,
                ))))
            }
            TokenKind::Keyword(Keyword::Type) => {
                let decl = self.parse_type_decl(String::new())?;
                Ok(Stmt::Decl(Box::new(decl)))
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.bump();
                let mut values = Vec::new();
                if !matches!(self.peek(), TokenKind::Semi) && !self.at_op("}") {
                    values.push(self.parse_expr()?);
                    while self.eat_op(",") {
                        values.push(self.parse_expr()?);
                    }
                }
                Ok(Stmt::Return(values))
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if_stmt(),
            TokenKind::Keyword(Keyword::For) => self.parse_for_stmt(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch_stmt(),
            TokenKind::Keyword(Keyword::Select) => {
                self.bump();
                let cases = self.parse_case_clauses()?;
                Ok(Stmt::Select(cases))
            }
            TokenKind::Keyword(Keyword::Go) => {
                self.bump();
                Ok(Stmt::Go(self.parse_expr()?))
            }
            TokenKind::Keyword(Keyword::Defer) => {
                self.bump();
                Ok(Stmt::Defer(self.parse_expr()?))
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.bump();
                if matches!(self.peek(), TokenKind::Ident(_)) {
                    self.bump();
                }
                Ok(Stmt::Branch("break"))
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.bump();
                if matches!(self.peek(), TokenKind::Ident(_)) {
                    self.bump();
                }
                Ok(Stmt::Branch("continue"))
            }
            TokenKind::Keyword(Keyword::Goto) => {
                self.bump();
                self.expect_ident()?;
                Ok(Stmt::Branch("goto"))
            }
            TokenKind::Keyword(Keyword::Fallthrough) => {
                self.bump();
                Ok(Stmt::Branch("fallthrough"))
            }
            _ => {
                // Labeled statement: `name:` followed by anything.
                if matches!(self.peek(), TokenKind::Ident(_))
                    && matches!(self.peek_at(1), TokenKind::Op(":"))
                {
                    self.bump();
                    self.bump();
                    self.eat_semis();
                    if self.at_op("}") {
                        return Ok(Stmt::Empty);
                    }
                    return self.parse_stmt();
                }
                self.parse_simple_stmt()
            }
        }
    }

    fn parse_simple_stmt(&mut self) -> Result<Stmt> {
        let first = self.parse_expr()?;
        let mut lhs = vec![first];
        while self.eat_op(",") {
            lhs.push(self.parse_expr()?);
        }

        match self.peek().clone() {
            TokenKind::Op(":=") | TokenKind::Op("=") => {
                let define = self.at_op(":=");
                self.bump();
                let mut rhs = vec![self.parse_expr()?];
                while self.eat_op(",") {
                    rhs.push(self.parse_expr()?);
                }
                Ok(Stmt::Assign { lhs, rhs, define })
            }
            TokenKind::Op(op)
                if matches!(
                    op,
                    "+=" | "-=" | "*=" | "/=" | "%=" | "&=" | "|=" | "^=" | "<<=" | ">>=" | "&^="
                ) =>
            {
                self.bump();
                let rhs = vec![self.parse_expr()?];
                Ok(Stmt::Assign {
                    lhs,
                    rhs,
                    define: false,
                })
            }
            TokenKind::Op("++") | TokenKind::Op("--") => {
                self.bump();
                Ok(Stmt::IncDec(lhs.remove(0)))
            }
            TokenKind::Op("<-") => {
                self.bump();
                let value = self.parse_expr()?;
                Ok(Stmt::Send {
                    channel: lhs.remove(0),
                    value,
                })
            }
            _ => Ok(Stmt::Expr(lhs.remove(0))),
        }
    }

    fn parse_if_stmt(&mut self) -> Result<Stmt> {
        self.bump(); // if
        let saved = self.no_composite;
        self.no_composite = true;
        let mut init = None;
        let mut stmt = self.parse_simple_stmt()?;
        if matches!(self.peek(), TokenKind::Semi) {
            self.bump();
            init = Some(Box::new(stmt));
            stmt = self.parse_simple_stmt()?;
        }
        self.no_composite = saved;
        let cond = match stmt {
            Stmt::Expr(expr) => expr,
            // `if v, ok := m[k]; ok` style conditions always split on the
            // semicolon, so a non-expression here is malformed input.
            _ => return Err(self.err("expected condition expression in if statement")),
        };
        let then = self.parse_block()?;
        let else_ = if self.eat_keyword(Keyword::Else) {
            if self.at_keyword(Keyword::If) {
                Some(Box::new(self.parse_if_stmt()?))
            } else {
                Some(Box::new(Stmt::Block(self.parse_block()?)))
            }
        } else {
            None
        };
        Ok(Stmt::If {
            init,
            cond,
            then,
            else_,
        })
    }

    fn parse_for_stmt(&mut self) -> Result<Stmt> {
        self.bump(); // for
        if self.at_op("{") {
            let body = self.parse_block()?;
            return Ok(Stmt::For {
                init: None,
                cond: None,
                post: None,
                body,
            });
        }

        let saved = self.no_composite;
        self.no_composite = true;

        if self.at_keyword(Keyword::Range) {
            self.bump();
            let expr = self.parse_expr()?;
            self.no_composite = saved;
            let body = self.parse_block()?;
            return Ok(Stmt::Range {
                key: None,
                value: None,
                expr,
                body,
            });
        }

        // Detect `k, v := range x` before committing to a plain simple stmt.
        if let Some(range_stmt) = self.try_parse_range()? {
            self.no_composite = saved;
            return Ok(range_stmt);
        }

        let first = self.parse_simple_stmt()?;
        if matches!(self.peek(), TokenKind::Semi) {
            self.bump();
            let cond = if matches!(self.peek(), TokenKind::Semi) {
                None
            } else {
                match self.parse_simple_stmt()? {
                    Stmt::Expr(expr) => Some(expr),
                    _ => return Err(self.err("expected condition in for statement")),
                }
            };
            if matches!(self.peek(), TokenKind::Semi) {
                self.bump();
            }
            let post = if self.at_op("{") {
                None
            } else {
                Some(Box::new(self.parse_simple_stmt()?))
            };
            self.no_composite = saved;
            let body = self.parse_block()?;
            return Ok(Stmt::For {
                init: Some(Box::new(first)),
                cond,
                post,
                body,
            });
        }

        self.no_composite = saved;
        let body = self.parse_block()?;
        match first {
            Stmt::Expr(cond) => Ok(Stmt::For {
                init: None,
                cond: Some(cond),
                post: None,
                body,
            }),
            other => Ok(Stmt::For {
                init: Some(Box::new(other)),
                cond: None,
                post: None,
                body,
            }),
        }
    }

    /// Lookahead for `k := range x` / `k, v := range x` / `k = range x`.
    fn try_parse_range(&mut self) -> Result<Option<Stmt>> {
        let mut offset = 0;
        let mut idents = Vec::new();
        loop {
            match self.peek_at(offset) {
                TokenKind::Ident(name) => {
                    idents.push(name.clone());
                    offset += 1;
                }
                _ => return Ok(None),
            }
            match self.peek_at(offset) {
                TokenKind::Op(",") => offset += 1,
                TokenKind::Op(":=") | TokenKind::Op("=") => {
                    offset += 1;
                    break;
                }
                _ => return Ok(None),
            }
        }
        if !matches!(self.peek_at(offset), TokenKind::Keyword(Keyword::Range)) {
            return Ok(None);
        }
        // Commit: consume idents, assign op, range keyword.
        for _ in 0..=offset {
            self.bump();
        }
        let expr = self.parse_expr()?;
        let saved = self.no_composite;
        self.no_composite = false;
        let body = self.parse_block()?;
        self.no_composite = saved;
        let mut names = idents.into_iter();
        Ok(Some(Stmt::Range {
            key: names.next(),
            value: names.next(),
            expr,
            body,
        }))
    }

    fn parse_switch_stmt(&mut self) -> Result<Stmt> {
        self.bump(); // switch
        let saved = self.no_composite;
        self.no_composite = true;

        let mut init = None;
        let mut tag = None;
        let mut type_switch: Option<(Option<String>, Expr)> = None;

        if !self.at_op("{") {
            let stmt = self.parse_simple_stmt()?;
            let stmt = if matches!(self.peek(), TokenKind::Semi) {
                self.bump();
                init = Some(Box::new(stmt));
                if self.at_op("{") {
                    None
                } else {
                    Some(self.parse_simple_stmt()?)
                }
            } else {
                Some(stmt)
            };
            if let Some(stmt) = stmt {
                match stmt {
                    Stmt::Expr(Expr::TypeAssert { expr, ty: None }) => {
                        type_switch = Some((None, *expr));
                    }
                    Stmt::Assign { lhs, mut rhs, .. } => {
                        if let Some(Expr::TypeAssert { expr, ty: None }) = rhs.pop() {
                            let binding = match lhs.first() {
                                Some(Expr::Ident(name)) => Some(name.clone()),
                                _ => None,
                            };
                            type_switch = Some((binding, *expr));
                        }
                    }
                    Stmt::Expr(expr) => tag = Some(expr),
                    _ => {}
                }
            }
        }

        self.no_composite = saved;
        let cases = self.parse_case_clauses()?;

        if let Some((binding, expr)) = type_switch {
            return Ok(Stmt::TypeSwitch {
                binding,
                expr,
                cases,
            });
        }
        Ok(Stmt::Switch { init, tag, cases })
    }

    fn parse_case_clauses(&mut self) -> Result<Vec<CaseClause>> {
        self.expect_op("{")?;
        self.eat_semis();
        let mut cases = Vec::new();
        while !self.at_op("}") {
            match self.peek() {
                TokenKind::Keyword(Keyword::Case) => {
                    self.bump();
                    // Case headers may hold expressions, types, or receive
                    // statements; skip to the colon at bracket depth zero.
                    self.skip_case_header()?;
                }
                TokenKind::Keyword(Keyword::Default) => {
                    self.bump();
                    self.expect_op(":")?;
                }
                other => {
                    return Err(self.err(format!("expected case or default, found {:?}", other)))
                }
            }
            let mut body = Vec::new();
            loop {
                self.eat_semis();
                if self.at_op("}")
                    || self.at_keyword(Keyword::Case)
                    || self.at_keyword(Keyword::Default)
                {
                    break;
                }
                body.push(self.parse_stmt()?);
            }
            cases.push(CaseClause { body });
        }
        self.expect_op("}")?;
        Ok(cases)
    }

    fn skip_case_header(&mut self) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                TokenKind::Eof => return Err(self.err("unexpected end of file in case header")),
                TokenKind::Op("(") | TokenKind::Op("[") | TokenKind::Op("{") => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::Op(")") | TokenKind::Op("]") | TokenKind::Op("}") => {
                    depth = depth.saturating_sub(1);
                    self.bump();
                }
                TokenKind::Op(":") if depth == 0 => {
                    self.bump();
                    return Ok(());
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn skip_balanced(&mut self, open: &str, close: &str) -> Result<()> {
        self.expect_op(open)?;
        let mut depth = 1usize;
        loop {
            match self.peek() {
                TokenKind::Eof => return Err(self.err("unexpected end of file")),
                TokenKind::Op(op) if *op == open => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::Op(op) if *op == close => {
                    depth -= 1;
                    self.bump();
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn skip_until_op(&mut self, op: &str) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                TokenKind::Eof => return Err(self.err("unexpected end of file")),
                TokenKind::Op("(") | TokenKind::Op("[") => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::Op(")") | TokenKind::Op("]") if depth > 0 => {
                    depth -= 1;
                    self.bump();
                }
                TokenKind::Op(o) if *o == op && depth == 0 => return Ok(()),
                _ => {
                    self.bump();
                }
            }
        }
    }

    // --- Expressions ---

    pub(crate) fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_binary(1)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let (op, prec) = match self.peek() {
                TokenKind::Op(op) => match binary_precedence(op) {
                    Some(prec) => (*op, prec),
                    None => break,
                },
                _ => break,
            };
            if prec < min_prec {
                break;
            }
            self.bump();
            let right = self.parse_binary(prec + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek().clone() {
            TokenKind::Op("&") => {
                self.bump();
                Ok(Expr::Unary {
                    op: "&",
                    expr: Box::new(self.parse_unary()?),
                })
            }
            TokenKind::Op("!") | TokenKind::Op("-") | TokenKind::Op("+") | TokenKind::Op("^") => {
                let op = match self.bump() {
                    TokenKind::Op(op) => op,
                    _ => unreachable!(),
                };
                Ok(Expr::Unary {
                    op,
                    expr: Box::new(self.parse_unary()?),
                })
            }
            TokenKind::Op("*") => {
                self.bump();
                Ok(Expr::Star(Box::new(self.parse_unary()?)))
            }
            TokenKind::Op("<-") => {
                self.bump();
                Ok(Expr::Unary {
                    op: "<-",
                    expr: Box::new(self.parse_unary()?),
                })
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let mut expr = self.parse_operand()?;
        loop {
            match self.peek().clone() {
                TokenKind::Op(".") => {
                    self.bump();
                    if self.eat_op("(") {
                        let ty = if self.at_keyword(Keyword::Type) {
                            self.bump();
                            None
                        } else {
                            Some(self.parse_type()?)
                        };
                        self.expect_op(")")?;
                        expr = Expr::TypeAssert {
                            expr: Box::new(expr),
                            ty,
                        };
                    } else {
                        let sel = self.expect_ident()?;
                        expr = Expr::Selector {
                            expr: Box::new(expr),
                            sel,
                        };
                    }
                }
                TokenKind::Op("(") => {
                    let line = self.line();
                    self.bump();
                    let saved = self.no_composite;
                    self.no_composite = false;
                    let mut args = Vec::new();
                    while !self.at_op(")") {
                        args.push(self.parse_expr()?);
                        self.eat_op("...");
                        if !self.eat_op(",") {
                            break;
                        }
                    }
                    self.no_composite = saved;
                    self.expect_op(")")?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        line,
                    };
                }
                TokenKind::Op("[") => {
                    self.bump();
                    let saved = self.no_composite;
                    self.no_composite = false;
                    if self.at_op(":") {
                        // Slice with elided low bound.
                        self.skip_until_op("]")?;
                        self.no_composite = saved;
                        self.expect_op("]")?;
                        expr = Expr::SliceExpr(Box::new(expr));
                        continue;
                    }
                    let index = self.parse_expr()?;
                    if self.at_op(":") {
                        self.skip_until_op("]")?;
                        self.no_composite = saved;
                        self.expect_op("]")?;
                        expr = Expr::SliceExpr(Box::new(expr));
                    } else {
                        self.no_composite = saved;
                        self.expect_op("]")?;
                        expr = Expr::Index {
                            expr: Box::new(expr),
                            index: Box::new(index),
                        };
                    }
                }
                TokenKind::Op("{") if !self.no_composite => {
                    let ty = match composite_type_of(&expr) {
                        Some(ty) => ty,
                        None => break,
                    };
                    let elems = self.parse_composite_elems()?;
                    expr = Expr::Composite { ty, elems };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_operand(&mut self) -> Result<Expr> {
        match self.peek().clone() {
            TokenKind::Int(n) => {
                self.bump();
                Ok(Expr::Lit(Lit::Int(n)))
            }
            TokenKind::Float(n) => {
                self.bump();
                Ok(Expr::Lit(Lit::Float(n)))
            }
            TokenKind::Str(s) | TokenKind::RawStr(s) => {
                self.bump();
                Ok(Expr::Lit(Lit::Str(s)))
            }
            TokenKind::Char(c) => {
                self.bump();
                Ok(Expr::Lit(Lit::Char(c)))
            }
            TokenKind::Ident(name) => {
                self.bump();
                Ok(Expr::Ident(name))
            }
            TokenKind::Op("(") => {
                self.bump();
                let saved = self.no_composite;
                self.no_composite = false;
                let inner = self.parse_expr()?;
                self.no_composite = saved;
                self.expect_op(")")?;
                Ok(inner)
            }
            TokenKind::Keyword(Keyword::Func) => {
                self.bump();
                let params = self.parse_params()?;
                let _ = self.parse_results()?;
                let saved = self.no_composite;
                self.no_composite = false;
                let body = self.parse_block()?;
                self.no_composite = saved;
                Ok(Expr::FuncLit { params, body })
            }
            TokenKind::Op("[")
            | TokenKind::Keyword(Keyword::Map)
            | TokenKind::Keyword(Keyword::Struct)
            | TokenKind::Keyword(Keyword::Chan)
            | TokenKind::Keyword(Keyword::Interface) => {
                let ty = self.parse_type()?;
                if self.at_op("{") {
                    let elems = self.parse_composite_elems()?;
                    Ok(Expr::Composite { ty, elems })
                } else {
                    Ok(Expr::TypeRef(ty))
                }
            }
            other => Err(self.err(format!("expected expression, found {:?}", other))),
        }
    }

    fn parse_composite_elems(&mut self) -> Result<Vec<Expr>> {
        self.expect_op("{")?;
        let saved = self.no_composite;
        self.no_composite = false;
        let mut elems = Vec::new();
        loop {
            self.eat_semis();
            if self.at_op("}") {
                break;
            }
            let elem = if self.at_op("{") {
                // Untyped nested literal inside a slice/map literal.
                let inner = self.parse_composite_elems()?;
                Expr::Composite {
                    ty: TypeExpr::Ident(String::new()),
                    elems: inner,
                }
            } else {
                self.parse_expr()?
            };
            let elem = if self.eat_op(":") {
                let value = if self.at_op("{") {
                    let inner = self.parse_composite_elems()?;
                    Expr::Composite {
                        ty: TypeExpr::Ident(String::new()),
                        elems: inner,
                    }
                } else {
                    self.parse_expr()?
                };
                Expr::KeyValue {
                    key: Box::new(elem),
                    value: Box::new(value),
                }
            } else {
                elem
            };
            elems.push(elem);
            if !self.eat_op(",") {
                self.eat_semis();
                break;
            }
        }
        self.no_composite = saved;
        self.expect_op("}")?;
        Ok(elems)
    }
}

fn binary_precedence(op: &str) -> Option<u8> {
    match op {
        "||" => Some(1),
        "&&" => Some(2),
        "==" | "!=" | "<" | "<=" | ">" | ">=" => Some(3),
        "+" | "-" | "|" | "^" => Some(4),
        "*" | "/" | "%" | "<<" | ">>" | "&" | "&^" => Some(5),
        _ => None,
    }
}

/// Converts an expression back into the type it denotes when it prefixes a
/// composite literal (`User{...}`, `model.User{...}`).
fn composite_type_of(expr: &Expr) -> Option<TypeExpr> {
    match expr {
        Expr::Ident(name) => Some(TypeExpr::Ident(name.clone())),
        Expr::Selector { expr, sel } => match expr.as_ref() {
            Expr::Ident(package) => Some(TypeExpr::Selector {
                package: package.clone(),
                name: sel.clone(),
            }),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> GoFile {
        parse_source(src, Path::new("test.go")).unwrap()
    }

    #[test]
    fn test_parse_package_and_imports() {
        let file = parse(
            "package main\n\nimport (\n\t\"net/http\"\n\tg \"github.com/gin-gonic/gin\"\n)\n",
        );
        assert_eq!(file.package_name, "main");
        assert_eq!(file.imports.len(), 2);
        assert_eq!(file.resolve_import("http"), Some("net/http"));
        assert_eq!(file.resolve_import("g"), Some("github.com/gin-gonic/gin"));
        assert_eq!(file.resolve_import("gin"), None);
    }

    #[test]
    fn test_parse_struct_with_tags() {
        let file = parse(
            "package types\n\ntype Contact struct {\n\tID int `json:\"id\"`\n\tName string `json:\"name\"`\n}\n",
        );
        let decl = match &file.decls[0] {
            Decl::Type(decl) => decl,
            other => panic!("expected type decl, got {:?}", other),
        };
        assert_eq!(decl.name, "Contact");
        let fields = match &decl.ty {
            TypeExpr::Struct(fields) => fields,
            other => panic!("expected struct, got {:?}", other),
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].names, vec!["ID".to_string()]);
        assert_eq!(fields[0].tag.as_deref(), Some("json:\"id\""));
        assert_eq!(fields[1].ty, TypeExpr::Ident("string".to_string()));
    }

    #[test]
    fn test_parse_embedded_field() {
        let file = parse(
            "package types\n\ntype Audit struct{}\n\ntype Entry struct {\n\tAudit\n\tValue string\n}\n",
        );
        let decl = match &file.decls[1] {
            Decl::Type(decl) => decl,
            _ => panic!("expected type decl"),
        };
        let fields = match &decl.ty {
            TypeExpr::Struct(fields) => fields,
            _ => panic!("expected struct"),
        };
        assert!(fields[0].embedded);
        assert_eq!(fields[0].ident(), Some("Audit"));
        assert!(!fields[1].embedded);
    }

    #[test]
    fn test_parse_method_with_receiver() {
        let file = parse(
            "package main\n\ntype Server struct{}\n\nfunc (s *Server) Handle(name string) {}\n",
        );
        let decl = match &file.decls[1] {
            Decl::Func(decl) => decl,
            _ => panic!("expected func decl"),
        };
        assert_eq!(decl.name, "Handle");
        let recv = decl.receiver.as_ref().unwrap();
        assert_eq!(recv.type_name, "Server");
        assert!(recv.is_pointer);
        assert_eq!(decl.params.len(), 1);
        assert_eq!(decl.params[0].names, vec!["name".to_string()]);
    }

    #[test]
    fn test_parse_doc_comments() {
        let file = parse(
            "package main\n\n// GetUser returns the user.\n// Second line.\nfunc GetUser() {}\n",
        );
        let decl = match &file.decls[0] {
            Decl::Func(decl) => decl,
            _ => panic!("expected func decl"),
        };
        assert_eq!(decl.doc, "GetUser returns the user. Second line.");
    }

    #[test]
    fn test_parse_const_block() {
        let file = parse(
            "package status\n\ntype Code int\n\nconst (\n\tActive Code = 1\n\tInactive Code = 2\n)\n",
        );
        let decl = match &file.decls[1] {
            Decl::Const(decl) => decl,
            _ => panic!("expected const decl"),
        };
        assert_eq!(decl.specs.len(), 2);
        assert_eq!(decl.specs[0].names, vec!["Active".to_string()]);
        assert_eq!(
            decl.specs[0].ty,
            Some(TypeExpr::Ident("Code".to_string()))
        );
        assert!(matches!(
            decl.specs[0].values[0],
            Expr::Lit(Lit::Int(1))
        ));
    }

    #[test]
    fn test_parse_handler_body_calls() {
        let src = r#"package main

import (
	"net/http"

	"github.com/gin-gonic/gin"
)

func GetContact(c *gin.Context) {
	id := c.Param("id")
	contact := Contact{ID: 1, Name: id}
	c.JSON(http.StatusOK, contact)
}
"#;
        let file = parse(src);
        let decl = match &file.decls[0] {
            Decl::Func(decl) => decl,
            _ => panic!("expected func decl"),
        };
        let body = decl.body.as_ref().unwrap();
        assert_eq!(body.stmts.len(), 3);
        match &body.stmts[2] {
            Stmt::Expr(Expr::Call { func, args, .. }) => {
                assert_eq!(func.call_name(), "c.JSON");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected call statement, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_if_with_init() {
        let src = "package main\n\nfunc f(m map[string]int) int {\n\tif v, ok := m[\"k\"]; ok {\n\t\treturn v\n\t}\n\treturn 0\n}\n";
        let file = parse(src);
        let decl = match &file.decls[0] {
            Decl::Func(decl) => decl,
            _ => panic!("expected func decl"),
        };
        match &decl.body.as_ref().unwrap().stmts[0] {
            Stmt::If { init, .. } => assert!(init.is_some()),
            other => panic!("expected if statement, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_for_range() {
        let src = "package main\n\nfunc f(items []string) {\n\tfor i, item := range items {\n\t\t_ = i\n\t\t_ = item\n\t}\n}\n";
        let file = parse(src);
        let decl = match &file.decls[0] {
            Decl::Func(decl) => decl,
            _ => panic!("expected func decl"),
        };
        match &decl.body.as_ref().unwrap().stmts[0] {
            Stmt::Range { key, value, .. } => {
                assert_eq!(key.as_deref(), Some("i"));
                assert_eq!(value.as_deref(), Some("item"));
            }
            other => panic!("expected range statement, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_composite_suppressed_in_if_header() {
        let src = "package main\n\nfunc f(x int) {\n\tif x == 1 {\n\t\tx = 2\n\t}\n}\n";
        let file = parse(src);
        assert_eq!(file.decls.len(), 1);
    }

    #[test]
    fn test_parse_map_and_slice_types() {
        let file = parse(
            "package t\n\ntype Index struct {\n\tByName map[string][]int `json:\"byName\"`\n\tFixed [4]string\n}\n",
        );
        let decl = match &file.decls[0] {
            Decl::Type(decl) => decl,
            _ => panic!("expected type decl"),
        };
        let fields = match &decl.ty {
            TypeExpr::Struct(fields) => fields,
            _ => panic!("expected struct"),
        };
        assert!(matches!(fields[0].ty, TypeExpr::Map { .. }));
        assert!(matches!(
            fields[1].ty,
            TypeExpr::Array { len: Some(4), .. }
        ));
    }

    #[test]
    fn test_parse_func_literal() {
        let src = "package main\n\nfunc f() {\n\tgo func() {\n\t\tdone()\n\t}()\n}\n";
        let file = parse(src);
        assert_eq!(file.decls.len(), 1);
    }

    #[test]
    fn test_parse_switch() {
        let src = "package main\n\nfunc f(x int) int {\n\tswitch x {\n\tcase 1:\n\t\treturn 10\n\tdefault:\n\t\treturn 0\n\t}\n}\n";
        let file = parse(src);
        let decl = match &file.decls[0] {
            Decl::Func(decl) => decl,
            _ => panic!("expected func decl"),
        };
        match &decl.body.as_ref().unwrap().stmts[0] {
            Stmt::Switch { cases, .. } => assert_eq!(cases.len(), 2),
            other => panic!("expected switch, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_reports_file_and_line() {
        let err = parse_source("package main\n\nfunc broken( {\n", Path::new("bad.go"))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bad.go"), "message was {}", msg);
    }
}
