// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of ad, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

use crate::{
    ast::{ArrayLen, Case, Decl, If, Stmt, TypedefStmt},
    diag::{suggest, Span, SyntaxError, SyntaxErrorKind},
    expr::{BinaryOp, Expr, UnaryOp, Value, ValueData},
    lexer,
    sname::ScopedName,
    symbol::{SymbolData, SymbolKind, SymbolTable},
    token::{Keyword, Token, TokenKind},
    types::{BaseKind, Endian, StructType, SwitchType, Type, TypeId, Typedefs},
};

/// The result of parsing a format description: the statement list, the
/// symbol table holding every declaration the parser saw, and the typedef
/// registry. The compiler takes ownership of all three; the table and the
/// registry become the interpreter's starting state.
#[derive(Debug)]
pub struct ParsedFormat {
    pub stmts: Vec<Stmt>,
    pub symtab: SymbolTable,
    pub typedefs: Typedefs,
}

pub fn parse(src: &[u8]) -> Result<ParsedFormat, SyntaxError> {
    Parser::new(src)?.program()
}

/// A recursive-descent parser with precedence-climbing expressions.
///
/// Declarations are recorded into the symbol table as they are parsed, at
/// the depth of the scope containing them; the name of the enclosing
/// aggregate is threaded down so members are recorded fully qualified.
struct Parser<'a> {
    src: &'a [u8],
    tokens: Vec<Token>,
    pos: usize,
    symtab: SymbolTable,
    typedefs: Typedefs,
    /// Enclosing aggregate names, outermost first.
    prefix: Vec<String>,
}

/// Built-in type names, for did-you-mean suggestions.
const BUILTIN_TYPES: [&str; 6] = ["bool", "int", "uint", "float", "utf8", "utf16"];

impl<'a> Parser<'a> {
    fn new(src: &'a [u8]) -> Result<Self, SyntaxError> {
        Ok(Parser {
            src,
            tokens: lexer::tokenize(src)?,
            pos: 0,
            symtab: SymbolTable::new(),
            typedefs: Typedefs::new(),
            prefix: Vec::new(),
        })
    }

    fn program(mut self) -> Result<ParsedFormat, SyntaxError> {
        let mut stmts = Vec::new();
        while self.peek().kind != TokenKind::Eof {
            stmts.push(self.statement()?);
        }
        Ok(ParsedFormat {
            stmts,
            symtab: self.symtab,
            typedefs: self.typedefs,
        })
    }

    // === Token plumbing ===

    #[inline(always)]
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    #[inline(always)]
    fn peek_at(&self, ahead: usize) -> &Token {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.advance();
            return true;
        }
        false
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool {
        self.eat(TokenKind::Keyword(kw))
    }

    fn at_kw(&self, kw: Keyword) -> bool {
        self.peek().kind == TokenKind::Keyword(kw)
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, SyntaxError> {
        if self.peek().kind == kind {
            return Ok(self.advance());
        }
        Err(self.expected(expected))
    }

    fn expected(&self, expected: &str) -> SyntaxError {
        let token = self.peek();
        let got = match token.kind {
            TokenKind::Ident => String::from_utf8_lossy(token.text(self.src)).into_owned(),
            ref kind => kind.describe().to_owned(),
        };
        SyntaxError::new(
            SyntaxErrorKind::Expected {
                expected: expected.to_owned(),
                got,
            },
            token.span,
        )
    }

    /// The text of an identifier token.
    fn text(&self, token: &Token) -> String {
        String::from_utf8_lossy(token.text(self.src)).into_owned()
    }

    /// Whether the current identifier token has exactly this text.
    fn ident_is(&self, ahead: usize, text: &str) -> bool {
        let token = self.peek_at(ahead);
        token.kind == TokenKind::Ident && token.text(self.src) == text.as_bytes()
    }

    // === Statements ===

    fn statement(&mut self) -> Result<Stmt, SyntaxError> {
        match self.peek().kind {
            TokenKind::Keyword(Keyword::Break) => {
                let span = self.advance().span;
                self.expect(TokenKind::Semi, "\";\"")?;
                Ok(Stmt::Break(span))
            }
            TokenKind::Keyword(Keyword::Typedef) => self.typedef_stmt(),
            TokenKind::Keyword(Keyword::If) => self.if_stmt(),
            TokenKind::Keyword(Keyword::Switch) => self.switch_stmt(),
            TokenKind::Keyword(Keyword::Struct) => self.struct_stmt(),
            TokenKind::LBrace => {
                let (stmts, span) = self.compound()?;
                Ok(Stmt::Compound(stmts, span))
            }
            TokenKind::Keyword(
                Keyword::Bool | Keyword::Int | Keyword::Uint | Keyword::Float,
            ) => self.declaration(),
            TokenKind::Ident => self.declaration(),
            TokenKind::Keyword(
                kw @ (Keyword::Alignas | Keyword::Enum | Keyword::Offsetof | Keyword::Sizeof),
            ) => Err(SyntaxError::new(
                SyntaxErrorKind::Reserved(kw.as_str()),
                self.peek().span,
            )),
            _ => Err(self.expected("statement")),
        }
    }

    fn compound(&mut self) -> Result<(Vec<Stmt>, Span), SyntaxError> {
        let open = self.expect(TokenKind::LBrace, "\"{\"")?;
        self.symtab.open_scope();
        let mut stmts = Vec::new();
        while self.peek().kind != TokenKind::RBrace {
            if self.peek().kind == TokenKind::Eof {
                return Err(self.expected("\"}\""));
            }
            stmts.push(self.statement()?);
        }
        let close = self.advance();
        self.symtab.close_scope();
        Ok((stmts, open.span.to(close.span)))
    }

    fn if_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let span = self.advance().span;
        self.expect(TokenKind::LParen, "\"(\"")?;
        let cond = self.expr()?;
        self.expect(TokenKind::RParen, "\")\"")?;
        let (then, _) = self.compound()?;
        let els = if self.eat_kw(Keyword::Else) {
            if self.at_kw(Keyword::If) {
                Some(vec![self.if_stmt()?])
            } else {
                Some(self.compound()?.0)
            }
        } else {
            None
        };
        Ok(Stmt::If(If {
            cond,
            then,
            els,
            span,
        }))
    }

    fn switch_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let span = self.advance().span;
        self.expect(TokenKind::LParen, "\"(\"")?;
        let expr = self.expr()?;
        self.expect(TokenKind::RParen, "\")\"")?;
        self.expect(TokenKind::LBrace, "\"{\"")?;
        self.symtab.open_scope();

        let mut cases = Vec::new();
        let mut default = None;
        loop {
            match self.peek().kind {
                TokenKind::Keyword(Keyword::Case) => {
                    let case_span = self.peek().span;
                    let mut values = Vec::new();
                    while self.at_kw(Keyword::Case) {
                        self.advance();
                        values.push(self.expr()?);
                        self.expect(TokenKind::Colon, "\":\"")?;
                    }
                    let body = self.case_body()?;
                    cases.push(Case {
                        values,
                        body,
                        span: case_span,
                    });
                }
                TokenKind::Keyword(Keyword::Default) => {
                    let token = self.advance();
                    if default.is_some() {
                        return Err(SyntaxError::new(
                            SyntaxErrorKind::DuplicateDefault,
                            token.span,
                        ));
                    }
                    self.expect(TokenKind::Colon, "\":\"")?;
                    default = Some(self.case_body()?);
                }
                TokenKind::RBrace => break,
                _ => return Err(self.expected("\"case\", \"default\", or \"}\"")),
            }
        }
        self.advance();
        self.symtab.close_scope();
        Ok(Stmt::Switch(
            SwitchType {
                expr,
                cases,
                default,
            },
            span,
        ))
    }

    /// Statements up to the next `case`, `default`, or the closing brace.
    fn case_body(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut stmts = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Keyword(Keyword::Case | Keyword::Default) | TokenKind::RBrace => {
                    return Ok(stmts);
                }
                TokenKind::Eof => return Err(self.expected("\"}\"")),
                _ => stmts.push(self.statement()?),
            }
        }
    }

    fn typedef_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let span = self.advance().span;
        let ty = self.type_()?;
        let name_token = self.expect(TokenKind::Ident, "type name")?;
        let name = self.text(&name_token);
        self.expect(TokenKind::Semi, "\";\"")?;

        self.typedefs.insert(ScopedName::new(&name), ty.clone());
        self.symtab.add(
            ScopedName::new(&name),
            SymbolKind::Type,
            SymbolData::Type(ty.clone()),
            name_token.span,
        );
        Ok(Stmt::Typedef(TypedefStmt {
            ty,
            name,
            span: span.to(name_token.span),
        }))
    }

    /// Either a struct type definition, a declaration of a struct-typed
    /// field, or both at once.
    fn struct_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.peek().span;
        let ty = self.type_()?;
        if self.peek().kind == TokenKind::Semi {
            // `struct name { ... };` defines the type and declares nothing.
            self.advance();
            let name = match &ty {
                Type::Struct(st) => st.name.clone().unwrap_or_default(),
                _ => String::new(),
            };
            if name.is_empty() {
                return Err(self.expected("struct name or field name"));
            }
            return Ok(Stmt::Typedef(TypedefStmt {
                ty,
                name,
                span: start,
            }));
        }
        self.declarator(ty, start)
    }

    fn declaration(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.peek().span;
        let ty = self.type_()?;
        self.declarator(ty, start)
    }

    /// The name and suffixes of a declaration, after its type.
    fn declarator(&mut self, mut ty: Type, start: Span) -> Result<Stmt, SyntaxError> {
        let name_token = self.expect(TokenKind::Ident, "field name")?;
        let name = self.text(&name_token);

        let mut array = None;
        if self.eat(TokenKind::LBracket) {
            if let TokenKind::Int(n) = self.peek().kind {
                self.advance();
                array = Some(ArrayLen::Fixed(n));
            } else {
                array = Some(ArrayLen::NulTerminated);
            }
            self.expect(TokenKind::RBracket, "\"]\"")?;
        }
        // A character type with an array suffix is a string type.
        if let (Type::Scalar(id), Some(len)) = (&ty, array) {
            if id.kind == BaseKind::Char {
                ty = Type::Scalar(TypeId::utf_str(
                    id.bits,
                    id.endian,
                    len == ArrayLen::NulTerminated,
                ));
            }
        }

        let init = if self.eat(TokenKind::Assign) {
            Some(self.expr()?)
        } else {
            None
        };
        let end = self.expect(TokenKind::Semi, "\";\"")?;

        let mut qualified = ScopedName::default();
        for part in &self.prefix {
            qualified.push(part.clone());
        }
        qualified.push(&name);
        self.symtab.add(
            qualified,
            SymbolKind::Decl,
            SymbolData::Decl {
                ty: ty.clone(),
                value: None,
            },
            name_token.span,
        );

        Ok(Stmt::Decl(Decl {
            ty,
            name,
            array,
            init,
            span: start.to(end.span),
        }))
    }

    // === Types ===

    fn type_(&mut self) -> Result<Type, SyntaxError> {
        match self.peek().kind {
            TokenKind::Keyword(Keyword::Bool) => {
                self.advance();
                let bits = self.opt_bits(8)?;
                let endian = self.opt_endian();
                Ok(Type::Scalar(TypeId {
                    kind: BaseKind::Bool,
                    bits,
                    signed: false,
                    endian,
                    nul_terminated: false,
                }))
            }
            TokenKind::Keyword(kw @ (Keyword::Int | Keyword::Uint)) => {
                self.advance();
                let bits = self.opt_bits(32)?;
                let endian = self.opt_endian();
                Ok(Type::Scalar(TypeId::int(bits, kw == Keyword::Int, endian)))
            }
            TokenKind::Keyword(Keyword::Float) => {
                self.advance();
                let bits = self.opt_bits(64)?;
                let endian = self.opt_endian();
                Ok(Type::Scalar(TypeId::float(bits, endian)))
            }
            TokenKind::Keyword(Keyword::Struct) => self.struct_type(),
            TokenKind::Ident => {
                let token = self.peek().clone();
                let text = self.text(&token);
                if let Some((unit_bits, endian)) = utf_base(&text) {
                    self.advance();
                    let endian = match endian {
                        Endian::Host => self.opt_endian(),
                        e => e,
                    };
                    return Ok(Type::Scalar(TypeId::utf_char(unit_bits, endian)));
                }
                // A typedef reference, possibly scoped.
                let name = self.scoped_name()?;
                match self.typedefs.get(&name) {
                    Some(ty) => Ok(ty.clone()),
                    None => {
                        let flat = name.to_string();
                        if name.len() == 1 {
                            if let Some(ty) = self.typedefs.get_flat(&flat) {
                                return Ok(ty.clone());
                            }
                        }
                        Err(self.unknown_type(flat, token.span))
                    }
                }
            }
            _ => Err(self.expected("type")),
        }
    }

    /// `struct name`, `struct name { members }`, or `struct { members }`.
    fn struct_type(&mut self) -> Result<Type, SyntaxError> {
        self.advance();
        let name = if self.peek().kind == TokenKind::Ident {
            let token = self.advance();
            Some((self.text(&token), token.span))
        } else {
            None
        };

        if self.peek().kind != TokenKind::LBrace {
            // A reference to an already defined struct.
            let Some((name, span)) = name else {
                return Err(self.expected("struct name or \"{\""));
            };
            return match self.typedefs.get(&ScopedName::new(&name)) {
                Some(ty @ Type::Struct(_)) => Ok(ty.clone()),
                _ => Err(self.unknown_type(name, span)),
            };
        }

        self.advance();
        self.symtab.open_scope();
        if let Some((name, _)) = &name {
            self.prefix.push(name.clone());
        }
        let mut members = Vec::new();
        while self.peek().kind != TokenKind::RBrace {
            if self.peek().kind == TokenKind::Eof {
                return Err(self.expected("\"}\""));
            }
            let stmt = match self.peek().kind {
                TokenKind::Keyword(Keyword::Struct) => self.struct_stmt()?,
                _ => self.declaration()?,
            };
            match stmt {
                Stmt::Decl(decl) => members.push(decl),
                // A nested type definition contributes no member.
                Stmt::Typedef(_) => {}
                _ => unreachable!("struct members are declarations"),
            }
        }
        self.advance();
        if name.is_some() {
            self.prefix.pop();
        }
        self.symtab.close_scope();

        let st = StructType {
            name: name.as_ref().map(|(n, _)| n.clone()),
            members,
        };
        let ty = Type::Struct(st);
        if let Some((name, span)) = name {
            self.typedefs.insert(ScopedName::new(&name), ty.clone());
            self.symtab.add(
                ScopedName::new(&name),
                SymbolKind::Type,
                SymbolData::Type(ty.clone()),
                span,
            );
        }
        Ok(ty)
    }

    /// `'<' bits '>'`, or the base type's default width.
    fn opt_bits(&mut self, default: u8) -> Result<u8, SyntaxError> {
        if !self.eat(TokenKind::Lt) {
            return Ok(default);
        }
        let token = self.peek().clone();
        let TokenKind::Int(bits) = token.kind else {
            return Err(self.expected("bit size"));
        };
        self.advance();
        self.expect(TokenKind::Gt, "\">\"")?;
        if bits == 0 || bits > 64 {
            return Err(SyntaxError::new(
                SyntaxErrorKind::BadType(crate::types::TypeIdError::BadBits(bits.min(255) as u8)),
                token.span,
            ));
        }
        Ok(bits as u8)
    }

    /// A trailing `be` or `le`.
    fn opt_endian(&mut self) -> Endian {
        if self.ident_is(0, "be") {
            self.advance();
            Endian::Big
        } else if self.ident_is(0, "le") {
            self.advance();
            Endian::Little
        } else {
            Endian::Host
        }
    }

    fn scoped_name(&mut self) -> Result<ScopedName, SyntaxError> {
        let token = self.expect(TokenKind::Ident, "name")?;
        let mut name = ScopedName::new(self.text(&token));
        while self.peek().kind == TokenKind::ColonColon
            && self.peek_at(1).kind == TokenKind::Ident
        {
            self.advance();
            let part = self.advance();
            name.push(self.text(&part));
        }
        Ok(name)
    }

    fn unknown_type(&self, name: String, span: Span) -> SyntaxError {
        let known: Vec<&str> = BUILTIN_TYPES
            .into_iter()
            .chain(["utf32"])
            .chain(self.typedefs.iter().map(|(n, _)| n.local_name()))
            .collect();
        let suggestion = suggest(&name, known).map(str::to_owned);
        SyntaxError::new(SyntaxErrorKind::UnknownType { name, suggestion }, span)
    }

    // === Expressions, by descending precedence ===

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        self.ternary()
    }

    fn ternary(&mut self) -> Result<Expr, SyntaxError> {
        let cond = self.binary(0)?;
        if !self.eat(TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.expr()?;
        self.expect(TokenKind::Colon, "\":\"")?;
        let other = self.ternary()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            other: Box::new(other),
        })
    }

    /// Precedence climbing over the binary operator table.
    fn binary(&mut self, min_level: u8) -> Result<Expr, SyntaxError> {
        let mut lhs = self.unary()?;
        loop {
            let Some((op, level)) = binary_op(&self.peek().kind) else {
                return Ok(lhs);
            };
            if level < min_level {
                return Ok(lhs);
            }
            self.advance();
            let rhs = self.binary(level + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Bang => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.unary()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        match self.peek().kind.clone() {
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr::value(Value::uint(v)))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expr::value(Value::float(v)))
            }
            TokenKind::Str(bytes) => {
                self.advance();
                Ok(Expr::value(Value {
                    ty: TypeId::utf_str(8, Endian::Host, false),
                    data: ValueData::Str(bytes),
                }))
            }
            TokenKind::Char(cp) => {
                self.advance();
                Ok(Expr::value(Value {
                    ty: TypeId::utf_char(8, Endian::Host),
                    data: ValueData::Char(cp),
                }))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::value(Value::bool_(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::value(Value::bool_(false)))
            }
            TokenKind::LParen => {
                self.advance();
                if self.at_type() {
                    // A C-style cast.
                    let span = self.peek().span;
                    let ty = self.type_()?;
                    self.expect(TokenKind::RParen, "\")\"")?;
                    let Type::Scalar(target) = ty else {
                        return Err(SyntaxError::new(
                            SyntaxErrorKind::Expected {
                                expected: "scalar type".to_owned(),
                                got: "aggregate type".to_owned(),
                            },
                            span,
                        ));
                    };
                    let expr = self.unary()?;
                    return Ok(Expr::Cast {
                        expr: Box::new(expr),
                        target,
                    });
                }
                let inner = self.expr()?;
                self.expect(TokenKind::RParen, "\")\"")?;
                Ok(inner)
            }
            TokenKind::Ident => {
                let name = self.scoped_name()?;
                Ok(Expr::Ident(name))
            }
            TokenKind::Keyword(kw @ (Keyword::Sizeof | Keyword::Offsetof | Keyword::Alignas)) => {
                Err(SyntaxError::new(
                    SyntaxErrorKind::Reserved(kw.as_str()),
                    self.peek().span,
                ))
            }
            _ => Err(self.expected("expression")),
        }
    }

    /// Whether the current token begins a type, for cast disambiguation.
    fn at_type(&self) -> bool {
        match self.peek().kind {
            TokenKind::Keyword(
                Keyword::Bool | Keyword::Int | Keyword::Uint | Keyword::Float | Keyword::Struct,
            ) => true,
            TokenKind::Ident => {
                let text = self.peek().text(self.src);
                let text = String::from_utf8_lossy(text);
                utf_base(&text).is_some() || self.typedefs.get_flat(&text).is_some()
            }
            _ => false,
        }
    }
}

/// The binary operator and precedence level of a token, if it is one.
/// Higher binds tighter.
fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
    Some(match kind {
        TokenKind::OrOr => (BinaryOp::Or, 0),
        TokenKind::CaretCaret => (BinaryOp::Xor, 1),
        TokenKind::AndAnd => (BinaryOp::And, 2),
        TokenKind::Pipe => (BinaryOp::BitOr, 3),
        TokenKind::Caret => (BinaryOp::BitXor, 4),
        TokenKind::Amp => (BinaryOp::BitAnd, 5),
        TokenKind::Eq => (BinaryOp::Eq, 6),
        TokenKind::Ne => (BinaryOp::Ne, 6),
        TokenKind::Lt => (BinaryOp::Lt, 7),
        TokenKind::Le => (BinaryOp::Le, 7),
        TokenKind::Gt => (BinaryOp::Gt, 7),
        TokenKind::Ge => (BinaryOp::Ge, 7),
        TokenKind::Shl => (BinaryOp::Shl, 8),
        TokenKind::Shr => (BinaryOp::Shr, 8),
        TokenKind::Plus => (BinaryOp::Add, 9),
        TokenKind::Minus => (BinaryOp::Sub, 9),
        TokenKind::Star => (BinaryOp::Mul, 10),
        TokenKind::Slash => (BinaryOp::Div, 10),
        TokenKind::Percent => (BinaryOp::Mod, 10),
        _ => return None,
    })
}

/// UTF base type names, with any baked-in byte order.
fn utf_base(text: &str) -> Option<(u8, Endian)> {
    Some(match text {
        "utf8" => (8, Endian::Host),
        "utf16" => (16, Endian::Host),
        "utf16le" => (16, Endian::Little),
        "utf16be" => (16, Endian::Big),
        "utf32" => (32, Endian::Host),
        "utf32le" => (32, Endian::Little),
        "utf32be" => (32, Endian::Big),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &[u8]) -> ParsedFormat {
        match parse(src) {
            Ok(parsed) => parsed,
            Err(e) => panic!("parse failed at {:?}: {e}", e.span),
        }
    }

    #[test]
    fn declaration_with_bits_and_endian() {
        let parsed = parse_ok(b"uint<16>be magic;");
        let [Stmt::Decl(decl)] = &parsed.stmts[..] else {
            panic!("not one declaration: {:?}", parsed.stmts);
        };
        assert_eq!(decl.name, "magic");
        assert_eq!(
            decl.ty,
            Type::Scalar(TypeId::int(16, false, Endian::Big)),
        );
        assert!(parsed.symtab.find(&ScopedName::new("magic")).is_some());
    }

    #[test]
    fn switch_with_merged_case_labels() {
        let parsed = parse_ok(
            b"uint<8> tag;\n\
              switch (tag) {\n\
              case 1: case 2: uint<16>be v; break;\n\
              default: uint<32>le v;\n\
              }\n",
        );
        let Stmt::Switch(sw, _) = &parsed.stmts[1] else {
            panic!("not a switch: {:?}", parsed.stmts[1]);
        };
        assert_eq!(sw.cases.len(), 1);
        assert_eq!(sw.cases[0].values.len(), 2);
        assert_eq!(sw.cases[0].body.len(), 2);
        assert!(sw.default.is_some());
        assert_eq!(sw.expr, Expr::Ident(ScopedName::new("tag")));
    }

    #[test]
    fn string_declarations() {
        let parsed = parse_ok(b"utf8 name[8]; utf16be title[];");
        let Stmt::Decl(name) = &parsed.stmts[0] else {
            panic!();
        };
        assert_eq!(name.ty, Type::Scalar(TypeId::utf_str(8, Endian::Host, false)));
        assert_eq!(name.array, Some(ArrayLen::Fixed(8)));

        let Stmt::Decl(title) = &parsed.stmts[1] else {
            panic!();
        };
        assert_eq!(
            title.ty,
            Type::Scalar(TypeId::utf_str(16, Endian::Big, true)),
        );
        assert_eq!(title.array, Some(ArrayLen::NulTerminated));
    }

    #[test]
    fn typedef_then_use() {
        let parsed = parse_ok(b"typedef uint<16>le word; word checksum;");
        let Stmt::Decl(decl) = &parsed.stmts[1] else {
            panic!();
        };
        assert_eq!(
            decl.ty,
            Type::Scalar(TypeId::int(16, false, Endian::Little)),
        );
        assert!(parsed
            .typedefs
            .get(&ScopedName::new("word"))
            .is_some());
    }

    #[test]
    fn struct_definition_and_field() {
        let parsed = parse_ok(
            b"struct header {\n\
                uint<32>be magic;\n\
                uint<8> version;\n\
              };\n\
              header hdr;",
        );
        let Stmt::Typedef(def) = &parsed.stmts[0] else {
            panic!("expected type definition: {:?}", parsed.stmts[0]);
        };
        let Type::Struct(st) = &def.ty else { panic!() };
        assert_eq!(st.members.len(), 2);
        assert_eq!(st.members[0].name, "magic");

        let Stmt::Decl(decl) = &parsed.stmts[1] else {
            panic!();
        };
        assert_eq!(decl.name, "hdr");
        assert!(matches!(decl.ty, Type::Struct(_)));
    }

    #[test]
    fn struct_definition_with_trailing_semi() {
        let parsed = parse_ok(b"struct point { int<32> x; int<32> y; };");
        assert!(matches!(&parsed.stmts[0], Stmt::Typedef(t) if t.name == "point"));
    }

    #[test]
    fn expression_precedence() {
        let parsed = parse_ok(b"uint<8> a; if (a + 1 * 2 == 3) { uint<8> b; }");
        let Stmt::If(i) = &parsed.stmts[1] else { panic!() };
        // a + (1 * 2), compared to 3.
        let Expr::Binary { op: BinaryOp::Eq, lhs, .. } = &i.cond else {
            panic!("not ==: {:?}", i.cond);
        };
        let Expr::Binary { op: BinaryOp::Add, rhs, .. } = &**lhs else {
            panic!("not +: {lhs:?}");
        };
        assert!(matches!(&**rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn cast_expression() {
        let parsed = parse_ok(b"uint<32> len; if ((uint<8>) len == 0) { }");
        let Stmt::If(i) = &parsed.stmts[1] else { panic!() };
        let Expr::Binary { lhs, .. } = &i.cond else { panic!() };
        assert!(matches!(
            &**lhs,
            Expr::Cast { target, .. } if *target == TypeId::uint8(),
        ));
    }

    #[test]
    fn unknown_type_suggests() {
        let err = parse(b"unit<8> x;").unwrap_err();
        let SyntaxErrorKind::UnknownType { name, suggestion } = err.kind else {
            panic!("wrong error: {err}");
        };
        assert_eq!(name, "unit");
        assert_eq!(suggestion.as_deref(), Some("uint"));
    }

    #[test]
    fn reserved_keyword_rejected() {
        let err = parse(b"enum color;").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::Reserved("enum"));
    }

    #[test]
    fn members_are_recorded_qualified() {
        let parsed = parse_ok(b"struct hdr { uint<8> tag; } h;");
        // The member was recorded under its aggregate while the struct scope
        // was open, and the scope has since closed.
        assert!(parsed.symtab.find(&ScopedName::new("h")).is_some());
        assert!(parsed.symtab.find(&ScopedName::from("hdr::tag")).is_none());
    }

    #[test]
    fn duplicate_default_rejected() {
        let err = parse(
            b"uint<8> t; switch (t) { default: break; default: break; }",
        )
        .unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::DuplicateDefault);
    }
}
