// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of ad, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

use crate::{
    diag::{Span, SyntaxError, SyntaxErrorKind},
    token::{Keyword, Token, TokenKind},
    utf,
};

/// Tokenizes a whole format description. The parser indexes freely into the
/// resulting list, so lexing is not interleaved with parsing.
pub fn tokenize(src: &[u8]) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer { src, pos: 0 };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    #[inline(always)]
    fn peek(&self) -> u8 {
        self.src.get(self.pos).copied().unwrap_or(0)
    }

    #[inline(always)]
    fn peek_at(&self, ahead: usize) -> u8 {
        self.src.get(self.pos + ahead).copied().unwrap_or(0)
    }

    fn error(&self, kind: SyntaxErrorKind, start: usize) -> SyntaxError {
        SyntaxError::new(kind, Span::new(start, self.pos.max(start + 1)))
    }

    /// Skips whitespace and `//`/`/* */` comments.
    fn skip_trivia(&mut self) -> Result<(), SyntaxError> {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b'/' if self.peek_at(1) == b'/' => {
                    while self.pos < self.src.len() && self.peek() != b'\n' {
                        self.pos += 1;
                    }
                }
                b'/' if self.peek_at(1) == b'*' => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        if self.pos >= self.src.len() {
                            return Err(self.error(SyntaxErrorKind::UnterminatedComment, start));
                        }
                        if self.peek() == b'*' && self.peek_at(1) == b'/' {
                            self.pos += 2;
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, SyntaxError> {
        self.skip_trivia()?;
        let start = self.pos;
        if start >= self.src.len() {
            return Ok(Token::new(TokenKind::Eof, Span::new(start, start)));
        }

        let b = self.peek();
        let kind = match b {
            b'0'..=b'9' => return self.number(),
            b'"' => return self.string(),
            b'\'' => return self.char_literal(),
            _ if b.is_ascii_alphabetic() || b == b'_' => return Ok(self.ident()),

            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b';' => TokenKind::Semi,
            b',' => TokenKind::Comma,
            b'?' => TokenKind::Question,
            b'~' => TokenKind::Tilde,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,

            b'=' if self.peek_at(1) == b'=' => self.two(TokenKind::Eq),
            b'=' => TokenKind::Assign,
            b'!' if self.peek_at(1) == b'=' => self.two(TokenKind::Ne),
            b'!' => TokenKind::Bang,
            b'<' if self.peek_at(1) == b'=' => self.two(TokenKind::Le),
            b'<' if self.peek_at(1) == b'<' => self.two(TokenKind::Shl),
            b'<' => TokenKind::Lt,
            b'>' if self.peek_at(1) == b'=' => self.two(TokenKind::Ge),
            b'>' if self.peek_at(1) == b'>' => self.two(TokenKind::Shr),
            b'>' => TokenKind::Gt,
            b'&' if self.peek_at(1) == b'&' => self.two(TokenKind::AndAnd),
            b'&' => TokenKind::Amp,
            b'|' if self.peek_at(1) == b'|' => self.two(TokenKind::OrOr),
            b'|' => TokenKind::Pipe,
            b'^' if self.peek_at(1) == b'^' => self.two(TokenKind::CaretCaret),
            b'^' => TokenKind::Caret,
            b':' if self.peek_at(1) == b':' => self.two(TokenKind::ColonColon),
            b':' => TokenKind::Colon,

            _ => {
                self.pos += 1;
                return Err(self.error(SyntaxErrorKind::InvalidChar, start));
            }
        };
        self.pos += 1;
        Ok(Token::new(kind, Span::new(start, self.pos)))
    }

    /// Claims the second byte of a two-byte operator.
    #[inline(always)]
    fn two(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn ident(&mut self) -> Token {
        let start = self.pos;
        while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
            self.pos += 1;
        }
        let text = &self.src[start..self.pos];
        let kind = match Keyword::from_ident(text) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident,
        };
        Token::new(kind, Span::new(start, self.pos))
    }

    /// Decimal, hexadecimal (`0x`), and octal (leading `0`) integers, and
    /// decimal floats with an optional exponent.
    fn number(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos;
        if self.peek() == b'0' && matches!(self.peek_at(1), b'x' | b'X') {
            self.pos += 2;
            let digits = self.pos;
            let mut value = 0u64;
            while self.peek().is_ascii_hexdigit() {
                value = value
                    .checked_mul(16)
                    .and_then(|v| v.checked_add((self.peek() as char).to_digit(16).unwrap() as u64))
                    .ok_or_else(|| self.error(SyntaxErrorKind::IntOverflow, start))?;
                self.pos += 1;
            }
            if self.pos == digits || self.peek().is_ascii_alphanumeric() {
                self.pos += 1;
                return Err(self.error(SyntaxErrorKind::InvalidDigit("hexadecimal"), start));
            }
            return Ok(Token::new(TokenKind::Int(value), Span::new(start, self.pos)));
        }

        while self.peek().is_ascii_digit() {
            self.pos += 1;
        }
        let is_float = self.peek() == b'.' && self.peek_at(1).is_ascii_digit()
            || matches!(self.peek(), b'e' | b'E')
                && (self.peek_at(1).is_ascii_digit()
                    || matches!(self.peek_at(1), b'+' | b'-') && self.peek_at(2).is_ascii_digit());
        if is_float {
            if self.peek() == b'.' {
                self.pos += 1;
                while self.peek().is_ascii_digit() {
                    self.pos += 1;
                }
            }
            if matches!(self.peek(), b'e' | b'E') {
                self.pos += 1;
                if matches!(self.peek(), b'+' | b'-') {
                    self.pos += 1;
                }
                while self.peek().is_ascii_digit() {
                    self.pos += 1;
                }
            }
            let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
            let value: f64 = text
                .parse()
                .map_err(|_| self.error(SyntaxErrorKind::InvalidDigit("float"), start))?;
            return Ok(Token::new(
                TokenKind::Float(value),
                Span::new(start, self.pos),
            ));
        }

        let text = &self.src[start..self.pos];
        let (digits, radix, what): (&[u8], u64, _) = if text.len() > 1 && text[0] == b'0' {
            (&text[1..], 8, "octal")
        } else {
            (text, 10, "decimal")
        };
        let mut value = 0u64;
        for &d in digits {
            let d = (d as char).to_digit(radix as u32);
            let d = match d {
                Some(d) => d as u64,
                None => return Err(self.error(SyntaxErrorKind::InvalidDigit(what), start)),
            };
            value = value
                .checked_mul(radix)
                .and_then(|v| v.checked_add(d))
                .ok_or_else(|| self.error(SyntaxErrorKind::IntOverflow, start))?;
        }
        if self.peek().is_ascii_alphanumeric() {
            self.pos += 1;
            return Err(self.error(SyntaxErrorKind::InvalidDigit(what), start));
        }
        Ok(Token::new(TokenKind::Int(value), Span::new(start, self.pos)))
    }

    fn string(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos;
        self.pos += 1;
        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                0 if self.pos >= self.src.len() => {
                    return Err(self.error(SyntaxErrorKind::UnterminatedString, start));
                }
                b'"' => {
                    self.pos += 1;
                    return Ok(Token::new(TokenKind::Str(bytes), Span::new(start, self.pos)));
                }
                b'\n' => return Err(self.error(SyntaxErrorKind::UnterminatedString, start)),
                b'\\' => {
                    let b = self.escape(start)?;
                    bytes.push(b);
                }
                b => {
                    bytes.push(b);
                    self.pos += 1;
                }
            }
        }
    }

    fn char_literal(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos;
        self.pos += 1;
        let cp = match self.peek() {
            0 if self.pos >= self.src.len() => {
                return Err(self.error(SyntaxErrorKind::UnterminatedChar, start));
            }
            b'\'' => return Err(self.error(SyntaxErrorKind::EmptyChar, start)),
            b'\\' => self.escape(start)? as u32,
            b if b < 0x80 => {
                self.pos += 1;
                b as u32
            }
            _ => {
                // A multi-byte UTF-8 character in the source.
                let (cp, len) = utf::decode_utf8(&self.src[self.pos..])
                    .ok_or_else(|| self.error(SyntaxErrorKind::InvalidChar, self.pos))?;
                self.pos += len;
                cp
            }
        };
        if self.peek() != b'\'' {
            return Err(self.error(SyntaxErrorKind::UnterminatedChar, start));
        }
        self.pos += 1;
        Ok(Token::new(TokenKind::Char(cp), Span::new(start, self.pos)))
    }

    /// Translates a C escape sequence; `self.pos` is at the backslash.
    fn escape(&mut self, literal_start: usize) -> Result<u8, SyntaxError> {
        self.pos += 1;
        let b = match self.peek() {
            b'0' => 0,
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0C,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0B,
            b'\\' => b'\\',
            b'\'' => b'\'',
            b'"' => b'"',
            b'x' => {
                self.pos += 1;
                let hi = (self.peek() as char).to_digit(16);
                self.pos += 1;
                let lo = (self.peek() as char).to_digit(16);
                let (Some(hi), Some(lo)) = (hi, lo) else {
                    return Err(self.error(SyntaxErrorKind::InvalidEscape, literal_start));
                };
                self.pos += 1;
                return Ok((hi * 16 + lo) as u8);
            }
            _ => return Err(self.error(SyntaxErrorKind::InvalidEscape, literal_start)),
        };
        self.pos += 1;
        Ok(b)
    }
}
