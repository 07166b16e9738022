// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of ad, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

use std::{
    fmt::{self, Debug, Formatter},
    io::{self, Write},
    ops::Range,
};

use bstr::ByteSlice;
use memchr::{memchr, memrchr};
use thiserror::Error;

use crate::{expr::ExprError, types::TypeIdError};

/// A range of bytes within the source text of a format description.
///
/// Tokens and statements carry spans instead of line/column pairs, so that
/// positions stay cheap to copy while the source is being consumed. Lines and
/// columns are resolved against the source text only when a diagnostic is
/// rendered.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[inline(always)]
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// The smallest span covering both `self` and `other`.
    #[inline]
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    #[inline(always)]
    pub fn slice(self, bytes: &[u8]) -> &[u8] {
        &bytes[self.start.min(bytes.len())..self.end.min(bytes.len())]
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        !(self.start < self.end)
    }
}

impl From<Range<usize>> for Span {
    #[inline(always)]
    fn from(range: Range<usize>) -> Self {
        Span {
            start: range.start,
            end: range.end,
        }
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A 1-based line and column position resolved from a `Span`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

/// Resolves `pos` to a line and column within `src`. Columns count bytes, as
/// terminals do for the ASCII-dominated sources this language is written in.
pub fn line_col(src: &[u8], pos: usize) -> LineCol {
    let pos = pos.min(src.len());
    let line = 1 + src[..pos].iter().filter(|&&b| b == b'\n').count() as u32;
    let bol = memrchr(b'\n', &src[..pos]).map_or(0, |i| i + 1);
    LineCol {
        line,
        col: (pos - bol) as u32 + 1,
    }
}

/// Writes a `file:line:col: error: message` diagnostic followed by the
/// offending source line and a caret marking the span.
pub fn render_error<W: Write>(
    w: &mut W,
    file: &str,
    src: &[u8],
    span: Span,
    message: &dyn fmt::Display,
) -> io::Result<()> {
    let at = line_col(src, span.start);
    writeln!(w, "{file}:{}:{}: error: {message}", at.line, at.col)?;

    let bol = memrchr(b'\n', &src[..span.start.min(src.len())]).map_or(0, |i| i + 1);
    let eol = memchr(b'\n', &src[bol..]).map_or(src.len(), |i| bol + i);
    let line = &src[bol..eol];
    writeln!(w, "{}", line.as_bstr())?;

    let caret_start = span.start - bol;
    let caret_len = span.end.min(eol).saturating_sub(span.start).max(1);
    for _ in 0..caret_start {
        w.write_all(b" ")?;
    }
    w.write_all(b"^")?;
    for _ in 1..caret_len {
        w.write_all(b"~")?;
    }
    w.write_all(b"\n")
}

/// Damerau-Levenshtein edit distance: insertions, deletions, substitutions,
/// and transpositions of adjacent characters each cost 1.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());
    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    // Three rolling rows of the distance matrix.
    let mut prev2 = vec![0usize; n + 1];
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut cur = vec![0usize; n + 1];

    for i in 1..=m {
        cur[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            cur[j] = (prev[j] + 1).min(cur[j - 1] + 1).min(prev[j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                cur[j] = cur[j].min(prev2[j - 2] + 1);
            }
        }
        std::mem::swap(&mut prev2, &mut prev);
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[n]
}

/// The maximum edit distance at which a candidate is still worth suggesting.
const SUGGEST_DISTANCE: usize = 2;

/// Picks the candidate closest to `unknown`, if any lies within
/// `SUGGEST_DISTANCE`. Ties go to the earlier candidate.
pub fn suggest<'a, I>(unknown: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(usize, &str)> = None;
    for cand in candidates {
        let d = edit_distance(unknown, cand);
        if d <= SUGGEST_DISTANCE && best.map_or(true, |(bd, _)| d < bd) {
            best = Some((d, cand));
        }
    }
    best.map(|(_, cand)| cand)
}

/// Renders `; did you mean "..."?` for appending to a diagnostic.
pub fn suggestion_text(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!("; did you mean \"{s}\"?"),
        None => String::new(),
    }
}

/// A located lexical, parse, or semantic error in a format description.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{kind}")]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub span: Span,
}

impl SyntaxError {
    pub fn new(kind: SyntaxErrorKind, span: Span) -> Self {
        SyntaxError { kind, span }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SyntaxErrorKind {
    #[error("unterminated comment")]
    UnterminatedComment,
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated character literal")]
    UnterminatedChar,
    #[error("empty character literal")]
    EmptyChar,
    #[error("invalid escape sequence")]
    InvalidEscape,
    #[error("invalid digit in {0} literal")]
    InvalidDigit(&'static str),
    #[error("integer literal too large")]
    IntOverflow,
    #[error("invalid character")]
    InvalidChar,
    #[error("expected {expected}, got \"{got}\"")]
    Expected { expected: String, got: String },
    #[error("\"{0}\" is reserved")]
    Reserved(&'static str),
    #[error("\"break\" not within \"switch\"")]
    BreakOutsideSwitch,
    #[error("\"switch\" has no cases")]
    SwitchWithoutCases,
    #[error("duplicate \"case\" value makes the case unreachable")]
    DuplicateCase,
    #[error("duplicate \"default\"")]
    DuplicateDefault,
    #[error("unknown type \"{name}\"{}", suggestion_text(.suggestion))]
    UnknownType {
        name: String,
        suggestion: Option<String>,
    },
    #[error("unknown name \"{name}\"{}", suggestion_text(.suggestion))]
    UnknownName {
        name: String,
        suggestion: Option<String>,
    },
    #[error("only utf types take an array length")]
    BadArray,
    #[error("{0}")]
    BadType(#[from] TypeIdError),
    #[error("{0}")]
    BadExpr(ExprError),
}

/// A run-time failure while executing a compiled format against input.
#[derive(Debug, Error, PartialEq)]
pub enum RunError {
    #[error("{kind}")]
    Expr { kind: ExprError, span: Span },
    #[error("unexpected end of input reading \"{name}\" at offset {offset}")]
    UnexpectedEof { name: String, offset: u64 },
    #[error("string \"{name}\" at offset {offset} exceeds {max} bytes")]
    StringTooLong {
        name: String,
        offset: u64,
        max: usize,
    },
    #[error("\"{name}\" at offset {offset} is not valid {ty}")]
    BadEncoding {
        name: String,
        offset: u64,
        ty: String,
    },
}

impl RunError {
    /// The source span to point at, when the failure has one.
    pub fn span(&self) -> Option<Span> {
        match self {
            RunError::Expr { span, .. } => Some(*span),
            _ => None,
        }
    }
}

/// Any failure from parsing, checking, compiling, or running a format
/// description.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    Syntax(#[from] SyntaxError),
    #[error("{0}")]
    Run(#[from] RunError),
}

pub type FResult<T> = Result<T, FormatError>;

impl FormatError {
    /// Renders the error the way the command line reports it: located
    /// errors get `file:line:col` and a caret, the rest a bare message.
    pub fn render<W: Write>(&self, w: &mut W, file: &str, src: &[u8]) -> io::Result<()> {
        match self {
            FormatError::Syntax(e) => render_error(w, file, src, e.span, e),
            FormatError::Run(e) => match e.span() {
                Some(span) => render_error(w, file, src, span, e),
                None => writeln!(w, "{file}: error: {e}"),
            },
            FormatError::Io(e) => writeln!(w, "{file}: error: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_resolution() {
        let src = b"uint<8> tag;\nswitch (tag) {\n";
        assert_eq!(line_col(src, 0), LineCol { line: 1, col: 1 });
        assert_eq!(line_col(src, 8), LineCol { line: 1, col: 9 });
        assert_eq!(line_col(src, 13), LineCol { line: 2, col: 1 });
        assert_eq!(line_col(src, 21), LineCol { line: 2, col: 9 });
    }

    #[test]
    fn caret_marks_token_range() {
        let src = b"break;\n";
        let mut out = Vec::new();
        render_error(
            &mut out,
            "format",
            src,
            Span::new(0, 5),
            &"\"break\" not within \"switch\"",
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "format:1:1: error: \"break\" not within \"switch\"\nbreak;\n^~~~~\n",
        );
    }

    #[test]
    fn distance_counts_transposition_once() {
        assert_eq!(edit_distance("switch", "swithc"), 1);
        assert_eq!(edit_distance("uint", "unit"), 1);
        assert_eq!(edit_distance("float", "float"), 0);
        assert_eq!(edit_distance("int", ""), 3);
        assert_eq!(edit_distance("bool", "break"), 4);
    }

    #[test]
    fn suggest_within_two_edits() {
        let kws = ["bool", "break", "switch", "typedef", "uint"];
        assert_eq!(suggest("swich", kws), Some("switch"));
        assert_eq!(suggest("unit", kws), Some("uint"));
        assert_eq!(suggest("zzzzzz", kws), None);
    }
}
