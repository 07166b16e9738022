// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of ad, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

use crate::{
    diag::Span,
    expr::Expr,
    types::{SwitchType, Type},
};

/// How much of the input a string declaration covers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArrayLen {
    /// `name[N]`: exactly N code units.
    Fixed(u64),
    /// `name[]`: code units up to and including a zero unit.
    NulTerminated,
}

/// A field declaration: `type name;`, optionally with an array suffix for
/// strings or an `=` initializer for a computed field that consumes no
/// input.
#[derive(Clone, Debug, PartialEq)]
pub struct Decl {
    pub ty: Type,
    pub name: String,
    pub array: Option<ArrayLen>,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct If {
    pub cond: Expr,
    pub then: Vec<Stmt>,
    pub els: Option<Vec<Stmt>>,
    pub span: Span,
}

/// One `case` arm. Consecutive labels that share a body are merged into a
/// single arm with several values.
#[derive(Clone, Debug, PartialEq)]
pub struct Case {
    pub values: Vec<Expr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypedefStmt {
    pub ty: Type,
    pub name: String,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Decl(Decl),
    If(If),
    /// The statement form carries the switch type descriptor directly.
    Switch(SwitchType, Span),
    Break(Span),
    Typedef(TypedefStmt),
    Compound(Vec<Stmt>, Span),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Decl(d) => d.span,
            Stmt::If(i) => i.span,
            Stmt::Switch(_, span) => *span,
            Stmt::Break(span) => *span,
            Stmt::Typedef(t) => t.span,
            Stmt::Compound(_, span) => *span,
        }
    }
}
