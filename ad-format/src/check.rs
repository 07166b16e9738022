// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of ad, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

use crate::{
    ast::{Decl, Stmt},
    diag::{suggest, Span, SyntaxError, SyntaxErrorKind},
    expr::{encode_units, EmptyScope, Expr, Value, ValueData},
    parser::ParsedFormat,
    sname::ScopedName,
    symbol::{SymbolData, SymbolKind, SymbolTable},
    types::{BaseKind, SwitchType, Type, Typedefs},
};

/// Validates a parsed format before compilation: statement placement, type
/// descriptor invariants, and a dry run of every expression against
/// stand-in values of the declared types.
pub fn check(parsed: &ParsedFormat) -> Result<(), SyntaxError> {
    let mut checker = Checker {
        typedefs: &parsed.typedefs,
        table: SymbolTable::new(),
    };
    checker.block(&parsed.stmts, false)
}

struct Checker<'a> {
    typedefs: &'a Typedefs,
    /// A live table built during the walk, with stand-in values bound, so
    /// expressions can be dry-evaluated with scoping intact. The table in
    /// `ParsedFormat` cannot serve here: its nested scopes have already
    /// closed, and pre-seeding from its top-level records would hide
    /// use-before-declaration errors.
    table: SymbolTable,
}

impl Checker<'_> {
    fn block(&mut self, stmts: &[Stmt], in_switch: bool) -> Result<(), SyntaxError> {
        for stmt in stmts {
            self.stmt(stmt, in_switch)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt, in_switch: bool) -> Result<(), SyntaxError> {
        match stmt {
            Stmt::Break(span) => {
                if !in_switch {
                    return Err(SyntaxError::new(SyntaxErrorKind::BreakOutsideSwitch, *span));
                }
                Ok(())
            }
            Stmt::Decl(decl) => self.decl(decl, None),
            Stmt::Typedef(def) => self.check_type(&def.ty, def.span),
            Stmt::If(i) => {
                self.check_expr(&i.cond, i.span)?;
                self.table.open_scope();
                self.block(&i.then, in_switch)?;
                self.table.close_scope();
                if let Some(els) = &i.els {
                    self.table.open_scope();
                    self.block(els, in_switch)?;
                    self.table.close_scope();
                }
                Ok(())
            }
            Stmt::Compound(stmts, _) => {
                self.table.open_scope();
                self.block(stmts, in_switch)?;
                self.table.close_scope();
                Ok(())
            }
            Stmt::Switch(sw, span) => self.switch(sw, *span),
        }
    }

    fn switch(&mut self, sw: &SwitchType, span: Span) -> Result<(), SyntaxError> {
        if sw.cases.is_empty() {
            return Err(SyntaxError::new(SyntaxErrorKind::SwitchWithoutCases, span));
        }
        self.check_expr(&sw.expr, span)?;

        // Constant case values must be pairwise distinct; a repeat can never
        // be reached.
        let mut seen: Vec<Value> = Vec::new();
        for case in &sw.cases {
            for value in &case.values {
                self.check_expr(value, case.span)?;
                let Ok(v) = value.eval_value(&EmptyScope) else {
                    continue;
                };
                for prior in &seen {
                    let eq = Expr::Binary {
                        op: crate::expr::BinaryOp::Eq,
                        lhs: Box::new(Expr::value(prior.clone())),
                        rhs: Box::new(Expr::value(v.clone())),
                    };
                    if eq.eval_value(&EmptyScope).is_ok_and(|r| r.is_truthy()) {
                        return Err(SyntaxError::new(SyntaxErrorKind::DuplicateCase, case.span));
                    }
                }
                seen.push(v);
            }
        }

        for case in &sw.cases {
            self.table.open_scope();
            self.block(&case.body, true)?;
            self.table.close_scope();
        }
        if let Some(default) = &sw.default {
            self.table.open_scope();
            self.block(default, true)?;
            self.table.close_scope();
        }
        Ok(())
    }

    fn decl(&mut self, decl: &Decl, prefix: Option<&ScopedName>) -> Result<(), SyntaxError> {
        self.check_type(&decl.ty, decl.span)?;

        let id = decl.ty.id();
        if decl.array.is_some() && id.kind != BaseKind::Str {
            return Err(SyntaxError::new(SyntaxErrorKind::BadArray, decl.span));
        }
        if let Some(init) = &decl.init {
            self.check_expr(init, decl.span)?;
        }

        let name = match prefix {
            Some(prefix) => prefix.join(&decl.name),
            None => ScopedName::new(&decl.name),
        };
        if let Type::Struct(st) = &decl.ty {
            for member in &st.members {
                self.decl(member, Some(&name))?;
            }
        }
        self.bind_standin(name, &decl.ty, decl.span);
        Ok(())
    }

    fn check_type(&mut self, ty: &Type, span: Span) -> Result<(), SyntaxError> {
        match ty {
            Type::Scalar(id) => id
                .validate()
                .map_err(|e| SyntaxError::new(SyntaxErrorKind::BadType(e), span)),
            Type::Struct(st) => {
                for member in &st.members {
                    self.check_type(&member.ty, member.span)?;
                }
                Ok(())
            }
            Type::Switch(sw) => self.switch(sw, span),
        }
    }

    /// Dry-evaluates an expression against stand-in values: every reachable
    /// name must resolve and the operand kinds must combine.
    fn check_expr(&mut self, expr: &Expr, span: Span) -> Result<(), SyntaxError> {
        self.resolve_idents(expr, span)?;
        match expr.eval(&self.table) {
            Expr::Error(e) => Err(SyntaxError::new(SyntaxErrorKind::BadExpr(e), span)),
            _ => Ok(()),
        }
    }

    fn resolve_idents(&self, expr: &Expr, span: Span) -> Result<(), SyntaxError> {
        match expr {
            Expr::Ident(name) => {
                let known = self.table.find(name).is_some()
                    || name.len() == 1 && self.table.find_by_local_name(name.local_name()).is_some();
                if known {
                    return Ok(());
                }
                let locals: Vec<&str> = self
                    .table
                    .names()
                    .map(|n| n.local_name())
                    .chain(self.typedefs.names().map(|n| n.local_name()))
                    .collect();
                let flat = name.to_string();
                let suggestion = suggest(&flat, locals).map(str::to_owned);
                Err(SyntaxError::new(
                    SyntaxErrorKind::UnknownName {
                        name: flat,
                        suggestion,
                    },
                    span,
                ))
            }
            Expr::Unary { expr, .. } | Expr::Cast { expr, .. } => {
                self.resolve_idents(expr, span)
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.resolve_idents(lhs, span)?;
                self.resolve_idents(rhs, span)
            }
            Expr::Ternary { cond, then, other } => {
                self.resolve_idents(cond, span)?;
                self.resolve_idents(then, span)?;
                self.resolve_idents(other, span)
            }
            _ => Ok(()),
        }
    }

    /// Binds a stand-in value of the declared type, so later expressions
    /// referencing the field type-check.
    fn bind_standin(&mut self, name: ScopedName, ty: &Type, span: Span) {
        let value = standin_value(ty);
        let info = self.table.add(
            name,
            SymbolKind::Decl,
            SymbolData::Decl {
                ty: ty.clone(),
                value: None,
            },
            span,
        );
        info.data = SymbolData::Decl {
            ty: ty.clone(),
            value,
        };
    }
}

/// A representative value of a type for dry runs. Numerics are 1 rather
/// than 0 so a divisor standing in for runtime data does not trip the
/// zero-divide check.
fn standin_value(ty: &Type) -> Option<Value> {
    let Type::Scalar(id) = ty else {
        return None;
    };
    let data = match id.kind {
        BaseKind::Bool => ValueData::Bool(true),
        BaseKind::Int => ValueData::Int(1),
        BaseKind::Float => ValueData::Float(1.0),
        BaseKind::Char => ValueData::Char('A' as u32),
        BaseKind::Str => ValueData::Str(encode_units(&['A' as u32], *id)?),
        _ => return None,
    };
    Some(Value { ty: *id, data })
}
