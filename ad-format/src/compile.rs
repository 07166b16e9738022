// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of ad, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

use crate::{
    ast::{Decl, Stmt, TypedefStmt},
    diag::{Span, SyntaxError, SyntaxErrorKind},
    expr::Expr,
    parser::ParsedFormat,
    symbol::SymbolTable,
    types::Typedefs,
};

/// A statement of the flat, jump-threaded program the interpreter walks.
/// Targets are absolute indexes into the program.
#[derive(Clone, Debug, PartialEq)]
pub enum CStmt {
    Decl(Decl),
    Typedef(TypedefStmt),
    /// `if`: falls through on a true condition, jumps to `else_target`
    /// otherwise.
    Branch {
        cond: Expr,
        else_target: usize,
        span: Span,
    },
    /// An unconditional jump: a compiled `break`, or the hop over an `else`
    /// block.
    Jump { target: usize, span: Span },
    Switch(CSwitch),
}

/// A compiled `switch` header. Case bodies follow the header in source
/// order, so an arm that does not `break` falls through to the next.
#[derive(Clone, Debug, PartialEq)]
pub struct CSwitch {
    pub expr: Expr,
    pub cases: Vec<CaseArm>,
    pub default_target: Option<usize>,
    /// One past the last statement belonging to the switch.
    pub end: usize,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CaseArm {
    pub values: Vec<Expr>,
    pub target: usize,
}

#[derive(Clone, Debug, Default)]
pub struct Program {
    pub stmts: Vec<CStmt>,
    /// The symbol table the parser recorded declarations into; the
    /// interpreter binds run-time values onto these records.
    pub symtab: SymbolTable,
    pub typedefs: Typedefs,
}

/// Lowers the statement tree to a flat program, taking ownership of the
/// parse results; the symbol table and typedef registry ride along to the
/// interpreter. `break` placement is re-checked here even though the
/// checker already rejected strays.
pub fn compile(parsed: ParsedFormat) -> Result<Program, SyntaxError> {
    let mut compiler = Compiler { out: Vec::new() };
    let mut ctx = CompileCtx {
        in_switch: false,
        break_list: Vec::new(),
    };
    compiler.block(&parsed.stmts, &mut ctx)?;
    debug_assert!(ctx.break_list.is_empty(), "unpatched break");
    Ok(Program {
        stmts: compiler.out,
        symtab: parsed.symtab,
        typedefs: parsed.typedefs,
    })
}

/// Per-switch compilation state. Each `switch` opens a fresh context, so
/// nested switches stack; everything else threads the current one through.
struct CompileCtx {
    in_switch: bool,
    /// Indexes of `Jump` statements compiled from `break`, patched to one
    /// past the switch on exit.
    break_list: Vec<usize>,
}

struct Compiler {
    out: Vec<CStmt>,
}

impl Compiler {
    fn block(&mut self, stmts: &[Stmt], ctx: &mut CompileCtx) -> Result<(), SyntaxError> {
        for stmt in stmts {
            self.stmt(stmt, ctx)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt, ctx: &mut CompileCtx) -> Result<(), SyntaxError> {
        match stmt {
            Stmt::Decl(decl) => self.out.push(CStmt::Decl(decl.clone())),
            Stmt::Typedef(def) => self.out.push(CStmt::Typedef(def.clone())),
            Stmt::Compound(stmts, _) => self.block(stmts, ctx)?,
            Stmt::Break(span) => {
                if !ctx.in_switch {
                    return Err(SyntaxError::new(SyntaxErrorKind::BreakOutsideSwitch, *span));
                }
                ctx.break_list.push(self.out.len());
                self.out.push(CStmt::Jump {
                    target: usize::MAX,
                    span: *span,
                });
            }
            Stmt::If(i) => {
                let branch = self.out.len();
                self.out.push(CStmt::Branch {
                    cond: i.cond.clone(),
                    else_target: usize::MAX,
                    span: i.span,
                });
                self.block(&i.then, ctx)?;
                match &i.els {
                    Some(els) => {
                        let hop = self.out.len();
                        self.out.push(CStmt::Jump {
                            target: usize::MAX,
                            span: i.span,
                        });
                        self.patch_branch(branch, self.out.len());
                        self.block(els, ctx)?;
                        self.patch_jump(hop, self.out.len());
                    }
                    None => self.patch_branch(branch, self.out.len()),
                }
            }
            Stmt::Switch(sw, span) => {
                let mut inner = CompileCtx {
                    in_switch: true,
                    break_list: Vec::new(),
                };
                let header = self.out.len();
                self.out.push(CStmt::Switch(CSwitch {
                    expr: sw.expr.clone(),
                    cases: Vec::new(),
                    default_target: None,
                    end: usize::MAX,
                    span: *span,
                }));

                let mut arms = Vec::new();
                for case in &sw.cases {
                    let target = self.out.len();
                    self.block(&case.body, &mut inner)?;
                    arms.push(CaseArm {
                        values: case.values.clone(),
                        target,
                    });
                }
                let default_target = match &sw.default {
                    Some(body) => {
                        let target = self.out.len();
                        self.block(body, &mut inner)?;
                        Some(target)
                    }
                    None => None,
                };

                let end = self.out.len();
                let CStmt::Switch(header) = &mut self.out[header] else {
                    unreachable!("switch header moved");
                };
                header.cases = arms;
                header.default_target = default_target;
                header.end = end;
                for idx in inner.break_list {
                    self.patch_jump(idx, end);
                }
            }
        }
        Ok(())
    }

    fn patch_jump(&mut self, idx: usize, target: usize) {
        let CStmt::Jump { target: t, .. } = &mut self.out[idx] else {
            unreachable!("not a jump at {idx}");
        };
        *t = target;
    }

    fn patch_branch(&mut self, idx: usize, target: usize) {
        let CStmt::Branch { else_target, .. } = &mut self.out[idx] else {
            unreachable!("not a branch at {idx}");
        };
        *else_target = target;
    }
}
