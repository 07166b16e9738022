// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of ad, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

//! The format-description language of `ad`: a small C-like notation for
//! declaring how a binary stream is laid out, with typed fields, scoped
//! names, `if`/`switch` control flow, and expressions over decoded values.
//!
//! The pipeline is source text -> [`lexer`] -> [`parser`] -> [`check`] ->
//! [`compile`] -> [`run`], with [`input::BufInput`] consuming the data
//! stream and [`diag`] rendering located errors.

pub mod ast;
pub mod check;
pub mod compile;
pub mod diag;
pub mod expr;
pub mod input;
pub mod lexer;
pub mod parser;
pub mod run;
pub mod sname;
pub mod symbol;
pub mod token;
pub mod types;
pub mod utf;

pub use diag::{FResult, FormatError, RunError, Span, SyntaxError, SyntaxErrorKind};
pub use input::BufInput;
pub use run::{FieldEvent, FieldSink, Runner, Stopped};

use std::io::Read;

/// Parses, checks, and compiles a format description in one step. The
/// symbol table and typedef registry the parser built travel with the
/// compiled program into the interpreter.
pub fn load(src: &[u8]) -> Result<compile::Program, SyntaxError> {
    let parsed = parser::parse(src)?;
    check::check(&parsed)?;
    compile::compile(parsed)
}

/// Runs a compiled format over a whole input, repeating the program until
/// the input is exhausted.
pub fn run_over<R: Read>(
    program: &compile::Program,
    input: BufInput<R>,
    sink: &mut dyn FieldSink,
) -> FResult<()> {
    let mut runner = Runner::new(program, input);
    runner.run_to_eof(sink)
}
