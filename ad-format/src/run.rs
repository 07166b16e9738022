// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of ad, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

use std::io::{self, Read};

use crate::{
    ast::{ArrayLen, Decl},
    compile::{CStmt, CSwitch, Program},
    diag::{FResult, RunError},
    expr::{BinaryOp, Expr, Value, ValueData},
    input::BufInput,
    sname::ScopedName,
    symbol::SymbolTable,
    types::{BaseKind, Type, TypeId, Typedefs},
    utf,
};

/// Cap on a null-terminated string field, so a missing terminator cannot
/// swallow the input.
pub const STR_MAX_BYTES: usize = 64 * 1024;

/// One decoded field: everything a renderer needs to show it.
#[derive(Debug)]
pub struct FieldEvent<'a> {
    pub name: &'a ScopedName,
    pub ty: TypeId,
    /// Offset of the field's first byte in the input.
    pub offset: u64,
    /// The raw bytes consumed for the field, terminator included.
    pub bytes: &'a [u8],
    pub value: &'a Value,
}

/// Receives field events in input order.
pub trait FieldSink {
    fn field(&mut self, event: &FieldEvent) -> io::Result<()>;
}

/// Why a pass over the program stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stopped {
    /// The program ran to its end.
    End,
    /// The input was exhausted at a field boundary.
    Eof,
}

/// Executes a compiled program against a byte source, walking the flat
/// statement list by program counter and consuming input per declaration.
pub struct Runner<'p, R> {
    program: &'p Program,
    pub input: BufInput<R>,
    pub symtab: SymbolTable,
    pub typedefs: Typedefs,
    /// Scratch for the current field's raw bytes.
    bytes: Vec<u8>,
}

impl<'p, R: Read> Runner<'p, R> {
    /// Starts from the symbol table and typedef registry the parser built:
    /// run-time values bind onto the records the parser created, keeping
    /// their first-use locations.
    pub fn new(program: &'p Program, input: BufInput<R>) -> Self {
        Runner {
            program,
            input,
            symtab: program.symtab.clone(),
            typedefs: program.typedefs.clone(),
            bytes: Vec::new(),
        }
    }

    /// Runs the program once. Stops cleanly when the input ends at a field
    /// boundary; ending inside a field is an error.
    pub fn run(&mut self, sink: &mut dyn FieldSink) -> FResult<Stopped> {
        let mut pc = 0;
        while pc < self.program.stmts.len() {
            match &self.program.stmts[pc] {
                CStmt::Decl(decl) => {
                    if decl.init.is_none() && self.input.at_eof()? {
                        return Ok(Stopped::Eof);
                    }
                    self.exec_decl(decl, None, sink)?;
                    pc += 1;
                }
                CStmt::Typedef(def) => {
                    self.typedefs
                        .insert(ScopedName::new(&def.name), def.ty.clone());
                    pc += 1;
                }
                CStmt::Branch {
                    cond,
                    else_target,
                    span,
                } => {
                    let v = cond.eval_value(&self.symtab).map_err(|kind| {
                        RunError::Expr { kind, span: *span }
                    })?;
                    pc = if v.is_truthy() { pc + 1 } else { *else_target };
                }
                CStmt::Jump { target, .. } => pc = *target,
                CStmt::Switch(sw) => {
                    let control = sw.expr.eval_value(&self.symtab).map_err(|kind| {
                        RunError::Expr {
                            kind,
                            span: sw.span,
                        }
                    })?;
                    pc = self.switch_target(sw, &control)?;
                }
            }
        }
        Ok(Stopped::End)
    }

    /// Runs the program repeatedly until the input is exhausted. A pass
    /// that consumes nothing ends the loop, so a format with only computed
    /// fields cannot spin.
    pub fn run_to_eof(&mut self, sink: &mut dyn FieldSink) -> FResult<()> {
        loop {
            if self.input.at_eof()? {
                return Ok(());
            }
            let before = self.input.offset();
            self.run(sink)?;
            if self.input.offset() == before {
                return Ok(());
            }
        }
    }

    /// Picks the program counter a switch transfers to: the first arm with
    /// a matching value, else the default, else past the switch.
    fn switch_target(&self, sw: &CSwitch, control: &Value) -> FResult<usize> {
        for arm in &sw.cases {
            for value in &arm.values {
                let eq = Expr::Binary {
                    op: BinaryOp::Eq,
                    lhs: Box::new(Expr::value(control.clone())),
                    rhs: Box::new(value.clone()),
                };
                let matched = eq.eval_value(&self.symtab).map_err(|kind| {
                    RunError::Expr {
                        kind,
                        span: sw.span,
                    }
                })?;
                if matched.is_truthy() {
                    return Ok(arm.target);
                }
            }
        }
        Ok(sw.default_target.unwrap_or(sw.end))
    }

    fn exec_decl(
        &mut self,
        decl: &Decl,
        prefix: Option<&ScopedName>,
        sink: &mut dyn FieldSink,
    ) -> FResult<()> {
        let name = match prefix {
            Some(prefix) => prefix.join(&decl.name),
            None => ScopedName::new(&decl.name),
        };

        match &decl.ty {
            Type::Struct(st) => {
                for member in &st.members {
                    self.exec_decl(member, Some(&name), sink)?;
                }
                Ok(())
            }
            Type::Scalar(id) => {
                let offset = self.input.offset();
                let value = match &decl.init {
                    // A computed field consumes no input.
                    Some(init) => {
                        self.bytes.clear();
                        let v = init.eval_value(&self.symtab).map_err(|kind| {
                            RunError::Expr {
                                kind,
                                span: decl.span,
                            }
                        })?;
                        v
                    }
                    None => self.read_scalar(*id, decl, &name)?,
                };
                self.symtab
                    .bind_value(&name, decl.ty.clone(), value.clone(), decl.span);
                sink.field(&FieldEvent {
                    name: &name,
                    ty: *id,
                    offset,
                    bytes: &self.bytes,
                    value: &value,
                })?;
                Ok(())
            }
            // The grammar only produces switch types as statements.
            Type::Switch(_) => Ok(()),
        }
    }

    /// Reads and decodes one scalar field, leaving the raw bytes in
    /// `self.bytes`.
    fn read_scalar(&mut self, id: TypeId, decl: &Decl, name: &ScopedName) -> FResult<Value> {
        self.bytes.clear();
        let data = match id.kind {
            BaseKind::Bool | BaseKind::Int => {
                let raw = self.read_uint(id, name)?;
                if id.kind == BaseKind::Bool {
                    ValueData::Bool(raw != 0)
                } else {
                    ValueData::Int(narrowed(raw, id))
                }
            }
            BaseKind::Float => {
                let n = id.size_bytes() as usize;
                self.fill(n, name)?;
                let f = match n {
                    4 => id.endian.read_f32(self.bytes[..4].try_into().unwrap()) as f64,
                    _ => id.endian.read_f64(self.bytes[..8].try_into().unwrap()),
                };
                ValueData::Float(f)
            }
            BaseKind::Char => ValueData::Char(self.read_char(id, name)?),
            BaseKind::Str => {
                let value_len = if id.nul_terminated {
                    self.read_nul_terminated(id, name)?
                } else {
                    let units = match decl.array {
                        Some(ArrayLen::Fixed(units)) => units,
                        _ => 0,
                    };
                    let n = units as usize * (id.bits as usize / 8);
                    self.fill(n, name)?;
                    n
                };
                let bytes = self.bytes[..value_len].to_vec();
                let value = Value {
                    ty: id,
                    data: ValueData::Str(bytes),
                };
                // Reject undecodable contents here, where the offset is known.
                if value.code_points().is_none() {
                    return Err(RunError::BadEncoding {
                        name: name.to_string(),
                        offset: self.input.offset(),
                        ty: id.to_string(),
                    }
                    .into());
                }
                return Ok(value);
            }
            _ => {
                return Err(RunError::BadEncoding {
                    name: name.to_string(),
                    offset: self.input.offset(),
                    ty: id.to_string(),
                }
                .into())
            }
        };
        Ok(Value { ty: id, data })
    }

    /// Appends `n` bytes from the input to `self.bytes`.
    fn fill(&mut self, n: usize, name: &ScopedName) -> FResult<()> {
        let start = self.bytes.len();
        self.bytes.resize(start + n, 0);
        let offset = self.input.offset();
        self.input
            .read_exact(&mut self.bytes[start..])
            .map_err(|e| eof_as_field_error(e, name, offset))?;
        Ok(())
    }

    /// An unsigned integer of the field's width, in its byte order.
    fn read_uint(&mut self, id: TypeId, name: &ScopedName) -> FResult<u64> {
        let n = id.size_bytes() as usize;
        self.fill(n, name)?;
        let b = &self.bytes[self.bytes.len() - n..];
        Ok(match n {
            1 => b[0] as u64,
            2 => id.endian.read_u16([b[0], b[1]]) as u64,
            4 => id.endian.read_u32([b[0], b[1], b[2], b[3]]) as u64,
            _ => id
                .endian
                .read_u64([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]),
        })
    }

    /// One character: a whole UTF-8 sequence or UTF-16 surrogate pair, or a
    /// single UTF-32 unit.
    fn read_char(&mut self, id: TypeId, name: &ScopedName) -> FResult<u32> {
        let offset = self.input.offset();
        let bad = || RunError::BadEncoding {
            name: name.to_string(),
            offset,
            ty: id.to_string(),
        };
        match id.bits {
            8 => {
                self.fill(1, name)?;
                let len = utf::utf8_len(self.bytes[0]);
                if len == 0 || len > 4 {
                    return Err(bad().into());
                }
                self.fill(len - 1, name)?;
                match utf::decode_utf8(&self.bytes) {
                    Some((cp, _)) => Ok(cp),
                    None => Err(bad().into()),
                }
            }
            16 => {
                self.fill(2, name)?;
                let mut units = vec![id.endian.read_u16([self.bytes[0], self.bytes[1]])];
                if (0xD800..=0xDBFF).contains(&units[0]) {
                    self.fill(2, name)?;
                    units.push(id.endian.read_u16([self.bytes[2], self.bytes[3]]));
                }
                match utf::decode_utf16(&units) {
                    Some((cp, _)) => Ok(cp),
                    None => Err(bad().into()),
                }
            }
            _ => {
                self.fill(4, name)?;
                let cp = id
                    .endian
                    .read_u32([self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]]);
                if utf::is_valid_cp(cp) {
                    Ok(cp)
                } else {
                    Err(bad().into())
                }
            }
        }
    }

    /// Reads code units until a zero unit. Returns the value's length in
    /// bytes; the terminator stays in `self.bytes` but not in the value.
    fn read_nul_terminated(&mut self, id: TypeId, name: &ScopedName) -> FResult<usize> {
        let unit = id.bits as usize / 8;
        let offset = self.input.offset();
        loop {
            if self.bytes.len() > STR_MAX_BYTES {
                return Err(RunError::StringTooLong {
                    name: name.to_string(),
                    offset,
                    max: STR_MAX_BYTES,
                }
                .into());
            }
            let start = self.bytes.len();
            self.fill(unit, name)?;
            if self.bytes[start..].iter().all(|&b| b == 0) {
                return Ok(start);
            }
        }
    }
}

/// Sign-extends or masks a freshly read integer into its storage pattern.
fn narrowed(raw: u64, id: TypeId) -> u64 {
    if id.bits >= 64 {
        return raw;
    }
    let mask = (1u64 << id.bits) - 1;
    let v = raw & mask;
    if id.signed && v >> (id.bits - 1) & 1 == 1 {
        v | !mask
    } else {
        v
    }
}

/// EOF inside a field names the field; other I/O errors pass through.
fn eof_as_field_error(e: io::Error, name: &ScopedName, offset: u64) -> crate::diag::FormatError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        RunError::UnexpectedEof {
            name: name.to_string(),
            offset,
        }
        .into()
    } else {
        e.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{check::check, compile::compile, diag::FormatError, parser::parse};

    /// Owns a copy of every event, for assertions.
    #[derive(Default)]
    struct Collect {
        events: Vec<(String, u64, Vec<u8>, Value)>,
    }

    impl FieldSink for Collect {
        fn field(&mut self, event: &FieldEvent) -> io::Result<()> {
            self.events.push((
                event.name.to_string(),
                event.offset,
                event.bytes.to_vec(),
                event.value.clone(),
            ));
            Ok(())
        }
    }

    fn run_format(src: &[u8], input: &[u8]) -> (Collect, u64) {
        let parsed = parse(src).unwrap();
        check(&parsed).unwrap();
        let program = compile(parsed).unwrap();
        let mut runner = Runner::new(&program, BufInput::new(input));
        let mut sink = Collect::default();
        runner.run(&mut sink).unwrap();
        let offset = runner.input.offset();
        (sink, offset)
    }

    #[test]
    fn switch_selects_by_tag() {
        let src = b"uint<8> tag;\n\
                    switch (tag) {\n\
                    case 1: uint<16>be v; break;\n\
                    case 2: uint<32>le v; break;\n\
                    }";
        let (sink, offset) = run_format(src, &[0x01, 0x00, 0x2A]);
        assert_eq!(offset, 3);
        assert_eq!(sink.events.len(), 2);
        assert_eq!(sink.events[0].0, "tag");
        assert_eq!(sink.events[0].3.data, ValueData::Int(1));
        assert_eq!(sink.events[1].0, "v");
        assert_eq!(sink.events[1].1, 1);
        assert_eq!(sink.events[1].3.data, ValueData::Int(0x2A));
    }

    #[test]
    fn switch_other_arm() {
        let src = b"uint<8> tag;\n\
                    switch (tag) {\n\
                    case 1: uint<16>be v; break;\n\
                    case 2: uint<32>le v; break;\n\
                    }";
        let (sink, offset) = run_format(src, &[0x02, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!(offset, 5);
        assert_eq!(sink.events[1].3.data, ValueData::Int(0x12345678));
    }

    #[test]
    fn switch_default_and_skip() {
        let src = b"uint<8> tag;\n\
                    switch (tag) { case 1: uint<8> a; break; default: uint<8> d; }";
        let (sink, _) = run_format(src, &[9, 0x55]);
        assert_eq!(sink.events[1].0, "d");
        assert_eq!(sink.events[1].3.data, ValueData::Int(0x55));

        // Without a default, an unmatched switch reads nothing.
        let src = b"uint<8> tag;\n\
                    switch (tag) { case 1: uint<8> a; break; }\n\
                    uint<8> after;";
        let (sink, _) = run_format(src, &[9, 0x77]);
        assert_eq!(sink.events.len(), 2);
        assert_eq!(sink.events[1].0, "after");
        assert_eq!(sink.events[1].3.data, ValueData::Int(0x77));
    }

    #[test]
    fn signed_field_sign_extends() {
        let (sink, _) = run_format(b"int<8> v;", &[0xFE]);
        assert_eq!(sink.events[0].3.data, ValueData::Int(-2i64 as u64));
        assert_eq!(sink.events[0].3.to_string(), "-2");
    }

    #[test]
    fn float_field() {
        let bytes = 1.25f64.to_be_bytes();
        let (sink, _) = run_format(b"float<64>be x;", &bytes);
        assert_eq!(sink.events[0].3.data, ValueData::Float(1.25));
    }

    #[test]
    fn nul_terminated_string() {
        let (sink, offset) = run_format(b"utf8 s[];", b"hi\0after");
        assert_eq!(offset, 3);
        let ValueData::Str(s) = &sink.events[0].3.data else {
            panic!()
        };
        assert_eq!(s, b"hi");
        // The terminator is in the raw bytes.
        assert_eq!(sink.events[0].2, b"hi\0");
    }

    #[test]
    fn fixed_utf16_string() {
        let (sink, offset) = run_format(
            b"utf16le s[2];",
            &[0x48, 0x00, 0x49, 0x00, 0xFF],
        );
        assert_eq!(offset, 4);
        assert_eq!(sink.events[0].3.to_string(), "\"HI\"");
    }

    #[test]
    fn utf8_char_multibyte() {
        let (sink, offset) = run_format(b"utf8 c;", "é!".as_bytes());
        assert_eq!(offset, 2);
        assert_eq!(sink.events[0].3.data, ValueData::Char(0xE9));
    }

    #[test]
    fn struct_members_qualified() {
        let src = b"struct hdr { uint<16>be magic; uint<8> ver; } h;";
        let (sink, offset) = run_format(src, &[0xCA, 0xFE, 3]);
        assert_eq!(offset, 3);
        assert_eq!(sink.events[0].0, "h::magic");
        assert_eq!(sink.events[0].3.data, ValueData::Int(0xCAFE));
        assert_eq!(sink.events[1].0, "h::ver");
        assert_eq!(sink.events[1].1, 2);
    }

    #[test]
    fn computed_field_consumes_nothing() {
        let src = b"uint<8> a; uint<8> b; uint<64> sum = a + b;";
        let (sink, offset) = run_format(src, &[2, 3]);
        assert_eq!(offset, 2);
        assert_eq!(sink.events[2].0, "sum");
        assert_eq!(sink.events[2].3.data, ValueData::Int(5));
        assert!(sink.events[2].2.is_empty());
    }

    #[test]
    fn if_branches_on_prior_field() {
        let src = b"uint<8> kind; if (kind == 1) { uint<8> a; } else { uint<16>be w; }";
        let (sink, _) = run_format(src, &[1, 0xAA]);
        assert_eq!(sink.events[1].0, "a");
        let (sink, _) = run_format(src, &[0, 0xBB, 0xCC]);
        assert_eq!(sink.events[1].0, "w");
        assert_eq!(sink.events[1].3.data, ValueData::Int(0xBBCC));
    }

    #[test]
    fn eof_at_field_boundary_is_clean() {
        let parsed = parse(b"uint<8> a; uint<8> b;").unwrap();
        let program = compile(parsed).unwrap();
        let mut runner = Runner::new(&program, BufInput::new(&[0x11][..]));
        let mut sink = Collect::default();
        assert_eq!(runner.run(&mut sink).unwrap(), Stopped::Eof);
        assert_eq!(sink.events.len(), 1);
    }

    #[test]
    fn eof_inside_field_is_an_error() {
        let parsed = parse(b"uint<32>be a;").unwrap();
        let program = compile(parsed).unwrap();
        let mut runner = Runner::new(&program, BufInput::new(&[0x11, 0x22][..]));
        let mut sink = Collect::default();
        let err = runner.run(&mut sink).unwrap_err();
        let FormatError::Run(RunError::UnexpectedEof { name, offset }) = err else {
            panic!("wrong error: {err:?}");
        };
        assert_eq!(name, "a");
        assert_eq!(offset, 0);
    }

    #[test]
    fn run_to_eof_repeats_records() {
        let parsed = parse(b"uint<16>be v;").unwrap();
        let program = compile(parsed).unwrap();
        let mut runner = Runner::new(&program, BufInput::new(&[0, 1, 0, 2, 0, 3][..]));
        let mut sink = Collect::default();
        runner.run_to_eof(&mut sink).unwrap();
        let values: Vec<u64> = sink
            .events
            .iter()
            .map(|(_, _, _, v)| match v.data {
                ValueData::Int(n) => n,
                _ => panic!(),
            })
            .collect();
        assert_eq!(values, [1, 2, 3]);
    }

    #[test]
    fn runtime_division_by_zero_reports_span() {
        let src = b"uint<8> n; uint<8> q = 8 / n;";
        let parsed = parse(src).unwrap();
        check(&parsed).unwrap();
        let program = compile(parsed).unwrap();
        let mut runner = Runner::new(&program, BufInput::new(&[0][..]));
        let mut sink = Collect::default();
        let err = runner.run(&mut sink).unwrap_err();
        let FormatError::Run(RunError::Expr { kind, .. }) = err else {
            panic!("wrong error: {err:?}");
        };
        assert_eq!(kind, crate::expr::ExprError::DivByZero);
    }

    #[test]
    fn binding_keeps_parser_record() {
        let src = b"uint<8> tag;";
        let parsed = parse(src).unwrap();
        let declared_at = parsed
            .symtab
            .find(&ScopedName::new("tag"))
            .unwrap()
            .first_loc;
        let program = compile(parsed).unwrap();
        let mut runner = Runner::new(&program, BufInput::new(&[7][..]));
        let mut sink = Collect::default();
        runner.run(&mut sink).unwrap();

        // The run-time value lands on the record the parser created; the
        // place of declaration is preserved.
        let info = runner.symtab.find(&ScopedName::new("tag")).unwrap();
        assert_eq!(info.first_loc, declared_at);
        assert_eq!(declared_at, crate::diag::Span::new(8, 11));
        let crate::symbol::SymbolData::Decl {
            value: Some(value), ..
        } = &info.data
        else {
            panic!("no value bound: {info:?}");
        };
        assert_eq!(value.data, ValueData::Int(7));
    }

    #[test]
    fn typedef_registered_at_runtime() {
        let parsed = parse(b"typedef uint<16>be word; word w;").unwrap();
        let program = compile(parsed).unwrap();
        let mut runner = Runner::new(&program, BufInput::new(&[0x01, 0x02][..]));
        let mut sink = Collect::default();
        runner.run(&mut sink).unwrap();
        assert!(runner
            .typedefs
            .get(&ScopedName::new("word"))
            .is_some());
        assert_eq!(sink.events[0].3.data, ValueData::Int(0x0102));
    }
}
