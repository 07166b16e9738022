// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of ad, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

use std::fmt::{self, Display, Formatter};

use thiserror::Error;

use crate::{
    sname::ScopedName,
    types::{BaseKind, Endian, TypeId},
    utf,
};

/// An evaluation failure. These are values, not exceptions: a failed
/// subexpression becomes `Expr::Error` and propagates up the tree; the
/// interpreter turns it into a diagnostic at the statement boundary.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
pub enum ExprError {
    #[error("invalid operand")]
    BadOperand,
    #[error("division by zero")]
    DivByZero,
}

use ExprError::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-`
    Neg,
    /// `~`
    BitNot,
    /// `!`
    Not,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    /// `&&`, short-circuit
    And,
    /// `||`, short-circuit
    Or,
    /// `^^`
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Xor => "^^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

/// A materialized value. Integers are stored as 64-bit two's-complement bit
/// patterns; the descriptor's signedness decides how the bits read. Strings
/// are kept in their declared encoding and decoded on demand.
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    pub ty: TypeId,
    pub data: ValueData,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueData {
    Bool(bool),
    Int(u64),
    Float(f64),
    /// A code point.
    Char(u32),
    /// Code units in the descriptor's encoding and byte order.
    Str(Vec<u8>),
}

impl Value {
    pub fn bool_(b: bool) -> Value {
        Value {
            ty: TypeId::bool_(8),
            data: ValueData::Bool(b),
        }
    }

    pub fn uint(v: u64) -> Value {
        Value {
            ty: TypeId::uint64(),
            data: ValueData::Int(v),
        }
    }

    pub fn int(v: i64) -> Value {
        Value {
            ty: TypeId::int64(),
            data: ValueData::Int(v as u64),
        }
    }

    pub fn float(v: f64) -> Value {
        Value {
            ty: TypeId::float(64, Endian::Host),
            data: ValueData::Float(v),
        }
    }

    /// Whether the value counts as true: nonzero number or code point, or a
    /// string whose first code unit exists and is nonzero.
    pub fn is_truthy(&self) -> bool {
        match &self.data {
            ValueData::Bool(b) => *b,
            ValueData::Int(v) => *v != 0,
            ValueData::Float(v) => *v != 0.0,
            ValueData::Char(cp) => *cp != 0,
            ValueData::Str(bytes) => first_unit(bytes, self.ty).is_some_and(|u| u != 0),
        }
    }

    /// Decodes a string value to code points. `None` for non-strings or
    /// invalid encodings.
    pub fn code_points(&self) -> Option<Vec<u32>> {
        let ValueData::Str(bytes) = &self.data else {
            return None;
        };
        let endian = self.ty.endian;
        utf::decode_units(bytes, self.ty.bits, move |unit| match unit.len() {
            2 => endian.read_u16([unit[0], unit[1]]) as u32,
            4 => endian.read_u32([unit[0], unit[1], unit[2], unit[3]]),
            _ => unit[0] as u32,
        })
    }
}

/// The first code unit of an encoded string, widened.
fn first_unit(bytes: &[u8], ty: TypeId) -> Option<u32> {
    match ty.bits {
        16 if bytes.len() >= 2 => Some(ty.endian.read_u16([bytes[0], bytes[1]]) as u32),
        32 if bytes.len() >= 4 => {
            Some(ty.endian.read_u32([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
        8 if !bytes.is_empty() => Some(bytes[0] as u32),
        _ => None,
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.data {
            ValueData::Bool(b) => write!(f, "{b}"),
            ValueData::Int(v) if self.ty.signed => write!(f, "{}", *v as i64),
            ValueData::Int(v) => write!(f, "{v}"),
            ValueData::Float(v) => write!(f, "{v}"),
            ValueData::Char(cp) => match char::from_u32(*cp) {
                Some(c) if !c.is_control() => write!(f, "'{c}'"),
                _ => write!(f, "U+{cp:04X}"),
            },
            ValueData::Str(_) => {
                f.write_str("\"")?;
                match self.code_points() {
                    Some(cps) => {
                        for cp in cps {
                            match char::from_u32(cp) {
                                Some('\n') => f.write_str("\\n")?,
                                Some(c) if !c.is_control() => write!(f, "{c}")?,
                                _ => write!(f, "\\u{{{cp:04X}}}")?,
                            }
                        }
                    }
                    None => f.write_str("?")?,
                }
                f.write_str("\"")
            }
        }
    }
}

/// Resolves identifiers during evaluation. The symbol table implements
/// this; tests use ad-hoc maps.
pub trait Scope {
    fn lookup(&self, name: &ScopedName) -> Option<Value>;
}

/// A scope with no bindings, for constant expressions.
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn lookup(&self, _name: &ScopedName) -> Option<Value> {
        None
    }
}

/// A typed expression tree. Evaluation never mutates the tree; it returns a
/// freshly materialized `Value` or `Error` node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    None,
    Error(ExprError),
    Value(Value),
    /// A reference to a previously bound declaration.
    Ident(ScopedName),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        other: Box<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        target: TypeId,
    },
}

impl Expr {
    pub fn value(v: Value) -> Expr {
        Expr::Value(v)
    }

    pub fn eval(&self, scope: &dyn Scope) -> Expr {
        match self {
            Expr::None => Expr::None,
            Expr::Error(e) => Expr::Error(*e),
            Expr::Value(v) => Expr::Value(v.clone()),
            Expr::Ident(name) => match scope.lookup(name) {
                Some(v) => Expr::Value(v),
                None => Expr::Error(BadOperand),
            },
            Expr::Unary { op, expr } => match expr.eval(scope) {
                Expr::Value(v) => eval_unary(*op, v),
                other => propagate(other),
            },
            Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, scope),
            Expr::Ternary { cond, then, other } => match cond.eval(scope) {
                Expr::Value(c) => {
                    if c.is_truthy() {
                        then.eval(scope)
                    } else {
                        other.eval(scope)
                    }
                }
                e => propagate(e),
            },
            Expr::Cast { expr, target } => match expr.eval(scope) {
                Expr::Value(v) => eval_cast(v, *target),
                other => propagate(other),
            },
        }
    }

    /// Evaluates and demands a value.
    pub fn eval_value(&self, scope: &dyn Scope) -> Result<Value, ExprError> {
        match self.eval(scope) {
            Expr::Value(v) => Ok(v),
            Expr::Error(e) => Err(e),
            _ => Err(BadOperand),
        }
    }
}

/// Keeps an error node, turns anything else unexpected into `BadOperand`.
fn propagate(e: Expr) -> Expr {
    match e {
        err @ Expr::Error(_) => err,
        _ => Expr::Error(BadOperand),
    }
}

fn err(e: ExprError) -> Expr {
    Expr::Error(e)
}

/// Masks `raw` to `bits` and sign- or zero-extends back to the 64-bit
/// storage pattern.
fn narrow(raw: u64, bits: u8, signed: bool) -> u64 {
    if bits >= 64 {
        return raw;
    }
    let mask = (1u64 << bits) - 1;
    let v = raw & mask;
    if signed && v >> (bits - 1) & 1 == 1 {
        v | !mask
    } else {
        v
    }
}

/// The signed reading of a stored bit pattern.
fn to_i128(raw: u64, signed: bool) -> i128 {
    if signed {
        raw as i64 as i128
    } else {
        raw as i128
    }
}

/// Relative-epsilon float equality.
fn float_eq(a: f64, b: f64) -> bool {
    let diff = (a - b).abs();
    diff <= f64::EPSILON || diff < a.abs().max(b.abs()) * f64::EPSILON
}

/// A numeric operand after kind dispatch.
enum Num {
    Int { raw: u64, signed: bool, bits: u8 },
    Float(f64),
}

/// Extracts a numeric operand for arithmetic. UTF operands are rejected
/// here; bitwise and relational ops admit characters separately.
fn numeric(v: &Value) -> Result<Num, ExprError> {
    match v.data {
        ValueData::Bool(b) => Ok(Num::Int {
            raw: b as u64,
            signed: false,
            bits: 64,
        }),
        ValueData::Int(raw) => Ok(Num::Int {
            raw,
            signed: v.ty.signed,
            bits: v.ty.bits.max(8),
        }),
        ValueData::Float(f) => Ok(Num::Float(f)),
        _ => Err(BadOperand),
    }
}

/// Extracts a numeric operand for relational comparison; characters compare
/// as their code points.
fn numeric_or_char(v: &Value) -> Result<Num, ExprError> {
    match v.data {
        ValueData::Char(cp) => Ok(Num::Int {
            raw: cp as u64,
            signed: false,
            bits: 32,
        }),
        _ => numeric(v),
    }
}

/// A bit-pattern operand for bitwise ops: bool, int, or UTF. A character
/// contributes its code point; a string its first code unit, the same unit
/// truthiness reads. Floats have no bit-pattern reading.
fn raw_bits(v: &Value) -> Result<(u64, u8, bool), ExprError> {
    match &v.data {
        ValueData::Bool(b) => Ok((*b as u64, 8, false)),
        ValueData::Int(raw) => Ok((*raw, v.ty.bits.max(8), v.ty.signed)),
        ValueData::Char(cp) => Ok((*cp as u64, 32, false)),
        ValueData::Str(bytes) => match first_unit(bytes, v.ty) {
            Some(unit) => Ok((unit as u64, v.ty.bits.max(8), false)),
            None => Err(BadOperand),
        },
        ValueData::Float(_) => Err(BadOperand),
    }
}

fn eval_unary(op: UnaryOp, v: Value) -> Expr {
    match op {
        UnaryOp::Not => Expr::Value(Value::bool_(!v.is_truthy())),
        UnaryOp::Neg => match numeric(&v) {
            Ok(Num::Int { raw, bits, .. }) => Expr::Value(Value {
                ty: TypeId::int(bits, true, Endian::Host),
                data: ValueData::Int(narrow(raw.wrapping_neg(), bits, true)),
            }),
            Ok(Num::Float(f)) => Expr::Value(Value {
                ty: v.ty,
                data: ValueData::Float(-f),
            }),
            Err(e) => err(e),
        },
        UnaryOp::BitNot => match raw_bits(&v) {
            Ok((raw, bits, signed)) => Expr::Value(Value {
                ty: TypeId::int(bits, signed, Endian::Host),
                data: ValueData::Int(narrow(!raw, bits, signed)),
            }),
            Err(e) => err(e),
        },
    }
}

fn eval_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, scope: &dyn Scope) -> Expr {
    // Short-circuit forms evaluate their own operands.
    match op {
        BinaryOp::And | BinaryOp::Or => {
            let l = match lhs.eval(scope) {
                Expr::Value(v) => v.is_truthy(),
                e => return propagate(e),
            };
            let short = match op {
                BinaryOp::And => !l,
                _ => l,
            };
            if short {
                return Expr::Value(Value::bool_(l));
            }
            return match rhs.eval(scope) {
                Expr::Value(v) => Expr::Value(Value::bool_(v.is_truthy())),
                e => propagate(e),
            };
        }
        _ => {}
    }

    let l = match lhs.eval(scope) {
        Expr::Value(v) => v,
        e => return propagate(e),
    };
    let r = match rhs.eval(scope) {
        Expr::Value(v) => v,
        e => return propagate(e),
    };

    match op {
        BinaryOp::Xor => Expr::Value(Value::bool_(l.is_truthy() ^ r.is_truthy())),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            eval_arith(op, &l, &r)
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => eval_bitwise(op, &l, &r),
        BinaryOp::Shl | BinaryOp::Shr => eval_shift(op, &l, &r),
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            eval_relational(op, &l, &r)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn eval_arith(op: BinaryOp, l: &Value, r: &Value) -> Expr {
    let (ln, rn) = match (numeric(l), numeric(r)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => return err(e),
    };
    match (ln, rn) {
        (
            Num::Int {
                raw: a,
                signed: ls,
                bits: lb,
            },
            Num::Int {
                raw: b,
                signed: rs,
                bits: rb,
            },
        ) => {
            let signed = ls || rs;
            let bits = lb.max(rb);
            let raw = match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Div | BinaryOp::Mod => {
                    if b == 0 {
                        return err(DivByZero);
                    }
                    if signed {
                        let (a, b) = (a as i64, b as i64);
                        match op {
                            BinaryOp::Div => a.wrapping_div(b) as u64,
                            _ => a.wrapping_rem(b) as u64,
                        }
                    } else {
                        match op {
                            BinaryOp::Div => a / b,
                            _ => a % b,
                        }
                    }
                }
                _ => unreachable!(),
            };
            Expr::Value(Value {
                ty: TypeId::int(bits, signed, Endian::Host),
                data: ValueData::Int(narrow(raw, bits, signed)),
            })
        }
        (ln, rn) => {
            let a = as_f64(ln);
            let b = as_f64(rn);
            if matches!(op, BinaryOp::Div | BinaryOp::Mod) && b == 0.0 {
                return err(DivByZero);
            }
            let v = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Mod => a % b,
                _ => unreachable!(),
            };
            Expr::Value(Value::float(v))
        }
    }
}

fn as_f64(n: Num) -> f64 {
    match n {
        Num::Int { raw, signed, .. } => {
            if signed {
                raw as i64 as f64
            } else {
                raw as f64
            }
        }
        Num::Float(f) => f,
    }
}

fn eval_bitwise(op: BinaryOp, l: &Value, r: &Value) -> Expr {
    let ((a, lb, ls), (b, rb, rs)) = match (raw_bits(l), raw_bits(r)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => return err(e),
    };
    // Widen to 64-bit unsigned, operate, then narrow to the result type.
    let wide = match op {
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        _ => unreachable!(),
    };
    let bits = lb.max(rb);
    let signed = ls || rs;
    Expr::Value(Value {
        ty: TypeId::int(bits, signed, Endian::Host),
        data: ValueData::Int(narrow(wide, bits, signed)),
    })
}

fn eval_shift(op: BinaryOp, l: &Value, r: &Value) -> Expr {
    // Shifts exclude UTF operands entirely.
    if l.ty.is_utf() || r.ty.is_utf() {
        return err(BadOperand);
    }
    let ((a, bits, signed), (count, ..)) = match (raw_bits(l), raw_bits(r)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => return err(e),
    };
    let raw = if count >= 64 {
        if signed && op == BinaryOp::Shr && (a as i64) < 0 {
            u64::MAX
        } else {
            0
        }
    } else {
        match op {
            BinaryOp::Shl => a << count,
            _ if signed => ((a as i64) >> count) as u64,
            _ => a >> count,
        }
    };
    Expr::Value(Value {
        ty: TypeId::int(bits, signed, Endian::Host),
        data: ValueData::Int(narrow(raw, bits, signed)),
    })
}

fn eval_relational(op: BinaryOp, l: &Value, r: &Value) -> Expr {
    use std::cmp::Ordering;

    // String comparison decodes both sides to code points; a bad encoding
    // is an operand error, not an unequal string.
    if l.ty.kind == BaseKind::Str || r.ty.kind == BaseKind::Str {
        let (Some(a), Some(b)) = (l.code_points(), r.code_points()) else {
            return err(BadOperand);
        };
        return Expr::Value(Value::bool_(match op {
            BinaryOp::Eq => a == b,
            BinaryOp::Ne => a != b,
            BinaryOp::Lt => a < b,
            BinaryOp::Le => a <= b,
            BinaryOp::Gt => a > b,
            BinaryOp::Ge => a >= b,
            _ => unreachable!(),
        }));
    }

    let (ln, rn) = match (numeric_or_char(l), numeric_or_char(r)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => return err(e),
    };
    let ord = match (ln, rn) {
        (
            Num::Int {
                raw: a, signed: ls, ..
            },
            Num::Int {
                raw: b, signed: rs, ..
            },
        ) => to_i128(a, ls).cmp(&to_i128(b, rs)),
        (a, b) => {
            let (a, b) = (as_f64(a), as_f64(b));
            let eq = float_eq(a, b);
            match op {
                BinaryOp::Eq => return Expr::Value(Value::bool_(eq)),
                BinaryOp::Ne => return Expr::Value(Value::bool_(!eq)),
                _ => {}
            }
            match a.partial_cmp(&b) {
                Some(ord) => ord,
                None => return err(BadOperand),
            }
        }
    };
    Expr::Value(Value::bool_(match op {
        BinaryOp::Eq => ord == Ordering::Equal,
        BinaryOp::Ne => ord != Ordering::Equal,
        BinaryOp::Lt => ord == Ordering::Less,
        BinaryOp::Le => ord != Ordering::Greater,
        BinaryOp::Gt => ord == Ordering::Greater,
        BinaryOp::Ge => ord != Ordering::Less,
        _ => unreachable!(),
    }))
}

fn eval_cast(v: Value, target: TypeId) -> Expr {
    let data = match target.kind {
        BaseKind::Bool => ValueData::Bool(v.is_truthy()),
        BaseKind::Int => {
            let raw = match v.data {
                ValueData::Bool(b) => b as u64,
                ValueData::Int(raw) => raw,
                ValueData::Float(f) => f as i64 as u64,
                ValueData::Char(cp) => cp as u64,
                ValueData::Str(_) => return err(BadOperand),
            };
            ValueData::Int(narrow(raw, target.bits, target.signed))
        }
        BaseKind::Float => {
            let f = match v.data {
                ValueData::Bool(b) => b as u64 as f64,
                ValueData::Int(raw) => {
                    if v.ty.signed {
                        raw as i64 as f64
                    } else {
                        raw as f64
                    }
                }
                ValueData::Float(f) => f,
                _ => return err(BadOperand),
            };
            ValueData::Float(if target.bits == 32 { f as f32 as f64 } else { f })
        }
        BaseKind::Char => {
            let cp = match v.data {
                ValueData::Char(cp) => cp,
                ValueData::Int(raw) => raw as u32,
                _ => return err(BadOperand),
            };
            if !utf::is_valid_cp(cp) {
                return err(BadOperand);
            }
            ValueData::Char(cp)
        }
        BaseKind::Str => {
            // Transcode between unit widths and byte orders.
            let Some(cps) = v.code_points() else {
                return err(BadOperand);
            };
            match encode_units(&cps, target) {
                Some(bytes) => ValueData::Str(bytes),
                None => return err(BadOperand),
            }
        }
        _ => return err(BadOperand),
    };
    Expr::Value(Value { ty: target, data })
}

/// Encodes code points into the unit width and byte order of `target`.
pub fn encode_units(cps: &[u32], target: TypeId) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    for &cp in cps {
        match target.bits {
            8 => {
                let mut buf = [0; 4];
                let n = utf::encode_utf8(cp, &mut buf)?;
                out.extend_from_slice(&buf[..n]);
            }
            16 => {
                let mut buf = [0; 2];
                let n = utf::encode_utf16(cp, &mut buf)?;
                for unit in &buf[..n] {
                    match target.endian.resolve() {
                        Endian::Big => out.extend_from_slice(&unit.to_be_bytes()),
                        _ => out.extend_from_slice(&unit.to_le_bytes()),
                    }
                }
            }
            32 => {
                if !utf::is_valid_cp(cp) {
                    return None;
                }
                match target.endian.resolve() {
                    Endian::Big => out.extend_from_slice(&cp.to_be_bytes()),
                    _ => out.extend_from_slice(&cp.to_le_bytes()),
                }
            }
            _ => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    fn eval(e: &Expr) -> Expr {
        e.eval(&EmptyScope)
    }

    fn int_result(e: Expr) -> u64 {
        match eval(&e) {
            Expr::Value(Value {
                data: ValueData::Int(v),
                ..
            }) => v,
            other => panic!("not an integer: {other:?}"),
        }
    }

    fn bool_result(e: Expr) -> bool {
        match eval(&e) {
            Expr::Value(Value {
                data: ValueData::Bool(b),
                ..
            }) => b,
            other => panic!("not a bool: {other:?}"),
        }
    }

    #[test]
    fn multiply_wraps_mod_2_64() {
        let e = bin(
            BinaryOp::Mul,
            Expr::value(Value::uint(0x8000_0000_0000_0001)),
            Expr::value(Value::uint(2)),
        );
        assert_eq!(int_result(e), 2);
    }

    #[test]
    fn division_by_zero_is_an_error_value() {
        let e = bin(
            BinaryOp::Div,
            Expr::value(Value::uint(7)),
            Expr::value(Value::uint(0)),
        );
        assert_eq!(eval(&e), Expr::Error(ExprError::DivByZero));

        let e = bin(
            BinaryOp::Mod,
            Expr::value(Value::float(1.5)),
            Expr::value(Value::float(0.0)),
        );
        assert_eq!(eval(&e), Expr::Error(ExprError::DivByZero));
    }

    #[test]
    fn int_float_promotes_to_float() {
        let e = bin(
            BinaryOp::Add,
            Expr::value(Value::uint(1)),
            Expr::value(Value::float(0.5)),
        );
        match eval(&e) {
            Expr::Value(Value {
                data: ValueData::Float(f),
                ..
            }) => assert_eq!(f, 1.5),
            other => panic!("not a float: {other:?}"),
        }
    }

    #[test]
    fn signed_division_uses_sign() {
        let e = bin(
            BinaryOp::Div,
            Expr::value(Value::int(-9)),
            Expr::value(Value::int(2)),
        );
        assert_eq!(int_result(e) as i64, -4);
    }

    #[test]
    fn float_equality_is_relative() {
        let third = 1.0f64 / 3.0;
        let e = bin(
            BinaryOp::Eq,
            Expr::value(Value::float(third * 3.0)),
            Expr::value(Value::float(1.0)),
        );
        assert!(bool_result(e));
        let e = bin(
            BinaryOp::Eq,
            Expr::value(Value::float(1.0)),
            Expr::value(Value::float(1.0 + 1e-9)),
        );
        assert!(!bool_result(e));
    }

    #[test]
    fn logical_and_short_circuits() {
        // The right side would be a bad operand, but must never evaluate.
        let e = bin(
            BinaryOp::And,
            Expr::value(Value::uint(0)),
            Expr::Error(ExprError::BadOperand),
        );
        assert!(!bool_result(e));

        let e = bin(
            BinaryOp::Or,
            Expr::value(Value::uint(3)),
            Expr::Error(ExprError::BadOperand),
        );
        assert!(bool_result(e));
    }

    #[test]
    fn bitwise_narrows_to_result_width() {
        let e = bin(
            BinaryOp::BitXor,
            Expr::value(Value {
                ty: TypeId::uint8(),
                data: ValueData::Int(0xFF),
            }),
            Expr::value(Value {
                ty: TypeId::uint8(),
                data: ValueData::Int(0x0F),
            }),
        );
        assert_eq!(int_result(e), 0xF0);
    }

    #[test]
    fn shift_rejects_utf() {
        let e = bin(
            BinaryOp::Shl,
            Expr::value(Value {
                ty: TypeId::utf_char(8, Endian::Host),
                data: ValueData::Char(b'a' as u32),
            }),
            Expr::value(Value::uint(1)),
        );
        assert_eq!(eval(&e), Expr::Error(ExprError::BadOperand));

        let e = bin(
            BinaryOp::Shr,
            Expr::value(Value {
                ty: TypeId::utf_str(8, Endian::Host, false),
                data: ValueData::Str(b"a".to_vec()),
            }),
            Expr::value(Value::uint(1)),
        );
        assert_eq!(eval(&e), Expr::Error(ExprError::BadOperand));
    }

    #[test]
    fn bitwise_reads_string_first_unit() {
        // "A" contributes 0x41, its first code unit.
        let s = Value {
            ty: TypeId::utf_str(8, Endian::Host, false),
            data: ValueData::Str(b"AB".to_vec()),
        };
        let e = bin(
            BinaryOp::BitAnd,
            Expr::value(s.clone()),
            Expr::value(Value {
                ty: TypeId::uint8(),
                data: ValueData::Int(0x0F),
            }),
        );
        assert_eq!(int_result(e), 0x01);

        // The unit width follows the string's encoding.
        let wide = Value {
            ty: TypeId::utf_str(16, Endian::Big, false),
            data: ValueData::Str(vec![0x01, 0x00]),
        };
        let e = bin(BinaryOp::BitOr, Expr::value(wide), Expr::value(s));
        assert_eq!(int_result(e), 0x0141);
    }

    #[test]
    fn bit_complement_of_string_narrows_to_unit() {
        let e = Expr::Unary {
            op: UnaryOp::BitNot,
            expr: Box::new(Expr::value(Value {
                ty: TypeId::utf_str(8, Endian::Host, false),
                data: ValueData::Str(b"A".to_vec()),
            })),
        };
        assert_eq!(int_result(e), 0xBE);
    }

    #[test]
    fn bitwise_rejects_empty_string() {
        let empty = Value {
            ty: TypeId::utf_str(8, Endian::Host, false),
            data: ValueData::Str(Vec::new()),
        };
        let e = bin(
            BinaryOp::BitXor,
            Expr::value(empty),
            Expr::value(Value::uint(1)),
        );
        assert_eq!(eval(&e), Expr::Error(ExprError::BadOperand));
    }

    #[test]
    fn string_comparison_decodes_code_points() {
        let utf8 = Value {
            ty: TypeId::utf_str(8, Endian::Host, false),
            data: ValueData::Str(b"caf\xC3\xA9".to_vec()),
        };
        // The same text in UTF-16BE.
        let utf16 = Value {
            ty: TypeId::utf_str(16, Endian::Big, false),
            data: ValueData::Str(vec![0, b'c', 0, b'a', 0, b'f', 0x00, 0xE9]),
        };
        let e = bin(BinaryOp::Eq, Expr::value(utf8), Expr::value(utf16));
        assert!(bool_result(e));
    }

    #[test]
    fn invalid_string_encoding_is_bad_operand() {
        let bad = Value {
            ty: TypeId::utf_str(8, Endian::Host, false),
            data: ValueData::Str(vec![0xFF]),
        };
        let e = bin(
            BinaryOp::Eq,
            Expr::value(bad.clone()),
            Expr::value(bad),
        );
        assert_eq!(eval(&e), Expr::Error(ExprError::BadOperand));
    }

    #[test]
    fn ternary_takes_the_matching_branch() {
        let e = Expr::Ternary {
            cond: Box::new(Expr::value(Value::uint(1))),
            then: Box::new(Expr::value(Value::uint(10))),
            other: Box::new(Expr::value(Value::uint(20))),
        };
        assert_eq!(int_result(e), 10);
    }

    #[test]
    fn casts_narrow_and_extend() {
        // 0x1FF as uint<8> is 0xFF.
        let e = Expr::Cast {
            expr: Box::new(Expr::value(Value::uint(0x1FF))),
            target: TypeId::uint8(),
        };
        assert_eq!(int_result(e), 0xFF);

        // -1 as int<8> keeps its sign through the 64-bit pattern.
        let e = Expr::Cast {
            expr: Box::new(Expr::value(Value::int(-1))),
            target: TypeId::int8(),
        };
        assert_eq!(int_result(e) as i64, -1);

        // Float truncates toward zero.
        let e = Expr::Cast {
            expr: Box::new(Expr::value(Value::float(2.9))),
            target: TypeId::uint32(),
        };
        assert_eq!(int_result(e), 2);

        // Nonzero to bool.
        let e = Expr::Cast {
            expr: Box::new(Expr::value(Value::uint(42))),
            target: TypeId::bool_(8),
        };
        assert!(bool_result(e));
    }

    #[test]
    fn cast_to_invalid_code_point_fails() {
        let e = Expr::Cast {
            expr: Box::new(Expr::value(Value::uint(0xD800))),
            target: TypeId::utf_char(32, Endian::Host),
        };
        assert_eq!(eval(&e), Expr::Error(ExprError::BadOperand));
    }

    #[test]
    fn unknown_identifier_is_bad_operand() {
        let e = Expr::Ident(ScopedName::new("missing"));
        assert_eq!(eval(&e), Expr::Error(ExprError::BadOperand));
    }

    #[test]
    fn errors_propagate_as_values() {
        let inner = bin(
            BinaryOp::Div,
            Expr::value(Value::uint(1)),
            Expr::value(Value::uint(0)),
        );
        let outer = bin(BinaryOp::Add, inner, Expr::value(Value::uint(5)));
        assert_eq!(eval(&outer), Expr::Error(ExprError::DivByZero));
    }
}
