// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of ad, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
    mem::size_of,
};

use paste::paste;
use static_assertions::const_assert;
use thiserror::Error;

use crate::{
    ast::{Case, Decl, Stmt},
    expr::Expr,
    sname::ScopedName,
};

/// Generates endian-dispatching readers for the primitive widths the
/// interpreter decodes.
macro_rules! read_prim {
    ($($ty:ty),* $(,)?) => {
        paste! {
            $(
                #[inline]
                pub fn [<read_ $ty>](self, bytes: [u8; size_of::<$ty>()]) -> $ty {
                    match self.resolve() {
                        Endian::Little => <$ty>::from_le_bytes(bytes),
                        _ => <$ty>::from_be_bytes(bytes),
                    }
                }
            )*
        }
    };
}

/// Generates the `uint8()`/`int8()`/... shorthand constructors.
macro_rules! int_ctors {
    ($($bits:literal),* $(,)?) => {
        paste! {
            $(
                #[inline(always)]
                pub const fn [<uint $bits>]() -> TypeId {
                    TypeId::int($bits, false, Endian::Host)
                }

                #[inline(always)]
                pub const fn [<int $bits>]() -> TypeId {
                    TypeId::int($bits, true, Endian::Host)
                }
            )*
        }
    };
}

/// Byte order of a multi-byte value. `Host` resolves to the byte order of
/// the machine running the interpreter.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Endian {
    #[default]
    Host,
    Little,
    Big,
}

impl Endian {
    /// `Host` resolved to a concrete order.
    #[inline]
    pub fn resolve(self) -> Endian {
        match self {
            Endian::Host if cfg!(target_endian = "big") => Endian::Big,
            Endian::Host => Endian::Little,
            e => e,
        }
    }

    read_prim!(u16, u32, u64, f32, f64);
}

impl Display for Endian {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Endian::Host => "",
            Endian::Little => "le",
            Endian::Big => "be",
        })
    }
}

/// The base kind of a type descriptor.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BaseKind {
    #[default]
    None,
    Error,
    Bool,
    Int,
    Float,
    /// A single Unicode character of some code-unit width.
    Char,
    /// A Unicode string of some code-unit width.
    Str,
    Struct,
    Switch,
}

/// A copyable type descriptor. The C original packed these fields into a
/// bit-exact identifier word; named fields keep the same O(1) queries
/// without the masking.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeId {
    pub kind: BaseKind,
    /// Bit size: the value width for `Bool`/`Int`/`Float`, the code-unit
    /// width for `Char`/`Str`, 0 for kinds without a size.
    pub bits: u8,
    /// `Int` only.
    pub signed: bool,
    pub endian: Endian,
    /// `Str` only: the value ends at a zero code unit instead of at a
    /// declared length.
    pub nul_terminated: bool,
}

// The descriptor must stay register-sized; it is copied into every value.
const_assert!(size_of::<TypeId>() <= 8);

impl TypeId {
    pub const fn none() -> TypeId {
        TypeId {
            kind: BaseKind::None,
            bits: 0,
            signed: false,
            endian: Endian::Host,
            nul_terminated: false,
        }
    }

    pub const fn bool_(bits: u8) -> TypeId {
        TypeId {
            kind: BaseKind::Bool,
            bits,
            signed: false,
            endian: Endian::Host,
            nul_terminated: false,
        }
    }

    pub const fn int(bits: u8, signed: bool, endian: Endian) -> TypeId {
        TypeId {
            kind: BaseKind::Int,
            bits,
            signed,
            endian,
            nul_terminated: false,
        }
    }

    pub const fn float(bits: u8, endian: Endian) -> TypeId {
        TypeId {
            kind: BaseKind::Float,
            bits,
            signed: false,
            endian,
            nul_terminated: false,
        }
    }

    pub const fn utf_char(unit_bits: u8, endian: Endian) -> TypeId {
        TypeId {
            kind: BaseKind::Char,
            bits: unit_bits,
            signed: false,
            endian,
            nul_terminated: false,
        }
    }

    pub const fn utf_str(unit_bits: u8, endian: Endian, nul_terminated: bool) -> TypeId {
        TypeId {
            kind: BaseKind::Str,
            bits: unit_bits,
            signed: false,
            endian,
            nul_terminated,
        }
    }

    int_ctors!(8, 16, 32, 64);

    #[inline(always)]
    pub fn size_bits(self) -> u32 {
        self.bits as u32
    }

    #[inline(always)]
    pub fn size_bytes(self) -> u32 {
        self.bits as u32 / 8
    }

    #[inline(always)]
    pub fn is_numeric(self) -> bool {
        matches!(self.kind, BaseKind::Bool | BaseKind::Int | BaseKind::Float)
    }

    #[inline(always)]
    pub fn is_utf(self) -> bool {
        matches!(self.kind, BaseKind::Char | BaseKind::Str)
    }

    /// Checks the descriptor invariants: one size per sized kind, UTF-8
    /// without an explicit byte order, termination only on strings.
    pub fn validate(self) -> Result<(), TypeIdError> {
        match self.kind {
            BaseKind::Bool | BaseKind::Int => {
                if !matches!(self.bits, 8 | 16 | 32 | 64) {
                    return Err(TypeIdError::BadBits(self.bits));
                }
            }
            BaseKind::Float => {
                if !matches!(self.bits, 32 | 64) {
                    return Err(TypeIdError::BadFloatBits(self.bits));
                }
            }
            BaseKind::Char | BaseKind::Str => {
                if !matches!(self.bits, 8 | 16 | 32) {
                    return Err(TypeIdError::BadUnitBits(self.bits));
                }
                if self.bits == 8 && self.endian != Endian::Host {
                    return Err(TypeIdError::Utf8Endian);
                }
            }
            _ => {}
        }
        if self.nul_terminated && self.kind != BaseKind::Str {
            return Err(TypeIdError::BadTermination);
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
pub enum TypeIdError {
    #[error("invalid bit size {0}; must be 8, 16, 32, or 64")]
    BadBits(u8),
    #[error("invalid float bit size {0}; must be 32 or 64")]
    BadFloatBits(u8),
    #[error("invalid code-unit size {0}; must be 8, 16, or 32")]
    BadUnitBits(u8),
    #[error("utf8 has no byte order")]
    Utf8Endian,
    #[error("only strings can be null-terminated")]
    BadTermination,
}

impl Display for TypeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.kind {
            BaseKind::None => f.write_str("none"),
            BaseKind::Error => f.write_str("error"),
            BaseKind::Bool => write!(f, "bool<{}>", self.bits),
            BaseKind::Int if self.signed => write!(f, "int<{}>{}", self.bits, self.endian),
            BaseKind::Int => write!(f, "uint<{}>{}", self.bits, self.endian),
            BaseKind::Float => write!(f, "float<{}>{}", self.bits, self.endian),
            BaseKind::Char | BaseKind::Str => {
                write!(f, "utf{}{}", self.bits, self.endian)
            }
            BaseKind::Struct => f.write_str("struct"),
            BaseKind::Switch => f.write_str("switch"),
        }
    }
}

/// A named aggregate: an ordered list of member declarations, read in
/// order.
#[derive(Clone, Debug, PartialEq)]
pub struct StructType {
    pub name: Option<String>,
    pub members: Vec<Decl>,
}

/// The payload of a `switch`: the controlling expression and its cases.
/// The statement form of `switch` carries this descriptor directly.
#[derive(Clone, Debug, PartialEq)]
pub struct SwitchType {
    pub expr: Expr,
    pub cases: Vec<Case>,
    pub default: Option<Vec<Stmt>>,
}

/// A full type: a scalar descriptor, or a descriptor with a payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Scalar(TypeId),
    Struct(StructType),
    Switch(SwitchType),
}

impl Type {
    /// The copyable descriptor for this type.
    pub fn id(&self) -> TypeId {
        match self {
            Type::Scalar(id) => *id,
            Type::Struct(_) => TypeId {
                kind: BaseKind::Struct,
                ..TypeId::none()
            },
            Type::Switch(_) => TypeId {
                kind: BaseKind::Switch,
                ..TypeId::none()
            },
        }
    }
}

/// The typedef registry: name to type, ordered by name, latest definition
/// winning.
#[derive(Clone, Debug, Default)]
pub struct Typedefs {
    map: BTreeMap<ScopedName, Type>,
}

impl Typedefs {
    pub fn new() -> Self {
        Typedefs::default()
    }

    /// Registers `ty` under `name`, replacing any earlier definition.
    pub fn insert(&mut self, name: ScopedName, ty: Type) {
        self.map.insert(name, ty);
    }

    pub fn get(&self, name: &ScopedName) -> Option<&Type> {
        self.map.get(name)
    }

    /// Looks up by a flat identifier: an exact single-component name, or
    /// failing that, the unique entry whose local name matches.
    pub fn get_flat(&self, name: &str) -> Option<&Type> {
        if let Some(ty) = self.map.get(&ScopedName::new(name)) {
            return Some(ty);
        }
        let mut found = None;
        for (key, ty) in &self.map {
            if key.local_name() == name {
                if found.is_some() {
                    return None;
                }
                found = Some(ty);
            }
        }
        found
    }

    /// In-order iteration by name.
    pub fn iter(&self) -> impl Iterator<Item = (&ScopedName, &Type)> {
        self.map.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &ScopedName> {
        self.map.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_queries() {
        let id = TypeId::int(16, false, Endian::Big);
        assert_eq!(id.size_bits(), 16);
        assert_eq!(id.size_bytes(), 2);
        assert!(id.is_numeric());
        assert!(!id.is_utf());
        assert_eq!(id.to_string(), "uint<16>be");
        assert_eq!(TypeId::uint8(), TypeId::int(8, false, Endian::Host));
    }

    #[test]
    fn validation_rejects_bad_descriptors() {
        assert_eq!(
            TypeId::int(24, false, Endian::Host).validate(),
            Err(TypeIdError::BadBits(24)),
        );
        assert_eq!(
            TypeId::float(16, Endian::Host).validate(),
            Err(TypeIdError::BadFloatBits(16)),
        );
        assert_eq!(
            TypeId::utf_char(8, Endian::Big).validate(),
            Err(TypeIdError::Utf8Endian),
        );
        let mut id = TypeId::uint32();
        id.nul_terminated = true;
        assert_eq!(id.validate(), Err(TypeIdError::BadTermination));
        assert_eq!(TypeId::utf_str(16, Endian::Little, true).validate(), Ok(()));
    }

    #[test]
    fn endian_readers() {
        assert_eq!(Endian::Little.read_u16([0x34, 0x12]), 0x1234);
        assert_eq!(Endian::Big.read_u16([0x12, 0x34]), 0x1234);
        assert_eq!(Endian::Big.read_u32([0, 0, 0x2A, 0]), 0x2A00);
        assert_eq!(Endian::Little.read_f64(42.5f64.to_le_bytes()), 42.5);
    }

    #[test]
    fn typedefs_replace_and_order() {
        let mut defs = Typedefs::new();
        defs.insert(ScopedName::new("word"), Type::Scalar(TypeId::uint16()));
        defs.insert(ScopedName::new("addr"), Type::Scalar(TypeId::uint32()));
        defs.insert(ScopedName::new("word"), Type::Scalar(TypeId::uint64()));

        let names: Vec<String> = defs.names().map(ScopedName::to_string).collect();
        assert_eq!(names, ["addr", "word"]);
        assert_eq!(
            defs.get_flat("word"),
            Some(&Type::Scalar(TypeId::uint64())),
        );
        assert_eq!(defs.get_flat("dword"), None);
    }
}
