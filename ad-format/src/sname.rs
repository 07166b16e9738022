// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of ad, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

use std::fmt::{self, Display, Formatter};

use crate::token::Keyword;

/// A qualified identifier: a non-empty sequence of components joined by
/// `::`. The last component is the local name; everything before it is the
/// scope. Ordering is lexicographic per component, which is what keeps the
/// symbol table's in-order visits grouped by scope.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopedName {
    parts: Vec<String>,
}

impl ScopedName {
    pub fn new<S: Into<String>>(local: S) -> Self {
        ScopedName {
            parts: vec![local.into()],
        }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn push<S: Into<String>>(&mut self, component: S) {
        self.parts.push(component.into());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.parts.pop()
    }

    /// The last component.
    pub fn local_name(&self) -> &str {
        self.parts.last().map_or("", |s| s)
    }

    /// All components but the last, or `None` for an unqualified name.
    pub fn scope_name(&self) -> Option<ScopedName> {
        if self.parts.len() < 2 {
            return None;
        }
        Some(ScopedName {
            parts: self.parts[..self.parts.len() - 1].to_vec(),
        })
    }

    /// `self` extended by `component`, for naming members of an aggregate.
    pub fn join<S: Into<String>>(&self, component: S) -> ScopedName {
        let mut name = self.clone();
        name.push(component);
        name
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|s| s.as_str())
    }

    /// Parses a scoped name from the front of `s`, returning it and the byte
    /// count consumed. Stops before a component that is a keyword or before
    /// the first non-identifier character; returns `None` when no component
    /// can be taken at all.
    pub fn parse(s: &str) -> Option<(ScopedName, usize)> {
        let bytes = s.as_bytes();
        let first = ident_len(bytes);
        if first == 0 || Keyword::from_ident(&bytes[..first]).is_some() {
            return None;
        }
        let mut parts = vec![s[..first].to_owned()];
        let mut pos = first;
        while bytes[pos..].starts_with(b"::") {
            let next = pos + 2;
            let len = ident_len(&bytes[next..]);
            if len == 0 || Keyword::from_ident(&bytes[next..next + len]).is_some() {
                break;
            }
            parts.push(s[next..next + len].to_owned());
            pos = next + len;
        }
        Some((ScopedName { parts }, pos))
    }
}

/// The length of the identifier at the front of `bytes`, or 0.
fn ident_len(bytes: &[u8]) -> usize {
    let mut len = 0;
    for &b in bytes {
        let ok = if len == 0 {
            b.is_ascii_alphabetic() || b == b'_'
        } else {
            b.is_ascii_alphanumeric() || b == b'_'
        };
        if !ok {
            break;
        }
        len += 1;
    }
    len
}

impl Display for ScopedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str("::")?;
            }
            f.write_str(part)?;
        }
        Ok(())
    }
}

impl From<&str> for ScopedName {
    fn from(s: &str) -> Self {
        ScopedName {
            parts: s.split("::").map(str::to_owned).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_display_round_trip() {
        for text in ["x", "hdr::len", "a::b::c", "_tag9"] {
            let (name, used) = ScopedName::parse(text).unwrap();
            assert_eq!(used, text.len());
            assert_eq!(name.to_string(), text);
        }
    }

    #[test]
    fn parse_stops_at_keyword_component() {
        let (name, used) = ScopedName::parse("hdr::switch").unwrap();
        assert_eq!(name.to_string(), "hdr");
        assert_eq!(used, 3);
    }

    #[test]
    fn parse_stops_at_non_identifier() {
        let (name, used) = ScopedName::parse("len)").unwrap();
        assert_eq!(name.to_string(), "len");
        assert_eq!(used, 3);
    }

    #[test]
    fn parse_rejects_immediate_keyword() {
        assert_eq!(ScopedName::parse("break"), None);
        assert_eq!(ScopedName::parse("0abc"), None);
        assert_eq!(ScopedName::parse(""), None);
    }

    #[test]
    fn scope_and_local_split() {
        let name = ScopedName::from("s::t::x");
        assert_eq!(name.local_name(), "x");
        assert_eq!(name.scope_name().unwrap().to_string(), "s::t");
        assert_eq!(ScopedName::new("x").scope_name(), None);
    }

    #[test]
    fn ordering_is_componentwise() {
        let a = ScopedName::from("a::z");
        let b = ScopedName::from("aa::b");
        // "a" < "aa" as components, though "a::z" > "aa::b" as flat strings.
        assert!(a < b);
    }
}
