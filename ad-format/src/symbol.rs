// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of ad, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

use std::collections::BTreeMap;

use crate::{
    diag::Span,
    expr::{Scope, Value},
    sname::ScopedName,
    types::Type,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    /// A declaration that binds a value at run time.
    Decl,
    /// A type name.
    Type,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SymbolData {
    Decl {
        ty: Type,
        /// Bound by the interpreter once the field has been read.
        value: Option<Value>,
    },
    Type(Type),
}

/// The per-scope record attached to a symbol. A symbol shadowed by nested
/// scopes has one of these per shadowing scope; lookups see the top one.
#[derive(Clone, Debug, PartialEq)]
pub struct SymbolInfo {
    pub depth: u32,
    pub kind: SymbolKind,
    pub first_loc: Span,
    pub used: bool,
    pub data: SymbolData,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    name: ScopedName,
    /// Stack of per-scope records; the last is the visible one.
    infos: Vec<SymbolInfo>,
}

impl Symbol {
    #[inline(always)]
    pub fn name(&self) -> &ScopedName {
        &self.name
    }

    #[inline(always)]
    pub fn top(&self) -> Option<&SymbolInfo> {
        self.infos.last()
    }

    #[inline(always)]
    fn top_mut(&mut self) -> Option<&mut SymbolInfo> {
        self.infos.last_mut()
    }
}

/// Names to per-scope binding stacks, ordered by scoped-name comparison.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    map: BTreeMap<ScopedName, Symbol>,
    depth: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// The count of currently open scopes.
    #[inline(always)]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn open_scope(&mut self) {
        self.depth += 1;
    }

    /// Pops every record pushed at the closing depth, then drops the depth.
    /// Symbols left with no records disappear entirely.
    pub fn close_scope(&mut self) {
        debug_assert!(self.depth > 0, "no scope open");
        let depth = self.depth;
        self.map.retain(|_, sym| {
            while sym.infos.last().is_some_and(|info| info.depth == depth) {
                sym.infos.pop();
            }
            !sym.infos.is_empty()
        });
        self.depth -= 1;
    }

    /// Binds `name` at the current depth. When the symbol already has a
    /// record at this depth or deeper, that record is returned unchanged;
    /// otherwise a new shadowing record is pushed with `loc` as the place
    /// of first use.
    pub fn add(
        &mut self,
        name: ScopedName,
        kind: SymbolKind,
        data: SymbolData,
        loc: Span,
    ) -> &mut SymbolInfo {
        let depth = self.depth;
        let sym = self.map.entry(name.clone()).or_insert_with(|| Symbol {
            name,
            infos: Vec::new(),
        });
        if !sym.infos.last().is_some_and(|info| info.depth >= depth) {
            sym.infos.push(SymbolInfo {
                depth,
                kind,
                first_loc: loc,
                used: false,
                data,
            });
        }
        sym.top_mut().unwrap()
    }

    pub fn find(&self, name: &ScopedName) -> Option<&SymbolInfo> {
        self.map.get(name).and_then(Symbol::top)
    }

    pub fn find_mut(&mut self, name: &ScopedName) -> Option<&mut SymbolInfo> {
        self.map.get_mut(name).and_then(Symbol::top_mut)
    }

    /// Finds the unique symbol whose local name is `local`, at any scope.
    pub fn find_by_local_name(&self, local: &str) -> Option<(&ScopedName, &SymbolInfo)> {
        let mut found = None;
        for (name, sym) in &self.map {
            if name.local_name() == local {
                if found.is_some() {
                    return None;
                }
                found = sym.top().map(|info| (name, info));
            }
        }
        found
    }

    /// In-order visit by scoped-name comparison.
    pub fn visit<F: FnMut(&ScopedName, &SymbolInfo)>(&self, mut f: F) {
        for (name, sym) in &self.map {
            if let Some(info) = sym.top() {
                f(name, info);
            }
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &ScopedName> {
        self.map.keys()
    }

    /// Binds or updates the run-time value of a declaration.
    pub fn bind_value(&mut self, name: &ScopedName, ty: Type, value: Value, loc: Span) {
        let info = self.add(
            name.clone(),
            SymbolKind::Decl,
            SymbolData::Decl {
                ty: ty.clone(),
                value: None,
            },
            loc,
        );
        info.data = SymbolData::Decl {
            ty,
            value: Some(value),
        };
    }
}

impl Scope for SymbolTable {
    fn lookup(&self, name: &ScopedName) -> Option<Value> {
        let info = match self.find(name) {
            Some(info) => Some(info),
            // An unqualified reference can name a member bound inside an
            // enclosing aggregate.
            None if name.len() == 1 => self
                .find_by_local_name(name.local_name())
                .map(|(_, info)| info),
            None => None,
        }?;
        match &info.data {
            SymbolData::Decl {
                value: Some(value), ..
            } => Some(value.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeId;

    fn decl_data(v: u64) -> SymbolData {
        SymbolData::Decl {
            ty: Type::Scalar(TypeId::uint32()),
            value: Some(Value::uint(v)),
        }
    }

    #[test]
    fn close_scope_restores_prior_binding() {
        let mut table = SymbolTable::new();
        let name = ScopedName::new("x");
        table.add(name.clone(), SymbolKind::Decl, decl_data(1), Span::new(0, 1));
        let before = table.find(&name).cloned();

        table.open_scope();
        table.add(name.clone(), SymbolKind::Decl, decl_data(2), Span::new(5, 6));
        assert_eq!(table.find(&name).unwrap().depth, 1);
        table.close_scope();

        assert_eq!(table.find(&name).cloned(), before);
    }

    #[test]
    fn add_at_same_depth_does_not_shadow() {
        let mut table = SymbolTable::new();
        let name = ScopedName::new("x");
        table.add(name.clone(), SymbolKind::Decl, decl_data(1), Span::new(0, 1));
        let info = table.add(name.clone(), SymbolKind::Decl, decl_data(2), Span::new(9, 10));
        // The original record survives, location included.
        assert_eq!(info.first_loc, Span::new(0, 1));
        assert_eq!(info.data, decl_data(1));
    }

    #[test]
    fn scope_only_symbols_vanish_on_close() {
        let mut table = SymbolTable::new();
        let name = ScopedName::new("tmp");
        table.open_scope();
        table.add(name.clone(), SymbolKind::Decl, decl_data(3), Span::new(0, 3));
        table.close_scope();
        assert!(table.find(&name).is_none());
    }

    #[test]
    fn visit_is_ordered_by_name() {
        let mut table = SymbolTable::new();
        for n in ["b", "a::x", "a", "c"] {
            table.add(
                ScopedName::from(n),
                SymbolKind::Decl,
                decl_data(0),
                Span::default(),
            );
        }
        let mut seen = Vec::new();
        table.visit(|name, _| seen.push(name.to_string()));
        assert_eq!(seen, ["a", "a::x", "b", "c"]);
    }

    #[test]
    fn lookup_falls_back_to_local_name() {
        let mut table = SymbolTable::new();
        let member = ScopedName::from("hdr::tag");
        table.bind_value(
            &member,
            Type::Scalar(TypeId::uint8()),
            Value::uint(7),
            Span::default(),
        );
        let flat = ScopedName::new("tag");
        assert_eq!(table.lookup(&flat), Some(Value::uint(7)));
    }
}
