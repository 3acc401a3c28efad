// This module provides arena-based compilation session management using the bumpalo
// crate. CompilationSession is the central hub shared by every function compiled in one
// translation unit: it owns the arena, the symbol interner, the string-literal pool,
// and the unit-global label counter. All interned data is allocated in the arena and
// shares the session lifetime. The two tables and the counter are append-only, which
// is what makes per-function compilation order irrelevant; the whole pipeline is
// single-threaded, so interior mutability is plain RefCell/Cell. SessionStats tracks
// coarse metrics (functions lowered, nodes emitted, labels allocated) surfaced through
// log output by the irdump binary.

//! Arena-based compilation session management.
//!
//! The session replaces what an older design would keep in process globals:
//! the label counter, the interned-symbol table, and the string-literal pool.
//! Threading it explicitly keeps lowering re-entrant and leaves one obvious
//! unit of parallelism (a whole function) if that is ever wanted.

use std::cell::{Cell, RefCell};
use std::fmt;

use bumpalo::Bump;
use hashbrown::HashMap;

/// An interned identifier (function names, global names, string-literal labels).
///
/// Symbols are cheap to copy and compare; the session resolves them back to
/// their text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(pub u32);

/// A synthetic code label.
///
/// Produced by the session's monotonically increasing counter, unique for the
/// whole translation unit, never reused. Prints as `.L{n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".L{}", self.0)
    }
}

/// Session statistics for debugging and logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionStats {
    pub functions_lowered: u32,
    pub nodes_emitted: u64,
    pub labels_allocated: u32,
}

struct SymbolTable<'arena> {
    map: HashMap<&'arena str, Symbol>,
    names: Vec<&'arena str>,
}

struct StringPool<'arena> {
    map: HashMap<&'arena [u8], Symbol>,
    entries: Vec<(Symbol, &'arena [u8])>,
}

/// Arena-based compilation session.
///
/// Owns everything whose lifetime spans the translation unit: interned symbol
/// names, string-literal bytes, and the label counter. Per-function state
/// (the IR list itself) lives in [`crate::ir::IrFunction`] instead and is
/// handed to the emitter when this tier is done with it.
pub struct CompilationSession<'arena> {
    arena: &'arena Bump,
    symbols: RefCell<SymbolTable<'arena>>,
    strings: RefCell<StringPool<'arena>>,
    next_label: Cell<u32>,
    stats: RefCell<SessionStats>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session backed by the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            symbols: RefCell::new(SymbolTable {
                map: HashMap::new(),
                names: Vec::new(),
            }),
            strings: RefCell::new(StringPool {
                map: HashMap::new(),
                entries: Vec::new(),
            }),
            next_label: Cell::new(0),
            stats: RefCell::new(SessionStats::default()),
        }
    }

    /// Intern a name, returning its stable symbol.
    pub fn intern(&self, name: &str) -> Symbol {
        let mut table = self.symbols.borrow_mut();
        if let Some(&sym) = table.map.get(name) {
            return sym;
        }
        let stored: &'arena str = self.arena.alloc_str(name);
        let sym = Symbol(table.names.len() as u32);
        table.names.push(stored);
        table.map.insert(stored, sym);
        sym
    }

    /// Resolve a symbol back to its text.
    pub fn symbol_name(&self, sym: Symbol) -> &'arena str {
        self.symbols.borrow().names[sym.0 as usize]
    }

    /// Allocate a fresh code label from the unit-global counter.
    pub fn new_label(&self) -> LabelId {
        let id = self.next_label.get();
        self.next_label.set(id + 1);
        self.stats.borrow_mut().labels_allocated = id + 1;
        LabelId(id)
    }

    /// Intern a string literal, returning the symbol of its data label.
    ///
    /// Identical literals share one pool entry. The label name is minted from
    /// the label counter so it can never collide with a user symbol.
    pub fn intern_string_literal(&self, bytes: &[u8]) -> Symbol {
        {
            let pool = self.strings.borrow();
            if let Some(&sym) = pool.map.get(bytes) {
                return sym;
            }
        }
        let label = self.new_label();
        let sym = self.intern(&label.to_string());
        let stored: &'arena [u8] = self.arena.alloc_slice_copy(bytes);
        let mut pool = self.strings.borrow_mut();
        pool.entries.push((sym, stored));
        pool.map.insert(stored, sym);
        sym
    }

    /// The string-literal pool in interning order, for the data-section emitter.
    pub fn string_literals(&self) -> Vec<(Symbol, &'arena [u8])> {
        self.strings.borrow().entries.clone()
    }

    /// Snapshot of the session statistics.
    pub fn stats(&self) -> SessionStats {
        *self.stats.borrow()
    }

    pub(crate) fn note_function(&self) {
        self.stats.borrow_mut().functions_lowered += 1;
    }

    pub(crate) fn note_nodes(&self, n: u64) {
        self.stats.borrow_mut().nodes_emitted += n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable_and_deduplicated() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let a = session.intern("printf");
        let b = session.intern("main");
        let c = session.intern("printf");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(session.symbol_name(a), "printf");
        assert_eq!(session.symbol_name(b), "main");
    }

    #[test]
    fn labels_are_unique_and_sequential() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let l0 = session.new_label();
        let l1 = session.new_label();
        assert_ne!(l0, l1);
        assert_eq!(l0.to_string(), ".L0");
        assert_eq!(l1.to_string(), ".L1");
    }

    #[test]
    fn string_literals_share_pool_entries() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let a = session.intern_string_literal(b"hello\0");
        let b = session.intern_string_literal(b"world\0");
        let c = session.intern_string_literal(b"hello\0");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(session.string_literals().len(), 2);
    }
}
