//! Symbol interning.
//!
//! Identifiers, names and cue labels are interned once and compared as plain
//! u32s everywhere else. The interner must be consulted to get the text back.

use std::fmt;
use std::hash::{Hash, Hasher};

use string_interner::{backend::StringBackend, DefaultSymbol, StringInterner};

use crate::span::Span;

/// An interned string symbol. Cheap to copy and compare.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(Option<DefaultSymbol>);

impl Symbol {
    /// A dummy symbol for uninitialized or placeholder values.
    pub const DUMMY: Symbol = Symbol(None);

    /// Returns true if this is a dummy symbol.
    #[inline]
    pub const fn is_dummy(self) -> bool {
        self.0.is_none()
    }

    /// Returns the raw u32 value of this symbol.
    #[inline]
    pub fn as_u32(self) -> u32 {
        use string_interner::Symbol as _;
        self.0.map(|s| s.to_usize() as u32).unwrap_or(u32::MAX)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dummy() {
            write!(f, "Symbol(DUMMY)")
        } else {
            write!(f, "Symbol({})", self.as_u32())
        }
    }
}

/// The central registry for all interned strings.
#[derive(Clone)]
pub struct SymbolInterner {
    interner: StringInterner<StringBackend<DefaultSymbol>>,
}

impl SymbolInterner {
    /// Creates a new empty interner.
    pub fn new() -> Self {
        Self {
            interner: StringInterner::new(),
        }
    }

    /// Interns a string, returning its symbol.
    #[inline]
    pub fn intern(&mut self, string: &str) -> Symbol {
        Symbol(Some(self.interner.get_or_intern(string)))
    }

    /// Looks up a string without interning it.
    #[inline]
    pub fn get(&self, string: &str) -> Option<Symbol> {
        self.interner.get(string).map(|s| Symbol(Some(s)))
    }

    /// Resolves a symbol to its string. `None` for dummy symbols.
    #[inline]
    pub fn resolve(&self, symbol: Symbol) -> Option<&str> {
        symbol.0.and_then(|s| self.interner.resolve(s))
    }

    /// Resolves a symbol, falling back to a placeholder for dummies.
    #[inline]
    pub fn display(&self, symbol: Symbol) -> &str {
        self.resolve(symbol).unwrap_or("<unknown>")
    }

    /// Returns the number of interned strings.
    #[inline]
    pub fn len(&self) -> usize {
        self.interner.len()
    }

    /// Returns true if no strings have been interned.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.interner.is_empty()
    }
}

impl Default for SymbolInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SymbolInterner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolInterner")
            .field("len", &self.interner.len())
            .finish()
    }
}

/// An identifier: a symbol plus the span where it appears.
#[derive(Clone, Copy)]
pub struct Ident {
    /// The interned symbol for this identifier.
    pub symbol: Symbol,
    /// The source span where this identifier appears.
    pub span: Span,
}

impl Ident {
    /// Creates a new identifier.
    #[inline]
    pub const fn new(symbol: Symbol, span: Span) -> Self {
        Self { symbol, span }
    }

    /// Resolves this identifier to its string.
    #[inline]
    pub fn as_str<'a>(&self, interner: &'a SymbolInterner) -> Option<&'a str> {
        interner.resolve(self.symbol)
    }
}

impl PartialEq for Ident {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
    }
}

impl Eq for Ident {}

impl Hash for Ident {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.symbol.hash(state);
    }
}

impl fmt::Debug for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ident({:?} @ {:?})", self.symbol, self.span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_dedup() {
        let mut interner = SymbolInterner::new();
        let a = interner.intern("hello");
        let b = interner.intern("world");
        let c = interner.intern("hello");

        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(interner.resolve(a), Some("hello"));
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn test_get_without_intern() {
        let mut interner = SymbolInterner::new();
        assert!(interner.get("abs").is_none());
        let sym = interner.intern("abs");
        assert_eq!(interner.get("abs"), Some(sym));
    }

    #[test]
    fn test_dummy() {
        let interner = SymbolInterner::new();
        assert!(Symbol::DUMMY.is_dummy());
        assert!(interner.resolve(Symbol::DUMMY).is_none());
        assert_eq!(interner.display(Symbol::DUMMY), "<unknown>");
    }

    #[test]
    fn test_ident_equality_ignores_span() {
        let mut interner = SymbolInterner::new();
        let sym = interner.intern("x");
        let a = Ident::new(sym, Span::from_u32(0, 1));
        let b = Ident::new(sym, Span::from_u32(10, 11));
        assert_eq!(a, b);
    }
}
