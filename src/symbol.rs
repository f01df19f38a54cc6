use std::fmt;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;

// Symbol table of label -> memory address, insertion order preserved so
// backpatching is deterministic.
pub(crate) type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Symbolic name for an address inside the emitted image.
///
/// Names starting with `__` are reserved for labels generated by the macro
/// layer; user programs cannot define them.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Label(String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Label(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn is_reserved(&self) -> bool {
        self.0.starts_with("__")
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Label::new(value)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tracks label bindings and pending forward references during assembly.
pub(crate) struct SymbolTable {
    /// label -> bound address
    bindings: FxMap<Label, u16>,
    /// label -> patch sites (byte offsets of address fields awaiting the
    /// label's final address)
    pending: FxMap<Label, Vec<usize>>,
    /// Counter backing `uniq_label`
    uniq: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            bindings: IndexMap::with_hasher(FxBuildHasher::default()),
            pending: IndexMap::with_hasher(FxBuildHasher::default()),
            uniq: 0,
        }
    }

    /// Bind `label` to `addr`, returning the previous binding if any.
    pub fn bind(&mut self, label: Label, addr: u16) -> Option<u16> {
        self.bindings.insert(label, addr)
    }

    pub fn lookup(&self, label: &Label) -> Option<u16> {
        self.bindings.get(label).copied()
    }

    /// Resolve `label` for emission at byte offset `site`. An unbound label
    /// is recorded as a pending patch site and yields `None`; the caller
    /// emits a placeholder to be overwritten at finalization.
    pub fn resolve(&mut self, label: &Label, site: usize) -> Option<u16> {
        if let Some(addr) = self.lookup(label) {
            return Some(addr);
        }
        self.pending.entry(label.clone()).or_default().push(site);
        None
    }

    /// Consume the pending patch-site lists for finalization.
    pub fn take_pending(&mut self) -> FxMap<Label, Vec<usize>> {
        std::mem::take(&mut self.pending)
    }

    /// Create a fresh label for an internal branch target. Macro expansions
    /// rely on these never colliding, across arbitrary nesting.
    pub fn uniq_label(&mut self) -> Label {
        self.uniq += 1;
        Label::new(format!("__label_{:04}", self.uniq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniq_labels_are_distinct() {
        let mut table = SymbolTable::new();
        assert_ne!(table.uniq_label(), table.uniq_label());
    }

    #[test]
    fn uniq_labels_are_reserved() {
        let mut table = SymbolTable::new();
        assert!(table.uniq_label().is_reserved());
        assert!(!Label::new("loop").is_reserved());
    }

    #[test]
    fn resolve_bound_label_is_immediate() {
        let mut table = SymbolTable::new();
        let label = Label::new("foo");
        table.bind(label.clone(), 1234);
        assert_eq!(table.resolve(&label, 0), Some(1234));
        assert!(table.take_pending().is_empty());
    }

    #[test]
    fn resolve_unbound_label_records_site() {
        let mut table = SymbolTable::new();
        let label = Label::new("foo");
        assert_eq!(table.resolve(&label, 16), None);
        assert_eq!(table.resolve(&label, 40), None);
        let pending = table.take_pending();
        assert_eq!(pending.get(&label), Some(&vec![16, 40]));
    }

    #[test]
    fn bind_reports_previous_binding() {
        let mut table = SymbolTable::new();
        let label = Label::new("foo");
        assert_eq!(table.bind(label.clone(), 8), None);
        assert_eq!(table.bind(label, 24), Some(8));
    }
}
