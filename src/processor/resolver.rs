//! Identifier resolution: script locals and content-database references.
//!
//! Resolution never fails hard. A miss comes back as `None`; the caller
//! records it and substitutes the zero placeholder so the rest of the
//! script still compiles.

use std::collections::HashMap;

use crate::model::{Handle, RecordKind};

use super::commands::VarType;

/// Read-only view of the content database, the one collaborator shared
/// between concurrent conversions.
pub trait ContentDb {
    /// Case-insensitive lookup within one record category.
    fn lookup(&self, name: &str, kind: RecordKind) -> Option<Handle>;
    /// Kind-agnostic fallback: search every category in `RecordKind::ALL` order.
    fn lookup_any(&self, name: &str) -> Option<Handle>;
    /// Reverse query: the record's editor name.
    fn name_of(&self, handle: Handle) -> Option<&str>;
    /// Local variables of the record's own script, for `obj.var` lookups.
    fn variables_of(&self, handle: Handle) -> Option<&[String]>;
}

/// Append-only table of declared locals; 1-based position is the
/// variable's runtime index.
#[derive(Debug, Default)]
pub struct LocalVars {
    entries: Vec<(VarType, String)>,
}

/// Outcome of a declaration; duplicates are the caller's warning, not
/// an error.
#[derive(Debug, PartialEq, Eq)]
pub enum Declared {
    Added(u16),
    Duplicate(u16),
}

impl LocalVars {
    pub fn declare(&mut self, ty: VarType, name: &str) -> Declared {
        if let Some(idx) = self.index_of(name) {
            return Declared::Duplicate(idx);
        }
        self.entries.push((ty, name.to_string()));
        Declared::Added(self.entries.len() as u16)
    }

    /// Linear case-insensitive scan; 1-based index. Small N, no index needed.
    pub fn index_of(&self, name: &str) -> Option<u16> {
        self.entries
            .iter()
            .position(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|p| p as u16 + 1)
    }

    pub fn entries(&self) -> &[(VarType, String)] {
        &self.entries
    }
}

/// Ordered, deduplicated external handles; 1-based position is the
/// reference's runtime index.
#[derive(Debug, Default)]
pub struct RefTable {
    handles: Vec<Handle>,
    // lower-cased resolving identifier -> index, fast path for repeats
    by_name: HashMap<String, u16>,
    by_handle: HashMap<Handle, u16>,
}

impl RefTable {
    /// Insert if absent, return the stable 1-based index either way.
    pub fn intern(&mut self, name: &str, handle: Handle) -> u16 {
        if let Some(&idx) = self.by_handle.get(&handle) {
            self.by_name.entry(name.to_ascii_lowercase()).or_insert(idx);
            return idx;
        }
        self.handles.push(handle);
        let idx = self.handles.len() as u16;
        self.by_name.insert(name.to_ascii_lowercase(), idx);
        self.by_handle.insert(handle, idx);
        idx
    }

    pub fn known(&self, name: &str) -> Option<u16> {
        self.by_name.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn handle_at(&self, idx: u16) -> Option<Handle> {
        self.handles.get((idx as usize).checked_sub(1)?).copied()
    }

    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }
}

/// The resolution layer one compiling instance owns.
pub struct Resolver<'a> {
    db: &'a dyn ContentDb,
    pub locals: LocalVars,
    pub refs: RefTable,
}

impl<'a> Resolver<'a> {
    pub fn new(db: &'a dyn ContentDb) -> Self {
        Self {
            db,
            locals: LocalVars::default(),
            refs: RefTable::default(),
        }
    }

    pub fn resolve_local(&self, name: &str) -> Option<u16> {
        self.locals.index_of(name)
    }

    /// Resolve an external identifier and intern it into the reference
    /// table. `hint` narrows the search; on a miss we fall back to the
    /// kind-agnostic search before giving up.
    pub fn resolve_external(&mut self, name: &str, hint: Option<RecordKind>) -> Option<u16> {
        if let Some(idx) = self.refs.known(name) {
            return Some(idx);
        }
        let handle = match hint {
            Some(kind) => self
                .db
                .lookup(name, kind)
                .or_else(|| self.db.lookup_any(name)),
            None => self.db.lookup_any(name),
        }?;
        Some(self.refs.intern(name, handle))
    }

    /// Cross-script lookup `obj.var`: the object's handle index plus the
    /// 1-based position of `var` among that object's own script locals.
    pub fn resolve_member(&mut self, obj: &str, var: &str) -> Option<(u16, u16)> {
        let ref_idx = self.resolve_external(obj, None)?;
        let handle = self.refs.handle_at(ref_idx)?;
        let vars = self.db.variables_of(handle)?;
        let var_idx = vars
            .iter()
            .position(|v| v.eq_ignore_ascii_case(var))
            .map(|p| p as u16 + 1)?;
        Some((ref_idx, var_idx))
    }

    /// Target-dialect spelling of a resolved reference.
    pub fn display_name(&self, ref_idx: u16) -> Option<&str> {
        self.db.name_of(self.refs.handle_at(ref_idx)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Tiny in-memory database used across the processor tests.
    pub struct FakeDb {
        pub records: Vec<(String, RecordKind, Handle, Vec<String>)>,
    }

    impl FakeDb {
        pub fn sample() -> Self {
            Self {
                records: vec![
                    ("player".into(), RecordKind::Actor, Handle(0x14), vec![]),
                    (
                        "gold_001".into(),
                        RecordKind::Object,
                        Handle(0x0F),
                        vec![],
                    ),
                    (
                        "chest01".into(),
                        RecordKind::Object,
                        Handle(0x1001),
                        vec!["opened".into(), "trapped".into()],
                    ),
                    (
                        "fx_creak".into(),
                        RecordKind::Sound,
                        Handle(0x2001),
                        vec![],
                    ),
                    (
                        "mq_rescue".into(),
                        RecordKind::Quest,
                        Handle(0x3001),
                        vec![],
                    ),
                ],
            }
        }
    }

    impl ContentDb for FakeDb {
        fn lookup(&self, name: &str, kind: RecordKind) -> Option<Handle> {
            self.records
                .iter()
                .find(|(n, k, _, _)| *k == kind && n.eq_ignore_ascii_case(name))
                .map(|(_, _, h, _)| *h)
        }

        fn lookup_any(&self, name: &str) -> Option<Handle> {
            RecordKind::ALL.iter().find_map(|k| self.lookup(name, *k))
        }

        fn name_of(&self, handle: Handle) -> Option<&str> {
            self.records
                .iter()
                .find(|(_, _, h, _)| *h == handle)
                .map(|(n, _, _, _)| n.as_str())
        }

        fn variables_of(&self, handle: Handle) -> Option<&[String]> {
            self.records
                .iter()
                .find(|(_, _, h, _)| *h == handle)
                .map(|(_, _, _, v)| v.as_slice())
        }
    }

    #[test]
    fn test_local_indices_stable() {
        let mut locals = LocalVars::default();
        assert_eq!(locals.declare(VarType::Short, "a"), Declared::Added(1));
        assert_eq!(locals.declare(VarType::Long, "b"), Declared::Added(2));
        assert_eq!(locals.declare(VarType::Float, "c"), Declared::Added(3));
        assert_eq!(locals.index_of("b"), Some(2));
        assert_eq!(locals.index_of("B"), Some(2));
        assert_eq!(locals.index_of("missing"), None);
    }

    #[test]
    fn test_duplicate_local_is_reported_not_lost() {
        let mut locals = LocalVars::default();
        locals.declare(VarType::Short, "count");
        assert_eq!(
            locals.declare(VarType::Long, "Count"),
            Declared::Duplicate(1)
        );
        assert_eq!(locals.entries().len(), 1);
    }

    #[test]
    fn test_external_dedup() {
        let db = FakeDb::sample();
        let mut r = Resolver::new(&db);
        let first = r.resolve_external("gold_001", Some(RecordKind::Object));
        let second = r.resolve_external("GOLD_001", None);
        assert_eq!(first, Some(1));
        assert_eq!(second, Some(1));
        assert_eq!(r.refs.handles(), &[Handle(0x0F)]);
    }

    #[test]
    fn test_hint_miss_falls_back_to_any() {
        let db = FakeDb::sample();
        let mut r = Resolver::new(&db);
        // wrong hint, still found through the fallback search
        assert_eq!(r.resolve_external("player", Some(RecordKind::Sound)), Some(1));
        assert_eq!(r.refs.handle_at(1), Some(Handle(0x14)));
    }

    #[test]
    fn test_unresolved_returns_none() {
        let db = FakeDb::sample();
        let mut r = Resolver::new(&db);
        assert_eq!(r.resolve_external("nonsuch", None), None);
        assert!(r.refs.handles().is_empty());
    }

    #[test]
    fn test_member_resolution() {
        let db = FakeDb::sample();
        let mut r = Resolver::new(&db);
        assert_eq!(r.resolve_member("chest01", "trapped"), Some((1, 2)));
        assert_eq!(r.resolve_member("chest01", "nonsuch"), None);
        assert_eq!(r.resolve_member("player", "opened"), None);
    }
}
