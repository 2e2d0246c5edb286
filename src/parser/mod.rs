//! Project JSON loader and the JSON-backed content database.
//!
//! The input file is expected to carry two top-level arrays:
//!
//!   • `scripts` – `{ name, source }` entries to convert
//!   • `records` – `{ name, kind, id, variables? }` database rows
//!
//! A missing array is reported as an error; an empty one is fine.

use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;

use crate::model::{Handle, RawProject, RecordEntry, RecordKind, ScriptEntry};
use crate::processor::resolver::ContentDb;

/// Parse the whole input JSON string into `RawProject`.
pub fn load_from_json(json: &str) -> Result<RawProject> {
    // Grab the entire file as a dynamic value first.
    let root: Value = serde_json::from_str(json)?;

    let scripts_val = root
        .get("scripts")
        .ok_or_else(|| anyhow!("file has no `scripts` array"))?;
    let scripts: Vec<ScriptEntry> = serde_json::from_value(scripts_val.clone())?;

    let records_val = root
        .get("records")
        .ok_or_else(|| anyhow!("file has no `records` array"))?;
    let records: Vec<RecordEntry> = serde_json::from_value(records_val.clone())?;

    Ok(RawProject { scripts, records })
}

/// Content database built from the project's `records` array.
/// Read-only once built, safe to share across conversions.
pub struct JsonContentDb {
    records: Vec<RecordEntry>,
    // (lower-cased name, kind) -> position in `records`
    by_name: HashMap<(String, RecordKind), usize>,
    by_handle: HashMap<Handle, usize>,
}

impl JsonContentDb {
    pub fn new(records: Vec<RecordEntry>) -> Self {
        let mut by_name = HashMap::new();
        let mut by_handle = HashMap::new();
        for (pos, rec) in records.iter().enumerate() {
            by_name.insert((rec.name.to_ascii_lowercase(), rec.kind), pos);
            by_handle.insert(Handle(rec.id), pos);
        }
        Self {
            records,
            by_name,
            by_handle,
        }
    }
}

impl ContentDb for JsonContentDb {
    fn lookup(&self, name: &str, kind: RecordKind) -> Option<Handle> {
        self.by_name
            .get(&(name.to_ascii_lowercase(), kind))
            .map(|&pos| Handle(self.records[pos].id))
    }

    fn lookup_any(&self, name: &str) -> Option<Handle> {
        RecordKind::ALL.iter().find_map(|k| self.lookup(name, *k))
    }

    fn name_of(&self, handle: Handle) -> Option<&str> {
        self.by_handle
            .get(&handle)
            .map(|&pos| self.records[pos].name.as_str())
    }

    fn variables_of(&self, handle: Handle) -> Option<&[String]> {
        self.by_handle
            .get(&handle)
            .map(|&pos| self.records[pos].variables.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "scripts": [
            { "name": "chest01_script", "source": "begin\nenable\nend" }
        ],
        "records": [
            { "name": "player", "kind": "actor", "id": 20 },
            { "name": "chest01", "kind": "object", "id": 4097,
              "variables": ["opened"] }
        ]
    }"#;

    #[test]
    fn test_load_project() {
        let raw = load_from_json(SAMPLE).expect("valid json");
        assert_eq!(raw.scripts.len(), 1);
        assert_eq!(raw.scripts[0].name, "chest01_script");
        assert_eq!(raw.records.len(), 2);
    }

    #[test]
    fn test_missing_scripts_array() {
        let err = load_from_json(r#"{ "records": [] }"#).unwrap_err();
        assert!(err.to_string().contains("`scripts`"));
    }

    #[test]
    fn test_db_lookup() {
        let raw = load_from_json(SAMPLE).unwrap();
        let db = JsonContentDb::new(raw.records);

        assert_eq!(db.lookup("PLAYER", RecordKind::Actor), Some(Handle(20)));
        assert_eq!(db.lookup("player", RecordKind::Sound), None);
        assert_eq!(db.lookup_any("player"), Some(Handle(20)));
        assert_eq!(db.name_of(Handle(4097)), Some("chest01"));
        assert_eq!(
            db.variables_of(Handle(4097)),
            Some(vec!["opened".to_string()].as_slice())
        );
    }
}
