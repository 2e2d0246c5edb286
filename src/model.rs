//! Data structures shared across the pipeline.
//!
//! We keep the input in very “raw” form so later stages (compiler,
//! writers) can decide what they need.

use serde::Deserialize;

use crate::processor::diag::Diagnostics;

/// Opaque runtime identifier for an external game object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub u32);

/// Category of a content-database record, used as a resolution hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Object,
    Actor,
    Sound,
    Quest,
    Cell,
    Script,
    Global,
}

impl RecordKind {
    /// Search order for the kind-agnostic fallback lookup.
    pub const ALL: &'static [RecordKind] = &[
        RecordKind::Object,
        RecordKind::Actor,
        RecordKind::Sound,
        RecordKind::Quest,
        RecordKind::Cell,
        RecordKind::Script,
        RecordKind::Global,
    ];
}

/// One script as it appears in the input project file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptEntry {
    pub name: String,
    pub source: String,
}

/// One content-database record from the input project file.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordEntry {
    pub name: String,
    pub kind: RecordKind,
    pub id: u32,
    /// Local variables of the record's own script, if it has one.
    /// Serves cross-script `object.variable` resolution.
    #[serde(default)]
    pub variables: Vec<String>,
}

/// Entire project as it comes out of the JSON loader.
#[derive(Debug, Clone)]
pub struct RawProject {
    pub scripts: Vec<ScriptEntry>,
    pub records: Vec<RecordEntry>,
}

/// All artifacts of one script conversion.
#[derive(Debug, Clone)]
pub struct ConvertedScript {
    pub name: String,
    /// Translated source text in the target dialect.
    pub text: String,
    /// Compiled byte buffer (empty when the conversion ended fatal).
    pub code: Vec<u8>,
    /// Ordered external handles, 1-based runtime indices.
    pub refs: Vec<Handle>,
    pub diag: Diagnostics,
}

impl ConvertedScript {
    pub fn failed(&self) -> bool {
        self.diag.is_fatal()
    }
}

/// Fully processed output handed to `writer`.
#[derive(Debug, Clone)]
pub struct ProcessedProject {
    pub scripts: Vec<ConvertedScript>,
}
