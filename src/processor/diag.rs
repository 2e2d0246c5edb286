//! Per-script diagnostics: one fatal slot, free-text warnings and the
//! grouped unresolved-identifier tally used for the conversion report.

use thiserror::Error;

/// A fatal parse error. Aborts conversion of the current script only;
/// the batch driver keeps going with the remaining scripts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("unknown command `{found}` on line {line}")]
    UnknownCommand { found: String, line: u32 },

    #[error("malformed `{cmd}` on line {line}: expected {expected}, found {found}")]
    BadArgument {
        cmd: String,
        expected: String,
        found: String,
        line: u32,
    },

    #[error("`{closer}` on line {line} has no matching open block")]
    UnmatchedClose { closer: String, line: u32 },

    #[error("`begin` on line {line} but a begin block is already open")]
    NestedBegin { line: u32 },

    #[error("second `begin` on line {line}; a script has exactly one begin block")]
    SecondBegin { line: u32 },

    #[error("script ended with {open} unclosed block(s)")]
    UnclosedBlocks { open: usize },

    #[error("compiled block larger than the 65535-byte length field")]
    BlockTooLarge,
}

/// Everything a single script conversion accumulates besides its artifacts.
///
/// First fatal error wins: once `fatal` is set further statement dispatch
/// stops and later errors are dropped.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Diagnostics {
    fatal: Option<CompileError>,
    pub warnings: Vec<String>,
    /// (symbol, occurrence count), insertion-ordered, symbol lower-cased.
    pub unresolved: Vec<(String, u32)>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn set_fatal(&mut self, err: CompileError) {
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
    }

    pub fn fatal(&self) -> Option<&CompileError> {
        self.fatal.as_ref()
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    /// Bump the occurrence count for an identifier the resolver gave up on.
    pub fn record_unresolved(&mut self, name: &str) {
        let key = name.to_ascii_lowercase();
        if let Some(entry) = self.unresolved.iter_mut().find(|(n, _)| *n == key) {
            entry.1 += 1;
        } else {
            self.unresolved.push((key, 1));
        }
    }
}
