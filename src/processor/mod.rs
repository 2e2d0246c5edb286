//! Component 2 – the functional core.
//!
//! Lexer → statement dispatcher → expression engine → emitter, one
//! synchronous pass per script. Each script owns its whole compilation
//! state; only the read-only content database is shared.

pub mod commands;
pub mod cursor;
pub mod diag;
pub mod emit;
pub mod expr;
pub mod lexer;
pub mod resolver;
pub mod script_parser;

use anyhow::Result;
use log::{info, warn};

use crate::model::{ProcessedProject, RawProject};
use crate::processor::resolver::ContentDb;

/// Convert every script in the project. A fatal error in one script is
/// isolated: its artifact carries the diagnostics, the batch goes on.
pub fn run(raw: &RawProject, db: &dyn ContentDb) -> Result<ProcessedProject> {
    let mut scripts = Vec::with_capacity(raw.scripts.len());

    for entry in &raw.scripts {
        let converted = script_parser::compile_script(&entry.name, &entry.source, db);
        if let Some(err) = converted.diag.fatal() {
            warn!("script `{}` failed: {err}", entry.name);
        } else {
            info!(
                "script `{}`: {} bytes, {} reference(s), {} warning(s)",
                converted.name,
                converted.code.len(),
                converted.refs.len(),
                converted.diag.warnings.len()
            );
        }
        scripts.push(converted);
    }

    Ok(ProcessedProject { scripts })
}
