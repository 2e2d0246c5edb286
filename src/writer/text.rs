//! Emit the translated script sources and the conversion report.

use crate::model::ProcessedProject;
use log::warn;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

pub fn emit(project: &ProcessedProject, out_dir: &Path) -> io::Result<()> {
    let scripts_dir = out_dir.join("scripts");
    std::fs::create_dir_all(&scripts_dir)?;

    for script in &project.scripts {
        if script.failed() {
            warn!("skipping translated source for failed script `{}`", script.name);
            continue;
        }
        let path = scripts_dir.join(format!("{}.txt", script.name));
        std::fs::write(path, &script.text)?;
    }

    report(project, out_dir)
}

/// One report for the whole batch: per-script status, warnings and the
/// unresolved-identifier tally.
fn report(project: &ProcessedProject, out_dir: &Path) -> io::Result<()> {
    let mut f = File::create(out_dir.join("report.txt"))?;

    let failed = project.scripts.iter().filter(|s| s.failed()).count();
    writeln!(
        f,
        "{} script(s) converted, {} failed",
        project.scripts.len() - failed,
        failed
    )?;

    for script in &project.scripts {
        if script.diag.fatal().is_none()
            && script.diag.warnings.is_empty()
            && script.diag.unresolved.is_empty()
        {
            continue;
        }
        writeln!(f, "\n== {} ==", script.name)?;
        if let Some(err) = script.diag.fatal() {
            writeln!(f, "FATAL: {err}")?;
        }
        for w in &script.diag.warnings {
            writeln!(f, "warning: {w}")?;
        }
        for (symbol, count) in &script.diag.unresolved {
            writeln!(f, "unresolved: {symbol} ({count}x)")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConvertedScript;
    use crate::processor::diag::Diagnostics;

    #[test]
    fn test_emit_writes_sources_and_report() {
        let dir = std::env::temp_dir().join("scriptport_text_test");
        let _ = std::fs::remove_dir_all(&dir);

        let mut diag = Diagnostics::new();
        diag.record_unresolved("nonsuch");
        let project = ProcessedProject {
            scripts: vec![ConvertedScript {
                name: "chest".into(),
                text: "ScriptName chest\n".into(),
                code: vec![0x1D, 0x00, 0x02, 0x00, 0x00, 0x00],
                refs: vec![],
                diag,
            }],
        };
        emit(&project, &dir).unwrap();

        let src = std::fs::read_to_string(dir.join("scripts/chest.txt")).unwrap();
        assert_eq!(src, "ScriptName chest\n");
        let report = std::fs::read_to_string(dir.join("report.txt")).unwrap();
        assert!(report.contains("1 script(s) converted, 0 failed"));
        assert!(report.contains("unresolved: nonsuch (1x)"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
