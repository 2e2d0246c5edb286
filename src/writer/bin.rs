//! Splice every compiled script into the `scripts.bin` container.
//!
//! Per script, in input order:
//!
//! ```text
//! [u16 name_len][name bytes]
//! [u16 ref_count][u32 handle]…
//! [u32 code_len][code bytes]
//! ```
//!
//! Failed scripts are left out of the container; the report carries
//! their diagnostics.

use crate::model::ProcessedProject;
use log::warn;
use std::io;
use std::path::Path;

pub fn emit(project: &ProcessedProject, out_dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(out_dir)?;
    let blob = assemble(project);
    std::fs::write(out_dir.join("scripts.bin"), blob)
}

fn assemble(project: &ProcessedProject) -> Vec<u8> {
    let mut blob = Vec::new();
    for script in &project.scripts {
        if script.failed() {
            warn!("omitting failed script `{}` from container", script.name);
            continue;
        }
        write_str(&mut blob, &script.name);
        write_u16(&mut blob, script.refs.len() as u16);
        for handle in &script.refs {
            write_u32(&mut blob, handle.0);
        }
        write_u32(&mut blob, script.code.len() as u32);
        blob.extend_from_slice(&script.code);
    }
    blob
}

fn write_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Length-prefixed string, u16 byte count.
fn write_str(buf: &mut Vec<u8>, s: &str) {
    write_u16(buf, s.len() as u16);
    buf.extend_from_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConvertedScript, Handle};
    use crate::processor::diag::{CompileError, Diagnostics};

    fn script(name: &str, code: Vec<u8>, refs: Vec<Handle>) -> ConvertedScript {
        ConvertedScript {
            name: name.into(),
            text: String::new(),
            code,
            refs,
            diag: Diagnostics::new(),
        }
    }

    #[test]
    fn test_container_layout() {
        let project = ProcessedProject {
            scripts: vec![script("ab", vec![1, 2, 3], vec![Handle(0x14)])],
        };
        let blob = assemble(&project);
        assert_eq!(
            blob,
            vec![
                2, 0, b'a', b'b', // name
                1, 0, 0x14, 0, 0, 0, // one handle
                3, 0, 0, 0, 1, 2, 3, // code
            ]
        );
    }

    #[test]
    fn test_failed_script_omitted() {
        let mut failed = script("bad", vec![9], vec![]);
        failed
            .diag
            .set_fatal(CompileError::UnclosedBlocks { open: 1 });
        let project = ProcessedProject {
            scripts: vec![failed, script("ok", vec![], vec![])],
        };
        let blob = assemble(&project);
        // only `ok`: name + empty refs + empty code
        assert_eq!(blob, vec![2, 0, b'o', b'k', 0, 0, 0, 0, 0, 0]);
    }
}
