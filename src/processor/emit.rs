//! Bytecode emitter and the nested-block context stack.
//!
//! Every open block owns a private byte buffer that starts with a
//! 6-byte placeholder header `[opcode][body_len][aux]` (all u16,
//! little-endian). On close the real length and aux value are patched
//! in place, then the buffer is either flushed to the global output
//! (begin/callback blocks) or appended into the parent block.
//!
//! Branch-skip accounting is incremental: every statement emitted
//! directly inside a conditional arm bumps that arm's count, and a
//! closing child block bumps its parent by exactly one. The count is
//! what the target runtime uses to jump over a false arm.
//!
//! Translated text lines ride along in the same context frame so text
//! and bytes stay in lockstep.

use super::commands::{OP_BEGIN, OP_ELSE, OP_ELSEIF, OP_IF};

pub const HEADER_LEN: usize = 6;

const INDENT: &str = "    ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// The script's one begin/end block.
    Script { mode: u16 },
    /// Event-guarded block compiled as its own output segment.
    Callback { mode: u16 },
    If,
    ElseIf,
    Else,
}

impl BlockKind {
    fn opcode(self) -> u16 {
        match self {
            BlockKind::Script { .. } | BlockKind::Callback { .. } => OP_BEGIN,
            BlockKind::If => OP_IF,
            BlockKind::ElseIf => OP_ELSEIF,
            BlockKind::Else => OP_ELSE,
        }
    }

    pub fn is_conditional(self) -> bool {
        matches!(self, BlockKind::If | BlockKind::ElseIf | BlockKind::Else)
    }
}

#[derive(Debug)]
struct BlockCtx {
    kind: BlockKind,
    /// Indent level of the block's own header/footer lines.
    indent: usize,
    /// Statements the runtime must skip when the guard is false.
    skip_count: u16,
    lines: Vec<String>,
    code: Vec<u8>,
}

/// What `close_block` found on the stack.
#[derive(Debug, PartialEq, Eq)]
pub enum Closed {
    Block(BlockKind),
    NothingOpen,
}

#[derive(Debug, Default)]
pub struct Emitter {
    stack: Vec<BlockCtx>,
    out_code: Vec<u8>,
    out_blocks: Vec<Vec<String>>,
    /// A body or payload exceeded its u16 size field.
    overflow: bool,
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_block(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn current_kind(&self) -> Option<BlockKind> {
        self.stack.last().map(|c| c.kind)
    }

    /// Nesting depth of open conditional blocks.
    pub fn conditional_depth(&self) -> usize {
        self.stack.iter().filter(|c| c.kind.is_conditional()).count()
    }

    pub fn open_blocks(&self) -> usize {
        self.stack.len()
    }

    /// Clamp a size to its u16 field, remembering the breach. The
    /// driver turns a remembered breach into a fatal error, so the
    /// clamped value never reaches a reader.
    fn fit(&mut self, n: usize) -> u16 {
        if n > u16::MAX as usize {
            self.overflow = true;
            u16::MAX
        } else {
            n as u16
        }
    }

    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    /// Push a new context frame and reserve its zeroed header.
    pub fn open_block(&mut self, kind: BlockKind, header_line: String) {
        let indent = match kind {
            BlockKind::Script { .. } | BlockKind::Callback { .. } => 0,
            _ => self.stack.last().map(|c| c.indent + 1).unwrap_or(0),
        };
        let mut code = Vec::new();
        put_u16(&mut code, kind.opcode());
        put_u16(&mut code, 0); // body length, backpatched
        put_u16(&mut code, 0); // skip count / block mode, backpatched
        self.stack.push(BlockCtx {
            kind,
            indent,
            skip_count: 0,
            lines: vec![format!("{}{}", INDENT.repeat(indent), header_line)],
            code,
        });
    }

    /// Close the current frame: backpatch, then flush or fold into the
    /// parent. `footer` is the closing text line (`End`, `EndIf`), or
    /// `None` on an arm transition (`elseif`/`else`), which keeps the
    /// translated text seamless.
    pub fn close_block(&mut self, footer: Option<&str>) -> Closed {
        let mut ctx = match self.stack.pop() {
            Some(ctx) => ctx,
            None => return Closed::NothingOpen,
        };

        let body_len = self.fit(ctx.code.len() - HEADER_LEN);
        let aux = match ctx.kind {
            BlockKind::Script { mode } | BlockKind::Callback { mode } => mode,
            _ => ctx.skip_count,
        };
        ctx.code[2..4].copy_from_slice(&body_len.to_le_bytes());
        ctx.code[4..6].copy_from_slice(&aux.to_le_bytes());

        if let Some(footer) = footer {
            ctx.lines
                .push(format!("{}{}", INDENT.repeat(ctx.indent), footer));
        }

        match ctx.kind {
            BlockKind::Script { .. } | BlockKind::Callback { .. } => {
                // Own output segment, flushed as a unit.
                self.out_code.extend_from_slice(&ctx.code);
                self.out_blocks.push(ctx.lines);
            }
            _ => match self.stack.last_mut() {
                Some(parent) => {
                    parent.code.extend_from_slice(&ctx.code);
                    // One more instruction the parent must skip over.
                    parent.skip_count += 1;
                    parent.lines.extend(ctx.lines);
                }
                None => {
                    self.out_code.extend_from_slice(&ctx.code);
                    self.out_blocks.push(ctx.lines);
                }
            },
        }
        Closed::Block(ctx.kind)
    }

    /// One statement instruction: `[opcode][payload_len][count][operands]`.
    pub fn emit_statement(&mut self, opcode: u16, count: u16, operands: &[u8]) {
        let payload = self.fit(2 + operands.len());
        let Some(ctx) = self.stack.last_mut() else {
            return;
        };
        put_u16(&mut ctx.code, opcode);
        put_u16(&mut ctx.code, payload);
        put_u16(&mut ctx.code, count);
        ctx.code.extend_from_slice(operands);
        if ctx.kind.is_conditional() {
            ctx.skip_count += 1;
        }
    }

    /// Guard expression blob of an `if`/`elseif` header: `[len][bytes]`,
    /// written right after the block header and never skip-counted.
    pub fn emit_guard(&mut self, expr: &[u8]) {
        let len = self.fit(expr.len());
        let Some(ctx) = self.stack.last_mut() else {
            return;
        };
        put_u16(&mut ctx.code, len);
        ctx.code.extend_from_slice(expr);
    }

    /// Append one translated body line at the current nesting indent.
    pub fn push_line(&mut self, text: &str) {
        let Some(ctx) = self.stack.last_mut() else {
            return;
        };
        ctx.lines
            .push(format!("{}{}", INDENT.repeat(ctx.indent + 1), text));
    }

    /// Flushed artifacts: global code buffer and the text blocks in
    /// flush order.
    pub fn finish(self) -> (Vec<u8>, Vec<Vec<String>>) {
        (self.out_code, self.out_blocks)
    }
}
