//! Statement dispatcher: walks the token stream once and drives the
//! resolver, expression compiler and emitter in lockstep.
//!
//! Two modes: statement mode (the default) and expression mode, entered
//! for `if`/`elseif` guards and the right-hand side of `set`. The first
//! fatal error stops dispatch; warnings let the walk continue with a
//! safe substitute.

use crate::model::{ConvertedScript, Handle, RecordKind};

use super::commands::{self, ArgKind, Arity, CommandSpec, Stmt, VarType, OP_SCRIPTNAME, OP_SET};
use super::cursor::Cursor;
use super::diag::{CompileError, Diagnostics};
use super::emit::{BlockKind, Emitter};
use super::expr::{self, TAG_LOCAL, TAG_MEMBER, TAG_REF};
use super::lexer::{self, Token, TokenKind};
use super::resolver::{ContentDb, Declared, Resolver};

/// Convert one script. Never panics, never throws: everything lands in
/// the returned artifact's diagnostics.
pub fn compile_script(name: &str, source: &str, db: &dyn ContentDb) -> ConvertedScript {
    Compiler::new(name, source, db).run()
}

struct Compiler<'a> {
    cur: Cursor,
    emit: Emitter,
    resolver: Resolver<'a>,
    diag: Diagnostics,
    script_name: String,
    /// The script's single begin block has already been closed.
    begin_done: bool,
}

impl<'a> Compiler<'a> {
    fn new(name: &str, source: &str, db: &'a dyn ContentDb) -> Self {
        Self {
            cur: Cursor::new(lexer::tokenize(source)),
            emit: Emitter::new(),
            resolver: Resolver::new(db),
            diag: Diagnostics::new(),
            script_name: name.to_string(),
            begin_done: false,
        }
    }

    fn run(mut self) -> ConvertedScript {
        while !self.cur.at_end() && !self.diag.is_fatal() {
            self.dispatch();
        }
        if !self.diag.is_fatal() && self.emit.open_blocks() > 0 {
            self.diag.set_fatal(CompileError::UnclosedBlocks {
                open: self.emit.open_blocks(),
            });
        }
        if !self.diag.is_fatal() && self.emit.overflowed() {
            self.diag.set_fatal(CompileError::BlockTooLarge);
        }
        self.finish()
    }

    /// Statement mode: classify the token at the front of the line.
    fn dispatch(&mut self) {
        let tok = match self.cur.advance() {
            Some(t) => t.clone(),
            None => return,
        };
        match tok.kind {
            TokenKind::Eol => {}
            TokenKind::Ident => match commands::classify(&tok.text) {
                Stmt::Begin => self.handle_begin(tok.line),
                Stmt::End => self.handle_end(tok.line),
                Stmt::If => self.handle_if(tok.line),
                Stmt::ElseIf => self.handle_elseif(tok.line),
                Stmt::Else => self.handle_else(tok.line),
                Stmt::EndIf => self.handle_endif(tok.line),
                Stmt::Set => self.handle_set(tok.line),
                Stmt::Decl(ty) => self.handle_decl(ty, tok.line),
                Stmt::Command(spec) => self.handle_command(spec, tok.line),
                Stmt::Unsupported(kw) => {
                    self.diag.warn(format!(
                        "line {}: `{kw}` has no target equivalent, line skipped",
                        tok.line
                    ));
                    self.cur.skip_to_eol();
                }
                Stmt::Unknown => self.diag.set_fatal(CompileError::UnknownCommand {
                    found: tok.text.clone(),
                    line: tok.line,
                }),
            },
            _ => self.diag.set_fatal(CompileError::UnknownCommand {
                found: tok.text.clone(),
                line: tok.line,
            }),
        }
    }

    /// Open the main block implicitly when a statement arrives outside
    /// any block (tolerates scripts that skip the `begin` line). Once
    /// the script's one begin block has closed, a trailing statement is
    /// a second block and fatal.
    fn ensure_block(&mut self, line: u32) -> bool {
        if self.emit.in_block() {
            return true;
        }
        if self.begin_done {
            self.diag.set_fatal(CompileError::SecondBegin { line });
            return false;
        }
        self.emit
            .open_block(BlockKind::Script { mode: 0 }, "Begin GameMode".into());
        true
    }

    fn expect_eol(&mut self, cmd: &str) {
        match self.cur.peek() {
            None => {}
            Some(t) if t.kind == TokenKind::Eol => {
                self.cur.advance();
            }
            Some(t) => {
                self.diag.warn(format!(
                    "line {}: extra tokens after `{cmd}` ignored",
                    t.line
                ));
                self.cur.skip_to_eol();
            }
        }
    }

    fn handle_begin(&mut self, line: u32) {
        if self.emit.in_block() {
            self.diag.set_fatal(CompileError::NestedBegin { line });
            return;
        }
        if self.begin_done {
            self.diag.set_fatal(CompileError::SecondBegin { line });
            return;
        }
        // optional script name on the begin line wins over the entry name
        if let Some(tok) = self.cur.peek() {
            if tok.kind == TokenKind::Ident {
                self.script_name = tok.text.clone();
                self.cur.advance();
            }
        }
        self.expect_eol("begin");
        self.emit
            .open_block(BlockKind::Script { mode: 0 }, "Begin GameMode".into());
    }

    fn handle_end(&mut self, line: u32) {
        match self.emit.current_kind() {
            Some(BlockKind::Script { .. }) => {
                self.expect_eol("end");
                self.emit.close_block(Some("End"));
                self.begin_done = true;
            }
            Some(_) => self.diag.set_fatal(CompileError::UnclosedBlocks {
                open: self.emit.open_blocks(),
            }),
            None => {
                // stray closer at top-level nesting depth: tolerated
                self.diag
                    .warn(format!("line {line}: `end` without an open begin block"));
                self.cur.skip_to_eol();
            }
        }
    }

    fn handle_if(&mut self, line: u32) {
        // a top-level if guarded by a recognised event name becomes a
        // standalone callback block, not a nested conditional
        if self.emit.conditional_depth() == 0 {
            if let Some((event, mode)) = self.try_callback_guard() {
                self.emit
                    .open_block(BlockKind::Callback { mode }, format!("Begin {event}"));
                return;
            }
        }
        if !self.ensure_block(line) {
            return;
        }
        let guard = expr::compile_expression(&mut self.cur, &mut self.resolver, &mut self.diag);
        self.emit
            .open_block(BlockKind::If, format!("If {}", guard.text));
        self.emit.emit_guard(&guard.bytes);
    }

    /// Match `( <event> )` or `( <event> == 1 )` (parens optional) up to
    /// end of line; rewinds and reports `None` when the shape differs.
    fn try_callback_guard(&mut self) -> Option<(&'static str, u16)> {
        let mark = self.cur.mark();
        let mut parens = 0usize;
        while self.cur.peek().is_some_and(|t| t.kind == TokenKind::Op && t.text == "(") {
            self.cur.advance();
            parens += 1;
        }
        let event = match self.cur.peek() {
            Some(t) if t.kind == TokenKind::Ident => commands::callback_event(&t.text),
            _ => None,
        };
        let Some(found) = event else {
            self.cur.reset(mark);
            return None;
        };
        self.cur.advance();
        // optional `== 1`; any other comparison keeps conditional meaning
        if self.cur.peek().is_some_and(|t| t.kind == TokenKind::Op && (t.text == "==" || t.text == "=")) {
            self.cur.advance();
            match self.cur.peek() {
                Some(t) if t.kind == TokenKind::Number && t.number() == Some(1) => {
                    self.cur.advance();
                }
                _ => {
                    self.cur.reset(mark);
                    return None;
                }
            }
        }
        for _ in 0..parens {
            if self.cur.peek().is_some_and(|t| t.kind == TokenKind::Op && t.text == ")") {
                self.cur.advance();
            } else {
                self.cur.reset(mark);
                return None;
            }
        }
        match self.cur.peek() {
            None => Some(found),
            Some(t) if t.kind == TokenKind::Eol => {
                self.cur.advance();
                Some(found)
            }
            _ => {
                self.cur.reset(mark);
                None
            }
        }
    }

    fn handle_elseif(&mut self, line: u32) {
        match self.emit.current_kind() {
            Some(BlockKind::If) | Some(BlockKind::ElseIf) => {
                self.emit.close_block(None);
                let guard =
                    expr::compile_expression(&mut self.cur, &mut self.resolver, &mut self.diag);
                self.emit
                    .open_block(BlockKind::ElseIf, format!("ElseIf {}", guard.text));
                self.emit.emit_guard(&guard.bytes);
            }
            _ => self.diag.set_fatal(CompileError::UnmatchedClose {
                closer: "elseif".into(),
                line,
            }),
        }
    }

    fn handle_else(&mut self, line: u32) {
        match self.emit.current_kind() {
            Some(BlockKind::If) | Some(BlockKind::ElseIf) => {
                self.expect_eol("else");
                self.emit.close_block(None);
                self.emit.open_block(BlockKind::Else, "Else".into());
            }
            _ => self.diag.set_fatal(CompileError::UnmatchedClose {
                closer: "else".into(),
                line,
            }),
        }
    }

    fn handle_endif(&mut self, line: u32) {
        match self.emit.current_kind() {
            Some(kind) if kind.is_conditional() => {
                self.expect_eol("endif");
                self.emit.close_block(Some("EndIf"));
            }
            Some(BlockKind::Callback { .. }) => {
                // the callback's endif closes its whole output segment
                self.expect_eol("endif");
                self.emit.close_block(Some("End"));
            }
            _ => {
                // stray closer at top-level nesting depth: tolerated
                self.diag
                    .warn(format!("line {line}: `endif` without an open if"));
                self.cur.skip_to_eol();
            }
        }
    }

    fn handle_decl(&mut self, ty: VarType, line: u32) {
        let name = match self.cur.peek() {
            Some(t) if t.kind == TokenKind::Ident => t.text.clone(),
            other => {
                let found = other.map(|t| t.text.clone()).unwrap_or_default();
                self.diag.set_fatal(CompileError::BadArgument {
                    cmd: ty.target_name().to_ascii_lowercase(),
                    expected: "variable name".into(),
                    found,
                    line,
                });
                return;
            }
        };
        self.cur.advance();
        if let Declared::Duplicate(idx) = self.resolver.locals.declare(ty, &name) {
            self.diag.warn(format!(
                "line {line}: variable `{name}` already declared (index {idx}), duplicate ignored"
            ));
        }
        // declarations surface in the header text, not the block body
        self.expect_eol("declaration");
    }

    fn handle_set(&mut self, line: u32) {
        if !self.ensure_block(line) {
            return;
        }
        let target = match self.cur.peek() {
            Some(t) if t.kind == TokenKind::Ident => t.text.clone(),
            other => {
                let found = other.map(|t| t.text.clone()).unwrap_or_default();
                self.diag.set_fatal(CompileError::BadArgument {
                    cmd: "set".into(),
                    expected: "variable".into(),
                    found,
                    line,
                });
                return;
            }
        };
        self.cur.advance();

        // optional member target `obj.var`
        let member = if self.cur.peek().is_some_and(|t| t.kind == TokenKind::Op && t.text == ".")
            && self.cur.peek_at(1).is_some_and(|t| t.kind == TokenKind::Ident)
        {
            self.cur.advance();
            Some(self.cur.advance().map(|t| t.text.clone()).unwrap_or_default())
        } else {
            None
        };

        match self.cur.peek() {
            Some(t) if t.kind == TokenKind::Ident && t.text.eq_ignore_ascii_case("to") => {
                self.cur.advance();
            }
            other => {
                let found = other.map(|t| t.text.clone()).unwrap_or_default();
                self.diag.set_fatal(CompileError::BadArgument {
                    cmd: "set".into(),
                    expected: "`to`".into(),
                    found,
                    line,
                });
                return;
            }
        }

        let value = expr::compile_expression(&mut self.cur, &mut self.resolver, &mut self.diag);

        // target operand, push-encoded
        let mut operands = Vec::new();
        let target_text = match &member {
            Some(var) => match self.resolver.resolve_member(&target, var) {
                Some((ref_idx, var_idx)) => {
                    operands.push(TAG_MEMBER);
                    operands.extend_from_slice(&ref_idx.to_le_bytes());
                    operands.extend_from_slice(&var_idx.to_le_bytes());
                    let shown = self
                        .resolver
                        .display_name(ref_idx)
                        .unwrap_or(&target)
                        .to_string();
                    format!("{shown}.{var}")
                }
                None => {
                    self.diag.record_unresolved(&format!("{target}.{var}"));
                    operands.push(TAG_REF);
                    operands.extend_from_slice(&0u16.to_le_bytes());
                    format!("{target}.{var}")
                }
            },
            None => match self.resolver.resolve_local(&target) {
                Some(idx) => {
                    operands.push(TAG_LOCAL);
                    operands.extend_from_slice(&idx.to_le_bytes());
                    target.clone()
                }
                None => match self
                    .resolver
                    .resolve_external(&target, Some(RecordKind::Global))
                {
                    Some(idx) => {
                        operands.push(TAG_REF);
                        operands.extend_from_slice(&idx.to_le_bytes());
                        self.resolver
                            .display_name(idx)
                            .unwrap_or(&target)
                            .to_string()
                    }
                    None => {
                        self.diag.record_unresolved(&target);
                        operands.push(TAG_REF);
                        operands.extend_from_slice(&0u16.to_le_bytes());
                        target.clone()
                    }
                },
            },
        };

        operands.extend_from_slice(&(value.bytes.len() as u16).to_le_bytes());
        operands.extend_from_slice(&value.bytes);

        self.emit.emit_statement(OP_SET, 2, &operands);
        self.emit
            .push_line(&format!("Set {target_text} to {}", value.text));
    }

    fn handle_command(&mut self, spec: &'static CommandSpec, line: u32) {
        if !self.ensure_block(line) {
            return;
        }
        let mut operands = Vec::new();
        let mut words = vec![spec.target.to_string()];
        let mut count: u16 = 0;

        let shape_ok = match spec.arity {
            Arity::None => true,
            Arity::One(a) => self.command_arg(spec, a, line, &mut operands, &mut words, &mut count),
            Arity::Two(a, b) => {
                self.command_arg(spec, a, line, &mut operands, &mut words, &mut count)
                    && self.command_arg(spec, b, line, &mut operands, &mut words, &mut count)
            }
            Arity::Variadic {
                head,
                rest,
                max_rest,
            } => {
                let mut ok =
                    self.command_arg(spec, head, line, &mut operands, &mut words, &mut count);
                let mut taken = 0usize;
                while ok
                    && taken < max_rest
                    && self
                        .cur
                        .peek()
                        .is_some_and(|t| t.kind != TokenKind::Eol)
                {
                    ok = self.command_arg(spec, rest, line, &mut operands, &mut words, &mut count);
                    taken += 1;
                }
                if ok && self.cur.peek().is_some_and(|t| t.kind != TokenKind::Eol) {
                    self.diag.warn(format!(
                        "line {line}: `{}` takes at most {} trailing arguments, extras dropped",
                        spec.source,
                        max_rest
                    ));
                    self.cur.skip_to_eol();
                    // the eol is already consumed, skip the usual check
                    self.emit.emit_statement(spec.opcode, count, &operands);
                    self.emit.push_line(&words.join(" "));
                    return;
                }
                ok
            }
        };
        if !shape_ok {
            return; // fatal already recorded
        }

        self.expect_eol(spec.source);
        self.emit.emit_statement(spec.opcode, count, &operands);
        self.emit.push_line(&words.join(" "));
    }

    /// One fixed argument slot. A wrong token shape is fatal; a resolver
    /// miss is a warning plus the zero placeholder.
    fn command_arg(
        &mut self,
        spec: &CommandSpec,
        kind: ArgKind,
        line: u32,
        operands: &mut Vec<u8>,
        words: &mut Vec<String>,
        count: &mut u16,
    ) -> bool {
        let tok = self.cur.peek().cloned();
        match kind {
            ArgKind::Ref(record_kind) => match tok {
                Some(t) if t.kind == TokenKind::Ident => {
                    self.cur.advance();
                    match self.resolver.resolve_external(&t.text, Some(record_kind)) {
                        Some(idx) => {
                            operands.extend_from_slice(&idx.to_le_bytes());
                            words.push(
                                self.resolver
                                    .display_name(idx)
                                    .unwrap_or(&t.text)
                                    .to_string(),
                            );
                        }
                        None => {
                            self.diag.record_unresolved(&t.text);
                            operands.extend_from_slice(&0u16.to_le_bytes());
                            words.push(t.text.clone());
                        }
                    }
                }
                other => {
                    return self.bad_argument(spec, "identifier", other, line);
                }
            },
            ArgKind::Number => match tok {
                Some(t) if t.kind == TokenKind::Number => {
                    self.cur.advance();
                    let value = t.number().unwrap_or(0);
                    if !(0..=u16::MAX as i32).contains(&value) {
                        self.diag.warn(format!(
                            "line {line}: `{}` argument {value} out of range, truncated",
                            spec.source
                        ));
                    }
                    operands.extend_from_slice(&(value as u16).to_le_bytes());
                    words.push(t.text.clone());
                }
                other => {
                    return self.bad_argument(spec, "number", other, line);
                }
            },
            ArgKind::Text => match tok {
                Some(t) if t.kind == TokenKind::Str => {
                    self.cur.advance();
                    let body = expr::clamp_str(&t.text, line, &mut self.diag);
                    operands.extend_from_slice(&(body.len() as u16).to_le_bytes());
                    operands.extend_from_slice(body);
                    words.push(format!("\"{}\"", t.text));
                }
                other => {
                    return self.bad_argument(spec, "string", other, line);
                }
            },
        }
        *count += 1;
        true
    }

    fn bad_argument(
        &mut self,
        spec: &CommandSpec,
        expected: &str,
        found: Option<Token>,
        line: u32,
    ) -> bool {
        let found = found
            .filter(|t| t.kind != TokenKind::Eol)
            .map(|t| t.text)
            .unwrap_or_else(|| "end of line".into());
        self.diag.set_fatal(CompileError::BadArgument {
            cmd: spec.source.into(),
            expected: expected.into(),
            found,
            line,
        });
        false
    }

    /// Assemble the final artifacts: header instruction + flushed blocks,
    /// header text + declaration lines + translated blocks.
    fn finish(self) -> ConvertedScript {
        let Compiler {
            emit,
            resolver,
            diag,
            script_name,
            ..
        } = self;

        if diag.is_fatal() {
            return ConvertedScript {
                name: script_name,
                text: String::new(),
                code: Vec::new(),
                refs: Vec::new(),
                diag,
            };
        }

        let (block_code, text_blocks) = emit.finish();

        let mut code = Vec::new();
        code.extend_from_slice(&OP_SCRIPTNAME.to_le_bytes());
        code.extend_from_slice(&2u16.to_le_bytes());
        code.extend_from_slice(&0u16.to_le_bytes());
        code.extend_from_slice(&block_code);

        let mut lines = vec![format!("ScriptName {script_name}"), String::new()];
        if !resolver.locals.entries().is_empty() {
            for (ty, name) in resolver.locals.entries() {
                lines.push(format!("{} {name}", ty.target_name()));
            }
            lines.push(String::new());
        }
        for (i, block) in text_blocks.iter().enumerate() {
            if i > 0 {
                lines.push(String::new());
            }
            lines.extend(block.iter().cloned());
        }
        let mut text = lines.join("\n");
        text.push('\n');

        let refs: Vec<Handle> = resolver.refs.handles().to_vec();

        ConvertedScript {
            name: script_name,
            text,
            code,
            refs,
            diag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::commands::{OP_BEGIN, OP_IF};
    use super::super::emit::HEADER_LEN;
    use super::super::expr::{TAG_FUNC, TAG_NUM, TAG_OP, TAG_REF};
    use super::super::resolver::tests::FakeDb;
    use super::*;

    fn convert(src: &str) -> ConvertedScript {
        let db = FakeDb::sample();
        compile_script("test_script", src, &db)
    }

    fn u16_at(buf: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([buf[at], buf[at + 1]])
    }

    #[test]
    fn test_if_scenario_structure() {
        let out = convert("if ( getHealth player > 50 )\n  enable\nendif\nend");
        assert!(!out.failed(), "diag: {:?}", out.diag);

        // script header instruction, then the (implicit) begin block
        assert_eq!(u16_at(&out.code, 0), OP_SCRIPTNAME);
        let begin = 6;
        assert_eq!(u16_at(&out.code, begin), OP_BEGIN);

        // the if block sits first in the begin block body
        let if_hdr = begin + HEADER_LEN;
        assert_eq!(u16_at(&out.code, if_hdr), OP_IF);
        assert_eq!(u16_at(&out.code, if_hdr + 4), 1, "skip count");

        // guard: ref push + func push + number push + one operator
        let guard_len = u16_at(&out.code, if_hdr + HEADER_LEN) as usize;
        assert_eq!(guard_len, 3 + 3 + 5 + 2);
        let guard = &out.code[if_hdr + HEADER_LEN + 2..if_hdr + HEADER_LEN + 2 + guard_len];
        assert_eq!(guard[0], TAG_REF);
        assert_eq!(guard[3], TAG_FUNC);
        assert_eq!(guard[6], TAG_NUM);
        assert_eq!(guard[11], TAG_OP);

        // one enable instruction follows the guard, payload is count only
        let enable = if_hdr + HEADER_LEN + 2 + guard_len;
        assert_eq!(u16_at(&out.code, enable), 0x1021);
        assert_eq!(u16_at(&out.code, enable + 2), 2);

        // every size field accounts for its body exactly
        let if_body = u16_at(&out.code, if_hdr + 2) as usize;
        assert_eq!(if_body, 2 + guard_len + 6);
        let begin_body = u16_at(&out.code, begin + 2) as usize;
        assert_eq!(begin_body, HEADER_LEN + if_body);
        assert_eq!(out.code.len(), 6 + HEADER_LEN + begin_body);

        // `player` resolved into the reference table
        assert_eq!(out.refs, vec![Handle(0x14)]);
    }

    #[test]
    fn test_begin_end_with_commands() {
        let out = convert("begin chest_script\nadditem gold_001 50\nend");
        assert!(!out.failed());
        assert_eq!(out.name, "chest_script");
        assert!(out.text.contains("ScriptName chest_script"));
        assert!(out.text.contains("    AddItem gold_001 50"));

        // additem: two operands (ref idx, count)
        let stmt = 6 + HEADER_LEN;
        assert_eq!(u16_at(&out.code, stmt), 0x1002);
        assert_eq!(u16_at(&out.code, stmt + 2), 6); // count field + 2 u16 operands
        assert_eq!(u16_at(&out.code, stmt + 4), 2); // operand count
        assert_eq!(u16_at(&out.code, stmt + 6), 1); // ref index
        assert_eq!(u16_at(&out.code, stmt + 8), 50);
    }

    #[test]
    fn test_declarations_build_header() {
        let out = convert("short a\nlong b\nfloat c\nbegin\nset b to 2\nend");
        assert!(!out.failed());
        let text = &out.text;
        assert!(text.contains("Short a\nLong b\nFloat c"));
        assert!(text.contains("    Set b to 2"));

        // set targets local index 2
        let stmt = 6 + HEADER_LEN;
        assert_eq!(u16_at(&out.code, stmt), OP_SET);
        assert_eq!(out.code[stmt + 6], TAG_LOCAL);
        assert_eq!(u16_at(&out.code, stmt + 7), 2);
    }

    #[test]
    fn test_duplicate_declaration_warns() {
        let out = convert("short a\nshort A\nbegin\nend");
        assert!(!out.failed());
        assert_eq!(out.diag.warnings.len(), 1);
        assert!(out.diag.warnings[0].contains("already declared"));
    }

    #[test]
    fn test_unknown_command_is_fatal() {
        let out = convert("begin\nfrobnicate 1\nend");
        assert!(out.failed());
        assert_eq!(
            out.diag.fatal(),
            Some(&CompileError::UnknownCommand {
                found: "frobnicate".into(),
                line: 2
            })
        );
        assert!(out.code.is_empty());
    }

    #[test]
    fn test_unsupported_keyword_warns_and_continues() {
        let out = convert("begin\nfadeout 2 0\nenable\nend");
        assert!(!out.failed());
        assert!(out.diag.warnings.iter().any(|w| w.contains("fadeout")));
        // fadeout produced no instruction: begin body holds one statement
        assert_eq!(u16_at(&out.code, 6 + 2) as usize, 6);
    }

    #[test]
    fn test_unresolved_symbol_never_aborts() {
        let out = convert("begin\nadditem nonsuch_item 3\nenable\nend");
        assert!(!out.failed());
        assert_eq!(out.diag.unresolved, vec![("nonsuch_item".to_string(), 1)]);
        // both statements still compiled: additem (6 + 4 operand bytes) + enable (6)
        assert_eq!(u16_at(&out.code, 6 + 2) as usize, 16);
        // placeholder index zero in the operand
        assert_eq!(u16_at(&out.code, 6 + HEADER_LEN + 6), 0);
        assert!(out.text.contains("AddItem nonsuch_item 3"));
    }

    #[test]
    fn test_elseif_else_chain() {
        let out = convert(
            "short x\nbegin\nif ( x == 1 )\nenable\nelseif ( x == 2 )\ndisable\nelse\nactivate\nendif\nend",
        );
        assert!(!out.failed(), "diag: {:?}", out.diag);
        assert!(out.text.contains("    If ( x == 1 )"));
        assert!(out.text.contains("    ElseIf ( x == 2 )"));
        assert!(out.text.contains("    Else"));
        assert!(out.text.contains("    EndIf"));

        // three sibling arm blocks inside the begin block
        let begin_body = u16_at(&out.code, 6 + 2) as usize;
        let mut at = 6 + HEADER_LEN;
        let mut opcodes = Vec::new();
        let mut skips = Vec::new();
        while at < 6 + HEADER_LEN + begin_body {
            opcodes.push(u16_at(&out.code, at));
            skips.push(u16_at(&out.code, at + 4));
            at += HEADER_LEN + u16_at(&out.code, at + 2) as usize;
        }
        assert_eq!(opcodes, vec![0x0016, 0x0017, 0x0018]);
        assert_eq!(skips, vec![1, 1, 1]);
    }

    #[test]
    fn test_nested_if_restores_depth() {
        let out = convert(
            "short x\nbegin\nif ( x )\nif ( x )\nenable\nendif\ndisable\nendif\nend",
        );
        assert!(!out.failed(), "diag: {:?}", out.diag);
        // outer skip: nested block (1) + disable (1)
        let outer = 6 + HEADER_LEN;
        assert_eq!(u16_at(&out.code, outer + 4), 2);
    }

    #[test]
    fn test_callback_block_is_own_segment() {
        let out = convert(
            "begin\nenable\nif ( OnActivate == 1 )\nactivate\nendif\ndisable\nend",
        );
        assert!(!out.failed(), "diag: {:?}", out.diag);

        // callback segment flushed first, mode 2, one statement body
        let cb = 6;
        assert_eq!(u16_at(&out.code, cb), OP_BEGIN);
        assert_eq!(u16_at(&out.code, cb + 4), 2);
        assert_eq!(u16_at(&out.code, cb + 2) as usize, 6);

        // main block follows with its two statements
        let main = cb + HEADER_LEN + 6;
        assert_eq!(u16_at(&out.code, main), OP_BEGIN);
        assert_eq!(u16_at(&out.code, main + 4), 0);
        assert_eq!(u16_at(&out.code, main + 2) as usize, 12);

        assert!(out.text.contains("Begin OnActivate\n    Activate\nEnd"));
        assert!(out.text.contains("Begin GameMode\n    Enable\n    Disable\nEnd"));
    }

    #[test]
    fn test_event_guard_compared_to_zero_is_not_a_callback() {
        let out = convert("begin\nif ( OnActivate == 0 )\nactivate\nendif\nend");
        assert!(!out.failed(), "diag: {:?}", out.diag);

        // a single GameMode segment, no callback block mode in aux
        assert_eq!(u16_at(&out.code, 6), OP_BEGIN);
        assert_eq!(u16_at(&out.code, 10), 0);
        let begin_body = u16_at(&out.code, 8) as usize;
        assert_eq!(out.code.len(), 6 + HEADER_LEN + begin_body);

        // the event name compiles as an ordinary (unresolvable) operand
        assert_eq!(out.diag.unresolved, vec![("onactivate".to_string(), 1)]);
        assert!(out.text.contains("    If ( OnActivate == 0 )"));
    }

    #[test]
    fn test_event_name_deep_inside_is_not_a_callback() {
        let out = convert("short x\nbegin\nif ( x )\nif ( OnActivate )\nenable\nendif\nendif\nend");
        assert!(!out.failed(), "diag: {:?}", out.diag);
        // compiled as an ordinary nested if; the event name is unresolvable
        assert_eq!(out.diag.unresolved, vec![("onactivate".to_string(), 1)]);
    }

    #[test]
    fn test_stray_endif_at_top_level_is_warning() {
        let out = convert("begin\nenable\nend\nendif");
        assert!(!out.failed());
        assert!(out.diag.warnings.iter().any(|w| w.contains("endif")));
    }

    #[test]
    fn test_end_with_open_if_is_fatal() {
        let out = convert("short x\nbegin\nif ( x )\nenable\nend");
        assert!(out.failed());
        assert!(matches!(
            out.diag.fatal(),
            Some(CompileError::UnclosedBlocks { .. })
        ));
    }

    #[test]
    fn test_missing_endif_is_fatal() {
        let out = convert("short x\nbegin\nif ( x )\nenable");
        assert!(out.failed());
    }

    #[test]
    fn test_nested_begin_is_fatal() {
        let out = convert("begin\nbegin\nend");
        assert!(out.failed());
        assert_eq!(out.diag.fatal(), Some(&CompileError::NestedBegin { line: 2 }));
    }

    #[test]
    fn test_statement_after_closed_block_is_fatal() {
        let out = convert("begin\nenable\nend\ndisable\nend");
        assert!(out.failed());
        assert_eq!(
            out.diag.fatal(),
            Some(&CompileError::SecondBegin { line: 4 })
        );
    }

    #[test]
    fn test_block_body_over_length_field_is_fatal() {
        let mut src = String::from("begin\n");
        for _ in 0..11_000 {
            src.push_str("enable\n");
        }
        src.push_str("end");
        let out = convert(&src);
        assert!(out.failed());
        assert_eq!(out.diag.fatal(), Some(&CompileError::BlockTooLarge));
        assert!(out.code.is_empty());
    }

    #[test]
    fn test_set_to_member() {
        let out = convert("begin\nset chest01.opened to 1\nend");
        assert!(!out.failed(), "diag: {:?}", out.diag);
        let stmt = 6 + HEADER_LEN;
        assert_eq!(u16_at(&out.code, stmt), OP_SET);
        assert_eq!(out.code[stmt + 6], TAG_MEMBER);
        assert_eq!(u16_at(&out.code, stmt + 7), 1); // ref index
        assert_eq!(u16_at(&out.code, stmt + 9), 1); // var index
        assert!(out.text.contains("Set chest01.opened to 1"));
    }

    #[test]
    fn test_set_missing_to_is_fatal() {
        let out = convert("short x\nbegin\nset x 5\nend");
        assert!(out.failed());
        assert!(matches!(
            out.diag.fatal(),
            Some(CompileError::BadArgument { .. })
        ));
    }

    #[test]
    fn test_messagebox_variadic() {
        let out = convert("begin\nmessagebox \"Hello\" \"Yes\" \"No\"\nend");
        assert!(!out.failed(), "diag: {:?}", out.diag);
        let stmt = 6 + HEADER_LEN;
        assert_eq!(u16_at(&out.code, stmt), 0x1000);
        assert_eq!(u16_at(&out.code, stmt + 4), 3); // operand count
        assert!(out.text.contains("MessageBox \"Hello\" \"Yes\" \"No\""));
    }

    #[test]
    fn test_journal_maps_to_setstage() {
        let out = convert("begin\njournal mq_rescue 30\nend");
        assert!(!out.failed(), "diag: {:?}", out.diag);
        assert!(out.text.contains("SetStage mq_rescue 30"));
        let stmt = 6 + HEADER_LEN;
        assert_eq!(u16_at(&out.code, stmt), 0x1039);
    }
}
