//! Expression compiler: precedence-climbing over the rest of the line.
//!
//! Operands are resolved and emitted immediately as push items; pending
//! operators sit on a transient stack and are flushed whenever an
//! incoming operator of equal or lower precedence arrives, at a closing
//! parenthesis, and finally at end of line. The translated text is the
//! infix reprint in source order, built in lockstep with the bytes.

use crate::model::RecordKind;

use super::cursor::Cursor;
use super::diag::Diagnostics;
use super::lexer::TokenKind;
use super::resolver::Resolver;

// Push-item tags (single byte, no length/count fields).
pub const TAG_NUM: u8 = 0x6E;
pub const TAG_STR: u8 = 0x7A;
pub const TAG_LOCAL: u8 = 0x76;
pub const TAG_REF: u8 = 0x72;
pub const TAG_MEMBER: u8 = 0x6D;
pub const TAG_FUNC: u8 = 0x58;
pub const TAG_OP: u8 = 0x6F;
pub const TAG_NEG: u8 = 0x7E;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
}

impl BinOp {
    fn from_str(s: &str) -> Option<Self> {
        // a bare `=` inside an expression is comparison
        Some(match s {
            "=" | "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "&&" => BinOp::And,
            "||" => BinOp::Or,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        match self {
            BinOp::Eq => 0,
            BinOp::Ne => 1,
            BinOp::Lt => 2,
            BinOp::Le => 3,
            BinOp::Gt => 4,
            BinOp::Ge => 5,
            BinOp::Add => 6,
            BinOp::Sub => 7,
            BinOp::Mul => 8,
            BinOp::Div => 9,
            BinOp::And => 10,
            BinOp::Or => 11,
        }
    }

    fn prec(self) -> u8 {
        match self {
            BinOp::Mul | BinOp::Div => 3,
            BinOp::Add | BinOp::Sub => 2,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 1,
            BinOp::And | BinOp::Or => 0,
        }
    }

    fn text(self) -> &'static str {
        match self {
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

/// Built-in predicate/query functions valid inside expressions.
struct FnSpec {
    source: &'static str,
    target: &'static str,
    code: u16,
    arg: Option<Option<RecordKind>>, // None = no argument; Some(hint)
}

static FUNCS: &[FnSpec] = &[
    FnSpec {
        source: "gethealth",
        target: "GetHealth",
        code: 0x000E,
        arg: Some(None),
    },
    FnSpec {
        source: "getdistance",
        target: "GetDistance",
        code: 0x0011,
        arg: Some(None),
    },
    FnSpec {
        source: "menumode",
        target: "MenuMode",
        code: 0x0024,
        arg: None,
    },
    FnSpec {
        source: "getitemcount",
        target: "GetItemCount",
        code: 0x002F,
        arg: Some(Some(RecordKind::Object)),
    },
    FnSpec {
        source: "getjournalindex",
        target: "GetStage",
        code: 0x003A,
        arg: Some(Some(RecordKind::Quest)),
    },
];

fn func_spec(name: &str) -> Option<&'static FnSpec> {
    let lower = name.to_ascii_lowercase();
    FUNCS.iter().find(|f| f.source == lower)
}

/// Compiled form of one expression: push bytes plus the reprinted text.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CompiledExpr {
    pub bytes: Vec<u8>,
    pub text: String,
}

enum Pending {
    Op(BinOp),
    Paren,
}

/// Compile everything up to (and including) the end-of-line token.
/// Total: bad operands degrade to warnings plus safe defaults.
pub fn compile_expression(
    cur: &mut Cursor,
    resolver: &mut Resolver,
    diag: &mut Diagnostics,
) -> CompiledExpr {
    let mut out = CompiledExpr::default();
    let mut ops: Vec<Pending> = Vec::new();
    let mut words: Vec<String> = Vec::new();
    let mut negate_next = false;
    let mut expect_operand = true;

    loop {
        let Some(tok) = cur.advance() else { break };
        let tok = tok.clone();
        match tok.kind {
            TokenKind::Eol => break,
            TokenKind::Number => {
                let value = tok.number().unwrap_or_else(|| {
                    diag.warn(format!(
                        "line {}: number `{}` out of range, using 0",
                        tok.line, tok.text
                    ));
                    0
                });
                push_number(&mut out.bytes, value);
                words.push(tok.text.clone());
                finish_operand(&mut out.bytes, &mut negate_next, &mut words);
                expect_operand = false;
            }
            TokenKind::Str => {
                let body = clamp_str(&tok.text, tok.line, diag);
                out.bytes.push(TAG_STR);
                out.bytes
                    .extend_from_slice(&(body.len() as u16).to_le_bytes());
                out.bytes.extend_from_slice(body);
                words.push(format!("\"{}\"", tok.text));
                finish_operand(&mut out.bytes, &mut negate_next, &mut words);
                expect_operand = false;
            }
            TokenKind::Ident => {
                compile_operand_ident(
                    &tok.text,
                    tok.line,
                    cur,
                    resolver,
                    diag,
                    &mut out.bytes,
                    &mut words,
                    &mut negate_next,
                );
                finish_operand(&mut out.bytes, &mut negate_next, &mut words);
                expect_operand = false;
            }
            TokenKind::Op => match tok.text.as_str() {
                "(" => {
                    ops.push(Pending::Paren);
                    words.push("(".into());
                    expect_operand = true;
                }
                ")" => {
                    // pop and emit until the matching paren is discarded
                    loop {
                        match ops.pop() {
                            Some(Pending::Op(op)) => push_operator(&mut out.bytes, op),
                            Some(Pending::Paren) => break,
                            None => {
                                diag.warn(format!("line {}: unmatched `)`", tok.line));
                                break;
                            }
                        }
                    }
                    words.push(")".into());
                    expect_operand = false;
                }
                "-" if expect_operand => {
                    // leading unary minus: mark the next operand
                    negate_next = true;
                }
                other => match BinOp::from_str(other) {
                    Some(incoming) => {
                        // flush stacked operators of equal or higher precedence
                        while let Some(Pending::Op(top)) = ops.last() {
                            if top.prec() >= incoming.prec() {
                                push_operator(&mut out.bytes, *top);
                                ops.pop();
                            } else {
                                break;
                            }
                        }
                        ops.push(Pending::Op(incoming));
                        words.push(incoming.text().into());
                        expect_operand = true;
                    }
                    None => {
                        diag.warn(format!(
                            "line {}: operator `{}` not valid in an expression, ignored",
                            tok.line, other
                        ));
                    }
                },
            },
        }
    }

    // end of line: drain the operator stack
    while let Some(pending) = ops.pop() {
        match pending {
            Pending::Op(op) => push_operator(&mut out.bytes, op),
            Pending::Paren => diag.warn("unmatched `(` at end of line".to_string()),
        }
    }

    out.text = words.join(" ");
    out
}

fn push_number(bytes: &mut Vec<u8>, value: i32) {
    bytes.push(TAG_NUM);
    bytes.extend_from_slice(&value.to_le_bytes());
}

fn push_operator(bytes: &mut Vec<u8>, op: BinOp) {
    bytes.push(TAG_OP);
    bytes.push(op.code());
}

/// String payloads carry a u16 byte count; a longer literal is cut at
/// the field limit with a warning.
pub(crate) fn clamp_str<'a>(text: &'a str, line: u32, diag: &mut Diagnostics) -> &'a [u8] {
    let bytes = text.as_bytes();
    if bytes.len() > u16::MAX as usize {
        diag.warn(format!(
            "line {line}: string longer than 65535 bytes, truncated"
        ));
        &bytes[..u16::MAX as usize]
    } else {
        bytes
    }
}

/// Apply a pending unary negation to the operand just emitted.
fn finish_operand(bytes: &mut Vec<u8>, negate_next: &mut bool, words: &mut [String]) {
    if *negate_next {
        bytes.push(TAG_NEG);
        if let Some(last) = words.last_mut() {
            last.insert(0, '-');
        }
        *negate_next = false;
    }
}

#[allow(clippy::too_many_arguments)]
fn compile_operand_ident(
    raw: &str,
    line: u32,
    cur: &mut Cursor,
    resolver: &mut Resolver,
    diag: &mut Diagnostics,
    bytes: &mut Vec<u8>,
    words: &mut Vec<String>,
    negate_next: &mut bool,
) {
    // a folded leading minus marks the operand for negation
    let name = match raw.strip_prefix('-') {
        Some(rest) => {
            *negate_next = true;
            rest
        }
        None => raw,
    };

    // the one hand-written fixed-shape fallback: `getsoundplaying <sound>`
    // has no target equivalent and compiles to an always-true comparison;
    // the sound is still interned so the dependency survives.
    if name.eq_ignore_ascii_case("getsoundplaying") {
        let arg = cur
            .peek()
            .filter(|t| t.kind == TokenKind::Ident)
            .map(|t| t.text.clone());
        if let Some(arg) = arg {
            cur.advance();
            if resolver
                .resolve_external(&arg, Some(RecordKind::Sound))
                .is_none()
            {
                diag.record_unresolved(&arg);
            }
            push_number(bytes, 1);
            push_number(bytes, 1);
            push_operator(bytes, BinOp::Eq);
            words.push("1 == 1".into());
            return;
        }
        // no argument: fall through to the unresolved path below
    }

    // built-in expression function, optionally taking one reference arg
    if let Some(spec) = func_spec(name) {
        let mut text = spec.target.to_string();
        if let Some(hint) = spec.arg {
            let arg = cur
                .peek()
                .filter(|t| t.kind == TokenKind::Ident)
                .map(|t| t.text.clone());
            match arg {
                Some(arg) => {
                    cur.advance();
                    match resolver.resolve_external(&arg, hint) {
                        Some(idx) => {
                            bytes.push(TAG_REF);
                            bytes.extend_from_slice(&idx.to_le_bytes());
                            text.push(' ');
                            text.push_str(resolver.display_name(idx).unwrap_or(&arg));
                        }
                        None => {
                            diag.record_unresolved(&arg);
                            bytes.push(TAG_REF);
                            bytes.extend_from_slice(&0u16.to_le_bytes());
                            text.push(' ');
                            text.push_str(&arg);
                        }
                    }
                }
                None => {
                    diag.warn(format!(
                        "line {line}: `{}` needs a reference argument, using placeholder",
                        spec.target
                    ));
                    bytes.push(TAG_REF);
                    bytes.extend_from_slice(&0u16.to_le_bytes());
                }
            }
        }
        bytes.push(TAG_FUNC);
        bytes.extend_from_slice(&spec.code.to_le_bytes());
        words.push(text);
        return;
    }

    // member access `obj.var`
    if cur.peek().is_some_and(|t| t.kind == TokenKind::Op && t.text == ".")
        && cur.peek_at(1).is_some_and(|t| t.kind == TokenKind::Ident)
    {
        cur.advance(); // '.'
        let var = cur.advance().map(|t| t.text.clone()).unwrap_or_default();
        match resolver.resolve_member(name, &var) {
            Some((ref_idx, var_idx)) => {
                bytes.push(TAG_MEMBER);
                bytes.extend_from_slice(&ref_idx.to_le_bytes());
                bytes.extend_from_slice(&var_idx.to_le_bytes());
                let shown = resolver.display_name(ref_idx).unwrap_or(name).to_string();
                words.push(format!("{shown}.{var}"));
            }
            None => {
                diag.record_unresolved(&format!("{name}.{var}"));
                push_number(bytes, 0);
                words.push(format!("{name}.{var}"));
            }
        }
        return;
    }

    // plain identifier: local first, then the content database
    if let Some(idx) = resolver.resolve_local(name) {
        bytes.push(TAG_LOCAL);
        bytes.extend_from_slice(&idx.to_le_bytes());
        words.push(name.to_string());
        return;
    }
    match resolver.resolve_external(name, None) {
        Some(idx) => {
            bytes.push(TAG_REF);
            bytes.extend_from_slice(&idx.to_le_bytes());
            words.push(resolver.display_name(idx).unwrap_or(name).to_string());
        }
        None => {
            diag.record_unresolved(name);
            bytes.push(TAG_REF);
            bytes.extend_from_slice(&0u16.to_le_bytes());
            words.push(name.to_string());
        }
    }
}
