//! The closed set of recognised statement keywords.
//!
//! Dispatch is table-driven: one lower-cased lookup map built on first
//! use, classifying a statement-start word into control keywords,
//! declarations, regular commands (by arity) or the known-unsupported
//! bucket. Anything else is `Unknown` and fatal at statement start.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::model::RecordKind;

/// Declared type of a local variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Short,
    Long,
    Float,
}

impl VarType {
    pub fn target_name(self) -> &'static str {
        match self {
            VarType::Short => "Short",
            VarType::Long => "Long",
            VarType::Float => "Float",
        }
    }
}

/// What one argument slot of a command expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Identifier resolved through the content database.
    Ref(RecordKind),
    /// Integer literal.
    Number,
    /// Quoted string.
    Text,
}

/// Fixed or variable argument shape of a regular command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    None,
    One(ArgKind),
    Two(ArgKind, ArgKind),
    /// Mandatory head argument, then up to `max_rest` optional tail args.
    Variadic {
        head: ArgKind,
        rest: ArgKind,
        max_rest: usize,
    },
}

/// One regular (non-control) command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub source: &'static str,
    /// Mnemonic used in the translated text.
    pub target: &'static str,
    pub opcode: u16,
    pub arity: Arity,
}

/// Statement-start classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stmt {
    Begin,
    End,
    If,
    ElseIf,
    Else,
    EndIf,
    Set,
    Decl(VarType),
    Command(&'static CommandSpec),
    /// Recognised but not convertible: warn and skip the line.
    Unsupported(&'static str),
    Unknown,
}

// Statement opcodes (blocks and assignment).
pub const OP_BEGIN: u16 = 0x0010;
pub const OP_SET: u16 = 0x0015;
pub const OP_IF: u16 = 0x0016;
pub const OP_ELSEIF: u16 = 0x0017;
pub const OP_ELSE: u16 = 0x0018;
pub const OP_SCRIPTNAME: u16 = 0x001D;

static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        source: "messagebox",
        target: "MessageBox",
        opcode: 0x1000,
        arity: Arity::Variadic {
            head: ArgKind::Text,
            rest: ArgKind::Text,
            max_rest: 9,
        },
    },
    CommandSpec {
        source: "additem",
        target: "AddItem",
        opcode: 0x1002,
        arity: Arity::Two(ArgKind::Ref(RecordKind::Object), ArgKind::Number),
    },
    CommandSpec {
        source: "activate",
        target: "Activate",
        opcode: 0x1017,
        arity: Arity::None,
    },
    CommandSpec {
        source: "enable",
        target: "Enable",
        opcode: 0x1021,
        arity: Arity::None,
    },
    CommandSpec {
        source: "disable",
        target: "Disable",
        opcode: 0x1022,
        arity: Arity::None,
    },
    CommandSpec {
        source: "placeatme",
        target: "PlaceAtMe",
        opcode: 0x1025,
        arity: Arity::Variadic {
            head: ArgKind::Ref(RecordKind::Object),
            rest: ArgKind::Number,
            max_rest: 3,
        },
    },
    CommandSpec {
        source: "playsound",
        target: "PlaySound",
        opcode: 0x1026,
        arity: Arity::One(ArgKind::Ref(RecordKind::Sound)),
    },
    CommandSpec {
        source: "startcombat",
        target: "StartCombat",
        opcode: 0x1038,
        arity: Arity::One(ArgKind::Ref(RecordKind::Actor)),
    },
    CommandSpec {
        source: "journal",
        target: "SetStage",
        opcode: 0x1039,
        arity: Arity::Two(ArgKind::Ref(RecordKind::Quest), ArgKind::Number),
    },
    CommandSpec {
        source: "startscript",
        target: "StartScript",
        opcode: 0x1045,
        arity: Arity::One(ArgKind::Ref(RecordKind::Script)),
    },
    CommandSpec {
        source: "stopscript",
        target: "StopScript",
        opcode: 0x1046,
        arity: Arity::One(ArgKind::Ref(RecordKind::Script)),
    },
    CommandSpec {
        source: "removeitem",
        target: "RemoveItem",
        opcode: 0x1052,
        arity: Arity::Two(ArgKind::Ref(RecordKind::Object), ArgKind::Number),
    },
    CommandSpec {
        source: "resurrect",
        target: "Resurrect",
        opcode: 0x1089,
        arity: Arity::None,
    },
];

/// Keywords we recognise but cannot express in the target dialect.
static UNSUPPORTED: &[&str] = &["fadein", "fadeout", "modregion", "streammusic"];

static TABLE: Lazy<HashMap<&'static str, Stmt>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert("begin", Stmt::Begin);
    map.insert("end", Stmt::End);
    map.insert("if", Stmt::If);
    map.insert("elseif", Stmt::ElseIf);
    map.insert("else", Stmt::Else);
    map.insert("endif", Stmt::EndIf);
    map.insert("set", Stmt::Set);
    map.insert("short", Stmt::Decl(VarType::Short));
    map.insert("long", Stmt::Decl(VarType::Long));
    map.insert("float", Stmt::Decl(VarType::Float));
    for spec in COMMANDS {
        map.insert(spec.source, Stmt::Command(spec));
    }
    for kw in UNSUPPORTED {
        map.insert(*kw, Stmt::Unsupported(*kw));
    }
    map
});

/// Classify a statement-start word (case-insensitive).
pub fn classify(word: &str) -> Stmt {
    let lower = word.to_ascii_lowercase();
    TABLE.get(lower.as_str()).copied().unwrap_or(Stmt::Unknown)
}

/// Callback events recognised as top-level `if` guards. The id is the
/// block-mode value written into the begin-block header.
pub fn callback_event(word: &str) -> Option<(&'static str, u16)> {
    match word.to_ascii_lowercase().as_str() {
        "onactivate" => Some(("OnActivate", 2)),
        "ondeath" => Some(("OnDeath", 3)),
        "onknockout" => Some(("OnKnockout", 4)),
        "onpcequip" => Some(("OnPCEquip", 5)),
        _ => None,
    }
}
