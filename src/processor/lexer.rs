//! Hand-written lexer for the legacy script dialect.
//!
//! At this stage we *only* break the raw source string into `Token`s.
//! No commands are recognised yet – `additem`, `set`, etc. all come out
//! as `Ident("additem")`, `Ident("set")`, …   The dispatcher interprets
//! them later.
//
//  Lexical items:
//
//      Ident    ::= [A-Za-z][A-Za-z0-9_]*
//      Number   ::= '-'? [0-9]+ ('.' [0-9]+)?
//      Str      ::= '"' ( [^"] | '""' )* '"'
//      Op       ::= one of  = == != < <= > >= + - * / && || ( ) . += -=
//      Comment  ::= ';' to end of line (discarded)
//
//  A leading '-' is folded into the following identifier/number token
//  only when the next character belongs to one; otherwise it is the
//  subtraction operator. The dispatcher sorts out what the fold means.
//
//  Every input line yields exactly one `Eol` token, even when the line
//  is blank or comment-only.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Op,
    Eol,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// 1-based source line, for diagnostics.
    pub line: u32,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, line: u32) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
        }
    }

    /// Numeric value of a `Number` token (integer part only).
    pub fn number(&self) -> Option<i32> {
        if self.kind != TokenKind::Number {
            return None;
        }
        let text = match self.text.split_once('.') {
            Some((whole, _)) => whole,
            None => &self.text,
        };
        text.parse().ok()
    }
}

/// Tokenize a whole script. Total: unrecognised characters are skipped.
pub fn tokenize(src: &str) -> Vec<Token> {
    let mut out = Vec::new();
    for (idx, line) in src.lines().enumerate() {
        let line_no = idx as u32 + 1;
        lex_line(line, line_no, &mut out);
        out.push(Token::new(TokenKind::Eol, "", line_no));
    }
    out
}

fn lex_line(line: &str, line_no: u32, out: &mut Vec<Token>) {
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' => {
                chars.next();
            }
            ';' => break, // comment to end of line
            '"' => {
                chars.next();
                out.push(read_string(&mut chars, line_no));
            }
            '-' => {
                chars.next();
                // Fold into the next token only when glued to it.
                match chars.peek() {
                    Some(&n) if n.is_ascii_digit() => {
                        let mut tok = read_number(&mut chars, line_no);
                        tok.text.insert(0, '-');
                        out.push(tok);
                    }
                    Some(&n) if n.is_ascii_alphabetic() || n == '_' => {
                        let mut tok = read_ident(&mut chars, line_no);
                        tok.text.insert(0, '-');
                        out.push(tok);
                    }
                    Some(&'=') => {
                        chars.next();
                        out.push(Token::new(TokenKind::Op, "-=", line_no));
                    }
                    _ => out.push(Token::new(TokenKind::Op, "-", line_no)),
                }
            }
            c if c.is_ascii_digit() => out.push(read_number(&mut chars, line_no)),
            c if c.is_ascii_alphabetic() || c == '_' => {
                out.push(read_ident(&mut chars, line_no));
            }
            '=' | '!' | '<' | '>' | '+' | '&' | '|' | '*' | '/' | '(' | ')' | '.' => {
                chars.next();
                out.push(read_operator(c, &mut chars, line_no));
            }
            _ => {
                // Unrecognised character: skip and carry on.
                chars.next();
            }
        }
    }
}

fn consume_while<F>(chars: &mut std::iter::Peekable<std::str::Chars>, pred: F, buf: &mut String)
where
    F: Fn(char) -> bool,
{
    while let Some(&c) = chars.peek() {
        if pred(c) {
            buf.push(c);
            chars.next();
        } else {
            break;
        }
    }
}

fn read_ident(chars: &mut std::iter::Peekable<std::str::Chars>, line_no: u32) -> Token {
    let mut id = String::new();
    consume_while(chars, |c| c.is_ascii_alphanumeric() || c == '_', &mut id);
    Token::new(TokenKind::Ident, id, line_no)
}

fn read_number(chars: &mut std::iter::Peekable<std::str::Chars>, line_no: u32) -> Token {
    let mut num = String::new();
    consume_while(chars, |c| c.is_ascii_digit(), &mut num);
    if chars.peek() == Some(&'.') {
        // Only a fraction if a digit follows; a bare '.' is member access.
        let mut ahead = chars.clone();
        ahead.next();
        if ahead.peek().is_some_and(|c| c.is_ascii_digit()) {
            num.push('.');
            chars.next();
            consume_while(chars, |c| c.is_ascii_digit(), &mut num);
        }
    }
    Token::new(TokenKind::Number, num, line_no)
}

/// Quoted string body. A doubled quote is an escaped quote; a missing
/// closing quote just terminates at end of line.
fn read_string(chars: &mut std::iter::Peekable<std::str::Chars>, line_no: u32) -> Token {
    let mut txt = String::new();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                txt.push('"');
                chars.next();
            } else {
                break;
            }
        } else {
            txt.push(c);
        }
    }
    Token::new(TokenKind::Str, txt, line_no)
}

/// One-character lookahead for the two-character operators.
fn read_operator(
    first: char,
    chars: &mut std::iter::Peekable<std::str::Chars>,
    line_no: u32,
) -> Token {
    let two = match (first, chars.peek().copied()) {
        ('=', Some('=')) => Some("=="),
        ('!', Some('=')) => Some("!="),
        ('<', Some('=')) => Some("<="),
        ('>', Some('=')) => Some(">="),
        ('&', Some('&')) => Some("&&"),
        ('|', Some('|')) => Some("||"),
        ('+', Some('=')) => Some("+="),
        _ => None,
    };
    match two {
        Some(op) => {
            chars.next();
            Token::new(TokenKind::Op, op, line_no)
        }
        None => Token::new(TokenKind::Op, first.to_string(), line_no),
    }
}
