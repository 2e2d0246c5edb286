//! Explicit cursor over the owned token vector.
//!
//! Index-based so the dispatcher can look ahead and rewind without any
//! iterator put-back gymnastics.

use super::lexer::{Token, TokenKind};

pub struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead)
    }

    pub fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// Step back `n` tokens (saturating at the start).
    pub fn rewind(&mut self, n: usize) {
        self.pos = self.pos.saturating_sub(n);
    }

    pub fn mark(&self) -> usize {
        self.pos
    }

    pub fn reset(&mut self, mark: usize) {
        self.pos = mark;
    }

    /// Consume tokens up to and including the next end-of-line marker.
    pub fn skip_to_eol(&mut self) {
        while let Some(tok) = self.advance() {
            if tok.kind == TokenKind::Eol {
                break;
            }
        }
    }
}
