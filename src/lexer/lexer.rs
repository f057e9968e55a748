use std::str::Chars;

use super::{Token, TokenKind};

/// Filters a source stream down to the recognized symbols, tagging each with
/// its position. Filtering cannot fail: an unrecognized character is a
/// comment, and bracket balance is the translator's concern.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    /** Human readable position in the source */
    cur_line: usize,
    cur_col: usize,

    chars: Chars<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Lexer<'a> {
        Lexer {
            cur_line: 1,
            cur_col: 1,

            chars: source.chars(),
        }
    }

    fn recognize(c: char) -> Option<TokenKind> {
        match c {
            '>' => Some(TokenKind::Right),
            '<' => Some(TokenKind::Left),
            '+' => Some(TokenKind::Increment),
            '-' => Some(TokenKind::Decrement),
            '.' => Some(TokenKind::Write),
            ',' => Some(TokenKind::Read),
            '[' => Some(TokenKind::JumpStart),
            ']' => Some(TokenKind::JumpEnd),
            _ => None,
        }
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.cur_line += 1;
            self.cur_col = 1;
        } else {
            self.cur_col += 1;
        }
        Some(c)
    }

    pub fn next_token(&mut self) -> Option<Token> {
        loop {
            // record the position before consuming, consume_char has already
            // moved past the character
            let line = self.cur_line;
            let column = self.cur_col;
            let c = self.consume_char()?;
            if let Some(kind) = Self::recognize(c) {
                return Some(Token { kind, line, column });
            }
        }
    }

    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = vec![];
        while let Some(token) = self.next_token() {
            tokens.push(token);
        }
        tokens
    }
}
