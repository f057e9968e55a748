use thiserror::Error;

use crate::lexer::{Token, TokenKind};
use crate::optimizer::optimize_loop;

use super::{Op, Program};

/// Bracket mismatches found while translating. Positions point at the
/// offending bracket in the source.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("unmatched '[' at line {line}, column {column}")]
    UnmatchedOpen { line: usize, column: usize },

    #[error("unmatched ']' at line {line}, column {column}")]
    UnmatchedClose { line: usize, column: usize },
}

/// Lower a token stream into ops in a single pass.
///
/// Runs of identical symbols become one op carrying the run length. An open
/// bracket pushes its op index onto a stack and emits a placeholder; the
/// matching close pops it, offers the loop body to [`optimize_loop`], and
/// either splices the replacement over the whole loop or patches the pair
/// with each other's indices. Inner loops close before outer ones, so by the
/// time an outer body is inspected its inner loops are already collapsed.
pub fn translate(tokens: &[Token]) -> Result<Program, SyntaxError> {
    let mut ops: Program = Vec::with_capacity(tokens.len());
    // (index of the pending JumpIfZero, opening token for diagnostics)
    let mut loop_stack: Vec<(usize, Token)> = vec![];

    let mut pos = 0;
    while pos < tokens.len() {
        let token = tokens[pos];
        match token.kind {
            TokenKind::JumpStart => {
                loop_stack.push((ops.len(), token));
                // target patched when the loop closes
                ops.push(Op::JumpIfZero(0));
                pos += 1;
            }
            TokenKind::JumpEnd => {
                let (start, _) = loop_stack.pop().ok_or(SyntaxError::UnmatchedClose {
                    line: token.line,
                    column: token.column,
                })?;
                match optimize_loop(&ops[start + 1..]) {
                    Some(op) => {
                        // the whole loop, placeholder included, becomes one op
                        ops.truncate(start);
                        ops.push(op);
                    }
                    None => {
                        ops[start] = Op::JumpIfZero(ops.len());
                        ops.push(Op::JumpIfNotZero(start));
                    }
                }
                pos += 1;
            }
            kind => {
                let run_start = pos;
                pos += 1;
                while pos < tokens.len() && tokens[pos].kind == kind {
                    pos += 1;
                }
                let count = pos - run_start;
                ops.push(match kind {
                    TokenKind::Right => Op::IncPtr(count),
                    TokenKind::Left => Op::DecPtr(count),
                    TokenKind::Increment => Op::IncData(count),
                    TokenKind::Decrement => Op::DecData(count),
                    TokenKind::Read => Op::ReadByte(count),
                    TokenKind::Write => Op::WriteByte(count),
                    TokenKind::JumpStart | TokenKind::JumpEnd => unreachable!(),
                });
            }
        }
    }

    if let Some((_, token)) = loop_stack.first() {
        return Err(SyntaxError::UnmatchedOpen {
            line: token.line,
            column: token.column,
        });
    }

    Ok(ops)
}
