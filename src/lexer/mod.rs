pub mod lexer;

/// The eight recognized source symbols. Everything else in a source file is
/// commentary and never reaches the translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // `>`: Move the data pointer right
    Right,
    // `<`: Move the data pointer left
    Left,

    // `+`: Increment the byte at the data pointer
    Increment,
    // `-`: Decrement the byte at the data pointer
    Decrement,

    // `.`: Write the byte at the data pointer to the output device
    Write,
    // `,`: Read the next byte from the input device into the current cell
    Read,

    // `[`: If the byte at the data pointer is zero, jump forward past the matching `]`
    JumpStart,
    // `]`: If the byte at the data pointer is non-zero, jump back to the matching `[`
    JumpEnd,
}

impl TokenKind {
    pub fn symbol(self) -> char {
        match self {
            TokenKind::Right => '>',
            TokenKind::Left => '<',
            TokenKind::Increment => '+',
            TokenKind::Decrement => '-',
            TokenKind::Write => '.',
            TokenKind::Read => ',',
            TokenKind::JumpStart => '[',
            TokenKind::JumpEnd => ']',
        }
    }
}

/// A recognized symbol together with where it appeared in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}
