pub mod translate;

/// The instruction set the translator lowers token streams into. Runs of
/// identical symbols collapse into a single op carrying the run length, and
/// recognized loop shapes collapse into the dedicated ops at the bottom.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    /// Move the data pointer right by the run length
    IncPtr(usize),
    /// Move the data pointer left by the run length
    DecPtr(usize),
    /// Add the run length to the cell at the data pointer, modulo 256
    IncData(usize),
    /// Subtract the run length from the cell at the data pointer, modulo 256
    DecData(usize),
    /// Read one input byte into the current cell, repeated count times
    ReadByte(usize),
    /// Write the current cell to output, repeated count times
    WriteByte(usize),
    /// If the current cell is zero, jump to the partner JumpIfNotZero
    JumpIfZero(usize),
    /// If the current cell is non-zero, jump back to the partner JumpIfZero
    JumpIfNotZero(usize),
    /// `[-]` / `[+]`: set the current cell to zero
    ClearCell,
    /// `[>]` / `[<]`: step the pointer by the stride until it lands on a
    /// zero cell
    MovePointerUntilZero(isize),
    /// `[->+<]` and friends: add the current cell into the cell at the
    /// offset, then clear the current cell
    MoveAndClearData(isize),
}

/// Ops execute in insertion order; jump targets are indices into the same
/// sequence.
pub type Program = Vec<Op>;

impl Op {
    /// One-character tag for dumps. The optimized ops no longer correspond
    /// to a single source symbol so they get letters instead.
    pub fn symbol(&self) -> char {
        match self {
            Op::IncPtr(_) => '>',
            Op::DecPtr(_) => '<',
            Op::IncData(_) => '+',
            Op::DecData(_) => '-',
            Op::ReadByte(_) => ',',
            Op::WriteByte(_) => '.',
            Op::JumpIfZero(_) => '[',
            Op::JumpIfNotZero(_) => ']',
            Op::ClearCell => 's',
            Op::MovePointerUntilZero(_) => 'p',
            Op::MoveAndClearData(_) => 'm',
        }
    }
}
