use arbitrary_int::u3;

/// How much of a register an instruction operates on. Drives the REX.W flag
/// and the byte/wide opcode split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterAccess {
    LowByte,
    LowFourBytes,
    LowEightBytes,
}

/// A register together with the slice of it being accessed.
pub type Register = (Registers, RegisterAccess);

/// Register numbers as the hardware encodes them. Only the low three bits
/// fit into ModRM; the fourth bit travels in the REX prefix.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Registers {
    A = 0b0000,
    C = 0b0001,
    D = 0b0010,
    B = 0b0011,
    SP = 0b0100,
    BP = 0b0101,
    SI = 0b0110,
    DI = 0b0111,
    R8 = 0b1000,
    R9 = 0b1001,
    R10 = 0b1010,
    R11 = 0b1011,
    R12 = 0b1100,
    R13 = 0b1101,
    R14 = 0b1110,
    R15 = 0b1111,
}

impl Registers {
    pub fn requires_rex_flag(self) -> bool {
        (self as u8) & 0b1000 != 0
    }

    pub fn as_u3(self) -> u3 {
        // just the 3 lower bits are relevant here
        u3::new((self as u8) & 0b0111)
    }
}
