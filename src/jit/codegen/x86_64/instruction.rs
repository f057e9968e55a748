use arbitrary_int::{u2, u3};
use bitbybit::bitfield;
use bitflags::bitflags;

use crate::jit::codegen::MachineCode;

/// One fully-resolved instruction, ready to be written to the stream.
///
/// Structure is: (everything is 1 byte unless otherwise specified)
/// Prefix { MandatoryPrefix | REX | TwoByteOpcodeFlag } | Opcode | MOD/RM | Displacement (1/4) | Immediate (1/4/8)
#[derive(Clone, Debug)]
pub struct Instruction {
    pub prefix: Prefix,

    pub primary_opcode: u8,
    pub mod_rm: Option<ModRM>,

    pub displacement: Option<Displacement>,
    pub immediate: Option<Immediate>,
}

#[derive(Copy, Clone, Debug)]
#[repr(u8)]
pub enum TwoByteOpcode {
    Value = 0x0F,
}

/// The bytes that can precede the opcode, in their required order.
#[derive(Clone, Debug)]
pub struct Prefix {
    pub mandatory_prefix: Option<u8>,
    pub rex: Option<RexPrefixEncoding>,
    /// If set it should just be set to `TwoByteOpcode::Value`
    pub two_byte_opcode: Option<TwoByteOpcode>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Displacement {
    ZeroByteDisplacement,
    OneByteDisplacement(u8),
    FourByteDisplacement(u32),
}

#[derive(Clone, Copy, Debug)]
pub enum Immediate {
    Imm8(u8),
    Imm32(u32),
    /// possible but not with a displacement
    Imm64(u64),
}

impl Immediate {
    pub fn is_zero(&self) -> bool {
        match *self {
            Immediate::Imm8(i) => i == 0,
            Immediate::Imm32(i) => i == 0,
            Immediate::Imm64(i) => i == 0,
        }
    }
}

/// The addressing mode stored in the top two ModRM bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressingMode {
    /// Dereference the register, no displacement bytes follow
    ZeroByteDisplacement,
    /// Dereference the register plus a one-byte displacement
    OneByteDisplacement,
    /// Dereference the register plus a four-byte displacement
    FourByteDisplacement,
    /// Use the register value directly, no memory access
    RegisterDirect,
}

impl AddressingMode {
    pub fn as_u2(self) -> u2 {
        match self {
            AddressingMode::ZeroByteDisplacement => u2::new(0b00),
            AddressingMode::OneByteDisplacement => u2::new(0b01),
            AddressingMode::FourByteDisplacement => u2::new(0b10),
            AddressingMode::RegisterDirect => u2::new(0b11),
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RexPrefixEncoding: u8 {
        const Base = 0b0100_0000;
        /// Wide instruction (64 bit instead of 32)
        const W = 0b0000_1000;
        /// Extends the `register` field in MOD/RM
        const R = 0b0000_0100;
        /// Extends the index field in SIB
        const X = 0b0000_0010;
        /// Extends the `register_memory` field in MOD/RM
        const B = 0b0000_0001;
    }
}

impl RexPrefixEncoding {
    pub fn as_u8(&self) -> u8 {
        self.bits()
    }
}

/// Addressing mode, register and register-or-memory fields packed into one
/// byte.
#[bitfield(u8)]
#[derive(Debug)]
pub struct ModRM {
    #[bits(6..=7, rw)]
    pub addressing_mode: u2,

    /// Source/destination register, or the opcode extension for the /digit
    /// instruction forms. REX.R extends it to the upper registers
    #[bits(3..=5, rw)]
    pub register: u3,

    /// REX.B extends it to the upper registers
    #[bits(0..=2, rw)]
    pub register_memory: u3,
}

impl ModRM {
    /// Mode 0b11 with both register fields zeroed.
    pub fn register_direct() -> ModRM {
        ModRM::new_with_raw_value(0b11_000_000)
    }
}

impl Instruction {
    /// Append the encoded bytes onto the stream.
    pub fn encode(&self, code: &mut MachineCode) {
        if let Some(prefix) = self.prefix.mandatory_prefix {
            code.emit_u8(prefix);
        }
        // REX sits between the legacy prefixes and the 0x0F escape byte
        if let Some(rex) = self.prefix.rex {
            code.emit_u8(rex.as_u8());
        }
        if let Some(two_byte_opcode) = self.prefix.two_byte_opcode {
            code.emit_u8(two_byte_opcode as u8);
        }
        code.emit_u8(self.primary_opcode);
        if let Some(mod_rm) = self.mod_rm {
            code.emit_u8(mod_rm.raw_value());
        }
        if let Some(displacement) = self.displacement {
            match displacement {
                Displacement::ZeroByteDisplacement => {}
                Displacement::OneByteDisplacement(byte) => code.emit_u8(byte),
                Displacement::FourByteDisplacement(double_word) => code.emit_le(double_word),
            }
        }
        if let Some(immediate) = self.immediate {
            match immediate {
                Immediate::Imm8(byte) => code.emit_u8(byte),
                Immediate::Imm32(double_word) => code.emit_le(double_word),
                Immediate::Imm64(quad_word) => code.emit_le(quad_word),
            }
        }
    }
}
