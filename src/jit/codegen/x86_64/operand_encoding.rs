use arbitrary_int::u3;

use super::instruction::{
    AddressingMode, Displacement, Immediate, Instruction, ModRM, Prefix, RexPrefixEncoding,
    TwoByteOpcode,
};
use super::registers::{Register, RegisterAccess, Registers};

/// A memory-or-register operand for the r/m field.
#[derive(Clone, Debug)]
pub enum MemoryBaseRegister {
    /// The register value itself, no memory access
    Register(Register),
    /// Dereference the register plus a displacement
    DisplacementOnly(Register, Displacement),
}

/// The operand shape of one instruction, named after the encoding column of
/// the opcode tables.
///
/// The main reason for this kind of design is that there are many variants
/// of the same operator (ADD/MOV/CMP/...) that differ only in their
/// encoding, i.e. MOV r64, imm64 uses OI while MOV r/m64, imm32 uses MI.
/// Each operator function picks its opcode off the shape it is handed.
#[derive(Clone, Debug)]
pub enum OperandEncoding {
    /// "MI", operand 1 = ModRM:r/m (r, w), operand 2 = imm8/32
    MemoryImmediate(MemoryBaseRegister, Immediate),

    /// "MR", operand 1 = ModRM:r/m (r, w), operand 2 = ModRM:reg (r)
    MemoryRegister(MemoryBaseRegister, Register),

    /// "RM", operand 1 = ModRM:reg (r), operand 2 = ModRM:r/m (r, w)
    RegisterMemory(Register, MemoryBaseRegister),

    /// "OI", operand 1 = opcode + rd (w), operand 2 = imm8/32/64
    OpcodeImmediate(Register, Immediate),

    /// "D", a signed offset relative to the next instruction's address
    RelativeOffset(Immediate),
}

impl AddressingMode {
    pub fn from_displacement(displacement: Option<Displacement>) -> AddressingMode {
        match displacement {
            Some(Displacement::ZeroByteDisplacement) => AddressingMode::ZeroByteDisplacement,
            Some(Displacement::OneByteDisplacement(_)) => AddressingMode::OneByteDisplacement,
            Some(Displacement::FourByteDisplacement(_)) => AddressingMode::FourByteDisplacement,
            None => AddressingMode::RegisterDirect,
        }
    }
}

/// The opcode-side half of an instruction, before the operands are encoded
/// into it.
pub struct InstructionInput {
    pub mandatory_prefix: Option<u8>,
    pub two_byte_opcode: bool,
    pub primary_opcode: u8,
    pub opcode_extension: Option<u3>,
}

impl InstructionInput {
    pub fn new(primary_opcode: u8) -> InstructionInput {
        InstructionInput {
            mandatory_prefix: None,
            two_byte_opcode: false,
            primary_opcode,
            opcode_extension: None,
        }
    }

    pub fn with_extension(mut self, opcode_extension: u3) -> InstructionInput {
        self.opcode_extension = Some(opcode_extension);
        self
    }

    pub fn with_two_byte(mut self) -> InstructionInput {
        self.two_byte_opcode = true;
        self
    }
}

impl Instruction {
    fn set_rex(&mut self, rex: RexPrefixEncoding) {
        self.prefix.rex = Some(self.prefix.rex.unwrap_or(RexPrefixEncoding::Base) | rex);
    }

    fn set_modrm<T: FnOnce(ModRM) -> ModRM>(&mut self, func: T) {
        self.mod_rm = Some(func(self.mod_rm.unwrap_or(ModRM::register_direct())));
    }

    fn encode_register(&mut self, register: Register, output_modrm: bool) {
        let (reg, access) = register;
        if reg.requires_rex_flag() {
            // the reg field extension for ModRM encodings, the r/m one when
            // the register rides in the opcode itself
            self.set_rex(if output_modrm {
                RexPrefixEncoding::R
            } else {
                RexPrefixEncoding::B
            });
        }

        if access == RegisterAccess::LowEightBytes {
            self.set_rex(RexPrefixEncoding::W);
        }

        if output_modrm {
            self.set_modrm(|modrm| modrm.with_register(reg.as_u3()));
        }
    }

    fn encode_memregister(&mut self, mem_reg: MemoryBaseRegister) {
        match mem_reg {
            MemoryBaseRegister::Register((reg, access)) => {
                if reg.requires_rex_flag() {
                    self.set_rex(RexPrefixEncoding::B);
                }

                if access == RegisterAccess::LowEightBytes {
                    self.set_rex(RexPrefixEncoding::W);
                }

                self.set_modrm(|modrm| modrm.with_register_memory(reg.as_u3()));
            }
            MemoryBaseRegister::DisplacementOnly((reg, _), mut displacement) => {
                if reg.requires_rex_flag() {
                    self.set_rex(RexPrefixEncoding::B);
                }

                if (reg == Registers::BP || reg == Registers::R13)
                    && displacement == Displacement::ZeroByteDisplacement
                {
                    // mod 00 with r/m 101 means RIP-relative, so a bare
                    // BP/R13 base has to take the one-byte displacement form
                    displacement = Displacement::OneByteDisplacement(0);
                }

                self.set_modrm(|modrm| {
                    modrm
                        .with_addressing_mode(
                            AddressingMode::from_displacement(Some(displacement)).as_u2(),
                        )
                        .with_register_memory(reg.as_u3())
                });

                self.displacement = Some(displacement);
            }
        }
    }

    fn encode_immediate(&mut self, imm: Immediate) {
        self.immediate = Some(imm);
    }

    pub fn new(input: InstructionInput, encoding: OperandEncoding) -> Instruction {
        let two_byte_opcode = if input.two_byte_opcode {
            Some(TwoByteOpcode::Value)
        } else {
            None
        };

        let mut instruction = Instruction {
            prefix: Prefix {
                mandatory_prefix: input.mandatory_prefix,
                rex: None,
                two_byte_opcode,
            },
            primary_opcode: input.primary_opcode,
            mod_rm: input
                .opcode_extension
                .map(|extension| ModRM::register_direct().with_register(extension)),
            displacement: None,
            immediate: None,
        };

        match encoding {
            OperandEncoding::OpcodeImmediate((dest_reg, access), imm) => {
                // the register is stored in the opcode's own low bits
                instruction.primary_opcode |= dest_reg.as_u3().value();
                instruction.encode_register((dest_reg, access), false);
                instruction.encode_immediate(imm);
            }
            OperandEncoding::MemoryImmediate(mem_reg, imm) => {
                instruction.encode_memregister(mem_reg);
                instruction.encode_immediate(imm);
            }
            // MR vs RM only matters for the opcode (and for what is dst/src),
            // from the encoding's point of view both carry 1 mem_reg & 1 reg
            OperandEncoding::MemoryRegister(mem_reg, reg)
            | OperandEncoding::RegisterMemory(reg, mem_reg) => {
                instruction.encode_memregister(mem_reg);
                instruction.encode_register(reg, true);
            }
            OperandEncoding::RelativeOffset(imm) => {
                instruction.encode_immediate(imm);
            }
        }

        instruction
    }
}
