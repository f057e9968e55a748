use arbitrary_int::u3;

use super::instruction::{Immediate, Instruction, Prefix, RexPrefixEncoding, TwoByteOpcode};
use super::operand_encoding::{InstructionInput, MemoryBaseRegister, OperandEncoding};
use super::registers::{RegisterAccess, Registers};

/// Condition codes of the two-byte conditional jump family.
#[derive(Clone, Copy, Debug)]
#[repr(u8)]
pub enum JumpOperator {
    Zero = 0x84,
    NotZero = 0x85,
}

fn imm_opcode(imm: Immediate, imm32_opcode: u8, imm8_opcode: u8) -> u8 {
    match imm {
        Immediate::Imm32(_) => imm32_opcode,
        Immediate::Imm8(_) => imm8_opcode,
        // not supported
        Immediate::Imm64(_) => unreachable!(),
    }
}

fn operand_access(mem_reg: &MemoryBaseRegister) -> RegisterAccess {
    match mem_reg {
        MemoryBaseRegister::Register((_, access)) => *access,
        MemoryBaseRegister::DisplacementOnly((_, access), _) => *access,
    }
}

/// The ADD/SUB/XOR/CMP family share their encoding layout: a byte and a
/// wide opcode for each of the MI/MR/RM shapes, plus a /digit extension for
/// the immediate forms. `base_opcode` is the byte-sized MR opcode; the rest
/// are fixed offsets from it.
fn math_op(name: &'static str, op: OperandEncoding, base_opcode: u8, extension: u8) -> Instruction {
    match op {
        OperandEncoding::MemoryImmediate(ref mem_reg, imm) => {
            let opcode = if operand_access(mem_reg) == RegisterAccess::LowByte {
                0x80
            } else {
                imm_opcode(imm, 0x81, 0x83)
            };
            Instruction::new(
                InstructionInput::new(opcode).with_extension(u3::new(extension)),
                op,
            )
        }
        OperandEncoding::MemoryRegister(_, (_, access)) => {
            let offset = if access == RegisterAccess::LowByte { 0 } else { 1 };
            Instruction::new(InstructionInput::new(base_opcode + offset), op)
        }
        OperandEncoding::RegisterMemory((_, access), _) => {
            let offset = if access == RegisterAccess::LowByte { 2 } else { 3 };
            Instruction::new(InstructionInput::new(base_opcode + offset), op)
        }
        OperandEncoding::OpcodeImmediate(_, _) | OperandEncoding::RelativeOffset(_) => {
            unreachable!("{:?} is not a valid encoding type for {}", op, name)
        }
    }
}

pub fn add(op: OperandEncoding) -> Instruction {
    math_op("add", op, 0x00, 0)
}

pub fn sub(op: OperandEncoding) -> Instruction {
    math_op("sub", op, 0x28, 5)
}

pub fn xor(op: OperandEncoding) -> Instruction {
    math_op("xor", op, 0x30, 6)
}

pub fn cmp(op: OperandEncoding) -> Instruction {
    math_op("cmp", op, 0x38, 7)
}

pub fn mov(op: OperandEncoding) -> Instruction {
    match op {
        /* == Optimizations begin == */
        // XOR(reg, reg) is smaller than MOV(reg, 0) and better pipelined;
        // only applies when the destination really is a register, a memory
        // destination must stay a store
        OperandEncoding::OpcodeImmediate(reg, imm)
        | OperandEncoding::MemoryImmediate(MemoryBaseRegister::Register(reg), imm)
            if imm.is_zero() =>
        {
            xor(OperandEncoding::MemoryRegister(
                MemoryBaseRegister::Register(reg),
                reg,
            ))
        }
        /* == Optimizations end == */
        OperandEncoding::MemoryImmediate(ref mem_reg, _) => {
            let opcode = if operand_access(mem_reg) == RegisterAccess::LowByte {
                0xC6
            } else {
                0xC7
            };
            Instruction::new(InstructionInput::new(opcode).with_extension(u3::new(0)), op)
        }
        OperandEncoding::MemoryRegister(_, (_, access)) => {
            let opcode = if access == RegisterAccess::LowByte { 0x88 } else { 0x89 };
            Instruction::new(InstructionInput::new(opcode), op)
        }
        OperandEncoding::RegisterMemory((_, access), _) => {
            let opcode = if access == RegisterAccess::LowByte { 0x8A } else { 0x8B };
            Instruction::new(InstructionInput::new(opcode), op)
        }
        OperandEncoding::OpcodeImmediate(_, _) => Instruction::new(InstructionInput::new(0xB8), op),
        OperandEncoding::RelativeOffset(_) => {
            unreachable!("{:?} is not a valid encoding type for mov", op)
        }
    }
}

pub fn jcc(condition: JumpOperator, displacement: i32) -> Instruction {
    Instruction::new(
        InstructionInput::new(condition as u8).with_two_byte(),
        OperandEncoding::RelativeOffset(Immediate::Imm32(displacement as u32)),
    )
}

pub fn jmp(displacement: i32) -> Instruction {
    Instruction::new(
        InstructionInput::new(0xE9),
        OperandEncoding::RelativeOffset(Immediate::Imm32(displacement as u32)),
    )
}

pub fn push(register: Registers) -> Instruction {
    opcode_plus_register(0x50, register)
}

pub fn pop(register: Registers) -> Instruction {
    opcode_plus_register(0x58, register)
}

pub fn syscall() -> Instruction {
    let mut instruction = bare(0x05);
    instruction.prefix.two_byte_opcode = Some(TwoByteOpcode::Value);
    instruction
}

pub fn ret() -> Instruction {
    bare(0xC3)
}

/// 64-bit push/pop forms, the register riding in the opcode's low bits.
fn opcode_plus_register(opcode: u8, register: Registers) -> Instruction {
    let rex = if register.requires_rex_flag() {
        Some(RexPrefixEncoding::Base | RexPrefixEncoding::B)
    } else {
        None
    };
    Instruction {
        prefix: Prefix {
            mandatory_prefix: None,
            rex,
            two_byte_opcode: None,
        },
        primary_opcode: opcode | register.as_u3().value(),
        mod_rm: None,
        displacement: None,
        immediate: None,
    }
}

fn bare(primary_opcode: u8) -> Instruction {
    Instruction {
        prefix: Prefix {
            mandatory_prefix: None,
            rex: None,
            two_byte_opcode: None,
        },
        primary_opcode,
        mod_rm: None,
        displacement: None,
        immediate: None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::instruction::Displacement;
    use super::*;
    use crate::jit::codegen::MachineCode;

    fn bytes(instruction: Instruction) -> Vec<u8> {
        let mut code = MachineCode::new();
        instruction.encode(&mut code);
        code.as_slice().to_vec()
    }

    /// byte [r13 + 0], as every cell access emits it
    fn cell() -> MemoryBaseRegister {
        MemoryBaseRegister::DisplacementOnly(
            (Registers::R13, RegisterAccess::LowByte),
            Displacement::ZeroByteDisplacement,
        )
    }

    #[test]
    fn push_and_pop_carry_the_rex_extension_bit() {
        assert_eq!(bytes(push(Registers::R13)), vec![0x41, 0x55]);
        assert_eq!(bytes(pop(Registers::R13)), vec![0x41, 0x5D]);
        assert_eq!(bytes(push(Registers::A)), vec![0x50]);
    }

    #[test]
    fn bare_opcodes() {
        assert_eq!(bytes(ret()), vec![0xC3]);
        assert_eq!(bytes(syscall()), vec![0x0F, 0x05]);
    }

    #[test]
    fn jumps_encode_their_signed_displacement() {
        assert_eq!(
            bytes(jcc(JumpOperator::Zero, 16)),
            vec![0x0F, 0x84, 0x10, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            bytes(jcc(JumpOperator::NotZero, -16)),
            vec![0x0F, 0x85, 0xF0, 0xFF, 0xFF, 0xFF]
        );
        assert_eq!(bytes(jmp(-20)), vec![0xE9, 0xEC, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn mov_wide_immediate_into_register() {
        assert_eq!(
            bytes(mov(OperandEncoding::OpcodeImmediate(
                (Registers::R13, RegisterAccess::LowEightBytes),
                Immediate::Imm64(0x1122_3344_5566_7788),
            ))),
            vec![0x49, 0xBD, 0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]
        );
        assert_eq!(
            bytes(mov(OperandEncoding::OpcodeImmediate(
                (Registers::A, RegisterAccess::LowFourBytes),
                Immediate::Imm32(1),
            ))),
            vec![0xB8, 0x01, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            bytes(mov(OperandEncoding::OpcodeImmediate(
                (Registers::D, RegisterAccess::LowFourBytes),
                Immediate::Imm32(1),
            ))),
            vec![0xBA, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn mov_zero_into_register_becomes_xor() {
        assert_eq!(
            bytes(mov(OperandEncoding::OpcodeImmediate(
                (Registers::A, RegisterAccess::LowFourBytes),
                Immediate::Imm32(0),
            ))),
            vec![0x31, 0xC0]
        );
        assert_eq!(
            bytes(mov(OperandEncoding::OpcodeImmediate(
                (Registers::DI, RegisterAccess::LowFourBytes),
                Immediate::Imm32(0),
            ))),
            vec![0x31, 0xFF]
        );
    }

    #[test]
    fn mov_zero_into_memory_stays_a_store() {
        assert_eq!(
            bytes(mov(OperandEncoding::MemoryImmediate(
                cell(),
                Immediate::Imm8(0),
            ))),
            vec![0x41, 0xC6, 0x45, 0x00, 0x00]
        );
    }

    #[test]
    fn mov_between_registers() {
        // mov rsi, r13
        assert_eq!(
            bytes(mov(OperandEncoding::MemoryRegister(
                MemoryBaseRegister::Register((Registers::SI, RegisterAccess::LowEightBytes)),
                (Registers::R13, RegisterAccess::LowEightBytes),
            ))),
            vec![0x4C, 0x89, 0xEE]
        );
    }

    #[test]
    fn mov_loads_the_cell_byte() {
        // mov al, byte [r13 + 0]
        assert_eq!(
            bytes(mov(OperandEncoding::RegisterMemory(
                (Registers::A, RegisterAccess::LowByte),
                cell(),
            ))),
            vec![0x41, 0x8A, 0x45, 0x00]
        );
    }

    #[test]
    fn wide_add_and_sub_pick_the_smallest_immediate_opcode() {
        let r13 = || MemoryBaseRegister::Register((Registers::R13, RegisterAccess::LowEightBytes));
        assert_eq!(
            bytes(add(OperandEncoding::MemoryImmediate(r13(), Immediate::Imm8(5)))),
            vec![0x49, 0x83, 0xC5, 0x05]
        );
        assert_eq!(
            bytes(add(OperandEncoding::MemoryImmediate(
                r13(),
                Immediate::Imm32(200),
            ))),
            vec![0x49, 0x81, 0xC5, 0xC8, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            bytes(sub(OperandEncoding::MemoryImmediate(r13(), Immediate::Imm8(2)))),
            vec![0x49, 0x83, 0xED, 0x02]
        );
        assert_eq!(
            bytes(sub(OperandEncoding::MemoryImmediate(
                r13(),
                Immediate::Imm32(300),
            ))),
            vec![0x49, 0x81, 0xED, 0x2C, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn byte_add_and_sub_against_the_cell() {
        assert_eq!(
            bytes(add(OperandEncoding::MemoryImmediate(cell(), Immediate::Imm8(7)))),
            vec![0x41, 0x80, 0x45, 0x00, 0x07]
        );
        assert_eq!(
            bytes(sub(OperandEncoding::MemoryImmediate(cell(), Immediate::Imm8(3)))),
            vec![0x41, 0x80, 0x6D, 0x00, 0x03]
        );
    }

    #[test]
    fn cmp_cell_against_zero() {
        assert_eq!(
            bytes(cmp(OperandEncoding::MemoryImmediate(cell(), Immediate::Imm8(0)))),
            vec![0x41, 0x80, 0x7D, 0x00, 0x00]
        );
    }

    #[test]
    fn byte_add_register_into_memory_with_displacement() {
        let al = (Registers::A, RegisterAccess::LowByte);
        assert_eq!(
            bytes(add(OperandEncoding::MemoryRegister(
                MemoryBaseRegister::DisplacementOnly(
                    (Registers::R13, RegisterAccess::LowByte),
                    Displacement::OneByteDisplacement(1),
                ),
                al,
            ))),
            vec![0x41, 0x00, 0x45, 0x01]
        );
        // negative one as a two's complement byte
        assert_eq!(
            bytes(add(OperandEncoding::MemoryRegister(
                MemoryBaseRegister::DisplacementOnly(
                    (Registers::R13, RegisterAccess::LowByte),
                    Displacement::OneByteDisplacement(0xFF),
                ),
                al,
            ))),
            vec![0x41, 0x00, 0x45, 0xFF]
        );
        // displacements past the one-byte range take the four-byte form
        assert_eq!(
            bytes(add(OperandEncoding::MemoryRegister(
                MemoryBaseRegister::DisplacementOnly(
                    (Registers::R13, RegisterAccess::LowByte),
                    Displacement::FourByteDisplacement(200),
                ),
                al,
            ))),
            vec![0x41, 0x00, 0x85, 0xC8, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn bare_bp_and_r13_bases_force_a_zero_displacement_byte() {
        // mod 00, r/m 101 would read as RIP-relative
        assert_eq!(
            bytes(cmp(OperandEncoding::MemoryImmediate(
                MemoryBaseRegister::DisplacementOnly(
                    (Registers::BP, RegisterAccess::LowByte),
                    Displacement::ZeroByteDisplacement,
                ),
                Immediate::Imm8(0),
            ))),
            vec![0x80, 0x7D, 0x00, 0x00]
        );
        assert_eq!(
            bytes(cmp(OperandEncoding::MemoryImmediate(cell(), Immediate::Imm8(0))))[2],
            0x7D
        );
    }
}
