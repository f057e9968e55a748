use crate::bytecode::Op;
use crate::jit::codegen::{CodeGen, CodegenError, MachineCode};

use super::instruction::{Displacement, Immediate, Instruction};
use super::operand_encoding::{MemoryBaseRegister, OperandEncoding};
use super::ops::{self, JumpOperator};
use super::registers::{RegisterAccess, Registers};
use super::{value_fits_in_i8, value_fits_in_i32};

/*
    Register roles:
    - R13: data pointer (callee saved, so the caller's value is pushed on
      entry and restored on exit)
    - RAX/RDI/RSI/RDX: system call plumbing for the read/write ops

    http://ref.x86asm.net/coder64.html most instructions come from this
    https://www.felixcloutier.com/x86/ for some specific commands
    https://wiki.osdev.org/X86-64_Instruction_Encoding for more general stuff
*/

const DATA_POINTER: Registers = Registers::R13;

/// Scribbled over forward jump displacements until they get patched.
const PLACEHOLDER: u32 = 0xDEADBEEF;

/// A loop whose forward jump is still waiting for its target.
struct LoopPatch {
    /// Index of the op that opened the loop
    at: usize,
    /// Byte offset of the four placeholder bytes inside the forward jump
    patch_at: usize,
    /// First byte of the loop body, where the backward jump lands
    body_start: usize,
}

pub struct X86_64Codegen {
    code: MachineCode,
    /// The tape the routine runs against; its address is baked into the
    /// preamble, so it must outlive the generated code
    tape: Box<[u8]>,
    open_loops: Vec<LoopPatch>,
}

/// Distance from the end of a jump's own encoding to its target, as the
/// hardware reads rel32 operands.
fn relative_displacement(from: usize, to: usize) -> u32 {
    (to as i64 - from as i64) as i32 as u32
}

impl X86_64Codegen {
    fn emit(&mut self, instruction: Instruction) {
        instruction.encode(&mut self.code);
    }

    /// push r13; movabs r13, tape
    fn emit_preamble(&mut self) {
        self.emit(ops::push(DATA_POINTER));
        self.emit(ops::mov(OperandEncoding::OpcodeImmediate(
            (DATA_POINTER, RegisterAccess::LowEightBytes),
            Immediate::Imm64(self.tape.as_ptr() as u64),
        )));
    }

    /// xor eax, eax; pop r13; ret -- the routine always returns zero
    fn emit_epilogue(&mut self) {
        self.emit(ops::mov(OperandEncoding::OpcodeImmediate(
            (Registers::A, RegisterAccess::LowFourBytes),
            Immediate::Imm32(0),
        )));
        self.emit(ops::pop(DATA_POINTER));
        self.emit(ops::ret());
    }

    /// cmpb $0, 0(%r13)
    fn emit_compare_cell(&mut self) {
        self.emit(ops::cmp(OperandEncoding::MemoryImmediate(
            MemoryBaseRegister::DisplacementOnly(
                (DATA_POINTER, RegisterAccess::LowByte),
                Displacement::ZeroByteDisplacement,
            ),
            Immediate::Imm8(0),
        )));
    }

    /// movb $0, 0(%r13)
    fn emit_clear_cell(&mut self) {
        self.emit(ops::mov(OperandEncoding::MemoryImmediate(
            MemoryBaseRegister::DisplacementOnly(
                (DATA_POINTER, RegisterAccess::LowByte),
                Displacement::ZeroByteDisplacement,
            ),
            Immediate::Imm8(0),
        )));
    }

    /// addq/subq the count onto r13, with the smallest immediate that fits.
    /// Counts above 127 must take the four-byte form: the two-byte opcode
    /// sign-extends its immediate.
    fn emit_pointer_add(
        &mut self,
        op: fn(OperandEncoding) -> Instruction,
        symbol: char,
        count: usize,
    ) -> Result<(), CodegenError> {
        let imm = if value_fits_in_i8(count) {
            Immediate::Imm8(count as u8)
        } else if value_fits_in_i32(count) {
            Immediate::Imm32(count as u32)
        } else {
            return Err(CodegenError::UnsupportedRepeatCount { op: symbol, count });
        };
        self.emit(op(OperandEncoding::MemoryImmediate(
            MemoryBaseRegister::Register((DATA_POINTER, RegisterAccess::LowEightBytes)),
            imm,
        )));
        Ok(())
    }

    /// addb/subb onto the cell. The cell is eight bits wide, so the count is
    /// reduced mod 256 before it becomes the immediate; counts of 65536 and
    /// up are rejected outright rather than reduced.
    fn emit_data_add(
        &mut self,
        op: fn(OperandEncoding) -> Instruction,
        symbol: char,
        count: usize,
    ) -> Result<(), CodegenError> {
        if count >= 65536 {
            return Err(CodegenError::UnsupportedRepeatCount { op: symbol, count });
        }
        self.emit(op(OperandEncoding::MemoryImmediate(
            MemoryBaseRegister::DisplacementOnly(
                (DATA_POINTER, RegisterAccess::LowByte),
                Displacement::ZeroByteDisplacement,
            ),
            Immediate::Imm8((count % 256) as u8),
        )));
        Ok(())
    }

    /// One write(2) per repeat: rax=1, rdi=stdout, rsi=r13, rdx=1 byte.
    fn emit_write(&mut self, count: usize) {
        for _ in 0..count {
            self.emit(ops::mov(OperandEncoding::OpcodeImmediate(
                (Registers::A, RegisterAccess::LowFourBytes),
                Immediate::Imm32(1),
            )));
            self.emit(ops::mov(OperandEncoding::OpcodeImmediate(
                (Registers::DI, RegisterAccess::LowFourBytes),
                Immediate::Imm32(1),
            )));
            self.emit_cell_address_into_rsi();
            self.emit_one_byte_count_and_syscall();
        }
    }

    /// One read(2) per repeat: rax=0, rdi=stdin, rsi=r13, rdx=1 byte. A
    /// later read simply lands on top of an earlier one.
    fn emit_read(&mut self, count: usize) {
        for _ in 0..count {
            self.emit(ops::mov(OperandEncoding::OpcodeImmediate(
                (Registers::A, RegisterAccess::LowFourBytes),
                Immediate::Imm32(0),
            )));
            self.emit(ops::mov(OperandEncoding::OpcodeImmediate(
                (Registers::DI, RegisterAccess::LowFourBytes),
                Immediate::Imm32(0),
            )));
            self.emit_cell_address_into_rsi();
            self.emit_one_byte_count_and_syscall();
        }
    }

    /// mov rsi, r13
    fn emit_cell_address_into_rsi(&mut self) {
        self.emit(ops::mov(OperandEncoding::MemoryRegister(
            MemoryBaseRegister::Register((Registers::SI, RegisterAccess::LowEightBytes)),
            (DATA_POINTER, RegisterAccess::LowEightBytes),
        )));
    }

    /// mov edx, 1; syscall
    fn emit_one_byte_count_and_syscall(&mut self) {
        self.emit(ops::mov(OperandEncoding::OpcodeImmediate(
            (Registers::D, RegisterAccess::LowFourBytes),
            Immediate::Imm32(1),
        )));
        self.emit(ops::syscall());
    }

    /// Compare, then a forward jump whose displacement is patched when the
    /// matching loop end arrives.
    fn emit_loop_start(&mut self, at: usize) {
        self.emit_compare_cell();
        self.emit(ops::jcc(JumpOperator::Zero, PLACEHOLDER as i32));
        self.open_loops.push(LoopPatch {
            at,
            patch_at: self.code.len() - 4,
            body_start: self.code.len(),
        });
    }

    /// Compare, jump back to the loop body, then resolve the forward jump
    /// recorded at the matching loop start.
    fn emit_loop_end(&mut self, at: usize) -> Result<(), CodegenError> {
        let LoopPatch {
            at: _,
            patch_at,
            body_start,
        } = self
            .open_loops
            .pop()
            .ok_or(CodegenError::UnbalancedJump { at })?;

        self.emit_compare_cell();
        self.emit(ops::jcc(JumpOperator::NotZero, PLACEHOLDER as i32));

        let after = self.code.len();
        self.code
            .patch_le_u32(after - 4, relative_displacement(after, body_start));
        self.code
            .patch_le_u32(patch_at, relative_displacement(body_start, after));
        Ok(())
    }

    /// Tight native loop: test the cell, exit on zero, otherwise step the
    /// pointer and test again.
    fn emit_pointer_scan(&mut self, symbol: char, stride: isize) -> Result<(), CodegenError> {
        let loop_top = self.code.len();
        self.emit_compare_cell();
        self.emit(ops::jcc(JumpOperator::Zero, PLACEHOLDER as i32));
        let patch_at = self.code.len() - 4;
        let body_start = self.code.len();

        let op: fn(OperandEncoding) -> Instruction = if stride < 0 { ops::sub } else { ops::add };
        self.emit_pointer_add(op, symbol, stride.unsigned_abs())?;
        self.emit(ops::jmp(PLACEHOLDER as i32));

        let after = self.code.len();
        self.code
            .patch_le_u32(after - 4, relative_displacement(after, loop_top));
        self.code
            .patch_le_u32(patch_at, relative_displacement(body_start, after));
        Ok(())
    }

    /// If the cell is nonzero, add it into the cell at the offset and clear
    /// the source; a zero cell skips the whole group.
    fn emit_transfer(&mut self, symbol: char, offset: isize) -> Result<(), CodegenError> {
        let displacement = if let Ok(byte) = i8::try_from(offset) {
            Displacement::OneByteDisplacement(byte as u8)
        } else if let Ok(word) = i32::try_from(offset) {
            Displacement::FourByteDisplacement(word as u32)
        } else {
            return Err(CodegenError::UnsupportedRepeatCount {
                op: symbol,
                count: offset.unsigned_abs(),
            });
        };

        self.emit_compare_cell();
        self.emit(ops::jcc(JumpOperator::Zero, PLACEHOLDER as i32));
        let patch_at = self.code.len() - 4;
        let body_start = self.code.len();

        // mov al, 0(%r13)
        self.emit(ops::mov(OperandEncoding::RegisterMemory(
            (Registers::A, RegisterAccess::LowByte),
            MemoryBaseRegister::DisplacementOnly(
                (DATA_POINTER, RegisterAccess::LowByte),
                Displacement::ZeroByteDisplacement,
            ),
        )));
        // addb %al, offset(%r13)
        self.emit(ops::add(OperandEncoding::MemoryRegister(
            MemoryBaseRegister::DisplacementOnly(
                (DATA_POINTER, RegisterAccess::LowByte),
                displacement,
            ),
            (Registers::A, RegisterAccess::LowByte),
        )));
        self.emit_clear_cell();

        let after = self.code.len();
        self.code
            .patch_le_u32(patch_at, relative_displacement(body_start, after));
        Ok(())
    }
}

impl CodeGen for X86_64Codegen {
    fn new() -> Self {
        let mut codegen = X86_64Codegen {
            code: MachineCode::new(),
            tape: vec![0u8; crate::TAPE_LEN].into_boxed_slice(),
            open_loops: vec![],
        };
        codegen.emit_preamble();
        codegen
    }

    fn load(&mut self, program: &[Op]) -> Result<(), CodegenError> {
        for (at, op) in program.iter().enumerate() {
            // jump args carry IR indices, which mean nothing in byte space;
            // the patch stack tracks byte offsets instead
            match *op {
                Op::IncPtr(count) => self.emit_pointer_add(ops::add, op.symbol(), count)?,
                Op::DecPtr(count) => self.emit_pointer_add(ops::sub, op.symbol(), count)?,
                Op::IncData(count) => self.emit_data_add(ops::add, op.symbol(), count)?,
                Op::DecData(count) => self.emit_data_add(ops::sub, op.symbol(), count)?,
                Op::ReadByte(count) => self.emit_read(count),
                Op::WriteByte(count) => self.emit_write(count),
                Op::JumpIfZero(_) => self.emit_loop_start(at),
                Op::JumpIfNotZero(_) => self.emit_loop_end(at)?,
                Op::ClearCell => self.emit_clear_cell(),
                Op::MovePointerUntilZero(stride) => self.emit_pointer_scan(op.symbol(), stride)?,
                Op::MoveAndClearData(offset) => self.emit_transfer(op.symbol(), offset)?,
            }
        }

        if let Some(open) = self.open_loops.last() {
            return Err(CodegenError::UnbalancedJump { at: open.at });
        }
        Ok(())
    }

    fn finish(mut self) -> (MachineCode, Box<[u8]>) {
        self.emit_epilogue();
        (self.code, self.tape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREAMBLE_LEN: usize = 12;
    const EPILOGUE_LEN: usize = 5;

    fn generate(program: &[Op]) -> (Vec<u8>, Box<[u8]>) {
        let mut codegen = X86_64Codegen::new();
        codegen.load(program).unwrap();
        let (code, tape) = codegen.finish();
        (code.as_slice().to_vec(), tape)
    }

    /// The emitted bytes between preamble and epilogue.
    fn body(program: &[Op]) -> Vec<u8> {
        let (code, _) = generate(program);
        code[PREAMBLE_LEN..code.len() - EPILOGUE_LEN].to_vec()
    }

    #[test]
    fn empty_program_is_preamble_and_epilogue_around_the_tape_address() {
        let (code, tape) = generate(&[]);
        assert_eq!(code.len(), PREAMBLE_LEN + EPILOGUE_LEN);
        // push r13; movabs r13, tape
        assert_eq!(&code[..4], &[0x41, 0x55, 0x49, 0xBD]);
        assert_eq!(&code[4..12], &(tape.as_ptr() as u64).to_le_bytes()[..]);
        // xor eax, eax; pop r13; ret
        assert_eq!(&code[12..], &[0x31, 0xC0, 0x41, 0x5D, 0xC3]);
        assert_eq!(tape.len(), crate::TAPE_LEN);
        assert!(tape.iter().all(|&cell| cell == 0));
    }

    #[test]
    fn data_adds_use_the_byte_form_reduced_mod_256() {
        assert_eq!(body(&[Op::IncData(5)]), [0x41, 0x80, 0x45, 0x00, 0x05]);
        assert_eq!(body(&[Op::DecData(3)]), [0x41, 0x80, 0x6D, 0x00, 0x03]);
        assert_eq!(body(&[Op::IncData(300)]), [0x41, 0x80, 0x45, 0x00, 0x2C]);
    }

    #[test]
    fn pointer_adds_pick_the_smallest_safe_immediate() {
        assert_eq!(body(&[Op::IncPtr(5)]), [0x49, 0x83, 0xC5, 0x05]);
        assert_eq!(body(&[Op::IncPtr(127)]), [0x49, 0x83, 0xC5, 0x7F]);
        // 128..=255 must not ride the sign-extending imm8 form
        assert_eq!(
            body(&[Op::IncPtr(200)]),
            [0x49, 0x81, 0xC5, 0xC8, 0x00, 0x00, 0x00]
        );
        assert_eq!(body(&[Op::DecPtr(2)]), [0x49, 0x83, 0xED, 0x02]);
    }

    #[test]
    fn clear_cell_stores_zero() {
        assert_eq!(body(&[Op::ClearCell]), [0x41, 0xC6, 0x45, 0x00, 0x00]);
    }

    #[test]
    fn write_emits_the_full_syscall_group() {
        assert_eq!(
            body(&[Op::WriteByte(1)]),
            [
                0xB8, 0x01, 0x00, 0x00, 0x00, // mov eax, 1
                0xBF, 0x01, 0x00, 0x00, 0x00, // mov edi, 1
                0x4C, 0x89, 0xEE, // mov rsi, r13
                0xBA, 0x01, 0x00, 0x00, 0x00, // mov edx, 1
                0x0F, 0x05, // syscall
            ]
        );
    }

    #[test]
    fn read_emits_the_full_syscall_group() {
        assert_eq!(
            body(&[Op::ReadByte(1)]),
            [
                0x31, 0xC0, // xor eax, eax
                0x31, 0xFF, // xor edi, edi
                0x4C, 0x89, 0xEE, // mov rsi, r13
                0xBA, 0x01, 0x00, 0x00, 0x00, // mov edx, 1
                0x0F, 0x05, // syscall
            ]
        );
    }

    #[test]
    fn io_repeat_counts_unroll() {
        let single = body(&[Op::WriteByte(1)]).len();
        assert_eq!(body(&[Op::WriteByte(3)]).len(), 3 * single);
        let single = body(&[Op::ReadByte(1)]).len();
        assert_eq!(body(&[Op::ReadByte(2)]).len(), 2 * single);
    }

    #[test]
    fn loop_jumps_patch_each_other() {
        // an unoptimized clear-style loop, laid out by hand
        let (code, _) = generate(&[Op::JumpIfZero(2), Op::DecData(1), Op::JumpIfNotZero(0)]);

        // preamble | cmp(5) jz(6) | dec(5) | cmp(5) jnz(6) | epilogue
        let cmp_start = PREAMBLE_LEN;
        let body_start = cmp_start + 5 + 6;
        let after = body_start + 5 + 5 + 6;
        assert_eq!(code.len(), after + EPILOGUE_LEN);

        assert_eq!(&code[cmp_start..cmp_start + 5], &[0x41, 0x80, 0x7D, 0x00, 0x00]);
        assert_eq!(&code[cmp_start + 5..cmp_start + 7], &[0x0F, 0x84]);
        // forward: from the end of jz to just past jnz
        assert_eq!(
            &code[body_start - 4..body_start],
            &((after - body_start) as u32).to_le_bytes()[..]
        );
        assert_eq!(&code[after - 6..after - 4], &[0x0F, 0x85]);
        // backward: from the end of jnz to the body start
        assert_eq!(
            &code[after - 4..after],
            &(body_start as i64 - after as i64).to_le_bytes()[..4]
        );
    }

    #[test]
    fn pointer_scan_lowers_to_a_tight_native_loop() {
        let (code, _) = generate(&[Op::MovePointerUntilZero(1)]);

        // preamble | cmp(5) jz(6) | add(4) jmp(5) | epilogue
        let loop_top = PREAMBLE_LEN;
        let body_start = loop_top + 5 + 6;
        let after = body_start + 4 + 5;
        assert_eq!(code.len(), after + EPILOGUE_LEN);

        assert_eq!(&code[body_start..body_start + 4], &[0x49, 0x83, 0xC5, 0x01]);
        assert_eq!(code[body_start + 4], 0xE9);
        // the backward jmp returns to the compare at the top
        assert_eq!(
            &code[after - 4..after],
            &(loop_top as i64 - after as i64).to_le_bytes()[..4]
        );
        // the forward jz exits past the jmp
        assert_eq!(
            &code[body_start - 4..body_start],
            &((after - body_start) as u32).to_le_bytes()[..]
        );
    }

    #[test]
    fn backward_scan_subtracts_the_stride() {
        let (code, _) = generate(&[Op::MovePointerUntilZero(-2)]);
        let body_start = PREAMBLE_LEN + 5 + 6;
        assert_eq!(&code[body_start..body_start + 4], &[0x49, 0x83, 0xED, 0x02]);
    }

    #[test]
    fn transfer_guards_skip_the_move_and_clear() {
        let (code, _) = generate(&[Op::MoveAndClearData(1)]);

        // preamble | cmp(5) jz(6) | mov al(4) add(4) clear(5) | epilogue
        let body_start = PREAMBLE_LEN + 5 + 6;
        let after = body_start + 4 + 4 + 5;
        assert_eq!(code.len(), after + EPILOGUE_LEN);

        assert_eq!(&code[body_start..body_start + 4], &[0x41, 0x8A, 0x45, 0x00]);
        assert_eq!(&code[body_start + 4..body_start + 8], &[0x41, 0x00, 0x45, 0x01]);
        assert_eq!(
            &code[body_start + 8..body_start + 13],
            &[0x41, 0xC6, 0x45, 0x00, 0x00]
        );
        assert_eq!(
            &code[body_start - 4..body_start],
            &((after - body_start) as u32).to_le_bytes()[..]
        );
    }

    #[test]
    fn transfer_offsets_encode_as_signed_displacements() {
        let (code, _) = generate(&[Op::MoveAndClearData(-1)]);
        let body_start = PREAMBLE_LEN + 5 + 6;
        assert_eq!(&code[body_start + 4..body_start + 8], &[0x41, 0x00, 0x45, 0xFF]);

        let (code, _) = generate(&[Op::MoveAndClearData(200)]);
        assert_eq!(
            &code[body_start + 4..body_start + 11],
            &[0x41, 0x00, 0x85, 0xC8, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn oversized_repeat_counts_are_rejected() {
        let mut codegen = X86_64Codegen::new();
        assert_eq!(
            codegen.load(&[Op::IncData(65536)]),
            Err(CodegenError::UnsupportedRepeatCount { op: '+', count: 65536 })
        );

        let mut codegen = X86_64Codegen::new();
        assert_eq!(
            codegen.load(&[Op::DecData(70000)]),
            Err(CodegenError::UnsupportedRepeatCount { op: '-', count: 70000 })
        );

        let mut codegen = X86_64Codegen::new();
        let count = i32::MAX as usize + 1;
        assert_eq!(
            codegen.load(&[Op::IncPtr(count)]),
            Err(CodegenError::UnsupportedRepeatCount { op: '>', count })
        );
    }

    #[test]
    fn unpaired_jumps_are_rejected() {
        let mut codegen = X86_64Codegen::new();
        assert_eq!(
            codegen.load(&[Op::JumpIfNotZero(0)]),
            Err(CodegenError::UnbalancedJump { at: 0 })
        );

        let mut codegen = X86_64Codegen::new();
        assert_eq!(
            codegen.load(&[Op::IncData(1), Op::JumpIfZero(0)]),
            Err(CodegenError::UnbalancedJump { at: 1 })
        );
    }
}
