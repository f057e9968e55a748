pub mod x86_64;

use num_traits::ops::bytes::ToBytes;
use thiserror::Error;

use crate::bytecode::Op;

/// Ops the generator cannot express in its encodings.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodegenError {
    #[error("repeat count {count} for '{op}' does not fit the supported immediate widths")]
    UnsupportedRepeatCount { op: char, count: usize },

    #[error("jump at op {at} has no partner")]
    UnbalancedJump { at: usize },
}

/// Raw instruction bytes in emission order, plus the patching hook forward
/// jumps need once their target is known.
#[derive(Debug, Default)]
pub struct MachineCode {
    bytes: Vec<u8>,
}

impl MachineCode {
    pub fn new() -> Self {
        Self { bytes: vec![] }
    }

    pub fn emit_u8(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    /// Append a little-endian value of any fixed width.
    pub fn emit_le<const COUNT: usize, T: ToBytes<Bytes = [u8; COUNT]>>(&mut self, value: T) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// Overwrite four bytes at `at` with a little-endian value.
    pub fn patch_le_u32(&mut self, at: usize, value: u32) {
        self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

pub trait CodeGen {
    fn new() -> Self;

    /// Lower a whole program into machine code. The program must be the
    /// complete op sequence: loop patching assumes every jump's partner
    /// arrives in the same call.
    fn load(&mut self, program: &[Op]) -> Result<(), CodegenError>;

    /// Seal the routine and hand back the bytes together with the tape they
    /// run against. The tape must stay alive for as long as the code can
    /// execute.
    fn finish(self) -> (MachineCode, Box<[u8]>);
}

#[cfg(target_arch = "x86_64")]
pub use self::x86_64::*;
