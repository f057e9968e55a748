use thiserror::Error;

use crate::bytecode::{Op, Program};

use super::{AccessError, Runtime};

/// A failed cell access tagged with the op that tripped it.
#[derive(Error, Debug)]
#[error("execution failed at op {pc} ('{symbol}')")]
pub struct RuntimeError {
    pub pc: usize,
    pub symbol: char,
    #[source]
    pub source: AccessError,
}

pub struct ByteCodeInterpreter {}

impl ByteCodeInterpreter {
    pub fn new() -> Self {
        Self {}
    }

    /// Walk the program with an explicit program counter. Jumps set the
    /// counter to the partner op's index and leave it to be re-examined; all
    /// other ops advance by one.
    pub fn run(&mut self, runtime: &mut Runtime, program: &Program) -> Result<(), RuntimeError> {
        let mut pc = 0;
        while pc < program.len() {
            let op = program[pc];
            let access = match op {
                Op::IncPtr(count) => {
                    runtime.shift_data_pointer(count as isize);
                    Ok(())
                }
                Op::DecPtr(count) => {
                    runtime.shift_data_pointer(-(count as isize));
                    Ok(())
                }
                // truncating the run length is the same as adding it mod 256
                Op::IncData(count) => runtime.deref_and_add_value(count as u8),
                Op::DecData(count) => runtime.deref_and_sub_value(count as u8),
                Op::ReadByte(count) => (0..count).try_for_each(|_| runtime.read_value()),
                Op::WriteByte(count) => (0..count).try_for_each(|_| runtime.write_value()),
                Op::ClearCell => runtime.clear_value(),
                Op::MovePointerUntilZero(stride) => loop {
                    match runtime.value_is_zero() {
                        Ok(true) => break Ok(()),
                        Ok(false) => runtime.shift_data_pointer(stride),
                        Err(e) => break Err(e),
                    }
                },
                Op::MoveAndClearData(offset) => runtime.transfer_and_clear(offset),
                Op::JumpIfZero(target) => match runtime.value_is_zero() {
                    Ok(true) => {
                        // don't do the ++, the partner re-tests the cell
                        pc = target;
                        continue;
                    }
                    Ok(false) => Ok(()),
                    Err(e) => Err(e),
                },
                Op::JumpIfNotZero(target) => match runtime.value_is_zero() {
                    Ok(false) => {
                        // don't do the ++
                        pc = target;
                        continue;
                    }
                    Ok(true) => Ok(()),
                    Err(e) => Err(e),
                },
            };
            access.map_err(|source| RuntimeError {
                pc,
                symbol: op.symbol(),
                source,
            })?;
            pc += 1;
        }
        Ok(())
    }
}
