pub mod bytecode_interpreter;

use std::io::{self, Read, Write};

use thiserror::Error;

/// Cell accesses that the runtime refuses or that the host streams fail.
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("data pointer ({pointer}) out of bounds (tape length {len})")]
    OutOfRange { pointer: usize, len: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The mutable state a program runs against: the tape, the data pointer and
/// the two host streams.
pub struct Runtime {
    /// Pointer into the tape
    data_pointer: usize,

    /// Our statically allocated tape, zeroed at start
    tape: Vec<u8>,

    in_stream: Box<dyn Read>,
    out_stream: Box<dyn Write>,
}

impl Runtime {
    pub fn new(tape_len: usize, in_stream: Box<dyn Read>, out_stream: Box<dyn Write>) -> Self {
        Self {
            data_pointer: 0,
            tape: vec![0; tape_len],
            in_stream,
            out_stream,
        }
    }

    /// Shifts never fail on their own, the pointer is only validated once a
    /// cell is actually read or written.
    pub fn shift_data_pointer(&mut self, by: isize) {
        self.data_pointer = self.data_pointer.wrapping_add_signed(by);
    }

    pub fn deref_and_add_value(&mut self, by: u8) -> Result<(), AccessError> {
        let cell = self.cell_index()?;
        self.tape[cell] = self.tape[cell].wrapping_add(by);
        Ok(())
    }

    pub fn deref_and_sub_value(&mut self, by: u8) -> Result<(), AccessError> {
        let cell = self.cell_index()?;
        self.tape[cell] = self.tape[cell].wrapping_sub(by);
        Ok(())
    }

    pub fn clear_value(&mut self) -> Result<(), AccessError> {
        let cell = self.cell_index()?;
        self.tape[cell] = 0;
        Ok(())
    }

    /// Read one byte from the input stream into the current cell. Exhausted
    /// input stores zero instead.
    pub fn read_value(&mut self) -> Result<(), AccessError> {
        let cell = self.cell_index()?;
        let mut byte = [0u8];
        match self.in_stream.read_exact(&mut byte) {
            Ok(()) => self.tape[cell] = byte[0],
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => self.tape[cell] = 0,
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Write the current cell to the output stream.
    pub fn write_value(&mut self) -> Result<(), AccessError> {
        let cell = self.cell_index()?;
        self.out_stream.write_all(&self.tape[cell..cell + 1])?;
        Ok(())
    }

    /// Add the current cell into the cell at the given offset, then clear
    /// the current cell. Does nothing when the current cell is already zero,
    /// so the destination is never touched (or validated) in that case.
    pub fn transfer_and_clear(&mut self, offset: isize) -> Result<(), AccessError> {
        let src = self.cell_index()?;
        let value = self.tape[src];
        if value == 0 {
            return Ok(());
        }
        let dst = src.wrapping_add_signed(offset);
        if dst >= self.tape.len() {
            return Err(AccessError::OutOfRange {
                pointer: dst,
                len: self.tape.len(),
            });
        }
        self.tape[dst] = self.tape[dst].wrapping_add(value);
        self.tape[src] = 0;
        Ok(())
    }

    pub fn value_is_zero(&self) -> Result<bool, AccessError> {
        let cell = self.cell_index()?;
        Ok(self.tape[cell] == 0)
    }

    /// The data pointer, validated against the tape bounds.
    fn cell_index(&self) -> Result<usize, AccessError> {
        if self.data_pointer >= self.tape.len() {
            return Err(AccessError::OutOfRange {
                pointer: self.data_pointer,
                len: self.tape.len(),
            });
        }
        Ok(self.data_pointer)
    }
}
