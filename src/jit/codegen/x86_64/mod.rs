mod codegen;
mod instruction;
mod operand_encoding;
mod ops;
mod registers;

pub use self::codegen::X86_64Codegen;

fn value_fits_in_i8(value: usize) -> bool {
    i8::try_from(value).is_ok()
}

fn value_fits_in_i32(value: usize) -> bool {
    i32::try_from(value).is_ok()
}
