use crate::bytecode::Op;

/// Inspect a just-closed loop body and return the single op that replaces
/// the whole loop, or None to emit the ordinary branch pair.
///
/// Recognized shapes, matched on the body after run-length collapsing:
/// - `[-]` / `[+]` with any step: the loop only exits once the cell is
///   exactly zero, so the replacement is a plain clear
/// - `[>]` / `[<]` with any stride: scan until the pointer lands on a zero
///   cell
/// - `[->>+<<]` and its mirror: drain the current cell into the cell at the
///   offset, one unit per iteration
pub fn optimize_loop(body: &[Op]) -> Option<Op> {
    match body {
        [Op::IncData(_)] | [Op::DecData(_)] => Some(Op::ClearCell),
        [Op::IncPtr(stride)] => Some(Op::MovePointerUntilZero(*stride as isize)),
        [Op::DecPtr(stride)] => Some(Op::MovePointerUntilZero(-(*stride as isize))),
        [Op::DecData(1), Op::IncPtr(out), Op::IncData(1), Op::DecPtr(back)] if out == back => {
            Some(Op::MoveAndClearData(*out as isize))
        }
        [Op::DecData(1), Op::DecPtr(out), Op::IncData(1), Op::IncPtr(back)] if out == back => {
            Some(Op::MoveAndClearData(-(*out as isize)))
        }
        _ => None,
    }
}
