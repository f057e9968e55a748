use std::io;
use std::mem;
use std::ptr;

use thiserror::Error;

use super::codegen::MachineCode;

/// Failures obtaining executable memory from the OS.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("could not allocate {len} bytes of executable memory")]
    Allocation {
        len: usize,
        #[source]
        source: io::Error,
    },
}

/// A read-write-execute mapping holding one compiled routine.
///
/// This is the only place raw function pointers and mapped memory appear:
/// allocate, copy the bytes in, call, and the mapping goes back to the OS on
/// drop.
pub struct CodeRegion {
    ptr: *mut libc::c_void,
    len: usize,
}

/// mmap an anonymous read-write-execute span.
fn map_rwx(len: usize) -> Result<*mut libc::c_void, EngineError> {
    // SAFETY: anonymous private mapping, no fd and no fixed address
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(EngineError::Allocation {
            len,
            source: io::Error::last_os_error(),
        });
    }
    Ok(ptr)
}

impl CodeRegion {
    /// Map a fresh region and copy the routine into it.
    pub fn install(code: &MachineCode) -> Result<CodeRegion, EngineError> {
        let len = code.len();
        let ptr = map_rwx(len)?;

        // SAFETY: the mapping spans at least len bytes and nothing else
        // holds a reference to it yet
        unsafe {
            ptr::copy_nonoverlapping(code.as_slice().as_ptr(), ptr as *mut u8, len);
        }

        Ok(CodeRegion { ptr, len })
    }

    /// Call the installed routine and hand back its return value.
    ///
    /// # Safety
    /// The installed bytes must form a complete routine that follows the C
    /// calling convention, and everything the routine touches (the code
    /// generator's tape in particular) must still be alive.
    pub unsafe fn invoke(&self) -> i64 {
        let routine: extern "C" fn() -> i64 = mem::transmute(self.ptr);
        routine()
    }
}

impl Drop for CodeRegion {
    fn drop(&mut self) {
        // SAFETY: ptr and len come from the mmap in install
        unsafe {
            libc::munmap(self.ptr, self.len);
        }
    }
}
