use std::io;

use crate::cpu::decode::DecodeError;
use crate::mem::MemError;
use thiserror::Error;

/// Fatal conditions raised by [`Machine::step`](super::Machine::step).
///
/// None of these are resumable: the run stops at the faulting instruction.
#[derive(Error, Debug)]
pub enum Trap {
    #[error("illegal instruction at pc=0x{pc:x} inst=0x{inst:08x}")]
    IllegalInstruction { pc: u64, inst: u32 },

    #[error("out-of-bounds access at pc=0x{pc:x}: {err}")]
    OutOfBoundsAccess { pc: u64, err: MemError },

    #[error("failed to write host output: {0}")]
    HostOutput(#[from] io::Error),
}

impl Trap {
    /// Returns the PC where the trap occurred
    pub fn pc(&self) -> Option<u64> {
        match self {
            Trap::IllegalInstruction { pc, .. } => Some(*pc),
            Trap::OutOfBoundsAccess { pc, .. } => Some(*pc),
            Trap::HostOutput(_) => None,
        }
    }
}

/// Trait for adding PC context to errors that can become Traps
pub trait WithPc<T> {
    fn with_pc(self, pc: u64) -> Result<T, Trap>;
}

impl<T> WithPc<T> for Result<T, MemError> {
    fn with_pc(self, pc: u64) -> Result<T, Trap> {
        self.map_err(|err| Trap::OutOfBoundsAccess { pc, err })
    }
}

impl<T> WithPc<T> for Result<T, DecodeError> {
    fn with_pc(self, pc: u64) -> Result<T, Trap> {
        self.map_err(|err| Trap::IllegalInstruction {
            pc,
            inst: err.inst(),
        })
    }
}
