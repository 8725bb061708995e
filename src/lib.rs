//! Cycle-stepped RISC-V instruction-set simulator (RV32/RV64 with the C, M
//! and A extensions).

pub mod config;
pub mod cpu;
pub mod debug;
pub mod image;
pub mod mem;

pub use config::{Config, Xlen};
pub use cpu::trap::Trap;
pub use cpu::{HaltReason, Machine, Retired, Step};
pub use debug::{Snapshot, TraceWriter};
