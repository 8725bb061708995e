//! Register-file trace output.
//!
//! Each retired instruction produces one block:
//!
//! ```text
//! 00000003 00000008 002081b3
//! 00000000 00000005 00000003 00000008 00000000 00000000 00000000 00000000
//! ... three more lines of eight registers
//! ```
//!
//! The header holds the cycle count, the pc of the instruction and its
//! 32-bit encoding. Registers and the pc are printed at native width.

use std::fmt;
use std::io::{self, Write};

use crate::config::Xlen;
use crate::cpu::Retired;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub cycle: u64,
    pub pc: u64,
    pub inst: u32,
    pub regs: [u64; 32],
    pub xlen: Xlen,
}

impl Snapshot {
    fn fmt_header(&self, f: &mut impl fmt::Write) -> fmt::Result {
        let w = self.xlen.hex_digits();
        writeln!(
            f,
            "{:08x} {:0w$x} {:08x}",
            self.cycle,
            self.xlen.zext(self.pc),
            self.inst
        )
    }

    fn fmt_regs(&self, f: &mut impl fmt::Write) -> fmt::Result {
        let w = self.xlen.hex_digits();
        for row in self.regs.chunks(8) {
            let line: Vec<String> = row
                .iter()
                .map(|&r| format!("{:0w$x}", self.xlen.zext(r)))
                .collect();
            writeln!(f, "{}", line.join(" "))?;
        }
        Ok(())
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_header(f)?;
        self.fmt_regs(f)
    }
}

/// One-line disassembly note used in debug traces.
fn annotation(retired: &Retired) -> String {
    match retired.compressed {
        Some(c) => format!("# {} ({} {:04x})", retired.mnemonic(), c.mnemonic, c.raw),
        None => format!("# {}", retired.mnemonic()),
    }
}

pub struct TraceWriter<W: Write> {
    out: W,
    debug: bool,
}

impl<W: Write> TraceWriter<W> {
    pub fn new(out: W, debug: bool) -> Self {
        Self { out, debug }
    }

    pub fn record(&mut self, snap: &Snapshot, retired: &Retired) -> io::Result<()> {
        let mut block = String::new();
        // fmt::Write into a String cannot fail
        let _ = snap.fmt_header(&mut block);
        if self.debug {
            block.push_str(&annotation(retired));
            block.push('\n');
        }
        let _ = snap.fmt_regs(&mut block);
        self.out.write_all(block.as_bytes())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
