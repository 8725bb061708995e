pub mod compressed;
pub mod decode;
pub mod encode;
pub mod exec;
pub mod trap;

use std::fmt;
use std::io::{self, Write};

use crate::config::{Config, Xlen};
use crate::debug::Snapshot;
use crate::mem::mmio::Mmio;
use crate::mem::{Bus, MemError, Memory, Width};
use decode::Instr;
use trap::{Trap, WithPc};

#[derive(Debug, Clone)]
pub struct Cpu {
    pub regs: [u64; 32],
    /// Address of the next instruction to fetch.
    pub pc: u64,
    pub reservation: Option<u64>,
    pub xlen: Xlen,
}

impl Cpu {
    pub fn new(xlen: Xlen, reset_vector: u64) -> Self {
        Self {
            regs: [0; 32],
            pc: xlen.zext(reset_vector),
            reservation: None,
            xlen,
        }
    }

    pub fn reg(&self, idx: u8) -> u64 {
        self.regs[idx as usize]
    }

    /// Writes to x0 are dropped; everything else is stored in canonical form.
    pub fn set_reg(&mut self, idx: u8, value: u64) {
        if idx != 0 {
            self.regs[idx as usize] = self.xlen.narrow(value);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// The watchdog cycle limit was reached.
    Timeout,
    /// The guest wrote the halt bit to the host port.
    HostRequest,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::Timeout => f.write_str("watchdog timeout"),
            HaltReason::HostRequest => f.write_str("host halt request"),
        }
    }
}

/// Source form of a compressed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compressed {
    pub raw: u16,
    pub mnemonic: &'static str,
}

/// What one step executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retired {
    pub pc: u64,
    /// Canonical 32-bit encoding, synthesized for compressed instructions.
    pub inst: u32,
    pub instr: Instr,
    pub compressed: Option<Compressed>,
}

impl Retired {
    pub fn mnemonic(&self) -> &'static str {
        self.instr.mnemonic()
    }

    pub fn byte_len(&self) -> u64 {
        if self.compressed.is_some() { 2 } else { 4 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub retired: Retired,
    pub halt: Option<HaltReason>,
}

/// A single hart with its memory. `W` receives the bytes the guest flushes
/// through the host port.
pub struct Machine<W: Write = io::Stdout> {
    pub cpu: Cpu,
    pub bus: Bus,
    config: Config,
    cycle: u64,
    last_pc: u64,
    last_inst: u32,
    host_out: W,
}

impl Machine<io::Stdout> {
    pub fn new(config: Config) -> Self {
        Self::with_output(config, io::stdout())
    }
}

impl<W: Write> Machine<W> {
    pub fn with_output(config: Config, host_out: W) -> Self {
        tracing::info!(
            xlen = config.xlen.bits(),
            compressed = config.compressed,
            mem_size = config.mem_size,
            timeout = config.timeout,
            reset_vector = format_args!("0x{:x}", config.reset_vector),
            "machine configured"
        );
        let cpu = Cpu::new(config.xlen, config.reset_vector);
        let mmio = Mmio::new(config.mtime_addr, config.tohost_addr, config.host_buf_capacity);
        let bus = Bus::new(Memory::new(config.mem_size), mmio);
        Self {
            last_pc: cpu.pc,
            cpu,
            bus,
            config,
            cycle: 0,
            last_inst: 0,
            host_out,
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn host_output(&self) -> &W {
        &self.host_out
    }

    /// Load a raw image of little-endian words at address 0.
    pub fn load_image(&mut self, image: &[u8]) -> Result<usize, MemError> {
        let words = self.bus.ram.load_image(image)?;
        tracing::info!(bytes = image.len(), words, "raw image loaded");
        Ok(words)
    }

    /// State after the most recent step.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            cycle: self.cycle,
            pc: self.last_pc,
            inst: self.last_inst,
            regs: self.cpu.regs,
            xlen: self.config.xlen,
        }
    }

    fn fetch(&self, pc: u64) -> Result<Retired, Trap> {
        let xlen = self.config.xlen;
        let ram = &self.bus.ram;

        if !self.config.compressed {
            // a word without the `11` suffix has no 32-bit opcode and is rejected by decode
            let inst = ram.read(pc, Width::Word).with_pc(pc)? as u32;
            let instr = decode::decode(inst, xlen).with_pc(pc)?;
            return Ok(Retired { pc, inst, instr, compressed: None });
        }

        let lo = ram.read(pc, Width::Half).with_pc(pc)? as u16;
        if compressed::is_full_width(lo) {
            let hi = ram.read(xlen.zext(pc.wrapping_add(2)), Width::Half).with_pc(pc)? as u32;
            let inst = (hi << 16) | lo as u32;
            let instr = decode::decode(inst, xlen).with_pc(pc)?;
            Ok(Retired { pc, inst, instr, compressed: None })
        } else {
            let exp = compressed::decode_compressed(lo, xlen).with_pc(pc)?;
            Ok(Retired {
                pc,
                inst: exp.instr.encode(),
                instr: exp.instr,
                compressed: Some(Compressed { raw: lo, mnemonic: exp.mnemonic }),
            })
        }
    }

    /// Fetch, decode and execute one instruction.
    ///
    /// A host halt request is reported in preference to the watchdog when
    /// both happen on the same step.
    pub fn step(&mut self) -> Result<Step, Trap> {
        let pc = self.cpu.pc;
        let retired = self.fetch(pc)?;
        exec::execute(&mut self.cpu, &mut self.bus, retired.instr, retired.byte_len())?;
        self.last_pc = pc;
        self.last_inst = retired.inst;

        tracing::trace!(
            pc = format_args!("0x{pc:x}"),
            inst = format_args!("0x{:08x}", retired.inst),
            mnemonic = retired.compressed.map_or(retired.mnemonic(), |c| c.mnemonic),
            "retired"
        );

        let mut halt = None;
        if let Some(out) = self.bus.take_halt_request() {
            self.host_out.write_all(&out)?;
            self.host_out.flush()?;
            halt = Some(HaltReason::HostRequest);
        }

        self.cycle += 1;
        if halt.is_none() && self.cycle >= self.config.timeout {
            halt = Some(HaltReason::Timeout);
        }
        if let Some(reason) = halt {
            tracing::debug!(%reason, cycle = self.cycle, "halted");
        }

        Ok(Step { retired, halt })
    }

    /// Step until a halt is requested.
    pub fn run(&mut self) -> Result<HaltReason, Trap> {
        loop {
            if let Some(reason) = self.step()?.halt {
                return Ok(reason);
            }
        }
    }
}
