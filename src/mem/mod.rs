pub mod mmio;

use std::fmt;
use thiserror::Error;

use mmio::{Mmio, MmioWrite};

/// Access width of a single memory operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Half,
    Word,
    Double,
}

impl Width {
    pub fn bytes(self) -> usize {
        match self {
            Width::Byte => 1,
            Width::Half => 2,
            Width::Word => 4,
            Width::Double => 8,
        }
    }

    pub fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    /// Sign-extend the low `self.bits()` bits of `v` to 64 bits.
    pub fn sext(self, v: u64) -> u64 {
        match self {
            Width::Byte => v as u8 as i8 as i64 as u64,
            Width::Half => v as u16 as i16 as i64 as u64,
            Width::Word => v as u32 as i32 as i64 as u64,
            Width::Double => v,
        }
    }

    /// Keep only the low `self.bits()` bits of `v`.
    pub fn truncate(self, v: u64) -> u64 {
        match self {
            Width::Double => v,
            w => v & ((1u64 << w.bits()) - 1),
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => f.write_str("read"),
            Access::Write => f.write_str("write"),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    #[error("{width} {access} out of range: 0x{addr:x}")]
    OutOfBounds {
        addr: u64,
        width: Width,
        access: Access,
    },
}

/// Flat little-endian RAM starting at address 0.
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    pub fn new(bytes: usize) -> Self {
        Self {
            data: vec![0; bytes],
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    fn check_oob(&self, addr: u64, width: Width, access: Access) -> Result<usize, MemError> {
        let oob = MemError::OutOfBounds {
            addr,
            width,
            access,
        };
        let end = addr.checked_add(width.bytes() as u64).ok_or(oob)?;
        if end > self.capacity() as u64 {
            return Err(oob);
        }
        Ok(addr as usize)
    }

    /// Read `width` bytes at `addr`, zero-extended into a `u64`.
    pub fn read(&self, addr: u64, width: Width) -> Result<u64, MemError> {
        let off = self.check_oob(addr, width, Access::Read)?;
        let n = width.bytes();
        let mut b = [0u8; 8];
        b[..n].copy_from_slice(&self.data[off..off + n]);
        Ok(u64::from_le_bytes(b))
    }

    /// Write the low `width` bytes of `value` at `addr`.
    pub fn write(&mut self, addr: u64, width: Width, value: u64) -> Result<(), MemError> {
        let off = self.check_oob(addr, width, Access::Write)?;
        let n = width.bytes();
        self.data[off..off + n].copy_from_slice(&value.to_le_bytes()[..n]);
        Ok(())
    }

    pub fn write_bytes(&mut self, addr: u64, bytes: &[u8]) -> Result<(), MemError> {
        let oob = MemError::OutOfBounds {
            addr,
            width: Width::Byte,
            access: Access::Write,
        };
        let end = addr.checked_add(bytes.len() as u64).ok_or(oob)?;
        if end > self.capacity() as u64 {
            return Err(oob);
        }
        let off = addr as usize;
        self.data[off..off + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Clear `len` bytes from `addr` in place.
    pub fn zero(&mut self, addr: u64, len: u64) -> Result<(), MemError> {
        let oob = MemError::OutOfBounds {
            addr,
            width: Width::Byte,
            access: Access::Write,
        };
        let end = addr.checked_add(len).ok_or(oob)?;
        if end > self.capacity() as u64 {
            return Err(oob);
        }
        self.data[addr as usize..end as usize].fill(0);
        Ok(())
    }

    /// Store `image` as consecutive little-endian words from address 0.
    ///
    /// Returns the number of words written. A trailing partial word is not
    /// loaded.
    pub fn load_image(&mut self, image: &[u8]) -> Result<usize, MemError> {
        let mut addr = 0u64;
        let mut words = 0;
        for chunk in image.chunks_exact(4) {
            let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            self.write(addr, Width::Word, word as u64)?;
            addr += 4;
            words += 1;
        }
        let tail = image.len() % 4;
        if tail != 0 {
            tracing::warn!(tail, "image length is not a multiple of 4, ignoring trailing bytes");
        }
        Ok(words)
    }
}

/// Data-side view of the address space: RAM with the MMIO shim in front.
pub struct Bus {
    pub ram: Memory,
    pub mmio: Mmio,
    halt_request: Option<Vec<u8>>,
}

impl Bus {
    pub fn new(ram: Memory, mmio: Mmio) -> Self {
        Self {
            ram,
            mmio,
            halt_request: None,
        }
    }

    pub fn load(&self, addr: u64, width: Width) -> Result<u64, MemError> {
        match self.mmio.read(addr, width) {
            Some(v) => Ok(v),
            None => self.ram.read(addr, width),
        }
    }

    pub fn store(&mut self, addr: u64, width: Width, value: u64) -> Result<(), MemError> {
        match self.mmio.write(addr, width, value) {
            MmioWrite::Unmapped => self.ram.write(addr, width, value),
            MmioWrite::Absorbed => Ok(()),
            MmioWrite::Halt(out) => {
                self.halt_request.get_or_insert_with(Vec::new).extend(out);
                Ok(())
            }
        }
    }

    /// Output the guest asked to flush before halting, if it did.
    pub fn take_halt_request(&mut self) -> Option<Vec<u8>> {
        self.halt_request.take()
    }
}
