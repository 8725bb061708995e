//! Memory-mapped pseudo-devices.
//!
//! Two addresses are intercepted in front of RAM: a timer register that
//! always reads as zero, and the `tohost` port the guest uses to print
//! characters and to stop the run.

use super::Width;

/// Bit in a `tohost` word requesting that its low byte be buffered.
pub const TOHOST_PUTC: u32 = 1 << 16;
/// Bit in a `tohost` word requesting flush-and-halt.
pub const TOHOST_HALT: u32 = 1 << 17;

/// Outcome of offering a store to the MMIO shim.
#[derive(Debug, PartialEq, Eq)]
pub enum MmioWrite {
    /// Not a device access; the store goes to RAM.
    Unmapped,
    /// Consumed by a device.
    Absorbed,
    /// Consumed, and the guest asked to halt after emitting these bytes.
    Halt(Vec<u8>),
}

/// Output buffer behind the `tohost` port.
///
/// Bytes written past `capacity` are dropped.
#[derive(Debug)]
pub struct HostPort {
    buf: Vec<u8>,
    capacity: usize,
    dropped: usize,
}

impl HostPort {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    fn write(&mut self, value: u32) -> MmioWrite {
        if value & TOHOST_PUTC != 0 {
            if self.buf.len() < self.capacity {
                self.buf.push(value as u8);
            } else {
                self.dropped += 1;
                tracing::warn!(
                    capacity = self.capacity,
                    dropped = self.dropped,
                    "host output buffer full, dropping byte"
                );
            }
        }
        if value & TOHOST_HALT != 0 {
            self.dropped = 0;
            return MmioWrite::Halt(std::mem::take(&mut self.buf));
        }
        MmioWrite::Absorbed
    }
}

#[derive(Debug)]
pub struct Mmio {
    mtime_addr: u64,
    tohost_addr: u64,
    host: HostPort,
}

impl Mmio {
    pub fn new(mtime_addr: u64, tohost_addr: u64, host_capacity: usize) -> Self {
        Self {
            mtime_addr,
            tohost_addr,
            host: HostPort::new(host_capacity),
        }
    }

    pub fn host(&self) -> &HostPort {
        &self.host
    }

    /// Returns `Some` when the load is served by a device.
    pub fn read(&self, addr: u64, _width: Width) -> Option<u64> {
        (addr == self.mtime_addr).then_some(0)
    }

    /// Only 32-bit stores to `tohost` are intercepted; timer writes and
    /// every other width fall through to RAM.
    pub fn write(&mut self, addr: u64, width: Width, value: u64) -> MmioWrite {
        if addr == self.tohost_addr && width == Width::Word {
            self.host.write(value as u32)
        } else {
            MmioWrite::Unmapped
        }
    }
}
