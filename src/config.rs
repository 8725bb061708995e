//! Per-run machine configuration.
//!
//! Everything here is fixed when the [`Machine`](crate::cpu::Machine) is
//! constructed; nothing can be changed once a run has started.

pub const DEFAULT_TIMEOUT: u64 = 1_000_000;
pub const DEFAULT_RESET_VECTOR: u64 = 0x0000_0000;
pub const DEFAULT_MTIME_ADDR: u64 = 0x2000_0000;
pub const DEFAULT_TOHOST_ADDR: u64 = 0x4000_8000;
pub const DEFAULT_MEM_SIZE: usize = 128 * 1024;
pub const DEFAULT_HOST_BUF_CAPACITY: usize = 2048;

/// Native register width of the simulated hart.
///
/// Registers are always held in a `u64`. On RV32 a register value is kept
/// in canonical form: the low 32 bits, sign-extended to 64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Xlen {
    #[default]
    Rv32,
    Rv64,
}

impl Xlen {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            32 => Some(Xlen::Rv32),
            64 => Some(Xlen::Rv64),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Xlen::Rv32 => 32,
            Xlen::Rv64 => 64,
        }
    }

    /// Mask applied to register-sourced and immediate shift amounts.
    pub fn shamt_mask(self) -> u32 {
        self.bits() - 1
    }

    pub fn is_rv64(self) -> bool {
        self == Xlen::Rv64
    }

    /// Bring a 64-bit computation result into canonical register form.
    pub fn narrow(self, v: u64) -> u64 {
        match self {
            Xlen::Rv32 => v as u32 as i32 as i64 as u64,
            Xlen::Rv64 => v,
        }
    }

    /// Zero-extend a register value from the native width.
    pub fn zext(self, v: u64) -> u64 {
        match self {
            Xlen::Rv32 => v & 0xffff_ffff,
            Xlen::Rv64 => v,
        }
    }

    /// Most negative signed value representable at this width.
    pub fn signed_min(self) -> i64 {
        match self {
            Xlen::Rv32 => i32::MIN as i64,
            Xlen::Rv64 => i64::MIN,
        }
    }

    /// Hex digits needed to render one machine word.
    pub fn hex_digits(self) -> usize {
        (self.bits() / 4) as usize
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub xlen: Xlen,
    /// Decode 16-bit compressed encodings. When off, every fetch is 32 bits.
    pub compressed: bool,
    /// Watchdog: the step that completes this many cycles reports a halt.
    pub timeout: u64,
    pub reset_vector: u64,
    pub mtime_addr: u64,
    pub tohost_addr: u64,
    pub mem_size: usize,
    pub host_buf_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            xlen: Xlen::Rv32,
            compressed: true,
            timeout: DEFAULT_TIMEOUT,
            reset_vector: DEFAULT_RESET_VECTOR,
            mtime_addr: DEFAULT_MTIME_ADDR,
            tohost_addr: DEFAULT_TOHOST_ADDR,
            mem_size: DEFAULT_MEM_SIZE,
            host_buf_capacity: DEFAULT_HOST_BUF_CAPACITY,
        }
    }
}

impl Config {
    pub fn rv64() -> Self {
        Self {
            xlen: Xlen::Rv64,
            ..Self::default()
        }
    }
}
