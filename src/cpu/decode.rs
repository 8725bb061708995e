use std::fmt;

use crate::config::Xlen;
use crate::mem::Width;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    InvalidOpcode { inst: u32 },
    InvalidFunct { inst: u32 },
    InvalidCompressed { inst: u16 },
}

impl DecodeError {
    /// Raw encoding that failed to decode, zero-extended for 16-bit forms.
    pub fn inst(&self) -> u32 {
        match *self {
            DecodeError::InvalidOpcode { inst } | DecodeError::InvalidFunct { inst } => inst,
            DecodeError::InvalidCompressed { inst } => inst as u32,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidOpcode { inst } => write!(f, "invalid opcode: 0x{:08x}", inst),
            DecodeError::InvalidFunct { inst } => write!(f, "invalid function: 0x{:08x}", inst),
            DecodeError::InvalidCompressed { inst } => {
                write!(f, "invalid compressed instruction: 0x{:04x}", inst)
            }
        }
    }
}

/// Read-modify-write operation of an A-extension AMO.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AmoOp {
    Swap,
    Add,
    Xor,
    And,
    Or,
    Min,
    Max,
    Minu,
    Maxu,
}

impl AmoOp {
    fn from_funct5(funct5: u32) -> Option<Self> {
        match funct5 {
            0x01 => Some(AmoOp::Swap),
            0x00 => Some(AmoOp::Add),
            0x04 => Some(AmoOp::Xor),
            0x0c => Some(AmoOp::And),
            0x08 => Some(AmoOp::Or),
            0x10 => Some(AmoOp::Min),
            0x14 => Some(AmoOp::Max),
            0x18 => Some(AmoOp::Minu),
            0x1c => Some(AmoOp::Maxu),
            _ => None,
        }
    }

    pub fn funct5(self) -> u32 {
        match self {
            AmoOp::Swap => 0x01,
            AmoOp::Add => 0x00,
            AmoOp::Xor => 0x04,
            AmoOp::And => 0x0c,
            AmoOp::Or => 0x08,
            AmoOp::Min => 0x10,
            AmoOp::Max => 0x14,
            AmoOp::Minu => 0x18,
            AmoOp::Maxu => 0x1c,
        }
    }

    /// New memory value for `old` combined with `src`, compared at `width`.
    pub fn apply(self, width: Width, old: u64, src: u64) -> u64 {
        let (so, ss) = (width.sext(old) as i64, width.sext(src) as i64);
        let (uo, us) = (width.truncate(old), width.truncate(src));
        match self {
            AmoOp::Swap => src,
            AmoOp::Add => old.wrapping_add(src),
            AmoOp::Xor => old ^ src,
            AmoOp::And => old & src,
            AmoOp::Or => old | src,
            AmoOp::Min => so.min(ss) as u64,
            AmoOp::Max => so.max(ss) as u64,
            AmoOp::Minu => uo.min(us),
            AmoOp::Maxu => uo.max(us),
        }
    }

    fn mnemonic(self, width: Width) -> &'static str {
        let word = width == Width::Word;
        match self {
            AmoOp::Swap => if word { "amoswap.w" } else { "amoswap.d" },
            AmoOp::Add => if word { "amoadd.w" } else { "amoadd.d" },
            AmoOp::Xor => if word { "amoxor.w" } else { "amoxor.d" },
            AmoOp::And => if word { "amoand.w" } else { "amoand.d" },
            AmoOp::Or => if word { "amoor.w" } else { "amoor.d" },
            AmoOp::Min => if word { "amomin.w" } else { "amomin.d" },
            AmoOp::Max => if word { "amomax.w" } else { "amomax.d" },
            AmoOp::Minu => if word { "amominu.w" } else { "amominu.d" },
            AmoOp::Maxu => if word { "amomaxu.w" } else { "amomaxu.d" },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instr {
    // ** RISC-V 32 & 64 Base Instructions **
    // R-type (0b0110011)
    Add { rd: u8, rs1: u8, rs2: u8 },
    Sub { rd: u8, rs1: u8, rs2: u8 },
    Xor { rd: u8, rs1: u8, rs2: u8 },
    Or { rd: u8, rs1: u8, rs2: u8 },
    And { rd: u8, rs1: u8, rs2: u8 },
    Sll { rd: u8, rs1: u8, rs2: u8 },
    Srl { rd: u8, rs1: u8, rs2: u8 },
    Sra { rd: u8, rs1: u8, rs2: u8 },
    Slt { rd: u8, rs1: u8, rs2: u8 },
    Sltu { rd: u8, rs1: u8, rs2: u8 },
    // I-type arithmetic (0b0010011)
    Addi { rd: u8, rs1: u8, imm: i64 },
    Xori { rd: u8, rs1: u8, imm: i64 },
    Ori { rd: u8, rs1: u8, imm: i64 },
    Andi { rd: u8, rs1: u8, imm: i64 },
    Slli { rd: u8, rs1: u8, shamt: u8 },
    Srli { rd: u8, rs1: u8, shamt: u8 },
    Srai { rd: u8, rs1: u8, shamt: u8 },
    Slti { rd: u8, rs1: u8, imm: i64 },
    Sltiu { rd: u8, rs1: u8, imm: i64 },
    // I-type load (0b0000011)
    LB { rd: u8, rs1: u8, off: i64 },
    LBU { rd: u8, rs1: u8, off: i64 },
    LH { rd: u8, rs1: u8, off: i64 },
    LHU { rd: u8, rs1: u8, off: i64 },
    LW { rd: u8, rs1: u8, off: i64 },
    // S-type (0b0100011)
    SB { rs1: u8, rs2: u8, off: i64 },
    SH { rs1: u8, rs2: u8, off: i64 },
    SW { rs1: u8, rs2: u8, off: i64 },
    // B-type (0b1100011)
    Beq { rs1: u8, rs2: u8, off: i64 },
    Bne { rs1: u8, rs2: u8, off: i64 },
    Blt { rs1: u8, rs2: u8, off: i64 },
    Bge { rs1: u8, rs2: u8, off: i64 },
    Bltu { rs1: u8, rs2: u8, off: i64 },
    Bgeu { rs1: u8, rs2: u8, off: i64 },
    // J-type (0b1101111)
    Jal { rd: u8, off: i64 },
    // I-type jump (0b1100111)
    Jalr { rd: u8, rs1: u8, off: i64 },
    // U-type
    Lui { rd: u8, imm: i64 },   // 0b0110111
    Auipc { rd: u8, imm: i64 }, // 0b0010111
    // 0b0001111, both no-ops here
    Fence { rd: u8, rs1: u8, imm: u16 },
    FenceI { rd: u8, rs1: u8, imm: u16 },

    // ** RISC-V 64 Base Instructions **
    Addiw { rd: u8, rs1: u8, imm: i64 },
    Slliw { rd: u8, rs1: u8, shamt: u8 },
    Srliw { rd: u8, rs1: u8, shamt: u8 },
    Sraiw { rd: u8, rs1: u8, shamt: u8 },
    Addw { rd: u8, rs1: u8, rs2: u8 },
    Subw { rd: u8, rs1: u8, rs2: u8 },
    Sllw { rd: u8, rs1: u8, rs2: u8 },
    Srlw { rd: u8, rs1: u8, rs2: u8 },
    Sraw { rd: u8, rs1: u8, rs2: u8 },
    LWU { rd: u8, rs1: u8, off: i64 },
    LD { rd: u8, rs1: u8, off: i64 },
    SD { rs1: u8, rs2: u8, off: i64 },

    // ** M extension ** (funct7 = 0b0000001)
    Mul { rd: u8, rs1: u8, rs2: u8 },
    Mulh { rd: u8, rs1: u8, rs2: u8 },
    Mulhsu { rd: u8, rs1: u8, rs2: u8 },
    Mulhu { rd: u8, rs1: u8, rs2: u8 },
    Div { rd: u8, rs1: u8, rs2: u8 },
    Divu { rd: u8, rs1: u8, rs2: u8 },
    Rem { rd: u8, rs1: u8, rs2: u8 },
    Remu { rd: u8, rs1: u8, rs2: u8 },
    Mulw { rd: u8, rs1: u8, rs2: u8 },
    Divw { rd: u8, rs1: u8, rs2: u8 },
    Divuw { rd: u8, rs1: u8, rs2: u8 },
    Remw { rd: u8, rs1: u8, rs2: u8 },
    Remuw { rd: u8, rs1: u8, rs2: u8 },

    // ** A extension ** (0b0101111), `aqrl` is carried for re-encoding only
    Lr { rd: u8, rs1: u8, width: Width, aqrl: u8 },
    Sc { rd: u8, rs1: u8, rs2: u8, width: Width, aqrl: u8 },
    Amo { op: AmoOp, rd: u8, rs1: u8, rs2: u8, width: Width, aqrl: u8 },
}

impl Instr {
    pub fn mnemonic(&self) -> &'static str {
        match *self {
            Instr::Add { .. } => "add",
            Instr::Sub { .. } => "sub",
            Instr::Xor { .. } => "xor",
            Instr::Or { .. } => "or",
            Instr::And { .. } => "and",
            Instr::Sll { .. } => "sll",
            Instr::Srl { .. } => "srl",
            Instr::Sra { .. } => "sra",
            Instr::Slt { .. } => "slt",
            Instr::Sltu { .. } => "sltu",
            Instr::Addi { .. } => "addi",
            Instr::Xori { .. } => "xori",
            Instr::Ori { .. } => "ori",
            Instr::Andi { .. } => "andi",
            Instr::Slli { .. } => "slli",
            Instr::Srli { .. } => "srli",
            Instr::Srai { .. } => "srai",
            Instr::Slti { .. } => "slti",
            Instr::Sltiu { .. } => "sltiu",
            Instr::LB { .. } => "lb",
            Instr::LBU { .. } => "lbu",
            Instr::LH { .. } => "lh",
            Instr::LHU { .. } => "lhu",
            Instr::LW { .. } => "lw",
            Instr::SB { .. } => "sb",
            Instr::SH { .. } => "sh",
            Instr::SW { .. } => "sw",
            Instr::Beq { .. } => "beq",
            Instr::Bne { .. } => "bne",
            Instr::Blt { .. } => "blt",
            Instr::Bge { .. } => "bge",
            Instr::Bltu { .. } => "bltu",
            Instr::Bgeu { .. } => "bgeu",
            Instr::Jal { .. } => "jal",
            Instr::Jalr { .. } => "jalr",
            Instr::Lui { .. } => "lui",
            Instr::Auipc { .. } => "auipc",
            Instr::Fence { .. } => "fence",
            Instr::FenceI { .. } => "fence.i",
            Instr::Addiw { .. } => "addiw",
            Instr::Slliw { .. } => "slliw",
            Instr::Srliw { .. } => "srliw",
            Instr::Sraiw { .. } => "sraiw",
            Instr::Addw { .. } => "addw",
            Instr::Subw { .. } => "subw",
            Instr::Sllw { .. } => "sllw",
            Instr::Srlw { .. } => "srlw",
            Instr::Sraw { .. } => "sraw",
            Instr::LWU { .. } => "lwu",
            Instr::LD { .. } => "ld",
            Instr::SD { .. } => "sd",
            Instr::Mul { .. } => "mul",
            Instr::Mulh { .. } => "mulh",
            Instr::Mulhsu { .. } => "mulhsu",
            Instr::Mulhu { .. } => "mulhu",
            Instr::Div { .. } => "div",
            Instr::Divu { .. } => "divu",
            Instr::Rem { .. } => "rem",
            Instr::Remu { .. } => "remu",
            Instr::Mulw { .. } => "mulw",
            Instr::Divw { .. } => "divw",
            Instr::Divuw { .. } => "divuw",
            Instr::Remw { .. } => "remw",
            Instr::Remuw { .. } => "remuw",
            Instr::Lr { width, .. } => {
                if width == Width::Word { "lr.w" } else { "lr.d" }
            }
            Instr::Sc { width, .. } => {
                if width == Width::Word { "sc.w" } else { "sc.d" }
            }
            Instr::Amo { op, width, .. } => op.mnemonic(width),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Sign-extend the low `bits` bits of `value`.
///
/// Extension goes to 32 bits first and only then to 64, so an immediate
/// always passes through its 32-bit form.
pub fn sign_extend(value: u32, bits: u32) -> i64 {
    let shift = 32 - bits;
    (((value << shift) as i32) >> shift) as i64
}

fn imm_i(inst: u32) -> i64 {
    sign_extend(inst >> 20, 12)
}

fn imm_s(inst: u32) -> i64 {
    let imm4_0 = (inst >> 7) & 0x1f;
    let imm11_5 = (inst >> 25) & 0x7f;
    sign_extend((imm11_5 << 5) | imm4_0, 12)
}

fn imm_b(inst: u32) -> i64 {
    let imm11 = (inst >> 7) & 0x1;
    let imm4_1 = (inst >> 8) & 0xf;
    let imm10_5 = (inst >> 25) & 0x3f;
    let imm12 = (inst >> 31) & 0x1;
    sign_extend(
        (imm12 << 12) | (imm11 << 11) | (imm10_5 << 5) | (imm4_1 << 1),
        13,
    )
}

fn imm_u(inst: u32) -> i64 {
    sign_extend(inst & 0xffff_f000, 32)
}

fn imm_j(inst: u32) -> i64 {
    let imm19_12 = (inst >> 12) & 0xff;
    let imm11 = (inst >> 20) & 0x1;
    let imm10_1 = (inst >> 21) & 0x3ff;
    let imm20 = (inst >> 31) & 0x1;
    sign_extend(
        (imm20 << 20) | (imm19_12 << 12) | (imm11 << 11) | (imm10_1 << 1),
        21,
    )
}

pub fn decode(inst: u32, xlen: Xlen) -> Result<Instr, DecodeError> {
    let opcode = inst & 0x7f;
    let rd = ((inst >> 7) & 0x1f) as u8;
    let funct3 = ((inst >> 12) & 0x7) as u8;
    let rs1 = ((inst >> 15) & 0x1f) as u8;
    let rs2 = ((inst >> 20) & 0x1f) as u8;
    let funct7 = ((inst >> 25) & 0x7f) as u8;
    let rv64 = xlen.is_rv64();
    let bad_funct = Err(DecodeError::InvalidFunct { inst });

    match opcode {
        // r type
        0b0110011 => match (funct3, funct7) {
            (0x0, 0x00) => Ok(Instr::Add { rd, rs1, rs2 }),
            (0x0, 0x20) => Ok(Instr::Sub { rd, rs1, rs2 }),
            (0x1, 0x00) => Ok(Instr::Sll { rd, rs1, rs2 }),
            (0x2, 0x00) => Ok(Instr::Slt { rd, rs1, rs2 }),
            (0x3, 0x00) => Ok(Instr::Sltu { rd, rs1, rs2 }),
            (0x4, 0x00) => Ok(Instr::Xor { rd, rs1, rs2 }),
            (0x5, 0x00) => Ok(Instr::Srl { rd, rs1, rs2 }),
            (0x5, 0x20) => Ok(Instr::Sra { rd, rs1, rs2 }),
            (0x6, 0x00) => Ok(Instr::Or { rd, rs1, rs2 }),
            (0x7, 0x00) => Ok(Instr::And { rd, rs1, rs2 }),
            (0x0, 0x01) => Ok(Instr::Mul { rd, rs1, rs2 }),
            (0x1, 0x01) => Ok(Instr::Mulh { rd, rs1, rs2 }),
            (0x2, 0x01) => Ok(Instr::Mulhsu { rd, rs1, rs2 }),
            (0x3, 0x01) => Ok(Instr::Mulhu { rd, rs1, rs2 }),
            (0x4, 0x01) => Ok(Instr::Div { rd, rs1, rs2 }),
            (0x5, 0x01) => Ok(Instr::Divu { rd, rs1, rs2 }),
            (0x6, 0x01) => Ok(Instr::Rem { rd, rs1, rs2 }),
            (0x7, 0x01) => Ok(Instr::Remu { rd, rs1, rs2 }),
            _ => bad_funct,
        },
        // i type
        0b0010011 => {
            let imm = imm_i(inst);
            // shamt plus the bits above it; only bit 10 may be set there
            let shift_field = (inst >> 20) & 0xfff;
            let shamt = (shift_field & xlen.shamt_mask()) as u8;
            match funct3 {
                0x0 => Ok(Instr::Addi { rd, rs1, imm }),
                0x2 => Ok(Instr::Slti { rd, rs1, imm }),
                0x3 => Ok(Instr::Sltiu { rd, rs1, imm }),
                0x4 => Ok(Instr::Xori { rd, rs1, imm }),
                0x6 => Ok(Instr::Ori { rd, rs1, imm }),
                0x7 => Ok(Instr::Andi { rd, rs1, imm }),
                0x1 if shift_field & !xlen.shamt_mask() == 0 => {
                    Ok(Instr::Slli { rd, rs1, shamt })
                }
                0x5 if shift_field & !(xlen.shamt_mask() | 0x400) == 0 => {
                    if shift_field & 0x400 != 0 {
                        Ok(Instr::Srai { rd, rs1, shamt })
                    } else {
                        Ok(Instr::Srli { rd, rs1, shamt })
                    }
                }
                _ => bad_funct,
            }
        }
        0b0000011 => {
            let off = imm_i(inst);
            match funct3 {
                0x0 => Ok(Instr::LB { rd, rs1, off }),
                0x1 => Ok(Instr::LH { rd, rs1, off }),
                0x2 => Ok(Instr::LW { rd, rs1, off }),
                0x4 => Ok(Instr::LBU { rd, rs1, off }),
                0x5 => Ok(Instr::LHU { rd, rs1, off }),
                // rv64 extensions
                0x3 if rv64 => Ok(Instr::LD { rd, rs1, off }),
                0x6 if rv64 => Ok(Instr::LWU { rd, rs1, off }),
                _ => bad_funct,
            }
        }
        // s type
        0b0100011 => {
            let off = imm_s(inst);
            match funct3 {
                0x0 => Ok(Instr::SB { rs1, rs2, off }),
                0x1 => Ok(Instr::SH { rs1, rs2, off }),
                0x2 => Ok(Instr::SW { rs1, rs2, off }),
                // rv64 extension
                0x3 if rv64 => Ok(Instr::SD { rs1, rs2, off }),
                _ => bad_funct,
            }
        }
        // b type
        0b1100011 => {
            let off = imm_b(inst);
            match funct3 {
                0x0 => Ok(Instr::Beq { rs1, rs2, off }),
                0x1 => Ok(Instr::Bne { rs1, rs2, off }),
                0x4 => Ok(Instr::Blt { rs1, rs2, off }),
                0x5 => Ok(Instr::Bge { rs1, rs2, off }),
                0x6 => Ok(Instr::Bltu { rs1, rs2, off }),
                0x7 => Ok(Instr::Bgeu { rs1, rs2, off }),
                _ => bad_funct,
            }
        }
        // u type
        0b0110111 => Ok(Instr::Lui { rd, imm: imm_u(inst) }),
        0b0010111 => Ok(Instr::Auipc { rd, imm: imm_u(inst) }),
        // j type
        0b1101111 => Ok(Instr::Jal { rd, off: imm_j(inst) }),
        // i type jalr
        0b1100111 => match funct3 {
            0x0 => Ok(Instr::Jalr { rd, rs1, off: imm_i(inst) }),
            _ => bad_funct,
        },
        0b0001111 => {
            let imm = (inst >> 20) as u16;
            match funct3 {
                0x0 => Ok(Instr::Fence { rd, rs1, imm }),
                0x1 => Ok(Instr::FenceI { rd, rs1, imm }),
                _ => bad_funct,
            }
        }
        0b0011011 if rv64 => {
            let shift_field = (inst >> 20) & 0xfff;
            let shamt = (shift_field & 0x1f) as u8;
            match funct3 {
                0x0 => Ok(Instr::Addiw { rd, rs1, imm: imm_i(inst) }),
                0x1 if shift_field & !0x1f == 0 => Ok(Instr::Slliw { rd, rs1, shamt }),
                0x5 if shift_field & !0x41f == 0 => {
                    if shift_field & 0x400 != 0 {
                        Ok(Instr::Sraiw { rd, rs1, shamt })
                    } else {
                        Ok(Instr::Srliw { rd, rs1, shamt })
                    }
                }
                _ => bad_funct,
            }
        }
        0b0111011 if rv64 => match (funct3, funct7) {
            (0x0, 0x00) => Ok(Instr::Addw { rd, rs1, rs2 }),
            (0x0, 0x20) => Ok(Instr::Subw { rd, rs1, rs2 }),
            (0x1, 0x00) => Ok(Instr::Sllw { rd, rs1, rs2 }),
            (0x5, 0x00) => Ok(Instr::Srlw { rd, rs1, rs2 }),
            (0x5, 0x20) => Ok(Instr::Sraw { rd, rs1, rs2 }),
            (0x0, 0x01) => Ok(Instr::Mulw { rd, rs1, rs2 }),
            (0x4, 0x01) => Ok(Instr::Divw { rd, rs1, rs2 }),
            (0x5, 0x01) => Ok(Instr::Divuw { rd, rs1, rs2 }),
            (0x6, 0x01) => Ok(Instr::Remw { rd, rs1, rs2 }),
            (0x7, 0x01) => Ok(Instr::Remuw { rd, rs1, rs2 }),
            _ => bad_funct,
        },
        0b0101111 => {
            let width = match funct3 {
                0x2 => Width::Word,
                0x3 if rv64 => Width::Double,
                _ => return bad_funct,
            };
            let funct5 = inst >> 27;
            let aqrl = funct7 & 0x3;
            match funct5 {
                0x02 if rs2 == 0 => Ok(Instr::Lr { rd, rs1, width, aqrl }),
                0x03 => Ok(Instr::Sc { rd, rs1, rs2, width, aqrl }),
                _ => match AmoOp::from_funct5(funct5) {
                    Some(op) => Ok(Instr::Amo { op, rd, rs1, rs2, width, aqrl }),
                    None => bad_funct,
                },
            }
        }
        _ => Err(DecodeError::InvalidOpcode { inst }),
    }
}
