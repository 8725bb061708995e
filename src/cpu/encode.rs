//! Canonical 32-bit encodings.
//!
//! Compressed instructions are traced as the 32-bit word they expand to; this
//! is where that word comes from.

use super::decode::Instr;
use crate::mem::Width;

fn r_type(opcode: u32, rd: u8, funct3: u32, rs1: u8, rs2: u8, funct7: u32) -> u32 {
    (funct7 << 25)
        | ((rs2 as u32) << 20)
        | ((rs1 as u32) << 15)
        | (funct3 << 12)
        | ((rd as u32) << 7)
        | opcode
}

fn i_type(opcode: u32, rd: u8, funct3: u32, rs1: u8, imm: i64) -> u32 {
    (((imm as u32) & 0xfff) << 20)
        | ((rs1 as u32) << 15)
        | (funct3 << 12)
        | ((rd as u32) << 7)
        | opcode
}

fn s_type(opcode: u32, funct3: u32, rs1: u8, rs2: u8, imm: i64) -> u32 {
    let imm = imm as u32;
    (((imm >> 5) & 0x7f) << 25)
        | ((rs2 as u32) << 20)
        | ((rs1 as u32) << 15)
        | (funct3 << 12)
        | ((imm & 0x1f) << 7)
        | opcode
}

fn b_type(funct3: u32, rs1: u8, rs2: u8, off: i64) -> u32 {
    let imm = off as u32;
    (((imm >> 12) & 0x1) << 31)
        | (((imm >> 5) & 0x3f) << 25)
        | ((rs2 as u32) << 20)
        | ((rs1 as u32) << 15)
        | (funct3 << 12)
        | (((imm >> 1) & 0xf) << 8)
        | (((imm >> 11) & 0x1) << 7)
        | 0b1100011
}

fn u_type(opcode: u32, rd: u8, imm: i64) -> u32 {
    ((imm as u32) & 0xffff_f000) | ((rd as u32) << 7) | opcode
}

fn j_type(rd: u8, off: i64) -> u32 {
    let imm = off as u32;
    (((imm >> 20) & 0x1) << 31)
        | (((imm >> 1) & 0x3ff) << 21)
        | (((imm >> 11) & 0x1) << 20)
        | (((imm >> 12) & 0xff) << 12)
        | ((rd as u32) << 7)
        | 0b1101111
}

fn width_funct3(width: Width) -> u32 {
    if width == Width::Double { 0x3 } else { 0x2 }
}

fn amo(funct5: u32, aqrl: u8, rd: u8, rs1: u8, rs2: u8, width: Width) -> u32 {
    r_type(
        0b0101111,
        rd,
        width_funct3(width),
        rs1,
        rs2,
        (funct5 << 2) | (aqrl as u32 & 0x3),
    )
}

impl Instr {
    pub fn encode(self) -> u32 {
        const OP: u32 = 0b0110011;
        const OP_IMM: u32 = 0b0010011;
        const OP_32: u32 = 0b0111011;
        const OP_IMM_32: u32 = 0b0011011;
        const LOAD: u32 = 0b0000011;
        const STORE: u32 = 0b0100011;

        match self {
            Instr::Add { rd, rs1, rs2 } => r_type(OP, rd, 0x0, rs1, rs2, 0x00),
            Instr::Sub { rd, rs1, rs2 } => r_type(OP, rd, 0x0, rs1, rs2, 0x20),
            Instr::Sll { rd, rs1, rs2 } => r_type(OP, rd, 0x1, rs1, rs2, 0x00),
            Instr::Slt { rd, rs1, rs2 } => r_type(OP, rd, 0x2, rs1, rs2, 0x00),
            Instr::Sltu { rd, rs1, rs2 } => r_type(OP, rd, 0x3, rs1, rs2, 0x00),
            Instr::Xor { rd, rs1, rs2 } => r_type(OP, rd, 0x4, rs1, rs2, 0x00),
            Instr::Srl { rd, rs1, rs2 } => r_type(OP, rd, 0x5, rs1, rs2, 0x00),
            Instr::Sra { rd, rs1, rs2 } => r_type(OP, rd, 0x5, rs1, rs2, 0x20),
            Instr::Or { rd, rs1, rs2 } => r_type(OP, rd, 0x6, rs1, rs2, 0x00),
            Instr::And { rd, rs1, rs2 } => r_type(OP, rd, 0x7, rs1, rs2, 0x00),
            Instr::Mul { rd, rs1, rs2 } => r_type(OP, rd, 0x0, rs1, rs2, 0x01),
            Instr::Mulh { rd, rs1, rs2 } => r_type(OP, rd, 0x1, rs1, rs2, 0x01),
            Instr::Mulhsu { rd, rs1, rs2 } => r_type(OP, rd, 0x2, rs1, rs2, 0x01),
            Instr::Mulhu { rd, rs1, rs2 } => r_type(OP, rd, 0x3, rs1, rs2, 0x01),
            Instr::Div { rd, rs1, rs2 } => r_type(OP, rd, 0x4, rs1, rs2, 0x01),
            Instr::Divu { rd, rs1, rs2 } => r_type(OP, rd, 0x5, rs1, rs2, 0x01),
            Instr::Rem { rd, rs1, rs2 } => r_type(OP, rd, 0x6, rs1, rs2, 0x01),
            Instr::Remu { rd, rs1, rs2 } => r_type(OP, rd, 0x7, rs1, rs2, 0x01),

            Instr::Addi { rd, rs1, imm } => i_type(OP_IMM, rd, 0x0, rs1, imm),
            Instr::Slti { rd, rs1, imm } => i_type(OP_IMM, rd, 0x2, rs1, imm),
            Instr::Sltiu { rd, rs1, imm } => i_type(OP_IMM, rd, 0x3, rs1, imm),
            Instr::Xori { rd, rs1, imm } => i_type(OP_IMM, rd, 0x4, rs1, imm),
            Instr::Ori { rd, rs1, imm } => i_type(OP_IMM, rd, 0x6, rs1, imm),
            Instr::Andi { rd, rs1, imm } => i_type(OP_IMM, rd, 0x7, rs1, imm),
            Instr::Slli { rd, rs1, shamt } => i_type(OP_IMM, rd, 0x1, rs1, shamt as i64),
            Instr::Srli { rd, rs1, shamt } => i_type(OP_IMM, rd, 0x5, rs1, shamt as i64),
            Instr::Srai { rd, rs1, shamt } => {
                i_type(OP_IMM, rd, 0x5, rs1, 0x400 | shamt as i64)
            }

            Instr::LB { rd, rs1, off } => i_type(LOAD, rd, 0x0, rs1, off),
            Instr::LH { rd, rs1, off } => i_type(LOAD, rd, 0x1, rs1, off),
            Instr::LW { rd, rs1, off } => i_type(LOAD, rd, 0x2, rs1, off),
            Instr::LD { rd, rs1, off } => i_type(LOAD, rd, 0x3, rs1, off),
            Instr::LBU { rd, rs1, off } => i_type(LOAD, rd, 0x4, rs1, off),
            Instr::LHU { rd, rs1, off } => i_type(LOAD, rd, 0x5, rs1, off),
            Instr::LWU { rd, rs1, off } => i_type(LOAD, rd, 0x6, rs1, off),

            Instr::SB { rs1, rs2, off } => s_type(STORE, 0x0, rs1, rs2, off),
            Instr::SH { rs1, rs2, off } => s_type(STORE, 0x1, rs1, rs2, off),
            Instr::SW { rs1, rs2, off } => s_type(STORE, 0x2, rs1, rs2, off),
            Instr::SD { rs1, rs2, off } => s_type(STORE, 0x3, rs1, rs2, off),

            Instr::Beq { rs1, rs2, off } => b_type(0x0, rs1, rs2, off),
            Instr::Bne { rs1, rs2, off } => b_type(0x1, rs1, rs2, off),
            Instr::Blt { rs1, rs2, off } => b_type(0x4, rs1, rs2, off),
            Instr::Bge { rs1, rs2, off } => b_type(0x5, rs1, rs2, off),
            Instr::Bltu { rs1, rs2, off } => b_type(0x6, rs1, rs2, off),
            Instr::Bgeu { rs1, rs2, off } => b_type(0x7, rs1, rs2, off),

            Instr::Jal { rd, off } => j_type(rd, off),
            Instr::Jalr { rd, rs1, off } => i_type(0b1100111, rd, 0x0, rs1, off),
            Instr::Lui { rd, imm } => u_type(0b0110111, rd, imm),
            Instr::Auipc { rd, imm } => u_type(0b0010111, rd, imm),
            Instr::Fence { rd, rs1, imm } => i_type(0b0001111, rd, 0x0, rs1, imm as i64),
            Instr::FenceI { rd, rs1, imm } => i_type(0b0001111, rd, 0x1, rs1, imm as i64),

            Instr::Addiw { rd, rs1, imm } => i_type(OP_IMM_32, rd, 0x0, rs1, imm),
            Instr::Slliw { rd, rs1, shamt } => i_type(OP_IMM_32, rd, 0x1, rs1, shamt as i64),
            Instr::Srliw { rd, rs1, shamt } => i_type(OP_IMM_32, rd, 0x5, rs1, shamt as i64),
            Instr::Sraiw { rd, rs1, shamt } => {
                i_type(OP_IMM_32, rd, 0x5, rs1, 0x400 | shamt as i64)
            }
            Instr::Addw { rd, rs1, rs2 } => r_type(OP_32, rd, 0x0, rs1, rs2, 0x00),
            Instr::Subw { rd, rs1, rs2 } => r_type(OP_32, rd, 0x0, rs1, rs2, 0x20),
            Instr::Sllw { rd, rs1, rs2 } => r_type(OP_32, rd, 0x1, rs1, rs2, 0x00),
            Instr::Srlw { rd, rs1, rs2 } => r_type(OP_32, rd, 0x5, rs1, rs2, 0x00),
            Instr::Sraw { rd, rs1, rs2 } => r_type(OP_32, rd, 0x5, rs1, rs2, 0x20),
            Instr::Mulw { rd, rs1, rs2 } => r_type(OP_32, rd, 0x0, rs1, rs2, 0x01),
            Instr::Divw { rd, rs1, rs2 } => r_type(OP_32, rd, 0x4, rs1, rs2, 0x01),
            Instr::Divuw { rd, rs1, rs2 } => r_type(OP_32, rd, 0x5, rs1, rs2, 0x01),
            Instr::Remw { rd, rs1, rs2 } => r_type(OP_32, rd, 0x6, rs1, rs2, 0x01),
            Instr::Remuw { rd, rs1, rs2 } => r_type(OP_32, rd, 0x7, rs1, rs2, 0x01),

            Instr::Lr { rd, rs1, width, aqrl } => amo(0x02, aqrl, rd, rs1, 0, width),
            Instr::Sc { rd, rs1, rs2, width, aqrl } => amo(0x03, aqrl, rd, rs1, rs2, width),
            Instr::Amo { op, rd, rs1, rs2, width, aqrl } => {
                amo(op.funct5(), aqrl, rd, rs1, rs2, width)
            }
        }
    }
}
