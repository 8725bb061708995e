//! RVC: 16-bit encodings, mapped onto the same [`Instr`] variants as their
//! 32-bit equivalents.

use super::decode::{DecodeError, Instr, sign_extend};
use crate::config::Xlen;

/// A decoded compressed instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Expanded {
    pub instr: Instr,
    pub mnemonic: &'static str,
}

fn expanded(instr: Instr, mnemonic: &'static str) -> Result<Expanded, DecodeError> {
    Ok(Expanded { instr, mnemonic })
}

/// Is `parcel` the low half of a 32-bit encoding?
pub fn is_full_width(parcel: u16) -> bool {
    parcel & 0b11 == 0b11
}

pub fn decode_compressed(parcel: u16, xlen: Xlen) -> Result<Expanded, DecodeError> {
    let c = parcel as u32;
    let illegal = Err(DecodeError::InvalidCompressed { inst: parcel });
    let rv64 = xlen.is_rv64();

    let funct3 = (c >> 13) & 0x7;
    let bit12 = (c >> 12) & 0x1;
    // full register fields
    let rd = ((c >> 7) & 0x1f) as u8;
    let rs2 = ((c >> 2) & 0x1f) as u8;
    // 3-bit register fields select x8..x15
    let rs1p = (((c >> 7) & 0x7) + 8) as u8;
    let rs2p = (((c >> 2) & 0x7) + 8) as u8;
    let imm6 = sign_extend((bit12 << 5) | ((c >> 2) & 0x1f), 6);
    let shamt = ((bit12 << 5) | ((c >> 2) & 0x1f)) as u8;

    // lw/sw offset: uimm[5:3] in 12:10, uimm[2] in 6, uimm[6] in 5
    let off_w = (((c >> 7) & 0x38) | ((c >> 4) & 0x4) | ((c << 1) & 0x40)) as i64;
    // ld/sd offset: uimm[5:3] in 12:10, uimm[7:6] in 6:5
    let off_d = (((c >> 7) & 0x38) | ((c << 1) & 0xc0)) as i64;

    match (c & 0b11, funct3) {
        // ---- quadrant 0 ----
        (0b00, 0b000) => {
            let imm = ((c >> 7) & 0x30) | ((c >> 1) & 0x3c0) | ((c >> 4) & 0x4) | ((c >> 2) & 0x8);
            if imm == 0 {
                // also catches the all-zero parcel
                return illegal;
            }
            expanded(Instr::Addi { rd: rs2p, rs1: 2, imm: imm as i64 }, "c.addi4spn")
        }
        (0b00, 0b010) => expanded(Instr::LW { rd: rs2p, rs1: rs1p, off: off_w }, "c.lw"),
        (0b00, 0b011) if rv64 => expanded(Instr::LD { rd: rs2p, rs1: rs1p, off: off_d }, "c.ld"),
        (0b00, 0b110) => expanded(Instr::SW { rs1: rs1p, rs2: rs2p, off: off_w }, "c.sw"),
        (0b00, 0b111) if rv64 => expanded(Instr::SD { rs1: rs1p, rs2: rs2p, off: off_d }, "c.sd"),

        // ---- quadrant 1 ----
        (0b01, 0b000) => {
            let name = if rd == 0 { "c.nop" } else { "c.addi" };
            expanded(Instr::Addi { rd, rs1: rd, imm: imm6 }, name)
        }
        (0b01, 0b001) if rv64 => {
            if rd == 0 {
                return illegal;
            }
            expanded(Instr::Addiw { rd, rs1: rd, imm: imm6 }, "c.addiw")
        }
        (0b01, 0b001) => expanded(Instr::Jal { rd: 1, off: cj_offset(c) }, "c.jal"),
        (0b01, 0b010) => expanded(Instr::Addi { rd, rs1: 0, imm: imm6 }, "c.li"),
        (0b01, 0b011) if rd == 2 => {
            let imm = ((c >> 3) & 0x200)
                | ((c >> 2) & 0x10)
                | ((c << 1) & 0x40)
                | ((c << 4) & 0x180)
                | ((c << 3) & 0x20);
            if imm == 0 {
                return illegal;
            }
            let imm = sign_extend(imm, 10);
            expanded(Instr::Addi { rd: 2, rs1: 2, imm }, "c.addi16sp")
        }
        (0b01, 0b011) => {
            if rd == 0 || imm6 == 0 {
                return illegal;
            }
            let imm = sign_extend(((bit12 << 5) | ((c >> 2) & 0x1f)) << 12, 18);
            expanded(Instr::Lui { rd, imm }, "c.lui")
        }
        (0b01, 0b100) => {
            let rd = rs1p;
            match (c >> 10) & 0x3 {
                0b00 | 0b01 if bit12 == 1 && !rv64 => illegal,
                0b00 => expanded(Instr::Srli { rd, rs1: rd, shamt }, "c.srli"),
                0b01 => expanded(Instr::Srai { rd, rs1: rd, shamt }, "c.srai"),
                0b10 => expanded(Instr::Andi { rd, rs1: rd, imm: imm6 }, "c.andi"),
                _ => {
                    let rs2 = rs2p;
                    match (bit12, (c >> 5) & 0x3) {
                        (0, 0b00) => expanded(Instr::Sub { rd, rs1: rd, rs2 }, "c.sub"),
                        (0, 0b01) => expanded(Instr::Xor { rd, rs1: rd, rs2 }, "c.xor"),
                        (0, 0b10) => expanded(Instr::Or { rd, rs1: rd, rs2 }, "c.or"),
                        (0, 0b11) => expanded(Instr::And { rd, rs1: rd, rs2 }, "c.and"),
                        (1, 0b00) if rv64 => expanded(Instr::Subw { rd, rs1: rd, rs2 }, "c.subw"),
                        (1, 0b01) if rv64 => expanded(Instr::Addw { rd, rs1: rd, rs2 }, "c.addw"),
                        _ => illegal,
                    }
                }
            }
        }
        (0b01, 0b101) => expanded(Instr::Jal { rd: 0, off: cj_offset(c) }, "c.j"),
        (0b01, 0b110) => expanded(Instr::Beq { rs1: rs1p, rs2: 0, off: cb_offset(c) }, "c.beqz"),
        (0b01, 0b111) => expanded(Instr::Bne { rs1: rs1p, rs2: 0, off: cb_offset(c) }, "c.bnez"),

        // ---- quadrant 2 ----
        (0b10, 0b000) => {
            if bit12 == 1 && !rv64 {
                return illegal;
            }
            expanded(Instr::Slli { rd, rs1: rd, shamt }, "c.slli")
        }
        (0b10, 0b010) => {
            if rd == 0 {
                return illegal;
            }
            let off = ((c >> 7) & 0x20) | ((c >> 2) & 0x1c) | ((c << 4) & 0xc0);
            expanded(Instr::LW { rd, rs1: 2, off: off as i64 }, "c.lwsp")
        }
        (0b10, 0b011) if rv64 => {
            if rd == 0 {
                return illegal;
            }
            let off = ((c >> 7) & 0x20) | ((c >> 2) & 0x18) | ((c << 4) & 0x1c0);
            expanded(Instr::LD { rd, rs1: 2, off: off as i64 }, "c.ldsp")
        }
        (0b10, 0b100) => match (bit12, rd, rs2) {
            (0, 0, 0) => illegal,
            (0, _, 0) => expanded(Instr::Jalr { rd: 0, rs1: rd, off: 0 }, "c.jr"),
            (0, _, _) => expanded(Instr::Add { rd, rs1: 0, rs2 }, "c.mv"),
            // c.ebreak
            (_, 0, 0) => illegal,
            (_, _, 0) => expanded(Instr::Jalr { rd: 1, rs1: rd, off: 0 }, "c.jalr"),
            _ => expanded(Instr::Add { rd, rs1: rd, rs2 }, "c.add"),
        },
        (0b10, 0b110) => {
            let off = ((c >> 7) & 0x3c) | ((c >> 1) & 0xc0);
            expanded(Instr::SW { rs1: 2, rs2, off: off as i64 }, "c.swsp")
        }
        (0b10, 0b111) if rv64 => {
            let off = ((c >> 7) & 0x38) | ((c >> 1) & 0x1c0);
            expanded(Instr::SD { rs1: 2, rs2, off: off as i64 }, "c.sdsp")
        }

        // floating point, reserved slots, and rv64-only forms on rv32
        _ => illegal,
    }
}

/// c.j / c.jal: offset[11|4|9:8|10|6|7|3:1|5] in bits 12:2
fn cj_offset(c: u32) -> i64 {
    let imm = ((c >> 1) & 0x800)
        | ((c >> 7) & 0x10)
        | ((c >> 1) & 0x300)
        | ((c << 2) & 0x400)
        | ((c >> 1) & 0x40)
        | ((c << 1) & 0x80)
        | ((c >> 2) & 0xe)
        | ((c << 3) & 0x20);
    sign_extend(imm, 12)
}

/// c.beqz / c.bnez: offset[8|4:3] in 12:10, offset[7:6|2:1|5] in 6:2
fn cb_offset(c: u32) -> i64 {
    let imm = ((c >> 4) & 0x100)
        | ((c >> 7) & 0x18)
        | ((c << 1) & 0xc0)
        | ((c >> 2) & 0x6)
        | ((c << 3) & 0x20);
    sign_extend(imm, 9)
}
