use super::decode::Instr;
use super::trap::{Trap, WithPc};
use crate::config::Xlen;
use crate::cpu::Cpu;
use crate::mem::{Bus, Width};

/// Word-sized operations (`*w`) are the RV32 operations on the low half.
const W: Xlen = Xlen::Rv32;

fn shl(xlen: Xlen, a: u64, sh: u64) -> u64 {
    a << (sh as u32 & xlen.shamt_mask())
}

fn shr(xlen: Xlen, a: u64, sh: u64) -> u64 {
    xlen.zext(a) >> (sh as u32 & xlen.shamt_mask())
}

fn sar(xlen: Xlen, a: u64, sh: u64) -> u64 {
    (xlen.narrow(a) as i64 >> (sh as u32 & xlen.shamt_mask())) as u64
}

fn mulh(xlen: Xlen, a: u64, b: u64) -> u64 {
    ((a as i64 as i128 * b as i64 as i128) >> xlen.bits()) as u64
}

fn mulhsu(xlen: Xlen, a: u64, b: u64) -> u64 {
    ((a as i64 as i128 * xlen.zext(b) as i128) >> xlen.bits()) as u64
}

fn mulhu(xlen: Xlen, a: u64, b: u64) -> u64 {
    ((xlen.zext(a) as u128 * xlen.zext(b) as u128) >> xlen.bits()) as u64
}

// Operands are in canonical form, so `as i64` is the signed value at `xlen`.
fn div(xlen: Xlen, a: u64, b: u64) -> u64 {
    let (a, b) = (a as i64, b as i64);
    if b == 0 {
        u64::MAX
    } else if a == xlen.signed_min() && b == -1 {
        a as u64
    } else {
        (a / b) as u64
    }
}

fn divu(xlen: Xlen, a: u64, b: u64) -> u64 {
    let (a, b) = (xlen.zext(a), xlen.zext(b));
    if b == 0 { u64::MAX } else { a / b }
}

fn rem(xlen: Xlen, a: u64, b: u64) -> u64 {
    let (a, b) = (a as i64, b as i64);
    if b == 0 {
        a as u64
    } else if a == xlen.signed_min() && b == -1 {
        0
    } else {
        (a % b) as u64
    }
}

fn remu(xlen: Xlen, a: u64, b: u64) -> u64 {
    let (a, b) = (xlen.zext(a), xlen.zext(b));
    if b == 0 { a } else { a % b }
}

fn ea(cpu: &Cpu, rs1: u8, off: i64) -> u64 {
    cpu.xlen.zext(cpu.reg(rs1).wrapping_add(off as u64))
}

fn w_operands(cpu: &Cpu, rs1: u8, rs2: u8) -> (u64, u64) {
    (W.narrow(cpu.reg(rs1)), W.narrow(cpu.reg(rs2)))
}

/// Apply `instr`, which is `len` bytes long and located at `cpu.pc`, then
/// advance `cpu.pc` to the next instruction.
pub fn execute(cpu: &mut Cpu, bus: &mut Bus, instr: Instr, len: u64) -> Result<(), Trap> {
    let pc = cpu.pc;
    let xlen = cpu.xlen;
    let mut next_pc = pc.wrapping_add(len);

    match instr {
        Instr::Add { rd, rs1, rs2 } => cpu.set_reg(rd, cpu.reg(rs1).wrapping_add(cpu.reg(rs2))),
        Instr::Sub { rd, rs1, rs2 } => cpu.set_reg(rd, cpu.reg(rs1).wrapping_sub(cpu.reg(rs2))),
        Instr::Xor { rd, rs1, rs2 } => cpu.set_reg(rd, cpu.reg(rs1) ^ cpu.reg(rs2)),
        Instr::Or { rd, rs1, rs2 } => cpu.set_reg(rd, cpu.reg(rs1) | cpu.reg(rs2)),
        Instr::And { rd, rs1, rs2 } => cpu.set_reg(rd, cpu.reg(rs1) & cpu.reg(rs2)),
        Instr::Sll { rd, rs1, rs2 } => cpu.set_reg(rd, shl(xlen, cpu.reg(rs1), cpu.reg(rs2))),
        Instr::Srl { rd, rs1, rs2 } => cpu.set_reg(rd, shr(xlen, cpu.reg(rs1), cpu.reg(rs2))),
        Instr::Sra { rd, rs1, rs2 } => cpu.set_reg(rd, sar(xlen, cpu.reg(rs1), cpu.reg(rs2))),
        Instr::Slt { rd, rs1, rs2 } => {
            let lt = (cpu.reg(rs1) as i64) < (cpu.reg(rs2) as i64);
            cpu.set_reg(rd, lt as u64);
        }
        Instr::Sltu { rd, rs1, rs2 } => {
            let lt = cpu.reg(rs1) < cpu.reg(rs2);
            cpu.set_reg(rd, lt as u64);
        }

        Instr::Addi { rd, rs1, imm } => cpu.set_reg(rd, cpu.reg(rs1).wrapping_add(imm as u64)),
        Instr::Xori { rd, rs1, imm } => cpu.set_reg(rd, cpu.reg(rs1) ^ (imm as u64)),
        Instr::Ori { rd, rs1, imm } => cpu.set_reg(rd, cpu.reg(rs1) | (imm as u64)),
        Instr::Andi { rd, rs1, imm } => cpu.set_reg(rd, cpu.reg(rs1) & (imm as u64)),
        Instr::Slli { rd, rs1, shamt } => cpu.set_reg(rd, shl(xlen, cpu.reg(rs1), shamt as u64)),
        Instr::Srli { rd, rs1, shamt } => cpu.set_reg(rd, shr(xlen, cpu.reg(rs1), shamt as u64)),
        Instr::Srai { rd, rs1, shamt } => cpu.set_reg(rd, sar(xlen, cpu.reg(rs1), shamt as u64)),
        Instr::Slti { rd, rs1, imm } => {
            let lt = (cpu.reg(rs1) as i64) < imm;
            cpu.set_reg(rd, lt as u64);
        }
        Instr::Sltiu { rd, rs1, imm } => {
            let lt = cpu.reg(rs1) < xlen.narrow(imm as u64);
            cpu.set_reg(rd, lt as u64);
        }

        Instr::LB { rd, rs1, off } => {
            let v = bus.load(ea(cpu, rs1, off), Width::Byte).with_pc(pc)?;
            cpu.set_reg(rd, Width::Byte.sext(v));
        }
        Instr::LBU { rd, rs1, off } => {
            let v = bus.load(ea(cpu, rs1, off), Width::Byte).with_pc(pc)?;
            cpu.set_reg(rd, v);
        }
        Instr::LH { rd, rs1, off } => {
            let v = bus.load(ea(cpu, rs1, off), Width::Half).with_pc(pc)?;
            cpu.set_reg(rd, Width::Half.sext(v));
        }
        Instr::LHU { rd, rs1, off } => {
            let v = bus.load(ea(cpu, rs1, off), Width::Half).with_pc(pc)?;
            cpu.set_reg(rd, v);
        }
        Instr::LW { rd, rs1, off } => {
            let v = bus.load(ea(cpu, rs1, off), Width::Word).with_pc(pc)?;
            cpu.set_reg(rd, Width::Word.sext(v));
        }
        Instr::LWU { rd, rs1, off } => {
            let v = bus.load(ea(cpu, rs1, off), Width::Word).with_pc(pc)?;
            cpu.set_reg(rd, v);
        }
        Instr::LD { rd, rs1, off } => {
            let v = bus.load(ea(cpu, rs1, off), Width::Double).with_pc(pc)?;
            cpu.set_reg(rd, v);
        }
        Instr::SB { rs1, rs2, off } => {
            bus.store(ea(cpu, rs1, off), Width::Byte, cpu.reg(rs2)).with_pc(pc)?;
        }
        Instr::SH { rs1, rs2, off } => {
            bus.store(ea(cpu, rs1, off), Width::Half, cpu.reg(rs2)).with_pc(pc)?;
        }
        Instr::SW { rs1, rs2, off } => {
            bus.store(ea(cpu, rs1, off), Width::Word, cpu.reg(rs2)).with_pc(pc)?;
        }
        Instr::SD { rs1, rs2, off } => {
            bus.store(ea(cpu, rs1, off), Width::Double, cpu.reg(rs2)).with_pc(pc)?;
        }

        Instr::Beq { rs1, rs2, off } => {
            if cpu.reg(rs1) == cpu.reg(rs2) {
                next_pc = pc.wrapping_add(off as u64);
            }
        }
        Instr::Bne { rs1, rs2, off } => {
            if cpu.reg(rs1) != cpu.reg(rs2) {
                next_pc = pc.wrapping_add(off as u64);
            }
        }
        Instr::Blt { rs1, rs2, off } => {
            if (cpu.reg(rs1) as i64) < (cpu.reg(rs2) as i64) {
                next_pc = pc.wrapping_add(off as u64);
            }
        }
        Instr::Bge { rs1, rs2, off } => {
            if (cpu.reg(rs1) as i64) >= (cpu.reg(rs2) as i64) {
                next_pc = pc.wrapping_add(off as u64);
            }
        }
        Instr::Bltu { rs1, rs2, off } => {
            if cpu.reg(rs1) < cpu.reg(rs2) {
                next_pc = pc.wrapping_add(off as u64);
            }
        }
        Instr::Bgeu { rs1, rs2, off } => {
            if cpu.reg(rs1) >= cpu.reg(rs2) {
                next_pc = pc.wrapping_add(off as u64);
            }
        }
        Instr::Jal { rd, off } => {
            cpu.set_reg(rd, next_pc);
            next_pc = pc.wrapping_add(off as u64);
        }
        Instr::Jalr { rd, rs1, off } => {
            // target first: rd may alias rs1
            let target = ea(cpu, rs1, off);
            cpu.set_reg(rd, next_pc);
            next_pc = target;
        }
        Instr::Lui { rd, imm } => cpu.set_reg(rd, imm as u64),
        Instr::Auipc { rd, imm } => cpu.set_reg(rd, pc.wrapping_add(imm as u64)),
        // single hart, in-order: nothing to order
        Instr::Fence { .. } | Instr::FenceI { .. } => {}

        Instr::Addiw { rd, rs1, imm } => {
            cpu.set_reg(rd, W.narrow(cpu.reg(rs1).wrapping_add(imm as u64)));
        }
        Instr::Slliw { rd, rs1, shamt } => {
            cpu.set_reg(rd, W.narrow(shl(W, cpu.reg(rs1), shamt as u64)));
        }
        Instr::Srliw { rd, rs1, shamt } => {
            cpu.set_reg(rd, W.narrow(shr(W, cpu.reg(rs1), shamt as u64)));
        }
        Instr::Sraiw { rd, rs1, shamt } => {
            cpu.set_reg(rd, W.narrow(sar(W, cpu.reg(rs1), shamt as u64)));
        }
        Instr::Addw { rd, rs1, rs2 } => {
            cpu.set_reg(rd, W.narrow(cpu.reg(rs1).wrapping_add(cpu.reg(rs2))));
        }
        Instr::Subw { rd, rs1, rs2 } => {
            cpu.set_reg(rd, W.narrow(cpu.reg(rs1).wrapping_sub(cpu.reg(rs2))));
        }
        Instr::Sllw { rd, rs1, rs2 } => {
            cpu.set_reg(rd, W.narrow(shl(W, cpu.reg(rs1), cpu.reg(rs2))));
        }
        Instr::Srlw { rd, rs1, rs2 } => {
            cpu.set_reg(rd, W.narrow(shr(W, cpu.reg(rs1), cpu.reg(rs2))));
        }
        Instr::Sraw { rd, rs1, rs2 } => {
            cpu.set_reg(rd, W.narrow(sar(W, cpu.reg(rs1), cpu.reg(rs2))));
        }

        Instr::Mul { rd, rs1, rs2 } => cpu.set_reg(rd, cpu.reg(rs1).wrapping_mul(cpu.reg(rs2))),
        Instr::Mulh { rd, rs1, rs2 } => cpu.set_reg(rd, mulh(xlen, cpu.reg(rs1), cpu.reg(rs2))),
        Instr::Mulhsu { rd, rs1, rs2 } => {
            cpu.set_reg(rd, mulhsu(xlen, cpu.reg(rs1), cpu.reg(rs2)));
        }
        Instr::Mulhu { rd, rs1, rs2 } => cpu.set_reg(rd, mulhu(xlen, cpu.reg(rs1), cpu.reg(rs2))),
        Instr::Div { rd, rs1, rs2 } => cpu.set_reg(rd, div(xlen, cpu.reg(rs1), cpu.reg(rs2))),
        Instr::Divu { rd, rs1, rs2 } => cpu.set_reg(rd, divu(xlen, cpu.reg(rs1), cpu.reg(rs2))),
        Instr::Rem { rd, rs1, rs2 } => cpu.set_reg(rd, rem(xlen, cpu.reg(rs1), cpu.reg(rs2))),
        Instr::Remu { rd, rs1, rs2 } => cpu.set_reg(rd, remu(xlen, cpu.reg(rs1), cpu.reg(rs2))),
        Instr::Mulw { rd, rs1, rs2 } => {
            let (a, b) = w_operands(cpu, rs1, rs2);
            cpu.set_reg(rd, W.narrow(a.wrapping_mul(b)));
        }
        Instr::Divw { rd, rs1, rs2 } => {
            let (a, b) = w_operands(cpu, rs1, rs2);
            cpu.set_reg(rd, W.narrow(div(W, a, b)));
        }
        Instr::Divuw { rd, rs1, rs2 } => {
            let (a, b) = w_operands(cpu, rs1, rs2);
            cpu.set_reg(rd, W.narrow(divu(W, a, b)));
        }
        Instr::Remw { rd, rs1, rs2 } => {
            let (a, b) = w_operands(cpu, rs1, rs2);
            cpu.set_reg(rd, W.narrow(rem(W, a, b)));
        }
        Instr::Remuw { rd, rs1, rs2 } => {
            let (a, b) = w_operands(cpu, rs1, rs2);
            cpu.set_reg(rd, W.narrow(remu(W, a, b)));
        }

        Instr::Lr { rd, rs1, width, .. } => {
            let addr = xlen.zext(cpu.reg(rs1));
            let v = bus.load(addr, width).with_pc(pc)?;
            cpu.set_reg(rd, width.sext(v));
            cpu.reservation = Some(addr);
            tracing::debug!(pc, addr, "load reservation set");
        }
        Instr::Sc { rd, rs1, rs2, width, .. } => {
            let addr = xlen.zext(cpu.reg(rs1));
            let held = cpu.reservation == Some(addr);
            if held {
                bus.store(addr, width, cpu.reg(rs2)).with_pc(pc)?;
            }
            cpu.reservation = None;
            cpu.set_reg(rd, if held { 0 } else { 1 });
            tracing::debug!(pc, addr, success = held, "store conditional");
        }
        Instr::Amo { op, rd, rs1, rs2, width, .. } => {
            let addr = xlen.zext(cpu.reg(rs1));
            let src = cpu.reg(rs2);
            let old = width.sext(bus.load(addr, width).with_pc(pc)?);
            bus.store(addr, width, op.apply(width, old, src)).with_pc(pc)?;
            cpu.set_reg(rd, old);
        }
    }

    cpu.pc = xlen.zext(next_pc);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::cpu::decode::AmoOp;
    use crate::mem::Memory;
    use crate::mem::mmio::Mmio;
    use proptest::prelude::*;
    use rstest::rstest;

    fn setup(xlen: Xlen) -> (Cpu, Bus) {
        let cfg = Config::default();
        let bus = Bus::new(
            Memory::new(4096),
            Mmio::new(cfg.mtime_addr, cfg.tohost_addr, cfg.host_buf_capacity),
        );
        (Cpu::new(xlen, 0), bus)
    }

    fn run(cpu: &mut Cpu, bus: &mut Bus, instr: Instr) {
        execute(cpu, bus, instr, 4).unwrap();
    }

    fn rtype(xlen: Xlen, make: fn(u8, u8, u8) -> Instr, a: u64, b: u64) -> u64 {
        let (mut cpu, mut bus) = setup(xlen);
        cpu.set_reg(1, a);
        cpu.set_reg(2, b);
        run(&mut cpu, &mut bus, make(3, 1, 2));
        cpu.reg(3)
    }

    fn div_(rd: u8, rs1: u8, rs2: u8) -> Instr {
        Instr::Div { rd, rs1, rs2 }
    }
    fn rem_(rd: u8, rs1: u8, rs2: u8) -> Instr {
        Instr::Rem { rd, rs1, rs2 }
    }
    fn divu_(rd: u8, rs1: u8, rs2: u8) -> Instr {
        Instr::Divu { rd, rs1, rs2 }
    }
    fn remu_(rd: u8, rs1: u8, rs2: u8) -> Instr {
        Instr::Remu { rd, rs1, rs2 }
    }
    fn divw_(rd: u8, rs1: u8, rs2: u8) -> Instr {
        Instr::Divw { rd, rs1, rs2 }
    }
    fn remw_(rd: u8, rs1: u8, rs2: u8) -> Instr {
        Instr::Remw { rd, rs1, rs2 }
    }

    #[rstest]
    #[case(Xlen::Rv32, i32::MIN as i64 as u64)]
    #[case(Xlen::Rv64, i64::MIN as u64)]
    fn signed_division_overflow(#[case] xlen: Xlen, #[case] min: u64) {
        assert_eq!(rtype(xlen, div_, min, u64::MAX), min);
        assert_eq!(rtype(xlen, rem_, min, u64::MAX), 0);
    }

    #[test]
    fn word_division_overflow_on_rv64() {
        let min = i32::MIN as i64 as u64;
        assert_eq!(rtype(Xlen::Rv64, divw_, min, u64::MAX), min);
        assert_eq!(rtype(Xlen::Rv64, remw_, min, u64::MAX), 0);
        // upper bits of the operands are ignored
        assert_eq!(rtype(Xlen::Rv64, divw_, 0xdead_0000_0000_0006, 0x1_0000_0003), 2);
    }

    #[test]
    fn high_multiplies() {
        assert_eq!(
            rtype(Xlen::Rv32, |rd, rs1, rs2| Instr::Mulh { rd, rs1, rs2 }, u64::MAX, u64::MAX),
            0
        );
        assert_eq!(
            rtype(Xlen::Rv32, |rd, rs1, rs2| Instr::Mulhu { rd, rs1, rs2 }, u64::MAX, u64::MAX),
            // 0xffff_fffe, canonical
            0xffff_ffff_ffff_fffe
        );
        assert_eq!(
            rtype(Xlen::Rv32, |rd, rs1, rs2| Instr::Mulhsu { rd, rs1, rs2 }, u64::MAX, 2),
            u64::MAX
        );
        assert_eq!(
            rtype(Xlen::Rv64, |rd, rs1, rs2| Instr::Mulhu { rd, rs1, rs2 }, u64::MAX, u64::MAX),
            u64::MAX - 1
        );
        assert_eq!(
            rtype(Xlen::Rv64, |rd, rs1, rs2| Instr::Mulh { rd, rs1, rs2 }, 1 << 62, 4),
            1
        );
    }

    #[test]
    fn rv32_logical_shift_ignores_upper_half() {
        // -16 >> 2 logically, on a 32-bit machine
        let v = rtype(Xlen::Rv32, |rd, rs1, rs2| Instr::Srl { rd, rs1, rs2 }, (-16i64) as u64, 2);
        assert_eq!(v, 0x3fff_fffc);
        let v = rtype(Xlen::Rv32, |rd, rs1, rs2| Instr::Sra { rd, rs1, rs2 }, (-16i64) as u64, 2);
        assert_eq!(v as i64, -4);
        // shift amount is masked to 5 bits
        let v = rtype(Xlen::Rv32, |rd, rs1, rs2| Instr::Sll { rd, rs1, rs2 }, 1, 33);
        assert_eq!(v, 2);
    }

    #[test]
    fn rv32_arithmetic_wraps_at_32_bits() {
        let v = rtype(Xlen::Rv32, |rd, rs1, rs2| Instr::Add { rd, rs1, rs2 }, 0x7fff_ffff, 1);
        assert_eq!(v, 0xffff_ffff_8000_0000);
        let v = rtype(Xlen::Rv32, |rd, rs1, rs2| Instr::Sltu { rd, rs1, rs2 }, 1, (-1i64) as u64);
        assert_eq!(v, 1);
    }

    #[test]
    fn sltiu_compares_against_sign_extended_immediate() {
        let (mut cpu, mut bus) = setup(Xlen::Rv32);
        cpu.set_reg(1, 5);
        run(&mut cpu, &mut bus, Instr::Sltiu { rd: 2, rs1: 1, imm: -1 });
        assert_eq!(cpu.reg(2), 1);
    }

    #[test]
    fn lb_sign_extends_and_lbu_zero_extends() {
        let (mut cpu, mut bus) = setup(Xlen::Rv32);
        bus.ram.write(0x100, Width::Byte, 0xff).unwrap();
        cpu.set_reg(1, 0x100);
        run(&mut cpu, &mut bus, Instr::LB { rd: 2, rs1: 1, off: 0 });
        run(&mut cpu, &mut bus, Instr::LBU { rd: 3, rs1: 1, off: 0 });
        assert_eq!(cpu.reg(2), u64::MAX);
        assert_eq!(cpu.reg(3), 255);
    }

    #[test]
    fn store_then_load_with_negative_offset() {
        let (mut cpu, mut bus) = setup(Xlen::Rv64);
        cpu.set_reg(1, 0x208);
        cpu.set_reg(2, 0x1122_3344_5566_7788);
        run(&mut cpu, &mut bus, Instr::SD { rs1: 1, rs2: 2, off: -8 });
        run(&mut cpu, &mut bus, Instr::LD { rd: 3, rs1: 1, off: -8 });
        run(&mut cpu, &mut bus, Instr::LWU { rd: 4, rs1: 1, off: -4 });
        assert_eq!(cpu.reg(3), 0x1122_3344_5566_7788);
        assert_eq!(cpu.reg(4), 0x1122_3344);
    }

    #[test]
    fn out_of_bounds_load_is_fatal_and_leaves_rd() {
        let (mut cpu, mut bus) = setup(Xlen::Rv32);
        cpu.set_reg(1, 4095);
        cpu.set_reg(2, 77);
        let err = execute(&mut cpu, &mut bus, Instr::LW { rd: 2, rs1: 1, off: 0 }, 4).unwrap_err();
        assert!(matches!(err, Trap::OutOfBoundsAccess { pc: 0, .. }));
        assert_eq!(cpu.reg(2), 77);
        assert_eq!(cpu.pc, 0);
    }

    #[test]
    fn branches_and_jumps_are_relative_to_instruction() {
        let (mut cpu, mut bus) = setup(Xlen::Rv32);
        cpu.pc = 0x40;
        run(&mut cpu, &mut bus, Instr::Beq { rs1: 0, rs2: 0, off: -16 });
        assert_eq!(cpu.pc, 0x30);
        run(&mut cpu, &mut bus, Instr::Bne { rs1: 0, rs2: 0, off: -16 });
        assert_eq!(cpu.pc, 0x34);
        run(&mut cpu, &mut bus, Instr::Jal { rd: 1, off: 0x100 });
        assert_eq!((cpu.pc, cpu.reg(1)), (0x134, 0x38));
        run(&mut cpu, &mut bus, Instr::Auipc { rd: 5, imm: 0x1000 });
        assert_eq!(cpu.reg(5), 0x1134);
    }

    #[test]
    fn jalr_reads_base_before_linking() {
        let (mut cpu, mut bus) = setup(Xlen::Rv32);
        cpu.pc = 0x10;
        cpu.set_reg(1, 0x200);
        execute(&mut cpu, &mut bus, Instr::Jalr { rd: 1, rs1: 1, off: 4 }, 2).unwrap();
        assert_eq!(cpu.pc, 0x204);
        assert_eq!(cpu.reg(1), 0x12);
    }

    #[test]
    fn rv32_pc_wraps_at_32_bits() {
        let (mut cpu, mut bus) = setup(Xlen::Rv32);
        cpu.pc = 0xffff_fffc;
        run(&mut cpu, &mut bus, Instr::Addi { rd: 0, rs1: 0, imm: 0 });
        assert_eq!(cpu.pc, 0);
    }

    #[test]
    fn sc_without_reservation_fails() {
        let (mut cpu, mut bus) = setup(Xlen::Rv32);
        cpu.set_reg(1, 0x80);
        cpu.set_reg(2, 42);
        run(
            &mut cpu,
            &mut bus,
            Instr::Sc { rd: 3, rs1: 1, rs2: 2, width: Width::Word, aqrl: 0 },
        );
        assert_eq!(cpu.reg(3), 1);
        assert_eq!(bus.ram.read(0x80, Width::Word).unwrap(), 0);
    }

    #[test]
    fn lr_then_sc_succeeds_once() {
        let (mut cpu, mut bus) = setup(Xlen::Rv32);
        cpu.set_reg(1, 0x80);
        cpu.set_reg(2, 42);
        let sc = Instr::Sc { rd: 3, rs1: 1, rs2: 2, width: Width::Word, aqrl: 0 };
        run(&mut cpu, &mut bus, Instr::Lr { rd: 4, rs1: 1, width: Width::Word, aqrl: 0 });
        run(&mut cpu, &mut bus, sc);
        assert_eq!(cpu.reg(3), 0);
        assert_eq!(bus.ram.read(0x80, Width::Word).unwrap(), 42);
        assert_eq!(cpu.reservation, None);
        // reservation was consumed
        cpu.set_reg(2, 7);
        run(&mut cpu, &mut bus, sc);
        assert_eq!(cpu.reg(3), 1);
        assert_eq!(bus.ram.read(0x80, Width::Word).unwrap(), 42);
    }

    #[test]
    fn sc_to_other_address_fails_and_clears_reservation() {
        let (mut cpu, mut bus) = setup(Xlen::Rv32);
        cpu.set_reg(1, 0x80);
        cpu.set_reg(5, 0x84);
        run(&mut cpu, &mut bus, Instr::Lr { rd: 4, rs1: 1, width: Width::Word, aqrl: 0 });
        run(
            &mut cpu,
            &mut bus,
            Instr::Sc { rd: 3, rs1: 5, rs2: 2, width: Width::Word, aqrl: 0 },
        );
        assert_eq!(cpu.reg(3), 1);
        assert_eq!(cpu.reservation, None);
    }

    #[rstest]
    #[case(AmoOp::Swap, 9)]
    #[case(AmoOp::Add, 0xffff_fffd)]
    #[case(AmoOp::And, 0xffff_fff4 & 9)]
    #[case(AmoOp::Or, 0xffff_fffd)]
    #[case(AmoOp::Xor, 0xffff_fff4 ^ 9)]
    #[case(AmoOp::Min, 0xffff_fff4)]
    #[case(AmoOp::Max, 9)]
    #[case(AmoOp::Minu, 9)]
    #[case(AmoOp::Maxu, 0xffff_fff4)]
    fn amo_word_returns_old_and_stores_result(#[case] op: AmoOp, #[case] stored: u64) {
        let (mut cpu, mut bus) = setup(Xlen::Rv64);
        bus.ram.write(0x40, Width::Word, 0xffff_fff4).unwrap();
        cpu.set_reg(1, 0x40);
        cpu.set_reg(2, 9);
        run(
            &mut cpu,
            &mut bus,
            Instr::Amo { op, rd: 3, rs1: 1, rs2: 2, width: Width::Word, aqrl: 0 },
        );
        assert_eq!(cpu.reg(3) as i64, -12);
        assert_eq!(bus.ram.read(0x40, Width::Word).unwrap(), stored);
    }

    #[test]
    fn amo_with_rd_equal_rs2_uses_pre_write_source() {
        let (mut cpu, mut bus) = setup(Xlen::Rv32);
        bus.ram.write(0x40, Width::Word, 5).unwrap();
        cpu.set_reg(1, 0x40);
        cpu.set_reg(2, 3);
        run(
            &mut cpu,
            &mut bus,
            Instr::Amo { op: AmoOp::Add, rd: 2, rs1: 1, rs2: 2, width: Width::Word, aqrl: 0 },
        );
        assert_eq!(cpu.reg(2), 5);
        assert_eq!(bus.ram.read(0x40, Width::Word).unwrap(), 8);
    }

    #[test]
    fn fence_only_advances() {
        let (mut cpu, mut bus) = setup(Xlen::Rv32);
        run(&mut cpu, &mut bus, Instr::Fence { rd: 0, rs1: 0, imm: 0xff });
        assert_eq!(cpu.pc, 4);
        assert!(cpu.regs.iter().all(|&r| r == 0));
    }

    fn blt(rs1: u8, rs2: u8, off: i64) -> Instr {
        Instr::Blt { rs1, rs2, off }
    }
    fn bge(rs1: u8, rs2: u8, off: i64) -> Instr {
        Instr::Bge { rs1, rs2, off }
    }
    fn bltu(rs1: u8, rs2: u8, off: i64) -> Instr {
        Instr::Bltu { rs1, rs2, off }
    }
    fn bgeu(rs1: u8, rs2: u8, off: i64) -> Instr {
        Instr::Bgeu { rs1, rs2, off }
    }

    const NEG_ONE: u64 = u64::MAX;
    const BIT31: u64 = 0x8000_0000;

    #[rstest]
    #[case(Xlen::Rv32, blt, NEG_ONE, 1, true)]
    #[case(Xlen::Rv32, bltu, NEG_ONE, 1, false)]
    #[case(Xlen::Rv32, bge, NEG_ONE, 1, false)]
    #[case(Xlen::Rv32, bgeu, NEG_ONE, 1, true)]
    #[case(Xlen::Rv32, bge, 7, 7, true)]
    #[case(Xlen::Rv32, bltu, 7, 7, false)]
    // bit 31 is the sign bit on rv32 only
    #[case(Xlen::Rv32, blt, BIT31, 0, true)]
    #[case(Xlen::Rv32, bltu, BIT31, 0, false)]
    #[case(Xlen::Rv64, blt, BIT31, 0, false)]
    #[case(Xlen::Rv64, bltu, BIT31, 0, false)]
    #[case(Xlen::Rv64, blt, NEG_ONE, 1, true)]
    #[case(Xlen::Rv64, bltu, NEG_ONE, 1, false)]
    #[case(Xlen::Rv64, bge, NEG_ONE, 1, false)]
    #[case(Xlen::Rv64, bgeu, NEG_ONE, 1, true)]
    fn ordered_branches(
        #[case] xlen: Xlen,
        #[case] make: fn(u8, u8, i64) -> Instr,
        #[case] a: u64,
        #[case] b: u64,
        #[case] taken: bool,
    ) {
        let (mut cpu, mut bus) = setup(xlen);
        cpu.set_reg(1, a);
        cpu.set_reg(2, b);
        run(&mut cpu, &mut bus, make(1, 2, 0x40));
        assert_eq!(cpu.pc, if taken { 0x40 } else { 4 });
    }

    fn slt_(rd: u8, rs1: u8, rs2: u8) -> Instr {
        Instr::Slt { rd, rs1, rs2 }
    }
    fn sltu_(rd: u8, rs1: u8, rs2: u8) -> Instr {
        Instr::Sltu { rd, rs1, rs2 }
    }

    #[rstest]
    #[case(Xlen::Rv32, slt_, NEG_ONE, 1, 1)]
    #[case(Xlen::Rv32, sltu_, NEG_ONE, 1, 0)]
    #[case(Xlen::Rv32, slt_, BIT31, 0x7fff_ffff, 1)]
    #[case(Xlen::Rv32, sltu_, BIT31, 0x7fff_ffff, 0)]
    #[case(Xlen::Rv64, slt_, NEG_ONE, 1, 1)]
    #[case(Xlen::Rv64, sltu_, NEG_ONE, 1, 0)]
    #[case(Xlen::Rv64, slt_, BIT31, 0x7fff_ffff, 0)]
    fn set_less_than(
        #[case] xlen: Xlen,
        #[case] make: fn(u8, u8, u8) -> Instr,
        #[case] a: u64,
        #[case] b: u64,
        #[case] expected: u64,
    ) {
        assert_eq!(rtype(xlen, make, a, b), expected);
    }

    #[rstest]
    #[case(Xlen::Rv32, NEG_ONE, 0, 1)]
    #[case(Xlen::Rv32, 0, -1, 0)]
    #[case(Xlen::Rv32, BIT31, 0, 1)]
    #[case(Xlen::Rv64, NEG_ONE, 0, 1)]
    #[case(Xlen::Rv64, BIT31, 0, 0)]
    fn slti_is_signed(#[case] xlen: Xlen, #[case] a: u64, #[case] imm: i64, #[case] expected: u64) {
        let (mut cpu, mut bus) = setup(xlen);
        cpu.set_reg(1, a);
        run(&mut cpu, &mut bus, Instr::Slti { rd: 2, rs1: 1, imm });
        assert_eq!(cpu.reg(2), expected);
    }

    fn sllw_(rd: u8, rs1: u8, rs2: u8) -> Instr {
        Instr::Sllw { rd, rs1, rs2 }
    }
    fn srlw_(rd: u8, rs1: u8, rs2: u8) -> Instr {
        Instr::Srlw { rd, rs1, rs2 }
    }
    fn sraw_(rd: u8, rs1: u8, rs2: u8) -> Instr {
        Instr::Sraw { rd, rs1, rs2 }
    }
    fn addw_(rd: u8, rs1: u8, rs2: u8) -> Instr {
        Instr::Addw { rd, rs1, rs2 }
    }
    fn subw_(rd: u8, rs1: u8, rs2: u8) -> Instr {
        Instr::Subw { rd, rs1, rs2 }
    }
    fn mulw_(rd: u8, rs1: u8, rs2: u8) -> Instr {
        Instr::Mulw { rd, rs1, rs2 }
    }

    #[rstest]
    #[case(sllw_, 1, 31, 0xffff_ffff_8000_0000)]
    #[case(sllw_, 1, 33, 2)]
    #[case(srlw_, BIT31, 0, 0xffff_ffff_8000_0000)]
    #[case(srlw_, 0xffff_ffff_8000_0000, 4, 0x0800_0000)]
    #[case(srlw_, BIT31, 32, 0xffff_ffff_8000_0000)]
    #[case(sraw_, BIT31, 33, 0xffff_ffff_c000_0000)]
    #[case(sraw_, 0x1_7fff_ffff, 4, 0x07ff_ffff)]
    #[case(addw_, 0x7fff_ffff, 1, 0xffff_ffff_8000_0000)]
    #[case(addw_, 0x1_0000_0005, 0x2_0000_0003, 8)]
    #[case(subw_, 0, 1, NEG_ONE)]
    #[case(subw_, BIT31, 1, 0x7fff_ffff)]
    #[case(mulw_, 0x4000_0000, 2, 0xffff_ffff_8000_0000)]
    #[case(mulw_, 0x1_0001, 0x1_0000, 0x1_0000)]
    fn word_register_ops_sign_extend_low_half(
        #[case] make: fn(u8, u8, u8) -> Instr,
        #[case] a: u64,
        #[case] b: u64,
        #[case] expected: u64,
    ) {
        assert_eq!(rtype(Xlen::Rv64, make, a, b), expected);
    }

    fn slliw_(rd: u8, rs1: u8, shamt: u8) -> Instr {
        Instr::Slliw { rd, rs1, shamt }
    }
    fn srliw_(rd: u8, rs1: u8, shamt: u8) -> Instr {
        Instr::Srliw { rd, rs1, shamt }
    }
    fn sraiw_(rd: u8, rs1: u8, shamt: u8) -> Instr {
        Instr::Sraiw { rd, rs1, shamt }
    }

    #[rstest]
    #[case(slliw_, 1, 31, 0xffff_ffff_8000_0000)]
    #[case(slliw_, 0xffff_0000_0000_0001, 1, 2)]
    #[case(srliw_, BIT31, 0, 0xffff_ffff_8000_0000)]
    #[case(srliw_, 0xffff_ffff_8000_0000, 31, 1)]
    #[case(sraiw_, BIT31, 4, 0xffff_ffff_f800_0000)]
    #[case(sraiw_, 0xdead_0000_4000_0000, 30, 1)]
    fn word_immediate_shifts_sign_extend_low_half(
        #[case] make: fn(u8, u8, u8) -> Instr,
        #[case] a: u64,
        #[case] shamt: u8,
        #[case] expected: u64,
    ) {
        let (mut cpu, mut bus) = setup(Xlen::Rv64);
        cpu.set_reg(1, a);
        run(&mut cpu, &mut bus, make(2, 1, shamt));
        assert_eq!(cpu.reg(2), expected);
    }

    #[test]
    fn addiw_wraps_at_32_bits() {
        let (mut cpu, mut bus) = setup(Xlen::Rv64);
        cpu.set_reg(1, 0x7fff_ffff);
        run(&mut cpu, &mut bus, Instr::Addiw { rd: 2, rs1: 1, imm: 1 });
        assert_eq!(cpu.reg(2), 0xffff_ffff_8000_0000);
        run(&mut cpu, &mut bus, Instr::Addiw { rd: 3, rs1: 0, imm: -1 });
        assert_eq!(cpu.reg(3), NEG_ONE);
    }

    fn xlen_strategy() -> impl Strategy<Value = Xlen> {
        prop_oneof![Just(Xlen::Rv32), Just(Xlen::Rv64)]
    }

    proptest! {
        #[test]
        fn division_by_zero(xlen in xlen_strategy(), x in any::<u64>()) {
            let x = xlen.narrow(x);
            prop_assert_eq!(rtype(xlen, div_, x, 0), xlen.narrow(u64::MAX));
            prop_assert_eq!(rtype(xlen, divu_, x, 0), xlen.narrow(u64::MAX));
            prop_assert_eq!(rtype(xlen, rem_, x, 0), x);
            prop_assert_eq!(rtype(xlen, remu_, x, 0), x);
        }

        #[test]
        fn x0_is_never_written(xlen in xlen_strategy(), a in any::<u64>(), b in any::<u64>()) {
            let (mut cpu, mut bus) = setup(xlen);
            cpu.set_reg(1, a);
            cpu.set_reg(2, b);
            for instr in [
                Instr::Add { rd: 0, rs1: 1, rs2: 2 },
                Instr::Addi { rd: 0, rs1: 1, imm: 1 },
                Instr::Lui { rd: 0, imm: 0x1000 },
                Instr::Auipc { rd: 0, imm: 0x1000 },
                Instr::Jal { rd: 0, off: 8 },
                Instr::Mul { rd: 0, rs1: 1, rs2: 2 },
                Instr::Divu { rd: 0, rs1: 1, rs2: 2 },
                Instr::LBU { rd: 0, rs1: 0, off: 0x10 },
            ] {
                run(&mut cpu, &mut bus, instr);
                prop_assert_eq!(cpu.reg(0), 0);
            }
        }

        #[test]
        fn rv32_results_stay_canonical(a in any::<u64>(), b in any::<u64>()) {
            let (a, b) = (Xlen::Rv32.narrow(a), Xlen::Rv32.narrow(b));
            let makers: [fn(u8, u8, u8) -> Instr; 6] = [
                |rd, rs1, rs2| Instr::Add { rd, rs1, rs2 },
                |rd, rs1, rs2| Instr::Srl { rd, rs1, rs2 },
                |rd, rs1, rs2| Instr::Mulhu { rd, rs1, rs2 },
                |rd, rs1, rs2| Instr::Divu { rd, rs1, rs2 },
                |rd, rs1, rs2| Instr::Remu { rd, rs1, rs2 },
                |rd, rs1, rs2| Instr::Sub { rd, rs1, rs2 },
            ];
            for make in makers {
                let v = rtype(Xlen::Rv32, make, a, b);
                prop_assert_eq!(v, Xlen::Rv32.narrow(v));
            }
        }
    }
}
