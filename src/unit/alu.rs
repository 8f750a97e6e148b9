//! Lane ALU. Operands and results are 32-bit patterns holding sign-extended
//! 24-bit words; the multiplier accumulates into a 48-bit window of `accu`.

use anyhow::bail;
use log::warn;

use crate::arch_state::ArchitectureState;
use crate::isa::{s24, u24, MacInitSource, MacResetMode, VproKind};
use crate::unit::pipeline::{AluState, Stage};

const MAC_WINDOW: u64 = 0xffff_ffff_ffff;

fn product(opa: u32, opb: u32) -> u64 {
    ((opa as i32 as i64) * (opb as i32 as i64)) as u64
}

fn high(value: u64, shift: u32) -> u32 {
    value.checked_shr(shift).unwrap_or(0) as u32
}

/// Accumulator reset and min/max seeding at the start of an element.
pub fn prepare(stage: &Stage, alu: &mut AluState, arch: &ArchitectureState) {
    let cmd = &stage.cmd;
    let reset = match arch.mac_reset_mode {
        MacResetMode::Never => false,
        MacResetMode::Once => cmd.x == 0 && cmd.y == 0 && cmd.z == 0,
        MacResetMode::ZIncrement => cmd.x == 0 && cmd.y == 0,
        MacResetMode::YIncrement => cmd.x == 0,
        MacResetMode::XIncrement => true,
    };
    if reset {
        match cmd.kind {
            VproKind::MacLPre | VproKind::MacHPre => alu.accu = 0,
            VproKind::MacL | VproKind::MacH if arch.mac_init_source != MacInitSource::None => {
                alu.accu = if cmd.kind == VproKind::MacH {
                    (stage.opc as u64)
                        .checked_shl(arch.accu_mac_high_bit_shift)
                        .unwrap_or(0)
                } else {
                    stage.opc as u64
                };
            }
            _ => {}
        }
    }
    if cmd.x == 0
        && cmd.y == 0
        && matches!(cmd.kind, VproKind::MinVector | VproKind::MaxVector)
    {
        alu.minmax_value = stage.opa;
        alu.minmax_index = 0;
    }
}

/// Compute `pre_data` of one element.
pub fn execute(
    stage: &mut Stage,
    alu: &mut AluState,
    arch: &ArchitectureState,
    strict: bool,
) -> Result<(), anyhow::Error> {
    use VproKind::*;

    let (opa, opb) = (stage.opa, stage.opb);
    stage.pre_data = 0;
    let res = match stage.cmd.kind {
        Add => opa.wrapping_add(opb),
        Sub => opb.wrapping_sub(opa),
        MulL | MulLNeg | MulLPos => {
            alu.accu = product(opa, opb);
            alu.accu as u32
        }
        MulH | MulHNeg | MulHPos => {
            alu.accu = product(opa, opb);
            high(alu.accu, arch.accu_mul_high_bit_shift)
        }
        DivL => {
            let quotient = opa as f32 / opb as f32 * 65536.0;
            u24((quotient as u32) & 0xffff)
        }
        DivH => u24((opa as f32 as u32 as f32 / opb as f32) as u32),
        MacL | MacLPre => {
            alu.accu = alu.accu.wrapping_add(product(opa, opb) & MAC_WINDOW);
            alu.accu as u32
        }
        MacH | MacHPre => {
            alu.accu = alu.accu.wrapping_add(product(opa, opb) & MAC_WINDOW);
            high(alu.accu, arch.accu_mac_high_bit_shift)
        }
        Xor => opa ^ opb,
        Xnor => !(opa ^ opb),
        And => opa & opb,
        Nand => !(opa & opb),
        Or => opa | opb,
        Nor => !(opa | opb),
        ShiftLL => {
            if strict {
                bail!("SHIFT_LL is not supported by the hardware");
            }
            warn!("SHIFT_LL is not supported by the hardware");
            u24(opa) << (opb & 0x1f)
        }
        ShiftLR => u24(opa) >> (opb & 0x1f),
        ShiftAR | ShiftARNeg | ShiftARPos => ((opa as i32) >> (opb & 0x1f)) as u32,
        Abs => {
            let abs = if opa & 0x8000_0000 != 0 {
                opa.wrapping_neg()
            } else {
                opa
            };
            u24(abs)
        }
        Min => {
            if (opa as i32) < (opb as i32) {
                opa
            } else {
                opb
            }
        }
        Max => {
            if (opa as i32) > (opb as i32) {
                opa
            } else {
                opb
            }
        }
        MinVector | MaxVector => {
            let cmd = &stage.cmd;
            let better = if cmd.kind == MinVector {
                (opa as i32) < (alu.minmax_value as i32)
            } else {
                (opa as i32) > (alu.minmax_value as i32)
            };
            if better {
                alu.minmax_value = opa;
                // the minimum tracks src2's walk, the maximum src1's
                let walk = if cmd.kind == MinVector { &cmd.src2 } else { &cmd.src1 };
                alu.minmax_index = walk.affine(cmd.x, cmd.y, cmd.z);
            }
            if cmd.src2.offset & 1 == 1 {
                alu.minmax_index
            } else {
                alu.minmax_value
            }
        }
        BitReversal => {
            if opb == 0 {
                stage.opb = 24;
            }
            let width = stage.opb.min(32);
            (0..width).fold(0u32, |acc, i| acc | ((opa >> i) & 1) << (width - 1 - i))
        }
        MvZe | MvNz | MvMi | MvPl => u24(opb),
        None | Nop | WaitBusy | PipelineWait => 0,
        Load | LoadB | LoadS | LoadBS | LoadSShiftLeft | LoadSShiftRight | LoadReverse | Store
        | StoreShiftLeft | StoreShiftRight | StoreReverse => {
            bail!(
                "memory command {} reached a processing lane ALU",
                stage.cmd.kind.mnemonic()
            )
        }
    };
    stage.res = res;
    stage.pre_data = s24(res) as u32;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::VproCommand;

    fn run(kind: VproKind, opa: i32, opb: i32, alu: &mut AluState, arch: &ArchitectureState) -> i32 {
        let mut stage = Stage {
            cmd: VproCommand {
                kind,
                ..VproCommand::default()
            },
            opa: opa as u32,
            opb: opb as u32,
            ..Stage::default()
        };
        execute(&mut stage, alu, arch, true).unwrap();
        stage.pre_data as i32
    }

    #[test]
    fn sub_is_reversed_and_results_wrap_to_24_bits() {
        let arch = ArchitectureState::default();
        let mut alu = AluState::default();
        assert_eq!(run(VproKind::Sub, 3, 10, &mut alu, &arch), 7);
        assert_eq!(run(VproKind::Add, 0x7f_ffff, 1, &mut alu, &arch), -0x80_0000);
        assert_eq!(run(VproKind::Nor, 0, 0, &mut alu, &arch), -1);
    }

    #[test]
    fn mac_accumulates_and_shifts_high_part() {
        let mut arch = ArchitectureState::default();
        arch.accu_mac_high_bit_shift = 4;
        let mut alu = AluState::default();
        assert_eq!(run(VproKind::MacL, 3, 4, &mut alu, &arch), 12);
        assert_eq!(run(VproKind::MacH, 2, 10, &mut alu, &arch), 32 >> 4);
        assert_eq!(alu.accu, 32);
        assert_eq!(run(VproKind::MacL, -1, 1, &mut alu, &arch), 31);
    }

    #[test]
    fn shift_ll_fails_in_strict_mode() {
        let arch = ArchitectureState::default();
        let mut alu = AluState::default();
        let mut stage = Stage {
            cmd: VproCommand {
                kind: VproKind::ShiftLL,
                ..VproCommand::default()
            },
            opa: 1,
            opb: 4,
            ..Stage::default()
        };
        assert!(execute(&mut stage, &mut alu, &arch, true).is_err());
        execute(&mut stage, &mut alu, &arch, false).unwrap();
        assert_eq!(stage.pre_data, 16);
    }

    #[test]
    fn bit_reversal_defaults_to_full_width() {
        let arch = ArchitectureState::default();
        let mut alu = AluState::default();
        assert_eq!(run(VproKind::BitReversal, 0b1, 4, &mut alu, &arch), 0b1000);
        assert_eq!(run(VproKind::BitReversal, 0b1, 0, &mut alu, &arch), -0x80_0000);
    }

    #[test]
    fn max_vector_reports_index_on_request() {
        let arch = ArchitectureState::default();
        let mut alu = AluState::default();
        let mut cmd = VproCommand {
            kind: VproKind::MaxVector,
            x_end: 3,
            ..VproCommand::default()
        };
        cmd.src1.alpha = 1;
        cmd.src2.offset = 1;
        let values = [5, 9, 2, 7];
        let mut last = 0;
        for (x, v) in values.iter().enumerate() {
            cmd.x = x as u32;
            let mut stage = Stage {
                cmd: cmd.clone(),
                opa: *v as u32,
                ..Stage::default()
            };
            prepare(&stage, &mut alu, &arch);
            execute(&mut stage, &mut alu, &arch, true).unwrap();
            last = stage.pre_data;
        }
        assert_eq!(last, 1);
        assert_eq!(alu.minmax_value, 9);
    }
}
