//! Register-mapped command interface. IO writes are collected in command
//! registers and decoded into `VproCommand`s and `DmaCommand`s when a trigger
//! register is written.

use std::sync::Arc;

use anyhow::bail;
use log::{debug, error};

use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::command::{AddrField, DmaCommand, DmaKind, UnitList, VproCommand, PAD_BOTTOM, PAD_LEFT, PAD_RIGHT, PAD_TOP};
use crate::isa::SrcSel;
use crate::sim::config::VproConfig;

/// IO address map.
pub mod addr {
    pub const VPRO_SRC1: u32 = 0xffff_fe00;
    pub const VPRO_SRC2: u32 = 0xffff_fe04;
    pub const VPRO_DST_TRIGGER_2D: u32 = 0xffff_fe08;
    pub const VPRO_LOOP_START: u32 = 0xffff_fe10;
    pub const VPRO_SPECIAL_FIRST: u32 = 0xffff_fe20;
    pub const VPRO_SPECIAL_LAST: u32 = 0xffff_fe2c;
    pub const VPRO_DST_3D: u32 = 0xffff_fe30;
    pub const VPRO_TRIGGER_3D: u32 = 0xffff_fe34;

    pub const DESC_BLOCK_SIZE: u32 = 0xffff_fe40;
    pub const DESC_BLOCK_TRIGGER: u32 = 0xffff_fe44;
    pub const DESC_SINGLE_TRIGGER: u32 = 0xffff_fe48;
    pub const DESC_FSM_BUSY: u32 = 0xffff_fe4c;

    pub const CLUSTER_MASK: u32 = 0xfffe_0000;
    pub const UNIT_MASK: u32 = 0xfffe_0004;
    /// `| cluster << 8`
    pub const UNIT_BUSY: u32 = 0xfffe_0008;
    pub const SYNC_CLUSTER_MASK: u32 = 0xfffe_0010;
    pub const BUSY_MASKED_DMA: u32 = 0xfffe_0018;
    pub const BUSY_MASKED_VPRO: u32 = 0xfffe_001c;
    pub const DCMA_FLUSH: u32 = 0xfffe_0020;
    pub const DCMA_RESET: u32 = 0xfffe_0024;
    pub const SYNC_LANES: u32 = 0xfffe_0028;
    pub const SYNC_DMA: u32 = 0xfffe_002c;
    pub const SYNC: u32 = 0xfffe_0030;
    pub const MUL_SHIFT: u32 = 0xfffe_0040;
    pub const MAC_SHIFT: u32 = 0xfffe_0044;
    pub const MAC_INIT_SOURCE: u32 = 0xfffe_0048;
    pub const MAC_RESET_MODE: u32 = 0xfffe_004c;

    pub const IDMA_UNIT_MASK: u32 = 0xfffe_00c0;
    pub const IDMA_CLUSTER_MASK: u32 = 0xfffe_00c4;
    pub const IDMA_EXT_E2L: u32 = 0xfffe_00c8;
    pub const IDMA_EXT_L2E: u32 = 0xfffe_00cc;
    pub const IDMA_LOC: u32 = 0xfffe_00d0;
    pub const IDMA_X_SIZE: u32 = 0xfffe_00d4;
    pub const IDMA_Y_SIZE: u32 = 0xfffe_00d8;
    pub const IDMA_STRIDE: u32 = 0xfffe_00dc;
    pub const IDMA_PAD: u32 = 0xfffe_00e0;
    pub const IDMA_READ_HIT_CYCLES: u32 = 0xfffe_00e4;
    pub const IDMA_READ_MISS_CYCLES: u32 = 0xfffe_00e8;
    pub const IDMA_WRITE_HIT_CYCLES: u32 = 0xfffe_00ec;
    pub const IDMA_WRITE_MISS_CYCLES: u32 = 0xfffe_00f0;

    pub const AUX_LANE_ACT: u32 = 0xffff_ffd0;
    pub const AUX_DMA_ACT: u32 = 0xffff_ffd4;
    pub const AUX_BOTH_ACT: u32 = 0xffff_ffd8;
    pub const AUX_VPRO_TOTAL: u32 = 0xffff_ffdc;
    pub const AUX_RISC_TOTAL: u32 = 0xffff_ffe0;
    pub const AUX_RISC_ENABLED: u32 = 0xffff_ffe4;
    pub const DEBUG_FIFO: u32 = 0xffff_fff0;
    pub const DEV_NULL: u32 = 0xffff_fffc;
    pub const AUX_CYCLE_LOW: u32 = 0xffff_fff4;
    pub const AUX_CYCLE_HIGH: u32 = 0xffff_fff8;

    pub const GP_REGISTERS: u32 = 0xffff_fc00;
}

/// Number of 32-bit general-purpose registers.
pub const GP_REGISTER_COUNT: usize = 64;
/// Read-only configuration words inside the general-purpose range.
pub mod gp {
    pub const BUILD_TIME: usize = 2;
    pub const CLUSTERS: usize = 3;
    pub const UNITS: usize = 4;
    pub const LANES: usize = 5;
    pub const VPRO_FREQ: usize = 6;
    pub const RISC_FREQ: usize = 7;
    pub const DMA_FREQ: usize = 8;
    pub const AXI_FREQ: usize = 9;
    pub const MAGIC: usize = 14;
    pub const DCMA_OFF: usize = 16;
    pub const DCMA_NR_BRAMS: usize = 17;
    pub const DCMA_LINE_SIZE: usize = 18;
    pub const DCMA_ASSOC_LOG2: usize = 19;

    pub const MAGIC_VALUE: u32 = 0xcafe_cafe;
}

/// One operand of the VPRO command registers, as written by software.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RawOperand {
    pub sel: u32,
    pub offset: u32,
    pub alpha: u32,
    pub beta: u32,
    pub gamma: u32,
}

impl RawOperand {
    fn from_src_word(value: u32) -> Self {
        Self {
            sel: value >> 29,
            offset: (value >> 19) & 0x3ff,
            alpha: (value >> 13) & 0x3f,
            beta: (value >> 7) & 0x3f,
            gamma: 0,
        }
    }

    /// A 2D source that is not a register address carries a 22-bit
    /// immediate; spread it over the 3D fields.
    fn widen_immediate(&mut self) {
        self.gamma = self.beta;
        self.beta = self.alpha;
        self.alpha = self.offset & 0x3f;
        self.offset >>= 6;
        if self.offset & 0x8 != 0 {
            self.offset |= 0x30;
        }
    }

    fn field(&self) -> AddrField {
        AddrField::new(SrcSel::from_bits(self.sel), self.offset, self.alpha, self.beta, self.gamma)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VproCmdRegister {
    pub src1: RawOperand,
    pub src2: RawOperand,
    pub dst: RawOperand,
    pub src1_imm: u32,
    pub src2_imm: u32,
    pub dst_imm: u32,
    pub x_end: u32,
    pub y_end: u32,
    pub z_end: u32,
    pub is_chain: bool,
    pub blocking: bool,
    pub func: u32,
    pub id: u32,
    pub f_update: bool,
}

impl VproCmdRegister {
    fn write_dst_word(&mut self, value: u32) {
        self.dst.offset = (value >> 22) & 0x3ff;
        self.dst.alpha = (value >> 16) & 0x3f;
        self.dst.beta = (value >> 10) & 0x3f;
        self.func = (value >> 4) & 0x3f;
        self.id = (value >> 1) & 0x7;
        self.f_update = value & 1 == 1;
    }

    /// Apply a write to one of the VPRO command registers. Returns the command
    /// when the write was a trigger.
    pub fn write(&mut self, addr: u32, value: u32, ls_lane: usize) -> Option<VproCommand> {
        match addr {
            addr::VPRO_SRC1 => {
                self.src1_imm = value;
                self.src1 = RawOperand::from_src_word(value);
                self.x_end = (value >> 1) & 0x3f;
                self.is_chain = value & 1 == 1;
                None
            }
            addr::VPRO_SRC2 => {
                self.src2_imm = value;
                self.src2 = RawOperand::from_src_word(value);
                self.y_end = (value >> 1) & 0x3f;
                self.blocking = value & 1 == 1;
                None
            }
            addr::VPRO_DST_TRIGGER_2D => {
                self.write_dst_word(value);
                self.src1.gamma = 0;
                self.src2.gamma = 0;
                self.dst.gamma = 0;
                self.z_end = 0;
                self.dst.sel = SrcSel::Left as u32;
                // stores name their source lane in gamma
                if self.func & 0b111000 == 0b001000 {
                    self.dst.gamma = self.dst.beta;
                    self.dst.beta = 0;
                }
                if self.src1.sel != SrcSel::Addr as u32 {
                    self.src1.widen_immediate();
                }
                if self.src2.sel != SrcSel::Addr as u32 {
                    self.src2.widen_immediate();
                }
                Some(self.command(ls_lane))
            }
            addr::VPRO_DST_3D => {
                self.dst_imm = value;
                self.write_dst_word(value);
                None
            }
            addr::VPRO_TRIGGER_3D => {
                self.dst.gamma = (value >> 26) & 0x3f;
                self.src1.gamma = (value >> 20) & 0x3f;
                self.src2.gamma = (value >> 14) & 0x3f;
                self.dst.sel = (value >> 10) & 0x7;
                self.z_end = value & 0x3ff;
                Some(self.command(ls_lane))
            }
            _ => None,
        }
    }

    /// Register writes of the 3D path that decode back into `cmd`. Fields
    /// wider than their register slots are truncated.
    pub fn encode(cmd: &VproCommand) -> [(u32, u32); 4] {
        let src_word = |field: &AddrField, end: u32, bit: bool| {
            (field.sel as u32) << 29
                | (field.offset & 0x3ff) << 19
                | (field.alpha & 0x3f) << 13
                | (field.beta & 0x3f) << 7
                | (end & 0x3f) << 1
                | bit as u32
        };
        let func = (cmd.fu_sel & 0b11) << 4 | (cmd.func & 0b1111);
        let dst = (cmd.dst.offset & 0x3ff) << 22
            | (cmd.dst.alpha & 0x3f) << 16
            | (cmd.dst.beta & 0x3f) << 10
            | func << 4
            | (cmd.id_mask & 0x7) << 1
            | cmd.flag_update as u32;
        let trigger = (cmd.dst.gamma & 0x3f) << 26
            | (cmd.src1.gamma & 0x3f) << 20
            | (cmd.src2.gamma & 0x3f) << 14
            | (cmd.dst.sel as u32) << 10
            | (cmd.z_end & 0x3ff);
        [
            (addr::VPRO_SRC1, src_word(&cmd.src1, cmd.x_end, cmd.is_chain)),
            (addr::VPRO_SRC2, src_word(&cmd.src2, cmd.y_end, cmd.blocking)),
            (addr::VPRO_DST_3D, dst),
            (addr::VPRO_TRIGGER_3D, trigger),
        ]
    }

    pub fn command(&self, ls_lane: usize) -> VproCommand {
        let mut cmd = VproCommand {
            is_chain: self.is_chain,
            blocking: self.blocking,
            fu_sel: (self.func >> 4) & 0b11,
            func: self.func & 0b1111,
            flag_update: self.f_update,
            x_end: self.x_end,
            y_end: self.y_end,
            z_end: self.z_end,
            id_mask: self.id,
            src1: self.src1.field(),
            src2: self.src2.field(),
            dst: self.dst.field(),
            ..VproCommand::default()
        };
        cmd.update_type(ls_lane);
        cmd
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmaCmdRegister {
    pub unit_mask: u32,
    pub cluster_mask: u32,
    pub loc: u32,
    pub x_size: u32,
    pub y_size: u32,
    pub stride: i32,
    pub pad: [bool; 4],
    /// upper half of the next extern address
    pub ext_high: u32,
}

impl Default for DmaCmdRegister {
    fn default() -> Self {
        Self {
            unit_mask: 0,
            cluster_mask: 0,
            loc: 0,
            x_size: 0,
            y_size: 1,
            stride: 1,
            pad: [false; 4],
            ext_high: 0,
        }
    }
}

impl DmaCmdRegister {
    /// Apply a write to one of the DMA command registers. Returns the command
    /// when the write was an extern-address trigger.
    pub fn write(&mut self, addr: u32, value: u32, units: usize) -> Result<Option<DmaCommand>, anyhow::Error> {
        match addr {
            addr::IDMA_UNIT_MASK => self.unit_mask = value,
            addr::IDMA_CLUSTER_MASK => {
                self.stride = 1;
                self.y_size = 1;
                self.pad = [false; 4];
                self.cluster_mask = value;
            }
            addr::IDMA_LOC => self.loc = value,
            addr::IDMA_X_SIZE => self.x_size = value,
            addr::IDMA_Y_SIZE => self.y_size = value,
            addr::IDMA_STRIDE => self.stride = value as i32,
            addr::IDMA_PAD => {
                self.pad[PAD_TOP] = value & (1 << PAD_TOP) != 0;
                self.pad[PAD_RIGHT] = value & (1 << PAD_RIGHT) != 0;
                self.pad[PAD_BOTTOM] = value & (1 << PAD_BOTTOM) != 0;
                self.pad[PAD_LEFT] = value & (1 << PAD_LEFT) != 0;
            }
            a if a == addr::IDMA_EXT_E2L + 1 || a == addr::IDMA_EXT_L2E + 1 => self.ext_high = value,
            addr::IDMA_EXT_E2L | addr::IDMA_EXT_L2E => {
                let cmd = self.command(addr == addr::IDMA_EXT_E2L, value, units)?;
                self.ext_high = 0;
                return Ok(Some(cmd));
            }
            _ => {}
        }
        Ok(None)
    }

    fn command(&self, ext_to_loc: bool, ext_low: u32, units: usize) -> Result<DmaCommand, anyhow::Error> {
        if self.unit_mask == 0 {
            bail!("dma command without target units (unit mask 0)");
        }
        let unit_list: UnitList = (0..units.min(32) as u32)
            .filter(|u| (self.unit_mask >> u) & 1 == 1)
            .collect();
        let kind = match (ext_to_loc, self.y_size == 1) {
            (true, true) => DmaKind::Ext1dToLoc1d,
            (true, false) => DmaKind::Ext2dToLoc1d,
            (false, true) => DmaKind::Loc1dToExt1d,
            (false, false) => DmaKind::Loc1dToExt2d,
        };
        Ok(DmaCommand {
            kind,
            cluster_mask: self.cluster_mask,
            units: unit_list,
            ext_base: ((self.ext_high as u64) << 32) + ext_low as u64,
            loc_base: self.loc,
            x_size: self.x_size,
            y_size: self.y_size,
            y_leap: self.stride,
            pad: self.pad,
            done: false,
            id: 0,
        })
    }
}

#[derive(Debug)]
pub struct CommandProcessorState {
    pub vpro: VproCmdRegister,
    pub dma: DmaCmdRegister,
    pub gp: [u32; GP_REGISTER_COUNT],
    /// cluster whose DMA hit/miss counters the IDMA counter registers show
    pub dma_counter_cluster: usize,
}

impl Default for CommandProcessorState {
    fn default() -> Self {
        Self {
            vpro: VproCmdRegister::default(),
            dma: DmaCmdRegister::default(),
            gp: [0; GP_REGISTER_COUNT],
            dma_counter_cluster: 0,
        }
    }
}

/// Holds the software-visible command registers and turns register writes
/// into commands.
pub struct CommandProcessor {
    base: ModuleBase<CommandProcessorState, VproConfig>,
}

module!(CommandProcessor, CommandProcessorState, VproConfig,);

impl ModuleBehaviors for CommandProcessor {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        *self.state_mut() = CommandProcessorState::default();
    }
}

impl CommandProcessor {
    pub fn new(config: Arc<VproConfig>) -> Self {
        let mut cproc = CommandProcessor {
            base: ModuleBase::default(),
        };
        cproc.init_conf(config);
        cproc
    }

    pub fn write_vpro(&mut self, addr: u32, value: u32) -> Option<VproCommand> {
        let ls_lane = self.conf().ls_lane();
        let cmd = self.state_mut().vpro.write(addr, value, ls_lane);
        if let Some(cmd) = &cmd {
            debug!("io decoded {} ({:?})", cmd.kind.mnemonic(), cmd);
        }
        cmd
    }

    pub fn write_dma(&mut self, addr: u32, value: u32) -> Result<Option<DmaCommand>, anyhow::Error> {
        let units = self.conf().units;
        self.state_mut().dma.write(addr, value, units)
    }

    pub fn write_gp(&mut self, addr: u32, value: u32) {
        let index = ((addr & 0xff) / 4) as usize;
        self.state_mut().gp[index] = value;
    }

    pub fn read_gp(&self, addr: u32) -> u32 {
        self.state().gp[((addr & 0xff) / 4) as usize]
    }

    pub fn dma_counter_cluster(&self) -> usize {
        self.state().dma_counter_cluster
    }

    /// Move the IDMA counter window to the next cluster.
    pub fn advance_dma_counter_cluster(&mut self) {
        let clusters = self.conf().clusters;
        let state = self.state_mut();
        state.dma_counter_cluster = (state.dma_counter_cluster + 1) % clusters;
    }

    pub fn reset_dma_counter_cluster(&mut self) {
        self.state_mut().dma_counter_cluster = 0;
    }
}

pub fn is_vpro_register(addr: u32) -> bool {
    matches!(
        addr,
        addr::VPRO_SRC1
            | addr::VPRO_SRC2
            | addr::VPRO_DST_TRIGGER_2D
            | addr::VPRO_DST_3D
            | addr::VPRO_TRIGGER_3D
    )
}

pub fn is_unsupported_vpro_register(addr: u32) -> bool {
    addr == addr::VPRO_LOOP_START || (addr::VPRO_SPECIAL_FIRST..=addr::VPRO_SPECIAL_LAST).contains(&addr)
}

pub fn is_dma_register(addr: u32) -> bool {
    matches!(
        addr,
        addr::IDMA_UNIT_MASK
            | addr::IDMA_CLUSTER_MASK
            | addr::IDMA_LOC
            | addr::IDMA_X_SIZE
            | addr::IDMA_Y_SIZE
            | addr::IDMA_STRIDE
            | addr::IDMA_PAD
            | addr::IDMA_EXT_E2L
            | addr::IDMA_EXT_L2E
    ) || addr == addr::IDMA_EXT_E2L + 1
        || addr == addr::IDMA_EXT_L2E + 1
}

/// Shift registers only take 5-bit values.
pub fn check_shift(name: &str, value: u32) {
    if value & !0x1f != 0 {
        error!("{} shift takes a 5-bit value, got {}", name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::VproKind;

    #[test]
    fn widened_immediate_is_sign_extended() {
        let mut op = RawOperand {
            sel: SrcSel::Imm as u32,
            offset: 0x3ff,
            alpha: 0x3f,
            beta: 0x3f,
            gamma: 0,
        };
        op.widen_immediate();
        assert_eq!(op.offset, 0x3f);
        assert_eq!(op.field().imm() & 0xff_ffff, 0xff_ffff);
    }

    #[test]
    fn dma_trigger_without_units_fails() {
        let mut reg = DmaCmdRegister::default();
        reg.write(addr::IDMA_CLUSTER_MASK, 1, 4).unwrap();
        assert!(reg.write(addr::IDMA_EXT_E2L, 0x100, 4).is_err());
    }

    #[test]
    fn store_names_source_lane_in_gamma() {
        let mut reg = VproCmdRegister::default();
        reg.write(addr::VPRO_SRC1, 0, 2);
        reg.write(addr::VPRO_SRC2, (SrcSel::Imm as u32) << 29, 2);
        // func = MEM store, dst beta = lane 1
        let cmd = reg
            .write(addr::VPRO_DST_TRIGGER_2D, (1 << 10) | (0b001000 << 4), 2)
            .unwrap();
        assert_eq!(cmd.kind, VproKind::Store);
        assert_eq!(cmd.dst.gamma, 1);
        assert_eq!(cmd.dst.beta, 0);
        assert_eq!(cmd.id_mask, 1 << 2);
    }
}
