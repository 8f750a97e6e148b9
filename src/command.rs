use log::{error, warn};
use smallvec::SmallVec;

use crate::isa::*;

/// Operand descriptor of a vector command: selector, offset and the three
/// loop strides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddrField {
    pub sel: SrcSel,
    pub offset: u32,
    pub alpha: u32,
    pub beta: u32,
    pub gamma: u32,
    pub chain_left: bool,
    pub chain_right: bool,
    pub chain_ls: bool,
}

impl AddrField {
    pub const ALPHA_SHIFT: u32 = 12;
    pub const BETA_SHIFT: u32 = 6;
    pub const OFFSET_SHIFT: u32 = 18;

    pub fn new(sel: SrcSel, offset: u32, alpha: u32, beta: u32, gamma: u32) -> Self {
        let mut field = Self {
            sel,
            offset,
            alpha,
            beta,
            gamma,
            ..Self::default()
        };
        field.derive_chain_flags();
        field
    }

    /// Immediate view of the packed address fields.
    pub fn imm(&self) -> u32 {
        (self.alpha << Self::ALPHA_SHIFT)
            .wrapping_add(self.beta << Self::BETA_SHIFT)
            .wrapping_add(self.gamma)
            .wrapping_add(self.offset << Self::OFFSET_SHIFT)
    }

    /// Affine part of the address at loop position (x, y, z).
    pub fn affine(&self, x: u32, y: u32, z: u32) -> u32 {
        self.alpha
            .wrapping_mul(x)
            .wrapping_add(self.beta.wrapping_mul(y))
            .wrapping_add(self.gamma.wrapping_mul(z))
    }

    pub fn derive_chain_flags(&mut self) {
        self.chain_left = self.sel.chains_left();
        self.chain_right = self.sel.chains_right();
        self.chain_ls = self.sel.chains_ls();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VproCommand {
    pub kind: VproKind,
    /// lanes that still have to fetch this command
    pub id_mask: u32,
    pub blocking: bool,
    pub is_chain: bool,
    pub fu_sel: u32,
    pub func: u32,
    pub flag_update: bool,
    pub dst: AddrField,
    pub src1: AddrField,
    pub src2: AddrField,
    pub x_end: u32,
    pub x: u32,
    pub y_end: u32,
    pub y: u32,
    pub z_end: u32,
    pub z: u32,
    pub pipeline_alu_depth: usize,
    pub done: bool,
}

impl Default for VproCommand {
    fn default() -> Self {
        Self {
            kind: VproKind::None,
            id_mask: u32::MAX,
            blocking: false,
            is_chain: false,
            fu_sel: FU_SEL_OTHER,
            func: 0,
            flag_update: false,
            dst: AddrField::default(),
            src1: AddrField::default(),
            src2: AddrField::default(),
            x_end: 0,
            x: 0,
            y_end: 0,
            y: 0,
            z_end: 0,
            z: 0,
            pipeline_alu_depth: DEFAULT_ALU_DEPTH,
            done: false,
        }
    }
}

impl VproCommand {
    /// Idle command handed to a single lane.
    pub fn none_for_lane(lane: usize) -> Self {
        Self {
            id_mask: 1 << lane,
            ..Self::default()
        }
    }

    /// Already finished idle command, the empty fetch buffer of a lane.
    pub fn idle() -> Self {
        Self {
            done: true,
            ..Self::default()
        }
    }

    pub fn is_done(&self) -> bool {
        self.done || (self.x > self.x_end && self.y > self.y_end && self.z > self.z_end)
    }

    pub fn is_none(&self) -> bool {
        self.kind == VproKind::None
    }

    pub fn elements(&self) -> u64 {
        (self.x_end as u64 + 1) * (self.y_end as u64 + 1) * (self.z_end as u64 + 1)
    }

    /// Advance the (x, y, z) cursor by one element. Returns true when the
    /// last element has been issued.
    pub fn advance(&mut self) -> bool {
        self.x += 1;
        if self.x > self.x_end {
            self.x = 0;
            self.y += 1;
            if self.y > self.y_end {
                self.y = 0;
                self.z += 1;
                if self.z > self.z_end {
                    self.done = true;
                    return true;
                }
            }
        }
        false
    }

    /// Resolve `kind` from `fu_sel` and `func`. Memory commands are routed to
    /// the load/store lane and always chain unless they are plain stores.
    pub fn update_type(&mut self, ls_lane: usize) {
        if self.kind != VproKind::None {
            return;
        }
        if self.fu_sel == FuClass::Mem as u32 {
            self.id_mask = 1 << ls_lane;
            if !self.is_chain && self.func != 0b1000 {
                warn!("load/store commands must chain, forcing is_chain");
                self.is_chain = true;
            }
        }
        match VproKind::decode(self.fu_sel, self.func) {
            Some(kind) => self.kind = kind,
            None => error!(
                "invalid vector function (fu={}, func={}, src1_sel={:?}, src2_sel={:?})",
                self.fu_sel, self.func, self.src1.sel, self.src2.sel
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DmaKind {
    #[default]
    None,
    Ext1dToLoc1d,
    Ext2dToLoc1d,
    Loc1dToExt2d,
    Loc1dToExt1d,
}

impl DmaKind {
    pub fn is_ext_to_loc(self) -> bool {
        matches!(self, DmaKind::Ext1dToLoc1d | DmaKind::Ext2dToLoc1d)
    }

    pub fn is_2d(self) -> bool {
        matches!(self, DmaKind::Ext2dToLoc1d | DmaKind::Loc1dToExt2d)
    }
}

pub const PAD_TOP: usize = 0;
pub const PAD_RIGHT: usize = 1;
pub const PAD_BOTTOM: usize = 2;
pub const PAD_LEFT: usize = 3;

pub type UnitList = SmallVec<[u32; 8]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmaCommand {
    pub kind: DmaKind,
    pub cluster_mask: u32,
    pub units: UnitList,
    pub ext_base: u64,
    pub loc_base: u32,
    pub x_size: u32,
    pub y_size: u32,
    /// extern row stride in elements, 1 = rows are contiguous
    pub y_leap: i32,
    pub pad: [bool; 4],
    pub done: bool,
    pub id: u64,
}

impl Default for DmaCommand {
    fn default() -> Self {
        Self {
            kind: DmaKind::None,
            cluster_mask: 0,
            units: UnitList::new(),
            ext_base: 0,
            loc_base: 0,
            x_size: 0,
            y_size: 0,
            y_leap: 1,
            pad: [false; 4],
            done: true,
            id: 0,
        }
    }
}

impl DmaCommand {
    pub fn is_done(&self) -> bool {
        self.done || self.kind == DmaKind::None
    }

    pub fn is_read(&self) -> bool {
        self.kind.is_ext_to_loc()
    }

    /// Equality of everything a descriptor carries, ignoring run-time state.
    pub fn same_transfer(&self, other: &DmaCommand) -> bool {
        self.kind == other.kind
            && self.cluster_mask == other.cluster_mask
            && self.units == other.units
            && self.ext_base == other.ext_base
            && self.loc_base == other.loc_base
            && self.x_size == other.x_size
            && self.y_size == other.y_size
            && self.y_leap == other.y_leap
            && self.pad == other.pad
    }
}

/// Host-side commands that act on simulator state directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCommand {
    Memset { addr: u64, value: u8, len: usize },
    DumpLocalMemory { cluster: usize, unit: usize },
    DumpRegisterFile { cluster: usize, unit: usize, lane: usize },
    WaitStep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Vpro(VproCommand),
    Dma(DmaCommand),
    Sim(SimCommand),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_walks_x_then_y_then_z() {
        let mut cmd = VproCommand {
            x_end: 1,
            y_end: 1,
            z_end: 0,
            ..VproCommand::default()
        };
        let mut steps = 0;
        while !cmd.advance() {
            steps += 1;
        }
        assert_eq!(steps, 3);
        assert!(cmd.is_done());
    }

    #[test]
    fn memory_commands_go_to_ls_lane() {
        let mut cmd = VproCommand {
            fu_sel: FuClass::Mem as u32,
            func: 0,
            ..VproCommand::default()
        };
        cmd.update_type(2);
        assert_eq!(cmd.kind, VproKind::Load);
        assert_eq!(cmd.id_mask, 0b100);
        assert!(cmd.is_chain);
    }

    #[test]
    fn immediate_packs_fields() {
        let field = AddrField::new(SrcSel::Imm, 1, 2, 3, 4);
        assert_eq!(field.imm(), (1 << 18) | (2 << 12) | (3 << 6) | 4);
        assert_eq!(field.affine(1, 2, 3), 2 + 6 + 12);
        assert!(!field.chain_left);
        assert!(AddrField::new(SrcSel::IndirectRight, 0, 0, 0, 0).chain_right);
    }
}
