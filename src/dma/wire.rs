//! 32-byte DMA descriptors as software places them in memory (little endian).

use anyhow::{bail, ensure};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::command::{DmaCommand, DmaKind, UnitList, PAD_BOTTOM, PAD_LEFT, PAD_RIGHT, PAD_TOP};

pub const DESCRIPTOR_BYTES: usize = 32;

pub type RawDescriptor = [u8; DESCRIPTOR_BYTES];

#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    E2l1d = 0,
    E2l2d = 1,
    L2e1d = 2,
    L2e2d = 3,
    Loop = 4,
}

impl Direction {
    fn from_kind(kind: DmaKind) -> Option<Self> {
        match kind {
            DmaKind::Ext1dToLoc1d => Some(Direction::E2l1d),
            DmaKind::Ext2dToLoc1d => Some(Direction::E2l2d),
            DmaKind::Loc1dToExt1d => Some(Direction::L2e1d),
            DmaKind::Loc1dToExt2d => Some(Direction::L2e2d),
            DmaKind::None => None,
        }
    }

    fn kind(self) -> DmaKind {
        match self {
            Direction::E2l1d => DmaKind::Ext1dToLoc1d,
            Direction::E2l2d => DmaKind::Ext2dToLoc1d,
            Direction::L2e1d => DmaKind::Loc1dToExt1d,
            Direction::L2e2d => DmaKind::Loc1dToExt2d,
            Direction::Loop => DmaKind::None,
        }
    }
}

/// `COMMAND_DMA`: one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmaDescriptor {
    pub direction: Direction,
    pub is_bias_offset: bool,
    pub is_kernel_offset: bool,
    /// bit0 top, bit1 right, bit2 bottom, bit3 left
    pub padding: u8,
    pub cluster: u32,
    pub unit_mask: u32,
    pub mm_addr: u32,
    pub mm_addr_64: u32,
    pub lm_addr: u32,
    pub y_leap: u16,
    pub x_size: u16,
    pub y_size: u16,
}

/// `COMMAND_DMA_LOOP`: loop parameters applied to the descriptor that follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopDescriptor {
    pub cluster_loop_len: u8,
    pub cluster_loop_shift_incr: i8,
    pub unit_loop_len: u8,
    pub unit_loop_shift_incr: i8,
    pub inter_unit_loop_len: u8,
    /// 13 bit signed
    pub lm_incr: i16,
    pub mm_incr: i32,
    pub dma_cmd_count: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    Dma(DmaDescriptor),
    Loop(LoopDescriptor),
}

fn u16_at(raw: &RawDescriptor, at: usize) -> u16 {
    u16::from_le_bytes([raw[at], raw[at + 1]])
}

fn u32_at(raw: &RawDescriptor, at: usize) -> u32 {
    u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

fn put(raw: &mut RawDescriptor, at: usize, bytes: &[u8]) {
    raw[at..at + bytes.len()].copy_from_slice(bytes);
}

pub fn direction_of(raw: &RawDescriptor) -> Result<Direction, anyhow::Error> {
    match Direction::from_u8(raw[0]) {
        Some(direction) => Ok(direction),
        None => bail!("unknown dma descriptor direction {}", raw[0]),
    }
}

impl Descriptor {
    pub fn unpack(raw: &RawDescriptor) -> Result<Self, anyhow::Error> {
        Ok(match direction_of(raw)? {
            Direction::Loop => Descriptor::Loop(LoopDescriptor::unpack(raw)),
            _ => Descriptor::Dma(DmaDescriptor::unpack(raw)?),
        })
    }

    pub fn pack(&self) -> RawDescriptor {
        match self {
            Descriptor::Dma(dma) => dma.pack(),
            Descriptor::Loop(lp) => lp.pack(),
        }
    }
}

impl DmaDescriptor {
    pub fn unpack(raw: &RawDescriptor) -> Result<Self, anyhow::Error> {
        Ok(Self {
            direction: direction_of(raw)?,
            is_bias_offset: raw[1] != 0,
            is_kernel_offset: raw[2] != 0,
            padding: raw[3],
            cluster: u32_at(raw, 4),
            unit_mask: u32_at(raw, 8),
            mm_addr: u32_at(raw, 12),
            mm_addr_64: u32_at(raw, 16),
            lm_addr: u32_at(raw, 20),
            y_leap: u16_at(raw, 24),
            x_size: u16_at(raw, 26),
            y_size: u16_at(raw, 28),
        })
    }

    pub fn pack(&self) -> RawDescriptor {
        let mut raw = [0u8; DESCRIPTOR_BYTES];
        raw[0] = self.direction as u8;
        raw[1] = self.is_bias_offset as u8;
        raw[2] = self.is_kernel_offset as u8;
        raw[3] = self.padding;
        put(&mut raw, 4, &self.cluster.to_le_bytes());
        put(&mut raw, 8, &self.unit_mask.to_le_bytes());
        put(&mut raw, 12, &self.mm_addr.to_le_bytes());
        put(&mut raw, 16, &self.mm_addr_64.to_le_bytes());
        put(&mut raw, 20, &self.lm_addr.to_le_bytes());
        put(&mut raw, 24, &self.y_leap.to_le_bytes());
        put(&mut raw, 26, &self.x_size.to_le_bytes());
        put(&mut raw, 28, &self.y_size.to_le_bytes());
        raw
    }

    pub fn ext_addr(&self) -> u64 {
        ((self.mm_addr_64 as u64) << 32) + self.mm_addr as u64
    }

    /// Expand into an engine command for a machine with `units` units per
    /// cluster. A descriptor naming no unit is rejected.
    pub fn to_command(&self, units: usize) -> Result<DmaCommand, anyhow::Error> {
        ensure!(self.unit_mask != 0, "dma descriptor with an empty unit mask: {:?}", self);
        ensure!(self.direction != Direction::Loop, "loop descriptor used as a transfer");
        let units: UnitList = (0..units.min(32) as u32)
            .filter(|u| (self.unit_mask >> u) & 1 == 1)
            .collect();
        let mut pad = [false; 4];
        pad[PAD_TOP] = self.padding & 0b0001 != 0;
        pad[PAD_RIGHT] = self.padding & 0b0010 != 0;
        pad[PAD_BOTTOM] = self.padding & 0b0100 != 0;
        pad[PAD_LEFT] = self.padding & 0b1000 != 0;
        if self.y_size == 0 {
            log::error!("dma descriptor with y size 0 would never finish");
        }
        Ok(DmaCommand {
            kind: self.direction.kind(),
            cluster_mask: self.cluster,
            units,
            ext_base: self.ext_addr(),
            loc_base: self.lm_addr,
            x_size: self.x_size as u32,
            y_size: self.y_size as u32,
            y_leap: self.y_leap as i32,
            pad,
            ..DmaCommand::default()
        })
    }

    pub fn from_command(cmd: &DmaCommand) -> Result<Self, anyhow::Error> {
        let Some(direction) = Direction::from_kind(cmd.kind) else {
            bail!("dma command without a direction cannot be encoded");
        };
        let padding = cmd.pad[PAD_TOP] as u8
            | (cmd.pad[PAD_RIGHT] as u8) << 1
            | (cmd.pad[PAD_BOTTOM] as u8) << 2
            | (cmd.pad[PAD_LEFT] as u8) << 3;
        Ok(Self {
            direction,
            padding,
            cluster: cmd.cluster_mask,
            unit_mask: cmd.units.iter().fold(0, |mask, u| mask | 1 << u),
            mm_addr: cmd.ext_base as u32,
            mm_addr_64: (cmd.ext_base >> 32) as u32,
            lm_addr: cmd.loc_base,
            y_leap: cmd.y_leap as u16,
            x_size: cmd.x_size as u16,
            y_size: cmd.y_size as u16,
            ..Self::default()
        })
    }
}

impl LoopDescriptor {
    pub fn unpack(raw: &RawDescriptor) -> Self {
        Self {
            cluster_loop_len: raw[1],
            cluster_loop_shift_incr: raw[2] as i8,
            unit_loop_len: raw[3],
            unit_loop_shift_incr: raw[4] as i8,
            inter_unit_loop_len: raw[5],
            lm_incr: u16_at(raw, 8) as i16,
            mm_incr: u32_at(raw, 12) as i32,
            dma_cmd_count: u16_at(raw, 16),
        }
    }

    pub fn pack(&self) -> RawDescriptor {
        let mut raw = [0u8; DESCRIPTOR_BYTES];
        raw[0] = Direction::Loop as u8;
        raw[1] = self.cluster_loop_len;
        raw[2] = self.cluster_loop_shift_incr as u8;
        raw[3] = self.unit_loop_len;
        raw[4] = self.unit_loop_shift_incr as u8;
        raw[5] = self.inter_unit_loop_len;
        put(&mut raw, 8, &self.lm_incr.to_le_bytes());
        put(&mut raw, 12, &self.mm_incr.to_le_bytes());
        put(&mut raw, 16, &self.dma_cmd_count.to_le_bytes());
        raw
    }
}
