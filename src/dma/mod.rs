//! Per-cluster DMA engine moving 16-bit elements between main memory (through
//! the memory controller) and the local memories of the cluster's units.

pub mod block;
pub mod looper;
pub mod wire;

use std::collections::VecDeque;

use anyhow::{bail, Context};
use log::{debug, warn};

use crate::arch_state::ArchitectureState;
use crate::command::{DmaCommand, DmaKind, PAD_BOTTOM, PAD_LEFT, PAD_RIGHT, PAD_TOP};
use crate::dcma::Dcma;
use crate::sim::config::DcmaConfig;
use crate::sim::stats::DmaStats;
use crate::unit::VectorUnit;

/// DMA words moved per tick, one DCMA row.
pub const WORDS_PER_TICK: usize = DcmaConfig::DCMA_WORD_BYTES / DcmaConfig::DMA_WORD_BYTES;

/// Local memory addresses carried by a command are 20 bits wide.
const LOC_ADDR_MASK: u32 = 0x000f_ffff;

#[derive(Debug, Default, Clone, Copy)]
struct Iteration {
    x: u32,
    y: u32,
    loc: u32,
    ext: u64,
    /// words of the outstanding controller request
    remaining_req: u32,
    total_remaining: u64,
}

#[derive(Debug, Default)]
pub struct DmaEngine {
    cluster_id: usize,
    queue: VecDeque<DmaCommand>,
    current: DmaCommand,
    iter: Iteration,
    id_counter: u64,
}

impl DmaEngine {
    pub fn new(cluster_id: usize) -> Self {
        Self {
            cluster_id,
            ..Self::default()
        }
    }

    pub fn current(&self) -> &DmaCommand {
        &self.current
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn execute_cmd(&mut self, mut cmd: DmaCommand) -> Result<(), anyhow::Error> {
        cmd.id = self.id_counter;
        self.id_counter += 1;
        if cmd.x_size == 0 || cmd.y_size == 0 {
            bail!(
                "dma command {} of cluster {} transfers no elements ({}x{})",
                cmd.id,
                self.cluster_id,
                cmd.x_size,
                cmd.y_size
            );
        }
        debug!("dma {} queued {:?} ext {:#x} loc {:#x}", self.cluster_id, cmd.kind, cmd.ext_base, cmd.loc_base);
        self.queue.push_back(cmd);
        Ok(())
    }

    pub fn is_busy(&self, dcma: &Dcma) -> bool {
        !self.current.is_done() || !self.queue.is_empty() || dcma.is_busy_for(self.cluster_id)
    }

    fn is_padding_region(&self, arch: &ArchitectureState) -> bool {
        let cmd = &self.current;
        if cmd.kind != DmaKind::Ext2dToLoc1d {
            return false;
        }
        let (x, y) = (self.iter.x, self.iter.y);
        (cmd.pad[PAD_TOP] && y < arch.dma_pad_top)
            || (cmd.pad[PAD_BOTTOM] && y >= cmd.y_size.wrapping_sub(arch.dma_pad_bottom))
            || (cmd.pad[PAD_LEFT] && x < arch.dma_pad_left)
            || (cmd.pad[PAD_RIGHT] && x >= cmd.x_size.wrapping_sub(arch.dma_pad_right))
    }

    fn increment_iteration(&mut self, burst: u32, is_padding: bool) {
        self.iter.x += burst;
        if !is_padding {
            let stride = 2 * (burst as i64 + self.current.y_leap as i64 - 1);
            self.iter.ext = self.iter.ext.wrapping_add_signed(stride);
        }
        if self.iter.x > self.current.x_size - 1 && self.iter.y != self.current.y_size - 1 {
            self.iter.x = 0;
            self.iter.y += 1;
        }
    }

    fn write_to_lm(&self, units: &mut [VectorUnit], data: [u8; 2]) -> Result<(), anyhow::Error> {
        for &u in self.current.units.iter() {
            let unit = units
                .get_mut(u as usize)
                .with_context(|| format!("dma {} addresses missing unit {}", self.cluster_id, u))?;
            unit.write_lm(self.iter.loc, data)?;
        }
        Ok(())
    }

    fn read_from_lm(&self, units: &[VectorUnit]) -> Result<[u8; 2], anyhow::Error> {
        let Some(&u) = self.current.units.first() else {
            bail!("dma {} store without a source unit", self.cluster_id);
        };
        let unit = units
            .get(u as usize)
            .with_context(|| format!("dma {} addresses missing unit {}", self.cluster_id, u))?;
        unit.read_lm(self.iter.loc)
    }

    fn element_done(&mut self) {
        self.iter.loc += 1;
        self.iter.remaining_req -= 1;
        self.iter.total_remaining -= 1;
        if self.iter.remaining_req == 0 && self.iter.total_remaining == 0 {
            self.current.done = true;
            debug!("dma {} finished command {}", self.cluster_id, self.current.id);
        }
    }

    pub fn tick(
        &mut self,
        dcma: &mut Dcma,
        units: &mut [VectorUnit],
        arch: &ArchitectureState,
        stats: &mut DmaStats,
    ) -> Result<(), anyhow::Error> {
        stats.ticks += 1;
        let id = self.cluster_id;

        if self.current.is_done() && !dcma.is_busy_for(id) {
            if let Some(mut cmd) = self.queue.pop_front() {
                cmd.done = false;
                stats.command_started(&cmd);
                self.iter = Iteration {
                    x: 0,
                    y: 0,
                    loc: cmd.loc_base & LOC_ADDR_MASK,
                    ext: cmd.ext_base,
                    remaining_req: 0,
                    total_remaining: cmd.x_size as u64 * cmd.y_size as u64,
                };
                self.current = cmd;
            }
        }

        if self.iter.remaining_req > 0 {
            let is_read = self.current.is_read();
            let mut word = 0;
            while word < WORDS_PER_TICK && self.iter.remaining_req > 0 && !self.current.done {
                if is_read {
                    if dcma.is_read_data_available(id) {
                        let data = dcma.read_data(id)?;
                        self.write_to_lm(units, data)?;
                        stats.words_read += 1;
                        self.element_done();
                    }
                } else if dcma.is_write_data_ready(id) {
                    let data = self.read_from_lm(units)?;
                    dcma.write_data(id, data)?;
                    stats.words_written += 1;
                    self.element_done();
                }
                word += 1;
            }
        } else if !self.current.is_done() {
            if self.is_padding_region(arch) {
                let pad = (arch.dma_pad_value as u16).to_le_bytes();
                self.write_to_lm(units, pad)?;
                stats.padded_words += 1;
                self.increment_iteration(1, true);
                self.iter.loc += 1;
                self.iter.total_remaining -= 1;
                if self.iter.total_remaining == 0 {
                    self.current.done = true;
                }
            } else {
                let mut padding = 0;
                if self.current.kind == DmaKind::Ext2dToLoc1d {
                    if self.current.pad[PAD_LEFT] {
                        padding += arch.dma_pad_left;
                    }
                    if self.current.pad[PAD_RIGHT] {
                        padding += arch.dma_pad_right;
                    }
                }
                let burst = self.current.x_size.wrapping_sub(padding);
                if burst == 0 || burst > self.current.x_size {
                    bail!(
                        "dma {} padding ({}) leaves no row elements of {} to transfer",
                        id,
                        padding,
                        self.current.x_size
                    );
                }
                if self.current.is_read() {
                    dcma.request_dma_read_transfer(self.iter.ext, burst, id);
                } else {
                    dcma.request_dma_write_transfer(self.iter.ext, burst, id);
                }
                self.increment_iteration(burst, false);
                self.iter.remaining_req = burst;
            }
        }
        Ok(())
    }

    /// Register read through the cluster's IO window.
    pub fn io_read(&self, addr: u32, dcma: &Dcma) -> u32 {
        if ((addr & 0xff00) >> 8) as usize != self.cluster_id {
            return 0;
        }
        match addr & 0xff {
            0xbc => self.is_busy(dcma) as u32,
            _ => 0,
        }
    }

    /// Register write through the cluster's IO window; sets the padding
    /// parameters shared by all engines.
    pub fn io_write(&self, addr: u32, value: u32, arch: &mut ArchitectureState) {
        if ((addr & 0xf00) >> 8) as usize != self.cluster_id {
            return;
        }
        match addr & 0xff {
            0xa0 => arch.dma_pad_top = value,
            0xa4 => arch.dma_pad_bottom = value,
            0xa8 => arch.dma_pad_left = value,
            0xac => arch.dma_pad_right = value,
            0xb0 => arch.dma_pad_value = value,
            0xbc => log::error!("dma status register {:#010x} is read only", addr),
            _ => warn!("unknown dma register {:#010x}", addr),
        }
    }
}
