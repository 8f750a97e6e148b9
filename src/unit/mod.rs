//! Vector unit: processing lanes, the load/store lane, a local memory and the
//! command queue they fetch from.

pub mod alu;
pub mod fabric;
pub mod lane;
pub mod pipeline;
pub mod regfile;

use std::fmt::Write;
use std::sync::Arc;

use anyhow::Context;
use log::{error, warn};

use crate::arch_state::ArchitectureState;
use crate::base::behavior::*;
use crate::base::mem::HasMemory;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::builtin::queue::Queue;
use crate::command::VproCommand;
use crate::isa::{FuClass, FU_SEL_OTHER};
use crate::sim::config::VproConfig;
use crate::sim::flat_mem::FlatMemory;
use crate::sim::stats::VproStats;
use crate::unit::fabric::ChainFabric;
use crate::unit::lane::{Lane, LaneCtx};

/// Commands shorter than this finish before the pipeline has filled.
const MIN_VECTOR_LENGTH: u64 = 10;
const LM_WORD_BYTES: usize = 2;

#[derive(Debug, Default)]
pub struct VectorUnitState {
    /// a command has been popped from the queue this cycle
    fetched: bool,
}

pub struct VectorUnit {
    base: ModuleBase<VectorUnitState, VproConfig>,
    id: usize,
    cluster: usize,
    lanes: Vec<Lane>,
    lm: FlatMemory,
    queue: Queue<VproCommand>,
}

module!(VectorUnit, VectorUnitState, VproConfig,);

impl ModuleBehaviors for VectorUnit {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        self.queue.reset();
        self.state_mut().fetched = false;
        let config = self.conf().clone();
        self.lanes = Self::make_lanes(self.cluster, self.id, &config);
        self.lm = FlatMemory::new_with_size(config.lm_size * LM_WORD_BYTES);
    }
}

impl VectorUnit {
    pub fn new(config: Arc<VproConfig>, cluster: usize, id: usize) -> Self {
        let mut unit = VectorUnit {
            base: ModuleBase::default(),
            id,
            cluster,
            lanes: Self::make_lanes(cluster, id, &config),
            lm: FlatMemory::new_with_size(config.lm_size * LM_WORD_BYTES),
            queue: Queue::new(config.cmd_queue_size + 1),
        };
        unit.init_conf(config);
        unit
    }

    fn make_lanes(cluster: usize, unit: usize, config: &VproConfig) -> Vec<Lane> {
        (0..=config.ls_lane())
            .map(|lane| Lane::new(cluster, unit, lane, config))
            .collect()
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    pub fn lane(&self, id: usize) -> Option<&Lane> {
        self.lanes.get(id)
    }

    pub fn lane_mut(&mut self, id: usize) -> Option<&mut Lane> {
        self.lanes.get_mut(id)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_cmd_queue_full(&self) -> bool {
        self.queue.is_full()
    }

    /// Queue a command. Returns false when the queue has no room; the caller
    /// has to wait until the unit drains.
    pub fn try_send(&mut self, cmd: VproCommand) -> bool {
        if cmd.is_none() {
            return true;
        }
        match self.queue.try_enq(cmd) {
            Ok(()) => true,
            Err(cmd) => {
                error!(
                    "C{}U{} command queue is full, dropped {}",
                    self.cluster,
                    self.id,
                    cmd.kind.mnemonic()
                );
                false
            }
        }
    }

    /// Hand the front command to lane `lane`. Every selected lane gets its
    /// own copy; the command leaves the queue once the last one took it.
    pub fn next_command_for_lane(&mut self, lane: usize) -> Option<VproCommand> {
        if self.state().fetched || self.lanes.iter().any(Lane::is_blocking) {
            return None;
        }
        let bit = 1u32.checked_shl(lane as u32).unwrap_or(0);
        let front = self.queue.front_mut()?;
        if front.id_mask & bit == 0 {
            return None;
        }
        front.id_mask &= !bit;
        if front.id_mask != 0 {
            let mut copy = front.clone();
            copy.id_mask |= bit;
            return Some(copy);
        }

        let mut cmd = self.queue.try_deq()?;
        self.state_mut().fetched = true;
        cmd.id_mask |= bit;
        let check = self.conf().check_vector_length;
        if check
            && cmd.fu_sel != FU_SEL_OTHER
            && cmd.fu_sel != FuClass::Mem as u32
            && cmd.elements() < MIN_VECTOR_LENGTH
        {
            warn!(
                "C{}U{} {} has {} elements, fewer than the pipeline depth ({}); add wait states",
                self.cluster,
                self.id,
                cmd.kind.mnemonic(),
                cmd.elements(),
                MIN_VECTOR_LENGTH
            );
        }
        Some(cmd)
    }

    pub fn tick(
        &mut self,
        fabric: &mut ChainFabric,
        arch: &ArchitectureState,
        stats: &mut VproStats,
    ) -> Result<(), anyhow::Error> {
        self.tick_one();
        stats.ticks += 1;
        let config = self
            .base
            .config
            .get()
            .context("vector unit has no config")?;
        let mut ctx = LaneCtx {
            fabric,
            lm: &mut self.lm,
            arch,
            config,
            stats,
        };
        for lane in self.lanes.iter_mut() {
            lane.tick(&mut ctx)?;
        }
        Ok(())
    }

    /// Second phase of a VPRO cycle: advance cursors, fetch new commands and
    /// commit the staged register and FIFO writes.
    pub fn update(
        &mut self,
        fabric: &mut ChainFabric,
        stats: &mut VproStats,
    ) -> Result<(), anyhow::Error> {
        self.state_mut().fetched = false;
        let threshold = self.conf().adr_stall_warn_threshold;
        for i in 0..self.lanes.len() {
            self.lanes[i].update_pre(stats, threshold);
            if self.lanes[i].needs_command() {
                let next = self.next_command_for_lane(i);
                self.lanes[i].fetch(next);
            } else {
                self.lanes[i].fetch(None);
            }
            self.lanes[i].update_post(fabric)?;
        }
        Ok(())
    }

    pub fn is_busy(&self) -> bool {
        !self.queue.is_empty() || self.lanes.iter().any(Lane::is_busy)
    }

    /// Bitmask of lanes with work in flight.
    pub fn busy_lanes(&self) -> u32 {
        self.lanes
            .iter()
            .filter(|lane| lane.is_busy())
            .fold(0, |mask, lane| mask | 1 << lane.id())
    }

    pub fn read_lm(&self, addr: u32) -> Result<[u8; 2], anyhow::Error> {
        self.lm
            .read_n::<2>(addr as usize * LM_WORD_BYTES)
            .with_context(|| format!("C{}U{} local memory read", self.cluster, self.id))
    }

    pub fn write_lm(&mut self, addr: u32, data: [u8; 2]) -> Result<(), anyhow::Error> {
        self.lm
            .write_n(addr as usize * LM_WORD_BYTES, data)
            .with_context(|| format!("C{}U{} local memory write", self.cluster, self.id))
    }

    pub fn lm_word(&self, addr: u32) -> Result<u16, anyhow::Error> {
        Ok(u16::from_le_bytes(self.read_lm(addr)?))
    }

    /// Local memory as rows of 32 words; runs of empty rows collapse to "...".
    pub fn dump_lm(&self) -> Result<String, anyhow::Error> {
        let mut out = String::new();
        writeln!(out, "local memory C{}U{}:", self.cluster, self.id)?;
        let words = self.conf().lm_size as u32;
        let mut elided = false;
        for row in (0..words).step_by(32) {
            let end = (row + 32).min(words);
            let values = (row..end)
                .map(|addr| self.lm_word(addr))
                .collect::<Result<Vec<_>, _>>()?;
            if values.iter().all(|&v| v == 0) {
                if !elided {
                    writeln!(out, "...")?;
                    elided = true;
                }
                continue;
            }
            elided = false;
            write!(out, "${:04x}:", row)?;
            for v in values {
                write!(out, " {:#06x}", v)?;
            }
            writeln!(out)?;
        }
        Ok(out)
    }

    pub fn dump_rf(&self, lane: usize) -> Result<String, anyhow::Error> {
        let rf = self
            .lanes
            .get(lane)
            .and_then(Lane::rf)
            .with_context(|| format!("C{}U{} has no register file in lane {}", self.cluster, self.id, lane))?;
        let mut out = String::new();
        writeln!(out, "register file C{}U{}L{}:", self.cluster, self.id, lane)?;
        for (row, chunk) in rf.values().chunks(16).enumerate() {
            if chunk.iter().all(|&v| v == 0) {
                continue;
            }
            write!(out, "${:04x}:", row * 16)?;
            for v in chunk {
                write!(out, " {:#08x}", v)?;
            }
            writeln!(out)?;
        }
        Ok(out)
    }
}
