use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::command::{DmaCommand, DmaKind, VproCommand};

/// Per-cluster DMA access cycles as seen by the memory controller.
#[derive(Debug, Default, Clone, Serialize)]
pub struct DmaAccessCycles {
    pub read_hit: u64,
    pub read_miss: u64,
    pub write_hit: u64,
    pub write_miss: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct CycleFlags {
    read_hit: bool,
    read_hit_but_busy: bool,
    read_miss: bool,
    write_hit: bool,
    write_hit_but_busy: bool,
    write_miss: bool,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct DcmaStats {
    pub ticks: u64,
    pub busy_cycles: u64,
    pub read_hit_cycles: u64,
    pub read_hit_but_busy_cycles: u64,
    pub read_miss_cycles: u64,
    pub write_hit_cycles: u64,
    pub write_hit_but_busy_cycles: u64,
    pub write_miss_cycles: u64,
    pub read_hit_accesses: u64,
    pub read_miss_accesses: u64,
    pub write_hit_accesses: u64,
    pub write_miss_accesses: u64,
    pub bus_read_cycles: u64,
    pub bus_write_cycles: u64,
    pub bus_wait_cycles: u64,
    pub per_cluster: Vec<DmaAccessCycles>,
    #[serde(skip)]
    this_cycle: Vec<CycleFlags>,
}

/// Outcome of one DMA poll of the memory controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    Hit,
    HitButBusy,
    Miss,
}

impl DcmaStats {
    pub fn new(clusters: usize) -> Self {
        Self {
            per_cluster: vec![DmaAccessCycles::default(); clusters],
            this_cycle: vec![CycleFlags::default(); clusters],
            ..Self::default()
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.per_cluster.len());
    }

    pub fn record_poll(&mut self, cluster: usize, is_read: bool, outcome: AccessOutcome) {
        let Some(flags) = self.this_cycle.get_mut(cluster) else {
            return;
        };
        match (is_read, outcome) {
            (true, AccessOutcome::Hit) => flags.read_hit = true,
            (true, AccessOutcome::HitButBusy) => flags.read_hit_but_busy = true,
            (true, AccessOutcome::Miss) => flags.read_miss = true,
            (false, AccessOutcome::Hit) => flags.write_hit = true,
            (false, AccessOutcome::HitButBusy) => flags.write_hit_but_busy = true,
            (false, AccessOutcome::Miss) => flags.write_miss = true,
        }
    }

    pub fn record_access(&mut self, is_read: bool, hit: bool) {
        match (is_read, hit) {
            (true, true) => self.read_hit_accesses += 1,
            (true, false) => self.read_miss_accesses += 1,
            (false, true) => self.write_hit_accesses += 1,
            (false, false) => self.write_miss_accesses += 1,
        }
    }

    /// Fold the polls recorded during the last controller cycle.
    pub fn end_cycle(&mut self, busy: bool) {
        self.ticks += 1;
        for (flags, total) in self.this_cycle.iter_mut().zip(self.per_cluster.iter_mut()) {
            let f = std::mem::take(flags);
            self.read_hit_cycles += f.read_hit as u64;
            self.read_hit_but_busy_cycles += f.read_hit_but_busy as u64;
            self.read_miss_cycles += f.read_miss as u64;
            self.write_hit_cycles += f.write_hit as u64;
            self.write_hit_but_busy_cycles += f.write_hit_but_busy as u64;
            self.write_miss_cycles += f.write_miss as u64;
            total.read_hit += f.read_hit as u64;
            total.read_miss += (f.read_hit_but_busy as u64) + (f.read_miss as u64);
            total.write_hit += f.write_hit as u64;
            total.write_miss += (f.write_hit_but_busy as u64) + (f.write_miss as u64);
        }
        if busy {
            self.busy_cycles += 1;
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct VproStats {
    pub ticks: u64,
    /// commands retired per lane, keyed by mnemonic
    pub commands: BTreeMap<String, u64>,
    pub elements: u64,
    pub adr_stall_cycles: u64,
    pub src_stall_cycles: u64,
    pub dst_stall_cycles: u64,
}

impl VproStats {
    pub fn command_done(&mut self, cmd: &VproCommand) {
        *self.commands.entry(cmd.kind.mnemonic().to_string()).or_default() += 1;
        self.elements += cmd.elements();
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct DmaStats {
    pub ticks: u64,
    pub commands: BTreeMap<String, u64>,
    pub words_read: u64,
    pub words_written: u64,
    pub padded_words: u64,
}

impl DmaStats {
    pub fn command_started(&mut self, cmd: &DmaCommand) {
        let name = match cmd.kind {
            DmaKind::None => "none",
            DmaKind::Ext1dToLoc1d => "e2l_1d",
            DmaKind::Ext2dToLoc1d => "e2l_2d",
            DmaKind::Loc1dToExt1d => "l2e_1d",
            DmaKind::Loc1dToExt2d => "l2e_2d",
        };
        *self.commands.entry(name.to_string()).or_default() += 1;
    }
}

/// Counters of the control domain, readable through the IO interface.
#[derive(Debug, Default, Clone, Serialize)]
pub struct AuxCounters {
    pub lane_act: u64,
    pub dma_act: u64,
    pub both_act: u64,
    pub vpro_total: u64,
    pub risc_total: u64,
    pub risc_enabled: u64,
    pub cycle_counter: u64,
}

impl AuxCounters {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Stats {
    pub time_ps: u64,
    pub vpro: VproStats,
    pub dma: DmaStats,
    pub dcma: DcmaStats,
    pub aux: AuxCounters,
}

impl Stats {
    pub fn write_json(&self, path: &Path) -> Result<(), anyhow::Error> {
        let payload = serde_json::to_string_pretty(self).context("cannot serialize stats")?;
        fs::write(path, payload).with_context(|| format!("cannot write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessOutcome, DcmaStats};

    #[test]
    fn polls_fold_once_per_cycle() {
        let mut stats = DcmaStats::new(2);
        stats.record_poll(0, true, AccessOutcome::Miss);
        stats.record_poll(0, true, AccessOutcome::Miss);
        stats.record_poll(1, false, AccessOutcome::Hit);
        stats.end_cycle(true);
        stats.end_cycle(false);
        assert_eq!(stats.read_miss_cycles, 1);
        assert_eq!(stats.per_cluster[0].read_miss, 1);
        assert_eq!(stats.per_cluster[1].write_hit, 1);
        assert_eq!(stats.busy_cycles, 1);
        assert_eq!(stats.ticks, 2);
    }
}
