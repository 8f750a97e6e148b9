//! Top of the simulator: owns every cluster, the memory controller and the
//! control-domain state, and advances the clock domains on a shared
//! picosecond time line.

use std::sync::Arc;

use anyhow::{bail, ensure, Context};
use log::{debug, error, info, warn};
use num_traits::FromPrimitive;

use crate::arch_state::ArchitectureState;
use crate::base::behavior::*;
use crate::bus::{BusSlave, MainMemory};
use crate::cluster::Cluster;
use crate::command::{Command, DmaCommand, SimCommand, VproCommand};
use crate::command_proc::{self, addr, gp, CommandProcessor};
use crate::dcma::Dcma;
use crate::dma::block::BlockExtractor;
use crate::dma::looper::DmaLooper;
use crate::isa::{MacInitSource, MacResetMode, MAX_X_END, MAX_Y_END, MAX_Z_END};
use crate::sim::clock::{global_step, ClockDomain};
use crate::sim::config::{ClockConfig, DcmaConfig, DcmaMode, MemConfig, SimConfig, VproConfig};
use crate::sim::stats::Stats;

#[derive(Debug, Clone, Default)]
pub struct VproTopConfig {
    pub sim: SimConfig,
    pub vpro: VproConfig,
    pub dcma: DcmaConfig,
    pub clock: ClockConfig,
    pub mem: MemConfig,
}

impl VproTopConfig {
    pub fn ensure_valid(&self) {
        self.vpro.ensure_valid();
        self.dcma.ensure_valid();
        self.clock.ensure_valid();
    }
}

pub struct VproTop {
    config: Arc<VproTopConfig>,
    pub clusters: Vec<Cluster>,
    pub dcma: Dcma,
    pub arch: ArchitectureState,
    pub looper: DmaLooper,
    pub block: BlockExtractor,
    pub cproc: CommandProcessor,
    stats: Stats,
    time_ps: u64,
    step_ps: u64,
    steps: u64,
    dcma_clock: ClockDomain,
    axi_clock: ClockDomain,
    risc_clock: ClockDomain,
    /// the control core polls a sync register and counts as stalled
    sync_waiting: bool,
}

impl VproTop {
    pub fn new(config: Arc<VproTopConfig>) -> VproTop {
        config.ensure_valid();
        let vpro = Arc::new(config.vpro.clone());
        let clock = &config.clock;
        let clusters = (0..vpro.clusters)
            .map(|id| Cluster::new(Arc::clone(&vpro), clock, id))
            .collect();
        let memory = MainMemory::new(Arc::new(config.mem));
        let dcma = Dcma::new(Arc::new(config.dcma.clone()), vpro.clusters, Box::new(memory));
        info!(
            "vpro: {} clusters x {} units x {} lanes, dcma {:?}",
            vpro.clusters, vpro.units, vpro.lanes, config.dcma.mode
        );
        VproTop {
            clusters,
            dcma,
            arch: ArchitectureState::default(),
            looper: DmaLooper::new(vpro.units),
            block: BlockExtractor::new(),
            cproc: CommandProcessor::new(Arc::clone(&vpro)),
            stats: Stats::default(),
            time_ps: 0,
            step_ps: global_step(&clock.periods()),
            steps: 0,
            dcma_clock: ClockDomain::new(clock.dcma_period_ps),
            axi_clock: ClockDomain::new(clock.axi_period_ps),
            risc_clock: ClockDomain::new(clock.risc_period_ps),
            sync_waiting: false,
            config,
        }
    }

    pub fn config(&self) -> &VproTopConfig {
        &self.config
    }

    pub fn time_ps(&self) -> u64 {
        self.time_ps
    }

    pub fn cluster(&self, id: usize) -> Result<&Cluster, anyhow::Error> {
        self.clusters
            .get(id)
            .with_context(|| format!("cluster {} does not exist", id))
    }

    pub fn bus(&self) -> &dyn BusSlave {
        self.dcma.bus()
    }

    pub fn bus_mut(&mut self) -> &mut dyn BusSlave {
        self.dcma.bus_mut()
    }

    /// Counters collected so far, including the memory controller's.
    pub fn stats(&self) -> Stats {
        let mut stats = self.stats.clone();
        stats.time_ps = self.time_ps;
        stats.dcma = self.dcma.stats.clone();
        stats
    }

    pub fn reset(&mut self) {
        self.clusters.iter_mut().for_each(Cluster::reset);
        self.dcma.reset();
        self.arch = ArchitectureState::default();
        self.looper = DmaLooper::new(self.config.vpro.units);
        self.block = BlockExtractor::new();
        self.cproc.reset();
        self.stats = Stats::default();
    }

    /// One global step: every cluster, then the memory controller, then the
    /// bus, each only if its clock has an edge due.
    pub fn clk_tick(&mut self) -> Result<(), anyhow::Error> {
        self.time_ps += self.step_ps;
        self.steps += 1;
        let now = self.time_ps;
        for cluster in self.clusters.iter_mut() {
            cluster.tick(now, &mut self.dcma, &self.arch, &mut self.stats)?;
        }
        if self.dcma_clock.advance(now) {
            self.dcma.tick()?;
        }
        if self.axi_clock.advance(now) {
            self.dcma.bus_mut().tick();
        }
        Ok(())
    }

    fn check_timeout(&self, since: u64) -> Result<(), anyhow::Error> {
        let limit = self.config.sim.timeout;
        if self.steps - since > limit {
            bail!(
                "no progress after {} steps (time {} ps); is a cluster stuck?",
                limit,
                self.time_ps
            );
        }
        Ok(())
    }

    /// One edge of the control domain: descriptor expansion and the
    /// activity counters.
    fn control_tick(&mut self) -> Result<(), anyhow::Error> {
        if let Some(cmd) = self.looper.tick()? {
            self.run_dma_instruction(cmd, true)?;
        }
        self.block.tick(&mut self.looper, self.dcma.bus())?;
        self.count_activity();
        Ok(())
    }

    fn count_activity(&mut self) {
        let lanes_busy = self.clusters.iter().any(Cluster::is_vpro_busy);
        let dma_busy = self.clusters.iter().any(|c| c.is_dma_busy(&self.dcma));
        let aux = &mut self.stats.aux;
        aux.vpro_total += 1;
        aux.lane_act += lanes_busy as u64;
        aux.dma_act += dma_busy as u64;
        aux.both_act += (lanes_busy && dma_busy) as u64;
        aux.risc_total += 1;
        aux.cycle_counter += 1;
        aux.risc_enabled += !self.sync_waiting as u64;
    }

    /// Step until a control edge finds every cluster able to take a command.
    pub fn run_until_ready_for_cmd(&mut self) -> Result<(), anyhow::Error> {
        let since = self.steps;
        loop {
            self.clk_tick()?;
            let dcma = &self.dcma;
            let ready = self
                .clusters
                .iter_mut()
                .fold(true, |ready, c| c.is_ready_for_command(dcma) && ready);
            if self.risc_clock.advance(self.time_ps) {
                self.control_tick()?;
                if ready {
                    return Ok(());
                }
            }
            self.check_timeout(since)?;
        }
    }

    /// Step until the control domain has spent the cycles of one IO access.
    pub fn run_until_risc_ready_for_cmd(&mut self) -> Result<(), anyhow::Error> {
        let since = self.steps;
        let mut cycles = 0;
        while cycles < self.config.clock.risc_io_access_cycles {
            self.clk_tick()?;
            if self.risc_clock.advance(self.time_ps) {
                self.control_tick()?;
                cycles += 1;
            }
            self.check_timeout(since)?;
        }
        Ok(())
    }

    fn check_vpro_instruction_length(&self, cmd: &VproCommand) -> Result<(), anyhow::Error> {
        let too_long = cmd.x_end > MAX_X_END || cmd.y_end > MAX_Y_END || cmd.z_end > MAX_Z_END;
        if !too_long {
            return Ok(());
        }
        let msg = format!(
            "{} exceeds the loop limits (x_end {}, y_end {}, z_end {})",
            cmd.kind.mnemonic(),
            cmd.x_end,
            cmd.y_end,
            cmd.z_end
        );
        if self.config.vpro.strict {
            bail!(msg);
        }
        warn!("{}", msg);
        Ok(())
    }

    /// Wait for room, then hand the command to every selected cluster.
    pub fn run_vpro_instruction(&mut self, cmd: VproCommand) -> Result<(), anyhow::Error> {
        self.run_until_ready_for_cmd()?;
        self.check_vpro_instruction_length(&cmd)?;
        for cluster in self.clusters.iter_mut() {
            if !self.arch.cluster_selected(cluster.id()) {
                continue;
            }
            if !cluster.send(Command::Vpro(cmd.clone()), &self.arch)? {
                warn!("cluster {} did not take {}", cluster.id(), cmd.kind.mnemonic());
            }
        }
        Ok(())
    }

    /// Hand a copy of the command to every cluster in its mask. Commands
    /// produced by the looper skip the wait.
    pub fn run_dma_instruction(&mut self, cmd: DmaCommand, skip_tick: bool) -> Result<(), anyhow::Error> {
        if !skip_tick {
            self.run_until_ready_for_cmd()?;
        }
        for cluster in self.clusters.iter_mut() {
            if (cmd.cluster_mask >> cluster.id()) & 1 == 1 {
                cluster.send(Command::Dma(cmd.clone()), &self.arch)?;
            }
        }
        Ok(())
    }

    pub fn execute(&mut self, cmd: Command) -> Result<(), anyhow::Error> {
        match cmd {
            Command::Vpro(cmd) => self.run_vpro_instruction(cmd),
            Command::Dma(cmd) => self.run_dma_instruction(cmd, false),
            Command::Sim(cmd) => self.execute_sim(cmd),
        }
    }

    pub fn execute_sim(&mut self, cmd: SimCommand) -> Result<(), anyhow::Error> {
        match cmd {
            SimCommand::Memset { addr, value, len } => {
                debug!("memset {:#x} = {:#04x} x {}", addr, value, len);
                self.bus_mut().dbg_write_bytes(addr, &vec![value; len])
            }
            SimCommand::DumpLocalMemory { cluster, unit } => {
                let dump = self.cluster(cluster)?.unit(unit)?.dump_lm()?;
                println!("{}", dump);
                Ok(())
            }
            SimCommand::DumpRegisterFile {
                cluster,
                unit,
                lane,
            } => {
                let dump = self.cluster(cluster)?.unit(unit)?.dump_rf(lane)?;
                println!("{}", dump);
                Ok(())
            }
            SimCommand::WaitStep => self.wait_until_idle(),
        }
    }

    /// Poll the sync registers the way software does until every DMA and
    /// then every vector unit has drained.
    pub fn wait_until_idle(&mut self) -> Result<(), anyhow::Error> {
        self.sync_waiting = true;
        let result = self.poll_sync_registers();
        self.sync_waiting = false;
        result
    }

    fn poll_sync_registers(&mut self) -> Result<(), anyhow::Error> {
        let since = self.steps;
        for busy_reg in [addr::BUSY_MASKED_DMA, addr::BUSY_MASKED_VPRO] {
            self.io_write(addr::SYNC_CLUSTER_MASK, u32::MAX)?;
            while self.io_read(busy_reg)? != 0 {
                self.check_timeout(since)?;
            }
        }
        Ok(())
    }

    fn descriptors_busy(&self) -> bool {
        self.looper.is_busy() || self.block.is_busy()
    }

    fn dma_busy_mask(&self, only_synced: bool) -> u32 {
        self.clusters
            .iter()
            .filter(|c| !only_synced || (self.arch.sync_cluster_mask_global >> c.id()) & 1 == 1)
            .filter(|c| c.is_dma_busy(&self.dcma))
            .fold(0, |mask, c| mask | 1 << c.id())
    }

    fn freq_hz(period_ps: u64) -> u32 {
        (1_000_000_000_000 / period_ps.max(1)) as u32
    }

    /// Register write from the control core.
    pub fn io_write(&mut self, addr: u32, value: u32) -> Result<(), anyhow::Error> {
        // odd addresses carry the upper half of a 64-bit host write
        if addr & 1 == 0 {
            self.run_until_risc_ready_for_cmd()?;
        }
        let aux = &mut self.stats.aux;
        match addr {
            addr::DEBUG_FIFO => println!("#DEBUG_FIFO: {:#010x}", value),
            addr::DEV_NULL => {}
            addr::AUX_LANE_ACT => aux.lane_act = 0,
            addr::AUX_DMA_ACT => aux.dma_act = 0,
            addr::AUX_BOTH_ACT => aux.both_act = 0,
            addr::AUX_VPRO_TOTAL => aux.vpro_total = 0,
            addr::AUX_RISC_TOTAL => aux.risc_total = 0,
            addr::AUX_RISC_ENABLED => aux.risc_enabled = 0,
            addr::AUX_CYCLE_LOW | addr::AUX_CYCLE_HIGH => aux.cycle_counter = 0,
            a if command_proc::is_vpro_register(a) => {
                if let Some(cmd) = self.cproc.write_vpro(a, value) {
                    self.run_vpro_instruction(cmd)?;
                }
            }
            a if command_proc::is_unsupported_vpro_register(a) => {
                error!("vpro command register {:#010x} is not implemented", a)
            }
            addr::MUL_SHIFT => {
                command_proc::check_shift("MULH", value);
                self.arch.accu_mul_high_bit_shift = value;
            }
            addr::MAC_SHIFT => {
                command_proc::check_shift("MACH", value);
                self.arch.accu_mac_high_bit_shift = value;
            }
            addr::MAC_INIT_SOURCE => match MacInitSource::from_u32(value) {
                Some(source) => self.arch.mac_init_source = source,
                None => warn!("unknown MAC init source {:#b}", value),
            },
            addr::MAC_RESET_MODE => match MacResetMode::from_u32(value) {
                Some(mode) => self.arch.mac_reset_mode = mode,
                None => warn!("unknown MAC reset mode {:#b}", value),
            },
            addr::CLUSTER_MASK => self.arch.cluster_mask_global = value,
            addr::UNIT_MASK => self.arch.unit_mask_global = value,
            addr::SYNC_CLUSTER_MASK => self.arch.sync_cluster_mask_global = value,
            addr::DCMA_FLUSH => self.dcma.flush(),
            addr::DCMA_RESET => self.dcma.reset(),
            a if command_proc::is_dma_register(a) => {
                if let Some(cmd) = self.cproc.write_dma(a, value)? {
                    self.run_dma_instruction(cmd, false)?;
                }
            }
            addr::IDMA_READ_HIT_CYCLES
            | addr::IDMA_READ_MISS_CYCLES
            | addr::IDMA_WRITE_HIT_CYCLES
            | addr::IDMA_WRITE_MISS_CYCLES => {
                self.dcma.stats.reset();
                self.cproc.reset_dma_counter_cluster();
            }
            addr::DESC_BLOCK_SIZE => self.block.new_size(value),
            addr::DESC_BLOCK_TRIGGER => self.block.new_addr_trigger(value, 0),
            a if a == addr::DESC_BLOCK_TRIGGER + 1 => {
                ensure!(!self.block.is_busy(), "descriptor block address written while streaming");
                self.block.new_addr_trigger(value, 32);
            }
            addr::DESC_SINGLE_TRIGGER => self.block.new_addr_trigger(value, 0),
            a if a == addr::DESC_SINGLE_TRIGGER + 1 => {
                ensure!(!self.block.is_busy(), "descriptor address written while streaming");
                self.block.new_size(1);
                self.block.new_addr_trigger(value, 32);
            }
            a if a & 0xffff_ff00 == addr::GP_REGISTERS => self.cproc.write_gp(a, value),
            a if a & 0xffff_0000 == 0xfffe_0000 && a & 0x80 != 0 => {
                for cluster in self.clusters.iter() {
                    cluster.dma().io_write(a, value, &mut self.arch);
                }
            }
            a => warn!("io write to unknown register {:#010x} (value {:#010x})", a, value),
        }
        Ok(())
    }

    /// Register read from the control core.
    pub fn io_read(&mut self, addr: u32) -> Result<u32, anyhow::Error> {
        self.run_until_risc_ready_for_cmd()?;
        let aux = &self.stats.aux;
        let descriptors = (self.descriptors_busy() as u32) << 31;
        let value = match addr {
            addr::DEBUG_FIFO | addr::DEV_NULL => 0,
            addr::AUX_LANE_ACT => aux.lane_act as u32,
            addr::AUX_DMA_ACT => aux.dma_act as u32,
            addr::AUX_BOTH_ACT => aux.both_act as u32,
            addr::AUX_VPRO_TOTAL => aux.vpro_total as u32,
            addr::AUX_RISC_TOTAL => aux.risc_total as u32,
            addr::AUX_RISC_ENABLED => aux.risc_enabled as u32,
            addr::AUX_CYCLE_LOW => aux.cycle_counter as u32,
            addr::AUX_CYCLE_HIGH => (aux.cycle_counter >> 32) as u32,
            addr::CLUSTER_MASK => self.arch.cluster_mask_global,
            addr::SYNC_CLUSTER_MASK => self.arch.sync_cluster_mask_global,
            addr::UNIT_MASK => self.arch.unit_mask_global,
            addr::MUL_SHIFT => self.arch.accu_mul_high_bit_shift,
            addr::MAC_SHIFT => self.arch.accu_mac_high_bit_shift,
            addr::MAC_INIT_SOURCE => self.arch.mac_init_source as u32,
            addr::MAC_RESET_MODE => self.arch.mac_reset_mode as u32,
            addr::BUSY_MASKED_DMA => descriptors | self.dma_busy_mask(true),
            addr::BUSY_MASKED_VPRO => self
                .clusters
                .iter()
                .filter(|c| (self.arch.sync_cluster_mask_global >> c.id()) & 1 == 1)
                .fold(0, |mask, c| mask | c.busy_units()),
            addr::SYNC_LANES => self.lane_busy_mask(),
            addr::SYNC_DMA => descriptors | self.dma_busy_mask(false),
            addr::SYNC => descriptors | self.dma_busy_mask(false) | self.lane_busy_mask(),
            addr::DESC_FSM_BUSY => self.descriptors_busy() as u32,
            addr::DCMA_FLUSH => self.dcma.is_busy() as u32,
            addr::IDMA_READ_HIT_CYCLES
            | addr::IDMA_READ_MISS_CYCLES
            | addr::IDMA_WRITE_HIT_CYCLES
            | addr::IDMA_WRITE_MISS_CYCLES => self.read_dma_counter(addr),
            a if a & 0xffff_ff00 == addr::GP_REGISTERS => self.read_gp(a),
            a if a & 0xffff_00ff == addr::UNIT_BUSY => {
                let cluster = ((a & 0xff00) >> 8) as usize;
                self.clusters.get(cluster).map_or(0, Cluster::busy_units)
            }
            a if a & 0xffff_0000 == 0xfffe_0000 && a & 0x80 != 0 => {
                let cluster = ((a & 0xff00) >> 8) as usize;
                self.clusters
                    .get(cluster)
                    .map_or(0, |c| c.dma().io_read(a, &self.dcma))
            }
            a => {
                warn!("io read from unknown register {:#010x}", a);
                0
            }
        };
        Ok(value)
    }

    fn lane_busy_mask(&self) -> u32 {
        self.clusters
            .iter()
            .filter(|c| c.is_vpro_busy())
            .fold(0, |mask, c| mask | 1 << c.id())
    }

    fn read_dma_counter(&mut self, addr: u32) -> u32 {
        let cluster = self.cproc.dma_counter_cluster();
        let Some(counters) = self.dcma.stats.per_cluster.get(cluster) else {
            return 0;
        };
        let value = match addr {
            addr::IDMA_READ_HIT_CYCLES => counters.read_hit,
            addr::IDMA_READ_MISS_CYCLES => counters.read_miss,
            addr::IDMA_WRITE_HIT_CYCLES => counters.write_hit,
            _ => counters.write_miss,
        } as u32;
        if addr == addr::IDMA_WRITE_MISS_CYCLES {
            self.cproc.advance_dma_counter_cluster();
        }
        value
    }

    fn read_gp(&self, addr: u32) -> u32 {
        let vpro = &self.config.vpro;
        let clock = &self.config.clock;
        let dcma = &self.config.dcma;
        match ((addr & 0xff) / 4) as usize {
            // no build timestamp for a simulator build
            gp::BUILD_TIME => 0,
            gp::CLUSTERS => vpro.clusters as u32,
            gp::UNITS => vpro.units as u32,
            gp::LANES => vpro.lanes as u32,
            gp::VPRO_FREQ => Self::freq_hz(clock.vpro_period_ps),
            gp::RISC_FREQ => Self::freq_hz(clock.risc_period_ps),
            gp::DMA_FREQ => Self::freq_hz(clock.dma_period_ps),
            gp::AXI_FREQ => Self::freq_hz(clock.axi_period_ps),
            gp::MAGIC => gp::MAGIC_VALUE,
            gp::DCMA_OFF => (dcma.mode == DcmaMode::Bypass) as u32,
            gp::DCMA_NR_BRAMS => dcma.nr_brams as u32,
            gp::DCMA_LINE_SIZE => dcma.line_size as u32,
            gp::DCMA_ASSOC_LOG2 => dcma.associativity.trailing_zeros(),
            _ => self.cproc.read_gp(addr),
        }
    }

    /// Run until nothing is queued or in flight anywhere.
    pub fn run_until_idle(&mut self) -> Result<(), anyhow::Error> {
        let since = self.steps;
        loop {
            let busy = self.descriptors_busy()
                || self.dcma.is_busy()
                || self.clusters.iter().any(|c| c.is_busy(&self.dcma));
            if !busy {
                return Ok(());
            }
            self.clk_tick()?;
            if self.risc_clock.advance(self.time_ps) {
                self.control_tick()?;
            }
            self.check_timeout(since)?;
        }
    }
}
