use std::sync::Arc;

use anyhow::Context;
use log::{debug, error, warn};

use crate::arch_state::ArchitectureState;
use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::command::{Command, DmaCommand, VproCommand};
use crate::dcma::Dcma;
use crate::dma::DmaEngine;
use crate::sim::clock::ClockDomain;
use crate::sim::config::{ClockConfig, VproConfig};
use crate::sim::stats::Stats;
use crate::unit::fabric::ChainFabric;
use crate::unit::VectorUnit;

#[derive(Debug, Default)]
pub struct ClusterState {
    /// hold back new commands until every unit has drained
    wait_vpro: bool,
    /// hold back new commands until the DMA engine has drained
    wait_dma: bool,
}

/// A ring of vector units sharing one DMA engine and one chain fabric. Runs
/// its own VPRO and DMA clock domains.
pub struct Cluster {
    base: ModuleBase<ClusterState, VproConfig>,
    id: usize,
    units: Vec<VectorUnit>,
    fabric: ChainFabric,
    dma: DmaEngine,
    vpro_clock: ClockDomain,
    dma_clock: ClockDomain,
}

module!(Cluster, ClusterState, VproConfig,);

impl ModuleBehaviors for Cluster {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        self.units.iter_mut().for_each(VectorUnit::reset);
        self.fabric.clear();
        self.dma = DmaEngine::new(self.id);
        *self.state_mut() = ClusterState::default();
    }
}

impl Cluster {
    pub fn new(config: Arc<VproConfig>, clocks: &ClockConfig, id: usize) -> Self {
        let units = (0..config.units)
            .map(|u| VectorUnit::new(Arc::clone(&config), id, u))
            .collect();
        let mut cluster = Cluster {
            base: ModuleBase::default(),
            id,
            units,
            fabric: ChainFabric::new(config.units, config.lanes),
            dma: DmaEngine::new(id),
            vpro_clock: ClockDomain::new(clocks.vpro_period_ps),
            dma_clock: ClockDomain::new(clocks.dma_period_ps),
        };
        cluster.base.period_ps = clocks.vpro_period_ps;
        cluster.init_conf(config);
        cluster
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn units(&self) -> &[VectorUnit] {
        &self.units
    }

    pub fn units_mut(&mut self) -> &mut [VectorUnit] {
        &mut self.units
    }

    pub fn unit(&self, id: usize) -> Result<&VectorUnit, anyhow::Error> {
        self.units
            .get(id)
            .with_context(|| format!("cluster {} has no unit {}", self.id, id))
    }

    pub fn dma(&self) -> &DmaEngine {
        &self.dma
    }

    pub fn fabric(&self) -> &ChainFabric {
        &self.fabric
    }

    /// Advance whichever of the DMA and VPRO domains has an edge due at
    /// `now_ps`. The DMA domain goes first.
    pub fn tick(
        &mut self,
        now_ps: u64,
        dcma: &mut Dcma,
        arch: &ArchitectureState,
        stats: &mut Stats,
    ) -> Result<(), anyhow::Error> {
        if self.dma_clock.advance(now_ps) {
            self.dma.tick(dcma, &mut self.units, arch, &mut stats.dma)?;
        }
        if self.vpro_clock.advance(now_ps) {
            self.tick_one();
            for unit in self.units.iter_mut() {
                unit.tick(&mut self.fabric, arch, &mut stats.vpro)?;
            }
            for unit in self.units.iter_mut() {
                unit.update(&mut self.fabric, &mut stats.vpro)?;
            }
        }
        Ok(())
    }

    /// Route a command into the cluster. Returns false when a unit queue
    /// refused a VPRO command.
    pub fn send(&mut self, cmd: Command, arch: &ArchitectureState) -> Result<bool, anyhow::Error> {
        match cmd {
            Command::Vpro(cmd) => Ok(self.send_vpro(cmd, arch)),
            Command::Dma(cmd) => {
                self.send_dma(cmd)?;
                Ok(true)
            }
            Command::Sim(cmd) => {
                warn!("cluster {} cannot execute {:?}", self.id, cmd);
                Ok(true)
            }
        }
    }

    fn send_vpro(&mut self, cmd: VproCommand, arch: &ArchitectureState) -> bool {
        debug!("cluster {} got {}", self.id, cmd.kind.mnemonic());
        let mut refused = 0u32;
        for unit in self.units.iter_mut() {
            if arch.unit_selected(unit.id()) && !unit.try_send(cmd.clone()) {
                refused |= 1 << unit.id();
            }
        }
        if refused != 0 {
            error!(
                "cluster {} could not queue {} in units {:#b}",
                self.id,
                cmd.kind.mnemonic(),
                refused
            );
        }
        refused == 0
    }

    fn send_dma(&mut self, cmd: DmaCommand) -> Result<(), anyhow::Error> {
        self.dma.execute_cmd(cmd)
    }

    pub fn set_wait_vpro(&mut self, wait: bool) {
        self.state_mut().wait_vpro = wait;
    }

    pub fn set_wait_dma(&mut self, wait: bool) {
        self.state_mut().wait_dma = wait;
    }

    pub fn is_vpro_busy(&self) -> bool {
        self.units.iter().any(VectorUnit::is_busy)
    }

    pub fn is_dma_busy(&self, dcma: &Dcma) -> bool {
        self.dma.is_busy(dcma)
    }

    /// Every unit queue has room and no requested drain is still pending.
    /// Drains that have completed clear their wait flag.
    pub fn is_ready_for_command(&mut self, dcma: &Dcma) -> bool {
        if self.units.iter().any(VectorUnit::is_cmd_queue_full) {
            return false;
        }
        if self.state().wait_vpro {
            if self.is_vpro_busy() {
                return false;
            }
            self.state_mut().wait_vpro = false;
        }
        if self.state().wait_dma {
            if self.is_dma_busy(dcma) {
                return false;
            }
            self.state_mut().wait_dma = false;
        }
        true
    }

    pub fn is_busy(&self, dcma: &Dcma) -> bool {
        self.is_vpro_busy() || self.is_dma_busy(dcma)
    }

    /// Bitmask of units with queued or in-flight work.
    pub fn busy_units(&self) -> u32 {
        self.units
            .iter()
            .filter(|unit| unit.is_busy())
            .fold(0, |mask, unit| mask | 1 << unit.id())
    }
}
