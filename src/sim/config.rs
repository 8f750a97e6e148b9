use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::*;

pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> Result<Self, anyhow::Error> {
        match section {
            Some(value) => value.clone().try_into().context("cannot deserialize config"),
            None => {
                warn!("config section not found");
                Ok(Self::default())
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimConfig {
    pub log_level: u64,
    /// upper bound on global steps spent in a single wait loop
    pub timeout: u64,
    pub script: Option<PathBuf>,
    pub stats_json: Option<PathBuf>,
}

impl Config for SimConfig {}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            log_level: 0,
            timeout: 100_000_000,
            script: None,
            stats_json: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VproConfig {
    pub clusters: usize,
    pub units: usize,
    /// processing lanes per unit, not counting the load/store lane
    pub lanes: usize,
    /// local memory entries (16 bit) per unit
    pub lm_size: usize,
    /// register file entries (24 bit) per processing lane
    pub rf_size: usize,
    pub cmd_queue_size: usize,
    pub strict: bool,
    pub check_vector_length: bool,
    pub adr_stall_warn_threshold: u64,
}

impl Config for VproConfig {}

impl Default for VproConfig {
    fn default() -> Self {
        let config = Self {
            clusters: 1,
            units: 1,
            lanes: 2,
            lm_size: 8192,
            rf_size: 1024,
            cmd_queue_size: 32,
            strict: true,
            check_vector_length: true,
            adr_stall_warn_threshold: 100,
        };
        config.ensure_valid();
        config
    }
}

impl VproConfig {
    pub fn ensure_valid(&self) {
        assert!(self.clusters > 0 && self.clusters <= 32, "clusters must be in 1..=32");
        assert!(self.units > 0 && self.units <= 32, "units must be in 1..=32");
        assert!(self.lanes >= 2, "at least two processing lanes are required");
        assert!(self.lanes < 31, "lane ids must fit the 32-bit id mask");
        assert!(self.lm_size > 0, "local memory must not be empty");
        assert!(self.rf_size > 0, "register file must not be empty");
        assert!(self.cmd_queue_size > 0, "command queue must hold at least one command");
    }

    /// id of the load/store lane inside a unit
    pub fn ls_lane(&self) -> usize {
        self.lanes
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementPolicy {
    #[default]
    Fifo,
    Lru,
    Lfu,
    Random,
}

impl FromStr for ReplacementPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "fifo" => Ok(Self::Fifo),
            "lru" => Ok(Self::Lru),
            "lfu" => Ok(Self::Lfu),
            "random" => Ok(Self::Random),
            _ => Err(format!(
                "unsupported replacement policy '{}', expected one of: fifo, lru, lfu, random",
                value
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DcmaMode {
    /// set-associative cache in front of the bus
    #[default]
    Realistic,
    /// every access hits, data moves through the debug port
    Ideal,
    /// no cache, DMA requests are serviced one at a time as whole bus bursts
    Bypass,
}

impl FromStr for DcmaMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "realistic" => Ok(Self::Realistic),
            "ideal" => Ok(Self::Ideal),
            "bypass" => Ok(Self::Bypass),
            _ => Err(format!(
                "unsupported dcma mode '{}', expected one of: realistic, ideal, bypass",
                value
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DcmaConfig {
    /// bytes per cache line
    pub line_size: usize,
    pub associativity: usize,
    pub nr_brams: usize,
    /// bytes per bank
    pub bram_size: usize,
    pub replacement_policy: ReplacementPolicy,
    pub mode: DcmaMode,
    /// seed of the random replacement policy
    pub random_seed: u64,
}

impl Config for DcmaConfig {}

impl Default for DcmaConfig {
    fn default() -> Self {
        let config = Self {
            line_size: 4096,
            associativity: 4,
            nr_brams: 8,
            bram_size: 524288,
            replacement_policy: ReplacementPolicy::Fifo,
            mode: DcmaMode::Realistic,
            random_seed: 0,
        };
        config.ensure_valid();
        config
    }
}

impl DcmaConfig {
    pub const DMA_WORD_BYTES: usize = 2;
    pub const DCMA_WORD_BYTES: usize = 16;
    pub const BUS_WORD_BYTES: usize = 64;

    pub fn ensure_valid(&self) {
        assert!(self.line_size.is_power_of_two(), "line_size must be a power of two");
        assert!(self.line_size >= Self::BUS_WORD_BYTES, "line_size must hold at least one bus word");
        assert!(self.associativity.is_power_of_two(), "associativity must be a power of two");
        assert!(self.nr_brams.is_power_of_two(), "nr_brams must be a power of two");
        assert!(self.bram_size.is_power_of_two(), "bram_size must be a power of two");
        assert!(
            self.total_size() % (self.line_size * self.associativity) == 0,
            "cache size must be a multiple of line_size * associativity"
        );
        assert!(self.sets() > 0, "cache must have at least one set");
    }

    pub fn total_size(&self) -> usize {
        self.nr_brams * self.bram_size
    }

    pub fn nr_lines(&self) -> usize {
        self.total_size() / self.line_size
    }

    pub fn sets(&self) -> usize {
        self.total_size() / (self.line_size * self.associativity)
    }

    /// bus words per cache line
    pub fn line_burst(&self) -> u32 {
        (self.line_size / Self::BUS_WORD_BYTES) as u32
    }
}

/// Clock periods in picoseconds.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClockConfig {
    pub vpro_period_ps: u64,
    pub dma_period_ps: u64,
    pub dcma_period_ps: u64,
    pub axi_period_ps: u64,
    pub risc_period_ps: u64,
    /// control-domain cycles an IO access costs the issuing core
    pub risc_io_access_cycles: u64,
}

impl Config for ClockConfig {}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            vpro_period_ps: 2500,
            dma_period_ps: 5000,
            dcma_period_ps: 5000,
            axi_period_ps: 5000,
            risc_period_ps: 5000,
            risc_io_access_cycles: 3,
        }
    }
}

impl ClockConfig {
    pub fn ensure_valid(&self) {
        for period in self.periods() {
            assert!(period > 0, "clock periods must be non-zero");
        }
    }

    pub fn periods(&self) -> [u64; 5] {
        [
            self.vpro_period_ps,
            self.dma_period_ps,
            self.dcma_period_ps,
            self.axi_period_ps,
            self.risc_period_ps,
        ]
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct MemConfig {
    pub size: usize,
    pub read_latency: u64,
    pub write_latency: u64,
}

impl Config for MemConfig {}

impl Default for MemConfig {
    fn default() -> Self {
        Self {
            size: 64 << 20,
            read_latency: 36,
            write_latency: 6,
        }
    }
}
