//! Memory controller between the per-cluster DMA engines and main memory.

pub mod bram;
pub mod bypass;
pub mod cache;

use std::sync::Arc;

use log::debug;

use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::bus::BusSlave;
use crate::dcma::bram::WORD_BYTES;
use crate::dcma::bypass::Bypass;
use crate::dcma::cache::Cache;
use crate::sim::config::{DcmaConfig, DcmaMode};
use crate::sim::stats::{AccessOutcome, DcmaStats};

/// Polls a read request waits before its first word can be served.
pub const READ_STARTUP_LATENCY: u32 = 6 * 8;
/// Polls a write request waits before its first word can be accepted.
pub const WRITE_STARTUP_LATENCY: u32 = 9 * 8;

#[derive(Debug, Clone, Copy)]
pub struct DcmaRequest {
    pub addr: u64,
    /// length in DMA words
    pub words: u32,
    pub iter: u32,
    pub latency: u32,
    pub is_read: bool,
    pub is_new_access: bool,
    pub done: bool,
}

impl Default for DcmaRequest {
    fn default() -> Self {
        Self {
            addr: 0,
            words: 0,
            iter: 0,
            latency: 0,
            is_read: true,
            is_new_access: true,
            done: true,
        }
    }
}

impl DcmaRequest {
    fn current_addr(&self) -> u64 {
        self.addr + (WORD_BYTES as u32 * self.iter) as u64
    }
}

#[derive(Debug, Default)]
pub struct DcmaState {
    requests: Vec<DcmaRequest>,
    next_miss: usize,
}

pub struct Dcma {
    base: ModuleBase<DcmaState, DcmaConfig>,
    cache: Cache,
    bypass: Bypass,
    bus: Box<dyn BusSlave>,
    pub stats: DcmaStats,
}

module!(Dcma, DcmaState, DcmaConfig,);

impl ModuleBehaviors for Dcma {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        self.cache.reset();
        self.stats.reset();
    }
}

impl Dcma {
    pub fn new(config: Arc<DcmaConfig>, clusters: usize, bus: Box<dyn BusSlave>) -> Self {
        let mut dcma = Dcma {
            base: ModuleBase::default(),
            cache: Cache::new(&config),
            bypass: Bypass::new(),
            bus,
            stats: DcmaStats::new(clusters),
        };
        dcma.init_conf(config);
        dcma.state_mut().requests = vec![DcmaRequest::default(); clusters];
        dcma
    }

    pub fn mode(&self) -> DcmaMode {
        self.conf().mode
    }

    pub fn bus(&self) -> &dyn BusSlave {
        self.bus.as_ref()
    }

    pub fn bus_mut(&mut self) -> &mut dyn BusSlave {
        self.bus.as_mut()
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    fn start_request(&mut self, addr: u64, words: u32, id: usize, is_read: bool) {
        let latency = if is_read {
            READ_STARTUP_LATENCY
        } else {
            WRITE_STARTUP_LATENCY
        };
        self.state_mut().requests[id] = DcmaRequest {
            addr,
            words,
            iter: 0,
            latency,
            is_read,
            is_new_access: true,
            done: false,
        };
    }

    pub fn request_dma_read_transfer(&mut self, addr: u64, words: u32, id: usize) {
        debug!("dcma read request {:#x} x{} from cluster {}", addr, words, id);
        match self.mode() {
            DcmaMode::Bypass => self.bypass.request_read(addr, words, id),
            _ => self.start_request(addr, words, id, true),
        }
    }

    pub fn request_dma_write_transfer(&mut self, addr: u64, words: u32, id: usize) {
        debug!("dcma write request {:#x} x{} from cluster {}", addr, words, id);
        match self.mode() {
            DcmaMode::Bypass => self.bypass.request_write(addr, words, id),
            _ => self.start_request(addr, words, id, false),
        }
    }

    /// Poll of the cache for the current word of a request. Counts down the
    /// startup latency first and records hit/miss statistics.
    fn poll(&mut self, id: usize, is_read: bool) -> bool {
        let request = &mut self.base.state.requests[id];
        if request.latency > 0 {
            request.latency -= 1;
            return false;
        }
        let addr = request.current_addr();
        let outcome = if !self.cache.is_hit(addr) {
            AccessOutcome::Miss
        } else if self.cache.is_access_ready(addr) {
            AccessOutcome::Hit
        } else {
            AccessOutcome::HitButBusy
        };
        self.stats.record_poll(id, is_read, outcome);
        let ready = outcome == AccessOutcome::Hit;
        let request = &mut self.base.state.requests[id];
        if request.is_new_access {
            request.is_new_access = false;
            self.stats.record_access(is_read, ready);
        }
        ready
    }

    pub fn is_read_data_available(&mut self, id: usize) -> bool {
        match self.mode() {
            DcmaMode::Bypass => self.bypass.is_data_ready(id),
            DcmaMode::Ideal => true,
            DcmaMode::Realistic => self.poll(id, true),
        }
    }

    pub fn is_write_data_ready(&mut self, id: usize) -> bool {
        match self.mode() {
            DcmaMode::Bypass => self.bypass.is_data_ready(id),
            DcmaMode::Ideal => true,
            DcmaMode::Realistic => self.poll(id, false),
        }
    }

    fn advance(&mut self, id: usize) {
        let request = &mut self.state_mut().requests[id];
        request.iter += 1;
        if request.iter == request.words {
            request.done = true;
        }
        request.is_new_access = true;
    }

    pub fn read_data(&mut self, id: usize) -> Result<[u8; WORD_BYTES], anyhow::Error> {
        let addr = self.state().requests[id].current_addr();
        let data = match self.mode() {
            DcmaMode::Bypass => return self.bypass.read_data(id),
            DcmaMode::Ideal => {
                let mut data = [0u8; WORD_BYTES];
                self.bus.dbg_read_bytes(addr, &mut data)?;
                data
            }
            DcmaMode::Realistic => self.cache.dma_read_data_hit(addr)?,
        };
        self.advance(id);
        Ok(data)
    }

    pub fn write_data(&mut self, id: usize, data: [u8; WORD_BYTES]) -> Result<(), anyhow::Error> {
        let addr = self.state().requests[id].current_addr();
        match self.mode() {
            DcmaMode::Bypass => return self.bypass.write_data(id, data),
            DcmaMode::Ideal => self.bus.dbg_write_bytes(addr, &data)?,
            DcmaMode::Realistic => self.cache.dma_write_data_hit(addr, data)?,
        }
        self.advance(id);
        Ok(())
    }

    /// Whether the channel of cluster `id` still has an open request.
    pub fn is_busy_for(&self, id: usize) -> bool {
        match self.mode() {
            DcmaMode::Bypass => self.bypass.is_busy(),
            _ => !self.state().requests[id].done,
        }
    }

    pub fn is_busy(&self) -> bool {
        match self.mode() {
            DcmaMode::Bypass => self.bypass.is_busy(),
            _ => self.cache.is_busy(),
        }
    }

    /// Write back every dirty line. DMA transfers should be drained first.
    pub fn flush(&mut self) {
        self.cache.flush();
    }

    pub fn tick(&mut self) -> Result<(), anyhow::Error> {
        self.tick_one();
        if self.mode() == DcmaMode::Bypass {
            self.bypass.tick(self.bus.as_mut())?;
        } else {
            if !self.cache.is_busy() {
                let id = self.state().next_miss;
                let request = self.state().requests[id];
                let addr = request.current_addr();
                if !request.done && !self.cache.is_hit(addr) {
                    self.cache.dma_request_download_cache_line(addr);
                }
                let clusters = self.state().requests.len();
                self.state_mut().next_miss = (id + 1) % clusters;
            }
            self.cache.tick(self.bus.as_mut(), &mut self.stats)?;
        }
        let busy = self.is_busy();
        self.stats.end_cycle(busy);
        Ok(())
    }
}
