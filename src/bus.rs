use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, ensure};
use log::debug;

use crate::base::behavior::*;
use crate::base::mem::HasMemory;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::sim::config::MemConfig;
use crate::sim::flat_mem::FlatMemory;
use crate::timeq::Ticket;

/// Bytes moved per burst beat on the bus.
pub const BUS_WORD_BYTES: usize = 64;

/// Non-blocking bus contract between the memory controller and main memory.
/// Each initiator has at most one read and one write in flight; burst lengths
/// are counted in bus words.
pub trait BusSlave {
    fn request_read_transfer(&mut self, addr: u64, burst: u32, initiator: usize) -> bool;
    fn is_read_data_available(&self, initiator: usize) -> bool;
    /// Copy `burst * 64` bytes of a completed read into `buf` and retire it.
    fn read_data(&mut self, buf: &mut [u8], initiator: usize) -> Result<(), anyhow::Error>;
    fn request_write_transfer(
        &mut self,
        addr: u64,
        data: &[u8],
        burst: u32,
        initiator: usize,
    ) -> Result<bool, anyhow::Error>;
    /// Polls and retires a completed write.
    fn is_write_data_ready(&mut self, initiator: usize) -> bool;
    fn dbg_read(&self, addr: u64) -> Result<u8, anyhow::Error>;
    fn dbg_write(&mut self, addr: u64, byte: u8) -> Result<(), anyhow::Error>;
    fn tick(&mut self);

    fn dbg_read_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<(), anyhow::Error> {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.dbg_read(addr + i as u64)?;
        }
        Ok(())
    }

    fn dbg_write_bytes(&mut self, addr: u64, data: &[u8]) -> Result<(), anyhow::Error> {
        for (i, byte) in data.iter().enumerate() {
            self.dbg_write(addr + i as u64, *byte)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Transfer {
    addr: u64,
    burst: u32,
    ticket: Ticket,
}

#[derive(Debug)]
pub struct MainMemoryState {
    storage: FlatMemory,
    reads: HashMap<usize, Transfer>,
    writes: HashMap<usize, Transfer>,
}

impl Default for MainMemoryState {
    fn default() -> Self {
        Self {
            storage: FlatMemory::new_with_size(0),
            reads: HashMap::new(),
            writes: HashMap::new(),
        }
    }
}

/// Fixed-latency backing store. Write data lands immediately; the write
/// acknowledgement and read data become visible after the configured latency.
#[derive(Debug)]
pub struct MainMemory {
    base: ModuleBase<MainMemoryState, MemConfig>,
}

module!(MainMemory, MainMemoryState, MemConfig,);

impl ModuleBehaviors for MainMemory {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        self.state_mut().reads.clear();
        self.state_mut().writes.clear();
    }
}

impl MainMemory {
    pub fn new(config: Arc<MemConfig>) -> Self {
        let size = config.size;
        let mut mem = MainMemory {
            base: ModuleBase::default(),
        };
        mem.init_conf(config);
        mem.state_mut().storage = FlatMemory::new_with_size(size);
        mem
    }

    pub fn storage(&self) -> &FlatMemory {
        &self.state().storage
    }

    pub fn storage_mut(&mut self) -> &mut FlatMemory {
        &mut self.state_mut().storage
    }

    fn transfer_bytes(burst: u32) -> usize {
        burst as usize * BUS_WORD_BYTES
    }
}

impl BusSlave for MainMemory {
    fn request_read_transfer(&mut self, addr: u64, burst: u32, initiator: usize) -> bool {
        // completion is flagged on the tick after the latency elapsed
        let latency = self.conf().read_latency + 1;
        let ticket = Ticket::new(self.now(), latency, Self::transfer_bytes(burst) as u32);
        debug!("main memory read {:#x} x{} for {}", addr, burst, initiator);
        self.state_mut().reads.insert(initiator, Transfer { addr, burst, ticket });
        true
    }

    fn is_read_data_available(&self, initiator: usize) -> bool {
        self.state()
            .reads
            .get(&initiator)
            .is_some_and(|t| t.ticket.is_ready(self.now()))
    }

    fn read_data(&mut self, buf: &mut [u8], initiator: usize) -> Result<(), anyhow::Error> {
        if !self.is_read_data_available(initiator) {
            bail!("main memory not ready for read data of initiator {}", initiator);
        }
        let Some(transfer) = self.state_mut().reads.remove(&initiator) else {
            bail!("no read pending for initiator {}", initiator);
        };
        let n = Self::transfer_bytes(transfer.burst);
        ensure!(buf.len() >= n, "read buffer of {} bytes for a {} byte burst", buf.len(), n);
        let data = self.state().storage.read(transfer.addr as usize, n)?;
        buf[..n].copy_from_slice(data);
        Ok(())
    }

    fn request_write_transfer(
        &mut self,
        addr: u64,
        data: &[u8],
        burst: u32,
        initiator: usize,
    ) -> Result<bool, anyhow::Error> {
        let n = Self::transfer_bytes(burst);
        ensure!(data.len() >= n, "write of {} bytes for a {} byte burst", data.len(), n);
        self.state_mut().storage.write(addr as usize, &data[..n])?;
        let latency = self.conf().write_latency + 1;
        let ticket = Ticket::new(self.now(), latency, n as u32);
        debug!("main memory write {:#x} x{} for {}", addr, burst, initiator);
        self.state_mut().writes.insert(initiator, Transfer { addr, burst, ticket });
        Ok(true)
    }

    fn is_write_data_ready(&mut self, initiator: usize) -> bool {
        let now = self.now();
        let ready = self
            .state()
            .writes
            .get(&initiator)
            .is_some_and(|t| t.ticket.is_ready(now));
        if ready {
            self.state_mut().writes.remove(&initiator);
        }
        ready
    }

    fn dbg_read(&self, addr: u64) -> Result<u8, anyhow::Error> {
        Ok(self.state().storage.read_n::<1>(addr as usize)?[0])
    }

    fn dbg_write(&mut self, addr: u64, byte: u8) -> Result<(), anyhow::Error> {
        self.state_mut().storage.write(addr as usize, &[byte])
    }

    fn tick(&mut self) {
        self.tick_one();
    }
}
