use crate::bus::BusSlave;
use crate::dma::looper::DmaLooper;
use crate::dma::wire::{RawDescriptor, DESCRIPTOR_BYTES};

/// Streams a block of descriptors from main memory into the looper, one
/// descriptor whenever the looper is idle.
#[derive(Debug, Default)]
pub struct BlockExtractor {
    size: u32,
    addr: u64,
    /// latched upper address half, consumed by the next trigger
    high: u64,
    busy: bool,
}

impl BlockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// number of descriptors in the next block
    pub fn new_size(&mut self, size: u32) {
        self.size = size;
    }

    /// A non-zero `shift` latches the high address half; `shift == 0` adds
    /// the low half and starts streaming.
    pub fn new_addr_trigger(&mut self, addr: u32, shift: u32) {
        if shift == 0 {
            self.busy = true;
            self.addr = self.high.wrapping_add(addr as u64);
            self.high = 0;
        } else {
            self.high = (addr as u64).checked_shl(shift).unwrap_or(0);
        }
    }

    pub fn tick(&mut self, looper: &mut DmaLooper, mem: &dyn BusSlave) -> Result<(), anyhow::Error> {
        if !self.busy || looper.is_busy() {
            return Ok(());
        }
        let mut raw: RawDescriptor = [0; DESCRIPTOR_BYTES];
        mem.dbg_read_bytes(self.addr, &mut raw)?;
        looper.new_descriptor(raw);
        self.size = self.size.saturating_sub(1);
        self.addr += DESCRIPTOR_BYTES as u64;
        if self.size == 0 {
            self.busy = false;
        }
        Ok(())
    }
}
