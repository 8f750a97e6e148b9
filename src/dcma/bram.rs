use crate::base::mem::HasMemory;
use crate::sim::config::DcmaConfig;
use crate::sim::flat_mem::FlatMemory;

/// One RAM bank of the cache. Addressed in DMA words; a DCMA row spans
/// `DCMA_WORD_BYTES / DMA_WORD_BYTES` consecutive words of one bank.
#[derive(Debug)]
pub struct BankedMemory {
    storage: FlatMemory,
    accesses: usize,
}

pub const WORD_BYTES: usize = DcmaConfig::DMA_WORD_BYTES;
const ACCESSES_PER_ROW: usize = DcmaConfig::DCMA_WORD_BYTES / DcmaConfig::DMA_WORD_BYTES;

impl BankedMemory {
    pub fn new(size_bytes: usize) -> Self {
        Self {
            storage: FlatMemory::new_with_size(size_bytes),
            accesses: 0,
        }
    }

    pub fn read(&self, addr: usize) -> Result<[u8; WORD_BYTES], anyhow::Error> {
        self.storage.read_n::<WORD_BYTES>(addr * WORD_BYTES)
    }

    pub fn write(&mut self, addr: usize, data: [u8; WORD_BYTES]) -> Result<(), anyhow::Error> {
        self.storage.write_n(addr * WORD_BYTES, data)
    }

    pub fn set_accessed(&mut self, accessed: bool) {
        if accessed {
            self.accesses += 1;
        } else {
            self.accesses = 0;
        }
    }

    /// the port served a whole row this tick
    pub fn accessed(&self) -> bool {
        self.accesses >= ACCESSES_PER_ROW
    }
}

#[cfg(test)]
mod tests {
    use super::BankedMemory;

    #[test]
    fn port_saturates_after_a_row() {
        let mut bank = BankedMemory::new(64);
        bank.write(3, [0x34, 0x12]).unwrap();
        assert_eq!(bank.read(3).unwrap(), [0x34, 0x12]);
        assert!(bank.read(32).is_err());
        for _ in 0..7 {
            bank.set_accessed(true);
        }
        assert!(!bank.accessed());
        bank.set_accessed(true);
        assert!(bank.accessed());
        bank.set_accessed(false);
        assert!(!bank.accessed());
    }
}
