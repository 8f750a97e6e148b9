use crate::base::mem::HasMemory;

/// Flat byte vector backing the simulated main memory. Relies on lazy
/// allocation within the OS for large sizes.
#[derive(Debug, Clone)]
pub struct FlatMemory {
    bytes: Vec<u8>,
}

impl HasMemory for FlatMemory {
    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn read_impl(&self, addr: usize, n: usize) -> &[u8] {
        &self.bytes[addr..addr + n]
    }

    fn write_impl(&mut self, addr: usize, data: &[u8]) {
        self.bytes[addr..addr + data.len()].copy_from_slice(data);
    }
}

impl FlatMemory {
    pub fn new_with_size(size: usize) -> Self {
        Self { bytes: vec![0u8; size] }
    }

    pub fn fill(&mut self, addr: usize, value: u8, len: usize) -> Result<(), anyhow::Error> {
        self.write(addr, &vec![value; len])
    }
}

#[cfg(test)]
mod tests {
    use super::FlatMemory;
    use crate::base::mem::HasMemory;

    #[test]
    fn out_of_range_access_is_rejected() {
        let mut mem = FlatMemory::new_with_size(64);
        assert!(mem.write(60, &[1, 2, 3, 4]).is_ok());
        assert!(mem.write(62, &[1, 2, 3, 4]).is_err());
        assert_eq!(mem.read_n::<2>(62).unwrap(), [3, 4]);
        assert!(mem.read(64, 1).is_err());
    }

    #[test]
    fn fill_sets_every_byte() {
        let mut mem = FlatMemory::new_with_size(16);
        mem.fill(4, 0xab, 8).unwrap();
        assert_eq!(mem.read(3, 10).unwrap(), &[0, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0]);
    }
}
