use anyhow::bail;

/// Trait for byte-addressed simulated memories (main memory, local memories).
pub trait HasMemory {
    fn size(&self) -> usize;
    fn read_impl(&self, addr: usize, n: usize) -> &[u8];
    fn write_impl(&mut self, addr: usize, data: &[u8]);

    fn read(&self, addr: usize, n: usize) -> Result<&[u8], anyhow::Error> {
        if addr.checked_add(n).map_or(true, |end| end > self.size()) {
            bail!("memory read of size {} @ {:#010x} out of range (size {:#x})", n, addr, self.size());
        }
        Ok(self.read_impl(addr, n))
    }

    fn read_n<const N: usize>(&self, addr: usize) -> Result<[u8; N], anyhow::Error> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read(addr, N)?);
        Ok(out)
    }

    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), anyhow::Error> {
        let n = data.len();
        if addr.checked_add(n).map_or(true, |end| end > self.size()) {
            bail!("memory write of size {} @ {:#010x} out of range (size {:#x})", n, addr, self.size());
        }
        self.write_impl(addr, data);
        Ok(())
    }

    fn write_n<const N: usize>(&mut self, addr: usize, data: [u8; N]) -> Result<(), anyhow::Error> {
        self.write(addr, data.as_slice())
    }
}
