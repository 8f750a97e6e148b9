use anyhow::bail;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bus::BusSlave;
use crate::dcma::bram::{BankedMemory, WORD_BYTES};
use crate::sim::config::{DcmaConfig, ReplacementPolicy};
use crate::sim::stats::DcmaStats;

/// The cache talks to the bus as a single initiator.
const BUS_INITIATOR: usize = 0;

#[derive(Debug, Clone, Copy)]
struct LineTransfer {
    /// line aligned main memory address being filled
    addr: u64,
    line: usize,
    tag: u64,
    waiting_for_bus: bool,
    waiting_for_wdata: bool,
    done: bool,
}

impl Default for LineTransfer {
    fn default() -> Self {
        Self {
            addr: 0,
            line: 0,
            tag: 0,
            waiting_for_bus: false,
            waiting_for_wdata: false,
            done: true,
        }
    }
}

/// Set-associative, write-back, write-allocate cache over banked RAM. Lines
/// are indexed `set * associativity + way`. One line transfer is in flight at
/// a time.
#[derive(Debug)]
pub struct Cache {
    line_size: usize,
    associativity: usize,
    nr_lines: usize,
    nr_brams: usize,
    word_bits: u32,
    word_select_bits: u32,
    set_bits: u32,
    policy: ReplacementPolicy,
    banks: Vec<BankedMemory>,
    tags: Vec<u64>,
    valid: Vec<bool>,
    dirty: Vec<bool>,
    fifo_next: Vec<usize>,
    /// LRU age or LFU use count per line
    usage: Vec<u32>,
    rng: StdRng,
    transfer: LineTransfer,
    buffer: Vec<u8>,
    burst_wait: u32,
    flushing: bool,
    flush_last: bool,
    flush_cursor: usize,
    flush_line: Option<usize>,
}

impl Cache {
    pub fn new(config: &DcmaConfig) -> Self {
        config.ensure_valid();
        let nr_lines = config.nr_lines();
        let sets = config.sets();
        Self {
            line_size: config.line_size,
            associativity: config.associativity,
            nr_lines,
            nr_brams: config.nr_brams,
            word_bits: WORD_BYTES.trailing_zeros(),
            word_select_bits: (config.line_size / WORD_BYTES).trailing_zeros(),
            set_bits: sets.trailing_zeros(),
            policy: config.replacement_policy,
            banks: (0..config.nr_brams)
                .map(|_| BankedMemory::new(config.bram_size))
                .collect(),
            tags: vec![0; nr_lines],
            valid: vec![false; nr_lines],
            dirty: vec![false; nr_lines],
            fifo_next: vec![0; sets],
            usage: vec![0; nr_lines],
            rng: StdRng::seed_from_u64(config.random_seed),
            transfer: LineTransfer::default(),
            buffer: vec![0; config.line_size],
            burst_wait: 0,
            flushing: false,
            flush_last: false,
            flush_cursor: 0,
            flush_line: None,
        }
    }

    /// (tag, set, word) of a main memory byte address
    pub fn split(&self, addr: u64) -> (u64, usize, usize) {
        let word = (addr >> self.word_bits) & ((1 << self.word_select_bits) - 1);
        let set = (addr >> (self.word_select_bits + self.word_bits)) & ((1 << self.set_bits) - 1);
        let tag = addr >> (self.set_bits + self.word_select_bits + self.word_bits);
        (tag, set as usize, word as usize)
    }

    /// cache byte address of a word within a line
    pub fn merge(&self, line: usize, word: usize) -> usize {
        ((line << self.word_select_bits) + word) << self.word_bits
    }

    pub fn bank_index(&self, cache_addr: usize) -> usize {
        (cache_addr / DcmaConfig::DCMA_WORD_BYTES) % self.nr_brams
    }

    pub fn bank_addr(&self, cache_addr: usize) -> usize {
        let per_row = DcmaConfig::DCMA_WORD_BYTES / WORD_BYTES;
        (cache_addr / DcmaConfig::DCMA_WORD_BYTES) / self.nr_brams * per_row
            + (cache_addr / WORD_BYTES) % per_row
    }

    fn line_aligned(&self, addr: u64) -> u64 {
        addr & !(self.line_size as u64 - 1)
    }

    /// main memory address a line was filled from
    fn line_ext_addr(&self, line: usize) -> u64 {
        let set = (line / self.associativity) as u64;
        set * self.line_size as u64
            + (self.tags[line] << (self.word_bits + self.word_select_bits + self.set_bits))
    }

    fn burst(&self) -> u32 {
        (self.line_size / DcmaConfig::BUS_WORD_BYTES) as u32
    }

    fn find_way(&self, addr: u64) -> Option<usize> {
        let (tag, set, _) = self.split(addr);
        let set_offset = set * self.associativity;
        (set_offset..set_offset + self.associativity)
            .find(|&line| self.valid[line] && self.tags[line] == tag)
    }

    /// Tags of the valid ways of `set`.
    pub fn resident_tags(&self, set: usize) -> Vec<u64> {
        let set_offset = set * self.associativity;
        (set_offset..set_offset + self.associativity)
            .filter(|&line| self.valid[line])
            .map(|line| self.tags[line])
            .collect()
    }

    pub fn is_dirty(&self, addr: u64) -> bool {
        self.find_way(addr).is_some_and(|line| self.dirty[line])
    }

    pub fn is_hit(&self, addr: u64) -> bool {
        self.find_way(addr).is_some()
    }

    /// Hit and the bank holding the word has port capacity left this tick.
    pub fn is_access_ready(&self, addr: u64) -> bool {
        match self.find_way(addr) {
            Some(line) => {
                let (_, _, word) = self.split(addr);
                let bank = self.bank_index(self.merge(line, word));
                !self.banks[bank].accessed()
            }
            None => false,
        }
    }

    fn touch(&mut self, line: usize) {
        let set_offset = line / self.associativity * self.associativity;
        match self.policy {
            ReplacementPolicy::Lru => {
                for i in set_offset..set_offset + self.associativity {
                    if i == line {
                        self.usage[i] = 0;
                    } else {
                        self.usage[i] += 1;
                    }
                }
            }
            ReplacementPolicy::Lfu => self.usage[line] += 1,
            ReplacementPolicy::Fifo | ReplacementPolicy::Random => {}
        }
    }

    fn hit_location(&self, addr: u64) -> Result<(usize, usize, usize), anyhow::Error> {
        let Some(line) = self.find_way(addr) else {
            bail!("cache access to {:#x} without a hit", addr);
        };
        let (_, _, word) = self.split(addr);
        let cache_addr = self.merge(line, word);
        Ok((line, self.bank_index(cache_addr), self.bank_addr(cache_addr)))
    }

    pub fn dma_read_data_hit(&mut self, addr: u64) -> Result<[u8; WORD_BYTES], anyhow::Error> {
        let (line, bank, bank_addr) = self.hit_location(addr)?;
        let data = self.banks[bank].read(bank_addr)?;
        self.banks[bank].set_accessed(true);
        self.touch(line);
        Ok(data)
    }

    pub fn dma_write_data_hit(&mut self, addr: u64, data: [u8; WORD_BYTES]) -> Result<(), anyhow::Error> {
        let (line, bank, bank_addr) = self.hit_location(addr)?;
        self.banks[bank].write(bank_addr, data)?;
        self.banks[bank].set_accessed(true);
        self.dirty[line] = true;
        self.touch(line);
        Ok(())
    }

    /// Way to evict in `set`: an invalid one if present, else per policy.
    pub fn replace_line(&mut self, set: usize) -> usize {
        let set_offset = set * self.associativity;
        let ways = set_offset..set_offset + self.associativity;
        if let Some(line) = ways.clone().find(|&line| !self.valid[line]) {
            return line;
        }
        match self.policy {
            ReplacementPolicy::Fifo => {
                let way = self.fifo_next[set];
                self.fifo_next[set] = (way + 1) % self.associativity;
                set_offset + way
            }
            ReplacementPolicy::Lru => {
                let mut victim = set_offset;
                for line in ways {
                    if self.usage[line] > self.usage[victim] {
                        victim = line;
                    }
                }
                self.touch(victim);
                victim
            }
            ReplacementPolicy::Lfu => {
                let mut victim = set_offset;
                for line in ways {
                    if self.usage[line] < self.usage[victim] {
                        victim = line;
                    }
                }
                self.usage[victim] = 0;
                victim
            }
            ReplacementPolicy::Random => set_offset + self.rng.gen_range(0..self.associativity),
        }
    }

    /// Start filling the line that holds `addr`.
    pub fn dma_request_download_cache_line(&mut self, addr: u64) {
        self.transfer = LineTransfer {
            addr: self.line_aligned(addr),
            done: false,
            ..LineTransfer::default()
        };
    }

    pub fn is_busy(&self) -> bool {
        !self.transfer.done
    }

    pub fn flush(&mut self) {
        self.flush_cursor = 0;
        self.flushing = true;
        self.flush_last = false;
        self.transfer.done = false;
    }

    /// Drop all contents and any line transfer in flight without writing
    /// anything back.
    pub fn reset(&mut self) {
        self.tags.fill(0);
        self.valid.fill(false);
        self.dirty.fill(false);
        self.fifo_next.fill(0);
        self.usage.fill(0);
        self.transfer = LineTransfer::default();
        self.burst_wait = 0;
        self.flushing = false;
        self.flush_last = false;
        self.flush_cursor = 0;
        self.flush_line = None;
    }

    fn line_to_buffer(&mut self, line: usize) -> Result<(), anyhow::Error> {
        let base = self.merge(line, 0);
        for i in (0..self.line_size).step_by(WORD_BYTES) {
            let bank = self.bank_index(base + i);
            let addr = self.bank_addr(base + i);
            let word = self.banks[bank].read(addr)?;
            self.buffer[i..i + WORD_BYTES].copy_from_slice(&word);
        }
        Ok(())
    }

    fn buffer_to_line(&mut self, line: usize) -> Result<(), anyhow::Error> {
        for i in (0..self.line_size).step_by(WORD_BYTES) {
            let cache_addr = self.merge(line, i / WORD_BYTES);
            let bank = self.bank_index(cache_addr);
            let addr = self.bank_addr(cache_addr);
            let mut word = [0u8; WORD_BYTES];
            word.copy_from_slice(&self.buffer[i..i + WORD_BYTES]);
            self.banks[bank].write(addr, word)?;
        }
        Ok(())
    }

    fn upload(&mut self, bus: &mut dyn BusSlave, line: usize) -> Result<(), anyhow::Error> {
        self.line_to_buffer(line)?;
        let addr = self.line_ext_addr(line);
        debug!("cache write back line {} to {:#x}", line, addr);
        bus.request_write_transfer(addr, &self.buffer, self.burst(), BUS_INITIATOR)?;
        self.transfer.waiting_for_wdata = true;
        self.transfer.waiting_for_bus = true;
        Ok(())
    }

    fn download(&mut self, bus: &mut dyn BusSlave) {
        debug!("cache fill line {} from {:#x}", self.transfer.line, self.transfer.addr);
        bus.request_read_transfer(self.transfer.addr, self.burst(), BUS_INITIATOR);
        self.transfer.waiting_for_bus = true;
    }

    fn tick_flush(&mut self, bus: &mut dyn BusSlave, stats: &mut DcmaStats) -> Result<(), anyhow::Error> {
        if !self.transfer.waiting_for_bus {
            let mut found = None;
            while found.is_none() && !self.flush_last {
                if self.dirty[self.flush_cursor] {
                    found = Some(self.flush_cursor);
                }
                self.flush_cursor += 1;
                if self.flush_cursor == self.nr_lines {
                    self.flush_last = true;
                    if found.is_none() {
                        self.transfer.done = true;
                        self.flushing = false;
                    }
                }
            }
            if let Some(line) = found {
                self.flush_line = Some(line);
                self.upload(bus, line)?;
            }
        } else if self.burst_wait > 0 {
            self.burst_wait -= 1;
            if self.burst_wait == 0 {
                self.transfer.waiting_for_bus = false;
                self.transfer.waiting_for_wdata = false;
                if let Some(line) = self.flush_line.take() {
                    self.dirty[line] = false;
                    self.valid[line] = false;
                }
                if self.flush_last {
                    self.flushing = false;
                    self.transfer.done = true;
                }
            }
        } else if bus.is_write_data_ready(BUS_INITIATOR) {
            self.burst_wait = self.burst();
            stats.bus_write_cycles += self.burst_wait as u64;
        }
        Ok(())
    }

    /// One controller cycle of the line transfer engine.
    pub fn tick(&mut self, bus: &mut dyn BusSlave, stats: &mut DcmaStats) -> Result<(), anyhow::Error> {
        for bank in self.banks.iter_mut() {
            bank.set_accessed(false);
        }

        if self.flushing {
            return self.tick_flush(bus, stats);
        }

        if !self.transfer.done && !self.transfer.waiting_for_bus && !self.transfer.waiting_for_wdata {
            let (tag, set, _) = self.split(self.transfer.addr);
            let line = self.replace_line(set);
            self.transfer.line = line;
            self.transfer.tag = tag;
            self.valid[line] = false;
            if self.dirty[line] {
                self.upload(bus, line)?;
            } else {
                self.download(bus);
            }
            self.dirty[line] = false;
        } else if self.transfer.waiting_for_bus {
            if self.burst_wait > 0 {
                self.burst_wait -= 1;
                if self.burst_wait == 0 {
                    if !self.transfer.waiting_for_wdata {
                        let line = self.transfer.line;
                        self.transfer.done = true;
                        self.transfer.waiting_for_bus = false;
                        self.valid[line] = true;
                        self.tags[line] = self.transfer.tag;
                    } else {
                        self.transfer.waiting_for_wdata = false;
                        self.dirty[self.transfer.line] = false;
                        self.download(bus);
                    }
                }
            } else if !self.transfer.waiting_for_wdata {
                if bus.is_read_data_available(BUS_INITIATOR) {
                    bus.read_data(&mut self.buffer, BUS_INITIATOR)?;
                    self.buffer_to_line(self.transfer.line)?;
                    self.burst_wait = self.burst();
                    stats.bus_read_cycles += self.burst_wait as u64;
                } else {
                    stats.bus_wait_cycles += 1;
                }
            } else if bus.is_write_data_ready(BUS_INITIATOR) {
                self.burst_wait = self.burst();
                stats.bus_write_cycles += self.burst_wait as u64;
            } else {
                stats.bus_wait_cycles += 1;
            }
        }
        Ok(())
    }
}
