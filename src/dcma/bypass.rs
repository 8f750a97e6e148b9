use std::collections::VecDeque;

use anyhow::bail;

use crate::bus::{BusSlave, BUS_WORD_BYTES};
use crate::sim::config::DcmaConfig;

const WORD_BYTES: usize = DcmaConfig::DMA_WORD_BYTES;

/// Bus words covering `words` DMA words starting at byte `start`.
pub fn bus_burst_len(start: u64, words: u32) -> u32 {
    let bus_word = BUS_WORD_BYTES as u64;
    let base = start / bus_word * bus_word;
    let end = (start + words as u64 * WORD_BYTES as u64) / bus_word * bus_word;
    ((end - base) / bus_word) as u32 + 1
}

#[derive(Debug, Clone, Copy)]
struct BypassRequest {
    initiator: usize,
    addr: u64,
    words: u32,
    iter: u32,
    is_read: bool,
    ready_for_dma: bool,
    waiting_for_bus: bool,
    done: bool,
}

/// Cache-less controller: requests are served strictly in arrival order, each
/// as a single aligned bus burst through a staging buffer.
#[derive(Debug, Default)]
pub struct Bypass {
    queue: VecDeque<BypassRequest>,
    current: Option<BypassRequest>,
    buffer: Vec<u8>,
    waiting_for_bus: bool,
}

impl Bypass {
    pub fn new() -> Self {
        Self::default()
    }

    fn enqueue(&mut self, initiator: usize, addr: u64, words: u32, is_read: bool) {
        self.queue.push_back(BypassRequest {
            initiator,
            addr,
            words,
            iter: 0,
            is_read,
            // writes collect DMA data before anything goes to the bus
            ready_for_dma: !is_read,
            waiting_for_bus: false,
            done: false,
        });
    }

    pub fn request_read(&mut self, addr: u64, words: u32, initiator: usize) {
        self.enqueue(initiator, addr, words, true);
    }

    pub fn request_write(&mut self, addr: u64, words: u32, initiator: usize) {
        self.enqueue(initiator, addr, words, false);
    }

    fn serving(&self, initiator: usize) -> Option<&BypassRequest> {
        self.current.as_ref().filter(|req| req.initiator == initiator && !req.done)
    }

    pub fn is_data_ready(&self, initiator: usize) -> bool {
        self.serving(initiator).is_some_and(|req| req.ready_for_dma)
    }

    fn dma_slot(&mut self, initiator: usize) -> Result<(&mut BypassRequest, usize), anyhow::Error> {
        let Some(req) = self.current.as_mut().filter(|req| req.initiator == initiator) else {
            bail!("bypass access by initiator {} which is not being served", initiator);
        };
        if !req.ready_for_dma {
            bail!("bypass access by initiator {} before data is ready", initiator);
        }
        let offset = req.iter as usize * WORD_BYTES + (req.addr % BUS_WORD_BYTES as u64) as usize;
        Ok((req, offset))
    }

    pub fn read_data(&mut self, initiator: usize) -> Result<[u8; WORD_BYTES], anyhow::Error> {
        let (req, offset) = self.dma_slot(initiator)?;
        req.iter += 1;
        if req.iter == req.words {
            req.done = true;
            req.ready_for_dma = false;
        }
        let mut word = [0u8; WORD_BYTES];
        word.copy_from_slice(&self.buffer[offset..offset + WORD_BYTES]);
        Ok(word)
    }

    pub fn write_data(&mut self, initiator: usize, data: [u8; WORD_BYTES]) -> Result<(), anyhow::Error> {
        let (req, offset) = self.dma_slot(initiator)?;
        req.iter += 1;
        if req.iter == req.words {
            req.ready_for_dma = false;
            self.waiting_for_bus = true;
        }
        self.buffer[offset..offset + WORD_BYTES].copy_from_slice(&data);
        Ok(())
    }

    pub fn is_busy(&self) -> bool {
        self.waiting_for_bus || !self.queue.is_empty()
    }

    pub fn tick(&mut self, bus: &mut dyn BusSlave) -> Result<(), anyhow::Error> {
        let idle = self.current.map_or(true, |req| req.done);
        if idle {
            if let Some(req) = self.queue.pop_front() {
                let bus_words = bus_burst_len(req.addr, req.words);
                self.buffer = vec![0; bus_words as usize * BUS_WORD_BYTES];
                if req.is_read {
                    self.waiting_for_bus = true;
                } else {
                    // no byte enables on the bus: start from the current memory contents
                    let base = req.addr / BUS_WORD_BYTES as u64 * BUS_WORD_BYTES as u64;
                    bus.dbg_read_bytes(base, &mut self.buffer)?;
                }
                self.current = Some(req);
            }
        }

        let Some(req) = self.current.as_mut() else {
            return Ok(());
        };
        if req.done {
            return Ok(());
        }
        if req.waiting_for_bus {
            if req.is_read {
                if bus.is_read_data_available(req.initiator) {
                    bus.read_data(&mut self.buffer, req.initiator)?;
                    req.waiting_for_bus = false;
                    req.ready_for_dma = true;
                    self.waiting_for_bus = false;
                }
            } else if bus.is_write_data_ready(req.initiator) {
                req.waiting_for_bus = false;
                req.done = true;
                self.waiting_for_bus = false;
            }
        } else if !req.ready_for_dma {
            let bus_words = bus_burst_len(req.addr, req.words);
            let base = req.addr / BUS_WORD_BYTES as u64 * BUS_WORD_BYTES as u64;
            let accepted = if req.is_read {
                bus.request_read_transfer(base, bus_words, req.initiator)
            } else {
                bus.request_write_transfer(base, &self.buffer, bus_words, req.initiator)?
            };
            req.waiting_for_bus = accepted;
            self.waiting_for_bus = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::bus_burst_len;

    #[test]
    fn burst_covers_straddled_words() {
        assert_eq!(bus_burst_len(0, 32), 2);
        assert_eq!(bus_burst_len(0, 31), 1);
        assert_eq!(bus_burst_len(62, 1), 2);
        assert_eq!(bus_burst_len(128, 4), 1);
    }
}
