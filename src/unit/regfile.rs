use anyhow::bail;
use log::warn;

use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::isa::u24;

/// Staged write applied on the next `update`.
#[derive(Debug, Clone, Copy)]
struct Pending<T> {
    addr: usize,
    value: T,
}

#[derive(Debug, Default)]
pub struct RegFileState {
    data: Vec<u32>,
    zero: Vec<bool>,
    negative: Vec<bool>,
    initialized: Vec<bool>,
    next_data: Option<Pending<u32>>,
    next_flags: [Option<Pending<bool>>; 2],
}

/// 24-bit register file of one processing lane with zero/negative flags.
#[derive(Debug, Default)]
pub struct RegFile {
    base: ModuleBase<RegFileState, ()>,
    /// (cluster, unit, lane), for diagnostics
    owner: (usize, usize, usize),
}

impl ModuleBehaviors for RegFile {
    fn tick_one(&mut self) {}

    fn reset(&mut self) {
        let size = self.size();
        let state = self.state_mut();
        state.data = vec![0; size];
        state.zero = vec![false; size];
        state.negative = vec![false; size];
        state.initialized = vec![false; size];
        state.next_data = None;
        state.next_flags = [None; 2];
    }
}

module!(RegFile, RegFileState, (),);

pub const ZERO_FLAG: usize = 0;
pub const NEGATIVE_FLAG: usize = 1;

impl RegFile {
    pub fn new(size: usize, owner: (usize, usize, usize)) -> Self {
        let mut rf = RegFile {
            base: ModuleBase::default(),
            owner,
        };
        rf.state_mut().data = vec![0; size];
        rf.reset();
        rf
    }

    pub fn size(&self) -> usize {
        self.state().data.len()
    }

    fn check(&self, addr: usize) -> Result<(), anyhow::Error> {
        if addr >= self.size() {
            let (c, u, l) = self.owner;
            bail!(
                "register file access out of range (C{}U{}L{}, addr {}, size {})",
                c,
                u,
                l,
                addr,
                self.size()
            );
        }
        Ok(())
    }

    pub fn read(&self, addr: usize) -> Result<u32, anyhow::Error> {
        self.check(addr)?;
        if !self.state().initialized[addr] {
            let (c, u, l) = self.owner;
            warn!("uninitialized register read (C{}U{}L{}, addr {})", c, u, l, addr);
        }
        Ok(self.state().data[addr])
    }

    pub fn flag(&self, addr: usize, select: usize) -> Result<bool, anyhow::Error> {
        self.check(addr)?;
        Ok(match select {
            ZERO_FLAG => self.state().zero[addr],
            _ => self.state().negative[addr],
        })
    }

    /// Immediate write, used when loading register contents from outside.
    pub fn write(&mut self, addr: usize, value: u32) -> Result<(), anyhow::Error> {
        self.check(addr)?;
        let state = self.state_mut();
        state.data[addr] = u24(value);
        state.initialized[addr] = true;
        Ok(())
    }

    pub fn set_data_next(&mut self, addr: usize, value: u32) {
        if self.state().next_data.is_some() {
            warn!("register file: staged value overridden");
        }
        self.state_mut().next_data = Some(Pending { addr, value });
    }

    pub fn set_flag_next(&mut self, addr: usize, select: usize, value: bool) {
        let slot = &mut self.state_mut().next_flags[select.min(1)];
        if slot.is_some() {
            warn!("register file: staged flag {} overridden", select);
        }
        *slot = Some(Pending { addr, value });
    }

    pub fn update(&mut self) -> Result<(), anyhow::Error> {
        if let Some(Pending { addr, value }) = self.state_mut().next_data.take() {
            self.write(addr, value)?;
        }
        for select in [ZERO_FLAG, NEGATIVE_FLAG] {
            if let Some(Pending { addr, value }) = self.state_mut().next_flags[select].take() {
                self.check(addr)?;
                let state = self.state_mut();
                match select {
                    ZERO_FLAG => state.zero[addr] = value,
                    _ => state.negative[addr] = value,
                }
            }
        }
        Ok(())
    }

    /// Raw 24-bit contents, for dumps.
    pub fn values(&self) -> &[u32] {
        &self.state().data
    }
}
