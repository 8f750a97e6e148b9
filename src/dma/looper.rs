//! Expands a loop descriptor plus the base descriptor following it into a
//! sequence of DMA commands, one per control cycle.

use anyhow::bail;
use log::{debug, warn};

use crate::command::DmaCommand;
use crate::dma::wire::{Descriptor, DmaDescriptor, LoopDescriptor, RawDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LooperState {
    #[default]
    Idle,
    WaitForBase,
    Looping,
}

/// Sign extension of the 13-bit local memory increment.
pub fn signext13(value: i16) -> i16 {
    if value & 0x1000 != 0 {
        value | 0xe000u16 as i16
    } else {
        value & 0x1fff
    }
}

fn shift_mask(mask: u32, incr: i8) -> u32 {
    if incr >= 0 {
        mask.checked_shl(incr as u32).unwrap_or(0)
    } else {
        mask.checked_shr(incr.unsigned_abs() as u32).unwrap_or(0)
    }
}

#[derive(Debug, Default)]
pub struct DmaLooper {
    units: usize,
    state: LooperState,
    busy: bool,
    input: Option<RawDescriptor>,
    base: DmaDescriptor,
    dma_loop: LoopDescriptor,
    base_lm_addr: u32,
    base_unit_mask: u32,
    mm_addr: u32,
    lm_addr: u32,
    unit_mask: u32,
    cluster_mask: u32,
    cluster: u32,
    unit: u32,
    inter_unit: u32,
    generated: u32,
    total_generated: u64,
}

impl DmaLooper {
    /// `units` is the number of units per cluster used to expand unit masks.
    pub fn new(units: usize) -> Self {
        Self {
            units,
            ..Self::default()
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn state(&self) -> LooperState {
        self.state
    }

    pub fn total_generated(&self) -> u64 {
        self.total_generated
    }

    pub fn new_descriptor(&mut self, raw: RawDescriptor) {
        if let Some(pending) = &self.input {
            warn!(
                "dma looper input overwritten before it was consumed (pending {:?})",
                Descriptor::unpack(pending)
            );
        }
        debug!("dma looper input {:?}", Descriptor::unpack(&raw));
        self.input = Some(raw);
    }

    fn finish(&mut self) {
        self.total_generated += self.generated as u64;
        self.state = LooperState::Idle;
        self.busy = false;
    }

    fn step_counters(&mut self) {
        let lp = self.dma_loop;
        let inner = self.inter_unit < lp.inter_unit_loop_len as u32;
        if inner {
            self.inter_unit += 1;
            self.lm_addr = self
                .lm_addr
                .wrapping_add_signed(signext13(lp.lm_incr) as i32);
        } else if self.unit < lp.unit_loop_len as u32 {
            self.unit += 1;
            self.inter_unit = 0;
            self.lm_addr = self.base_lm_addr;
            self.unit_mask = shift_mask(self.unit_mask, lp.unit_loop_shift_incr);
        } else {
            self.cluster += 1;
            self.unit = 0;
            self.inter_unit = 0;
            self.lm_addr = self.base_lm_addr;
            self.unit_mask = self.base_unit_mask;
            self.cluster_mask = shift_mask(self.cluster_mask, lp.cluster_loop_shift_incr);
        }
    }

    /// One control-domain cycle. Returns the command generated this cycle.
    pub fn tick(&mut self) -> Result<Option<DmaCommand>, anyhow::Error> {
        if self.state == LooperState::Looping {
            self.busy = true;
            let lp = self.dma_loop;
            if self.cluster <= lp.cluster_loop_len as u32 {
                self.step_counters();
            } else if self.generated != lp.dma_cmd_count as u32 {
                self.finish();
                bail!(
                    "dma looper ran out of iterations after {} of {} commands",
                    self.generated,
                    lp.dma_cmd_count
                );
            }
            self.mm_addr = self.mm_addr.wrapping_add_signed(lp.mm_incr);
            self.base.mm_addr = self.mm_addr;
            self.base.lm_addr = self.lm_addr;
            self.base.unit_mask = self.unit_mask;
            self.base.cluster = self.cluster_mask;
            self.generated += 1;

            let last = self.generated == lp.dma_cmd_count as u32
                || (self.cluster == lp.cluster_loop_len as u32
                    && self.unit == lp.unit_loop_len as u32
                    && self.inter_unit == lp.inter_unit_loop_len as u32);
            if last {
                self.finish();
            }
            return self.base.to_command(self.units).map(Some);
        }

        let Some(raw) = self.input.take() else {
            return Ok(None);
        };
        self.busy = true;
        if self.state == LooperState::WaitForBase {
            let base = DmaDescriptor::unpack(&raw)?;
            self.base = base;
            self.state = LooperState::Looping;
            self.base_lm_addr = base.lm_addr;
            self.base_unit_mask = base.unit_mask;
            self.cluster_mask = base.cluster;
            self.unit_mask = base.unit_mask;
            self.lm_addr = base.lm_addr;
            self.mm_addr = base.mm_addr;
            self.cluster = 0;
            self.unit = 0;
            self.inter_unit = 0;
            self.generated = 1;
            return base.to_command(self.units).map(Some);
        }

        self.busy = false;
        match Descriptor::unpack(&raw)? {
            Descriptor::Loop(lp) => {
                self.dma_loop = lp;
                self.state = LooperState::WaitForBase;
                Ok(None)
            }
            Descriptor::Dma(dma) => dma.to_command(self.units).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{shift_mask, signext13};

    #[test]
    fn thirteen_bit_increment_sign_extends() {
        assert_eq!(signext13(0x0010), 16);
        assert_eq!(signext13(0x1ff0), -16);
        assert_eq!(signext13(0x2001), 1);
    }

    #[test]
    fn negative_increment_shifts_right() {
        assert_eq!(shift_mask(0b100, -2), 0b1);
        assert_eq!(shift_mask(0b1, 3), 0b1000);
        assert_eq!(shift_mask(1, 40), 0);
    }
}
