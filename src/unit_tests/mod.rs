#[cfg(test)]
mod cache_tests;
#[cfg(test)]
mod dcma_tests;
#[cfg(test)]
mod dma_tests;
#[cfg(test)]
mod io_tests;
#[cfg(test)]
mod lane_tests;
#[cfg(test)]
mod memory_tests;

#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
use crate::sim::config::{DcmaConfig, MemConfig, VproConfig};
#[cfg(test)]
use crate::sim::top::{VproTop, VproTopConfig};

/// A machine small enough for unit tests: 1 MiB of memory, 32 KiB of cache.
#[cfg(test)]
pub(crate) fn small_top(clusters: usize, units: usize) -> VproTop {
    let config = VproTopConfig {
        vpro: VproConfig {
            clusters,
            units,
            lm_size: 1024,
            rf_size: 64,
            check_vector_length: false,
            ..VproConfig::default()
        },
        dcma: DcmaConfig {
            line_size: 1024,
            associativity: 2,
            nr_brams: 2,
            bram_size: 16384,
            ..DcmaConfig::default()
        },
        mem: MemConfig {
            size: 1 << 20,
            ..MemConfig::default()
        },
        ..VproTopConfig::default()
    };
    VproTop::new(Arc::new(config))
}
