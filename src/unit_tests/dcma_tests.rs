use std::sync::Arc;

use crate::bus::MainMemory;
use crate::dcma::{Dcma, READ_STARTUP_LATENCY};
use crate::sim::config::{DcmaConfig, DcmaMode, MemConfig, ReplacementPolicy};

fn controller(mode: DcmaMode) -> Dcma {
    let config = DcmaConfig {
        line_size: 64,
        associativity: 2,
        nr_brams: 1,
        bram_size: 256,
        replacement_policy: ReplacementPolicy::Lru,
        mode,
        ..DcmaConfig::default()
    };
    let mem = MainMemory::new(Arc::new(MemConfig {
        size: 8192,
        read_latency: 8,
        write_latency: 4,
    }));
    Dcma::new(Arc::new(config), 2, Box::new(mem))
}

fn tick(dcma: &mut Dcma) {
    dcma.tick().unwrap();
    dcma.bus_mut().tick();
}

/// Read `words` DMA words for cluster `id`, polling once per controller tick.
fn read(dcma: &mut Dcma, addr: u64, words: u32, id: usize) -> Vec<u8> {
    dcma.request_dma_read_transfer(addr, words, id);
    let mut out = Vec::new();
    let mut ticks = 0;
    while out.len() < words as usize * 2 {
        if dcma.is_read_data_available(id) {
            out.extend(dcma.read_data(id).unwrap());
        }
        tick(dcma);
        ticks += 1;
        assert!(ticks < 5000, "read of {:#x} never finished", addr);
    }
    out
}

fn write(dcma: &mut Dcma, addr: u64, data: &[[u8; 2]], id: usize) {
    dcma.request_dma_write_transfer(addr, data.len() as u32, id);
    let mut next = 0;
    let mut ticks = 0;
    while next < data.len() || dcma.is_busy_for(id) {
        if next < data.len() && dcma.is_write_data_ready(id) {
            dcma.write_data(id, data[next]).unwrap();
            next += 1;
        }
        tick(dcma);
        ticks += 1;
        assert!(ticks < 5000, "write to {:#x} never finished", addr);
    }
    assert_eq!(next, data.len());
}

fn drain(dcma: &mut Dcma) {
    let mut ticks = 0;
    while dcma.is_busy() {
        tick(dcma);
        ticks += 1;
        assert!(ticks < 5000, "controller never went idle");
    }
}

#[test]
fn read_hits_after_fill() {
    let mut dcma = controller(DcmaMode::Realistic);
    dcma.bus_mut().dbg_write_bytes(0x40, &[1, 0, 2, 0, 3, 0, 4, 0]).unwrap();

    assert_eq!(read(&mut dcma, 0x40, 4, 0), vec![1, 0, 2, 0, 3, 0, 4, 0]);
    assert!(dcma.cache().is_hit(0x40));
    let misses = dcma.stats.read_miss_accesses;
    assert!(misses >= 1);

    assert_eq!(read(&mut dcma, 0x44, 2, 1), vec![3, 0, 4, 0]);
    assert_eq!(dcma.stats.read_miss_accesses, misses);
    assert!(dcma.stats.read_hit_accesses >= 5);
    assert!(dcma.stats.per_cluster[1].read_hit > 0);
}

#[test]
fn startup_latency_delays_first_word() {
    let mut dcma = controller(DcmaMode::Ideal);
    dcma.request_dma_read_transfer(0, 1, 0);
    // ideal mode serves every poll
    assert!(dcma.is_read_data_available(0));
    let mut dcma_real = controller(DcmaMode::Realistic);
    dcma_real.request_dma_read_transfer(0, 1, 0);
    for _ in 0..READ_STARTUP_LATENCY {
        assert!(!dcma_real.is_read_data_available(0));
    }
}

#[test]
fn flush_writes_dirty_data_back() {
    let mut dcma = controller(DcmaMode::Realistic);
    write(&mut dcma, 0x100, &[[0xaa, 0x01], [0xbb, 0x02]], 0);
    drain(&mut dcma);
    // write-back: main memory still holds the old contents
    assert_eq!(dcma.bus().dbg_read(0x100).unwrap(), 0);
    assert!(dcma.cache().is_dirty(0x100));

    dcma.flush();
    assert!(dcma.is_busy());
    drain(&mut dcma);
    let mut back = [0u8; 4];
    dcma.bus().dbg_read_bytes(0x100, &mut back).unwrap();
    assert_eq!(back, [0xaa, 0x01, 0xbb, 0x02]);
    assert!(!dcma.cache().is_hit(0x100));
}

#[test]
fn bypass_serves_requests_in_order() {
    let mut dcma = controller(DcmaMode::Bypass);
    dcma.bus_mut().dbg_write_bytes(0x7e, &[9, 0, 8, 0]).unwrap();
    assert_eq!(read(&mut dcma, 0x7e, 2, 1), vec![9, 0, 8, 0]);

    write(&mut dcma, 0x200, &[[5, 6]], 0);
    drain(&mut dcma);
    assert_eq!(dcma.bus().dbg_read(0x201).unwrap(), 6);
}

#[test]
fn ideal_mode_goes_through_debug_port() {
    let mut dcma = controller(DcmaMode::Ideal);
    dcma.bus_mut().dbg_write_bytes(0x10, &[4, 3]).unwrap();
    assert_eq!(read(&mut dcma, 0x10, 1, 0), vec![4, 3]);
    write(&mut dcma, 0x12, &[[7, 7]], 0);
    assert_eq!(dcma.bus().dbg_read(0x13).unwrap(), 7);
}
