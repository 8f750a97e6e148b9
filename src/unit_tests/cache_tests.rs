use std::sync::Arc;

use crate::bus::{BusSlave, MainMemory};
use crate::dcma::cache::Cache;
use crate::sim::config::{DcmaConfig, MemConfig, ReplacementPolicy};
use crate::sim::stats::DcmaStats;

// 2 sets of 2 ways, 64-byte lines: addresses 128 bytes apart share a set
fn small_config(policy: ReplacementPolicy) -> DcmaConfig {
    DcmaConfig {
        line_size: 64,
        associativity: 2,
        nr_brams: 1,
        bram_size: 256,
        replacement_policy: policy,
        ..DcmaConfig::default()
    }
}

fn memory() -> MainMemory {
    MainMemory::new(Arc::new(MemConfig {
        size: 4096,
        read_latency: 4,
        write_latency: 2,
    }))
}

fn run_transfer(cache: &mut Cache, mem: &mut MainMemory, stats: &mut DcmaStats) {
    let mut ticks = 0;
    while cache.is_busy() {
        cache.tick(mem, stats).unwrap();
        mem.tick();
        ticks += 1;
        assert!(ticks < 1000, "line transfer never finished");
    }
}

/// Read one word, filling its line first on a miss.
fn access(cache: &mut Cache, mem: &mut MainMemory, stats: &mut DcmaStats, addr: u64) -> [u8; 2] {
    if !cache.is_hit(addr) {
        cache.dma_request_download_cache_line(addr);
        run_transfer(cache, mem, stats);
    }
    assert!(cache.is_hit(addr));
    cache.dma_read_data_hit(addr).unwrap()
}

#[test]
fn address_split_round_trips() {
    let cache = Cache::new(&small_config(ReplacementPolicy::Lru));
    let (tag, set, word) = cache.split(0x1c6);
    assert_eq!((tag, set, word), (3, 1, 3));
    assert_eq!(cache.merge(set * 2, word), 0x86);
}

#[test]
fn no_duplicate_tags_within_a_set() {
    let mut cache = Cache::new(&small_config(ReplacementPolicy::Fifo));
    let mut mem = memory();
    let mut stats = DcmaStats::new(1);
    for addr in [0u64, 128, 0, 256, 128, 0, 384, 256, 64, 192, 64] {
        access(&mut cache, &mut mem, &mut stats, addr);
        for set in 0..2 {
            let mut tags = cache.resident_tags(set);
            let n = tags.len();
            tags.sort_unstable();
            tags.dedup();
            assert_eq!(tags.len(), n, "set {} holds a tag twice after {:#x}", set, addr);
        }
    }
}

#[test]
fn lines_up_to_associativity_stay_resident() {
    let mut cache = Cache::new(&small_config(ReplacementPolicy::Random));
    let mut mem = memory();
    let mut stats = DcmaStats::new(1);
    for _ in 0..4 {
        for addr in [0u64, 128] {
            access(&mut cache, &mut mem, &mut stats, addr);
        }
    }
    assert!(cache.is_hit(0) && cache.is_hit(128));
    assert_eq!(cache.resident_tags(0).len(), 2);
    // the other set was never touched
    assert!(cache.resident_tags(1).is_empty());
}

#[test]
fn lru_evicts_least_recently_used() {
    let mut cache = Cache::new(&small_config(ReplacementPolicy::Lru));
    let mut mem = memory();
    let mut stats = DcmaStats::new(1);
    let (a, b, c) = (0u64, 128, 256);
    for addr in [a, b, a, c] {
        access(&mut cache, &mut mem, &mut stats, addr);
    }
    assert!(cache.is_hit(a));
    assert!(!cache.is_hit(b));
    assert!(cache.is_hit(c));
}

#[test]
fn fill_copies_memory_contents() {
    let mut cache = Cache::new(&small_config(ReplacementPolicy::Lru));
    let mut mem = memory();
    let mut stats = DcmaStats::new(1);
    mem.dbg_write_bytes(0x140, &[0x11, 0x22, 0x33, 0x44]).unwrap();
    assert_eq!(access(&mut cache, &mut mem, &mut stats, 0x142), [0x33, 0x44]);
    assert_eq!(cache.dma_read_data_hit(0x140).unwrap(), [0x11, 0x22]);
    assert!(stats.bus_read_cycles > 0);
}

#[test]
fn dirty_victim_is_written_back() {
    let mut cache = Cache::new(&small_config(ReplacementPolicy::Fifo));
    let mut mem = memory();
    let mut stats = DcmaStats::new(1);
    access(&mut cache, &mut mem, &mut stats, 0);
    cache.dma_write_data_hit(2, [0xbe, 0xef]).unwrap();
    assert!(cache.is_dirty(0));
    assert_eq!(mem.dbg_read(2).unwrap(), 0);

    access(&mut cache, &mut mem, &mut stats, 128);
    access(&mut cache, &mut mem, &mut stats, 256);
    assert!(!cache.is_hit(0));
    assert_eq!(mem.dbg_read(2).unwrap(), 0xbe);
    assert_eq!(mem.dbg_read(3).unwrap(), 0xef);
}

#[test]
fn reset_drops_contents() {
    let mut cache = Cache::new(&small_config(ReplacementPolicy::Lfu));
    let mut mem = memory();
    let mut stats = DcmaStats::new(1);
    access(&mut cache, &mut mem, &mut stats, 64);
    cache.reset();
    assert!(!cache.is_hit(64));
}

#[test]
fn reset_abandons_line_in_flight() {
    let mut cache = Cache::new(&small_config(ReplacementPolicy::Fifo));
    let mut mem = memory();
    let mut stats = DcmaStats::new(1);
    mem.dbg_write_bytes(0x40, &[0x5a, 0xa5]).unwrap();
    cache.dma_request_download_cache_line(0x40);
    for _ in 0..3 {
        cache.tick(&mut mem, &mut stats).unwrap();
        mem.tick();
    }
    assert!(cache.is_busy());

    cache.reset();
    assert!(!cache.is_busy());
    for _ in 0..20 {
        cache.tick(&mut mem, &mut stats).unwrap();
        mem.tick();
    }
    assert!(!cache.is_busy());
    assert!(!cache.is_hit(0x40));

    assert_eq!(access(&mut cache, &mut mem, &mut stats, 0x40), [0x5a, 0xa5]);
}
