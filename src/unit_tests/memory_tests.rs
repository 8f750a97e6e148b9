use std::sync::Arc;

use crate::bus::{BusSlave, MainMemory, BUS_WORD_BYTES};
use crate::sim::config::MemConfig;

fn memory(read_latency: u64, write_latency: u64) -> MainMemory {
    MainMemory::new(Arc::new(MemConfig {
        size: 4096,
        read_latency,
        write_latency,
    }))
}

#[test]
fn read_data_arrives_after_latency() {
    let mut mem = memory(36, 6);
    mem.dbg_write_bytes(64, &[0xab; BUS_WORD_BYTES]).unwrap();
    assert!(mem.request_read_transfer(64, 1, 3));

    let mut ticks = 0;
    while !mem.is_read_data_available(3) {
        mem.tick();
        ticks += 1;
        assert!(ticks < 100, "read never completed");
    }
    assert_eq!(ticks, 37);
    assert!(!mem.is_read_data_available(0));

    let mut buf = [0u8; BUS_WORD_BYTES];
    mem.read_data(&mut buf, 3).unwrap();
    assert!(buf.iter().all(|&b| b == 0xab));
    assert!(!mem.is_read_data_available(3));
}

#[test]
fn write_lands_before_acknowledge() {
    let mut mem = memory(36, 6);
    let data = [7u8; 2 * BUS_WORD_BYTES];
    assert!(mem.request_write_transfer(128, &data, 2, 0).unwrap());
    assert_eq!(mem.dbg_read(128 + 2 * BUS_WORD_BYTES as u64 - 1).unwrap(), 7);
    assert!(!mem.is_write_data_ready(0));

    for _ in 0..7 {
        mem.tick();
    }
    assert!(mem.is_write_data_ready(0));
    // acknowledged writes are retired
    assert!(!mem.is_write_data_ready(0));
}

#[test]
fn out_of_range_access_is_fatal() {
    let mut mem = memory(1, 1);
    assert!(mem.dbg_read(4096).is_err());
    assert!(mem.dbg_write(5000, 1).is_err());
    let data = [0u8; BUS_WORD_BYTES];
    assert!(mem.request_write_transfer(4096 - 32, &data, 1, 0).is_err());
}
