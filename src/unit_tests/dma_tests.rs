use std::sync::Arc;

use smallvec::smallvec;

use crate::arch_state::ArchitectureState;
use crate::bus::{BusSlave, MainMemory};
use crate::command::{DmaCommand, DmaKind, PAD_TOP};
use crate::dcma::Dcma;
use crate::dma::DmaEngine;
use crate::sim::config::{DcmaConfig, DcmaMode, MemConfig, VproConfig};
use crate::sim::stats::DmaStats;
use crate::unit::VectorUnit;

struct Bench {
    dma: DmaEngine,
    dcma: Dcma,
    units: Vec<VectorUnit>,
    arch: ArchitectureState,
    stats: DmaStats,
}

impl Bench {
    fn new(mode: DcmaMode) -> Self {
        let vpro = Arc::new(VproConfig {
            units: 2,
            lm_size: 64,
            rf_size: 16,
            ..VproConfig::default()
        });
        let dcma_config = DcmaConfig {
            line_size: 64,
            associativity: 2,
            nr_brams: 1,
            bram_size: 512,
            mode,
            ..DcmaConfig::default()
        };
        let mem = MainMemory::new(Arc::new(MemConfig {
            size: 4096,
            read_latency: 5,
            write_latency: 3,
        }));
        let mut dcma = Dcma::new(Arc::new(dcma_config), 1, Box::new(mem));
        // element i of main memory holds i
        let image = (0..256u16).flat_map(u16::to_le_bytes).collect::<Vec<_>>();
        dcma.bus_mut().dbg_write_bytes(0, &image).unwrap();
        Bench {
            dma: DmaEngine::new(0),
            dcma,
            units: (0..2).map(|u| VectorUnit::new(Arc::clone(&vpro), 0, u)).collect(),
            arch: ArchitectureState::default(),
            stats: DmaStats::default(),
        }
    }

    fn run(&mut self, cmd: DmaCommand) {
        self.dma.execute_cmd(cmd).unwrap();
        let mut ticks = 0;
        while self.dma.is_busy(&self.dcma) {
            self.dma
                .tick(&mut self.dcma, &mut self.units, &self.arch, &mut self.stats)
                .unwrap();
            self.dcma.tick().unwrap();
            self.dcma.bus_mut().tick();
            ticks += 1;
            assert!(ticks < 10_000, "dma command never finished");
        }
    }

    fn lm(&self, unit: usize, range: std::ops::Range<u32>) -> Vec<u16> {
        range.map(|a| self.units[unit].lm_word(a).unwrap()).collect()
    }
}

fn e2l_2d(x_size: u32, y_size: u32, y_leap: i32) -> DmaCommand {
    DmaCommand {
        kind: DmaKind::Ext2dToLoc1d,
        cluster_mask: 1,
        units: smallvec![0],
        x_size,
        y_size,
        y_leap,
        done: false,
        ..DmaCommand::default()
    }
}

#[test]
fn rows_follow_y_leap_in_every_mode() {
    for mode in [DcmaMode::Ideal, DcmaMode::Realistic, DcmaMode::Bypass] {
        let mut bench = Bench::new(mode);
        bench.run(e2l_2d(4, 3, 3));
        assert_eq!(
            bench.lm(0, 0..12),
            vec![0, 1, 2, 3, 6, 7, 8, 9, 12, 13, 14, 15],
            "{:?}",
            mode
        );
        assert_eq!(bench.stats.words_read, 12);
        assert_eq!(bench.stats.commands.get("e2l_2d"), Some(&1));
    }
}

#[test]
fn top_padding_skips_the_bus() {
    let mut bench = Bench::new(DcmaMode::Realistic);
    bench.arch.dma_pad_top = 2;
    bench.arch.dma_pad_value = 0xbeef;
    let mut cmd = e2l_2d(4, 4, 1);
    cmd.pad[PAD_TOP] = true;
    bench.run(cmd);

    assert_eq!(bench.lm(0, 0..8), vec![0xbeef; 8]);
    assert_eq!(bench.lm(0, 8..16), vec![0, 1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(bench.stats.padded_words, 8);
    assert_eq!(bench.stats.words_read, 8);
}

#[test]
fn load_broadcasts_to_every_listed_unit() {
    let mut bench = Bench::new(DcmaMode::Ideal);
    let cmd = DmaCommand {
        kind: DmaKind::Ext1dToLoc1d,
        units: smallvec![0, 1],
        ext_base: 0x20,
        loc_base: 4,
        x_size: 6,
        y_size: 1,
        done: false,
        ..DmaCommand::default()
    };
    bench.run(cmd);
    for unit in 0..2 {
        assert_eq!(bench.lm(unit, 4..10), vec![16, 17, 18, 19, 20, 21]);
    }
}

#[test]
fn store_writes_local_memory_out() {
    let mut bench = Bench::new(DcmaMode::Realistic);
    for a in 0..4u32 {
        bench.units[1].write_lm(a, (0x100 + a as u16).to_le_bytes()).unwrap();
    }
    let cmd = DmaCommand {
        kind: DmaKind::Loc1dToExt1d,
        units: smallvec![1],
        ext_base: 0x400,
        x_size: 4,
        y_size: 1,
        done: false,
        ..DmaCommand::default()
    };
    bench.run(cmd);
    assert_eq!(bench.stats.words_written, 4);

    bench.dcma.flush();
    while bench.dcma.is_busy() {
        bench.dcma.tick().unwrap();
        bench.dcma.bus_mut().tick();
    }
    let mut out = [0u8; 8];
    bench.dcma.bus().dbg_read_bytes(0x400, &mut out).unwrap();
    assert_eq!(out, [0x00, 0x01, 0x01, 0x01, 0x02, 0x01, 0x03, 0x01]);
}

#[test]
fn empty_transfer_is_fatal() {
    let mut dma = DmaEngine::new(0);
    assert!(dma.execute_cmd(e2l_2d(0, 4, 1)).is_err());
    assert!(dma.execute_cmd(e2l_2d(4, 0, 1)).is_err());
    assert!(dma.execute_cmd(e2l_2d(4, 4, 1)).is_ok());
    assert_eq!(dma.queued(), 1);
}
