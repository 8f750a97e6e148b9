use std::sync::Arc;

use crate::arch_state::ArchitectureState;
use crate::builtin::fifo::{ChainFifo, ChainWord};
use crate::command::{AddrField, VproCommand};
use crate::isa::{SrcSel, VproKind, CHAIN_TARGET_STAGE};
use crate::sim::config::VproConfig;
use crate::sim::stats::VproStats;
use crate::unit::fabric::{ChainFabric, LaneRef};
use crate::unit::VectorUnit;

struct Bench {
    unit: VectorUnit,
    fabric: ChainFabric,
    arch: ArchitectureState,
    stats: VproStats,
}

impl Bench {
    fn new() -> Self {
        let config = Arc::new(VproConfig {
            lm_size: 64,
            rf_size: 32,
            check_vector_length: false,
            ..VproConfig::default()
        });
        let fabric = ChainFabric::new(1, config.lanes);
        Bench {
            unit: VectorUnit::new(config, 0, 0),
            fabric,
            arch: ArchitectureState::default(),
            stats: VproStats::default(),
        }
    }

    fn cycle(&mut self) {
        self.unit.tick(&mut self.fabric, &self.arch, &mut self.stats).unwrap();
        self.unit.update(&mut self.fabric, &mut self.stats).unwrap();
    }

    fn drain(&mut self) {
        let mut cycles = 0;
        while self.unit.is_busy() {
            self.cycle();
            cycles += 1;
            assert!(cycles < 200, "unit never went idle");
        }
    }
}

fn add(src1: AddrField, imm: u32, x_end: u32) -> VproCommand {
    let mut cmd = VproCommand {
        fu_sel: 1,
        func: 0,
        id_mask: 1,
        src1,
        src2: AddrField::new(SrcSel::Imm, 0, 0, 0, imm),
        dst: AddrField::new(SrcSel::Addr, 0, 1, 0, 0),
        x_end,
        ..VproCommand::default()
    };
    cmd.update_type(2);
    cmd
}

#[test]
fn chained_operand_stalls_until_data_arrives() {
    let mut bench = Bench::new();
    assert!(bench.unit.try_send(add(AddrField::new(SrcSel::Ls, 0, 0, 0, 0), 1, 0)));

    let mut cycles = 0;
    loop {
        bench.cycle();
        let lane = bench.unit.lane(0).unwrap();
        if lane.stalls().src {
            assert_eq!(lane.pipeline().stage(CHAIN_TARGET_STAGE).cmd.kind, VproKind::Add);
            break;
        }
        cycles += 1;
        assert!(cycles < 20, "lane never waited for chained data");
    }
    // nothing moves while the FIFO stays empty
    for _ in 0..5 {
        bench.cycle();
    }
    assert!(bench.unit.lane(0).unwrap().stalls().src);
    assert!(bench.stats.src_stall_cycles >= 6);

    let ls = bench.fabric.ls_of(0);
    bench.fabric.fifo_mut(ls).push(ChainWord::new(41, false, false));
    bench.fabric.fifo_mut(ls).update();
    bench.drain();

    let rf = bench.unit.lane(0).unwrap().rf().unwrap();
    assert_eq!(rf.read(0).unwrap(), 42);
    assert!(bench.fabric.fifo(ls).is_empty());
    assert_eq!(bench.stats.commands.get("ADD"), Some(&1));
}

#[test]
fn full_output_fifo_stalls_the_producer() {
    let mut bench = Bench::new();
    let mut cmd = add(AddrField::new(SrcSel::Imm, 0, 0, 0, 5), 2, 9);
    cmd.is_chain = true;
    assert!(bench.unit.try_send(cmd));

    for _ in 0..40 {
        bench.cycle();
    }
    let out = bench.fabric.fifo(LaneRef { unit: 0, lane: 0 });
    assert_eq!(out.len(), ChainFifo::DEPTH);
    assert!(bench.unit.lane(0).unwrap().stalls().dst);
    assert!(bench.unit.is_busy());
}

#[test]
fn lanes_without_their_bit_never_fetch() {
    let mut bench = Bench::new();
    let mut cmd = add(AddrField::new(SrcSel::Imm, 0, 0, 0, 3), 4, 0);
    cmd.id_mask = 0b10;
    assert!(bench.unit.try_send(cmd));
    bench.drain();

    assert_eq!(bench.unit.lane(1).unwrap().rf().unwrap().read(0).unwrap(), 7);
    assert_eq!(bench.unit.lane(0).unwrap().rf().unwrap().read(0).unwrap(), 0);
    assert_eq!(bench.unit.queued(), 0);
}

#[test]
fn chained_lanes_run_in_lockstep_after_first_result() {
    let mut bench = Bench::new();
    let mut producer = add(AddrField::new(SrcSel::Imm, 0, 0, 0, 100), 0, 9);
    producer.is_chain = true;
    let mut consumer = add(AddrField::new(SrcSel::Left, 0, 0, 0, 0), 1, 9);
    consumer.id_mask = 0b10;
    assert!(bench.unit.try_send(producer));
    assert!(bench.unit.try_send(consumer));

    // the consumer issues one cycle after the producer and reads at stage 4;
    // the first chained word leaves the producer's last stage in cycle 12
    let mut stalled = Vec::new();
    let mut cycles = 0;
    while bench.unit.is_busy() {
        bench.cycle();
        cycles += 1;
        assert!(!bench.unit.lane(0).unwrap().stalls().any());
        if bench.unit.lane(1).unwrap().stalls().src {
            stalled.push(cycles);
        }
        assert!(cycles < 100, "chained lanes never drained");
    }
    assert_eq!(stalled, (8..=12).collect::<Vec<_>>());
    assert_eq!(bench.stats.src_stall_cycles, 5);
    assert_eq!(cycles, 27);

    let lane0 = bench.unit.lane(0).unwrap().rf().unwrap();
    let lane1 = bench.unit.lane(1).unwrap().rf().unwrap();
    for x in 0..10 {
        assert_eq!(lane0.read(x).unwrap(), 100);
        assert_eq!(lane1.read(x).unwrap(), 101);
    }
    assert!(bench.fabric.fifo(LaneRef { unit: 0, lane: 0 }).is_empty());
    assert_eq!(bench.stats.commands.get("ADD"), Some(&2));
}

#[test]
fn address_stall_lets_older_elements_write_back() {
    let mut bench = Bench::new();
    assert!(bench.unit.try_send(add(AddrField::new(SrcSel::Imm, 0, 0, 0, 10), 1, 3)));
    // offsets come from the load/store lane, which never produces any
    let mut waiting = add(AddrField::new(SrcSel::IndirectLs, 0, 0, 0, 0), 0, 3);
    waiting.dst = AddrField::new(SrcSel::Addr, 8, 1, 0, 0);
    assert!(bench.unit.try_send(waiting));

    for _ in 0..30 {
        bench.cycle();
    }
    let lane = bench.unit.lane(0).unwrap();
    assert!(lane.stalls().adr);
    assert_eq!(lane.pipeline().stage(2).cmd.src1.sel, SrcSel::IndirectLs);
    let rf = lane.rf().unwrap();
    for x in 0..4 {
        assert_eq!(rf.read(x).unwrap(), 11);
        assert_eq!(rf.read(8 + x).unwrap(), 0);
    }
    assert!(bench.stats.adr_stall_cycles > 10);
    assert!(bench.unit.is_busy());
}
