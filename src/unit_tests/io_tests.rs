use std::sync::Arc;

use crate::bus::BusSlave;
use crate::command::{AddrField, DmaKind, VproCommand, PAD_TOP};
use crate::command_proc::{addr, gp, CommandProcessor, DmaCmdRegister, VproCmdRegister};
use crate::isa::{MacInitSource, SrcSel, VproKind};
use crate::sim::config::VproConfig;

use super::small_top;

fn gp_addr(index: usize) -> u32 {
    addr::GP_REGISTERS + 4 * index as u32
}

#[test]
fn trigger_2d_decodes_register_fields() {
    let mut cproc = CommandProcessor::new(Arc::new(VproConfig::default()));
    // src1: RF address, offset 5, alpha 1, beta 2, x_end 7
    assert!(cproc
        .write_vpro(addr::VPRO_SRC1, (5 << 19) | (1 << 13) | (2 << 7) | (7 << 1))
        .is_none());
    // src2: immediate 3, y_end 1, blocking
    assert!(cproc
        .write_vpro(addr::VPRO_SRC2, (1 << 29) | (3 << 7) | (1 << 1) | 1)
        .is_none());
    // dst offset 10, alpha 1, beta 8, ALU add, lane 0, flag update
    let dst = (10 << 22) | (1 << 16) | (8 << 10) | (0b01_0000 << 4) | (1 << 1) | 1;
    let cmd = cproc.write_vpro(addr::VPRO_DST_TRIGGER_2D, dst).unwrap();

    assert_eq!(cmd.kind, VproKind::Add);
    assert_eq!((cmd.x_end, cmd.y_end, cmd.z_end), (7, 1, 0));
    assert!(cmd.blocking && !cmd.is_chain && cmd.flag_update);
    assert_eq!(cmd.id_mask, 1);
    assert_eq!(cmd.src1.sel, SrcSel::Addr);
    assert_eq!((cmd.src1.offset, cmd.src1.alpha, cmd.src1.beta, cmd.src1.gamma), (5, 1, 2, 0));
    assert_eq!(cmd.src2.sel, SrcSel::Imm);
    assert_eq!(cmd.src2.imm(), 3);
    assert_eq!((cmd.dst.offset, cmd.dst.alpha, cmd.dst.beta), (10, 1, 8));
}

#[test]
fn trigger_3d_adds_gamma_and_z() {
    let mut cproc = CommandProcessor::new(Arc::new(VproConfig::default()));
    cproc.write_vpro(addr::VPRO_SRC1, 1 << 13);
    cproc.write_vpro(addr::VPRO_SRC2, (1 << 29) | (9 << 7));
    assert!(cproc
        .write_vpro(addr::VPRO_DST_3D, (1 << 16) | (0b01_0001 << 4) | (1 << 2))
        .is_none());
    let trigger = (2 << 26) | (3 << 20) | (4 << 14) | 17;
    let cmd = cproc.write_vpro(addr::VPRO_TRIGGER_3D, trigger).unwrap();

    assert_eq!(cmd.kind, VproKind::Sub);
    assert_eq!(cmd.id_mask, 0b10);
    assert_eq!(cmd.z_end, 17);
    assert_eq!((cmd.dst.gamma, cmd.src1.gamma, cmd.src2.gamma), (2, 3, 4));
    assert_eq!(cmd.dst.sel, SrcSel::Addr);
    // a 3D immediate keeps its fields
    assert_eq!(cmd.src2.beta, 9);
}

fn vpro_command(fu_sel: u32, func: u32, id_mask: u32, f: impl FnOnce(&mut VproCommand)) -> VproCommand {
    let mut cmd = VproCommand {
        fu_sel,
        func,
        id_mask,
        ..VproCommand::default()
    };
    f(&mut cmd);
    cmd.update_type(VproConfig::default().ls_lane());
    cmd
}

#[test]
fn commands_survive_register_encoding() {
    let commands = [
        vpro_command(1, 0b0000, 0b011, |c| {
            c.is_chain = true;
            c.src1 = AddrField::new(SrcSel::Addr, 17, 1, 8, 2);
            c.src2 = AddrField::new(SrcSel::Left, 0, 0, 0, 0);
            c.dst = AddrField::new(SrcSel::Addr, 900, 63, 5, 40);
            c.x_end = 63;
            c.y_end = 2;
            c.z_end = 1023;
        }),
        vpro_command(1, 0b0111, 0b010, |c| {
            c.blocking = true;
            c.flag_update = true;
            c.src1 = AddrField::new(SrcSel::IndirectRight, 3, 0, 1, 0);
            c.src2 = AddrField::new(SrcSel::Imm, 2, 7, 9, 11);
            c.dst = AddrField::new(SrcSel::Addr, 0, 1, 0, 0);
            c.x_end = 5;
        }),
        vpro_command(0, 0b0010, 0, |c| {
            c.src1 = AddrField::new(SrcSel::Addr, 64, 1, 16, 0);
            c.src2 = AddrField::new(SrcSel::Imm, 0, 0, 0, 4);
            c.x_end = 15;
            c.y_end = 3;
        }),
        vpro_command(0, 0b1000, 0, |c| {
            c.src1 = AddrField::new(SrcSel::Addr, 0, 1, 0, 0);
            c.src2 = AddrField::new(SrcSel::Imm, 0, 0, 0, 0);
            c.dst = AddrField::new(SrcSel::Left, 0, 0, 0, 1);
            c.x_end = 7;
        }),
        vpro_command(3, 0b0010, 0b001, |c| {
            c.src1 = AddrField::new(SrcSel::Ls, 0, 0, 0, 0);
            c.src2 = AddrField::new(SrcSel::IndirectLs, 1, 2, 3, 4);
            c.dst = AddrField::new(SrcSel::Right, 8, 1, 0, 0);
        }),
    ];
    let expected_kinds = [VproKind::Add, VproKind::MacH, VproKind::LoadS, VproKind::Store, VproKind::MvMi];

    let mut cproc = CommandProcessor::new(Arc::new(VproConfig::default()));
    for (cmd, kind) in commands.iter().zip(expected_kinds) {
        assert_eq!(cmd.kind, kind);
        let writes = VproCmdRegister::encode(cmd);
        let (last, setup) = writes.split_last().unwrap();
        for &(a, v) in setup {
            assert!(cproc.write_vpro(a, v).is_none());
        }
        let decoded = cproc.write_vpro(last.0, last.1).unwrap();
        assert_eq!(&decoded, cmd);
    }
}

#[test]
fn dma_registers_build_a_2d_transfer() {
    let mut reg = DmaCmdRegister::default();
    let writes = [
        (addr::IDMA_CLUSTER_MASK, 0b1),
        (addr::IDMA_UNIT_MASK, 0b101),
        (addr::IDMA_LOC, 0x40),
        (addr::IDMA_X_SIZE, 8),
        (addr::IDMA_Y_SIZE, 3),
        (addr::IDMA_STRIDE, 5),
        (addr::IDMA_PAD, 1 << PAD_TOP),
        (addr::IDMA_EXT_E2L + 1, 0x1),
    ];
    for (a, v) in writes {
        assert_eq!(reg.write(a, v, 4).unwrap(), None);
    }
    let cmd = reg.write(addr::IDMA_EXT_E2L, 0x200, 4).unwrap().unwrap();
    assert_eq!(cmd.kind, DmaKind::Ext2dToLoc1d);
    assert_eq!(cmd.units.as_slice(), &[0, 2]);
    assert_eq!(cmd.ext_base, 0x1_0000_0200);
    assert_eq!((cmd.loc_base, cmd.x_size, cmd.y_size, cmd.y_leap), (0x40, 8, 3, 5));
    assert!(cmd.pad[PAD_TOP]);
    assert!(!cmd.done);

    // the cluster mask write starts a fresh command
    reg.write(addr::IDMA_CLUSTER_MASK, 0b1, 4).unwrap();
    let cmd = reg.write(addr::IDMA_EXT_L2E, 0x80, 4).unwrap().unwrap();
    assert_eq!(cmd.kind, DmaKind::Loc1dToExt1d);
    assert_eq!(cmd.ext_base, 0x80);
    assert_eq!(cmd.pad, [false; 4]);
}

#[test]
fn gp_registers_describe_the_machine() {
    let mut top = small_top(2, 3);
    assert_eq!(top.io_read(gp_addr(gp::MAGIC)).unwrap(), gp::MAGIC_VALUE);
    assert_eq!(top.io_read(gp_addr(gp::CLUSTERS)).unwrap(), 2);
    assert_eq!(top.io_read(gp_addr(gp::UNITS)).unwrap(), 3);
    assert_eq!(top.io_read(gp_addr(gp::LANES)).unwrap(), 2);
    assert_eq!(top.io_read(gp_addr(gp::DCMA_LINE_SIZE)).unwrap(), 1024);
    assert_eq!(top.io_read(gp_addr(gp::DCMA_ASSOC_LOG2)).unwrap(), 1);
    assert_eq!(top.io_read(gp_addr(gp::DCMA_OFF)).unwrap(), 0);
    // 2500 ps period
    assert_eq!(top.io_read(gp_addr(gp::VPRO_FREQ)).unwrap(), 400_000_000);

    top.io_write(gp_addr(20), 0xdead_beef).unwrap();
    assert_eq!(top.io_read(gp_addr(20)).unwrap(), 0xdead_beef);
    // configuration words are read only
    top.io_write(gp_addr(gp::MAGIC), 0).unwrap();
    assert_eq!(top.io_read(gp_addr(gp::MAGIC)).unwrap(), gp::MAGIC_VALUE);
}

#[test]
fn architecture_registers_read_back() {
    let mut top = small_top(1, 1);
    top.io_write(addr::MAC_INIT_SOURCE, MacInitSource::Addr as u32).unwrap();
    // unknown encodings are ignored
    top.io_write(addr::MAC_INIT_SOURCE, 0b111).unwrap();
    assert_eq!(top.io_read(addr::MAC_INIT_SOURCE).unwrap(), 0b011);

    top.io_write(addr::MUL_SHIFT, 12).unwrap();
    assert_eq!(top.io_read(addr::MUL_SHIFT).unwrap(), 12);
    top.io_write(addr::UNIT_MASK, 0b1).unwrap();
    assert_eq!(top.io_read(addr::UNIT_MASK).unwrap(), 0b1);

    for sink in [addr::DEBUG_FIFO, addr::DEV_NULL, 0xffff_ff00] {
        top.io_write(sink, 5).unwrap();
        assert_eq!(top.io_read(sink).unwrap(), 0);
    }
}

#[test]
fn aux_counters_reset_on_write() {
    let mut top = small_top(1, 1);
    let cycles = top.config().clock.risc_io_access_cycles as u32;
    for _ in 0..4 {
        top.io_read(addr::AUX_VPRO_TOTAL).unwrap();
    }
    assert_eq!(top.io_read(addr::AUX_VPRO_TOTAL).unwrap(), 5 * cycles);

    top.io_write(addr::AUX_VPRO_TOTAL, 0).unwrap();
    assert_eq!(top.io_read(addr::AUX_VPRO_TOTAL).unwrap(), cycles);
    assert_eq!(top.io_read(addr::AUX_LANE_ACT).unwrap(), 0);
}

#[test]
fn sync_registers_track_dma_activity() {
    let mut top = small_top(2, 1);
    top.bus_mut().dbg_write_bytes(0x4000, &[0x11; 256]).unwrap();
    top.io_write(addr::IDMA_CLUSTER_MASK, 0b10).unwrap();
    top.io_write(addr::IDMA_UNIT_MASK, 0b1).unwrap();
    top.io_write(addr::IDMA_X_SIZE, 128).unwrap();
    top.io_write(addr::IDMA_EXT_E2L, 0x4000).unwrap();

    assert_eq!(top.io_read(addr::SYNC_DMA).unwrap(), 0b10);
    // no cluster selected for masked sync yet
    assert_eq!(top.io_read(addr::BUSY_MASKED_DMA).unwrap(), 0);
    top.io_write(addr::SYNC_CLUSTER_MASK, 0b11).unwrap();
    assert_eq!(top.io_read(addr::BUSY_MASKED_DMA).unwrap(), 0b10);

    top.wait_until_idle().unwrap();
    assert_eq!(top.io_read(addr::SYNC).unwrap(), 0);
    assert_eq!(top.cluster(1).unwrap().unit(0).unwrap().lm_word(127).unwrap(), 0x1111);
    assert_eq!(top.cluster(0).unwrap().unit(0).unwrap().lm_word(0).unwrap(), 0);
}
