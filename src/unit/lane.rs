//! Vector lanes. A processing lane owns a register file and an ALU pipeline;
//! the load/store lane moves data between the unit's local memory and the
//! chain FIFOs.

use anyhow::{bail, Context};
use log::{error, warn};

use crate::arch_state::ArchitectureState;
use crate::base::mem::HasMemory;
use crate::builtin::fifo::ChainWord;
use crate::command::{AddrField, VproCommand};
use crate::isa::{s16, s18, s24, s8, MacInitSource, SrcSel, VproKind, CHAIN_TARGET_STAGE};
use crate::sim::config::VproConfig;
use crate::sim::flat_mem::FlatMemory;
use crate::sim::stats::VproStats;
use crate::unit::alu;
use crate::unit::fabric::{ChainFabric, LaneRef};
use crate::unit::pipeline::{Pipeline, Stage};
use crate::unit::regfile::{RegFile, NEGATIVE_FLAG, ZERO_FLAG};

/// Stage at which the load/store lane hands loaded data to its FIFO.
const LS_CHAIN_STAGE: usize = 8;
/// Stage reading the address of indirect operands.
const ADR_READ_STAGE: usize = 2;
/// Indirect offsets are 10 bits wide.
const OFFSET_MASK: u32 = 0x3ff;

/// Everything a lane touches outside itself during a tick.
pub struct LaneCtx<'a> {
    pub fabric: &'a mut ChainFabric,
    pub lm: &'a mut FlatMemory,
    pub arch: &'a ArchitectureState,
    pub config: &'a VproConfig,
    pub stats: &'a mut VproStats,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stalls {
    /// an indirect offset is not available yet
    pub adr: bool,
    /// chained input data is not available yet
    pub src: bool,
    /// own output FIFO has no room for the next chained result
    pub dst: bool,
}

impl Stalls {
    pub fn any(&self) -> bool {
        self.adr || self.src || self.dst
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct StallRuns {
    adr: u64,
    src: u64,
    dst: u64,
}

#[derive(Debug, Clone, Copy)]
struct Operand {
    value: u32,
    zero: bool,
    negative: bool,
}

impl Operand {
    fn plain(value: u32) -> Self {
        Self {
            value,
            zero: false,
            negative: false,
        }
    }
}

fn flags_of(value: u32) -> [bool; 2] {
    [value & 0x00ff_ffff == 0, (value >> 23) & 1 == 1]
}

/// Data and offset sources visible to one lane.
struct Ports<'a> {
    at: LaneRef,
    is_ls: bool,
    rf: Option<&'a RegFile>,
    fabric: &'a mut ChainFabric,
}

impl Ports<'_> {
    /// Lane whose FIFO feeds a chained operand.
    fn source(&self, field: &AddrField) -> LaneRef {
        source_lane(self.at, self.is_ls, field, &*self.fabric)
    }

    /// Lane `lane` of the own unit, addressed by a store's data operand.
    fn own_lane(&self, lane: u32) -> Result<LaneRef, anyhow::Error> {
        let lane = lane as usize;
        if lane > self.fabric.ls_lane() {
            bail!(
                "chain source lane {} does not exist (U{})",
                lane,
                self.at.unit
            );
        }
        Ok(LaneRef {
            unit: self.at.unit,
            lane,
        })
    }

    fn pop(&mut self, from: LaneRef) -> Operand {
        let word = self.fabric.fifo_mut(from).pop();
        Operand {
            value: word.value as u32,
            zero: word.zero,
            negative: word.negative,
        }
    }

    fn operand(&mut self, field: &AddrField, cmd: &VproCommand) -> Result<Operand, anyhow::Error> {
        match field.sel {
            SrcSel::Addr | SrcSel::IndirectLs | SrcSel::IndirectLeft | SrcSel::IndirectRight => {
                let Some(rf) = self.rf else {
                    bail!(
                        "load/store lane has no register file (U{}, {})",
                        self.at.unit,
                        cmd.kind.mnemonic()
                    );
                };
                let addr = field.offset.wrapping_add(field.affine(cmd.x, cmd.y, cmd.z)) as usize;
                Ok(Operand {
                    value: rf.read(addr)?,
                    zero: rf.flag(addr, ZERO_FLAG)?,
                    negative: rf.flag(addr, NEGATIVE_FLAG)?,
                })
            }
            SrcSel::Imm => {
                let imm = field.imm();
                if imm >> 24 != 0 {
                    warn!("immediate {:#x} wider than 24 bit, upper bits dropped", imm);
                }
                Ok(Operand::plain(s24(imm) as u32))
            }
            SrcSel::Ls | SrcSel::Left | SrcSel::Right => {
                let from = if self.is_ls {
                    self.own_lane(field.gamma)?
                } else {
                    self.source(field)
                };
                Ok(self.pop(from))
            }
        }
    }

    /// Replace the offsets of every operand selecting `sel` by the next
    /// chained value.
    fn update_offsets(&mut self, cmd: &mut VproCommand, sel: SrcSel) {
        let fields = [&cmd.src1, &cmd.src2, &cmd.dst];
        let Some(field) = fields.into_iter().find(|f| f.sel == sel) else {
            return;
        };
        let from = self.source(field);
        let offset = self.pop(from).value & OFFSET_MASK;
        for field in [&mut cmd.src1, &mut cmd.src2, &mut cmd.dst] {
            if field.sel == sel {
                field.offset = offset;
            }
        }
    }
}

fn source_lane(at: LaneRef, is_ls: bool, field: &AddrField, fabric: &ChainFabric) -> LaneRef {
    match field.sel {
        SrcSel::Left | SrcSel::IndirectLeft => fabric.left_of(at),
        SrcSel::Right | SrcSel::IndirectRight => fabric.right_of(at),
        SrcSel::Ls | SrcSel::IndirectLs if is_ls => {
            if field.chain_right {
                fabric.ls_of(fabric.right_unit(at.unit))
            } else if field.chain_left {
                fabric.ls_of(fabric.left_unit(at.unit))
            } else {
                at
            }
        }
        SrcSel::Ls | SrcSel::IndirectLs => fabric.ls_of(at.unit),
        SrcSel::Addr | SrcSel::Imm => at,
    }
}

fn check_indirect_addressing(cmd: &VproCommand) -> Result<(), anyhow::Error> {
    let uses = |sel: SrcSel| [cmd.src1.sel, cmd.src2.sel, cmd.dst.sel].contains(&sel);
    let offset_from_lanes = uses(SrcSel::IndirectLeft) || uses(SrcSel::IndirectRight);
    let data_from_lanes = uses(SrcSel::Left) || uses(SrcSel::Right);
    if (offset_from_lanes && data_from_lanes) || (uses(SrcSel::IndirectLs) && uses(SrcSel::Ls)) {
        bail!(
            "{} chains data and offsets from the same lane",
            cmd.kind.mnemonic()
        );
    }
    Ok(())
}

#[derive(Debug)]
pub struct Lane {
    id: usize,
    at: LaneRef,
    cluster: usize,
    is_ls: bool,
    rf: Option<RegFile>,
    pipe: Pipeline,
    /// command whose elements are being issued
    current: VproCommand,
    /// next command, fetched while `current` drains
    buffered: VproCommand,
    blocking: bool,
    stalls: Stalls,
    runs: StallRuns,
}

impl Lane {
    pub fn new(cluster: usize, unit: usize, id: usize, config: &VproConfig) -> Self {
        let is_ls = id == config.ls_lane();
        Lane {
            id,
            at: LaneRef { unit, lane: id },
            cluster,
            is_ls,
            rf: (!is_ls).then(|| RegFile::new(config.rf_size, (cluster, unit, id))),
            pipe: Pipeline::new(),
            current: VproCommand::none_for_lane(id),
            buffered: VproCommand::none_for_lane(id),
            blocking: false,
            stalls: Stalls::default(),
            runs: StallRuns::default(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_ls(&self) -> bool {
        self.is_ls
    }

    pub fn rf(&self) -> Option<&RegFile> {
        self.rf.as_ref()
    }

    pub fn rf_mut(&mut self) -> Option<&mut RegFile> {
        self.rf.as_mut()
    }

    pub fn current(&self) -> &VproCommand {
        &self.current
    }

    pub fn stalls(&self) -> Stalls {
        self.stalls
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipe
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn is_busy(&self) -> bool {
        self.blocking || self.pipe.is_busy()
    }

    fn src_stall(&self, fabric: &ChainFabric) -> Result<bool, anyhow::Error> {
        let cmd = &self.pipe.stage(CHAIN_TARGET_STAGE).cmd;
        if self.is_ls {
            if !cmd.kind.writes_lm() {
                return Ok(false);
            }
            let lane = cmd.dst.gamma as usize;
            if lane > fabric.ls_lane() {
                bail!("store reads data from missing lane {}", lane);
            }
            let from = LaneRef {
                unit: self.at.unit,
                lane,
            };
            return Ok(fabric.fifo(from).is_empty());
        }
        let mut stall = false;
        for field in [&cmd.src1, &cmd.src2] {
            if field.sel.is_chain_data() {
                stall = fabric.fifo(source_lane(self.at, false, field, fabric)).is_empty();
            }
        }
        Ok(stall)
    }

    fn adr_stall(&self, fabric: &ChainFabric) -> bool {
        let cmd = &self.pipe.stage(ADR_READ_STAGE).cmd;
        [&cmd.src1, &cmd.src2, &cmd.dst].into_iter().any(|field| {
            field.sel.is_indirect()
                && fabric
                    .fifo(source_lane(self.at, self.is_ls, field, fabric))
                    .is_empty()
        })
    }

    pub fn tick(&mut self, ctx: &mut LaneCtx) -> Result<(), anyhow::Error> {
        self.stalls = Stalls {
            adr: self.adr_stall(ctx.fabric),
            src: self.src_stall(ctx.fabric)?,
            dst: self.pipe.is_chaining() && !ctx.fabric.fifo(self.at).is_fillable(),
        };

        let from = match (self.stalls.adr, self.stalls.src, self.stalls.dst) {
            (false, false, false) => {
                self.pipe.process(self.current.clone());
                Some(0)
            }
            // offsets missing: the address stages wait, the rest drains
            (true, false, false) => {
                self.pipe.process_in_stall(CHAIN_TARGET_STAGE);
                Some(CHAIN_TARGET_STAGE)
            }
            (false, true, false) => {
                self.pipe.process_in_stall(CHAIN_TARGET_STAGE + 1);
                Some(CHAIN_TARGET_STAGE + 1)
            }
            _ => None,
        };
        if let Some(from) = from {
            for stage in from..=self.pipe.last_stage() {
                if self.is_ls {
                    self.ls_stage(stage, ctx)?;
                } else {
                    self.alu_stage(stage, ctx)?;
                }
            }
        }

        let last = self.pipe.last_stage();
        if !self.stalls.dst {
            self.pipe.stage_mut(last).cmd.blocking = false;
        }
        ctx.stats.adr_stall_cycles += self.stalls.adr as u64;
        ctx.stats.src_stall_cycles += self.stalls.src as u64;
        ctx.stats.dst_stall_cycles += self.stalls.dst as u64;
        Ok(())
    }

    fn alu_stage(&mut self, index: usize, ctx: &mut LaneCtx) -> Result<(), anyhow::Error> {
        let last = self.pipe.last_stage();
        let (stages, accu) = self.pipe.stages_mut();
        let stage = &mut stages[index];
        if stage.cmd.is_none() {
            return Ok(());
        }
        let mut ports = Ports {
            at: self.at,
            is_ls: false,
            rf: self.rf.as_ref(),
            fabric: &mut *ctx.fabric,
        };
        let (x, y, z) = (stage.cmd.x, stage.cmd.y, stage.cmd.z);

        match index {
            0 => stage.rf_addr = stage.cmd.dst.affine(x, y, z),
            CHAIN_TARGET_STAGE => {
                check_indirect_addressing(&stage.cmd)?;
                for sel in [SrcSel::IndirectLs, SrcSel::IndirectLeft, SrcSel::IndirectRight] {
                    ports.update_offsets(&mut stage.cmd, sel);
                }
                stage.rf_addr = stage.rf_addr.wrapping_add(stage.cmd.dst.offset);
            }
            4 => read_operands(stage, &mut ports, ctx.arch)?,
            5 => {
                alu::prepare(stage, accu, ctx.arch);
                alu::execute(stage, accu, ctx.arch, ctx.config.strict)?;
                if stage.cmd.kind.is_conditional_alu() && !stage.commit {
                    stage.pre_data = stage.opa;
                    stage.commit = true;
                }
                stage.flags = flags_of(stage.pre_data);
            }
            _ => {}
        }

        if index == last {
            if stage.cmd.kind.writes_rf() && stage.commit {
                let rf = self
                    .rf
                    .as_mut()
                    .context("processing lane without register file")?;
                let addr = stage.rf_addr as usize;
                rf.set_data_next(addr, stage.data);
                if stage.cmd.flag_update {
                    rf.set_flag_next(addr, ZERO_FLAG, stage.flags[0]);
                    rf.set_flag_next(addr, NEGATIVE_FLAG, stage.flags[1]);
                }
            }
            if stage.cmd.is_chain {
                let word = ChainWord::new(s24(stage.data), stage.flags[0], stage.flags[1]);
                ctx.fabric.fifo_mut(self.at).push(word);
            }
        }
        Ok(())
    }

    fn ls_stage(&mut self, index: usize, ctx: &mut LaneCtx) -> Result<(), anyhow::Error> {
        let (stages, _) = self.pipe.stages_mut();
        let stage = &mut stages[index];
        if stage.cmd.is_none() {
            return Ok(());
        }
        if !stage.cmd.kind.is_ls() {
            warn!(
                "load/store lane got {} (C{}U{})",
                stage.cmd.kind.mnemonic(),
                self.cluster,
                self.at.unit
            );
        }
        let mut ports = Ports {
            at: self.at,
            is_ls: true,
            rf: None,
            fabric: &mut *ctx.fabric,
        };
        let kind = stage.cmd.kind;

        match index {
            0 => ls_address(stage, &mut ports)?,
            CHAIN_TARGET_STAGE => {
                check_indirect_addressing(&stage.cmd)?;
                for sel in [SrcSel::IndirectLeft, SrcSel::IndirectRight] {
                    ports.update_offsets(&mut stage.cmd, sel);
                }
                stage.lm_addr = stage.lm_addr.wrapping_add(stage.cmd.src1.offset);
            }
            4 => ls_operands(stage, &mut ports)?,
            5 => {
                if kind.writes_lm() {
                    stage.data = stage.pre_data;
                } else if kind.is_load() && !stage.cmd.dst.chain_ls {
                    let bytes = ctx
                        .lm
                        .read_n::<2>(stage.lm_addr as usize * 2)
                        .with_context(|| {
                            format!(
                                "local memory read out of range (C{}U{}, addr {})",
                                self.cluster, self.at.unit, stage.lm_addr
                            )
                        })?;
                    stage.pre_data = u16::from_le_bytes(bytes) as u32;
                }
                let pre = stage.pre_data;
                stage.pre_data = match kind {
                    VproKind::Load => pre & 0xffff,
                    VproKind::LoadS => s16(pre) as u32,
                    VproKind::LoadSShiftLeft => {
                        s24(s16(pre).wrapping_shl(stage.cmd.dst.offset) as u32) as u32
                    }
                    VproKind::LoadSShiftRight => {
                        s24(s16(pre).wrapping_shr(stage.cmd.dst.offset) as u32) as u32
                    }
                    VproKind::LoadB => pre & 0xff,
                    VproKind::LoadBS | VproKind::LoadReverse => s8(pre) as u32,
                    VproKind::Store => {
                        let bytes = (stage.data as u16).to_le_bytes();
                        ctx.lm
                            .write_n(stage.lm_addr as usize * 2, bytes)
                            .with_context(|| {
                                format!(
                                    "local memory write out of range (C{}U{}, addr {})",
                                    self.cluster, self.at.unit, stage.lm_addr
                                )
                            })?;
                        stage.data
                    }
                    VproKind::StoreShiftLeft | VproKind::StoreShiftRight | VproKind::StoreReverse => {
                        bail!("{} is not implemented", kind.mnemonic())
                    }
                    _ => pre,
                };
                stage.flags = flags_of(stage.pre_data);
            }
            LS_CHAIN_STAGE if kind.is_load() => {
                let word = ChainWord::new(s24(stage.pre_data), stage.flags[0], stage.flags[1]);
                ctx.fabric.fifo_mut(self.at).push(word);
            }
            _ => {}
        }
        Ok(())
    }

    /// Advance the element cursor and the stall counters.
    pub fn update_pre(&mut self, stats: &mut VproStats, adr_warn_threshold: u64) {
        if !self.stalls.any() && !self.current.is_done() && self.current.advance() {
            if !self.current.is_none() {
                stats.command_done(&self.current);
            }
        }

        let bump = |run: &mut u64, stalled: bool| *run = if stalled { *run + 1 } else { 0 };
        bump(&mut self.runs.adr, self.stalls.adr);
        bump(&mut self.runs.src, self.stalls.src);
        bump(&mut self.runs.dst, self.stalls.dst);
        if self.runs.adr == adr_warn_threshold + 1 {
            warn!(
                "C{}U{}L{} waits for chained offsets since {} cycles",
                self.cluster, self.at.unit, self.id, self.runs.adr
            );
        }
    }

    /// Both the running and the buffered command are finished.
    pub fn needs_command(&self) -> bool {
        self.current.is_done() && self.buffered.is_done()
    }

    /// Replace a finished command. A command with a shorter ALU pipeline is
    /// held back until the longer one has drained, one bubble per stage.
    pub fn fetch(&mut self, next: Option<VproCommand>) {
        if !self.current.is_done() {
            return;
        }
        if self.buffered.is_done() {
            self.buffered = next.unwrap_or_else(VproCommand::idle);
        }
        if self.buffered.pipeline_alu_depth < self.pipe.depth {
            self.pipe.depth -= 1;
            self.current = VproCommand::none_for_lane(self.id);
        } else {
            self.pipe.set_depth(self.buffered.pipeline_alu_depth);
            self.current = std::mem::replace(&mut self.buffered, VproCommand::idle());
        }
    }

    pub fn update_post(&mut self, fabric: &mut ChainFabric) -> Result<(), anyhow::Error> {
        if let Some(rf) = self.rf.as_mut() {
            rf.update()?;
        }
        fabric.fifo_mut(self.at).update();
        self.blocking = self.current.blocking || self.pipe.is_blocking(CHAIN_TARGET_STAGE);
        self.pipe.update();
        Ok(())
    }
}

fn read_operands(
    stage: &mut Stage,
    ports: &mut Ports,
    arch: &ArchitectureState,
) -> Result<(), anyhow::Error> {
    let a = ports.operand(&stage.cmd.src1, &stage.cmd)?;
    let b = ports.operand(&stage.cmd.src2, &stage.cmd)?;
    let kind = stage.cmd.kind;

    if matches!(kind, VproKind::MacL | VproKind::MacH) {
        let mut init = stage.cmd.src1;
        let opc = match arch.mac_init_source {
            MacInitSource::Addr => {
                init.sel = SrcSel::Addr;
                ports.operand(&init, &stage.cmd)?.value
            }
            MacInitSource::Imm => {
                init.sel = SrcSel::Imm;
                ports.operand(&init, &stage.cmd)?.value
            }
            MacInitSource::Zero | MacInitSource::None => 0,
        };
        stage.opc = s24(opc) as u32;
    }

    stage.opa = s24(a.value) as u32;
    stage.opb = if kind.uses_multiplier() {
        let (full, cut) = (s24(b.value), s18(b.value));
        if full != cut {
            warn!(
                "{} takes an 18-bit second operand, {} was cut to {}",
                kind.mnemonic(),
                full,
                cut
            );
        }
        cut as u32
    } else {
        s24(b.value) as u32
    };

    stage.commit = match kind {
        VproKind::MvZe => a.zero,
        VproKind::MvNz => !a.zero,
        VproKind::MvMi | VproKind::MulLNeg | VproKind::MulHNeg | VproKind::ShiftARNeg => a.negative,
        VproKind::MvPl | VproKind::MulLPos | VproKind::MulHPos | VproKind::ShiftARPos => !a.negative,
        _ => true,
    };
    Ok(())
}

/// Local memory address, plus the reversed walks and store shift amount.
fn ls_address(stage: &mut Stage, ports: &mut Ports) -> Result<(), anyhow::Error> {
    let cmd = &stage.cmd;
    let (x, y, z) = (cmd.x, cmd.y, cmd.z);
    let src1 = cmd.src1;
    stage.lm_addr = src1.affine(x, y, z);

    if matches!(cmd.kind, VproKind::StoreShiftLeft | VproKind::StoreShiftRight) {
        if cmd.src2.sel != SrcSel::Imm {
            error!("{} shifts by immediate only", cmd.kind.mnemonic());
        }
        let shift = ports.operand(&stage.cmd.src2, &stage.cmd)?;
        stage.opb = s24(shift.value) as u32;
    }
    if matches!(stage.cmd.kind, VproKind::LoadReverse | VproKind::StoreReverse) {
        let ax = src1.alpha.wrapping_mul(x);
        let by = src1.beta.wrapping_mul(y);
        let walk = match stage.cmd.dst.imm() {
            0b00 => Some(ax.wrapping_add(by)),
            0b01 => Some(ax.wrapping_sub(by)),
            0b10 => Some(by.wrapping_sub(ax)),
            0b11 => Some(0u32.wrapping_sub(ax).wrapping_sub(by)),
            _ => None,
        };
        if let Some(walk) = walk {
            stage.lm_addr = walk.wrapping_add(src1.gamma.wrapping_mul(z));
        }
    }
    Ok(())
}

fn ls_operands(stage: &mut Stage, ports: &mut Ports) -> Result<(), anyhow::Error> {
    let kind = stage.cmd.kind;
    if kind.writes_lm() {
        let data = ports.operand(&stage.cmd.dst, &stage.cmd)?;
        stage.pre_data = (s24(data.value) as u32) & 0xffff;
        let shifted = match kind {
            VproKind::StoreShiftLeft => Some((stage.pre_data as i32).wrapping_shl(stage.opb)),
            VproKind::StoreShiftRight => Some((stage.pre_data as i32).wrapping_shr(stage.opb)),
            _ => None,
        };
        if let Some(shifted) = shifted {
            stage.pre_data = (s24(shifted as u32) as u32) & 0xffff;
        }
    }

    let dst = stage.cmd.dst;
    if dst.chain_ls {
        let unit = ports.at.unit;
        let from = if dst.chain_left {
            ports.fabric.ls_of(ports.fabric.left_unit(unit))
        } else if dst.chain_right {
            ports.fabric.ls_of(ports.fabric.right_unit(unit))
        } else {
            bail!("load/store chain without direction (U{})", unit);
        };
        stage.pre_data = ports.pop(from).value;
    }

    let src2 = stage.cmd.src2;
    match src2.sel {
        SrcSel::Imm => {
            let offset = ports.operand(&src2, &stage.cmd)?.value;
            stage.lm_addr = stage.lm_addr.wrapping_add(offset);
        }
        SrcSel::Left | SrcSel::Right if kind.is_load() => {
            let offset = ports.operand(&src2, &stage.cmd)?.value;
            stage.lm_addr = stage.lm_addr.wrapping_add(offset);
        }
        SrcSel::Left | SrcSel::Right => bail!("{} cannot chain its offset", kind.mnemonic()),
        other => bail!(
            "invalid operand selector {:?} for {}",
            other,
            kind.mnemonic()
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VproConfig {
        VproConfig {
            lanes: 2,
            rf_size: 16,
            lm_size: 64,
            ..VproConfig::default()
        }
    }

    #[test]
    fn source_lanes_follow_selectors() {
        let fabric = ChainFabric::new(2, 2);
        let lane0 = LaneRef { unit: 0, lane: 0 };
        let left = AddrField::new(SrcSel::Left, 0, 0, 0, 0);
        let ls = AddrField::new(SrcSel::IndirectLs, 0, 0, 0, 0);
        assert_eq!(source_lane(lane0, false, &left, &fabric).lane, 1);
        assert_eq!(source_lane(lane0, false, &ls, &fabric), fabric.ls_of(0));

        let mut from_right_unit = AddrField::new(SrcSel::Ls, 0, 0, 0, 0);
        from_right_unit.chain_right = true;
        let ls0 = fabric.ls_of(0);
        assert_eq!(source_lane(ls0, true, &from_right_unit, &fabric), fabric.ls_of(1));
    }

    #[test]
    fn mixing_chained_data_and_offsets_is_rejected() {
        let cmd = VproCommand {
            kind: VproKind::Add,
            src1: AddrField::new(SrcSel::Left, 0, 0, 0, 0),
            src2: AddrField::new(SrcSel::IndirectRight, 0, 0, 0, 0),
            ..VproCommand::default()
        };
        assert!(check_indirect_addressing(&cmd).is_err());
    }

    #[test]
    fn fetch_waits_for_deeper_pipeline_to_drain() {
        let mut lane = Lane::new(0, 0, 0, &config());
        lane.current = VproCommand::idle();
        lane.buffered = VproCommand::idle();
        lane.pipe.set_depth(5);
        let add = VproCommand {
            kind: VproKind::Add,
            ..VproCommand::default()
        };
        lane.fetch(Some(add));
        assert_eq!(lane.pipe.depth, 4);
        assert!(lane.current.is_none());
        assert_eq!(lane.buffered.kind, VproKind::Add);
    }

    #[test]
    fn load_store_lane_has_no_register_file() {
        let lane = Lane::new(0, 0, 2, &config());
        assert!(lane.is_ls());
        assert!(lane.rf().is_none());
        assert!(Lane::new(0, 0, 1, &config()).rf().is_some());
    }
}
