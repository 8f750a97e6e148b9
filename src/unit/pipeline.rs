use crate::command::VproCommand;
use crate::isa::{DEFAULT_ALU_DEPTH, MAX_ALU_DEPTH, PIPELINE_SLOTS};

/// One in-flight element: the command copy it belongs to plus the values
/// computed for it so far.
#[derive(Debug, Clone, Default)]
pub struct Stage {
    pub cmd: VproCommand,
    /// result, latched at the end of the ALU
    pub data: u32,
    pub pre_data: u32,
    pub opa: u32,
    pub opb: u32,
    pub opc: u32,
    pub res: u32,
    pub rf_addr: u32,
    pub lm_addr: u32,
    /// result is written (conditional kinds)
    pub commit: bool,
    pub flags: [bool; 2],
}

/// Accumulator and running min/max of a lane's ALU.
#[derive(Debug, Clone, Copy, Default)]
pub struct AluState {
    pub accu: u64,
    pub minmax_index: u32,
    pub minmax_value: u32,
}

#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
    /// ALU depth of the command currently in flight
    pub depth: usize,
    pub alu: AluState,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            stages: vec![Stage::default(); PIPELINE_SLOTS + 2],
            depth: DEFAULT_ALU_DEPTH,
            alu: AluState::default(),
        }
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage where the ALU result is latched.
    pub fn result_stage(&self) -> usize {
        5 + self.depth
    }

    /// Write-back stage, the last live one.
    pub fn last_stage(&self) -> usize {
        5 + self.depth + 1
    }

    pub fn stage(&self, index: usize) -> &Stage {
        &self.stages[index]
    }

    pub fn stage_mut(&mut self, index: usize) -> &mut Stage {
        &mut self.stages[index]
    }

    pub fn stages_mut(&mut self) -> (&mut [Stage], &mut AluState) {
        (&mut self.stages, &mut self.alu)
    }

    pub fn set_depth(&mut self, depth: usize) {
        self.depth = depth.min(MAX_ALU_DEPTH);
    }

    /// Shift every live stage by one and insert `cmd` at stage 0.
    pub fn process(&mut self, cmd: VproCommand) {
        self.process_from(0, cmd);
    }

    /// Shift the stages above `from` and insert a bubble at `from`.
    pub fn process_in_stall(&mut self, from: usize) {
        self.process_from(from, VproCommand::default());
    }

    fn process_from(&mut self, from: usize, cmd: VproCommand) {
        let last = self.last_stage();
        for i in (from + 1..=last).rev() {
            self.stages[i] = self.stages[i - 1].clone();
        }
        self.stages[from] = Stage {
            cmd,
            ..Stage::default()
        };
    }

    /// Any command in the stages before write-back.
    pub fn is_busy(&self) -> bool {
        self.stages[..self.last_stage()].iter().any(|s| !s.cmd.is_none())
    }

    pub fn update(&mut self) {
        let at = self.result_stage();
        self.stages[at].data = self.stages[at].pre_data;
    }

    pub fn is_chaining(&self) -> bool {
        self.stages[self.result_stage()].cmd.is_chain
    }

    /// A blocking command sits in a stage that still precedes the chain read.
    pub fn is_blocking(&self, chain_target_stage: usize) -> bool {
        let until = (self.result_stage() - 1).saturating_sub(chain_target_stage);
        self.stages[..=until].iter().any(|s| s.cmd.blocking)
    }
}

#[cfg(test)]
mod tests {
    use super::Pipeline;
    use crate::command::VproCommand;
    use crate::isa::VproKind;

    fn add() -> VproCommand {
        VproCommand {
            kind: VproKind::Add,
            ..VproCommand::default()
        }
    }

    #[test]
    fn stall_inserts_bubble_above_stage() {
        let mut pipe = Pipeline::new();
        pipe.process(add());
        pipe.process(add());
        assert!(pipe.is_busy());
        pipe.process_in_stall(1);
        assert_eq!(pipe.stage(0).cmd.kind, VproKind::Add);
        assert!(pipe.stage(1).cmd.is_none());
        assert_eq!(pipe.stage(2).cmd.kind, VproKind::Add);
    }

    #[test]
    fn elements_leave_after_last_stage() {
        let mut pipe = Pipeline::new();
        pipe.process(add());
        for _ in 0..pipe.last_stage() {
            pipe.process(VproCommand::default());
        }
        assert_eq!(pipe.stage(pipe.last_stage()).cmd.kind, VproKind::Add);
        assert!(!pipe.is_busy());
        pipe.process(VproCommand::default());
        assert!(pipe.stage(pipe.last_stage()).cmd.is_none());
    }
}
