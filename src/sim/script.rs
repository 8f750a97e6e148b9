//! Line-oriented command scripts standing in for the control core: register
//! writes and reads, plus a few simulator commands.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use log::info;

use crate::command::SimCommand;
use crate::sim::top::VproTop;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOp {
    Write { addr: u32, value: u32 },
    Read { addr: u32 },
    Sim(SimCommand),
}

impl fmt::Display for ScriptOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptOp::Write { addr, value } => write!(f, "w {:#010x} {:#010x}", addr, value),
            ScriptOp::Read { addr } => write!(f, "r {:#010x}", addr),
            ScriptOp::Sim(cmd) => write!(f, "{:?}", cmd),
        }
    }
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let value = parse_u64(s)?;
    u32::try_from(value).map_err(|_| format!("'{}' does not fit in 32 bits", s))
}

fn parse_usize(s: &str) -> Result<usize, String> {
    Ok(parse_u64(s)? as usize)
}

impl FromStr for ScriptOp {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let parts = line.split_whitespace().collect::<Vec<_>>();
        let expect_args = |n: usize| {
            if parts.len() == n + 1 {
                Ok(())
            } else {
                Err(format!("'{}' takes {} arguments, got {}", parts[0], n, parts.len() - 1))
            }
        };
        match parts.first().copied() {
            Some("w") => {
                expect_args(2)?;
                Ok(ScriptOp::Write {
                    addr: parse_u32(parts[1])?,
                    value: parse_u32(parts[2])?,
                })
            }
            Some("r") => {
                expect_args(1)?;
                Ok(ScriptOp::Read {
                    addr: parse_u32(parts[1])?,
                })
            }
            Some("memset") => {
                expect_args(3)?;
                let value = parse_u64(parts[2])?;
                let value = u8::try_from(value).map_err(|_| format!("memset value {} is not a byte", value))?;
                Ok(ScriptOp::Sim(SimCommand::Memset {
                    addr: parse_u64(parts[1])?,
                    value,
                    len: parse_usize(parts[3])?,
                }))
            }
            Some("wait") => {
                expect_args(0)?;
                Ok(ScriptOp::Sim(SimCommand::WaitStep))
            }
            Some("dump_lm") => {
                expect_args(2)?;
                Ok(ScriptOp::Sim(SimCommand::DumpLocalMemory {
                    cluster: parse_usize(parts[1])?,
                    unit: parse_usize(parts[2])?,
                }))
            }
            Some("dump_rf") => {
                expect_args(3)?;
                Ok(ScriptOp::Sim(SimCommand::DumpRegisterFile {
                    cluster: parse_usize(parts[1])?,
                    unit: parse_usize(parts[2])?,
                    lane: parse_usize(parts[3])?,
                }))
            }
            Some(other) => Err(format!(
                "unknown script command '{}', expected one of: w, r, memset, wait, dump_lm, dump_rf",
                other
            )),
            None => Err("empty line".to_string()),
        }
    }
}

/// Parse a whole script. Blank lines and `#` comments are skipped; every op
/// keeps its 1-based line number.
pub fn parse(text: &str) -> Result<Vec<(usize, ScriptOp)>, anyhow::Error> {
    text.lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let line = line.split('#').next().unwrap_or("").trim();
            (!line.is_empty()).then_some((i + 1, line))
        })
        .map(|(line_no, line)| {
            line.parse::<ScriptOp>()
                .map(|op| (line_no, op))
                .map_err(|e| anyhow!("line {}: {}", line_no, e))
        })
        .collect()
}

pub fn load(path: &Path) -> Result<Vec<(usize, ScriptOp)>, anyhow::Error> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read script {}", path.display()))?;
    parse(&text).with_context(|| format!("in script {}", path.display()))
}

/// Execute ops in order. Register reads are printed to `out`.
pub fn run(top: &mut VproTop, ops: &[(usize, ScriptOp)], out: &mut impl Write) -> Result<(), anyhow::Error> {
    for (line_no, op) in ops {
        let step = || format!("line {}: {}", line_no, op);
        match op {
            ScriptOp::Write { addr, value } => top.io_write(*addr, *value).with_context(step)?,
            ScriptOp::Read { addr } => {
                let value = top.io_read(*addr).with_context(step)?;
                writeln!(out, "{:#010x} = {:#010x}", addr, value)?;
            }
            ScriptOp::Sim(cmd) => top.execute_sim(cmd.clone()).with_context(step)?,
        }
    }
    info!("script done after {} ops at {} ps", ops.len(), top.time_ps());
    Ok(())
}
