use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{error, info, LevelFilter};
use toml::Table;
use vprosim::sim::config::{ClockConfig, Config, DcmaConfig, MemConfig, SimConfig, VproConfig};
use vprosim::sim::script;
use vprosim::sim::top::{VproTop, VproTopConfig};

#[derive(Parser)]
#[command(version, about)]
struct VproArgs {
    #[arg(help = "Path to config.toml")]
    config_path: PathBuf,
    #[arg(long, help = "Command script to run")]
    script: Option<PathBuf>,
    #[arg(long, help = "Override number of clusters")]
    clusters: Option<usize>,
    #[arg(long, help = "Override number of units per cluster")]
    units: Option<usize>,
    #[arg(long, help = "Override number of processing lanes per unit")]
    lanes: Option<usize>,
    #[arg(long, help = "Abort on instructions the hardware does not support")]
    strict: Option<bool>,
    #[arg(long, help = "Write statistics as JSON to this file")]
    stats_json: Option<PathBuf>,
    #[arg(long, help = "Enable log at level (0:warn, 1:info, 2:debug)")]
    log: Option<u64>,
}

fn load_config(argv: &VproArgs) -> Result<VproTopConfig, anyhow::Error> {
    let text = fs::read_to_string(&argv.config_path)
        .with_context(|| format!("failed to read config file {}", argv.config_path.display()))?;
    let table: Table = toml::from_str(&text).context("cannot parse config toml")?;

    let mut config = VproTopConfig {
        sim: SimConfig::from_section(table.get("sim"))?,
        vpro: VproConfig::from_section(table.get("vpro"))?,
        dcma: DcmaConfig::from_section(table.get("dcma"))?,
        clock: ClockConfig::from_section(table.get("clock"))?,
        mem: MemConfig::from_section(table.get("mem"))?,
    };

    // override toml configs with argv
    config.sim.log_level = argv.log.unwrap_or(config.sim.log_level);
    config.sim.script = argv.script.clone().or(config.sim.script);
    config.sim.stats_json = argv.stats_json.clone().or(config.sim.stats_json);
    config.vpro.clusters = argv.clusters.unwrap_or(config.vpro.clusters);
    config.vpro.units = argv.units.unwrap_or(config.vpro.units);
    config.vpro.lanes = argv.lanes.unwrap_or(config.vpro.lanes);
    config.vpro.strict = argv.strict.unwrap_or(config.vpro.strict);
    Ok(config)
}

fn init_logger(level: u64) {
    let filter = match level {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(filter)
        .parse_default_env()
        .init();
}

fn simulate(config: VproTopConfig) -> Result<(), anyhow::Error> {
    let config = Arc::new(config);
    let mut top = VproTop::new(Arc::clone(&config));

    if let Some(path) = &config.sim.script {
        let ops = script::load(path)?;
        script::run(&mut top, &ops, &mut io::stdout())?;
    } else {
        info!("no script given, nothing to run");
    }
    top.run_until_idle()?;

    let stats = top.stats();
    info!(
        "finished at {} ps: {} vpro cycles, {} lane-active, {} dma-active",
        stats.time_ps, stats.aux.vpro_total, stats.aux.lane_act, stats.aux.dma_act
    );
    if let Some(path) = &config.sim.stats_json {
        stats.write_json(path)?;
    }
    Ok(())
}

pub fn main() {
    let argv = VproArgs::parse();
    let config = match load_config(&argv) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(1);
        }
    };
    init_logger(config.sim.log_level);

    if let Err(err) = simulate(config) {
        error!("{:#}", err);
        std::process::exit(1);
    }
}
