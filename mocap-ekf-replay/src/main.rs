use std::{
    fs::File,
    io::{self, BufReader, Write},
};

use anyhow::{Context, Result};
use args::{Cli, ModeSelect, ReplayCli};
use clap::Parser;
use log::{LevelFilter, info};
use mocap_ekf_core::MocapEkf;
use record::{EstimateWriter, read_samples};
use replay::Replay;

mod args;
mod config;
mod record;
mod replay;

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Cli::parse();
    match args.mode {
        ModeSelect::Replay(args) => replay(args),
        ModeSelect::DefaultConfig(args) => match args.path {
            Some(path) => {
                config::save_default_config(&path)?;
                info!("default config written to {}", path.display());
                Ok(())
            }
            None => {
                print!("{}", config::default_config_toml()?);
                Ok(())
            }
        },
    }
}

fn replay(args: ReplayCli) -> Result<()> {
    let config = config::load_config(&args.config_path)?;
    let samples_file = File::open(&args.samples_path)
        .with_context(|| format!("failed to open {}", args.samples_path.display()))?;
    let events = read_samples(BufReader::new(samples_file))?;
    info!("loaded {} samples", events.len());

    let output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = EstimateWriter::new(output);

    let mut replay = Replay::new(MocapEkf::new(config)?);
    for event in &events {
        replay.push(event, |estimate| writer.write(estimate))?;
    }
    writer.finish()?;

    let summary = replay.into_summary();
    info!(
        "replayed {} imu and {} mocap samples, {} predicts, {} estimates, {} rejected",
        summary.imu_samples,
        summary.pose_samples,
        summary.predicts,
        summary.published,
        summary.rejected
    );
    match summary.flying_since_s {
        Some(since_s) => info!("flying since {} s", since_s),
        None => info!("never took off, estimates are copies of mocap"),
    }
    Ok(())
}
