use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

#[derive(Parser, Debug)]
#[command(name = "Mocap EKF Replay")]
#[command(bin_name = "mocap-ekf-replay")]
pub struct Cli {
    #[clap(subcommand)]
    pub mode: ModeSelect,
}

#[derive(Subcommand, Debug)]
pub enum ModeSelect {
    #[command(about = "run recorded imu and mocap samples through the filter")]
    Replay(ReplayCli),

    #[command(about = "write the default filter parameters as toml")]
    DefaultConfig(DefaultConfigCli),
}

#[derive(Parser, Debug)]
pub struct ReplayCli {
    pub config_path: PathBuf,
    pub samples_path: PathBuf,
    #[arg(long, short, help = "estimate csv path, stdout if omitted")]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct DefaultConfigCli {
    #[arg(help = "stdout if omitted")]
    pub path: Option<PathBuf>,
}
