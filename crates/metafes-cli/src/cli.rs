use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "metafes - Metadynamics bias accumulation, free-energy reconstruction and configuration sampling over collective variables.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate the configured collective variables on every frame of a trajectory.
    Cv(CvArgs),
    /// Replay a trajectory through a metadynamics run and write the deposited hills.
    Run(RunArgs),
    /// Reconstruct the free-energy surface, or a 1-D projection, from a hill log.
    Fes(FesArgs),
    /// Draw random frames whose collective variables fall inside given bounds.
    Sample(SampleArgs),
}

/// Options shared by every subcommand that reads a run configuration.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to the run configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S metadynamics.pace=250
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `cv` subcommand.
#[derive(Args, Debug)]
pub struct CvArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Multi-frame XYZ trajectory to evaluate.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub trajectory: PathBuf,

    /// Path for the CV time series (COLVAR format).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Multi-frame XYZ trajectory to replay.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub trajectory: PathBuf,

    /// Path for the deposited hill log (HILLS format).
    #[arg(long, required = true, value_name = "PATH")]
    pub hills: PathBuf,

    /// Also write the CV time series of the replayed frames.
    #[arg(long, value_name = "PATH")]
    pub colvar: Option<PathBuf>,

    /// Continue from the hills of an earlier run.
    #[arg(long, value_name = "PATH")]
    pub restart: Option<PathBuf>,

    /// Override the initial hill height, in the configured energy unit.
    #[arg(long, value_name = "FLOAT")]
    pub height: Option<f64>,

    /// Override the number of frames between deposits.
    #[arg(long, value_name = "INT")]
    pub pace: Option<usize>,
}

/// Arguments for the `fes` subcommand.
#[derive(Args, Debug)]
pub struct FesArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Hill log to reconstruct the bias from.
    #[arg(long, required = true, value_name = "PATH")]
    pub hills: PathBuf,

    /// Path for the free-energy table (CSV).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Project the surface onto one variable, given by name or 0-based index.
    #[arg(short, long, value_name = "CV")]
    pub project: Option<String>,

    /// Thermal energy for the projection, in the configured energy unit.
    /// Defaults to k_B T of the well-tempered temperature.
    #[arg(long, value_name = "FLOAT")]
    pub kt: Option<f64>,
}

/// Arguments for the `sample` subcommand.
#[derive(Args, Debug)]
pub struct SampleArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Trajectory the CV series was computed from.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub trajectory: PathBuf,

    /// CV time series of the trajectory (COLVAR format).
    #[arg(long, required = true, value_name = "PATH")]
    pub colvar: PathBuf,

    /// Bounds on one variable, e.g. `phi=-1.5..0.5`, `0=[-1.5,0.5]` or `psi=2.0..`.
    /// Variables without bounds are unconstrained.
    #[arg(short, long = "bound", value_name = "CV=RANGE", num_args(0..))]
    pub bounds: Vec<String>,

    /// Maximum number of frames to draw.
    #[arg(short = 'n', long, required = true, value_name = "INT")]
    pub count: usize,

    /// Override the sampler seed from the config file.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Path for the sampled frames (XYZ).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,
}
