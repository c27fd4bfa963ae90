use anyhow::{anyhow, Error, Result};
use bartstats::config::{BatchConfig, RunConfig};
use bartstats::credregion::DEFAULT_MASSES;
use bartstats::ess::DEFAULT_UNCERTAINTY_MASSES;
use bartstats::report::{report_credible_regions, report_ess, CredRegionSettings, EssSettings};
use bartstats::rhat::DEFAULT_THRESHOLD;
use bartstats::BandwidthRule;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::error;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about, term_width = 80)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Highest posterior density credible regions of every parameter
    Credregion(CredRegionArgs),
    /// Gelman-Rubin convergence and effective sample size
    Ess(EssArgs),
}

/// Where the runs come from: a JSON config, or a single run on the command line
#[derive(Args, Debug)]
struct RunArgs {
    /// JSON batch configuration
    #[arg(short, long, conflicts_with = "files")]
    config: Option<PathBuf>,

    /// `.npy` MC3 output, or one CSV file per chain
    #[arg(short, long, value_delimiter = ',')]
    files: Vec<PathBuf>,

    /// label of the single run
    #[arg(long, default_value = "run")]
    name: String,

    /// leading iterations of each chain to discard
    #[arg(short, long, default_value_t = 0)]
    burnin: usize,

    /// reference abundances of the trailing parameters (log10 shift)
    #[arg(long, value_delimiter = ',')]
    log_shift: Vec<f64>,

    /// parameter names, in file order
    #[arg(long, value_delimiter = ',')]
    parameters: Vec<String>,

    /// leading CSV lines to skip
    #[arg(long, default_value_t = 0)]
    csv_skip_rows: usize,
}

#[derive(Args, Debug)]
struct CredRegionArgs {
    #[command(flatten)]
    runs: RunArgs,

    /// probability mass of each credible region
    #[arg(short, long, value_delimiter = ',', default_values_t = DEFAULT_MASSES.to_vec())]
    masses: Vec<f64>,

    /// points at which the density is estimated before upsampling
    #[arg(short, long, default_value_t = 100)]
    grid_points: usize,

    /// kernel bandwidth rule
    #[arg(long, value_enum, default_value = "scott")]
    bandwidth: Bandwidth,

    /// fixed bandwidth factor, overrides `--bandwidth`
    #[arg(long)]
    bandwidth_factor: Option<f64>,
}

#[derive(Args, Debug)]
struct EssArgs {
    #[command(flatten)]
    runs: RunArgs,

    /// iterations added between Gelman-Rubin tests
    #[arg(short, long, default_value_t = 10000)]
    step: usize,

    /// Gelman-Rubin convergence threshold
    #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,

    /// probabilities whose uncertainty is reported
    #[arg(short, long, value_delimiter = ',', default_values_t = DEFAULT_UNCERTAINTY_MASSES.to_vec())]
    masses: Vec<f64>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Bandwidth {
    Scott,
    Silverman,
}

impl RunArgs {
    fn runs(&self) -> Result<Vec<RunConfig>, Error> {
        if let Some(path) = &self.config {
            return Ok(BatchConfig::from_file(path)?.runs);
        }
        if self.files.is_empty() {
            return Err(anyhow!("Either --config or --files is required"));
        }
        Ok(vec![RunConfig {
            name: self.name.clone(),
            files: self.files.clone(),
            burnin: self.burnin,
            log_shift: self.log_shift.iter().copied().map(Some).collect(),
            parameters: self.parameters.clone(),
            bounds: BTreeMap::new(),
            csv_skip_rows: self.csv_skip_rows,
        }])
    }
}

impl CredRegionArgs {
    fn settings(&self) -> CredRegionSettings {
        let bandwidth = match (self.bandwidth_factor, self.bandwidth) {
            (Some(f), _) => BandwidthRule::Factor(f),
            (None, Bandwidth::Scott) => BandwidthRule::Scott,
            (None, Bandwidth::Silverman) => BandwidthRule::Silverman,
        };
        CredRegionSettings {
            masses: self.masses.clone(),
            grid_points: self.grid_points,
            bandwidth,
        }
    }
}

/// Runs every job in turn; a failed run is logged and the rest carry on.
fn run_batch<F>(runs: &[RunConfig], mut job: F) -> Result<(), Error>
where
    F: FnMut(&mut io::StdoutLock, &RunConfig) -> Result<(), Error>,
{
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut failed = 0;
    for run in runs {
        if let Err(e) = job(&mut out, run) {
            error!("{}: {:#}", run.name, e);
            failed += 1;
        }
    }
    out.flush()?;
    if failed > 0 {
        return Err(anyhow!("{} of {} runs failed", failed, runs.len()));
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match &cli.commands {
        Commands::Credregion(args) => {
            let settings = args.settings();
            run_batch(&args.runs.runs()?, |out, run| {
                report_credible_regions(out, run, &settings)
            })?;
        }
        Commands::Ess(args) => {
            let settings = EssSettings {
                step: args.step,
                threshold: args.threshold,
                masses: args.masses.clone(),
            };
            run_batch(&args.runs.runs()?, |out, run| report_ess(out, run, &settings))?;
        }
    }

    Ok(())
}
