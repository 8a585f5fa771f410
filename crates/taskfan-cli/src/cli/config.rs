use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskfan::ConcurrencyOption;

/// Command-line arguments for the `taskfan` binary.
///
/// The worker count itself is not read here: unless `--concurrency` is given,
/// it is resolved from `TASKFAN_CONCURRENCY` (or the deprecated
/// `TASKFAN_BUILD_PARALLEL`) when a command runs.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskfan",
    version,
    about = "Fan file work out across worker threads or async lanes"
)]
pub struct CliArgs {
    /// Explicit concurrency setting: `true`, `false`, or an integer.
    ///
    /// Takes precedence over the environment. `true` means the default (half
    /// the logical CPUs), `false` means one worker, and integers below one are
    /// raised to one.
    #[arg(long, global = true, value_parser = |s: &str| s.parse::<ConcurrencyOption>())]
    pub concurrency: Option<ConcurrencyOption>,

    /// Multiplier applied to the concurrency for cooperative lanes (`stat`).
    ///
    /// Environment variable: `TASKFAN_CONCURRENCY_FACTOR`
    #[arg(long, env = "TASKFAN_CONCURRENCY_FACTOR", default_value_t = 1.0, global = true)]
    pub concurrency_factor: f64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print the resolved worker count.
    Concurrency,
    /// Count lines and bytes of each file on worker threads.
    Count {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Read file metadata on cooperative async lanes.
    Stat {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub concurrency: Option<ConcurrencyOption>,
    pub concurrency_factor: f64,
    pub command: Command,
}

impl TryFrom<CliArgs> for CliConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if !args.concurrency_factor.is_finite() || args.concurrency_factor <= 0.0 {
            bail!(
                "--concurrency-factor (TASKFAN_CONCURRENCY_FACTOR) must be a positive number, got {}",
                args.concurrency_factor
            );
        }

        Ok(Self {
            concurrency: args.concurrency,
            concurrency_factor: args.concurrency_factor,
            command: args.command,
        })
    }
}
