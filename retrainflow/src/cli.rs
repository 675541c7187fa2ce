//! CLI argument parsing using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// One week, the cadence of the retraining schedule.
pub const WEEKLY_SECS: u64 = 7 * 24 * 60 * 60;

/// Command-line arguments for `retrainflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "retrainflow",
    version,
    about = "Retrain, evaluate and conditionally deploy a classification model.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RETRAINFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Execute the retrain pipeline once.
    Run(RunArgs),
    /// Execute the retrain pipeline on a fixed interval.
    Schedule(ScheduleArgs),
    /// Validate the pipeline and print its execution order.
    Graph(ConfigArgs),
}

/// Where to load configuration from.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Path to the JSON config file. Defaults apply when omitted.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Arguments for `run`.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Config source.
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Write the run record as JSON to this path.
    #[arg(long, value_name = "PATH")]
    pub record_out: Option<PathBuf>,
}

/// Arguments for `schedule`.
#[derive(Debug, Clone, Args)]
pub struct ScheduleArgs {
    /// Config source.
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Seconds between the start of consecutive runs.
    #[arg(long, value_name = "SECS", default_value_t = WEEKLY_SECS)]
    pub interval_secs: u64,

    /// Stop after this many runs.
    #[arg(long, value_name = "N")]
    pub max_runs: Option<u32>,

    /// Directory receiving one record file per run.
    #[arg(long, value_name = "DIR")]
    pub record_dir: Option<PathBuf>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Run and task progress.
    Info,
    /// Attempt-level detail.
    Debug,
    /// Everything.
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let args = CliArgs::try_parse_from([
            "retrainflow",
            "run",
            "--config",
            "retrain.json",
            "--record-out",
            "record.json",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(args.log_level, Some(LogLevel::Debug));
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.config.config, Some(PathBuf::from("retrain.json")));
                assert_eq!(run.record_out, Some(PathBuf::from("record.json")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_schedule_defaults_to_weekly() {
        let args = CliArgs::try_parse_from(["retrainflow", "schedule"]).unwrap();
        match args.command {
            Command::Schedule(schedule) => {
                assert_eq!(schedule.interval_secs, WEEKLY_SECS);
                assert_eq!(schedule.max_runs, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        CliArgs::command().debug_assert();
    }
}
