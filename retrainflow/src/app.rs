//! High-level entry point used by `main.rs`.

use crate::cli::{CliArgs, Command, ConfigArgs, RunArgs, ScheduleArgs};
use crate::core::RunStatus;
use crate::errors::{RetrainflowError, RunAborted};
use crate::events::LoggingEventSink;
use crate::graph::TaskGraph;
use crate::record::RunRecord;
use crate::retrain::{
    Collaborators, FileNotifier, LogNotifier, Notifier, RetrainConfig, RetrainPipeline,
};
use crate::scheduler::CancellationToken;
use anyhow::{bail, Context, Result};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Dispatches a parsed command line.
pub async fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Run(run) => run_once(run).await,
        Command::Schedule(schedule) => run_schedule(schedule).await,
        Command::Graph(config) => {
            let pipeline = build_pipeline(&load_config(&config)?)?;
            print!("{}", describe_graph(pipeline.graph()));
            Ok(())
        }
    }
}

/// Loads the config file, or the defaults when none is given.
pub fn load_config(args: &ConfigArgs) -> Result<RetrainConfig> {
    let config = match &args.config {
        Some(path) => RetrainConfig::load(path)?,
        None => {
            let config = RetrainConfig::default();
            config.validate()?;
            config
        }
    };
    Ok(config)
}

fn build_pipeline(config: &RetrainConfig) -> Result<RetrainPipeline> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
    if let Some(report) = &config.artifacts.report {
        notifiers.push(Arc::new(FileNotifier::new(config.resolve(report))));
    }
    let pipeline = RetrainPipeline::new(config, &Collaborators::from_config(config), notifiers)
        .map_err(RetrainflowError::from)?
        .with_event_sink(Arc::new(LoggingEventSink::debug()));
    Ok(pipeline)
}

/// Renders the execution order with each task's dependencies.
pub fn describe_graph(graph: &TaskGraph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", graph.name());
    for (index, task) in graph.tasks_in_order().enumerate() {
        let _ = write!(out, "{:>2}. {}", index + 1, task.id);
        if !task.dependencies.is_empty() {
            let _ = write!(out, " <- {}", task.dependencies.join(", "));
        }
        if task.gate.is_some() {
            let _ = write!(out, " [gated]");
        }
        let _ = writeln!(out);
    }
    out
}

fn cancel_on_ctrl_c(token: Arc<CancellationToken>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        info!("Received Ctrl+C, cancelling");
        token.cancel("interrupted");
    });
}

async fn run_once(args: RunArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let pipeline = build_pipeline(&config)?;
    cancel_on_ctrl_c(pipeline.cancellation_token());

    let outcome = pipeline.run().await;
    finish(&pipeline, outcome, args.record_out.as_deref()).map(|_| ())
}

async fn run_schedule(args: ScheduleArgs) -> Result<()> {
    if args.interval_secs == 0 {
        bail!("--interval-secs must be positive");
    }
    let config = load_config(&args.config)?;
    let pipeline = build_pipeline(&config)?;
    let token = pipeline.cancellation_token();
    cancel_on_ctrl_c(Arc::clone(&token));

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = args.interval_secs, max_runs = ?args.max_runs, "Schedule started");

    let mut runs = 0u32;
    loop {
        if args.max_runs.is_some_and(|max| runs >= max) {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {}
            () = token.cancelled() => break,
        }

        runs += 1;
        let outcome = pipeline.run().await;
        let record_out = match (&args.record_dir, &outcome) {
            (Some(dir), Ok(record)) => Some(dir.join(record_file_name(record))),
            (Some(dir), Err(aborted)) => Some(dir.join(record_file_name(&aborted.record))),
            (None, _) => None,
        };
        if finish(&pipeline, outcome, record_out.as_deref())? == RunStatus::Cancelled {
            break;
        }
    }

    info!(runs, "Schedule stopped");
    Ok(())
}

fn record_file_name(record: &RunRecord) -> String {
    format!("run-{}-{}.json", record.started_at.format("%Y%m%dT%H%M%S"), record.run_id)
}

/// Persists and prints the outcome of one run.
///
/// An aborted run still has its partial record written and summarised
/// before the abort is returned.
fn finish(
    pipeline: &RetrainPipeline,
    outcome: Result<RunRecord, RunAborted>,
    record_out: Option<&Path>,
) -> Result<RunStatus> {
    match outcome {
        Ok(record) => {
            publish(pipeline, &record, record_out)?;
            if record.status == RunStatus::Cancelled {
                warn!(reason = record.reason.as_deref().unwrap_or_default(), "Run cancelled");
            }
            Ok(record.status)
        }
        Err(aborted) => {
            publish(pipeline, &aborted.record, record_out)?;
            error!(task = %aborted.task, error = %aborted.cause, "Run aborted");
            Err(RetrainflowError::from(aborted).into())
        }
    }
}

fn publish(pipeline: &RetrainPipeline, record: &RunRecord, record_out: Option<&Path>) -> Result<()> {
    if let Some(path) = record_out {
        record
            .write_json(path)
            .with_context(|| format!("writing run record to {}", path.display()))?;
        info!(path = %path.display(), "Run record written");
    }
    print!("{}", pipeline.summary(record));
    Ok(())
}
