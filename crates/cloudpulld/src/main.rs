//! cloudpulld — the cloudpull collection daemon.
//!
//! Single binary that assembles the collector:
//! - Rule registry compiled from the TOML configuration
//! - Run-state store (redb) for watermarks and the instance-tag cache
//! - Fetch scheduler with per-region worker pools
//! - Output sink (proxy TCP stream, or dry-run logging)
//!
//! # Usage
//!
//! ```text
//! cloudpulld run --config collector.toml --replay metrics.json
//! cloudpulld check --config collector.toml
//! ```

mod replay;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use cloudpull_core::{CollectorConfig, MetricRegistry};
use cloudpull_engine::{
    CollectionRun, DryRunSink, EmitOptions, FetchScheduler, InstanceTagCache, OutputSink,
    PartitionPlan, ProxySink, RunOptions,
};
use cloudpull_state::RunStore;

use replay::ReplaySource;

#[derive(Parser)]
#[command(name = "cloudpulld", about = "cloudpull collection daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute one collection run.
    Run {
        /// Collector configuration file.
        #[arg(long)]
        config: PathBuf,

        /// Metric source fixture to replay.
        #[arg(long)]
        replay: PathBuf,

        /// Data directory for persistent run state.
        #[arg(long, default_value = "/var/lib/cloudpull")]
        data_dir: PathBuf,

        /// Log would-be output instead of sending it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate a configuration file and report what it would collect.
    Check {
        /// Collector configuration file.
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cloudpulld=debug,cloudpull=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            replay,
            data_dir,
            dry_run,
        } => run_collection(&config, &replay, &data_dir, dry_run).await,
        Command::Check { config } => check_config(&config),
    }
}

async fn run_collection(
    config_path: &PathBuf,
    replay_path: &PathBuf,
    data_dir: &PathBuf,
    dry_run: bool,
) -> anyhow::Result<()> {
    let config = CollectorConfig::from_file(config_path)?;
    let registry = Arc::new(MetricRegistry::compile(&config.rules)?);
    info!(rules = registry.len(), "rule registry compiled");

    std::fs::create_dir_all(data_dir)?;
    let store = RunStore::open(&data_dir.join("cloudpull.redb"))?;

    let source = Arc::new(ReplaySource::from_file(replay_path)?);
    info!(path = ?replay_path, "replay source loaded");

    let sink: Arc<dyn OutputSink> = if dry_run || config.proxy.dry_run {
        info!("dry-run sink selected");
        Arc::new(DryRunSink::new())
    } else {
        info!(host = %config.proxy.host, port = config.proxy.port, "proxy sink selected");
        Arc::new(ProxySink::new(config.proxy.host.clone(), config.proxy.port))
    };

    let run = CollectionRun::new(
        registry,
        source.clone(),
        FetchScheduler::new(source.clone()),
        InstanceTagCache::new(store.clone(), source, config.collector.ec2_tag_keys.clone()),
        sink.clone(),
        store,
        RunOptions {
            emit: EmitOptions::new(
                config.collector.namespace.clone(),
                config.collector.metric_name_prefix.clone(),
                config.collector.single_stat_has_suffix,
            ),
            filter: config.window_filter(),
            first_run_back_minutes: config.collector.first_run_back_minutes,
        },
    );

    let plans: Vec<PartitionPlan> = config
        .partitions()
        .into_iter()
        .map(|partition| {
            let workers = config.workers_for(&partition.region);
            PartitionPlan { partition, workers }
        })
        .collect();
    info!(partitions = plans.len(), "collection run starting");

    // Ctrl-C flips the cancel signal; in-flight fetches finish, no
    // watermark advances.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = cancel_tx.send(true);
        }
    });

    let result = run.execute(plans, cancel_rx).await;
    sink.close().await?;

    match result {
        Ok(summary) => {
            info!(
                partitions = summary.partitions,
                failed_partitions = summary.failed_partitions,
                candidates = summary.candidates,
                unmatched = summary.unmatched,
                fetched_metrics = summary.fetched_metrics,
                failed_metrics = summary.failed_metrics,
                emitted_records = summary.emitted_records,
                dropped_no_source = summary.dropped_no_source,
                cancelled = summary.cancelled,
                "collection run finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "collection run failed");
            Err(e.into())
        }
    }
}

fn check_config(config_path: &PathBuf) -> anyhow::Result<()> {
    let config = CollectorConfig::from_file(config_path)?;
    let registry = MetricRegistry::compile(&config.rules)?;

    let partitions = config.partitions();
    info!(
        rules = registry.len(),
        namespaces = registry.namespaces().len(),
        partitions = partitions.len(),
        "configuration is valid"
    );
    for partition in &partitions {
        info!(
            %partition,
            workers = config.workers_for(&partition.region),
            "partition"
        );
    }
    Ok(())
}
