//! AITask worker binary.

use std::sync::Arc;

use aitask_backends::GenerationClient;
use aitask_models::TaskType;
use aitask_queue::{ParseQueueClient, QueueConfig, TaskQueue};
use aitask_storage::{ArtifactGateway, ObjectStore, S3Client, S3Config, StagingArea};
use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aitask_worker::{invoker_for, metrics, FulfillmentLoop, InvokerContext, TaskDispatcher, WorkerConfig};

/// Fulfill queued AI generation tasks of one type.
#[derive(Debug, Parser)]
#[command(name = "aitask-worker", version, about)]
struct Cli {
    /// Task type to serve: txt2img, img2img, txt2speech or speech2txt
    task_type: TaskType,

    /// Account the artifacts are stored under and reported as executor
    account_id: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    info!(task_type = %cli.task_type, account = %cli.account_id, "Starting aitask-worker");

    if let Err(e) = run(cli).await {
        error!("Worker failed to start: {:#}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = "aitask=info".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = WorkerConfig::from_env().context("worker config")?;
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        metrics::install_prometheus(port)?;
        info!("Prometheus metrics on port {}", port);
    }

    let queue_config = QueueConfig::from_env().context("queue config")?;
    let queue: Arc<dyn TaskQueue> = Arc::new(
        ParseQueueClient::new(queue_config, cli.account_id.clone())
            .context("queue client")?
            .with_filter_mode(config.filter_mode()),
    );

    let s3_config = S3Config::from_env().context("storage config")?;
    let s3 = S3Client::new(&s3_config);
    if let Err(e) = s3.check_connectivity().await {
        warn!("Object store not reachable yet: {}", e);
    }
    let store: Arc<dyn ObjectStore> = Arc::new(s3);
    let staging = StagingArea::create(&config.staging_dir)
        .await
        .with_context(|| format!("staging directory {}", config.staging_dir.display()))?;
    let gateway = Arc::new(ArtifactGateway::new(store, staging, s3_config.public_url.clone()));

    let backends = GenerationClient::from_env().context("backend client")?;
    let invoker = invoker_for(
        cli.task_type,
        InvokerContext::new(backends, gateway, cli.account_id.clone()),
    );

    let dispatcher = TaskDispatcher::new(
        &config,
        cli.task_type,
        cli.account_id.clone(),
        Arc::clone(&queue),
        invoker,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal, finishing current task");
        shutdown_tx.send_replace(true);
    });

    let mut worker = FulfillmentLoop::new(
        queue,
        dispatcher,
        cli.task_type,
        config.batch_size,
        config.idle_interval,
        shutdown_rx,
    );
    worker.run().await;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!("SIGTERM handler unavailable: {}", e);
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    tokio::signal::ctrl_c().await.ok();
}
