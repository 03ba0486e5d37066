use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use pinba_collector::args::{Cli, Command, GenerateArgs, ServeArgs};
use pinba_collector::config::Config;
use pinba_collector::exporter::Exporter;
use pinba_collector::service::Service;
use pinba_collector::{load_generator, logging, server, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::Generate(args) => generate(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    // ── 1. Configuration ─────────────────────────────────────────
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    // ── 2. View registry ─────────────────────────────────────────
    let registry = Arc::new(config.registry_builder()?.finish());
    info!(views = ?registry.view_names(), "view registry configured");

    // ── 3. Receiver ──────────────────────────────────────────────
    let mut service = Service::new(Arc::clone(&registry), config.endpoint());
    service.start().context("starting receiver")?;

    // ── 4. Exporter ──────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let exporter = Arc::new(Exporter::new(Arc::clone(&registry)));
    let exporter_task = tokio::spawn(
        Arc::clone(&exporter).run(config.export_interval(), cancel.clone()),
    );

    let state = Arc::new(AppState {
        service: tokio::sync::Mutex::new(service),
        exporter,
    });

    // ── 5. HTTP API (optional) ───────────────────────────────────
    let http_task = match config.http_addr()? {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding HTTP API to {addr}"))?;
            info!(%addr, "HTTP API listening");

            let app = server::create_router(Arc::clone(&state));
            let shutdown = cancel.clone();
            Some(tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await
            }))
        }
        None => None,
    };

    // ── 6. Run until Ctrl-C ──────────────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutting down");

    cancel.cancel();
    if let Some(task) = http_task {
        task.await.context("HTTP task panicked")?.context("HTTP server")?;
    }
    exporter_task.await.context("exporter task panicked")?;
    state.service.lock().await.stop().await;

    drop(state);
    if let Ok(registry) = Arc::try_unwrap(registry) {
        registry.teardown();
    }
    Ok(())
}

async fn generate(args: GenerateArgs) -> Result<()> {
    let running = Arc::new(AtomicBool::new(false));

    let stop = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.store(false, Ordering::SeqCst);
        }
    });

    info!(
        collector = %args.target,
        concurrency = args.concurrency,
        duration_secs = args.duration_secs,
        "sending synthetic traffic"
    );
    let sent = load_generator::run(
        running,
        args.target,
        args.concurrency,
        Duration::from_secs(args.duration_secs),
        args.seed,
    )
    .await;

    info!(sent, "done");
    Ok(())
}
