mod cli;
mod config;
mod metrics;
#[cfg(test)]
mod testing;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use clap::Parser as _;
use collector_data::slurm::SlurmCli;
use color_eyre::{
    eyre::{bail, Context as _},
    Result,
};
use prometheus_client::registry::Registry;
use tokio::{net::TcpListener, signal, sync::Notify};
use tracing::{error, info, warn, Level};

use crate::{
    cli::Args,
    config::Settings,
    metrics::{build_registry, render},
};

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    register_logging(args.log_level)?;

    info!("Loading config");
    let settings = Settings::load(&args).wrap_err("parsing config file")?;
    info!(?settings, "config loaded");

    let registry = Arc::new(build_registry(&settings.collectors, Arc::new(SlurmCli)));

    if args.once {
        let exposition = scrape(registry).await?;
        print!("{exposition}");
        return Ok(());
    }

    serve(&settings, registry).await
}

fn register_logging(level: Level) -> Result<()> {
    // stdout is reserved for `--once` output
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).wrap_err("setting default subscriber failed")
}

/// Encode the registry on the blocking pool, the collectors wait for Slurm commands.
async fn scrape(registry: Arc<Registry>) -> Result<String> {
    tokio::task::spawn_blocking(move || render(&registry))
        .await
        .wrap_err("scrape task failed")?
}

#[derive(Clone)]
struct AppState {
    registry: Arc<Registry>,
    fail_fast: bool,
    /// Set by a failed scrape when `fail_fast` is on.
    failed: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

async fn serve(settings: &Settings, registry: Arc<Registry>) -> Result<()> {
    let state = AppState {
        registry,
        fail_fast: settings.fail_fast,
        failed: Arc::default(),
        shutdown: Arc::default(),
    };

    let listener = TcpListener::bind(settings.listen_addr())
        .await
        .wrap_err_with(|| format!("binding {}", settings.listen_addr()))?;
    info!("Serving http://{}/metrics", settings.listen_addr());

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&state.shutdown)))
        .await
        .wrap_err("serving metrics")?;

    if state.failed.load(Ordering::SeqCst) {
        bail!("stopped after a failed scrape");
    }
    info!("Shut down");
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn index() -> &'static str {
    "Slurm exporter\n\nMetrics are served at /metrics\n"
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match scrape(Arc::clone(&state.registry)).await {
        Ok(exposition) => ([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], exposition).into_response(),
        Err(e) => {
            error!("scrape failed: {e:?}");
            if state.fail_fast {
                state.failed.store(true, Ordering::SeqCst);
                state.shutdown.notify_one();
            }
            (StatusCode::INTERNAL_SERVER_ERROR, "collecting metrics failed, see the exporter log\n").into_response()
        }
    }
}

async fn shutdown_signal(scrape_failed: Arc<Notify>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(?e, "listening for Ctrl-C failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(?e, "listening for SIGTERM failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
        _ = scrape_failed.notified() => warn!("Scrape failed with fail_fast set, shutting down"),
    }
}
