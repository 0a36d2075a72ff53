mod classify;
mod config;
mod error;
mod handlers;
mod models;
mod normalize;
mod state;
mod telemetry;
mod upstream;
mod validate;

use anyhow::Context;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LoggingConfig};
use crate::state::AppState;
use crate::telemetry::Telemetry;

fn parse_level(level: &str) -> LevelFilter {
    match level {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

fn open_log_file(path: &str) -> Option<std::fs::File> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            eprintln!("log file create dir error: {}", err);
            return None;
        }
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(err) => {
            eprintln!("log file open error: {}", err);
            None
        }
    }
}

fn init_logging(logging: &LoggingConfig) {
    let file_writer = logging.file.as_deref().and_then(open_log_file).map(Arc::new);
    let writer = match (logging.stdout, file_writer) {
        (true, Some(file)) => BoxMakeWriter::new(std::io::stdout.and(file)),
        (true, None) => BoxMakeWriter::new(std::io::stdout),
        (false, Some(file)) => BoxMakeWriter::new(file),
        (false, None) => BoxMakeWriter::new(std::io::stdout),
    };

    let level = parse_level(logging.level.as_str());
    let fmt_layer = if logging.format == "json" {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_filter(level)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_filter(level)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(tracing_opentelemetry::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("ctrl-c handler error: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!("SIGTERM handler error: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("config error")?;

    let telemetry = Telemetry::init(&config.observability);
    init_logging(&config.observability.logging);

    tracing::info!(
        model = %config.upstream.model,
        inference_url = %config.inference_url(),
        timeout_ms = config.upstream.timeout_ms,
        tracing_exporter = ?config.observability.exporters.tracing,
        metrics_exporter = ?config.observability.exporters.metrics,
        "chat proxy configured"
    );
    if config.credential().is_none() {
        tracing::warn!("HF_API_KEY is not set; upstream calls will be sent without credentials");
    }

    let bind_addr = config.server.bind_addr.clone();
    let state = AppState::new(config, telemetry.metrics.clone()).context("client build error")?;
    let app = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("bind error on {}", bind_addr))?;

    tracing::info!("listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    telemetry.shutdown();
    Ok(())
}
