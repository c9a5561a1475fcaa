//! hn30 binary entrypoint.
//! Loads configuration, opens the ledger, starts the refresh worker and serves
//! the read API until SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hn30::api::{self, AppState};
use hn30::cache::SnapshotCache;
use hn30::config::Config;
use hn30::enrich::{OpenGraphEnricher, ReadableTextExtractor};
use hn30::ledger::{Ledger, SqliteLedger};
use hn30::metrics::Metrics;
use hn30::notify::{DisabledSink, NotificationSink, OneSignalSink};
use hn30::proxy::FetchProxy;
use hn30::rate_limit::{RateLimitConfig, RateLimiter};
use hn30::refresh::{spawn_scheduler, RefreshConfig, RefreshEngine};
use hn30::replica::TursoReplica;
use hn30::source::HackerNewsSource;
use hn30::summarize::{DisabledSummarizer, GeminiSummarizer, Summarizer};

/// JSON logs by default; `LOG_FORMAT=compact` for local development.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hn30=info,tower_http=info,warn"));

    let compact = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("compact"))
        .unwrap_or(false);

    if compact {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().flatten_event(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Config::load reads .env, so it runs before tracing picks up RUST_LOG.
    let cfg = Config::load().context("load configuration")?;
    init_tracing();

    let addr = cfg.bind_addr()?;

    let ledger: Arc<dyn Ledger> = Arc::new(
        SqliteLedger::open(&cfg.sqlite_path)
            .with_context(|| format!("open ledger at {}", cfg.sqlite_path.display()))?,
    );
    info!(path = %cfg.sqlite_path.display(), "ledger ready");

    let metrics = Metrics::init()?;
    let cache = Arc::new(SnapshotCache::new());

    let notifier: Arc<dyn NotificationSink> = match cfg.onesignal.clone() {
        Some(creds) => Arc::new(OneSignalSink::new(creds)?),
        None => {
            warn!("ONESIGNAL_APP_ID/ONESIGNAL_KEY not set; push notifications disabled");
            Arc::new(DisabledSink)
        }
    };
    let summarizer: Arc<dyn Summarizer> = match cfg.gemini_api_key.clone() {
        Some(key) => Arc::new(GeminiSummarizer::new(key)?),
        None => {
            warn!("GEMINI_API_KEY not set; /summarize will fail");
            Arc::new(DisabledSummarizer)
        }
    };

    let mut engine = RefreshEngine::new(
        Arc::new(HackerNewsSource::new()?),
        Arc::new(OpenGraphEnricher::new()?),
        ledger.clone(),
        notifier,
        cache.clone(),
        RefreshConfig::from_config(&cfg),
    );
    match cfg.turso.clone() {
        Some(creds) => engine = engine.with_replica(Arc::new(TursoReplica::new(creds)?)),
        None => info!("TURSO_DATABASE_URL/TURSO_AUTH_TOKEN not set; replica sync disabled"),
    }
    let scheduler = spawn_scheduler(
        Arc::new(engine),
        Duration::from_secs(cfg.refresh.interval_secs),
    );

    let state = AppState {
        cache,
        limiter: Arc::new(RateLimiter::new(RateLimitConfig::default())),
        proxy: Arc::new(FetchProxy::new()?),
        extractor: Arc::new(ReadableTextExtractor::new()?),
        summarizer,
    };
    let app = api::router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "listening");

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = stop_rx.changed().await;
        })
        .await
    });

    shutdown_signal().await;
    info!("shutdown requested");
    let _ = stop_tx.send(true);

    match tokio::time::timeout(cfg.shutdown_grace(), server).await {
        Ok(Ok(Ok(()))) => info!("in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task failed"),
        Err(_) => warn!(
            grace_secs = cfg.server.shutdown_grace_secs,
            "grace period elapsed; dropping remaining connections"
        ),
    }

    scheduler.abort();
    if let Err(e) = ledger.close() {
        error!(error = %e, "failed to close ledger");
    }
    info!("bye");
    Ok(())
}
