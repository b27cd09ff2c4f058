use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use axum::middleware;
use tokio::signal;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use vote_service::{
    config::{Config, ContentConfig},
    content::build_store,
    database::{
        path::{validate_content_dir, validate_db_path},
        Database,
    },
    ledger::build_ledger,
    middleware::inject_client_ip,
    recovery::recover,
    routes::{router, BUILD_GIT_HASH},
    state::AppState,
    BatchTrigger, Committer, ProofVerifier,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting vote service ({})", BUILD_GIT_HASH);

    let config = Config::from_env()?;
    validate_db_path(&config.db_path)?;
    if let ContentConfig::Local { dir } = &config.content {
        validate_content_dir(dir)?;
    }

    let db = Database::connect(&config.db_path).await?;
    info!("Database initialized successfully");

    let ledger = build_ledger(&config.ledger, config.pipeline.ledger_timeout).await?;
    let content = build_store(&config.content, config.max_content_bytes)?;
    info!("Ledger: {:?}, content store: {:?}", config.ledger, config.content);

    let committer = Arc::new(Committer::new(
        db.clone(),
        ledger.clone(),
        content.clone(),
        config.pipeline.clone(),
    ));
    let report = recover(&committer).await?;
    if report.stalled > 0 {
        info!("{} commitments remain stalled after recovery", report.stalled);
    }

    let (trigger, trigger_task) = BatchTrigger::spawn(
        committer.clone(),
        config.pipeline.batch_threshold,
        config.commit_interval,
        config.pipeline.retry_backoff,
    );

    let state = AppState {
        db: db.clone(),
        db_path: config.db_path.clone(),
        committer,
        verifier: ProofVerifier::new(db, ledger, content, config.pipeline.ledger_timeout),
        trigger: trigger.clone(),
        batch_threshold: config.pipeline.batch_threshold,
        metrics_token: config.metrics_token.clone(),
    };

    let governor_conf = GovernorConfigBuilder::default()
        .per_second(config.rate_limit_per_second)
        .burst_size(config.rate_limit_burst)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit configuration"))?;
    info!(
        "Rate limiting: {} req/sec per IP (burst {})",
        config.rate_limit_per_second, config.rate_limit_burst
    );

    let app = router(state)
        .layer(GovernorLayer {
            config: Arc::new(governor_conf),
        })
        .layer(middleware::from_fn(inject_client_ip));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Stopping batch trigger");
    trigger.shutdown().await;
    trigger_task.await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
