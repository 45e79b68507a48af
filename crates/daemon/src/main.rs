use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use feedrank_daemon::{
    config::{DaemonConfig, UpstreamConfig},
    engine::AggregationEngine,
    http,
    scheduler::{spawn_scheduler, Scheduler},
    store::SnapshotStore,
    upstream::HttpUpstream,
};
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "feedrank-daemon", version, about = "Polls the evaluation service and serves feed rankings")]
struct Args {
    /// Where the HTTP API will listen, e.g. 127.0.0.1:3000
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Base URL of the evaluation service.
    #[arg(long, env = "UPSTREAM_BASE_URL", default_value = "http://20.244.56.144/evaluation-service")]
    upstream_base_url: String,

    /// Bearer token forwarded on every upstream request.
    #[arg(long, env = "ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Seconds between refresh cycles.
    #[arg(long, env = "REFRESH_INTERVAL_SECS", default_value_t = 30)]
    refresh_interval_secs: u64,

    /// Per-request upstream timeout in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    request_timeout_secs: u64,

    /// Comment counts fetched concurrently per batch.
    #[arg(long, env = "COMMENT_BATCH_SIZE", default_value_t = 5)]
    comment_batch_size: usize,

    /// Log level (env-filter syntax).
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = DaemonConfig {
        listen: args.listen,
        upstream: UpstreamConfig {
            base_url: args.upstream_base_url,
            access_token: args.access_token.unwrap_or_default(),
            request_timeout_secs: args.request_timeout_secs,
        },
        refresh_interval_secs: args.refresh_interval_secs,
        comment_batch_size: args.comment_batch_size,
    };
    config.validate()?;

    info!("starting daemon with config: {:?}", config);

    let upstream = Arc::new(HttpUpstream::new(&config.upstream)?);
    let engine = Arc::new(AggregationEngine::new(upstream, config.comment_batch_size));
    let store = Arc::new(SnapshotStore::new());
    let scheduler = Scheduler::new(engine, Arc::clone(&store));

    let refresher = spawn_scheduler(scheduler.clone(), config.refresh_interval());

    let app = http::router(http::AppState::new(store, scheduler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    info!(listen = %config.listen, "daemon listening");
    axum::serve(tokio::net::TcpListener::bind(config.listen).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    refresher.abort();
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}
