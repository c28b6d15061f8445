mod cli;
mod config;
mod error;
mod logging;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use clap::Parser;
use dotenvy::dotenv;
use tokio::sync::Mutex;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::AppError;
use crate::logging::init_logging;

use library_circulation::{
    api::{self, AppState},
    auth::AccessGuard,
    cache::ResponseCache,
    db,
    loans::engine::LoanEngine,
    loans::store::{CatalogStore, LoanStore, MembershipStore},
    metrics::AppMetrics,
    reports::{ReportSink, WebhookSink},
    repository::SqliteLibrary,
    scheduler,
};

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let config = Config::from_env()
        .map_err(AppError::Config)
        .unwrap_or_else(|err| {
            tracing::error!("{}", err);
            std::process::exit(1);
        });

    let cli = Cli::parse();
    let port = cli.port.unwrap_or(config.port);
    let database_url = cli
        .database_url
        .clone()
        .unwrap_or_else(|| config.database_url.clone());
    let report_interval_seconds = cli.report_interval.unwrap_or(config.report_interval_seconds);
    let report_webhook_url = cli.report_webhook_url.clone().or(config.report_webhook_url);

    tracing::info!(port, %database_url, "Starting circulation service");

    let pool = db::create_pool(&database_url)
        .await
        .map_err(|err| AppError::Database(err.to_string()))
        .unwrap_or_else(|err| {
            tracing::error!("{}", err);
            std::process::exit(1);
        });

    let library = Arc::new(SqliteLibrary::new(pool));
    let catalog: Arc<dyn CatalogStore + Send + Sync> = library.clone();
    let membership: Arc<dyn MembershipStore + Send + Sync> = library.clone();
    let loans: Arc<dyn LoanStore + Send + Sync> = library;

    let engine = Arc::new(LoanEngine::new(catalog.clone(), membership.clone(), loans));
    let guard = Arc::new(AccessGuard::new(
        &config.auth_secret,
        config.token_ttl_seconds,
    ));
    let metrics = Arc::new(AppMetrics::new().unwrap_or_else(|err| {
        tracing::error!("Metrics registry failed: {}", err);
        std::process::exit(1);
    }));
    let summary_cache = Arc::new(Mutex::new(ResponseCache::new(StdDuration::from_secs(60))));

    match report_webhook_url {
        Some(url) => {
            let sink: Arc<dyn ReportSink + Send + Sync> = Arc::new(WebhookSink::new(url));
            tokio::spawn(scheduler::run_report_loop(
                catalog.clone(),
                sink,
                metrics.clone(),
                report_interval_seconds,
            ));
        }
        None => tracing::info!("REPORT_WEBHOOK_URL not set, catalog reports disabled"),
    }

    let app = api::build_router(AppState {
        engine,
        catalog,
        membership,
        guard,
        metrics,
        summary_cache,
    });

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|err| AppError::Network(err.to_string()))
        .unwrap_or_else(|err| {
            tracing::error!("{}", err);
            std::process::exit(1);
        });
    tracing::info!("Listening on {}", addr);

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("{}", AppError::Network(err.to_string()));
        std::process::exit(1);
    }
}
