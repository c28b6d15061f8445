//! Catalog report scheduler.
//!
//! Drives the periodic reporting loop: each tick builds a catalog
//! summary from store reads and hands it to the configured report sink.
//! Reporting never mutates loan state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::signal;
use tokio::time;

use crate::loans::store::CatalogStore;
use crate::metrics::AppMetrics;
use crate::reports::{build_summary, ReportSink};

/// Run the report loop.
///
/// On each tick:
/// 1. Build a `CatalogSummary` from the catalog store
/// 2. Refresh the books-on-loan gauge from the summary
/// 3. Deliver the summary through `sink`
///
/// Errors are logged and the loop continues; a single failed report
/// should never take down the scheduler.
///
/// Runs until `Ctrl+C` (SIGINT) is received.
pub async fn run_report_loop(
    catalog: Arc<dyn CatalogStore + Send + Sync>,
    sink: Arc<dyn ReportSink + Send + Sync>,
    metrics: Arc<AppMetrics>,
    report_interval_seconds: u64,
) {
    let mut interval = time::interval(Duration::from_secs(report_interval_seconds));

    tracing::info!(
        "Catalog reporting started (interval: {}s)",
        report_interval_seconds
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                report_once(&catalog, &sink, &metrics).await;
            }

            _ = signal::ctrl_c() => {
                tracing::info!("Shutdown signal received. Stopping reporting.");
                break;
            }
        }
    }

    tracing::info!("Catalog reporting stopped cleanly");
}

/// Execute a single report cycle. Extracted for testability.
async fn report_once(
    catalog: &Arc<dyn CatalogStore + Send + Sync>,
    sink: &Arc<dyn ReportSink + Send + Sync>,
    metrics: &Arc<AppMetrics>,
) {
    let summary = match build_summary(catalog, Utc::now()).await {
        Ok(summary) => summary,
        Err(err) => {
            metrics.report_errors_total.inc();
            tracing::error!("Report build error, skipping tick: {}", err);
            return;
        }
    };

    metrics.books_on_loan.set(summary.books_on_loan as f64);

    match sink.deliver(&summary).await {
        Ok(()) => {
            metrics.reports_sent_total.inc();
            tracing::info!(
                "Catalog report delivered ({} books, {} on loan)",
                summary.total_books,
                summary.books_on_loan
            );
        }
        Err(err) => {
            metrics.report_errors_total.inc();
            tracing::error!("Report delivery error: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::AppError;
    use crate::reports::CatalogSummary;
    use crate::store::MemoryLibrary;

    /// Sink that records every delivered summary.
    struct RecordingSink {
        delivered: Mutex<Vec<CatalogSummary>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ReportSink for RecordingSink {
        async fn deliver(&self, summary: &CatalogSummary) -> Result<(), AppError> {
            self.delivered.lock().unwrap().push(summary.clone());
            Ok(())
        }
    }

    /// Sink that always fails.
    struct FailingSink;

    #[async_trait]
    impl ReportSink for FailingSink {
        async fn deliver(&self, _summary: &CatalogSummary) -> Result<(), AppError> {
            Err(AppError::Network("sink offline".to_string()))
        }
    }

    async fn seeded_catalog() -> Arc<dyn CatalogStore + Send + Sync> {
        let store = Arc::new(MemoryLibrary::new());
        let author = store.create_author("Ann Leckie").await.unwrap();
        store
            .create_book("Ancillary Justice", author.id, Utc::now())
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn report_once_delivers_summary_to_sink() {
        let catalog = seeded_catalog().await;
        let sink = Arc::new(RecordingSink::new());
        let metrics = Arc::new(AppMetrics::new().unwrap());

        let sink_dyn: Arc<dyn ReportSink + Send + Sync> = sink.clone();
        report_once(&catalog, &sink_dyn, &metrics).await;

        let delivered = sink.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].total_books, 1);
        assert_eq!(delivered[0].lines[0].title, "Ancillary Justice");
        assert!((metrics.reports_sent_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn report_once_refreshes_the_on_loan_gauge() {
        let catalog = seeded_catalog().await;
        let sink: Arc<dyn ReportSink + Send + Sync> = Arc::new(RecordingSink::new());
        let metrics = Arc::new(AppMetrics::new().unwrap());

        // Pretend a stale value was left behind.
        metrics.books_on_loan.set(42.0);
        report_once(&catalog, &sink, &metrics).await;

        assert!((metrics.books_on_loan.get() - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn failed_delivery_counts_an_error_and_no_send() {
        let catalog = seeded_catalog().await;
        let sink: Arc<dyn ReportSink + Send + Sync> = Arc::new(FailingSink);
        let metrics = Arc::new(AppMetrics::new().unwrap());

        report_once(&catalog, &sink, &metrics).await;

        assert!((metrics.report_errors_total.get() - 1.0).abs() < f64::EPSILON);
        assert!((metrics.reports_sent_total.get() - 0.0).abs() < f64::EPSILON);
    }
}
