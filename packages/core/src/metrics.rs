//! Prometheus metrics registry for the circulation service.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and pass it
//! to the router and the report scheduler.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`). The endpoint is intentionally excluded
//! from bearer-token auth so it can be scraped by Prometheus / Grafana
//! agents.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use prometheus::{Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Total number of completed loans.
    pub loans_total: Counter,
    /// Total number of completed returns.
    pub returns_total: Counter,
    /// Returns that carried a late fine.
    pub fines_assessed_total: Counter,
    /// Loan or return attempts lost to a concurrent writer.
    pub loan_conflicts_total: Counter,
    /// Current number of books out on loan.
    pub books_on_loan: Gauge,
    /// Catalog reports delivered to the webhook sink.
    pub reports_sent_total: Counter,
    /// Catalog report ticks that failed to build or deliver.
    pub report_errors_total: Counter,
    /// HTTP request count, labelled by method, path, and status code.
    pub http_requests_total: CounterVec,
    /// HTTP request latency histogram in seconds.
    pub http_request_duration: Histogram,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics. Returns an error if any metric
    /// name is invalid or duplicated (should not happen in practice).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let loans_total = Counter::with_opts(Opts::new(
            "library_circulation_loans_total",
            "Total completed loans",
        ))?;

        let returns_total = Counter::with_opts(Opts::new(
            "library_circulation_returns_total",
            "Total completed returns",
        ))?;

        let fines_assessed_total = Counter::with_opts(Opts::new(
            "library_circulation_fines_assessed_total",
            "Returns that exceeded the loan period",
        ))?;

        let loan_conflicts_total = Counter::with_opts(Opts::new(
            "library_circulation_loan_conflicts_total",
            "Loan transitions lost to a concurrent writer",
        ))?;

        let books_on_loan = Gauge::with_opts(Opts::new(
            "library_circulation_books_on_loan",
            "Current number of books out on loan",
        ))?;

        let reports_sent_total = Counter::with_opts(Opts::new(
            "library_circulation_reports_sent_total",
            "Catalog reports delivered to the webhook sink",
        ))?;

        let report_errors_total = Counter::with_opts(Opts::new(
            "library_circulation_report_errors_total",
            "Catalog report ticks that failed",
        ))?;

        let http_requests_total = CounterVec::new(
            Opts::new(
                "library_circulation_http_requests_total",
                "HTTP requests by method, path, and status",
            ),
            &["method", "path", "status"],
        )?;

        let http_request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "library_circulation_http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;

        registry.register(Box::new(loans_total.clone()))?;
        registry.register(Box::new(returns_total.clone()))?;
        registry.register(Box::new(fines_assessed_total.clone()))?;
        registry.register(Box::new(loan_conflicts_total.clone()))?;
        registry.register(Box::new(books_on_loan.clone()))?;
        registry.register(Box::new(reports_sent_total.clone()))?;
        registry.register(Box::new(report_errors_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;

        Ok(Self {
            loans_total,
            returns_total,
            fines_assessed_total,
            loan_conflicts_total,
            books_on_loan,
            reports_sent_total,
            report_errors_total,
            http_requests_total,
            http_request_duration,
            registry,
        })
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}

/// Axum middleware recording request count and latency for every route.
pub async fn track_http(
    State(metrics): State<Arc<AppMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    metrics
        .http_requests_total
        .with_label_values(&[&method, &path, &status])
        .inc();
    metrics
        .http_request_duration
        .observe(started.elapsed().as_secs_f64());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_metrics_register_without_error() {
        let metrics = AppMetrics::new();
        assert!(metrics.is_ok(), "AppMetrics::new() failed: {:?}", metrics.err());
    }

    #[test]
    fn render_names_counters_after_increment() {
        let metrics = AppMetrics::new().unwrap();
        metrics.loans_total.inc();
        let output = metrics.render().unwrap();
        assert!(output.contains("library_circulation_loans_total"));
    }

    #[test]
    fn counters_increment_correctly() {
        let metrics = AppMetrics::new().unwrap();
        metrics.loans_total.inc_by(3.0);
        metrics.fines_assessed_total.inc();
        assert!((metrics.loans_total.get() - 3.0).abs() < f64::EPSILON);
        assert!((metrics.fines_assessed_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn on_loan_gauge_moves_both_ways() {
        let metrics = AppMetrics::new().unwrap();
        metrics.books_on_loan.inc();
        metrics.books_on_loan.inc();
        metrics.books_on_loan.dec();
        assert!((metrics.books_on_loan.get() - 1.0).abs() < f64::EPSILON);
        metrics.books_on_loan.set(5.0);
        assert!((metrics.books_on_loan.get() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn http_requests_counter_vec_labels_work() {
        let metrics = AppMetrics::new().unwrap();
        metrics
            .http_requests_total
            .with_label_values(&["POST", "/books/1/loan", "204"])
            .inc();
        let val = metrics
            .http_requests_total
            .with_label_values(&["POST", "/books/1/loan", "204"])
            .get();
        assert!((val - 1.0).abs() < f64::EPSILON);
    }
}
