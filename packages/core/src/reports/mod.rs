//! Scheduled catalog reporting: summary building and webhook delivery.

pub mod summary;
pub mod webhook;

pub use summary::{build_summary, render_html, CatalogSummary, SummaryLine};
pub use webhook::{ReportSink, WebhookSink};
