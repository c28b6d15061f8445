//! Report delivery over HTTP.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::AppError;
use crate::reports::summary::{render_html, CatalogSummary};

/// Destination for finished catalog reports.
#[async_trait]
pub trait ReportSink {
    async fn deliver(&self, summary: &CatalogSummary) -> Result<(), AppError>;
}

/// Posts rendered HTML reports to a configured webhook URL.
pub struct WebhookSink {
    url: String,
    http: Client,
}

impl WebhookSink {
    pub fn new(url: String) -> Self {
        Self {
            url,
            http: Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReportSink for WebhookSink {
    async fn deliver(&self, summary: &CatalogSummary) -> Result<(), AppError> {
        let html = render_html(summary);
        let response = self
            .http
            .post(&self.url)
            .header("content-type", "text/html; charset=utf-8")
            .body(html)
            .send()
            .await
            .map_err(|err| AppError::Network(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Network(format!(
                "report webhook answered HTTP {}",
                response.status()
            )));
        }

        tracing::debug!("Catalog report posted to {}", self.url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::reports::summary::SummaryLine;

    fn make_summary() -> CatalogSummary {
        CatalogSummary {
            generated_at: Utc::now(),
            total_books: 1,
            books_on_loan: 1,
            books_available: 0,
            books_overdue: 0,
            lines: vec![SummaryLine {
                book_id: 1,
                title: "Piranesi".to_string(),
                author: "Susanna Clarke".to_string(),
                on_loan: true,
                overdue: false,
            }],
        }
    }

    #[tokio::test]
    async fn delivers_html_body_to_the_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/report"))
            .and(header("content-type", "text/html; charset=utf-8"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = WebhookSink::new(format!("{}/report", server.uri()));
        sink.deliver(&make_summary()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        assert!(body.contains("Piranesi"));
        assert!(body.contains("<h1>Library catalog report</h1>"));
    }

    #[tokio::test]
    async fn non_success_status_is_a_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = WebhookSink::new(server.uri());
        let err = sink.deliver(&make_summary()).await.unwrap_err();
        assert!(matches!(err, AppError::Network(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        // Port 9 (discard) is assumed closed.
        let sink = WebhookSink::new("http://127.0.0.1:9/report".to_string());
        let err = sink.deliver(&make_summary()).await.unwrap_err();
        assert!(matches!(err, AppError::Network(_)));
    }
}
