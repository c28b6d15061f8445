//! Point-in-time catalog summary.
//!
//! Built from catalog reads only; generating a report never touches loan
//! state. The same summary feeds the `/reports/summary` endpoint and the
//! scheduled webhook delivery.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::loans::policy::fine_payable;
use crate::loans::store::{CatalogStore, StoreError};

/// One book in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryLine {
    pub book_id: i64,
    pub title: String,
    pub author: String,
    pub on_loan: bool,
    /// On loan past the fine window as of `generated_at`.
    pub overdue: bool,
}

/// The whole report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub generated_at: DateTime<Utc>,
    pub total_books: usize,
    pub books_on_loan: usize,
    pub books_available: usize,
    pub books_overdue: usize,
    pub lines: Vec<SummaryLine>,
}

/// Build a summary of every book with its author name and loan status,
/// in catalog (id) order. `now` anchors the overdue check and is
/// recorded as `generated_at`.
pub async fn build_summary(
    catalog: &Arc<dyn CatalogStore + Send + Sync>,
    now: DateTime<Utc>,
) -> Result<CatalogSummary, StoreError> {
    let books = catalog.list_books().await?;
    let authors = catalog.list_authors().await?;
    let names: HashMap<i64, String> = authors.into_iter().map(|a| (a.id, a.name)).collect();

    let lines: Vec<SummaryLine> = books
        .iter()
        .map(|book| SummaryLine {
            book_id: book.id,
            title: book.title.clone(),
            author: names
                .get(&book.author_id)
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
            on_loan: book.on_loan,
            overdue: book.loan_date.map_or(false, |date| fine_payable(date, now)),
        })
        .collect();

    let books_on_loan = lines.iter().filter(|line| line.on_loan).count();
    let books_overdue = lines.iter().filter(|line| line.overdue).count();
    Ok(CatalogSummary {
        generated_at: now,
        total_books: lines.len(),
        books_on_loan,
        books_available: lines.len() - books_on_loan,
        books_overdue,
        lines,
    })
}

/// Render the summary as a small HTML document for webhook delivery.
pub fn render_html(summary: &CatalogSummary) -> String {
    let mut rows = String::new();
    for line in &summary.lines {
        let status = if line.overdue {
            "overdue"
        } else if line.on_loan {
            "on loan"
        } else {
            "available"
        };
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&line.title),
            escape(&line.author),
            status,
        ));
    }
    format!(
        "<h1>Library catalog report</h1>\
         <p>Generated {}: {} books, {} on loan ({} overdue).</p>\
         <table><tr><th>Title</th><th>Author</th><th>Status</th></tr>{}</table>",
        summary.generated_at.to_rfc3339(),
        summary.total_books,
        summary.books_on_loan,
        summary.books_overdue,
        rows,
    )
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loans::store::{LoanStore, MembershipStore};
    use crate::store::MemoryLibrary;

    async fn seeded_catalog() -> Arc<dyn CatalogStore + Send + Sync> {
        let store = Arc::new(MemoryLibrary::new());
        let now = Utc::now();
        let author = store.create_author("Ted Chiang").await.unwrap();
        let kept = store
            .create_book("Stories of Your Life", author.id, now)
            .await
            .unwrap();
        store.create_book("Exhalation", author.id, now).await.unwrap();

        let user = store
            .create_user("Louise", "louise@example.com", "h", now)
            .await
            .unwrap();
        let mut loaned = kept.clone();
        let mut borrower = user.clone();
        loaned.on_loan = true;
        loaned.borrower_id = Some(user.id);
        loaned.loan_date = Some(now);
        borrower.loaned_books.push(kept.id);
        store.commit_loan(&loaned, &borrower).await.unwrap();

        store
    }

    #[tokio::test]
    async fn summary_counts_and_resolves_authors() {
        let catalog = seeded_catalog().await;
        let now = Utc::now();
        let summary = build_summary(&catalog, now).await.unwrap();

        assert_eq!(summary.generated_at, now);
        assert_eq!(summary.total_books, 2);
        assert_eq!(summary.books_on_loan, 1);
        assert_eq!(summary.books_available, 1);
        assert_eq!(summary.books_overdue, 0);
        assert_eq!(summary.lines[0].author, "Ted Chiang");
        assert!(summary.lines[0].on_loan);
        assert!(!summary.lines[1].on_loan);
    }

    #[tokio::test]
    async fn loans_past_the_fine_window_count_as_overdue() {
        let catalog = seeded_catalog().await;
        // Eight days after the loan date the loaned book is overdue.
        let later = Utc::now() + chrono::Duration::days(8);
        let summary = build_summary(&catalog, later).await.unwrap();

        assert_eq!(summary.books_on_loan, 1);
        assert_eq!(summary.books_overdue, 1);
        assert!(summary.lines[0].overdue);
        assert!(!summary.lines[1].overdue);
        assert!(render_html(&summary).contains("<td>overdue</td>"));
    }

    #[tokio::test]
    async fn summary_of_empty_catalog_is_empty() {
        let catalog: Arc<dyn CatalogStore + Send + Sync> = Arc::new(MemoryLibrary::new());
        let summary = build_summary(&catalog, Utc::now()).await.unwrap();
        assert_eq!(summary.total_books, 0);
        assert_eq!(summary.books_on_loan, 0);
        assert_eq!(summary.books_available, 0);
        assert!(summary.lines.is_empty());
    }

    #[tokio::test]
    async fn unresolved_author_renders_as_unknown() {
        let store = Arc::new(MemoryLibrary::new());
        // The in-memory store does not validate author ids, which makes
        // the fallback reachable.
        store.create_book("Orphan", 999, Utc::now()).await.unwrap();
        let catalog: Arc<dyn CatalogStore + Send + Sync> = store;

        let summary = build_summary(&catalog, Utc::now()).await.unwrap();
        assert_eq!(summary.lines[0].author, "unknown");
        assert!(render_html(&summary).contains("<td>unknown</td>"));
    }

    #[tokio::test]
    async fn html_report_escapes_and_lists_rows() {
        let catalog = seeded_catalog().await;
        let mut summary = build_summary(&catalog, Utc::now()).await.unwrap();
        summary.lines[0].title = "Tags & <Brackets>".to_string();

        let html = render_html(&summary);
        assert!(html.starts_with("<h1>Library catalog report</h1>"));
        assert!(html.contains("Tags &amp; &lt;Brackets&gt;"));
        assert!(html.contains("<td>on loan</td>"));
        assert!(html.contains("<td>available</td>"));
        assert!(html.contains("2 books, 1 on loan (0 overdue)"));
    }
}
