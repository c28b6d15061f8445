//! Core records for the circulation domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Accepted book title length range, in characters.
pub const TITLE_MIN_CHARS: usize = 3;
pub const TITLE_MAX_CHARS: usize = 64;

/// A catalog entry.
///
/// The three loan fields move together: a book is either fully on loan
/// (flag set, borrower and loan date present) or fully available (flag
/// clear, both absent). Stores reject rows that violate this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author_id: i64,
    pub on_loan: bool,
    pub borrower_id: Option<i64>,
    pub loan_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Version observed at read time. Stores bump it on every write and
    /// refuse writes whose expected version went stale.
    #[serde(skip)]
    pub version: i64,
}

impl Book {
    /// `true` when flag, borrower, and loan date agree.
    pub fn loan_state_consistent(&self) -> bool {
        self.on_loan == self.borrower_id.is_some() && self.on_loan == self.loan_date.is_some()
    }
}

/// An author of catalog entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub name: String,
}

/// A registered library member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    /// Ids of books currently borrowed, in loan order, no duplicates.
    pub loaned_books: Vec<i64>,
    #[serde(skip)]
    pub version: i64,
}

/// Result of a completed return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnOutcome {
    pub fine_payable: bool,
    pub message: String,
}

/// Title length check shared by create and update paths.
pub fn valid_title(title: &str) -> bool {
    let chars = title.chars().count();
    (TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&chars)
}
