//! Store contracts consumed by the loan engine.
//!
//! Three narrow async contracts split the persistence surface: catalog
//! records, membership records, and the two-record loan commits. The
//! SQLite repository and the in-memory store implement all three, so the
//! engine runs unchanged against either backend.
//!
//! Writes are version-checked. Every book and user snapshot carries the
//! version observed at read time; a store applies a write only while the
//! stored version still matches, then bumps it. A missed check fails the
//! whole write with [`StoreError::Conflict`] and no partial state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::loans::types::{Author, Book, User};

/// Failures below the engine: connectivity, constraints, bad rows.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage unavailable: {message}")]
    Unavailable { message: String },

    #[error("record changed concurrently")]
    Conflict,

    #[error("duplicate value for {field}")]
    Duplicate { field: &'static str },

    #[error("stored record is inconsistent: {message}")]
    Corrupted { message: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable {
            message: message.into(),
        }
    }

    pub fn corrupted(message: impl Into<String>) -> Self {
        StoreError::Corrupted {
            message: message.into(),
        }
    }
}

/// Book and author records.
#[async_trait]
pub trait CatalogStore {
    async fn find_book(&self, id: i64) -> Result<Option<Book>, StoreError>;
    async fn list_books(&self) -> Result<Vec<Book>, StoreError>;
    async fn list_available_books(&self) -> Result<Vec<Book>, StoreError>;
    async fn create_book(
        &self,
        title: &str,
        author_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Book, StoreError>;
    async fn save_book(&self, book: &Book) -> Result<(), StoreError>;
    /// Deletes the book and any loan membership rows pointing at it.
    /// Returns `false` when no such book exists.
    async fn delete_book(&self, id: i64) -> Result<bool, StoreError>;

    async fn find_author(&self, id: i64) -> Result<Option<Author>, StoreError>;
    async fn list_authors(&self) -> Result<Vec<Author>, StoreError>;
    async fn create_author(&self, name: &str) -> Result<Author, StoreError>;
    async fn save_author(&self, author: &Author) -> Result<bool, StoreError>;
    /// Deletes the author together with all of their books (and those
    /// books' loan membership rows). Returns `false` when absent.
    async fn delete_author(&self, id: i64) -> Result<bool, StoreError>;
}

/// User records and their loaned sets.
#[async_trait]
pub trait MembershipStore {
    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn create_user(
        &self,
        full_name: &str,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError>;
    async fn save_user(&self, user: &User) -> Result<(), StoreError>;
}

/// Atomic two-record commits for loan transitions.
///
/// The engine prepares both updated snapshots and hands them over as a
/// pair; the store lands both or neither. Either snapshot being stale
/// fails the commit with [`StoreError::Conflict`].
#[async_trait]
pub trait LoanStore {
    async fn commit_loan(&self, book: &Book, user: &User) -> Result<(), StoreError>;
    async fn commit_return(&self, book: &Book, user: &User) -> Result<(), StoreError>;
}
