//! Error taxonomy for loan lifecycle operations.

use thiserror::Error;

use crate::loans::store::StoreError;

/// Entity names used in not-found errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Book,
    User,
    Author,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Book => write!(f, "book"),
            Entity::User => write!(f, "user"),
            Entity::Author => write!(f, "author"),
        }
    }
}

/// Failures surfaced by the loan engine.
///
/// Version conflicts from the store are folded into [`LoanError::Conflict`]
/// so callers see one retryable kind; everything else the store reports
/// stays wrapped in [`LoanError::Store`].
#[derive(Error, Debug)]
pub enum LoanError {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },

    #[error("book {book_id} is already on loan")]
    AlreadyLoaned { book_id: i64 },

    #[error("book {book_id} is not on loan")]
    NotOnLoan { book_id: i64 },

    #[error("user {user_id} already has {limit} books on loan")]
    QuotaExceeded { user_id: i64, limit: usize },

    #[error("book {book_id} is not on loan to user {user_id}")]
    NotBorrower { book_id: i64, user_id: i64 },

    #[error("record changed concurrently, retry the operation")]
    Conflict,

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for LoanError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => LoanError::Conflict,
            other => LoanError::Store(other),
        }
    }
}

impl LoanError {
    pub fn not_found(entity: Entity, id: i64) -> Self {
        LoanError::NotFound { entity, id }
    }

    pub fn already_loaned(book_id: i64) -> Self {
        LoanError::AlreadyLoaned { book_id }
    }

    pub fn not_on_loan(book_id: i64) -> Self {
        LoanError::NotOnLoan { book_id }
    }

    pub fn quota_exceeded(user_id: i64, limit: usize) -> Self {
        LoanError::QuotaExceeded { user_id, limit }
    }

    pub fn not_borrower(book_id: i64, user_id: i64) -> Self {
        LoanError::NotBorrower { book_id, user_id }
    }
}
