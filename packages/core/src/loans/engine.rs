//! Loan lifecycle engine.
//!
//! Stateless coordinator over the injected store contracts. Each mutating
//! operation reads fresh snapshots, checks preconditions in a fixed order,
//! and hands the updated pair to the loan store for an atomic two-record
//! commit. The engine keeps no book or user state of its own, so a lost
//! race surfaces as a conflict from the commit rather than a partial
//! write.
//!
//! Callers supply the operation time explicitly; the engine never reads
//! the clock.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::loans::error::{Entity, LoanError};
use crate::loans::policy;
use crate::loans::store::{CatalogStore, LoanStore, MembershipStore, StoreError};
use crate::loans::types::{Book, ReturnOutcome};

pub struct LoanEngine {
    catalog: Arc<dyn CatalogStore + Send + Sync>,
    membership: Arc<dyn MembershipStore + Send + Sync>,
    loans: Arc<dyn LoanStore + Send + Sync>,
}

impl LoanEngine {
    pub fn new(
        catalog: Arc<dyn CatalogStore + Send + Sync>,
        membership: Arc<dyn MembershipStore + Send + Sync>,
        loans: Arc<dyn LoanStore + Send + Sync>,
    ) -> Self {
        Self {
            catalog,
            membership,
            loans,
        }
    }

    /// Loan `book_id` to `user_id`, dating the loan at `now`.
    ///
    /// Precondition order is fixed: missing book, then missing user, then
    /// already on loan, then quota. A failed precondition changes
    /// nothing.
    pub async fn loan_book(
        &self,
        book_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), LoanError> {
        let mut book = self
            .catalog
            .find_book(book_id)
            .await?
            .ok_or_else(|| LoanError::not_found(Entity::Book, book_id))?;
        let mut user = self
            .membership
            .find_user(user_id)
            .await?
            .ok_or_else(|| LoanError::not_found(Entity::User, user_id))?;

        if book.on_loan {
            return Err(LoanError::already_loaned(book_id));
        }
        if user.loaned_books.len() >= policy::LOAN_QUOTA {
            return Err(LoanError::quota_exceeded(user_id, policy::LOAN_QUOTA));
        }

        book.on_loan = true;
        book.borrower_id = Some(user_id);
        book.loan_date = Some(now);
        user.loaned_books.push(book_id);

        self.loans.commit_loan(&book, &user).await?;
        tracing::info!("Book {} loaned to user {}", book_id, user_id);
        Ok(())
    }

    /// Return `book_id` from `user_id`, assessing the fine at `now`.
    ///
    /// Precondition order is fixed: missing book, then missing user, then
    /// not on loan, then wrong borrower.
    pub async fn return_book(
        &self,
        book_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ReturnOutcome, LoanError> {
        let mut book = self
            .catalog
            .find_book(book_id)
            .await?
            .ok_or_else(|| LoanError::not_found(Entity::Book, book_id))?;
        let mut user = self
            .membership
            .find_user(user_id)
            .await?
            .ok_or_else(|| LoanError::not_found(Entity::User, user_id))?;

        if !book.on_loan {
            return Err(LoanError::not_on_loan(book_id));
        }
        if book.borrower_id != Some(user_id) {
            return Err(LoanError::not_borrower(book_id, user_id));
        }
        let loan_date = book.loan_date.ok_or_else(|| {
            StoreError::corrupted(format!("book {} is on loan without a loan date", book_id))
        })?;

        let fine = policy::fine_payable(loan_date, now);

        book.on_loan = false;
        book.borrower_id = None;
        book.loan_date = None;
        user.loaned_books.retain(|id| *id != book_id);

        self.loans.commit_return(&book, &user).await?;
        tracing::info!(
            "Book {} returned by user {} (fine: {})",
            book_id,
            user_id,
            fine
        );
        Ok(ReturnOutcome {
            fine_payable: fine,
            message: policy::return_message(fine).to_string(),
        })
    }

    /// Fetch `book_id`, failing `NotFound` when absent.
    pub async fn get_book(&self, book_id: i64) -> Result<Book, LoanError> {
        self.catalog
            .find_book(book_id)
            .await?
            .ok_or_else(|| LoanError::not_found(Entity::Book, book_id))
    }

    /// The whole catalog, in id order.
    pub async fn list_books(&self) -> Result<Vec<Book>, LoanError> {
        Ok(self.catalog.list_books().await?)
    }

    /// Whether `book_id` is currently on loan.
    pub async fn is_on_loan(&self, book_id: i64) -> Result<bool, LoanError> {
        Ok(self.get_book(book_id).await?.on_loan)
    }

    /// All books not currently on loan, in id order.
    pub async fn available_books(&self) -> Result<Vec<Book>, LoanError> {
        Ok(self.catalog.list_available_books().await?)
    }
}
