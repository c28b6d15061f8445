//! In-memory store for the circulation service.
//!
//! `MemoryLibrary` implements the same three contracts as the SQLite
//! repository, backed by maps behind one mutex. The loan engine and its
//! tests run against it without a database, and the concurrency rules
//! stay honest: commits check record versions exactly like the
//! repository does, and the two-record commit checks both versions
//! before touching either record.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::loans::store::{CatalogStore, LoanStore, MembershipStore, StoreError};
use crate::loans::types::{Author, Book, User};

#[derive(Default)]
struct Tables {
    books: HashMap<i64, Book>,
    authors: HashMap<i64, Author>,
    users: HashMap<i64, User>,
    next_book_id: i64,
    next_author_id: i64,
    next_user_id: i64,
}

impl Tables {
    /// Drop `book_id` from every user's loaned set.
    fn scrub_loans(&mut self, book_id: i64) {
        for user in self.users.values_mut() {
            user.loaned_books.retain(|id| *id != book_id);
        }
    }
}

pub struct MemoryLibrary {
    inner: Mutex<Tables>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Tables {
                next_book_id: 1,
                next_author_id: 1,
                next_user_id: 1,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::unavailable("store lock poisoned"))
    }
}

impl Default for MemoryLibrary {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogStore for MemoryLibrary {
    async fn find_book(&self, id: i64) -> Result<Option<Book>, StoreError> {
        Ok(self.lock()?.books.get(&id).cloned())
    }

    async fn list_books(&self) -> Result<Vec<Book>, StoreError> {
        let mut books: Vec<Book> = self.lock()?.books.values().cloned().collect();
        books.sort_by_key(|b| b.id);
        Ok(books)
    }

    async fn list_available_books(&self) -> Result<Vec<Book>, StoreError> {
        let mut books: Vec<Book> = self
            .lock()?
            .books
            .values()
            .filter(|b| !b.on_loan)
            .cloned()
            .collect();
        books.sort_by_key(|b| b.id);
        Ok(books)
    }

    async fn create_book(
        &self,
        title: &str,
        author_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Book, StoreError> {
        let mut tables = self.lock()?;
        let id = tables.next_book_id;
        tables.next_book_id += 1;
        let book = Book {
            id,
            title: title.to_string(),
            author_id,
            on_loan: false,
            borrower_id: None,
            loan_date: None,
            created_at: now,
            version: 0,
        };
        tables.books.insert(id, book.clone());
        Ok(book)
    }

    async fn save_book(&self, book: &Book) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let current = tables.books.get_mut(&book.id).ok_or(StoreError::Conflict)?;
        if current.version != book.version {
            return Err(StoreError::Conflict);
        }
        *current = Book {
            version: book.version + 1,
            ..book.clone()
        };
        Ok(())
    }

    async fn delete_book(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        let removed = tables.books.remove(&id).is_some();
        if removed {
            tables.scrub_loans(id);
        }
        Ok(removed)
    }

    async fn find_author(&self, id: i64) -> Result<Option<Author>, StoreError> {
        Ok(self.lock()?.authors.get(&id).cloned())
    }

    async fn list_authors(&self) -> Result<Vec<Author>, StoreError> {
        let mut authors: Vec<Author> = self.lock()?.authors.values().cloned().collect();
        authors.sort_by_key(|a| a.id);
        Ok(authors)
    }

    async fn create_author(&self, name: &str) -> Result<Author, StoreError> {
        let mut tables = self.lock()?;
        let id = tables.next_author_id;
        tables.next_author_id += 1;
        let author = Author {
            id,
            name: name.to_string(),
        };
        tables.authors.insert(id, author.clone());
        Ok(author)
    }

    async fn save_author(&self, author: &Author) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        match tables.authors.get_mut(&author.id) {
            Some(current) => {
                current.name = author.name.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_author(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        if tables.authors.remove(&id).is_none() {
            return Ok(false);
        }
        let orphaned: Vec<i64> = tables
            .books
            .values()
            .filter(|b| b.author_id == id)
            .map(|b| b.id)
            .collect();
        for book_id in orphaned {
            tables.books.remove(&book_id);
            tables.scrub_loans(book_id);
        }
        Ok(true)
    }
}

#[async_trait]
impl MembershipStore for MemoryLibrary {
    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn create_user(
        &self,
        full_name: &str,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let mut tables = self.lock()?;
        if tables.users.values().any(|u| u.email == email) {
            return Err(StoreError::Duplicate { field: "email" });
        }
        let id = tables.next_user_id;
        tables.next_user_id += 1;
        let user = User {
            id,
            full_name: full_name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            loaned_books: Vec::new(),
            version: 0,
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let current = tables.users.get_mut(&user.id).ok_or(StoreError::Conflict)?;
        if current.version != user.version {
            return Err(StoreError::Conflict);
        }
        *current = User {
            version: user.version + 1,
            ..user.clone()
        };
        Ok(())
    }
}

#[async_trait]
impl LoanStore for MemoryLibrary {
    async fn commit_loan(&self, book: &Book, user: &User) -> Result<(), StoreError> {
        self.commit_pair(book, user)
    }

    async fn commit_return(&self, book: &Book, user: &User) -> Result<(), StoreError> {
        self.commit_pair(book, user)
    }
}

impl MemoryLibrary {
    /// Apply a book/user snapshot pair under one lock. Both version
    /// checks run before either write, so a stale snapshot leaves both
    /// records untouched.
    fn commit_pair(&self, book: &Book, user: &User) -> Result<(), StoreError> {
        let mut tables = self.lock()?;

        let book_ok = tables
            .books
            .get(&book.id)
            .map(|current| current.version == book.version)
            .unwrap_or(false);
        let user_ok = tables
            .users
            .get(&user.id)
            .map(|current| current.version == user.version)
            .unwrap_or(false);
        if !book_ok || !user_ok {
            return Err(StoreError::Conflict);
        }

        tables.books.insert(
            book.id,
            Book {
                version: book.version + 1,
                ..book.clone()
            },
        );
        tables.users.insert(
            user.id,
            User {
                version: user.version + 1,
                ..user.clone()
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    async fn seeded() -> (MemoryLibrary, Author, Book, User) {
        let store = MemoryLibrary::new();
        let author = store.create_author("Ursula K. Le Guin").await.unwrap();
        let book = store
            .create_book("The Dispossessed", author.id, now())
            .await
            .unwrap();
        let user = store
            .create_user("Shevek", "shevek@example.com", "hash", now())
            .await
            .unwrap();
        (store, author, book, user)
    }

    fn loaned_snapshot(book: &Book, user: &User) -> (Book, User) {
        let mut book = book.clone();
        let mut user = user.clone();
        book.on_loan = true;
        book.borrower_id = Some(user.id);
        book.loan_date = Some(now());
        user.loaned_books.push(book.id);
        (book, user)
    }

    // ---- Catalog ----

    #[tokio::test]
    async fn create_and_find_book() {
        let (store, author, book, _) = seeded().await;
        let found = store.find_book(book.id).await.unwrap().unwrap();
        assert_eq!(found.title, "The Dispossessed");
        assert_eq!(found.author_id, author.id);
        assert!(!found.on_loan);
        assert_eq!(found.version, 0);
    }

    #[tokio::test]
    async fn list_books_sorted_by_id() {
        let (store, author, first, _) = seeded().await;
        let second = store
            .create_book("The Lathe of Heaven", author.id, now())
            .await
            .unwrap();
        let ids: Vec<i64> = store
            .list_books()
            .await
            .unwrap()
            .iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn available_books_excludes_loaned() {
        let (store, author, book, user) = seeded().await;
        let spare = store
            .create_book("Always Coming Home", author.id, now())
            .await
            .unwrap();

        let (loaned, borrower) = loaned_snapshot(&book, &user);
        store.commit_loan(&loaned, &borrower).await.unwrap();

        let available = store.list_available_books().await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, spare.id);
    }

    #[tokio::test]
    async fn save_book_bumps_version() {
        let (store, _, mut book, _) = seeded().await;
        book.title = "The Dispossessed: An Ambiguous Utopia".to_string();
        store.save_book(&book).await.unwrap();

        let found = store.find_book(book.id).await.unwrap().unwrap();
        assert_eq!(found.version, 1);
        assert_eq!(found.title, "The Dispossessed: An Ambiguous Utopia");
    }

    #[tokio::test]
    async fn save_book_with_stale_version_conflicts() {
        let (store, _, book, _) = seeded().await;
        store.save_book(&book).await.unwrap();

        // Same snapshot again: its version is now behind.
        let result = store.save_book(&book).await;
        assert!(matches!(result, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn delete_book_scrubs_loaned_sets() {
        let (store, _, book, user) = seeded().await;
        let (loaned, borrower) = loaned_snapshot(&book, &user);
        store.commit_loan(&loaned, &borrower).await.unwrap();

        assert!(store.delete_book(book.id).await.unwrap());
        assert!(store.find_book(book.id).await.unwrap().is_none());
        let user = store.find_user(user.id).await.unwrap().unwrap();
        assert!(user.loaned_books.is_empty());
    }

    #[tokio::test]
    async fn delete_missing_book_returns_false() {
        let store = MemoryLibrary::new();
        assert!(!store.delete_book(99).await.unwrap());
    }

    #[tokio::test]
    async fn delete_author_cascades_to_books_and_loans() {
        let (store, author, book, user) = seeded().await;
        let (loaned, borrower) = loaned_snapshot(&book, &user);
        store.commit_loan(&loaned, &borrower).await.unwrap();

        assert!(store.delete_author(author.id).await.unwrap());
        assert!(store.find_book(book.id).await.unwrap().is_none());
        let user = store.find_user(user.id).await.unwrap().unwrap();
        assert!(user.loaned_books.is_empty());
    }

    #[tokio::test]
    async fn save_author_renames() {
        let (store, mut author, _, _) = seeded().await;
        author.name = "U. K. Le Guin".to_string();
        assert!(store.save_author(&author).await.unwrap());
        let found = store.find_author(author.id).await.unwrap().unwrap();
        assert_eq!(found.name, "U. K. Le Guin");
    }

    // ---- Membership ----

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let (store, _, _, _) = seeded().await;
        let result = store
            .create_user("Impostor", "shevek@example.com", "hash2", now())
            .await;
        assert!(matches!(
            result,
            Err(StoreError::Duplicate { field: "email" })
        ));
    }

    #[tokio::test]
    async fn find_user_by_email() {
        let (store, _, _, user) = seeded().await;
        let found = store
            .find_user_by_email("shevek@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, user.id);
        assert!(store
            .find_user_by_email("nobody@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn save_user_with_stale_version_conflicts() {
        let (store, _, _, user) = seeded().await;
        store.save_user(&user).await.unwrap();
        let result = store.save_user(&user).await;
        assert!(matches!(result, Err(StoreError::Conflict)));
    }

    // ---- Loan commits ----

    #[tokio::test]
    async fn commit_loan_writes_both_records() {
        let (store, _, book, user) = seeded().await;
        let (loaned, borrower) = loaned_snapshot(&book, &user);
        store.commit_loan(&loaned, &borrower).await.unwrap();

        let book = store.find_book(book.id).await.unwrap().unwrap();
        assert!(book.on_loan);
        assert_eq!(book.borrower_id, Some(user.id));
        assert_eq!(book.version, 1);

        let user = store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(user.loaned_books, vec![book.id]);
        assert_eq!(user.version, 1);
    }

    #[tokio::test]
    async fn stale_commit_leaves_both_records_untouched() {
        let (store, _, book, user) = seeded().await;
        let (loaned, borrower) = loaned_snapshot(&book, &user);
        store.commit_loan(&loaned, &borrower).await.unwrap();

        // Replay the same snapshots: both versions are stale now.
        let result = store.commit_loan(&loaned, &borrower).await;
        assert!(matches!(result, Err(StoreError::Conflict)));

        let book = store.find_book(book.id).await.unwrap().unwrap();
        let user = store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(book.version, 1);
        assert_eq!(user.version, 1);
        assert_eq!(user.loaned_books, vec![book.id]);
    }

    #[tokio::test]
    async fn stale_user_side_fails_whole_commit() {
        let (store, _, book, user) = seeded().await;

        // Bump the user record behind the snapshot's back.
        store.save_user(&user).await.unwrap();

        let (loaned, borrower) = loaned_snapshot(&book, &user);
        let result = store.commit_loan(&loaned, &borrower).await;
        assert!(matches!(result, Err(StoreError::Conflict)));

        let book = store.find_book(book.id).await.unwrap().unwrap();
        assert!(!book.on_loan);
        assert_eq!(book.version, 0);
    }

    #[tokio::test]
    async fn commit_return_restores_availability() {
        let (store, _, book, user) = seeded().await;
        let (loaned, borrower) = loaned_snapshot(&book, &user);
        store.commit_loan(&loaned, &borrower).await.unwrap();

        let mut book = store.find_book(book.id).await.unwrap().unwrap();
        let mut user = store.find_user(user.id).await.unwrap().unwrap();
        book.on_loan = false;
        book.borrower_id = None;
        book.loan_date = None;
        user.loaned_books.retain(|id| *id != book.id);
        store.commit_return(&book, &user).await.unwrap();

        let book = store.find_book(book.id).await.unwrap().unwrap();
        assert!(!book.on_loan);
        assert!(book.loan_state_consistent());
        let user = store.find_user(user.id).await.unwrap().unwrap();
        assert!(user.loaned_books.is_empty());
    }
}
