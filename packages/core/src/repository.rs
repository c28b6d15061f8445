//! SQLite-backed store for the circulation service.
//!
//! All SQL lives here. [`SqliteLibrary`] implements the three store
//! contracts consumed by the loan engine; the API layer shares the same
//! object for catalog and membership management.
//!
//! Every book and user row carries a `version` column. Writes include
//! `WHERE version = ?` and bump the column; zero affected rows means
//! another writer got there first and the call fails with
//! [`StoreError::Conflict`]. Loan transitions write both rows inside one
//! transaction so no partial state is ever visible.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::loans::store::{CatalogStore, LoanStore, MembershipStore, StoreError};
use crate::loans::types::{Author, Book, User};

pub struct SqliteLibrary {
    pool: SqlitePool,
}

impl SqliteLibrary {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ---- Row and error mapping ----

fn map_db_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.message().contains("UNIQUE constraint failed: users.email") {
            return StoreError::Duplicate { field: "email" };
        }
    }
    StoreError::unavailable(err.to_string())
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StoreError::corrupted(format!("bad {} timestamp: {}", column, raw)))
}

fn book_from_row(row: &SqliteRow) -> Result<Book, StoreError> {
    let id: i64 = row.try_get("id").map_err(map_db_err)?;
    let title: String = row.try_get("title").map_err(map_db_err)?;
    let author_id: i64 = row.try_get("author_id").map_err(map_db_err)?;
    let on_loan: i64 = row.try_get("on_loan").map_err(map_db_err)?;
    let borrower_id: Option<i64> = row.try_get("borrower_id").map_err(map_db_err)?;
    let loan_date_raw: Option<String> = row.try_get("loan_date").map_err(map_db_err)?;
    let created_at_raw: String = row.try_get("created_at").map_err(map_db_err)?;
    let version: i64 = row.try_get("version").map_err(map_db_err)?;

    let loan_date = match loan_date_raw {
        Some(raw) => Some(parse_timestamp(&raw, "loan_date")?),
        None => None,
    };

    let book = Book {
        id,
        title,
        author_id,
        on_loan: on_loan != 0,
        borrower_id,
        loan_date,
        created_at: parse_timestamp(&created_at_raw, "created_at")?,
        version,
    };
    if !book.loan_state_consistent() {
        return Err(StoreError::corrupted(format!(
            "book {} has inconsistent loan state",
            book.id
        )));
    }
    Ok(book)
}

fn author_from_row(row: &SqliteRow) -> Result<Author, StoreError> {
    Ok(Author {
        id: row.try_get("id").map_err(map_db_err)?,
        name: row.try_get("name").map_err(map_db_err)?,
    })
}

const BOOK_COLUMNS: &str =
    "id, title, author_id, on_loan, borrower_id, loan_date, created_at, version";

impl SqliteLibrary {
    async fn load_loaned_books(&self, user_id: i64) -> Result<Vec<i64>, StoreError> {
        let rows = sqlx::query(
            "SELECT book_id FROM user_loans WHERE user_id = ? ORDER BY position ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        rows.iter()
            .map(|row| row.try_get("book_id").map_err(map_db_err))
            .collect()
    }

    async fn user_from_row(&self, row: &SqliteRow) -> Result<User, StoreError> {
        let id: i64 = row.try_get("id").map_err(map_db_err)?;
        let created_at_raw: String = row.try_get("created_at").map_err(map_db_err)?;
        Ok(User {
            id,
            full_name: row.try_get("full_name").map_err(map_db_err)?,
            email: row.try_get("email").map_err(map_db_err)?,
            password_hash: row.try_get("password_hash").map_err(map_db_err)?,
            created_at: parse_timestamp(&created_at_raw, "created_at")?,
            loaned_books: self.load_loaned_books(id).await?,
            version: row.try_get("version").map_err(map_db_err)?,
        })
    }

    /// Apply a book/user snapshot pair inside one transaction. Dropping
    /// the transaction on an early return rolls everything back.
    async fn commit_pair(&self, book: &Book, user: &User) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        let loan_date = book.loan_date.map(|t| t.to_rfc3339());
        let result = sqlx::query(
            "UPDATE books
             SET on_loan = ?, borrower_id = ?, loan_date = ?, version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(if book.on_loan { 1i64 } else { 0i64 })
        .bind(book.borrower_id)
        .bind(&loan_date)
        .bind(book.id)
        .bind(book.version)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }

        let result = sqlx::query("UPDATE users SET version = version + 1 WHERE id = ? AND version = ?")
            .bind(user.id)
            .bind(user.version)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }

        sqlx::query("DELETE FROM user_loans WHERE user_id = ?")
            .bind(user.id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        for (position, book_id) in user.loaned_books.iter().enumerate() {
            sqlx::query("INSERT INTO user_loans (user_id, book_id, position) VALUES (?, ?, ?)")
                .bind(user.id)
                .bind(book_id)
                .bind(position as i64)
                .execute(&mut *tx)
                .await
                .map_err(map_db_err)?;
        }

        tx.commit().await.map_err(map_db_err)?;
        Ok(())
    }
}

// ---- Catalog ----

#[async_trait]
impl CatalogStore for SqliteLibrary {
    async fn find_book(&self, id: i64) -> Result<Option<Book>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM books WHERE id = ?", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
        row.map(|r| book_from_row(&r)).transpose()
    }

    async fn list_books(&self) -> Result<Vec<Book>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {} FROM books ORDER BY id ASC", BOOK_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
        rows.iter().map(book_from_row).collect()
    }

    async fn list_available_books(&self) -> Result<Vec<Book>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM books WHERE on_loan = 0 ORDER BY id ASC",
            BOOK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        rows.iter().map(book_from_row).collect()
    }

    async fn create_book(
        &self,
        title: &str,
        author_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Book, StoreError> {
        let result = sqlx::query(
            "INSERT INTO books (title, author_id, on_loan, borrower_id, loan_date, created_at, version)
             VALUES (?, ?, 0, NULL, NULL, ?, 0)",
        )
        .bind(title)
        .bind(author_id)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;

        Ok(Book {
            id: result.last_insert_rowid(),
            title: title.to_string(),
            author_id,
            on_loan: false,
            borrower_id: None,
            loan_date: None,
            created_at: now,
            version: 0,
        })
    }

    async fn save_book(&self, book: &Book) -> Result<(), StoreError> {
        let loan_date = book.loan_date.map(|t| t.to_rfc3339());
        let result = sqlx::query(
            "UPDATE books
             SET title = ?, author_id = ?, on_loan = ?, borrower_id = ?, loan_date = ?,
                 version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(&book.title)
        .bind(book.author_id)
        .bind(if book.on_loan { 1i64 } else { 0i64 })
        .bind(book.borrower_id)
        .bind(&loan_date)
        .bind(book.id)
        .bind(book.version)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    async fn delete_book(&self, id: i64) -> Result<bool, StoreError> {
        // ON DELETE CASCADE clears user_loans rows for this book.
        let result = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_author(&self, id: i64) -> Result<Option<Author>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM authors WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
        row.map(|r| author_from_row(&r)).transpose()
    }

    async fn list_authors(&self) -> Result<Vec<Author>, StoreError> {
        let rows = sqlx::query("SELECT id, name FROM authors ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
        rows.iter().map(author_from_row).collect()
    }

    async fn create_author(&self, name: &str) -> Result<Author, StoreError> {
        let result = sqlx::query("INSERT INTO authors (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(Author {
            id: result.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    async fn save_author(&self, author: &Author) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE authors SET name = ? WHERE id = ?")
            .bind(&author.name)
            .bind(author.id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_author(&self, id: i64) -> Result<bool, StoreError> {
        // Cascades through books into user_loans.
        let result = sqlx::query("DELETE FROM authors WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }
}

// ---- Membership ----

#[async_trait]
impl MembershipStore for SqliteLibrary {
    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, full_name, email, password_hash, created_at, version
             FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;

        match row {
            Some(row) => Ok(Some(self.user_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, full_name, email, password_hash, created_at, version
             FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;

        match row {
            Some(row) => Ok(Some(self.user_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    async fn create_user(
        &self,
        full_name: &str,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let result = sqlx::query(
            "INSERT INTO users (full_name, email, password_hash, created_at, version)
             VALUES (?, ?, ?, ?, 0)",
        )
        .bind(full_name)
        .bind(email)
        .bind(password_hash)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;

        Ok(User {
            id: result.last_insert_rowid(),
            full_name: full_name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            loaned_books: Vec::new(),
            version: 0,
        })
    }

    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        let result = sqlx::query(
            "UPDATE users
             SET full_name = ?, email = ?, password_hash = ?, version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.id)
        .bind(user.version)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }

        sqlx::query("DELETE FROM user_loans WHERE user_id = ?")
            .bind(user.id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        for (position, book_id) in user.loaned_books.iter().enumerate() {
            sqlx::query("INSERT INTO user_loans (user_id, book_id, position) VALUES (?, ?, ?)")
                .bind(user.id)
                .bind(book_id)
                .bind(position as i64)
                .execute(&mut *tx)
                .await
                .map_err(map_db_err)?;
        }

        tx.commit().await.map_err(map_db_err)?;
        Ok(())
    }
}

// ---- Loan commits ----

#[async_trait]
impl LoanStore for SqliteLibrary {
    async fn commit_loan(&self, book: &Book, user: &User) -> Result<(), StoreError> {
        self.commit_pair(book, user).await
    }

    async fn commit_return(&self, book: &Book, user: &User) -> Result<(), StoreError> {
        self.commit_pair(book, user).await
    }
}



#[cfg(test)]
mod loan_commit_tests {
    use super::*;
    use crate::db::create_pool;

    struct Setup {
        store: SqliteLibrary,
        book: Book,
        user: User,
    }

    async fn make_setup() -> Setup {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let store = SqliteLibrary::new(pool);
        let author = store.create_author("Becky Chambers").await.unwrap();
        let book = store
            .create_book("A Psalm for the Wild-Built", author.id, Utc::now())
            .await
            .unwrap();
        let user = store
            .create_user("Dex", "dex@example.com", "h", Utc::now())
            .await
            .unwrap();
        Setup { store, book, user }
    }

    fn loaned_snapshot(book: &Book, user: &User) -> (Book, User) {
        let mut book = book.clone();
        let mut user = user.clone();
        book.on_loan = true;
        book.borrower_id = Some(user.id);
        book.loan_date = Some(Utc::now());
        user.loaned_books.push(book.id);
        (book, user)
    }

    #[tokio::test]
    async fn commit_loan_persists_both_sides() {
        let setup = make_setup().await;
        let (loaned, borrower) = loaned_snapshot(&setup.book, &setup.user);
        setup.store.commit_loan(&loaned, &borrower).await.unwrap();

        let book = setup.store.find_book(setup.book.id).await.unwrap().unwrap();
        assert!(book.on_loan);
        assert_eq!(book.borrower_id, Some(setup.user.id));
        assert!(book.loan_date.is_some());
        assert_eq!(book.version, 1);

        let user = setup.store.find_user(setup.user.id).await.unwrap().unwrap();
        assert_eq!(user.loaned_books, vec![setup.book.id]);
        assert_eq!(user.version, 1);
    }

    #[tokio::test]
    async fn stale_book_version_rolls_back_everything() {
        let setup = make_setup().await;
        let (loaned, borrower) = loaned_snapshot(&setup.book, &setup.user);
        setup.store.commit_loan(&loaned, &borrower).await.unwrap();

        // Replaying the same snapshots must not touch either row.
        let result = setup.store.commit_loan(&loaned, &borrower).await;
        assert!(matches!(result, Err(StoreError::Conflict)));

        let user = setup.store.find_user(setup.user.id).await.unwrap().unwrap();
        assert_eq!(user.version, 1);
        assert_eq!(user.loaned_books, vec![setup.book.id]);
    }

    #[tokio::test]
    async fn commit_return_clears_the_loan() {
        let setup = make_setup().await;
        let (loaned, borrower) = loaned_snapshot(&setup.book, &setup.user);
        setup.store.commit_loan(&loaned, &borrower).await.unwrap();

        let mut book = setup.store.find_book(setup.book.id).await.unwrap().unwrap();
        let mut user = setup.store.find_user(setup.user.id).await.unwrap().unwrap();
        book.on_loan = false;
        book.borrower_id = None;
        book.loan_date = None;
        user.loaned_books.retain(|id| *id != book.id);
        setup.store.commit_return(&book, &user).await.unwrap();

        let book = setup.store.find_book(setup.book.id).await.unwrap().unwrap();
        assert!(!book.on_loan);
        assert!(book.loan_state_consistent());
        let user = setup.store.find_user(setup.user.id).await.unwrap().unwrap();
        assert!(user.loaned_books.is_empty());

        let available = setup.store.list_available_books().await.unwrap();
        assert_eq!(available.len(), 1);
    }

    #[tokio::test]
    async fn loaned_set_keeps_loan_order() {
        let setup = make_setup().await;
        let author = setup.store.create_author("Second Author").await.unwrap();
        let other = setup
            .store
            .create_book("A Prayer for the Crown-Shy", author.id, Utc::now())
            .await
            .unwrap();

        let (loaned, borrower) = loaned_snapshot(&setup.book, &setup.user);
        setup.store.commit_loan(&loaned, &borrower).await.unwrap();

        let book = setup.store.find_book(other.id).await.unwrap().unwrap();
        let user = setup.store.find_user(setup.user.id).await.unwrap().unwrap();
        let (loaned, borrower) = loaned_snapshot(&book, &user);
        setup.store.commit_loan(&loaned, &borrower).await.unwrap();

        let user = setup.store.find_user(setup.user.id).await.unwrap().unwrap();
        assert_eq!(user.loaned_books, vec![setup.book.id, other.id]);
    }

    #[tokio::test]
    async fn deleting_a_loaned_book_cascades_loan_rows() {
        let setup = make_setup().await;
        let (loaned, borrower) = loaned_snapshot(&setup.book, &setup.user);
        setup.store.commit_loan(&loaned, &borrower).await.unwrap();

        assert!(setup.store.delete_book(setup.book.id).await.unwrap());
        let user = setup.store.find_user(setup.user.id).await.unwrap().unwrap();
        assert!(user.loaned_books.is_empty());
    }

    #[tokio::test]
    async fn deleting_an_author_cascades_through_loans() {
        let setup = make_setup().await;
        let (loaned, borrower) = loaned_snapshot(&setup.book, &setup.user);
        setup.store.commit_loan(&loaned, &borrower).await.unwrap();

        assert!(setup.store.delete_author(setup.book.author_id).await.unwrap());
        assert!(setup
            .store
            .find_book(setup.book.id)
            .await
            .unwrap()
            .is_none());
        let user = setup.store.find_user(setup.user.id).await.unwrap().unwrap();
        assert!(user.loaned_books.is_empty());
    }
}
