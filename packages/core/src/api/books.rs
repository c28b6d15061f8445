//! Book catalog and loan lifecycle endpoints.
//!
//! Mutating loan routes read the acting user from the [`Identity`]
//! extension installed by the auth middleware: the token holder is the
//! borrower.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{bad_request, loan_error_response, not_found, store_error_response};
use crate::api::caching::conditional_json;
use crate::auth::Identity;
use crate::loans::engine::LoanEngine;
use crate::loans::error::LoanError;
use crate::loans::store::{CatalogStore, StoreError};
use crate::loans::types::{valid_title, Book, ReturnOutcome, TITLE_MAX_CHARS, TITLE_MIN_CHARS};
use crate::metrics::AppMetrics;

/// Client cache window for the book list endpoints, in seconds.
const BOOK_LIST_MAX_AGE: u32 = 30;

/// Shared state for the book and loan endpoints.
#[derive(Clone)]
pub struct BooksApiState {
    pub engine: Arc<LoanEngine>,
    pub catalog: Arc<dyn CatalogStore + Send + Sync>,
    pub metrics: Arc<AppMetrics>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookRequest {
    pub title: String,
    pub author_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookRequest {
    pub title: Option<String>,
    pub author_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OnLoanResponse {
    pub on_loan: bool,
}

/// Author fields embedded in book responses.
#[derive(Debug, Serialize)]
pub struct AuthorRef {
    pub id: i64,
    pub name: String,
}

/// Wire form of a book. The author relation is embedded so catalog
/// consumers can render a list without a second round of lookups.
#[derive(Debug, Serialize)]
pub struct BookResponse {
    pub id: i64,
    pub title: String,
    pub author: AuthorRef,
    pub on_loan: bool,
    pub borrower: Option<i64>,
    pub loan_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl BookResponse {
    fn assemble(book: Book, author: AuthorRef) -> Self {
        Self {
            id: book.id,
            title: book.title,
            author,
            on_loan: book.on_loan,
            borrower: book.borrower_id,
            loan_date: book.loan_date,
            created_at: book.created_at,
        }
    }
}

/// Resolve author names for a batch of books in one catalog read.
///
/// A book whose author row is gone mid-request renders as "unknown"
/// rather than failing the whole list.
async fn embed_authors(
    catalog: &Arc<dyn CatalogStore + Send + Sync>,
    books: Vec<Book>,
) -> Result<Vec<BookResponse>, StoreError> {
    let names: HashMap<i64, String> = catalog
        .list_authors()
        .await?
        .into_iter()
        .map(|author| (author.id, author.name))
        .collect();

    Ok(books
        .into_iter()
        .map(|book| {
            let author = AuthorRef {
                id: book.author_id,
                name: names
                    .get(&book.author_id)
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
            };
            BookResponse::assemble(book, author)
        })
        .collect())
}

fn title_error() -> (StatusCode, Json<Value>) {
    bad_request(format!(
        "title must be between {} and {} characters",
        TITLE_MIN_CHARS, TITLE_MAX_CHARS
    ))
}

/// `POST /books`: add a book to the catalog.
pub async fn create_book(
    State(state): State<BooksApiState>,
    Json(body): Json<CreateBookRequest>,
) -> Result<(StatusCode, Json<BookResponse>), (StatusCode, Json<Value>)> {
    if !valid_title(&body.title) {
        return Err(title_error());
    }

    let author = state
        .catalog
        .find_author(body.author_id)
        .await
        .map_err(|err| store_error_response(&err))?
        .ok_or_else(|| not_found(format!("author {} not found", body.author_id)))?;

    let book = state
        .catalog
        .create_book(&body.title, body.author_id, Utc::now())
        .await
        .map_err(|err| store_error_response(&err))?;

    let author = AuthorRef {
        id: author.id,
        name: author.name,
    };
    Ok((
        StatusCode::CREATED,
        Json(BookResponse::assemble(book, author)),
    ))
}

/// `GET /books`: the whole catalog, with ETag revalidation.
pub async fn list_books(
    State(state): State<BooksApiState>,
    request_headers: HeaderMap,
) -> Result<Response, (StatusCode, Json<Value>)> {
    let books = state
        .engine
        .list_books()
        .await
        .map_err(|err| loan_error_response(&err))?;
    let books = embed_authors(&state.catalog, books)
        .await
        .map_err(|err| store_error_response(&err))?;
    conditional_json(&request_headers, BOOK_LIST_MAX_AGE, &books)
}

/// `GET /books/available`: books not currently on loan.
pub async fn available_books(
    State(state): State<BooksApiState>,
    request_headers: HeaderMap,
) -> Result<Response, (StatusCode, Json<Value>)> {
    let books = state
        .engine
        .available_books()
        .await
        .map_err(|err| loan_error_response(&err))?;
    let books = embed_authors(&state.catalog, books)
        .await
        .map_err(|err| store_error_response(&err))?;
    conditional_json(&request_headers, BOOK_LIST_MAX_AGE, &books)
}

/// `GET /books/:id`.
pub async fn get_book(
    State(state): State<BooksApiState>,
    Path(id): Path<i64>,
) -> Result<Json<BookResponse>, (StatusCode, Json<Value>)> {
    let book = state
        .engine
        .get_book(id)
        .await
        .map_err(|err| loan_error_response(&err))?;

    let author = state
        .catalog
        .find_author(book.author_id)
        .await
        .map_err(|err| store_error_response(&err))?;
    let author = match author {
        Some(author) => AuthorRef {
            id: author.id,
            name: author.name,
        },
        None => AuthorRef {
            id: book.author_id,
            name: "unknown".to_string(),
        },
    };
    Ok(Json(BookResponse::assemble(book, author)))
}

/// `PATCH /books/:id`: partial update of title and author.
pub async fn update_book(
    State(state): State<BooksApiState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateBookRequest>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    let mut book = state
        .catalog
        .find_book(id)
        .await
        .map_err(|err| store_error_response(&err))?
        .ok_or_else(|| not_found(format!("book {} not found", id)))?;

    if let Some(title) = body.title {
        if !valid_title(&title) {
            return Err(title_error());
        }
        book.title = title;
    }

    if let Some(author_id) = body.author_id {
        let author = state
            .catalog
            .find_author(author_id)
            .await
            .map_err(|err| store_error_response(&err))?;
        if author.is_none() {
            return Err(not_found(format!("author {} not found", author_id)));
        }
        book.author_id = author_id;
    }

    state
        .catalog
        .save_book(&book)
        .await
        .map_err(|err| store_error_response(&err))?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /books/:id`: removes the book and its loan membership rows.
pub async fn delete_book(
    State(state): State<BooksApiState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    let deleted = state
        .catalog
        .delete_book(id)
        .await
        .map_err(|err| store_error_response(&err))?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("book {} not found", id)))
    }
}

/// `GET /books/:id/on-loan`.
pub async fn book_on_loan(
    State(state): State<BooksApiState>,
    Path(id): Path<i64>,
) -> Result<Json<OnLoanResponse>, (StatusCode, Json<Value>)> {
    let on_loan = state
        .engine
        .is_on_loan(id)
        .await
        .map_err(|err| loan_error_response(&err))?;
    Ok(Json(OnLoanResponse { on_loan }))
}

/// `POST /books/:id/loan`: loan the book to the authenticated user.
pub async fn loan_book(
    State(state): State<BooksApiState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    match state.engine.loan_book(id, identity.user_id, Utc::now()).await {
        Ok(()) => {
            state.metrics.loans_total.inc();
            state.metrics.books_on_loan.inc();
            Ok(StatusCode::NO_CONTENT)
        }
        Err(err) => {
            if matches!(err, LoanError::Conflict) {
                state.metrics.loan_conflicts_total.inc();
            }
            Err(loan_error_response(&err))
        }
    }
}

/// `POST /books/:id/return`: return the book and report any fine.
pub async fn return_book(
    State(state): State<BooksApiState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<ReturnOutcome>, (StatusCode, Json<Value>)> {
    match state
        .engine
        .return_book(id, identity.user_id, Utc::now())
        .await
    {
        Ok(outcome) => {
            state.metrics.returns_total.inc();
            state.metrics.books_on_loan.dec();
            if outcome.fine_payable {
                state.metrics.fines_assessed_total.inc();
            }
            Ok(Json(outcome))
        }
        Err(err) => {
            if matches!(err, LoanError::Conflict) {
                state.metrics.loan_conflicts_total.inc();
            }
            Err(loan_error_response(&err))
        }
    }
}
