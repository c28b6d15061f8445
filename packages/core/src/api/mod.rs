//! HTTP surface of the circulation service.
//!
//! Handlers live in one submodule per concern and share the error
//! shape `{"error": {"kind", "message"}}`. `build_router` is the one
//! place routes, auth middleware and HTTP metrics are wired together;
//! `main.rs` and the integration tests both call it.

pub mod authors;
pub mod books;
pub mod caching;
pub mod health;
pub mod reports;
pub mod users;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, StatusCode},
    middleware,
    response::Response,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::auth::{self, AccessGuard};
use crate::cache::ResponseCache;
use crate::loans::engine::LoanEngine;
use crate::loans::error::LoanError;
use crate::loans::store::{CatalogStore, MembershipStore, StoreError};
use crate::metrics::{self, AppMetrics};
use crate::reports::CatalogSummary;

pub(crate) fn error_body(kind: &str, message: impl Into<String>) -> Json<Value> {
    Json(json!({ "error": { "kind": kind, "message": message.into() } }))
}

pub(crate) fn bad_request(message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, error_body("invalid_request", message))
}

pub(crate) fn not_found(message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, error_body("not_found", message))
}

pub(crate) fn internal_error(message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (StatusCode::INTERNAL_SERVER_ERROR, error_body("internal", message))
}

/// Map a loan engine error to its HTTP shape.
///
/// Precondition failures that a retry could clear are all 409; the
/// quota is a policy limit, not a conflict, and answers 422.
pub(crate) fn loan_error_response(err: &LoanError) -> (StatusCode, Json<Value>) {
    let (status, kind) = match err {
        LoanError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        LoanError::AlreadyLoaned { .. } => (StatusCode::CONFLICT, "already_loaned"),
        LoanError::NotOnLoan { .. } => (StatusCode::CONFLICT, "not_on_loan"),
        LoanError::NotBorrower { .. } => (StatusCode::CONFLICT, "not_borrower"),
        LoanError::QuotaExceeded { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "quota_exceeded"),
        LoanError::Conflict => (StatusCode::CONFLICT, "conflict"),
        LoanError::Store(inner) => return store_error_response(inner),
    };
    (status, error_body(kind, err.to_string()))
}

pub(crate) fn store_error_response(err: &StoreError) -> (StatusCode, Json<Value>) {
    let (status, kind) = match err {
        StoreError::Duplicate { .. } => (StatusCode::CONFLICT, "duplicate"),
        StoreError::Conflict => (StatusCode::CONFLICT, "conflict"),
        StoreError::Unavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
        StoreError::Corrupted { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    (status, error_body(kind, err.to_string()))
}

/// Everything `build_router` needs, owned by `main.rs`.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LoanEngine>,
    pub catalog: Arc<dyn CatalogStore + Send + Sync>,
    pub membership: Arc<dyn MembershipStore + Send + Sync>,
    pub guard: Arc<AccessGuard>,
    pub metrics: Arc<AppMetrics>,
    pub summary_cache: Arc<Mutex<ResponseCache<CatalogSummary>>>,
}

/// Assemble the full application router.
///
/// Routes that act on behalf of a member sit behind the auth
/// middleware; catalog reads, author management and registration stay
/// open. The whole tree is wrapped in HTTP metrics and permissive CORS.
pub fn build_router(state: AppState) -> Router {
    let books_state = books::BooksApiState {
        engine: state.engine.clone(),
        catalog: state.catalog.clone(),
        metrics: state.metrics.clone(),
    };
    let users_state = users::UsersApiState {
        membership: state.membership.clone(),
        guard: state.guard.clone(),
    };
    let reports_state = reports::ReportsApiState {
        catalog: state.catalog.clone(),
        cache: state.summary_cache.clone(),
    };
    let metrics_for_handler = state.metrics.clone();

    let guarded = Router::new()
        .route("/books", post(books::create_book))
        .route("/books", get(books::list_books))
        .route("/books/available", get(books::available_books))
        .route("/books/:id/loan", post(books::loan_book))
        .route("/books/:id/return", post(books::return_book))
        .with_state(books_state.clone())
        .merge(
            Router::new()
                .route("/reports/summary", get(reports::summary))
                .with_state(reports_state),
        )
        .layer(middleware::from_fn_with_state(
            state.guard.clone(),
            auth::require_auth,
        ));

    let open_books = Router::new()
        .route("/books/:id", get(books::get_book))
        .route("/books/:id", patch(books::update_book))
        .route("/books/:id", delete(books::delete_book))
        .route("/books/:id/on-loan", get(books::book_on_loan))
        .with_state(books_state);

    let authors_router = Router::new()
        .route("/authors", post(authors::create_author))
        .route("/authors", get(authors::list_authors))
        .route("/authors/:id", get(authors::get_author))
        .route("/authors/:id", patch(authors::update_author))
        .route("/authors/:id", delete(authors::delete_author))
        .with_state(state.catalog.clone());

    let users_router = Router::new()
        .route("/users/register", post(users::register))
        .route("/users/login", post(users::login))
        .with_state(users_state);

    Router::new()
        .route("/health", get(health::health))
        .route(
            "/metrics",
            get(move || {
                let m = metrics_for_handler.clone();
                async move {
                    match m.render() {
                        Ok(body) => Response::builder()
                            .status(200)
                            .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                            .body(Body::from(body))
                            .unwrap(),
                        Err(_) => Response::builder()
                            .status(500)
                            .body(Body::from("metrics error"))
                            .unwrap(),
                    }
                }
            }),
        )
        .merge(guarded)
        .merge(open_books)
        .merge(authors_router)
        .merge(users_router)
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            metrics::track_http,
        ))
        .layer(CorsLayer::permissive())
}
