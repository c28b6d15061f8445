//! Author CRUD endpoints.
//!
//! Deleting an author cascades to their books, so the handlers stay
//! thin and leave referential cleanup to the store.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{bad_request, not_found, store_error_response};
use crate::loans::store::CatalogStore;
use crate::loans::types::Author;

pub type AuthorsState = Arc<dyn CatalogStore + Send + Sync>;

#[derive(Debug, Deserialize)]
pub struct AuthorNameRequest {
    pub name: String,
}

/// Wire form of an author: the ids of their books ride along.
#[derive(Debug, Serialize)]
pub struct AuthorResponse {
    pub id: i64,
    pub name: String,
    pub books: Vec<i64>,
}

fn checked_name(name: &str) -> Result<&str, (StatusCode, Json<Value>)> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(bad_request("author name must not be empty"))
    } else {
        Ok(trimmed)
    }
}

/// `POST /authors`.
pub async fn create_author(
    State(catalog): State<AuthorsState>,
    Json(body): Json<AuthorNameRequest>,
) -> Result<(StatusCode, Json<AuthorResponse>), (StatusCode, Json<Value>)> {
    let name = checked_name(&body.name)?;
    let author = catalog
        .create_author(name)
        .await
        .map_err(|err| store_error_response(&err))?;
    let response = AuthorResponse {
        id: author.id,
        name: author.name,
        books: Vec::new(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /authors`.
pub async fn list_authors(
    State(catalog): State<AuthorsState>,
) -> Result<Json<Vec<AuthorResponse>>, (StatusCode, Json<Value>)> {
    let authors = catalog
        .list_authors()
        .await
        .map_err(|err| store_error_response(&err))?;

    let mut by_author: HashMap<i64, Vec<i64>> = HashMap::new();
    for book in catalog
        .list_books()
        .await
        .map_err(|err| store_error_response(&err))?
    {
        by_author.entry(book.author_id).or_default().push(book.id);
    }

    let authors = authors
        .into_iter()
        .map(|author| {
            let books = by_author.remove(&author.id).unwrap_or_default();
            AuthorResponse {
                id: author.id,
                name: author.name,
                books,
            }
        })
        .collect();
    Ok(Json(authors))
}

/// `GET /authors/:id`.
pub async fn get_author(
    State(catalog): State<AuthorsState>,
    Path(id): Path<i64>,
) -> Result<Json<AuthorResponse>, (StatusCode, Json<Value>)> {
    let author = catalog
        .find_author(id)
        .await
        .map_err(|err| store_error_response(&err))?
        .ok_or_else(|| not_found(format!("author {} not found", id)))?;

    let books = catalog
        .list_books()
        .await
        .map_err(|err| store_error_response(&err))?
        .into_iter()
        .filter(|book| book.author_id == author.id)
        .map(|book| book.id)
        .collect();

    Ok(Json(AuthorResponse {
        id: author.id,
        name: author.name,
        books,
    }))
}

/// `PATCH /authors/:id`: rename.
pub async fn update_author(
    State(catalog): State<AuthorsState>,
    Path(id): Path<i64>,
    Json(body): Json<AuthorNameRequest>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    let name = checked_name(&body.name)?;
    let author = Author {
        id,
        name: name.to_string(),
    };
    let updated = catalog
        .save_author(&author)
        .await
        .map_err(|err| store_error_response(&err))?;
    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("author {} not found", id)))
    }
}

/// `DELETE /authors/:id`: removes the author and every book of theirs.
pub async fn delete_author(
    State(catalog): State<AuthorsState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    let deleted = catalog
        .delete_author(id)
        .await
        .map_err(|err| store_error_response(&err))?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("author {} not found", id)))
    }
}
