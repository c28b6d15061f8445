//! Member registration and login.
//!
//! Login answers with a signed bearer token; everything the loan
//! endpoints know about the caller comes from that token.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{bad_request, store_error_response};
use crate::auth::{self, hash_password, verify_password, AccessGuard, AuthError};
use crate::loans::store::MembershipStore;
use crate::loans::types::User;

const PASSWORD_MIN_CHARS: usize = 8;

/// Shared state for the user endpoints.
#[derive(Clone)]
pub struct UsersApiState {
    pub membership: Arc<dyn MembershipStore + Send + Sync>,
    pub guard: Arc<AccessGuard>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

fn checked_registration(body: &RegisterRequest) -> Result<(), (StatusCode, Json<Value>)> {
    if body.full_name.trim().is_empty() {
        return Err(bad_request("full_name must not be empty"));
    }
    if !body.email.contains('@') {
        return Err(bad_request("email must contain '@'"));
    }
    if body.password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(bad_request(format!(
            "password must be at least {} characters",
            PASSWORD_MIN_CHARS
        )));
    }
    Ok(())
}

/// `POST /users/register`: create a member account.
pub async fn register(
    State(state): State<UsersApiState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), (StatusCode, Json<Value>)> {
    checked_registration(&body)?;

    let user = state
        .membership
        .create_user(
            body.full_name.trim(),
            &body.email,
            &hash_password(&body.password),
            Utc::now(),
        )
        .await
        .map_err(|err| store_error_response(&err))?;

    tracing::info!(user_id = user.id, "registered user");
    Ok((StatusCode::CREATED, Json(user)))
}

/// `POST /users/login`: verify credentials and issue a token.
///
/// Unknown emails and wrong passwords answer identically so the
/// endpoint does not leak which accounts exist.
pub async fn login(
    State(state): State<UsersApiState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, Json<Value>)> {
    let user = state
        .membership
        .find_user_by_email(&body.email)
        .await
        .map_err(|err| store_error_response(&err))?;

    let user = match user {
        Some(user) if verify_password(&body.password, &user.password_hash) => user,
        _ => return Err(auth::unauthorized(&AuthError::BadCredentials)),
    };

    let token = state.guard.issue(user.id, Utc::now());
    tracing::info!(user_id = user.id, "issued login token");
    Ok(Json(LoginResponse { token }))
}
