//! User registration and token issuance.
//!
//! Passwords are hashed with Argon2; access tokens are HS256 JWTs carrying
//! the user id and an expiry. Handlers mirror the OAuth2 password flow the
//! frontends speak: `POST /register`, `POST /token` (form-encoded), and
//! `GET /users/me`.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Form, Json,
    extract::{FromRequestParts, State},
    http::{StatusCode, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use kokua_core::history::{NewUser, UserRecord};

use crate::{ErrorResponse, SharedState, internal_error};

/// Hash a password using Argon2.
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| format!("Failed to hash password: {e}"))
}

/// Verify a password against a stored hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// JWT claims: the user id and an expiry timestamp.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: u64,
}

/// Issue a signed access token for a user.
pub fn issue_token(user_id: i64, secret: &str, ttl_minutes: u64) -> Result<String, String> {
    let exp = chrono::Utc::now().timestamp() as u64 + ttl_minutes * 60;
    let claims = Claims {
        sub: user_id.to_string(),
        exp,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| format!("Failed to sign token: {e}"))
}

/// Verify a token and extract the user id. Expiry is checked.
pub fn verify_token(token: &str, secret: &str) -> Option<i64> {
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;
    data.claims.sub.parse().ok()
}

async fn user_from_parts(parts: &Parts, state: &SharedState) -> Option<UserRecord> {
    let token = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))?;

    let user_id = verify_token(token, &state.auth.secret_key)?;

    match state.history.user_by_id(user_id).await {
        Ok(Some(user)) if user.is_active => Some(user),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "Failed to load user for token");
            None
        }
    }
}

/// Extractor that requires a valid bearer token. Rejects with 401.
pub struct AuthUser(pub UserRecord);

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        match user_from_parts(parts, state).await {
            Some(user) => Ok(AuthUser(user)),
            None => Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Could not validate credentials".into(),
                }),
            )),
        }
    }
}

/// Extractor that attaches the user when a valid token is present, and is
/// anonymous otherwise. Never rejects.
pub struct OptionalAuthUser(pub Option<UserRecord>);

impl FromRequestParts<SharedState> for OptionalAuthUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let user = user_from_parts(parts, state).await;
        if user.is_none() && parts.headers.contains_key(header::AUTHORIZATION) {
            debug!("Ignoring invalid bearer token, treating request as anonymous");
        }
        Ok(OptionalAuthUser(user))
    }
}

// --- Handlers ---

#[derive(Deserialize)]
pub struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    access_token: String,
    token_type: &'static str,
}

pub async fn register_handler(
    State(state): State<SharedState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserRecord>), (StatusCode, Json<ErrorResponse>)> {
    let username = payload.username.trim();
    if username.is_empty() || username.len() > 64 {
        return Err(bad_request("username must be 1-64 characters"));
    }
    if !payload.email.contains('@') {
        return Err(bad_request("invalid email address"));
    }
    if payload.password.len() < 8 {
        return Err(bad_request("password must be at least 8 characters"));
    }

    let password_hash = hash_password(&payload.password).map_err(internal_error)?;

    let user = state
        .history
        .create_user(NewUser {
            username: username.to_string(),
            email: payload.email.trim().to_string(),
            password_hash,
        })
        .await
        .map_err(crate::history_error)?;

    debug!(username = %user.username, "Registered new user");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn token_handler(
    State(state): State<SharedState>,
    Form(payload): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, (StatusCode, Json<ErrorResponse>)> {
    let unauthorized = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Incorrect username or password".into(),
            }),
        )
    };

    let user = state
        .history
        .user_by_username(payload.username.trim())
        .await
        .map_err(crate::history_error)?
        .filter(|u| u.is_active)
        .ok_or_else(unauthorized)?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(unauthorized());
    }

    let access_token = issue_token(user.id, &state.auth.secret_key, state.auth.token_ttl_minutes)
        .map_err(internal_error)?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}

pub async fn me_handler(AuthUser(user): AuthUser) -> Json<UserRecord> {
    Json(user)
}

fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}
