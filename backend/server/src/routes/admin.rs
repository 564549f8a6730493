use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{TokenKind, admin_ttl, confirm_ttl, hash_password, verify_password},
    error::AppError,
    mail,
    middleware::rate_limit,
    models::User,
    state::AppState,
    utils::{Payload, normalize_email},
};

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let limited = from_fn_with_state(state, rate_limit);

    Router::new()
        .route("/register", post(register_handler).layer(limited.clone()))
        .route("/login", post(login_handler).layer(limited))
        .route("/confirm/{token}", get(confirm_handler))
}

#[derive(Deserialize, Debug)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub password: String,
}

#[derive(Serialize, Debug)]
pub struct TokenResponse {
    pub token: String,
}

async fn register_handler(
    State(state): State<Arc<AppState>>,
    Payload(credentials): Payload<Credentials>,
) -> Result<impl IntoResponse, AppError> {
    let email = normalize_email(&credentials.email);
    if email.is_empty() || credentials.password.is_empty() {
        return Err(AppError::bad_request("Email and password are required"));
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        email,
        password_hash: hash_password(&credentials.password)?,
        confirmed: false,
        created_at: now,
        updated_at: now,
    };

    if !state.store.insert_user(&user).await? {
        return Err(AppError::bad_request("User already exists"));
    }

    let token = state.keys.issue(user.id, TokenKind::Confirm, confirm_ttl())?;
    let link = state.config.frontend(&format!("/confirmar/{token}"));

    state
        .mailer
        .send(mail::admin_confirmation(&user.email, &link))
        .await?;

    info!("Registered admin {}", user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered. Check your email to confirm the account." })),
    ))
}

async fn confirm_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    // the admin panel reads `message` here, not the usual `error`
    let invalid = (
        StatusCode::BAD_REQUEST,
        Json(json!({ "message": "Invalid or expired token" })),
    );

    let Some(id) = state
        .keys
        .verify(&token, TokenKind::Confirm)
        .ok()
        .and_then(|claims| claims.subject())
    else {
        return Ok(invalid.into_response());
    };

    let Some(mut user) = state.store.get_user(id).await? else {
        return Ok(invalid.into_response());
    };

    user.confirmed = true;
    user.updated_at = Utc::now();
    state.store.save_user(&user).await?;

    info!("Admin {} confirmed their account", user.id);

    Ok(Redirect::to(&state.config.frontend("/login?confirmado=1")).into_response())
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    Payload(credentials): Payload<Credentials>,
) -> Result<Json<TokenResponse>, AppError> {
    let Some(user) = state
        .store
        .user_by_email(&normalize_email(&credentials.email))
        .await?
    else {
        return Err(AppError::Unauthorized("Invalid credentials"));
    };

    if !user.confirmed {
        return Err(AppError::Forbidden("Account not confirmed"));
    }

    if !verify_password(&credentials.password, &user.password_hash) {
        warn!("Failed login for admin {}", user.id);
        return Err(AppError::Unauthorized("Invalid credentials"));
    }

    let token = state.keys.issue(user.id, TokenKind::Admin, admin_ttl())?;

    Ok(Json(TokenResponse { token }))
}
