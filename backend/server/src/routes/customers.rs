use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    middleware::from_fn_with_state,
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        CustomerSession, TokenKind, hash_password, removal_cookie, session_cookie, session_ttl,
        verify_password, verify_ttl,
    },
    error::AppError,
    mail,
    middleware::rate_limit,
    models::{CartItem, CartItemInput, Customer, CustomerProfile},
    state::AppState,
    utils::{Payload, merge_carts, normalize_email, random_token},
};

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let limited = from_fn_with_state(state, rate_limit);

    Router::new()
        .route("/register", post(register_handler).layer(limited.clone()))
        .route("/login", post(login_handler).layer(limited))
        .route("/logout", post(logout_handler))
        .route("/me", get(me_handler))
        .route("/verify-email", get(verify_email_handler))
        .route("/unsubscribe", get(unsubscribe_handler))
        .merge(super::cart::router())
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub marketing_opt_in: Option<bool>,
}

fn required(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

async fn register_handler(
    State(state): State<Arc<AppState>>,
    Payload(request): Payload<RegisterRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (Some(name), Some(email), Some(password)) = (
        required(request.name),
        required(request.email).map(|email| normalize_email(&email)),
        request.password.filter(|password| !password.is_empty()),
    ) else {
        return Err(AppError::bad_request("Name, email and password are required"));
    };

    let now = Utc::now();
    let verify_token = random_token(32);

    let customer = Customer {
        id: Uuid::new_v4(),
        name,
        email,
        phone: required(request.phone),
        password_hash: hash_password(&password)?,
        email_verified: false,
        verify_token: Some(verify_token.clone()),
        verify_token_expires: Some(now + verify_ttl()),
        marketing_opt_in: request.marketing_opt_in.unwrap_or(false),
        unsubscribe_token: random_token(24),
        cart: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    if !state.store.insert_customer(&customer).await? {
        return Err(AppError::Conflict("Email already registered"));
    }

    info!("Registered customer {}", customer.id);

    let link = state
        .config
        .backend(&format!("/api/customers/verify-email?token={verify_token}"));

    state
        .mailer
        .send(mail::customer_verification(&customer.email, &customer.name, &link))
        .await?;

    Ok(Json(json!({ "ok": true })))
}

#[derive(Deserialize, Debug)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: Option<String>,
}

async fn verify_email_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, AppError> {
    let failed = Redirect::to(&state.config.frontend("/entrar?verificado=0"));

    let Some(token) = query.token.filter(|token| !token.is_empty()) else {
        return Ok((jar, failed));
    };

    let now = Utc::now();

    if let Some(mut customer) = state.store.customer_by_verify_token(&token).await? {
        if customer.verify_token_valid(&token, now) {
            customer.email_verified = true;
            customer.verify_token = None;
            customer.verify_token_expires = None;
            customer.updated_at = now;
            state.store.save_customer(&customer).await?;

            info!("Customer {} verified their email", customer.id);

            let session = state
                .keys
                .issue(customer.id, TokenKind::Customer, session_ttl())?;

            return Ok((
                jar.add(session_cookie(session)),
                Redirect::to(&state.config.frontend("/conta?verificado=1")),
            ));
        }
    }

    // links signed as JWTs carry the customer id instead of a stored token
    let Some(id) = state
        .keys
        .verify(&token, TokenKind::Verify)
        .ok()
        .and_then(|claims| claims.subject())
    else {
        return Ok((jar, failed));
    };

    let Some(mut customer) = state.store.get_customer(id).await? else {
        return Ok((jar, failed));
    };

    customer.email_verified = true;
    customer.verify_token = None;
    customer.verify_token_expires = None;
    customer.updated_at = now;
    state.store.save_customer(&customer).await?;

    Ok((jar, Redirect::to(&state.config.frontend("/entrar?verificado=1"))))
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub guest_cart: Option<serde_json::Value>,
}

#[derive(Serialize, Debug)]
pub struct LoginResponse {
    pub ok: bool,
    pub user: CustomerProfile,
}

/// Guest cart lines that name a product. Anything but an array is ignored.
pub fn guest_lines(guest_cart: Option<serde_json::Value>) -> Vec<CartItem> {
    let now = Utc::now();

    match guest_cart {
        Some(serde_json::Value::Array(lines)) => lines
            .into_iter()
            .filter_map(|line| serde_json::from_value::<CartItemInput>(line).ok())
            .filter_map(|line| line.normalize(now))
            .collect(),
        _ => Vec::new(),
    }
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Payload(request): Payload<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let invalid = AppError::Unauthorized("Invalid credentials");

    let Some(mut customer) = state
        .store
        .customer_by_email(&normalize_email(&request.email))
        .await?
    else {
        return Err(invalid);
    };

    if !verify_password(&request.password, &customer.password_hash) {
        warn!("Failed login for customer {}", customer.id);
        return Err(invalid);
    }

    let guest = guest_lines(request.guest_cart);
    if !guest.is_empty() {
        info!(
            "Merging {} guest cart lines into customer {}",
            guest.len(),
            customer.id
        );

        customer.cart = merge_carts(std::mem::take(&mut customer.cart), guest);
        customer.updated_at = Utc::now();
        state.store.save_customer(&customer).await?;
    }

    let session = state
        .keys
        .issue(customer.id, TokenKind::Customer, session_ttl())?;

    Ok((
        jar.add(session_cookie(session)),
        Json(LoginResponse {
            ok: true,
            user: customer.profile(),
        }),
    ))
}

async fn logout_handler(jar: CookieJar) -> impl IntoResponse {
    (jar.add(removal_cookie()), Json(json!({ "ok": true })))
}

#[derive(Serialize, Debug)]
pub struct MeResponse {
    pub user: CustomerProfile,
    pub cart: Vec<CartItem>,
}

async fn me_handler(
    State(state): State<Arc<AppState>>,
    CustomerSession(id): CustomerSession,
) -> Result<Json<MeResponse>, AppError> {
    let customer = state
        .store
        .get_customer(id)
        .await?
        .ok_or(AppError::Unauthorized("Invalid session"))?;

    Ok(Json(MeResponse {
        user: customer.profile(),
        cart: customer.cart,
    }))
}

async fn unsubscribe_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, AppError> {
    let token = query.token.unwrap_or_default();

    let customer = if token.is_empty() {
        None
    } else {
        state.store.customer_by_unsubscribe_token(&token).await?
    };

    let Some(mut customer) = customer else {
        return Ok((axum::http::StatusCode::BAD_REQUEST, "Invalid token"));
    };

    customer.marketing_opt_in = false;
    customer.updated_at = Utc::now();
    state.store.save_customer(&customer).await?;

    info!("Customer {} unsubscribed from marketing", customer.id);

    Ok((axum::http::StatusCode::OK, "Unsubscribed successfully."))
}
