//! # Sessions and credentials
//!
//! ## Customers
//! - Session lives in the `cust_token` cookie: JWT, 7 days, `HttpOnly; Secure; SameSite=None`
//! - `SameSite=None` because the storefront and the API are served from different sites
//!
//! ## Admin panel
//! - Bearer JWT returned by `/api/auth/login`, 2 hours
//!
//! ## Tokens
//! Every JWT carries a `kind`. A token is only accepted where its kind is
//! expected, so a customer session never opens the admin panel and an email
//! confirmation link never works as a session.
use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::{Error as JwtError, ErrorKind},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub const SESSION_COOKIE: &str = "cust_token";

pub fn session_ttl() -> Duration {
    Duration::days(7)
}

pub fn admin_ttl() -> Duration {
    Duration::hours(2)
}

pub fn confirm_ttl() -> Duration {
    Duration::hours(1)
}

pub fn verify_ttl() -> Duration {
    Duration::hours(24)
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Customer,
    Admin,
    Confirm,
    Verify,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Claims {
    pub sub: String,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn subject(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

#[derive(Clone)]
pub struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn issue(&self, subject: Uuid, kind: TokenKind, ttl: Duration) -> Result<String, JwtError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, JwtError> {
        let claims = decode::<Claims>(token, &self.decoding, &Validation::default())?.claims;

        if claims.kind != kind {
            return Err(ErrorKind::InvalidToken.into());
        }

        Ok(claims)
    }
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::InternalError(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .path("/")
        .max_age(time::Duration::seconds(session_ttl().num_seconds()))
        .build()
}

/// Expired session cookie, sent on logout whether or not the request had one.
pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .path("/")
        .build();
    cookie.make_removal();

    cookie
}

/// Customer authenticated by the session cookie.
#[derive(Debug, Clone, Copy)]
pub struct CustomerSession(pub Uuid);

impl FromRequestParts<Arc<AppState>> for CustomerSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
            .ok_or(AppError::Unauthorized("Not authenticated"))?;

        state
            .keys
            .verify(&token, TokenKind::Customer)
            .ok()
            .and_then(|claims| claims.subject())
            .map(CustomerSession)
            .ok_or(AppError::Unauthorized("Invalid or expired session"))
    }
}

/// Admin authenticated by an `Authorization: Bearer` token.
#[derive(Debug, Clone, Copy)]
pub struct AdminSession(pub Uuid);

impl FromRequestParts<Arc<AppState>> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized("Missing authorization token"))?;

        state
            .keys
            .verify(token.trim(), TokenKind::Admin)
            .ok()
            .and_then(|claims| claims.subject())
            .map(AdminSession)
            .ok_or(AppError::Unauthorized("Invalid or expired token"))
    }
}
