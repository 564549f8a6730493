use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{ConnectInfo, OriginalUri, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, header},
    middleware::Next,
    response::Response,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::warn;

use crate::{error::AppError, state::AppState};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Client address as seen through `trusted_proxies` reverse proxies.
///
/// With no trusted proxy the peer address is the client and `X-Forwarded-For`
/// is ignored. Otherwise the hop appended by the outermost trusted proxy is
/// used, anything left of it was written by the client.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trusted_proxies: usize) -> String {
    let peer = peer.map(|peer| peer.ip().to_string());

    if trusted_proxies == 0 {
        return peer.unwrap_or_else(|| "unknown".to_string());
    }

    let hops: Vec<&str> = headers
        .get_all(FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .collect();

    hops.len()
        .checked_sub(1)
        .map(|last| hops[last.saturating_sub(trusted_proxies - 1)].to_string())
        .or(peer)
        .unwrap_or_else(|| "unknown".to_string())
}

/// Fixed-window limit per client and path, shared through the store so every
/// replica counts the same hits.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(address)| *address);

    let limits = &state.config.rate_limit;
    let ip = client_ip(request.headers(), peer, limits.trusted_proxies);

    let hits = state
        .store
        .hit(&format!("{path}:{ip}"), limits.window)
        .await?;

    if hits > limits.max {
        warn!("Rate limit hit by {ip} on {path}");
        return Err(AppError::TooManyRequests);
    }

    Ok(next.run(request).await)
}

/// Headers added to every response unless a handler already set them.
pub fn security_headers() -> Vec<SetResponseHeaderLayer<HeaderValue>> {
    [
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::X_FRAME_OPTIONS, "SAMEORIGIN"),
        (header::REFERRER_POLICY, "no-referrer"),
        (
            HeaderName::from_static("cross-origin-opener-policy"),
            "same-origin",
        ),
    ]
    .into_iter()
    .map(|(name, value)| {
        SetResponseHeaderLayer::if_not_present(name, HeaderValue::from_static(value))
    })
    .collect()
}
