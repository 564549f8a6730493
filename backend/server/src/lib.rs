//! Backend of the MC Electrobike storefront.
//!
//!
//!
//! # Surface
//! - `/api/produtos`: public catalog, writes need an admin bearer token
//! - `/api/customers`: customer accounts, cookie sessions and the saved cart
//! - `/api/auth`: admin panel accounts
//! - `/api/pagamento`: Mercado Pago checkout and payment notifications
//! - `/api/status`: liveness and store connectivity
//!
//!
//!
//! # Storage
//! Every document lives in a Redis hash keyed by its id, JSON encoded. Unique
//! fields (emails, one-time tokens) have their own index hashes. See [`database`].
//!
//! Handlers only see the [`store::Store`] trait, so tests run against
//! [`store::MemoryStore`] without a Redis server.
//!
//!
//!
//! # Sessions
//! - Customers: `cust_token` cookie, `SameSite=None` since the storefront is on another site
//! - Admins: `Authorization: Bearer` header
//!
//! Both are JWTs signed with `JWT_SECRET` and tagged with a kind, see [`auth`].
//!
//!
//!
//! # Setup
//!
//! Run locally.
//! ```sh
//! REDIS_URL=redis://127.0.0.1:6379 JWT_SECRET=dev MP_ACCESS_TOKEN=TEST-... \
//! EMAIL_FROM=loja@example.com EMAIL_PASS=... RUST_LOG=info cargo run -p mceletrobike
//! ```
//!
//! Import a catalog.
//! ```sh
//! cargo run -p process -- products.json --dry-run
//! ```
use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    http::{
        HeaderName, HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod mail;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod search;
pub mod state;
pub mod store;
pub mod utils;

use config::Config;
use state::AppState;

pub fn cors(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins()
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(&origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Skipping invalid origin {origin}: {e}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
        .max_age(Duration::from_secs(60 * 60))
}

pub fn app(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .nest("/api/produtos", routes::products::router())
        .nest("/api/customers", routes::customers::router(state.clone()))
        .nest("/api/auth", routes::admin::router(state.clone()))
        .nest("/api/pagamento", routes::checkout::router())
        .nest("/api/status", routes::status::router());

    let api = middleware::security_headers()
        .into_iter()
        .fold(api, |api, layer| api.layer(layer));

    api.layer(cors(&state.config))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = AppState::new(config).await?;

    info!("Starting server...");
    let address = format!("0.0.0.0:{}", state.config.port);
    let app = app(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
