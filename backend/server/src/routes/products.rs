use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AdminSession,
    error::AppError,
    models::{Product, ProductInput},
    search::{CatalogQuery, Filter},
    state::AppState,
    utils::Payload,
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_handler).post(create_handler))
        .route(
            "/{id}",
            get(detail_handler)
                .put(update_handler)
                .patch(update_handler)
                .delete(delete_handler),
        )
}

pub fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::bad_request("Invalid product id"))
}

async fn list_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<Vec<Product>>, AppError> {
    let filter = Filter::from(query);
    let products = state.store.list_products().await?;

    Ok(Json(filter.apply(products)))
}

async fn detail_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, AppError> {
    let id = parse_id(&id)?;

    state
        .store
        .get_product(id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("Product not found"))
}

async fn create_handler(
    State(state): State<Arc<AppState>>,
    AdminSession(admin): AdminSession,
    Payload(input): Payload<ProductInput>,
) -> Result<impl IntoResponse, AppError> {
    let product = input.create(Utc::now())?;
    state.store.put_product(&product).await?;

    info!("Admin {admin} created product {}", product.id);

    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_handler(
    State(state): State<Arc<AppState>>,
    AdminSession(admin): AdminSession,
    Path(id): Path<String>,
    Payload(input): Payload<ProductInput>,
) -> Result<Json<Product>, AppError> {
    let id = parse_id(&id)?;

    let mut product = state
        .store
        .get_product(id)
        .await?
        .ok_or(AppError::NotFound("Product not found"))?;

    input.apply(&mut product, Utc::now())?;
    state.store.put_product(&product).await?;

    info!("Admin {admin} updated product {id}");

    Ok(Json(product))
}

async fn delete_handler(
    State(state): State<Arc<AppState>>,
    AdminSession(admin): AdminSession,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;

    if !state.store.delete_product(id).await? {
        return Err(AppError::NotFound("Product not found"));
    }

    info!("Admin {admin} deleted product {id}");

    Ok(Json(json!({
        "status": "success",
        "message": "Product deleted",
        "data": null,
    })))
}
