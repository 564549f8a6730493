use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::{
    auth::CustomerSession,
    error::AppError,
    models::{CartItem, CartItemInput, Customer},
    state::AppState,
    utils::Payload,
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/cart", get(get_handler).put(put_handler))
}

#[derive(Serialize, Debug)]
pub struct CartResponse {
    pub cart: Vec<CartItem>,
}

async fn customer(state: &AppState, session: CustomerSession) -> Result<Customer, AppError> {
    state
        .store
        .get_customer(session.0)
        .await?
        .ok_or(AppError::Unauthorized("Invalid session"))
}

async fn get_handler(
    State(state): State<Arc<AppState>>,
    session: CustomerSession,
) -> Result<Json<CartResponse>, AppError> {
    let customer = customer(&state, session).await?;

    Ok(Json(CartResponse {
        cart: customer.cart,
    }))
}

/// Parses the `items` array of a cart replacement. Every line must name a product.
pub fn parse_items(body: Value) -> Result<Vec<CartItem>, AppError> {
    let Some(Value::Array(lines)) = body.get("items").cloned() else {
        return Err(AppError::bad_request("items must be an array"));
    };

    let now = Utc::now();

    lines
        .into_iter()
        .map(|line| {
            serde_json::from_value::<CartItemInput>(line)
                .ok()
                .and_then(|line| line.normalize(now))
                .ok_or_else(|| AppError::bad_request("Every cart item needs a productId"))
        })
        .collect()
}

async fn put_handler(
    State(state): State<Arc<AppState>>,
    session: CustomerSession,
    Payload(body): Payload<Value>,
) -> Result<Json<Value>, AppError> {
    let items = parse_items(body)?;
    let mut customer = customer(&state, session).await?;

    customer.cart = items;
    customer.updated_at = Utc::now();
    state.store.save_customer(&customer).await?;

    info!(
        "Customer {} saved a cart with {} lines",
        customer.id,
        customer.cart.len()
    );

    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_items_requires_array() {
        assert!(parse_items(json!({})).is_err());
        assert!(parse_items(json!({ "items": "nope" })).is_err());
        assert!(parse_items(json!({ "items": { "productId": "p1" } })).is_err());
        assert!(parse_items(json!({ "items": [] })).unwrap().is_empty());
    }

    #[test]
    fn test_parse_items_rejects_lines_without_product() {
        let body = json!({ "items": [{ "productId": "p1" }, { "quantity": 2 }] });

        assert!(parse_items(body).is_err());
    }

    #[test]
    fn test_parse_items_keeps_order_and_quantities() {
        let body = json!({
            "items": [
                { "productId": "p2", "quantity": 2, "price": 10 },
                { "_id": "p1", "quantidade": "0" },
            ]
        });
        let items = parse_items(body).unwrap();

        assert_eq!(items[0].product_id, "p2");
        assert_eq!(items[0].quantity, 2);
        assert_eq!(items[1].product_id, "p1");
        assert_eq!(items[1].quantity, 1);
    }
}
