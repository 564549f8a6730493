//! # Checkout
//!
//! ## Flow
//! - `create_preference` validates the cart, stores a pending [`Order`] and asks
//!   Mercado Pago for a Checkout Pro preference whose `external_reference` is the order id
//! - Mercado Pago notifies `webhook` with a payment id
//! - The payment is read back from Mercado Pago and its status copied onto the order
//!
//! ## Notes
//! - Totals are computed here, never trusted from the client
//! - Coupon and discount only travel in the preference metadata, Mercado Pago
//!   charges the item prices plus shipping
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use payments::{
    BackUrls, Payer, PreferenceItem, PreferenceRequest, Shipments,
    models::{AUTO_RETURN, CURRENCY},
    signature,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{SESSION_COOKIE, TokenKind},
    config::Config,
    error::AppError,
    models::{NAME_MAX, Order, OrderItem, OrderStatus},
    state::AppState,
    utils::{Payload, lenient_number, lenient_string, truncate},
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const SIGNATURE_HEADER: &str = "x-signature";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/create_preference", post(create_preference_handler))
        .route("/webhook", post(webhook_handler))
        .route("/orders/{id}", get(order_handler))
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct CheckoutItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub unit_price: Option<Decimal>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub quantity: Option<i64>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub picture_url: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub category_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct PayerInput {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub items: Vec<CheckoutItem>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub shipping_cost: Option<Decimal>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub coupon_code: Option<String>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub discount_value: Option<Decimal>,

    #[serde(default)]
    pub payer: Option<PayerInput>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    #[serde(rename = "id")]
    pub preference_id: String,

    #[serde(rename = "init_point")]
    pub init_point: String,

    #[serde(rename = "sandbox_init_point")]
    pub sandbox_init_point: Option<String>,

    pub order_id: Uuid,
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Validated items in Mercado Pago shape.
pub fn preference_items(items: Vec<CheckoutItem>) -> Result<Vec<PreferenceItem>, AppError> {
    if items.is_empty() {
        return Err(AppError::bad_request("Cart is empty"));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(position, item)| {
            let title = present(item.title)
                .ok_or_else(|| AppError::bad_request("Every item needs a title"))?;
            let unit_price = item
                .unit_price
                .filter(|price| *price > Decimal::ZERO)
                .ok_or_else(|| AppError::bad_request("Item prices must be positive"))?;
            let quantity = item
                .quantity
                .filter(|quantity| *quantity > 0)
                .and_then(|quantity| u32::try_from(quantity).ok())
                .ok_or_else(|| AppError::bad_request("Item quantities must be positive"))?;

            Ok(PreferenceItem {
                id: present(item.id).unwrap_or_else(|| (position + 1).to_string()),
                title: truncate(&title, NAME_MAX),
                description: present(item.description).map(|d| truncate(&d, NAME_MAX)),
                picture_url: present(item.picture_url),
                category_id: present(item.category_id),
                quantity,
                currency_id: CURRENCY.to_string(),
                unit_price,
            })
        })
        .collect()
}

/// Pending order for validated items. Shipping below zero counts as free and
/// the discount never exceeds what is charged. Totals past `Decimal::MAX` are
/// rejected.
pub fn pending_order(
    items: &[PreferenceItem],
    shipping_cost: Option<Decimal>,
    discount_value: Option<Decimal>,
    coupon_code: Option<String>,
    customer_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<Order, AppError> {
    let too_large = || AppError::bad_request("Order total is too large");

    let subtotal = items.iter().try_fold(Decimal::ZERO, |sum, item| {
        item.unit_price
            .checked_mul(Decimal::from(item.quantity))
            .and_then(|line| sum.checked_add(line))
            .ok_or_else(too_large)
    })?;
    let shipping_cost = shipping_cost.unwrap_or_default().max(Decimal::ZERO);
    let charged = subtotal.checked_add(shipping_cost).ok_or_else(too_large)?;
    let discount_value = discount_value
        .unwrap_or_default()
        .max(Decimal::ZERO)
        .min(charged);

    Ok(Order {
        id: Uuid::new_v4(),
        customer_id,
        items: items
            .iter()
            .map(|item| OrderItem {
                product_id: item.id.clone(),
                title: item.title.clone(),
                unit_price: item.unit_price,
                quantity: item.quantity,
            })
            .collect(),
        subtotal,
        shipping_cost,
        discount_value,
        coupon_code: present(coupon_code),
        total: charged - discount_value,
        status: OrderStatus::Pending,
        preference_id: None,
        payment_id: None,
        status_detail: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn preference_request(
    config: &Config,
    order: &Order,
    items: Vec<PreferenceItem>,
    payer: Option<PayerInput>,
) -> PreferenceRequest {
    let payer = payer
        .map(|payer| Payer {
            name: present(payer.name),
            email: present(payer.email),
        })
        .filter(|payer| payer.name.is_some() || payer.email.is_some());

    let shipments = (order.shipping_cost > Decimal::ZERO).then(|| Shipments {
        cost: order.shipping_cost,
        mode: "not_specified".to_string(),
    });

    PreferenceRequest {
        items,
        payer,
        back_urls: BackUrls {
            success: config.frontend("/sucesso"),
            failure: config.frontend("/falha"),
            pending: config.frontend("/pendente"),
        },
        auto_return: AUTO_RETURN.to_string(),
        notification_url: config.backend("/api/pagamento/webhook"),
        external_reference: order.id.to_string(),
        shipments,
        metadata: Some(json!({
            "order_id": order.id,
            "coupon_code": order.coupon_code,
            "discount_value": order.discount_value,
            "subtotal": order.subtotal,
            "total": order.total,
        })),
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

async fn create_preference_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Payload(request): Payload<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let items = preference_items(request.items)?;

    // checkout works for guests, a valid session only links the order
    let customer_id = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| state.keys.verify(cookie.value(), TokenKind::Customer).ok())
        .and_then(|claims| claims.subject());

    let mut order = pending_order(
        &items,
        request.shipping_cost,
        request.discount_value,
        request.coupon_code,
        customer_id,
        Utc::now(),
    )?;
    state.store.save_order(&order).await?;

    let preference_request = preference_request(&state.config, &order, items, request.payer);

    let idempotency_key = header(&headers, REQUEST_ID_HEADER)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let preference = state
        .gateway
        .create_preference(&preference_request, &idempotency_key)
        .await?;

    order.preference_id = Some(preference.id.clone());
    order.updated_at = Utc::now();
    state.store.save_order(&order).await?;

    info!(
        "Created preference {} for order {} totalling {}",
        preference.id, order.id, order.total
    );

    Ok(Json(CheckoutResponse {
        preference_id: preference.id,
        init_point: preference.init_point,
        sandbox_init_point: preference.sandbox_init_point,
        order_id: order.id,
    }))
}

#[derive(Deserialize, Debug, Default)]
pub struct NotificationQuery {
    #[serde(rename = "data.id")]
    pub data_id: Option<String>,

    pub id: Option<String>,

    #[serde(rename = "type")]
    pub kind: Option<String>,

    pub topic: Option<String>,
}

/// Topic and resource id of a notification. Query parameters win over the body.
pub fn notification(query: NotificationQuery, body: &[u8]) -> (Option<String>, Option<String>) {
    let body: Value = serde_json::from_slice(body).unwrap_or(Value::Null);

    let text = |value: Option<&Value>| match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let topic = present(query.kind)
        .or(present(query.topic))
        .or_else(|| text(body.get("type")))
        .or_else(|| text(body.get("topic")));

    let id = present(query.data_id)
        .or(present(query.id))
        .or_else(|| text(body.get("data").and_then(|data| data.get("id"))));

    (topic, id)
}

async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NotificationQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let (topic, id) = notification(query, &body);

    if let Some(topic) = topic.as_deref().filter(|topic| *topic != "payment") {
        info!("Ignoring {topic} notification");
        return Ok(Json(json!({ "received": true })));
    }

    if let Some(secret) = &state.config.mercado_pago.webhook_secret {
        let valid = header(&headers, SIGNATURE_HEADER).is_some_and(|signed| {
            signature::verify(
                secret,
                signed,
                id.as_deref(),
                header(&headers, REQUEST_ID_HEADER),
            )
        });

        if !valid {
            warn!("Rejected webhook with an invalid signature");
            return Err(AppError::Unauthorized("Invalid signature"));
        }
    }

    let payment_id = id
        .filter(|id| id.chars().all(|c| c.is_ascii_digit()))
        .ok_or_else(|| AppError::bad_request("Invalid payment id"))?;

    let payment = state.gateway.get_payment(&payment_id).await?;

    let order_id = payment
        .external_reference
        .as_deref()
        .and_then(|reference| Uuid::parse_str(reference).ok());

    let order = match order_id {
        Some(order_id) => state.store.get_order(order_id).await?,
        None => None,
    };

    let Some(mut order) = order else {
        warn!(
            "Payment {} references unknown order {:?}",
            payment.id, payment.external_reference
        );
        return Ok(Json(json!({ "received": true })));
    };

    match OrderStatus::from_payment(&payment.status) {
        Some(status) => order.status = status,
        None => warn!("Unknown payment status {} for order {}", payment.status, order.id),
    }
    order.payment_id = Some(payment.id);
    order.status_detail = payment.status_detail;
    order.updated_at = Utc::now();
    state.store.save_order(&order).await?;

    info!(
        "Order {} is now {:?} after payment {}",
        order.id, order.status, payment.id
    );

    Ok(Json(json!({ "received": true })))
}

async fn order_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    let id = Uuid::parse_str(&id).map_err(|_| AppError::bad_request("Invalid order id"))?;

    state
        .store
        .get_order(id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("Order not found"))
}
