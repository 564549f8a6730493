use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    utils::{lenient_number, lenient_string, truncate},
};

pub const NAME_MAX: usize = 250;
pub const DESCRIPTION_MAX: usize = 5000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub stock: i64,
    pub category: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product body as sent by the admin panel. Every field is optional so the
/// same shape serves creation and partial updates.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub price: Option<Decimal>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub stock: Option<i64>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub category: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub image_url: Option<String>,
}

impl ProductInput {
    pub fn create(self, now: DateTime<Utc>) -> Result<Product, AppError> {
        let mut product = Product {
            id: Uuid::new_v4(),
            name: String::new(),
            description: String::new(),
            price: Decimal::ZERO,
            stock: 0,
            category: String::new(),
            image_url: String::new(),
            created_at: now,
            updated_at: now,
        };

        self.apply(&mut product, now)?;

        Ok(product)
    }

    /// Writes the present fields onto `product` and validates the result.
    pub fn apply(self, product: &mut Product, now: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(name) = self.name {
            product.name = truncate(name.trim(), NAME_MAX);
        }
        if let Some(description) = self.description {
            product.description = truncate(&description, DESCRIPTION_MAX);
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        if let Some(category) = self.category {
            product.category = category;
        }
        if let Some(image_url) = self.image_url {
            product.image_url = image_url;
        }

        if product.name.is_empty() {
            return Err(AppError::bad_request("Product name is required"));
        }
        if product.price < Decimal::ZERO {
            return Err(AppError::bad_request("Product price must not be negative"));
        }
        if product.stock < 0 {
            return Err(AppError::bad_request("Product stock must not be negative"));
        }

        product.updated_at = now;

        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub price: Decimal,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

/// Cart line as kept by the browser, before it is trusted.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CartItemInput {
    #[serde(default, alias = "_id", alias = "id", deserialize_with = "lenient_string")]
    pub product_id: Option<String>,

    #[serde(default, alias = "name", deserialize_with = "lenient_string")]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub price: Option<Decimal>,

    #[serde(default, alias = "quantidade", deserialize_with = "lenient_number")]
    pub quantity: Option<i64>,
}

impl CartItemInput {
    /// `None` when the line names no product. Missing or non-positive
    /// quantities count as one unit.
    pub fn normalize(self, now: DateTime<Utc>) -> Option<CartItem> {
        let product_id = self.product_id.map(|id| id.trim().to_string())?;
        if product_id.is_empty() {
            return None;
        }

        let quantity = self
            .quantity
            .filter(|quantity| *quantity > 0)
            .map(|quantity| u32::try_from(quantity).unwrap_or(u32::MAX))
            .unwrap_or(1);

        Some(CartItem {
            product_id,
            title: self.title,
            price: self.price.unwrap_or_default(),
            quantity,
            added_at: now,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub email: String,

    #[serde(default)]
    pub phone: Option<String>,

    pub password_hash: String,
    pub email_verified: bool,

    #[serde(default)]
    pub verify_token: Option<String>,

    #[serde(default)]
    pub verify_token_expires: Option<DateTime<Utc>>,

    pub marketing_opt_in: bool,
    pub unsubscribe_token: String,

    #[serde(default)]
    pub cart: Vec<CartItem>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn profile(&self) -> CustomerProfile {
        CustomerProfile {
            name: self.name.clone(),
            email: self.email.clone(),
            marketing_opt_in: self.marketing_opt_in,
            email_verified: self.email_verified,
        }
    }

    pub fn verify_token_valid(&self, token: &str, now: DateTime<Utc>) -> bool {
        self.verify_token.as_deref() == Some(token)
            && self.verify_token_expires.is_some_and(|expires| expires > now)
    }
}

/// Public view of a customer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    pub name: String,
    pub email: String,
    pub marketing_opt_in: bool,
    pub email_verified: bool,
}

/// Admin panel account.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Approved,
    Authorized,
    InProcess,
    InMediation,
    Rejected,
    Cancelled,
    Refunded,
    ChargedBack,
}

impl OrderStatus {
    /// Maps a Mercado Pago payment status.
    pub fn from_payment(status: &str) -> Option<Self> {
        Some(match status {
            "pending" => Self::Pending,
            "approved" => Self::Approved,
            "authorized" => Self::Authorized,
            "in_process" => Self::InProcess,
            "in_mediation" => Self::InMediation,
            "rejected" => Self::Rejected,
            "cancelled" => Self::Cancelled,
            "refunded" => Self::Refunded,
            "charged_back" => Self::ChargedBack,
            _ => return None,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub title: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: Uuid,

    #[serde(default)]
    pub customer_id: Option<Uuid>,

    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub discount_value: Decimal,

    #[serde(default)]
    pub coupon_code: Option<String>,

    pub total: Decimal,
    pub status: OrderStatus,

    #[serde(default)]
    pub preference_id: Option<String>,

    #[serde(default)]
    pub payment_id: Option<u64>,

    #[serde(default)]
    pub status_detail: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
