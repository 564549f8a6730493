use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CURRENCY: &str = "BRL";
pub const AUTO_RETURN: &str = "approved";

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PreferenceRequest {
    pub items: Vec<PreferenceItem>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<Payer>,

    pub back_urls: BackUrls,
    pub auto_return: String,
    pub notification_url: String,
    pub external_reference: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipments: Option<Shipments>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PreferenceItem {
    pub id: String,
    pub title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,

    pub quantity: u32,
    pub currency_id: String,
    pub unit_price: Decimal,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct Payer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BackUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Shipments {
    pub cost: Decimal,
    pub mode: String,
}

/// Created preference, only the fields the checkout needs.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Preference {
    pub id: String,
    pub init_point: String,

    #[serde(default)]
    pub sandbox_init_point: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: u64,
    pub status: String,

    #[serde(default)]
    pub status_detail: Option<String>,

    #[serde(default)]
    pub external_reference: Option<String>,

    #[serde(default)]
    pub transaction_amount: Option<Decimal>,
}
