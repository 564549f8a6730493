use std::{
    collections::{HashMap, hash_map::Entry},
    str::FromStr,
};

use axum::extract::FromRequest;
use rand::RngCore;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{error::AppError, models::CartItem};

/// JSON body extractor whose rejections become [`AppError::MalformedPayload`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Payload<T>(pub T);

/// Strings, numbers and booleans become strings, anything else is treated as absent.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Numbers may arrive as JSON numbers or numeric strings. A present value that
/// does not parse becomes `T::default()`, an absent or null one becomes `None`.
pub fn lenient_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::Number(n) => Some(parse_or_default(&n.to_string())),
        Value::String(s) => Some(parse_or_default(s.trim())),
        _ => Some(T::default()),
    })
}

fn parse_or_default<T: FromStr + Default>(raw: &str) -> T {
    raw.parse().unwrap_or_default()
}

/// Cuts `input` to at most `max` characters.
pub fn truncate(input: &str, max: usize) -> String {
    input.chars().take(max).collect()
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Hex encoded random token of `bytes` random bytes.
pub fn random_token(bytes: usize) -> String {
    let mut buffer = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buffer);

    buffer.iter().map(|byte| format!("{byte:02x}")).collect()
}

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());

    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }

    escaped
}

/// Folds `guest` into `stored`, one line per product id.
///
/// Stored lines come first and keep their title and price, quantities of
/// repeated product ids are summed. Lines keep first-seen order.
pub fn merge_carts(stored: Vec<CartItem>, guest: Vec<CartItem>) -> Vec<CartItem> {
    let mut merged: Vec<CartItem> = Vec::with_capacity(stored.len() + guest.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for item in stored.into_iter().chain(guest) {
        match positions.entry(item.product_id.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(merged.len());
                merged.push(item);
            }
            Entry::Occupied(entry) => {
                let line = &mut merged[*entry.get()];
                line.quantity = line.quantity.saturating_add(item.quantity);
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use serde::Deserialize;

    use super::*;

    fn item(product_id: &str, quantity: u32) -> CartItem {
        CartItem {
            product_id: product_id.to_string(),
            title: Some(format!("Produto {product_id}")),
            price: Decimal::new(100, 0),
            quantity,
            added_at: Utc::now(),
        }
    }

    fn quantities(cart: &[CartItem]) -> Vec<(&str, u32)> {
        cart.iter()
            .map(|item| (item.product_id.as_str(), item.quantity))
            .collect()
    }

    #[test]
    fn test_merge_sums_quantities_per_product() {
        let stored = vec![item("a", 1), item("b", 2)];
        let guest = vec![item("b", 3), item("c", 1), item("a", 4)];

        let merged = merge_carts(stored, guest);

        assert_eq!(quantities(&merged), vec![("a", 5), ("b", 5), ("c", 1)]);
    }

    #[test]
    fn test_merge_dedupes_inside_guest_cart() {
        let merged = merge_carts(vec![], vec![item("x", 1), item("x", 1), item("y", 2)]);

        assert_eq!(quantities(&merged), vec![("x", 2), ("y", 2)]);
    }

    #[test]
    fn test_merge_keeps_stored_line_details() {
        let mut guest = item("a", 1);
        guest.title = Some("guest title".to_string());
        guest.price = Decimal::new(1, 0);

        let merged = merge_carts(vec![item("a", 1)], vec![guest]);

        assert_eq!(merged[0].title.as_deref(), Some("Produto a"));
        assert_eq!(merged[0].price, Decimal::new(100, 0));
    }

    #[test]
    fn test_merge_with_empty_sides() {
        assert!(merge_carts(vec![], vec![]).is_empty());
        assert_eq!(quantities(&merge_carts(vec![item("a", 2)], vec![])), vec![("a", 2)]);
        assert_eq!(quantities(&merge_carts(vec![], vec![item("a", 2)])), vec![("a", 2)]);
    }

    #[derive(Deserialize)]
    struct Lenient {
        #[serde(default, deserialize_with = "lenient_number")]
        price: Option<Decimal>,
        #[serde(default, deserialize_with = "lenient_number")]
        stock: Option<i64>,
        #[serde(default, deserialize_with = "lenient_string")]
        name: Option<String>,
    }

    fn lenient(json: &str) -> Lenient {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_lenient_numbers() {
        assert_eq!(lenient(r#"{"price": 10.5}"#).price, Some(Decimal::new(105, 1)));
        assert_eq!(lenient(r#"{"price": " 7 "}"#).price, Some(Decimal::new(7, 0)));
        assert_eq!(lenient(r#"{"price": "abc"}"#).price, Some(Decimal::ZERO));
        assert_eq!(lenient(r#"{"price": null}"#).price, None);
        assert_eq!(lenient(r#"{}"#).price, None);
        assert_eq!(lenient(r#"{"stock": "3"}"#).stock, Some(3));
        assert_eq!(lenient(r#"{"stock": [1]}"#).stock, Some(0));
    }

    #[test]
    fn test_lenient_strings() {
        assert_eq!(lenient(r#"{"name": "Bike"}"#).name.as_deref(), Some("Bike"));
        assert_eq!(lenient(r#"{"name": 42}"#).name.as_deref(), Some("42"));
        assert_eq!(lenient(r#"{"name": {"a": 1}}"#).name, None);
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("bicicleta elétrica", 11), "bicicleta e");
        assert_eq!(truncate("ção", 2), "çã");
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[test]
    fn test_random_token_is_hex() {
        let token = random_token(32);

        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, random_token(32));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>Zé & \"Ana\"</b>"), "&lt;b&gt;Zé &amp; &quot;Ana&quot;&lt;/b&gt;");
    }
}
