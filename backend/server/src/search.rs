//! # Catalog search
//!
//! Filtering and ordering behind `GET /api/produtos`.
//!
//! ## Query
//! - `q`: case-insensitive substring of name or description
//! - `category`: exact match
//! - `minPrice` / `maxPrice`: inclusive bounds, ignored when not numeric
//! - `sort`: `newest` (default), `price_asc`, `price_desc`, `name_az`, `name_za`
//! - `limit`: clamped to `1..=1000`, default 1000
//!
//! ## Notes
//! The catalog is a few hundred products, so the whole collection is read and
//! filtered in process instead of keeping sorted indexes in Redis.
use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::models::Product;

pub const MAX_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    NameAz,
    NameZa,
}

impl SortKey {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("price_asc") => Self::PriceAsc,
            Some("price_desc") => Self::PriceDesc,
            Some("name_az") => Self::NameAz,
            Some("name_za") => Self::NameZa,
            _ => Self::Newest,
        }
    }
}

/// Raw query string, kept as strings so bad values fall back instead of failing.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CatalogQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub text: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort: SortKey,
    pub limit: usize,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn price(value: Option<String>) -> Option<Decimal> {
    non_empty(value).and_then(|value| value.parse().ok())
}

impl From<CatalogQuery> for Filter {
    fn from(query: CatalogQuery) -> Self {
        let limit = non_empty(query.limit)
            .and_then(|limit| limit.parse::<f64>().ok())
            .filter(|limit| limit.is_finite())
            .map(|limit| limit.clamp(1.0, MAX_LIMIT as f64) as usize)
            .unwrap_or(MAX_LIMIT);

        Self {
            text: non_empty(query.q).map(|q| q.to_lowercase()),
            category: non_empty(query.category),
            min_price: price(query.min_price),
            max_price: price(query.max_price),
            sort: SortKey::parse(query.sort.as_deref()),
            limit,
        }
    }
}

impl Filter {
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(category) = &self.category {
            if &product.category != category {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| product.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| product.price > max) {
            return false;
        }
        if let Some(text) = &self.text {
            return product.name.to_lowercase().contains(text)
                || product.description.to_lowercase().contains(text);
        }

        true
    }

    fn compare(&self, a: &Product, b: &Product) -> Ordering {
        match self.sort {
            SortKey::Newest => b.created_at.cmp(&a.created_at),
            SortKey::PriceAsc => a.price.cmp(&b.price),
            SortKey::PriceDesc => b.price.cmp(&a.price),
            SortKey::NameAz => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortKey::NameZa => b.name.to_lowercase().cmp(&a.name.to_lowercase()),
        }
        .then_with(|| b.created_at.cmp(&a.created_at))
    }

    pub fn apply(&self, products: Vec<Product>) -> Vec<Product> {
        let mut found: Vec<Product> = products.into_iter().filter(|p| self.matches(p)).collect();

        found.sort_by(|a, b| self.compare(a, b));
        found.truncate(self.limit);

        found
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;

    fn product(name: &str, price: i64, category: &str, age_minutes: i64) -> Product {
        let created = Utc::now() - Duration::minutes(age_minutes);
        Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: format!("Descrição de {name}"),
            price: Decimal::new(price, 0),
            stock: 1,
            category: category.to_string(),
            image_url: String::new(),
            created_at: created,
            updated_at: created,
        }
    }

    fn catalog() -> Vec<Product> {
        vec![
            product("Bike Urbana", 3000, "bikes", 3),
            product("Patinete", 1500, "patinetes", 2),
            product("bateria 48V", 900, "pecas", 1),
            product("Bike Cargo", 7000, "bikes", 4),
        ]
    }

    fn names(products: &[Product]) -> Vec<&str> {
        products.iter().map(|p| p.name.as_str()).collect()
    }

    fn filter(query: CatalogQuery) -> Filter {
        Filter::from(query)
    }

    #[test]
    fn test_defaults() {
        let filter = filter(CatalogQuery::default());

        assert_eq!(filter.sort, SortKey::Newest);
        assert_eq!(filter.limit, MAX_LIMIT);
        assert_eq!(
            names(&filter.apply(catalog())),
            vec!["bateria 48V", "Patinete", "Bike Urbana", "Bike Cargo"]
        );
    }

    #[test]
    fn test_text_matches_name_or_description() {
        let query = CatalogQuery {
            q: Some("BIKE".to_string()),
            ..Default::default()
        };
        assert_eq!(names(&filter(query).apply(catalog())), vec!["Bike Urbana", "Bike Cargo"]);

        let query = CatalogQuery {
            q: Some("descrição de pat".to_string()),
            ..Default::default()
        };
        assert_eq!(names(&filter(query).apply(catalog())), vec!["Patinete"]);
    }

    #[test]
    fn test_price_range_and_category() {
        let query = CatalogQuery {
            category: Some("bikes".to_string()),
            min_price: Some("3000".to_string()),
            max_price: Some("abc".to_string()),
            sort: Some("price_desc".to_string()),
            ..Default::default()
        };

        assert_eq!(names(&filter(query).apply(catalog())), vec!["Bike Cargo", "Bike Urbana"]);
    }

    #[test]
    fn test_sorting() {
        let sorted = |sort: &str| {
            let query = CatalogQuery {
                sort: Some(sort.to_string()),
                ..Default::default()
            };
            names(&filter(query).apply(catalog()))
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
        };

        assert_eq!(sorted("price_asc")[0], "bateria 48V");
        assert_eq!(sorted("name_az"), vec!["bateria 48V", "Bike Cargo", "Bike Urbana", "Patinete"]);
        assert_eq!(sorted("name_za")[0], "Patinete");
        assert_eq!(sorted("unknown"), sorted("newest"));
    }

    #[test]
    fn test_limit_is_clamped() {
        let limit = |raw: &str| {
            filter(CatalogQuery {
                limit: Some(raw.to_string()),
                ..Default::default()
            })
            .limit
        };

        assert_eq!(limit("2"), 2);
        assert_eq!(limit("0"), 1);
        assert_eq!(limit("-5"), 1);
        assert_eq!(limit("50000"), MAX_LIMIT);
        assert_eq!(limit("nope"), MAX_LIMIT);
        assert_eq!(
            filter(CatalogQuery {
                limit: Some("2".to_string()),
                ..Default::default()
            })
            .apply(catalog())
            .len(),
            2
        );
    }
}
