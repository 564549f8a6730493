//! # Catalog import
//!
//! Seeds the storefront catalog from a JSON array of product payloads, the same
//! lenient shape the admin panel posts to `/api/produtos`.
//!
//! ## Steps
//! 1. Read the array from a file or an `http(s)` URL
//! 2. Validate every entry like `POST /api/produtos` does
//! 3. Write the valid ones to the store as new products
//!
//! Invalid entries are reported and skipped, they never abort the import.
use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use server::{
    models::{Product, ProductInput},
    store::Store,
};
use tracing::{info, warn};

pub mod models;
pub mod utils;

use models::{Rejected, Source, Summary};
use utils::{label, progress_bar};

pub async fn load_catalog(source: &Source, client: &Client) -> anyhow::Result<Vec<Value>> {
    let raw = match source {
        Source::Url(url) => client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("Failed to fetch {url}"))?
            .text()
            .await
            .with_context(|| format!("Failed to read {url}"))?,
        Source::File(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
    };

    let catalog: Value = serde_json::from_str(&raw).context("Catalog is not valid JSON")?;

    match catalog {
        Value::Array(entries) => Ok(entries),
        _ => bail!("Catalog must be a JSON array of products"),
    }
}

/// Splits entries into valid products and rejections, keeping catalog order.
pub fn prepare(entries: Vec<Value>, now: DateTime<Utc>) -> (Vec<Product>, Vec<Rejected>) {
    let mut products = Vec::with_capacity(entries.len());
    let mut rejected = Vec::new();

    for (position, entry) in entries.into_iter().enumerate() {
        let product = serde_json::from_value::<ProductInput>(entry)
            .map_err(|e| e.to_string())
            .and_then(|input| input.create(now).map_err(|e| e.to_string()));

        match product {
            Ok(product) => products.push(product),
            Err(reason) => rejected.push(Rejected { position, reason }),
        }
    }

    (products, rejected)
}

pub async fn import(store: &dyn Store, products: &[Product]) -> anyhow::Result<usize> {
    let pb = progress_bar(products.len());

    for product in products {
        pb.set_message(label(&product.name));

        store
            .put_product(product)
            .await
            .with_context(|| format!("Failed to store {}", product.name))?;

        pb.inc(1);
    }

    pb.finish_with_message("Done");

    Ok(products.len())
}

/// Loads and validates a catalog, then stores it when a store is given.
pub async fn run(source: &Source, store: Option<&dyn Store>) -> anyhow::Result<Summary> {
    let client = Client::new();
    let entries = load_catalog(source, &client).await?;
    info!("Loaded {} catalog entries", entries.len());

    let (products, rejected) = prepare(entries, Utc::now());
    for Rejected { position, reason } in &rejected {
        warn!("Skipping entry {position}: {reason}");
    }

    let imported = match store {
        Some(store) => import(store, &products).await?,
        None => {
            info!("Dry run, {} products would be imported", products.len());
            0
        }
    };

    Ok(Summary {
        imported,
        skipped: rejected.len(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rust_decimal::Decimal;
    use serde_json::json;
    use server::store::MemoryStore;
    use tempfile::NamedTempFile;

    use super::*;

    fn catalog_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_prepare_skips_invalid_entries() {
        let entries = vec![
            json!({ "name": "Bike Urbana", "price": "3499.90", "stock": 4 }),
            json!({ "price": 10 }),
            json!("not an object"),
            json!({ "name": "Capacete", "price": -1 }),
            json!({ "name": "Luva", "stock": "abc" }),
        ];

        let (products, rejected) = prepare(entries, Utc::now());

        assert_eq!(
            products.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["Bike Urbana", "Luva"]
        );
        assert_eq!(products[0].price, Decimal::new(349990, 2));
        assert_eq!(products[1].stock, 0);
        assert_eq!(
            rejected.iter().map(|r| r.position).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_run_imports_from_file() {
        let file = catalog_file(
            r#"[
                {"name": "Patinete", "price": 1500, "category": "patinetes"},
                {"name": ""}
            ]"#,
        );
        let store = MemoryStore::new();
        let source = Source::File(file.path().to_path_buf());

        let summary = run(&source, Some(&store as &dyn Store)).await.unwrap();

        assert_eq!(summary, Summary { imported: 1, skipped: 1 });

        let stored = store.list_products().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].category, "patinetes");
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let file = catalog_file(r#"[{"name": "Bike"}]"#);
        let source = Source::File(file.path().to_path_buf());

        let summary = run(&source, None).await.unwrap();

        assert_eq!(summary, Summary { imported: 0, skipped: 0 });
    }

    #[tokio::test]
    async fn test_load_catalog_rejects_non_arrays() {
        let file = catalog_file(r#"{"name": "Bike"}"#);
        let source = Source::File(file.path().to_path_buf());

        assert!(load_catalog(&source, &Client::new()).await.is_err());
        assert!(
            load_catalog(&Source::File("/does/not/exist.json".into()), &Client::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_load_catalog_from_url() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/catalog.json");
                then.status(200)
                    .json_body(json!([{ "name": "Bateria 48V", "price": 900 }]));
            })
            .await;

        let source = Source::parse(&server.url("/catalog.json"));
        let entries = load_catalog(&source, &Client::new()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["name"], "Bateria 48V");
    }
}
