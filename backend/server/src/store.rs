//! Persistence seam of the storefront.
//!
//! Production runs on [`RedisStore`](crate::database::RedisStore), tests and
//! local experiments on [`MemoryStore`].
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Customer, Order, Product, User};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Corrupt record: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn put_product(&self, product: &Product) -> StoreResult<()>;
    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>>;
    async fn list_products(&self) -> StoreResult<Vec<Product>>;
    async fn delete_product(&self, id: Uuid) -> StoreResult<bool>;

    /// Returns `false` without writing when the email is already registered.
    async fn insert_customer(&self, customer: &Customer) -> StoreResult<bool>;
    async fn save_customer(&self, customer: &Customer) -> StoreResult<()>;
    async fn get_customer(&self, id: Uuid) -> StoreResult<Option<Customer>>;
    async fn customer_by_email(&self, email: &str) -> StoreResult<Option<Customer>>;
    async fn customer_by_verify_token(&self, token: &str) -> StoreResult<Option<Customer>>;
    async fn customer_by_unsubscribe_token(&self, token: &str) -> StoreResult<Option<Customer>>;

    /// Returns `false` without writing when the email is already registered.
    async fn insert_user(&self, user: &User) -> StoreResult<bool>;
    async fn save_user(&self, user: &User) -> StoreResult<()>;
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn save_order(&self, order: &Order) -> StoreResult<()>;
    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>>;

    /// Counts one hit for `key` in a fixed window of `window`, returning the
    /// hits seen so far in the current window.
    async fn hit(&self, key: &str, window: Duration) -> StoreResult<u64>;
}

#[derive(Default)]
struct Tables {
    products: HashMap<Uuid, Product>,
    customers: HashMap<Uuid, Customer>,
    users: HashMap<Uuid, User>,
    orders: HashMap<Uuid, Order>,
    hits: HashMap<String, (u64, Instant)>,
}

/// Process-local store, lost on restart.
#[derive(Default, Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn put_product(&self, product: &Product) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        Ok(self.tables.read().await.products.values().cloned().collect())
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables.write().await.products.remove(&id).is_some())
    }

    async fn insert_customer(&self, customer: &Customer) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.customers.values().any(|c| c.email == customer.email) {
            return Ok(false);
        }

        tables.customers.insert(customer.id, customer.clone());
        Ok(true)
    }

    async fn save_customer(&self, customer: &Customer) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn get_customer(&self, id: Uuid) -> StoreResult<Option<Customer>> {
        Ok(self.tables.read().await.customers.get(&id).cloned())
    }

    async fn customer_by_email(&self, email: &str) -> StoreResult<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables.customers.values().find(|c| c.email == email).cloned())
    }

    async fn customer_by_verify_token(&self, token: &str) -> StoreResult<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables
            .customers
            .values()
            .find(|c| c.verify_token.as_deref() == Some(token))
            .cloned())
    }

    async fn customer_by_unsubscribe_token(&self, token: &str) -> StoreResult<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables
            .customers
            .values()
            .find(|c| c.unsubscribe_token == token)
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Ok(false);
        }

        tables.users.insert(user.id, user.clone());
        Ok(true)
    }

    async fn save_user(&self, user: &User) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn save_order(&self, order: &Order) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn hit(&self, key: &str, window: Duration) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let now = Instant::now();

        tables
            .hits
            .retain(|_, (_, start)| now.duration_since(*start) < window);

        let entry = tables.hits.entry(key.to_string()).or_insert((0, now));
        entry.0 += 1;

        Ok(entry.0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;

    fn customer(email: &str) -> Customer {
        let now = Utc::now();
        Customer {
            id: Uuid::new_v4(),
            name: "Ana".to_string(),
            email: email.to_string(),
            phone: None,
            password_hash: String::new(),
            email_verified: false,
            verify_token: Some(format!("verify-{email}")),
            verify_token_expires: None,
            marketing_opt_in: true,
            unsubscribe_token: format!("unsub-{email}"),
            cart: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_customer_email_is_unique() {
        let store = MemoryStore::new();

        assert!(store.insert_customer(&customer("a@x.com")).await.unwrap());
        assert!(!store.insert_customer(&customer("a@x.com")).await.unwrap());
        assert!(store.insert_customer(&customer("b@x.com")).await.unwrap());
    }

    #[tokio::test]
    async fn test_customer_lookups() {
        let store = MemoryStore::new();
        let ana = customer("ana@x.com");
        store.insert_customer(&ana).await.unwrap();

        let by_email = store.customer_by_email("ana@x.com").await.unwrap();
        let by_verify = store.customer_by_verify_token("verify-ana@x.com").await.unwrap();
        let by_unsub = store.customer_by_unsubscribe_token("unsub-ana@x.com").await.unwrap();

        assert_eq!(by_email.map(|c| c.id), Some(ana.id));
        assert_eq!(by_verify.map(|c| c.id), Some(ana.id));
        assert_eq!(by_unsub.map(|c| c.id), Some(ana.id));
        assert!(store.customer_by_verify_token("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_product_crud() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: "Bike".to_string(),
            description: String::new(),
            price: Decimal::new(1999, 0),
            stock: 3,
            category: "urbana".to_string(),
            image_url: String::new(),
            created_at: now,
            updated_at: now,
        };

        store.put_product(&product).await.unwrap();
        assert_eq!(store.get_product(product.id).await.unwrap(), Some(product.clone()));
        assert_eq!(store.list_products().await.unwrap().len(), 1);

        assert!(store.delete_product(product.id).await.unwrap());
        assert!(!store.delete_product(product.id).await.unwrap());
        assert!(store.get_product(product.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_hits_reset_after_window() {
        let store = MemoryStore::new();
        let window = Duration::from_millis(50);

        assert_eq!(store.hit("login:1.2.3.4", window).await.unwrap(), 1);
        assert_eq!(store.hit("login:1.2.3.4", window).await.unwrap(), 2);
        assert_eq!(store.hit("login:5.6.7.8", window).await.unwrap(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.hit("login:1.2.3.4", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_hits_are_dropped() {
        let store = MemoryStore::new();
        let window = Duration::from_millis(50);

        for n in 0..100 {
            store.hit(&format!("login:10.0.0.{n}"), window).await.unwrap();
        }
        assert_eq!(store.tables.read().await.hits.len(), 100);

        tokio::time::sleep(Duration::from_millis(60)).await;
        store.hit("login:1.2.3.4", window).await.unwrap();

        assert_eq!(store.tables.read().await.hits.len(), 1);
    }
}
